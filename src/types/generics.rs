use super::{FieldId, GenericParameterScope, TypeGraph, TypeId, TypeKind};
use crate::Error;

/// Ambient generic arguments for resolving formal parameters
///
/// Handlers touching generic fields carry one of these around: it maps the
/// formal type parameters (`!0`, `!!0`, ...) appearing in signatures to the
/// concrete types of the current instantiation.
#[derive(Clone, Default)]
pub struct GenericContext<'g> {
    pub type_arguments: Vec<TypeId<'g>>,
    pub method_arguments: Vec<TypeId<'g>>,
}

impl<'g> GenericContext<'g> {
    pub fn empty() -> GenericContext<'g> {
        GenericContext {
            type_arguments: Vec::new(),
            method_arguments: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.type_arguments.is_empty() && self.method_arguments.is_empty()
    }

    /// Context induced by a type: the arguments of a generic instance, or
    /// nothing for other types
    pub fn for_type(ty: TypeId<'g>) -> GenericContext<'g> {
        match &ty.kind {
            TypeKind::GenericInstance { arguments, .. } => GenericContext {
                type_arguments: arguments.clone(),
                method_arguments: Vec::new(),
            },
            _ => GenericContext::empty(),
        }
    }

    /// Resolve a field's declared type against this context
    ///
    /// An empty context is first populated from the field's declaring type,
    /// so fields of a generic instance resolve correctly even when the caller
    /// supplied no explicit arguments.
    pub fn resolve_field_type(
        &mut self,
        graph: &'g TypeGraph<'g>,
        field: FieldId<'g>,
    ) -> Result<TypeId<'g>, Error> {
        if self.is_empty() {
            *self = GenericContext::for_type(field.owner);
        }
        self.resolve_type(graph, field.field_type)
    }

    /// Substitute formal parameters in a type, recursively
    ///
    /// Generic instances are re-interned with their arguments resolved;
    /// arrays resolve through their element type; every other type resolves
    /// to itself.
    pub fn resolve_type(&self, graph: &'g TypeGraph<'g>, ty: TypeId<'g>) -> Result<TypeId<'g>, Error> {
        match &ty.kind {
            TypeKind::GenericParameter { index, scope } => {
                let arguments = match scope {
                    GenericParameterScope::Type => &self.type_arguments,
                    GenericParameterScope::Method => &self.method_arguments,
                };
                arguments.get(*index as usize).copied().ok_or_else(|| {
                    Error::InvalidArgument(format!(
                        "no generic argument for parameter {} in scope {:?}",
                        index, scope
                    ))
                })
            }
            TypeKind::GenericInstance {
                definition,
                arguments,
            } => {
                let resolved = arguments
                    .iter()
                    .map(|argument| self.resolve_type(graph, *argument))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(graph.instantiate(*definition, resolved))
            }
            TypeKind::SzArray(element) => {
                let element = self.resolve_type(graph, *element)?;
                Ok(graph.sz_array_of(element))
            }
            _ => Ok(ty),
        }
    }
}
