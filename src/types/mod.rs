//! The ambient type system of the emulated machine
//!
//! Emulation constantly asks questions about types: how big is an instance,
//! where does a field live, is this reference assignable to that type? This
//! module answers them from an append-only *type graph*.
//!
//! ### `*Id<'g>` types
//!
//! Graph nodes are owned by arenas ([`TypeGraphArenas`]) and handed out as
//! [`TypeId`]/[`FieldId`] - wrappers whose identity is the reference itself
//! (see [`crate::util::RefId`]). Since the graph is append-only, adding types
//! and fields needs no mutable reference, and ids stay valid for the life of
//! the arenas. Dereference an id to crawl the graph.
//!
//! ### Interning
//!
//! Array types and generic instantiations are interned by name:
//! [`TypeGraph::sz_array_of`] and [`TypeGraph::instantiate`] return the
//! existing node when one is already present, so ids can be compared cheaply
//! for type identity.

mod assignable;
mod core_types;
mod generics;
mod layout;

pub use assignable::*;
pub use core_types::*;
pub use generics::*;
pub use layout::*;

use crate::util::RefId;
use elsa::map::FrozenMap;
use elsa::FrozenVec;
use std::fmt;
use typed_arena::Arena;

/// Reference to a type in the type graph
pub type TypeId<'g> = RefId<'g, TypeData<'g>>;

/// Reference to a field in the type graph
pub type FieldId<'g> = RefId<'g, FieldData<'g>>;

/// Backing storage for type-graph nodes
pub struct TypeGraphArenas<'g> {
    type_arena: Arena<TypeData<'g>>,
    field_arena: Arena<FieldData<'g>>,
}

impl<'g> TypeGraphArenas<'g> {
    pub fn new() -> Self {
        TypeGraphArenas {
            type_arena: Arena::new(),
            field_arena: Arena::new(),
        }
    }
}

impl<'g> Default for TypeGraphArenas<'g> {
    fn default() -> Self {
        Self::new()
    }
}

/// Append-only graph of types and their fields
pub struct TypeGraph<'g> {
    arenas: &'g TypeGraphArenas<'g>,
    types: FrozenMap<&'g str, TypeId<'g>>,
}

impl<'g> TypeGraph<'g> {
    /// New empty graph
    pub fn new(arenas: &'g TypeGraphArenas<'g>) -> Self {
        TypeGraph {
            arenas,
            types: FrozenMap::new(),
        }
    }

    /// Lookup a type by its full name
    pub fn lookup(&'g self, name: &str) -> Option<TypeId<'g>> {
        self.types.get(name).map(RefId)
    }

    /// Add a new type to the graph
    pub fn add_type(&self, data: TypeData<'g>) -> TypeId<'g> {
        let data: &'g TypeData<'g> = &*self.arenas.type_arena.alloc(data);
        let type_id = RefId(data);
        self.types.insert(data.name.as_str(), type_id);
        type_id
    }

    /// Add a field to the graph and to its owning type
    pub fn add_field(&self, field: FieldData<'g>) -> FieldId<'g> {
        let field_id = RefId(&*self.arenas.field_arena.alloc(field));
        field_id.owner.fields.push(field_id);
        field_id
    }

    /// The single-dimension zero-based array type over `element`, interned
    pub fn sz_array_of(&'g self, element: TypeId<'g>) -> TypeId<'g> {
        let name = format!("{}[]", element.name);
        if let Some(existing) = self.lookup(&name) {
            return existing;
        }
        self.add_type(TypeData {
            name,
            base: None,
            kind: TypeKind::SzArray(element),
            fields: FrozenVec::new(),
            interfaces: FrozenVec::new(),
        })
    }

    /// A generic instantiation `definition<arguments...>`, interned
    pub fn instantiate(&'g self, definition: TypeId<'g>, arguments: Vec<TypeId<'g>>) -> TypeId<'g> {
        let rendered: Vec<&str> = arguments.iter().map(|arg| arg.name.as_str()).collect();
        let name = format!("{}<{}>", definition.name, rendered.join(","));
        if let Some(existing) = self.lookup(&name) {
            return existing;
        }
        self.add_type(TypeData {
            name,
            base: definition.base,
            kind: TypeKind::GenericInstance {
                definition,
                arguments,
            },
            fields: FrozenVec::new(),
            interfaces: FrozenVec::new(),
        })
    }

    /// Register the well-known core types every program assumes
    pub fn insert_core_types(&'g self) -> CoreTypes<'g> {
        CoreTypes::add_to_graph(self)
    }
}

/// One node of the type graph
pub struct TypeData<'g> {
    /// Full name, unique within the graph (eg. `System.Int32`)
    pub name: String,

    /// Base type; only missing for the root object type and for types whose
    /// assignability is decided structurally (arrays, generic parameters)
    pub base: Option<TypeId<'g>>,

    /// What flavor of type this is
    pub kind: TypeKind<'g>,

    /// Instance fields, in declaration (and therefore layout) order
    pub fields: FrozenVec<FieldId<'g>>,

    /// Implemented interfaces
    pub interfaces: FrozenVec<TypeId<'g>>,
}

impl<'g> TypeData<'g> {
    /// Instances live on the heap and are manipulated through references
    pub fn is_reference_type(&self) -> bool {
        match &self.kind {
            TypeKind::Object | TypeKind::String | TypeKind::SzArray(_) | TypeKind::Array { .. } => {
                true
            }
            TypeKind::GenericInstance { definition, .. } => definition.is_reference_type(),
            TypeKind::ValueType | TypeKind::Primitive(_) | TypeKind::GenericParameter { .. } => {
                false
            }
        }
    }
}

impl<'g> fmt::Debug for TypeData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeData({})", self.name)
    }
}

/// Flavor of a type-graph node
#[derive(Debug)]
pub enum TypeKind<'g> {
    /// Reference type with fields
    Object,

    /// Value (struct) type; instances embed their fields inline
    ValueType,

    /// Built-in primitive
    Primitive(PrimitiveKind),

    /// The string type; instances carry a length and UTF-16 code units
    String,

    /// Single-dimension zero-based array
    SzArray(TypeId<'g>),

    /// Multi-dimensional array (layout is instance-dependent and not
    /// supported by the layout engine)
    Array { element: TypeId<'g>, rank: u32 },

    /// Formal generic parameter, resolved through a
    /// [`GenericContext`]
    GenericParameter {
        index: u32,
        scope: GenericParameterScope,
    },

    /// Instantiation of a generic definition with concrete arguments
    GenericInstance {
        definition: TypeId<'g>,
        arguments: Vec<TypeId<'g>>,
    },
}

/// Whether a generic parameter indexes into the type or the method argument
/// list of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericParameterScope {
    Type,
    Method,
}

/// Built-in primitive types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Bool,
    Char,
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    R4,
    R8,
    NativeInt,
    NativeUInt,
}

/// One field of a type
pub struct FieldData<'g> {
    /// Field name, unique within its owner
    pub name: String,

    /// Type declaring the field
    pub owner: TypeId<'g>,

    /// Declared type of the field's value
    pub field_type: TypeId<'g>,
}

impl<'g> fmt::Debug for FieldData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldData({}.{})", self.owner.name, self.name)
    }
}
