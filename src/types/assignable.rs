use super::{TypeId, TypeKind};
use std::collections::HashSet;

/// Subtyping relationship between types
pub trait Assignable {
    /// Can a value of the first type be treated as one of the second?
    fn is_assignable_to(&self, target: &Self) -> bool;
}

/// Nominal assignability follows base-type and interface edges; array and
/// generic-instance cases are decided structurally first.
impl<'g> Assignable for TypeId<'g> {
    fn is_assignable_to(&self, target: &TypeId<'g>) -> bool {
        if self == target {
            return true;
        }

        match (&self.kind, &target.kind) {
            // Arrays sit under the object root regardless of element type
            (TypeKind::SzArray(_) | TypeKind::Array { .. }, _) if is_array_supertype(target) => {
                return true;
            }

            // Array covariance: allowed only over reference elements
            (TypeKind::SzArray(elem1), TypeKind::SzArray(elem2)) => {
                return elem1.is_reference_type()
                    && elem2.is_reference_type()
                    && elem1.is_assignable_to(elem2);
            }
            (
                TypeKind::Array {
                    element: elem1,
                    rank: rank1,
                },
                TypeKind::Array {
                    element: elem2,
                    rank: rank2,
                },
            ) => {
                return rank1 == rank2
                    && elem1.is_reference_type()
                    && elem2.is_reference_type()
                    && elem1.is_assignable_to(elem2);
            }

            // Generic instances are invariant: identity was already tested,
            // so only the base chain below can make this assignable
            _ => {}
        }

        // Walk base types and interfaces
        let mut to_visit: Vec<TypeId<'g>> = vec![*self];
        let mut dont_revisit: HashSet<TypeId<'g>> = HashSet::new();
        dont_revisit.insert(*self);

        while let Some(current) = to_visit.pop() {
            if current == *target {
                return true;
            }
            if let Some(base) = current.base {
                if dont_revisit.insert(base) {
                    to_visit.push(base);
                }
            }
            for i in 0..current.interfaces.len() {
                if let Some(interface) = current.interfaces.get_copy(i) {
                    if dont_revisit.insert(interface) {
                        to_visit.push(interface);
                    }
                }
            }
        }

        false
    }
}

/// The small, fixed set of nominal supertypes every array has
fn is_array_supertype(target: &TypeId<'_>) -> bool {
    target.name == "System.Object" || target.name == "System.Array"
}
