//! Well-known types every emulated program assumes to exist

use super::{PrimitiveKind, TypeData, TypeGraph, TypeId, TypeKind};
use elsa::FrozenVec;

/// Index of the well-known core types
///
/// Handlers reach for these constantly (boxing a primitive, allocating an
/// exception to throw, looking at the string type), so they are registered up
/// front and handed around as one copyable bundle.
#[derive(Clone, Copy)]
pub struct CoreTypes<'g> {
    pub object: TypeId<'g>,
    pub string: TypeId<'g>,

    pub boolean: TypeId<'g>,
    pub char: TypeId<'g>,
    pub int8: TypeId<'g>,
    pub uint8: TypeId<'g>,
    pub int16: TypeId<'g>,
    pub uint16: TypeId<'g>,
    pub int32: TypeId<'g>,
    pub uint32: TypeId<'g>,
    pub int64: TypeId<'g>,
    pub uint64: TypeId<'g>,
    pub float32: TypeId<'g>,
    pub float64: TypeId<'g>,
    pub native_int: TypeId<'g>,
    pub native_uint: TypeId<'g>,

    pub exceptions: CoreExceptions<'g>,
}

/// Exception types the emulator itself may need to throw
#[derive(Clone, Copy)]
pub struct CoreExceptions<'g> {
    pub exception: TypeId<'g>,
    pub invalid_cast: TypeId<'g>,
    pub null_reference: TypeId<'g>,
    pub overflow: TypeId<'g>,
    pub divide_by_zero: TypeId<'g>,
    pub out_of_memory: TypeId<'g>,
}

impl<'g> CoreTypes<'g> {
    pub fn add_to_graph(graph: &'g TypeGraph<'g>) -> CoreTypes<'g> {
        let object = add(graph, "System.Object", None, TypeKind::Object);
        let string = add(graph, "System.String", Some(object), TypeKind::String);

        let primitive = |name: &str, kind: PrimitiveKind| {
            add(graph, name, Some(object), TypeKind::Primitive(kind))
        };

        let exception = add(graph, "System.Exception", Some(object), TypeKind::Object);
        let derived_exception =
            |name: &str| add(graph, name, Some(exception), TypeKind::Object);

        CoreTypes {
            object,
            string,
            boolean: primitive("System.Boolean", PrimitiveKind::Bool),
            char: primitive("System.Char", PrimitiveKind::Char),
            int8: primitive("System.SByte", PrimitiveKind::I1),
            uint8: primitive("System.Byte", PrimitiveKind::U1),
            int16: primitive("System.Int16", PrimitiveKind::I2),
            uint16: primitive("System.UInt16", PrimitiveKind::U2),
            int32: primitive("System.Int32", PrimitiveKind::I4),
            uint32: primitive("System.UInt32", PrimitiveKind::U4),
            int64: primitive("System.Int64", PrimitiveKind::I8),
            uint64: primitive("System.UInt64", PrimitiveKind::U8),
            float32: primitive("System.Single", PrimitiveKind::R4),
            float64: primitive("System.Double", PrimitiveKind::R8),
            native_int: primitive("System.IntPtr", PrimitiveKind::NativeInt),
            native_uint: primitive("System.UIntPtr", PrimitiveKind::NativeUInt),
            exceptions: CoreExceptions {
                exception,
                invalid_cast: derived_exception("System.InvalidCastException"),
                null_reference: derived_exception("System.NullReferenceException"),
                overflow: derived_exception("System.OverflowException"),
                divide_by_zero: derived_exception("System.DivideByZeroException"),
                out_of_memory: derived_exception("System.OutOfMemoryException"),
            },
        }
    }
}

fn add<'g>(
    graph: &'g TypeGraph<'g>,
    name: &str,
    base: Option<TypeId<'g>>,
    kind: TypeKind<'g>,
) -> TypeId<'g> {
    graph.add_type(TypeData {
        name: String::from(name),
        base,
        kind,
        fields: FrozenVec::new(),
        interfaces: FrozenVec::new(),
    })
}
