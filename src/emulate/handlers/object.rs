use crate::bits::BitVector;
use crate::emulate::{
    DispatchResult, DispatchTable, ExecutionContext, Instruction, OpCode, OpCodeHandler, Operand,
    StackSlot, TypeHint,
};
use crate::types::{Assignable, PrimitiveKind, TypeId, TypeKind, ValueFactory};
use crate::util::Trilean;
use crate::{Error, InvalidProgramKind};

/// The stack-slot shape values of `ty` take
fn hint_for(ty: TypeId<'_>) -> TypeHint {
    match &ty.kind {
        TypeKind::Primitive(PrimitiveKind::R4) | TypeKind::Primitive(PrimitiveKind::R8) => {
            TypeHint::Float
        }
        TypeKind::Primitive(_) => TypeHint::Integer,
        TypeKind::ValueType => TypeHint::Struct,
        TypeKind::GenericInstance { definition, .. } if !definition.is_reference_type() => {
            TypeHint::Struct
        }
        _ => TypeHint::Ref,
    }
}

/// The type operand a handler requires
fn type_operand<'g>(instruction: &Instruction<'g>) -> Result<TypeId<'g>, Error> {
    match instruction.operand {
        Operand::Type(ty) => Ok(ty),
        _ => Err(InvalidProgramKind::MalformedOperand(instruction.opcode).into()),
    }
}

/// `newarr`: pop an element count, allocate a single-dimension array
pub struct NewArrHandler;

impl OpCodeHandler for NewArrHandler {
    fn opcodes(&self) -> Vec<OpCode> {
        vec![OpCode::NewArr]
    }

    fn dispatch<'g>(
        &self,
        context: &mut ExecutionContext<'g>,
        instruction: &Instruction<'g>,
    ) -> Result<DispatchResult, Error> {
        let element = type_operand(instruction)?;
        let factory = context.factory();
        let core = context.core();

        let count = context.pop()?;
        if count.type_hint != TypeHint::Integer {
            return Err(InvalidProgramKind::OperandTypeMismatch.into());
        }
        if count.is_negative().is_true() {
            return context.throw_new(core.exceptions.overflow);
        }

        match count.contents.as_slice().le_int() {
            // Without a concrete count there is nothing to allocate; the
            // result is a reference about which nothing is known
            None => context.push(StackSlot::unknown_reference(factory.pointer_size()))?,
            Some(length) => {
                match context
                    .heap_mut()
                    .allocate_sz_array(factory, element, length as i64, true)
                {
                    Ok(address) => {
                        context.push(StackSlot::reference(address, factory.pointer_size()))?
                    }
                    Err(error) => return context.convert_out_of_memory(error),
                }
            }
        }
        Ok(DispatchResult::Success)
    }
}

/// `ldlen`: pop an array reference, push its length as a native integer
pub struct LdLenHandler;

impl OpCodeHandler for LdLenHandler {
    fn opcodes(&self) -> Vec<OpCode> {
        vec![OpCode::LdLen]
    }

    fn dispatch<'g>(
        &self,
        context: &mut ExecutionContext<'g>,
        _instruction: &Instruction<'g>,
    ) -> Result<DispatchResult, Error> {
        let factory = context.factory();
        let core = context.core();

        let array = context.pop()?;
        if !array.is_reference() {
            return Err(InvalidProgramKind::NotAReference.into());
        }

        match array.is_null() {
            Trilean::True => return context.throw_new(core.exceptions.null_reference),
            Trilean::Unknown => {
                context.push(StackSlot::unknown_integer(factory.pointer_size()))?;
                return Ok(DispatchResult::Success);
            }
            Trilean::False => {}
        }

        match array.as_address() {
            None => context.push(StackSlot::unknown_integer(factory.pointer_size()))?,
            Some(address) => {
                let ty = context.heap().type_of(address).ok_or_else(|| {
                    Error::InvalidArgument(format!("{:#x} is not an object", address))
                })?;
                if !matches!(ty.kind, TypeKind::SzArray(_)) {
                    return Err(Error::InvalidOperation("length of a non-array object"));
                }

                let length = {
                    let chunk = context.heap().raw().chunk_slice(address)?;
                    chunk
                        .slice(
                            factory.array_length_offset() as usize,
                            factory.pointer_size() as usize,
                        )
                        .to_vector()
                };
                context.push(StackSlot::integer(length))?;
            }
        }
        Ok(DispatchResult::Success)
    }
}

/// `box`: wrap a value in a freshly allocated heap object
///
/// Boxing a reference type is the identity. The payload is copied mask and
/// all, so boxing a partially-known value produces a partially-known box.
pub struct BoxHandler;

impl OpCodeHandler for BoxHandler {
    fn opcodes(&self) -> Vec<OpCode> {
        vec![OpCode::Box]
    }

    fn dispatch<'g>(
        &self,
        context: &mut ExecutionContext<'g>,
        instruction: &Instruction<'g>,
    ) -> Result<DispatchResult, Error> {
        let ty = type_operand(instruction)?;
        let factory = context.factory();

        let value = context.pop()?;
        if ty.is_reference_type() {
            context.push(value)?;
            return Ok(DispatchResult::Success);
        }

        let size = factory.type_size(ty)?;
        if value.size() != size as usize {
            return Err(InvalidProgramKind::OperandTypeMismatch.into());
        }

        let address = match context.heap_mut().allocate_object(factory, ty, false) {
            Ok(address) => address,
            Err(error) => return context.convert_out_of_memory(error),
        };

        let chunk = context.heap_mut().raw_mut().chunk_span(address)?;
        let mut payload = chunk.slice(
            factory.object_header_size() as usize,
            size as usize,
        );
        payload.copy_from(&value.contents.as_slice())?;

        context.push(StackSlot::reference(address, factory.pointer_size()))?;
        Ok(DispatchResult::Success)
    }
}

/// What a cast-family opcode does once assignability is settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    /// `castclass`: push the reference on success, throw on failure
    CastClass,

    /// `isinst`: push the reference on success, push null on failure
    IsInst,

    /// `unbox`: push a managed pointer to the boxed payload
    Unbox,

    /// `unbox.any`: push a copy of the boxed payload
    UnboxAny,
}

/// Shared handler for the cast family
///
/// All four opcodes pop a reference, check the assignability of its runtime
/// type to the type operand, and differ only in what success and failure
/// look like. An unknown reference neither throws nor refines: the result is
/// an unknown value of the appropriate shape.
pub struct CastHandler {
    opcode: OpCode,
    kind: CastKind,
}

impl CastHandler {
    pub fn new(opcode: OpCode, kind: CastKind) -> Self {
        CastHandler { opcode, kind }
    }

    /// Result pushed when the input reference is not concrete enough to
    /// decide the cast
    fn unknown_result<'g>(
        &self,
        factory: &ValueFactory<'g>,
        target: TypeId<'g>,
    ) -> Result<StackSlot, Error> {
        match self.kind {
            CastKind::CastClass | CastKind::IsInst | CastKind::Unbox => {
                Ok(StackSlot::unknown_reference(factory.pointer_size()))
            }
            CastKind::UnboxAny => {
                if target.is_reference_type() {
                    Ok(StackSlot::unknown_reference(factory.pointer_size()))
                } else {
                    let size = factory.type_size(target)?;
                    Ok(StackSlot {
                        contents: BitVector::unknown(size as usize * 8),
                        type_hint: hint_for(target),
                    })
                }
            }
        }
    }

    /// The cast is known to succeed on the object at `address`
    fn succeed<'g>(
        &self,
        context: &mut ExecutionContext<'g>,
        address: u64,
        target: TypeId<'g>,
        original: StackSlot,
    ) -> Result<DispatchResult, Error> {
        let factory = context.factory();
        match self.kind {
            CastKind::CastClass | CastKind::IsInst => context.push(original)?,
            CastKind::Unbox => {
                let data_address = address + u64::from(factory.object_header_size());
                context.push(StackSlot::reference(data_address, factory.pointer_size()))?;
            }
            CastKind::UnboxAny => {
                if target.is_reference_type() {
                    context.push(original)?;
                } else {
                    let size = factory.type_size(target)?;
                    let chunk = context.heap().raw().chunk_slice(address)?;
                    let payload = chunk
                        .slice(factory.object_header_size() as usize, size as usize)
                        .to_vector();
                    context.push(StackSlot {
                        contents: payload,
                        type_hint: hint_for(target),
                    })?;
                }
            }
        }
        Ok(DispatchResult::Success)
    }
}

impl OpCodeHandler for CastHandler {
    fn opcodes(&self) -> Vec<OpCode> {
        vec![self.opcode]
    }

    fn dispatch<'g>(
        &self,
        context: &mut ExecutionContext<'g>,
        instruction: &Instruction<'g>,
    ) -> Result<DispatchResult, Error> {
        let target = type_operand(instruction)?;
        let factory = context.factory();
        let core = context.core();

        let slot = context.pop()?;
        if !slot.is_reference() {
            return Err(InvalidProgramKind::NotAReference.into());
        }

        match slot.is_null() {
            // Null casts to any reference type; there is no payload to unbox
            Trilean::True => match self.kind {
                CastKind::CastClass | CastKind::IsInst => {
                    context.push(slot)?;
                    Ok(DispatchResult::Success)
                }
                CastKind::Unbox | CastKind::UnboxAny => {
                    context.throw_new(core.exceptions.null_reference)
                }
            },
            _ => match slot.as_address() {
                None => {
                    let result = self.unknown_result(factory, target)?;
                    context.push(result)?;
                    Ok(DispatchResult::Success)
                }
                Some(address) => {
                    let runtime_type = context.heap().type_of(address).ok_or_else(|| {
                        Error::InvalidArgument(format!("{:#x} is not an object", address))
                    })?;
                    if runtime_type.is_assignable_to(&target) {
                        self.succeed(context, address, target, slot)
                    } else {
                        match self.kind {
                            CastKind::IsInst => {
                                context.push(StackSlot::null_reference(factory.pointer_size()))?;
                                Ok(DispatchResult::Success)
                            }
                            _ => {
                                let error = Error::InvalidCast {
                                    from: runtime_type.name.clone(),
                                    to: target.name.clone(),
                                };
                                context.convert_invalid_cast(error)
                            }
                        }
                    }
                }
            },
        }
    }
}

pub(super) fn register(table: &mut DispatchTable) -> Result<(), Error> {
    table.register(Box::new(NewArrHandler))?;
    table.register(Box::new(LdLenHandler))?;
    table.register(Box::new(BoxHandler))?;

    let casts = [
        (OpCode::CastClass, CastKind::CastClass),
        (OpCode::IsInst, CastKind::IsInst),
        (OpCode::Unbox, CastKind::Unbox),
        (OpCode::UnboxAny, CastKind::UnboxAny),
    ];
    for (opcode, kind) in casts {
        table.register(Box::new(CastHandler::new(opcode, kind)))?;
    }
    Ok(())
}
