use crate::bits::{BitVector, Signedness};
use crate::emulate::{
    DispatchResult, DispatchTable, ExecutionContext, Instruction, OpCode, OpCodeHandler, StackSlot,
    TypeHint,
};
use crate::types::ValueFactory;
use crate::{Error, InvalidProgramKind};

/// The five binary arithmetic operations
#[derive(Debug, Clone, Copy)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Handler for one binary arithmetic opcode
///
/// Pops two slots, checks that their type hints agree (both integer or both
/// float), performs the operation in place on the first operand's bit vector
/// and pushes it back. Overflow-checked variants test the three-valued
/// overflow flag and throw only when it is definitely set.
pub struct BinaryOpHandler {
    opcode: OpCode,
    op: BinaryOp,
    signedness: Signedness,
    checked: bool,
}

impl BinaryOpHandler {
    pub fn new(opcode: OpCode, op: BinaryOp, signedness: Signedness, checked: bool) -> Self {
        BinaryOpHandler {
            opcode,
            op,
            signedness,
            checked,
        }
    }
}

impl OpCodeHandler for BinaryOpHandler {
    fn opcodes(&self) -> Vec<OpCode> {
        vec![self.opcode]
    }

    fn dispatch<'g>(
        &self,
        context: &mut ExecutionContext<'g>,
        _instruction: &Instruction<'g>,
    ) -> Result<DispatchResult, Error> {
        let core = context.core();
        let rhs = context.pop()?;
        let mut lhs = context.pop()?;

        if lhs.type_hint != rhs.type_hint {
            return Err(InvalidProgramKind::OperandTypeMismatch.into());
        }

        match lhs.type_hint {
            TypeHint::Float => {
                if self.checked {
                    return Err(Error::InvalidOperation(
                        "overflow-checked floating-point arithmetic",
                    ));
                }
                let rhs_slice = rhs.contents.as_slice();
                let mut span = lhs.contents.as_span();
                match self.op {
                    BinaryOp::Add => span.float_add(&rhs_slice)?,
                    BinaryOp::Sub => span.float_sub(&rhs_slice)?,
                    BinaryOp::Mul => span.float_mul(&rhs_slice)?,
                    BinaryOp::Div => span.float_div(&rhs_slice)?,
                    BinaryOp::Rem => {
                        return Err(Error::InvalidOperation("floating-point remainder"))
                    }
                }
            }
            TypeHint::Integer => {
                // Division by a definite zero is the emulated program's
                // problem, not ours
                if matches!(self.op, BinaryOp::Div | BinaryOp::Rem) && rhs.is_zero().is_true() {
                    return context.throw_new(core.exceptions.divide_by_zero);
                }

                let rhs_slice = rhs.contents.as_slice();
                if self.checked {
                    let overflow = {
                        let mut span = lhs.contents.as_span();
                        match self.op {
                            BinaryOp::Add => {
                                span.integer_add_checked(&rhs_slice, self.signedness)?
                            }
                            BinaryOp::Sub => {
                                span.integer_sub_checked(&rhs_slice, self.signedness)?
                            }
                            BinaryOp::Mul => {
                                span.integer_mul_checked(&rhs_slice, self.signedness)?
                            }
                            BinaryOp::Div | BinaryOp::Rem => {
                                return Err(Error::InvalidOperation(
                                    "overflow-checked division",
                                ))
                            }
                        }
                    };
                    if overflow.is_true() {
                        return context.throw_new(core.exceptions.overflow);
                    }
                } else {
                    let mut span = lhs.contents.as_span();
                    match self.op {
                        BinaryOp::Add => span.integer_add(&rhs_slice)?,
                        BinaryOp::Sub => span.integer_sub(&rhs_slice)?,
                        BinaryOp::Mul => span.integer_mul(&rhs_slice)?,
                        BinaryOp::Div => span.integer_div(&rhs_slice, self.signedness)?,
                        BinaryOp::Rem => span.integer_rem(&rhs_slice, self.signedness)?,
                    }
                }
            }
            TypeHint::Ref | TypeHint::Struct => {
                return Err(InvalidProgramKind::OperandTypeMismatch.into());
            }
        }

        context.push(lhs)?;
        Ok(DispatchResult::Success)
    }
}

/// Target shape of a conversion opcode
#[derive(Debug, Clone, Copy)]
pub enum ConvTarget {
    I1,
    I2,
    I4,
    I8,
    U1,
    U2,
    U4,
    U8,
    NativeI,
    NativeU,
    R4,
    R8,
}

/// Handler for one `conv.*` opcode
///
/// Integers convert by truncation or extension, floats by truncation toward
/// zero or width change. A reference converts only to the native-integer
/// shapes (yielding a known zero when it is known null, otherwise fully
/// unknown bits); any narrower target is an invalid cast and throws in the
/// emulated program.
pub struct ConvertHandler {
    opcode: OpCode,
    target: ConvTarget,
}

impl ConvTarget {
    fn describe(self) -> &'static str {
        match self {
            ConvTarget::I1 => "int8",
            ConvTarget::I2 => "int16",
            ConvTarget::I4 => "int32",
            ConvTarget::I8 => "int64",
            ConvTarget::U1 => "uint8",
            ConvTarget::U2 => "uint16",
            ConvTarget::U4 => "uint32",
            ConvTarget::U8 => "uint64",
            ConvTarget::NativeI => "native int",
            ConvTarget::NativeU => "native uint",
            ConvTarget::R4 => "float32",
            ConvTarget::R8 => "float64",
        }
    }
}

impl ConvertHandler {
    pub fn new(opcode: OpCode, target: ConvTarget) -> Self {
        ConvertHandler { opcode, target }
    }

    /// Shape of the slot this conversion pushes when the input is unknown
    fn unknown_result(&self, factory: &ValueFactory<'_>) -> StackSlot {
        match self.target {
            ConvTarget::I1
            | ConvTarget::I2
            | ConvTarget::I4
            | ConvTarget::U1
            | ConvTarget::U2
            | ConvTarget::U4 => StackSlot::unknown_integer(4),
            ConvTarget::I8 | ConvTarget::U8 => StackSlot::unknown_integer(8),
            ConvTarget::NativeI | ConvTarget::NativeU => {
                StackSlot::unknown_integer(factory.pointer_size())
            }
            ConvTarget::R4 => StackSlot::unknown_float(4),
            ConvTarget::R8 => StackSlot::unknown_float(8),
        }
    }

    /// Convert a fully-known signed integer value
    fn from_integer(&self, factory: &ValueFactory<'_>, value: i128) -> StackSlot {
        let pointer_bits = factory.pointer_size() as usize * 8;
        match self.target {
            ConvTarget::I1 => StackSlot::from_i32(value as i8 as i32),
            ConvTarget::I2 => StackSlot::from_i32(value as i16 as i32),
            ConvTarget::I4 => StackSlot::from_i32(value as i32),
            ConvTarget::U1 => StackSlot::from_i32(value as u8 as i32),
            ConvTarget::U2 => StackSlot::from_i32(value as u16 as i32),
            ConvTarget::U4 => StackSlot::from_i32(value as u32 as i32),
            ConvTarget::I8 => StackSlot::from_i64(value as i64),
            ConvTarget::U8 => StackSlot::from_i64(value as u64 as i64),
            ConvTarget::NativeI | ConvTarget::NativeU => {
                StackSlot::integer(BitVector::from_uint(value as u64, pointer_bits))
            }
            ConvTarget::R4 => StackSlot::from_f32(value as f32),
            ConvTarget::R8 => StackSlot::from_f64(value as f64),
        }
    }

    /// Convert a fully-known floating-point value (truncating toward zero
    /// for integer targets)
    fn from_float(&self, factory: &ValueFactory<'_>, value: f64) -> StackSlot {
        let pointer_bits = factory.pointer_size() as usize * 8;
        match self.target {
            ConvTarget::I1 => StackSlot::from_i32(value as i8 as i32),
            ConvTarget::I2 => StackSlot::from_i32(value as i16 as i32),
            ConvTarget::I4 => StackSlot::from_i32(value as i32),
            ConvTarget::U1 => StackSlot::from_i32(value as u8 as i32),
            ConvTarget::U2 => StackSlot::from_i32(value as u16 as i32),
            ConvTarget::U4 => StackSlot::from_i32(value as u32 as i32),
            ConvTarget::I8 => StackSlot::from_i64(value as i64),
            ConvTarget::U8 => StackSlot::from_i64(value as u64 as i64),
            ConvTarget::NativeI | ConvTarget::NativeU => {
                StackSlot::integer(BitVector::from_uint(value as i64 as u64, pointer_bits))
            }
            ConvTarget::R4 => StackSlot::from_f32(value as f32),
            ConvTarget::R8 => StackSlot::from_f64(value),
        }
    }
}

impl OpCodeHandler for ConvertHandler {
    fn opcodes(&self) -> Vec<OpCode> {
        vec![self.opcode]
    }

    fn dispatch<'g>(
        &self,
        context: &mut ExecutionContext<'g>,
        _instruction: &Instruction<'g>,
    ) -> Result<DispatchResult, Error> {
        let factory = context.factory();
        let slot = context.pop()?;

        let result = match slot.type_hint {
            TypeHint::Ref => match self.target {
                ConvTarget::NativeI | ConvTarget::NativeU => {
                    let contents = slot.reinterpret_reference(factory.pointer_size())?;
                    StackSlot::integer(contents)
                }
                _ => {
                    let error = Error::InvalidCast {
                        from: String::from("object reference"),
                        to: String::from(self.target.describe()),
                    };
                    return context.convert_invalid_cast(error);
                }
            },
            TypeHint::Integer => match slot.contents.as_slice().le_int() {
                Some(value) => self.from_integer(factory, value),
                None => self.unknown_result(factory),
            },
            TypeHint::Float => match slot.float_value() {
                Some(value) => self.from_float(factory, value),
                None => self.unknown_result(factory),
            },
            TypeHint::Struct => return Err(InvalidProgramKind::OperandTypeMismatch.into()),
        };

        context.push(result)?;
        Ok(DispatchResult::Success)
    }
}

pub(super) fn register(table: &mut DispatchTable) -> Result<(), Error> {
    let binary_ops = [
        (OpCode::Add, BinaryOp::Add, Signedness::Signed, false),
        (OpCode::Sub, BinaryOp::Sub, Signedness::Signed, false),
        (OpCode::Mul, BinaryOp::Mul, Signedness::Signed, false),
        (OpCode::Div, BinaryOp::Div, Signedness::Signed, false),
        (OpCode::DivUn, BinaryOp::Div, Signedness::Unsigned, false),
        (OpCode::Rem, BinaryOp::Rem, Signedness::Signed, false),
        (OpCode::RemUn, BinaryOp::Rem, Signedness::Unsigned, false),
        (OpCode::AddOvf, BinaryOp::Add, Signedness::Signed, true),
        (OpCode::AddOvfUn, BinaryOp::Add, Signedness::Unsigned, true),
        (OpCode::SubOvf, BinaryOp::Sub, Signedness::Signed, true),
        (OpCode::SubOvfUn, BinaryOp::Sub, Signedness::Unsigned, true),
        (OpCode::MulOvf, BinaryOp::Mul, Signedness::Signed, true),
        (OpCode::MulOvfUn, BinaryOp::Mul, Signedness::Unsigned, true),
    ];
    for (opcode, op, signedness, checked) in binary_ops {
        table.register(Box::new(BinaryOpHandler::new(opcode, op, signedness, checked)))?;
    }

    let conversions = [
        (OpCode::ConvI1, ConvTarget::I1),
        (OpCode::ConvI2, ConvTarget::I2),
        (OpCode::ConvI4, ConvTarget::I4),
        (OpCode::ConvI8, ConvTarget::I8),
        (OpCode::ConvU1, ConvTarget::U1),
        (OpCode::ConvU2, ConvTarget::U2),
        (OpCode::ConvU4, ConvTarget::U4),
        (OpCode::ConvU8, ConvTarget::U8),
        (OpCode::ConvI, ConvTarget::NativeI),
        (OpCode::ConvU, ConvTarget::NativeU),
        (OpCode::ConvR4, ConvTarget::R4),
        (OpCode::ConvR8, ConvTarget::R8),
    ];
    for (opcode, target) in conversions {
        table.register(Box::new(ConvertHandler::new(opcode, target)))?;
    }

    Ok(())
}
