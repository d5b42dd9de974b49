//! The default opcode handler set
//!
//! Handlers are small, stateless behavior objects registered declaratively:
//! each advertises its opcode set and the table rejects overlaps. Families
//! that a class hierarchy would model elsewhere are expressed here as
//! composition - one [`BinaryOpHandler`] type covers all thirteen arithmetic
//! opcodes, parameterized by operation, signedness and overflow checking.

mod arithmetic;
mod branch;
mod object;
mod prefix;
mod stack;

pub use arithmetic::*;
pub use branch::*;
pub use object::*;
pub use prefix::*;
pub use stack::*;

use super::{DispatchTable, OpCode};
use crate::Error;

/// Register the complete default handler set
pub fn register_defaults(table: &mut DispatchTable) -> Result<(), Error> {
    stack::register(table)?;
    arithmetic::register(table)?;
    branch::register(table)?;
    object::register(table)?;
    prefix::register(table)?;
    Ok(())
}

/// Every opcode of the instruction set; the default table covers all of them
pub(crate) const ALL_OPCODES: &[OpCode] = &[
    OpCode::Nop,
    OpCode::Pop,
    OpCode::Dup,
    OpCode::Ret,
    OpCode::LdcI4,
    OpCode::LdcI8,
    OpCode::LdcR4,
    OpCode::LdcR8,
    OpCode::LdNull,
    OpCode::LdStr,
    OpCode::LdLoc,
    OpCode::StLoc,
    OpCode::Add,
    OpCode::Sub,
    OpCode::Mul,
    OpCode::Div,
    OpCode::DivUn,
    OpCode::Rem,
    OpCode::RemUn,
    OpCode::AddOvf,
    OpCode::AddOvfUn,
    OpCode::SubOvf,
    OpCode::SubOvfUn,
    OpCode::MulOvf,
    OpCode::MulOvfUn,
    OpCode::Br,
    OpCode::BrTrue,
    OpCode::BrFalse,
    OpCode::ConvI1,
    OpCode::ConvI2,
    OpCode::ConvI4,
    OpCode::ConvI8,
    OpCode::ConvU1,
    OpCode::ConvU2,
    OpCode::ConvU4,
    OpCode::ConvU8,
    OpCode::ConvI,
    OpCode::ConvU,
    OpCode::ConvR4,
    OpCode::ConvR8,
    OpCode::NewArr,
    OpCode::LdLen,
    OpCode::Box,
    OpCode::Unbox,
    OpCode::UnboxAny,
    OpCode::CastClass,
    OpCode::IsInst,
    OpCode::Unaligned,
    OpCode::Volatile,
    OpCode::Readonly,
];
