use crate::emulate::{
    DispatchResult, DispatchTable, ExecutionContext, Instruction, OpCode, OpCodeHandler, Operand,
    StackSlot,
};
use crate::{Error, InvalidProgramKind};

/// `nop`: does exactly nothing
pub struct NopHandler;

impl OpCodeHandler for NopHandler {
    fn opcodes(&self) -> Vec<OpCode> {
        vec![OpCode::Nop]
    }

    fn dispatch<'g>(
        &self,
        _context: &mut ExecutionContext<'g>,
        _instruction: &Instruction<'g>,
    ) -> Result<DispatchResult, Error> {
        Ok(DispatchResult::Success)
    }
}

/// `pop`: discard the top of the stack
pub struct PopHandler;

impl OpCodeHandler for PopHandler {
    fn opcodes(&self) -> Vec<OpCode> {
        vec![OpCode::Pop]
    }

    fn dispatch<'g>(
        &self,
        context: &mut ExecutionContext<'g>,
        _instruction: &Instruction<'g>,
    ) -> Result<DispatchResult, Error> {
        context.pop()?;
        Ok(DispatchResult::Success)
    }
}

/// `dup`: duplicate the top of the stack
pub struct DupHandler;

impl OpCodeHandler for DupHandler {
    fn opcodes(&self) -> Vec<OpCode> {
        vec![OpCode::Dup]
    }

    fn dispatch<'g>(
        &self,
        context: &mut ExecutionContext<'g>,
        _instruction: &Instruction<'g>,
    ) -> Result<DispatchResult, Error> {
        let slot = context.pop()?;
        context.push(slot.clone())?;
        context.push(slot)?;
        Ok(DispatchResult::Success)
    }
}

/// `ret`: leave the current frame
pub struct RetHandler;

impl OpCodeHandler for RetHandler {
    fn opcodes(&self) -> Vec<OpCode> {
        vec![OpCode::Ret]
    }

    fn dispatch<'g>(
        &self,
        _context: &mut ExecutionContext<'g>,
        _instruction: &Instruction<'g>,
    ) -> Result<DispatchResult, Error> {
        Ok(DispatchResult::Return)
    }
}

/// Constant loads: `ldc.*`, `ldnull` and `ldstr`
///
/// String literals are materialized on the managed heap at load time, so the
/// pushed slot is an ordinary known reference.
pub struct ConstantHandler;

impl OpCodeHandler for ConstantHandler {
    fn opcodes(&self) -> Vec<OpCode> {
        vec![
            OpCode::LdcI4,
            OpCode::LdcI8,
            OpCode::LdcR4,
            OpCode::LdcR8,
            OpCode::LdNull,
            OpCode::LdStr,
        ]
    }

    fn dispatch<'g>(
        &self,
        context: &mut ExecutionContext<'g>,
        instruction: &Instruction<'g>,
    ) -> Result<DispatchResult, Error> {
        let factory = context.factory();
        let slot = match (instruction.opcode, &instruction.operand) {
            (OpCode::LdcI4, Operand::I32(value)) => StackSlot::from_i32(*value),
            (OpCode::LdcI8, Operand::I64(value)) => StackSlot::from_i64(*value),
            (OpCode::LdcR4, Operand::F32(value)) => StackSlot::from_f32(*value),
            (OpCode::LdcR8, Operand::F64(value)) => StackSlot::from_f64(*value),
            (OpCode::LdNull, _) => StackSlot::null_reference(factory.pointer_size()),
            (OpCode::LdStr, Operand::Str(text)) => {
                match context.heap_mut().allocate_string(factory, text) {
                    Ok(address) => StackSlot::reference(address, factory.pointer_size()),
                    Err(error) => return context.convert_out_of_memory(error),
                }
            }
            _ => return Err(InvalidProgramKind::MalformedOperand(instruction.opcode).into()),
        };

        context.push(slot)?;
        Ok(DispatchResult::Success)
    }
}

/// Local variable access: `ldloc` and `stloc`
pub struct LocalHandler;

impl OpCodeHandler for LocalHandler {
    fn opcodes(&self) -> Vec<OpCode> {
        vec![OpCode::LdLoc, OpCode::StLoc]
    }

    fn dispatch<'g>(
        &self,
        context: &mut ExecutionContext<'g>,
        instruction: &Instruction<'g>,
    ) -> Result<DispatchResult, Error> {
        let Operand::Local(index) = instruction.operand else {
            return Err(InvalidProgramKind::MalformedOperand(instruction.opcode).into());
        };

        match instruction.opcode {
            OpCode::LdLoc => {
                let slot = context.local(index)?;
                context.push(slot)?;
            }
            OpCode::StLoc => {
                let slot = context.pop()?;
                context.set_local(index, slot)?;
            }
            _ => return Err(InvalidProgramKind::MalformedOperand(instruction.opcode).into()),
        }
        Ok(DispatchResult::Success)
    }
}

pub(super) fn register(table: &mut DispatchTable) -> Result<(), Error> {
    table.register(Box::new(NopHandler))?;
    table.register(Box::new(PopHandler))?;
    table.register(Box::new(DupHandler))?;
    table.register(Box::new(RetHandler))?;
    table.register(Box::new(ConstantHandler))?;
    table.register(Box::new(LocalHandler))?;
    Ok(())
}
