use crate::emulate::{
    DispatchResult, DispatchTable, ExecutionContext, Instruction, OpCode, OpCodeHandler,
};
use crate::Error;

/// Pointer prefixes: `unaligned.`, `volatile.` and `readonly.`
///
/// The virtual memory model has no alignment sensitivity, no concurrent
/// observers and no access checks, so these prefixes carry no semantics
/// here: they succeed without touching the stack. A future memory model may
/// attach meaning to them.
pub struct PrefixHandler;

impl OpCodeHandler for PrefixHandler {
    fn opcodes(&self) -> Vec<OpCode> {
        vec![OpCode::Unaligned, OpCode::Volatile, OpCode::Readonly]
    }

    fn dispatch<'g>(
        &self,
        _context: &mut ExecutionContext<'g>,
        _instruction: &Instruction<'g>,
    ) -> Result<DispatchResult, Error> {
        Ok(DispatchResult::Success)
    }
}

pub(super) fn register(table: &mut DispatchTable) -> Result<(), Error> {
    table.register(Box::new(PrefixHandler))
}
