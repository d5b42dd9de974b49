use crate::emulate::{
    DispatchResult, DispatchTable, ExecutionContext, Instruction, OpCode, OpCodeHandler, Operand,
};
use crate::util::Trilean;
use crate::{Error, InvalidProgramKind};

/// How a branch opcode consumes its condition
#[derive(Debug, Clone, Copy)]
pub enum BranchKind {
    /// Branch unconditionally, popping nothing
    Always,

    /// Pop a slot and branch when its value is definitely non-zero
    WhenTrue,

    /// Pop a slot and branch when its value is definitely zero
    WhenFalse,
}

/// Handler for one branch opcode
///
/// The condition is three-valued. A decided condition yields
/// [`DispatchResult::Branch`] or [`DispatchResult::Success`]; an undecidable
/// one yields [`DispatchResult::Fork`], leaving the both-successors decision
/// to the step loop's policy (or to a caller forking contexts by hand).
pub struct BranchHandler {
    opcode: OpCode,
    kind: BranchKind,
}

impl BranchHandler {
    pub fn new(opcode: OpCode, kind: BranchKind) -> Self {
        BranchHandler { opcode, kind }
    }
}

impl OpCodeHandler for BranchHandler {
    fn opcodes(&self) -> Vec<OpCode> {
        vec![self.opcode]
    }

    fn dispatch<'g>(
        &self,
        context: &mut ExecutionContext<'g>,
        instruction: &Instruction<'g>,
    ) -> Result<DispatchResult, Error> {
        let Operand::Target(target) = instruction.operand else {
            return Err(InvalidProgramKind::MalformedOperand(instruction.opcode).into());
        };

        let condition = match self.kind {
            BranchKind::Always => Trilean::True,
            BranchKind::WhenTrue => context.pop()?.is_nonzero(),
            BranchKind::WhenFalse => context.pop()?.is_zero(),
        };

        Ok(match condition {
            Trilean::True => DispatchResult::Branch(target),
            Trilean::False => DispatchResult::Success,
            Trilean::Unknown => DispatchResult::Fork { target },
        })
    }
}

pub(super) fn register(table: &mut DispatchTable) -> Result<(), Error> {
    let branches = [
        (OpCode::Br, BranchKind::Always),
        (OpCode::BrTrue, BranchKind::WhenTrue),
        (OpCode::BrFalse, BranchKind::WhenFalse),
    ];
    for (opcode, kind) in branches {
        table.register(Box::new(BranchHandler::new(opcode, kind)))?;
    }
    Ok(())
}
