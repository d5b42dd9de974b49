use super::{ExecutionContext, Instruction, OpCode};
use crate::{ConfigurationError, Error};
use std::collections::HashMap;

/// Outcome of executing one instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult {
    /// Fall through to the next instruction
    Success,

    /// Transfer control to the given instruction index
    Branch(usize),

    /// The branch condition could not be decided from the known bits: both
    /// the target and the fall-through successor are possible
    ///
    /// Callers driving [`super::Machine::step`] directly can fork their own
    /// contexts here; [`super::Machine::run`] resolves it with the
    /// configured [`super::UnknownBranchPolicy`].
    Fork { target: usize },

    /// The emulated program threw: the address is a freshly allocated
    /// exception object
    Throw(u64),

    /// Leave the current frame
    Return,
}

/// Behavior of a family of opcodes
///
/// Handlers are stateless: everything they touch lives in the execution
/// context or in the instruction's operand.
pub trait OpCodeHandler {
    /// The opcodes this handler serves; must be non-empty
    fn opcodes(&self) -> Vec<OpCode>;

    /// Execute `instruction` against `context`
    fn dispatch<'g>(
        &self,
        context: &mut ExecutionContext<'g>,
        instruction: &Instruction<'g>,
    ) -> Result<DispatchResult, Error>;
}

/// Opcode-to-handler mapping with O(1) lookup
///
/// Handlers are registered declaratively: each advertises its opcode set, and
/// a second claim on an opcode is a configuration error at build time, never
/// a silent override.
#[derive(Default)]
pub struct DispatchTable {
    handlers: Vec<Box<dyn OpCodeHandler>>,
    by_opcode: HashMap<OpCode, usize>,
}

impl DispatchTable {
    /// New table with no handlers
    pub fn new() -> DispatchTable {
        DispatchTable::default()
    }

    /// Table with the full default handler set registered
    pub fn with_defaults() -> Result<DispatchTable, Error> {
        let mut table = DispatchTable::new();
        super::handlers::register_defaults(&mut table)?;
        Ok(table)
    }

    /// Register a handler for every opcode it advertises
    pub fn register(&mut self, handler: Box<dyn OpCodeHandler>) -> Result<(), Error> {
        let opcodes = handler.opcodes();
        if opcodes.is_empty() {
            return Err(ConfigurationError::NoOpCodesAdvertised.into());
        }
        for opcode in &opcodes {
            if self.by_opcode.contains_key(opcode) {
                return Err(ConfigurationError::DuplicateOpCode(*opcode).into());
            }
        }

        let index = self.handlers.len();
        for opcode in opcodes {
            // A handler advertising an opcode twice collides with itself
            if self.by_opcode.insert(opcode, index).is_some() {
                return Err(ConfigurationError::DuplicateOpCode(opcode).into());
            }
        }
        self.handlers.push(handler);
        Ok(())
    }

    /// The handler serving `opcode`
    pub fn handler(&self, opcode: OpCode) -> Result<&dyn OpCodeHandler, Error> {
        match self.by_opcode.get(&opcode) {
            Some(&index) => Ok(self.handlers[index].as_ref()),
            None => Err(ConfigurationError::MissingHandler(opcode).into()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct FixedHandler(Vec<OpCode>);

    impl OpCodeHandler for FixedHandler {
        fn opcodes(&self) -> Vec<OpCode> {
            self.0.clone()
        }

        fn dispatch<'g>(
            &self,
            _context: &mut ExecutionContext<'g>,
            _instruction: &Instruction<'g>,
        ) -> Result<DispatchResult, Error> {
            Ok(DispatchResult::Success)
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut table = DispatchTable::new();
        table
            .register(Box::new(FixedHandler(vec![OpCode::Nop, OpCode::Pop])))
            .unwrap();

        let error = table
            .register(Box::new(FixedHandler(vec![OpCode::Pop])))
            .unwrap_err();
        assert!(matches!(
            error,
            Error::Configuration(ConfigurationError::DuplicateOpCode(OpCode::Pop))
        ));
    }

    #[test]
    fn empty_advertisement_is_rejected() {
        let mut table = DispatchTable::new();
        let error = table.register(Box::new(FixedHandler(vec![]))).unwrap_err();
        assert!(matches!(
            error,
            Error::Configuration(ConfigurationError::NoOpCodesAdvertised)
        ));
    }

    #[test]
    fn missing_handler_is_reported() {
        let table = DispatchTable::new();
        assert!(matches!(
            table.handler(OpCode::Add),
            Err(Error::Configuration(ConfigurationError::MissingHandler(
                OpCode::Add
            )))
        ));
    }

    #[test]
    fn the_default_table_covers_every_opcode() {
        let table = DispatchTable::with_defaults().unwrap();
        for opcode in super::super::handlers::ALL_OPCODES {
            assert!(
                table.handler(*opcode).is_ok(),
                "no handler registered for {:?}",
                opcode
            );
        }
    }
}
