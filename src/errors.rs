use crate::emulate::OpCode;
use std::fmt;

/// Host-level failures surfaced by this crate.
///
/// These describe problems in the *harness* - malformed input bytecode, bad
/// configuration, resources the virtual machine state cannot provide. They
/// are distinct from exceptions of the emulated program itself, which are
/// reified as [`crate::emulate::DispatchResult::Throw`] carrying a reference
/// to a heap-allocated exception object.
#[derive(Debug)]
pub enum Error {
    /// The operation is not defined for the given inputs (eg. asking for the
    /// static size of an array type, or floating-point arithmetic at a width
    /// other than 32 or 64 bits).
    InvalidOperation(&'static str),

    /// An argument was out of the operation's domain (eg. a negative array
    /// length, or freeing an address that is not the base of a live chunk).
    InvalidArgument(String),

    /// The heap has no free region large enough for the allocation.
    OutOfMemory { requested: u32 },

    /// A read or write fell outside every live chunk.
    AccessViolation { address: u64, length: usize },

    /// A reference was reinterpreted as a narrower type than its pointer
    /// width allows. Cast and conversion handlers convert this into an
    /// emulated `InvalidCastException` throw.
    InvalidCast { from: String, to: String },

    /// The input bytecode is malformed.
    InvalidProgram(InvalidProgramKind),

    /// The machine was assembled inconsistently.
    Configuration(ConfigurationError),
}

/// Ways the input bytecode can be malformed, detected at dispatch time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidProgramKind {
    /// An instruction needed more operands than the evaluation stack holds
    EmptyStack,

    /// A binary operation was applied to slots of incompatible type hints
    OperandTypeMismatch,

    /// An instruction is missing its immediate operand, or carries one of the
    /// wrong shape
    MalformedOperand(OpCode),

    /// A branch target or the instruction pointer fell outside the method body
    InstructionOutOfRange(usize),

    /// A local-variable index exceeded the frame's local count
    InvalidLocalIndex(u16),

    /// A local variable was loaded before anything was stored to it
    UninitializedLocal(u16),

    /// A reference-typed operand was required but not found
    NotAReference,
}

/// Ways the dispatch table can be assembled inconsistently
#[derive(Debug)]
pub enum ConfigurationError {
    /// Two handlers both claim the same opcode
    DuplicateOpCode(OpCode),

    /// A handler advertised an empty opcode set
    NoOpCodesAdvertised,

    /// An instruction was dispatched whose opcode has no registered handler
    MissingHandler(OpCode),
}

impl From<InvalidProgramKind> for Error {
    fn from(kind: InvalidProgramKind) -> Error {
        Error::InvalidProgram(kind)
    }
}

impl From<ConfigurationError> for Error {
    fn from(error: ConfigurationError) -> Error {
        Error::Configuration(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidOperation(what) => write!(f, "invalid operation: {}", what),
            Error::InvalidArgument(what) => write!(f, "invalid argument: {}", what),
            Error::OutOfMemory { requested } => {
                write!(f, "out of memory: cannot allocate {} bytes", requested)
            }
            Error::AccessViolation { address, length } => write!(
                f,
                "access violation: {} bytes at address {:#x}",
                length, address
            ),
            Error::InvalidCast { from, to } => {
                write!(f, "invalid cast from {} to {}", from, to)
            }
            Error::InvalidProgram(kind) => write!(f, "invalid program: {:?}", kind),
            Error::Configuration(error) => write!(f, "configuration error: {:?}", error),
        }
    }
}

impl std::error::Error for Error {}
