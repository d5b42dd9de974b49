//! The emulation engine
//!
//! A [`Machine`] is the assembled engine: a dispatch table of opcode handlers
//! plus settings. An [`ExecutionContext`] is one run's mutable state: the
//! managed heap and a stack of [`Frame`]s, each with its own evaluation
//! stack, instruction pointer and generic context.
//!
//! One step is atomic from the caller's perspective: the handler of the
//! current instruction observes the frame and heap, mutates them, and
//! returns a [`DispatchResult`]. There are no suspension points inside a
//! step, and a context is driven by exactly one thread.

mod dispatch;
mod handlers;
mod opcode;
mod slot;

pub use dispatch::*;
pub use handlers::*;
pub use opcode::*;
pub use slot::*;

use crate::heap::ManagedObjectHeap;
use crate::types::{CoreTypes, GenericContext, TypeId, ValueFactory};
use crate::{Error, InvalidProgramKind};

/// What a step loop should do when a branch condition is unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownBranchPolicy {
    /// Continue with the instruction after the branch
    FallThrough,

    /// Continue at the branch target
    Take,
}

/// Configuration of a [`Machine`]
pub struct MachineSettings {
    /// Capacity in bytes of each context's managed heap
    pub heap_capacity: u32,

    /// How [`Machine::run`] resolves an undecidable branch condition.
    /// Callers that want to explore both successors drive [`Machine::step`]
    /// themselves and fork contexts on [`DispatchResult::Fork`].
    pub unknown_branch: UnknownBranchPolicy,

    /// Upper bound on steps per [`Machine::run`] call; the emulator has no
    /// cancellation, so bounding step counts is how callers enforce budgets
    pub step_budget: u64,
}

impl Default for MachineSettings {
    fn default() -> MachineSettings {
        MachineSettings {
            heap_capacity: 1 << 20,
            unknown_branch: UnknownBranchPolicy::FallThrough,
            step_budget: 1 << 20,
        }
    }
}

/// Outcome of a single [`Machine::step`]
#[derive(Debug)]
pub enum StepOutcome {
    /// The instruction completed; more remain
    Continue,

    /// The program threw; the address is the exception object
    Threw(u64),

    /// The outermost frame returned, with the returned value if any
    Completed(Option<StackSlot>),
}

/// Outcome of [`Machine::run`]
#[derive(Debug)]
pub enum RunOutcome {
    /// The outermost frame returned, with the returned value if any
    Completed(Option<StackSlot>),

    /// The program threw; the address is the exception object
    Threw(u64),

    /// The step budget ran out before the program finished
    BudgetExhausted,
}

/// One method invocation's state
pub struct Frame<'g> {
    /// The method body
    pub instructions: Vec<Instruction<'g>>,

    /// Index of the next instruction to execute
    pub ip: usize,

    /// The evaluation stack; mutated only by the handler of the current
    /// instruction
    pub stack: Vec<StackSlot>,

    /// Local variables; `None` until first stored to
    pub locals: Vec<Option<StackSlot>>,

    /// Ambient generic arguments for signatures in this frame
    pub generic_context: GenericContext<'g>,
}

impl<'g> Frame<'g> {
    pub fn new(instructions: Vec<Instruction<'g>>) -> Frame<'g> {
        Frame::with_locals(instructions, 0)
    }

    pub fn with_locals(instructions: Vec<Instruction<'g>>, local_count: u16) -> Frame<'g> {
        Frame {
            instructions,
            ip: 0,
            stack: Vec::new(),
            locals: vec![None; local_count as usize],
            generic_context: GenericContext::empty(),
        }
    }
}

/// Mutable state of one emulation run
pub struct ExecutionContext<'g> {
    factory: &'g ValueFactory<'g>,
    core: CoreTypes<'g>,
    heap: ManagedObjectHeap<'g>,
    frames: Vec<Frame<'g>>,
}

impl<'g> ExecutionContext<'g> {
    /// New context with an empty heap of `heap_capacity` bytes
    pub fn with_heap_capacity(
        factory: &'g ValueFactory<'g>,
        core: CoreTypes<'g>,
        heap_capacity: u32,
    ) -> ExecutionContext<'g> {
        ExecutionContext {
            factory,
            core,
            heap: ManagedObjectHeap::new(heap_capacity, core),
            frames: Vec::new(),
        }
    }

    /// New context with the default heap capacity
    pub fn new(factory: &'g ValueFactory<'g>, core: CoreTypes<'g>) -> ExecutionContext<'g> {
        ExecutionContext::with_heap_capacity(factory, core, MachineSettings::default().heap_capacity)
    }

    pub fn factory(&self) -> &'g ValueFactory<'g> {
        self.factory
    }

    pub fn core(&self) -> CoreTypes<'g> {
        self.core
    }

    pub fn heap(&self) -> &ManagedObjectHeap<'g> {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut ManagedObjectHeap<'g> {
        &mut self.heap
    }

    /// Enter a new frame over `instructions`
    pub fn push_frame(&mut self, instructions: Vec<Instruction<'g>>) {
        self.frames.push(Frame::new(instructions));
    }

    pub fn push_frame_with_locals(
        &mut self,
        instructions: Vec<Instruction<'g>>,
        local_count: u16,
    ) {
        self.frames.push(Frame::with_locals(instructions, local_count));
    }

    pub fn enter_frame(&mut self, frame: Frame<'g>) {
        self.frames.push(frame);
    }

    pub fn pop_frame(&mut self) -> Option<Frame<'g>> {
        self.frames.pop()
    }

    /// The executing frame
    pub fn frame(&self) -> Result<&Frame<'g>, Error> {
        self.frames
            .last()
            .ok_or(Error::InvalidOperation("no active frame"))
    }

    pub fn frame_mut(&mut self) -> Result<&mut Frame<'g>, Error> {
        self.frames
            .last_mut()
            .ok_or(Error::InvalidOperation("no active frame"))
    }

    /// Pop the top evaluation-stack slot
    pub fn pop(&mut self) -> Result<StackSlot, Error> {
        self.frame_mut()?
            .stack
            .pop()
            .ok_or(Error::InvalidProgram(InvalidProgramKind::EmptyStack))
    }

    /// Push an evaluation-stack slot
    pub fn push(&mut self, slot: StackSlot) -> Result<(), Error> {
        self.frame_mut()?.stack.push(slot);
        Ok(())
    }

    /// Read a local variable
    pub fn local(&self, index: u16) -> Result<StackSlot, Error> {
        let frame = self.frame()?;
        match frame.locals.get(index as usize) {
            None => Err(InvalidProgramKind::InvalidLocalIndex(index).into()),
            Some(None) => Err(InvalidProgramKind::UninitializedLocal(index).into()),
            Some(Some(slot)) => Ok(slot.clone()),
        }
    }

    /// Store a local variable
    pub fn set_local(&mut self, index: u16, slot: StackSlot) -> Result<(), Error> {
        let frame = self.frame_mut()?;
        match frame.locals.get_mut(index as usize) {
            None => Err(InvalidProgramKind::InvalidLocalIndex(index).into()),
            Some(local) => {
                *local = Some(slot);
                Ok(())
            }
        }
    }

    /// Allocate an exception object of `ty` and reify it as a throw result
    pub fn throw_new(&mut self, ty: TypeId<'g>) -> Result<DispatchResult, Error> {
        let address = self.heap.allocate_object(self.factory, ty, true)?;
        log::debug!("emulated program throws {} at {:#x}", ty.name, address);
        Ok(DispatchResult::Throw(address))
    }

    /// Convert a host out-of-memory failure into an emulated
    /// `OutOfMemoryException`; any other error stays a host error
    pub fn convert_out_of_memory(&mut self, error: Error) -> Result<DispatchResult, Error> {
        match error {
            Error::OutOfMemory { .. } => self.throw_new(self.core.exceptions.out_of_memory),
            other => Err(other),
        }
    }

    /// Convert a host invalid-cast failure into an emulated
    /// `InvalidCastException`; any other error stays a host error
    pub fn convert_invalid_cast(&mut self, error: Error) -> Result<DispatchResult, Error> {
        match error {
            Error::InvalidCast { from, to } => {
                log::debug!("invalid cast from {} to {}", from, to);
                self.throw_new(self.core.exceptions.invalid_cast)
            }
            other => Err(other),
        }
    }
}

/// The assembled emulation engine
///
/// Holds the dispatch table and settings; all run state lives in
/// [`ExecutionContext`]s, so one machine can drive any number of contexts
/// one after another.
pub struct Machine {
    table: DispatchTable,
    settings: MachineSettings,
}

impl Machine {
    /// Machine with the default handler set
    pub fn new(settings: MachineSettings) -> Result<Machine, Error> {
        Ok(Machine {
            table: DispatchTable::with_defaults()?,
            settings,
        })
    }

    /// Machine with a caller-assembled dispatch table
    pub fn with_table(settings: MachineSettings, table: DispatchTable) -> Machine {
        Machine { table, settings }
    }

    pub fn settings(&self) -> &MachineSettings {
        &self.settings
    }

    /// New context sized from this machine's settings
    pub fn new_context<'g>(
        &self,
        factory: &'g ValueFactory<'g>,
        core: CoreTypes<'g>,
    ) -> ExecutionContext<'g> {
        ExecutionContext::with_heap_capacity(factory, core, self.settings.heap_capacity)
    }

    /// Execute the current instruction of the context's top frame
    pub fn step<'g>(&self, context: &mut ExecutionContext<'g>) -> Result<StepOutcome, Error> {
        let frame = context.frame()?;
        let ip = frame.ip;
        let instruction = frame
            .instructions
            .get(ip)
            .ok_or(Error::InvalidProgram(
                InvalidProgramKind::InstructionOutOfRange(ip),
            ))?
            .clone();

        log::trace!("ip {:4}  {:?}", ip, instruction.opcode);
        let handler = self.table.handler(instruction.opcode)?;
        match handler.dispatch(context, &instruction)? {
            DispatchResult::Success => {
                context.frame_mut()?.ip = ip + 1;
                Ok(StepOutcome::Continue)
            }
            DispatchResult::Branch(target) => {
                self.jump(context, target)?;
                Ok(StepOutcome::Continue)
            }
            DispatchResult::Fork { target } => {
                match self.settings.unknown_branch {
                    UnknownBranchPolicy::FallThrough => {
                        log::debug!("unknown branch condition at ip {}, falling through", ip);
                        context.frame_mut()?.ip = ip + 1;
                    }
                    UnknownBranchPolicy::Take => {
                        log::debug!("unknown branch condition at ip {}, taking branch to {}", ip, target);
                        self.jump(context, target)?;
                    }
                }
                Ok(StepOutcome::Continue)
            }
            DispatchResult::Throw(address) => Ok(StepOutcome::Threw(address)),
            DispatchResult::Return => {
                let mut finished = context
                    .pop_frame()
                    .expect("a frame was executing this instruction");
                let result = finished.stack.pop();
                match context.frames.last_mut() {
                    None => Ok(StepOutcome::Completed(result)),
                    Some(caller) => {
                        if let Some(value) = result {
                            caller.stack.push(value);
                        }
                        Ok(StepOutcome::Continue)
                    }
                }
            }
        }
    }

    /// Step until the program completes, throws, or exhausts the budget
    pub fn run<'g>(&self, context: &mut ExecutionContext<'g>) -> Result<RunOutcome, Error> {
        for _ in 0..self.settings.step_budget {
            match self.step(context)? {
                StepOutcome::Continue => {}
                StepOutcome::Threw(address) => return Ok(RunOutcome::Threw(address)),
                StepOutcome::Completed(result) => return Ok(RunOutcome::Completed(result)),
            }
        }
        Ok(RunOutcome::BudgetExhausted)
    }

    fn jump<'g>(&self, context: &mut ExecutionContext<'g>, target: usize) -> Result<(), Error> {
        let frame = context.frame_mut()?;
        if target >= frame.instructions.len() {
            return Err(InvalidProgramKind::InstructionOutOfRange(target).into());
        }
        frame.ip = target;
        Ok(())
    }
}
