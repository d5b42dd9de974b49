//! Emulate managed bytecode over partially-known values
//!
//! ### Overview
//!
//! This crate is an execution platform for program analysis of a stack-based,
//! typed bytecode. Instead of running programs for real, it interprets them
//! over a *virtual* machine state in which every value is a bit vector paired
//! with a mask saying which of its bits are actually known. Fully concrete
//! programs execute exactly; programs with unknown inputs execute as far as
//! the known bits allow, with every operation conservatively tracking what it
//! can still guarantee.
//!
//! The main pieces are:
//!
//!   - [`bits`] - bit vectors with known-bit masks and three-valued
//!     integer/floating-point arithmetic
//!   - [`types`] - an append-only graph of types (the ambient type system),
//!     assignability, generic instantiation, and the [`types::ValueFactory`]
//!     that decides how objects are laid out in memory
//!   - [`heap`] - a chunked virtual heap plus a typed facade for allocating
//!     objects, arrays and strings
//!   - [`emulate`] - the instruction set, evaluation-stack slots, the
//!     dispatch table of opcode handlers, and the step loop
//!   - [`flow`] - control-flow graphs and dominator analyses built on top of
//!     them
//!
//! ### Simple example
//!
//! Adding two known 32-bit integers:
//!
//! ```
//! use cilsym::emulate::{ExecutionContext, Instruction, Machine, MachineSettings, RunOutcome};
//! use cilsym::types::{LayoutSettings, TypeGraph, TypeGraphArenas, ValueFactory};
//!
//! # fn run() -> Result<(), cilsym::Error> {
//! let arenas = TypeGraphArenas::new();
//! let graph = TypeGraph::new(&arenas);
//! let core = graph.insert_core_types();
//!
//! let factory = ValueFactory::new(&graph, LayoutSettings::default());
//! let machine = Machine::new(MachineSettings::default())?;
//!
//! let mut context = ExecutionContext::new(&factory, core);
//! context.push_frame(vec![
//!     Instruction::ldc_i4(7),
//!     Instruction::ldc_i4(3),
//!     Instruction::add(),
//!     Instruction::ret(),
//! ]);
//!
//! let outcome = machine.run(&mut context)?;
//! match outcome {
//!     RunOutcome::Completed(Some(slot)) => assert_eq!(slot.contents.as_slice().le_u32(), Some(10)),
//!     _ => panic!("expected a completed run"),
//! }
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```

pub mod bits;
pub mod emulate;
pub mod flow;
pub mod heap;
pub mod types;
pub mod util;

mod errors;

pub use errors::*;
