//! Small utilities shared across the crate

mod ref_id;
mod trilean;

pub use ref_id::*;
pub use trilean::*;
