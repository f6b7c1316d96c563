//! Core types shared by the scheduler and the promise engine.
//!
//! - [`id`]: identifiers (`PromiseId`) and the logical timestamp (`Time`)
//! - [`outcome`]: promise `Status` and settled `Outcome`

pub mod id;
pub mod outcome;

pub use id::{PromiseId, Time};
pub use outcome::{Outcome, Status};
