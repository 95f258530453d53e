//! Rule-dispatch engine: outcome accounting, executor assignment, and the
//! per-bulletin task dispatcher.

pub mod engine;
pub mod executor;
pub mod outcome;

pub use engine::DispatchEngine;
pub use executor::{ExecutorAssigner, ExecutorRules};
pub use outcome::DispatchOutcome;
