//! Interpretation of free-form operator instructions.
//!
//! Turns text such as "export the production database for acme" into an
//! operation id plus validated arguments, a 0-100 confidence score and, when
//! the text names only a category of operations, a ranked list of candidates
//! instead of a guess. Everything here is pure; no I/O and no shared state.

pub mod catalog;
mod error;
pub mod extract;
pub mod fuzzy;
mod parser;
mod types;

pub use catalog::{OperationDescriptor, EXAMPLE_COMMANDS};
pub use error::ErrorKind;
pub use parser::{IntentParser, TriggerStrength};
pub use types::{
    CommandError, Environment, INTERPRETATION_CONFIDENCE_MIN, OperationClass, OperationId,
    ParseContext, ParsedCommand,
};
