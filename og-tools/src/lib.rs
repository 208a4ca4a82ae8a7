//! Dispatcher boundary for opsgate operations.
//!
//! Every operation the intent parser can name is a [`Tool`]; the app looks
//! them up in a [`ToolRegistry`] and never talks to the remote API directly.

mod error;
mod registry;
mod remote;
mod traits;

pub use error::{Result, ToolError};
pub use registry::ToolRegistry;
pub use remote::{CredentialProvider, Credentials, RemoteOperationTool};
pub use traits::{OutstandingOperation, Tool, ToolSpec, require_string};
