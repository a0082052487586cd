//! Prelude module for convenient imports.

pub use crate::console::{Console, Reply};
pub use crate::error::{Result, SandboxError};
pub use crate::remote::{HttpPasteClient, PasteClient};
pub use crate::sandbox::{
    config::SandboxConfig,
    executor::{ExecRequest, Executor, Outcome},
};
