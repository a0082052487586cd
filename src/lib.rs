//! # Scripting Console
//!
//! A chat-exposed, multi-tenant scripting console: each user accumulates a
//! persistent evaluation environment across messages and submits code
//! fragments that run against it, receiving captured output back.
//!
//! The hard part is not the chat plumbing but the execution engine, and
//! that is what this crate provides:
//!
//! - **Closed-grammar interpreter**: submitted code compiles against a
//!   fixed capability set of builtins; there is simply no syntax or builtin
//!   that reaches the filesystem, the network, or a process.
//! - **Import gate**: `import` resolves only whitelisted module names (or
//!   submodules of whitelisted packages) from a registry of native modules.
//! - **Isolation & timeout layer**: every submission runs in a bounded
//!   worker pool against a snapshot of the session environment, raced
//!   against a wall-clock deadline; timed-out workers are abandoned and
//!   their partial mutations discarded.
//! - **Session store**: per-identity environment, source history, and
//!   multiline capture state, mutated only on successful executions.
//!
//! ## Example
//!
//! ```rust,ignore
//! use replbot::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SandboxConfig::default();
//!     let console = Console::new(config, Arc::new(HttpPasteClient::new()));
//!
//!     let replies = console.handle("alice", "`x = 40`", "#repl").await;
//!     let replies = console.handle("alice", "`print(x + 2)`", "#repl").await;
//!     assert_eq!(replies[0].text, "<alice> 42");
//! }
//! ```
//!
//! ## Failure model
//!
//! Every submission produces exactly one outcome: `Success`,
//! `CompileFailure`, `RuntimeFailure`, or `TimedOut`. Only `Success`
//! mutates the session; all failures leave it byte-for-byte as it was, so
//! retries are always safe.

pub mod console;
pub mod error;
pub mod multiline;
pub mod prelude;
pub mod remote;
pub mod sandbox;
pub mod session;

// Re-export main types at crate root for convenience
pub use console::{Console, Reply};
pub use error::{Result, SandboxError};
pub use remote::{HttpPasteClient, PasteClient};
pub use sandbox::config::{SandboxConfig, SandboxConfigBuilder};
pub use sandbox::executor::{ExecRequest, Executor, Outcome};
pub use sandbox::interp::{Execution, Interpreter};
pub use sandbox::modules::ImportGate;
pub use sandbox::value::{Environment, Value};
pub use session::SessionStore;
