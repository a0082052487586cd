//! Chat-facing command router.
//!
//! Sits at the interface boundary with the (external) chat transport: one
//! inbound `(identity, text, channel)` event in, zero or more reply
//! directives out. Command prefixes are the transport's concern; the router
//! sees bare surface forms.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::multiline::MultilineEvent;
use crate::remote::PasteClient;
use crate::sandbox::config::SandboxConfig;
use crate::sandbox::executor::{ExecRequest, Executor, Outcome};
use crate::session::SessionStore;

/// Shown when a successful fragment printed nothing.
const NO_OUTPUT: &str = "(no output to stdout)";

/// The multiline start/stop marker line.
const MULTILINE_MARKER: &str = "```";

/// One outbound reply directive for the transport to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    /// A channel name or an identity (for private delivery).
    pub destination: String,
}

impl Reply {
    fn to(destination: &str, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            destination: destination.to_string(),
        }
    }
}

/// The scripting console: session store, sandbox executor, and the
/// collaborator seams, behind one inbound-event entry point.
pub struct Console {
    store: SessionStore,
    executor: Executor,
    paste: Arc<dyn PasteClient>,
    deadline: Duration,
}

impl Console {
    pub fn new(config: SandboxConfig, paste: Arc<dyn PasteClient>) -> Self {
        let executor = Executor::new(&config);
        Self {
            store: SessionStore::new(),
            executor,
            paste,
            deadline: config.deadline,
        }
    }

    /// The session store, for embedding and inspection.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Route one inbound message event to reply directives.
    pub async fn handle(&self, identity: &str, text: &str, channel: &str) -> Vec<Reply> {
        let line = text.trim_end();
        debug!(identity, channel, "inbound line");

        if line.trim() == MULTILINE_MARKER {
            return self.toggle_multiline(identity, channel).await;
        }

        // `code` between single backticks runs immediately, even while a
        // multiline block is accumulating.
        if let Some(code) = backticked(line) {
            let reply = self.run_fragment(identity, code, channel, false).await;
            return vec![reply];
        }

        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (Some("clear"), None) => {
                self.store.clear(identity);
                vec![Reply::to(
                    channel,
                    format!("<{}> Environment and history cleared!", identity),
                )]
            }
            (Some("lsmod"), None) => {
                let modules = self.executor.gate().names().join(", ");
                vec![Reply::to(
                    channel,
                    format!("<{}> Available modules are: {}", identity, modules),
                )]
            }
            (Some("paste"), None) => self.paste_history(identity, channel).await,
            (Some("show"), None) => self.show_history(identity),
            (Some("run"), Some(url)) => self.run_url(identity, url, channel).await,
            (Some("run"), None) => vec![Reply::to(
                channel,
                format!("<{}> This command requires an argument!", identity),
            )],
            (Some("get"), Some(donor)) => self.import_environment(identity, donor, channel),
            (Some("get"), None) => vec![Reply::to(
                channel,
                format!("<{}> This command requires an argument!", identity),
            )],
            _ => {
                // Plain text only matters while a block is accumulating.
                if self.store.is_accumulating(identity) {
                    self.store.push_multiline_line(identity, line);
                }
                Vec::new()
            }
        }
    }

    async fn toggle_multiline(&self, identity: &str, channel: &str) -> Vec<Reply> {
        match self.store.toggle_multiline(identity) {
            MultilineEvent::Started => vec![Reply::to(
                channel,
                format!(
                    "<{}> Waiting for lines, type {} to finish and execute",
                    identity, MULTILINE_MARKER
                ),
            )],
            MultilineEvent::DiscardedEmpty => vec![Reply::to(
                channel,
                format!("<{}> Ignoring empty multiline code", identity),
            )],
            MultilineEvent::Submitted(code) => {
                vec![self.run_fragment(identity, &code, channel, true).await]
            }
        }
    }

    /// Run one fragment through the normal execution path and render the
    /// outcome. Only a success mutates the session.
    async fn run_fragment(
        &self,
        identity: &str,
        code: &str,
        channel: &str,
        chevron: bool,
    ) -> Reply {
        debug!(identity, code, "executing fragment");
        let request = ExecRequest {
            code: code.to_string(),
            environment: self.store.snapshot_environment(identity),
            deadline: self.deadline,
        };
        let message = match self.executor.submit(request).await {
            Outcome::Success {
                environment,
                output,
            } => {
                self.store.record_success(identity, environment, code);
                let output = output.trim_end_matches('\n');
                if output.is_empty() {
                    NO_OUTPUT.to_string()
                } else {
                    output.to_string()
                }
            }
            Outcome::TimedOut => "Timeout error - do you have an infinite loop?".to_string(),
            Outcome::RuntimeFailure(msg) => format!("Runtime error: {}", msg),
            Outcome::CompileFailure(msg) => format!("Compile error: {}", msg),
        };
        let sep = if chevron { ">" } else { "" };
        Reply::to(channel, format!("<{}>{} {}", identity, sep, message))
    }

    async fn paste_history(&self, identity: &str, channel: &str) -> Vec<Reply> {
        let history = self.store.history_text(identity);
        if history.is_empty() {
            return Vec::new();
        }
        info!(identity, "uploading history to paste service");
        let message = match self.paste.upload(&history).await {
            Ok(url) => url,
            Err(e) => e.to_string(),
        };
        vec![Reply::to(channel, format!("<{}> {}", identity, message))]
    }

    /// History lines as private replies to the submitter.
    fn show_history(&self, identity: &str) -> Vec<Reply> {
        let history = self.store.history_text(identity);
        if history.is_empty() {
            return Vec::new();
        }
        info!(identity, "sending history over private messages");
        history
            .lines()
            .map(|line| Reply::to(identity, line))
            .collect()
    }

    async fn run_url(&self, identity: &str, url: &str, channel: &str) -> Vec<Reply> {
        info!(identity, url, "running fragment from url");
        match self.paste.fetch(url).await {
            Ok(source) => {
                let code = source.trim().to_string();
                vec![self.run_fragment(identity, &code, channel, true).await]
            }
            Err(_) => vec![Reply::to(
                channel,
                format!("<{}> Failed to fetch this url!", identity),
            )],
        }
    }

    fn import_environment(&self, identity: &str, donor: &str, channel: &str) -> Vec<Reply> {
        let message = match self.store.import_environment(identity, donor) {
            Ok(()) => "Environment imported!".to_string(),
            Err(_) => "This user does not have an environment started".to_string(),
        };
        vec![Reply::to(channel, format!("<{}> {}", identity, message))]
    }
}

/// Extract the code from a `` `code` `` single-line submission.
fn backticked(line: &str) -> Option<&str> {
    let inner = line.strip_prefix('`')?.strip_suffix('`')?;
    if inner.is_empty() || inner.contains('\n') {
        None
    } else {
        Some(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backticked_extraction() {
        assert_eq!(backticked("`x = 1`"), Some("x = 1"));
        assert_eq!(backticked("x = 1"), None);
        assert_eq!(backticked("``"), None);
        assert_eq!(backticked("`unterminated"), None);
    }
}
