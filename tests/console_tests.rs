//! End-to-end tests for the chat-facing console.
//!
//! A fake paste client stands in for the external paste service so the
//! `paste` / `run <url>` round trip can be exercised hermetically.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;

use replbot::prelude::*;

/// In-memory paste service: uploads get sequential fake URLs.
#[derive(Default)]
struct FakePaste {
    pastes: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl PasteClient for FakePaste {
    async fn upload(&self, text: &str) -> Result<String> {
        let mut pastes = self.pastes.lock().unwrap();
        let url = format!("https://paste.test/{}", pastes.len());
        pastes.insert(url.clone(), text.to_string());
        Ok(url)
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        self.pastes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| SandboxError::Fetch(anyhow!("not found: {}", url)))
    }
}

fn console() -> Console {
    Console::new(SandboxConfig::default(), Arc::new(FakePaste::default()))
}

async fn one_reply(console: &Console, identity: &str, text: &str) -> String {
    let replies = console.handle(identity, text, "#repl").await;
    assert_eq!(replies.len(), 1, "expected one reply to {:?}", text);
    replies[0].text.clone()
}

#[tokio::test]
async fn test_environment_persists_across_submissions() {
    let console = console();
    let reply = one_reply(&console, "alice", "`x = 40`").await;
    assert_eq!(reply, "<alice> (no output to stdout)");

    let reply = one_reply(&console, "alice", "`print(x + 2)`").await;
    assert_eq!(reply, "<alice> 42");
}

#[tokio::test]
async fn test_sequential_composition() {
    let console = console();
    console.handle("alice", "`xs = [1]`", "#repl").await;
    console.handle("alice", "`xs.append(2)`", "#repl").await;
    let reply = one_reply(&console, "alice", "`print(xs)`").await;
    assert_eq!(reply, "<alice> [1, 2]");
}

#[tokio::test]
async fn test_clear_resets_environment_and_history() {
    let console = console();
    console.handle("alice", "`x = 1`", "#repl").await;
    let reply = one_reply(&console, "alice", "clear").await;
    assert_eq!(reply, "<alice> Environment and history cleared!");

    let reply = one_reply(&console, "alice", "`print(x)`").await;
    assert!(reply.contains("Runtime error"), "got: {reply}");
    assert!(reply.contains("not defined"));

    // History gone too: show produces no replies.
    assert!(console.handle("alice", "show", "#repl").await.is_empty());
}

#[tokio::test]
async fn test_failed_fragments_leave_session_untouched() {
    let console = console();
    console.handle("alice", "`x = 1`", "#repl").await;

    let reply = one_reply(&console, "alice", "`x = 2; 1 / 0`").await;
    assert!(reply.contains("Runtime error"));

    let reply = one_reply(&console, "alice", "`print(x)`").await;
    assert_eq!(reply, "<alice> 1");

    // Failed fragments are not recorded in the history either.
    let shown = console.handle("alice", "show", "#repl").await;
    assert_eq!(shown.len(), 2);
    assert_eq!(shown[0].text, "x = 1");
    assert_eq!(shown[1].text, "print(x)");
}

#[tokio::test]
async fn test_import_gate_from_chat() {
    let console = console();
    let reply = one_reply(&console, "alice", "`import os`").await;
    assert!(reply.contains("Runtime error"));
    assert!(reply.contains("not whitelisted"));

    let reply = one_reply(&console, "alice", "`import math`").await;
    assert_eq!(reply, "<alice> (no output to stdout)");
    let reply = one_reply(&console, "alice", "`print(math.floor(2.5))`").await;
    assert_eq!(reply, "<alice> 2");
}

#[tokio::test]
async fn test_timeout_preserves_environment() {
    // The fuel limit lets the abandoned worker terminate after the
    // wall-clock deadline has already fired.
    let config = SandboxConfig::builder()
        .deadline(Duration::from_millis(100))
        .max_fuel(50_000_000)
        .build();
    let console = Console::new(config, Arc::new(FakePaste::default()));

    console.handle("alice", "`x = 7`", "#repl").await;
    let reply = one_reply(&console, "alice", "`while true { pass }`").await;
    assert_eq!(
        reply,
        "<alice> Timeout error - do you have an infinite loop?"
    );

    let reply = one_reply(&console, "alice", "`print(x)`").await;
    assert_eq!(reply, "<alice> 7");
}

#[tokio::test]
async fn test_multiline_block_executes_as_one_fragment() {
    let console = console();
    let reply = one_reply(&console, "alice", "```").await;
    assert!(reply.contains("Waiting for lines"));

    assert!(console.handle("alice", "x = 1", "#repl").await.is_empty());
    assert!(console.handle("alice", "x", "#repl").await.is_empty());

    let reply = one_reply(&console, "alice", "```").await;
    assert_eq!(reply, "<alice>> (no output to stdout)");

    // The block persisted as one fragment and mutated the environment.
    let reply = one_reply(&console, "alice", "`print(x)`").await;
    assert_eq!(reply, "<alice> 1");
    let shown = console.handle("alice", "show", "#repl").await;
    assert_eq!(shown[0].text, "x = 1");
    assert_eq!(shown[1].text, "x");
}

#[tokio::test]
async fn test_empty_multiline_block_is_ignored() {
    let console = console();
    console.handle("alice", "```", "#repl").await;
    let reply = one_reply(&console, "alice", "```").await;
    assert_eq!(reply, "<alice> Ignoring empty multiline code");
}

#[tokio::test]
async fn test_backtick_submission_runs_while_accumulating() {
    let console = console();
    console.handle("alice", "```", "#repl").await;
    console.handle("alice", "y = 2", "#repl").await;

    // An immediate submission interleaves without disturbing the buffer.
    let reply = one_reply(&console, "alice", "`print(40 + 2)`").await;
    assert_eq!(reply, "<alice> 42");

    let reply = one_reply(&console, "alice", "```").await;
    assert_eq!(reply, "<alice>> (no output to stdout)");
    let reply = one_reply(&console, "alice", "`print(y)`").await;
    assert_eq!(reply, "<alice> 2");
}

#[tokio::test]
async fn test_get_merges_donor_environment() {
    let console = console();
    console.handle("alice", "`x = 1`", "#repl").await;
    console.handle("alice", "`mine = 7`", "#repl").await;
    console.handle("bob", "`x = 99`", "#repl").await;

    let reply = one_reply(&console, "alice", "get bob").await;
    assert_eq!(reply, "<alice> Environment imported!");

    // Donor wins collisions; recipient-only keys survive.
    let reply = one_reply(&console, "alice", "`print(x, mine)`").await;
    assert_eq!(reply, "<alice> 99 7");
}

#[tokio::test]
async fn test_get_unknown_donor() {
    let console = console();
    let reply = one_reply(&console, "alice", "get nobody").await;
    assert_eq!(
        reply,
        "<alice> This user does not have an environment started"
    );
}

#[tokio::test]
async fn test_get_requires_argument() {
    let console = console();
    let reply = one_reply(&console, "alice", "get").await;
    assert_eq!(reply, "<alice> This command requires an argument!");
}

#[tokio::test]
async fn test_lsmod_dumps_whitelist() {
    let config = SandboxConfig::builder().whitelist(["math", "json"]).build();
    let console = Console::new(config, Arc::new(FakePaste::default()));
    let reply = one_reply(&console, "alice", "lsmod").await;
    assert_eq!(reply, "<alice> Available modules are: json, math");
}

#[tokio::test]
async fn test_show_sends_history_privately() {
    let console = console();
    console.handle("alice", "`x = 1`", "#repl").await;
    console.handle("alice", "`y = 2`", "#repl").await;

    let replies = console.handle("alice", "show", "#repl").await;
    assert_eq!(replies.len(), 2);
    for reply in &replies {
        assert_eq!(reply.destination, "alice");
    }
}

#[tokio::test]
async fn test_paste_then_run_round_trip() {
    let paste = Arc::new(FakePaste::default());
    let client: Arc<dyn PasteClient> = paste.clone();
    let console = Console::new(SandboxConfig::default(), client);

    console.handle("alice", "`x = 40`", "#repl").await;
    console.handle("alice", "`print(x + 2)`", "#repl").await;

    let reply = one_reply(&console, "alice", "paste").await;
    let url = reply.strip_prefix("<alice> ").unwrap().to_string();
    assert!(url.starts_with("https://paste.test/"));

    // Replaying the history into a fresh session reproduces the outcome.
    let reply = one_reply(&console, "carol", &format!("run {}", url)).await;
    assert_eq!(reply, "<carol>> 42");
}

#[tokio::test]
async fn test_run_with_bad_url() {
    let console = console();
    let reply = one_reply(&console, "alice", "run https://paste.test/missing").await;
    assert_eq!(reply, "<alice> Failed to fetch this url!");

    let reply = one_reply(&console, "alice", "run").await;
    assert_eq!(reply, "<alice> This command requires an argument!");
}

#[tokio::test]
async fn test_plain_text_outside_multiline_is_ignored() {
    let console = console();
    assert!(console
        .handle("alice", "just chatting", "#repl")
        .await
        .is_empty());
}

#[tokio::test]
async fn test_sessions_are_isolated_between_identities() {
    let console = console();
    console.handle("alice", "`secret = 1`", "#repl").await;
    let reply = one_reply(&console, "bob", "`print(secret)`").await;
    assert!(reply.contains("not defined"));
}
