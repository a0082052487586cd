//! Multiline capture state machine.
//!
//! Each session toggles between `Idle` (every line is its own submission
//! candidate) and `Accumulating` (lines buffer up until the marker comes
//! again, then submit as one fragment). The machine cycles for the
//! session's lifetime; there is no terminal state.

/// Per-session multiline capture state. Starts `Idle`.
#[derive(Debug, Clone, Default)]
pub struct MultilineState {
    active: bool,
    buffer: Vec<String>,
}

/// What a marker toggle produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultilineEvent {
    /// Entered `Accumulating`; buffer reset.
    Started,
    /// Left `Accumulating` with nothing buffered; nothing to run.
    DiscardedEmpty,
    /// Left `Accumulating`; the joined buffer is one fragment to submit.
    Submitted(String),
}

impl MultilineState {
    /// Handle the start/stop marker line.
    pub fn toggle(&mut self) -> MultilineEvent {
        if !self.active {
            self.active = true;
            self.buffer.clear();
            return MultilineEvent::Started;
        }
        self.active = false;
        if self.buffer.is_empty() {
            return MultilineEvent::DiscardedEmpty;
        }
        let mut code = self.buffer.join("\n");
        code.push('\n');
        self.buffer.clear();
        MultilineEvent::Submitted(code)
    }

    /// Append a verbatim line while accumulating; ignored when idle.
    pub fn push_line(&mut self, line: &str) {
        if self.active {
            self.buffer.push(line.to_string());
        }
    }

    /// Whether the session is currently accumulating.
    pub fn is_accumulating(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle() {
        let state = MultilineState::default();
        assert!(!state.is_accumulating());
    }

    #[test]
    fn test_accumulate_and_submit() {
        let mut state = MultilineState::default();
        assert_eq!(state.toggle(), MultilineEvent::Started);
        assert!(state.is_accumulating());

        state.push_line("x = 1");
        state.push_line("x");
        assert_eq!(
            state.toggle(),
            MultilineEvent::Submitted("x = 1\nx\n".to_string())
        );
        assert!(!state.is_accumulating());
    }

    #[test]
    fn test_empty_buffer_is_discarded() {
        let mut state = MultilineState::default();
        state.toggle();
        assert_eq!(state.toggle(), MultilineEvent::DiscardedEmpty);
    }

    #[test]
    fn test_buffer_cleared_between_rounds() {
        let mut state = MultilineState::default();
        state.toggle();
        state.push_line("a = 1");
        state.toggle();

        state.toggle();
        state.push_line("b = 2");
        assert_eq!(
            state.toggle(),
            MultilineEvent::Submitted("b = 2\n".to_string())
        );
    }

    #[test]
    fn test_push_ignored_while_idle() {
        let mut state = MultilineState::default();
        state.push_line("stray");
        state.toggle();
        assert_eq!(state.toggle(), MultilineEvent::DiscardedEmpty);
    }
}
