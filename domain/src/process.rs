//! Lifecycle state of the worker subprocess.

/// State of the single worker process slot.
///
/// `Stopped -> Starting -> Running -> Stopped`, with `Starting -> Stopped`
/// when the stdio pipes cannot be established.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProcessState {
    #[default]
    Stopped,
    Starting,
    Running,
}

impl ProcessState {
    /// `start()` is only valid from `Stopped`.
    pub fn can_start(self) -> bool {
        self == ProcessState::Stopped
    }

    /// `send()` is only valid from `Running`.
    pub fn can_send(self) -> bool {
        self == ProcessState::Running
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
        }
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_guarded() {
        assert!(ProcessState::Stopped.can_start());
        assert!(!ProcessState::Starting.can_start());
        assert!(!ProcessState::Running.can_start());

        assert!(ProcessState::Running.can_send());
        assert!(!ProcessState::Starting.can_send());
        assert!(!ProcessState::Stopped.can_send());
    }

    #[test]
    fn default_is_stopped() {
        assert_eq!(ProcessState::default(), ProcessState::Stopped);
        assert_eq!(ProcessState::default().to_string(), "stopped");
    }
}
