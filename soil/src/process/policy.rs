//! Logging and capture policies for command execution

/// Which output streams are accumulated into the returned text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    pub stdout: bool,
    pub stderr: bool,
}

/// Which output streams are streamed to the log as lines arrive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Logging {
    pub stdout: bool,
    pub stderr: bool,
}

/// Per-invocation capture and logging policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecPolicy {
    pub capture: Capture,
    pub logging: Logging,
}

impl ExecPolicy {
    /// Side-effecting provisioning step: both streams logged, nothing captured
    pub const EXEC: ExecPolicy = ExecPolicy {
        capture: Capture {
            stdout: false,
            stderr: false,
        },
        logging: Logging {
            stdout: true,
            stderr: true,
        },
    };

    /// Output is both shown and consumed: both streams logged, stdout captured
    pub const EXEC_OUTPUT: ExecPolicy = ExecPolicy {
        capture: Capture {
            stdout: true,
            stderr: false,
        },
        logging: Logging {
            stdout: true,
            stderr: true,
        },
    };

    /// Probe whose stdout is consumed silently; stderr is still logged
    pub const EXEC_QUIET: ExecPolicy = ExecPolicy {
        capture: Capture {
            stdout: true,
            stderr: false,
        },
        logging: Logging {
            stdout: false,
            stderr: true,
        },
    };

    /// Probe that logs nothing at all
    pub const EXEC_SILENT: ExecPolicy = ExecPolicy {
        capture: Capture {
            stdout: true,
            stderr: false,
        },
        logging: Logging {
            stdout: false,
            stderr: false,
        },
    };

    /// Both streams logged and merged into one capture in arrival order.
    ///
    /// The two streams are drained by independent tasks, so the relative
    /// order of a stdout line and a stderr line written close together is
    /// decided by the scheduler. Order within one stream is always kept.
    pub const SHELL_COMBINED: ExecPolicy = ExecPolicy {
        capture: Capture {
            stdout: true,
            stderr: true,
        },
        logging: Logging {
            stdout: true,
            stderr: true,
        },
    };

    /// Same policy with stdout capture switched on
    pub fn capturing_stdout(mut self) -> Self {
        self.capture.stdout = true;
        self
    }

    /// Whether any stream is logged
    pub fn is_verbose(&self) -> bool {
        self.logging.stdout || self.logging.stderr
    }
}

impl Default for ExecPolicy {
    fn default() -> Self {
        Self::EXEC_OUTPUT
    }
}
