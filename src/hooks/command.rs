//! External-program notification hooks.
//!
//! Hooks run directly (no shell) with the identifier as their only
//! argument and the event in `HEARTBEAT_EVENT`. They execute on the blocking
//! thread pool so the registry lock is never held while a hook runs.

use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::HeartbeatError;
use crate::session::SessionObserver;

/// Result of a hook execution.
#[derive(Debug, Clone)]
pub struct HookOutput {
    /// Whether the hook exited successfully (exit code 0).
    pub success: bool,
    /// The exit code, if available.
    pub exit_code: Option<i32>,
    /// Captured stdout as a string.
    pub stdout: String,
    /// Captured stderr as a string.
    pub stderr: String,
}

impl HookOutput {
    fn from_output(output: Output) -> Self {
        Self {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

/// A configured hook program.
#[derive(Debug, Clone)]
pub struct HookCommand {
    program: PathBuf,
    timeout: Duration,
}

impl HookCommand {
    /// Create a hook that is killed after `timeout`.
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Run the hook and wait for it, killing it once the timeout passes.
    pub fn run(&self, event: &str, identifier: &str) -> Result<HookOutput, HeartbeatError> {
        debug!(
            program = %self.program.display(),
            event = event,
            identifier = %identifier,
            timeout_secs = self.timeout.as_secs(),
            "Executing hook"
        );

        let mut child = Command::new(&self.program)
            .arg(identifier)
            .env("HEARTBEAT_EVENT", event)
            .env("HEARTBEAT_IDENTIFIER", identifier)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| HeartbeatError::Hook {
                message: format!("Failed to spawn {}: {}", self.program.display(), e),
            })?;

        let start = Instant::now();
        let poll_interval = Duration::from_millis(20);

        loop {
            match child.try_wait() {
                Ok(Some(_status)) => {
                    let output = child.wait_with_output().map_err(|e| HeartbeatError::Hook {
                        message: format!(
                            "Failed to get output from {}: {}",
                            self.program.display(),
                            e
                        ),
                    })?;
                    let result = HookOutput::from_output(output);
                    debug!(
                        success = result.success,
                        exit_code = ?result.exit_code,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Hook completed"
                    );
                    return Ok(result);
                }
                Ok(None) => {
                    if start.elapsed() > self.timeout {
                        if let Err(e) = child.kill() {
                            warn!(error = %e, "Failed to kill timed-out hook");
                        }
                        let _ = child.wait();
                        return Err(HeartbeatError::Hook {
                            message: format!(
                                "{} timed out after {}ms",
                                self.program.display(),
                                self.timeout.as_millis()
                            ),
                        });
                    }
                    std::thread::sleep(poll_interval);
                }
                Err(e) => {
                    return Err(HeartbeatError::Hook {
                        message: format!("Failed to check hook status: {}", e),
                    });
                }
            }
        }
    }
}

/// Runs external programs on connect and disconnect.
///
/// Failures are logged and never reach the registry.
#[derive(Debug, Clone, Default)]
pub struct CommandObserver {
    on_connect: Option<HookCommand>,
    on_disconnect: Option<HookCommand>,
}

impl CommandObserver {
    /// Create an observer; either hook may be absent.
    pub fn new(on_connect: Option<HookCommand>, on_disconnect: Option<HookCommand>) -> Self {
        Self {
            on_connect,
            on_disconnect,
        }
    }

    fn dispatch(hook: Option<&HookCommand>, event: &'static str, identifier: &str) {
        let Some(hook) = hook.cloned() else {
            return;
        };
        let identifier = identifier.to_string();

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(event = event, identifier = %identifier, "No runtime available, hook skipped");
            return;
        };

        runtime.spawn_blocking(move || match hook.run(event, &identifier) {
            Ok(output) if output.success => {}
            Ok(output) => warn!(
                event = event,
                identifier = %identifier,
                exit_code = ?output.exit_code,
                stderr = %output.stderr.trim(),
                "Hook exited with failure"
            ),
            Err(e) => warn!(event = event, identifier = %identifier, error = %e, "Hook failed"),
        });
    }
}

impl SessionObserver for CommandObserver {
    fn on_connect(&self, identifier: &str) {
        Self::dispatch(self.on_connect.as_ref(), "connect", identifier);
    }

    fn on_disconnect(&self, identifier: &str) {
        Self::dispatch(self.on_disconnect.as_ref(), "disconnect", identifier);
    }
}
