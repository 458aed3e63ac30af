//! Command runner with concurrent stdout/stderr draining

use std::process::Stdio;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::SoilError;
use crate::process::policy::ExecPolicy;

/// Executes command lines on behalf of deployments
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a command and return whatever the policy captured.
    ///
    /// A nonzero exit yields `SoilError::Command` carrying the captured
    /// text followed by any stderr the policy did not capture; a process
    /// that cannot be started yields `SoilError::Launch`.
    async fn run(&self, args: &[String], policy: ExecPolicy) -> Result<String, SoilError>;

    /// Run a command attached to the caller's terminal
    async fn run_interactive(&self, args: &[String]) -> Result<(), SoilError>;
}

/// Join an argument vector into the command line handed to the shell
pub fn command_line(args: &[String]) -> String {
    args.join(" ")
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Runs commands through a shell (`bash -c` by default)
#[derive(Debug, Clone)]
pub struct CommandRunner {
    shell: String,
}

impl CommandRunner {
    /// Create a runner using the given shell
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    fn command(&self, line: &str) -> Command {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(line);
        cmd
    }

    async fn execute(&self, line: &str, policy: ExecPolicy) -> Result<String, SoilError> {
        let mut child = self
            .command(line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SoilError::Launch {
                command: line.to_string(),
                source: e,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SoilError::Internal("stdout pipe missing".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| SoilError::Internal("stderr pipe missing".to_string()))?;

        // One buffer shared by both drains; each appends whole lines.
        let captured = Arc::new(Mutex::new(String::new()));
        // Uncaptured stderr, reported only if the command fails
        let diagnostics = Arc::new(Mutex::new(String::new()));

        let stdout_task = tokio::spawn(drain(
            stdout,
            Stream::Stdout,
            policy.logging.stdout,
            policy.capture.stdout.then(|| captured.clone()),
        ));
        let stderr_task = tokio::spawn(drain(
            stderr,
            Stream::Stderr,
            policy.logging.stderr,
            Some(if policy.capture.stderr {
                captured.clone()
            } else {
                diagnostics.clone()
            }),
        ));

        let (stdout_result, stderr_result) = tokio::join!(stdout_task, stderr_task);
        let status = child.wait().await?;
        stdout_result??;
        stderr_result??;

        let mut output = std::mem::take(&mut *captured.lock().unwrap_or_else(|e| e.into_inner()));

        if !status.success() {
            warn!("*** Command returns: {}", status);
            output.push_str(&diagnostics.lock().unwrap_or_else(|e| e.into_inner()));
            return Err(SoilError::Command {
                command: line.to_string(),
                code: status.code(),
                output,
            });
        }

        Ok(output)
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new("bash")
    }
}

#[async_trait]
impl Executor for CommandRunner {
    async fn run(&self, args: &[String], policy: ExecPolicy) -> Result<String, SoilError> {
        let line = command_line(args);
        if policy.is_verbose() {
            info!("*** Running command: {}", line);
        } else {
            debug!("Running command: {}", line);
        }
        self.execute(&line, policy).await
    }

    async fn run_interactive(&self, args: &[String]) -> Result<(), SoilError> {
        let line = command_line(args);
        info!("*** Running command: {}", line);

        let status = self
            .command(&line)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| SoilError::Launch {
                command: line.clone(),
                source: e,
            })?;

        if !status.success() {
            warn!("*** Command returns: {}", status);
            return Err(SoilError::Command {
                command: line,
                code: status.code(),
                output: String::new(),
            });
        }
        Ok(())
    }
}

/// Read one stream to its end, logging and capturing line by line.
///
/// Lines keep their terminators in the capture so the caller sees the
/// stream verbatim; a final unterminated line is delivered as is.
async fn drain<R>(
    reader: R,
    stream: Stream,
    log: bool,
    capture: Option<Arc<Mutex<String>>>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);

        if log {
            let text = line.trim_end_matches(['\n', '\r']);
            match stream {
                Stream::Stdout => info!(">> {}", text),
                Stream::Stderr => info!("EE {}", text),
            }
        }

        if let Some(captured) = &capture {
            captured
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push_str(&line);
        }
    }

    Ok(())
}
