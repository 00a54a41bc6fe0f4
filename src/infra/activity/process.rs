//! Activity units as child processes speaking JSON lines over stdio.
//!
//! The `start` message is written as a single line on the child's stdin,
//! which is then closed. Every non-empty stdout line is parsed as a status
//! message; lines that do not parse, including ones that are not valid
//! UTF-8, are logged and skipped. Stderr is
//! forwarded to `tracing`. When stdout closes the child is reaped and its
//! exit code reported.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, error, warn};

use crate::core::{ActivityChannel, ActivityLauncher, PoolError, PoolMessage, UnitEvent, UnitMessage};

/// Launches each activity as a subprocess.
///
/// By default the resolved reference is executed directly. With an
/// interpreter configured the command becomes
/// `<interpreter> <args..> <activity_ref>`.
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
    interpreter: Option<PathBuf>,
    args: Vec<String>,
    env: HashMap<String, String>,
    working_dir: Option<PathBuf>,
}

impl ProcessLauncher {
    /// Execute activity references directly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run activities through an interpreter such as `sh` or `python3`.
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<PathBuf>) -> Self {
        self.interpreter = Some(interpreter.into());
        self
    }

    /// Extra argument placed before the activity reference.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Environment variable set for every unit.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Working directory for every unit.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn command(&self, activity_ref: &str) -> Command {
        let mut cmd = match &self.interpreter {
            Some(interpreter) => {
                let mut cmd = Command::new(interpreter);
                cmd.args(&self.args).arg(activity_ref);
                cmd
            }
            None => {
                let mut cmd = Command::new(activity_ref);
                cmd.args(&self.args);
                cmd
            }
        };
        cmd.envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

#[async_trait]
impl ActivityLauncher for ProcessLauncher {
    async fn launch(&self, activity_ref: &str) -> Result<Box<dyn ActivityChannel>, PoolError> {
        let mut child = self.command(activity_ref).spawn().map_err(|e| {
            error!(activity = %activity_ref, error = %e, "failed to spawn activity process");
            if e.kind() == ErrorKind::NotFound {
                PoolError::ActivityNotFound(activity_ref.to_owned())
            } else {
                PoolError::Io(e)
            }
        })?;
        debug!(activity = %activity_ref, pid = ?child.id(), "activity process spawned");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PoolError::Protocol("failed to open activity stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PoolError::Protocol("failed to open activity stdout".into()))?;
        if let Some(stderr) = child.stderr.take() {
            let activity = activity_ref.to_owned();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                let mut line = Vec::new();
                loop {
                    line.clear();
                    match reader.read_until(b'\n', &mut line).await {
                        Ok(0) => break,
                        Ok(_) => {
                            let text = String::from_utf8_lossy(&line);
                            let trimmed = text.trim();
                            if !trimmed.is_empty() {
                                warn!(activity = %activity, stderr = %trimmed, "activity stderr");
                            }
                        }
                        Err(e) => {
                            error!(activity = %activity, error = %e, "error reading activity stderr");
                            break;
                        }
                    }
                }
            });
        }

        Ok(Box::new(ProcessChannel {
            activity: activity_ref.to_owned(),
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            line: Vec::new(),
        }))
    }
}

struct ProcessChannel {
    activity: String,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    /// Bytes of the stdout line being read. Kept across `receive` calls so a
    /// cancelled read resumes where it stopped.
    line: Vec<u8>,
}

impl ProcessChannel {
    fn parse_line(&self, raw: &[u8]) -> Option<UnitMessage> {
        let text = String::from_utf8_lossy(raw);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        match serde_json::from_str::<UnitMessage>(trimmed) {
            Ok(message) => Some(message),
            Err(e) => {
                let preview: String = trimmed.chars().take(200).collect();
                warn!(activity = %self.activity, error = %e, preview = %preview, "ignoring unparseable activity output");
                None
            }
        }
    }

    async fn reap(&mut self) -> UnitEvent {
        match self.child.wait().await {
            Ok(status) => {
                debug!(activity = %self.activity, code = ?status.code(), "activity process exited");
                UnitEvent::Exit { code: status.code() }
            }
            Err(e) => {
                warn!(activity = %self.activity, error = %e, "failed to reap activity process");
                UnitEvent::Exit { code: None }
            }
        }
    }
}

#[async_trait]
impl ActivityChannel for ProcessChannel {
    async fn send(&mut self, message: PoolMessage) -> Result<(), PoolError> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(PoolError::Protocol("activity stdin already closed".into()));
        };
        let mut line = serde_json::to_vec(&message)?;
        line.push(b'\n');
        stdin.write_all(&line).await?;
        stdin.flush().await?;
        if matches!(message, PoolMessage::Start { .. }) {
            // EOF on stdin tells the unit no further input follows.
            self.stdin = None;
        }
        Ok(())
    }

    async fn receive(&mut self) -> UnitEvent {
        loop {
            match self.stdout.read_until(b'\n', &mut self.line).await {
                Ok(0) if self.line.is_empty() => return self.reap().await,
                Ok(_) => {
                    let line = std::mem::take(&mut self.line);
                    if let Some(message) = self.parse_line(&line) {
                        return UnitEvent::Message(message);
                    }
                }
                Err(e) => {
                    error!(activity = %self.activity, error = %e, "error reading activity stdout");
                    return self.reap().await;
                }
            }
        }
    }

    async fn terminate(&mut self) -> Result<(), PoolError> {
        self.stdin = None;
        self.child.kill().await?;
        debug!(activity = %self.activity, "activity process killed");
        Ok(())
    }
}
