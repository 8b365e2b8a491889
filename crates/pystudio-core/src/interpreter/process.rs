//! CPython child process backend.
//!
//! The interpreter runs as a long-lived child. A driver program (see
//! `driver.py`) is passed on the command line; it keeps private duplicates of
//! the pipes for the JSON protocol and points the guest's own stdin at the
//! null device and stdout at stderr, so guest output outside a sandbox only
//! ever reaches the log.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use which::which;

use super::protocol::{Reply, Request};
use super::{Interpreter, InterpreterLauncher};
use crate::config::types::{InterpreterConfig, StudioConfig};
use crate::core_types::{CapturedOutput, Evaluation};
use crate::errors::StudioError;

const DRIVER_SOURCE: &str = include_str!("driver.py");
const BOOTSTRAP: &str = "import sys; exec(compile(sys.argv[1], '<pystudio-driver>', 'exec'))";
const PYTHON_CANDIDATES: &[&str] = &["python3", "python"];

// ----------------- Launcher -----------------

#[derive(Debug, Clone)]
pub struct PythonLauncher {
    config: InterpreterConfig,
    execution_timeout: Option<Duration>,
}

impl PythonLauncher {
    pub fn new(config: InterpreterConfig) -> Self {
        Self {
            config,
            execution_timeout: None,
        }
    }

    pub fn from_config(config: &StudioConfig) -> Self {
        Self::new(config.interpreter.clone()).with_execution_timeout(config.execution.timeout())
    }

    pub fn with_execution_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.execution_timeout = timeout;
        self
    }

    pub fn resolve_python(&self) -> Result<PathBuf, StudioError> {
        if let Some(python) = &self.config.python {
            return Ok(python.clone());
        }
        PYTHON_CANDIDATES
            .iter()
            .find_map(|candidate| which(candidate).ok())
            .ok_or_else(|| {
                StudioError::InterpreterUnavailable(
                    "Could not find python3 or python on PATH; set interpreter.python or PYSTUDIO_PYTHON"
                        .to_string(),
                )
            })
    }
}

#[async_trait]
impl InterpreterLauncher for PythonLauncher {
    async fn launch(&self) -> Result<Arc<dyn Interpreter>, StudioError> {
        let python = self.resolve_python()?;
        let process = PythonProcess::spawn(python, &self.config, self.execution_timeout).await?;
        Ok(Arc::new(process))
    }
}

// ----------------- Process -----------------

struct Channel {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

pub struct PythonProcess {
    channel: Mutex<Channel>,
    child: StdMutex<Child>,
    version: String,
    // Set once the protocol can no longer be trusted: exchange abandoned
    // mid-flight, I/O failure, or timeout kill.
    broken: Arc<AtomicBool>,
    execution_timeout: Option<Duration>,
}

/// Marks the process broken unless disarmed, covering futures dropped between
/// writing a request and reading its reply.
struct ExchangeGuard<'a> {
    broken: &'a AtomicBool,
    armed: bool,
}

impl<'a> ExchangeGuard<'a> {
    fn new(broken: &'a AtomicBool) -> Self {
        Self { broken, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ExchangeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            log::warn!("Interpreter exchange abandoned mid-flight; the process will be replaced");
            self.broken.store(true, Ordering::SeqCst);
        }
    }
}

impl PythonProcess {
    pub async fn spawn(
        python: PathBuf,
        config: &InterpreterConfig,
        execution_timeout: Option<Duration>,
    ) -> Result<Self, StudioError> {
        log::info!("Starting Python interpreter: {}", python.display());

        let mut cmd = Command::new(&python);
        cmd.args(&config.args)
            .arg("-u")
            .arg("-c")
            .arg(BOOTSTRAP)
            .arg(DRIVER_SOURCE)
            .envs(&config.env)
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            StudioError::InterpreterUnavailable(format!(
                "Failed to start {}: {}",
                python.display(),
                e
            ))
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            StudioError::InterpreterUnavailable("Interpreter stdin was not captured".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            StudioError::InterpreterUnavailable("Interpreter stdout was not captured".to_string())
        })?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_stderr(stderr));
        }

        let mut lines = BufReader::new(stdout).lines();
        let startup_timeout = config.startup_timeout();
        let handshake = tokio::time::timeout(startup_timeout, lines.next_line())
            .await
            .map_err(|_| {
                StudioError::InterpreterUnavailable(format!(
                    "Interpreter did not become ready within {:?}",
                    startup_timeout
                ))
            })?
            .map_err(|e| StudioError::InterpreterUnavailable(format!("Handshake failed: {}", e)))?
            .ok_or_else(|| {
                StudioError::InterpreterUnavailable(
                    "Interpreter exited during startup (see debug log for its stderr)".to_string(),
                )
            })?;

        let version = match serde_json::from_str::<Reply>(&handshake) {
            Ok(Reply::Ok { id: Some(0), value, .. }) => value.unwrap_or_default(),
            Ok(other) => {
                return Err(StudioError::InterpreterUnavailable(format!(
                    "Unexpected handshake from interpreter: {:?}",
                    other
                )))
            }
            Err(e) => {
                return Err(StudioError::InterpreterUnavailable(format!(
                    "Malformed handshake from interpreter: {}",
                    e
                )))
            }
        };
        log::info!("Python {} ready (pid {:?})", version, child.id());

        Ok(Self {
            channel: Mutex::new(Channel {
                stdin,
                stdout: lines,
                next_id: 0,
            }),
            child: StdMutex::new(child),
            version,
            broken: Arc::new(AtomicBool::new(false)),
            execution_timeout,
        })
    }

    fn kill(&self) {
        self.broken.store(true, Ordering::SeqCst);
        if let Ok(mut child) = self.child.lock() {
            if let Err(e) = child.start_kill() {
                log::debug!("Interpreter kill failed (already exited?): {}", e);
            }
        }
    }

    async fn exchange<'a, F>(&self, build: F, deadline: Option<Duration>) -> Result<Reply, StudioError>
    where
        F: FnOnce(u64) -> Request<'a>,
    {
        if !self.is_alive() {
            return Err(StudioError::InterpreterUnavailable(
                "Interpreter process is no longer running".to_string(),
            ));
        }

        let mut channel = self.channel.lock().await;
        channel.next_id += 1;
        let request = build(channel.next_id);
        let id = request.id();
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');
        log::debug!("-> {} #{}", request.op(), id);

        let guard = ExchangeGuard::new(&self.broken);
        let exchange = round_trip(&mut channel, &line, id);
        let outcome = match deadline {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(result) => result,
                Err(_) => {
                    log::warn!("Execution exceeded {:?}; killing interpreter", limit);
                    guard.disarm();
                    self.kill();
                    return Err(StudioError::Timeout(limit));
                }
            },
            None => exchange.await,
        };
        guard.disarm();

        if outcome.is_err() {
            self.kill();
        }
        log::debug!("<- #{} {}", id, if outcome.is_ok() { "ok" } else { "failed" });
        outcome
    }

    fn expect_ok(op: &str, reply: Reply) -> Result<Reply, StudioError> {
        match reply {
            ok @ Reply::Ok { .. } => Ok(ok),
            Reply::Fault { message, .. } => Err(StudioError::SandboxError(format!(
                "Driver failed during {}: {}",
                op, message
            ))),
            Reply::Raised { error, .. } => Err(StudioError::ProtocolError(format!(
                "Driver raised {} during {}: {}",
                error.kind, op, error.message
            ))),
        }
    }
}

#[async_trait]
impl Interpreter for PythonProcess {
    async fn execute(&self, source: &str) -> Result<Evaluation, StudioError> {
        let reply = self
            .exchange(|id| Request::Execute { id, source }, self.execution_timeout)
            .await?;
        match reply {
            Reply::Ok { value, .. } => Ok(Evaluation::Returned(value)),
            Reply::Raised { error, .. } => Ok(Evaluation::Raised(error)),
            Reply::Fault { message, .. } => Err(StudioError::ProtocolError(message)),
        }
    }

    async fn install_io(&self, inputs: &[String]) -> Result<(), StudioError> {
        let reply = self.exchange(|id| Request::Install { id, inputs }, None).await?;
        Self::expect_ok("install", reply).map(|_| ())
    }

    async fn collect_io(&self) -> Result<CapturedOutput, StudioError> {
        let reply = self.exchange(|id| Request::Collect { id }, None).await?;
        match reply {
            Reply::Ok { stdout, stderr, .. } => Ok(CapturedOutput {
                stdout: stdout.unwrap_or_default(),
                stderr: stderr.unwrap_or_default(),
            }),
            other => Self::expect_ok("collect", other).map(|_| CapturedOutput::default()),
        }
    }

    async fn restore_io(&self) -> Result<(), StudioError> {
        let reply = self.exchange(|id| Request::Restore { id }, None).await?;
        Self::expect_ok("restore", reply).map(|_| ())
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn is_alive(&self) -> bool {
        if self.broken.load(Ordering::SeqCst) {
            return false;
        }
        match self.child.lock() {
            Ok(mut child) => matches!(child.try_wait(), Ok(None)),
            Err(_) => false,
        }
    }
}

async fn round_trip(channel: &mut Channel, line: &str, id: u64) -> Result<Reply, StudioError> {
    channel.stdin.write_all(line.as_bytes()).await?;
    channel.stdin.flush().await?;
    loop {
        let reply_line = channel.stdout.next_line().await?.ok_or_else(|| {
            StudioError::InterpreterUnavailable("Interpreter process exited".to_string())
        })?;
        let reply: Reply = serde_json::from_str(&reply_line)?;
        if reply.id() == Some(id) {
            return Ok(reply);
        }
        log::warn!("Discarding reply for request {:?} while waiting for #{}", reply.id(), id);
    }
}

async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        log::debug!(target: "pystudio::guest", "{}", line);
    }
}
