//! Child process running an exec plugin.

use super::protocol::{
    PluginInfo, PluginMethod, PluginRequest, PluginResponse, PluginResult, PROTOCOL_VERSION,
};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecHostError {
    #[error("failed to spawn plugin process {path}: {source}")]
    SpawnFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("plugin process has no stdin")]
    NoStdin,
    #[error("plugin process has no stdout")]
    NoStdout,
    #[error("failed to write to plugin: {0}")]
    WriteError(std::io::Error),
    #[error("failed to read from plugin: {0}")]
    ReadError(std::io::Error),
    #[error("failed to encode plugin request: {0}")]
    EncodeError(serde_json::Error),
    #[error("failed to parse plugin response: {0}")]
    ParseError(serde_json::Error),
    #[error("plugin returned error: {0}")]
    PluginError(String),
    #[error("protocol version mismatch: expected {expected}, got {actual}")]
    ProtocolMismatch { expected: u32, actual: u32 },
    #[error("unexpected response type for method")]
    UnexpectedResponse,
    #[error("request/response ID mismatch: sent {sent}, received {received}")]
    IdMismatch { sent: u64, received: u64 },
    #[error("plugin process terminated unexpectedly")]
    ProcessTerminated,
}

#[derive(Debug, Clone)]
pub struct ExecConfig {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

struct Pipes {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Host for one plugin process.
///
/// Requests are serialised: a request line and its response line are
/// exchanged under a single lock so that concurrent callers never read
/// each other's responses.
pub struct ExecPluginHost {
    config: ExecConfig,
    child: Mutex<Option<Child>>,
    pipes: Mutex<Option<Pipes>>,
    request_id: AtomicU64,
}

impl ExecPluginHost {
    pub fn new(config: ExecConfig) -> Self {
        Self {
            config,
            child: Mutex::new(None),
            pipes: Mutex::new(None),
            request_id: AtomicU64::new(1),
        }
    }

    /// Spawn the process and perform the `Initialize` handshake.
    pub fn start(&self) -> Result<PluginInfo, ExecHostError> {
        let mut cmd = Command::new(&self.config.executable);
        cmd.args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| ExecHostError::SpawnFailed {
            path: self.config.executable.clone(),
            source,
        })?;
        let stdin = child.stdin.take().ok_or(ExecHostError::NoStdin)?;
        let stdout = child.stdout.take().ok_or(ExecHostError::NoStdout)?;

        *lock(&self.child) = Some(child);
        *lock(&self.pipes) = Some(Pipes {
            stdin,
            stdout: BufReader::new(stdout),
        });

        match self.initialize() {
            Ok(info) => Ok(info),
            Err(err) => {
                self.stop();
                Err(err)
            }
        }
    }

    /// Ask the plugin to shut down, then make sure the process is gone.
    ///
    /// A request in flight is not waited for: killing the process ends it.
    pub fn stop(&self) {
        let idle = matches!(self.pipes.try_lock().map(|pipes| pipes.is_some()), Ok(true));
        if idle {
            if let Err(err) = self.send_request(PluginMethod::Shutdown) {
                tracing::debug!(error = %err, "exec plugin did not acknowledge shutdown");
            }
        }

        if let Some(mut child) = lock(&self.child).take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        *lock(&self.pipes) = None;
    }

    pub fn is_running(&self) -> bool {
        lock(&self.child)
            .as_mut()
            .map(|child| matches!(child.try_wait(), Ok(None)))
            .unwrap_or(false)
    }

    /// Send one request and wait for its response line.
    pub fn send_request(&self, method: PluginMethod) -> Result<PluginResult, ExecHostError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let json = serde_json::to_string(&PluginRequest { id, method })
            .map_err(ExecHostError::EncodeError)?;

        let line = {
            let mut guard = lock(&self.pipes);
            let pipes = guard.as_mut().ok_or(ExecHostError::ProcessTerminated)?;
            writeln!(pipes.stdin, "{json}").map_err(ExecHostError::WriteError)?;
            pipes.stdin.flush().map_err(ExecHostError::WriteError)?;

            let mut line = String::new();
            pipes
                .stdout
                .read_line(&mut line)
                .map_err(ExecHostError::ReadError)?;
            if line.is_empty() {
                return Err(ExecHostError::ProcessTerminated);
            }
            line
        };

        let response: PluginResponse =
            serde_json::from_str(&line).map_err(ExecHostError::ParseError)?;
        if response.id != id {
            return Err(ExecHostError::IdMismatch {
                sent: id,
                received: response.id,
            });
        }
        if let PluginResult::Error(err) = response.result {
            return Err(ExecHostError::PluginError(err.message));
        }
        Ok(response.result)
    }

    fn initialize(&self) -> Result<PluginInfo, ExecHostError> {
        match self.send_request(PluginMethod::Initialize)? {
            PluginResult::Initialized(info) => {
                if info.protocol_version != PROTOCOL_VERSION {
                    return Err(ExecHostError::ProtocolMismatch {
                        expected: PROTOCOL_VERSION,
                        actual: info.protocol_version,
                    });
                }
                tracing::info!(
                    plugin = %info.name,
                    version = %info.version,
                    browsers = info.browsers.len(),
                    players = info.players.len(),
                    "exec plugin initialized"
                );
                Ok(info)
            }
            _ => Err(ExecHostError::UnexpectedResponse),
        }
    }
}

impl Drop for ExecPluginHost {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
