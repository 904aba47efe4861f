use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time;
use tracing::{info, warn};

use crate::error::{EngineError, Result};

/// Name of the external rendering binary.
pub const ENGINE_BINARY: &str = "linux-wallpaperengine";

/// Hard ceiling on a `-l` invocation; some engine builds never stop
/// emitting banner text.
pub const LISTING_TIMEOUT: Duration = Duration::from_secs(5);
/// Grace given to a timed-out listing process after the kill.
pub const LISTING_GRACE: Duration = Duration::from_secs(2);
/// Wait after terminating the held render process before falling back to a
/// process-name kill.
pub const STOP_WAIT: Duration = Duration::from_secs(1);

/// Resolves a binary the way the shell would: paths with a separator are
/// checked directly, bare names are looked up on PATH.
pub fn locate_engine(binary: &str) -> Option<PathBuf> {
    if binary.contains('/') {
        let candidate = Path::new(binary);
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

/// Result of one property-listing invocation. `output` is the combined
/// stdout+stderr text; it is kept even on timeout or failure, since partial
/// garbled text is the steady state of this integration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingOutcome {
    pub output: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

#[async_trait]
pub trait PropertyLister: Send + Sync {
    async fn list_properties(&self, background_id: &str) -> Result<ListingOutcome>;
}

/// Default lister: runs `<binary> -l <id>` with both pipes captured.
pub struct EngineLister {
    binary: String,
    timeout: Duration,
    grace: Duration,
}

impl EngineLister {
    pub fn new() -> Self {
        Self::with_binary(ENGINE_BINARY)
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout: LISTING_TIMEOUT,
            grace: LISTING_GRACE,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration, grace: Duration) -> Self {
        self.timeout = timeout;
        self.grace = grace;
        self
    }
}

impl Default for EngineLister {
    fn default() -> Self {
        Self::new()
    }
}

async fn drain(mut pipe: impl AsyncRead + Unpin) -> String {
    let mut buffer = Vec::new();
    let _ = pipe.read_to_end(&mut buffer).await;
    String::from_utf8_lossy(&buffer).into_owned()
}

#[async_trait]
impl PropertyLister for EngineLister {
    async fn list_properties(&self, background_id: &str) -> Result<ListingOutcome> {
        if locate_engine(&self.binary).is_none() {
            return Err(EngineError::EngineNotFound(self.binary.clone()));
        }

        let mut child = Command::new(&self.binary)
            .arg("-l")
            .arg(background_id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Process("listing stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Process("listing stderr not captured".into()))?;
        let stdout_task = tokio::spawn(drain(stdout));
        let stderr_task = tokio::spawn(drain(stderr));

        let (exit_code, timed_out) = match time::timeout(self.timeout, child.wait()).await {
            Ok(status) => (status?.code(), false),
            Err(_) => {
                warn!(background_id, "property listing timed out, killing");
                let _ = child.start_kill();
                let status = time::timeout(self.grace, child.wait()).await;
                (status.ok().and_then(|s| s.ok()).and_then(|s| s.code()), true)
            }
        };

        let stdout_text = stdout_task
            .await
            .map_err(|err| EngineError::Task(err.to_string()))?;
        let stderr_text = stderr_task
            .await
            .map_err(|err| EngineError::Task(err.to_string()))?;

        let mut output = stdout_text;
        if !stderr_text.is_empty() {
            output.push('\n');
            output.push_str(&stderr_text);
        }

        Ok(ListingOutcome {
            output: output.trim().to_owned(),
            stderr: stderr_text,
            exit_code,
            timed_out,
        })
    }
}

/// Handle on the detached render process. Holding at most one child; a
/// fresh start replaces nothing by itself, callers stop first.
pub struct EngineProcess {
    binary: String,
    child: Mutex<Option<Child>>,
}

impl EngineProcess {
    pub fn new() -> Self {
        Self::with_binary(ENGINE_BINARY)
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            child: Mutex::new(None),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Spawns the render invocation detached from our own stdio. Fails
    /// before spawning when the binary is absent.
    pub async fn start(&self, args: &[String]) -> Result<()> {
        if locate_engine(&self.binary).is_none() {
            return Err(EngineError::EngineNotFound(self.binary.clone()));
        }
        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        info!(pid = child.id(), "wallpaper engine started");
        *self.child.lock() = Some(child);
        Ok(())
    }

    /// Terminates the held child and waits briefly. When no handle is held
    /// (or the child ignores the kill), falls back to a system-wide
    /// process-name kill so orphans from earlier runs are cleaned up too.
    pub async fn stop(&self) -> Result<()> {
        let held = self.child.lock().take();
        let mut stopped_internal = false;
        if let Some(mut child) = held {
            let _ = child.start_kill();
            match time::timeout(STOP_WAIT, child.wait()).await {
                Ok(_) => stopped_internal = true,
                Err(_) => warn!("held engine process did not exit in time"),
            }
        }
        if !stopped_internal {
            match Command::new("pkill").arg("-f").arg(&self.binary).status().await {
                Ok(_) => info!("issued process-name kill for the engine"),
                Err(err) => warn!(%err, "fallback pkill failed"),
            }
        }
        Ok(())
    }
}

impl Default for EngineProcess {
    fn default() -> Self {
        Self::new()
    }
}
