//! Subprocess execution bound to a [`CallContext`].

use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use toolplan_primitives::{CallContext, Interruption};
use tracing::{debug, warn};

use crate::error::{ToolError, ToolResult};

/// Captured result of a finished subprocess.
#[derive(Debug)]
pub struct CommandOutput {
    /// Exit status.
    pub status: ExitStatus,
    /// Decoded standard output.
    pub stdout: String,
    /// Decoded standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns stdout followed by stderr, trimmed.
    #[must_use]
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim_end();
        let stderr = self.stderr.trim_end();
        match (stdout.is_empty(), stderr.is_empty()) {
            (_, true) => stdout.trim().to_owned(),
            (true, false) => stderr.trim().to_owned(),
            (false, false) => format!("{stdout}\n{stderr}").trim().to_owned(),
        }
    }

    /// Converts a non-zero exit into [`ToolError::Execution`] carrying the output.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Execution`] when the process did not succeed.
    pub fn into_success(self, program: &str) -> ToolResult<String> {
        let combined = self.combined();
        if self.status.success() {
            Ok(combined)
        } else {
            Err(ToolError::execution(format!(
                "`{program}` exited with {}: {combined}",
                self.status
            )))
        }
    }
}

enum Race {
    Finished(std::io::Result<ExitStatus>, Vec<u8>, Vec<u8>),
    Interrupted(Interruption),
}

/// Spawns `command` and waits for it, killing the child and every process it
/// started if `ctx` fires first.
///
/// # Errors
///
/// Returns [`ToolError::Cancelled`] on cancellation or deadline and
/// [`ToolError::Execution`] if the process cannot be spawned or awaited.
pub async fn run(ctx: &CallContext, tool: &str, mut command: Command) -> ToolResult<CommandOutput> {
    if let Some(cause) = ctx.interruption() {
        return Err(ToolError::cancelled(tool, cause));
    }

    let program = command.as_std().get_program().to_string_lossy().into_owned();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command
        .spawn()
        .map_err(|err| ToolError::execution(format!("failed to spawn `{program}`: {err}")))?;
    debug!(tool, program = %program, pid = ?child.id(), "subprocess spawned");
    // Kills whatever the child started if this future is dropped mid-run.
    let mut group = ProcessGroup::new(child.id());

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let race = tokio::select! {
        cause = ctx.done() => Race::Interrupted(cause),
        (status, out, err) = async {
            tokio::join!(child.wait(), drain(stdout), drain(stderr))
        } => Race::Finished(status, out, err),
    };

    match race {
        Race::Interrupted(cause) => {
            group.kill();
            if let Err(err) = child.kill().await {
                warn!(tool, program = %program, error = %err, "failed to kill subprocess");
            }
            debug!(tool, program = %program, cause = cause.label(), "subprocess terminated");
            Err(ToolError::cancelled(tool, cause))
        }
        Race::Finished(status, stdout, stderr) => {
            group.disarm();
            let status = status.map_err(|err| {
                ToolError::execution(format!("failed to wait for `{program}`: {err}"))
            })?;
            debug!(tool, program = %program, %status, "subprocess exited");
            Ok(CommandOutput {
                status,
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            })
        }
    }
}

async fn drain<R>(reader: Option<R>) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        // partial output is still useful in error messages
        if let Err(err) = reader.read_to_end(&mut buf).await {
            warn!(error = %err, read = buf.len(), "failed to read subprocess output");
        }
    }
    buf
}

/// Process group of a spawned child, killed as a whole unless disarmed.
///
/// The child leads its own group, so grandchildren started by a shell die
/// with it.
struct ProcessGroup {
    pgid: Option<i32>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self {
            pgid: pid.and_then(|pid| i32::try_from(pid).ok()),
        }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }

    #[cfg(unix)]
    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            // SAFETY: killpg has no memory-safety preconditions; the group id
            // comes from a child this process spawned with `process_group(0)`.
            let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
            if rc != 0 {
                debug!(
                    pgid,
                    error = %std::io::Error::last_os_error(),
                    "process group already gone"
                );
            }
        }
    }

    #[cfg(not(unix))]
    fn kill(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}
