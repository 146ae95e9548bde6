//! Private temporary directories owned by stateful tools.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;
use tracing::debug;

use crate::descriptor::CleanupHook;
use crate::error::{ToolError, ToolResult};

/// Temporary directory released through the executor's cleanup.
///
/// The directory is also removed if the workspace is dropped without being
/// released, so a failed executor build never leaks it.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    dir: Mutex<Option<TempDir>>,
}

impl Workspace {
    /// Creates a fresh directory under the system temp dir.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Execution`] if the directory cannot be created.
    pub fn create(prefix: &str) -> ToolResult<Arc<Self>> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .map_err(|err| ToolError::execution(format!("failed to create workspace: {err}")))?;
        let path = dir.path().to_path_buf();
        debug!(path = %path.display(), "workspace created");
        Ok(Arc::new(Self {
            path,
            dir: Mutex::new(Some(dir)),
        }))
    }

    /// Returns the directory path. It stays valid until release.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `true` once the directory was removed.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.dir.lock().map_or(true, |dir| dir.is_none())
    }
}

#[async_trait]
impl CleanupHook for Workspace {
    async fn release(&self) -> ToolResult<()> {
        let dir = self
            .dir
            .lock()
            .map_err(|_| ToolError::execution("workspace lock poisoned"))?
            .take();

        let Some(dir) = dir else {
            return Ok(());
        };

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || dir.close())
            .await
            .map_err(|err| ToolError::execution(format!("workspace release task failed: {err}")))?
            .map_err(|err| {
                ToolError::execution(format!("failed to remove {}: {err}", path.display()))
            })?;
        debug!(path = %self.path.display(), "workspace released");
        Ok(())
    }
}
