use std::fs;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use anyhow::{Context, Result};

/// Removes scratch paths without blocking the deploy pipeline.
///
/// Removal is best-effort: failures and leftovers are logged at debug level
/// and never surface to callers.
#[derive(Clone, Debug)]
pub struct AsyncDeleter {
    mode: DeleteMode,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DeleteMode {
    Detached,
    Inline,
}

impl AsyncDeleter {
    /// Deletions run on a detached background thread.
    pub fn detached() -> Self {
        AsyncDeleter {
            mode: DeleteMode::Detached,
        }
    }

    /// Deletions run on the calling thread. Tests use this to observe the
    /// scratch directory after a pipeline run.
    pub fn inline() -> Self {
        AsyncDeleter {
            mode: DeleteMode::Inline,
        }
    }

    pub fn queue(&self, paths: Vec<PathBuf>) {
        if paths.is_empty() {
            return;
        }
        match self.mode {
            DeleteMode::Inline => delete_all(&paths),
            DeleteMode::Detached => {
                let spawned = thread::Builder::new()
                    .name("hub-scratch-delete".to_owned())
                    .spawn(move || delete_all(&paths));
                if let Err(err) = spawned {
                    tracing::debug!("scratch deletion thread failed to start: {err}");
                }
            }
        }
    }
}

fn delete_all(paths: &[PathBuf]) {
    for path in paths {
        if let Err(err) = remove_recursively(path) {
            tracing::debug!("scratch cleanup left {} behind: {err}", path.display());
        }
    }
}

fn remove_recursively(path: &Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

/// Working area for in-flight deploys, wiped when the hub opens.
///
/// Paths are reserved through an atomic counter, so concurrent deploys never
/// collide.
#[derive(Debug)]
pub struct ScratchSpace {
    root: PathBuf,
    counter: AtomicU64,
    deleter: AsyncDeleter,
}

impl ScratchSpace {
    /// Clears any previous scratch contents and starts with a fresh counter.
    pub fn init(root: PathBuf, deleter: AsyncDeleter) -> Result<Self> {
        if root.exists() {
            fs::remove_dir_all(&root)
                .with_context(|| format!("failed to clear scratch directory {}", root.display()))?;
        }
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create scratch directory {}", root.display()))?;
        Ok(ScratchSpace {
            root,
            counter: AtomicU64::new(0),
            deleter,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reserves a fresh scratch path. `extension` may be empty for paths that
    /// become directories.
    pub fn create_path(&self, prefix: &str, extension: &str) -> io::Result<PathBuf> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let file_name = if extension.is_empty() {
            format!("{prefix}_{n}")
        } else {
            format!("{prefix}_{n}.{extension}")
        };
        let path = self.root.join(file_name);
        remove_recursively(&path)?;
        Ok(path)
    }

    /// Hands paths to the deleter; callers do not wait for removal.
    pub fn schedule_delete(&self, paths: Vec<PathBuf>) {
        self.deleter.queue(paths);
    }
}

/// Collects the scratch paths of one pipeline run and schedules their removal
/// when dropped, on success and failure alike.
pub struct ScratchGuard<'a> {
    scratch: &'a ScratchSpace,
    paths: Vec<PathBuf>,
}

impl<'a> ScratchGuard<'a> {
    pub fn new(scratch: &'a ScratchSpace) -> Self {
        ScratchGuard {
            scratch,
            paths: Vec::new(),
        }
    }

    pub fn track(&mut self, path: PathBuf) -> PathBuf {
        self.paths.push(path.clone());
        path
    }
}

impl Drop for ScratchGuard<'_> {
    fn drop(&mut self) {
        self.scratch.schedule_delete(mem::take(&mut self.paths));
    }
}
