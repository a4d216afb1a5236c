//! Request-scoped tracking of temporary artifacts.
//!
//! Every artifact tracked by a [`CleanupCoordinator`] is released exactly
//! once: either individually through [`CleanupCoordinator::release`] or by
//! the final [`CleanupCoordinator::sweep`]. Dropping a coordinator with
//! outstanding disk artifacts (panic, cancelled future) removes them
//! synchronously.

use std::{
    io,
    path::{Path, PathBuf},
};

/// Temporary artifact created while staging an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TempArtifact {
    /// A staged file on the local filesystem.
    Disk(PathBuf),
    /// A staged in-memory buffer of the given size.
    Memory {
        /// Buffer size in bytes.
        size: u64,
    },
}

/// Handle returned by [`CleanupCoordinator::track`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArtifactId(usize);

#[derive(Debug)]
struct Entry {
    artifact: TempArtifact,
    released: bool,
}

/// Tracks the temporary artifacts of one request.
#[derive(Debug, Default)]
pub struct CleanupCoordinator {
    entries: Vec<Entry>,
}

impl CleanupCoordinator {
    /// Creates an empty coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking `artifact`.
    pub fn track(&mut self, artifact: TempArtifact) -> ArtifactId {
        self.entries.push(Entry {
            artifact,
            released: false,
        });
        ArtifactId(self.entries.len() - 1)
    }

    /// Releases one artifact. Unknown or already released ids are a no-op.
    ///
    /// Returns `true` if this call released the artifact.
    pub async fn release(&mut self, id: ArtifactId) -> bool {
        let Some(entry) = self.entries.get_mut(id.0) else {
            return false;
        };
        if entry.released {
            return false;
        }
        entry.released = true;

        if let TempArtifact::Disk(path) = &entry.artifact {
            remove_staged_file(path).await;
        }
        true
    }

    /// Releases every artifact still outstanding and returns how many.
    pub async fn sweep(&mut self) -> usize {
        let mut released = 0;
        for index in 0..self.entries.len() {
            if self.release(ArtifactId(index)).await {
                released += 1;
            }
        }
        if released > 0 {
            tracing::debug!(released, "swept temporary artifacts");
        }
        released
    }

    /// Number of tracked artifacts not yet released.
    pub fn outstanding(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.released).count()
    }

    /// Number of artifacts ever tracked.
    pub fn tracked(&self) -> usize {
        self.entries.len()
    }
}

impl Drop for CleanupCoordinator {
    fn drop(&mut self) {
        for entry in self.entries.iter_mut().filter(|entry| !entry.released) {
            entry.released = true;
            if let TempArtifact::Disk(path) = &entry.artifact {
                match std::fs::remove_file(path) {
                    Ok(()) => {}
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => tracing::warn!(
                        error = %err,
                        path = %path.display(),
                        "failed to remove temporary file on drop"
                    ),
                }
            }
        }
    }
}

async fn remove_staged_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed temporary file"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(
            error = %err,
            path = %path.display(),
            "failed to remove temporary file"
        ),
    }
}
