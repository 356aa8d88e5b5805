//! Mounting a [`CapFs`] on a directory.
//!
//! [`mount`] blocks until the filesystem is unmounted; [`spawn_mount`]
//! serves it from a background thread and returns a [`MountHandle`] that
//! unmounts on drop.

use crate::error::MountError;
use crate::filesystem::CapFs;
use fuser::BackgroundSession;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

/// Timeout for a graceful session join before forcing unmount.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Checks that `mountpoint` exists and is a directory.
pub fn validate_mountpoint(mountpoint: &Path) -> Result<(), MountError> {
    match std::fs::metadata(mountpoint) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(MountError::InvalidMountpoint(format!(
            "{} is not a directory",
            mountpoint.display()
        ))),
        Err(e) => Err(MountError::InvalidMountpoint(format!(
            "{}: {e}",
            mountpoint.display()
        ))),
    }
}

/// Mounts `fs` and serves requests on the calling thread until unmounted.
pub fn mount(fs: CapFs, mountpoint: &Path) -> Result<(), MountError> {
    validate_mountpoint(mountpoint)?;
    let options = fs.config().mount_options();
    tracing::info!(mountpoint = %mountpoint.display(), "Mounting FUSE filesystem");
    fuser::mount2(fs, mountpoint, &options).map_err(MountError::Mount)?;
    tracing::info!(mountpoint = %mountpoint.display(), "FUSE filesystem unmounted");
    Ok(())
}

/// Mounts `fs` and serves requests from a background thread.
pub fn spawn_mount(fs: CapFs, mountpoint: &Path) -> Result<MountHandle, MountError> {
    validate_mountpoint(mountpoint)?;
    let options = fs.config().mount_options();
    tracing::info!(mountpoint = %mountpoint.display(), "Mounting FUSE filesystem");
    let session = fuser::spawn_mount2(fs, mountpoint, &options).map_err(MountError::Mount)?;
    Ok(MountHandle {
        session: Some(session),
        mountpoint: mountpoint.to_path_buf(),
    })
}

/// Handle to a mounted filesystem. Dropping it unmounts.
pub struct MountHandle {
    session: Option<BackgroundSession>,
    mountpoint: PathBuf,
}

impl MountHandle {
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// Unmounts and waits for the session to end.
    pub fn unmount(mut self) {
        tracing::info!(mountpoint = %self.mountpoint.display(), "Unmounting FUSE filesystem");
        if let Some(session) = self.session.take() {
            // May block while files are open
            session.join();
        }
        tracing::info!(mountpoint = %self.mountpoint.display(), "FUSE unmount successful");
    }

    /// Unmounts with the system tools, for when a normal unmount is blocked.
    fn force_unmount(&self) {
        #[cfg(target_os = "macos")]
        {
            let result = std::process::Command::new("diskutil")
                .args(["unmount", "force"])
                .arg(&self.mountpoint)
                .output();
            match result {
                Ok(output) if output.status.success() => {
                    tracing::debug!("Force unmount via diskutil succeeded");
                    return;
                }
                _ => tracing::debug!("diskutil unmount failed, trying umount"),
            }
            let _ = std::process::Command::new("umount")
                .arg("-f")
                .arg(&self.mountpoint)
                .output();
        }

        #[cfg(target_os = "linux")]
        {
            let _ = std::process::Command::new("fusermount")
                .args(["-uz"])
                .arg(&self.mountpoint)
                .output();
        }
    }
}

impl std::fmt::Debug for MountHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountHandle")
            .field("mountpoint", &self.mountpoint)
            .field("mounted", &self.session.is_some())
            .finish()
    }
}

impl Drop for MountHandle {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        tracing::debug!(mountpoint = %self.mountpoint.display(), "Unmounting FUSE filesystem");

        // join() can block indefinitely, so wait for it on another thread
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            session.join();
            let _ = tx.send(());
        });

        if rx.recv_timeout(JOIN_TIMEOUT).is_ok() {
            tracing::debug!(mountpoint = %self.mountpoint.display(), "Graceful unmount completed");
        } else {
            tracing::warn!(
                mountpoint = %self.mountpoint.display(),
                timeout = ?JOIN_TIMEOUT,
                "session join timed out, forcing unmount"
            );
            self.force_unmount();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_mountpoint() {
        let dir = TempDir::new().unwrap();
        assert!(validate_mountpoint(dir.path()).is_ok());

        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            validate_mountpoint(&file),
            Err(MountError::InvalidMountpoint(_))
        ));
        assert!(matches!(
            validate_mountpoint(&dir.path().join("missing")),
            Err(MountError::InvalidMountpoint(_))
        ));
    }
}
