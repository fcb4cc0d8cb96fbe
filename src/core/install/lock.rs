// ─── Install Lease ───
// Lock file next to a target directory so that two installs can never share
// its staging directory, across tasks and across processes.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};

const LOCK_STALE_SECS: i64 = 60 * 30;
const LOCK_POLL: Duration = Duration::from_millis(250);
/// A lock file without a readable payload older than this was left by a
/// holder that died between creating and writing it.
const LOCK_WRITE_GRACE: Duration = Duration::from_secs(30);
/// Longest `acquire` waits for a live holder. Past the stale age, so a
/// lease whose holder vanished is always reclaimed before giving up.
pub const LOCK_MAX_WAIT: Duration = Duration::from_secs(LOCK_STALE_SECS as u64 + 5 * 60);

/// `<target>.lock`, a sibling of the directory it protects so the patch
/// tool never sees it.
pub fn lock_path_for(target_dir: &Path) -> PathBuf {
    let mut name = target_dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    target_dir.with_file_name(name)
}

/// Held while a target directory is being written. Dropping it releases the
/// lease.
#[derive(Debug)]
pub struct InstallLease {
    path: PathBuf,
}

impl InstallLease {
    /// Wait until the lease on `target_dir` is free, then take it. Leases
    /// left behind by dead or long-gone holders are reclaimed.
    pub async fn acquire(target_dir: &Path) -> LauncherResult<Self> {
        Self::acquire_within(target_dir, LOCK_MAX_WAIT).await
    }

    /// Like [`InstallLease::acquire`], failing with `LeaseTimeout` once
    /// `max_wait` has passed without the lease coming free.
    pub async fn acquire_within(target_dir: &Path, max_wait: Duration) -> LauncherResult<Self> {
        let started = Instant::now();
        let lock_path = lock_path_for(target_dir);
        if let Some(parent) = lock_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| LauncherError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let mut attempts = 0_u32;
        loop {
            attempts += 1;
            match tokio::fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&lock_path)
                .await
            {
                Ok(mut file) => {
                    let payload = serde_json::json!({
                        "pid": std::process::id(),
                        "timestamp": Utc::now().timestamp(),
                    });
                    if let Err(source) = file.write_all(payload.to_string().as_bytes()).await {
                        drop(file);
                        let _ = tokio::fs::remove_file(&lock_path).await;
                        return Err(LauncherError::Io {
                            path: lock_path,
                            source,
                        });
                    }
                    debug!("Acquired install lease {:?}", lock_path);
                    return Ok(Self { path: lock_path });
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if cleanup_stale_lock(&lock_path).await {
                        continue;
                    }
                    if started.elapsed() >= max_wait {
                        return Err(LauncherError::LeaseTimeout {
                            path: lock_path,
                            waited: max_wait,
                        });
                    }
                    if attempts % 20 == 0 {
                        info!("Waiting for install lease at {:?}", lock_path);
                    }
                    tokio::time::sleep(LOCK_POLL).await;
                }
                Err(source) => {
                    return Err(LauncherError::Io {
                        path: lock_path,
                        source,
                    });
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstallLease {
    fn drop(&mut self) {
        if let Err(source) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove lock {:?}: {}", self.path, source);
        }
    }
}

/// Remove the lock if its holder is gone. Returns whether it was removed.
async fn cleanup_stale_lock(lock_path: &Path) -> bool {
    let Ok(content) = tokio::fs::read_to_string(lock_path).await else {
        return false;
    };

    let stale = match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(value) => holder_is_gone(&value),
        Err(_) => lock_age(lock_path)
            .await
            .is_some_and(|age| age > LOCK_WRITE_GRACE),
    };

    if stale {
        warn!("Reclaiming stale install lease {:?}", lock_path);
        return tokio::fs::remove_file(lock_path).await.is_ok();
    }
    false
}

fn holder_is_gone(payload: &serde_json::Value) -> bool {
    let pid = payload
        .get("pid")
        .and_then(|v| v.as_u64())
        .unwrap_or_default() as u32;
    let timestamp = payload
        .get("timestamp")
        .and_then(|v| v.as_i64())
        .unwrap_or_default();
    let expired = Utc::now().timestamp().saturating_sub(timestamp) > LOCK_STALE_SECS;

    #[cfg(target_os = "linux")]
    let dead = pid != 0 && !PathBuf::from(format!("/proc/{pid}")).exists();
    #[cfg(not(target_os = "linux"))]
    let dead = {
        let _ = pid;
        false
    };

    expired || dead
}

async fn lock_age(lock_path: &Path) -> Option<Duration> {
    let modified = tokio::fs::metadata(lock_path).await.ok()?.modified().ok()?;
    SystemTime::now().duration_since(modified).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_sits_beside_target() {
        let path = lock_path_for(Path::new("/games/release/package/game/latest"));
        assert_eq!(path, Path::new("/games/release/package/game/latest.lock"));
    }

    #[tokio::test]
    async fn second_holder_waits_for_release() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("game").join("3");

        let first = InstallLease::acquire(&target).await.unwrap();
        assert!(first.path().exists());

        let blocked =
            tokio::time::timeout(Duration::from_millis(600), InstallLease::acquire(&target)).await;
        assert!(blocked.is_err(), "lease must not be shared");

        drop(first);
        let second =
            tokio::time::timeout(Duration::from_secs(5), InstallLease::acquire(&target))
                .await
                .expect("lease freed")
                .unwrap();
        drop(second);
        assert!(!lock_path_for(&target).exists());
    }

    fn backdate(path: &Path, by: Duration) {
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(SystemTime::now() - by)
            .unwrap();
    }

    #[tokio::test]
    async fn empty_lock_from_crashed_holder_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("latest");
        let lock = lock_path_for(&target);
        std::fs::write(&lock, "").unwrap();
        backdate(&lock, Duration::from_secs(2 * 60 * 60));

        let lease = tokio::time::timeout(Duration::from_secs(3), InstallLease::acquire(&target))
            .await
            .expect("empty lock reclaimed")
            .unwrap();
        drop(lease);
        assert!(!lock.exists());
    }

    #[tokio::test]
    async fn fresh_half_written_lock_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("latest");
        std::fs::write(lock_path_for(&target), "{\"pid\":").unwrap();

        let err = InstallLease::acquire_within(&target, Duration::from_millis(600))
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::LeaseTimeout { .. }), "{err}");
        assert!(lock_path_for(&target).exists());
    }

    #[tokio::test]
    async fn live_holder_makes_bounded_wait_fail() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("3");
        let _held = InstallLease::acquire(&target).await.unwrap();

        let err = InstallLease::acquire_within(&target, Duration::from_millis(400))
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::LeaseTimeout { .. }), "{err}");
    }

    #[tokio::test]
    async fn stale_lease_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("latest");
        let stale = serde_json::json!({
            "pid": std::process::id(),
            "timestamp": Utc::now().timestamp() - LOCK_STALE_SECS - 5,
        });
        std::fs::write(lock_path_for(&target), stale.to_string()).unwrap();

        let lease = tokio::time::timeout(Duration::from_secs(5), InstallLease::acquire(&target))
            .await
            .expect("stale lease reclaimed")
            .unwrap();
        drop(lease);
    }
}
