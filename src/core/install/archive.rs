// ─── Archive Extraction ───
// Blocking helpers; async callers go through `extract_archive_blocking`.

use std::fs;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::error::{LauncherError, LauncherResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
}

impl ArchiveKind {
    /// Guess from the file name, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else {
            None
        }
    }
}

/// Extract `archive` into `dest`, creating it if needed. Existing files with
/// the same names are overwritten.
pub fn extract_archive(archive: &Path, kind: ArchiveKind, dest: &Path) -> LauncherResult<()> {
    fs::create_dir_all(dest).map_err(|source| LauncherError::Io {
        path: dest.to_path_buf(),
        source,
    })?;

    match kind {
        ArchiveKind::Zip => extract_zip_file(archive, dest),
        ArchiveKind::TarGz => extract_tar_gz_file(archive, dest),
    }?;

    info!("Extracted {:?} into {:?}", archive, dest);
    Ok(())
}

pub async fn extract_archive_blocking(
    archive: PathBuf,
    kind: ArchiveKind,
    dest: PathBuf,
) -> LauncherResult<()> {
    tokio::task::spawn_blocking(move || extract_archive(&archive, kind, &dest))
        .await
        .map_err(|e| LauncherError::Other(format!("Task join error: {e}")))?
}

fn extract_zip_file(zip_path: &Path, dest: &Path) -> LauncherResult<()> {
    let zip_file = fs::File::open(zip_path).map_err(|source| LauncherError::Io {
        path: zip_path.to_path_buf(),
        source,
    })?;
    let mut archive = zip::ZipArchive::new(zip_file)?;

    for index in 0..archive.len() {
        let mut zipped = archive.by_index(index)?;

        let enclosed_name = zipped
            .enclosed_name()
            .ok_or_else(|| LauncherError::Other(format!("Invalid zip entry path: {}", zipped.name())))?;
        let rel_path: PathBuf = enclosed_name
            .components()
            .filter(|component| matches!(component, Component::Normal(_)))
            .collect();
        if rel_path.as_os_str().is_empty() {
            continue;
        }

        let out_path = dest.join(rel_path);
        if zipped.is_dir() {
            fs::create_dir_all(&out_path).map_err(|source| LauncherError::Io {
                path: out_path,
                source,
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|source| LauncherError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut out = fs::File::create(&out_path).map_err(|source| LauncherError::Io {
            path: out_path.clone(),
            source,
        })?;
        std::io::copy(&mut zipped, &mut out).map_err(|source| LauncherError::Io {
            path: out_path.clone(),
            source,
        })?;

        #[cfg(unix)]
        if let Some(mode) = zipped.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o777)).map_err(
                |source| LauncherError::Io {
                    path: out_path.clone(),
                    source,
                },
            )?;
        }
    }

    Ok(())
}

fn extract_tar_gz_file(tar_path: &Path, dest: &Path) -> LauncherResult<()> {
    let file = fs::File::open(tar_path).map_err(|source| LauncherError::Io {
        path: tar_path.to_path_buf(),
        source,
    })?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);
    // `unpack` refuses entries escaping `dest`.
    archive.unpack(dest).map_err(|source| LauncherError::Io {
        path: dest.to_path_buf(),
        source,
    })
}

/// `0755` on Unix, nothing elsewhere.
pub fn mark_executable(path: &Path) -> LauncherResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)
            .map_err(LauncherError::io(path))?
            .permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms).map_err(LauncherError::io(path))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

// ── Flattening ──────────────────────────────────────────

/// Collapse a single wrapping directory into `dir`.
///
/// Applies only when `dir` holds exactly one entry and that entry is a
/// directory (archives rooted at `jdk-21.0.2+13/` and the like). Anything
/// else is left untouched. Returns whether flattening happened.
pub fn flatten_directory(dir: &Path) -> LauncherResult<bool> {
    let entries = fs::read_dir(dir)
        .map_err(|source| LauncherError::Io {
            path: dir.to_path_buf(),
            source,
        })?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| LauncherError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

    let [wrapper] = entries.as_slice() else {
        return Ok(false);
    };
    let is_dir = wrapper
        .file_type()
        .map(|t| t.is_dir())
        .unwrap_or(false);
    if !is_dir {
        return Ok(false);
    }

    // Park the wrapper under a unique name first: it may contain a child
    // carrying its own name (`jre/jre`).
    let parked = dir.join(format!(".flatten-{}", Uuid::new_v4()));
    fs::rename(wrapper.path(), &parked).map_err(|source| LauncherError::Io {
        path: wrapper.path(),
        source,
    })?;

    for child in fs::read_dir(&parked).map_err(|source| LauncherError::Io {
        path: parked.clone(),
        source,
    })? {
        let child = child.map_err(|source| LauncherError::Io {
            path: parked.clone(),
            source,
        })?;
        let target = dir.join(child.file_name());
        fs::rename(child.path(), &target).map_err(|source| LauncherError::Io {
            path: target.clone(),
            source,
        })?;
    }

    fs::remove_dir_all(&parked).map_err(|source| LauncherError::Io {
        path: parked.clone(),
        source,
    })?;

    debug!("Flattened {:?} into {:?}", wrapper.file_name(), dir);
    Ok(true)
}
