//! Path checks and the atomic, metadata-preserving file copy.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::conf::{C_NAME_DIR_FLAT, C_PREFIX_FILE_PARTIAL};
use crate::spec::EnumExportCategory;

////////////////////////////////////////////////////////////////////////////////
// #region PathUtilities

/// Flat folder of `category` under a staging or snapshot root.
pub(crate) fn derive_flat_path(path_root: &Path, category: EnumExportCategory) -> PathBuf {
    path_root.join(category.name_dir()).join(C_NAME_DIR_FLAT)
}

fn to_absolute_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(path_cwd) => path_cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Absolute form of `path` with symlinks of its existing part resolved.
///
/// Components that do not exist yet are appended to the canonical form of
/// the nearest existing ancestor.
fn resolve_for_compare(path: &Path) -> PathBuf {
    let path_abs = to_absolute_path(path);
    let mut l_names_missing = Vec::new();
    let mut path_cursor = path_abs.as_path();
    loop {
        if let Ok(path_real) = fs::canonicalize(path_cursor) {
            return l_names_missing
                .iter()
                .rev()
                .fold(path_real, |path_acc, name| path_acc.join(name));
        }
        match (path_cursor.parent(), path_cursor.file_name()) {
            (Some(path_parent), Some(name)) => {
                l_names_missing.push(name.to_os_string());
                path_cursor = path_parent;
            }
            _ => return path_abs,
        }
    }
}

/// Whether one of the two folders contains the other.
pub(crate) fn is_overlap(path_a: &Path, path_b: &Path) -> bool {
    let path_a = resolve_for_compare(path_a);
    let path_b = resolve_for_compare(path_b);
    path_a.starts_with(&path_b) || path_b.starts_with(&path_a)
}

/// Item paths must be non-empty, relative and free of `..`.
pub(crate) fn validate_relative_item_path(path_relative: &Path) -> Result<(), String> {
    if path_relative.as_os_str().is_empty() {
        return Err("path is empty".to_string());
    }
    let mut n_normal = 0_usize;
    for part in path_relative.components() {
        match part {
            Component::Normal(_) => n_normal += 1,
            Component::CurDir => {}
            Component::ParentDir => return Err("path must not contain `..`".to_string()),
            Component::RootDir | Component::Prefix(_) => {
                return Err("path must be relative".to_string());
            }
        }
    }
    if n_normal == 0 {
        return Err("path has no file name".to_string());
    }
    Ok(())
}

/// Reject an item whose parent folders below `path_dir_flat` include a symlink.
///
/// `path_relative` must already have passed [`validate_relative_item_path`],
/// so it cannot leave `path_dir_flat` lexically.
pub(crate) fn validate_no_symlink_parent(
    path_dir_flat: &Path,
    path_relative: &Path,
) -> Result<(), String> {
    let Some(path_parent_rel) = path_relative.parent() else {
        return Ok(());
    };

    let mut path_cursor = path_dir_flat.to_path_buf();
    for part in path_parent_rel.components() {
        path_cursor.push(part);
        let meta_cursor = match fs::symlink_metadata(&path_cursor) {
            Ok(v) => v,
            // Nothing exists below a missing folder.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(format!(
                    "failed to inspect parent folder {} ({e})",
                    path_cursor.display()
                ));
            }
        };
        if meta_cursor.file_type().is_symlink() {
            return Err(format!("parent folder {} is a symlink", path_cursor.display()));
        }
    }
    Ok(())
}

/// Whether `path` is a regular file, without following a final symlink.
pub(crate) fn is_regular_file(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_file())
        .unwrap_or(false)
}

/// Whether `path` is a directory with at least one entry.
pub(crate) fn is_non_empty_dir(path: &Path) -> io::Result<bool> {
    let mut iter_entries = fs::read_dir(path)?;
    Ok(iter_entries.next().is_some())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FileCopy

/// Copy `path_file_src` to `path_file_dst` without ever exposing a partial target.
///
/// Bytes go to a hidden temporary file in the destination directory, which is
/// committed under the final name only after the copy and metadata transfer
/// succeed. An existing destination is never replaced. The temporary file is
/// removed on every failure path.
pub(crate) fn copy_file_atomic(path_file_src: &Path, path_file_dst: &Path) -> io::Result<()> {
    let path_dir_dst = path_file_dst.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "Failed to derive parent directory: {}",
                path_file_dst.display()
            ),
        )
    })?;

    let mut file_src = fs::File::open(path_file_src)?;
    let mut file_partial = tempfile::Builder::new()
        .prefix(C_PREFIX_FILE_PARTIAL)
        .tempfile_in(path_dir_dst)?;
    io::copy(&mut file_src, file_partial.as_file_mut())?;
    file_partial.as_file().sync_all()?;

    let stat_src = file_src.metadata()?;
    fs::set_permissions(file_partial.path(), stat_src.permissions())?;
    #[cfg(target_os = "linux")]
    {
        apply_metadata_linux(&stat_src, path_file_src, file_partial.path())?;
    }

    file_partial
        .persist_noclobber(path_file_dst)
        .map_err(|e| e.error)?;
    Ok(())
}

#[cfg(target_os = "linux")]
fn apply_metadata_linux(
    stat_src: &fs::Metadata,
    path_file_src: &Path,
    path_file_dst: &Path,
) -> io::Result<()> {
    use filetime::{FileTime, set_file_times};

    let file_time_access = FileTime::from_last_access_time(stat_src);
    let file_time_modify = FileTime::from_last_modification_time(stat_src);
    set_file_times(path_file_dst, file_time_access, file_time_modify)?;

    copy_xattrs_linux(path_file_src, path_file_dst);
    Ok(())
}

#[cfg(target_os = "linux")]
fn copy_xattrs_linux(path_file_src: &Path, path_file_dst: &Path) {
    let Ok(iter_names) = xattr::list(path_file_src) else {
        return;
    };
    for name in iter_names {
        let res = xattr::get(path_file_src, &name).and_then(|raw_value| match raw_value {
            Some(raw_value) => xattr::set(path_file_dst, &name, &raw_value),
            None => Ok(()),
        });
        if let Err(e) = res {
            tracing::debug!(
                file = %path_file_dst.display(),
                attr = ?name,
                error = %e,
                "extended attribute not copied"
            );
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{
        copy_file_atomic, derive_flat_path, is_overlap, validate_no_symlink_parent,
        validate_relative_item_path,
    };
    use crate::conf::C_PREFIX_FILE_PARTIAL;
    use crate::spec::EnumExportCategory;

    fn list_names(path_dir: &Path) -> Vec<String> {
        let mut l_names = std::fs::read_dir(path_dir)
            .expect("read dir")
            .map(|entry| {
                entry
                    .expect("entry")
                    .file_name()
                    .to_string_lossy()
                    .to_string()
            })
            .collect::<Vec<_>>();
        l_names.sort();
        l_names
    }

    #[test]
    fn flat_path_layout() {
        assert_eq!(
            derive_flat_path(Path::new("/t/InProgress"), EnumExportCategory::Derived),
            Path::new("/t/InProgress/Derived/.flat")
        );
    }

    #[test]
    fn relative_item_path_rules() {
        assert!(validate_relative_item_path(Path::new("2024/01/img.jpg")).is_ok());
        assert!(validate_relative_item_path(Path::new("./img.jpg")).is_ok());
        assert!(validate_relative_item_path(Path::new("")).is_err());
        assert!(validate_relative_item_path(Path::new(".")).is_err());
        assert!(validate_relative_item_path(Path::new("a/../../b.jpg")).is_err());
        assert!(validate_relative_item_path(Path::new("/etc/passwd")).is_err());
    }

    #[test]
    fn overlap_detects_nesting() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path_a = tmp.path().join("a");
        assert!(is_overlap(&path_a, &path_a.join("b")));
        assert!(is_overlap(&path_a.join("b"), &path_a));
        assert!(!is_overlap(&path_a, &tmp.path().join("c")));
    }

    #[cfg(unix)]
    #[test]
    fn overlap_sees_through_symlinked_ancestor() {
        use std::os::unix::fs::symlink;

        let tmp = tempfile::tempdir().expect("tempdir");
        let path_real = tmp.path().join("export");
        std::fs::create_dir_all(&path_real).expect("mkdir export");
        symlink(&path_real, tmp.path().join("alias")).expect("symlink");

        assert!(is_overlap(
            &tmp.path().join("alias/InProgress/old"),
            &path_real.join("InProgress")
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_parent_folder_is_rejected() {
        use std::os::unix::fs::symlink;

        let tmp = tempfile::tempdir().expect("tempdir");
        let path_flat = tmp.path().join("flat");
        let path_outside = tmp.path().join("outside");
        std::fs::create_dir_all(&path_flat).expect("mkdir flat");
        std::fs::create_dir_all(&path_outside).expect("mkdir outside");
        symlink(&path_outside, path_flat.join("album")).expect("symlink");

        let err = validate_no_symlink_parent(&path_flat, Path::new("album/a.jpg"))
            .expect_err("symlink component must fail");
        assert!(err.contains("symlink"));
        assert!(validate_no_symlink_parent(&path_flat, Path::new("x/y/a.jpg")).is_ok());
        assert!(validate_no_symlink_parent(&path_flat, Path::new("a.jpg")).is_ok());
    }

    #[test]
    fn copy_atomic_copies_bytes() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path_src = tmp.path().join("src.bin");
        let path_dst = tmp.path().join("dst.bin");
        std::fs::write(&path_src, b"payload").expect("write src");

        copy_file_atomic(&path_src, &path_dst).expect("copy");
        assert_eq!(std::fs::read(&path_dst).expect("read dst"), b"payload");
    }

    #[test]
    fn copy_atomic_never_clobbers_and_cleans_partial() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path_src = tmp.path().join("src").join("a.jpg");
        let path_dir_dst = tmp.path().join("dst");
        std::fs::create_dir_all(path_src.parent().expect("parent")).expect("mkdir src");
        std::fs::create_dir_all(&path_dir_dst).expect("mkdir dst");
        std::fs::write(&path_src, b"new").expect("write src");
        std::fs::write(path_dir_dst.join("a.jpg"), b"old").expect("write dst");

        copy_file_atomic(&path_src, &path_dir_dst.join("a.jpg")).expect_err("must not clobber");
        assert_eq!(
            std::fs::read(path_dir_dst.join("a.jpg")).expect("read dst"),
            b"old"
        );
        assert!(
            list_names(&path_dir_dst)
                .iter()
                .all(|name| !name.starts_with(C_PREFIX_FILE_PARTIAL))
        );
    }

    #[test]
    fn copy_atomic_missing_source_leaves_nothing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path_dir_dst = tmp.path().join("dst");
        std::fs::create_dir_all(&path_dir_dst).expect("mkdir dst");

        copy_file_atomic(&tmp.path().join("absent.jpg"), &path_dir_dst.join("a.jpg"))
            .expect_err("missing source must fail");
        assert!(list_names(&path_dir_dst).is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn copy_atomic_preserves_linux_metadata() {
        use filetime::{FileTime, set_file_times};
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().expect("tempdir");
        let path_file_src = tmp.path().join("meta.jpg");
        let path_file_dst = tmp.path().join("meta_copy.jpg");
        std::fs::write(&path_file_src, b"meta").expect("write src");

        std::fs::set_permissions(&path_file_src, std::fs::Permissions::from_mode(0o640))
            .expect("set permissions");
        set_file_times(
            &path_file_src,
            FileTime::from_unix_time(1_700_000_010, 0),
            FileTime::from_unix_time(1_700_000_020, 0),
        )
        .expect("set times");

        let c_xattr_name = "user.snapkit_test";
        let b_if_has_xattr = xattr::set(&path_file_src, c_xattr_name, b"meta_value").is_ok();

        copy_file_atomic(&path_file_src, &path_file_dst).expect("copy");

        let stat_src = std::fs::metadata(&path_file_src).expect("src metadata");
        let stat_dst = std::fs::metadata(&path_file_dst).expect("dst metadata");
        assert_eq!(
            stat_src.permissions().mode() & 0o777,
            stat_dst.permissions().mode() & 0o777
        );
        assert_eq!(
            FileTime::from_last_modification_time(&stat_src),
            FileTime::from_last_modification_time(&stat_dst)
        );

        if b_if_has_xattr {
            let raw_value_dst = xattr::get(&path_file_dst, c_xattr_name)
                .expect("get dst xattr")
                .expect("xattr exists");
            assert_eq!(raw_value_dst, b"meta_value");
        }
    }
}
