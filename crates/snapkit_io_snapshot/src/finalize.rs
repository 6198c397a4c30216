//! Terminal phase of a run: cleanup, snapshot set-aside, promotion and purge.
//!
//! The permanent tree is never deleted in place. It is renamed to the
//! set-aside folder, the staging tree is renamed into its place, and only
//! then is the set-aside tree deleted. Each step is a single rename, so the
//! presence of the permanent tree always means a complete snapshot. See
//! [`inspect_export_state`].

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, error, info, warn};

use crate::conf::N_DELETE_ATTEMPTS_MAX;
use crate::report::ReportExportBuilder;
use crate::spec::{
    DeletionError, EnumExportCategory, EnumExportState, EnumFinalizePhase, PromotionError,
    SnapshotExportError, SpecSnapshotOptions,
};

/// Folder operations used while finalizing.
///
/// Any `FnMut(&Path) -> io::Result<()>` acts as the remover, with
/// [`fs::rename`] for renames.
pub trait TraitFolderOps {
    fn remove_dir_all(&mut self, path_dir: &Path) -> io::Result<()>;

    fn rename(&mut self, path_from: &Path, path_to: &Path) -> io::Result<()> {
        fs::rename(path_from, path_to)
    }
}

impl<F> TraitFolderOps for F
where
    F: FnMut(&Path) -> io::Result<()>,
{
    fn remove_dir_all(&mut self, path_dir: &Path) -> io::Result<()> {
        self(path_dir)
    }
}

/// Call `f_op` until it succeeds, at most `n_attempts_max` times (at least once).
///
/// `f_op` receives the 1-based attempt number. The error of the last attempt
/// is returned.
pub fn retry_with_bound<T, E, F>(n_attempts_max: usize, mut f_op: F) -> Result<T, E>
where
    F: FnMut(usize) -> Result<T, E>,
{
    let n_attempts_max = n_attempts_max.max(1);
    let mut n_attempt = 1;
    loop {
        match f_op(n_attempt) {
            Ok(v) => return Ok(v),
            Err(e) if n_attempt >= n_attempts_max => return Err(e),
            Err(_) => n_attempt += 1,
        }
    }
}

/// Delete `path_dir` with bounded retry if it exists.
///
/// Returns whether a folder was present. A folder that vanishes between
/// attempts counts as deleted.
pub fn delete_folder_if_exists<O>(
    path_dir: &Path,
    phase: EnumFinalizePhase,
    ops: &mut O,
) -> Result<bool, DeletionError>
where
    O: TraitFolderOps + ?Sized,
{
    if fs::symlink_metadata(path_dir).is_err() {
        return Ok(false);
    }

    info!(path = %path_dir.display(), phase = %phase, "delete folder");
    retry_with_bound(N_DELETE_ATTEMPTS_MAX, |n_attempt| {
        match ops.remove_dir_all(path_dir) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                debug!(
                    path = %path_dir.display(),
                    attempt = n_attempt,
                    error = %e,
                    "delete attempt failed"
                );
                Err(e)
            }
            Ok(()) => Ok(()),
        }
    })
    .map(|_| true)
    .map_err(|e| {
        error!(path = %path_dir.display(), phase = %phase, error = %e, "error deleting folder");
        DeletionError {
            path: path_dir.to_path_buf(),
            phase,
            n_attempts: N_DELETE_ATTEMPTS_MAX,
            source: e,
        }
    })
}

/// Move the permanent tree to `path_retired` with bounded retry.
///
/// Returns whether a snapshot was present. On failure the snapshot is still
/// in place, untouched.
fn set_snapshot_aside<O>(
    path_snapshot: &Path,
    path_retired: &Path,
    ops: &mut O,
) -> Result<bool, DeletionError>
where
    O: TraitFolderOps + ?Sized,
{
    if fs::symlink_metadata(path_snapshot).is_err() {
        return Ok(false);
    }

    info!(
        snapshot = %path_snapshot.display(),
        retired = %path_retired.display(),
        "set previous snapshot aside"
    );
    retry_with_bound(N_DELETE_ATTEMPTS_MAX, |n_attempt| {
        ops.rename(path_snapshot, path_retired).inspect_err(|e| {
            debug!(attempt = n_attempt, error = %e, "set-aside attempt failed");
        })
    })
    .map(|()| true)
    .map_err(|e| {
        error!(error = %e, "error setting previous snapshot aside => abort export");
        DeletionError {
            path: path_snapshot.to_path_buf(),
            phase: EnumFinalizePhase::SnapshotSetAside,
            n_attempts: N_DELETE_ATTEMPTS_MAX,
            source: e,
        }
    })
}

/// Finalize with [`fs::remove_dir_all`] and [`fs::rename`].
pub fn finalize_export(
    spec_options: &SpecSnapshotOptions,
    builder_report: &mut ReportExportBuilder,
) -> Result<(), SnapshotExportError> {
    finalize_export_with(spec_options, builder_report, |path: &Path| {
        fs::remove_dir_all(path)
    })
}

/// Promote the staging tree to the permanent snapshot.
///
/// 1. Flat cleanup (if enabled) of the originals and current flat folders:
///    failures become report warnings.
/// 2. A set-aside tree left by an earlier run is deleted while the current
///    snapshot is still in place. Failure aborts with
///    [`SnapshotExportError::Deletion`], both trees intact.
/// 3. The previous snapshot is renamed to the set-aside folder. Failure
///    aborts with [`SnapshotExportError::Deletion`], both trees intact.
/// 4. Single rename of staging to snapshot: failure aborts with
///    [`SnapshotExportError::Promotion`].
/// 5. The set-aside tree is deleted. Failure becomes a report warning: the
///    new snapshot is already current and the next run retries.
pub fn finalize_export_with<O>(
    spec_options: &SpecSnapshotOptions,
    builder_report: &mut ReportExportBuilder,
    mut ops: O,
) -> Result<(), SnapshotExportError>
where
    O: TraitFolderOps,
{
    let path_staging = spec_options.path_staging();
    let path_snapshot = spec_options.path_snapshot();
    let path_retired = spec_options.path_snapshot_retired();

    if spec_options.if_delete_flat {
        for category in [EnumExportCategory::Originals, EnumExportCategory::Current] {
            if !spec_options.is_enabled(category) {
                continue;
            }
            let path_dir_flat = spec_options.path_flat_staging(category);
            if let Err(e) =
                delete_folder_if_exists(&path_dir_flat, EnumFinalizePhase::FlatCleanup, &mut ops)
            {
                warn!(category = %category, error = %e, "flat cleanup failed, continuing");
                builder_report.add_warning(e.to_string());
            }
        }
    }

    // Without a current snapshot, a set-aside tree is the only previous copy.
    if path_snapshot.exists() {
        delete_folder_if_exists(&path_retired, EnumFinalizePhase::SnapshotRemoval, &mut ops)?;
    }
    set_snapshot_aside(&path_snapshot, &path_retired, &mut ops)?;

    info!(
        staging = %path_staging.display(),
        snapshot = %path_snapshot.display(),
        "promote staging folder"
    );
    if let Err(e) = ops.rename(&path_staging, &path_snapshot) {
        error!(error = %e, "error renaming staging folder => abort export");
        let path_snapshot_retired = path_retired.exists().then(|| path_retired.clone());
        return Err(PromotionError {
            path_staging,
            path_snapshot,
            path_snapshot_retired,
            source: e,
        }
        .into());
    }
    info!(snapshot = %path_snapshot.display(), "snapshot finalized");

    if let Err(e) =
        delete_folder_if_exists(&path_retired, EnumFinalizePhase::SnapshotRemoval, &mut ops)
    {
        warn!(error = %e, "previous snapshot left in place, the next run removes it");
        builder_report.add_warning(e.to_string());
    }
    Ok(())
}

/// Classify the target root by which of staging, permanent and set-aside tree exist.
pub fn inspect_export_state(spec_options: &SpecSnapshotOptions) -> EnumExportState {
    let b_has_staging = spec_options.path_staging().exists();
    let b_has_snapshot = spec_options.path_snapshot().exists();
    let b_has_retired = spec_options.path_snapshot_retired().exists();
    match (b_has_staging, b_has_snapshot, b_has_retired) {
        (false, false, false) => EnumExportState::Empty,
        (false, true, false) => EnumExportState::Consistent,
        (false, true, true) => EnumExportState::RetiredPending,
        (true, true, _) => EnumExportState::InterruptedBeforePromotion,
        (_, false, _) => EnumExportState::InterruptedAfterRemoval,
    }
}
