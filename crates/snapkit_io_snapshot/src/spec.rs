//! Export models: enums, options and top-level error types.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::conf::{
    C_NAME_DIR_CURRENT, C_NAME_DIR_DERIVED, C_NAME_DIR_IN_PROGRESS, C_NAME_DIR_ORIGINALS,
    C_NAME_DIR_RETIRED, C_NAME_DIR_SNAPSHOT,
};
use crate::util::derive_flat_path;

////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// Parallel export variant of one logical media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumExportCategory {
    /// Unmodified originals as imported into the library.
    Originals,
    /// Current rendition, including user edits.
    Current,
    /// Derived renditions (previews and other generated variants).
    Derived,
}

impl EnumExportCategory {
    /// Fixed processing order within one run.
    pub const ORDER: [Self; 3] = [Self::Originals, Self::Current, Self::Derived];

    /// Folder name of this category under staging and snapshot roots.
    pub fn name_dir(self) -> &'static str {
        match self {
            Self::Originals => C_NAME_DIR_ORIGINALS,
            Self::Current => C_NAME_DIR_CURRENT,
            Self::Derived => C_NAME_DIR_DERIVED,
        }
    }

    /// Lowercase identifier used in logs, reports and the feed format.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Originals => "originals",
            Self::Current => "current",
            Self::Derived => "derived",
        }
    }
}

impl fmt::Display for EnumExportCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy pair used for one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumMaterializeMode {
    /// Probe prior snapshots for link sources; hard link when on the same device.
    LinkOrCopy,
    /// Always copy from the authoritative source asset.
    CopyOnly,
}

/// How one target file was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumMaterializeKind {
    /// Hard link to the source inode.
    Link,
    /// Full byte copy.
    Copy,
}

impl fmt::Display for EnumMaterializeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link => f.write_str("link"),
            Self::Copy => f.write_str("copy"),
        }
    }
}

/// Step of the materializer that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumMaterializeStep {
    /// Reading the target directory's device identifier.
    ProbeDevice,
    /// Creating the hard link.
    Link,
    /// Copying bytes or committing the copied file.
    Copy,
}

impl fmt::Display for EnumMaterializeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProbeDevice => f.write_str("probe device for"),
            Self::Link => f.write_str("link"),
            Self::Copy => f.write_str("copy"),
        }
    }
}

/// Phase of a run in which a folder deletion happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumFinalizePhase {
    /// Removing a stale staging tree before the run starts.
    StagingReset,
    /// Best-effort removal of per-category flat folders.
    FlatCleanup,
    /// Atomic rename of the previous snapshot out of the permanent location.
    SnapshotSetAside,
    /// Deletion of a set-aside snapshot tree.
    SnapshotRemoval,
}

impl fmt::Display for EnumFinalizePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StagingReset => f.write_str("staging-reset"),
            Self::FlatCleanup => f.write_str("flat-cleanup"),
            Self::SnapshotSetAside => f.write_str("snapshot-set-aside"),
            Self::SnapshotRemoval => f.write_str("snapshot-removal"),
        }
    }
}

/// Observed state of a target root between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumExportState {
    /// Neither staging nor permanent tree exists.
    Empty,
    /// Only the permanent tree exists: the last run finished.
    Consistent,
    /// The last run finished but its set-aside snapshot is still on disk.
    ///
    /// The next run deletes it.
    RetiredPending,
    /// Staging and permanent tree both exist: the previous snapshot is intact.
    ///
    /// The permanent tree is only ever moved by a single rename, never
    /// deleted in place, so its presence means it is complete.
    InterruptedBeforePromotion,
    /// No permanent tree: the previous snapshot, if any, sits in the
    /// set-aside folder and the new one in staging.
    InterruptedAfterRemoval,
}

impl EnumExportState {
    /// Whether the state signals an interrupted run.
    pub fn is_interrupted(self) -> bool {
        matches!(
            self,
            Self::InterruptedBeforePromotion | Self::InterruptedAfterRemoval
        )
    }
}

impl fmt::Display for EnumExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty: no snapshot exported yet"),
            Self::Consistent => f.write_str("consistent: current snapshot is complete"),
            Self::RetiredPending => f.write_str(
                "consistent: current snapshot is complete, previous snapshot awaits removal",
            ),
            Self::InterruptedBeforePromotion => f.write_str(
                "interrupted before promotion: previous snapshot intact, staging tree left for inspection",
            ),
            Self::InterruptedAfterRemoval => f.write_str(
                "interrupted after snapshot set-aside: no current snapshot, inspect the staging and set-aside trees manually",
            ),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region StructsInit

/// Candidate folder that may already hold a file identical to one being exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecFlatFolder {
    /// Absolute flat folder path.
    pub path: PathBuf,
    /// Category whose files the folder holds.
    pub category: EnumExportCategory,
}

/// One logical media asset of the metadata feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecExportItem {
    /// Target path relative to the category flat folder.
    ///
    /// Link sources are matched by this path alone: an equal relative path
    /// in an earlier export, or in the originals of the same run, is taken
    /// to hold identical content. An edited rendition needs its own path.
    pub path_relative: PathBuf,
    /// Authoritative location of the asset in the library.
    pub path_source: PathBuf,
}

/// Items to export, grouped per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpecMetadataFeed {
    pub originals: Vec<SpecExportItem>,
    pub current: Vec<SpecExportItem>,
    pub derived: Vec<SpecExportItem>,
}

impl SpecMetadataFeed {
    /// Items of one category, in feed order.
    pub fn items(&self, category: EnumExportCategory) -> &[SpecExportItem] {
        match category {
            EnumExportCategory::Originals => &self.originals,
            EnumExportCategory::Current => &self.current,
            EnumExportCategory::Derived => &self.derived,
        }
    }
}

/// Immutable configuration of one export run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpecSnapshotOptions {
    /// Target root holding the staging and permanent trees.
    pub path_target: PathBuf,
    /// Explicit prior export tree consulted as a link source; never mutated.
    pub path_base_export: Option<PathBuf>,
    /// Use the current permanent tree as base when no explicit base is set.
    pub if_link_previous_snapshot: bool,
    /// Export the originals category.
    pub if_export_originals: bool,
    /// Export the current category.
    pub if_export_current: bool,
    /// Export the derived category.
    pub if_export_derived: bool,
    /// Delete the staging flat folders before promotion.
    pub if_delete_flat: bool,
    /// Remove a leftover staging tree instead of failing on it.
    pub if_reset_staging: bool,
    /// Candidate/materializer strategy pair.
    pub rule_materialize: EnumMaterializeMode,
}

impl Default for SpecSnapshotOptions {
    fn default() -> Self {
        Self {
            path_target: PathBuf::new(),
            path_base_export: None,
            if_link_previous_snapshot: true,
            if_export_originals: true,
            if_export_current: true,
            if_export_derived: false,
            if_delete_flat: false,
            if_reset_staging: false,
            rule_materialize: EnumMaterializeMode::LinkOrCopy,
        }
    }
}

impl SpecSnapshotOptions {
    /// Options with defaults for the given target root.
    pub fn new<P: AsRef<Path>>(path_target: P) -> Self {
        Self {
            path_target: path_target.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Staging ("in-progress") tree of the run.
    pub fn path_staging(&self) -> PathBuf {
        self.path_target.join(C_NAME_DIR_IN_PROGRESS)
    }

    /// Permanent ("current") snapshot tree.
    pub fn path_snapshot(&self) -> PathBuf {
        self.path_target.join(C_NAME_DIR_SNAPSHOT)
    }

    /// Folder the previous snapshot is renamed to before promotion.
    pub fn path_snapshot_retired(&self) -> PathBuf {
        self.path_target.join(C_NAME_DIR_RETIRED)
    }

    /// Staging flat folder of one category.
    pub fn path_flat_staging(&self, category: EnumExportCategory) -> PathBuf {
        derive_flat_path(&self.path_staging(), category)
    }

    /// Base export used for linking: the explicit one, else the previous snapshot if present.
    pub fn path_base_export_effective(&self) -> Option<PathBuf> {
        if let Some(path_base) = &self.path_base_export {
            return Some(path_base.clone());
        }
        let path_snapshot = self.path_snapshot();
        if self.if_link_previous_snapshot && path_snapshot.is_dir() {
            return Some(path_snapshot);
        }
        None
    }

    pub fn is_enabled(&self, category: EnumExportCategory) -> bool {
        match category {
            EnumExportCategory::Originals => self.if_export_originals,
            EnumExportCategory::Current => self.if_export_current,
            EnumExportCategory::Derived => self.if_export_derived,
        }
    }

    /// Enabled categories in processing order.
    pub fn enabled_categories(&self) -> Vec<EnumExportCategory> {
        EnumExportCategory::ORDER
            .into_iter()
            .filter(|category| self.is_enabled(*category))
            .collect()
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Device identifier of a path could not be read.
#[derive(Debug, thiserror::Error)]
#[error("Failed to read device of {}: {source}", .path.display())]
pub struct DeviceProbeError {
    /// Path whose metadata could not be read.
    pub path: PathBuf,
    pub source: io::Error,
}

/// Link or copy of one file failed.
#[derive(Debug, thiserror::Error)]
#[error(
    "Unable to {step} file {} -> {}: {source}",
    .path_source.display(),
    .path_target.display()
)]
pub struct MaterializeError {
    pub path_source: PathBuf,
    pub path_target: PathBuf,
    pub step: EnumMaterializeStep,
    pub source: io::Error,
}

/// Folder removal failed after bounded retry.
#[derive(Debug, thiserror::Error)]
#[error(
    "Failed to remove folder {} during {phase} after {n_attempts} attempts: {source}",
    .path.display()
)]
pub struct DeletionError {
    pub path: PathBuf,
    pub phase: EnumFinalizePhase,
    pub n_attempts: usize,
    pub source: io::Error,
}

/// Rename of the staging tree into the permanent location failed.
#[derive(Debug)]
pub struct PromotionError {
    pub path_staging: PathBuf,
    pub path_snapshot: PathBuf,
    /// Where the previous snapshot was set aside, if there was one.
    pub path_snapshot_retired: Option<PathBuf>,
    pub source: io::Error,
}

impl fmt::Display for PromotionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path_retired) = &self.path_snapshot_retired {
            write!(
                f,
                "Failed to promote {} to {} ({}); there is no current snapshot: \
                 the previous one is in {}, inspect both manually and move one into place",
                self.path_staging.display(),
                self.path_snapshot.display(),
                self.source,
                path_retired.display()
            )
        } else {
            write!(
                f,
                "Failed to promote {} to {} ({}); no previous snapshot was touched, \
                 the new export is left in {}",
                self.path_staging.display(),
                self.path_snapshot.display(),
                self.source,
                self.path_staging.display()
            )
        }
    }
}

impl std::error::Error for PromotionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Errors that abort an export run.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotExportError {
    /// Configuration cannot drive a run.
    #[error("Invalid export options: {0}")]
    InvalidOptions(String),
    /// Item path is not a safe relative path.
    #[error(
        "Invalid {category} item path {}: {reason}",
        .path_relative.display()
    )]
    InvalidItemPath {
        category: EnumExportCategory,
        path_relative: PathBuf,
        reason: String,
    },
    /// Staging tree left by an earlier attempt.
    #[error(
        "Staging folder is not empty: {} (remove it or enable staging reset)",
        .path.display()
    )]
    StagingNotClean { path: PathBuf },
    /// Staging folder creation failed.
    #[error("Failed to initialize staging folder {}: {source}", .path.display())]
    StagingInit { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Materialize(#[from] MaterializeError),
    #[error(transparent)]
    Deletion(#[from] DeletionError),
    #[error(transparent)]
    Promotion(#[from] PromotionError),
}

/// Configuration or feed file could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
