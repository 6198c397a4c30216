//! `snapkit_io_snapshot` v1:
//! Versioned hard-link snapshot export engine.
//!
//! Each run materializes the metadata feed into a staging tree, reusing
//! files of earlier snapshots through hard links, and promotes the staging
//! tree to the permanent snapshot with a single rename.
//!
//! Modules:
//! - `device`      : same-volume detection
//! - `materialize` : link-or-copy of one file
//! - `candidate`   : link-source folders per category
//! - `export`      : flat-folder export of one category
//! - `finalize`    : cleanup, snapshot set-aside, promotion, purge
//! - `run`         : orchestration of a whole run
//! - `conf`        : layout constants and config/feed loading
//! - `spec`        : enums/options/errors
//! - `report`      : run-time statistics

pub mod candidate;
pub mod conf;
pub mod device;
pub mod export;
pub mod finalize;
pub mod materialize;
pub mod report;
pub mod run;
pub mod spec;
mod util;

pub use candidate::{
    NoCandidateResolver, SnapshotCandidateResolver, TraitCandidateResolver, resolve_candidates,
};
pub use conf::{N_DELETE_ATTEMPTS_MAX, load_metadata_feed, load_snapshot_options};
pub use device::{DeviceProbeStat, TraitDeviceProbe, is_same_device};
pub use export::export_category;
pub use finalize::{
    TraitFolderOps, delete_folder_if_exists, finalize_export, finalize_export_with,
    inspect_export_state, retry_with_bound,
};
pub use materialize::{CopyOnlyMaterializer, LinkOrCopyMaterializer, TraitMaterializer};
pub use report::{ReportExport, ReportExportBuilder};
pub use run::{SnapshotExporter, run_snapshot_export};
pub use spec::{
    ConfigError, DeletionError, DeviceProbeError, EnumExportCategory, EnumExportState,
    EnumFinalizePhase, EnumMaterializeKind, EnumMaterializeMode, EnumMaterializeStep,
    MaterializeError, PromotionError, SnapshotExportError, SpecExportItem, SpecFlatFolder,
    SpecMetadataFeed, SpecSnapshotOptions,
};
