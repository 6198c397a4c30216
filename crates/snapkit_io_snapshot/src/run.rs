//! Orchestration of one export run.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{info, warn};

use crate::candidate::{NoCandidateResolver, SnapshotCandidateResolver, TraitCandidateResolver};
use crate::export::export_category;
use crate::finalize::{
    TraitFolderOps, delete_folder_if_exists, finalize_export_with, inspect_export_state,
};
use crate::materialize::{CopyOnlyMaterializer, LinkOrCopyMaterializer, TraitMaterializer};
use crate::report::{ReportExport, ReportExportBuilder};
use crate::spec::{
    EnumFinalizePhase, EnumMaterializeMode, SnapshotExportError, SpecMetadataFeed,
    SpecSnapshotOptions,
};
use crate::util::{is_non_empty_dir, is_overlap};

/// Exporter parameterized by a candidate-resolution and a materialization strategy.
pub struct SnapshotExporter {
    resolver: Box<dyn TraitCandidateResolver>,
    materializer: Box<dyn TraitMaterializer>,
}

impl SnapshotExporter {
    /// Strategy pair selected by [`SpecSnapshotOptions::rule_materialize`].
    pub fn from_options(spec_options: &SpecSnapshotOptions) -> Self {
        match spec_options.rule_materialize {
            EnumMaterializeMode::LinkOrCopy => {
                Self::with_strategies(SnapshotCandidateResolver, LinkOrCopyMaterializer::new())
            }
            EnumMaterializeMode::CopyOnly => {
                Self::with_strategies(NoCandidateResolver, CopyOnlyMaterializer)
            }
        }
    }

    pub fn with_strategies<R, M>(resolver: R, materializer: M) -> Self
    where
        R: TraitCandidateResolver + 'static,
        M: TraitMaterializer + 'static,
    {
        Self {
            resolver: Box::new(resolver),
            materializer: Box::new(materializer),
        }
    }

    /// Run one export with the standard folder operations.
    pub fn run(
        &self,
        spec_options: &SpecSnapshotOptions,
        spec_feed: &SpecMetadataFeed,
    ) -> Result<ReportExport, SnapshotExportError> {
        self.run_with(spec_options, spec_feed, |path: &Path| fs::remove_dir_all(path))
    }

    /// Run one export: prepare staging, export each enabled category in
    /// order, then finalize.
    ///
    /// On error the staging tree is left in place and the previous snapshot
    /// is untouched, unless the error is a promotion failure after the old
    /// snapshot was set aside.
    pub fn run_with<O>(
        &self,
        spec_options: &SpecSnapshotOptions,
        spec_feed: &SpecMetadataFeed,
        mut ops: O,
    ) -> Result<ReportExport, SnapshotExportError>
    where
        O: TraitFolderOps,
    {
        validate_options(spec_options)?;

        let enum_state = inspect_export_state(spec_options);
        if enum_state.is_interrupted() {
            warn!(
                target_root = %spec_options.path_target.display(),
                state = %enum_state,
                "previous export was interrupted"
            );
        }

        prepare_staging(spec_options, &mut ops)?;

        let mut builder_report = ReportExportBuilder::default();
        for category in spec_options.enabled_categories() {
            let l_candidates = self.resolver.resolve_candidates(category, spec_options);
            let path_dir_flat = spec_options.path_flat_staging(category);
            fs::create_dir_all(&path_dir_flat).map_err(|e| SnapshotExportError::StagingInit {
                path: path_dir_flat.clone(),
                source: e,
            })?;
            export_category(
                category,
                spec_feed.items(category),
                &l_candidates,
                &path_dir_flat,
                self.materializer.as_ref(),
                &mut builder_report,
            )?;
        }

        finalize_export_with(spec_options, &mut builder_report, ops)?;

        let report = builder_report.build();
        info!("{report}");
        Ok(report)
    }
}

/// Run one export with the strategy pair selected by configuration.
pub fn run_snapshot_export(
    spec_options: &SpecSnapshotOptions,
    spec_feed: &SpecMetadataFeed,
) -> Result<ReportExport, SnapshotExportError> {
    SnapshotExporter::from_options(spec_options).run(spec_options, spec_feed)
}

fn validate_options(spec_options: &SpecSnapshotOptions) -> Result<(), SnapshotExportError> {
    if spec_options.path_target.as_os_str().is_empty() {
        return Err(SnapshotExportError::InvalidOptions(
            "`path_target` must be set.".to_string(),
        ));
    }
    if spec_options.enabled_categories().is_empty() {
        return Err(SnapshotExportError::InvalidOptions(
            "At least one export category must be enabled.".to_string(),
        ));
    }
    if let Some(path_base) = &spec_options.path_base_export
        && is_overlap(path_base, &spec_options.path_staging())
    {
        return Err(SnapshotExportError::InvalidOptions(format!(
            "Base export {} overlaps the staging folder.",
            path_base.display()
        )));
    }
    Ok(())
}

/// A staging tree from an earlier attempt is an error unless reset is enabled.
fn prepare_staging<O>(
    spec_options: &SpecSnapshotOptions,
    ops: &mut O,
) -> Result<(), SnapshotExportError>
where
    O: TraitFolderOps,
{
    let path_staging = spec_options.path_staging();
    let b_is_dirty = match is_non_empty_dir(&path_staging) {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            return Err(SnapshotExportError::StagingInit {
                path: path_staging,
                source: e,
            });
        }
    };

    if b_is_dirty {
        if !spec_options.if_reset_staging {
            return Err(SnapshotExportError::StagingNotClean { path: path_staging });
        }
        warn!(staging = %path_staging.display(), "removing staging folder of an earlier attempt");
        delete_folder_if_exists(&path_staging, EnumFinalizePhase::StagingReset, ops)?;
    }

    fs::create_dir_all(&path_staging).map_err(|e| SnapshotExportError::StagingInit {
        path: path_staging,
        source: e,
    })
}
