//! Ordered link-source folders per export category.

use std::path::{Path, PathBuf};

use crate::spec::{EnumExportCategory, SpecFlatFolder, SpecSnapshotOptions};
use crate::util::derive_flat_path;

/// Builds the candidate list of one category.
pub trait TraitCandidateResolver {
    fn resolve_candidates(
        &self,
        category: EnumExportCategory,
        spec_options: &SpecSnapshotOptions,
    ) -> Vec<SpecFlatFolder>;
}

/// Prior export first, then the run's own originals for non-original categories.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotCandidateResolver;

impl TraitCandidateResolver for SnapshotCandidateResolver {
    fn resolve_candidates(
        &self,
        category: EnumExportCategory,
        spec_options: &SpecSnapshotOptions,
    ) -> Vec<SpecFlatFolder> {
        let path_base_export = spec_options.path_base_export_effective();
        resolve_candidates(
            category,
            &spec_options.path_staging(),
            path_base_export.as_deref(),
            spec_options.if_export_originals,
        )
    }
}

/// Never proposes a candidate; every item is read from its source.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCandidateResolver;

impl TraitCandidateResolver for NoCandidateResolver {
    fn resolve_candidates(
        &self,
        _category: EnumExportCategory,
        _spec_options: &SpecSnapshotOptions,
    ) -> Vec<SpecFlatFolder> {
        Vec::new()
    }
}

/// Candidate folders for `category`, in probing order.
///
/// 1. The category's flat folder in `path_base_export`.
/// 2. For `Current`/`Derived` with originals enabled, the originals flat
///    folder under `path_staging`, so a rendition equal to its original links
///    against the file written earlier in the same run.
///
/// Folders missing on disk are dropped.
pub fn resolve_candidates(
    category: EnumExportCategory,
    path_staging: &Path,
    path_base_export: Option<&Path>,
    if_originals_enabled: bool,
) -> Vec<SpecFlatFolder> {
    let mut l_candidates = Vec::new();

    if let Some(path_base_export) = path_base_export {
        push_if_exists(
            &mut l_candidates,
            derive_flat_path(path_base_export, category),
            category,
        );
    }
    if category != EnumExportCategory::Originals && if_originals_enabled {
        push_if_exists(
            &mut l_candidates,
            derive_flat_path(path_staging, EnumExportCategory::Originals),
            EnumExportCategory::Originals,
        );
    }

    l_candidates
}

fn push_if_exists(
    l_candidates: &mut Vec<SpecFlatFolder>,
    path_dir_flat: PathBuf,
    category: EnumExportCategory,
) {
    if path_dir_flat.is_dir() {
        l_candidates.push(SpecFlatFolder {
            path: path_dir_flat,
            category,
        });
    }
}
