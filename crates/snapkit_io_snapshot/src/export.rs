//! Flat-folder export of one category into the staging tree.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::materialize::TraitMaterializer;
use crate::report::ReportExportBuilder;
use crate::spec::{EnumExportCategory, SnapshotExportError, SpecExportItem, SpecFlatFolder};
use crate::util::{is_regular_file, validate_no_symlink_parent, validate_relative_item_path};

/// Materialize every item of `category` into `path_dir_flat`.
///
/// For each item, candidates are probed in list order for a regular file at
/// `candidate/path_relative`; the first hit is the link source, otherwise the
/// item's own `path_source` is used. Linking against a candidate (itself
/// possibly a hard link) is what carries zero-copy reuse across snapshot
/// generations.
///
/// The first failing item aborts the category. Existing targets are not
/// skipped: the staging folder is expected to be clean.
pub fn export_category(
    category: EnumExportCategory,
    l_items: &[SpecExportItem],
    l_candidates: &[SpecFlatFolder],
    path_dir_flat: &Path,
    materializer: &dyn TraitMaterializer,
    builder_report: &mut ReportExportBuilder,
) -> Result<(), SnapshotExportError> {
    info!(
        category = %category,
        n_items = l_items.len(),
        n_candidates = l_candidates.len(),
        flat = %path_dir_flat.display(),
        "export category"
    );

    for spec_item in l_items {
        let path_file_dst = derive_item_target(category, &spec_item.path_relative, path_dir_flat)?;
        if let Some(path_parent_dst) = path_file_dst.parent() {
            fs::create_dir_all(path_parent_dst).map_err(|e| SnapshotExportError::StagingInit {
                path: path_parent_dst.to_path_buf(),
                source: e,
            })?;
        }

        let path_file_src = match find_candidate_file(&spec_item.path_relative, l_candidates) {
            Some(path_candidate) => {
                builder_report.add_candidate_hit();
                path_candidate
            }
            None => {
                builder_report.add_source_fallback();
                spec_item.path_source.clone()
            }
        };

        let enum_kind = materializer.materialize(&path_file_src, &path_file_dst, builder_report)?;
        builder_report.add_item();
        debug!(
            category = %category,
            kind = %enum_kind,
            source = %path_file_src.display(),
            target = %path_file_dst.display(),
            "materialized item"
        );
    }

    Ok(())
}

fn derive_item_target(
    category: EnumExportCategory,
    path_relative: &Path,
    path_dir_flat: &Path,
) -> Result<PathBuf, SnapshotExportError> {
    let invalid = |reason: String| SnapshotExportError::InvalidItemPath {
        category,
        path_relative: path_relative.to_path_buf(),
        reason,
    };

    validate_relative_item_path(path_relative).map_err(invalid)?;
    validate_no_symlink_parent(path_dir_flat, path_relative).map_err(invalid)?;
    Ok(path_dir_flat.join(path_relative))
}

fn find_candidate_file(path_relative: &Path, l_candidates: &[SpecFlatFolder]) -> Option<PathBuf> {
    l_candidates
        .iter()
        .map(|spec_candidate| spec_candidate.path.join(path_relative))
        .find(|path_candidate| is_regular_file(path_candidate))
}
