//! Layout constants and configuration/feed loaders.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::spec::{ConfigError, SpecMetadataFeed, SpecSnapshotOptions};

/// Staging tree name under the target root.
pub const C_NAME_DIR_IN_PROGRESS: &str = "InProgress";
/// Permanent snapshot tree name under the target root.
pub const C_NAME_DIR_SNAPSHOT: &str = "Snapshot";
/// Set-aside location of the previous snapshot during promotion.
pub const C_NAME_DIR_RETIRED: &str = "Retired";
/// Flat folder name under each category folder.
pub const C_NAME_DIR_FLAT: &str = ".flat";
pub const C_NAME_DIR_ORIGINALS: &str = "Originals";
pub const C_NAME_DIR_CURRENT: &str = "Current";
pub const C_NAME_DIR_DERIVED: &str = "Derived";
/// Prefix of temporary files written next to a copy target.
pub const C_PREFIX_FILE_PARTIAL: &str = ".snapkit-partial-";
/// Total attempts of one bounded-retry folder removal or set-aside.
pub const N_DELETE_ATTEMPTS_MAX: usize = 3;

/// Load [`SpecSnapshotOptions`] from a JSON file; missing fields take defaults.
pub fn load_snapshot_options<P: AsRef<Path>>(
    path_file: P,
) -> Result<SpecSnapshotOptions, ConfigError> {
    read_json(path_file.as_ref())
}

/// Load a [`SpecMetadataFeed`] from a JSON file.
pub fn load_metadata_feed<P: AsRef<Path>>(path_file: P) -> Result<SpecMetadataFeed, ConfigError> {
    read_json(path_file.as_ref())
}

fn read_json<T: DeserializeOwned>(path_file: &Path) -> Result<T, ConfigError> {
    let txt = fs::read_to_string(path_file).map_err(|e| ConfigError::Read {
        path: path_file.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&txt).map_err(|e| ConfigError::Parse {
        path: path_file.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{load_metadata_feed, load_snapshot_options};
    use crate::spec::{ConfigError, EnumMaterializeMode};

    #[test]
    fn options_file_fills_defaults() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path_file = tmp.path().join("snapkit.json");
        std::fs::write(
            &path_file,
            r#"{"path_target": "/srv/export", "if_export_derived": true, "rule_materialize": "copy_only"}"#,
        )
        .expect("write config");

        let spec_options = load_snapshot_options(&path_file).expect("load options");
        assert_eq!(spec_options.path_target, PathBuf::from("/srv/export"));
        assert!(spec_options.if_export_originals);
        assert!(spec_options.if_export_derived);
        assert!(spec_options.if_link_previous_snapshot);
        assert!(!spec_options.if_delete_flat);
        assert_eq!(spec_options.rule_materialize, EnumMaterializeMode::CopyOnly);
    }

    #[test]
    fn options_file_rejects_unknown_field() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path_file = tmp.path().join("snapkit.json");
        std::fs::write(&path_file, r#"{"path_target": "/x", "delete_flat": true}"#)
            .expect("write config");

        let err = load_snapshot_options(&path_file).expect_err("unknown field must fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_feed_file_reports_read_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let err = load_metadata_feed(tmp.path().join("absent.json")).expect_err("must fail");
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
