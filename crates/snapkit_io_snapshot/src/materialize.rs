//! Link-or-copy production of one target file.

use std::fs;
use std::path::Path;
use std::time::Instant;

use tracing::debug;

use crate::device::{DeviceProbeStat, TraitDeviceProbe};
use crate::report::ReportExportBuilder;
use crate::spec::{EnumMaterializeKind, EnumMaterializeStep, MaterializeError};
use crate::util::copy_file_atomic;

/// Produces a target file from a source file and records the strategy used.
///
/// Preconditions: `path_source` is a regular file and the parent directory
/// of `path_target` exists. Implementations never leave a partial target and
/// update `builder_report` only on success.
pub trait TraitMaterializer {
    fn materialize(
        &self,
        path_source: &Path,
        path_target: &Path,
        builder_report: &mut ReportExportBuilder,
    ) -> Result<EnumMaterializeKind, MaterializeError>;
}

/// Hard link when source and target directory share a device, copy otherwise.
#[derive(Debug, Default, Clone)]
pub struct LinkOrCopyMaterializer<P = DeviceProbeStat> {
    probe: P,
}

impl LinkOrCopyMaterializer {
    pub fn new() -> Self {
        Self {
            probe: DeviceProbeStat,
        }
    }
}

impl<P: TraitDeviceProbe> LinkOrCopyMaterializer<P> {
    /// Use a custom device probe.
    pub fn with_probe(probe: P) -> Self {
        Self { probe }
    }
}

impl<P: TraitDeviceProbe> TraitMaterializer for LinkOrCopyMaterializer<P> {
    fn materialize(
        &self,
        path_source: &Path,
        path_target: &Path,
        builder_report: &mut ReportExportBuilder,
    ) -> Result<EnumMaterializeKind, MaterializeError> {
        let path_dir_target = path_target.parent().unwrap_or(Path::new(""));
        let b_same_device = match self.probe.is_same_device(path_source, path_dir_target) {
            Ok(v) => v,
            // An unreadable source fails again, with its own error, in the copy below.
            Err(e) if e.path == path_source => {
                debug!(
                    path = %path_source.display(),
                    error = %e.source,
                    "source device unknown, copying"
                );
                false
            }
            Err(e) => {
                return Err(MaterializeError {
                    path_source: path_source.to_path_buf(),
                    path_target: path_target.to_path_buf(),
                    step: EnumMaterializeStep::ProbeDevice,
                    source: e.source,
                });
            }
        };

        if b_same_device {
            link_file(path_source, path_target, builder_report)?;
            return Ok(EnumMaterializeKind::Link);
        }
        copy_file(path_source, path_target, builder_report)?;
        Ok(EnumMaterializeKind::Copy)
    }
}

/// Full-copy mode: never links, whatever the device layout.
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyOnlyMaterializer;

impl TraitMaterializer for CopyOnlyMaterializer {
    fn materialize(
        &self,
        path_source: &Path,
        path_target: &Path,
        builder_report: &mut ReportExportBuilder,
    ) -> Result<EnumMaterializeKind, MaterializeError> {
        copy_file(path_source, path_target, builder_report)?;
        Ok(EnumMaterializeKind::Copy)
    }
}

fn link_file(
    path_source: &Path,
    path_target: &Path,
    builder_report: &mut ReportExportBuilder,
) -> Result<(), MaterializeError> {
    let t_start = Instant::now();
    fs::hard_link(path_source, path_target).map_err(|e| MaterializeError {
        path_source: path_source.to_path_buf(),
        path_target: path_target.to_path_buf(),
        step: EnumMaterializeStep::Link,
        source: e,
    })?;
    let dur_link = t_start.elapsed();
    builder_report.add_linked(dur_link);
    debug!(
        source = %path_source.display(),
        target = %path_target.display(),
        elapsed_us = dur_link.as_micros() as u64,
        "linked file"
    );
    Ok(())
}

fn copy_file(
    path_source: &Path,
    path_target: &Path,
    builder_report: &mut ReportExportBuilder,
) -> Result<(), MaterializeError> {
    copy_file_atomic(path_source, path_target).map_err(|e| MaterializeError {
        path_source: path_source.to_path_buf(),
        path_target: path_target.to_path_buf(),
        step: EnumMaterializeStep::Copy,
        source: e,
    })?;
    builder_report.add_copied();
    debug!(
        source = %path_source.display(),
        target = %path_target.display(),
        "copied file"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{CopyOnlyMaterializer, LinkOrCopyMaterializer, TraitMaterializer};
    use crate::device::TraitDeviceProbe;
    use crate::report::ReportExportBuilder;
    use crate::spec::{
        DeviceProbeError, EnumMaterializeKind, EnumMaterializeStep, MaterializeError,
    };

    struct ProbeOtherDevice;

    impl TraitDeviceProbe for ProbeOtherDevice {
        fn is_same_device(&self, _: &Path, _: &Path) -> Result<bool, DeviceProbeError> {
            Ok(false)
        }
    }

    fn write_text(path: &Path, txt: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, txt).expect("write text");
    }

    #[cfg(unix)]
    fn inode(path: &Path) -> u64 {
        use std::os::unix::fs::MetadataExt;
        std::fs::metadata(path).expect("metadata").ino()
    }

    #[cfg(unix)]
    #[test]
    fn same_device_produces_hard_link() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path_src = tmp.path().join("lib/a.jpg");
        let path_dst = tmp.path().join("out/a.jpg");
        write_text(&path_src, "a");
        std::fs::create_dir_all(tmp.path().join("out")).expect("mkdir out");

        let mut builder_report = ReportExportBuilder::default();
        let enum_kind = LinkOrCopyMaterializer::new()
            .materialize(&path_src, &path_dst, &mut builder_report)
            .expect("materialize");

        assert_eq!(enum_kind, EnumMaterializeKind::Link);
        assert_eq!(inode(&path_src), inode(&path_dst));
        let report = builder_report.build();
        assert_eq!(report.cnt_linked, 1);
        assert_eq!(report.cnt_copied, 0);
    }

    #[test]
    fn other_device_falls_back_to_copy() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path_src = tmp.path().join("lib/a.jpg");
        let path_dst = tmp.path().join("out/a.jpg");
        write_text(&path_src, "a");
        std::fs::create_dir_all(tmp.path().join("out")).expect("mkdir out");

        let mut builder_report = ReportExportBuilder::default();
        let enum_kind = LinkOrCopyMaterializer::with_probe(ProbeOtherDevice)
            .materialize(&path_src, &path_dst, &mut builder_report)
            .expect("materialize");

        assert_eq!(enum_kind, EnumMaterializeKind::Copy);
        assert_eq!(std::fs::read_to_string(&path_dst).expect("read"), "a");
        assert_eq!(builder_report.cnt_linked(), 0);
        assert_eq!(builder_report.cnt_copied(), 1);
    }

    #[test]
    fn copy_only_never_links() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path_src = tmp.path().join("a.jpg");
        let path_dst = tmp.path().join("b.jpg");
        write_text(&path_src, "a");

        let mut builder_report = ReportExportBuilder::default();
        let enum_kind = CopyOnlyMaterializer
            .materialize(&path_src, &path_dst, &mut builder_report)
            .expect("materialize");
        assert_eq!(enum_kind, EnumMaterializeKind::Copy);
        assert_eq!(builder_report.cnt_copied(), 1);
    }

    #[test]
    fn missing_target_parent_is_a_probe_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path_src = tmp.path().join("a.jpg");
        write_text(&path_src, "a");

        let mut builder_report = ReportExportBuilder::default();
        let err = LinkOrCopyMaterializer::new()
            .materialize(
                &path_src,
                &tmp.path().join("missing/a.jpg"),
                &mut builder_report,
            )
            .expect_err("must fail");
        assert!(matches!(
            err,
            MaterializeError {
                step: EnumMaterializeStep::ProbeDevice,
                ..
            }
        ));
        assert_eq!(builder_report.cnt_linked() + builder_report.cnt_copied(), 0);
    }

    #[test]
    fn missing_source_fails_without_counting() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path_dst = tmp.path().join("a.jpg");

        let mut builder_report = ReportExportBuilder::default();
        let err = LinkOrCopyMaterializer::new()
            .materialize(&tmp.path().join("absent.jpg"), &path_dst, &mut builder_report)
            .expect_err("must fail");
        assert_eq!(err.step, EnumMaterializeStep::Copy);
        assert!(!path_dst.exists());
        assert_eq!(builder_report.cnt_copied(), 0);
    }

    #[test]
    fn existing_target_is_not_replaced() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path_src = tmp.path().join("a.jpg");
        let path_dst = tmp.path().join("b.jpg");
        write_text(&path_src, "new");
        write_text(&path_dst, "old");

        let mut builder_report = ReportExportBuilder::default();
        LinkOrCopyMaterializer::new()
            .materialize(&path_src, &path_dst, &mut builder_report)
            .expect_err("existing target must fail");
        assert_eq!(std::fs::read_to_string(&path_dst).expect("read"), "old");
    }
}
