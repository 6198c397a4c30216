//! Storage volume identity, used to decide whether a hard link is possible.

use std::fs;
use std::path::Path;

use crate::spec::DeviceProbeError;

/// Answers whether two existing paths live on the same storage volume.
pub trait TraitDeviceProbe {
    fn is_same_device(&self, path_a: &Path, path_b: &Path) -> Result<bool, DeviceProbeError>;
}

/// Probe backed by the platform's file metadata.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceProbeStat;

impl TraitDeviceProbe for DeviceProbeStat {
    fn is_same_device(&self, path_a: &Path, path_b: &Path) -> Result<bool, DeviceProbeError> {
        is_same_device(path_a, path_b)
    }
}

/// Compare the device identifiers of `path_a` and `path_b`.
///
/// Fails when either path's metadata cannot be read. Returns `false` when
/// the platform exposes no device identifier.
pub fn is_same_device(path_a: &Path, path_b: &Path) -> Result<bool, DeviceProbeError> {
    let id_device_a = derive_device_id(path_a)?;
    let id_device_b = derive_device_id(path_b)?;
    match (id_device_a, id_device_b) {
        (Some(a), Some(b)) => Ok(a == b),
        _ => Ok(false),
    }
}

fn derive_device_id(path: &Path) -> Result<Option<u64>, DeviceProbeError> {
    let stat = fs::metadata(path).map_err(|e| DeviceProbeError {
        path: path.to_path_buf(),
        source: e,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Ok(Some(stat.dev()))
    }
    #[cfg(not(unix))]
    {
        let _ = stat;
        Ok(None)
    }
}
