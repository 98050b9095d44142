//! Toolchain archive fetch from a trusted mirror
//!
//! The single GET performed here is the only network access in Kiln. The
//! archive layout is `<mirror>/<version>/<target>.tar.gz`, unpacked into the
//! local toolchain root. Every other build input must already be local.

use crate::error::{KilnError, KilnResult};
use flate2::read::GzDecoder;
use std::path::Path;
use tracing::info;

/// Download and unpack the declared toolchain archive into `dest_dir`
pub fn fetch_archive(mirror: &str, version: &str, target: &str, dest_dir: &Path) -> KilnResult<()> {
    let url = format!("{}/{}/{}.tar.gz", mirror.trim_end_matches('/'), version, target);
    info!("Fetching toolchain archive: {}", url);

    let response = ureq::get(&url).call().map_err(|e| {
        KilnError::ToolchainUnavailable {
            version: version.to_string(),
            target: target.to_string(),
            reason: format!("mirror fetch failed: {e}"),
        }
    })?;

    std::fs::create_dir_all(dest_dir)
        .map_err(|e| KilnError::io(format!("creating toolchain dir {}", dest_dir.display()), e))?;

    let reader = GzDecoder::new(response.into_body().into_reader());
    let mut archive = tar::Archive::new(reader);
    archive.unpack(dest_dir).map_err(|e| {
        // A half-unpacked installation must not be mistaken for a valid one
        let _ = std::fs::remove_dir_all(dest_dir);
        KilnError::ToolchainUnavailable {
            version: version.to_string(),
            target: target.to_string(),
            reason: format!("unpacking archive failed: {e}"),
        }
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn unreachable_mirror_fails() {
        let temp = TempDir::new().unwrap();
        let err = fetch_archive(
            "http://127.0.0.1:1/toolchains",
            "1.82.0",
            "x86_64-unknown-linux-gnu",
            temp.path(),
        )
        .unwrap_err();

        assert!(matches!(err, KilnError::ToolchainUnavailable { .. }));
    }
}
