//! Archive extraction.

use std::fs::File;
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;

use crate::error::{CnshError, Result};

/// Extractor for package archives.
///
/// Extraction is blocking work; the package manager runs it on Tokio's
/// blocking pool.
pub trait ArchiveExtractor: Send + Sync {
    /// Extract `archive` into `dest_dir`.
    ///
    /// Returns the number of entries unpacked.
    fn extract(&self, name: &str, archive: &Path, dest_dir: &Path) -> Result<usize>;
}

/// Extractor for gzip-compressed tarballs (`.tgz`), the registry's format.
///
/// Entries are unpacked relative to the destination with their archive
/// paths kept as-is, so npm tarballs land under `<dest>/package/`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    fn extract(&self, name: &str, archive: &Path, dest_dir: &Path) -> Result<usize> {
        let fail = |detail: String| CnshError::Extraction {
            name: name.to_string(),
            detail,
        };

        let file = File::open(archive).map_err(|e| CnshError::io(archive, e))?;
        let mut tar = Archive::new(GzDecoder::new(file));
        tar.set_preserve_permissions(false);

        let mut count = 0;
        for entry in tar.entries().map_err(|e| fail(e.to_string()))? {
            let mut entry = entry.map_err(|e| fail(e.to_string()))?;
            let path = entry
                .path()
                .map_err(|e| fail(e.to_string()))?
                .into_owned();
            // `unpack_in` refuses entries that would land outside `dest_dir`.
            let unpacked = entry
                .unpack_in(dest_dir)
                .map_err(|e| fail(format!("{}: {e}", path.display())))?;
            if !unpacked {
                return Err(fail(format!(
                    "entry '{}' escapes the package directory",
                    path.display()
                )));
            }
            count += 1;
        }

        if count == 0 {
            return Err(fail("archive contains no entries".to_string()));
        }
        Ok(count)
    }
}

/// Write a `.tgz` containing `files` for tests.
#[cfg(test)]
pub(crate) fn write_tgz(path: &Path, files: &[(&str, &[u8])]) {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let file = File::create(path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}
