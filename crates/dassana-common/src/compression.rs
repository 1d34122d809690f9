//! Gzip helpers
//!
//! Buffer files are compressed next to themselves (`<path>.gz`) before upload,
//! and several cloud log formats arrive gzip-encoded. Both directions use
//! flate2 with the default compression level.

use crate::error::{CommonError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Path of the gzip artifact produced for `path`.
pub fn gz_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".gz");
    PathBuf::from(name)
}

/// Compress `path` into `<path>.gz`, overwriting any previous artifact.
///
/// The source file is left in place.
pub fn gzip_file(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let target = gz_path(path);

    let source = File::open(path).map_err(|e| CommonError::compression(path, e))?;
    let sink = File::create(&target).map_err(|e| CommonError::compression(path, e))?;

    let mut reader = BufReader::new(source);
    let mut encoder = GzEncoder::new(BufWriter::new(sink), Compression::default());
    let copied =
        std::io::copy(&mut reader, &mut encoder).map_err(|e| CommonError::compression(path, e))?;
    let mut writer = encoder
        .finish()
        .map_err(|e| CommonError::compression(path, e))?;
    writer
        .flush()
        .map_err(|e| CommonError::compression(path, e))?;

    debug!(
        source = %path.display(),
        artifact = %target.display(),
        bytes = copied,
        "Compressed buffer file"
    );
    Ok(target)
}

/// Gzip an in-memory payload.
pub fn gzip_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub fn decompress_gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(CommonError::Decompression)?;
    debug!("Decompressed {} -> {} bytes", data.len(), decompressed.len());
    Ok(decompressed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_gz_path_appends_suffix() {
        assert_eq!(
            gz_path(Path::new("/tmp/1700000000.ndjson")),
            PathBuf::from("/tmp/1700000000.ndjson.gz")
        );
    }

    #[test]
    fn test_gzip_file_keeps_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("1700000000.ndjson");
        std::fs::write(&source, b"{\"a\":1}\n{\"b\":2}\n").unwrap();

        let artifact = gzip_file(&source).unwrap();

        assert!(source.exists());
        assert_eq!(artifact, dir.path().join("1700000000.ndjson.gz"));
        let restored = decompress_gzip(&std::fs::read(&artifact).unwrap()).unwrap();
        assert_eq!(restored, b"{\"a\":1}\n{\"b\":2}\n");
    }

    #[test]
    fn test_gzip_file_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = gzip_file(dir.path().join("absent.ndjson")).unwrap_err();
        assert!(matches!(err, CommonError::Compression { .. }));
    }

    #[test]
    fn test_decompress_gzip_invalid() {
        assert!(decompress_gzip(b"not gzip data").is_err());
    }
}
