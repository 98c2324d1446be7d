//! On-disk cache: a sibling `<file>.cache` holding a versioned, `bincode`-encoded
//! snapshot of an assembled [`PsfDataset`], valid only while its mtime exceeds the
//! source PSF file's.
//!
//! Reads never surface as fatal: an I/O error, a stale cache, a version mismatch, or a
//! corrupt payload are all treated as a cache miss and logged, never returned to the
//! caller as an [`Error`](crate::error::Error). Writes are best-effort for the same
//! reason — a failed cache write should never fail the load it's trying to speed up.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::types::PsfDataset;

const CACHE_FORMAT_VERSION: u32 = 1;

/// Derives the cache's sibling path: the PSF path with `.cache` appended.
pub(crate) fn cache_path(psf_path: &Path) -> PathBuf {
    let mut name = psf_path.as_os_str().to_os_string();
    name.push(".cache");
    PathBuf::from(name)
}

/// Returns a cached dataset if, and only if, the cache exists, is newer than the PSF
/// file, and decodes cleanly under the current format version.
pub(crate) fn try_read(psf_path: &Path, cache_path: &Path) -> Option<PsfDataset> {
    let psf_mtime = fs::metadata(psf_path).and_then(|m| m.modified()).ok()?;
    let cache_mtime = match fs::metadata(cache_path).and_then(|m| m.modified()) {
        Ok(mtime) => mtime,
        Err(_) => return None,
    };
    if cache_mtime <= psf_mtime {
        log::debug!("cache {} is not newer than {}, reparsing", cache_path.display(), psf_path.display());
        return None;
    }

    let bytes = match fs::read(cache_path) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::warn!("failed to read cache {}: {err}", cache_path.display());
            return None;
        }
    };

    match decode(&bytes) {
        Ok(dataset) => Some(dataset),
        Err(reason) => {
            log::warn!("cache {} is stale or corrupt, reparsing: {reason}", cache_path.display());
            None
        }
    }
}

fn decode(bytes: &[u8]) -> Result<PsfDataset, String> {
    if bytes.len() < 4 {
        return Err("cache file too short for a version tag".to_string());
    }
    let version = u32::from_le_bytes(bytes[0..4].try_into().expect("length checked above"));
    if version != CACHE_FORMAT_VERSION {
        return Err(format!("cache format version {version} does not match expected {CACHE_FORMAT_VERSION}"));
    }
    bincode::deserialize(&bytes[4..]).map_err(|err| err.to_string())
}

/// Serializes `dataset` to `cache_path` atomically (temp file, then rename). Failures
/// are logged, never propagated: a cache write is an optimization, not a requirement.
pub(crate) fn write(cache_path: &Path, dataset: &PsfDataset) {
    if let Err(reason) = try_write(cache_path, dataset) {
        log::warn!("failed to write cache {}: {reason}", cache_path.display());
    }
}

fn try_write(cache_path: &Path, dataset: &PsfDataset) -> Result<(), String> {
    let body = bincode::serialize(dataset).map_err(|err| err.to_string())?;
    let mut buf = Vec::with_capacity(4 + body.len());
    buf.extend_from_slice(&CACHE_FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&body);

    let mut tmp_name = cache_path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = fs::File::create(&tmp_path).map_err(|err| err.to_string())?;
    file.write_all(&buf).map_err(|err| err.to_string())?;
    file.sync_all().map_err(|err| err.to_string())?;
    fs::rename(&tmp_path, cache_path).map_err(|err| err.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::{Duration, SystemTime};

    use crate::types::SignalTable;

    fn sample_dataset() -> PsfDataset {
        PsfDataset {
            header: vec![],
            types: HashMap::new(),
            sweeps: vec![],
            traces: vec![],
            groups: HashMap::new(),
            signals: SignalTable::default(),
        }
    }

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("psf_reader_cache_test_{}_{}", std::process::id(), name))
    }

    #[test]
    fn round_trips_when_cache_is_newer() {
        let psf_path = scratch_path("roundtrip.psf");
        fs::write(&psf_path, b"HEADER END").unwrap();
        let cache_path = cache_path(&psf_path);
        let _ = fs::remove_file(&cache_path);

        write(&cache_path, &sample_dataset());
        let loaded = try_read(&psf_path, &cache_path);
        assert!(loaded.is_some());

        fs::remove_file(&psf_path).ok();
        fs::remove_file(&cache_path).ok();
    }

    #[test]
    fn stale_cache_is_rejected() {
        let psf_path = scratch_path("stale.psf");
        let cache_path = cache_path(&psf_path);
        fs::write(&psf_path, b"HEADER END").unwrap();
        write(&cache_path, &sample_dataset());

        // Touch the PSF file to a time strictly after the cache file's mtime.
        let cache_mtime = fs::metadata(&cache_path).unwrap().modified().unwrap();
        let newer = cache_mtime + Duration::from_secs(5);
        let file = fs::OpenOptions::new().write(true).open(&psf_path).unwrap();
        file.set_modified(newer).unwrap();

        assert!(try_read(&psf_path, &cache_path).is_none());

        fs::remove_file(&psf_path).ok();
        fs::remove_file(&cache_path).ok();
    }

    #[test]
    fn corrupt_cache_is_a_miss_not_an_error() {
        let psf_path = scratch_path("corrupt.psf");
        let cache_path = cache_path(&psf_path);
        fs::write(&psf_path, b"HEADER END").unwrap();
        fs::write(&cache_path, b"not a real cache payload").unwrap();

        // Ensure the cache is newer than the PSF file on filesystems with coarse mtime resolution.
        let cache_mtime = SystemTime::now() + Duration::from_secs(5);
        let file = fs::OpenOptions::new().write(true).open(&cache_path).unwrap();
        file.set_modified(cache_mtime).unwrap();

        assert!(try_read(&psf_path, &cache_path).is_none());

        fs::remove_file(&psf_path).ok();
        fs::remove_file(&cache_path).ok();
    }
}
