//! File-backed shared cache.
//!
//! Every key lives in its own file under one directory. Each file starts
//! with a fixed [`EntryHeader`] carrying a checksum and the expiry time, so
//! torn writes and stale entries are detected on read.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::backend::CacheBackend;
use crate::common::Result;

const FORMAT_VERSION: u8 = 1;
const EXTENSION: &str = "cache";

/// Metadata at the start of every cache file.
///
/// # Layout (13 bytes)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       1     version
/// 1       4     checksum (CRC32 of expiry + payload, little-endian)
/// 5       8     expires (unix seconds, 0 = never, little-endian)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EntryHeader {
    version: u8,
    checksum: u32,
    expires: u64,
}

impl EntryHeader {
    const SIZE: usize = 13;
    const OFFSET_CHECKSUM: usize = 1;
    const OFFSET_EXPIRES: usize = 5;

    fn compute_checksum(expires: u64, payload: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&expires.to_le_bytes());
        hasher.update(payload);
        hasher.finalize()
    }

    fn encode(payload: &[u8], ttl: Duration) -> Vec<u8> {
        let expires = if ttl.is_zero() {
            0
        } else {
            unix_now().saturating_add(ttl.as_secs().max(1))
        };
        let mut out = Vec::with_capacity(Self::SIZE + payload.len());
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&Self::compute_checksum(expires, payload).to_le_bytes());
        out.extend_from_slice(&expires.to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    /// Split a file into header and payload. `None` if too short.
    fn decode(data: &[u8]) -> Option<(Self, &[u8])> {
        if data.len() < Self::SIZE {
            return None;
        }
        let checksum = u32::from_le_bytes(
            data[Self::OFFSET_CHECKSUM..Self::OFFSET_EXPIRES].try_into().ok()?,
        );
        let expires = u64::from_le_bytes(
            data[Self::OFFSET_EXPIRES..Self::SIZE].try_into().ok()?,
        );
        let header = Self {
            version: data[0],
            checksum,
            expires,
        };
        Some((header, &data[Self::SIZE..]))
    }

    fn verify(&self, payload: &[u8]) -> bool {
        self.version == FORMAT_VERSION
            && self.checksum == Self::compute_checksum(self.expires, payload)
    }

    fn is_expired(&self, now: u64) -> bool {
        self.expires != 0 && now >= self.expires
    }
}

fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

/// A [`CacheBackend`] storing one file per key.
///
/// Processes on one host can share a directory. Expired or corrupt files
/// are deleted when read and reported as misses.
pub struct FileCacheBackend {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileCacheBackend {
    /// Use `dir` as the cache directory, creating it if needed.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Keys are hex-encoded so any key maps to a valid file name.
    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key.bytes().map(|b| format!("{:02x}", b)).collect();
        self.dir.join(format!("{}.{}", name, EXTENSION))
    }

    fn read_live(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let live = match EntryHeader::decode(&data) {
            Some((header, payload)) if header.verify(payload) => {
                if header.is_expired(unix_now()) {
                    debug!(path = %path.display(), "cache file expired");
                    None
                } else {
                    Some(payload.to_vec())
                }
            }
            _ => {
                warn!(path = %path.display(), "corrupt cache file");
                None
            }
        };

        if live.is_none() {
            remove_if_exists(path)?;
        }
        Ok(live)
    }
}

fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

impl CacheBackend for FileCacheBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let _guard = self.lock.lock();
        self.read_live(&self.path_for(key))
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let _guard = self.lock.lock();
        fs::write(self.path_for(key), EntryHeader::encode(value, ttl))?;
        Ok(())
    }

    fn replace(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        let _guard = self.lock.lock();
        let path = self.path_for(key);
        if self.read_live(&path)?.is_none() {
            return Ok(false);
        }
        fs::write(&path, EntryHeader::encode(value, ttl))?;
        Ok(true)
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let _guard = self.lock.lock();
        remove_if_exists(&self.path_for(key))
    }

    fn flush(&self) -> Result<()> {
        let _guard = self.lock.lock();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) {
                remove_if_exists(&path)?;
            }
        }
        Ok(())
    }
}
