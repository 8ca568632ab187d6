//! Lazy, pooled access to fragment triangle data.
//!
//! The fragment blob is never read at mesh construction. The first
//! [`FragmentStore::fetch`] for a fragment reads its batch through a
//! [`FragmentSource`] into a pooled buffer and keeps the decoded geometry
//! resident behind a reference-counted [`FragmentHandle`]. Entries nobody
//! holds a handle to are evicted least-recently-used once the resident byte
//! budget is exceeded, and re-read on the next fetch.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use rustc_hash::FxHashMap;

use crate::error::FragmentError;
use crate::format::ByteOrder;
use crate::fragment::{FragmentGeometry, MeshFragment};
use crate::pool::{BufferPool, PoolStats};

/// Random-access byte source holding the fragment blob.
pub trait FragmentSource: Send + Sync {
    /// Fill `buf` with the bytes starting at `offset`.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Total size of the blob in bytes.
    fn byte_len(&self) -> io::Result<u64>;
}

/// Fragment blob on disk. The file is opened on the first read, so a missing
/// blob only surfaces when geometry is first requested.
pub struct FileSource {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FileSource {
    fn with_file<T>(&self, f: impl FnOnce(&mut File) -> io::Result<T>) -> io::Result<T> {
        let mut slot = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        let file = match &mut *slot {
            Some(file) => file,
            empty @ None => {
                let file = File::open(&self.path)?;
                tracing::debug!(path = %self.path.display(), "opened fragment blob");
                empty.insert(file)
            }
        };
        f(file)
    }
}

impl FragmentSource for FileSource {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.with_file(|file| {
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(buf)
        })
    }

    fn byte_len(&self) -> io::Result<u64> {
        self.with_file(|file| Ok(file.metadata()?.len()))
    }
}

/// Fragment blob held in memory.
pub struct MemorySource {
    data: Arc<[u8]>,
}

impl MemorySource {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }
}

impl FragmentSource for MemorySource {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let start = usize::try_from(offset).map_err(|_| io::ErrorKind::UnexpectedEof)?;
        let end = start
            .checked_add(buf.len())
            .filter(|&end| end <= self.data.len())
            .ok_or(io::ErrorKind::UnexpectedEof)?;
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn byte_len(&self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }
}

/// Shared, borrowed fragment geometry. Drop it once consumed (for example at
/// the end of a frame) so the store may evict it.
pub type FragmentHandle = Arc<FragmentGeometry>;

/// Tuning knobs for a [`FragmentStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreOptions {
    /// Returned read buffers kept for reuse.
    pub max_idle_buffers: usize,
    /// Resident geometry bytes above which unborrowed entries are evicted.
    pub resident_budget_bytes: usize,
    pub byte_order: ByteOrder,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_idle_buffers: 64,
            resident_budget_bytes: 256 * 1024 * 1024, // 256 MB
            byte_order: ByteOrder::Little,
        }
    }
}

/// Cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub hits: usize,
    pub misses: usize,
    pub evictions: usize,
    pub resident_count: usize,
    pub resident_bytes: usize,
    pub pool: PoolStats,
}

struct Resident {
    geometry: FragmentHandle,
    last_used: u64,
}

#[derive(Default)]
struct ResidentCache {
    entries: FxHashMap<u32, Resident>,
    bytes: usize,
    tick: u64,
    hits: usize,
    misses: usize,
    evictions: usize,
}

impl ResidentCache {
    fn touch(&mut self, id: u32) -> Option<FragmentHandle> {
        self.tick += 1;
        let tick = self.tick;
        let entry = self.entries.get_mut(&id)?;
        entry.last_used = tick;
        Some(Arc::clone(&entry.geometry))
    }

    /// Evict unborrowed entries, oldest first, until within `budget`.
    fn evict_to(&mut self, budget: usize) {
        while self.bytes > budget {
            let victim = self
                .entries
                .iter()
                .filter(|(_, e)| Arc::strong_count(&e.geometry) == 1)
                .min_by_key(|(_, e)| e.last_used)
                .map(|(&id, _)| id);
            let Some(id) = victim else {
                break;
            };
            if let Some(entry) = self.entries.remove(&id) {
                self.bytes -= entry.geometry.byte_len();
                self.evictions += 1;
                tracing::trace!(fragment = id, "evicted fragment geometry");
            }
        }
    }
}

/// Pooled reader of fragment triangle data, addressed by fragment id.
///
/// Owns its [`BufferPool`]; both live exactly as long as the store. Safe to
/// share between threads.
pub struct FragmentStore {
    source: Box<dyn FragmentSource>,
    pool: BufferPool,
    options: StoreOptions,
    cache: Mutex<ResidentCache>,
}

impl FragmentStore {
    pub fn new(source: Box<dyn FragmentSource>, options: StoreOptions) -> Self {
        Self {
            source,
            pool: BufferPool::new(options.max_idle_buffers),
            options,
            cache: Mutex::new(ResidentCache::default()),
        }
    }

    /// Store reading from a fragment blob file, opened lazily.
    pub fn open_file(path: impl Into<PathBuf>, options: StoreOptions) -> Self {
        Self::new(Box::new(FileSource::new(path)), options)
    }

    /// Store over an in-memory fragment blob.
    pub fn from_bytes(data: impl Into<Arc<[u8]>>, options: StoreOptions) -> Self {
        Self::new(Box::new(MemorySource::new(data)), options)
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, ResidentCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Borrow the geometry of `fragment`, reading it on first access.
    ///
    /// Blocks on the fragment source when the geometry is not resident.
    pub fn fetch(&self, fragment: &MeshFragment) -> Result<FragmentHandle, FragmentError> {
        let id = fragment.id;
        {
            let mut cache = self.cache();
            if let Some(handle) = cache.touch(id) {
                cache.hits += 1;
                return Ok(handle);
            }
            cache.misses += 1;
        }

        let io_error = |source: io::Error| FragmentError::Io {
            fragment: id,
            source,
        };
        // Bound the buffer by the blob before allocating it.
        let blob_len = self.source.byte_len().map_err(io_error)?;
        let end = fragment
            .data_offset
            .checked_add(u64::from(fragment.data_length));
        if end.is_none_or(|end| end > blob_len) {
            return Err(io_error(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "batch at {}+{} runs past the {blob_len}-byte blob",
                    fragment.data_offset, fragment.data_length
                ),
            )));
        }

        let mut buf = self.pool.acquire(fragment.data_length as usize);
        self.source
            .read_at(fragment.data_offset, &mut buf)
            .map_err(io_error)?;
        let geometry = Arc::new(FragmentGeometry::parse(id, buf, self.options.byte_order)?);

        let mut cache = self.cache();
        // Another thread may have loaded it while we were reading.
        if let Some(existing) = cache.touch(id) {
            return Ok(existing);
        }
        let last_used = cache.tick;
        cache.bytes += geometry.byte_len();
        cache.entries.insert(
            id,
            Resident {
                geometry: Arc::clone(&geometry),
                last_used,
            },
        );
        cache.evict_to(self.options.resident_budget_bytes);
        Ok(geometry)
    }

    pub fn is_resident(&self, fragment_id: u32) -> bool {
        self.cache().entries.contains_key(&fragment_id)
    }

    /// Drop every resident entry nobody is borrowing.
    pub fn release_unused(&self) {
        self.cache().evict_to(0);
    }

    pub fn stats(&self) -> StoreStats {
        let cache = self.cache();
        StoreStats {
            hits: cache.hits,
            misses: cache.misses,
            evictions: cache.evictions,
            resident_count: cache.entries.len(),
            resident_bytes: cache.bytes,
            pool: self.pool.stats(),
        }
    }
}

impl std::fmt::Debug for FragmentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentStore")
            .field("options", &self.options)
            .field("stats", &self.stats())
            .finish()
    }
}
