//! Durable, append-only trail storage.
//!
//! # Storage Format
//!
//! `FileTrailStore` keeps the whole trail in one memory-mapped file of
//! fixed-size records, so appends are O(1) and a full read is a linear
//! scan in insertion order.
//!
//! ```text
//! Data File (.dat):
//! ┌─────────────────────────────────────┐
//! │ Header (64 bytes)                    │
//! │  - Magic: "TRAILDAT"                │
//! │  - Version: u32                      │
//! │  - Record count: u64                 │
//! │  - Write offset: u64                 │
//! │  - Reserved                          │
//! ├─────────────────────────────────────┤
//! │ Records (128 bytes each)             │
//! │  - captured_at_ms: u64               │
//! │  - latitude, longitude: f64          │
//! │  - address length + flags            │
//! │  - address: [u8; 96] (UTF-8)         │
//! └─────────────────────────────────────┘
//! ```

use crate::types::{Coordinate, TrackedPoint};
use async_trait::async_trait;
use bytemuck::{Pod, Zeroable};
use memmap2::{MmapMut, MmapOptions};
use parking_lot::RwLock;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrailStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid file format")]
    InvalidFormat,
    #[error("Version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u32, got: u32 },
    #[error("Corrupted trail: {0}")]
    Corrupted(String),
}

/// Ordered, append-only store of accepted points.
#[async_trait]
pub trait TrailStore: Send + Sync {
    async fn append(&self, point: &TrackedPoint) -> Result<(), TrailStoreError>;
    /// All points in insertion order.
    async fn fetch_all(&self) -> Result<Vec<TrackedPoint>, TrailStoreError>;
    async fn delete_all(&self) -> Result<(), TrailStoreError>;
}

const DATA_MAGIC: &[u8; 8] = b"TRAILDAT";
const CURRENT_VERSION: u32 = 1;

const DATA_HEADER_SIZE: usize = 64;
/// Room for 8K points before the first grow
const INITIAL_CAPACITY: u64 = (DATA_HEADER_SIZE + 8192 * PointRecord::SIZE) as u64;

/// Longest stored address in bytes; longer ones are truncated.
pub const MAX_ADDRESS_LEN: usize = 96;

const FLAG_HAS_ADDRESS: u16 = 0x0001;

/// Data file header
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct DataHeader {
    magic: [u8; 8],
    version: u32,
    _pad1: u32,
    record_count: u64,
    write_offset: u64,
    _reserved: [u8; 32],
}

/// On-disk point record
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct PointRecord {
    captured_at_ms: u64,
    latitude: f64,
    longitude: f64,
    address_len: u16,
    flags: u16,
    _pad: u32,
    address: [u8; MAX_ADDRESS_LEN],
}

impl PointRecord {
    const SIZE: usize = std::mem::size_of::<Self>();

    fn encode(point: &TrackedPoint) -> Self {
        let mut record = Self::zeroed();
        record.captured_at_ms = point.captured_at_ms;
        record.latitude = point.latitude;
        record.longitude = point.longitude;

        if let Some(address) = &point.address {
            let bytes = truncate_utf8(address, MAX_ADDRESS_LEN).as_bytes();
            record.address[..bytes.len()].copy_from_slice(bytes);
            record.address_len = bytes.len() as u16;
            record.flags |= FLAG_HAS_ADDRESS;
        }

        record
    }

    fn decode(&self) -> Result<TrackedPoint, TrailStoreError> {
        let address = if self.flags & FLAG_HAS_ADDRESS != 0 {
            let len = self.address_len as usize;
            if len > MAX_ADDRESS_LEN {
                return Err(TrailStoreError::Corrupted(format!(
                    "address length {} exceeds {}",
                    len, MAX_ADDRESS_LEN
                )));
            }
            Some(String::from_utf8_lossy(&self.address[..len]).into_owned())
        } else {
            None
        };

        Ok(TrackedPoint::new(
            Coordinate::new(self.latitude, self.longitude),
            self.captured_at_ms,
            address,
        ))
    }
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Memory-mapped file trail store.
pub struct FileTrailStore {
    data_file: File,
    data_mmap: RwLock<MmapMut>,
    write_offset: AtomicU64,
    data_capacity: AtomicU64,
}

impl FileTrailStore {
    /// Open or create the store at `<base_path>.dat`.
    pub fn open<P: AsRef<Path>>(base_path: P) -> Result<Self, TrailStoreError> {
        let data_path = base_path.as_ref().with_extension("dat");
        let (data_file, data_mmap, write_offset, capacity) = Self::open_data(&data_path)?;

        Ok(Self {
            data_file,
            data_mmap: RwLock::new(data_mmap),
            write_offset: AtomicU64::new(write_offset),
            data_capacity: AtomicU64::new(capacity),
        })
    }

    fn open_data(path: &Path) -> Result<(File, MmapMut, u64, u64), TrailStoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let file_len = file.metadata()?.len();
        let is_new = file_len == 0;

        if !is_new && file_len < DATA_HEADER_SIZE as u64 {
            return Err(TrailStoreError::InvalidFormat);
        }

        let capacity = if file_len < INITIAL_CAPACITY {
            file.set_len(INITIAL_CAPACITY)?;
            INITIAL_CAPACITY
        } else {
            file_len
        };

        let mut mmap = unsafe { MmapOptions::new().map_mut(&file)? };

        let write_offset = if is_new {
            let header = DataHeader {
                magic: *DATA_MAGIC,
                version: CURRENT_VERSION,
                _pad1: 0,
                record_count: 0,
                write_offset: DATA_HEADER_SIZE as u64,
                _reserved: [0; 32],
            };
            mmap[..DATA_HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&header));
            mmap.flush()?;
            DATA_HEADER_SIZE as u64
        } else {
            if mmap[..8] != *DATA_MAGIC {
                return Err(TrailStoreError::InvalidFormat);
            }
            let header: &DataHeader = bytemuck::from_bytes(&mmap[..DATA_HEADER_SIZE]);
            if header.version != CURRENT_VERSION {
                return Err(TrailStoreError::VersionMismatch {
                    expected: CURRENT_VERSION,
                    got: header.version,
                });
            }

            let expected = DATA_HEADER_SIZE as u64 + header.record_count * PointRecord::SIZE as u64;
            if header.write_offset != expected || header.write_offset > capacity {
                return Err(TrailStoreError::Corrupted(format!(
                    "write offset {} does not match {} records",
                    header.write_offset, header.record_count
                )));
            }
            header.write_offset
        };

        Ok((file, mmap, write_offset, capacity))
    }

    /// Append one point at the end of the trail.
    pub fn append_point(&self, point: &TrackedPoint) -> Result<(), TrailStoreError> {
        let record = PointRecord::encode(point);
        let mut data_guard = self.data_mmap.write();

        let write_pos = self.write_offset.load(Ordering::Acquire);
        let needed = write_pos + PointRecord::SIZE as u64;
        if needed > self.data_capacity.load(Ordering::Acquire) {
            self.grow_data_file(&mut data_guard)?;
        }

        let start = write_pos as usize;
        data_guard[start..start + PointRecord::SIZE].copy_from_slice(bytemuck::bytes_of(&record));
        self.write_offset.store(needed, Ordering::Release);

        let header: &mut DataHeader =
            bytemuck::from_bytes_mut(&mut data_guard[..DATA_HEADER_SIZE]);
        header.record_count += 1;
        header.write_offset = needed;

        Ok(())
    }

    /// Read every stored point in insertion order.
    pub fn read_all(&self) -> Result<Vec<TrackedPoint>, TrailStoreError> {
        let data_guard = self.data_mmap.read();
        let end = self.write_offset.load(Ordering::Acquire) as usize;

        let mut points = Vec::with_capacity((end - DATA_HEADER_SIZE) / PointRecord::SIZE);
        let mut offset = DATA_HEADER_SIZE;
        while offset + PointRecord::SIZE <= end {
            let record: &PointRecord =
                bytemuck::from_bytes(&data_guard[offset..offset + PointRecord::SIZE]);
            points.push(record.decode()?);
            offset += PointRecord::SIZE;
        }

        Ok(points)
    }

    /// Forget every stored point. The file keeps its capacity.
    pub fn clear(&self) -> Result<(), TrailStoreError> {
        let mut data_guard = self.data_mmap.write();

        let header: &mut DataHeader =
            bytemuck::from_bytes_mut(&mut data_guard[..DATA_HEADER_SIZE]);
        header.record_count = 0;
        header.write_offset = DATA_HEADER_SIZE as u64;
        self.write_offset
            .store(DATA_HEADER_SIZE as u64, Ordering::Release);

        data_guard.flush()?;
        Ok(())
    }

    fn grow_data_file(&self, mmap: &mut MmapMut) -> Result<(), TrailStoreError> {
        let current_cap = self.data_capacity.load(Ordering::Acquire);
        let new_cap = current_cap * 2;

        mmap.flush()?;
        self.data_file.set_len(new_cap)?;
        *mmap = unsafe { MmapOptions::new().map_mut(&self.data_file)? };
        self.data_capacity.store(new_cap, Ordering::Release);

        tracing::info!("Grew trail file to {} KB", new_cap / 1024);
        Ok(())
    }

    /// Get statistics about the store.
    pub fn stats(&self) -> TrailStoreStats {
        let data_guard = self.data_mmap.read();
        let header: &DataHeader = bytemuck::from_bytes(&data_guard[..DATA_HEADER_SIZE]);

        TrailStoreStats {
            point_count: header.record_count,
            data_size_bytes: self.write_offset.load(Ordering::Acquire),
            data_capacity_bytes: self.data_capacity.load(Ordering::Acquire),
        }
    }

    /// Flush all pending writes to disk.
    pub fn sync(&self) -> Result<(), TrailStoreError> {
        {
            let data_guard = self.data_mmap.write();
            data_guard.flush()?;
        }
        self.data_file.sync_all()?;
        Ok(())
    }
}

#[async_trait]
impl TrailStore for FileTrailStore {
    async fn append(&self, point: &TrackedPoint) -> Result<(), TrailStoreError> {
        self.append_point(point)?;
        let data_guard = self.data_mmap.read();
        data_guard.flush_async()?;
        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<TrackedPoint>, TrailStoreError> {
        self.read_all()
    }

    async fn delete_all(&self) -> Result<(), TrailStoreError> {
        self.clear()
    }
}

/// Store statistics.
#[derive(Debug, Clone)]
pub struct TrailStoreStats {
    pub point_count: u64,
    pub data_size_bytes: u64,
    pub data_capacity_bytes: u64,
}

impl TrailStoreStats {
    pub fn data_size_kb(&self) -> f64 {
        self.data_size_bytes as f64 / 1024.0
    }

    pub fn utilization(&self) -> f64 {
        if self.data_capacity_bytes == 0 {
            0.0
        } else {
            self.data_size_bytes as f64 / self.data_capacity_bytes as f64
        }
    }
}

/// Volatile trail store.
#[derive(Debug, Default)]
pub struct MemoryTrailStore {
    points: RwLock<Vec<TrackedPoint>>,
}

impl MemoryTrailStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.read().is_empty()
    }
}

#[async_trait]
impl TrailStore for MemoryTrailStore {
    async fn append(&self, point: &TrackedPoint) -> Result<(), TrailStoreError> {
        self.points.write().push(point.clone());
        Ok(())
    }

    async fn fetch_all(&self) -> Result<Vec<TrackedPoint>, TrailStoreError> {
        Ok(self.points.read().clone())
    }

    async fn delete_all(&self) -> Result<(), TrailStoreError> {
        self.points.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn point(lat: f64, lon: f64, ts: u64, address: Option<&str>) -> TrackedPoint {
        TrackedPoint::new(Coordinate::new(lat, lon), ts, address.map(String::from))
    }

    #[test]
    fn test_record_layout() {
        assert_eq!(std::mem::size_of::<DataHeader>(), DATA_HEADER_SIZE);
        assert_eq!(PointRecord::SIZE, 128);
    }

    #[test]
    fn test_storage_create_and_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test");

        let storage = FileTrailStore::open(&path).unwrap();
        assert!(storage.read_all().unwrap().is_empty());

        let a = point(41.0, 29.0, 1000, Some("Istanbul, Marmara"));
        let b = point(41.001, 29.0, 2000, None);
        storage.append_point(&a).unwrap();
        storage.append_point(&b).unwrap();

        assert_eq!(storage.read_all().unwrap(), vec![a, b]);
        assert_eq!(storage.stats().point_count, 2);
    }

    #[test]
    fn test_reopen_keeps_points() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trail");
        let a = point(-33.86, 151.21, 5, Some("Sydney, New South Wales"));

        {
            let storage = FileTrailStore::open(&path).unwrap();
            storage.append_point(&a).unwrap();
            storage.sync().unwrap();
        }

        let storage = FileTrailStore::open(&path).unwrap();
        assert_eq!(storage.read_all().unwrap(), vec![a]);
    }

    #[test]
    fn test_clear_then_append() {
        let dir = tempdir().unwrap();
        let storage = FileTrailStore::open(dir.path().join("trail")).unwrap();

        storage.append_point(&point(1.0, 1.0, 1, None)).unwrap();
        storage.clear().unwrap();
        assert!(storage.read_all().unwrap().is_empty());
        assert_eq!(storage.stats().point_count, 0);

        let c = point(2.0, 2.0, 2, None);
        storage.append_point(&c).unwrap();
        assert_eq!(storage.read_all().unwrap(), vec![c]);
    }

    #[test]
    fn test_long_address_truncated_on_char_boundary() {
        let dir = tempdir().unwrap();
        let storage = FileTrailStore::open(dir.path().join("trail")).unwrap();

        // 'ş' is two bytes, 95 ASCII bytes puts its second byte past the limit
        let address = format!("{}ş and more", "a".repeat(95));
        storage.append_point(&point(0.0, 0.0, 0, Some(&address))).unwrap();

        let stored = storage.read_all().unwrap().remove(0).address.unwrap();
        assert_eq!(stored, "a".repeat(95));
    }

    #[test]
    fn test_empty_address_distinct_from_none() {
        let dir = tempdir().unwrap();
        let storage = FileTrailStore::open(dir.path().join("trail")).unwrap();

        storage.append_point(&point(0.0, 0.0, 0, Some(""))).unwrap();
        storage.append_point(&point(0.0, 0.0, 1, None)).unwrap();

        let points = storage.read_all().unwrap();
        assert_eq!(points[0].address.as_deref(), Some(""));
        assert_eq!(points[1].address, None);
    }

    #[test]
    fn test_grows_past_initial_capacity() {
        let dir = tempdir().unwrap();
        let storage = FileTrailStore::open(dir.path().join("trail")).unwrap();
        let initial = storage.stats().data_capacity_bytes;

        let count = (initial as usize - DATA_HEADER_SIZE) / PointRecord::SIZE + 10;
        for i in 0..count {
            storage.append_point(&point(0.0, 0.0, i as u64, None)).unwrap();
        }

        let stats = storage.stats();
        assert_eq!(stats.point_count, count as u64);
        assert!(stats.data_capacity_bytes > initial);

        let points = storage.read_all().unwrap();
        assert_eq!(points.len(), count);
        assert_eq!(points.last().unwrap().captured_at_ms, count as u64 - 1);
    }

    #[test]
    fn test_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trail");
        std::fs::write(path.with_extension("dat"), vec![0xAB; 256]).unwrap();

        assert!(matches!(
            FileTrailStore::open(&path),
            Err(TrailStoreError::InvalidFormat)
        ));
    }

    #[tokio::test]
    async fn test_trait_roundtrip_through_memory_store() {
        let store = MemoryTrailStore::new();
        store.append(&point(1.0, 2.0, 3, None)).await.unwrap();
        assert_eq!(store.len(), 1);
        store.delete_all().await.unwrap();
        assert!(store.fetch_all().await.unwrap().is_empty());
    }
}
