#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use filesys::{BlockDevice, DataBlock, FileSystem, FreeMap, SECTOR_SIZE, SectorCache, SectorId};

/// 从未写过的扇区读出的内容
pub const GARBAGE: u8 = 0xee;

/// 稀疏的内存块设备
#[derive(Debug, Default)]
pub struct RamDisk {
    sectors: Mutex<BTreeMap<usize, DataBlock>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl RamDisk {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sector(&self, block_id: usize) -> DataBlock {
        self.sectors
            .lock()
            .unwrap()
            .get(&block_id)
            .copied()
            .unwrap_or([GARBAGE; SECTOR_SIZE])
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        buf.copy_from_slice(&self.sector(block_id));
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut data = [0; SECTOR_SIZE];
        data.copy_from_slice(buf);
        self.sectors.lock().unwrap().insert(block_id, data);
    }

    fn handle_irq(&self) {}
}

/// 记录每次分配与释放的空闲扇区分配器，重复释放直接 panic
#[derive(Debug)]
pub struct RecordingFreeMap {
    inner: Mutex<Recorder>,
}

#[derive(Debug)]
struct Recorder {
    next: u32,
    /// 同时存活的扇区上限
    limit: usize,
    live: BTreeSet<SectorId>,
    allocated: Vec<SectorId>,
    released: Vec<SectorId>,
}

impl RecordingFreeMap {
    pub fn new(first: u32) -> Arc<Self> {
        Self::with_limit(first, usize::MAX)
    }

    pub fn with_limit(first: u32, limit: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Recorder {
                next: first,
                limit,
                live: BTreeSet::new(),
                allocated: Vec::new(),
                released: Vec::new(),
            }),
        })
    }

    pub fn live(&self) -> BTreeSet<SectorId> {
        self.inner.lock().unwrap().live.clone()
    }

    pub fn allocated(&self) -> Vec<SectorId> {
        self.inner.lock().unwrap().allocated.clone()
    }

    pub fn released(&self) -> Vec<SectorId> {
        self.inner.lock().unwrap().released.clone()
    }
}

impl FreeMap for RecordingFreeMap {
    fn allocate(&self, count: usize) -> Option<SectorId> {
        let mut inner = self.inner.lock().unwrap();
        if inner.live.len() + count > inner.limit {
            return None;
        }

        let first = inner.next;
        for raw in first..first + count as u32 {
            let sector = SectorId::new(raw);
            inner.live.insert(sector);
            inner.allocated.push(sector);
        }
        inner.next += count as u32;

        Some(SectorId::new(first))
    }

    fn release(&self, sector: SectorId, count: usize) {
        let mut inner = self.inner.lock().unwrap();
        let first: u32 = sector.into();
        for raw in first..first + count as u32 {
            let sector = SectorId::new(raw);
            assert!(inner.live.remove(&sector), "{sector} released twice");
            inner.released.push(sector);
        }
    }
}

pub struct Fixture {
    pub disk: Arc<RamDisk>,
    pub free_map: Arc<RecordingFreeMap>,
    pub fs: Arc<FileSystem>,
}

pub fn fixture() -> Fixture {
    fixture_with(RecordingFreeMap::new(100))
}

pub fn fixture_with(free_map: Arc<RecordingFreeMap>) -> Fixture {
    let disk = RamDisk::new();
    let cache = Arc::new(SectorCache::new(disk.clone()));
    let fs = FileSystem::new(cache, free_map.clone());

    Fixture { disk, free_map, fs }
}

pub fn sectors(n: usize) -> i32 {
    (n * SECTOR_SIZE) as i32
}

pub fn sorted(mut sectors: Vec<SectorId>) -> Vec<SectorId> {
    sectors.sort();
    sectors
}
