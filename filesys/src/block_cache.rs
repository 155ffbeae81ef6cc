//! # 块缓存层
//!
//! 块设备读写速度一般慢于内存读写速度，因此我们在内存中开辟固定数量的缓存行，
//! 把即将操作的扇区复制到内存中，提高对块设备的操作效率。
//!
//! 块缓存层对使用者来说是透明的，使用者对块设备的操作都经过块缓存层，
//! 且**操作扇区时一定在缓存行当中**。写操作只弄脏缓存行，
//! 脏数据在缓存行被换出或显式同步时才写回块设备。
//!
//! 整个缓存由一把锁保护，查找、读盘、换出与写回都在锁内完成，
//! 因此同一扇区在任意时刻最多只有一个缓存行。
//!
//! ## 换出策略
//!
//! 时钟(二次机会)算法：指针循环扫描缓存行，
//! - 空闲行直接占用；
//! - 访问位为真的行清除访问位并跳过，再活一轮；
//! - 第一个访问位为假的行被换出，脏则先写回。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use block_dev::BlockDevice;
use enumflags2::{BitFlags, bitflags};
use log::trace;
use spin::Mutex;

use crate::{CACHE_CAPACITY, DataBlock, SECTOR_SIZE, SectorId};

#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineFlag {
    /// 行内数据有效，否则为空闲行
    Valid = 0b001,
    /// 最近被访问过
    Accessed = 0b010,
    /// 脏行
    Dirty = 0b100,
}

/// 扇区缓存
pub struct SectorCache {
    /// 底层块设备的引用
    block_device: Arc<dyn BlockDevice>,
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    lines: Vec<CacheLine>,
    /// 时钟指针
    hand: usize,
}

/// 内存中的缓存行
struct CacheLine {
    /// 对应的扇区
    sector: SectorId,
    /// 缓存的数据
    data: DataBlock,
    flags: BitFlags<LineFlag>,
}

impl SectorCache {
    #[inline]
    pub fn new(block_device: Arc<dyn BlockDevice>) -> Self {
        Self::with_capacity(block_device, CACHE_CAPACITY)
    }

    pub fn with_capacity(block_device: Arc<dyn BlockDevice>, capacity: usize) -> Self {
        assert!(capacity > 0, "sector cache needs at least one line");
        let lines = (0..capacity).map(|_| CacheLine::empty()).collect();

        Self {
            block_device,
            inner: Mutex::new(CacheInner { lines, hand: 0 }),
        }
    }

    /// 读出扇区的当前内容，`buf` 必须恰好一个扇区大小
    pub fn read(&self, sector: SectorId, buf: &mut [u8]) {
        self.map(sector, |data| buf.copy_from_slice(data));
    }

    /// 以 `buf` 作为扇区的当前内容，不会同步写穿到块设备
    pub fn write(&self, sector: SectorId, buf: &[u8]) {
        self.map_mut(sector, |data| data.copy_from_slice(buf));
    }

    /// 将扇区内容清零
    #[inline]
    pub fn zero(&self, sector: SectorId) {
        self.map_mut(sector, |data| data.fill(0));
    }

    /// 在锁内访问扇区数据。
    ///
    /// `f` 里不能再访问缓存，否则会死锁。
    pub fn map<V>(&self, sector: SectorId, f: impl FnOnce(&DataBlock) -> V) -> V {
        let mut inner = self.inner.lock();
        let line = inner.fetch(sector, &self.block_device);
        f(&line.data)
    }

    /// 在锁内修改扇区数据，并弄脏缓存行。
    ///
    /// `f` 里不能再访问缓存，否则会死锁。
    pub fn map_mut<V>(&self, sector: SectorId, f: impl FnOnce(&mut DataBlock) -> V) -> V {
        let mut inner = self.inner.lock();
        let line = inner.fetch(sector, &self.block_device);
        line.flags |= LineFlag::Dirty;
        f(&mut line.data)
    }

    /// 写回全部脏行
    pub fn flush_all(&self) {
        self.inner.lock().flush_all(&self.block_device);
    }

    /// 扇区当前是否驻留在缓存中
    pub fn contains(&self, sector: SectorId) -> bool {
        self.inner.lock().lookup(sector).is_some()
    }

    pub fn dirty_count(&self) -> usize {
        self.inner
            .lock()
            .lines
            .iter()
            .filter(|line| line.flags.contains(LineFlag::Valid | LineFlag::Dirty))
            .count()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.lock().lines.len()
    }
}

impl Drop for SectorCache {
    fn drop(&mut self) {
        self.inner.get_mut().flush_all(&self.block_device);
    }
}

impl fmt::Debug for SectorCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("SectorCache")
            .field("block_device", &self.block_device)
            .field("lines", &inner.lines)
            .field("hand", &inner.hand)
            .finish()
    }
}

impl CacheInner {
    fn lookup(&self, sector: SectorId) -> Option<usize> {
        self.lines
            .iter()
            .position(|line| line.flags.contains(LineFlag::Valid) && line.sector == sector)
    }

    /// 取得扇区所在的缓存行，未命中则换入；被触及的行都会置上访问位
    fn fetch(&mut self, sector: SectorId, block_device: &Arc<dyn BlockDevice>) -> &mut CacheLine {
        let index = match self.lookup(sector) {
            Some(index) => index,
            None => {
                let index = self.evict(block_device);
                let line = &mut self.lines[index];
                // 即便是写，也要先读入整个扇区
                block_device.read_block(sector.block(), &mut line.data);
                line.sector = sector;
                line.flags = LineFlag::Valid.into();
                trace!("cache miss: {sector} -> line {index}");
                index
            }
        };

        let line = &mut self.lines[index];
        line.flags |= LineFlag::Accessed;
        line
    }

    /// 时钟扫描，返回一个可用的空行
    fn evict(&mut self, block_device: &Arc<dyn BlockDevice>) -> usize {
        loop {
            let index = self.hand;
            self.hand = (self.hand + 1) % self.lines.len();
            let line = &mut self.lines[index];

            if !line.flags.contains(LineFlag::Valid) {
                return index;
            }

            if line.flags.contains(LineFlag::Accessed) {
                line.flags.remove(LineFlag::Accessed);
                continue;
            }

            trace!("cache evict: {} from line {index}", line.sector);
            line.sync(block_device);
            line.flags = BitFlags::empty();
            return index;
        }
    }

    fn flush_all(&mut self, block_device: &Arc<dyn BlockDevice>) {
        self.lines
            .iter_mut()
            .filter(|line| line.flags.contains(LineFlag::Valid))
            .for_each(|line| line.sync(block_device));
    }
}

impl CacheLine {
    #[inline]
    fn empty() -> Self {
        Self {
            sector: SectorId::new(0),
            data: [0; SECTOR_SIZE],
            flags: BitFlags::empty(),
        }
    }

    fn sync(&mut self, block_device: &Arc<dyn BlockDevice>) {
        if self.flags.contains(LineFlag::Dirty) {
            self.flags.remove(LineFlag::Dirty);
            block_device.write_block(self.sector.block(), &self.data);
        }
    }
}

impl fmt::Debug for CacheLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheLine")
            .field("sector", &self.sector)
            .field("flags", &self.flags)
            .finish()
    }
}
