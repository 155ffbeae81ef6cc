use alloc::sync::Arc;

use log::trace;
use spin::Mutex;

use crate::{FreeMap, SECTOR_BITS, SectorCache, SectorId};

/// 空闲扇区位图，记录数据区域内扇区的分配情况。
///
/// 位图本身存放在一段连续扇区里，经由扇区缓存读写；
/// 第 i 位对应数据区域的第 i 个扇区。
#[derive(Debug)]
pub struct Bitmap {
    cache: Arc<SectorCache>,
    /// 位图的起始扇区
    start: SectorId,
    /// 位图占用扇区数
    sectors: usize,
    /// 数据区域的起始扇区
    area_start: SectorId,
    /// 数据区域扇区数
    area_len: usize,
    /// 查找空位与置位须一气呵成
    lock: Mutex<()>,
}

/// 位编号
struct BitId(usize);

impl Bitmap {
    pub fn new(
        cache: Arc<SectorCache>,
        start: SectorId,
        sectors: usize,
        area_start: SectorId,
        area_len: usize,
    ) -> Self {
        assert!(area_len <= sectors * SECTOR_BITS);
        assert!(u32::from(area_start) > 0, "sector 0 is never handed out");

        Self {
            cache,
            start,
            sectors,
            area_start,
            area_len,
            lock: Mutex::new(()),
        }
    }

    /// 清空位图，所有数据扇区都视为空闲
    pub fn format(&self) {
        for index in 0..self.sectors {
            self.cache.zero(self.start + index as u32);
        }
    }

    /// 位图所指示区域的总扇区数
    #[inline]
    pub fn capacity(&self) -> usize {
        self.area_len
    }

    /// 已分配的扇区数
    pub fn allocated(&self) -> usize {
        let _guard = self.lock.lock();
        (0..self.area_len).filter(|&bit| self.test(bit)).count()
    }

    fn test(&self, bit: usize) -> bool {
        let (sector_index, byte, mask) = BitId(bit).decode();
        self.cache
            .map(self.start + sector_index as u32, |data| data[byte] & mask != 0)
    }

    fn set(&self, bit: usize, value: bool) {
        let (sector_index, byte, mask) = BitId(bit).decode();
        self.cache.map_mut(self.start + sector_index as u32, |data| {
            // 编号一定得有对应的位
            assert_eq!(data[byte] & mask != 0, !value, "bit {bit} flipped twice");
            data[byte] ^= mask;
        });
    }
}

impl FreeMap for Bitmap {
    /// 找到第一段连续 `count` 个空位并置位
    fn allocate(&self, count: usize) -> Option<SectorId> {
        if count == 0 {
            return None;
        }

        let _guard = self.lock.lock();
        let mut run_start = 0;
        let mut run_len = 0;
        for bit in 0..self.area_len {
            if self.test(bit) {
                run_len = 0;
                continue;
            }

            if run_len == 0 {
                run_start = bit;
            }
            run_len += 1;

            if run_len == count {
                (run_start..run_start + count).for_each(|bit| self.set(bit, true));
                let sector = self.area_start + run_start as u32;
                trace!("bitmap allocate: {count} from {sector}");
                return Some(sector);
            }
        }

        None
    }

    fn release(&self, sector: SectorId, count: usize) {
        let first = u32::from(sector)
            .checked_sub(u32::from(self.area_start))
            .map(|first| first as usize)
            .filter(|first| first + count <= self.area_len);
        let Some(first) = first else {
            panic!("{sector} is outside the data area");
        };

        let _guard = self.lock.lock();
        (first..first + count).for_each(|bit| self.set(bit, false));
        trace!("bitmap release: {count} from {sector}");
    }
}

impl BitId {
    /// 解码得到 (位图内扇区索引, 扇区内字节, 字节内掩码)
    #[inline]
    fn decode(self) -> (usize, usize, u8) {
        let sector_index = self.0 / SECTOR_BITS;
        let bit = self.0 % SECTOR_BITS;
        (sector_index, bit / 8, 1 << (bit % 8))
    }
}
