//! 间接索引块
//! - 一级：整个块连续存储**扇区号**，每个编号都指向一个**数据扇区**
//! - 二级：整个块连续存储**扇区号**，每个编号都指向一个一级索引块
//!
//! ## 扇区树
//!
//! 把一个指针域看成一棵深度为 depth 的树的根：
//! 深度 0 即数据扇区本身；深度 d 的索引块有至多 128 个孩子，
//! 每个孩子是深度 d-1 的子树，覆盖 128^(d-1) 个数据扇区。
//! 分配与释放都按照剩余扇区数自上而下地递归，走法完全一致。

use alloc::vec::Vec;

use log::{error, warn};

use super::{read_u32, write_u32};
use crate::{DataBlock, Error, FreeMap, SECTOR_SIZE, SectorCache, SectorId};

/// 间接索引块的编号容量
pub const INDIRECT_COUNT: usize = SECTOR_SIZE / 4;

/// 指针域：未分配，或指向某个扇区。
///
/// 磁盘上以 0 表示未分配，空闲扇区分配器不会分出 0 号扇区。
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    #[default]
    Unallocated,
    Allocated(SectorId),
}

impl Slot {
    #[inline]
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Unallocated,
            raw => Self::Allocated(SectorId::new(raw)),
        }
    }

    #[inline]
    pub fn into_raw(self) -> u32 {
        match self {
            Self::Unallocated => 0,
            Self::Allocated(sector) => sector.into(),
        }
    }

    #[inline]
    pub fn sector(self) -> Option<SectorId> {
        match self {
            Self::Unallocated => None,
            Self::Allocated(sector) => Some(sector),
        }
    }

    #[inline]
    pub fn is_allocated(self) -> bool {
        matches!(self, Self::Allocated(_))
    }
}

/// 间接索引块
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndirectBlock {
    entries: [Slot; INDIRECT_COUNT],
}

impl IndirectBlock {
    pub fn decode(data: &DataBlock) -> Self {
        Self {
            entries: core::array::from_fn(|i| Slot::from_raw(read_u32(data, i))),
        }
    }

    pub fn encode(&self) -> DataBlock {
        let mut data = [0; SECTOR_SIZE];
        for (i, entry) in self.entries.iter().enumerate() {
            write_u32(&mut data, i, entry.into_raw());
        }
        data
    }

    #[inline]
    pub fn load(sector: SectorId, cache: &SectorCache) -> Self {
        cache.map(sector, Self::decode)
    }

    #[inline]
    pub fn store(&self, sector: SectorId, cache: &SectorCache) {
        cache.write(sector, &self.encode());
    }

    /// 只读出一个表项，免去整块解码
    #[inline]
    pub fn entry_of(sector: SectorId, index: usize, cache: &SectorCache) -> Slot {
        cache.map(sector, |data| Slot::from_raw(read_u32(data, index)))
    }

    #[inline]
    pub fn entries(&self) -> &[Slot] {
        &self.entries
    }

    /// 已分配表项的个数
    pub fn allocated(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_allocated()).count()
    }
}

/// 深度为 `depth` 的索引块中，每个孩子覆盖多少数据扇区
#[inline]
fn per_child(depth: u32) -> usize {
    INDIRECT_COUNT.pow(depth - 1)
}

/// 一次分配过程，记下拿到的每个扇区以便失败时退回
pub(crate) struct Allocation<'a> {
    cache: &'a SectorCache,
    free_map: &'a dyn FreeMap,
    taken: Vec<SectorId>,
}

impl<'a> Allocation<'a> {
    pub fn new(cache: &'a SectorCache, free_map: &'a dyn FreeMap) -> Self {
        Self {
            cache,
            free_map,
            taken: Vec::new(),
        }
    }

    /// 拿一个清零的扇区
    fn take(&mut self) -> Result<SectorId, Error> {
        let sector = self.free_map.allocate(1).ok_or(Error::NoSpace)?;
        self.taken.push(sector);
        self.cache.zero(sector);
        Ok(sector)
    }

    /// 让 `slot` 为根的深度 `depth` 子树覆盖 `nsectors` 个数据扇区
    pub fn populate(&mut self, slot: &mut Slot, nsectors: usize, depth: u32) -> Result<(), Error> {
        let sector = match *slot {
            Slot::Allocated(sector) => sector,
            Slot::Unallocated => {
                let sector = self.take()?;
                *slot = Slot::Allocated(sector);
                sector
            }
        };

        if depth == 0 {
            return Ok(());
        }

        let mut block = IndirectBlock::load(sector, self.cache);
        let per_child = per_child(depth);
        let mut remaining = nsectors;
        for entry in block
            .entries
            .iter_mut()
            .take(nsectors.div_ceil(per_child))
        {
            let n = remaining.min(per_child);
            self.populate(entry, n, depth - 1)?;
            remaining -= n;
        }
        block.store(sector, self.cache);

        Ok(())
    }

    /// 把本次分配到的扇区按相反顺序全部退回
    pub fn rollback(self) {
        warn!("rolling back {} sectors", self.taken.len());
        for &sector in self.taken.iter().rev() {
            self.free_map.release(sector, 1);
        }
    }

    #[inline]
    pub fn taken(&self) -> &[SectorId] {
        &self.taken
    }
}

/// 释放 `slot` 为根的深度 `depth` 子树，其覆盖 `nsectors` 个数据扇区
pub(crate) fn release(
    slot: Slot,
    nsectors: usize,
    depth: u32,
    cache: &SectorCache,
    free_map: &dyn FreeMap,
) {
    let Slot::Allocated(sector) = slot else {
        error!("unallocated slot inside the allocated length (depth {depth})");
        return;
    };

    if depth > 0 {
        let block = IndirectBlock::load(sector, cache);
        let per_child = per_child(depth);
        let mut remaining = nsectors;
        for &entry in block.entries.iter().take(nsectors.div_ceil(per_child)) {
            let n = remaining.min(per_child);
            release(entry, n, depth - 1, cache, free_map);
            remaining -= n;
        }
    }

    free_map.release(sector, 1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_raw_round_trip() {
        assert_eq!(Slot::from_raw(0), Slot::Unallocated);
        assert_eq!(Slot::from_raw(9), Slot::Allocated(SectorId::new(9)));
        assert_eq!(Slot::Allocated(SectorId::new(9)).into_raw(), 9);
        assert_eq!(Slot::Unallocated.into_raw(), 0);
    }

    #[test]
    fn zeroed_block_is_unallocated() {
        let block = IndirectBlock::decode(&[0; SECTOR_SIZE]);
        assert_eq!(block.allocated(), 0);
    }

    #[test]
    fn entries_are_little_endian() {
        let mut data = [0; SECTOR_SIZE];
        data[4..8].copy_from_slice(&[0x78, 0x56, 0x34, 0x12]);
        let block = IndirectBlock::decode(&data);

        assert_eq!(block.entries()[1], Slot::Allocated(SectorId::new(0x1234_5678)));
        assert_eq!(block.encode(), data);
    }

    #[test]
    fn children_cover_geometric_ranges() {
        assert_eq!(per_child(1), 1);
        assert_eq!(per_child(2), INDIRECT_COUNT);
    }
}
