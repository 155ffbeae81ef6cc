//! 磁盘 inode，恰好占一个扇区。
//!
//! 布局(小端)：长度 i32 | 魔数 u32 | 124 个直接索引 | 一级索引 | 二级索引
//!
//! ## 块索引编码
//!
//! 文件的第 index 个数据扇区(逻辑索引)按如下规则定位：
//! - index < 124：直接索引
//! - 再往后 128 个：一级索引块的第 index-124 项
//! - 再往后 128×128 个：记 k = index-252，二级索引块第 k/128 项
//!   指向的一级索引块的第 k%128 项

use log::{debug, warn};

use super::indirect::{self, Allocation, INDIRECT_COUNT, IndirectBlock, Slot};
use super::{read_u32, write_u32};
use crate::{DataBlock, Error, FreeMap, INODE_MAGIC, SECTOR_SIZE, SectorCache, SectorId};

/// 直接索引块可编号数量
pub const DIRECT_COUNT: usize = 124;
/// 一级索引块可编号数量
pub const INDIRECT1_COUNT: usize = INDIRECT_COUNT;
/// 二级索引块可编号数量
pub const INDIRECT2_COUNT: usize = INDIRECT_COUNT.pow(2);
/// 直接索引时的编号容量
pub const DIRECT_CAP: usize = DIRECT_COUNT;
/// 用上一级索引时的编号容量
pub const INDIRECT1_CAP: usize = DIRECT_CAP + INDIRECT1_COUNT;
/// 用上二级索引时的编号容量，也是单个文件的扇区上限
pub const INDIRECT2_CAP: usize = INDIRECT1_CAP + INDIRECT2_COUNT;

/// 字段在扇区中的位置(以 u32 计)
const LENGTH_WORD: usize = 0;
const MAGIC_WORD: usize = 1;
const DIRECT_WORD: usize = 2;
const INDIRECT1_WORD: usize = DIRECT_WORD + DIRECT_COUNT;
const INDIRECT2_WORD: usize = INDIRECT1_WORD + 1;

const _: () = assert!((INDIRECT2_WORD + 1) * 4 == SECTOR_SIZE);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskInode {
    /// 文件字节数
    length: i32,
    magic: u32,
    /// 直接索引，包含 DIRECT_COUNT 个扇区号
    direct: [Slot; DIRECT_COUNT],
    /// 指向一个一级索引块
    indirect1: Slot,
    /// 指向一个二级索引块
    indirect2: Slot,
}

impl DiskInode {
    /// 尚未分配任何扇区的 inode
    pub fn new(length: i32) -> Self {
        Self {
            length,
            magic: INODE_MAGIC,
            direct: [Slot::Unallocated; DIRECT_COUNT],
            indirect1: Slot::Unallocated,
            indirect2: Slot::Unallocated,
        }
    }

    pub fn decode(data: &DataBlock) -> Self {
        Self {
            length: read_u32(data, LENGTH_WORD) as i32,
            magic: read_u32(data, MAGIC_WORD),
            direct: core::array::from_fn(|i| Slot::from_raw(read_u32(data, DIRECT_WORD + i))),
            indirect1: Slot::from_raw(read_u32(data, INDIRECT1_WORD)),
            indirect2: Slot::from_raw(read_u32(data, INDIRECT2_WORD)),
        }
    }

    pub fn encode(&self) -> DataBlock {
        let mut data = [0; SECTOR_SIZE];
        write_u32(&mut data, LENGTH_WORD, self.length as u32);
        write_u32(&mut data, MAGIC_WORD, self.magic);
        for (i, slot) in self.direct.iter().enumerate() {
            write_u32(&mut data, DIRECT_WORD + i, slot.into_raw());
        }
        write_u32(&mut data, INDIRECT1_WORD, self.indirect1.into_raw());
        write_u32(&mut data, INDIRECT2_WORD, self.indirect2.into_raw());
        data
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == INODE_MAGIC
    }

    #[inline]
    pub fn length(&self) -> i32 {
        self.length
    }

    /// 文件字节数，负数视为 0
    #[inline]
    pub fn len(&self) -> usize {
        self.length.max(0) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn direct(&self) -> &[Slot] {
        &self.direct
    }

    #[inline]
    pub fn indirect1(&self) -> Slot {
        self.indirect1
    }

    #[inline]
    pub fn indirect2(&self) -> Slot {
        self.indirect2
    }

    /// 逻辑上 inode 指向一系列数据扇区，此处传入的是这些扇区的索引(逻辑索引)，
    /// 然后返回其物理扇区号；超出寻址范围或未分配则为空
    pub fn block_id(&self, block_index: usize, cache: &SectorCache) -> Option<SectorId> {
        if block_index < DIRECT_CAP {
            self.direct[block_index].sector()
        } else if block_index < INDIRECT1_CAP {
            // 剔去直接索引的部分
            let indirect1 = self.indirect1.sector()?;
            IndirectBlock::entry_of(indirect1, block_index - DIRECT_CAP, cache).sector()
        } else if block_index < INDIRECT2_CAP {
            // 剔去使用了一级索引的部分
            let index = block_index - INDIRECT1_CAP;
            let indirect2 = self.indirect2.sector()?;
            let indirect1 =
                IndirectBlock::entry_of(indirect2, index / INDIRECT1_COUNT, cache).sector()?;
            IndirectBlock::entry_of(indirect1, index % INDIRECT1_COUNT, cache).sector()
        } else {
            None
        }
    }

    /// 字节偏移所在的扇区，偏移不在文件内则为空
    #[inline]
    pub fn byte_to_sector(&self, pos: usize, cache: &SectorCache) -> Option<SectorId> {
        if pos < self.len() {
            self.block_id(pos / SECTOR_SIZE, cache)
        } else {
            None
        }
    }

    /// 为整个长度分配扇区树，数据扇区全部清零。
    ///
    /// 要么全部分配成功，要么退回本次拿到的全部扇区并恢复成未分配的样子。
    pub fn allocate(&mut self, cache: &SectorCache, free_map: &dyn FreeMap) -> Result<(), Error> {
        if self.length < 0 {
            return Err(Error::NegativeLength);
        }

        let nsectors = self.data_sectors();
        if nsectors > INDIRECT2_CAP {
            warn!("{} bytes exceed the addressable sectors", self.length);
            return Err(Error::TooLarge);
        }

        let mut allocation = Allocation::new(cache, free_map);
        match self.populate(&mut allocation, nsectors) {
            Ok(()) => {
                debug!(
                    "allocated {} sectors for {} bytes",
                    allocation.taken().len(),
                    self.length
                );
                Ok(())
            }
            Err(err) => {
                warn!("allocation of {} bytes failed: {err}", self.length);
                allocation.rollback();
                self.direct.fill(Slot::Unallocated);
                self.indirect1 = Slot::Unallocated;
                self.indirect2 = Slot::Unallocated;
                Err(err)
            }
        }
    }

    fn populate(&mut self, allocation: &mut Allocation<'_>, nsectors: usize) -> Result<(), Error> {
        let [direct, indirect1, indirect2] = Self::split(nsectors);

        /******************** 直接索引 ********************/
        for slot in &mut self.direct[..direct] {
            allocation.populate(slot, 1, 0)?;
        }
        /******************** 一级索引 ********************/
        if indirect1 > 0 {
            allocation.populate(&mut self.indirect1, indirect1, 1)?;
        }
        /******************** 二级索引 ********************/
        if indirect2 > 0 {
            allocation.populate(&mut self.indirect2, indirect2, 2)?;
        }

        Ok(())
    }

    /// 释放 inode 拥有的全部扇区，包括索引块；按长度决定走多远
    pub fn deallocate(&self, cache: &SectorCache, free_map: &dyn FreeMap) {
        let [direct, indirect1, indirect2] = Self::split(self.data_sectors());

        for &slot in &self.direct[..direct] {
            indirect::release(slot, 1, 0, cache, free_map);
        }
        if indirect1 > 0 {
            indirect::release(self.indirect1, indirect1, 1, cache, free_map);
        }
        if indirect2 > 0 {
            indirect::release(self.indirect2, indirect2, 2, cache, free_map);
        }
    }

    /// 把数据扇区数依次分摊到直接索引、一级索引、二级索引上
    pub fn split(nsectors: usize) -> [usize; 3] {
        let direct = nsectors.min(DIRECT_COUNT);
        let nsectors = nsectors - direct;
        let indirect1 = nsectors.min(INDIRECT1_COUNT);
        let nsectors = nsectors - indirect1;
        let indirect2 = nsectors.min(INDIRECT2_COUNT);

        [direct, indirect1, indirect2]
    }

    #[inline]
    pub fn data_sectors(&self) -> usize {
        Self::count_data_block(self.len())
    }

    /// 计算容纳指定数据量需要多少个**数据扇区**
    #[inline]
    pub fn count_data_block(size: usize) -> usize {
        size.div_ceil(SECTOR_SIZE)
    }

    /// 计算容纳指定数据量需要多少个 **数据扇区** 和 **索引块**
    pub fn count_total_block(size: usize) -> usize {
        let data_blocks = Self::count_data_block(size);
        let mut total = data_blocks;

        // 超出直接索引，使用一级索引块
        if data_blocks > DIRECT_CAP {
            total += 1;
        }

        // 超出一级索引，使用二级索引块及其下的一级索引块
        if data_blocks > INDIRECT1_CAP {
            total += 1 + (data_blocks - INDIRECT1_CAP).div_ceil(INDIRECT1_COUNT);
        }

        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_fills_one_sector() {
        let mut inode = DiskInode::new(1234);
        inode.direct[0] = Slot::Allocated(SectorId::new(7));
        inode.indirect2 = Slot::Allocated(SectorId::new(9));
        let data = inode.encode();

        assert_eq!(read_u32(&data, 0), 1234);
        assert_eq!(read_u32(&data, 1), INODE_MAGIC);
        assert_eq!(read_u32(&data, 2), 7);
        assert_eq!(read_u32(&data, 127), 9);
        assert_eq!(DiskInode::decode(&data), inode);
    }

    #[test]
    fn zeroed_sector_is_not_an_inode() {
        assert!(!DiskInode::decode(&[0; SECTOR_SIZE]).is_valid());
        assert!(DiskInode::new(0).is_valid());
    }

    #[test]
    fn split_fills_tiers_in_order() {
        assert_eq!(DiskInode::split(0), [0, 0, 0]);
        assert_eq!(DiskInode::split(124), [124, 0, 0]);
        assert_eq!(DiskInode::split(125), [124, 1, 0]);
        assert_eq!(DiskInode::split(253), [124, 128, 1]);
        assert_eq!(DiskInode::split(INDIRECT2_CAP), [124, 128, 16384]);
    }

    #[test]
    fn total_blocks_count_index_blocks() {
        assert_eq!(DiskInode::count_total_block(0), 0);
        assert_eq!(DiskInode::count_total_block(1), 1);
        assert_eq!(DiskInode::count_total_block(124 * SECTOR_SIZE), 124);
        assert_eq!(DiskInode::count_total_block(125 * SECTOR_SIZE), 126);
        assert_eq!(DiskInode::count_total_block(253 * SECTOR_SIZE), 253 + 1 + 2);
        assert_eq!(DiskInode::count_total_block(381 * SECTOR_SIZE), 381 + 1 + 3);
    }
}
