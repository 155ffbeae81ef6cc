//! # 磁盘数据结构层
//!
//! 卷的磁盘布局：
//! 超级块 | 空闲扇区位图 | 数据区域
//!
//! inode 与文件数据都放在数据区域内，由空闲扇区位图分配；
//! 每个 inode 独占一个扇区，其扇区号即 inode 的身份。

mod super_block;
pub use super_block::SuperBlock;

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{DIRECT_COUNT, DiskInode, INDIRECT2_CAP};

/// 间接索引块与分配引擎
mod indirect;
pub use indirect::{INDIRECT_COUNT, IndirectBlock, Slot};

use crate::DataBlock;

#[inline]
fn read_u32(data: &DataBlock, index: usize) -> u32 {
    let offset = index * 4;
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

#[inline]
fn write_u32(data: &mut DataBlock, index: usize, value: u32) {
    let offset = index * 4;
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}
