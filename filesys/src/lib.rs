#![cfg_attr(not(test), no_std)]

extern crate alloc;

/* filesys 的整体架构，自上而下 */

// 文件层：带读写位置的文件对象，供系统调用层使用
mod file;

// 索引节点层：打开 inode 的登记表与字节粒度的读写
mod vfs;

// 卷管理层：超级块、空闲扇区分配器与 inode 登记表的组合
mod efs;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;

// 块缓存层：内存上的扇区数据缓存
mod block_cache;

mod error;
mod sector;

pub use block_dev::BlockDevice;

pub use self::{
    block_cache::SectorCache,
    efs::{FileSystem, FreeMap},
    error::Error,
    file::File,
    layout::{
        Bitmap, DIRECT_COUNT, DiskInode, INDIRECT_COUNT, INDIRECT2_CAP, IndirectBlock, Slot,
        SuperBlock,
    },
    sector::SectorId,
    vfs::InodeHandle,
};

/// 超级块魔数
pub const MAGIC: u32 = 0x3b800001;
/// inode 魔数
pub const INODE_MAGIC: u32 = 0x494e4f44;
pub const SECTOR_SIZE: usize = 512;
pub const SECTOR_BITS: usize = SECTOR_SIZE * 8;
/// 扇区缓存的行数
pub const CACHE_CAPACITY: usize = 64;

pub type DataBlock = [u8; SECTOR_SIZE];
