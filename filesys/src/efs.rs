//! # 卷管理层
//!
//! 构建出卷的布局并使用：持有扇区缓存、空闲扇区分配器，
//! 以及打开 inode 的登记表。

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::fmt::Debug;

use block_dev::BlockDevice;
use log::{debug, info};
use spin::Mutex;

use crate::layout::{Bitmap, DiskInode, SuperBlock};
use crate::vfs::Inode;
use crate::{Error, InodeHandle, SECTOR_BITS, SectorCache, SectorId};

/// 空闲扇区分配器
pub trait FreeMap: Send + Sync + Debug {
    /// 分配 `count` 个扇区并返回首个扇区号，空间不足则返回空
    fn allocate(&self, count: usize) -> Option<SectorId>;
    fn release(&self, sector: SectorId, count: usize);
}

#[derive(Debug)]
pub struct FileSystem {
    cache: Arc<SectorCache>,
    free_map: Arc<dyn FreeMap>,
    /// 打开的 inode，同一扇区只登记一份
    open_inodes: Mutex<BTreeMap<SectorId, Arc<Inode>>>,
}

impl FileSystem {
    pub fn new(cache: Arc<SectorCache>, free_map: Arc<dyn FreeMap>) -> Arc<Self> {
        Arc::new(Self {
            cache,
            free_map,
            open_inodes: Mutex::default(),
        })
    }

    /// 在块设备上建立新卷：超级块 | 位图 | 数据区域
    pub fn format(block_device: Arc<dyn BlockDevice>, total_sectors: u32) -> Arc<Self> {
        assert!(total_sectors > 0);
        let cache = Arc::new(SectorCache::new(block_device));

        let data_total_sectors = total_sectors - 1;
        let bitmap_sectors =
            (data_total_sectors + SECTOR_BITS as u32) / (SECTOR_BITS as u32 + 1);
        let area_sectors = data_total_sectors - bitmap_sectors;
        let super_block = SuperBlock::new(total_sectors, bitmap_sectors, area_sectors);
        cache.write(SectorId::new(0), &super_block.encode());

        let bitmap = Self::bitmap(&cache, &super_block);
        bitmap.format();
        cache.flush_all();
        info!("formatted volume: {super_block:?}");

        Self::new(cache, Arc::new(bitmap))
    }

    pub fn load(block_device: Arc<dyn BlockDevice>) -> Result<Arc<Self>, Error> {
        let cache = Arc::new(SectorCache::new(block_device));
        let super_block = cache.map(SectorId::new(0), SuperBlock::decode);
        if !super_block.is_valid() {
            return Err(Error::Unformatted);
        }

        let bitmap = Self::bitmap(&cache, &super_block);
        Ok(Self::new(cache, Arc::new(bitmap)))
    }

    fn bitmap(cache: &Arc<SectorCache>, super_block: &SuperBlock) -> Bitmap {
        Bitmap::new(
            cache.clone(),
            SectorId::new(super_block.bitmap_start()),
            super_block.bitmap_sectors as usize,
            SectorId::new(super_block.area_start()),
            super_block.area_sectors as usize,
        )
    }

    #[inline]
    pub fn cache(&self) -> &Arc<SectorCache> {
        &self.cache
    }

    #[inline]
    pub fn free_map(&self) -> &Arc<dyn FreeMap> {
        &self.free_map
    }

    /// 在 `sector` 上创建长度为 `length` 的 inode，并分配好全部数据扇区
    pub fn create(&self, sector: SectorId, length: i32) -> Result<(), Error> {
        let mut disk_inode = DiskInode::new(length);
        disk_inode.allocate(&self.cache, self.free_map.as_ref())?;
        self.cache.write(sector, &disk_inode.encode());
        debug!("created inode at {sector} with {length} bytes");

        Ok(())
    }

    /// 分配一个扇区存放新 inode，返回其扇区号
    pub fn create_file(&self, length: i32) -> Result<SectorId, Error> {
        let sector = self.free_map.allocate(1).ok_or(Error::NoSpace)?;
        self.create(sector, length).inspect_err(|_| {
            self.free_map.release(sector, 1);
        })?;

        Ok(sector)
    }

    /// 打开 `sector` 上的 inode；已打开则返回同一份 inode
    pub fn open(self: &Arc<Self>, sector: SectorId) -> Result<InodeHandle, Error> {
        let mut open_inodes = self.open_inodes.lock();

        if let Some(inode) = open_inodes.get(&sector) {
            inode.reopen();
            return Ok(InodeHandle::new(inode.clone(), self.clone()));
        }

        let disk_inode = self.cache.map(sector, DiskInode::decode);
        if !disk_inode.is_valid() {
            return Err(Error::BadMagic);
        }

        let inode = Arc::new(Inode::new(sector, disk_inode));
        open_inodes.insert(sector, inode.clone());
        debug!("opened inode at {sector}");

        Ok(InodeHandle::new(inode, self.clone()))
    }

    /// 减少打开计数；最后一个持有者关闭时注销，若已被删除则回收其全部扇区。
    ///
    /// 回收期间一直持有登记表的锁，同一扇区上的 `open` 只能等回收结束。
    pub(crate) fn close(&self, inode: &Arc<Inode>) {
        let mut open_inodes = self.open_inodes.lock();
        let Some(removed) = inode.release() else {
            return;
        };

        open_inodes.remove(&inode.sector());
        debug!("closed inode at {}", inode.sector());

        if removed {
            self.reclaim(inode);
        }
    }

    fn reclaim(&self, inode: &Inode) {
        let sector = inode.sector();
        // 抹掉魔数，之后再打开这个扇区会被拒绝
        self.cache.zero(sector);
        self.free_map.release(sector, 1);
        inode
            .disk_inode()
            .deallocate(&self.cache, self.free_map.as_ref());
        info!("reclaimed inode at {sector}");
    }

    /// 当前登记在册的 inode 数
    pub fn open_inodes(&self) -> usize {
        self.open_inodes.lock().len()
    }

    /// 写回全部脏扇区
    #[inline]
    pub fn sync(&self) {
        self.cache.flush_all();
    }
}
