//! # 索引节点层
//!
//! 内存中的 inode 由 [`FileSystem`] 的登记表独占，
//! 使用者拿到的是 [`InodeHandle`]，其有效期从打开到关闭。
//!
//! inode 的生命周期：
//! 未打开 → 打开(计数 ≥ 1) → 关闭中(最后一次关闭) → 销毁；
//! 若关闭前已被删除，则销毁前先回收其扇区树与自身扇区。
//!
//! 文件长度在创建时确定，写入不会让文件增长。

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

use log::warn;
use spin::Mutex;

use crate::layout::DiskInode;
use crate::{DataBlock, Error, FileSystem, SECTOR_SIZE, SectorCache, SectorId};

#[derive(Debug)]
pub(crate) struct Inode {
    /// inode 所在扇区，也是它的身份
    sector: SectorId,
    /// 打开时读入的磁盘 inode
    disk_inode: DiskInode,
    state: Mutex<InodeState>,
}

#[derive(Debug)]
struct InodeState {
    /// 打开者个数
    open_count: usize,
    /// 禁止写入者个数，为 0 时允许写入
    deny_write_count: usize,
    /// 已删除，待最后一次关闭时回收
    removed: bool,
}

/// 打开的 inode，释放即关闭；关闭前先撤销本句柄尚未解除的写禁止
pub struct InodeHandle {
    inode: Arc<Inode>,
    fs: Arc<FileSystem>,
    /// 本句柄施加的写禁止次数
    denied: AtomicUsize,
}

impl Inode {
    pub fn new(sector: SectorId, disk_inode: DiskInode) -> Self {
        Self {
            sector,
            disk_inode,
            state: Mutex::new(InodeState {
                open_count: 1,
                deny_write_count: 0,
                removed: false,
            }),
        }
    }

    #[inline]
    pub fn sector(&self) -> SectorId {
        self.sector
    }

    #[inline]
    pub fn disk_inode(&self) -> &DiskInode {
        &self.disk_inode
    }

    #[inline]
    pub fn reopen(&self) {
        self.state.lock().open_count += 1;
    }

    /// 减少打开计数，归零时返回是否已被删除
    pub fn release(&self) -> Option<bool> {
        let mut state = self.state.lock();
        assert!(state.open_count > 0, "inode at {} closed too many times", self.sector);
        state.open_count -= 1;
        assert!(
            state.deny_write_count <= state.open_count,
            "inode at {} closed while its writes are still denied",
            self.sector
        );

        (state.open_count == 0).then_some(state.removed)
    }

    /// 从指定位置(字节偏移)读出数据填充`buf`，遇到文件末尾则少读
    pub fn read_at(&self, offset: usize, buf: &mut [u8], cache: &SectorCache) -> usize {
        let length = self.disk_inode.len();
        let mut offset = offset;
        let mut bounce: Option<DataBlock> = None;

        // 已读取多少字节
        let mut read_size = 0;
        while read_size < buf.len() {
            let Some(sector) = self.disk_inode.byte_to_sector(offset, cache) else {
                break;
            };
            // 扇区内偏移
            let sector_offset = offset % SECTOR_SIZE;
            let chunk_size = (buf.len() - read_size)
                .min(length - offset)
                .min(SECTOR_SIZE - sector_offset);
            let dest = &mut buf[read_size..read_size + chunk_size];

            if sector_offset == 0 && chunk_size == SECTOR_SIZE {
                // 整个扇区直接读进调用者的缓冲区
                cache.read(sector, dest);
            } else {
                let bounce = bounce.get_or_insert([0; SECTOR_SIZE]);
                cache.read(sector, bounce);
                dest.copy_from_slice(&bounce[sector_offset..sector_offset + chunk_size]);
            }

            offset += chunk_size;
            read_size += chunk_size;
        }

        read_size
    }

    /// 从指定位置写入`buf`。
    ///
    /// 禁止写入时什么也不写；写入范围的末字节超出已分配长度时报错，不会写入任何数据。
    pub fn write_at(&self, offset: usize, buf: &[u8], cache: &SectorCache) -> Result<usize, Error> {
        if self.state.lock().deny_write_count > 0 {
            warn!("write to inode at {} denied", self.sector);
            return Ok(0);
        }

        if buf.is_empty() {
            return Ok(0);
        }

        let end = offset
            .checked_add(buf.len() - 1)
            .and_then(|last| self.disk_inode.byte_to_sector(last, cache));
        if end.is_none() {
            warn!(
                "write of {} bytes at {offset} past the end of inode at {}",
                buf.len(),
                self.sector
            );
            return Err(Error::WritePastEnd);
        }

        let length = self.disk_inode.len();
        let mut offset = offset;
        let mut bounce: Option<DataBlock> = None;

        let mut written_size = 0;
        while written_size < buf.len() {
            let Some(sector) = self.disk_inode.byte_to_sector(offset, cache) else {
                break;
            };
            let sector_offset = offset % SECTOR_SIZE;
            let sector_left = SECTOR_SIZE - sector_offset;
            let chunk_size = (buf.len() - written_size)
                .min(length - offset)
                .min(sector_left);
            let src = &buf[written_size..written_size + chunk_size];

            if sector_offset == 0 && chunk_size == SECTOR_SIZE {
                cache.write(sector, src);
            } else {
                // 扇区在写入片段前后还有数据，得先读出原扇区
                let bounce = bounce.get_or_insert([0; SECTOR_SIZE]);
                cache.read(sector, bounce);
                bounce[sector_offset..sector_offset + chunk_size].copy_from_slice(src);
                cache.write(sector, &bounce[..]);
            }

            offset += chunk_size;
            written_size += chunk_size;
        }

        Ok(written_size)
    }

    pub fn remove(&self) {
        self.state.lock().removed = true;
    }

    pub fn is_removed(&self) -> bool {
        self.state.lock().removed
    }

    pub fn deny_write(&self) {
        let mut state = self.state.lock();
        assert!(
            state.deny_write_count < state.open_count,
            "more write denials than openers of inode at {}",
            self.sector
        );
        state.deny_write_count += 1;
    }

    pub fn allow_write(&self) {
        let mut state = self.state.lock();
        assert!(state.deny_write_count > 0, "allow_write without deny_write");
        assert!(state.deny_write_count <= state.open_count);
        state.deny_write_count -= 1;
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }
}

impl InodeHandle {
    #[inline]
    pub(crate) fn new(inode: Arc<Inode>, fs: Arc<FileSystem>) -> Self {
        Self {
            inode,
            fs,
            denied: AtomicUsize::new(0),
        }
    }

    /// 再打开一次，得到同一个 inode 的新句柄
    pub fn reopen(&self) -> Self {
        self.inode.reopen();
        Self::new(self.inode.clone(), self.fs.clone())
    }

    #[inline]
    pub fn close(self) {
        drop(self);
    }

    /// inode 编号，即其所在扇区
    #[inline]
    pub fn inumber(&self) -> SectorId {
        self.inode.sector()
    }

    /// 文件字节数
    #[inline]
    pub fn length(&self) -> usize {
        self.inode.disk_inode().len()
    }

    #[inline]
    pub fn disk_inode(&self) -> &DiskInode {
        self.inode.disk_inode()
    }

    #[inline]
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        self.inode.read_at(offset, buf, self.fs.cache())
    }

    #[inline]
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, Error> {
        self.inode.write_at(offset, buf, self.fs.cache())
    }

    /// 标记删除，最后一次关闭时才真正回收
    #[inline]
    pub fn remove(&self) {
        self.inode.remove();
    }

    #[inline]
    pub fn is_removed(&self) -> bool {
        self.inode.is_removed()
    }

    pub fn deny_write(&self) {
        self.inode.deny_write();
        self.denied.fetch_add(1, Ordering::Relaxed);
    }

    /// 只能解除本句柄施加的写禁止
    pub fn allow_write(&self) {
        let denied = self
            .denied
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        assert!(denied.is_ok(), "allow_write without deny_write on this handle");
        self.inode.allow_write();
    }

    #[inline]
    pub fn open_count(&self) -> usize {
        self.inode.open_count()
    }

    /// 两个句柄是否指向内存中的同一个 inode
    #[inline]
    pub fn same_inode(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inode, &other.inode)
    }
}

impl Drop for InodeHandle {
    fn drop(&mut self) {
        for _ in 0..*self.denied.get_mut() {
            self.inode.allow_write();
        }
        self.fs.close(&self.inode);
    }
}

impl fmt::Debug for InodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InodeHandle")
            .field("sector", &self.inode.sector())
            .field("length", &self.length())
            .finish()
    }
}
