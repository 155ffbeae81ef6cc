use alloc::vec::Vec;

use crate::{Error, InodeHandle, SECTOR_SIZE};

/// 进程打开的文件：一个 inode 句柄加上文件内的偏移量
#[derive(Debug)]
pub struct File {
    inode: InodeHandle,
    /// **文件**内的偏移量
    pos: usize,
    /// 是否由本文件禁止了 inode 的写入
    deny_write: bool,
}

impl File {
    #[inline]
    pub fn new(inode: InodeHandle) -> Self {
        Self {
            inode,
            pos: 0,
            deny_write: false,
        }
    }

    /// 同一 inode 上的新文件，偏移量从头开始
    #[inline]
    pub fn reopen(&self) -> Self {
        Self::new(self.inode.reopen())
    }

    #[inline]
    pub fn inode(&self) -> &InodeHandle {
        &self.inode
    }

    /// 从当前位置读，并前移相应字节
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let len = self.inode.read_at(self.pos, buf);
        self.pos += len;
        len
    }

    #[inline]
    pub fn read_at(&self, buf: &mut [u8], offset: usize) -> usize {
        self.inode.read_at(offset, buf)
    }

    /// 从当前位置写，并前移相应字节
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        let len = self.inode.write_at(self.pos, buf)?;
        self.pos += len;
        Ok(len)
    }

    #[inline]
    pub fn write_at(&self, buf: &[u8], offset: usize) -> Result<usize, Error> {
        self.inode.write_at(offset, buf)
    }

    /// 从当前位置读到文件末尾
    pub fn read_all(&mut self) -> Vec<u8> {
        let mut buffer = [0u8; SECTOR_SIZE];

        let mut bytes = Vec::with_capacity(self.length().saturating_sub(self.pos));
        loop {
            let len = self.read(&mut buffer);
            if len == 0 {
                break;
            }
            bytes.extend_from_slice(&buffer[..len]);
        }
        bytes
    }

    /// 禁止写入 inode，每个文件至多生效一次
    pub fn deny_write(&mut self) {
        if !self.deny_write {
            self.deny_write = true;
            self.inode.deny_write();
        }
    }

    pub fn allow_write(&mut self) {
        if self.deny_write {
            self.deny_write = false;
            self.inode.allow_write();
        }
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.inode.length()
    }

    /// 偏移量可以越过文件末尾，此时读不出任何数据
    #[inline]
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    #[inline]
    pub fn tell(&self) -> usize {
        self.pos
    }
}

impl Drop for File {
    fn drop(&mut self) {
        self.allow_write();
    }
}
