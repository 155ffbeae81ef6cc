use super::{read_u32, write_u32};
use crate::{DataBlock, MAGIC, SECTOR_SIZE};

/// 超级块：
/// - 提供卷合法性校验；
/// - 定位其它连续区域
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    /// 魔数：用于校验卷合法性
    magic: u32,
    /// 卷占据扇区数
    pub total_sectors: u32,
    pub bitmap_sectors: u32,
    pub area_sectors: u32,
}

impl SuperBlock {
    pub fn new(total_sectors: u32, bitmap_sectors: u32, area_sectors: u32) -> Self {
        Self {
            magic: MAGIC,
            total_sectors,
            bitmap_sectors,
            area_sectors,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    /// 位图起始扇区，紧跟超级块
    #[inline]
    pub fn bitmap_start(&self) -> u32 {
        1
    }

    #[inline]
    pub fn area_start(&self) -> u32 {
        self.bitmap_start() + self.bitmap_sectors
    }

    pub fn decode(data: &DataBlock) -> Self {
        Self {
            magic: read_u32(data, 0),
            total_sectors: read_u32(data, 1),
            bitmap_sectors: read_u32(data, 2),
            area_sectors: read_u32(data, 3),
        }
    }

    pub fn encode(&self) -> DataBlock {
        let mut data = [0; SECTOR_SIZE];
        write_u32(&mut data, 0, self.magic);
        write_u32(&mut data, 1, self.total_sectors);
        write_u32(&mut data, 2, self.bitmap_sectors);
        write_u32(&mut data, 3, self.area_sectors);
        data
    }
}
