//! 扇区号

use core::ops::Add;

use derive_more::{Display, From, Into};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into, Display)]
#[display(fmt = "sector#{}", _0)]
#[repr(transparent)]
pub struct SectorId(u32);

impl Add<u32> for SectorId {
    type Output = Self;

    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl SectorId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// 给块设备使用的块ID
    #[inline]
    pub fn block(self) -> usize {
        self.0 as usize
    }
}
