use derive_more::Display;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[display(fmt = "inode length is negative")]
    NegativeLength,
    #[display(fmt = "length exceeds the addressable sectors of an inode")]
    TooLarge,
    #[display(fmt = "no free sector left")]
    NoSpace,
    #[display(fmt = "write extends past the allocated length")]
    WritePastEnd,
    #[display(fmt = "sector does not hold an inode")]
    BadMagic,
    #[display(fmt = "volume is not formatted")]
    Unformatted,
}

impl core::error::Error for Error {}
