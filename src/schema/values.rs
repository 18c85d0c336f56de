use num_enum::TryFromPrimitive;

/// The maximum accepted length of a stored string, in bytes.
///
/// Longer strings are truncated on write; on read the excess is skipped and
/// reported as a minor failure.
pub const MAX_STR_LEN: usize = 1024;

/// The maximum length of the ISO-8601 date string.
pub const MAX_DATE_STR_LEN: usize = 24;

/// Element type of the values stored in a data block.
#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum DataType {
    /// String values, stored length-prefixed.
    Char = 0,
    /// 32-bit signed integers.
    Int = 1,
    /// 32-bit floats.
    Float = 2,
    /// 64-bit floats.
    Double = 3,
}

/// Whether a block belongs to the header preamble or to the frame stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum BlockType {
    NonTrajectory = 0,
    Trajectory = 1,
}

/// Controls whether content digests are computed on write and verified on
/// read. Verification failures are always minor; the data is still returned.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HashMode {
    /// Do not compute, do not verify; the stored digest field is zero.
    Skip,
    /// Compute on write; verify on read when the stored digest is non-zero.
    Use,
}

/// Whether the particle count may vary between frame sets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum AtomCountMode {
    Constant = 0,
    Variable = 1,
}

bitflags::bitflags! {
    /// Dependency byte of a data block.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DataDependency: u8 {
        /// The block stores one row per particle.
        const PARTICLE_DEPENDENT = 1;
        /// The block stores one row group per frame.
        const FRAME_DEPENDENT = 2;
    }
}

/// Reserved codec ids. Non-zero codecs are opaque byte transforms supplied
/// through the registry; their payloads are not defined here.
pub mod codec_id {
    /// Bit-preserving serialization in the declared byte orders.
    pub const UNCOMPRESSED: i64 = 0;
    /// The XTC fixed-point codec.
    pub const XTC_COMPRESSION: i64 = 1;
    /// The TNG triple-coding codec.
    pub const TNG_COMPRESSION: i64 = 2;
}

impl DataType {
    /// Encoded size of one value, or `None` for strings.
    #[must_use]
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Char => None,
            Self::Int | Self::Float => Some(4),
            Self::Double => Some(8),
        }
    }
}

#[test]
fn test_tags_round_trip() {
    for tag in 0..=3u8 {
        let ty = DataType::try_from(tag).unwrap();
        assert_eq!(tag, ty as u8);
    }
    assert!(DataType::try_from(4).is_err());
    assert_eq!(BlockType::Trajectory, BlockType::try_from(1).unwrap());
    assert_eq!(
        DataDependency::from_bits(3),
        Some(DataDependency::PARTICLE_DEPENDENT | DataDependency::FRAME_DEPENDENT)
    );
    assert_eq!(None, DataDependency::from_bits(8));
}
