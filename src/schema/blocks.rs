use std::fmt;

/// A `BlockId` selects the interpretation of a block's content.
///
/// Ids below 10000 are control and metadata blocks whose meaning is fixed by
/// the format; ids of 10000 and above carry trajectory data. Custom ids are
/// permitted outside the reserved ranges.
#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct BlockId(pub i64);

impl BlockId {
    /// First block of every file; declares the byte orders used by the rest.
    pub const ENDIANNESS_AND_STRING_LENGTH: Self = Self(0);
    /// Authorship, signatures, stride lengths and frame-set bookkeeping.
    pub const GENERAL_INFO: Self = Self(1);
    /// The molecular topology, serialized once in the header preamble.
    pub const MOLECULES: Self = Self(2);
    /// Registry of data-block ids and their names.
    pub const TRAJECTORY_IDS_AND_NAMES: Self = Self(3);
    /// Frame-set framing block; carries the navigation offsets.
    pub const TRAJECTORY_FRAME_SET: Self = Self(4);
    /// Table of contents listing the block ids present in a frame set.
    pub const BLOCK_TABLE_OF_CONTENTS: Self = Self(5);
    /// Local-to-global particle number table.
    pub const PARTICLE_MAPPING: Self = Self(6);

    /// Simulation box shape, usually 9 values per frame.
    pub const BOX_SHAPE: Self = Self(10000);
    /// Particle positions.
    pub const POSITIONS: Self = Self(10001);
    /// Particle velocities.
    pub const VELOCITIES: Self = Self(10002);
    /// Particle forces.
    pub const FORCES: Self = Self(10003);

    /// Smallest id interpreted as trajectory data.
    pub const FIRST_TRAJECTORY_ID: i64 = 10000;

    #[inline]
    #[must_use]
    pub fn raw(self) -> i64 {
        self.0
    }

    /// Whether the id denotes trajectory data rather than control metadata.
    #[must_use]
    pub fn is_trajectory(self) -> bool {
        self.0 >= Self::FIRST_TRAJECTORY_ID
    }

    /// The name the format reserves for this id, if any.
    #[must_use]
    pub fn canonical_name(self) -> Option<&'static str> {
        Some(match self {
            Self::ENDIANNESS_AND_STRING_LENGTH => "ENDIANNESS AND STRING LENGTH",
            Self::GENERAL_INFO => "GENERAL INFO",
            Self::MOLECULES => "MOLECULES",
            Self::TRAJECTORY_IDS_AND_NAMES => "TRAJECTORY IDS AND NAMES",
            Self::TRAJECTORY_FRAME_SET => "TRAJECTORY FRAME SET",
            Self::BLOCK_TABLE_OF_CONTENTS => "BLOCK TABLE OF CONTENTS",
            Self::PARTICLE_MAPPING => "PARTICLE MAPPING",
            Self::BOX_SHAPE => "BOX SHAPE",
            Self::POSITIONS => "POSITIONS",
            Self::VELOCITIES => "VELOCITIES",
            Self::FORCES => "FORCES",
            _ => return None,
        })
    }
}

impl From<i64> for BlockId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.canonical_name() {
            Some(name) => write!(f, "{} ({name})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}

#[test]
fn test_reserved_ids() {
    assert_eq!(0, BlockId::ENDIANNESS_AND_STRING_LENGTH.raw());
    assert_eq!(6, BlockId::PARTICLE_MAPPING.raw());
    assert_eq!(10001, BlockId::POSITIONS.raw());
    assert!(!BlockId::PARTICLE_MAPPING.is_trajectory());
    assert!(BlockId::BOX_SHAPE.is_trajectory());
    assert!(BlockId(31337).canonical_name().is_none());
    assert_eq!("10001 (POSITIONS)", BlockId::POSITIONS.to_string());
}
