use crate::schema::blocks::BlockId;
use crate::schema::values::DataType;
use std::{error, fmt, io};

/// Critical failures. After one of these the session is in an undefined
/// state and should be dropped; the variants carry enough context to locate
/// the offending block where one is known.
#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    /// A block header or content ended before its declared length.
    TruncatedBlock { offset: u64 },
    /// The declared block length is impossible (shorter than its header).
    BadBlockLength { offset: u64, len: i64 },
    /// The first block of the file is not the endianness block.
    NotTngFormat { offset: u64, id: BlockId },
    /// The block-type flag is neither non-trajectory nor trajectory.
    BadBlockType { offset: u64, tag: u8 },
    /// The endianness block declares a descriptor this build does not know.
    UnknownEndianness { tag: u32 },
    /// A frame-set read was started on a block of a different kind.
    NotAFrameSet { offset: u64, id: BlockId },
    /// Stride must be at least 1.
    InvalidStride { id: BlockId, stride: i64 },
    /// A count field (frames, particles, values per frame) is not positive.
    InvalidCount { id: BlockId, count: i64 },
    /// The supplied value array does not match the declared grid.
    PayloadSize { id: BlockId, expected: u64, actual: u64 },
    /// A requested data block is not present in the last-read frame set.
    MissingBlock { id: BlockId },
    /// Two mapping blocks in one frame set claim the same global particle.
    MappingOverlap { particle: i64 },
    /// A mapping table names the same global particle twice.
    MappingDuplicate { particle: i64 },
    /// A bond references an atom index outside its molecule.
    BadBondIndex { molecule: i64, atom: i64 },
    /// The requested frame is not covered by any frame set.
    FrameOutOfRange { frame: i64 },
    /// An operation needs an input path that was never set.
    NoInputFile,
    /// An operation needs an output path that was never set.
    NoOutputFile,
    /// A registered codec rejected its input.
    Codec { codec_id: i64, message: String },
    InvalidArgument(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => err.fmt(f),
            Self::TruncatedBlock { offset } => {
                write!(f, "block truncated at file offset {offset}")
            }
            Self::BadBlockLength { offset, len } => {
                write!(f, "impossible block length {len} at offset {offset}")
            }
            Self::NotTngFormat { offset, id } => write!(
                f,
                "file does not start with an endianness block (found {id} at offset {offset})"
            ),
            Self::BadBlockType { offset, tag } => {
                write!(f, "unknown block-type flag {tag} at offset {offset}")
            }
            Self::UnknownEndianness { tag } => {
                write!(f, "unknown endianness descriptor {tag}")
            }
            Self::NotAFrameSet { offset, id } => {
                write!(f, "expected a frame-set block at offset {offset}, found {id}")
            }
            Self::InvalidStride { id, stride } => {
                write!(f, "invalid stride {stride} for block {id}")
            }
            Self::InvalidCount { id, count } => {
                write!(f, "invalid count {count} for block {id}")
            }
            Self::PayloadSize { id, expected, actual } => write!(
                f,
                "block {id} payload holds {actual} values, grid needs {expected}"
            ),
            Self::MissingBlock { id } => write!(f, "no data block {id} in the current frame set"),
            Self::MappingOverlap { particle } => {
                write!(f, "global particle {particle} claimed by two mapping blocks")
            }
            Self::MappingDuplicate { particle } => {
                write!(f, "global particle {particle} mapped twice in one table")
            }
            Self::BadBondIndex { molecule, atom } => {
                write!(f, "bond references atom {atom} outside molecule {molecule}")
            }
            Self::FrameOutOfRange { frame } => {
                write!(f, "frame {frame} is not covered by any frame set")
            }
            Self::NoInputFile => f.write_str("no input file path set"),
            Self::NoOutputFile => f.write_str("no output file path set"),
            Self::Codec { codec_id, message } => {
                write!(f, "codec {codec_id} failed: {message}")
            }
            Self::InvalidArgument(what) => write!(f, "invalid argument: {what}"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Minor failures. The session and file remain usable; the affected data is
/// still returned alongside the warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// The recomputed content digest differs from the stored one.
    DigestMismatch { id: BlockId, offset: u64 },
    /// A block with an unknown id was skipped by honoring its length.
    UnknownBlock { id: BlockId, offset: u64 },
    /// A stored string exceeded the maximum length; it was truncated.
    OverlongString { declared: u64 },
    /// A data block names a codec the registry does not know; its payload
    /// is kept unparsed.
    UnknownCodec { id: BlockId, codec_id: i64 },
    /// An interval read crossed a frame set that lacks the requested block.
    BlockNotPresent { id: BlockId, first_frame: i64 },
    /// A stored datatype differs from the one the caller asked for.
    TypeMismatch { id: BlockId, expected: DataType, actual: DataType },
    /// The union of mapping blocks leaves this global particle unmapped;
    /// its rows are default-filled.
    MappingGap { particle: i64 },
}

impl Warning {
    /// The block the warning is about, where one is known.
    #[must_use]
    pub fn block_id(&self) -> Option<BlockId> {
        match self {
            Self::DigestMismatch { id, .. }
            | Self::UnknownBlock { id, .. }
            | Self::UnknownCodec { id, .. }
            | Self::BlockNotPresent { id, .. }
            | Self::TypeMismatch { id, .. } => Some(*id),
            Self::OverlongString { .. } | Self::MappingGap { .. } => None,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DigestMismatch { id, offset } => {
                write!(f, "content digest mismatch in block {id} at offset {offset}")
            }
            Self::UnknownBlock { id, offset } => {
                write!(f, "skipped unknown block {id} at offset {offset}")
            }
            Self::OverlongString { declared } => {
                write!(f, "string of declared length {declared} truncated")
            }
            Self::UnknownCodec { id, codec_id } => {
                write!(f, "block {id} uses unregistered codec {codec_id}")
            }
            Self::BlockNotPresent { id, first_frame } => write!(
                f,
                "frame set starting at frame {first_frame} has no block {id}"
            ),
            Self::TypeMismatch { id, expected, actual } => write!(
                f,
                "block {id} stores {actual:?} values, {expected:?} requested"
            ),
            Self::MappingGap { particle } => {
                write!(f, "global particle {particle} not covered by any mapping")
            }
        }
    }
}

/// The non-critical half of the three-outcome discipline: an operation
/// either completed cleanly or completed with minor failures attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Success,
    Minor(Vec<Warning>),
}

impl Status {
    pub(crate) fn from_warnings(warnings: Vec<Warning>) -> Self {
        if warnings.is_empty() {
            Self::Success
        } else {
            Self::Minor(warnings)
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    #[must_use]
    pub fn warnings(&self) -> &[Warning] {
        match self {
            Self::Success => &[],
            Self::Minor(warnings) => warnings,
        }
    }
}

#[test]
fn test_status_from_warnings() {
    assert!(Status::from_warnings(Vec::new()).is_success());

    let status = Status::from_warnings(vec![Warning::OverlongString { declared: 2048 }]);
    assert!(!status.is_success());
    assert_eq!(1, status.warnings().len());
    assert_eq!(None, status.warnings()[0].block_id());

    let status = Status::from_warnings(vec![Warning::DigestMismatch {
        id: BlockId::POSITIONS,
        offset: 128,
    }]);
    assert_eq!(Some(BlockId::POSITIONS), status.warnings()[0].block_id());
}
