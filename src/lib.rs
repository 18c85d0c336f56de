//! TNG trajectory container in Rust
//!
//! A flexible, block-structured binary container for molecular-dynamics
//! trajectories: per-frame positions, velocities, forces and box shapes,
//! plus the molecular topology and descriptive metadata. The format is
//! built for parallel writers (per-range particle mappings), per-block
//! compression codec selection, heterogeneous sampling strides and
//! per-block content digests.

/// Generic block framing
pub mod block;
/// Typed byte I/O in the declared endianness
pub mod bytes;
/// Codec trait and registry
pub mod codec;
/// Data-block encoding and the tagged value arrays
pub mod data;
/// Content digests
pub mod digest;
/// Critical errors, minor warnings and the three-outcome status
pub mod error;
/// The frame-set container
pub mod frame_set;
/// Particle mapping tables
pub mod mapping;
/// The trajectory session
pub mod trajectory;
/// The molecular topology
pub mod topology;

/// On-disk tags and reserved ids
pub mod schema {
    /// Reserved block ids and names
    pub mod blocks;
    /// Datatypes, flags and codec ids
    pub mod values;
}

pub use self::block::{Block, BlockHeader};
pub use self::bytes::{ByteOrders, Endianness32, Endianness64};
pub use self::codec::{Codec, CodecRegistry, Shape};
pub use self::data::{DataArray, DataBlock, FrameData, ParticleData};
pub use self::error::{Error, Result, Status, Warning};
pub use self::frame_set::FrameSet;
pub use self::mapping::ParticleMapping;
pub use self::schema::blocks::BlockId;
pub use self::schema::values::{AtomCountMode, BlockType, DataType, HashMode};
pub use self::topology::Topology;
pub use self::trajectory::Trajectory;
