//! Codec dispatch for data-block payloads.
//!
//! A codec is a pure byte transform and its inverse, selected per block by
//! a numeric id recorded in the block. The engine serializes the value grid
//! to raw bytes in the declared byte orders, hands them to the codec, and
//! stores whatever comes back verbatim as block content; decode is
//! symmetric. Codec 0 (uncompressed) is the engine's own serialization and
//! never reaches the registry.

use crate::error::Result;
use crate::schema::values::DataType;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Describes the value grid a codec payload encodes.
///
/// `n_frames` is the stored (post-stride) frame count; `n_particles` is 1
/// for particle-independent blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub datatype: DataType,
    pub n_frames: i64,
    pub n_values_per_frame: i64,
    pub n_particles: i64,
}

impl Shape {
    /// Total number of values in the grid.
    #[must_use]
    pub fn value_count(&self) -> u64 {
        self.n_frames as u64 * self.n_particles as u64 * self.n_values_per_frame as u64
    }
}

/// A registered byte transform. Implementations must be inverses of each
/// other for every shape they accept, and must not reinterpret the raw
/// serialization beyond what the shape descriptor tells them.
pub trait Codec: Send + Sync {
    fn encode(&self, shape: &Shape, raw: &[u8]) -> Result<Vec<u8>>;
    fn decode(&self, shape: &Shape, payload: &[u8]) -> Result<Vec<u8>>;
}

/// Codec lookup table keyed by codec id.
#[derive(Default, Clone)]
pub struct CodecRegistry {
    codecs: HashMap<i64, Arc<dyn Codec>>,
}

impl CodecRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `codec` under `id`, replacing any previous registration.
    /// Id 0 is reserved for the engine's uncompressed serialization and is
    /// ignored here.
    pub fn register(&mut self, id: i64, codec: Arc<dyn Codec>) {
        if id != 0 {
            self.codecs.insert(id, codec);
        }
    }

    #[must_use]
    pub fn get(&self, id: i64) -> Option<&Arc<dyn Codec>> {
        self.codecs.get(&id)
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<i64> = self.codecs.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("CodecRegistry").field("ids", &ids).finish()
    }
}
