//! Shape- and type-aware serialization of particle and non-particle data
//! arrays, and the codec dispatch around their payloads.
//!
//! A data block stores a value grid of ⌈frames / stride⌉ × [particles ×]
//! values-per-frame elements, laid out frame-major, then particle-major,
//! then value-minor. The element type is one of four tagged datatypes; the
//! payload is the grid serialized in the declared byte orders and then run
//! through the codec named by the block's codec id (id 0 stores the
//! serialization verbatim).

use crate::block::Block;
use crate::bytes::ByteOrders;
use crate::codec::{CodecRegistry, Shape};
use crate::error::{Error, Result, Warning};
use crate::schema::blocks::BlockId;
use crate::schema::values::{BlockType, DataDependency, DataType};
use byteorder::{ReadBytesExt, WriteBytesExt};
use log::warn;
use std::io::{Read, Write};

/// A flat value grid tagged by its datatype.
///
/// The discriminant mirrors the on-disk datatype tag; callers switch on it
/// to reach the typed storage.
#[derive(Debug, Clone, PartialEq)]
pub enum DataArray {
    Char(Vec<String>),
    Int(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

impl DataArray {
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Char(_) => DataType::Char,
            Self::Int(_) => DataType::Int,
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Char(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn as_char(&self) -> Option<&[String]> {
        match self {
            Self::Char(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&[i32]> {
        match self {
            Self::Int(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<&[f32]> {
        match self {
            Self::Float(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_double(&self) -> Option<&[f64]> {
        match self {
            Self::Double(v) => Some(v),
            _ => None,
        }
    }

    /// A grid of `len` default elements (empty strings, zeros).
    #[must_use]
    pub fn default_filled(datatype: DataType, len: usize) -> Self {
        match datatype {
            DataType::Char => Self::Char(vec![String::new(); len]),
            DataType::Int => Self::Int(vec![0; len]),
            DataType::Float => Self::Float(vec![0.0; len]),
            DataType::Double => Self::Double(vec![0.0; len]),
        }
    }

    /// Copies `len` elements from `src[src_at..]` into `self[dst_at..]`.
    /// No-op returning `false` when the datatypes differ.
    pub fn copy_from(&mut self, dst_at: usize, src: &Self, src_at: usize, len: usize) -> bool {
        match (self, src) {
            (Self::Char(dst), Self::Char(src)) => {
                dst[dst_at..dst_at + len].clone_from_slice(&src[src_at..src_at + len]);
            }
            (Self::Int(dst), Self::Int(src)) => {
                dst[dst_at..dst_at + len].copy_from_slice(&src[src_at..src_at + len]);
            }
            (Self::Float(dst), Self::Float(src)) => {
                dst[dst_at..dst_at + len].copy_from_slice(&src[src_at..src_at + len]);
            }
            (Self::Double(dst), Self::Double(src)) => {
                dst[dst_at..dst_at + len].copy_from_slice(&src[src_at..src_at + len]);
            }
            _ => return false,
        }
        true
    }

    /// The elements `[start, start + len)` as a new array.
    #[must_use]
    pub fn slice(&self, start: usize, len: usize) -> Self {
        match self {
            Self::Char(v) => Self::Char(v[start..start + len].to_vec()),
            Self::Int(v) => Self::Int(v[start..start + len].to_vec()),
            Self::Float(v) => Self::Float(v[start..start + len].to_vec()),
            Self::Double(v) => Self::Double(v[start..start + len].to_vec()),
        }
    }

    /// Serializes the grid in the declared byte orders; the uncompressed
    /// payload representation.
    pub fn write_values<W: Write>(&self, w: &mut W, orders: ByteOrders) -> Result<()> {
        match self {
            Self::Char(values) => {
                for value in values {
                    orders.write_string(w, value)?;
                }
            }
            Self::Int(values) => {
                for &value in values {
                    orders.write_i32(w, value)?;
                }
            }
            Self::Float(values) => {
                for &value in values {
                    orders.write_f32(w, value)?;
                }
            }
            Self::Double(values) => {
                for &value in values {
                    orders.write_f64(w, value)?;
                }
            }
        }
        Ok(())
    }

    /// Parses `count` elements of `datatype`.
    pub fn read_values<R: Read>(
        r: &mut R,
        orders: ByteOrders,
        datatype: DataType,
        count: usize,
        warnings: &mut Vec<Warning>,
    ) -> Result<Self> {
        Ok(match datatype {
            DataType::Char => {
                let mut values = Vec::with_capacity(count.min(1 << 16));
                for _ in 0..count {
                    values.push(orders.read_string(r, warnings)?);
                }
                Self::Char(values)
            }
            DataType::Int => {
                let mut values = Vec::with_capacity(count.min(1 << 20));
                for _ in 0..count {
                    values.push(orders.read_i32(r)?);
                }
                Self::Int(values)
            }
            DataType::Float => {
                let mut values = Vec::with_capacity(count.min(1 << 20));
                for _ in 0..count {
                    values.push(orders.read_f32(r)?);
                }
                Self::Float(values)
            }
            DataType::Double => {
                let mut values = Vec::with_capacity(count.min(1 << 20));
                for _ in 0..count {
                    values.push(orders.read_f64(r)?);
                }
                Self::Double(values)
            }
        })
    }
}

/// The particle range a particle-dependent block covers, in the local axis
/// of its frame set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticleRange {
    pub num_first_particle: i64,
    pub n_particles: i64,
}

/// Block values: decoded into a typed grid, or kept as the raw payload when
/// the codec is not registered.
#[derive(Debug, Clone, PartialEq)]
pub enum DataValues {
    Decoded(DataArray),
    Opaque { datatype: DataType, payload: Vec<u8> },
}

impl DataValues {
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Decoded(array) => array.data_type(),
            Self::Opaque { datatype, .. } => *datatype,
        }
    }

    #[must_use]
    pub fn decoded(&self) -> Option<&DataArray> {
        match self {
            Self::Decoded(array) => Some(array),
            Self::Opaque { .. } => None,
        }
    }
}

/// A 2-D result: stored frames × values-per-frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameData {
    /// Stored (post-stride) frame rows.
    pub n_frames: i64,
    pub n_values_per_frame: i64,
    pub stride_length: i64,
    pub values: DataArray,
}

impl FrameData {
    /// Flat index of `(frame_row, value)`.
    #[must_use]
    pub fn value_index(&self, frame_row: i64, value: i64) -> usize {
        (frame_row * self.n_values_per_frame + value) as usize
    }
}

/// A 3-D result: stored frames × particles × values-per-frame, the
/// particle axis indexed by real particle numbers counted from
/// `num_first_particle`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleData {
    /// Stored (post-stride) frame rows.
    pub n_frames: i64,
    pub num_first_particle: i64,
    pub n_particles: i64,
    pub n_values_per_frame: i64,
    pub stride_length: i64,
    pub values: DataArray,
}

impl ParticleData {
    /// Flat index of `(frame_row, particle, value)`; `particle` counts
    /// from `num_first_particle`.
    #[must_use]
    pub fn value_index(&self, frame_row: i64, particle: i64, value: i64) -> usize {
        ((frame_row * self.n_particles + particle) * self.n_values_per_frame + value) as usize
    }
}

/// One data block, particle-dependent or not.
#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    pub id: BlockId,
    pub name: String,
    pub block_type: BlockType,
    pub n_frames: i64,
    pub n_values_per_frame: i64,
    /// Frames between successive samples; 1 stores every frame.
    pub stride_length: i64,
    pub codec_id: i64,
    pub particle: Option<ParticleRange>,
    pub values: DataValues,
}

impl DataBlock {
    /// A particle-independent data block. Non-trajectory blocks always
    /// carry exactly one frame.
    pub fn new(
        id: BlockId,
        name: impl Into<String>,
        block_type: BlockType,
        n_frames: i64,
        n_values_per_frame: i64,
        stride_length: i64,
        codec_id: i64,
        values: DataArray,
    ) -> Result<Self> {
        Self::build(
            id,
            name.into(),
            block_type,
            n_frames,
            n_values_per_frame,
            stride_length,
            codec_id,
            None,
            values,
        )
    }

    /// A particle-dependent data block covering `n_particles` local rows
    /// starting at `num_first_particle`.
    #[allow(clippy::too_many_arguments)]
    pub fn new_particle(
        id: BlockId,
        name: impl Into<String>,
        block_type: BlockType,
        n_frames: i64,
        n_values_per_frame: i64,
        stride_length: i64,
        num_first_particle: i64,
        n_particles: i64,
        codec_id: i64,
        values: DataArray,
    ) -> Result<Self> {
        if num_first_particle < 0 {
            return Err(Error::InvalidArgument("negative first particle number"));
        }
        if n_particles <= 0 {
            return Err(Error::InvalidCount {
                id,
                count: n_particles,
            });
        }
        Self::build(
            id,
            name.into(),
            block_type,
            n_frames,
            n_values_per_frame,
            stride_length,
            codec_id,
            Some(ParticleRange {
                num_first_particle,
                n_particles,
            }),
            values,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        id: BlockId,
        name: String,
        block_type: BlockType,
        n_frames: i64,
        n_values_per_frame: i64,
        stride_length: i64,
        codec_id: i64,
        particle: Option<ParticleRange>,
        values: DataArray,
    ) -> Result<Self> {
        if stride_length < 1 {
            return Err(Error::InvalidStride {
                id,
                stride: stride_length,
            });
        }
        let n_frames = if block_type == BlockType::NonTrajectory {
            1
        } else {
            n_frames
        };
        if n_frames < 1 {
            return Err(Error::InvalidCount { id, count: n_frames });
        }
        if n_values_per_frame < 1 {
            return Err(Error::InvalidCount {
                id,
                count: n_values_per_frame,
            });
        }
        let block = Self {
            id,
            name,
            block_type,
            n_frames,
            n_values_per_frame,
            stride_length,
            codec_id,
            particle,
            values: DataValues::Decoded(values),
        };
        let expected = block.grid_len();
        let actual = match &block.values {
            DataValues::Decoded(array) => array.len() as u64,
            DataValues::Opaque { .. } => expected,
        };
        if expected != actual {
            return Err(Error::PayloadSize {
                id,
                expected,
                actual,
            });
        }
        Ok(block)
    }

    /// Frames actually stored: ⌈frames / stride⌉.
    #[must_use]
    pub fn n_stored_frames(&self) -> i64 {
        (self.n_frames + self.stride_length - 1) / self.stride_length
    }

    /// Values per stored frame across all covered particles.
    #[must_use]
    pub fn frame_row_len(&self) -> i64 {
        self.n_values_per_frame * self.particle.map_or(1, |p| p.n_particles)
    }

    /// Total element count of the grid.
    #[must_use]
    pub fn grid_len(&self) -> u64 {
        self.n_stored_frames() as u64 * self.frame_row_len() as u64
    }

    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.values.data_type()
    }

    #[must_use]
    pub fn is_particle(&self) -> bool {
        self.particle.is_some()
    }

    fn shape(&self) -> Shape {
        Shape {
            datatype: self.data_type(),
            n_frames: self.n_stored_frames(),
            n_values_per_frame: self.n_values_per_frame,
            n_particles: self.particle.map_or(1, |p| p.n_particles),
        }
    }

    fn dependency(&self) -> DataDependency {
        let mut dependency = DataDependency::empty();
        if self.particle.is_some() {
            dependency |= DataDependency::PARTICLE_DEPENDENT;
        }
        if self.block_type == BlockType::Trajectory {
            dependency |= DataDependency::FRAME_DEPENDENT;
        }
        dependency
    }

    /// Frames `[frame_offset, frame_offset + n)` as a block of their own.
    /// Defined only for stride 1 and decoded values.
    pub fn slice_frames(&self, frame_offset: i64, n: i64) -> Result<Self> {
        if self.stride_length != 1 {
            return Err(Error::InvalidArgument(
                "frame slicing needs stride 1 blocks",
            ));
        }
        if frame_offset < 0 || n < 1 || frame_offset + n > self.n_frames {
            return Err(Error::InvalidArgument("frame slice out of range"));
        }
        let array = match &self.values {
            DataValues::Decoded(array) => array,
            DataValues::Opaque { .. } => {
                return Err(Error::InvalidArgument("cannot slice an unparsed payload"));
            }
        };
        let row = self.frame_row_len() as usize;
        Ok(Self {
            id: self.id,
            name: self.name.clone(),
            block_type: self.block_type,
            n_frames: n,
            n_values_per_frame: self.n_values_per_frame,
            stride_length: 1,
            codec_id: self.codec_id,
            particle: self.particle,
            values: DataValues::Decoded(
                array.slice(frame_offset as usize * row, n as usize * row),
            ),
        })
    }

    /// Frames the block covers within its frame set, as a sample index:
    /// `frame_in_set` is relative to the frame set's first frame.
    #[must_use]
    pub fn sample_index(&self, frame_in_set: i64) -> i64 {
        frame_in_set / self.stride_length
    }

    /// Serializes this data block into a framed block.
    pub fn to_block(&self, orders: ByteOrders, registry: &CodecRegistry) -> Result<Block> {
        let mut contents = Vec::new();
        contents.write_u8(self.data_type() as u8)?;
        contents.write_u8(self.dependency().bits())?;
        orders.write_i64(&mut contents, self.n_frames)?;
        orders.write_i64(&mut contents, self.n_values_per_frame)?;
        orders.write_i64(&mut contents, self.stride_length)?;
        orders.write_i64(&mut contents, self.codec_id)?;
        if let Some(range) = self.particle {
            orders.write_i64(&mut contents, range.num_first_particle)?;
            orders.write_i64(&mut contents, range.n_particles)?;
        }
        match &self.values {
            DataValues::Decoded(array) => {
                let mut raw = Vec::new();
                array.write_values(&mut raw, orders)?;
                if self.codec_id == 0 {
                    contents.extend_from_slice(&raw);
                } else {
                    let codec = registry.get(self.codec_id).ok_or(Error::Codec {
                        codec_id: self.codec_id,
                        message: "not registered".to_owned(),
                    })?;
                    contents.extend_from_slice(&codec.encode(&self.shape(), &raw)?);
                }
            }
            DataValues::Opaque { payload, .. } => contents.extend_from_slice(payload),
        }
        Ok(Block::new(self.id, self.name.clone(), self.block_type, contents))
    }

    /// Parses a framed block into a data block. A payload whose codec is
    /// not registered is kept unparsed and reported as a minor failure.
    pub fn from_block(
        block: &Block,
        orders: ByteOrders,
        registry: &CodecRegistry,
        warnings: &mut Vec<Warning>,
    ) -> Result<Self> {
        let mut r = block.contents.as_slice();
        let type_tag = r.read_u8()?;
        let datatype = DataType::try_from(type_tag)
            .map_err(|_| Error::InvalidArgument("unknown datatype tag"))?;
        let dep_tag = r.read_u8()?;
        let dependency = DataDependency::from_bits(dep_tag)
            .ok_or(Error::InvalidArgument("unknown dependency flags"))?;
        let n_frames = orders.read_i64(&mut r)?;
        let n_values_per_frame = orders.read_i64(&mut r)?;
        let stride_length = orders.read_i64(&mut r)?;
        let codec_id = orders.read_i64(&mut r)?;
        if stride_length < 1 {
            return Err(Error::InvalidStride {
                id: block.id,
                stride: stride_length,
            });
        }
        for count in [n_frames, n_values_per_frame] {
            if count < 1 {
                return Err(Error::InvalidCount {
                    id: block.id,
                    count,
                });
            }
        }
        let particle = if dependency.contains(DataDependency::PARTICLE_DEPENDENT) {
            let num_first_particle = orders.read_i64(&mut r)?;
            let n_particles = orders.read_i64(&mut r)?;
            if n_particles < 1 {
                return Err(Error::InvalidCount {
                    id: block.id,
                    count: n_particles,
                });
            }
            Some(ParticleRange {
                num_first_particle,
                n_particles,
            })
        } else {
            None
        };

        let mut parsed = Self {
            id: block.id,
            name: block.name.clone(),
            block_type: block.block_type,
            n_frames,
            n_values_per_frame,
            stride_length,
            codec_id,
            particle,
            values: DataValues::Opaque {
                datatype,
                payload: r.to_vec(),
            },
        };

        let raw;
        let mut raw_slice: &[u8] = if codec_id == 0 {
            r
        } else if let Some(codec) = registry.get(codec_id) {
            raw = codec.decode(&parsed.shape(), r)?;
            &raw
        } else {
            warn!(
                "block {} at offset {} uses unregistered codec {}",
                block.id, block.offset, codec_id
            );
            warnings.push(Warning::UnknownCodec {
                id: block.id,
                codec_id,
            });
            return Ok(parsed);
        };

        let count = parsed.grid_len();
        if let Some(size) = datatype.fixed_size() {
            let actual = raw_slice.len() as u64 / size as u64;
            if actual != count {
                return Err(Error::PayloadSize {
                    id: block.id,
                    expected: count,
                    actual,
                });
            }
        }
        let array =
            DataArray::read_values(&mut raw_slice, orders, datatype, count as usize, warnings)?;
        parsed.values = DataValues::Decoded(array);
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;
    use crate::schema::values::HashMode;
    use std::io::Cursor;
    use std::sync::Arc;

    fn round_trip(block: &DataBlock, orders: ByteOrders, registry: &CodecRegistry) -> DataBlock {
        let mut framed = block.to_block(orders, registry).unwrap();
        let mut file = Cursor::new(Vec::new());
        framed.write(&mut file, orders, HashMode::Use).unwrap();
        file.set_position(0);
        let mut warnings = Vec::new();
        let read = Block::read_next(&mut file, orders, HashMode::Use, &mut warnings)
            .unwrap()
            .unwrap();
        let parsed = DataBlock::from_block(&read, orders, registry, &mut warnings).unwrap();
        assert!(warnings.is_empty());
        parsed
    }

    #[test]
    fn non_particle_round_trip_all_types() {
        let orders = ByteOrders::native();
        let registry = CodecRegistry::new();
        let arrays = [
            DataArray::Char(vec!["a".into(), "bb".into(), "".into(), "dddd".into()]),
            DataArray::Int(vec![1, -2, 3, i32::MIN]),
            DataArray::Float(vec![0.5, -1.5, 3.25, f32::MAX]),
            DataArray::Double(vec![0.25, -9.75, 1e300, f64::MIN_POSITIVE]),
        ];
        for array in arrays {
            let block = DataBlock::new(
                BlockId(11000),
                "CUSTOM DATA",
                BlockType::Trajectory,
                2,
                2,
                1,
                0,
                array.clone(),
            )
            .unwrap();
            let parsed = round_trip(&block, orders, &registry);
            assert_eq!(block, parsed);
            assert_eq!(Some(&array), parsed.values.decoded());
        }
    }

    #[test]
    fn stride_shrinks_the_grid() {
        // 10 frames at stride 3 store samples for frames 0, 3, 6, 9.
        let block = DataBlock::new(
            BlockId::BOX_SHAPE,
            "BOX SHAPE",
            BlockType::Trajectory,
            10,
            9,
            3,
            0,
            DataArray::Float(vec![1.0; 4 * 9]),
        )
        .unwrap();
        assert_eq!(4, block.n_stored_frames());
        assert_eq!(36, block.grid_len());
        assert_eq!(2, block.sample_index(7));

        // A wrong grid is rejected up front.
        assert!(matches!(
            DataBlock::new(
                BlockId::BOX_SHAPE,
                "BOX SHAPE",
                BlockType::Trajectory,
                10,
                9,
                3,
                0,
                DataArray::Float(vec![1.0; 10 * 9]),
            ),
            Err(Error::PayloadSize { expected: 36, actual: 90, .. })
        ));
    }

    #[test]
    fn zero_stride_is_critical() {
        for stride in [0, -4] {
            assert!(matches!(
                DataBlock::new(
                    BlockId::POSITIONS,
                    "POSITIONS",
                    BlockType::Trajectory,
                    1,
                    3,
                    stride,
                    0,
                    DataArray::Float(vec![0.0; 3]),
                ),
                Err(Error::InvalidStride { .. })
            ));
        }
    }

    #[test]
    fn non_trajectory_forces_one_frame() {
        let block = DataBlock::new(
            BlockId(9000),
            "GENERAL DATA",
            BlockType::NonTrajectory,
            25,
            2,
            1,
            0,
            DataArray::Int(vec![4, 5]),
        )
        .unwrap();
        assert_eq!(1, block.n_frames);
    }

    #[test]
    fn particle_block_round_trip() {
        let orders = ByteOrders::native();
        let registry = CodecRegistry::new();
        let values: Vec<f32> = (0..2 * 5 * 3).map(|i| i as f32).collect();
        let block = DataBlock::new_particle(
            BlockId::POSITIONS,
            "POSITIONS",
            BlockType::Trajectory,
            2,
            3,
            1,
            100,
            5,
            0,
            DataArray::Float(values),
        )
        .unwrap();
        assert_eq!(15, block.frame_row_len());
        let parsed = round_trip(&block, orders, &registry);
        assert_eq!(block, parsed);
        assert_eq!(
            Some(ParticleRange {
                num_first_particle: 100,
                n_particles: 5
            }),
            parsed.particle
        );
    }

    struct Rot13;

    impl Codec for Rot13 {
        fn encode(&self, _shape: &Shape, raw: &[u8]) -> Result<Vec<u8>> {
            Ok(raw.iter().map(|b| b.wrapping_add(13)).collect())
        }

        fn decode(&self, _shape: &Shape, payload: &[u8]) -> Result<Vec<u8>> {
            Ok(payload.iter().map(|b| b.wrapping_sub(13)).collect())
        }
    }

    #[test]
    fn codec_dispatch_round_trip() {
        let orders = ByteOrders::native();
        let mut registry = CodecRegistry::new();
        registry.register(42, Arc::new(Rot13));
        let block = DataBlock::new(
            BlockId(10010),
            "SCRAMBLED",
            BlockType::Trajectory,
            3,
            2,
            1,
            42,
            DataArray::Int(vec![7; 6]),
        )
        .unwrap();
        let parsed = round_trip(&block, orders, &registry);
        assert_eq!(block, parsed);

        // Without the registration the payload is kept unparsed, minor.
        let framed = block.to_block(orders, &registry).unwrap();
        let mut warnings = Vec::new();
        let opaque =
            DataBlock::from_block(&framed, orders, &CodecRegistry::new(), &mut warnings).unwrap();
        assert_eq!(
            vec![Warning::UnknownCodec {
                id: BlockId(10010),
                codec_id: 42
            }],
            warnings
        );
        assert!(opaque.values.decoded().is_none());
        assert_eq!(DataType::Int, opaque.values.data_type());
    }

    #[test]
    fn slice_frames_splits_rows() {
        let values: Vec<i32> = (0..12).collect();
        let block = DataBlock::new(
            BlockId(10005),
            "COUNTERS",
            BlockType::Trajectory,
            4,
            3,
            1,
            0,
            DataArray::Int(values),
        )
        .unwrap();
        let tail = block.slice_frames(2, 2).unwrap();
        assert_eq!(2, tail.n_frames);
        assert_eq!(Some(&[6, 7, 8, 9, 10, 11][..]), tail.values.decoded().and_then(DataArray::as_int));
        assert!(block.slice_frames(3, 2).is_err());
    }
}
