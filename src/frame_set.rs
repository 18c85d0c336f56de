//! The frame-set container: the file-resident chunk holding the trajectory
//! data for a contiguous range of frames.
//!
//! A frame set is framed by its own block whose content is the fixed
//! fields: first frame, frame count, and the six navigation offsets of the
//! two-level skip list (immediate, medium-stride and long-stride next/prev
//! file positions, 0 at the ends). The blocks that follow it in the file
//! belong to it: a table of contents, zero or more mapping-block +
//! particle-data-block groups, and the particle-independent data blocks of
//! the frame range. Each particle data block belongs to the nearest
//! preceding mapping block; one with no preceding mapping uses the
//! identity mapping implied by its own particle range.

use crate::bytes::ByteOrders;
use crate::data::{DataArray, DataBlock, DataValues, ParticleData, ParticleRange};
use crate::error::{Error, Result, Warning};
use crate::mapping::ParticleMapping;
use crate::schema::blocks::BlockId;
use std::io::{Read, Write};

/// Offsets of the patchable navigation fields within the content.
pub(crate) const NEXT_POS_OFFSET: u64 = 16;
pub(crate) const MEDIUM_NEXT_POS_OFFSET: u64 = 32;
pub(crate) const LONG_NEXT_POS_OFFSET: u64 = 48;

/// A mapping block together with the particle data blocks it translates.
/// `mapping` is `None` for blocks emitted before any mapping block; those
/// use the identity mapping.
#[derive(Debug, Clone, Default)]
pub struct MappingGroup {
    pub mapping: Option<ParticleMapping>,
    pub data_blocks: Vec<DataBlock>,
}

#[derive(Debug, Clone)]
pub struct FrameSet {
    pub first_frame: i64,
    pub n_frames: i64,
    pub next_frame_set_file_pos: i64,
    pub prev_frame_set_file_pos: i64,
    pub medium_stride_next_frame_set_file_pos: i64,
    pub medium_stride_prev_frame_set_file_pos: i64,
    pub long_stride_next_frame_set_file_pos: i64,
    pub long_stride_prev_frame_set_file_pos: i64,
    /// File position of the frame-set block; 0 until written or read.
    pub(crate) file_pos: i64,
    toc: Vec<BlockId>,
    mapping_groups: Vec<MappingGroup>,
    non_particle_data: Vec<DataBlock>,
}

impl FrameSet {
    pub fn new(first_frame: i64, n_frames: i64) -> Result<Self> {
        if first_frame < 0 {
            return Err(Error::InvalidArgument("negative first frame"));
        }
        if n_frames < 1 {
            return Err(Error::InvalidCount {
                id: BlockId::TRAJECTORY_FRAME_SET,
                count: n_frames,
            });
        }
        Ok(Self {
            first_frame,
            n_frames,
            next_frame_set_file_pos: 0,
            prev_frame_set_file_pos: 0,
            medium_stride_next_frame_set_file_pos: 0,
            medium_stride_prev_frame_set_file_pos: 0,
            long_stride_next_frame_set_file_pos: 0,
            long_stride_prev_frame_set_file_pos: 0,
            file_pos: 0,
            toc: Vec::new(),
            mapping_groups: Vec::new(),
            non_particle_data: Vec::new(),
        })
    }

    /// File position this frame set was read from or written to.
    #[must_use]
    pub fn file_pos(&self) -> i64 {
        self.file_pos
    }

    #[must_use]
    pub fn contains_frame(&self, frame: i64) -> bool {
        frame >= self.first_frame && frame < self.first_frame + self.n_frames
    }

    /// Starts a new mapping group. The new table must not claim a global
    /// particle any earlier mapping in this frame set already claims.
    pub fn mapping_add(&mut self, mapping: ParticleMapping) -> Result<()> {
        for group in &self.mapping_groups {
            if let Some(existing) = &group.mapping {
                if let Some(particle) = existing.overlap(&mapping) {
                    return Err(Error::MappingOverlap { particle });
                }
            }
        }
        self.mapping_groups.push(MappingGroup {
            mapping: Some(mapping),
            data_blocks: Vec::new(),
        });
        Ok(())
    }

    /// Attaches a particle data block to the nearest preceding mapping, or
    /// to an identity group when no mapping block was added yet.
    pub fn particle_data_add(&mut self, block: DataBlock) -> Result<()> {
        if block.particle.is_none() {
            return Err(Error::InvalidArgument(
                "particle_data_add needs a particle-dependent block",
            ));
        }
        match self.mapping_groups.last_mut() {
            Some(group) => group.data_blocks.push(block),
            None => self.mapping_groups.push(MappingGroup {
                mapping: None,
                data_blocks: vec![block],
            }),
        }
        Ok(())
    }

    /// Adds a particle-independent data block.
    pub fn data_add(&mut self, block: DataBlock) -> Result<()> {
        if block.particle.is_some() {
            return Err(Error::InvalidArgument(
                "data_add needs a particle-independent block",
            ));
        }
        self.non_particle_data.push(block);
        Ok(())
    }

    #[must_use]
    pub fn mapping_groups(&self) -> &[MappingGroup] {
        &self.mapping_groups
    }

    #[must_use]
    pub fn non_particle_data(&self) -> &[DataBlock] {
        &self.non_particle_data
    }

    /// First particle-independent block with this id.
    #[must_use]
    pub fn data_block(&self, id: BlockId) -> Option<&DataBlock> {
        self.non_particle_data.iter().find(|b| b.id == id)
    }

    /// All particle blocks with this id, paired with their mappings.
    pub fn particle_blocks(
        &self,
        id: BlockId,
    ) -> impl Iterator<Item = (Option<&ParticleMapping>, &DataBlock)> {
        self.mapping_groups.iter().flat_map(move |group| {
            group
                .data_blocks
                .iter()
                .filter(move |b| b.id == id)
                .map(|b| (group.mapping.as_ref(), b))
        })
    }

    /// Ids of every data block in the frame set, in file order. Each of
    /// them appears in the table of contents.
    #[must_use]
    pub fn toc_ids(&self) -> Vec<BlockId> {
        let mut ids = Vec::new();
        let mut push = |id: BlockId| {
            if !ids.contains(&id) {
                ids.push(id);
            }
        };
        for group in &self.mapping_groups {
            for block in &group.data_blocks {
                push(block.id);
            }
        }
        for block in &self.non_particle_data {
            push(block.id);
        }
        ids
    }

    /// The table of contents as read from the file; empty for a frame set
    /// built in memory (the writer regenerates it from the blocks).
    #[must_use]
    pub fn toc(&self) -> &[BlockId] {
        &self.toc
    }

    pub(crate) fn set_toc(&mut self, toc: Vec<BlockId>) {
        self.toc = toc;
    }

    /// Serializes the fixed fields of the frame-set block content.
    pub fn write_contents<W: Write>(&self, w: &mut W, orders: ByteOrders) -> Result<()> {
        orders.write_i64(w, self.first_frame)?;
        orders.write_i64(w, self.n_frames)?;
        orders.write_i64(w, self.next_frame_set_file_pos)?;
        orders.write_i64(w, self.prev_frame_set_file_pos)?;
        orders.write_i64(w, self.medium_stride_next_frame_set_file_pos)?;
        orders.write_i64(w, self.medium_stride_prev_frame_set_file_pos)?;
        orders.write_i64(w, self.long_stride_next_frame_set_file_pos)?;
        orders.write_i64(w, self.long_stride_prev_frame_set_file_pos)?;
        Ok(())
    }

    /// Parses the fixed fields of a frame-set block content read at
    /// `file_pos`.
    pub fn read_contents<R: Read>(r: &mut R, orders: ByteOrders, file_pos: i64) -> Result<Self> {
        let first_frame = orders.read_i64(r)?;
        let n_frames = orders.read_i64(r)?;
        let mut frame_set = Self::new(first_frame, n_frames)?;
        frame_set.next_frame_set_file_pos = orders.read_i64(r)?;
        frame_set.prev_frame_set_file_pos = orders.read_i64(r)?;
        frame_set.medium_stride_next_frame_set_file_pos = orders.read_i64(r)?;
        frame_set.medium_stride_prev_frame_set_file_pos = orders.read_i64(r)?;
        frame_set.long_stride_next_frame_set_file_pos = orders.read_i64(r)?;
        frame_set.long_stride_prev_frame_set_file_pos = orders.read_i64(r)?;
        frame_set.file_pos = file_pos;
        Ok(frame_set)
    }

    /// Serializes a table-of-contents block content.
    pub fn write_toc_contents<W: Write>(
        ids: &[BlockId],
        w: &mut W,
        orders: ByteOrders,
    ) -> Result<()> {
        orders.write_i64(w, ids.len() as i64)?;
        for id in ids {
            orders.write_i64(w, id.raw())?;
        }
        Ok(())
    }

    /// Parses a table-of-contents block content.
    pub fn read_toc_contents<R: Read>(r: &mut R, orders: ByteOrders) -> Result<Vec<BlockId>> {
        let n_blocks = orders.read_i64(r)?;
        if n_blocks < 0 {
            return Err(Error::InvalidCount {
                id: BlockId::BLOCK_TABLE_OF_CONTENTS,
                count: n_blocks,
            });
        }
        let mut ids = Vec::new();
        for _ in 0..n_blocks {
            ids.push(BlockId(orders.read_i64(r)?));
        }
        Ok(ids)
    }

    /// Unions the mapping groups carrying `id` into one real-particle-
    /// numbered 3-D array: frames × particles × values-per-frame, the
    /// particle axis indexed by global numbers starting at the smallest
    /// mapped one. Overlapping claims are critical; unmapped holes inside
    /// the union are default-filled and reported as minor.
    pub fn assemble_particle_data(&self, id: BlockId) -> Result<(ParticleData, Vec<Warning>)> {
        let mut warnings = Vec::new();
        let mut blocks: Vec<(Option<&ParticleMapping>, &DataBlock)> = Vec::new();
        for (mapping, block) in self.particle_blocks(id) {
            match &block.values {
                DataValues::Decoded(_) => blocks.push((mapping, block)),
                DataValues::Opaque { .. } => {
                    return Err(Error::Codec {
                        codec_id: block.codec_id,
                        message: "payload not decoded".to_owned(),
                    });
                }
            }
        }
        let Some(&(_, first_block)) = blocks.first() else {
            return Err(Error::MissingBlock { id });
        };
        let datatype = first_block.data_type();
        let n_values = first_block.n_values_per_frame;
        let stride = first_block.stride_length;
        let n_stored = blocks
            .iter()
            .map(|(_, b)| b.n_stored_frames())
            .max()
            .unwrap_or(0);

        // Resolve every covered row to its global particle number first.
        let mut resolved: Vec<(Vec<i64>, &DataBlock)> = Vec::new();
        for &(mapping, block) in &blocks {
            if block.data_type() != datatype {
                warnings.push(Warning::TypeMismatch {
                    id,
                    expected: datatype,
                    actual: block.data_type(),
                });
                continue;
            }
            let range = block.particle.unwrap_or(ParticleRange {
                num_first_particle: 0,
                n_particles: 0,
            });
            let mut globals = Vec::with_capacity(range.n_particles as usize);
            for i in 0..range.n_particles {
                let slot = range.num_first_particle + i;
                let global = match mapping {
                    Some(mapping) => mapping
                        .to_real(slot - mapping.num_first_particle())
                        .ok_or(Error::InvalidArgument(
                            "data block row outside its mapping table",
                        ))?,
                    None => slot,
                };
                globals.push(global);
            }
            resolved.push((globals, block));
        }

        let min_global = resolved
            .iter()
            .flat_map(|(g, _)| g.iter().copied())
            .min()
            .ok_or(Error::MissingBlock { id })?;
        let max_global = resolved
            .iter()
            .flat_map(|(g, _)| g.iter().copied())
            .max()
            .unwrap_or(min_global);
        let n_out = max_global - min_global + 1;

        let mut claimed = vec![false; n_out as usize];
        let mut values =
            DataArray::default_filled(datatype, (n_stored * n_out * n_values) as usize);
        for (globals, block) in &resolved {
            let array = match &block.values {
                DataValues::Decoded(array) => array,
                DataValues::Opaque { .. } => continue,
            };
            for (i, &global) in globals.iter().enumerate() {
                let out_p = (global - min_global) as usize;
                if claimed[out_p] {
                    return Err(Error::MappingOverlap { particle: global });
                }
                claimed[out_p] = true;
                let block_particles = globals.len();
                for f in 0..block.n_stored_frames().min(n_stored) as usize {
                    let src = (f * block_particles + i) * n_values as usize;
                    let dst = (f * n_out as usize + out_p) * n_values as usize;
                    values.copy_from(dst, array, src, n_values as usize);
                }
            }
        }
        for (i, taken) in claimed.iter().enumerate() {
            if !taken {
                warnings.push(Warning::MappingGap {
                    particle: min_global + i as i64,
                });
            }
        }

        Ok((
            ParticleData {
                n_frames: n_stored,
                num_first_particle: min_global,
                n_particles: n_out,
                n_values_per_frame: n_values,
                stride_length: stride,
                values,
            },
            warnings,
        ))
    }
}
