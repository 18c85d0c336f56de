//! The trajectory session: file lifecycles, the header preamble, frame-set
//! streaming with skip-list maintenance, and the data getters.
//!
//! A session owns its file handles, the topology and the current frame
//! set. A file is a header preamble (endianness block, general info,
//! molecules, trajectory ids and names) followed by a linked sequence of
//! frame sets. On append the writer back-patches the navigation offsets of
//! earlier frame sets and the bookkeeping fields of the general-info
//! block, rewriting the affected content digests; a partial write leaves
//! the predecessors untouched, so a reader always sees a consistent chain
//! ending at the last complete frame set.

use crate::block::{Block, BlockHeader};
use crate::bytes::{ByteOrders, CANONICAL, Endianness32, Endianness64};
use crate::codec::{Codec, CodecRegistry};
use crate::data::{DataArray, DataBlock, DataValues, FrameData, ParticleData, ParticleRange};
use crate::digest::content_digest;
use crate::error::{Error, Result, Status, Warning};
use crate::frame_set::{
    FrameSet, LONG_NEXT_POS_OFFSET, MEDIUM_NEXT_POS_OFFSET, NEXT_POS_OFFSET,
};
use crate::mapping::ParticleMapping;
use crate::schema::blocks::BlockId;
use crate::schema::values::{AtomCountMode, BlockType, HashMode, MAX_STR_LEN};
use crate::topology::{
    AtomHandle, ChainHandle, MoleculeHandle, ResidueHandle, Topology,
};
use byteorder::{ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

const DEFAULT_FRAMES_PER_FRAME_SET: i64 = 100;
const DEFAULT_MEDIUM_STRIDE: i64 = 100;
const DEFAULT_LONG_STRIDE: i64 = 10000;

/// Fixed-size tail of the general-info content, after the nine strings.
const GENERAL_INFO_TAIL: usize = 8 + 1 + 8 + 8 + 8 + 8 + 8 + 8;

#[derive(Debug, Clone)]
struct GeneralInfo {
    first_program_name: String,
    last_program_name: String,
    first_user_name: String,
    last_user_name: String,
    first_computer_name: String,
    last_computer_name: String,
    first_pgp_signature: String,
    last_pgp_signature: String,
    forcefield_name: String,
    /// Creation time, seconds since the Unix epoch.
    time: i64,
    atom_count_mode: AtomCountMode,
    frames_per_frame_set: i64,
    num_frames: i64,
    first_frame_set_file_pos: i64,
    last_frame_set_file_pos: i64,
    medium_stride_length: i64,
    long_stride_length: i64,
}

impl Default for GeneralInfo {
    fn default() -> Self {
        Self {
            first_program_name: String::new(),
            last_program_name: String::new(),
            first_user_name: String::new(),
            last_user_name: String::new(),
            first_computer_name: String::new(),
            last_computer_name: String::new(),
            first_pgp_signature: String::new(),
            last_pgp_signature: String::new(),
            forcefield_name: String::new(),
            time: Utc::now().timestamp(),
            atom_count_mode: AtomCountMode::Constant,
            frames_per_frame_set: DEFAULT_FRAMES_PER_FRAME_SET,
            num_frames: 0,
            first_frame_set_file_pos: 0,
            last_frame_set_file_pos: 0,
            medium_stride_length: DEFAULT_MEDIUM_STRIDE,
            long_stride_length: DEFAULT_LONG_STRIDE,
        }
    }
}

impl GeneralInfo {
    fn write_contents<W: Write>(&self, w: &mut W, orders: ByteOrders) -> Result<()> {
        for name in [
            &self.first_program_name,
            &self.last_program_name,
            &self.first_user_name,
            &self.last_user_name,
            &self.first_computer_name,
            &self.last_computer_name,
            &self.first_pgp_signature,
            &self.last_pgp_signature,
            &self.forcefield_name,
        ] {
            orders.write_string(w, name)?;
        }
        orders.write_i64(w, self.time)?;
        w.write_u8(self.atom_count_mode as u8)?;
        orders.write_i64(w, self.frames_per_frame_set)?;
        orders.write_i64(w, self.num_frames)?;
        orders.write_i64(w, self.first_frame_set_file_pos)?;
        orders.write_i64(w, self.last_frame_set_file_pos)?;
        orders.write_i64(w, self.medium_stride_length)?;
        orders.write_i64(w, self.long_stride_length)?;
        Ok(())
    }

    fn read_contents<R: Read>(
        r: &mut R,
        orders: ByteOrders,
        warnings: &mut Vec<Warning>,
    ) -> Result<Self> {
        let mut strings = Vec::with_capacity(9);
        for _ in 0..9 {
            strings.push(orders.read_string(r, warnings)?);
        }
        let mut strings = strings.into_iter();
        let mut next = || strings.next().unwrap_or_default();
        let mut info = Self {
            first_program_name: next(),
            last_program_name: next(),
            first_user_name: next(),
            last_user_name: next(),
            first_computer_name: next(),
            last_computer_name: next(),
            first_pgp_signature: next(),
            last_pgp_signature: next(),
            forcefield_name: next(),
            ..Self::default()
        };
        info.time = orders.read_i64(r)?;
        let mode_tag = r.read_u8()?;
        info.atom_count_mode = AtomCountMode::try_from(mode_tag)
            .map_err(|_| Error::InvalidArgument("unknown atom-count mode"))?;
        info.frames_per_frame_set = orders.read_i64(r)?;
        info.num_frames = orders.read_i64(r)?;
        info.first_frame_set_file_pos = orders.read_i64(r)?;
        info.last_frame_set_file_pos = orders.read_i64(r)?;
        info.medium_stride_length = orders.read_i64(r)?;
        info.long_stride_length = orders.read_i64(r)?;
        for stride in [info.medium_stride_length, info.long_stride_length] {
            if stride < 1 {
                return Err(Error::InvalidCount {
                    id: BlockId::GENERAL_INFO,
                    count: stride,
                });
            }
        }
        if info.frames_per_frame_set < 1 {
            return Err(Error::InvalidCount {
                id: BlockId::GENERAL_INFO,
                count: info.frames_per_frame_set,
            });
        }
        Ok(info)
    }
}

/// Where a written frame set lives, plus the content copy the writer needs
/// to re-digest after back-patching navigation offsets.
#[derive(Debug, Clone, Copy)]
struct WrittenSet {
    block_pos: u64,
    content_pos: u64,
    contents: [u8; 64],
    hashed: bool,
}

/// The general-info content copy kept for back-patching.
#[derive(Debug, Clone)]
struct GeneralInfoPatch {
    content_pos: u64,
    contents: Vec<u8>,
    hashed: bool,
}

/// A trajectory session.
///
/// Create one with [`Trajectory::new`], point it at files with
/// [`input_file_set`](Self::input_file_set) /
/// [`output_file_set`](Self::output_file_set), then either write a header
/// preamble and append frame sets, or read the headers and scan frame sets.
/// Dropping the session closes the files.
#[derive(Default)]
pub struct Trajectory {
    input_path: Option<PathBuf>,
    input: Option<BufReader<File>>,
    output_path: Option<PathBuf>,
    output: Option<BufWriter<File>>,
    orders: Option<ByteOrders>,
    general: GeneralInfo,
    topology: Topology,
    block_names: BTreeMap<i64, String>,
    non_trajectory_data: Vec<DataBlock>,
    current_frame_set: Option<FrameSet>,
    written_sets: Vec<WrittenSet>,
    /// End of the frame range covered by written frame sets; appends must
    /// not go backwards.
    written_frame_end: i64,
    gi_patch: Option<GeneralInfoPatch>,
    codecs: CodecRegistry,
}

impl Trajectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the path subsequent reads come from, dropping any open handle.
    pub fn input_file_set(&mut self, path: impl Into<PathBuf>) {
        self.input_path = Some(path.into());
        self.input = None;
    }

    /// Sets the path subsequent writes go to, dropping any open handle.
    pub fn output_file_set(&mut self, path: impl Into<PathBuf>) {
        self.output_path = Some(path.into());
        self.output = None;
    }

    /// The declared byte orders; host order until set or read from a file.
    #[must_use]
    pub fn byte_orders(&self) -> ByteOrders {
        self.orders.unwrap_or_else(ByteOrders::native)
    }

    /// Overrides the byte orders the output file is written with.
    pub fn byte_orders_set(&mut self, orders: ByteOrders) {
        self.orders = Some(orders);
    }

    pub fn input_file_pos(&mut self) -> Result<u64> {
        self.ensure_input()?;
        Ok(self.input.as_mut().ok_or(Error::NoInputFile)?.stream_position()?)
    }

    pub fn output_file_pos(&mut self) -> Result<u64> {
        self.ensure_output()?;
        Ok(self
            .output
            .as_mut()
            .ok_or(Error::NoOutputFile)?
            .stream_position()?)
    }

    pub fn input_file_len(&mut self) -> Result<u64> {
        self.ensure_input()?;
        let file = self.input.as_ref().ok_or(Error::NoInputFile)?.get_ref();
        Ok(file.metadata()?.len())
    }

    pub fn codec_register(&mut self, id: i64, codec: Arc<dyn Codec>) {
        self.codecs.register(id, codec);
    }

    // ----- general-info metadata ------------------------------------

    pub fn first_program_name_set(&mut self, name: &str) {
        self.general.first_program_name = capped(name);
    }

    pub fn last_program_name_set(&mut self, name: &str) {
        self.general.last_program_name = capped(name);
    }

    pub fn first_user_name_set(&mut self, name: &str) {
        self.general.first_user_name = capped(name);
    }

    pub fn last_user_name_set(&mut self, name: &str) {
        self.general.last_user_name = capped(name);
    }

    pub fn first_computer_name_set(&mut self, name: &str) {
        self.general.first_computer_name = capped(name);
    }

    pub fn last_computer_name_set(&mut self, name: &str) {
        self.general.last_computer_name = capped(name);
    }

    pub fn first_signature_set(&mut self, signature: &str) {
        self.general.first_pgp_signature = capped(signature);
    }

    pub fn last_signature_set(&mut self, signature: &str) {
        self.general.last_pgp_signature = capped(signature);
    }

    pub fn forcefield_name_set(&mut self, name: &str) {
        self.general.forcefield_name = capped(name);
    }

    #[must_use]
    pub fn first_program_name(&self) -> &str {
        &self.general.first_program_name
    }

    #[must_use]
    pub fn last_program_name(&self) -> &str {
        &self.general.last_program_name
    }

    #[must_use]
    pub fn first_user_name(&self) -> &str {
        &self.general.first_user_name
    }

    #[must_use]
    pub fn last_user_name(&self) -> &str {
        &self.general.last_user_name
    }

    #[must_use]
    pub fn first_computer_name(&self) -> &str {
        &self.general.first_computer_name
    }

    #[must_use]
    pub fn last_computer_name(&self) -> &str {
        &self.general.last_computer_name
    }

    #[must_use]
    pub fn first_signature(&self) -> &str {
        &self.general.first_pgp_signature
    }

    #[must_use]
    pub fn last_signature(&self) -> &str {
        &self.general.last_pgp_signature
    }

    #[must_use]
    pub fn forcefield_name(&self) -> &str {
        &self.general.forcefield_name
    }

    #[must_use]
    pub fn medium_stride_length(&self) -> i64 {
        self.general.medium_stride_length
    }

    pub fn medium_stride_length_set(&mut self, length: i64) -> Result<()> {
        if length < 1 {
            return Err(Error::InvalidArgument("stride length must be at least 1"));
        }
        self.general.medium_stride_length = length;
        Ok(())
    }

    #[must_use]
    pub fn long_stride_length(&self) -> i64 {
        self.general.long_stride_length
    }

    pub fn long_stride_length_set(&mut self, length: i64) -> Result<()> {
        if length < 1 {
            return Err(Error::InvalidArgument("stride length must be at least 1"));
        }
        self.general.long_stride_length = length;
        Ok(())
    }

    #[must_use]
    pub fn num_frames_per_frame_set(&self) -> i64 {
        self.general.frames_per_frame_set
    }

    pub fn num_frames_per_frame_set_set(&mut self, n: i64) -> Result<()> {
        if n < 1 {
            return Err(Error::InvalidArgument(
                "frames per frame set must be at least 1",
            ));
        }
        self.general.frames_per_frame_set = n;
        Ok(())
    }

    /// Total frames covered by written or read frame sets.
    #[must_use]
    pub fn num_frames(&self) -> i64 {
        self.general.num_frames
    }

    #[must_use]
    pub fn atom_count_mode(&self) -> AtomCountMode {
        self.general.atom_count_mode
    }

    pub fn atom_count_mode_set(&mut self, mode: AtomCountMode) {
        self.general.atom_count_mode = mode;
    }

    /// Creation time, seconds since the Unix epoch.
    #[must_use]
    pub fn creation_time(&self) -> i64 {
        self.general.time
    }

    /// The creation time as an ISO-8601 string.
    #[must_use]
    pub fn time_str(&self) -> String {
        match DateTime::<Utc>::from_timestamp(self.general.time, 0) {
            Some(time) => time.format("%Y-%m-%dT%H:%M:%S").to_string(),
            None => String::new(),
        }
    }

    // ----- topology -------------------------------------------------

    #[must_use]
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    pub fn molecule_add(&mut self, name: &str) -> MoleculeHandle {
        self.topology.molecule_add(name)
    }

    pub fn molecule_chain_add(&mut self, mol: MoleculeHandle, name: &str) -> ChainHandle {
        self.topology.chain_add(mol, name)
    }

    pub fn chain_residue_add(&mut self, chain: ChainHandle, name: &str) -> ResidueHandle {
        self.topology.residue_add(chain, name)
    }

    pub fn residue_atom_add(
        &mut self,
        residue: ResidueHandle,
        name: &str,
        atom_type: &str,
    ) -> AtomHandle {
        self.topology.atom_add(residue, name, atom_type)
    }

    pub fn molecule_cnt_set(&mut self, mol: MoleculeHandle, count: i64) -> Result<()> {
        self.topology.molecule_count_set(mol, count)
    }

    #[must_use]
    pub fn molecule_cnt(&self, mol: MoleculeHandle) -> i64 {
        self.topology.molecule_count(mol)
    }

    /// The particle count in effect: the per-frame-set count when the
    /// session allows variable atom counts and the current frame set
    /// carries mappings, the topological total otherwise.
    #[must_use]
    pub fn num_particles(&self) -> i64 {
        if self.general.atom_count_mode == AtomCountMode::Variable {
            if let Some(frame_set) = &self.current_frame_set {
                let mapped: i64 = frame_set
                    .mapping_groups()
                    .iter()
                    .filter_map(|g| g.mapping.as_ref())
                    .map(ParticleMapping::n_particles)
                    .sum();
                if mapped > 0 {
                    return mapped;
                }
            }
        }
        self.topology.num_particles()
    }

    /// Total molecule instances across all templates.
    #[must_use]
    pub fn num_molecules(&self) -> i64 {
        self.topology.num_molecules()
    }

    // ----- header preamble ------------------------------------------

    /// Writes the header preamble at the start of the output file:
    /// endianness block, general info, molecules, trajectory ids and
    /// names, then any non-trajectory data blocks.
    pub fn file_headers_write(&mut self, hash_mode: HashMode) -> Result<Status> {
        self.ensure_output()?;
        let orders = self.byte_orders();
        let out = self.output.as_mut().ok_or(Error::NoOutputFile)?;
        out.seek(SeekFrom::Start(0))?;

        let mut contents = Vec::new();
        CANONICAL.write_u32(&mut contents, orders.b32 as u32)?;
        CANONICAL.write_u32(&mut contents, orders.b64 as u32)?;
        CANONICAL.write_u64(&mut contents, MAX_STR_LEN as u64)?;
        Block::new(
            BlockId::ENDIANNESS_AND_STRING_LENGTH,
            "ENDIANNESS AND STRING LENGTH",
            BlockType::NonTrajectory,
            contents,
        )
        .write(out, CANONICAL, hash_mode)?;

        let mut contents = Vec::new();
        self.general.write_contents(&mut contents, orders)?;
        let gi_contents = contents.clone();
        let mut block = Block::new(
            BlockId::GENERAL_INFO,
            "GENERAL INFO",
            BlockType::NonTrajectory,
            contents,
        );
        block.write(out, orders, hash_mode)?;
        let content_pos = out.stream_position()? - gi_contents.len() as u64;
        self.gi_patch = Some(GeneralInfoPatch {
            content_pos,
            contents: gi_contents,
            hashed: hash_mode == HashMode::Use,
        });

        let mut contents = Vec::new();
        self.topology.write_contents(&mut contents, orders)?;
        Block::new(
            BlockId::MOLECULES,
            "MOLECULES",
            BlockType::NonTrajectory,
            contents,
        )
        .write(out, orders, hash_mode)?;

        let mut contents = Vec::new();
        orders.write_i64(&mut contents, self.block_names.len() as i64)?;
        for (id, name) in &self.block_names {
            orders.write_i64(&mut contents, *id)?;
            orders.write_string(&mut contents, name)?;
        }
        Block::new(
            BlockId::TRAJECTORY_IDS_AND_NAMES,
            "TRAJECTORY IDS AND NAMES",
            BlockType::NonTrajectory,
            contents,
        )
        .write(out, orders, hash_mode)?;

        for data_block in &self.non_trajectory_data {
            data_block
                .to_block(orders, &self.codecs)?
                .write(out, orders, hash_mode)?;
        }
        out.flush()?;
        debug!("wrote header preamble to {:?}", self.output_path);
        Ok(Status::Success)
    }

    /// Reads the header preamble from the input file, leaving the read
    /// cursor at the first frame set (or at the end of a frame-set-free
    /// file).
    pub fn file_headers_read(&mut self, hash_mode: HashMode) -> Result<Status> {
        self.ensure_input()?;
        let inp = self.input.as_mut().ok_or(Error::NoInputFile)?;
        inp.seek(SeekFrom::Start(0))?;
        let mut warnings = Vec::new();

        let header = BlockHeader::read_next(inp, CANONICAL, &mut warnings)?
            .ok_or(Error::TruncatedBlock { offset: 0 })?;
        if header.id != BlockId::ENDIANNESS_AND_STRING_LENGTH {
            return Err(Error::NotTngFormat {
                offset: header.offset,
                id: header.id,
            });
        }
        let block = header.read_block(inp, hash_mode, &mut warnings)?;
        let mut r = block.contents.as_slice();
        let tag32 = CANONICAL.read_u32(&mut r)?;
        let tag64 = CANONICAL.read_u32(&mut r)?;
        let orders = ByteOrders {
            b32: Endianness32::try_from(tag32)
                .map_err(|_| Error::UnknownEndianness { tag: tag32 })?,
            b64: Endianness64::try_from(tag64)
                .map_err(|_| Error::UnknownEndianness { tag: tag64 })?,
        };
        // The declared maximum string length; this build caps at its own.
        let _max_str_len = CANONICAL.read_u64(&mut r)?;
        self.orders = Some(orders);

        loop {
            let pos = inp.stream_position()?;
            let Some(header) = BlockHeader::read_next(inp, orders, &mut warnings)? else {
                break;
            };
            if header.id == BlockId::TRAJECTORY_FRAME_SET {
                inp.seek(SeekFrom::Start(pos))?;
                if self.general.first_frame_set_file_pos == 0 {
                    self.general.first_frame_set_file_pos = pos as i64;
                }
                break;
            }
            let block = header.read_block(inp, hash_mode, &mut warnings)?;
            match block.id {
                BlockId::GENERAL_INFO => {
                    self.general = GeneralInfo::read_contents(
                        &mut block.contents.as_slice(),
                        orders,
                        &mut warnings,
                    )?;
                }
                BlockId::MOLECULES => {
                    self.topology = Topology::read_contents(
                        &mut block.contents.as_slice(),
                        orders,
                        &mut warnings,
                    )?;
                }
                BlockId::TRAJECTORY_IDS_AND_NAMES => {
                    let mut r = block.contents.as_slice();
                    let n_entries = orders.read_i64(&mut r)?;
                    if n_entries < 0 {
                        return Err(Error::InvalidCount {
                            id: BlockId::TRAJECTORY_IDS_AND_NAMES,
                            count: n_entries,
                        });
                    }
                    self.block_names.clear();
                    for _ in 0..n_entries {
                        let id = orders.read_i64(&mut r)?;
                        let name = orders.read_string(&mut r, &mut warnings)?;
                        self.block_names.insert(id, name);
                    }
                }
                _ => match DataBlock::from_block(&block, orders, &self.codecs, &mut warnings) {
                    Ok(data_block) => self.non_trajectory_data.push(data_block),
                    // The content is fully in memory here, so a short read
                    // means a malformed block, not an I/O failure.
                    Err(Error::Io(err)) if err.kind() != io::ErrorKind::UnexpectedEof => {
                        return Err(Error::Io(err));
                    }
                    Err(_) => warnings.push(Warning::UnknownBlock {
                        id: block.id,
                        offset: pos,
                    }),
                },
            }
        }
        Ok(Status::from_warnings(warnings))
    }

    // ----- frame sets -----------------------------------------------

    /// Starts a fresh current frame set covering
    /// `[first_frame, first_frame + n_frames)`.
    pub fn frame_set_new(&mut self, first_frame: i64, n_frames: i64) -> Result<()> {
        self.current_frame_set = Some(FrameSet::new(first_frame, n_frames)?);
        Ok(())
    }

    #[must_use]
    pub fn current_frame_set(&self) -> Option<&FrameSet> {
        self.current_frame_set.as_ref()
    }

    /// File position of the frame set after the current one; 0 at the end.
    #[must_use]
    pub fn frame_set_next_frame_set_file_pos(&self) -> i64 {
        self.current_frame_set
            .as_ref()
            .map_or(0, |fs| fs.next_frame_set_file_pos)
    }

    /// File position of the frame set before the current one; 0 at the
    /// start.
    #[must_use]
    pub fn frame_set_prev_frame_set_file_pos(&self) -> i64 {
        self.current_frame_set
            .as_ref()
            .map_or(0, |fs| fs.prev_frame_set_file_pos)
    }

    /// Medium-stride skip-list position after the current frame set.
    #[must_use]
    pub fn frame_set_medium_stride_next_frame_set_file_pos(&self) -> i64 {
        self.current_frame_set
            .as_ref()
            .map_or(0, |fs| fs.medium_stride_next_frame_set_file_pos)
    }

    /// Medium-stride skip-list position before the current frame set.
    #[must_use]
    pub fn frame_set_medium_stride_prev_frame_set_file_pos(&self) -> i64 {
        self.current_frame_set
            .as_ref()
            .map_or(0, |fs| fs.medium_stride_prev_frame_set_file_pos)
    }

    /// Long-stride skip-list position after the current frame set.
    #[must_use]
    pub fn frame_set_long_stride_next_frame_set_file_pos(&self) -> i64 {
        self.current_frame_set
            .as_ref()
            .map_or(0, |fs| fs.long_stride_next_frame_set_file_pos)
    }

    /// Long-stride skip-list position before the current frame set.
    #[must_use]
    pub fn frame_set_long_stride_prev_frame_set_file_pos(&self) -> i64 {
        self.current_frame_set
            .as_ref()
            .map_or(0, |fs| fs.long_stride_prev_frame_set_file_pos)
    }

    /// Adds a particle-independent data block. Trajectory blocks go into
    /// the current frame set; non-trajectory blocks attach to the session
    /// and are written with the headers.
    #[allow(clippy::too_many_arguments)]
    pub fn data_block_add(
        &mut self,
        id: BlockId,
        block_name: &str,
        block_type: BlockType,
        n_frames: i64,
        n_values_per_frame: i64,
        stride_length: i64,
        codec_id: i64,
        values: DataArray,
    ) -> Result<()> {
        let block = DataBlock::new(
            id,
            block_name,
            block_type,
            n_frames,
            n_values_per_frame,
            stride_length,
            codec_id,
            values,
        )?;
        self.block_names.insert(id.raw(), block_name.to_owned());
        match block_type {
            BlockType::NonTrajectory => {
                self.non_trajectory_data.push(block);
                Ok(())
            }
            BlockType::Trajectory => self
                .current_frame_set
                .as_mut()
                .ok_or(Error::InvalidArgument(
                    "no current frame set; call frame_set_new first",
                ))?
                .data_add(block),
        }
    }

    /// Adds a particle-dependent data block covering `n_particles` rows
    /// starting at local slot `first_particle_number`.
    #[allow(clippy::too_many_arguments)]
    pub fn particle_data_block_add(
        &mut self,
        id: BlockId,
        block_name: &str,
        block_type: BlockType,
        n_frames: i64,
        n_values_per_frame: i64,
        stride_length: i64,
        first_particle_number: i64,
        n_particles: i64,
        codec_id: i64,
        values: DataArray,
    ) -> Result<()> {
        let block = DataBlock::new_particle(
            id,
            block_name,
            block_type,
            n_frames,
            n_values_per_frame,
            stride_length,
            first_particle_number,
            n_particles,
            codec_id,
            values,
        )?;
        self.block_names.insert(id.raw(), block_name.to_owned());
        match block_type {
            BlockType::NonTrajectory => {
                self.non_trajectory_data.push(block);
                Ok(())
            }
            BlockType::Trajectory => self
                .current_frame_set
                .as_mut()
                .ok_or(Error::InvalidArgument(
                    "no current frame set; call frame_set_new first",
                ))?
                .particle_data_add(block),
        }
    }

    /// Adds a particle mapping table to the current frame set. The data
    /// blocks added afterwards belong to it.
    pub fn particle_mapping_add(
        &mut self,
        first_particle_number: i64,
        n_particles: i64,
        mapping_table: &[i64],
    ) -> Result<()> {
        if n_particles != mapping_table.len() as i64 {
            return Err(Error::InvalidArgument(
                "mapping table length disagrees with the particle count",
            ));
        }
        let mapping = ParticleMapping::new(first_particle_number, mapping_table.to_vec())?;
        self.current_frame_set
            .as_mut()
            .ok_or(Error::InvalidArgument(
                "no current frame set; call frame_set_new first",
            ))?
            .mapping_add(mapping)
    }

    /// Appends the current frame set to the output file: the frame-set
    /// block, its table of contents, each mapping block followed by its
    /// particle data blocks, then the particle-independent blocks. The
    /// predecessors' next offsets and the general-info bookkeeping are
    /// back-patched, re-digesting the patched contents.
    pub fn frame_set_write(&mut self, hash_mode: HashMode) -> Result<Status> {
        self.ensure_output()?;
        let orders = self.byte_orders();
        let medium = self.general.medium_stride_length as usize;
        let long = self.general.long_stride_length as usize;
        let index = self.written_sets.len();

        let frame_set = self
            .current_frame_set
            .as_mut()
            .ok_or(Error::InvalidArgument(
                "no current frame set; call frame_set_new first",
            ))?;
        // Frame sets are totally ordered by byte position and by ascending
        // first-frame index.
        if frame_set.first_frame < self.written_frame_end {
            return Err(Error::InvalidArgument(
                "frame sets must be appended in ascending frame order",
            ));
        }
        let out = self.output.as_mut().ok_or(Error::NoOutputFile)?;

        let pos = out.seek(SeekFrom::End(0))?;
        frame_set.file_pos = pos as i64;
        frame_set.prev_frame_set_file_pos = self.general.last_frame_set_file_pos;
        frame_set.medium_stride_prev_frame_set_file_pos = index
            .checked_sub(medium)
            .map_or(0, |i| self.written_sets[i].block_pos as i64);
        frame_set.long_stride_prev_frame_set_file_pos = index
            .checked_sub(long)
            .map_or(0, |i| self.written_sets[i].block_pos as i64);
        frame_set.next_frame_set_file_pos = 0;
        frame_set.medium_stride_next_frame_set_file_pos = 0;
        frame_set.long_stride_next_frame_set_file_pos = 0;

        let mut contents = Vec::with_capacity(64);
        frame_set.write_contents(&mut contents, orders)?;
        let mut fs_contents = [0u8; 64];
        fs_contents.copy_from_slice(&contents);
        Block::new(
            BlockId::TRAJECTORY_FRAME_SET,
            "TRAJECTORY FRAME SET",
            BlockType::Trajectory,
            contents,
        )
        .write(out, orders, hash_mode)?;
        let content_pos = out.stream_position()? - 64;

        let mut contents = Vec::new();
        FrameSet::write_toc_contents(&frame_set.toc_ids(), &mut contents, orders)?;
        Block::new(
            BlockId::BLOCK_TABLE_OF_CONTENTS,
            "BLOCK TABLE OF CONTENTS",
            BlockType::Trajectory,
            contents,
        )
        .write(out, orders, hash_mode)?;

        for group in frame_set.mapping_groups() {
            if let Some(mapping) = &group.mapping {
                let mut contents = Vec::new();
                mapping.write_contents(&mut contents, orders)?;
                Block::new(
                    BlockId::PARTICLE_MAPPING,
                    "PARTICLE MAPPING",
                    BlockType::Trajectory,
                    contents,
                )
                .write(out, orders, hash_mode)?;
            }
            for data_block in &group.data_blocks {
                data_block
                    .to_block(orders, &self.codecs)?
                    .write(out, orders, hash_mode)?;
            }
        }
        for data_block in frame_set.non_particle_data() {
            data_block
                .to_block(orders, &self.codecs)?
                .write(out, orders, hash_mode)?;
        }

        // Back-patch the skip list.
        if let Some(prev) = self.written_sets.last_mut() {
            patch_set_field(out, orders, prev, NEXT_POS_OFFSET, pos as i64)?;
        }
        if let Some(i) = index.checked_sub(medium) {
            patch_set_field(
                out,
                orders,
                &mut self.written_sets[i],
                MEDIUM_NEXT_POS_OFFSET,
                pos as i64,
            )?;
        }
        if let Some(i) = index.checked_sub(long) {
            patch_set_field(
                out,
                orders,
                &mut self.written_sets[i],
                LONG_NEXT_POS_OFFSET,
                pos as i64,
            )?;
        }

        // Back-patch the general-info bookkeeping.
        self.general.num_frames = self
            .general
            .num_frames
            .max(frame_set.first_frame + frame_set.n_frames);
        if self.general.first_frame_set_file_pos == 0 {
            self.general.first_frame_set_file_pos = pos as i64;
        }
        self.general.last_frame_set_file_pos = pos as i64;
        if let Some(patch) = &mut self.gi_patch {
            let tail = patch.contents.len() - GENERAL_INFO_TAIL;
            let num_frames_off = tail + 8 + 1 + 8;
            patch_bytes(
                out,
                orders,
                &mut patch.contents,
                patch.content_pos,
                num_frames_off,
                self.general.num_frames,
            )?;
            patch_bytes(
                out,
                orders,
                &mut patch.contents,
                patch.content_pos,
                num_frames_off + 8,
                self.general.first_frame_set_file_pos,
            )?;
            patch_bytes(
                out,
                orders,
                &mut patch.contents,
                patch.content_pos,
                num_frames_off + 16,
                self.general.last_frame_set_file_pos,
            )?;
            if patch.hashed {
                rewrite_digest(out, patch.content_pos, &patch.contents)?;
            }
        }

        out.seek(SeekFrom::End(0))?;
        out.flush()?;
        self.written_frame_end = frame_set.first_frame + frame_set.n_frames;
        self.written_sets.push(WrittenSet {
            block_pos: pos,
            content_pos,
            contents: fs_contents,
            hashed: hash_mode == HashMode::Use,
        });
        debug!(
            "wrote frame set {} (frames {}..{}) at offset {pos}",
            index,
            frame_set.first_frame,
            frame_set.first_frame + frame_set.n_frames
        );
        Ok(Status::Success)
    }

    /// Reads the next frame set at the input cursor, with its table of
    /// contents, mapping groups and data blocks. Returns `Ok(None)` at a
    /// clean end of file; the cursor is left at the following frame set.
    pub fn frame_set_read_next(&mut self, hash_mode: HashMode) -> Result<Option<Status>> {
        self.ensure_input()?;
        let orders = self.byte_orders();
        let inp = self.input.as_mut().ok_or(Error::NoInputFile)?;
        let mut warnings = Vec::new();

        let Some(header) = BlockHeader::read_next(inp, orders, &mut warnings)? else {
            return Ok(None);
        };
        if header.id != BlockId::TRAJECTORY_FRAME_SET {
            return Err(Error::NotAFrameSet {
                offset: header.offset,
                id: header.id,
            });
        }
        let file_pos = header.offset;
        let block = header.read_block(inp, hash_mode, &mut warnings)?;
        let mut frame_set =
            FrameSet::read_contents(&mut block.contents.as_slice(), orders, file_pos as i64)?;

        loop {
            let pos = inp.stream_position()?;
            let Some(header) = BlockHeader::read_next(inp, orders, &mut warnings)? else {
                break;
            };
            if header.id == BlockId::TRAJECTORY_FRAME_SET {
                inp.seek(SeekFrom::Start(pos))?;
                break;
            }
            let block = header.read_block(inp, hash_mode, &mut warnings)?;
            match block.id {
                BlockId::BLOCK_TABLE_OF_CONTENTS => {
                    frame_set.set_toc(FrameSet::read_toc_contents(
                        &mut block.contents.as_slice(),
                        orders,
                    )?);
                }
                BlockId::PARTICLE_MAPPING => {
                    let mapping =
                        ParticleMapping::read_contents(&mut block.contents.as_slice(), orders)?;
                    frame_set.mapping_add(mapping)?;
                }
                _ => match DataBlock::from_block(&block, orders, &self.codecs, &mut warnings) {
                    Ok(data_block) if data_block.particle.is_some() => {
                        frame_set.particle_data_add(data_block)?;
                    }
                    Ok(data_block) => frame_set.data_add(data_block)?,
                    Err(Error::Io(err)) if err.kind() != io::ErrorKind::UnexpectedEof => {
                        return Err(Error::Io(err));
                    }
                    Err(_) => warnings.push(Warning::UnknownBlock {
                        id: block.id,
                        offset: pos,
                    }),
                },
            }
        }
        self.general.num_frames = self
            .general
            .num_frames
            .max(frame_set.first_frame + frame_set.n_frames);
        self.current_frame_set = Some(frame_set);
        Ok(Some(Status::from_warnings(warnings)))
    }

    /// Reads the next block of any kind at the input cursor, without
    /// interpreting its content. `Ok(None)` at a clean end of file.
    pub fn block_read_next(&mut self, hash_mode: HashMode) -> Result<Option<(Block, Status)>> {
        self.ensure_input()?;
        let orders = self.byte_orders();
        let inp = self.input.as_mut().ok_or(Error::NoInputFile)?;
        let mut warnings = Vec::new();
        Ok(Block::read_next(inp, orders, hash_mode, &mut warnings)?
            .map(|block| (block, Status::from_warnings(warnings))))
    }

    // ----- data getters ---------------------------------------------

    /// Particle-independent data of `block_id` from the last-read frame
    /// set, falling back to the session's non-trajectory data.
    pub fn data_get(&self, block_id: BlockId) -> Result<FrameData> {
        let block = self
            .current_frame_set
            .as_ref()
            .and_then(|fs| fs.data_block(block_id))
            .or_else(|| {
                self.non_trajectory_data
                    .iter()
                    .find(|b| b.id == block_id && b.particle.is_none())
            })
            .ok_or(Error::MissingBlock { id: block_id })?;
        let array = match &block.values {
            DataValues::Decoded(array) => array.clone(),
            DataValues::Opaque { .. } => {
                return Err(Error::Codec {
                    codec_id: block.codec_id,
                    message: "payload not decoded".to_owned(),
                });
            }
        };
        Ok(FrameData {
            n_frames: block.n_stored_frames(),
            n_values_per_frame: block.n_values_per_frame,
            stride_length: block.stride_length,
            values: array,
        })
    }

    /// Particle data of `block_id` from the last-read frame set, unioned
    /// across its mapping groups and indexed by real particle numbers.
    pub fn particle_data_get(&self, block_id: BlockId) -> Result<(ParticleData, Status)> {
        if let Some(frame_set) = &self.current_frame_set {
            if frame_set.particle_blocks(block_id).next().is_some() {
                let (data, warnings) = frame_set.assemble_particle_data(block_id)?;
                return Ok((data, Status::from_warnings(warnings)));
            }
        }
        let block = self
            .non_trajectory_data
            .iter()
            .find(|b| b.id == block_id && b.particle.is_some())
            .ok_or(Error::MissingBlock { id: block_id })?;
        let array = block
            .values
            .decoded()
            .ok_or(Error::Codec {
                codec_id: block.codec_id,
                message: "payload not decoded".to_owned(),
            })?
            .clone();
        let range = block.particle.unwrap_or(ParticleRange {
            num_first_particle: 0,
            n_particles: 0,
        });
        Ok((
            ParticleData {
                n_frames: block.n_stored_frames(),
                num_first_particle: range.num_first_particle,
                n_particles: range.n_particles,
                n_values_per_frame: block.n_values_per_frame,
                stride_length: block.stride_length,
                values: array,
            },
            Status::Success,
        ))
    }

    // ----- interval operations --------------------------------------

    /// Reads every frame set overlapping `[start_frame, end_frame]`,
    /// locating the first through the navigation skip list. The frame set
    /// containing `end_frame` is left as the current one.
    pub fn frame_read_interval(
        &mut self,
        start_frame: i64,
        end_frame: i64,
        hash_mode: HashMode,
    ) -> Result<Status> {
        check_interval(start_frame, end_frame)?;
        let mut warnings = take_warnings(self.seek_frame_set_containing(start_frame, hash_mode)?);
        loop {
            let covered = self
                .current_frame_set
                .as_ref()
                .map_or(false, |fs| fs.first_frame + fs.n_frames > end_frame);
            if covered {
                break;
            }
            match self.frame_set_read_next(hash_mode)? {
                Some(status) => warnings.extend(take_warnings(status)),
                None => return Err(Error::FrameOutOfRange { frame: end_frame }),
            }
        }
        Ok(Status::from_warnings(warnings))
    }

    /// Reads `block_id` over `[start_frame, end_frame]` across frame-set
    /// boundaries and assembles one 2-D array with a row per frame (the
    /// most recent sample fills the rows a stride skips). Frame sets
    /// lacking the block contribute default rows and a minor warning.
    pub fn data_interval_get(
        &mut self,
        block_id: BlockId,
        start_frame: i64,
        end_frame: i64,
        hash_mode: HashMode,
    ) -> Result<(FrameData, Status)> {
        check_interval(start_frame, end_frame)?;
        let mut warnings = take_warnings(self.seek_frame_set_containing(start_frame, hash_mode)?);
        let n_out = end_frame - start_frame + 1;
        let mut out: Option<FrameData> = None;

        loop {
            let frame_set = self
                .current_frame_set
                .as_ref()
                .ok_or(Error::FrameOutOfRange { frame: start_frame })?;
            let covers_end = frame_set.first_frame + frame_set.n_frames > end_frame;
            match frame_set.data_block(block_id) {
                Some(block) => {
                    let array = block.values.decoded().ok_or(Error::Codec {
                        codec_id: block.codec_id,
                        message: "payload not decoded".to_owned(),
                    })?;
                    let result = out.get_or_insert_with(|| FrameData {
                        n_frames: n_out,
                        n_values_per_frame: block.n_values_per_frame,
                        stride_length: 1,
                        values: DataArray::default_filled(
                            block.data_type(),
                            (n_out * block.n_values_per_frame) as usize,
                        ),
                    });
                    if block.data_type() != result.values.data_type() {
                        warnings.push(Warning::TypeMismatch {
                            id: block_id,
                            expected: result.values.data_type(),
                            actual: block.data_type(),
                        });
                    } else if block.n_values_per_frame != result.n_values_per_frame {
                        return Err(Error::InvalidArgument(
                            "values per frame changed between frame sets",
                        ));
                    } else {
                        let n_values = block.n_values_per_frame as usize;
                        let from = start_frame.max(frame_set.first_frame);
                        let to = end_frame.min(frame_set.first_frame + frame_set.n_frames - 1);
                        for frame in from..=to {
                            let sample = block.sample_index(frame - frame_set.first_frame);
                            result.values.copy_from(
                                (frame - start_frame) as usize * n_values,
                                array,
                                sample as usize * n_values,
                                n_values,
                            );
                        }
                    }
                }
                None => warnings.push(Warning::BlockNotPresent {
                    id: block_id,
                    first_frame: frame_set.first_frame,
                }),
            }
            if covers_end {
                break;
            }
            match self.frame_set_read_next(hash_mode)? {
                Some(status) => warnings.extend(take_warnings(status)),
                None => return Err(Error::FrameOutOfRange { frame: end_frame }),
            }
        }
        let data = out.ok_or(Error::MissingBlock { id: block_id })?;
        Ok((data, Status::from_warnings(warnings)))
    }

    /// Reads particle data of `block_id` over `[start_frame, end_frame]`
    /// for real particle numbers `[first_particle, last_particle]`,
    /// assembling one 3-D array with a row group per frame.
    pub fn particle_data_interval_get(
        &mut self,
        block_id: BlockId,
        start_frame: i64,
        end_frame: i64,
        first_particle: i64,
        last_particle: i64,
        hash_mode: HashMode,
    ) -> Result<(ParticleData, Status)> {
        check_interval(start_frame, end_frame)?;
        if first_particle < 0 || last_particle < first_particle {
            return Err(Error::InvalidArgument("invalid particle interval"));
        }
        let mut warnings = take_warnings(self.seek_frame_set_containing(start_frame, hash_mode)?);
        let n_out_frames = end_frame - start_frame + 1;
        let n_out_particles = last_particle - first_particle + 1;
        let mut out: Option<ParticleData> = None;

        loop {
            let frame_set = self
                .current_frame_set
                .as_ref()
                .ok_or(Error::FrameOutOfRange { frame: start_frame })?;
            let covers_end = frame_set.first_frame + frame_set.n_frames > end_frame;
            let first_frame = frame_set.first_frame;
            let n_frames = frame_set.n_frames;
            if frame_set.particle_blocks(block_id).next().is_none() {
                warnings.push(Warning::BlockNotPresent {
                    id: block_id,
                    first_frame,
                });
            } else {
                let (set_data, set_warnings) = frame_set.assemble_particle_data(block_id)?;
                warnings.extend(set_warnings);
                let result = out.get_or_insert_with(|| ParticleData {
                    n_frames: n_out_frames,
                    num_first_particle: first_particle,
                    n_particles: n_out_particles,
                    n_values_per_frame: set_data.n_values_per_frame,
                    stride_length: 1,
                    values: DataArray::default_filled(
                        set_data.values.data_type(),
                        (n_out_frames * n_out_particles * set_data.n_values_per_frame) as usize,
                    ),
                });
                if set_data.values.data_type() != result.values.data_type() {
                    warnings.push(Warning::TypeMismatch {
                        id: block_id,
                        expected: result.values.data_type(),
                        actual: set_data.values.data_type(),
                    });
                } else if set_data.n_values_per_frame != result.n_values_per_frame {
                    return Err(Error::InvalidArgument(
                        "values per frame changed between frame sets",
                    ));
                } else {
                    let n_values = result.n_values_per_frame;
                    let from = start_frame.max(first_frame);
                    let to = end_frame.min(first_frame + n_frames - 1);
                    let p_from = first_particle.max(set_data.num_first_particle);
                    let p_to =
                        last_particle.min(set_data.num_first_particle + set_data.n_particles - 1);
                    for frame in from..=to {
                        let sample = (frame - first_frame) / set_data.stride_length;
                        for particle in p_from..=p_to {
                            let src = set_data.value_index(
                                sample,
                                particle - set_data.num_first_particle,
                                0,
                            );
                            let dst = result.value_index(
                                frame - start_frame,
                                particle - first_particle,
                                0,
                            );
                            result
                                .values
                                .copy_from(dst, &set_data.values, src, n_values as usize);
                        }
                    }
                }
            }
            if covers_end {
                break;
            }
            match self.frame_set_read_next(hash_mode)? {
                Some(status) => warnings.extend(take_warnings(status)),
                None => return Err(Error::FrameOutOfRange { frame: end_frame }),
            }
        }
        let data = out.ok_or(Error::MissingBlock { id: block_id })?;
        Ok((data, Status::from_warnings(warnings)))
    }

    /// Writes the staged current frame set as consecutive frame sets of at
    /// most frames-per-frame-set frames each. The staged set must cover
    /// exactly `[start_frame, end_frame]`; splitting needs stride 1
    /// blocks.
    pub fn frame_write_interval(
        &mut self,
        start_frame: i64,
        end_frame: i64,
        hash_mode: HashMode,
    ) -> Result<Status> {
        check_interval(start_frame, end_frame)?;
        let n_frames = end_frame - start_frame + 1;
        let staged = self
            .current_frame_set
            .as_ref()
            .ok_or(Error::InvalidArgument(
                "no current frame set; call frame_set_new first",
            ))?;
        if staged.first_frame != start_frame || staged.n_frames != n_frames {
            return Err(Error::InvalidArgument(
                "staged frame set does not cover the requested interval",
            ));
        }
        let per_set = self.general.frames_per_frame_set;
        if n_frames <= per_set {
            return self.frame_set_write(hash_mode);
        }

        let staged = self.current_frame_set.take().ok_or(Error::InvalidArgument(
            "no current frame set; call frame_set_new first",
        ))?;
        let mut offset = 0;
        while offset < n_frames {
            let chunk_len = per_set.min(n_frames - offset);
            let mut chunk = FrameSet::new(start_frame + offset, chunk_len)?;
            for group in staged.mapping_groups() {
                if let Some(mapping) = &group.mapping {
                    chunk.mapping_add(mapping.clone())?;
                }
                for block in &group.data_blocks {
                    chunk.particle_data_add(block.slice_frames(offset, chunk_len)?)?;
                }
            }
            for block in staged.non_particle_data() {
                chunk.data_add(block.slice_frames(offset, chunk_len)?)?;
            }
            self.current_frame_set = Some(chunk);
            self.frame_set_write(hash_mode)?;
            offset += chunk_len;
        }
        Ok(Status::Success)
    }

    // ----- internals ------------------------------------------------

    fn ensure_input(&mut self) -> Result<()> {
        if self.input.is_none() {
            let path = self.input_path.as_ref().ok_or(Error::NoInputFile)?;
            self.input = Some(BufReader::new(File::open(path)?));
        }
        Ok(())
    }

    fn ensure_output(&mut self) -> Result<()> {
        if self.output.is_none() {
            let path = self.output_path.as_ref().ok_or(Error::NoOutputFile)?;
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?;
            self.output = Some(BufWriter::new(file));
        }
        Ok(())
    }

    /// Reads only the fixed fields of the frame-set block at `pos`.
    fn read_frame_set_fields(&mut self, pos: u64) -> Result<FrameSet> {
        let orders = self.byte_orders();
        let inp = self.input.as_mut().ok_or(Error::NoInputFile)?;
        inp.seek(SeekFrom::Start(pos))?;
        let mut warnings = Vec::new();
        let header = BlockHeader::read_next(inp, orders, &mut warnings)?
            .ok_or(Error::TruncatedBlock { offset: pos })?;
        if header.id != BlockId::TRAJECTORY_FRAME_SET {
            return Err(Error::NotAFrameSet {
                offset: pos,
                id: header.id,
            });
        }
        let block = header.read_block(inp, HashMode::Skip, &mut warnings)?;
        FrameSet::read_contents(&mut block.contents.as_slice(), orders, pos as i64)
    }

    /// Walks the navigation skip list to the frame set containing `frame`
    /// and reads it fully, making it the current one.
    fn seek_frame_set_containing(&mut self, frame: i64, hash_mode: HashMode) -> Result<Status> {
        if let Some(frame_set) = &self.current_frame_set {
            if frame_set.contains_frame(frame) && frame_set.file_pos() > 0 {
                return Ok(Status::Success);
            }
        }
        let mut pos = match &self.current_frame_set {
            Some(fs) if fs.file_pos() > 0 => fs.file_pos() as u64,
            _ => {
                let first = self.general.first_frame_set_file_pos;
                if first <= 0 {
                    return Err(Error::FrameOutOfRange { frame });
                }
                first as u64
            }
        };
        let mut fields = self.read_frame_set_fields(pos)?;

        // Rewind, longest hops first; overshooting backwards is fine.
        while frame < fields.first_frame {
            let back = [
                fields.long_stride_prev_frame_set_file_pos,
                fields.medium_stride_prev_frame_set_file_pos,
                fields.prev_frame_set_file_pos,
            ]
            .into_iter()
            .find(|&p| p > 0)
            .ok_or(Error::FrameOutOfRange { frame })?;
            pos = back as u64;
            fields = self.read_frame_set_fields(pos)?;
        }
        // Advance, taking the longest hop that does not overshoot.
        while frame >= fields.first_frame + fields.n_frames {
            let mut advanced = false;
            for cand in [
                fields.long_stride_next_frame_set_file_pos,
                fields.medium_stride_next_frame_set_file_pos,
                fields.next_frame_set_file_pos,
            ] {
                if cand > 0 {
                    let next_fields = self.read_frame_set_fields(cand as u64)?;
                    if next_fields.first_frame <= frame {
                        pos = cand as u64;
                        fields = next_fields;
                        advanced = true;
                        break;
                    }
                }
            }
            if !advanced {
                return Err(Error::FrameOutOfRange { frame });
            }
        }

        let inp = self.input.as_mut().ok_or(Error::NoInputFile)?;
        inp.seek(SeekFrom::Start(pos))?;
        self.frame_set_read_next(hash_mode)?
            .ok_or(Error::TruncatedBlock { offset: pos })
    }
}

fn capped(s: &str) -> String {
    let mut end = s.len().min(MAX_STR_LEN);
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_owned()
}

fn check_interval(start_frame: i64, end_frame: i64) -> Result<()> {
    if start_frame < 0 || end_frame < start_frame {
        return Err(Error::InvalidArgument("invalid frame interval"));
    }
    Ok(())
}

fn take_warnings(status: Status) -> Vec<Warning> {
    match status {
        Status::Success => Vec::new(),
        Status::Minor(warnings) => warnings,
    }
}

/// Patches one i64 field of a written frame set's content, in memory and
/// on disk, re-digesting the content when the block was written hashed.
fn patch_set_field<W: Write + Seek>(
    w: &mut W,
    orders: ByteOrders,
    set: &mut WrittenSet,
    field_offset: u64,
    value: i64,
) -> Result<()> {
    let mut raw = [0u8; 8];
    orders.write_i64(&mut raw.as_mut_slice(), value)?;
    let off = field_offset as usize;
    set.contents[off..off + 8].copy_from_slice(&raw);
    w.seek(SeekFrom::Start(set.content_pos + field_offset))?;
    w.write_all(&raw)?;
    if set.hashed {
        rewrite_digest(w, set.content_pos, &set.contents)?;
    }
    Ok(())
}

/// Patches one i64 field of an arbitrary content copy, in memory and on
/// disk. The caller re-digests once after the last patch.
fn patch_bytes<W: Write + Seek>(
    w: &mut W,
    orders: ByteOrders,
    contents: &mut [u8],
    content_pos: u64,
    field_offset: usize,
    value: i64,
) -> Result<()> {
    let mut raw = [0u8; 8];
    orders.write_i64(&mut raw.as_mut_slice(), value)?;
    contents[field_offset..field_offset + 8].copy_from_slice(&raw);
    w.seek(SeekFrom::Start(content_pos + field_offset as u64))?;
    w.write_all(&raw)?;
    Ok(())
}

/// Rewrites the stored digest directly before the content.
fn rewrite_digest<W: Write + Seek>(w: &mut W, content_pos: u64, contents: &[u8]) -> Result<()> {
    let digest = content_digest(contents);
    w.seek(SeekFrom::Start(content_pos - digest.len() as u64))?;
    w.write_all(&digest)?;
    Ok(())
}
