use std::fs;
use std::path::Path;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tng::schema::values::codec_id;
use tng::{
    AtomCountMode, Block, BlockId, BlockType, ByteOrders, Codec, DataArray, Endianness32,
    Endianness64, Error, HashMode, Result, Shape, Status, Trajectory, Warning,
};

/// Builds a session with the classic water box: one 3-atom template,
/// `count` instances.
fn water_session(output: &Path, count: i64) -> Trajectory {
    let mut session = Trajectory::new();
    session.output_file_set(output);
    session.first_program_name_set("tng test suite");
    session.first_user_name_set("nobody");
    session.forcefield_name_set("tip3p");
    let mol = session.molecule_add("water");
    let chain = session.molecule_chain_add(mol, "W");
    let residue = session.chain_residue_add(chain, "HOH");
    session.residue_atom_add(residue, "O", "O");
    session.residue_atom_add(residue, "H1", "H");
    session.residue_atom_add(residue, "H2", "H");
    session.molecule_cnt_set(mol, count).unwrap();
    session
}

fn reader(path: &Path) -> Trajectory {
    let mut session = Trajectory::new();
    session.input_file_set(path);
    session
}

#[test]
fn empty_file_round_trip() {
    // Scenario 1: header preamble only, no frame sets.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.tng");

    let mut session = Trajectory::new();
    session.output_file_set(&path);
    let status = session.file_headers_write(HashMode::Skip).unwrap();
    assert!(status.is_success());
    drop(session);

    let mut session = reader(&path);
    let status = session.file_headers_read(HashMode::Skip).unwrap();
    assert!(status.is_success());
    assert_eq!(0, session.num_particles());
    assert!(session.frame_set_read_next(HashMode::Skip).unwrap().is_none());
}

#[test]
fn water_box_round_trip() {
    // Scenario 2: 1000 waters, one frame set of 10 frames of zeroed
    // positions.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("water.tng");

    let mut session = water_session(&path, 1000);
    assert_eq!(3000, session.num_particles());
    session.file_headers_write(HashMode::Use).unwrap();
    session.frame_set_new(0, 10).unwrap();
    session
        .particle_data_block_add(
            BlockId::POSITIONS,
            "POSITIONS",
            BlockType::Trajectory,
            10,
            3,
            1,
            0,
            3000,
            codec_id::UNCOMPRESSED,
            DataArray::Float(vec![0.0; 10 * 3000 * 3]),
        )
        .unwrap();
    session.frame_set_write(HashMode::Use).unwrap();
    drop(session);

    let mut session = reader(&path);
    let status = session.file_headers_read(HashMode::Use).unwrap();
    assert!(status.is_success());
    assert_eq!(3000, session.num_particles());
    assert_eq!(1000, session.num_molecules());
    assert_eq!("tip3p", session.forcefield_name());
    assert_eq!("tng test suite", session.first_program_name());

    let status = session.frame_set_read_next(HashMode::Use).unwrap().unwrap();
    assert!(status.is_success());
    let frame_set = session.current_frame_set().unwrap();
    assert_eq!(0, frame_set.first_frame);
    assert_eq!(10, frame_set.n_frames);
    assert_eq!(vec![BlockId::POSITIONS], frame_set.toc());

    let (data, status) = session.particle_data_get(BlockId::POSITIONS).unwrap();
    assert!(status.is_success());
    assert_eq!(10, data.n_frames);
    assert_eq!(3000, data.n_particles);
    assert_eq!(3, data.n_values_per_frame);
    let values = data.values.as_float().unwrap();
    assert_eq!(10 * 3000 * 3, values.len());
    assert!(values.iter().all(|&v| v == 0.0));

    assert!(session.frame_set_read_next(HashMode::Use).unwrap().is_none());
}

#[test]
fn parallel_partitions_union() {
    // Scenario 3: two writers own [0, 1500) and [1500, 3000).
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("parallel.tng");

    let mut session = water_session(&path, 1000);
    session.file_headers_write(HashMode::Use).unwrap();
    session.frame_set_new(0, 10).unwrap();

    let table_a: Vec<i64> = (0..1500).collect();
    session.particle_mapping_add(0, 1500, &table_a).unwrap();
    session
        .particle_data_block_add(
            BlockId::POSITIONS,
            "POSITIONS",
            BlockType::Trajectory,
            10,
            3,
            1,
            0,
            1500,
            codec_id::UNCOMPRESSED,
            DataArray::Float(vec![1.0; 10 * 1500 * 3]),
        )
        .unwrap();

    let table_b: Vec<i64> = (1500..3000).collect();
    session.particle_mapping_add(1500, 1500, &table_b).unwrap();
    session
        .particle_data_block_add(
            BlockId::POSITIONS,
            "POSITIONS",
            BlockType::Trajectory,
            10,
            3,
            1,
            1500,
            1500,
            codec_id::UNCOMPRESSED,
            DataArray::Float(vec![2.0; 10 * 1500 * 3]),
        )
        .unwrap();
    session.frame_set_write(HashMode::Use).unwrap();
    drop(session);

    let mut session = reader(&path);
    session.file_headers_read(HashMode::Use).unwrap();
    let (data, status) = session
        .particle_data_interval_get(BlockId::POSITIONS, 0, 9, 0, 2999, HashMode::Use)
        .unwrap();
    assert!(status.is_success());
    assert_eq!(10, data.n_frames);
    assert_eq!(3000, data.n_particles);
    assert_eq!(3, data.n_values_per_frame);
    let values = data.values.as_float().unwrap();
    assert_eq!(10 * 3000 * 3, values.len());
    // No duplicates, no gaps: the low half comes from writer A, the high
    // half from writer B, for every frame.
    for frame in 0..10 {
        assert_eq!(1.0, values[data.value_index(frame, 0, 0)]);
        assert_eq!(1.0, values[data.value_index(frame, 1499, 2)]);
        assert_eq!(2.0, values[data.value_index(frame, 1500, 0)]);
        assert_eq!(2.0, values[data.value_index(frame, 2999, 2)]);
    }
}

#[test]
fn skip_list_navigation() {
    // Scenario 4: 7 frame sets, medium stride 3, long stride 5.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("skiplist.tng");

    let mut session = water_session(&path, 10);
    session.medium_stride_length_set(3).unwrap();
    session.long_stride_length_set(5).unwrap();
    session.file_headers_write(HashMode::Use).unwrap();
    for i in 0..7 {
        session.frame_set_new(i * 10, 10).unwrap();
        session
            .data_block_add(
                BlockId::BOX_SHAPE,
                "BOX SHAPE",
                BlockType::Trajectory,
                10,
                9,
                1,
                codec_id::UNCOMPRESSED,
                DataArray::Float(vec![4.5; 10 * 9]),
            )
            .unwrap();
        session.frame_set_write(HashMode::Use).unwrap();
    }
    drop(session);

    let mut session = reader(&path);
    session.file_headers_read(HashMode::Use).unwrap();
    assert_eq!(3, session.medium_stride_length());
    assert_eq!(5, session.long_stride_length());
    assert_eq!(70, session.num_frames());

    let mut sets = Vec::new();
    while let Some(status) = session.frame_set_read_next(HashMode::Use).unwrap() {
        assert!(status.is_success());
        sets.push(session.current_frame_set().unwrap().clone());
    }
    assert_eq!(7, sets.len());

    // Immediate links match byte positions in both directions.
    for i in 0..6 {
        assert_eq!(sets[i].next_frame_set_file_pos, sets[i + 1].file_pos());
        assert_eq!(sets[i + 1].prev_frame_set_file_pos, sets[i].file_pos());
    }
    // The 4th frame set's medium-prev points to the 1st, the 6th's
    // long-prev to the 1st, and the last set's next is 0.
    assert_eq!(sets[0].file_pos(), sets[3].medium_stride_prev_frame_set_file_pos);
    assert_eq!(sets[0].file_pos(), sets[5].long_stride_prev_frame_set_file_pos);
    assert_eq!(0, sets[6].next_frame_set_file_pos);
    assert_eq!(0, sets[0].prev_frame_set_file_pos);
    // Medium and long strides step forward by the configured counts.
    assert_eq!(sets[3].file_pos(), sets[0].medium_stride_next_frame_set_file_pos);
    assert_eq!(sets[6].file_pos(), sets[3].medium_stride_next_frame_set_file_pos);
    assert_eq!(sets[5].file_pos(), sets[0].long_stride_next_frame_set_file_pos);
    assert_eq!(0, sets[6].medium_stride_next_frame_set_file_pos);
    // The session-level getters reflect the current (last) frame set.
    assert_eq!(0, session.frame_set_next_frame_set_file_pos());
    assert_eq!(sets[5].file_pos(), session.frame_set_prev_frame_set_file_pos());
    assert_eq!(
        sets[3].file_pos(),
        session.frame_set_medium_stride_prev_frame_set_file_pos()
    );
    assert_eq!(
        sets[1].file_pos(),
        session.frame_set_long_stride_prev_frame_set_file_pos()
    );
    assert_eq!(0, session.frame_set_medium_stride_next_frame_set_file_pos());
    assert_eq!(0, session.frame_set_long_stride_next_frame_set_file_pos());
}

/// Locates the first block with `id` in `path` and returns
/// (content_start, content_len).
fn find_block_content(path: &Path, id: BlockId) -> (u64, u64) {
    let mut session = reader(path);
    session.file_headers_read(HashMode::Skip).unwrap();
    while let Some((block, _)) = session.block_read_next(HashMode::Skip).unwrap() {
        if block.id == id {
            let content_len = block.contents.len() as u64;
            return (block.offset + block.total_len() - content_len, content_len);
        }
    }
    panic!("no block {id} in file");
}

#[test]
fn corrupted_block_is_minor() {
    // Scenario 5: flip one byte of the positions payload.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.tng");

    let mut session = water_session(&path, 1000);
    session.file_headers_write(HashMode::Use).unwrap();
    session.frame_set_new(0, 10).unwrap();
    session
        .particle_data_block_add(
            BlockId::POSITIONS,
            "POSITIONS",
            BlockType::Trajectory,
            10,
            3,
            1,
            0,
            3000,
            codec_id::UNCOMPRESSED,
            DataArray::Float(vec![0.0; 10 * 3000 * 3]),
        )
        .unwrap();
    session.frame_set_write(HashMode::Use).unwrap();
    drop(session);

    let (content_start, content_len) = find_block_content(&path, BlockId::POSITIONS);
    let mut bytes = fs::read(&path).unwrap();
    bytes[(content_start + content_len / 2) as usize] ^= 0x01;
    fs::write(&path, bytes).unwrap();

    let mut session = reader(&path);
    let status = session.file_headers_read(HashMode::Use).unwrap();
    assert!(status.is_success());
    let status = session.frame_set_read_next(HashMode::Use).unwrap().unwrap();
    assert_eq!(
        vec![Some(BlockId::POSITIONS)],
        status.warnings().iter().map(Warning::block_id).collect::<Vec<_>>()
    );
    assert!(matches!(
        status.warnings()[0],
        Warning::DigestMismatch { id: BlockId::POSITIONS, .. }
    ));
    // The payload is still returned.
    let (data, _) = session.particle_data_get(BlockId::POSITIONS).unwrap();
    assert_eq!(10 * 3000 * 3, data.values.as_float().unwrap().len());

    // In skip mode the same file reads back clean.
    let mut session = reader(&path);
    session.file_headers_read(HashMode::Skip).unwrap();
    let status = session.frame_set_read_next(HashMode::Skip).unwrap().unwrap();
    assert!(status.is_success());
}

#[test]
fn skip_mode_writes_never_verify() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nohash.tng");

    let mut session = water_session(&path, 2);
    session.file_headers_write(HashMode::Skip).unwrap();
    session.frame_set_new(0, 1).unwrap();
    session
        .particle_data_block_add(
            BlockId::VELOCITIES,
            "VELOCITIES",
            BlockType::Trajectory,
            1,
            3,
            1,
            0,
            6,
            codec_id::UNCOMPRESSED,
            DataArray::Float(vec![1.25; 18]),
        )
        .unwrap();
    session.frame_set_write(HashMode::Skip).unwrap();
    drop(session);

    // Reading in use mode silently skips verification of zero digests,
    // even with the file scribbled on.
    let (content_start, _) = find_block_content(&path, BlockId::VELOCITIES);
    let mut bytes = fs::read(&path).unwrap();
    // Well inside the payload, past the count fields.
    bytes[content_start as usize + 60] ^= 0xFF;
    fs::write(&path, bytes).unwrap();

    let mut session = reader(&path);
    session.file_headers_read(HashMode::Use).unwrap();
    let status = session.frame_set_read_next(HashMode::Use).unwrap().unwrap();
    assert!(status.is_success());
}

#[test]
fn block_lengths_match_byte_spans() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("framing.tng");

    let mut session = water_session(&path, 3);
    session.file_headers_write(HashMode::Use).unwrap();
    session.frame_set_new(0, 5).unwrap();
    session
        .data_block_add(
            BlockId::BOX_SHAPE,
            "BOX SHAPE",
            BlockType::Trajectory,
            5,
            9,
            1,
            codec_id::UNCOMPRESSED,
            DataArray::Double(vec![2.5; 45]),
        )
        .unwrap();
    session.frame_set_write(HashMode::Use).unwrap();
    drop(session);

    let file_len = fs::metadata(&path).unwrap().len();

    // The whole file is wall-to-wall blocks whose declared lengths match
    // their measured spans. The first block reads canonically, the rest in
    // the orders it declares.
    let mut file = fs::File::open(&path).unwrap();
    let mut warnings = Vec::new();
    let first = Block::read_next(&mut file, tng::bytes::CANONICAL, HashMode::Skip, &mut warnings)
        .unwrap()
        .unwrap();
    assert_eq!(BlockId::ENDIANNESS_AND_STRING_LENGTH, first.id);
    assert_eq!(0, first.offset);
    let mut expected_offset = first.total_len();
    let orders = ByteOrders::native();
    let mut count = 1;
    while let Some(block) =
        Block::read_next(&mut file, orders, HashMode::Skip, &mut warnings).unwrap()
    {
        assert_eq!(expected_offset, block.offset);
        expected_offset += block.total_len();
        count += 1;
    }
    assert!(warnings.is_empty());
    assert_eq!(file_len, expected_offset);
    assert!(count >= 6);
}

#[test]
fn random_payload_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("random.tng");
    let mut rng = StdRng::seed_from_u64(0x746e67);

    let ints: Vec<i32> = (0..3 * 7).map(|_| rng.gen_range(i32::MIN..i32::MAX)).collect();
    let floats: Vec<f32> = (0..6 * 2 * 3).map(|_| rng.gen_range(-10.0f32..10.0)).collect();
    let doubles: Vec<f64> = (0..2 * 9).map(|_| rng.gen_range(-1e6f64..1e6)).collect();
    let strings: Vec<String> = (0..6)
        .map(|i| format!("value-{i}-{}", rng.gen_range(0u32..1_000_000)))
        .collect();

    let mut session = water_session(&path, 4);
    session.file_headers_write(HashMode::Use).unwrap();
    session.frame_set_new(0, 6).unwrap();
    session
        .data_block_add(
            BlockId(11001),
            "RANDOM INTS",
            BlockType::Trajectory,
            6,
            7,
            2,
            codec_id::UNCOMPRESSED,
            DataArray::Int(ints.clone()),
        )
        .unwrap();
    session
        .data_block_add(
            BlockId(11002),
            "RANDOM DOUBLES",
            BlockType::Trajectory,
            6,
            9,
            3,
            codec_id::UNCOMPRESSED,
            DataArray::Double(doubles.clone()),
        )
        .unwrap();
    session
        .data_block_add(
            BlockId(11003),
            "RANDOM LABELS",
            BlockType::Trajectory,
            6,
            1,
            1,
            codec_id::UNCOMPRESSED,
            DataArray::Char(strings.clone()),
        )
        .unwrap();
    session
        .particle_data_block_add(
            BlockId(11004),
            "RANDOM PARTICLE FLOATS",
            BlockType::Trajectory,
            6,
            3,
            1,
            5,
            2,
            codec_id::UNCOMPRESSED,
            DataArray::Float(floats.clone()),
        )
        .unwrap();
    session.frame_set_write(HashMode::Use).unwrap();
    drop(session);

    let mut session = reader(&path);
    session.file_headers_read(HashMode::Use).unwrap();
    let status = session.frame_set_read_next(HashMode::Use).unwrap().unwrap();
    assert!(status.is_success());

    let data = session.data_get(BlockId(11001)).unwrap();
    assert_eq!(3, data.n_frames);
    assert_eq!(2, data.stride_length);
    assert_eq!(Some(ints.as_slice()), data.values.as_int());

    let data = session.data_get(BlockId(11002)).unwrap();
    assert_eq!(2, data.n_frames);
    assert_eq!(Some(doubles.as_slice()), data.values.as_double());

    let data = session.data_get(BlockId(11003)).unwrap();
    assert_eq!(Some(strings.as_slice()), data.values.as_char());

    let (data, status) = session.particle_data_get(BlockId(11004)).unwrap();
    assert!(status.is_success());
    assert_eq!(5, data.num_first_particle);
    assert_eq!(2, data.n_particles);
    assert_eq!(Some(floats.as_slice()), data.values.as_float());
}

#[test]
fn big_endian_file_reads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bigend.tng");

    let mut session = water_session(&path, 5);
    session.byte_orders_set(ByteOrders {
        b32: Endianness32::Big,
        b64: Endianness64::Big,
    });
    session.file_headers_write(HashMode::Use).unwrap();
    session.frame_set_new(0, 2).unwrap();
    session
        .data_block_add(
            BlockId::BOX_SHAPE,
            "BOX SHAPE",
            BlockType::Trajectory,
            2,
            3,
            1,
            codec_id::UNCOMPRESSED,
            DataArray::Double(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
        )
        .unwrap();
    session.frame_set_write(HashMode::Use).unwrap();
    drop(session);

    let mut session = reader(&path);
    session.file_headers_read(HashMode::Use).unwrap();
    assert_eq!(Endianness64::Big, session.byte_orders().b64);
    assert_eq!(15, session.num_particles());
    session.frame_set_read_next(HashMode::Use).unwrap().unwrap();
    let data = session.data_get(BlockId::BOX_SHAPE).unwrap();
    assert_eq!(
        Some(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0][..]),
        data.values.as_double()
    );
}

#[test]
fn interval_reads_cross_frame_sets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("interval.tng");

    let mut session = water_session(&path, 2);
    session.file_headers_write(HashMode::Use).unwrap();
    for i in 0..3i64 {
        session.frame_set_new(i * 10, 10).unwrap();
        let counters: Vec<i32> = (i * 10..(i + 1) * 10).map(|f| f as i32).collect();
        session
            .data_block_add(
                BlockId(10100),
                "FRAME COUNTER",
                BlockType::Trajectory,
                10,
                1,
                1,
                codec_id::UNCOMPRESSED,
                DataArray::Int(counters),
            )
            .unwrap();
        let particles: Vec<f64> = (0..10 * 6 * 3).map(|v| (i * 1000 + v) as f64).collect();
        session
            .particle_data_block_add(
                BlockId::POSITIONS,
                "POSITIONS",
                BlockType::Trajectory,
                10,
                3,
                1,
                0,
                6,
                codec_id::UNCOMPRESSED,
                DataArray::Double(particles),
            )
            .unwrap();
        session.frame_set_write(HashMode::Use).unwrap();
    }
    drop(session);

    let mut session = reader(&path);
    session.file_headers_read(HashMode::Use).unwrap();
    let (data, status) = session
        .data_interval_get(BlockId(10100), 5, 25, HashMode::Use)
        .unwrap();
    assert!(status.is_success());
    assert_eq!(21, data.n_frames);
    let expected: Vec<i32> = (5..=25).collect();
    assert_eq!(Some(expected.as_slice()), data.values.as_int());

    // Walking backwards through the skip list works too: the session now
    // sits on the last frame set.
    let (data, status) = session
        .data_interval_get(BlockId(10100), 0, 3, HashMode::Use)
        .unwrap();
    assert!(status.is_success());
    let expected: Vec<i32> = (0..=3).collect();
    assert_eq!(Some(expected.as_slice()), data.values.as_int());

    // A particle interval restricted to particles 2..=4.
    let (data, status) = session
        .particle_data_interval_get(BlockId::POSITIONS, 8, 12, 2, 4, HashMode::Use)
        .unwrap();
    assert!(status.is_success());
    assert_eq!(5, data.n_frames);
    assert_eq!(3, data.n_particles);
    let values = data.values.as_double().unwrap();
    // Frame 8 lives in set 0: row 8, particle 2, value 0 is 8*18 + 6.
    assert_eq!((8 * 18 + 6) as f64, values[data.value_index(0, 0, 0)]);
    // Frame 10 lives in set 1: its payload restarts at 1000.
    assert_eq!((1000 + 6) as f64, values[data.value_index(2, 0, 0)]);

    // Frames beyond the last set are critical.
    assert!(matches!(
        session.data_interval_get(BlockId(10100), 28, 99, HashMode::Use),
        Err(Error::FrameOutOfRange { frame: 99 })
    ));

    let status = session.frame_read_interval(0, 29, HashMode::Use).unwrap();
    assert!(status.is_success());
    assert!(session.current_frame_set().unwrap().contains_frame(29));
}

#[test]
fn interval_write_splits_frame_sets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("split.tng");

    let mut session = water_session(&path, 2);
    session.num_frames_per_frame_set_set(4).unwrap();
    session.file_headers_write(HashMode::Use).unwrap();
    session.frame_set_new(0, 10).unwrap();
    let counters: Vec<i32> = (0..10).collect();
    session
        .data_block_add(
            BlockId(10100),
            "FRAME COUNTER",
            BlockType::Trajectory,
            10,
            1,
            1,
            codec_id::UNCOMPRESSED,
            DataArray::Int(counters),
        )
        .unwrap();
    session.frame_write_interval(0, 9, HashMode::Use).unwrap();
    drop(session);

    let mut session = reader(&path);
    session.file_headers_read(HashMode::Use).unwrap();
    let mut firsts = Vec::new();
    while let Some(status) = session.frame_set_read_next(HashMode::Use).unwrap() {
        assert!(status.is_success());
        let frame_set = session.current_frame_set().unwrap();
        firsts.push((frame_set.first_frame, frame_set.n_frames));
    }
    assert_eq!(vec![(0, 4), (4, 4), (8, 2)], firsts);
    let (data, status) = session
        .data_interval_get(BlockId(10100), 0, 9, HashMode::Use)
        .unwrap();
    assert!(status.is_success());
    let expected: Vec<i32> = (0..10).collect();
    assert_eq!(Some(expected.as_slice()), data.values.as_int());
}

#[test]
fn unknown_blocks_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("unknown.tng");

    let mut session = water_session(&path, 2);
    session.file_headers_write(HashMode::Use).unwrap();
    session.frame_set_new(0, 1).unwrap();
    session
        .data_block_add(
            BlockId::BOX_SHAPE,
            "BOX SHAPE",
            BlockType::Trajectory,
            1,
            9,
            1,
            codec_id::UNCOMPRESSED,
            DataArray::Float(vec![0.5; 9]),
        )
        .unwrap();
    session.frame_set_write(HashMode::Use).unwrap();
    drop(session);

    // Splice a block with an unknown id and an unparseable payload at the
    // end of the frame set.
    let orders = ByteOrders::native();
    let mut raw = std::io::Cursor::new(Vec::new());
    Block::new(BlockId(7777), "MYSTERY", BlockType::Trajectory, vec![1, 2, 3])
        .write(&mut raw, orders, HashMode::Use)
        .unwrap();
    let mut bytes = fs::read(&path).unwrap();
    bytes.extend_from_slice(raw.get_ref());
    fs::write(&path, bytes).unwrap();

    let mut session = reader(&path);
    session.file_headers_read(HashMode::Use).unwrap();
    let status = session.frame_set_read_next(HashMode::Use).unwrap().unwrap();
    assert_eq!(
        vec![Some(BlockId(7777))],
        status.warnings().iter().map(Warning::block_id).collect::<Vec<_>>()
    );
    // The known block is unaffected.
    let data = session.data_get(BlockId::BOX_SHAPE).unwrap();
    assert_eq!(9, data.values.len());
}

#[test]
fn truncated_frame_set_is_critical() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("truncated.tng");

    let mut session = water_session(&path, 2);
    session.file_headers_write(HashMode::Use).unwrap();
    session.frame_set_new(0, 4).unwrap();
    session
        .data_block_add(
            BlockId::BOX_SHAPE,
            "BOX SHAPE",
            BlockType::Trajectory,
            4,
            9,
            1,
            codec_id::UNCOMPRESSED,
            DataArray::Float(vec![0.5; 36]),
        )
        .unwrap();
    session.frame_set_write(HashMode::Use).unwrap();
    drop(session);

    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() - 40]).unwrap();

    let mut session = reader(&path);
    session.file_headers_read(HashMode::Use).unwrap();
    assert!(matches!(
        session.frame_set_read_next(HashMode::Use),
        Err(Error::TruncatedBlock { .. })
    ));
}

#[test]
fn not_a_tng_file_is_critical() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("garbage.bin");
    fs::write(&path, vec![0u8; 16]).unwrap();

    let mut session = reader(&path);
    assert!(session.file_headers_read(HashMode::Use).is_err());
}

/// Delta codec: bytes become differences from the previous byte. Enough to
/// prove a registered codec participates in whole-file round trips.
struct DeltaCodec;

impl Codec for DeltaCodec {
    fn encode(&self, _shape: &Shape, raw: &[u8]) -> Result<Vec<u8>> {
        let mut prev = 0u8;
        Ok(raw
            .iter()
            .map(|&b| {
                let d = b.wrapping_sub(prev);
                prev = b;
                d
            })
            .collect())
    }

    fn decode(&self, _shape: &Shape, payload: &[u8]) -> Result<Vec<u8>> {
        let mut prev = 0u8;
        Ok(payload
            .iter()
            .map(|&d| {
                prev = prev.wrapping_add(d);
                prev
            })
            .collect())
    }
}

#[test]
fn registered_codec_round_trips_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("codec.tng");

    let values: Vec<i32> = (0..20).map(|v| v * 3).collect();
    let mut session = water_session(&path, 2);
    session.codec_register(99, Arc::new(DeltaCodec));
    session.file_headers_write(HashMode::Use).unwrap();
    session.frame_set_new(0, 5).unwrap();
    session
        .data_block_add(
            BlockId(10200),
            "DELTAS",
            BlockType::Trajectory,
            5,
            4,
            1,
            99,
            DataArray::Int(values.clone()),
        )
        .unwrap();
    session.frame_set_write(HashMode::Use).unwrap();
    drop(session);

    let mut session = reader(&path);
    session.codec_register(99, Arc::new(DeltaCodec));
    session.file_headers_read(HashMode::Use).unwrap();
    session.frame_set_read_next(HashMode::Use).unwrap().unwrap();
    let data = session.data_get(BlockId(10200)).unwrap();
    assert_eq!(Some(values.as_slice()), data.values.as_int());

    // Without the registration the payload stays opaque, as a minor
    // failure, and the getter refuses to fake values.
    let mut session = reader(&path);
    session.file_headers_read(HashMode::Use).unwrap();
    let status = session.frame_set_read_next(HashMode::Use).unwrap().unwrap();
    assert!(matches!(
        status.warnings()[0],
        Warning::UnknownCodec { codec_id: 99, .. }
    ));
    assert!(session.data_get(BlockId(10200)).is_err());
}

#[test]
fn topology_survives_serialization() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("topology.tng");

    let mut session = Trajectory::new();
    session.output_file_set(&path);
    let mol = session.molecule_add("water");
    let chain = session.molecule_chain_add(mol, "W");
    let residue = session.chain_residue_add(chain, "HOH");
    session.residue_atom_add(residue, "O", "O");
    session.residue_atom_add(residue, "H1", "H");
    session.residue_atom_add(residue, "H2", "H");
    session.topology_mut().bond_add(mol, 0, 1).unwrap();
    session.topology_mut().bond_add(mol, 0, 2).unwrap();
    session.molecule_cnt_set(mol, 17).unwrap();
    session.file_headers_write(HashMode::Use).unwrap();
    drop(session);

    let mut session = reader(&path);
    session.file_headers_read(HashMode::Use).unwrap();
    assert_eq!(51, session.num_particles());
    let molecule = &session.topology().molecules()[0];
    assert_eq!("water", molecule.name());
    assert_eq!(17, molecule.count());
    let bonds = molecule.bonds();
    assert_eq!(2, bonds.len());
    assert_eq!((0, 1), (bonds[0].from, bonds[0].to));
    assert_eq!((0, 2), (bonds[1].from, bonds[1].to));
    let atoms = molecule.chains()[0].residues()[0].atoms();
    assert_eq!(["O", "H1", "H2"], [atoms[0].name(), atoms[1].name(), atoms[2].name()]);
}

#[test]
fn creation_time_is_iso_8601() {
    let session = Trajectory::new();
    let time = session.time_str();
    assert!(time.len() <= 24);
    // 2026-08-01T00:00:00
    assert_eq!(19, time.len());
    assert_eq!(Some('T'), time.chars().nth(10));
}

#[test]
fn out_of_order_append_is_critical() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("order.tng");

    let mut session = water_session(&path, 2);
    session.file_headers_write(HashMode::Skip).unwrap();
    session.frame_set_new(10, 10).unwrap();
    session.frame_set_write(HashMode::Skip).unwrap();
    // Frame sets are totally ordered by ascending first frame.
    session.frame_set_new(5, 5).unwrap();
    assert!(matches!(
        session.frame_set_write(HashMode::Skip),
        Err(Error::InvalidArgument(_))
    ));
    // Appending at the watermark is fine.
    session.frame_set_new(20, 10).unwrap();
    session.frame_set_write(HashMode::Skip).unwrap();
}

#[test]
fn variable_atom_count_follows_mappings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("varatoms.tng");

    let mut session = water_session(&path, 1000);
    session.atom_count_mode_set(AtomCountMode::Variable);
    session.file_headers_write(HashMode::Skip).unwrap();
    session.frame_set_new(0, 2).unwrap();
    let table: Vec<i64> = (0..30).collect();
    session.particle_mapping_add(0, 30, &table).unwrap();
    session
        .particle_data_block_add(
            BlockId::POSITIONS,
            "POSITIONS",
            BlockType::Trajectory,
            2,
            3,
            1,
            0,
            30,
            codec_id::UNCOMPRESSED,
            DataArray::Float(vec![0.0; 2 * 30 * 3]),
        )
        .unwrap();
    session.frame_set_write(HashMode::Skip).unwrap();
    drop(session);

    let mut session = reader(&path);
    session.file_headers_read(HashMode::Skip).unwrap();
    assert_eq!(AtomCountMode::Variable, session.atom_count_mode());
    // Before any frame set is read, the topological total applies.
    assert_eq!(3000, session.num_particles());
    session.frame_set_read_next(HashMode::Skip).unwrap().unwrap();
    // The frame set stores data for 30 particles only.
    assert_eq!(30, session.num_particles());
}

#[test]
fn status_accessors() {
    let status = Status::Success;
    assert!(status.is_success());
    assert!(status.warnings().is_empty());
}
