//! Generic block framing: the universal unit of storage in the format.
//!
//! Every block is laid out as
//!
//! ```text
//! +-----------+----------+------+---------+------+--------+---------+
//! | block len | block id | name | version | type | digest | content |
//! |    i64    |   i64    | str  |   i64   |  u8  | 16 B   |  bytes  |
//! +-----------+----------+------+---------+------+--------+---------+
//! ```
//!
//! where block len covers the header and the content. The digest is MD5
//! over the content bytes only; all-zero means "not computed". Unknown
//! block ids skip cleanly by honoring the declared length.

use crate::bytes::ByteOrders;
use crate::digest::{self, HASH_LEN};
use crate::error::{Error, Result, Warning};
use crate::schema::blocks::BlockId;
use crate::schema::values::{BlockType, HashMode};
use byteorder::{ReadBytesExt, WriteBytesExt};
use log::warn;
use std::io::{self, Read, Seek, Write};

/// The block version this engine writes.
pub const BLOCK_VERSION: i64 = 1;

/// Fixed header bytes besides the name: len + id + name length prefix +
/// version + type flag + digest.
const FIXED_HEADER_LEN: u64 = 8 + 8 + 8 + 8 + 1 + HASH_LEN as u64;

/// A parsed block header; the content has not been consumed yet.
#[derive(Debug, Clone)]
pub struct BlockHeader {
    /// File offset of the start of the block.
    pub offset: u64,
    /// Declared total length, header plus content.
    pub block_len: u64,
    /// Measured header length (the name field makes it variable).
    pub header_len: u64,
    pub id: BlockId,
    pub name: String,
    pub version: i64,
    pub block_type: BlockType,
    pub digest: [u8; HASH_LEN],
}

/// A fully framed block with its raw content.
#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub name: String,
    pub block_type: BlockType,
    pub version: i64,
    pub digest: [u8; HASH_LEN],
    pub contents: Vec<u8>,
    /// Offset the block was read from or written to; 0 before either.
    pub offset: u64,
}

/// Reads exactly `buf.len()` bytes, or returns how many were available
/// before a clean end of stream.
fn read_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

impl BlockHeader {
    /// Reads the next block header at the current position. Returns
    /// `Ok(None)` on a clean end of stream; a header cut short is a
    /// critical truncation.
    pub fn read_next<R: Read + Seek>(
        r: &mut R,
        orders: ByteOrders,
        warnings: &mut Vec<Warning>,
    ) -> Result<Option<Self>> {
        let offset = r.stream_position()?;
        let mut raw = [0u8; 8];
        match read_or_eof(r, &mut raw)? {
            0 => return Ok(None),
            8 => {}
            _ => return Err(Error::TruncatedBlock { offset }),
        }
        let block_len = orders.u64_from_bytes(raw) as i64;
        if block_len < FIXED_HEADER_LEN as i64 {
            return Err(Error::BadBlockLength {
                offset,
                len: block_len,
            });
        }

        let truncated = |err: Error| match err {
            Error::Io(io_err) if io_err.kind() == io::ErrorKind::UnexpectedEof => {
                Error::TruncatedBlock { offset }
            }
            other => other,
        };
        let id = BlockId(orders.read_i64(r).map_err(Error::Io).map_err(truncated)?);
        let name = orders.read_string(r, warnings).map_err(truncated)?;
        let version = orders.read_i64(r).map_err(Error::Io).map_err(truncated)?;
        let type_tag = r.read_u8().map_err(Error::Io).map_err(truncated)?;
        let block_type = BlockType::try_from(type_tag).map_err(|_| Error::BadBlockType {
            offset,
            tag: type_tag,
        })?;
        let mut stored = [0u8; HASH_LEN];
        r.read_exact(&mut stored).map_err(Error::Io).map_err(truncated)?;

        let header_len = r.stream_position()? - offset;
        if (block_len as u64) < header_len {
            return Err(Error::BadBlockLength {
                offset,
                len: block_len,
            });
        }
        Ok(Some(Self {
            offset,
            block_len: block_len as u64,
            header_len,
            id,
            name,
            version,
            block_type,
            digest: stored,
        }))
    }

    #[inline]
    #[must_use]
    pub fn content_len(&self) -> u64 {
        self.block_len - self.header_len
    }

    /// Consumes the content bytes following this header. In
    /// [`HashMode::Use`] a non-zero stored digest is recomputed and a
    /// mismatch recorded as a minor failure; the content is still returned.
    pub fn read_block<R: Read>(
        self,
        r: &mut R,
        hash_mode: HashMode,
        warnings: &mut Vec<Warning>,
    ) -> Result<Block> {
        let mut contents = vec![0u8; self.content_len() as usize];
        if read_or_eof(r, &mut contents)? != contents.len() {
            return Err(Error::TruncatedBlock { offset: self.offset });
        }
        if hash_mode == HashMode::Use
            && !digest::is_zero(&self.digest)
            && digest::content_digest(&contents) != self.digest
        {
            warn!(
                "content digest mismatch in block {} at offset {}",
                self.id, self.offset
            );
            warnings.push(Warning::DigestMismatch {
                id: self.id,
                offset: self.offset,
            });
        }
        Ok(Block {
            id: self.id,
            name: self.name,
            block_type: self.block_type,
            version: self.version,
            digest: self.digest,
            contents,
            offset: self.offset,
        })
    }
}

impl Block {
    /// A block ready to be written, at version 1 with an uncomputed digest.
    #[must_use]
    pub fn new(id: BlockId, name: impl Into<String>, block_type: BlockType, contents: Vec<u8>) -> Self {
        Self {
            id,
            name: name.into(),
            block_type,
            version: BLOCK_VERSION,
            digest: [0; HASH_LEN],
            contents,
            offset: 0,
        }
    }

    /// Total on-disk length of this block.
    #[must_use]
    pub fn total_len(&self) -> u64 {
        FIXED_HEADER_LEN - 8 + ByteOrders::string_len(&self.name) + self.contents.len() as u64
    }

    /// Writes header and content at the current position, computing the
    /// digest over the content first when asked to. Returns the offset the
    /// block landed at.
    pub fn write<W: Write + Seek>(
        &mut self,
        w: &mut W,
        orders: ByteOrders,
        hash_mode: HashMode,
    ) -> Result<u64> {
        self.digest = match hash_mode {
            HashMode::Use => digest::content_digest(&self.contents),
            HashMode::Skip => [0; HASH_LEN],
        };
        let offset = w.stream_position()?;
        orders.write_i64(w, self.total_len() as i64)?;
        orders.write_i64(w, self.id.raw())?;
        orders.write_string(w, &self.name)?;
        orders.write_i64(w, self.version)?;
        w.write_u8(self.block_type as u8)?;
        w.write_all(&self.digest)?;
        w.write_all(&self.contents)?;
        self.offset = offset;
        Ok(offset)
    }

    /// Reads the next whole block. `Ok(None)` on a clean end of stream.
    pub fn read_next<R: Read + Seek>(
        r: &mut R,
        orders: ByteOrders,
        hash_mode: HashMode,
        warnings: &mut Vec<Warning>,
    ) -> Result<Option<Self>> {
        match BlockHeader::read_next(r, orders, warnings)? {
            Some(header) => header.read_block(r, hash_mode, warnings).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trip_and_length() {
        let orders = ByteOrders::native();
        let mut file = Cursor::new(Vec::new());
        let mut block = Block::new(
            BlockId::POSITIONS,
            "POSITIONS",
            BlockType::Trajectory,
            vec![1, 2, 3, 4, 5],
        );
        let offset = block.write(&mut file, orders, HashMode::Use).unwrap();
        assert_eq!(0, offset);
        assert_eq!(block.total_len(), file.get_ref().len() as u64);

        file.set_position(0);
        let mut warnings = Vec::new();
        let read = Block::read_next(&mut file, orders, HashMode::Use, &mut warnings)
            .unwrap()
            .unwrap();
        assert!(warnings.is_empty());
        assert_eq!(BlockId::POSITIONS, read.id);
        assert_eq!("POSITIONS", read.name);
        assert_eq!(BLOCK_VERSION, read.version);
        assert_eq!(BlockType::Trajectory, read.block_type);
        assert_eq!(vec![1, 2, 3, 4, 5], read.contents);

        // A second read hits the clean end of the stream.
        assert!(
            Block::read_next(&mut file, orders, HashMode::Use, &mut warnings)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn digest_mismatch_is_minor() {
        let orders = ByteOrders::native();
        let mut file = Cursor::new(Vec::new());
        let mut block = Block::new(BlockId(42), "CUSTOM", BlockType::NonTrajectory, vec![0; 32]);
        block.write(&mut file, orders, HashMode::Use).unwrap();

        // Flip one content byte.
        let len = file.get_ref().len();
        file.get_mut()[len - 1] ^= 0xFF;

        file.set_position(0);
        let mut warnings = Vec::new();
        let read = Block::read_next(&mut file, orders, HashMode::Use, &mut warnings)
            .unwrap()
            .unwrap();
        assert_eq!(32, read.contents.len());
        assert_eq!(
            vec![Warning::DigestMismatch {
                id: BlockId(42),
                offset: 0
            }],
            warnings
        );

        // Skip mode does not verify.
        file.set_position(0);
        let mut warnings = Vec::new();
        Block::read_next(&mut file, orders, HashMode::Skip, &mut warnings)
            .unwrap()
            .unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn skip_mode_stores_zero_digest() {
        let orders = ByteOrders::native();
        let mut file = Cursor::new(Vec::new());
        let mut block = Block::new(BlockId(7), "X", BlockType::NonTrajectory, vec![9; 8]);
        block.write(&mut file, orders, HashMode::Skip).unwrap();

        file.set_position(0);
        let mut warnings = Vec::new();
        // Use mode silently skips verification where the stored digest is zero.
        let read = Block::read_next(&mut file, orders, HashMode::Use, &mut warnings)
            .unwrap()
            .unwrap();
        assert!(digest::is_zero(&read.digest));
        assert!(warnings.is_empty());
    }

    #[test]
    fn truncated_content_is_critical() {
        let orders = ByteOrders::native();
        let mut file = Cursor::new(Vec::new());
        let mut block = Block::new(BlockId(7), "X", BlockType::NonTrajectory, vec![9; 100]);
        block.write(&mut file, orders, HashMode::Skip).unwrap();
        let truncated = file.get_ref()[..file.get_ref().len() - 10].to_vec();

        let mut file = Cursor::new(truncated);
        let mut warnings = Vec::new();
        match Block::read_next(&mut file, orders, HashMode::Skip, &mut warnings) {
            Err(Error::TruncatedBlock { offset: 0 }) => {}
            other => panic!("expected truncation, got {other:?}"),
        }
    }
}
