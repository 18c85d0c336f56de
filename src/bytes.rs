//! Typed reads and writes of the fixed-width scalars and length-prefixed
//! strings the format is built from, in the file's declared byte orders.
//!
//! A file declares one order for 4-byte payloads and one for 8-byte
//! payloads. The swap names describe permutations relative to big-endian
//! byte order: quad-swap exchanges the 32-bit halves, byte-pair-swap
//! exchanges 16-bit pairs, byte-swap exchanges bytes within 16-bit pairs,
//! and little-endian is the full reversal. Every permutation is its own
//! inverse, so encoding and decoding share the same transform. All
//! conversions are bit-preserving; the file's bit pattern is what moves.

use crate::error::{Result, Warning};
use crate::schema::values::MAX_STR_LEN;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use num_enum::TryFromPrimitive;
use std::io::{self, Read, Write};

/// Declared byte order of 4-byte scalars.
#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum Endianness32 {
    Big = 0,
    Little = 1,
    PairSwapped = 2,
}

/// Declared byte order of 8-byte scalars.
#[derive(Debug, Copy, Clone, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum Endianness64 {
    Big = 0,
    Little = 1,
    QuadSwapped = 2,
    PairSwapped = 3,
    ByteSwapped = 4,
}

impl Endianness32 {
    /// Permutes between the big-endian interpretation of the stored bytes
    /// and the native value. Involution.
    #[inline]
    #[must_use]
    pub fn swap(self, v: u32) -> u32 {
        match self {
            Self::Big => v,
            Self::Little => v.swap_bytes(),
            Self::PairSwapped => ((v & 0xFF00_FF00) >> 8) | ((v & 0x00FF_00FF) << 8),
        }
    }
}

impl Endianness64 {
    /// Permutes between the big-endian interpretation of the stored bytes
    /// and the native value. Involution.
    #[inline]
    #[must_use]
    pub fn swap(self, v: u64) -> u64 {
        match self {
            Self::Big => v,
            Self::Little => v.swap_bytes(),
            Self::QuadSwapped => v.rotate_left(32),
            Self::PairSwapped => {
                ((v & 0xFFFF_0000_FFFF_0000) >> 16) | ((v & 0x0000_FFFF_0000_FFFF) << 16)
            }
            Self::ByteSwapped => {
                ((v & 0xFF00_FF00_FF00_FF00) >> 8) | ((v & 0x00FF_00FF_00FF_00FF) << 8)
            }
        }
    }
}

/// The pair of declared orders a file is read and written with.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ByteOrders {
    pub b32: Endianness32,
    pub b64: Endianness64,
}

/// Network order, used for the endianness block itself so a reader can
/// recover the declared orders regardless of host.
pub const CANONICAL: ByteOrders = ByteOrders {
    b32: Endianness32::Big,
    b64: Endianness64::Big,
};

impl ByteOrders {
    /// The byte orders of the host.
    #[must_use]
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            CANONICAL
        } else {
            Self {
                b32: Endianness32::Little,
                b64: Endianness64::Little,
            }
        }
    }

    pub fn read_u64<R: Read>(&self, r: &mut R) -> io::Result<u64> {
        match self.b64 {
            Endianness64::Big => r.read_u64::<BigEndian>(),
            Endianness64::Little => r.read_u64::<LittleEndian>(),
            other => Ok(other.swap(r.read_u64::<BigEndian>()?)),
        }
    }

    pub fn read_i64<R: Read>(&self, r: &mut R) -> io::Result<i64> {
        self.read_u64(r).map(|v| v as i64)
    }

    pub fn read_f64<R: Read>(&self, r: &mut R) -> io::Result<f64> {
        self.read_u64(r).map(f64::from_bits)
    }

    pub fn read_u32<R: Read>(&self, r: &mut R) -> io::Result<u32> {
        match self.b32 {
            Endianness32::Big => r.read_u32::<BigEndian>(),
            Endianness32::Little => r.read_u32::<LittleEndian>(),
            other => Ok(other.swap(r.read_u32::<BigEndian>()?)),
        }
    }

    pub fn read_i32<R: Read>(&self, r: &mut R) -> io::Result<i32> {
        self.read_u32(r).map(|v| v as i32)
    }

    pub fn read_f32<R: Read>(&self, r: &mut R) -> io::Result<f32> {
        self.read_u32(r).map(f32::from_bits)
    }

    pub fn write_u64<W: Write>(&self, w: &mut W, v: u64) -> io::Result<()> {
        match self.b64 {
            Endianness64::Big => w.write_u64::<BigEndian>(v),
            Endianness64::Little => w.write_u64::<LittleEndian>(v),
            other => w.write_u64::<BigEndian>(other.swap(v)),
        }
    }

    pub fn write_i64<W: Write>(&self, w: &mut W, v: i64) -> io::Result<()> {
        self.write_u64(w, v as u64)
    }

    pub fn write_f64<W: Write>(&self, w: &mut W, v: f64) -> io::Result<()> {
        self.write_u64(w, v.to_bits())
    }

    pub fn write_u32<W: Write>(&self, w: &mut W, v: u32) -> io::Result<()> {
        match self.b32 {
            Endianness32::Big => w.write_u32::<BigEndian>(v),
            Endianness32::Little => w.write_u32::<LittleEndian>(v),
            other => w.write_u32::<BigEndian>(other.swap(v)),
        }
    }

    pub fn write_i32<W: Write>(&self, w: &mut W, v: i32) -> io::Result<()> {
        self.write_u32(w, v as u32)
    }

    pub fn write_f32<W: Write>(&self, w: &mut W, v: f32) -> io::Result<()> {
        self.write_u32(w, v.to_bits())
    }

    /// Writes a length-prefixed string: a u64 byte length followed by the
    /// raw bytes, no terminator. Anything past [`MAX_STR_LEN`] is dropped.
    pub fn write_string<W: Write>(&self, w: &mut W, s: &str) -> io::Result<()> {
        let bytes = truncated(s);
        self.write_u64(w, bytes.len() as u64)?;
        w.write_all(bytes)
    }

    /// Reads a length-prefixed string. An over-long string is truncated to
    /// [`MAX_STR_LEN`] bytes, the excess is consumed, and a warning is
    /// recorded; the caller still gets the truncated value.
    pub fn read_string<R: Read>(
        &self,
        r: &mut R,
        warnings: &mut Vec<Warning>,
    ) -> Result<String> {
        let declared = self.read_u64(r)?;
        let keep = declared.min(MAX_STR_LEN as u64);
        let mut bytes = vec![0u8; keep as usize];
        r.read_exact(&mut bytes)?;
        if declared > keep {
            warnings.push(Warning::OverlongString { declared });
            io::copy(&mut (&mut *r).take(declared - keep), &mut io::sink())?;
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Byte length [`write_string`](Self::write_string) will produce.
    #[must_use]
    pub fn string_len(s: &str) -> u64 {
        8 + truncated(s).len() as u64
    }

    /// Decodes an already-read 8-byte run.
    #[inline]
    #[must_use]
    pub fn u64_from_bytes(&self, raw: [u8; 8]) -> u64 {
        self.b64.swap(u64::from_be_bytes(raw))
    }
}

fn truncated(s: &str) -> &[u8] {
    let bytes = s.as_bytes();
    if bytes.len() <= MAX_STR_LEN {
        return bytes;
    }
    // Back off to a char boundary so lossy decoding stays clean.
    let mut end = MAX_STR_LEN;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &bytes[..end]
}

#[test]
fn test_swaps_are_involutions() {
    let v32 = 0x0102_0304u32;
    for order in [
        Endianness32::Big,
        Endianness32::Little,
        Endianness32::PairSwapped,
    ] {
        assert_eq!(v32, order.swap(order.swap(v32)));
    }
    let v64 = 0x0102_0304_0506_0708u64;
    for order in [
        Endianness64::Big,
        Endianness64::Little,
        Endianness64::QuadSwapped,
        Endianness64::PairSwapped,
        Endianness64::ByteSwapped,
    ] {
        assert_eq!(v64, order.swap(order.swap(v64)));
    }
    assert_eq!(0x0506_0708_0102_0304, Endianness64::QuadSwapped.swap(v64));
    assert_eq!(0x0304_0102_0708_0506, Endianness64::PairSwapped.swap(v64));
    assert_eq!(0x0201_0403_0605_0807, Endianness64::ByteSwapped.swap(v64));
    assert_eq!(0x0201_0403, Endianness32::PairSwapped.swap(v32));
}

#[test]
fn test_scalar_round_trips() {
    let orders = [
        CANONICAL,
        ByteOrders {
            b32: Endianness32::Little,
            b64: Endianness64::Little,
        },
        ByteOrders {
            b32: Endianness32::PairSwapped,
            b64: Endianness64::QuadSwapped,
        },
        ByteOrders {
            b32: Endianness32::Big,
            b64: Endianness64::ByteSwapped,
        },
    ];
    for orders in orders {
        let mut buf = Vec::new();
        orders.write_u64(&mut buf, 0xDEAD_BEEF_0123_4567).unwrap();
        orders.write_i64(&mut buf, -42).unwrap();
        orders.write_f64(&mut buf, 6.022e23).unwrap();
        orders.write_i32(&mut buf, -7).unwrap();
        orders.write_f32(&mut buf, 1.5f32).unwrap();
        let mut r = buf.as_slice();
        assert_eq!(0xDEAD_BEEF_0123_4567, orders.read_u64(&mut r).unwrap());
        assert_eq!(-42, orders.read_i64(&mut r).unwrap());
        assert_eq!(6.022e23, orders.read_f64(&mut r).unwrap());
        assert_eq!(-7, orders.read_i32(&mut r).unwrap());
        assert_eq!(1.5f32, orders.read_f32(&mut r).unwrap());
        assert!(r.is_empty());
    }
}

#[test]
fn test_strings() {
    let orders = ByteOrders::native();
    let mut buf = Vec::new();
    orders.write_string(&mut buf, "water").unwrap();
    orders.write_string(&mut buf, "").unwrap();
    let mut warnings = Vec::new();
    let mut r = buf.as_slice();
    assert_eq!("water", orders.read_string(&mut r, &mut warnings).unwrap());
    assert_eq!("", orders.read_string(&mut r, &mut warnings).unwrap());
    assert!(warnings.is_empty());

    // An over-long string on disk is truncated and reported as minor,
    // and the cursor still lands past it.
    let long = "x".repeat(MAX_STR_LEN + 10);
    let mut buf = Vec::new();
    orders.write_u64(&mut buf, long.len() as u64).unwrap();
    buf.extend_from_slice(long.as_bytes());
    orders.write_u64(&mut buf, 3).unwrap();
    buf.extend_from_slice(b"end");
    let mut r = buf.as_slice();
    let s = orders.read_string(&mut r, &mut warnings).unwrap();
    assert_eq!(MAX_STR_LEN, s.len());
    assert_eq!(
        vec![Warning::OverlongString {
            declared: long.len() as u64
        }],
        warnings
    );
    assert_eq!("end", orders.read_string(&mut r, &mut warnings).unwrap());
}
