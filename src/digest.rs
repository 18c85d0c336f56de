//! The 16-byte content digest protecting block payloads.
//!
//! The digest covers content bytes only, never the header. An all-zero
//! stored digest means "not computed" and is never verified.

use md5::{Digest, Md5};

/// Length of a stored content digest.
pub const HASH_LEN: usize = 16;

/// MD5 over the block content.
#[must_use]
pub fn content_digest(content: &[u8]) -> [u8; HASH_LEN] {
    let mut hasher = Md5::new();
    hasher.update(content);
    hasher.finalize().into()
}

/// Whether a stored digest is the "not computed" sentinel.
#[must_use]
pub fn is_zero(digest: &[u8; HASH_LEN]) -> bool {
    digest.iter().all(|&b| b == 0)
}

#[test]
fn test_digest() {
    // RFC 1321 reference values.
    assert_eq!(
        [
            0xd4, 0x1d, 0x8c, 0xd9, 0x8f, 0x00, 0xb2, 0x04, 0xe9, 0x80, 0x09, 0x98, 0xec, 0xf8,
            0x42, 0x7e
        ],
        content_digest(b"")
    );
    assert_eq!(
        [
            0x90, 0x01, 0x50, 0x98, 0x3c, 0xd2, 0x4f, 0xb0, 0xd6, 0x96, 0x3f, 0x7d, 0x28, 0xe1,
            0x7f, 0x72
        ],
        content_digest(b"abc")
    );
    assert!(is_zero(&[0; HASH_LEN]));
    assert!(!is_zero(&content_digest(b"abc")));
}
