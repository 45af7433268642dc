//! CRC-32 hashing utilities.
//!
//! ZIP uses the IEEE 802.3 polynomial for entry checksums and this module is
//! what the archive engine hashes entry contents and backing-file fingerprints
//! with.

use std::io::{self, Read};

/// Compute the CRC-32 of a byte slice.
#[inline]
pub fn hash_bytes(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Compute the CRC-32 of everything a reader yields.
///
/// Returns the checksum and the number of bytes consumed.
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<(u32, u64)> {
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        total += n as u64;
    }

    Ok((hasher.finalize(), total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_hash() {
        assert_eq!(hash_bytes(&[]), 0);
    }

    #[test]
    fn test_known_hash() {
        // Standard check value for CRC-32/ISO-HDLC
        assert_eq!(hash_bytes(b"123456789"), 0xCBF43926);
    }

    #[test]
    fn test_reader_matches_slice() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let (crc, len) = hash_reader(&data[..]).unwrap();
        assert_eq!(crc, hash_bytes(&data));
        assert_eq!(len, data.len() as u64);
    }
}
