//! Entry name encoding.
//!
//! Names that are plain ASCII are written without the UTF-8 flag; anything
//! else is written as UTF-8 with the flag set. The encoded bytes of names read
//! from an archive are kept verbatim, so decoding only has to produce a usable
//! key, not a reversible one.

use super::GpFlags;

/// Whether `name` can be written without the UTF-8 flag.
#[inline]
pub fn can_ascii_encode(name: &str) -> bool {
    name.is_ascii()
}

/// Flags and bytes to use when writing `name`.
pub fn encode(name: &str) -> (GpFlags, Vec<u8>) {
    (GpFlags::new(!can_ascii_encode(name)), name.as_bytes().to_vec())
}

/// Decode a name read from a record.
///
/// Names without the UTF-8 flag are nominally CP437, but most tools write
/// UTF-8 there anyway. Valid UTF-8 is taken as is; otherwise non-ASCII bytes
/// become U+FFFD.
pub fn decode(bytes: &[u8], flags: GpFlags) -> String {
    if flags.is_utf8() {
        return String::from_utf8_lossy(bytes).into_owned();
    }

    match std::str::from_utf8(bytes) {
        Ok(name) => name.to_owned(),
        Err(_) => bytes
            .iter()
            .map(|&b| {
                if b.is_ascii() {
                    b as char
                } else {
                    char::REPLACEMENT_CHARACTER
                }
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_names_have_no_utf8_flag() {
        let (flags, bytes) = encode("res/layout/main.xml");
        assert!(!flags.is_utf8());
        assert_eq!(bytes, b"res/layout/main.xml");
    }

    #[test]
    fn test_non_ascii_names_are_utf8() {
        let (flags, bytes) = encode("c\u{e9}u.txt");
        assert!(flags.is_utf8());
        assert_eq!(decode(&bytes, flags), "c\u{e9}u.txt");
    }

    #[test]
    fn test_decode_invalid_without_flag() {
        let name = decode(&[b'a', 0x82, b'b'], GpFlags::new(false));
        assert_eq!(name, "a\u{fffd}b");
    }
}
