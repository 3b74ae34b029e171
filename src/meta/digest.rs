//! Digests over exact byte ranges of a document.

use std::ops::Range;

use memchr::memmem;
use once_cell::sync::OnceCell;
use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::error::DocumentParseError;

/// Where a digest starts and ends within a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DigestRange {
    /// From the first `start` through the first `end` after it (inclusive),
    /// or through the end of the document without an end marker.
    Markers {
        start: &'static str,
        end: Option<&'static str>,
    },
    /// The whole document.
    Whole,
}

impl DigestRange {
    pub(crate) const fn between(start: &'static str, end: &'static str) -> Self {
        DigestRange::Markers {
            start,
            end: Some(end),
        }
    }

    pub(crate) const fn from(start: &'static str) -> Self {
        DigestRange::Markers { start, end: None }
    }

    /// Locate this range within `bytes`.
    pub(crate) fn locate(&self, bytes: &[u8]) -> Result<Range<usize>, DocumentParseError> {
        let (start, end) = match *self {
            DigestRange::Whole => {
                if bytes.is_empty() {
                    return Err(DocumentParseError::DigestUnavailable {
                        from: String::new(),
                        to: String::new(),
                    });
                }
                return Ok(0..bytes.len());
            }
            DigestRange::Markers { start, end } => (start, end),
        };
        let unavailable = || DocumentParseError::DigestUnavailable {
            from: start.to_string(),
            to: end.unwrap_or("").to_string(),
        };
        let from = memmem::find(bytes, start.as_bytes()).ok_or_else(unavailable)?;
        let to = match end {
            Some(end) => {
                memmem::find(&bytes[from..], end.as_bytes()).ok_or_else(unavailable)?
                    + from
                    + end.len()
            }
            None => bytes.len(),
        };
        if to <= from {
            return Err(unavailable());
        }
        Ok(from..to)
    }
}

/// SHA-1 as 40 lowercase hex characters.
pub(crate) fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

/// SHA-256 as 43 characters of unpadded base64.
pub(crate) fn sha256_base64(bytes: &[u8]) -> String {
    base64::encode_config(Sha256::digest(bytes), base64::STANDARD_NO_PAD)
}

/// One digest of a document: located at parse time, hashed on first use.
#[derive(Debug, Clone)]
struct Slot {
    range: Option<Range<usize>>,
    value: OnceCell<String>,
}

impl Slot {
    fn computed(range: Range<usize>) -> Self {
        Slot {
            range: Some(range),
            value: OnceCell::new(),
        }
    }

    fn given(value: String) -> Self {
        Slot {
            range: None,
            value: OnceCell::with_value(value),
        }
    }

    fn get(&self, bytes: &[u8], hash: fn(&[u8]) -> String) -> &str {
        self.value.get_or_init(|| {
            let range = self.range.clone().unwrap_or(0..0);
            hash(bytes.get(range).unwrap_or_default())
        })
    }
}

/// The memoized digests of a single document.
#[derive(Debug, Clone, Default)]
pub(crate) struct Digests {
    sha1: Option<Slot>,
    sha256: Option<Slot>,
}

impl Digests {
    /// Locate the SHA-1 range now; fails if it cannot be found.
    pub(crate) fn locate_sha1(
        &mut self,
        bytes: &[u8],
        range: DigestRange,
    ) -> Result<(), DocumentParseError> {
        self.sha1 = Some(Slot::computed(range.locate(bytes)?));
        Ok(())
    }

    pub(crate) fn locate_sha256(
        &mut self,
        bytes: &[u8],
        range: DigestRange,
    ) -> Result<(), DocumentParseError> {
        self.sha256 = Some(Slot::computed(range.locate(bytes)?));
        Ok(())
    }

    /// Use a digest stated in the document itself instead of computing one.
    pub(crate) fn set_sha1_hex(&mut self, value: String) {
        self.sha1 = Some(Slot::given(value));
    }

    pub(crate) fn set_sha256_base64(&mut self, value: String) {
        self.sha256 = Some(Slot::given(value));
    }

    pub(crate) fn sha1_hex<'s>(&'s self, bytes: &[u8]) -> Option<&'s str> {
        self.sha1.as_ref().map(|slot| slot.get(bytes, sha1_hex))
    }

    pub(crate) fn sha256_base64<'s>(&'s self, bytes: &[u8]) -> Option<&'s str> {
        self.sha256.as_ref().map(|slot| slot.get(bytes, sha256_base64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_known_digests() {
        assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(
            hex::decode(sha1_hex(b"abc")).unwrap(),
            hex!("a9993e364706816aba3e25717850c26c9cd0d89d")
        );
        assert_eq!(
            sha256_base64(b"abc"),
            "ungWv48Bz+pBQUDeXa4iI7ADYaOWF3qctBD/YfIAFa0"
        );
        assert_eq!(sha256_base64(b"abc").len(), 43);
    }

    #[test]
    fn test_locate_markers() {
        let doc = b"@x\nrouter a\nbandwidth 1\nrouter-signature\n-----BEGIN SIGNATURE-----\n";
        let range = DigestRange::between("router ", "\nrouter-signature\n")
            .locate(doc)
            .unwrap();
        assert_eq!(
            &doc[range],
            b"router a\nbandwidth 1\nrouter-signature\n".as_slice()
        );
        let range = DigestRange::from("bandwidth").locate(doc).unwrap();
        assert!(doc[range].starts_with(b"bandwidth 1"));
    }

    #[test]
    fn test_locate_missing() {
        let doc = b"router a\nbandwidth 1\n";
        let err = DigestRange::between("router ", "\nrouter-signature\n")
            .locate(doc)
            .unwrap_err();
        assert!(matches!(err, DocumentParseError::DigestUnavailable { .. }));
        assert!(DigestRange::from("extra-info ").locate(doc).is_err());
        assert!(DigestRange::Whole.locate(b"").is_err());
    }

    #[test]
    fn test_end_searched_after_start() {
        let doc = b"end\nstart x\nend\n";
        let range = DigestRange::between("start", "end\n").locate(doc).unwrap();
        assert_eq!(&doc[range], b"start x\nend\n".as_slice());
    }

    #[test]
    fn test_memoized_and_stable() {
        let doc = b"router a\nrouter-signature\nzzz";
        let mut d = Digests::default();
        d.locate_sha1(doc, DigestRange::between("router ", "\nrouter-signature\n"))
            .unwrap();
        let first = d.sha1_hex(doc).unwrap().to_string();
        assert_eq!(first, sha1_hex(b"router a\nrouter-signature\n"));
        // trailing content outside the range does not matter
        let other = b"router a\nrouter-signature\nyyyyyy";
        let mut d2 = Digests::default();
        d2.locate_sha1(other, DigestRange::between("router ", "\nrouter-signature\n"))
            .unwrap();
        assert_eq!(d2.sha1_hex(other).unwrap(), first);
        assert!(d.sha256_base64(doc).is_none());
    }

    #[test]
    fn test_given_digest() {
        let mut d = Digests::default();
        d.set_sha1_hex("00ff".into());
        assert_eq!(d.sha1_hex(b"whatever"), Some("00ff"));
    }
}
