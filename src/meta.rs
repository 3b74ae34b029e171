//! The general meta format shared by all Tor documents, and the engine
//! that turns raw bytes into keyword items.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

mod annotation;
mod cardinality;
mod crypto;
mod digest;
pub(crate) mod grammar;
mod keyword;
mod split;
mod tokenize;

pub use annotation::TypeAnnotation;
pub(crate) use annotation::cut_off_annotations;
pub use crypto::CryptoBlock;
pub(crate) use digest::{sha1_hex, sha256_base64, DigestRange, Digests};
pub use keyword::Keyword;
pub use split::split_documents;
pub(crate) use split::find_line_start;
pub use tokenize::Item;

/// A document's bytes: a shared buffer plus the range of this document.
///
/// Cloning and slicing never copy the underlying buffer.
#[derive(Clone)]
pub struct RawDocument {
    buf: Arc<[u8]>,
    range: Range<usize>,
}

impl RawDocument {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        let buf = bytes.into();
        let range = 0..buf.len();
        RawDocument { buf, range }
    }

    pub(crate) fn from_shared(buf: Arc<[u8]>, range: Range<usize>) -> Self {
        let end = range.end.min(buf.len());
        let start = range.start.min(end);
        RawDocument {
            buf,
            range: start..end,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[self.range.clone()]
    }

    /// Offset of this document within its buffer.
    pub fn offset(&self) -> usize {
        self.range.start
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// A sub-document, relative to this one. Out-of-range bounds are clamped.
    pub fn slice(&self, range: Range<usize>) -> RawDocument {
        let start = self.range.start + range.start.min(self.len());
        let end = self.range.start + range.end.min(self.len());
        RawDocument::from_shared(self.buf.clone(), start..end.max(start))
    }

    /// Up to `n` leading bytes, for error messages.
    pub(crate) fn prefix(&self, n: usize) -> String {
        let bytes = self.as_bytes();
        String::from_utf8_lossy(&bytes[..n.min(bytes.len())]).into_owned()
    }
}

impl fmt::Debug for RawDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawDocument")
            .field("offset", &self.range.start)
            .field("len", &self.len())
            .finish()
    }
}

impl PartialEq for RawDocument {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for RawDocument {}

/// What every parsed document carries besides its typed fields.
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    raw: RawDocument,
    annotations: Vec<String>,
    unrecognized_lines: Vec<String>,
    digests: Digests,
}

impl DocumentMeta {
    pub(crate) fn new(
        raw: RawDocument,
        annotations: Vec<String>,
        unrecognized_lines: Vec<String>,
    ) -> Self {
        DocumentMeta {
            raw,
            annotations,
            unrecognized_lines,
            digests: Digests::default(),
        }
    }

    /// The document's bytes, without leading annotations.
    pub fn raw(&self) -> &RawDocument {
        &self.raw
    }

    pub fn annotations(&self) -> &[String] {
        &self.annotations
    }

    pub fn unrecognized_lines(&self) -> &[String] {
        &self.unrecognized_lines
    }

    pub(crate) fn add_unrecognized_lines(&mut self, lines: Vec<String>) {
        self.unrecognized_lines.extend(lines);
    }

    /// Locate the SHA-1 digest range, failing the parse if it is missing.
    pub(crate) fn locate_sha1(&mut self, range: DigestRange) -> Result<(), crate::error::DocumentParseError> {
        self.digests.locate_sha1(self.raw.as_bytes(), range)
    }

    pub(crate) fn locate_sha256(&mut self, range: DigestRange) -> Result<(), crate::error::DocumentParseError> {
        self.digests.locate_sha256(self.raw.as_bytes(), range)
    }

    pub(crate) fn set_sha1_hex(&mut self, value: String) {
        self.digests.set_sha1_hex(value);
    }

    pub(crate) fn set_sha256_base64(&mut self, value: String) {
        self.digests.set_sha256_base64(value);
    }

    pub fn digest_sha1_hex(&self) -> Option<&str> {
        self.digests.sha1_hex(self.raw.as_bytes())
    }

    pub fn digest_sha256_base64(&self) -> Option<&str> {
        self.digests.sha256_base64(self.raw.as_bytes())
    }
}

/// Access shared by all parsed documents.
pub trait Descriptor {
    fn meta(&self) -> &DocumentMeta;

    /// The exact bytes this document was parsed from, minus annotations.
    fn raw_bytes(&self) -> &[u8] {
        self.meta().raw().as_bytes()
    }

    fn annotations(&self) -> &[String] {
        self.meta().annotations()
    }

    fn unrecognized_lines(&self) -> &[String] {
        self.meta().unrecognized_lines()
    }

    /// SHA-1 digest as lowercase hex, for types that have one.
    fn digest_sha1_hex(&self) -> Option<&str> {
        self.meta().digest_sha1_hex()
    }

    /// SHA-256 digest as unpadded base64, for types that have one.
    fn digest_sha256_base64(&self) -> Option<&str> {
        self.meta().digest_sha256_base64()
    }
}

/// Implement [`Descriptor`] for a type with a `meta: DocumentMeta` field.
macro_rules! impl_descriptor {
    ($($t:ty),* $(,)?) => {
        $(
            impl $crate::meta::Descriptor for $t {
                fn meta(&self) -> &$crate::meta::DocumentMeta {
                    &self.meta
                }
            }
        )*
    };
}
pub(crate) use impl_descriptor;
