//! Leading `@` annotation lines.

use memchr::memchr;

use crate::error::DocumentParseError;

/// Cut off the run of `@` lines at the start of `bytes`.
///
/// Returns the annotations in source order, without their newlines, and
/// the offset of the first non-annotation line.
pub(crate) fn cut_off_annotations(
    bytes: &[u8],
) -> Result<(Vec<String>, usize), DocumentParseError> {
    let mut annotations = Vec::new();
    let mut offset = 0;
    while bytes.get(offset) == Some(&b'@') {
        let rest = &bytes[offset..];
        let nl = memchr(b'\n', rest).ok_or_else(|| DocumentParseError::MalformedAnnotation {
            line: String::from_utf8_lossy(rest).into_owned(),
        })?;
        annotations.push(String::from_utf8_lossy(&rest[..nl]).into_owned());
        offset += nl + 1;
    }
    Ok((annotations, offset))
}

/// A parsed `@type <name> <major>.<minor>` annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAnnotation {
    pub name: String,
    pub major_version: u32,
    pub minor_version: u32,
}

impl TypeAnnotation {
    /// Parse a type annotation line, with or without its newline.
    pub fn parse(line: &str) -> Option<TypeAnnotation> {
        let rest = line.trim_end().strip_prefix("@type ")?;
        let (name, version) = rest.split_once(' ')?;
        let (major, minor) = version.trim().split_once('.')?;
        Some(TypeAnnotation {
            name: name.to_string(),
            major_version: major.parse().ok()?,
            minor_version: minor.parse().ok()?,
        })
    }
}
