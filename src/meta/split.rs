//! Splitting a buffer of concatenated documents into byte ranges.

use std::ops::Range;

use memchr::memmem;

/// Split `bytes` into the ranges of the documents it contains.
///
/// Every document starts with `anchor` at the beginning of a line, or with
/// the annotation lines immediately preceding such an anchor. The first
/// range always starts at offset 0 and the ranges are contiguous, so their
/// concatenation is the input. Without any anchor there are no ranges.
pub fn split_documents(bytes: &[u8], anchor: &str) -> Vec<Range<usize>> {
    let mut starts: Vec<usize> = anchor_positions(bytes, anchor)
        .map(|pos| annotations_start(bytes, pos))
        .collect();
    if starts.is_empty() {
        return Vec::new();
    }
    starts[0] = 0;
    let mut ranges = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(bytes.len());
        ranges.push(start..end);
    }
    ranges
}

/// Offsets of every occurrence of `anchor` at the start of a line.
pub(crate) fn anchor_positions<'a>(
    bytes: &'a [u8],
    anchor: &'a str,
) -> impl Iterator<Item = usize> + 'a {
    memmem::find_iter(bytes, anchor.as_bytes()).filter(move |&pos| is_line_start(bytes, pos))
}

/// Offset of the first occurrence of `anchor` at a line start, searching from `from`.
pub(crate) fn find_line_start(bytes: &[u8], anchor: &str, from: usize) -> Option<usize> {
    let tail = bytes.get(from..)?;
    memmem::find_iter(tail, anchor.as_bytes())
        .map(|pos| pos + from)
        .find(|&pos| is_line_start(bytes, pos))
}

fn is_line_start(bytes: &[u8], pos: usize) -> bool {
    pos == 0 || bytes[pos - 1] == b'\n'
}

/// Walk back from a line start over the `@` lines directly above it.
fn annotations_start(bytes: &[u8], mut pos: usize) -> usize {
    while pos > 0 {
        let prev_start = bytes[..pos - 1]
            .iter()
            .rposition(|&b| b == b'\n')
            .map(|nl| nl + 1)
            .unwrap_or(0);
        if bytes[prev_start] != b'@' {
            break;
        }
        pos = prev_start;
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pieces<'a>(bytes: &'a [u8], ranges: &[Range<usize>]) -> Vec<&'a str> {
        ranges
            .iter()
            .map(|r| std::str::from_utf8(&bytes[r.clone()]).unwrap())
            .collect()
    }

    #[test]
    fn test_split_two() {
        let raw = b"router a\nbandwidth 1\nrouter b\nbandwidth 2\n";
        let ranges = split_documents(raw, "router ");
        assert_eq!(
            pieces(raw, &ranges),
            vec!["router a\nbandwidth 1\n", "router b\nbandwidth 2\n"]
        );
    }

    #[test]
    fn test_split_concatenation_is_identity() {
        let raw: &[u8] =
            b"@type server-descriptor 1.0\nrouter a\nx\n@purpose bridge\n@a\nrouter b\ny\nrouter c\n";
        let ranges = split_documents(raw, "router ");
        assert_eq!(ranges.len(), 3);
        let joined: Vec<u8> = ranges.iter().flat_map(|r| raw[r.clone()].to_vec()).collect();
        assert_eq!(joined, raw);
    }

    #[test]
    fn test_annotations_belong_to_next_document() {
        let raw = b"router a\nx\n@purpose bridge\nrouter b\n";
        let ranges = split_documents(raw, "router ");
        assert_eq!(
            pieces(raw, &ranges),
            vec!["router a\nx\n", "@purpose bridge\nrouter b\n"]
        );
    }

    #[test]
    fn test_anchor_at_offset_zero() {
        let raw = b"onion-key\nA\nonion-key\nB\n";
        let ranges = split_documents(raw, "onion-key\n");
        assert_eq!(ranges, vec![0..12, 12..24]);
    }

    #[test]
    fn test_anchor_only_at_line_start() {
        let raw = b"router a\ncontact router b\nrouterx\n";
        let ranges = split_documents(raw, "router ");
        assert_eq!(ranges, vec![0..raw.len()]);
    }

    #[test]
    fn test_no_anchor() {
        assert!(split_documents(b"extra-info a b\n", "router ").is_empty());
        assert!(split_documents(b"", "router ").is_empty());
    }

    #[test]
    fn test_find_line_start() {
        let raw = b"r a\nrr b\nr c\n";
        assert_eq!(find_line_start(raw, "r ", 0), Some(0));
        assert_eq!(find_line_start(raw, "r ", 1), Some(9));
        assert_eq!(find_line_start(raw, "r ", 10), None);
        assert_eq!(find_line_start(raw, "r ", 100), None);
    }
}
