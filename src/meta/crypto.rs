//! Opaque PEM-style blocks embedded in documents.
//!
//! Blocks are collected by a small state machine: outside a block, a
//! `-----BEGIN ...-----` line opens one; inside, every line is kept
//! verbatim until the `-----END ...-----` line.

use std::fmt;

use nom::bytes::complete::{tag, take_until};
use nom::combinator::eof;
use nom::sequence::{delimited, terminated};
use nom::IResult;

use crate::error::{DocumentParseError, FieldError};

use super::Keyword;

const BEGIN: &str = "-----BEGIN ";
const END: &str = "-----END ";

/// A crypto block, from its BEGIN line through its END line.
#[derive(Clone, PartialEq, Eq)]
pub struct CryptoBlock {
    /// Keyword of the line that introduced this block.
    keyword: Keyword,
    /// The label between `BEGIN ` and the trailing dashes.
    label: String,
    /// Verbatim text, including line terminators.
    text: String,
}

impl CryptoBlock {
    pub fn keyword(&self) -> Keyword {
        self.keyword
    }

    /// The block's label, like `RSA PUBLIC KEY` or `SIGNATURE`.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The lines of this block, without terminators.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines()
    }

    /// Decode the base64 payload between the marker lines.
    pub fn decode(&self) -> Result<Vec<u8>, FieldError> {
        let mut payload = String::new();
        for line in self.lines() {
            if line.starts_with(BEGIN) || line.starts_with(END) {
                continue;
            }
            payload.extend(line.chars().filter(|c| !c.is_whitespace()));
        }
        let trimmed = payload.trim_end_matches('=');
        base64::decode_config(trimmed, base64::STANDARD_NO_PAD).map_err(|_| {
            FieldError::InvalidBase64 {
                raw: payload.clone(),
                expected_len: 0,
            }
        })
    }
}

impl fmt::Debug for CryptoBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoBlock")
            .field("keyword", &self.keyword)
            .field("label", &self.label)
            .field("len", &self.text.len())
            .finish()
    }
}

impl fmt::Display for CryptoBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn begin_marker(i: &str) -> IResult<&str, &str> {
    terminated(delimited(tag(BEGIN), take_until("-----"), tag("-----")), eof)(i)
}

fn end_marker(i: &str) -> IResult<&str, &str> {
    terminated(delimited(tag(END), take_until("-----"), tag("-----")), eof)(i)
}

/// Return the label if `line` (without terminator) opens a block.
pub(crate) fn is_begin_marker(line: &str) -> Option<&str> {
    begin_marker(line.trim_end()).ok().map(|(_, label)| label)
}

pub(crate) fn is_end_marker(line: &str) -> bool {
    end_marker(line.trim_end()).is_ok()
}

#[derive(Debug)]
enum State {
    Outside,
    Inside {
        keyword: Keyword,
        label: String,
        text: String,
    },
}

/// What the extractor did with a line.
#[derive(Debug)]
pub(crate) enum Feed {
    /// The line is not part of a block.
    Passed,
    /// The line was accumulated into the open block.
    Consumed,
    /// The line closed a block.
    Finished(CryptoBlock),
}

/// Two-state accumulator for crypto blocks.
#[derive(Debug)]
pub(crate) struct CryptoBlockExtractor {
    state: State,
}

impl CryptoBlockExtractor {
    pub(crate) fn new() -> Self {
        CryptoBlockExtractor {
            state: State::Outside,
        }
    }

    pub(crate) fn is_inside(&self) -> bool {
        matches!(self.state, State::Inside { .. })
    }

    /// Feed one line (`line` without, `raw` with its terminator).
    ///
    /// `current` is the keyword of the last keyword line seen.
    pub(crate) fn feed(
        &mut self,
        line: &str,
        raw: &str,
        current: Keyword,
    ) -> Result<Feed, DocumentParseError> {
        match &mut self.state {
            State::Outside => match is_begin_marker(line) {
                Some(label) => {
                    self.state = State::Inside {
                        keyword: current,
                        label: label.to_string(),
                        text: raw.to_string(),
                    };
                    Ok(Feed::Consumed)
                }
                None => Ok(Feed::Passed),
            },
            State::Inside { keyword, text, .. } => {
                if is_begin_marker(line).is_some() {
                    return Err(DocumentParseError::UnterminatedCryptoBlock {
                        keyword: keyword.as_str().to_string(),
                    });
                }
                text.push_str(raw);
                if !is_end_marker(line) {
                    return Ok(Feed::Consumed);
                }
                match std::mem::replace(&mut self.state, State::Outside) {
                    State::Inside {
                        keyword,
                        label,
                        text,
                    } => Ok(Feed::Finished(CryptoBlock {
                        keyword,
                        label,
                        text,
                    })),
                    State::Outside => Ok(Feed::Passed),
                }
            }
        }
    }

    /// Signal end of input; fails if a block is still open.
    pub(crate) fn finish(self) -> Result<(), DocumentParseError> {
        match self.state {
            State::Outside => Ok(()),
            State::Inside { keyword, .. } => Err(DocumentParseError::UnterminatedCryptoBlock {
                keyword: keyword.as_str().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(lines: &[&str]) -> Result<Vec<CryptoBlock>, DocumentParseError> {
        let mut ex = CryptoBlockExtractor::new();
        let mut blocks = Vec::new();
        for line in lines {
            let raw = format!("{line}\n");
            if let Feed::Finished(b) = ex.feed(line, &raw, Keyword::SigningKey)? {
                blocks.push(b);
            }
        }
        ex.finish()?;
        Ok(blocks)
    }

    #[test]
    fn test_markers() {
        assert_eq!(
            is_begin_marker("-----BEGIN RSA PUBLIC KEY-----"),
            Some("RSA PUBLIC KEY")
        );
        assert_eq!(is_begin_marker("-----BEGIN SIGNATURE-----  "), Some("SIGNATURE"));
        assert_eq!(is_begin_marker("-----BEGIN SIGNATURE"), None);
        assert_eq!(is_begin_marker("router foo"), None);
        assert!(is_end_marker("-----END SIGNATURE-----"));
        assert!(!is_end_marker("-----END SIGNATURE----- trailing"));
    }

    #[test]
    fn test_single_block() {
        let blocks = run(&[
            "-----BEGIN RSA PUBLIC KEY-----",
            "MIGJAoGBAKj",
            "-----END RSA PUBLIC KEY-----",
        ])
        .unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].keyword(), Keyword::SigningKey);
        assert_eq!(blocks[0].label(), "RSA PUBLIC KEY");
        assert_eq!(
            blocks[0].as_str(),
            "-----BEGIN RSA PUBLIC KEY-----\nMIGJAoGBAKj\n-----END RSA PUBLIC KEY-----\n"
        );
    }

    #[test]
    fn test_keyword_lines_inside_are_payload() {
        let blocks = run(&[
            "-----BEGIN SIGNATURE-----",
            "router foo 1.2.3.4 9001 0 0",
            "-----END SIGNATURE-----",
        ])
        .unwrap();
        assert!(blocks[0].as_str().contains("\nrouter foo 1.2.3.4 9001 0 0\n"));
    }

    #[test]
    fn test_unterminated() {
        let err = run(&["-----BEGIN SIGNATURE-----", "AAAA"]).unwrap_err();
        assert!(matches!(
            err,
            DocumentParseError::UnterminatedCryptoBlock { keyword } if keyword == "signing-key"
        ));
    }

    #[test]
    fn test_nested_begin() {
        let err = run(&[
            "-----BEGIN SIGNATURE-----",
            "-----BEGIN SIGNATURE-----",
            "-----END SIGNATURE-----",
        ])
        .unwrap_err();
        assert!(matches!(err, DocumentParseError::UnterminatedCryptoBlock { .. }));
    }

    #[test]
    fn test_decode() {
        let blocks = run(&[
            "-----BEGIN ED25519 CERT-----",
            "AQQA",
            "Zm9v",
            "-----END ED25519 CERT-----",
        ])
        .unwrap();
        assert_eq!(
            blocks[0].decode().unwrap(),
            base64::decode("AQQAZm9v").unwrap()
        );
    }
}
