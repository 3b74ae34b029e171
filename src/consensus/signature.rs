//! `directory-signature` sections.

use std::collections::BTreeMap;

use lazy_static::lazy_static;

use crate::config::ParseOptions;
use crate::error::{DocumentParseError, ErrorContext, GrammarViolation};
use crate::fields::{parse_hex, Fingerprint};
use crate::meta::grammar::Grammar;
use crate::meta::{split_documents, CryptoBlock, Item, Keyword};

pub(crate) const ANCHOR: &str = "directory-signature ";

lazy_static! {
    static ref GRAMMAR: Grammar = Grammar::new("directory signature")
        .first(Keyword::DirectorySignature)
        .exactly_once(&[Keyword::DirectorySignature])
        .objects(&[Keyword::DirectorySignature]);
}

/// One authority signature over a network status document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySignature {
    /// Digest algorithm, `sha1` unless stated.
    pub algorithm: String,
    pub identity: Fingerprint,
    /// Upper-case hex digest of the signing key.
    pub signing_key_digest: String,
    pub signature: CryptoBlock,
}

impl DirectorySignature {
    fn from_item(item: &Item<'_>) -> Result<DirectorySignature, DocumentParseError> {
        let line = item.line();
        let (algorithm, identity, signing_key) = match item.required_args(2)?[..] {
            [identity, signing_key] => ("sha1", identity, signing_key),
            [algorithm, identity, signing_key] => (algorithm, identity, signing_key),
            _ => {
                return Err(DocumentParseError::FieldValue {
                    line: line.to_string(),
                    source: crate::error::FieldError::UnexpectedArguments(
                        item.args_or_empty().to_string(),
                    ),
                })
            }
        };
        Ok(DirectorySignature {
            algorithm: algorithm.to_string(),
            identity: Fingerprint::from_str_hex(identity).context(line)?,
            signing_key_digest: parse_hex(signing_key, 40).context(line)?,
            signature: item.required_object()?.clone(),
        })
    }
}

/// Parse the signature region; signatures are grouped by authority
/// identity, one per digest algorithm.
pub(crate) fn parse_signatures(
    bytes: &[u8],
    options: &ParseOptions,
    unrecognized: &mut Vec<String>,
) -> Result<BTreeMap<Fingerprint, Vec<DirectorySignature>>, DocumentParseError> {
    let mut signatures: BTreeMap<Fingerprint, Vec<DirectorySignature>> = BTreeMap::new();
    for range in split_documents(bytes, ANCHOR) {
        let items = GRAMMAR.parse_items(&bytes[range], options, unrecognized)?;
        for item in items.iter() {
            let signature = DirectorySignature::from_item(item)?;
            let by_identity = signatures.entry(signature.identity).or_default();
            if by_identity
                .iter()
                .any(|s| s.algorithm == signature.algorithm)
            {
                return Err(GrammarViolation::DuplicateEntry {
                    what: "directory signature",
                    key: format!("{} {}", signature.algorithm, signature.identity),
                }
                .into());
            }
            by_identity.push(signature);
        }
    }
    Ok(signatures)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature(algorithm: &str) -> String {
        format!(
            "directory-signature {algorithm}0232AF901C31A04EE9848595AF9BB7620D4C5B2E 6A8AC6D1D8A8D3B0CC4E0BDD6E2734B3B8C4E5B0\n\
             -----BEGIN SIGNATURE-----\n\
             AAAA\n\
             -----END SIGNATURE-----\n"
        )
    }

    fn parse(text: &str) -> Result<BTreeMap<Fingerprint, Vec<DirectorySignature>>, DocumentParseError> {
        parse_signatures(text.as_bytes(), &ParseOptions::default(), &mut Vec::new())
    }

    #[test]
    fn test_algorithms_per_identity() {
        let text = format!("{}{}", signature(""), signature("sha256 "));
        let signatures = parse(&text).unwrap();
        assert_eq!(signatures.len(), 1);
        let sigs = signatures.values().next().unwrap();
        assert_eq!(sigs[0].algorithm, "sha1");
        assert_eq!(sigs[1].algorithm, "sha256");
        assert_eq!(sigs[1].signature.label(), "SIGNATURE");
    }

    #[test]
    fn test_duplicate_algorithm() {
        let text = format!("{}{}", signature("sha256 "), signature("sha256 "));
        assert!(matches!(
            parse(&text).unwrap_err().grammar_violation(),
            Some(GrammarViolation::DuplicateEntry { what: "directory signature", .. })
        ));
    }

    #[test]
    fn test_signature_needs_block() {
        let text = "directory-signature 0232AF901C31A04EE9848595AF9BB7620D4C5B2E 6A8AC6D1D8A8D3B0CC4E0BDD6E2734B3B8C4E5B0\n";
        assert!(matches!(
            parse(text).unwrap_err(),
            DocumentParseError::MalformedInput { .. }
        ));
    }
}
