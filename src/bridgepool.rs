//! Bridge pool assignments: which distribution pool BridgeDB put each
//! bridge into.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;

use crate::config::ParseOptions;
use crate::error::{DocumentParseError, ErrorContext, GrammarViolation};
use crate::fields::{parse_timestamp, Fingerprint};
use crate::meta::grammar::{Grammar, ParsedBody};
use crate::meta::{impl_descriptor, DigestRange, DocumentMeta, Keyword, RawDocument};

pub(crate) const ANCHOR: &str = "bridge-pool-assignment ";

lazy_static! {
    // every other line starts with a fingerprint
    static ref GRAMMAR: Grammar = Grammar::new("bridge pool assignment")
        .first(Keyword::BridgePoolAssignment)
        .exactly_once(&[Keyword::BridgePoolAssignment])
        .free_form();
}

#[derive(Debug, Clone)]
pub struct BridgePoolAssignment {
    meta: DocumentMeta,
    pub published: DateTime<Utc>,
    /// Assignment details by hashed bridge fingerprint, for example
    /// `https ring=3 flag=stable`.
    pub entries: BTreeMap<Fingerprint, String>,
}

impl_descriptor!(BridgePoolAssignment);

impl BridgePoolAssignment {
    pub fn from_str(text: impl AsRef<str>) -> Result<BridgePoolAssignment, DocumentParseError> {
        let raw = RawDocument::new(text.as_ref().as_bytes());
        Self::parse(&raw, &ParseOptions::default())
    }

    pub fn parse(
        raw: &RawDocument,
        options: &ParseOptions,
    ) -> Result<BridgePoolAssignment, DocumentParseError> {
        let ParsedBody { mut meta, items } = GRAMMAR.parse(raw, options)?;
        meta.locate_sha256(DigestRange::Whole)?;

        let mut published = None;
        let mut entries = BTreeMap::new();
        for item in items.iter() {
            let line = item.line();
            if item.keyword() == Keyword::BridgePoolAssignment {
                published = Some(parse_timestamp(item.get_argument()?).context(line)?);
                continue;
            }
            let fingerprint = Fingerprint::from_str_hex(item.token()).context(line)?;
            let assignment = item.get_argument()?.to_string();
            if entries.insert(fingerprint, assignment).is_some() {
                return Err(GrammarViolation::DuplicateEntry {
                    what: "bridge pool entry",
                    key: fingerprint.to_string(),
                }
                .into());
            }
        }
        let published = published.ok_or(GrammarViolation::NotExactlyOnce {
            keyword: Keyword::BridgePoolAssignment,
            count: 0,
        })?;
        Ok(BridgePoolAssignment {
            meta,
            published,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::Descriptor;
    use chrono::TimeZone;

    const ASSIGNMENT: &str = concat!(
        "@type bridge-pool-assignment 1.0\n",
        "bridge-pool-assignment 2011-03-13 14:38:03\n",
        "00b834117566035736fc6bd4ece950eace8e057a unallocated\n",
        "00bd6ab3fe8beef5ab3d0fa96b1cf7f3a4a1db0e https ring=3 flag=stable\n",
        "00c6b8fc5b4d37d2c5e6ab5b2ea7d0b21c4b4a07 email port=443 flag=running\n",
    );

    #[test]
    fn test_parse_assignment() {
        let pool = BridgePoolAssignment::from_str(ASSIGNMENT).unwrap();
        assert_eq!(pool.published, Utc.with_ymd_and_hms(2011, 3, 13, 14, 38, 3).unwrap());
        assert_eq!(pool.entries.len(), 3);
        let fp = Fingerprint::from_str_hex("00bd6ab3fe8beef5ab3d0fa96b1cf7f3a4a1db0e").unwrap();
        assert_eq!(pool.entries[&fp], "https ring=3 flag=stable");
        assert!(pool.unrecognized_lines().is_empty());
        let body = &ASSIGNMENT[ASSIGNMENT.find("bridge-pool-assignment 2011").unwrap()..];
        assert_eq!(
            pool.digest_sha256_base64(),
            Some(crate::meta::sha256_base64(body.as_bytes()).as_str())
        );
    }

    #[test]
    fn test_bad_fingerprint() {
        let text = "bridge-pool-assignment 2011-03-13 14:38:03\nnot-a-fingerprint https\n";
        assert!(matches!(
            BridgePoolAssignment::from_str(text).unwrap_err(),
            DocumentParseError::FieldValue { .. }
        ));
    }

    #[test]
    fn test_duplicate_bridge() {
        let text = concat!(
            "bridge-pool-assignment 2011-03-13 14:38:03\n",
            "00b834117566035736fc6bd4ece950eace8e057a unallocated\n",
            "00b834117566035736fc6bd4ece950eace8e057a https ring=1\n",
        );
        assert!(matches!(
            BridgePoolAssignment::from_str(text).unwrap_err().grammar_violation(),
            Some(GrammarViolation::DuplicateEntry { .. })
        ));
    }
}
