//! Microdescriptors: the small per-relay documents clients fetch in
//! place of full server descriptors.

use std::collections::BTreeMap;
use std::net::IpAddr;

use lazy_static::lazy_static;

use crate::config::ParseOptions;
use crate::error::{DocumentParseError, ErrorContext, GrammarViolation};
use crate::fields::{parse_base64, parse_socket, PortPolicy};
use crate::meta::grammar::{Grammar, ParsedBody};
use crate::meta::{impl_descriptor, split_documents, CryptoBlock, DigestRange, DocumentMeta, Keyword, RawDocument};

pub(crate) const ANCHOR: &str = "onion-key\n";

const SHA256_RANGE: DigestRange = DigestRange::from("onion-key\n");

lazy_static! {
    static ref GRAMMAR: Grammar = Grammar::new("microdescriptor")
        .first(Keyword::OnionKey)
        .exactly_once(&[Keyword::OnionKey])
        .at_most_once(&[
            Keyword::NtorOnionKey,
            Keyword::Family,
            Keyword::FamilyIds,
            Keyword::P,
            Keyword::P6,
        ])
        .any_number(&[Keyword::A, Keyword::Id])
        .objects(&[Keyword::OnionKey]);
}

#[derive(Debug, Clone)]
pub struct Microdescriptor {
    meta: DocumentMeta,
    /// The TAP onion key; newer microdescriptors omit the key block.
    pub onion_key: Option<CryptoBlock>,
    pub ntor_onion_key: Option<String>,
    pub or_addresses: Vec<(IpAddr, u16)>,
    pub family: Vec<String>,
    pub family_ids: Vec<String>,
    pub ipv4_policy: Option<PortPolicy>,
    pub ipv6_policy: Option<PortPolicy>,
    /// Identity keys by key type, such as `rsa1024` or `ed25519`.
    pub ids: BTreeMap<String, String>,
}

impl_descriptor!(Microdescriptor);

impl Microdescriptor {
    pub fn from_str(text: impl AsRef<str>) -> Result<Microdescriptor, DocumentParseError> {
        let raw = RawDocument::new(text.as_ref().as_bytes());
        Self::parse(&raw, &ParseOptions::default())
    }

    /// Parse all microdescriptors in `text`, as served in one response.
    pub fn many_from_str(text: impl AsRef<str>) -> Result<Vec<Microdescriptor>, DocumentParseError> {
        let raw = RawDocument::new(text.as_ref().as_bytes());
        split_documents(raw.as_bytes(), ANCHOR)
            .into_iter()
            .map(|range| Self::parse(&raw.slice(range), &ParseOptions::default()))
            .collect()
    }

    pub fn parse(raw: &RawDocument, options: &ParseOptions) -> Result<Microdescriptor, DocumentParseError> {
        let ParsedBody { mut meta, items } = GRAMMAR.parse(raw, options)?;
        meta.locate_sha256(SHA256_RANGE)?;
        let mut desc = Microdescriptor {
            meta,
            onion_key: None,
            ntor_onion_key: None,
            or_addresses: Vec::new(),
            family: Vec::new(),
            family_ids: Vec::new(),
            ipv4_policy: None,
            ipv6_policy: None,
            ids: BTreeMap::new(),
        };

        for item in items.iter() {
            let line = item.line();
            match item.keyword() {
                Keyword::OnionKey => desc.onion_key = item.object().cloned(),
                Keyword::NtorOnionKey => {
                    let key = item.exact_args(1)?[0];
                    parse_base64(key, 32).context(line)?;
                    desc.ntor_onion_key = Some(key.trim_end_matches('=').to_string());
                }
                Keyword::A => desc
                    .or_addresses
                    .push(parse_socket(item.get_argument()?).context(line)?),
                Keyword::Family => {
                    desc.family = item.split_arguments().into_iter().map(str::to_string).collect()
                }
                Keyword::FamilyIds => {
                    desc.family_ids = item.split_arguments().into_iter().map(str::to_string).collect()
                }
                Keyword::P => {
                    desc.ipv4_policy = Some(PortPolicy::from_args(&item.split_arguments()).context(line)?)
                }
                Keyword::P6 => {
                    desc.ipv6_policy = Some(PortPolicy::from_args(&item.split_arguments()).context(line)?)
                }
                Keyword::Id => {
                    let args = item.exact_args(2)?;
                    if desc.ids.insert(args[0].to_string(), args[1].to_string()).is_some() {
                        return Err(GrammarViolation::DuplicateEntry {
                            what: "microdescriptor id type",
                            key: args[0].to_string(),
                        }
                        .into());
                    }
                }
                _ => {}
            }
        }
        Ok(desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::Descriptor;

    const MICRODESCS: &str = concat!(
        "@last-listed 2023-11-20 12:00:00\n",
        "onion-key\n",
        "-----BEGIN RSA PUBLIC KEY-----\n",
        "AAAA\n",
        "-----END RSA PUBLIC KEY-----\n",
        "ntor-onion-key Ytn9DvcaN6gzD9b/Ufh2WTBBsxUZGUOTHJYHMaY1fTo=\n",
        "a [2001:db8::1]:9001\n",
        "family $9695DFC35FFEB861329B9F1AB04C46397020CE31 seele\n",
        "p accept 80,443\n",
        "id ed25519 Ytn9DvcaN6gzD9b/Ufh2WTBBsxUZGUOTHJYHMaY1fTo\n",
        "onion-key\n",
        "ntor-onion-key Ytn9DvcaN6gzD9b/Ufh2WTBBsxUZGUOTHJYHMaY1fTo\n",
        "p6 accept 1-65535\n",
    );

    #[test]
    fn test_parse_many() {
        let descs = Microdescriptor::many_from_str(MICRODESCS).unwrap();
        assert_eq!(descs.len(), 2);
        let first = &descs[0];
        assert_eq!(first.annotations(), &["@last-listed 2023-11-20 12:00:00".to_string()]);
        assert!(first.onion_key.is_some());
        assert_eq!(first.family.len(), 2);
        assert!(first.ipv4_policy.as_ref().unwrap().allows_port(443));
        assert_eq!(first.ids.get("ed25519").map(String::len), Some(43));
        assert!(first.ipv6_policy.is_none());

        let second = &descs[1];
        assert!(second.onion_key.is_none());
        assert!(second.ipv6_policy.as_ref().unwrap().allows_port(22));
    }

    #[test]
    fn test_digest_starts_at_onion_key() {
        let descs = Microdescriptor::many_from_str(MICRODESCS).unwrap();
        let second_start = MICRODESCS.rfind("onion-key\n").unwrap();
        let first_body = &MICRODESCS["@last-listed 2023-11-20 12:00:00\n".len()..second_start];
        assert_eq!(
            descs[0].digest_sha256_base64(),
            Some(crate::meta::sha256_base64(first_body.as_bytes()).as_str())
        );
        assert!(descs[0].digest_sha1_hex().is_none());
    }

    #[test]
    fn test_duplicate_id_type() {
        let text = "onion-key\nid ed25519 AAAA\nid ed25519 BBBB\n";
        assert!(matches!(
            Microdescriptor::from_str(text).unwrap_err().grammar_violation(),
            Some(GrammarViolation::DuplicateEntry { .. })
        ));
    }

    #[test]
    fn test_onion_key_must_come_first() {
        let text = "ntor-onion-key Ytn9DvcaN6gzD9b/Ufh2WTBBsxUZGUOTHJYHMaY1fTo\nonion-key\n";
        assert!(matches!(
            Microdescriptor::from_str(text).unwrap_err().grammar_violation(),
            Some(GrammarViolation::FirstKeyword { .. })
        ));
    }
}
