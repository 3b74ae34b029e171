//! The authority sections of votes and consensuses.

use std::net::Ipv4Addr;

use lazy_static::lazy_static;

use crate::config::ParseOptions;
use crate::error::{DocumentParseError, ErrorContext, FieldError, GrammarViolation};
use crate::fields::{parse_hex, parse_ipv4, parse_port, Fingerprint};
use crate::meta::grammar::Grammar;
use crate::meta::{split_documents, Item, Keyword};

use super::SharedRandValue;

pub(crate) const ANCHOR: &str = "dir-source ";

lazy_static! {
    static ref CONSENSUS_GRAMMAR: Grammar = Grammar::new("dir-source entry")
        .first(Keyword::DirSource)
        .exactly_once(&[Keyword::DirSource])
        .at_most_once(&[Keyword::Contact, Keyword::VoteDigest]);
    static ref VOTE_GRAMMAR: Grammar = Grammar::new("vote authority section")
        .first(Keyword::DirSource)
        .exactly_once(&[Keyword::DirSource])
        .at_most_once(&[
            Keyword::Contact,
            Keyword::LegacyDirKey,
            Keyword::SharedRandParticipate,
            Keyword::SharedRandPreviousValue,
            Keyword::SharedRandCurrentValue,
        ])
        .any_number(&[Keyword::SharedRandCommit]);
}

/// A `dir-source` entry: one authority that contributed to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirSourceEntry {
    pub nickname: String,
    pub identity: Fingerprint,
    pub hostname: String,
    pub address: Ipv4Addr,
    pub dir_port: u16,
    pub or_port: u16,
    /// Entries for an authority's legacy key have a `-legacy` nickname suffix.
    pub is_legacy: bool,
    pub contact: Option<String>,
    /// Upper-case hex digest of the vote this authority contributed.
    pub vote_digest: Option<String>,
}

impl DirSourceEntry {
    fn from_line(item: &Item<'_>) -> Result<DirSourceEntry, DocumentParseError> {
        let line = item.line();
        let args = item.exact_args(6)?;
        // authority nicknames are not restricted like relay nicknames
        let nickname = args[0].to_string();
        Ok(DirSourceEntry {
            is_legacy: nickname.ends_with("-legacy"),
            nickname,
            identity: Fingerprint::from_str_hex(args[1]).context(line)?,
            hostname: args[2].to_string(),
            address: parse_ipv4(args[3]).context(line)?,
            dir_port: parse_port(args[4]).context(line)?,
            or_port: parse_port(args[5]).context(line)?,
            contact: None,
            vote_digest: None,
        })
    }

    fn from_items(items: &[Item<'_>]) -> Result<DirSourceEntry, DocumentParseError> {
        let mut entry = None;
        let mut contact = None;
        let mut vote_digest = None;
        for item in items {
            match item.keyword() {
                Keyword::DirSource => entry = Some(DirSourceEntry::from_line(item)?),
                Keyword::Contact => contact = Some(item.args_or_empty().to_string()),
                Keyword::VoteDigest => {
                    vote_digest = Some(parse_hex(item.exact_args(1)?[0], 40).context(item.line())?)
                }
                _ => {}
            }
        }
        let entry = entry.ok_or(GrammarViolation::NotExactlyOnce {
            keyword: Keyword::DirSource,
            count: 0,
        })?;
        Ok(DirSourceEntry {
            contact,
            vote_digest,
            ..entry
        })
    }
}

/// Parse the dir-source region of a consensus.
pub(crate) fn parse_dir_sources(
    bytes: &[u8],
    options: &ParseOptions,
    unrecognized: &mut Vec<String>,
) -> Result<Vec<DirSourceEntry>, DocumentParseError> {
    let mut entries: Vec<DirSourceEntry> = Vec::new();
    for range in split_documents(bytes, ANCHOR) {
        let items = CONSENSUS_GRAMMAR.parse_items(&bytes[range], options, unrecognized)?;
        let entry = DirSourceEntry::from_items(&items)?;
        if entries
            .iter()
            .any(|e| e.identity == entry.identity && e.is_legacy == entry.is_legacy)
        {
            return Err(GrammarViolation::DuplicateEntry {
                what: "dir-source",
                key: entry.identity.to_string(),
            }
            .into());
        }
        entries.push(entry);
    }
    Ok(entries)
}

/// The lines describing the authority that signed a vote, minus its key
/// certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteAuthority {
    pub dir_source: DirSourceEntry,
    pub legacy_dir_key: Option<Fingerprint>,
    pub shared_rand_participate: bool,
    /// Arguments of each `shared-rand-commit` line.
    pub shared_rand_commits: Vec<String>,
    pub shared_rand_previous_value: Option<SharedRandValue>,
    pub shared_rand_current_value: Option<SharedRandValue>,
}

impl VoteAuthority {
    pub(crate) fn parse(
        bytes: &[u8],
        options: &ParseOptions,
        unrecognized: &mut Vec<String>,
    ) -> Result<VoteAuthority, DocumentParseError> {
        let items = VOTE_GRAMMAR.parse_items(bytes, options, unrecognized)?;
        let mut legacy_dir_key = None;
        let mut shared_rand_participate = false;
        let mut shared_rand_commits = Vec::new();
        let mut shared_rand_previous_value = None;
        let mut shared_rand_current_value = None;
        for item in items.iter() {
            let line = item.line();
            match item.keyword() {
                Keyword::LegacyDirKey => {
                    legacy_dir_key = Some(Fingerprint::from_str_hex(item.get_argument()?).context(line)?)
                }
                Keyword::SharedRandParticipate => {
                    if let Some(args) = item.args() {
                        return Err(FieldError::UnexpectedArguments(args.to_string())).context(line);
                    }
                    shared_rand_participate = true;
                }
                Keyword::SharedRandCommit => {
                    shared_rand_commits.push(item.required_args(4)?.join(" "))
                }
                Keyword::SharedRandPreviousValue => {
                    shared_rand_previous_value = Some(SharedRandValue::from_item(item)?)
                }
                Keyword::SharedRandCurrentValue => {
                    shared_rand_current_value = Some(SharedRandValue::from_item(item)?)
                }
                _ => {}
            }
        }
        Ok(VoteAuthority {
            dir_source: DirSourceEntry::from_items(&items)?,
            legacy_dir_key,
            shared_rand_participate,
            shared_rand_commits,
            shared_rand_previous_value,
            shared_rand_current_value,
        })
    }
}
