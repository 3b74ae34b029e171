//! Exit lists, which record the addresses that exit relays were seen
//! using when connecting out.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::config::ParseOptions;
use crate::error::{DocumentParseError, ErrorContext, GrammarViolation};
use crate::fields::{parse_ipv4, parse_timestamp, parse_timestamp_parts, Fingerprint};
use crate::meta::grammar::Grammar;
use crate::meta::{
    cut_off_annotations, find_line_start, impl_descriptor, split_documents, DigestRange,
    DocumentMeta, Item, Keyword, RawDocument,
};

pub(crate) const ENTRY_ANCHOR: &str = "ExitNode ";

lazy_static! {
    static ref HEADER: Grammar = Grammar::new("exit list header").at_most_once(&[Keyword::Downloaded]);
    static ref ENTRY: Grammar = Grammar::new("exit list entry")
        .first(Keyword::ExitNode)
        .exactly_once(&[Keyword::ExitNode, Keyword::ExitPublished, Keyword::LastStatus])
        .at_least_once(&[Keyword::ExitAddress]);
    /// `2023-11-20-12-02-00`
    static ref FILENAME: Regex =
        Regex::new(r"^\d{4}-\d{2}-\d{2}-\d{2}-\d{2}-\d{2}$").expect("valid regex");
}

/// The download time encoded in an exit list file name.
pub fn download_time_from_filename(filename: &str) -> Option<DateTime<Utc>> {
    let name = filename.rsplit(['/', '\\']).next()?;
    if !FILENAME.is_match(name) {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(name, "%Y-%m-%d-%H-%M-%S").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// One relay in an exit list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitListEntry {
    pub fingerprint: Fingerprint,
    pub published: DateTime<Utc>,
    pub last_status: DateTime<Utc>,
    /// When each exit address was last seen.
    pub exit_addresses: BTreeMap<Ipv4Addr, DateTime<Utc>>,
}

impl ExitListEntry {
    fn from_items(items: &[Item<'_>]) -> Result<ExitListEntry, DocumentParseError> {
        let mut fingerprint = None;
        let mut published = None;
        let mut last_status = None;
        let mut exit_addresses = BTreeMap::new();
        for item in items {
            let line = item.line();
            match item.keyword() {
                Keyword::ExitNode => {
                    fingerprint = Some(Fingerprint::from_str_hex(item.exact_args(1)?[0]).context(line)?)
                }
                Keyword::ExitPublished => {
                    published = Some(parse_timestamp(item.get_argument()?).context(line)?)
                }
                Keyword::LastStatus => {
                    last_status = Some(parse_timestamp(item.get_argument()?).context(line)?)
                }
                Keyword::ExitAddress => {
                    let args = item.exact_args(3)?;
                    let address = parse_ipv4(args[0]).context(line)?;
                    let seen = parse_timestamp_parts(args[1], args[2]).context(line)?;
                    // keep the latest sighting of an address
                    let latest = exit_addresses.entry(address).or_insert(seen);
                    if seen > *latest {
                        *latest = seen;
                    }
                }
                _ => {}
            }
        }
        let missing = |keyword| GrammarViolation::NotExactlyOnce { keyword, count: 0 };
        Ok(ExitListEntry {
            fingerprint: fingerprint.ok_or_else(|| missing(Keyword::ExitNode))?,
            published: published.ok_or_else(|| missing(Keyword::ExitPublished))?,
            last_status: last_status.ok_or_else(|| missing(Keyword::LastStatus))?,
            exit_addresses,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExitList {
    meta: DocumentMeta,
    pub downloaded: DateTime<Utc>,
    pub entries: Vec<ExitListEntry>,
}

impl_descriptor!(ExitList);

impl ExitList {
    /// Parse an exit list. Lists without a `Downloaded` line take the
    /// download time from `filename`.
    pub fn parse(
        raw: &RawDocument,
        filename: Option<&str>,
        options: &ParseOptions,
    ) -> Result<ExitList, DocumentParseError> {
        let (annotations, offset) = cut_off_annotations(raw.as_bytes())?;
        let body_raw = raw.slice(offset..raw.len());
        let body = body_raw.as_bytes();
        let entries_start = find_line_start(body, ENTRY_ANCHOR, 0).unwrap_or(body.len());

        let mut unrecognized = Vec::new();
        let mut downloaded = None;
        for item in HEADER.parse_items(&body[..entries_start], options, &mut unrecognized)? {
            if item.keyword() == Keyword::Downloaded {
                downloaded = Some(parse_timestamp(item.get_argument()?).context(item.line())?);
            }
        }
        let downloaded = downloaded
            .or_else(|| filename.and_then(download_time_from_filename))
            .ok_or(GrammarViolation::NotExactlyOnce {
                keyword: Keyword::Downloaded,
                count: 0,
            })?;

        let entries_bytes = &body[entries_start..];
        let mut entries = Vec::new();
        for range in split_documents(entries_bytes, ENTRY_ANCHOR) {
            let items = ENTRY.parse_items(&entries_bytes[range], options, &mut unrecognized)?;
            entries.push(ExitListEntry::from_items(&items)?);
        }

        let mut meta = DocumentMeta::new(body_raw.clone(), annotations, unrecognized);
        meta.locate_sha256(DigestRange::Whole)?;
        Ok(ExitList {
            meta,
            downloaded,
            entries,
        })
    }

    pub fn from_str(text: impl AsRef<str>) -> Result<ExitList, DocumentParseError> {
        let raw = RawDocument::new(text.as_ref().as_bytes());
        Self::parse(&raw, None, &ParseOptions::default())
    }
}
