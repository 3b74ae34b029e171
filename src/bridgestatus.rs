//! Sanitized bridge network statuses, as published by the bridge authority.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::config::ParseOptions;
use crate::consensus::{parse_entries, EntryFlavour, NetworkStatusEntry, Regions};
use crate::error::{DocumentParseError, ErrorContext, GrammarViolation};
use crate::fields::{parse_decimal_map, parse_timestamp, Fingerprint};
use crate::meta::grammar::Grammar;
use crate::meta::{cut_off_annotations, impl_descriptor, DigestRange, DocumentMeta, Keyword, RawDocument};

lazy_static! {
    static ref HEADER: Grammar = Grammar::new("bridge network status header")
        .at_most_once(&[Keyword::Published, Keyword::FlagThresholds, Keyword::Fingerprint]);
    /// `20120219-003237-4A0CCD2DDC7995083D73F5D667100C8A5831F16D`
    static ref FILENAME: Regex =
        Regex::new(r"^(\d{8}-\d{6})-([0-9A-Fa-f]{40})$").expect("valid regex");
}

/// Publication time and authority fingerprint encoded in a file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilenameHint {
    pub published: DateTime<Utc>,
    pub authority: Fingerprint,
}

impl FilenameHint {
    /// Parse the last path component of `filename`, if it has the form
    /// `YYYYMMDD-HHMMSS-<fingerprint>`.
    pub fn parse(filename: &str) -> Option<FilenameHint> {
        let name = filename.rsplit(['/', '\\']).next()?;
        let caps = FILENAME.captures(name)?;
        let naive = NaiveDateTime::parse_from_str(caps.get(1)?.as_str(), "%Y%m%d-%H%M%S").ok()?;
        Some(FilenameHint {
            published: Utc.from_utc_datetime(&naive),
            authority: Fingerprint::from_str_hex(caps.get(2)?.as_str()).ok()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BridgeNetworkStatus {
    meta: DocumentMeta,
    pub published: DateTime<Utc>,
    /// Fingerprint of the bridge authority, if known.
    pub authority: Option<Fingerprint>,
    pub flag_thresholds: BTreeMap<String, f64>,
    pub entries: BTreeMap<Fingerprint, NetworkStatusEntry>,
}

impl_descriptor!(BridgeNetworkStatus);

impl BridgeNetworkStatus {
    /// Parse a bridge network status. The `published` header line takes
    /// precedence over the publication time in `filename`.
    pub fn parse(
        raw: &RawDocument,
        filename: Option<&str>,
        options: &ParseOptions,
    ) -> Result<BridgeNetworkStatus, DocumentParseError> {
        let hint = filename.and_then(FilenameHint::parse);
        let (annotations, offset) = cut_off_annotations(raw.as_bytes())?;
        let body_raw = raw.slice(offset..raw.len());
        let body = body_raw.as_bytes();
        let regions = Regions::locate(body, None);

        let mut unrecognized = Vec::new();
        let mut published = None;
        let mut authority = None;
        let mut flag_thresholds = BTreeMap::new();
        for item in HEADER.parse_items(&body[regions.header.clone()], options, &mut unrecognized)? {
            let line = item.line();
            match item.keyword() {
                Keyword::Published => {
                    published = Some(parse_timestamp(item.get_argument()?).context(line)?)
                }
                Keyword::Fingerprint => {
                    authority = Some(Fingerprint::from_str_hex(item.get_argument()?).context(line)?)
                }
                Keyword::FlagThresholds => {
                    flag_thresholds =
                        parse_decimal_map(&item.split_arguments().join(",")).context(line)?
                }
                _ => {}
            }
        }
        let published = published
            .or_else(|| hint.map(|h| h.published))
            .ok_or(GrammarViolation::NotExactlyOnce {
                keyword: Keyword::Published,
                count: 0,
            })?;
        let authority = authority.or_else(|| hint.map(|h| h.authority));

        // bridge statuses have no footer or signatures
        let entries = parse_entries(
            &body[regions.entries.start..],
            EntryFlavour::Descriptor,
            options,
            &mut unrecognized,
        )?;

        let mut meta = DocumentMeta::new(body_raw.clone(), annotations, unrecognized);
        meta.locate_sha256(DigestRange::Whole)?;
        Ok(BridgeNetworkStatus {
            meta,
            published,
            authority,
            flag_thresholds,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::Descriptor;

    const STATUS: &str = concat!(
        "@type bridge-network-status 1.2\n",
        "published 2023-11-20 12:04:44\n",
        "flag-thresholds stable-uptime=1728000 fast-speed=55000 guard-wfu=98.000% enough-mtbf=1\n",
        "fingerprint 4A0CCD2DDC7995083D73F5D667100C8A5831F16D\n",
        "r ec2bridgercc7f31fe AAoQ1DAR6kkoo19hBAX5K0QztNw 4Sr+FFsEhBkTtWYdeNxvFlvyDFE 2023-11-20 07:55:20 10.181.19.88 443 0\n",
        "s Fast Running Stable Valid\n",
        "w Bandwidth=5\n",
        "p reject 1-65535\n",
    );

    #[test]
    fn test_filename_hint() {
        let hint =
            FilenameHint::parse("statuses/20120219-003237-4A0CCD2DDC7995083D73F5D667100C8A5831F16D")
                .unwrap();
        assert_eq!(hint.published, Utc.with_ymd_and_hms(2012, 2, 19, 0, 32, 37).unwrap());
        assert_eq!(
            hint.authority.to_string(),
            "4A0CCD2DDC7995083D73F5D667100C8A5831F16D"
        );
        assert!(FilenameHint::parse("2012-02-19-00-32-37-consensus").is_none());
        assert!(FilenameHint::parse("20120299-003237-4A0CCD2DDC7995083D73F5D667100C8A5831F16D").is_none());
    }

    #[test]
    fn test_parse_status() {
        let raw = RawDocument::new(STATUS.as_bytes());
        let status = BridgeNetworkStatus::parse(&raw, None, &ParseOptions::default()).unwrap();
        assert_eq!(status.annotations().len(), 1);
        assert_eq!(status.flag_thresholds.get("guard-wfu"), Some(&98.0));
        assert!(status.authority.is_some());
        assert_eq!(status.entries.len(), 1);
        let body = &STATUS[STATUS.find("published").unwrap()..];
        assert_eq!(
            status.digest_sha256_base64(),
            Some(crate::meta::sha256_base64(body.as_bytes()).as_str())
        );
    }

    #[test]
    fn test_published_from_filename() {
        let text = concat!(
            "r ec2bridgercc7f31fe AAoQ1DAR6kkoo19hBAX5K0QztNw 4Sr+FFsEhBkTtWYdeNxvFlvyDFE 2012-02-18 07:55:20 10.181.19.88 443 0\n",
            "s Running Valid\n",
        );
        let raw = RawDocument::new(text.as_bytes());
        let err = BridgeNetworkStatus::parse(&raw, None, &ParseOptions::default()).unwrap_err();
        assert!(err.grammar_violation().is_some());

        let status = BridgeNetworkStatus::parse(
            &raw,
            Some("20120219-003237-4A0CCD2DDC7995083D73F5D667100C8A5831F16D"),
            &ParseOptions::default(),
        )
        .unwrap();
        assert_eq!(status.published, Utc.with_ymd_and_hms(2012, 2, 19, 0, 32, 37).unwrap());
        assert!(status.authority.is_some());
    }
}
