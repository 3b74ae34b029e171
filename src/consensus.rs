//! Version 3 network status documents: votes and consensuses.
//!
//! A network status document is split into regions before parsing: the
//! header, the authority section (`dir-source` entries), the status
//! entries (each starting with `r `), the footer and the signatures.
//! Each region is parsed with its own grammar.

use std::collections::BTreeMap;
use std::ops::Range;

use chrono::{DateTime, Utc};
use derive_builder::Builder;
use lazy_static::lazy_static;
use strum::{Display, EnumString};
use tracing::trace;

use crate::certificate::{self, DirectoryKeyCertificate};
use crate::config::ParseOptions;
use crate::error::{DocumentParseError, ErrorContext, FieldError, GrammarViolation};
use crate::fields::{
    parse_comma_list, parse_decimal_map, parse_int, parse_params, parse_timestamp, Fingerprint,
    Protocols,
};
use crate::meta::grammar::Grammar;
use crate::meta::{
    cut_off_annotations, find_line_start, impl_descriptor, DigestRange, DocumentMeta, Item,
    Keyword, RawDocument,
};

mod dirsource;
mod entry;
mod signature;

pub use dirsource::{DirSourceEntry, VoteAuthority};
pub use entry::{EntryBandwidth, EntryFlavour, Flag, MicrodescriptorDigest, NetworkStatusEntry};
pub use signature::DirectorySignature;
pub(crate) use entry::parse_entries;
pub(crate) use signature::parse_signatures;

pub(crate) const ANCHOR: &str = "network-status-version 3";

const DIGEST_RANGE: DigestRange =
    DigestRange::between("network-status-version ", "\ndirectory-signature ");

fn header_grammar(name: &'static str) -> Grammar {
    Grammar::new(name)
        .first(Keyword::NetworkStatusVersion)
        .exactly_once(&[
            Keyword::NetworkStatusVersion,
            Keyword::VoteStatus,
            Keyword::ValidAfter,
            Keyword::FreshUntil,
            Keyword::ValidUntil,
            Keyword::VotingDelay,
            Keyword::KnownFlags,
        ])
        .at_most_once(&[
            Keyword::ClientVersions,
            Keyword::ServerVersions,
            Keyword::FlagThresholds,
            Keyword::Params,
            Keyword::RecommendedClientProtocols,
            Keyword::RecommendedRelayProtocols,
            Keyword::RequiredClientProtocols,
            Keyword::RequiredRelayProtocols,
            Keyword::SharedRandPreviousValue,
            Keyword::SharedRandCurrentValue,
            Keyword::BandwidthFileHeaders,
            Keyword::BandwidthFileDigest,
        ])
        .any_number(&[Keyword::Package])
}

lazy_static! {
    static ref CONSENSUS_HEADER: Grammar =
        header_grammar("consensus header").at_most_once(&[Keyword::ConsensusMethod]);
    static ref VOTE_HEADER: Grammar = header_grammar("vote header")
        .exactly_once(&[Keyword::ConsensusMethods, Keyword::Published]);
    static ref FOOTER: Grammar = Grammar::new("network status footer")
        .at_most_once(&[Keyword::DirectoryFooter, Keyword::BandwidthWeights]);
}

/// Whether a v3 document is a vote or a consensus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum VoteStatus {
    Consensus,
    Vote,
}

/// The flavour named on the `network-status-version` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum NetworkStatusFlavour {
    Ns,
    Microdesc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VotingDelay {
    pub vote_seconds: u64,
    pub dist_seconds: u64,
}

/// A shared random value with the number of reveals it was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedRandValue {
    pub num_reveals: u32,
    pub value: String,
}

impl SharedRandValue {
    pub(crate) fn from_item(item: &Item<'_>) -> Result<SharedRandValue, DocumentParseError> {
        let args = item.exact_args(2)?;
        Ok(SharedRandValue {
            num_reveals: parse_int(args[0]).context(item.line())?,
            value: args[1].to_string(),
        })
    }
}

/// The header of a vote or consensus.
#[derive(Debug, Clone, Builder)]
#[builder(private)]
pub struct NetworkStatusHeader {
    pub version: u8,
    pub flavour: NetworkStatusFlavour,
    pub vote_status: VoteStatus,
    /// Supported methods, in votes.
    #[builder(default)]
    pub consensus_methods: Vec<u32>,
    /// The method used, in consensuses. Method 1 consensuses carry no
    /// `consensus-method` line.
    #[builder(setter(strip_option), default)]
    pub consensus_method: Option<u32>,
    /// Publication time, in votes.
    #[builder(setter(strip_option), default)]
    pub published: Option<DateTime<Utc>>,
    pub valid_after: DateTime<Utc>,
    pub fresh_until: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub voting_delay: VotingDelay,
    #[builder(default)]
    pub client_versions: Vec<String>,
    #[builder(default)]
    pub server_versions: Vec<String>,
    /// Arguments of each `package` line.
    #[builder(setter(custom), default)]
    pub packages: Vec<String>,
    pub known_flags: Vec<String>,
    #[builder(default)]
    pub flag_thresholds: BTreeMap<String, f64>,
    #[builder(default)]
    pub params: BTreeMap<String, i64>,
    #[builder(setter(strip_option), default)]
    pub recommended_client_protocols: Option<Protocols>,
    #[builder(setter(strip_option), default)]
    pub recommended_relay_protocols: Option<Protocols>,
    #[builder(setter(strip_option), default)]
    pub required_client_protocols: Option<Protocols>,
    #[builder(setter(strip_option), default)]
    pub required_relay_protocols: Option<Protocols>,
    #[builder(setter(strip_option), default)]
    pub shared_rand_previous_value: Option<SharedRandValue>,
    #[builder(setter(strip_option), default)]
    pub shared_rand_current_value: Option<SharedRandValue>,
    #[builder(default)]
    pub bandwidth_file_headers: BTreeMap<String, String>,
    #[builder(default)]
    pub bandwidth_file_digest: Vec<String>,
}

impl NetworkStatusHeaderBuilder {
    fn add_package(&mut self, package: String) {
        self.packages.get_or_insert_with(Vec::new).push(package);
    }
}

fn parse_string_map(args: &[&str]) -> Result<BTreeMap<String, String>, FieldError> {
    args.iter()
        .map(|arg| {
            arg.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| FieldError::InvalidArgumentDict(arg.to_string()))
        })
        .collect()
}

impl NetworkStatusHeader {
    fn from_items(items: &[Item<'_>]) -> Result<NetworkStatusHeader, DocumentParseError> {
        let mut builder = NetworkStatusHeaderBuilder::default();

        for item in items {
            let line = item.line();
            match item.keyword() {
                Keyword::NetworkStatusVersion => {
                    let args = item.required_args(1)?;
                    let version: u8 = parse_int(args[0]).context(line)?;
                    if version != 3 {
                        return Err(FieldError::InvalidValue {
                            what: "network status version",
                            raw: args[0].to_string(),
                        })
                        .context(line);
                    }
                    builder.version(version);
                    let flavour = match args[1..] {
                        [] => NetworkStatusFlavour::Ns,
                        [flavour] => flavour.parse().map_err(|_| FieldError::InvalidValue {
                            what: "network status flavour",
                            raw: flavour.to_string(),
                        })
                        .context(line)?,
                        _ => {
                            return Err(FieldError::UnexpectedArguments(args[2..].join(" ")))
                                .context(line)
                        }
                    };
                    builder.flavour(flavour);
                }
                Keyword::VoteStatus => {
                    let status = item.exact_args(1)?[0];
                    builder.vote_status(
                        status
                            .parse()
                            .map_err(|_| FieldError::InvalidValue {
                                what: "vote status",
                                raw: status.to_string(),
                            })
                            .context(line)?,
                    );
                }
                Keyword::ConsensusMethods => {
                    let methods = item
                        .required_args(1)?
                        .into_iter()
                        .map(parse_int::<u32>)
                        .collect::<Result<Vec<_>, _>>()
                        .context(line)?;
                    builder.consensus_methods(methods);
                }
                Keyword::ConsensusMethod => {
                    builder.consensus_method(parse_int(item.exact_args(1)?[0]).context(line)?);
                }
                Keyword::Published => {
                    builder.published(parse_timestamp(item.get_argument()?).context(line)?);
                }
                Keyword::ValidAfter => {
                    builder.valid_after(parse_timestamp(item.get_argument()?).context(line)?);
                }
                Keyword::FreshUntil => {
                    builder.fresh_until(parse_timestamp(item.get_argument()?).context(line)?);
                }
                Keyword::ValidUntil => {
                    builder.valid_until(parse_timestamp(item.get_argument()?).context(line)?);
                }
                Keyword::VotingDelay => {
                    let args = item.exact_args(2)?;
                    builder.voting_delay(VotingDelay {
                        vote_seconds: parse_int(args[0]).context(line)?,
                        dist_seconds: parse_int(args[1]).context(line)?,
                    });
                }
                Keyword::ClientVersions => {
                    builder.client_versions(parse_comma_list(item.args_or_empty()));
                }
                Keyword::ServerVersions => {
                    builder.server_versions(parse_comma_list(item.args_or_empty()));
                }
                Keyword::Package => builder.add_package(item.args_or_empty().to_string()),
                Keyword::KnownFlags => {
                    builder.known_flags(
                        item.split_arguments()
                            .into_iter()
                            .map(str::to_string)
                            .collect(),
                    );
                }
                Keyword::FlagThresholds => {
                    builder.flag_thresholds(
                        parse_decimal_map(&item.split_arguments().join(",")).context(line)?,
                    );
                }
                Keyword::Params => {
                    builder.params(parse_params(&item.split_arguments()).context(line)?);
                }
                Keyword::RecommendedClientProtocols => {
                    builder.recommended_client_protocols(
                        Protocols::from_args(&item.split_arguments()).context(line)?,
                    );
                }
                Keyword::RecommendedRelayProtocols => {
                    builder.recommended_relay_protocols(
                        Protocols::from_args(&item.split_arguments()).context(line)?,
                    );
                }
                Keyword::RequiredClientProtocols => {
                    builder.required_client_protocols(
                        Protocols::from_args(&item.split_arguments()).context(line)?,
                    );
                }
                Keyword::RequiredRelayProtocols => {
                    builder.required_relay_protocols(
                        Protocols::from_args(&item.split_arguments()).context(line)?,
                    );
                }
                Keyword::SharedRandPreviousValue => {
                    builder.shared_rand_previous_value(SharedRandValue::from_item(item)?);
                }
                Keyword::SharedRandCurrentValue => {
                    builder.shared_rand_current_value(SharedRandValue::from_item(item)?);
                }
                Keyword::BandwidthFileHeaders => {
                    builder.bandwidth_file_headers(
                        parse_string_map(&item.split_arguments()).context(line)?,
                    );
                }
                Keyword::BandwidthFileDigest => {
                    builder.bandwidth_file_digest(
                        item.split_arguments()
                            .into_iter()
                            .map(str::to_string)
                            .collect(),
                    );
                }
                _ => {}
            }
        }

        let mut header = builder
            .build()
            .map_err(|e| DocumentParseError::Incomplete(Box::new(e)))?;
        if header.vote_status == VoteStatus::Consensus && header.consensus_method.is_none() {
            header.consensus_method = Some(1);
        }
        if header.valid_after > header.fresh_until || header.fresh_until > header.valid_until {
            return Err(GrammarViolation::CrossField {
                rule: "valid-after, fresh-until and valid-until must be in ascending order",
            }
            .into());
        }
        Ok(header)
    }
}

/// Byte ranges of the regions of a network status body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Regions {
    pub(crate) header: Range<usize>,
    pub(crate) authorities: Range<usize>,
    pub(crate) entries: Range<usize>,
    pub(crate) footer: Range<usize>,
    pub(crate) signatures: Range<usize>,
}

impl Regions {
    /// Locate the regions by the first line starting each of them.
    ///
    /// Without `authority_anchor`, the authority region is empty and the
    /// header runs up to the first entry.
    pub(crate) fn locate(body: &[u8], authority_anchor: Option<&str>) -> Regions {
        let len = body.len();
        let signatures = find_line_start(body, signature::ANCHOR, 0).unwrap_or(len);
        let footer = find_line_start(body, "directory-footer", 0)
            .filter(|&pos| pos < signatures)
            .unwrap_or(signatures);
        let entries = find_line_start(body, entry::ANCHOR, 0)
            .filter(|&pos| pos < footer)
            .unwrap_or(footer);
        let authorities = authority_anchor
            .and_then(|anchor| find_line_start(body, anchor, 0))
            .filter(|&pos| pos < entries)
            .unwrap_or(entries);
        Regions {
            header: 0..authorities,
            authorities: authorities..entries,
            entries: entries..footer,
            footer: footer..signatures,
            signatures: signatures..len,
        }
    }
}

/// Read the argument of the `vote-status` line without parsing the document.
pub(crate) fn sniff_vote_status(body: &[u8]) -> Option<VoteStatus> {
    let start = find_line_start(body, "vote-status ", 0)? + "vote-status ".len();
    let end = body[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(body.len(), |nl| start + nl);
    std::str::from_utf8(&body[start..end]).ok()?.trim().parse().ok()
}

/// The parts shared by votes and consensuses.
struct Parts<A> {
    meta: DocumentMeta,
    header: NetworkStatusHeader,
    authorities: A,
    entries: BTreeMap<Fingerprint, NetworkStatusEntry>,
    bandwidth_weights: BTreeMap<String, i64>,
    signatures: BTreeMap<Fingerprint, Vec<DirectorySignature>>,
}

fn parse_v3<A>(
    raw: &RawDocument,
    options: &ParseOptions,
    expected: VoteStatus,
    parse_authorities: impl FnOnce(
        &RawDocument,
        Range<usize>,
        &ParseOptions,
        &mut Vec<String>,
    ) -> Result<A, DocumentParseError>,
) -> Result<Parts<A>, DocumentParseError> {
    let (annotations, offset) = cut_off_annotations(raw.as_bytes())?;
    let body_raw = raw.slice(offset..raw.len());
    let body = body_raw.as_bytes();
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(DocumentParseError::malformed(format!(
            "network status {expected} without content"
        )));
    }
    let regions = Regions::locate(body, Some(dirsource::ANCHOR));
    trace!(?regions, "located network status regions");

    let mut unrecognized = Vec::new();
    let grammar: &Grammar = match sniff_vote_status(body).unwrap_or(expected) {
        VoteStatus::Consensus => &CONSENSUS_HEADER,
        VoteStatus::Vote => &VOTE_HEADER,
    };
    let items = grammar.parse_items(&body[regions.header.clone()], options, &mut unrecognized)?;
    let header = NetworkStatusHeader::from_items(&items)?;
    if header.vote_status != expected {
        return Err(DocumentParseError::malformed(format!(
            "expected a network status {expected}, found vote-status {}",
            header.vote_status
        )));
    }

    let authorities = parse_authorities(
        &body_raw,
        regions.authorities.clone(),
        options,
        &mut unrecognized,
    )?;

    let flavour = match header.flavour {
        NetworkStatusFlavour::Ns => EntryFlavour::Descriptor,
        NetworkStatusFlavour::Microdesc => EntryFlavour::Microdesc,
    };
    let entries = parse_entries(&body[regions.entries.clone()], flavour, options, &mut unrecognized)?;

    let mut bandwidth_weights = BTreeMap::new();
    for item in FOOTER.parse_items(&body[regions.footer.clone()], options, &mut unrecognized)? {
        if item.keyword() == Keyword::BandwidthWeights {
            bandwidth_weights = parse_params(&item.split_arguments()).context(item.line())?;
        }
    }

    let signatures = parse_signatures(&body[regions.signatures.clone()], options, &mut unrecognized)?;
    if signatures.is_empty() {
        return Err(GrammarViolation::NotAtLeastOnce {
            keyword: Keyword::DirectorySignature,
        }
        .into());
    }

    let mut meta = DocumentMeta::new(body_raw.clone(), annotations, unrecognized);
    meta.locate_sha1(DIGEST_RANGE)?;
    meta.locate_sha256(DIGEST_RANGE)?;
    trace!(
        entries = entries.len(),
        signatures = signatures.len(),
        "parsed network status {}",
        expected
    );
    Ok(Parts {
        meta,
        header,
        authorities,
        entries,
        bandwidth_weights,
        signatures,
    })
}

/// A network status consensus, in the full or the microdesc flavour.
#[derive(Debug, Clone)]
pub struct NetworkStatusConsensus {
    meta: DocumentMeta,
    pub header: NetworkStatusHeader,
    pub dir_sources: Vec<DirSourceEntry>,
    pub entries: BTreeMap<Fingerprint, NetworkStatusEntry>,
    pub bandwidth_weights: BTreeMap<String, i64>,
    /// Signatures by authority identity.
    pub signatures: BTreeMap<Fingerprint, Vec<DirectorySignature>>,
}

impl_descriptor!(NetworkStatusConsensus);

impl NetworkStatusConsensus {
    /// Parse a consensus document from raw text.
    pub fn from_str(text: impl AsRef<str>) -> Result<NetworkStatusConsensus, DocumentParseError> {
        let raw = RawDocument::new(text.as_ref().as_bytes());
        Self::parse(&raw, &ParseOptions::default())
    }

    pub fn parse(
        raw: &RawDocument,
        options: &ParseOptions,
    ) -> Result<NetworkStatusConsensus, DocumentParseError> {
        let parts = parse_v3(
            raw,
            options,
            VoteStatus::Consensus,
            |body, region, options, unrecognized| {
                dirsource::parse_dir_sources(&body.as_bytes()[region], options, unrecognized)
            },
        )?;
        Ok(NetworkStatusConsensus {
            meta: parts.meta,
            header: parts.header,
            dir_sources: parts.authorities,
            entries: parts.entries,
            bandwidth_weights: parts.bandwidth_weights,
            signatures: parts.signatures,
        })
    }

    pub fn valid_after(&self) -> DateTime<Utc> {
        self.header.valid_after
    }

    /// The entries carrying `flag`.
    pub fn entries_with_flag<'a>(
        &'a self,
        flag: &'a Flag,
    ) -> impl Iterator<Item = &'a NetworkStatusEntry> + 'a {
        self.entries.values().filter(move |e| e.has_flag(flag))
    }
}

/// A vote by a single directory authority.
#[derive(Debug, Clone)]
pub struct NetworkStatusVote {
    meta: DocumentMeta,
    pub header: NetworkStatusHeader,
    pub authority: VoteAuthority,
    /// The authority's key certificate, embedded in the vote.
    pub certificate: DirectoryKeyCertificate,
    pub entries: BTreeMap<Fingerprint, NetworkStatusEntry>,
    pub bandwidth_weights: BTreeMap<String, i64>,
    pub signatures: BTreeMap<Fingerprint, Vec<DirectorySignature>>,
}

impl_descriptor!(NetworkStatusVote);

impl NetworkStatusVote {
    pub fn from_str(text: impl AsRef<str>) -> Result<NetworkStatusVote, DocumentParseError> {
        let raw = RawDocument::new(text.as_ref().as_bytes());
        Self::parse(&raw, &ParseOptions::default())
    }

    pub fn parse(
        raw: &RawDocument,
        options: &ParseOptions,
    ) -> Result<NetworkStatusVote, DocumentParseError> {
        let parts = parse_v3(
            raw,
            options,
            VoteStatus::Vote,
            |body, region, options, unrecognized| {
                let bytes = &body.as_bytes()[region.clone()];
                let cert_start = find_line_start(bytes, certificate::ANCHOR, 0).ok_or_else(|| {
                    DocumentParseError::malformed("vote authority section without key certificate")
                })?;
                let authority = VoteAuthority::parse(&bytes[..cert_start], options, unrecognized)?;
                let cert = DirectoryKeyCertificate::parse(
                    &body.slice(region.start + cert_start..region.end),
                    options,
                )?;
                Ok((authority, cert))
            },
        )?;
        let (authority, certificate) = parts.authorities;
        Ok(NetworkStatusVote {
            meta: parts.meta,
            header: parts.header,
            authority,
            certificate,
            entries: parts.entries,
            bandwidth_weights: parts.bandwidth_weights,
            signatures: parts.signatures,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::meta::Descriptor;

    pub(crate) const CONSENSUS: &str = concat!(
        "network-status-version 3\n",
        "vote-status consensus\n",
        "consensus-method 33\n",
        "valid-after 2023-11-20 12:00:00\n",
        "fresh-until 2023-11-20 13:00:00\n",
        "valid-until 2023-11-20 15:00:00\n",
        "voting-delay 300 300\n",
        "client-versions 0.4.7.16,0.4.8.9\n",
        "server-versions 0.4.7.16,0.4.8.9\n",
        "known-flags Authority BadExit Exit Fast Guard HSDir MiddleOnly NoEdConsensus Running Stable StaleDesc Sybil V2Dir Valid\n",
        "recommended-client-protocols Cons=2 Desc=2 Link=4 Microdesc=2 Relay=2\n",
        "params CircuitPriorityHalflifeMsec=30000 bwweightscale=10000\n",
        "shared-rand-previous-value 8 jZU2CJyOkfmSrfrj7AcCHw2PCnzwP/XEWYCv5jGn1hk=\n",
        "dir-source moria1 D586D18309DED4CD6D57C18FDB97EFA96D330566 128.31.0.34 128.31.0.34 9131 9101\n",
        "contact 1024D/EB5A896A28988BF5 arma mit edu\n",
        "vote-digest 1D0D2D7D4C1F3B2AB8AB4B55C7D0DFBBCCE2E56A\n",
        "r seele AAoQ1DAR6kkoo19hBAX5K0QztNw 4Sr+FFsEhBkTtWYdeNxvFlvyDFE 2023-11-20 07:55:20 104.53.221.159 9001 0\n",
        "s Fast Running Stable V2Dir Valid\n",
        "v Tor 0.4.8.9\n",
        "pr Cons=1-2 Desc=1-2 Link=1-5\n",
        "w Bandwidth=1140\n",
        "p reject 1-65535\n",
        "r moria1 lpXfw1/+uGEym58asExGOXAgzjE ZTw8ALpDM3O3bxNmRJIkbi81ZvQ 2023-11-20 06:12:56 128.31.0.39 9101 9131\n",
        "s Authority Fast Running Stable V2Dir Valid\n",
        "w Bandwidth=20 Unmeasured=1\n",
        "directory-footer\n",
        "bandwidth-weights Wbd=0 Wbe=0 Wbg=4131 Wbm=10000\n",
        "directory-signature sha256 D586D18309DED4CD6D57C18FDB97EFA96D330566 6A8AC6D1D8A8D3B0CC4E0BDD6E2734B3B8C4E5B0\n",
        "-----BEGIN SIGNATURE-----\n",
        "AAAA\n",
        "-----END SIGNATURE-----\n",
    );

    #[test]
    fn test_regions() {
        let regions = Regions::locate(CONSENSUS.as_bytes(), Some(dirsource::ANCHOR));
        assert!(CONSENSUS[regions.authorities.clone()].starts_with("dir-source moria1"));
        assert!(CONSENSUS[regions.entries.clone()].starts_with("r seele"));
        assert!(CONSENSUS[regions.footer.clone()].starts_with("directory-footer\n"));
        assert!(CONSENSUS[regions.signatures.clone()].starts_with("directory-signature "));
        assert_eq!(regions.header.start, 0);
        assert_eq!(regions.signatures.end, CONSENSUS.len());
    }

    #[test]
    fn test_parse_consensus() {
        let consensus = NetworkStatusConsensus::from_str(CONSENSUS).unwrap();
        assert_eq!(consensus.header.consensus_method, Some(33));
        assert_eq!(consensus.header.flavour, NetworkStatusFlavour::Ns);
        assert_eq!(consensus.header.known_flags.len(), 14);
        assert_eq!(consensus.header.params.get("bwweightscale"), Some(&10000));
        assert_eq!(
            consensus.header.shared_rand_previous_value.as_ref().unwrap().num_reveals,
            8
        );
        assert_eq!(consensus.dir_sources.len(), 1);
        assert_eq!(consensus.entries.len(), 2);
        assert_eq!(consensus.entries_with_flag(&Flag::Authority).count(), 1);
        assert_eq!(consensus.bandwidth_weights.get("Wbg"), Some(&4131));
        assert_eq!(consensus.signatures.len(), 1);
        assert!(consensus.unrecognized_lines().is_empty());

        let end = CONSENSUS.find("\ndirectory-signature ").unwrap() + "\ndirectory-signature ".len();
        assert_eq!(
            consensus.digest_sha1_hex(),
            Some(crate::meta::sha1_hex(CONSENSUS[..end].as_bytes()).as_str())
        );
        assert_eq!(
            consensus.digest_sha256_base64(),
            Some(crate::meta::sha256_base64(CONSENSUS[..end].as_bytes()).as_str())
        );
    }

    #[test]
    fn test_sniff_vote_status() {
        assert_eq!(sniff_vote_status(CONSENSUS.as_bytes()), Some(VoteStatus::Consensus));
        assert_eq!(sniff_vote_status(b"vote-status vote\n"), Some(VoteStatus::Vote));
        assert_eq!(sniff_vote_status(b"vote-status maybe\n"), None);
        assert_eq!(sniff_vote_status(b"network-status-version 3\n"), None);
    }

    #[test]
    fn test_consensus_is_not_a_vote() {
        assert!(matches!(
            NetworkStatusVote::from_str(CONSENSUS).unwrap_err(),
            DocumentParseError::MalformedInput { .. }
        ));
    }

    #[test]
    fn test_consensus_method_defaults_to_one() {
        let text = CONSENSUS.replace("consensus-method 33\n", "");
        let consensus = NetworkStatusConsensus::from_str(text).unwrap();
        assert_eq!(consensus.header.consensus_method, Some(1));

        let twice = CONSENSUS.replace("consensus-method 33\n", "consensus-method 33\nconsensus-method 34\n");
        assert!(matches!(
            NetworkStatusConsensus::from_str(twice).unwrap_err().grammar_violation(),
            Some(GrammarViolation::NotAtMostOnce { .. })
        ));
    }

    #[test]
    fn test_unsorted_validity() {
        let text = CONSENSUS.replace("fresh-until 2023-11-20 13:00:00", "fresh-until 2023-11-20 16:00:00");
        assert!(matches!(
            NetworkStatusConsensus::from_str(text).unwrap_err().grammar_violation(),
            Some(GrammarViolation::CrossField { .. })
        ));
    }

    #[test]
    fn test_missing_signature() {
        let end = CONSENSUS.find("directory-signature ").unwrap();
        assert_eq!(
            NetworkStatusConsensus::from_str(&CONSENSUS[..end])
                .unwrap_err()
                .grammar_violation(),
            Some(&GrammarViolation::NotAtLeastOnce {
                keyword: Keyword::DirectorySignature
            })
        );
    }

    #[test]
    fn test_unknown_header_line() {
        let text = CONSENSUS.replace("voting-delay 300 300\n", "voting-delay 300 300\nfancy-new-line 1\n");
        let consensus = NetworkStatusConsensus::from_str(&text).unwrap();
        assert_eq!(consensus.unrecognized_lines(), &["fancy-new-line 1".to_string()]);
        let raw = RawDocument::new(text.as_bytes());
        assert!(matches!(
            NetworkStatusConsensus::parse(&raw, &ParseOptions::strict()).unwrap_err(),
            DocumentParseError::UnrecognizedLine { .. }
        ));
    }

    #[test]
    fn test_microdesc_consensus() {
        let text = CONSENSUS
            .replace("network-status-version 3\n", "network-status-version 3 microdesc\n")
            .replace(
                " 4Sr+FFsEhBkTtWYdeNxvFlvyDFE 2023-11-20 07:55:20",
                " 2023-11-20 07:55:20",
            )
            .replace(
                " ZTw8ALpDM3O3bxNmRJIkbi81ZvQ 2023-11-20 06:12:56",
                " 2023-11-20 06:12:56",
            )
            .replace(
                "w Bandwidth=1140\n",
                "w Bandwidth=1140\nm Ytn9DvcaN6gzD9b/Ufh2WTBBsxUZGUOTHJYHMaY1fTo\n",
            );
        let consensus = NetworkStatusConsensus::from_str(text).unwrap();
        assert_eq!(consensus.header.flavour, NetworkStatusFlavour::Microdesc);
        assert!(consensus
            .entries
            .values()
            .all(|e| e.descriptor_digest.is_none()));
        assert_eq!(
            consensus
                .entries
                .values()
                .filter(|e| !e.microdescriptor_digests.is_empty())
                .count(),
            1
        );
    }

    #[test]
    fn test_vote() {
        let text = CONSENSUS
            .replace("vote-status consensus\n", "vote-status vote\n")
            .replace(
                "consensus-method 33\n",
                "consensus-methods 28 29 30 31 32 33\npublished 2023-11-20 11:50:00\n",
            )
            .replace("vote-digest 1D0D2D7D4C1F3B2AB8AB4B55C7D0DFBBCCE2E56A\n", certificate::tests::CERTIFICATE);
        let vote = NetworkStatusVote::from_str(&text).unwrap();
        assert_eq!(vote.header.consensus_methods.len(), 6);
        assert!(vote.header.published.is_some());
        assert_eq!(vote.authority.dir_source.nickname, "moria1");
        assert_eq!(
            vote.certificate.fingerprint,
            vote.authority.dir_source.identity
        );
        assert!(vote.certificate.digest_sha1_hex().is_some());
        assert_eq!(vote.entries.len(), 2);
    }
}
