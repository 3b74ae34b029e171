//! Extra-info descriptors: the bandwidth history and statistics a relay or
//! bridge publishes next to its server descriptor.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use derive_builder::Builder;
use lazy_static::lazy_static;
use tracing::trace;

use crate::config::ParseOptions;
use crate::descriptor::{certified_master_key, DescriptorFlavour};
use crate::error::{DocumentParseError, ErrorContext, FieldError};
use crate::fields::{
    parse_base64, parse_decimal, parse_decimal_map, parse_hex, parse_int, parse_int_map,
    parse_nickname, parse_params, parse_timestamp, parse_timestamp_parts, BandwidthHistory,
    Ed25519Certificate, Fingerprint, StatsEnd,
};
use crate::meta::grammar::{Grammar, ParsedBody};
use crate::meta::{impl_descriptor, CryptoBlock, DigestRange, DocumentMeta, Item, Keyword, RawDocument};

pub(crate) const ANCHOR: &str = "extra-info ";

const SHA1_RANGE: DigestRange = DigestRange::between("extra-info ", "\nrouter-signature\n");
const SHA256_RANGE: DigestRange =
    DigestRange::between("extra-info ", "\n-----END SIGNATURE-----\n");

const STATISTICS: &[Keyword] = &[
    Keyword::ReadHistory,
    Keyword::WriteHistory,
    Keyword::Ipv6ReadHistory,
    Keyword::Ipv6WriteHistory,
    Keyword::GeoipDbDigest,
    Keyword::Geoip6DbDigest,
    Keyword::GeoipStartTime,
    Keyword::GeoipClientOrigins,
    Keyword::DirreqStatsEnd,
    Keyword::DirreqV2Ips,
    Keyword::DirreqV3Ips,
    Keyword::DirreqV2Reqs,
    Keyword::DirreqV3Reqs,
    Keyword::DirreqV2Share,
    Keyword::DirreqV3Share,
    Keyword::DirreqV2Resp,
    Keyword::DirreqV3Resp,
    Keyword::DirreqV2DirectDl,
    Keyword::DirreqV3DirectDl,
    Keyword::DirreqV2TunneledDl,
    Keyword::DirreqV3TunneledDl,
    Keyword::DirreqReadHistory,
    Keyword::DirreqWriteHistory,
    Keyword::EntryStatsEnd,
    Keyword::EntryIps,
    Keyword::CellStatsEnd,
    Keyword::CellProcessedCells,
    Keyword::CellQueuedCells,
    Keyword::CellTimeInQueue,
    Keyword::CellCircuitsPerDecile,
    Keyword::ConnBiDirect,
    Keyword::Ipv6ConnBiDirect,
    Keyword::ExitStatsEnd,
    Keyword::ExitKibibytesWritten,
    Keyword::ExitKibibytesRead,
    Keyword::ExitStreamsOpened,
    Keyword::HidservStatsEnd,
    Keyword::HidservRendRelayedCells,
    Keyword::HidservDirOnionsSeen,
    Keyword::HidservV3StatsEnd,
    Keyword::HidservRendV3RelayedCells,
    Keyword::HidservDirV3OnionsSeen,
    Keyword::PaddingCounts,
    Keyword::BridgeStatsEnd,
    Keyword::BridgeIps,
    Keyword::BridgeIpVersions,
    Keyword::BridgeIpTransports,
    Keyword::OverloadRatelimits,
    Keyword::OverloadFdExhausted,
];

fn extra_info_grammar(name: &'static str) -> Grammar {
    Grammar::new(name)
        .first(Keyword::ExtraInfo)
        .exactly_once(&[Keyword::ExtraInfo, Keyword::Published])
        .at_most_once(STATISTICS)
        .at_most_once(&[
            Keyword::IdentityEd25519,
            Keyword::MasterKeyEd25519,
            Keyword::RouterSigEd25519,
            Keyword::RouterDigest,
            Keyword::RouterDigestSha256,
        ])
        .any_number(&[Keyword::Transport])
        .depends(
            &[Keyword::MasterKeyEd25519, Keyword::RouterSigEd25519],
            Keyword::IdentityEd25519,
        )
        .objects(&[Keyword::IdentityEd25519, Keyword::RouterSignature])
}

lazy_static! {
    static ref RELAY_GRAMMAR: Grammar = extra_info_grammar("extra-info descriptor")
        .exactly_once(&[Keyword::RouterSignature])
        .last(Keyword::RouterSignature);
    static ref BRIDGE_GRAMMAR: Grammar = extra_info_grammar("bridge extra-info descriptor")
        .at_most_once(&[Keyword::RouterSignature]);
}

/// Statistics whose line is an interval end followed by `key=value` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedStats<T> {
    pub stats_end: StatsEnd,
    pub values: BTreeMap<String, T>,
}

/// `conn-bi-direct`: connections by how they were used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnBiDirect {
    pub stats_end: StatsEnd,
    pub below: u64,
    pub read: u64,
    pub write: u64,
    pub both: u64,
}

/// A hidden-service statistic: an obfuscated value and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct HidservStat {
    pub value: f64,
    pub parameters: BTreeMap<String, f64>,
}

/// `overload-ratelimits`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverloadRatelimits {
    pub timestamp: DateTime<Utc>,
    pub rate_limit: u64,
    pub burst_limit: u64,
    pub read_count: u64,
    pub write_count: u64,
}

/// All statistics of an extra-info descriptor. Absent lines are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraInfoStatistics {
    pub read_history: Option<BandwidthHistory>,
    pub write_history: Option<BandwidthHistory>,
    pub ipv6_read_history: Option<BandwidthHistory>,
    pub ipv6_write_history: Option<BandwidthHistory>,
    pub dirreq_read_history: Option<BandwidthHistory>,
    pub dirreq_write_history: Option<BandwidthHistory>,

    pub geoip_db_digest: Option<String>,
    pub geoip6_db_digest: Option<String>,
    pub geoip_start_time: Option<DateTime<Utc>>,
    pub geoip_client_origins: Option<BTreeMap<String, i64>>,

    pub dirreq_stats_end: Option<StatsEnd>,
    pub dirreq_v2_ips: Option<BTreeMap<String, i64>>,
    pub dirreq_v3_ips: Option<BTreeMap<String, i64>>,
    pub dirreq_v2_reqs: Option<BTreeMap<String, i64>>,
    pub dirreq_v3_reqs: Option<BTreeMap<String, i64>>,
    pub dirreq_v2_share: Option<f64>,
    pub dirreq_v3_share: Option<f64>,
    pub dirreq_v2_resp: Option<BTreeMap<String, i64>>,
    pub dirreq_v3_resp: Option<BTreeMap<String, i64>>,
    pub dirreq_v2_direct_dl: Option<BTreeMap<String, i64>>,
    pub dirreq_v3_direct_dl: Option<BTreeMap<String, i64>>,
    pub dirreq_v2_tunneled_dl: Option<BTreeMap<String, i64>>,
    pub dirreq_v3_tunneled_dl: Option<BTreeMap<String, i64>>,

    pub entry_stats_end: Option<StatsEnd>,
    pub entry_ips: Option<BTreeMap<String, i64>>,

    pub cell_stats_end: Option<StatsEnd>,
    pub cell_processed_cells: Option<Vec<f64>>,
    pub cell_queued_cells: Option<Vec<f64>>,
    pub cell_time_in_queue: Option<Vec<f64>>,
    pub cell_circuits_per_decile: Option<u64>,

    pub conn_bi_direct: Option<ConnBiDirect>,
    pub ipv6_conn_bi_direct: Option<KeyedStats<i64>>,

    pub exit_stats_end: Option<StatsEnd>,
    pub exit_kibibytes_written: Option<BTreeMap<String, i64>>,
    pub exit_kibibytes_read: Option<BTreeMap<String, i64>>,
    pub exit_streams_opened: Option<BTreeMap<String, i64>>,

    pub hidserv_stats_end: Option<StatsEnd>,
    pub hidserv_rend_relayed_cells: Option<HidservStat>,
    pub hidserv_dir_onions_seen: Option<HidservStat>,
    pub hidserv_v3_stats_end: Option<StatsEnd>,
    pub hidserv_rend_v3_relayed_cells: Option<HidservStat>,
    pub hidserv_dir_v3_onions_seen: Option<HidservStat>,

    pub padding_counts: Option<KeyedStats<i64>>,

    pub bridge_stats_end: Option<StatsEnd>,
    pub bridge_ips: Option<BTreeMap<String, i64>>,
    pub bridge_ip_versions: Option<BTreeMap<String, i64>>,
    pub bridge_ip_transports: Option<BTreeMap<String, i64>>,

    pub overload_ratelimits: Option<OverloadRatelimits>,
    pub overload_fd_exhausted: Option<DateTime<Utc>>,
}

/// A relay or bridge extra-info descriptor.
#[derive(Debug, Clone, Builder)]
#[builder(private)]
pub struct ExtraInfoDescriptor {
    meta: DocumentMeta,
    pub flavour: DescriptorFlavour,
    pub nickname: String,
    pub fingerprint: Fingerprint,
    pub published: DateTime<Utc>,
    #[builder(default)]
    pub statistics: ExtraInfoStatistics,
    /// Arguments of each `transport` line.
    #[builder(default)]
    pub transports: Vec<String>,
    #[builder(setter(strip_option), default)]
    pub identity_ed25519: Option<Ed25519Certificate>,
    /// The master key certified by `identity_ed25519`.
    #[builder(setter(strip_option), default)]
    pub master_key_ed25519: Option<String>,
    #[builder(setter(strip_option), default)]
    pub router_sig_ed25519: Option<String>,
    #[builder(setter(strip_option), default)]
    pub router_signature: Option<CryptoBlock>,
}

impl_descriptor!(ExtraInfoDescriptor);

/// The interval end and the remaining arguments after it.
fn stats_end_and_rest<'i>(item: &'i Item<'_>) -> Result<(StatsEnd, Vec<&'i str>), DocumentParseError> {
    let args = item.required_args(4)?;
    let stats_end = StatsEnd::from_args(&args).context(item.line())?;
    Ok((stats_end, args[4..].to_vec()))
}

fn int_map(item: &Item<'_>) -> Result<BTreeMap<String, i64>, DocumentParseError> {
    match item.split_arguments()[..] {
        [] => Ok(BTreeMap::new()),
        [list] => parse_int_map(list).context(item.line()),
        _ => Err(FieldError::UnexpectedArguments(item.args_or_empty().to_string()))
            .context(item.line()),
    }
}

fn decimal_list(item: &Item<'_>) -> Result<Vec<f64>, DocumentParseError> {
    item.args_or_empty()
        .split(',')
        .filter(|v| !v.is_empty())
        .map(parse_decimal)
        .collect::<Result<Vec<_>, _>>()
        .context(item.line())
}

fn history(item: &Item<'_>) -> Result<BandwidthHistory, DocumentParseError> {
    BandwidthHistory::from_args(&item.split_arguments()).context(item.line())
}

fn hidserv_stat(item: &Item<'_>) -> Result<HidservStat, DocumentParseError> {
    let args = item.required_args(1)?;
    let value = parse_decimal(args[0]).context(item.line())?;
    let parameters = parse_decimal_map(&args[1..].join(",")).context(item.line())?;
    Ok(HidservStat { value, parameters })
}

impl ExtraInfoStatistics {
    /// Record one statistics line; returns false for other keywords.
    fn record(&mut self, item: &Item<'_>) -> Result<bool, DocumentParseError> {
        let line = item.line();
        match item.keyword() {
            Keyword::ReadHistory => self.read_history = Some(history(item)?),
            Keyword::WriteHistory => self.write_history = Some(history(item)?),
            Keyword::Ipv6ReadHistory => self.ipv6_read_history = Some(history(item)?),
            Keyword::Ipv6WriteHistory => self.ipv6_write_history = Some(history(item)?),
            Keyword::DirreqReadHistory => self.dirreq_read_history = Some(history(item)?),
            Keyword::DirreqWriteHistory => self.dirreq_write_history = Some(history(item)?),
            Keyword::GeoipDbDigest => {
                self.geoip_db_digest = Some(parse_hex(item.exact_args(1)?[0], 40).context(line)?)
            }
            Keyword::Geoip6DbDigest => {
                self.geoip6_db_digest = Some(parse_hex(item.exact_args(1)?[0], 40).context(line)?)
            }
            Keyword::GeoipStartTime => {
                self.geoip_start_time = Some(parse_timestamp(item.get_argument()?).context(line)?)
            }
            Keyword::GeoipClientOrigins => self.geoip_client_origins = Some(int_map(item)?),
            Keyword::DirreqStatsEnd => self.dirreq_stats_end = Some(stats_end_and_rest(item)?.0),
            Keyword::DirreqV2Ips => self.dirreq_v2_ips = Some(int_map(item)?),
            Keyword::DirreqV3Ips => self.dirreq_v3_ips = Some(int_map(item)?),
            Keyword::DirreqV2Reqs => self.dirreq_v2_reqs = Some(int_map(item)?),
            Keyword::DirreqV3Reqs => self.dirreq_v3_reqs = Some(int_map(item)?),
            Keyword::DirreqV2Share => {
                self.dirreq_v2_share = Some(parse_decimal(item.exact_args(1)?[0]).context(line)?)
            }
            Keyword::DirreqV3Share => {
                self.dirreq_v3_share = Some(parse_decimal(item.exact_args(1)?[0]).context(line)?)
            }
            Keyword::DirreqV2Resp => self.dirreq_v2_resp = Some(int_map(item)?),
            Keyword::DirreqV3Resp => self.dirreq_v3_resp = Some(int_map(item)?),
            Keyword::DirreqV2DirectDl => self.dirreq_v2_direct_dl = Some(int_map(item)?),
            Keyword::DirreqV3DirectDl => self.dirreq_v3_direct_dl = Some(int_map(item)?),
            Keyword::DirreqV2TunneledDl => self.dirreq_v2_tunneled_dl = Some(int_map(item)?),
            Keyword::DirreqV3TunneledDl => self.dirreq_v3_tunneled_dl = Some(int_map(item)?),
            Keyword::EntryStatsEnd => self.entry_stats_end = Some(stats_end_and_rest(item)?.0),
            Keyword::EntryIps => self.entry_ips = Some(int_map(item)?),
            Keyword::CellStatsEnd => self.cell_stats_end = Some(stats_end_and_rest(item)?.0),
            Keyword::CellProcessedCells => self.cell_processed_cells = Some(decimal_list(item)?),
            Keyword::CellQueuedCells => self.cell_queued_cells = Some(decimal_list(item)?),
            Keyword::CellTimeInQueue => self.cell_time_in_queue = Some(decimal_list(item)?),
            Keyword::CellCircuitsPerDecile => {
                self.cell_circuits_per_decile =
                    Some(parse_int(item.exact_args(1)?[0]).context(line)?)
            }
            Keyword::ConnBiDirect => {
                let (stats_end, rest) = stats_end_and_rest(item)?;
                let counts = rest
                    .first()
                    .map(|list| {
                        list.split(',')
                            .map(parse_int::<u64>)
                            .collect::<Result<Vec<_>, _>>()
                    })
                    .transpose()
                    .context(line)?
                    .unwrap_or_default();
                match counts[..] {
                    [below, read, write, both] => {
                        self.conn_bi_direct = Some(ConnBiDirect {
                            stats_end,
                            below,
                            read,
                            write,
                            both,
                        })
                    }
                    _ => return Err(DocumentParseError::args_missing(line, 5)),
                }
            }
            Keyword::Ipv6ConnBiDirect => {
                let (stats_end, rest) = stats_end_and_rest(item)?;
                self.ipv6_conn_bi_direct = Some(KeyedStats {
                    stats_end,
                    values: parse_int_map(&rest.join(",")).context(line)?,
                });
            }
            Keyword::ExitStatsEnd => self.exit_stats_end = Some(stats_end_and_rest(item)?.0),
            Keyword::ExitKibibytesWritten => self.exit_kibibytes_written = Some(int_map(item)?),
            Keyword::ExitKibibytesRead => self.exit_kibibytes_read = Some(int_map(item)?),
            Keyword::ExitStreamsOpened => self.exit_streams_opened = Some(int_map(item)?),
            Keyword::HidservStatsEnd => self.hidserv_stats_end = Some(stats_end_and_rest(item)?.0),
            Keyword::HidservRendRelayedCells => {
                self.hidserv_rend_relayed_cells = Some(hidserv_stat(item)?)
            }
            Keyword::HidservDirOnionsSeen => self.hidserv_dir_onions_seen = Some(hidserv_stat(item)?),
            Keyword::HidservV3StatsEnd => {
                self.hidserv_v3_stats_end = Some(stats_end_and_rest(item)?.0)
            }
            Keyword::HidservRendV3RelayedCells => {
                self.hidserv_rend_v3_relayed_cells = Some(hidserv_stat(item)?)
            }
            Keyword::HidservDirV3OnionsSeen => {
                self.hidserv_dir_v3_onions_seen = Some(hidserv_stat(item)?)
            }
            Keyword::PaddingCounts => {
                let (stats_end, rest) = stats_end_and_rest(item)?;
                self.padding_counts = Some(KeyedStats {
                    stats_end,
                    values: parse_params(&rest).context(line)?,
                });
            }
            Keyword::BridgeStatsEnd => self.bridge_stats_end = Some(stats_end_and_rest(item)?.0),
            Keyword::BridgeIps => self.bridge_ips = Some(int_map(item)?),
            Keyword::BridgeIpVersions => self.bridge_ip_versions = Some(int_map(item)?),
            Keyword::BridgeIpTransports => self.bridge_ip_transports = Some(int_map(item)?),
            Keyword::OverloadRatelimits => {
                // version date time rate-limit burst-limit read-count write-count
                let args = item.exact_args(7)?;
                self.overload_ratelimits = Some(OverloadRatelimits {
                    timestamp: parse_timestamp_parts(args[1], args[2]).context(line)?,
                    rate_limit: parse_int(args[3]).context(line)?,
                    burst_limit: parse_int(args[4]).context(line)?,
                    read_count: parse_int(args[5]).context(line)?,
                    write_count: parse_int(args[6]).context(line)?,
                });
            }
            Keyword::OverloadFdExhausted => {
                let args = item.exact_args(3)?;
                self.overload_fd_exhausted =
                    Some(parse_timestamp_parts(args[1], args[2]).context(line)?);
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

impl ExtraInfoDescriptor {
    /// Parse a relay extra-info descriptor from raw text.
    pub fn from_str(text: impl AsRef<str>) -> Result<ExtraInfoDescriptor, DocumentParseError> {
        let raw = RawDocument::new(text.as_ref().as_bytes());
        Self::parse(&raw, DescriptorFlavour::Relay, &ParseOptions::default())
    }

    pub fn parse(
        raw: &RawDocument,
        flavour: DescriptorFlavour,
        options: &ParseOptions,
    ) -> Result<ExtraInfoDescriptor, DocumentParseError> {
        let grammar: &Grammar = match flavour {
            DescriptorFlavour::Relay => &RELAY_GRAMMAR,
            DescriptorFlavour::Bridge => &BRIDGE_GRAMMAR,
        };
        let ParsedBody { mut meta, items } = grammar.parse(raw, options)?;
        let mut builder = ExtraInfoDescriptorBuilder::default();
        builder.flavour(flavour);
        let mut statistics = ExtraInfoStatistics::default();
        let mut transports = Vec::new();
        let mut stated_master_key: Option<&Item<'_>> = None;
        let mut stated_sha1 = None;
        let mut stated_sha256 = None;

        for item in items.iter() {
            if statistics.record(item)? {
                continue;
            }
            let line = item.line();
            match item.keyword() {
                Keyword::ExtraInfo => {
                    let args = item.exact_args(2)?;
                    builder.nickname(parse_nickname(args[0]).context(line)?);
                    builder.fingerprint(Fingerprint::from_str_hex(args[1]).context(line)?);
                }
                Keyword::Published => {
                    builder.published(parse_timestamp(item.get_argument()?).context(line)?);
                }
                Keyword::Transport => transports.push(item.args_or_empty().to_string()),
                Keyword::IdentityEd25519 => {
                    builder.identity_ed25519(
                        Ed25519Certificate::from_block(item.required_object()?).context(line)?,
                    );
                }
                Keyword::MasterKeyEd25519 => {
                    parse_base64(item.exact_args(1)?[0], 32).context(line)?;
                    stated_master_key = Some(item);
                }
                Keyword::RouterSigEd25519 => {
                    builder.router_sig_ed25519(item.exact_args(1)?[0].to_string());
                }
                Keyword::RouterSignature => {
                    builder.router_signature(item.required_object()?.clone());
                }
                Keyword::RouterDigest => {
                    stated_sha1 = Some(parse_hex(item.exact_args(1)?[0], 40).context(line)?);
                }
                Keyword::RouterDigestSha256 => {
                    let digest = item.exact_args(1)?[0];
                    parse_base64(digest, 32).context(line)?;
                    stated_sha256 = Some(digest.trim_end_matches('=').to_string());
                }
                _ => {}
            }
        }

        let identity = builder.identity_ed25519.clone().flatten();
        if let Some(master) = certified_master_key(identity.as_ref(), stated_master_key)? {
            builder.master_key_ed25519(master);
        }

        match (flavour, stated_sha1) {
            (DescriptorFlavour::Bridge, Some(sha1)) => meta.set_sha1_hex(sha1.to_ascii_lowercase()),
            (DescriptorFlavour::Bridge, None) => {
                if SHA1_RANGE.locate(meta.raw().as_bytes()).is_ok() {
                    meta.locate_sha1(SHA1_RANGE)?;
                }
            }
            (DescriptorFlavour::Relay, _) => meta.locate_sha1(SHA1_RANGE)?,
        }
        match (flavour, stated_sha256) {
            (DescriptorFlavour::Bridge, Some(sha256)) => meta.set_sha256_base64(sha256),
            (DescriptorFlavour::Bridge, None) => {}
            (DescriptorFlavour::Relay, _) => meta.locate_sha256(SHA256_RANGE)?,
        }
        trace!(flavour = %flavour, transports = transports.len(), "parsed extra-info descriptor");

        builder.statistics(statistics);
        builder.transports(transports);
        builder.meta(meta);
        builder
            .build()
            .map_err(|e| DocumentParseError::Incomplete(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::ed25519::tests::identity_block;
    use crate::meta::Descriptor;

    const EXTRA_INFO: &str = concat!(
        "extra-info moria1 9695DFC35FFEB861329B9F1AB04C46397020CE31\n",
        "published 2023-11-20 12:00:00\n",
        "write-history 2023-11-20 11:49:27 (86400 s) 100,200\n",
        "read-history 2023-11-20 11:49:27 (86400 s) 300,400\n",
        "geoip-db-digest 6346E26E2BC96F8511588CE2695E9B0339A75D32\n",
        "dirreq-stats-end 2023-11-20 05:34:56 (86400 s)\n",
        "dirreq-v3-ips us=16,de=8\n",
        "dirreq-v3-share 12.50%\n",
        "dirreq-v3-resp ok=1024,not-enough-sigs=0,unavailable=0\n",
        "cell-stats-end 2023-11-20 05:34:56 (86400 s)\n",
        "cell-processed-cells 0.50,1.00,2.00\n",
        "cell-circuits-per-decile 12\n",
        "conn-bi-direct 2023-11-20 05:34:56 (86400 s) 10,20,30,40\n",
        "ipv6-conn-bi-direct 2023-11-20 05:34:56 (86400 s) below=1,read=2,write=3,both=4\n",
        "hidserv-stats-end 2023-11-20 05:34:56 (86400 s)\n",
        "hidserv-rend-relayed-cells -1024 delta_f=2048 epsilon=0.30 bin_size=1024\n",
        "padding-counts 2023-11-20 05:34:56 (86400 s) bin-size=10000 write-drop=0\n",
        "overload-ratelimits 1 2023-11-20 11:00:00 1000 2000 3 4\n",
        "transport obfs4 1.2.3.4:443\n",
        "router-signature\n",
        "-----BEGIN SIGNATURE-----\n",
        "AAAA\n",
        "-----END SIGNATURE-----\n",
    );

    #[test]
    fn test_parse_statistics() {
        let desc = ExtraInfoDescriptor::from_str(EXTRA_INFO).unwrap();
        assert_eq!(desc.nickname, "moria1");
        let stats = &desc.statistics;
        assert_eq!(stats.write_history.as_ref().unwrap().values, vec![100, 200]);
        assert_eq!(stats.dirreq_v3_ips.as_ref().unwrap().get("us"), Some(&16));
        assert_eq!(stats.dirreq_v3_share, Some(12.5));
        assert_eq!(stats.cell_processed_cells.as_ref().unwrap().len(), 3);
        assert_eq!(stats.cell_circuits_per_decile, Some(12));
        assert_eq!(stats.conn_bi_direct.unwrap().both, 40);
        assert_eq!(
            stats.ipv6_conn_bi_direct.as_ref().unwrap().values.get("write"),
            Some(&3)
        );
        let hs = stats.hidserv_rend_relayed_cells.as_ref().unwrap();
        assert_eq!(hs.value, -1024.0);
        assert_eq!(hs.parameters.get("epsilon"), Some(&0.3));
        assert_eq!(
            stats.padding_counts.as_ref().unwrap().values.get("bin-size"),
            Some(&10000)
        );
        assert_eq!(stats.overload_ratelimits.unwrap().burst_limit, 2000);
        assert!(stats.entry_ips.is_none());
        assert_eq!(desc.transports, vec!["obfs4 1.2.3.4:443".to_string()]);
        assert_eq!(desc.digest_sha1_hex().unwrap().len(), 40);
        assert_eq!(desc.digest_sha256_base64().unwrap().len(), 43);
    }

    #[test]
    fn test_duplicate_statistic() {
        let text = EXTRA_INFO.replace(
            "dirreq-v3-share 12.50%\n",
            "dirreq-v3-share 12.50%\ndirreq-v3-share 1%\n",
        );
        assert!(ExtraInfoDescriptor::from_str(text)
            .unwrap_err()
            .grammar_violation()
            .is_some());
    }

    #[test]
    fn test_bad_interval() {
        let text = EXTRA_INFO.replace(
            "dirreq-stats-end 2023-11-20 05:34:56 (86400 s)",
            "dirreq-stats-end 2023-11-20 05:34:56 86400 s",
        );
        assert!(matches!(
            ExtraInfoDescriptor::from_str(text).unwrap_err(),
            DocumentParseError::FieldValue {
                source: FieldError::InvalidInterval(_),
                ..
            }
        ));
    }

    #[test]
    fn test_bridge_extra_info() {
        let text = concat!(
            "@type bridge-extra-info 1.3\n",
            "extra-info ec2bridgercc7f31fe 0011223344556677889900112233445566778899\n",
            "published 2023-11-20 12:00:00\n",
            "bridge-stats-end 2023-11-20 05:34:56 (86400 s)\n",
            "bridge-ips us=8\n",
            "router-digest-sha256 Ytn9DvcaN6gzD9b/Ufh2WTBBsxUZGUOTHJYHMaY1fTo\n",
            "router-digest 00112233445566778899AABBCCDDEEFF00112233\n",
        );
        let raw = RawDocument::new(text.as_bytes());
        let desc =
            ExtraInfoDescriptor::parse(&raw, DescriptorFlavour::Bridge, &ParseOptions::default())
                .unwrap();
        assert_eq!(desc.statistics.bridge_ips.as_ref().unwrap().get("us"), Some(&8));
        assert_eq!(
            desc.digest_sha1_hex(),
            Some("00112233445566778899aabbccddeeff00112233")
        );
        assert_eq!(
            desc.digest_sha256_base64(),
            Some("Ytn9DvcaN6gzD9b/Ufh2WTBBsxUZGUOTHJYHMaY1fTo")
        );
    }

    #[test]
    fn test_master_key() {
        let master = base64::encode_config([7u8; 32], base64::STANDARD_NO_PAD);
        let signed = EXTRA_INFO.replace(
            "published 2023-11-20 12:00:00\n",
            &format!(
                "{}master-key-ed25519 {master}\npublished 2023-11-20 12:00:00\n",
                identity_block([7; 32])
            ),
        );
        let raw = RawDocument::new(signed.as_bytes());
        let desc =
            ExtraInfoDescriptor::parse(&raw, DescriptorFlavour::Relay, &ParseOptions::strict())
                .unwrap();
        assert_eq!(desc.master_key_ed25519.as_deref(), Some(master.as_str()));

        let other = base64::encode_config([8u8; 32], base64::STANDARD_NO_PAD);
        let mismatched = signed.replace(&master, &other);
        assert!(matches!(
            ExtraInfoDescriptor::from_str(mismatched).unwrap_err(),
            DocumentParseError::Ed25519MasterKeyMismatch { .. }
        ));
    }

    #[test]
    fn test_bridge_without_digest_lines() {
        let text = concat!(
            "extra-info ec2bridgercc7f31fe 0011223344556677889900112233445566778899\n",
            "published 2023-11-20 12:00:00\n",
            "bridge-ips us=8\n",
        );
        let raw = RawDocument::new(text.as_bytes());
        let desc =
            ExtraInfoDescriptor::parse(&raw, DescriptorFlavour::Bridge, &ParseOptions::default())
                .unwrap();
        assert_eq!(desc.digest_sha1_hex(), None);
        assert_eq!(desc.digest_sha256_base64(), None);
    }
}
