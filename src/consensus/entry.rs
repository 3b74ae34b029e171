//! Status entries: the `r` line of a relay or bridge and the lines after it.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use chrono::{DateTime, Utc};
use derive_builder::Builder;
use lazy_static::lazy_static;
use strum::{EnumString, IntoStaticStr};

use crate::config::ParseOptions;
use crate::error::{DocumentParseError, ErrorContext, FieldError, GrammarViolation};
use crate::fields::{
    parse_base64, parse_base64_as_hex, parse_decimal_map, parse_ipv4, parse_nickname,
    parse_optional_port, parse_params, parse_port, parse_socket, parse_timestamp_parts,
    Fingerprint, PortPolicy, Protocols,
};
use crate::meta::grammar::Grammar;
use crate::meta::{split_documents, Item, Keyword};

pub(crate) const ANCHOR: &str = "r ";

lazy_static! {
    static ref GRAMMAR: Grammar = Grammar::new("status entry")
        .first(Keyword::R)
        .exactly_once(&[Keyword::R])
        .at_most_once(&[
            Keyword::S,
            Keyword::V,
            Keyword::Pr,
            Keyword::W,
            Keyword::P,
            Keyword::Id,
            Keyword::Stats,
        ])
        .any_number(&[Keyword::A, Keyword::M]);
}

/// A relay flag in a status document.
///
/// Flags this crate does not know are kept by name in `Unknown`.
#[derive(Debug, Clone, EnumString, IntoStaticStr, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flag {
    Authority,
    BadExit,
    BadDirectory,
    Exit,
    Fast,
    Guard,
    HSDir,
    MiddleOnly,
    Named,
    Unnamed,
    NoEdConsensus,
    Running,
    Stable,
    StaleDesc,
    Sybil,
    V2Dir,
    Valid,
    #[strum(default)]
    Unknown(String),
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Flag::Unknown(name) => f.write_str(name),
            other => {
                let name: &'static str = other.into();
                f.write_str(name)
            }
        }
    }
}

/// Whether entries carry a server-descriptor digest or refer to
/// microdescriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFlavour {
    /// `r nickname identity digest date time address orport dirport`
    Descriptor,
    /// `r nickname identity date time address orport dirport`
    Microdesc,
}

/// The `w` line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryBandwidth {
    pub bandwidth: u64,
    pub measured: Option<u64>,
    pub unmeasured: bool,
}

/// An `m` line: microdescriptor digests, optionally for a set of
/// consensus methods (in votes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicrodescriptorDigest {
    pub consensus_methods: Vec<u32>,
    /// Digest algorithm to base64 digest.
    pub digests: BTreeMap<String, String>,
}

/// One relay or bridge as listed in a network status document.
#[derive(Debug, Clone, Builder)]
#[builder(private)]
pub struct NetworkStatusEntry {
    pub nickname: String,
    pub fingerprint: Fingerprint,
    /// Upper-case hex digest of the server descriptor; absent in
    /// microdesc-flavoured documents.
    #[builder(setter(strip_option), default)]
    pub descriptor_digest: Option<String>,
    pub published: DateTime<Utc>,
    pub address: Ipv4Addr,
    pub or_port: u16,
    #[builder(default)]
    pub dir_port: Option<u16>,
    #[builder(setter(custom), default)]
    pub or_addresses: Vec<(IpAddr, u16)>,
    #[builder(default)]
    pub flags: Vec<Flag>,
    #[builder(setter(strip_option), default)]
    pub version: Option<String>,
    #[builder(setter(strip_option), default)]
    pub protocols: Option<Protocols>,
    #[builder(setter(strip_option), default)]
    pub bandwidth: Option<EntryBandwidth>,
    #[builder(setter(strip_option), default)]
    pub port_policy: Option<PortPolicy>,
    #[builder(setter(custom), default)]
    pub microdescriptor_digests: Vec<MicrodescriptorDigest>,
    /// Ed25519 master key from an `id ed25519` line; `None` also for `id ed25519 none`.
    #[builder(setter(strip_option), default)]
    pub master_key_ed25519: Option<String>,
    #[builder(setter(strip_option), default)]
    pub stats: Option<BTreeMap<String, f64>>,
}

impl NetworkStatusEntryBuilder {
    fn add_or_address(&mut self, addr: (IpAddr, u16)) {
        self.or_addresses.get_or_insert_with(Vec::new).push(addr);
    }

    fn add_microdescriptor_digest(&mut self, digest: MicrodescriptorDigest) {
        self.microdescriptor_digests
            .get_or_insert_with(Vec::new)
            .push(digest);
    }
}

impl NetworkStatusEntry {
    pub fn has_flag(&self, flag: &Flag) -> bool {
        self.flags.contains(flag)
    }

    fn from_items(items: &[Item<'_>], flavour: EntryFlavour) -> Result<Self, DocumentParseError> {
        let mut builder = NetworkStatusEntryBuilder::default();

        for item in items {
            let line = item.line();
            match item.keyword() {
                Keyword::R => {
                    let splits = item.split_arguments();
                    let (nickname, identity, digest, rest) = match (flavour, &splits[..]) {
                        (EntryFlavour::Descriptor, [nickname, identity, digest, rest @ ..]) => {
                            (nickname, identity, Some(digest), rest)
                        }
                        (EntryFlavour::Microdesc, [nickname, identity, rest @ ..]) => {
                            (nickname, identity, None, rest)
                        }
                        _ => return Err(DocumentParseError::args_missing(line, 7)),
                    };
                    match rest {
                        [published_1, published_2, ip, or_port, dir_port] => {
                            builder.nickname(parse_nickname(nickname).context(line)?);
                            builder.fingerprint(Fingerprint::from_str_b64(identity).context(line)?);
                            if let Some(digest) = digest {
                                builder.descriptor_digest(parse_base64_as_hex(digest).context(line)?);
                            }
                            builder.published(
                                parse_timestamp_parts(published_1, published_2).context(line)?,
                            );
                            builder.address(parse_ipv4(ip).context(line)?);
                            builder.or_port(parse_port(or_port).context(line)?);
                            builder.dir_port(parse_optional_port(dir_port).context(line)?);
                        }
                        [_, _, _, _, _, extra @ ..] => {
                            return Err(FieldError::UnexpectedArguments(extra.join(" "))).context(line)
                        }
                        _ => return Err(DocumentParseError::args_missing(line, 7)),
                    }
                }
                Keyword::A => {
                    builder.add_or_address(parse_socket(item.get_argument()?).context(line)?);
                }
                Keyword::S => {
                    // unknown flags are kept, not rejected
                    let flags = item
                        .split_arguments()
                        .into_iter()
                        .map(|x| x.parse::<Flag>().unwrap_or_else(|_| Flag::Unknown(x.to_string())))
                        .collect();
                    builder.flags(flags);
                }
                Keyword::V => {
                    builder.version(item.args_or_empty().to_string());
                }
                Keyword::Pr => {
                    builder.protocols(Protocols::from_args(&item.split_arguments()).context(line)?);
                }
                Keyword::W => {
                    builder.bandwidth(parse_bandwidth(item)?);
                }
                Keyword::P => {
                    builder.port_policy(PortPolicy::from_args(&item.split_arguments()).context(line)?);
                }
                Keyword::M => {
                    builder.add_microdescriptor_digest(parse_microdesc_digest(item)?);
                }
                Keyword::Id => match item.exact_args(2)?[..] {
                    ["ed25519", "none"] => {}
                    ["ed25519", key] => {
                        parse_base64(key, 32).context(line)?;
                        builder.master_key_ed25519(key.trim_end_matches('=').to_string());
                    }
                    [other, _] => {
                        return Err(FieldError::InvalidValue {
                            what: "identity key type",
                            raw: other.to_string(),
                        })
                        .context(line)
                    }
                    _ => {}
                },
                Keyword::Stats => {
                    builder.stats(parse_decimal_map(&item.split_arguments().join(",")).context(line)?);
                }
                _ => {}
            }
        }

        builder
            .build()
            .map_err(|e| DocumentParseError::Incomplete(Box::new(e)))
    }
}

fn parse_bandwidth(item: &Item<'_>) -> Result<EntryBandwidth, DocumentParseError> {
    let line = item.line();
    let params = parse_params(&item.split_arguments()).context(line)?;
    let non_negative = |key: &str| -> Result<Option<u64>, DocumentParseError> {
        params
            .get(key)
            .map(|v| {
                u64::try_from(*v).map_err(|_| FieldError::InvalidInt(v.to_string()))
            })
            .transpose()
            .context(line)
    };
    let bandwidth = non_negative("Bandwidth")?.ok_or_else(|| {
        DocumentParseError::FieldValue {
            line: line.to_string(),
            source: FieldError::InvalidValue {
                what: "bandwidth weight",
                raw: item.args_or_empty().to_string(),
            },
        }
    })?;
    Ok(EntryBandwidth {
        bandwidth,
        measured: non_negative("Measured")?,
        unmeasured: params.get("Unmeasured") == Some(&1),
    })
}

/// Parse `m <digest>` or `m <methods> <alg>=<digest>...`.
fn parse_microdesc_digest(item: &Item<'_>) -> Result<MicrodescriptorDigest, DocumentParseError> {
    let line = item.line();
    match item.required_args(1)?[..] {
        [digest] if !digest.contains('=') => {
            parse_base64(digest, 32).context(line)?;
            Ok(MicrodescriptorDigest {
                consensus_methods: Vec::new(),
                digests: BTreeMap::from([("sha256".to_string(), digest.to_string())]),
            })
        }
        [methods, ref digests @ ..] => {
            let consensus_methods = methods
                .split(',')
                .map(|m| m.parse::<u32>())
                .collect::<Result<Vec<_>, _>>()
                .context(line)
                .context(line)?;
            let mut map = BTreeMap::new();
            for d in digests {
                let (alg, value) = d
                    .split_once('=')
                    .ok_or_else(|| FieldError::InvalidArgumentDict(d.to_string()))
                    .context(line)?;
                map.insert(alg.to_string(), value.to_string());
            }
            Ok(MicrodescriptorDigest {
                consensus_methods,
                digests: map,
            })
        }
        [] => Err(DocumentParseError::args_missing(line, 1)),
    }
}

/// Parse the status entries region of a network status document.
///
/// Entries are keyed by fingerprint; a fingerprint listed twice fails
/// the whole document.
pub(crate) fn parse_entries(
    bytes: &[u8],
    flavour: EntryFlavour,
    options: &ParseOptions,
    unrecognized: &mut Vec<String>,
) -> Result<BTreeMap<Fingerprint, NetworkStatusEntry>, DocumentParseError> {
    let mut entries = BTreeMap::new();
    for range in split_documents(bytes, ANCHOR) {
        let items = GRAMMAR.parse_items(&bytes[range], options, unrecognized)?;
        let entry = NetworkStatusEntry::from_items(&items, flavour)?;
        let fingerprint = entry.fingerprint;
        if entries.insert(fingerprint, entry).is_some() {
            return Err(GrammarViolation::DuplicateEntry {
                what: "status entry",
                key: fingerprint.to_string(),
            }
            .into());
        }
    }
    Ok(entries)
}
