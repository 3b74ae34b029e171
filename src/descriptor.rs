//! Tor server descriptor documents

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use crate::config::ParseOptions;
use crate::error::{DocumentParseError, ErrorContext, FieldError, GrammarViolation};
use crate::fields::{
    parse_base64, parse_hex, parse_int, parse_ipv4, parse_nickname, parse_optional_port,
    parse_port, parse_socket, parse_timestamp, parse_timestamp_parts, BandwidthHistory,
    Ed25519Certificate, Fingerprint, PortPolicy, Protocols,
};
use crate::meta::grammar::{Grammar, ParsedBody};
use crate::meta::{
    impl_descriptor, split_documents, CryptoBlock, DigestRange, DocumentMeta, Item, Keyword,
    RawDocument,
};

mod exit;
pub use exit::{ExitPolicy, ExitPolicyAddress, ExitPolicyPort, ExitPolicyRule};

//
// External dependencies
//
use chrono::{DateTime, Utc};
use derive_builder::Builder;
use lazy_static::lazy_static;
use strum::{Display, EnumString};
use tracing::trace;

/// Whether a descriptor was published by a relay or by a bridge.
///
/// Bridge descriptors are sanitized before publication: they carry no
/// signature and state their digests in `router-digest` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DescriptorFlavour {
    Relay,
    Bridge,
}

pub(crate) const ANCHOR: &str = "router ";

const SHA1_RANGE: DigestRange = DigestRange::between("router ", "\nrouter-signature\n");
const SHA256_RANGE: DigestRange = DigestRange::between("router ", "\n-----END SIGNATURE-----\n");

fn server_grammar(name: &'static str) -> Grammar {
    use Keyword::*;
    Grammar::new(name)
        .first(Router)
        .exactly_once(&[Router, Bandwidth, Published])
        .at_most_once(&[
            Platform,
            Keyword::Fingerprint,
            Hibernating,
            Uptime,
            OnionKey,
            SigningKey,
            IdentityEd25519,
            MasterKeyEd25519,
            OnionKeyCrosscert,
            NtorOnionKey,
            NtorOnionKeyCrosscert,
            Ipv6Policy,
            Contact,
            Family,
            ReadHistory,
            WriteHistory,
            Eventdns,
            CachesExtraInfo,
            ExtraInfoDigest,
            HiddenServiceDir,
            Keyword::Protocols,
            AllowSingleHopExits,
            TunnelledDirServer,
            Proto,
            RouterSigEd25519,
            BridgeDistributionRequest,
            OverloadGeneral,
            RouterDigest,
            RouterDigestSha256,
        ])
        .any_number(&[Keyword::OrAddress, Accept, Reject, FamilyCert])
        .depends(&[MasterKeyEd25519, RouterSigEd25519], IdentityEd25519)
        .objects(&[
            OnionKey,
            SigningKey,
            IdentityEd25519,
            OnionKeyCrosscert,
            NtorOnionKeyCrosscert,
            RouterSignature,
            FamilyCert,
        ])
}

lazy_static! {
    static ref RELAY_GRAMMAR: Grammar = server_grammar("server descriptor")
        .exactly_once(&[Keyword::RouterSignature])
        .last(Keyword::RouterSignature);
    static ref BRIDGE_GRAMMAR: Grammar =
        server_grammar("bridge server descriptor").at_most_once(&[Keyword::RouterSignature]);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FamilyMember {
    Fingerprint(Fingerprint),
    Nickname(String),
}

impl FamilyMember {
    /// Parse `$<hex>`, `$<hex>=nick`, `$<hex>~nick` or a plain nickname.
    fn parse(s: &str) -> Result<FamilyMember, FieldError> {
        match s.strip_prefix('$') {
            Some(rest) => {
                let hex = rest.split(|c| c == '=' || c == '~').next().unwrap_or(rest);
                Ok(FamilyMember::Fingerprint(Fingerprint::from_str_hex(hex)?))
            }
            None => Ok(FamilyMember::Nickname(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrAddress {
    pub ip: IpAddr,
    pub port: u16,
}

/// A relay or bridge server descriptor.
#[derive(Debug, Clone, Builder)]
#[builder(private)]
pub struct ServerDescriptor {
    meta: DocumentMeta,
    pub flavour: DescriptorFlavour,
    pub nickname: String,
    pub address: Ipv4Addr,
    pub or_port: u16,
    pub socks_port: Option<u16>,
    pub dir_port: Option<u16>,
    /// Additional addresses from `or-address` lines.
    #[builder(setter(custom), default)]
    pub or_addresses: Vec<OrAddress>,
    pub bandwidth_avg: u64,
    pub bandwidth_burst: u64,
    pub bandwidth_observed: u64,
    #[builder(setter(strip_option), default)]
    pub platform: Option<String>,
    #[builder(setter(strip_option), default)]
    pub protocols: Option<String>,
    #[builder(setter(strip_option), default)]
    pub proto: Option<Protocols>,
    pub published: DateTime<Utc>,
    #[builder(setter(strip_option), default)]
    pub fingerprint: Option<Fingerprint>,
    #[builder(default)]
    pub hibernating: bool,
    #[builder(setter(strip_option), default)]
    pub uptime: Option<u64>,
    #[builder(setter(strip_option), default)]
    pub onion_key: Option<CryptoBlock>,
    #[builder(setter(strip_option), default)]
    pub signing_key: Option<CryptoBlock>,
    #[builder(setter(strip_option), default)]
    pub onion_key_crosscert: Option<CryptoBlock>,
    #[builder(setter(strip_option), default)]
    pub ntor_onion_key: Option<String>,
    #[builder(setter(strip_option), default)]
    pub ntor_onion_key_crosscert: Option<(u8, CryptoBlock)>,
    #[builder(setter(strip_option), default)]
    pub identity_ed25519: Option<Ed25519Certificate>,
    /// From `master-key-ed25519`, or else from the identity certificate.
    #[builder(setter(strip_option), default)]
    pub master_key_ed25519: Option<String>,
    #[builder(setter(strip_option), default)]
    pub router_sig_ed25519: Option<String>,
    #[builder(setter(strip_option), default)]
    pub router_signature: Option<CryptoBlock>,
    pub exit_policy: ExitPolicy,
    /// Defaults to rejecting everything when there is no `ipv6-policy` line.
    #[builder(default)]
    pub ipv6_policy: PortPolicy,
    #[builder(setter(strip_option), default)]
    pub contact: Option<String>,
    #[builder(default)]
    pub family: Vec<FamilyMember>,
    #[builder(setter(custom), default)]
    pub family_certs: Vec<CryptoBlock>,
    #[builder(setter(strip_option), default)]
    pub read_history: Option<BandwidthHistory>,
    #[builder(setter(strip_option), default)]
    pub write_history: Option<BandwidthHistory>,
    #[builder(default)]
    pub uses_enhanced_dns_logic: bool,
    #[builder(default)]
    pub caches_extra_info: bool,
    /// SHA-1 digest of the extra-info descriptor, upper-case hex.
    #[builder(setter(strip_option), default)]
    pub extra_info_digest_sha1: Option<String>,
    #[builder(setter(strip_option), default)]
    pub extra_info_digest_sha256: Option<String>,
    #[builder(default)]
    pub hidden_service_dir: bool,
    #[builder(default)]
    pub allow_single_hop_exits: bool,
    #[builder(default)]
    pub tunnelled_dir_server: bool,
    #[builder(setter(strip_option), default)]
    pub bridge_distribution_request: Option<String>,
    #[builder(setter(strip_option), default)]
    pub overload_general: Option<DateTime<Utc>>,
}

impl_descriptor!(ServerDescriptor);

impl ServerDescriptorBuilder {
    fn add_or_address(&mut self, or: OrAddress) {
        self.or_addresses.get_or_insert_with(Vec::new).push(or);
    }

    fn add_family_cert(&mut self, cert: CryptoBlock) {
        self.family_certs.get_or_insert_with(Vec::new).push(cert);
    }
}

/// Parse a `0`/`1` flag argument; a missing argument counts as `1`.
fn parse_bool_arg(item: &Item<'_>) -> Result<bool, DocumentParseError> {
    match item.arg(0) {
        None | Some("1") => Ok(true),
        Some("0") => Ok(false),
        Some(other) => Err(FieldError::InvalidValue {
            what: "boolean",
            raw: other.to_string(),
        })
        .context(item.line()),
    }
}

impl ServerDescriptor {
    /// Parse a relay descriptor document from raw text.
    pub fn from_str(text: impl AsRef<str>) -> Result<ServerDescriptor, DocumentParseError> {
        let raw = RawDocument::new(text.as_ref().as_bytes());
        Self::parse(&raw, DescriptorFlavour::Relay, &ParseOptions::default())
    }

    /// Parse several relay descriptor documents all contained in a raw text.
    pub fn many_from_str(
        text: impl AsRef<str>,
    ) -> Result<Vec<ServerDescriptor>, DocumentParseError> {
        let buf: Arc<[u8]> = text.as_ref().as_bytes().into();
        split_documents(&buf, ANCHOR)
            .into_iter()
            .map(|range| {
                let raw = RawDocument::from_shared(buf.clone(), range);
                Self::parse(&raw, DescriptorFlavour::Relay, &ParseOptions::default())
            })
            .collect()
    }

    /// Parse one descriptor of the given flavour.
    pub fn parse(
        raw: &RawDocument,
        flavour: DescriptorFlavour,
        options: &ParseOptions,
    ) -> Result<ServerDescriptor, DocumentParseError> {
        let grammar: &Grammar = match flavour {
            DescriptorFlavour::Relay => &RELAY_GRAMMAR,
            DescriptorFlavour::Bridge => &BRIDGE_GRAMMAR,
        };
        let ParsedBody { mut meta, items } = grammar.parse(raw, options)?;
        let mut builder = ServerDescriptorBuilder::default();
        builder.flavour(flavour);

        let mut exit_policy = ExitPolicy::default();
        let mut stated_master_key: Option<&Item<'_>> = None;
        let mut stated_sha1 = None;
        let mut stated_sha256 = None;

        for item in items.iter() {
            let line = item.line();
            match item.keyword() {
                Keyword::Router => {
                    // nickname address ORPort SOCKSPort DirPort
                    let args = item.exact_args(5)?;
                    builder.nickname(parse_nickname(args[0]).context(line)?);
                    builder.address(parse_ipv4(args[1]).context(line)?);
                    builder.or_port(parse_port(args[2]).context(line)?);
                    builder.socks_port(parse_optional_port(args[3]).context(line)?);
                    builder.dir_port(parse_optional_port(args[4]).context(line)?);
                }
                Keyword::OrAddress => {
                    let (ip, port) = parse_socket(item.get_argument()?).context(line)?;
                    builder.add_or_address(OrAddress { ip, port });
                }
                Keyword::Bandwidth => {
                    // bandwidth-avg bandwidth-burst bandwidth-observed
                    let args = item.required_args(3)?;
                    builder.bandwidth_avg(parse_int(args[0]).context(line)?);
                    builder.bandwidth_burst(parse_int(args[1]).context(line)?);
                    builder.bandwidth_observed(parse_int(args[2]).context(line)?);
                }
                Keyword::Platform => {
                    builder.platform(item.args_or_empty().to_string());
                }
                Keyword::Protocols => {
                    builder.protocols(item.args_or_empty().to_string());
                }
                Keyword::Proto => {
                    builder.proto(Protocols::from_args(&item.split_arguments()).context(line)?);
                }
                Keyword::Published => {
                    builder.published(parse_timestamp(item.get_argument()?).context(line)?);
                }
                Keyword::Fingerprint => {
                    builder.fingerprint(Fingerprint::from_str_hex(item.get_argument()?).context(line)?);
                }
                Keyword::Hibernating => {
                    builder.hibernating(parse_bool_arg(item)?);
                }
                Keyword::Uptime => {
                    builder.uptime(parse_int(item.exact_args(1)?[0]).context(line)?);
                }
                Keyword::OnionKey => {
                    if let Some(block) = item.object() {
                        builder.onion_key(block.clone());
                    }
                }
                Keyword::SigningKey => {
                    builder.signing_key(item.required_object()?.clone());
                }
                Keyword::OnionKeyCrosscert => {
                    builder.onion_key_crosscert(item.required_object()?.clone());
                }
                Keyword::NtorOnionKey => {
                    let key = item.exact_args(1)?[0];
                    parse_base64(key, 32).context(line)?;
                    builder.ntor_onion_key(key.to_string());
                }
                Keyword::NtorOnionKeyCrosscert => {
                    let bit: u8 = match item.exact_args(1)?[0] {
                        "0" => 0,
                        "1" => 1,
                        other => {
                            return Err(DocumentParseError::FieldValue {
                                line: line.to_string(),
                                source: FieldError::InvalidValue {
                                    what: "sign bit",
                                    raw: other.to_string(),
                                },
                            })
                        }
                    };
                    builder.ntor_onion_key_crosscert((bit, item.required_object()?.clone()));
                }
                Keyword::IdentityEd25519 => {
                    let cert =
                        Ed25519Certificate::from_block(item.required_object()?).context(line)?;
                    builder.identity_ed25519(cert);
                }
                Keyword::MasterKeyEd25519 => {
                    let key = item.exact_args(1)?[0];
                    parse_base64(key, 32).context(line)?;
                    stated_master_key = Some(item);
                }
                Keyword::RouterSigEd25519 => {
                    builder.router_sig_ed25519(item.exact_args(1)?[0].to_string());
                }
                Keyword::RouterSignature => {
                    builder.router_signature(item.required_object()?.clone());
                }
                Keyword::Accept | Keyword::Reject => {
                    exit_policy.add_rule(ExitPolicyRule::from_item(item)?);
                }
                Keyword::Ipv6Policy => {
                    builder.ipv6_policy(PortPolicy::from_args(&item.split_arguments()).context(line)?);
                }
                Keyword::Contact => {
                    builder.contact(item.args_or_empty().to_string());
                }
                Keyword::Family => {
                    let family = item
                        .split_arguments()
                        .into_iter()
                        .map(FamilyMember::parse)
                        .collect::<Result<Vec<_>, _>>()
                        .context(line)?;
                    builder.family(family);
                }
                Keyword::FamilyCert => {
                    builder.add_family_cert(item.required_object()?.clone());
                }
                Keyword::ReadHistory => {
                    builder.read_history(
                        BandwidthHistory::from_args(&item.split_arguments()).context(line)?,
                    );
                }
                Keyword::WriteHistory => {
                    builder.write_history(
                        BandwidthHistory::from_args(&item.split_arguments()).context(line)?,
                    );
                }
                Keyword::Eventdns => {
                    builder.uses_enhanced_dns_logic(parse_bool_arg(item)?);
                }
                Keyword::CachesExtraInfo => {
                    builder.caches_extra_info(true);
                }
                Keyword::ExtraInfoDigest => {
                    let args = item.required_args(1)?;
                    builder.extra_info_digest_sha1(parse_hex(args[0], 40).context(line)?);
                    if let Some(sha256) = args.get(1) {
                        parse_base64(sha256, 32).context(line)?;
                        builder.extra_info_digest_sha256(sha256.to_string());
                    }
                }
                Keyword::HiddenServiceDir => {
                    builder.hidden_service_dir(true);
                }
                Keyword::AllowSingleHopExits => {
                    builder.allow_single_hop_exits(true);
                }
                Keyword::TunnelledDirServer => {
                    builder.tunnelled_dir_server(true);
                }
                Keyword::BridgeDistributionRequest => {
                    builder.bridge_distribution_request(item.exact_args(1)?[0].to_string());
                }
                Keyword::OverloadGeneral => {
                    // version date time
                    let args = item.exact_args(3)?;
                    builder.overload_general(parse_timestamp_parts(args[1], args[2]).context(line)?);
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

        if exit_policy.is_empty() {
            return Err(GrammarViolation::CrossField {
                rule: "server descriptor must contain at least one accept or reject line",
            }
            .into());
        }
        builder.exit_policy(exit_policy);

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
            (DescriptorFlavour::Bridge, None) => {
                if SHA256_RANGE.locate(meta.raw().as_bytes()).is_ok() {
                    meta.locate_sha256(SHA256_RANGE)?;
                }
            }
            (DescriptorFlavour::Relay, _) => meta.locate_sha256(SHA256_RANGE)?,
        }
        trace!(flavour = %flavour, "parsed server descriptor");

        builder.meta(meta);
        builder
            .build()
            .map_err(|e| DocumentParseError::Incomplete(Box::new(e)))
    }

    /// All addresses this relay listens on for OR connections.
    pub fn all_or_addresses(&self) -> impl Iterator<Item = OrAddress> + '_ {
        std::iter::once(OrAddress {
            ip: IpAddr::V4(self.address),
            port: self.or_port,
        })
        .chain(self.or_addresses.iter().cloned())
    }

    /// The SHA-1 digest in upper-case hex, as referenced from status entries.
    pub fn digest(&self) -> Option<String> {
        use crate::meta::Descriptor;
        self.digest_sha1_hex().map(str::to_ascii_uppercase)
    }
}

/// The master key certified by an `identity-ed25519` certificate, checked
/// against a `master-key-ed25519` line if the document has one.
pub(crate) fn certified_master_key(
    identity: Option<&Ed25519Certificate>,
    stated: Option<&Item<'_>>,
) -> Result<Option<String>, DocumentParseError> {
    let cert = match identity {
        Some(cert) => cert,
        None => return Ok(None),
    };
    let certified = cert
        .master_key_base64()
        .ok_or_else(|| DocumentParseError::FieldValue {
            line: "identity-ed25519".to_string(),
            source: FieldError::InvalidEd25519Certificate(
                "missing signed-with-ed25519-key extension".to_string(),
            ),
        })?;
    if let Some(item) = stated {
        let stated = item.arg(0).unwrap_or("").trim_end_matches('=');
        if stated != certified {
            return Err(DocumentParseError::Ed25519MasterKeyMismatch {
                certificate: certified,
                line: item.line().to_string(),
            });
        }
    }
    Ok(Some(certified))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::meta::Descriptor;

    pub(crate) const RELAY: &str = concat!(
        "router moria1 128.31.0.34 9101 0 9131\n",
        "platform Tor 0.4.8.9 on Linux\n",
        "proto Cons=1-2 Desc=1-2 Link=1-5 Relay=1-4\n",
        "published 2023-11-20 12:00:00\n",
        "fingerprint 9695 DFC3 5FFE B861 329B 9F1A B04C 4639 7020 CE31\n",
        "uptime 86400\n",
        "bandwidth 1073741824 1073741824 524288\n",
        "onion-key\n",
        "-----BEGIN RSA PUBLIC KEY-----\n",
        "MIGJAoGBAMVS0HvDLcYpULPIrc3jxTb5ZK/0wQZbMLm4KiXrP/2IJ6xtxBO/RBdM\n",
        "-----END RSA PUBLIC KEY-----\n",
        "signing-key\n",
        "-----BEGIN RSA PUBLIC KEY-----\n",
        "MIGJAoGBALtJ9uD7cD7iHjqNA3AgsX9prES5QN+yFQyr2uOkxzhvunnaf6SNhzWW\n",
        "-----END RSA PUBLIC KEY-----\n",
        "family $0011223344556677889900112233445566778899 friend\n",
        "hidden-service-dir\n",
        "contact 1024D/28988BF5 arma mit edu\n",
        "ntor-onion-key Ytn9DvcaN6gzD9b/Ufh2WTBBsxUZGUOTHJYHMaY1fTo\n",
        "reject 10.0.0.0/8:*\n",
        "accept *:80\n",
        "reject *:*\n",
        "ipv6-policy accept 80,443\n",
        "router-signature\n",
        "-----BEGIN SIGNATURE-----\n",
        "gRZGvSc+D5eqAGudQmWnpUhk8qKSyvNTMqmnyDDCY5U=\n",
        "-----END SIGNATURE-----\n",
    );

    #[test]
    fn test_parse_relay() {
        let desc = ServerDescriptor::from_str(RELAY).unwrap();
        assert_eq!(desc.nickname, "moria1");
        assert_eq!(desc.address, Ipv4Addr::new(128, 31, 0, 34));
        assert_eq!(desc.or_port, 9101);
        assert_eq!(desc.socks_port, None);
        assert_eq!(desc.dir_port, Some(9131));
        assert_eq!(desc.bandwidth_observed, 524288);
        assert_eq!(
            desc.fingerprint.unwrap().to_string(),
            "9695DFC35FFEB861329B9F1AB04C46397020CE31"
        );
        assert_eq!(desc.uptime, Some(86400));
        assert!(desc.proto.as_ref().unwrap().supports("Link", 5));
        assert!(desc.hidden_service_dir);
        assert_eq!(desc.family.len(), 2);
        assert_eq!(desc.exit_policy.rules.len(), 3);
        assert!(desc.ipv6_policy.allows_port(443));
        assert!(desc.onion_key.is_some());
        assert!(desc.router_signature.is_some());
        assert!(desc.unrecognized_lines().is_empty());
        assert_eq!(desc.digest_sha1_hex().unwrap().len(), 40);
        assert_eq!(desc.digest_sha256_base64().unwrap().len(), 43);
        assert_eq!(
            desc.digest().unwrap(),
            desc.digest_sha1_hex().unwrap().to_ascii_uppercase()
        );
        assert_eq!(desc.all_or_addresses().count(), 1);
    }

    #[test]
    fn test_digest_covers_router_to_signature() {
        let desc = ServerDescriptor::from_str(RELAY).unwrap();
        let end = RELAY.find("\nrouter-signature\n").unwrap() + "\nrouter-signature\n".len();
        assert_eq!(
            desc.digest_sha1_hex().unwrap(),
            crate::meta::sha1_hex(&RELAY.as_bytes()[..end])
        );
    }

    #[test]
    fn test_missing_exit_policy() {
        let text = RELAY
            .replace("reject 10.0.0.0/8:*\n", "")
            .replace("accept *:80\n", "")
            .replace("reject *:*\n", "");
        let err = ServerDescriptor::from_str(text).unwrap_err();
        assert!(matches!(
            err.grammar_violation(),
            Some(GrammarViolation::CrossField { .. })
        ));
    }

    #[test]
    fn test_relay_requires_signature_last() {
        let text = RELAY.replace("router-signature\n", "");
        let text = text.replace(
            "-----BEGIN SIGNATURE-----\ngRZGvSc+D5eqAGudQmWnpUhk8qKSyvNTMqmnyDDCY5U=\n-----END SIGNATURE-----\n",
            "",
        );
        let err = ServerDescriptor::from_str(text).unwrap_err();
        assert!(err.grammar_violation().is_some());
    }

    #[test]
    fn test_bad_values() {
        let text = RELAY.replace("128.31.0.34 9101", "128.31.0.340 9101");
        assert!(matches!(
            ServerDescriptor::from_str(text).unwrap_err(),
            DocumentParseError::FieldValue {
                source: FieldError::InvalidIpv4(_),
                ..
            }
        ));
        let text = RELAY.replace("9101 0 9131", "99999 0 9131");
        assert!(matches!(
            ServerDescriptor::from_str(text).unwrap_err(),
            DocumentParseError::FieldValue {
                source: FieldError::InvalidPort(_),
                ..
            }
        ));
    }

    #[test]
    fn test_bridge_digest_lines() {
        let text = concat!(
            "@purpose bridge\n",
            "router Unnamed 10.65.189.41 443 0 0\n",
            "published 2023-11-20 12:00:00\n",
            "bandwidth 1 2 3\n",
            "reject *:*\n",
            "router-digest 00112233445566778899AABBCCDDEEFF00112233\n",
        );
        let raw = RawDocument::new(text.as_bytes());
        let desc =
            ServerDescriptor::parse(&raw, DescriptorFlavour::Bridge, &ParseOptions::default())
                .unwrap();
        assert_eq!(desc.flavour, DescriptorFlavour::Bridge);
        assert_eq!(desc.annotations(), &["@purpose bridge".to_string()]);
        assert_eq!(
            desc.digest_sha1_hex(),
            Some("00112233445566778899aabbccddeeff00112233")
        );
        assert_eq!(desc.digest_sha256_base64(), None);
    }

    #[test]
    fn test_bridge_without_digest_lines() {
        let text = concat!(
            "router Unnamed 10.65.189.41 443 0 0\n",
            "published 2023-11-20 12:00:00\n",
            "bandwidth 1 2 3\n",
            "reject *:*\n",
        );
        let raw = RawDocument::new(text.as_bytes());
        let desc =
            ServerDescriptor::parse(&raw, DescriptorFlavour::Bridge, &ParseOptions::default())
                .unwrap();
        assert_eq!(desc.digest_sha1_hex(), None);
        assert_eq!(desc.digest_sha256_base64(), None);

        // relays always sign, so the range must be present
        assert!(
            ServerDescriptor::parse(&raw, DescriptorFlavour::Relay, &ParseOptions::default())
                .is_err()
        );
    }
}
