//! Historical directory formats: version 2 network statuses and
//! version 1 signed directories.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use tracing::debug;

use crate::config::ParseOptions;
use crate::consensus::{parse_entries, EntryFlavour, NetworkStatusEntry, Regions};
use crate::descriptor::{self, DescriptorFlavour, ServerDescriptor};
use crate::dispatch::UnparseableDocument;
use crate::error::{DocumentParseError, ErrorContext, GrammarViolation};
use crate::fields::{parse_comma_list, parse_ipv4, parse_port, parse_timestamp, Fingerprint};
use crate::meta::grammar::Grammar;
use crate::meta::{
    cut_off_annotations, find_line_start, impl_descriptor, split_documents, CryptoBlock,
    DigestRange, DocumentMeta, Item, Keyword, RawDocument,
};

pub(crate) const V2_ANCHOR: &str = "network-status-version 2";
pub(crate) const V1_ANCHOR: &str = "signed-directory\n";

const SIGNATURE_ANCHOR: &str = "directory-signature ";
const V2_SHA1_RANGE: DigestRange = DigestRange::between("network-status-version ", "\ndirectory-signature ");
const V1_SHA1_RANGE: DigestRange = DigestRange::between("signed-directory\n", "\ndirectory-signature ");

lazy_static! {
    static ref V2_HEADER: Grammar = Grammar::new("network status v2 header")
        .first(Keyword::NetworkStatusVersion)
        .exactly_once(&[
            Keyword::NetworkStatusVersion,
            Keyword::DirSource,
            Keyword::Fingerprint,
            Keyword::Published,
            Keyword::DirSigningKey,
        ])
        .at_most_once(&[
            Keyword::Contact,
            Keyword::ClientVersions,
            Keyword::ServerVersions,
            Keyword::DirOptions,
        ])
        .objects(&[Keyword::DirSigningKey]);
    static ref V1_HEADER: Grammar = Grammar::new("v1 directory header")
        .first(Keyword::SignedDirectory)
        .exactly_once(&[Keyword::SignedDirectory, Keyword::Published, Keyword::DirSigningKey])
        .at_most_once(&[
            Keyword::RecommendedSoftware,
            Keyword::RouterStatus,
            Keyword::RunningRouters,
        ])
        .objects(&[Keyword::DirSigningKey]);
    static ref SIGNATURE: Grammar = Grammar::new("directory signature")
        .first(Keyword::DirectorySignature)
        .last(Keyword::DirectorySignature)
        .exactly_once(&[Keyword::DirectorySignature])
        .objects(&[Keyword::DirectorySignature]);
}

/// The signature closing a legacy document, made with the key of the
/// named authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacySignature {
    pub nickname: String,
    pub signature: CryptoBlock,
}

/// Parse the trailing signature region, which must be present.
fn parse_signature(
    bytes: &[u8],
    options: &ParseOptions,
    unrecognized: &mut Vec<String>,
) -> Result<LegacySignature, DocumentParseError> {
    let items = SIGNATURE.parse_items(bytes, options, unrecognized)?;
    let item = items.first().ok_or(GrammarViolation::NotExactlyOnce {
        keyword: Keyword::DirectorySignature,
        count: 0,
    })?;
    Ok(LegacySignature {
        nickname: item.exact_args(1)?[0].to_string(),
        signature: item.required_object()?.clone(),
    })
}

/// A version 2 network status, published by each authority on its own.
#[derive(Debug, Clone)]
pub struct LegacyNetworkStatus {
    meta: DocumentMeta,
    pub hostname: String,
    pub address: Ipv4Addr,
    pub dir_port: u16,
    pub fingerprint: Fingerprint,
    pub contact: Option<String>,
    pub published: DateTime<Utc>,
    pub dir_options: Vec<String>,
    pub client_versions: Vec<String>,
    pub server_versions: Vec<String>,
    pub dir_signing_key: CryptoBlock,
    pub entries: BTreeMap<Fingerprint, NetworkStatusEntry>,
    pub signature: LegacySignature,
}

impl_descriptor!(LegacyNetworkStatus);

impl LegacyNetworkStatus {
    pub fn from_str(text: impl AsRef<str>) -> Result<LegacyNetworkStatus, DocumentParseError> {
        let raw = RawDocument::new(text.as_ref().as_bytes());
        Self::parse(&raw, &ParseOptions::default())
    }

    pub fn parse(raw: &RawDocument, options: &ParseOptions) -> Result<LegacyNetworkStatus, DocumentParseError> {
        let (annotations, offset) = cut_off_annotations(raw.as_bytes())?;
        let body_raw = raw.slice(offset..raw.len());
        let body = body_raw.as_bytes();
        let regions = Regions::locate(body, None);

        let mut unrecognized = Vec::new();
        let items = V2_HEADER.parse_items(&body[regions.header.clone()], options, &mut unrecognized)?;
        let header = V2Header::from_items(&items)?;
        let entries = parse_entries(
            &body[regions.entries.start..regions.signatures.start],
            EntryFlavour::Descriptor,
            options,
            &mut unrecognized,
        )?;
        let signature = parse_signature(&body[regions.signatures.clone()], options, &mut unrecognized)?;

        let mut meta = DocumentMeta::new(body_raw.clone(), annotations, unrecognized);
        meta.locate_sha1(V2_SHA1_RANGE)?;
        Ok(LegacyNetworkStatus {
            meta,
            hostname: header.hostname,
            address: header.address,
            dir_port: header.dir_port,
            fingerprint: header.fingerprint,
            contact: header.contact,
            published: header.published,
            dir_options: header.dir_options,
            client_versions: header.client_versions,
            server_versions: header.server_versions,
            dir_signing_key: header.dir_signing_key,
            entries,
            signature,
        })
    }
}

struct V2Header {
    hostname: String,
    address: Ipv4Addr,
    dir_port: u16,
    fingerprint: Fingerprint,
    contact: Option<String>,
    published: DateTime<Utc>,
    dir_options: Vec<String>,
    client_versions: Vec<String>,
    server_versions: Vec<String>,
    dir_signing_key: CryptoBlock,
}

impl V2Header {
    fn from_items(items: &[Item<'_>]) -> Result<V2Header, DocumentParseError> {
        let mut dir_source = None;
        let mut fingerprint = None;
        let mut contact = None;
        let mut published = None;
        let mut dir_options = Vec::new();
        let mut client_versions = Vec::new();
        let mut server_versions = Vec::new();
        let mut dir_signing_key = None;
        for item in items {
            let line = item.line();
            match item.keyword() {
                Keyword::NetworkStatusVersion => {
                    if item.exact_args(1)?[0] != "2" {
                        return Err(DocumentParseError::malformed(format!(
                            "unsupported network status version in '{line}'"
                        )));
                    }
                }
                Keyword::DirSource => {
                    // hostname address DirPort
                    let args = item.exact_args(3)?;
                    dir_source = Some((
                        args[0].to_string(),
                        parse_ipv4(args[1]).context(line)?,
                        parse_port(args[2]).context(line)?,
                    ));
                }
                Keyword::Fingerprint => {
                    fingerprint = Some(Fingerprint::from_str_hex(item.get_argument()?).context(line)?)
                }
                Keyword::Contact => contact = Some(item.args_or_empty().to_string()),
                Keyword::Published => {
                    published = Some(parse_timestamp(item.get_argument()?).context(line)?)
                }
                Keyword::DirOptions => {
                    dir_options = item.split_arguments().into_iter().map(str::to_string).collect()
                }
                Keyword::ClientVersions => client_versions = parse_comma_list(item.args_or_empty()),
                Keyword::ServerVersions => server_versions = parse_comma_list(item.args_or_empty()),
                Keyword::DirSigningKey => dir_signing_key = Some(item.required_object()?.clone()),
                _ => {}
            }
        }
        let missing = |keyword| GrammarViolation::NotExactlyOnce { keyword, count: 0 };
        let (hostname, address, dir_port) = dir_source.ok_or_else(|| missing(Keyword::DirSource))?;
        Ok(V2Header {
            hostname,
            address,
            dir_port,
            fingerprint: fingerprint.ok_or_else(|| missing(Keyword::Fingerprint))?,
            contact,
            published: published.ok_or_else(|| missing(Keyword::Published))?,
            dir_options,
            client_versions,
            server_versions,
            dir_signing_key: dir_signing_key.ok_or_else(|| missing(Keyword::DirSigningKey))?,
        })
    }
}

/// A version 1 signed directory, which embeds full server descriptors.
#[derive(Debug)]
pub struct LegacyDirectory {
    meta: DocumentMeta,
    pub published: DateTime<Utc>,
    pub recommended_software: Vec<String>,
    /// Arguments of `router-status`, such as `moria1=$FFCB...`.
    pub router_status: Vec<String>,
    pub running_routers: Vec<String>,
    pub dir_signing_key: CryptoBlock,
    pub server_descriptors: Vec<ServerDescriptor>,
    /// Embedded descriptors that failed to parse; they do not fail the directory.
    pub unparseable_descriptors: Vec<UnparseableDocument>,
    pub signature: LegacySignature,
}

impl_descriptor!(LegacyDirectory);

impl LegacyDirectory {
    pub fn from_str(text: impl AsRef<str>) -> Result<LegacyDirectory, DocumentParseError> {
        let raw = RawDocument::new(text.as_ref().as_bytes());
        Self::parse(&raw, &ParseOptions::default())
    }

    pub fn parse(raw: &RawDocument, options: &ParseOptions) -> Result<LegacyDirectory, DocumentParseError> {
        let (annotations, offset) = cut_off_annotations(raw.as_bytes())?;
        let body_raw = raw.slice(offset..raw.len());
        let body = body_raw.as_bytes();
        let signatures_start = find_line_start(body, SIGNATURE_ANCHOR, 0).unwrap_or(body.len());
        let routers_start = find_line_start(body, descriptor::ANCHOR, 0)
            .filter(|&pos| pos < signatures_start)
            .unwrap_or(signatures_start);

        let mut unrecognized = Vec::new();
        let mut published = None;
        let mut recommended_software = Vec::new();
        let mut router_status = Vec::new();
        let mut running_routers = Vec::new();
        let mut dir_signing_key = None;
        for item in V1_HEADER.parse_items(&body[..routers_start], options, &mut unrecognized)? {
            let line = item.line();
            match item.keyword() {
                Keyword::Published => {
                    published = Some(parse_timestamp(item.get_argument()?).context(line)?)
                }
                Keyword::RecommendedSoftware => {
                    recommended_software = parse_comma_list(item.args_or_empty())
                }
                Keyword::RouterStatus => {
                    router_status = item.split_arguments().into_iter().map(str::to_string).collect()
                }
                Keyword::RunningRouters => {
                    running_routers = item.split_arguments().into_iter().map(str::to_string).collect()
                }
                Keyword::DirSigningKey => dir_signing_key = Some(item.required_object()?.clone()),
                _ => {}
            }
        }
        let missing = |keyword| GrammarViolation::NotExactlyOnce { keyword, count: 0 };
        let published = published.ok_or_else(|| missing(Keyword::Published))?;
        let dir_signing_key = dir_signing_key.ok_or_else(|| missing(Keyword::DirSigningKey))?;

        let routers = body_raw.slice(routers_start..signatures_start);
        let mut server_descriptors = Vec::new();
        let mut unparseable_descriptors = Vec::new();
        for range in split_documents(routers.as_bytes(), descriptor::ANCHOR) {
            let embedded = routers.slice(range);
            match ServerDescriptor::parse(&embedded, DescriptorFlavour::Relay, options) {
                Ok(desc) => server_descriptors.push(desc),
                Err(error) => {
                    debug!(%error, offset = embedded.offset(), "skipping embedded server descriptor");
                    unparseable_descriptors.push(UnparseableDocument::new(embedded, error));
                }
            }
        }

        let signature = parse_signature(&body[signatures_start..], options, &mut unrecognized)?;
        let mut meta = DocumentMeta::new(body_raw.clone(), annotations, unrecognized);
        meta.locate_sha1(V1_SHA1_RANGE)?;
        Ok(LegacyDirectory {
            meta,
            published,
            recommended_software,
            router_status,
            running_routers,
            dir_signing_key,
            server_descriptors,
            unparseable_descriptors,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::Descriptor;

    const KEY: &str = concat!(
        "-----BEGIN RSA PUBLIC KEY-----\n",
        "MIGJAoGBAMVS0HvDLcYpULPIrc3jxTb5ZK/0wQZbMLm4KiXrP/2IJ6xtxBO/RBdM\n",
        "-----END RSA PUBLIC KEY-----\n",
    );

    const SIG: &str = concat!(
        "directory-signature moria2\n",
        "-----BEGIN SIGNATURE-----\n",
        "gRZGvSc+D5eqAGudQmWnpUhk8qKSyvNTMqmnyDDCY5U=\n",
        "-----END SIGNATURE-----\n",
    );

    fn v2_status() -> String {
        format!(
            "network-status-version 2\n\
             dir-source 18.244.0.114 18.244.0.114 80\n\
             fingerprint 719BE45DE224B607C53707D0E2143E2D423E74CF\n\
             contact arma at mit dot edu\n\
             published 2005-12-16 00:13:46\n\
             dir-options Names Versions\n\
             client-versions 0.1.0.15,0.1.0.16\n\
             server-versions 0.1.0.15,0.1.0.16\n\
             dir-signing-key\n{KEY}\
             r moria2 cZ1HhhD5BNbhPeagi2bM1TDQSvw mI9BAgaHQvKcf8y8Q6iBUCm8b5M 2005-12-15 23:07:28 18.244.0.114 443 80\n\
             s Authority Fast Named Running Valid V2Dir\n\
             {SIG}"
        )
    }

    #[test]
    fn test_parse_v2_status() {
        let status = LegacyNetworkStatus::from_str(v2_status()).unwrap();
        assert_eq!(status.hostname, "18.244.0.114");
        assert_eq!(status.dir_port, 80);
        assert_eq!(status.dir_options, vec!["Names", "Versions"]);
        assert_eq!(status.client_versions.len(), 2);
        assert_eq!(status.entries.len(), 1);
        assert_eq!(status.signature.nickname, "moria2");
        assert_eq!(status.contact.as_deref(), Some("arma at mit dot edu"));

        let text = v2_status();
        let end = text.find("\ndirectory-signature ").unwrap() + "\ndirectory-signature ".len();
        assert_eq!(
            status.digest_sha1_hex(),
            Some(crate::meta::sha1_hex(&text.as_bytes()[..end]).as_str())
        );
    }

    #[test]
    fn test_v2_status_without_signature() {
        let text = v2_status();
        let text = &text[..text.find("directory-signature").unwrap()];
        assert!(LegacyNetworkStatus::from_str(text).is_err());
    }

    fn v1_directory(second_router: &str) -> String {
        format!(
            "signed-directory\n\
             published 2005-12-16 00:13:46\n\
             recommended-software 0.1.0.15,0.1.0.16\n\
             running-routers moria1 moria2\n\
             dir-signing-key\n{KEY}\
             {}{second_router}{SIG}",
            crate::descriptor::tests::RELAY,
        )
    }

    #[test]
    fn test_parse_v1_directory() {
        let dir = LegacyDirectory::from_str(v1_directory("")).unwrap();
        assert_eq!(dir.recommended_software, vec!["0.1.0.15", "0.1.0.16"]);
        assert_eq!(dir.running_routers, vec!["moria1", "moria2"]);
        assert_eq!(dir.server_descriptors.len(), 1);
        assert_eq!(dir.server_descriptors[0].nickname, "moria1");
        assert!(dir.unparseable_descriptors.is_empty());
        assert_eq!(dir.signature.nickname, "moria2");
        assert!(dir.digest_sha1_hex().is_some());
    }

    #[test]
    fn test_broken_embedded_descriptor_is_collected() {
        let broken = "router broken 1.2.3.4 9001 0 0\nrouter-signature\n-----BEGIN SIGNATURE-----\nAAAA\n-----END SIGNATURE-----\n";
        let dir = LegacyDirectory::from_str(v1_directory(broken)).unwrap();
        assert_eq!(dir.server_descriptors.len(), 1);
        assert_eq!(dir.unparseable_descriptors.len(), 1);
        assert!(dir.unparseable_descriptors[0]
            .raw
            .as_bytes()
            .starts_with(b"router broken"));
    }
}
