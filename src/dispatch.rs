//! Detecting the type of a buffer and parsing every document in it.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use strum::Display;
use tracing::{debug, warn};

use crate::bridgepool::{self, BridgePoolAssignment};
use crate::bridgestatus::{BridgeNetworkStatus, FilenameHint};
use crate::certificate::{self, DirectoryKeyCertificate};
use crate::config::ParseOptions;
use crate::consensus::{self, sniff_vote_status, NetworkStatusConsensus, NetworkStatusVote, VoteStatus};
use crate::descriptor::{self, DescriptorFlavour, ServerDescriptor};
use crate::error::DocumentParseError;
use crate::exitlist::ExitList;
use crate::extrainfo::{self, ExtraInfoDescriptor};
use crate::legacy::{self, LegacyDirectory, LegacyNetworkStatus};
use crate::meta::{split_documents, Descriptor, DocumentMeta, RawDocument, TypeAnnotation};
use crate::microdesc::{self, Microdescriptor};

/// Number of leading bytes looked at when detecting the type.
const SNIFF_LEN: usize = 100;

/// The kinds of documents this crate parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum DescriptorType {
    NetworkStatusConsensus,
    NetworkStatusVote,
    BridgeNetworkStatus,
    RelayServerDescriptor,
    BridgeServerDescriptor,
    RelayExtraInfo,
    BridgeExtraInfo,
    Microdescriptor,
    DirectoryKeyCertificate,
    BridgePoolAssignment,
    ExitList,
    LegacyNetworkStatus,
    LegacyDirectory,
}

/// Names used in `@type` annotations.
static TYPE_ANNOTATIONS: phf::Map<&'static str, DescriptorType> = phf::phf_map! {
    "network-status-consensus-3" => DescriptorType::NetworkStatusConsensus,
    "network-status-microdesc-consensus-3" => DescriptorType::NetworkStatusConsensus,
    "network-status-vote-3" => DescriptorType::NetworkStatusVote,
    "bridge-network-status" => DescriptorType::BridgeNetworkStatus,
    "server-descriptor" => DescriptorType::RelayServerDescriptor,
    "bridge-server-descriptor" => DescriptorType::BridgeServerDescriptor,
    "extra-info" => DescriptorType::RelayExtraInfo,
    "bridge-extra-info" => DescriptorType::BridgeExtraInfo,
    "microdescriptor" => DescriptorType::Microdescriptor,
    "dir-key-certificate-3" => DescriptorType::DirectoryKeyCertificate,
    "bridge-pool-assignment" => DescriptorType::BridgePoolAssignment,
    "tordnsel" => DescriptorType::ExitList,
    "network-status-2" => DescriptorType::LegacyNetworkStatus,
    "directory" => DescriptorType::LegacyDirectory,
};

impl DescriptorType {
    /// Look up the name of a `@type` annotation.
    pub fn from_type_name(name: &str) -> Option<DescriptorType> {
        TYPE_ANNOTATIONS.get(name).copied()
    }

    /// Detect the type of `bytes` from its first bytes and, for bridge
    /// network statuses, the file name.
    pub fn detect(bytes: &[u8], filename: Option<&str>) -> Option<DescriptorType> {
        let head = String::from_utf8_lossy(&bytes[..bytes.len().min(SNIFF_LEN)]);
        let mut bridge_purpose = false;
        let mut first_line = None;
        for line in head.lines() {
            if let Some(rest) = line.strip_prefix("@type ") {
                let name = TypeAnnotation::parse(line)
                    .map(|a| a.name)
                    .unwrap_or_else(|| rest.split_whitespace().next().unwrap_or_default().to_string());
                return DescriptorType::from_type_name(&name);
            }
            if !line.starts_with('@') {
                first_line = Some(line);
                break;
            }
            if line.trim_end() == "@purpose bridge" {
                bridge_purpose = true;
            }
        }
        if filename.and_then(FilenameHint::parse).is_some() {
            return Some(DescriptorType::BridgeNetworkStatus);
        }

        let first_line = first_line?;
        let keyword = first_line.split_whitespace().next()?;
        let detected = match keyword {
            "network-status-version" => match first_line.split_whitespace().nth(1) {
                Some("3") => match sniff_vote_status(bytes) {
                    Some(VoteStatus::Vote) => DescriptorType::NetworkStatusVote,
                    _ => DescriptorType::NetworkStatusConsensus,
                },
                Some("2") => DescriptorType::LegacyNetworkStatus,
                _ => return None,
            },
            "signed-directory" => DescriptorType::LegacyDirectory,
            "router" if bridge_purpose => DescriptorType::BridgeServerDescriptor,
            "router" => DescriptorType::RelayServerDescriptor,
            "extra-info" if bridge_purpose => DescriptorType::BridgeExtraInfo,
            "extra-info" => DescriptorType::RelayExtraInfo,
            "onion-key" => DescriptorType::Microdescriptor,
            "dir-key-certificate-version" => DescriptorType::DirectoryKeyCertificate,
            "bridge-pool-assignment" => DescriptorType::BridgePoolAssignment,
            "Downloaded" | "ExitNode" => DescriptorType::ExitList,
            "published" | "flag-thresholds" => DescriptorType::BridgeNetworkStatus,
            _ => return None,
        };
        Some(detected)
    }

    /// The line starting each document, for types that come concatenated.
    fn anchor(self) -> Option<&'static str> {
        match self {
            DescriptorType::NetworkStatusConsensus | DescriptorType::NetworkStatusVote => {
                Some(consensus::ANCHOR)
            }
            DescriptorType::RelayServerDescriptor | DescriptorType::BridgeServerDescriptor => {
                Some(descriptor::ANCHOR)
            }
            DescriptorType::RelayExtraInfo | DescriptorType::BridgeExtraInfo => {
                Some(extrainfo::ANCHOR)
            }
            DescriptorType::Microdescriptor => Some(microdesc::ANCHOR),
            DescriptorType::DirectoryKeyCertificate => Some(certificate::ANCHOR),
            DescriptorType::BridgePoolAssignment => Some(bridgepool::ANCHOR),
            DescriptorType::LegacyNetworkStatus => Some(legacy::V2_ANCHOR),
            DescriptorType::LegacyDirectory => Some(legacy::V1_ANCHOR),
            DescriptorType::BridgeNetworkStatus | DescriptorType::ExitList => None,
        }
    }
}

/// Any parsed document.
#[derive(Debug)]
pub enum Document {
    NetworkStatusConsensus(NetworkStatusConsensus),
    NetworkStatusVote(NetworkStatusVote),
    BridgeNetworkStatus(BridgeNetworkStatus),
    ServerDescriptor(ServerDescriptor),
    ExtraInfoDescriptor(ExtraInfoDescriptor),
    Microdescriptor(Microdescriptor),
    DirectoryKeyCertificate(DirectoryKeyCertificate),
    BridgePoolAssignment(BridgePoolAssignment),
    ExitList(ExitList),
    LegacyNetworkStatus(LegacyNetworkStatus),
    LegacyDirectory(LegacyDirectory),
}

impl Descriptor for Document {
    fn meta(&self) -> &DocumentMeta {
        match self {
            Document::NetworkStatusConsensus(d) => d.meta(),
            Document::NetworkStatusVote(d) => d.meta(),
            Document::BridgeNetworkStatus(d) => d.meta(),
            Document::ServerDescriptor(d) => d.meta(),
            Document::ExtraInfoDescriptor(d) => d.meta(),
            Document::Microdescriptor(d) => d.meta(),
            Document::DirectoryKeyCertificate(d) => d.meta(),
            Document::BridgePoolAssignment(d) => d.meta(),
            Document::ExitList(d) => d.meta(),
            Document::LegacyNetworkStatus(d) => d.meta(),
            Document::LegacyDirectory(d) => d.meta(),
        }
    }
}

impl Document {
    pub fn descriptor_type(&self) -> DescriptorType {
        match self {
            Document::NetworkStatusConsensus(_) => DescriptorType::NetworkStatusConsensus,
            Document::NetworkStatusVote(_) => DescriptorType::NetworkStatusVote,
            Document::BridgeNetworkStatus(_) => DescriptorType::BridgeNetworkStatus,
            Document::ServerDescriptor(d) => match d.flavour {
                DescriptorFlavour::Relay => DescriptorType::RelayServerDescriptor,
                DescriptorFlavour::Bridge => DescriptorType::BridgeServerDescriptor,
            },
            Document::ExtraInfoDescriptor(d) => match d.flavour {
                DescriptorFlavour::Relay => DescriptorType::RelayExtraInfo,
                DescriptorFlavour::Bridge => DescriptorType::BridgeExtraInfo,
            },
            Document::Microdescriptor(_) => DescriptorType::Microdescriptor,
            Document::DirectoryKeyCertificate(_) => DescriptorType::DirectoryKeyCertificate,
            Document::BridgePoolAssignment(_) => DescriptorType::BridgePoolAssignment,
            Document::ExitList(_) => DescriptorType::ExitList,
            Document::LegacyNetworkStatus(_) => DescriptorType::LegacyNetworkStatus,
            Document::LegacyDirectory(_) => DescriptorType::LegacyDirectory,
        }
    }
}

/// A document that could not be parsed, with the reason.
#[derive(Debug)]
pub struct UnparseableDocument {
    pub raw: RawDocument,
    pub error: DocumentParseError,
}

impl UnparseableDocument {
    pub(crate) fn new(raw: RawDocument, error: DocumentParseError) -> Self {
        UnparseableDocument { raw, error }
    }
}

impl fmt::Display for UnparseableDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unparseable document at offset {} ({} bytes): {}",
            self.raw.offset(),
            self.raw.len(),
            self.error
        )
    }
}

/// Parse a single document of a known type.
pub fn parse_document(
    raw: &RawDocument,
    descriptor_type: DescriptorType,
    filename: Option<&str>,
    options: &ParseOptions,
) -> Result<Document, DocumentParseError> {
    let doc = match descriptor_type {
        DescriptorType::NetworkStatusConsensus => {
            Document::NetworkStatusConsensus(NetworkStatusConsensus::parse(raw, options)?)
        }
        DescriptorType::NetworkStatusVote => {
            Document::NetworkStatusVote(NetworkStatusVote::parse(raw, options)?)
        }
        DescriptorType::BridgeNetworkStatus => {
            Document::BridgeNetworkStatus(BridgeNetworkStatus::parse(raw, filename, options)?)
        }
        DescriptorType::RelayServerDescriptor => Document::ServerDescriptor(
            ServerDescriptor::parse(raw, DescriptorFlavour::Relay, options)?,
        ),
        DescriptorType::BridgeServerDescriptor => Document::ServerDescriptor(
            ServerDescriptor::parse(raw, DescriptorFlavour::Bridge, options)?,
        ),
        DescriptorType::RelayExtraInfo => Document::ExtraInfoDescriptor(
            ExtraInfoDescriptor::parse(raw, DescriptorFlavour::Relay, options)?,
        ),
        DescriptorType::BridgeExtraInfo => Document::ExtraInfoDescriptor(
            ExtraInfoDescriptor::parse(raw, DescriptorFlavour::Bridge, options)?,
        ),
        DescriptorType::Microdescriptor => {
            Document::Microdescriptor(Microdescriptor::parse(raw, options)?)
        }
        DescriptorType::DirectoryKeyCertificate => {
            Document::DirectoryKeyCertificate(DirectoryKeyCertificate::parse(raw, options)?)
        }
        DescriptorType::BridgePoolAssignment => {
            Document::BridgePoolAssignment(BridgePoolAssignment::parse(raw, options)?)
        }
        DescriptorType::ExitList => Document::ExitList(ExitList::parse(raw, filename, options)?),
        DescriptorType::LegacyNetworkStatus => {
            Document::LegacyNetworkStatus(LegacyNetworkStatus::parse(raw, options)?)
        }
        DescriptorType::LegacyDirectory => {
            Document::LegacyDirectory(LegacyDirectory::parse(raw, options)?)
        }
    };
    Ok(doc)
}

/// Parses whole buffers, which may hold several documents of one type.
#[derive(Debug, Clone, Default)]
pub struct DescriptorParser {
    options: ParseOptions,
}

impl DescriptorParser {
    pub fn new(options: ParseOptions) -> Self {
        DescriptorParser { options }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Parse every document in `bytes`.
    ///
    /// Fails as a whole only if the type cannot be detected or no document
    /// is found. Otherwise each document yields its own result, so one bad
    /// document does not affect the others.
    pub fn parse(
        &self,
        bytes: impl Into<Arc<[u8]>>,
        filename: Option<&str>,
    ) -> Result<Vec<Result<Document, UnparseableDocument>>, DocumentParseError> {
        let buf: Arc<[u8]> = bytes.into();
        let whole = RawDocument::new(buf);
        let descriptor_type = DescriptorType::detect(whole.as_bytes(), filename).ok_or_else(|| {
            DocumentParseError::UnknownDescriptorType {
                prefix: whole.prefix(SNIFF_LEN),
            }
        })?;
        let ranges = split(&whole, descriptor_type)?;
        debug!(
            %descriptor_type,
            filename,
            documents = ranges.len(),
            "split buffer into documents"
        );

        Ok(ranges
            .into_iter()
            .map(|range| {
                let raw = whole.slice(range);
                parse_document(&raw, descriptor_type, filename, &self.options).map_err(|error| {
                    warn!(
                        %descriptor_type,
                        filename,
                        offset = raw.offset(),
                        %error,
                        "failed to parse document"
                    );
                    UnparseableDocument::new(raw, error)
                })
            })
            .collect())
    }
}

fn split(whole: &RawDocument, descriptor_type: DescriptorType) -> Result<Vec<Range<usize>>, DocumentParseError> {
    let Some(anchor) = descriptor_type.anchor() else {
        return Ok(vec![0..whole.len()]);
    };
    let ranges = split_documents(whole.as_bytes(), anchor);
    if ranges.is_empty() {
        return Err(DocumentParseError::malformed(format!(
            "no '{}' line found in {descriptor_type} input",
            anchor.trim_end()
        )));
    }
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::descriptor::tests::RELAY;

    #[test]
    fn test_detect_by_annotation() {
        let detect = |s: &str| DescriptorType::detect(s.as_bytes(), None);
        assert_eq!(
            detect("@type network-status-microdesc-consensus-3 1.0\nnetwork-status-version 3 microdesc\n"),
            Some(DescriptorType::NetworkStatusConsensus)
        );
        assert_eq!(
            detect("@type bridge-server-descriptor 1.2\nrouter x"),
            Some(DescriptorType::BridgeServerDescriptor)
        );
        assert_eq!(detect("@type tordnsel 1.0\nDownloaded"), Some(DescriptorType::ExitList));
        assert_eq!(detect("@type torperf 1.0\nBUILDTIMES="), None);
    }

    #[test]
    fn test_detect_by_first_line() {
        let detect = |s: &str| DescriptorType::detect(s.as_bytes(), None);
        assert_eq!(
            detect("network-status-version 3\nvote-status vote\n"),
            Some(DescriptorType::NetworkStatusVote)
        );
        assert_eq!(
            detect("network-status-version 3\nvote-status consensus\n"),
            Some(DescriptorType::NetworkStatusConsensus)
        );
        assert_eq!(
            detect("network-status-version 2\n"),
            Some(DescriptorType::LegacyNetworkStatus)
        );
        assert_eq!(detect("signed-directory\n"), Some(DescriptorType::LegacyDirectory));
        assert_eq!(
            detect("@purpose bridge\nrouter x 1.2.3.4 1 0 0\n"),
            Some(DescriptorType::BridgeServerDescriptor)
        );
        assert_eq!(
            detect("@uploaded-at 2023-01-01 00:00:00\nextra-info x AAAA\n"),
            Some(DescriptorType::RelayExtraInfo)
        );
        assert_eq!(detect("onion-key\n"), Some(DescriptorType::Microdescriptor));
        assert_eq!(detect("ExitNode 00\n"), Some(DescriptorType::ExitList));
        assert_eq!(detect("hello world\n"), None);
        assert_eq!(detect(""), None);
    }

    #[test]
    fn test_detect_bridge_status_by_filename() {
        assert_eq!(
            DescriptorType::detect(
                b"r bridge AAAA BBBB 2012-02-18 07:55:20 10.0.0.1 443 0\n",
                Some("20120219-003237-4A0CCD2DDC7995083D73F5D667100C8A5831F16D"),
            ),
            Some(DescriptorType::BridgeNetworkStatus)
        );
    }

    #[test]
    fn test_type_names() {
        assert_eq!(DescriptorType::RelayServerDescriptor.to_string(), "relay-server-descriptor");
        assert_eq!(
            DescriptorType::from_type_name("dir-key-certificate-3"),
            Some(DescriptorType::DirectoryKeyCertificate)
        );
    }

    #[test]
    fn test_failures_are_isolated() {
        let broken = "router broken 1.2.3.4 9001 0 0\nrouter-signature\n";
        let text = format!("@type server-descriptor 1.0\n{RELAY}{broken}{RELAY}");
        let results = DescriptorParser::default().parse(text.as_bytes(), None).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[2].is_ok());
        let failed = results[1].as_ref().unwrap_err();
        assert!(failed.raw.as_bytes().starts_with(b"router broken"));
        assert!(failed.to_string().contains("unparseable document"));

        let first = results[0].as_ref().unwrap();
        assert_eq!(first.descriptor_type(), DescriptorType::RelayServerDescriptor);
        assert_eq!(first.annotations(), &["@type server-descriptor 1.0".to_string()]);
    }

    #[test]
    #[traced_test]
    fn test_failures_are_logged() {
        let text = format!("{RELAY}router broken 1.2.3.4 9001 0 0\n");
        let results = DescriptorParser::default().parse(text.as_bytes(), Some("relays")).unwrap();
        assert_eq!(results.len(), 2);
        assert!(logs_contain("split buffer into documents"));
        assert!(logs_contain("failed to parse document"));
        assert!(logs_contain("relay-server-descriptor"));
    }

    #[test]
    fn test_no_document_in_buffer() {
        let err = DescriptorParser::default()
            .parse(b"@type server-descriptor 1.0\n".to_vec(), None)
            .unwrap_err();
        assert!(matches!(err, DocumentParseError::MalformedInput { .. }));
    }

    #[test]
    fn test_unknown_type() {
        let err = DescriptorParser::default()
            .parse(b"hello world\n".to_vec(), None)
            .unwrap_err();
        assert!(matches!(err, DocumentParseError::UnknownDescriptorType { prefix } if prefix == "hello world\n"));
    }
}
