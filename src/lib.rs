//! A parser for Tor directory documents.
//!
//! This crate parses the documents described in
//! [dir-spec](https://gitlab.torproject.org/tpo/core/torspec/-/blob/main/dir-spec.txt)
//! as they are archived by CollecTor: network status consensuses and votes,
//! relay and bridge server descriptors, extra-info descriptors,
//! microdescriptors, directory key certificates, bridge network statuses,
//! bridge pool assignments, exit lists and the legacy v1 and v2 directory
//! formats.
//!
//! Each document keeps its exact bytes, its leading `@` annotations and the
//! lines its grammar did not recognize, and computes its digests on demand.
//!
//! ```
//! use tordescriptor::{DescriptorParser, Descriptor};
//!
//! let text = "bridge-pool-assignment 2011-03-13 14:38:03\n\
//!             00b834117566035736fc6bd4ece950eace8e057a unallocated\n";
//! let results = DescriptorParser::default().parse(text.as_bytes(), None).unwrap();
//! let doc = results.into_iter().next().unwrap().unwrap();
//! assert!(doc.digest_sha256_base64().is_some());
//! ```

pub mod bridgepool;
pub mod bridgestatus;
pub mod certificate;
pub mod config;
pub mod consensus;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod exitlist;
pub mod extrainfo;
pub mod fields;
pub mod legacy;
pub mod meta;
pub mod microdesc;
pub mod reader;

#[doc(inline)]
pub use bridgepool::BridgePoolAssignment;
#[doc(inline)]
pub use bridgestatus::BridgeNetworkStatus;
#[doc(inline)]
pub use certificate::DirectoryKeyCertificate;
pub use config::{ParseOptions, ReaderConfig};
#[doc(inline)]
pub use consensus::{NetworkStatusConsensus, NetworkStatusVote};
#[doc(inline)]
pub use descriptor::{DescriptorFlavour, ServerDescriptor};
pub use dispatch::{DescriptorParser, DescriptorType, Document, UnparseableDocument};
pub use error::{DocumentParseError, FieldError, GrammarViolation};
#[doc(inline)]
pub use exitlist::ExitList;
#[doc(inline)]
pub use extrainfo::ExtraInfoDescriptor;
pub use fields::Fingerprint;
#[doc(inline)]
pub use legacy::{LegacyDirectory, LegacyNetworkStatus};
pub use meta::{Descriptor, DocumentMeta, RawDocument};
#[doc(inline)]
pub use microdesc::Microdescriptor;
pub use reader::{DescriptorReader, DescriptorResult};
