//! Directory authority key certificates.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use derive_builder::Builder;
use lazy_static::lazy_static;

use crate::config::ParseOptions;
use crate::error::{DocumentParseError, ErrorContext, FieldError, GrammarViolation};
use crate::fields::{parse_int, parse_ipv4, parse_port, parse_timestamp, Fingerprint};
use crate::meta::grammar::{Grammar, ParsedBody};
use crate::meta::{impl_descriptor, CryptoBlock, DigestRange, DocumentMeta, Keyword, RawDocument};

pub(crate) const ANCHOR: &str = "dir-key-certificate-version ";

const SHA1_RANGE: DigestRange =
    DigestRange::between("dir-key-certificate-version ", "\ndir-key-certification\n");

lazy_static! {
    static ref GRAMMAR: Grammar = Grammar::new("directory key certificate")
        .first(Keyword::DirKeyCertificateVersion)
        .last(Keyword::DirKeyCertification)
        .exactly_once(&[
            Keyword::DirKeyCertificateVersion,
            Keyword::Fingerprint,
            Keyword::DirIdentityKey,
            Keyword::DirKeyPublished,
            Keyword::DirKeyExpires,
            Keyword::DirSigningKey,
            Keyword::DirKeyCertification,
        ])
        .at_most_once(&[Keyword::DirAddress, Keyword::DirKeyCrosscert])
        .objects(&[
            Keyword::DirIdentityKey,
            Keyword::DirSigningKey,
            Keyword::DirKeyCrosscert,
            Keyword::DirKeyCertification,
        ]);
}

/// A key certificate binding an authority's medium-term signing key to
/// its long-term identity key.
#[derive(Debug, Clone, Builder)]
#[builder(private)]
pub struct DirectoryKeyCertificate {
    meta: DocumentMeta,
    pub version: u8,
    #[builder(setter(strip_option), default)]
    pub dir_address: Option<(Ipv4Addr, u16)>,
    pub fingerprint: Fingerprint,
    pub dir_identity_key: CryptoBlock,
    pub dir_key_published: DateTime<Utc>,
    pub dir_key_expires: DateTime<Utc>,
    pub dir_signing_key: CryptoBlock,
    #[builder(setter(strip_option), default)]
    pub dir_key_crosscert: Option<CryptoBlock>,
    pub dir_key_certification: CryptoBlock,
}

impl_descriptor!(DirectoryKeyCertificate);

impl DirectoryKeyCertificate {
    pub fn from_str(text: impl AsRef<str>) -> Result<DirectoryKeyCertificate, DocumentParseError> {
        let raw = RawDocument::new(text.as_ref().as_bytes());
        Self::parse(&raw, &ParseOptions::default())
    }

    pub fn parse(
        raw: &RawDocument,
        options: &ParseOptions,
    ) -> Result<DirectoryKeyCertificate, DocumentParseError> {
        let ParsedBody { mut meta, items } = GRAMMAR.parse(raw, options)?;
        let mut builder = DirectoryKeyCertificateBuilder::default();

        for item in items.iter() {
            let line = item.line();
            match item.keyword() {
                Keyword::DirKeyCertificateVersion => {
                    let version: u8 = parse_int(item.exact_args(1)?[0]).context(line)?;
                    if version != 3 {
                        return Err(FieldError::InvalidValue {
                            what: "key certificate version",
                            raw: version.to_string(),
                        })
                        .context(line);
                    }
                    builder.version(version);
                }
                Keyword::DirAddress => {
                    let (ip, port) = item
                        .exact_args(1)?[0]
                        .split_once(':')
                        .ok_or_else(|| FieldError::InvalidIpv4(item.args_or_empty().to_string()))
                        .context(line)?;
                    builder.dir_address((
                        parse_ipv4(ip).context(line)?,
                        parse_port(port).context(line)?,
                    ));
                }
                Keyword::Fingerprint => {
                    builder.fingerprint(Fingerprint::from_str_hex(item.get_argument()?).context(line)?);
                }
                Keyword::DirIdentityKey => {
                    builder.dir_identity_key(item.required_object()?.clone());
                }
                Keyword::DirKeyPublished => {
                    builder.dir_key_published(parse_timestamp(item.get_argument()?).context(line)?);
                }
                Keyword::DirKeyExpires => {
                    builder.dir_key_expires(parse_timestamp(item.get_argument()?).context(line)?);
                }
                Keyword::DirSigningKey => {
                    builder.dir_signing_key(item.required_object()?.clone());
                }
                Keyword::DirKeyCrosscert => {
                    builder.dir_key_crosscert(item.required_object()?.clone());
                }
                Keyword::DirKeyCertification => {
                    builder.dir_key_certification(item.required_object()?.clone());
                }
                _ => {}
            }
        }

        meta.locate_sha1(SHA1_RANGE)?;
        builder.meta(meta);
        let cert = builder
            .build()
            .map_err(|e| DocumentParseError::Incomplete(Box::new(e)))?;
        if cert.dir_key_expires < cert.dir_key_published {
            return Err(GrammarViolation::CrossField {
                rule: "dir-key-expires must not be earlier than dir-key-published",
            }
            .into());
        }
        Ok(cert)
    }
}
