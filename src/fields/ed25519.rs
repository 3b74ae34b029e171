//! Ed25519 certificates as found in `identity-ed25519` blocks.

use chrono::{DateTime, TimeZone, Utc};
use nom::bytes::complete::take;
use nom::combinator::all_consuming;
use nom::multi::count;
use nom::number::complete::{be_u16, be_u32, be_u8};
use nom::{Finish, IResult};

use crate::error::FieldError;
use crate::meta::CryptoBlock;

/// Extension type carrying the key that signed the certificate.
const SIGNED_WITH_ED25519_KEY: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertExtension {
    pub ext_type: u8,
    pub flags: u8,
    pub data: Vec<u8>,
}

/// A decoded Ed25519 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ed25519Certificate {
    pub version: u8,
    pub cert_type: u8,
    /// Expiration, in hours since the epoch.
    pub expiration_hours: u32,
    pub key_type: u8,
    pub certified_key: [u8; 32],
    pub extensions: Vec<CertExtension>,
    pub signature: Vec<u8>,
}

fn extension(i: &[u8]) -> IResult<&[u8], CertExtension> {
    let (i, len) = be_u16(i)?;
    let (i, ext_type) = be_u8(i)?;
    let (i, flags) = be_u8(i)?;
    let (i, data) = take(len)(i)?;
    Ok((
        i,
        CertExtension {
            ext_type,
            flags,
            data: data.to_vec(),
        },
    ))
}

fn certificate(i: &[u8]) -> IResult<&[u8], Ed25519Certificate> {
    let (i, version) = be_u8(i)?;
    let (i, cert_type) = be_u8(i)?;
    let (i, expiration_hours) = be_u32(i)?;
    let (i, key_type) = be_u8(i)?;
    let (i, key) = take(32usize)(i)?;
    let (i, n_extensions) = be_u8(i)?;
    let (i, extensions) = count(extension, n_extensions as usize)(i)?;
    let (i, signature) = take(64usize)(i)?;
    let mut certified_key = [0u8; 32];
    certified_key.copy_from_slice(key);
    Ok((
        i,
        Ed25519Certificate {
            version,
            cert_type,
            expiration_hours,
            key_type,
            certified_key,
            extensions,
            signature: signature.to_vec(),
        },
    ))
}

impl Ed25519Certificate {
    pub fn from_bytes(bytes: &[u8]) -> Result<Ed25519Certificate, FieldError> {
        let (_, cert) = all_consuming(certificate)(bytes)
            .finish()
            .map_err(|e: nom::error::Error<&[u8]>| {
                FieldError::InvalidEd25519Certificate(format!("{:?}", e.code))
            })?;
        if cert.version != 1 {
            return Err(FieldError::InvalidEd25519Certificate(format!(
                "unknown version {}",
                cert.version
            )));
        }
        Ok(cert)
    }

    /// Decode the certificate in an `ED25519 CERT` block.
    pub fn from_block(block: &CryptoBlock) -> Result<Ed25519Certificate, FieldError> {
        if block.label() != "ED25519 CERT" {
            return Err(FieldError::InvalidEd25519Certificate(format!(
                "unexpected block '{}'",
                block.label()
            )));
        }
        Ed25519Certificate::from_bytes(&block.decode()?)
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(i64::from(self.expiration_hours) * 3600, 0)
            .single()
    }

    /// The key that signed this certificate, from its extensions.
    pub fn signing_key(&self) -> Option<&[u8]> {
        self.extensions
            .iter()
            .find(|e| e.ext_type == SIGNED_WITH_ED25519_KEY && e.data.len() == 32)
            .map(|e| e.data.as_slice())
    }

    /// The signing key as unpadded base64, as written in `master-key-ed25519`.
    pub fn master_key_base64(&self) -> Option<String> {
        self.signing_key()
            .map(|k| base64::encode_config(k, base64::STANDARD_NO_PAD))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a certificate with a signed-with-key extension.
    pub(crate) fn cert_bytes(master: [u8; 32]) -> Vec<u8> {
        let mut v = vec![1, 4];
        v.extend_from_slice(&0x0006_9db0u32.to_be_bytes());
        v.push(1);
        v.extend_from_slice(&[0xaa; 32]);
        v.push(1);
        v.extend_from_slice(&32u16.to_be_bytes());
        v.push(SIGNED_WITH_ED25519_KEY);
        v.push(0);
        v.extend_from_slice(&master);
        v.extend_from_slice(&[0x55; 64]);
        v
    }

    /// An `identity-ed25519` item certified by `master`.
    pub(crate) fn identity_block(master: [u8; 32]) -> String {
        let encoded = base64::encode(cert_bytes(master));
        let mut block = String::from("identity-ed25519\n-----BEGIN ED25519 CERT-----\n");
        for chunk in encoded.as_bytes().chunks(64) {
            block.push_str(std::str::from_utf8(chunk).unwrap());
            block.push('\n');
        }
        block.push_str("-----END ED25519 CERT-----\n");
        block
    }

    #[test]
    fn test_decode() {
        let cert = Ed25519Certificate::from_bytes(&cert_bytes([7; 32])).unwrap();
        assert_eq!(cert.cert_type, 4);
        assert_eq!(cert.certified_key, [0xaa; 32]);
        assert_eq!(cert.extensions.len(), 1);
        assert_eq!(cert.signing_key(), Some(&[7u8; 32][..]));
        assert_eq!(
            cert.master_key_base64().unwrap(),
            base64::encode_config([7u8; 32], base64::STANDARD_NO_PAD)
        );
        assert_eq!(cert.expires().unwrap().timestamp(), 0x0006_9db0i64 * 3600);
    }

    #[test]
    fn test_truncated_and_trailing() {
        let bytes = cert_bytes([7; 32]);
        assert!(Ed25519Certificate::from_bytes(&bytes[..bytes.len() - 1]).is_err());
        let mut longer = bytes.clone();
        longer.push(0);
        assert!(Ed25519Certificate::from_bytes(&longer).is_err());
        let mut v2 = bytes;
        v2[0] = 2;
        assert!(Ed25519Certificate::from_bytes(&v2).is_err());
    }
}
