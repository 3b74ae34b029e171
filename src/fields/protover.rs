//! Sub-protocol version lists, as in `proto`, `pr` and the
//! `*-protocols` lines of network status documents.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use nom::branch::alt;
use nom::character::complete::{char, digit1};
use nom::combinator::{all_consuming, map, map_res};
use nom::multi::separated_list0;
use nom::sequence::separated_pair;
use nom::{Finish, IResult};

use crate::error::FieldError;

/// A set of supported versions of one sub-protocol.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SupportedProtocolVersion {
    versions: Vec<u8>,
}

impl SupportedProtocolVersion {
    pub fn supports(&self, v: u8) -> bool {
        self.versions.binary_search(&v).is_ok()
    }

    pub fn versions(&self) -> &[u8] {
        &self.versions
    }
}

impl fmt::Display for SupportedProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut last_version = None;
        let mut range_end = None;
        for v in self.versions.iter().copied() {
            match last_version {
                Some(last) if v == last + 1 => {
                    if range_end.is_none() {
                        write!(f, "-")?;
                    }
                    range_end = Some(v);
                }
                Some(_) => {
                    if let Some(x) = range_end.take() {
                        write!(f, "{}", x)?;
                    }
                    write!(f, ",{}", v)?;
                }
                None => write!(f, "{}", v)?,
            }
            last_version = Some(v);
        }
        if let Some(x) = range_end.take() {
            write!(f, "{}", x)?;
        }
        Ok(())
    }
}

fn version(i: &str) -> IResult<&str, u8> {
    map_res(digit1, u8::from_str)(i)
}

/// `3` or `2-5`
fn component(i: &str) -> IResult<&str, (u8, u8)> {
    alt((
        separated_pair(version, char('-'), version),
        map(version, |v| (v, v)),
    ))(i)
}

impl FromStr for SupportedProtocolVersion {
    type Err = FieldError;

    /// Parse from "3", "2-5" or "1-2,4".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (_, components) = all_consuming(separated_list0(char(','), component))(s)
            .finish()
            .map_err(|_: nom::error::Error<&str>| FieldError::InvalidProtocolVersion(s.to_string()))?;
        let mut versions = Vec::new();
        for (min, max) in components {
            if min > max {
                return Err(FieldError::InvalidProtocolVersion(s.to_string()));
            }
            versions.extend(min..=max);
        }
        versions.sort_unstable();
        versions.dedup();
        Ok(SupportedProtocolVersion { versions })
    }
}

/// Sub-protocol name to supported versions, e.g. from `Link=1-5 Relay=1-2`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Protocols(BTreeMap<String, SupportedProtocolVersion>);

impl Protocols {
    pub fn get(&self, protocol: &str) -> Option<&SupportedProtocolVersion> {
        self.0.get(protocol)
    }

    pub fn supports(&self, protocol: &str, version: u8) -> bool {
        self.get(protocol).map_or(false, |v| v.supports(version))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SupportedProtocolVersion)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_args(args: &[&str]) -> Result<Protocols, FieldError> {
        let mut protocols = BTreeMap::new();
        for arg in args {
            let (name, versions) = arg
                .split_once('=')
                .ok_or_else(|| FieldError::InvalidProtocolVersion(arg.to_string()))?;
            if name.is_empty() {
                return Err(FieldError::InvalidProtocolVersion(arg.to_string()));
            }
            protocols.insert(name.to_string(), versions.parse()?);
        }
        Ok(Protocols(protocols))
    }
}

impl FromStr for Protocols {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Protocols::from_args(&s.split_whitespace().collect::<Vec<_>>())
    }
}

impl fmt::Display for Protocols {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for (name, versions) in self.iter() {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{}={}", name, versions)?;
        }
        Ok(())
    }
}
