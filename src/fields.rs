//! Parsers for the individual values found in Tor documents.
//!
//! All parsers are pure and return a [`FieldError`] describing the
//! offending token; the caller attaches the line via
//! [`ErrorContext`](crate::error::ErrorContext).

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::FieldError;

pub mod ed25519;
pub mod portpolicy;
pub mod protover;

pub use ed25519::Ed25519Certificate;
pub use portpolicy::{ExitPolicyType, PortPolicy, PortRange};
pub use protover::{Protocols, SupportedProtocolVersion};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

lazy_static! {
    static ref NICKNAME: Regex = Regex::new("^[A-Za-z0-9]{1,19}$").expect("valid regex");
}

/// A relay fingerprint: the SHA-1 digest of an identity key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint {
    blob: [u8; 20],
}

impl Fingerprint {
    pub fn from_u8(raw: [u8; 20]) -> Fingerprint {
        Fingerprint { blob: raw }
    }

    pub fn from_slice(raw: &[u8]) -> Result<Fingerprint, FieldError> {
        let blob = raw.try_into().map_err(|_| FieldError::InvalidHex {
            raw: hex::encode_upper(raw),
            expected_len: 40,
        })?;
        Ok(Fingerprint { blob })
    }

    /// Parse 40 hex characters, optionally in space-separated groups.
    pub fn from_str_hex(raw_hex: &str) -> Result<Fingerprint, FieldError> {
        let compact: String = raw_hex.chars().filter(|c| *c != ' ').collect();
        let invalid = || FieldError::InvalidHex {
            raw: raw_hex.to_string(),
            expected_len: 40,
        };
        if compact.len() != 40 {
            return Err(invalid());
        }
        let mut blob = [0u8; 20];
        hex::decode_to_slice(&compact, &mut blob).map_err(|_| invalid())?;
        Ok(Fingerprint { blob })
    }

    /// Parse 27 characters of unpadded base64, as in status entries.
    pub fn from_str_b64(raw_b64: &str) -> Result<Fingerprint, FieldError> {
        let bytes = parse_base64(raw_b64, 20)?;
        Fingerprint::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.blob
    }

    pub fn to_string_b64(&self) -> String {
        base64::encode_config(self.blob, base64::STANDARD_NO_PAD)
    }

    pub fn to_string_hex(&self) -> String {
        format!("{}", self)
    }

    /// Hex in groups of four, as in the `fingerprint` line.
    pub fn to_string_hex_blocks(&self) -> String {
        self.blob
            .chunks(2)
            .map(hex::encode_upper)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for byte in &self.blob {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

impl FromStr for Fingerprint {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Fingerprint::from_str_hex(s.trim_start_matches('$'))
    }
}

pub fn parse_nickname(s: &str) -> Result<String, FieldError> {
    if NICKNAME.is_match(s) {
        Ok(s.to_string())
    } else {
        Err(FieldError::InvalidNickname(s.to_string()))
    }
}

pub fn parse_ipv4(s: &str) -> Result<Ipv4Addr, FieldError> {
    Ipv4Addr::from_str(s).map_err(|_| FieldError::InvalidIpv4(s.to_string()))
}

/// Parse an IPv4 address or an IPv6 address with or without brackets.
pub fn parse_ip(s: &str) -> Result<IpAddr, FieldError> {
    let invalid = || FieldError::InvalidIpAddress(s.to_string());
    match s.strip_prefix('[') {
        Some(inner) => {
            let inner = inner.strip_suffix(']').ok_or_else(invalid)?;
            Ipv6Addr::from_str(inner).map(IpAddr::V6).map_err(|_| invalid())
        }
        None => IpAddr::from_str(s).map_err(|_| invalid()),
    }
}

/// Parse `address:port`, where an IPv6 address is in brackets.
pub fn parse_socket(s: &str) -> Result<(IpAddr, u16), FieldError> {
    let (ip, port) = s
        .rsplit_once(':')
        .ok_or_else(|| FieldError::InvalidIpAddress(s.to_string()))?;
    Ok((parse_ip(ip)?, parse_port(port)?))
}

pub fn parse_port(s: &str) -> Result<u16, FieldError> {
    s.parse::<u16>()
        .map_err(|_| FieldError::InvalidPort(s.to_string()))
}

/// A port where `0` means "none".
pub fn parse_optional_port(s: &str) -> Result<Option<u16>, FieldError> {
    Ok(match parse_port(s)? {
        0 => None,
        port => Some(port),
    })
}

pub fn parse_int<T: FromStr>(s: &str) -> Result<T, FieldError> {
    s.parse::<T>()
        .map_err(|_| FieldError::InvalidInt(s.to_string()))
}

/// Parse a decimal number, allowing a trailing `%`.
pub fn parse_decimal(s: &str) -> Result<f64, FieldError> {
    s.trim_end_matches('%')
        .parse::<f64>()
        .map_err(|_| FieldError::InvalidDecimal(s.to_string()))
}

/// Validate `len` hex characters and return them in upper case.
pub fn parse_hex(s: &str, len: usize) -> Result<String, FieldError> {
    if s.len() != len || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(FieldError::InvalidHex {
            raw: s.to_string(),
            expected_len: len,
        });
    }
    Ok(s.to_ascii_uppercase())
}

/// Decode unpadded base64 that must encode exactly `len` bytes.
pub fn parse_base64(s: &str, len: usize) -> Result<Vec<u8>, FieldError> {
    let invalid = || FieldError::InvalidBase64 {
        raw: s.to_string(),
        expected_len: len,
    };
    let bytes =
        base64::decode_config(s.trim_end_matches('='), base64::STANDARD_NO_PAD).map_err(|_| invalid())?;
    if bytes.len() != len {
        return Err(invalid());
    }
    Ok(bytes)
}

/// Base64 of a 20-byte value, converted to 40 upper-case hex characters.
pub fn parse_base64_as_hex(s: &str) -> Result<String, FieldError> {
    Ok(hex::encode_upper(parse_base64(s, 20)?))
}

/// Parse `YYYY-MM-DD HH:MM:SS`.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, FieldError> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .map_err(|_| FieldError::InvalidDate(s.to_string()))?;
    Ok(Utc.from_utc_datetime(&naive))
}

/// Parse a timestamp split into date and time arguments.
pub fn parse_timestamp_parts(date: &str, time: &str) -> Result<DateTime<Utc>, FieldError> {
    parse_timestamp(&format!("{date} {time}"))
}

/// Parse `(NSEC s)` into seconds, given the two tokens `(NSEC` and `s)`.
pub fn parse_interval(open: &str, close: &str) -> Result<u64, FieldError> {
    let invalid = || FieldError::InvalidInterval(format!("{open} {close}"));
    if close != "s)" {
        return Err(invalid());
    }
    let secs = open.strip_prefix('(').ok_or_else(invalid)?;
    let secs: u64 = secs.parse().map_err(|_| invalid())?;
    if secs == 0 {
        return Err(invalid());
    }
    Ok(secs)
}

/// The end of a statistics interval and its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsEnd {
    pub end: DateTime<Utc>,
    pub interval_secs: u64,
}

impl StatsEnd {
    /// Parse `YYYY-MM-DD HH:MM:SS (NSEC s)` from the leading arguments.
    pub fn from_args(args: &[&str]) -> Result<StatsEnd, FieldError> {
        match args {
            [date, time, open, close, ..] => Ok(StatsEnd {
                end: parse_timestamp_parts(date, time)?,
                interval_secs: parse_interval(open, close)?,
            }),
            _ => Err(FieldError::ArgumentsMissing { expected: 4 }),
        }
    }
}

/// A bandwidth history: values for consecutive intervals ending at `end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandwidthHistory {
    pub end: DateTime<Utc>,
    pub interval_secs: u64,
    pub values: Vec<i64>,
}

impl BandwidthHistory {
    pub fn from_args(args: &[&str]) -> Result<BandwidthHistory, FieldError> {
        let stats = StatsEnd::from_args(args)?;
        let values = match args.get(4) {
            Some(list) => list
                .split(',')
                .filter(|v| !v.is_empty())
                .map(parse_int::<i64>)
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };
        if args.len() > 5 {
            return Err(FieldError::UnexpectedArguments(args[5..].join(" ")));
        }
        Ok(BandwidthHistory {
            end: stats.end,
            interval_secs: stats.interval_secs,
            values,
        })
    }

    /// The end time of each value, oldest first.
    pub fn intervals(&self) -> impl Iterator<Item = (DateTime<Utc>, i64)> + '_ {
        let n = self.values.len() as i64;
        self.values.iter().enumerate().map(move |(i, v)| {
            let back = (n - 1 - i as i64) * self.interval_secs as i64;
            (self.end - chrono::Duration::seconds(back), *v)
        })
    }
}

/// Parse a comma-separated `key=value` list with integer values.
pub fn parse_int_map(s: &str) -> Result<BTreeMap<String, i64>, FieldError> {
    parse_map(s, |v| v.parse::<i64>().ok())
}

/// Parse a comma-separated `key=value` list with decimal values.
pub fn parse_decimal_map(s: &str) -> Result<BTreeMap<String, f64>, FieldError> {
    parse_map(s, |v| v.trim_end_matches('%').parse::<f64>().ok())
}

fn parse_map<T>(s: &str, value: impl Fn(&str) -> Option<T>) -> Result<BTreeMap<String, T>, FieldError> {
    let mut map = BTreeMap::new();
    for pair in s.split(',').filter(|p| !p.is_empty()) {
        let (k, v) = pair
            .split_once('=')
            .ok_or_else(|| FieldError::InvalidArgumentDict(s.to_string()))?;
        let v = value(v).ok_or_else(|| FieldError::InvalidArgumentDict(s.to_string()))?;
        map.insert(k.to_string(), v);
    }
    Ok(map)
}

/// Parse space-separated `key=value` arguments with integer values, as in
/// `params` or `bandwidth-weights`.
pub fn parse_params(args: &[&str]) -> Result<BTreeMap<String, i64>, FieldError> {
    let mut map = BTreeMap::new();
    for arg in args {
        let (k, v) = arg
            .split_once('=')
            .ok_or_else(|| FieldError::InvalidArgumentDict(arg.to_string()))?;
        if k.is_empty() {
            return Err(FieldError::InvalidArgumentDict(arg.to_string()));
        }
        let v = v
            .parse::<i64>()
            .map_err(|_| FieldError::InvalidArgumentDict(arg.to_string()))?;
        map.insert(k.to_string(), v);
    }
    Ok(map)
}

/// Split a comma-separated list, skipping empty elements.
pub fn parse_comma_list(s: &str) -> Vec<String> {
    s.split(',')
        .filter(|x| !x.is_empty())
        .map(str::to_string)
        .collect()
}
