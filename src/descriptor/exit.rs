//! Submodule bundling all code for exit policy parsing in descriptors

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};

use crate::error::{ErrorContext, FieldError, DocumentParseError};
use crate::fields::{parse_ip, ExitPolicyType, PortRange};
use crate::meta::{Item, Keyword};

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum ExitPolicyAddress {
    /// `*`: any IPv4 or IPv6 address.
    Wildcard,
    /// `*4`
    WildcardV4,
    /// `*6`
    WildcardV6,
    Address(IpNet),
}

impl ExitPolicyAddress {
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match self {
            ExitPolicyAddress::Wildcard => true,
            ExitPolicyAddress::WildcardV4 => ip.is_ipv4(),
            ExitPolicyAddress::WildcardV6 => ip.is_ipv6(),
            ExitPolicyAddress::Address(net) => net.contains(ip),
        }
    }
}

impl fmt::Display for ExitPolicyAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExitPolicyAddress::Wildcard => write!(f, "*"),
            ExitPolicyAddress::WildcardV4 => write!(f, "*4"),
            ExitPolicyAddress::WildcardV6 => write!(f, "*6"),
            ExitPolicyAddress::Address(IpNet::V6(net)) => {
                write!(f, "[{}]/{}", net.addr(), net.prefix_len())
            }
            ExitPolicyAddress::Address(net) => write!(f, "{}", net),
        }
    }
}

impl FromStr for ExitPolicyAddress {
    type Err = FieldError;

    /// Parse `*`, `*4`, `*6`, an address, or a network given as prefix
    /// length or netmask. IPv6 addresses are in brackets.
    fn from_str(addr_str: &str) -> Result<Self, Self::Err> {
        let invalid = || FieldError::InvalidExitPolicyEntry(addr_str.to_string());
        match addr_str {
            "*" => return Ok(ExitPolicyAddress::Wildcard),
            "*4" => return Ok(ExitPolicyAddress::WildcardV4),
            "*6" => return Ok(ExitPolicyAddress::WildcardV6),
            _ => {}
        }
        let (addr, mask) = match addr_str.split_once('/') {
            Some((addr, mask)) => (addr, Some(mask)),
            None => (addr_str, None),
        };
        let network = match (parse_ip(addr).map_err(|_| invalid())?, mask) {
            (IpAddr::V4(ip), None) => IpNet::V4(Ipv4Net::new(ip, 32).map_err(|_| invalid())?),
            (IpAddr::V6(ip), None) => IpNet::V6(Ipv6Net::new(ip, 128).map_err(|_| invalid())?),
            (IpAddr::V4(ip), Some(mask)) => {
                let net = match mask.parse::<u8>() {
                    Ok(prefix) => Ipv4Net::new(ip, prefix),
                    Err(_) => Ipv4Net::with_netmask(
                        ip,
                        mask.parse::<Ipv4Addr>().map_err(|_| invalid())?,
                    ),
                };
                IpNet::V4(net.map_err(|_| invalid())?)
            }
            (IpAddr::V6(ip), Some(mask)) => {
                let prefix = mask.parse::<u8>().map_err(|_| invalid())?;
                IpNet::V6(Ipv6Net::new(ip, prefix).map_err(|_| invalid())?)
            }
        };
        Ok(ExitPolicyAddress::Address(network))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitPolicyPort {
    Wildcard,
    Port(PortRange),
}

impl ExitPolicyPort {
    pub fn contains(&self, port: u16) -> bool {
        match self {
            ExitPolicyPort::Wildcard => true,
            ExitPolicyPort::Port(range) => range.contains(port),
        }
    }
}

impl FromStr for ExitPolicyPort {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "*" => Ok(ExitPolicyPort::Wildcard),
            _ => Ok(ExitPolicyPort::Port(s.parse().map_err(|_| {
                FieldError::InvalidExitPolicyEntry(s.to_string())
            })?)),
        }
    }
}

impl fmt::Display for ExitPolicyPort {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExitPolicyPort::Wildcard => write!(f, "*"),
            ExitPolicyPort::Port(range) => write!(f, "{}", range),
        }
    }
}

/// One `accept` or `reject` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitPolicyRule {
    pub ep_type: ExitPolicyType,
    pub address: ExitPolicyAddress,
    pub port: ExitPolicyPort,
}

impl ExitPolicyRule {
    pub fn matches(&self, ip: &IpAddr, port: u16) -> bool {
        self.address.contains(ip) && self.port.contains(port)
    }

    /// Parse the `address:port` pattern of a rule.
    pub fn from_pattern(ep_type: ExitPolicyType, pattern: &str) -> Result<Self, FieldError> {
        let (address, port) = pattern
            .rsplit_once(':')
            .ok_or_else(|| FieldError::InvalidExitPolicyEntry(pattern.to_string()))?;
        Ok(ExitPolicyRule {
            ep_type,
            address: address.parse()?,
            port: port.parse()?,
        })
    }

    pub(super) fn from_item(item: &Item<'_>) -> Result<Self, DocumentParseError> {
        let ep_type = match item.keyword() {
            Keyword::Accept => ExitPolicyType::Accept,
            _ => ExitPolicyType::Reject,
        };
        let args = item.exact_args(1)?;
        ExitPolicyRule::from_pattern(ep_type, args[0]).context(item.line())
    }
}

impl fmt::Display for ExitPolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}:{}", self.ep_type, self.address, self.port)
    }
}

/// The full exit policy of a relay, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitPolicy {
    pub rules: Vec<ExitPolicyRule>,
}

impl ExitPolicy {
    pub(super) fn add_rule(&mut self, epr: ExitPolicyRule) {
        self.rules.push(epr);
    }

    /// Whether the first matching rule accepts. Without a match, Tor accepts.
    pub fn allows(&self, ip: &IpAddr, port: u16) -> bool {
        self.rules
            .iter()
            .find(|r| r.matches(ip, port))
            .map_or(true, |r| r.ep_type == ExitPolicyType::Accept)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The policy as descriptor lines.
    pub fn to_descriptor_lines(&self) -> Vec<String> {
        self.rules.iter().map(|r| r.to_string()).collect()
    }
}
