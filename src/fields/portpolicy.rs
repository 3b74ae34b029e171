//! Port-summary policies: `p`, `p6` and `ipv6-policy` lines.

use std::fmt;
use std::str::FromStr;

use crate::error::FieldError;

/// Whether a policy (or rule) accepts or rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPolicyType {
    Accept,
    Reject,
}

impl FromStr for ExitPolicyType {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accept" => Ok(ExitPolicyType::Accept),
            "reject" => Ok(ExitPolicyType::Reject),
            _ => Err(FieldError::InvalidPortPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for ExitPolicyType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ExitPolicyType::Accept => "accept",
            ExitPolicyType::Reject => "reject",
        })
    }
}

/// A single port or an inclusive range of ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRange {
    Single(u16),
    Interval(u16, u16),
}

impl PortRange {
    pub fn contains(&self, port: u16) -> bool {
        match *self {
            PortRange::Single(x) => x == port,
            PortRange::Interval(min, max) => min <= port && port <= max,
        }
    }

    pub fn iter_ports(&self) -> impl Iterator<Item = u16> {
        match *self {
            PortRange::Single(x) => x..=x,
            PortRange::Interval(min, max) => min..=max,
        }
    }
}

impl FromStr for PortRange {
    type Err = FieldError;

    /// Parse from "3" or "2-5".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FieldError::InvalidPortPolicy(s.to_string());
        match s.split_once('-') {
            Some((min, max)) => {
                let min = min.parse::<u16>().map_err(|_| invalid())?;
                let max = max.parse::<u16>().map_err(|_| invalid())?;
                if min > max {
                    return Err(invalid());
                }
                Ok(PortRange::Interval(min, max))
            }
            None => Ok(PortRange::Single(s.parse::<u16>().map_err(|_| invalid())?)),
        }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PortRange::Single(x) => write!(f, "{}", x),
            PortRange::Interval(x, y) => write!(f, "{}-{}", x, y),
        }
    }
}

/// A relay's condensed exit policy: the ports it allows or refuses for
/// "most" target addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortPolicy {
    pub policy_type: ExitPolicyType,
    pub entries: Vec<PortRange>,
}

impl PortPolicy {
    /// The policy implied by a missing `ipv6-policy` or `p6` line.
    pub fn reject_all() -> Self {
        PortPolicy {
            policy_type: ExitPolicyType::Reject,
            entries: vec![PortRange::Interval(1, 65535)],
        }
    }

    pub fn allows_port(&self, port: u16) -> bool {
        let listed = self.entries.iter().any(|e| e.contains(port));
        match self.policy_type {
            ExitPolicyType::Accept => listed,
            ExitPolicyType::Reject => !listed,
        }
    }

    /// Parse from the two arguments `accept|reject` and the port list.
    pub fn from_args(args: &[&str]) -> Result<Self, FieldError> {
        match args {
            [cmd, ports] => Ok(PortPolicy {
                policy_type: cmd.parse()?,
                entries: ports
                    .split(',')
                    .map(str::parse)
                    .collect::<Result<Vec<_>, _>>()?,
            }),
            _ => Err(FieldError::InvalidPortPolicy(args.join(" "))),
        }
    }
}

impl Default for PortPolicy {
    fn default() -> Self {
        PortPolicy::reject_all()
    }
}

impl FromStr for PortPolicy {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PortPolicy::from_args(&s.split_whitespace().collect::<Vec<_>>())
    }
}

impl fmt::Display for PortPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.policy_type,
            self.entries
                .iter()
                .map(|x| x.to_string())
                .collect::<Vec<_>>()
                .join(",")
        )
    }
}
