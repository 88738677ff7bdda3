//! Address ranges in CIDR notation.

use serde::{Serialize, Serializer};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use thiserror::Error;

/// An IPv4 or IPv6 network, stored with host bits cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cidr {
    V4 { network: Ipv4Addr, prefix: u8 },
    V6 { network: Ipv6Addr, prefix: u8 },
}

/// Why a CIDR string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid CIDR '{0}'")]
pub struct CidrParseError(pub String);

impl Cidr {
    pub fn contains(&self, addr: &IpAddr) -> bool {
        match (self, addr) {
            (Cidr::V4 { network, prefix }, IpAddr::V4(ip)) => {
                let mask = mask_v4(*prefix);
                (u32::from(*network) & mask) == (u32::from(*ip) & mask)
            }
            (Cidr::V6 { network, prefix }, IpAddr::V6(ip)) => {
                let mask = mask_v6(*prefix);
                (u128::from(*network) & mask) == (u128::from(*ip) & mask)
            }
            _ => false,
        }
    }

    pub fn prefix_len(&self) -> u8 {
        match self {
            Cidr::V4 { prefix, .. } | Cidr::V6 { prefix, .. } => *prefix,
        }
    }
}

impl FromStr for Cidr {
    type Err = CidrParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let err = || CidrParseError(input.to_string());

        let (addr, prefix) = input.trim().split_once('/').ok_or_else(err)?;
        let ip: IpAddr = addr.parse().map_err(|_| err())?;
        let prefix: u8 = prefix.parse().map_err(|_| err())?;

        match ip {
            IpAddr::V4(v4) => {
                if prefix > 32 {
                    return Err(err());
                }
                let network = Ipv4Addr::from(u32::from(v4) & mask_v4(prefix));
                Ok(Cidr::V4 { network, prefix })
            }
            IpAddr::V6(v6) => {
                if prefix > 128 {
                    return Err(err());
                }
                let network = Ipv6Addr::from(u128::from(v6) & mask_v6(prefix));
                Ok(Cidr::V6 { network, prefix })
            }
        }
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cidr::V4 { network, prefix } => write!(f, "{}/{}", network, prefix),
            Cidr::V6 { network, prefix } => write!(f, "{}/{}", network, prefix),
        }
    }
}

impl Serialize for Cidr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn mask_v4(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    }
}

fn mask_v6(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - prefix)
    }
}

/// Loopback, RFC 1918 private ranges, and IPv6 unique-local addresses.
pub fn is_private_or_loopback(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private(),
        IpAddr::V6(v6) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}
