// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Value Objects with Validation Invariants

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Network validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid IPv4 address format: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Invalid prefix length: {0} (must be 0-32)")]
    InvalidPrefixLength(u8),

    #[error("Host bits set in network address: {0}")]
    HostBitsSet(String),

    #[error("Subnet mask /{mask} cannot be carved from {parent}")]
    MaskTooWide { mask: u8, parent: String },

    #[error("Address space {0} exhausted")]
    Exhausted(String),
}

/// IPv4 network in CIDR notation
///
/// Invariants:
/// - Valid IPv4 address
/// - Prefix length 0-32
/// - No host bits set (`10.10.0.0/16`, never `10.10.1.0/16`)
///
/// # Examples
///
/// ```rust
/// use swift_infrastructure::domain::Ipv4Cidr;
///
/// let vpc = Ipv4Cidr::new("10.10.0.0/16").unwrap();
/// assert_eq!(vpc.prefix_length(), 16);
/// assert!(vpc.contains("10.10.3.7".parse().unwrap()));
/// assert!(Ipv4Cidr::new("10.10.1.0/16").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix_length: u8,
}

impl Ipv4Cidr {
    /// The whole IPv4 space, used by allow-all NACL entries
    pub const ANY: Ipv4Cidr = Ipv4Cidr {
        network: Ipv4Addr::UNSPECIFIED,
        prefix_length: 0,
    };

    /// Parse `a.b.c.d/n`
    ///
    /// # Invariants
    /// - Prefix length is mandatory
    /// - Host bits must be clear
    pub fn new(cidr: impl AsRef<str>) -> Result<Self, NetworkError> {
        let cidr = cidr.as_ref().trim();

        let (addr_str, prefix_str) = cidr
            .split_once('/')
            .ok_or_else(|| NetworkError::InvalidCidr(cidr.to_string()))?;

        let address = Ipv4Addr::from_str(addr_str)
            .map_err(|_| NetworkError::InvalidIpAddress(addr_str.to_string()))?;

        let prefix_length = prefix_str
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidCidr(cidr.to_string()))?;

        Self::from_parts(address, prefix_length)
    }

    /// Create from separate address and prefix
    pub fn from_parts(network: Ipv4Addr, prefix_length: u8) -> Result<Self, NetworkError> {
        if prefix_length > 32 {
            return Err(NetworkError::InvalidPrefixLength(prefix_length));
        }

        if u32::from(network) & !Self::mask_bits(prefix_length) != 0 {
            return Err(NetworkError::HostBitsSet(format!(
                "{}/{}",
                network, prefix_length
            )));
        }

        Ok(Self {
            network,
            prefix_length,
        })
    }

    /// Build a network whose host bits are known to be clear
    pub(crate) const fn aligned(network: Ipv4Addr, prefix_length: u8) -> Self {
        Self {
            network,
            prefix_length,
        }
    }

    /// Single-host network (`/32`)
    pub fn host(address: Ipv4Addr) -> Self {
        Self {
            network: address,
            prefix_length: 32,
        }
    }

    fn mask_bits(prefix_length: u8) -> u32 {
        if prefix_length == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix_length))
        }
    }

    /// Network address
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Prefix length
    pub fn prefix_length(&self) -> u8 {
        self.prefix_length
    }

    /// Number of addresses covered
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_length))
    }

    fn first(&self) -> u64 {
        u64::from(u32::from(self.network))
    }

    fn end(&self) -> u64 {
        self.first() + self.size()
    }

    /// Check whether an address lies inside this network
    pub fn contains(&self, address: Ipv4Addr) -> bool {
        let address = u64::from(u32::from(address));
        address >= self.first() && address < self.end()
    }

    /// Check whether another network lies entirely inside this one
    pub fn contains_cidr(&self, other: &Ipv4Cidr) -> bool {
        other.first() >= self.first() && other.end() <= self.end()
    }

    /// Check whether two networks share any address
    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.first() < other.end() && other.first() < self.end()
    }

    /// Get as CIDR notation string
    pub fn as_cidr(&self) -> String {
        format!("{}/{}", self.network, self.prefix_length)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_cidr())
    }
}

impl FromStr for Ipv4Cidr {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = NetworkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Ipv4Cidr> for String {
    fn from(cidr: Ipv4Cidr) -> Self {
        cidr.as_cidr()
    }
}

/// Sequential subnet allocator over a parent network
///
/// Blocks are handed out in request order, each aligned to its own size,
/// so a `/24` after a `/26` skips to the next `/24` boundary.
#[derive(Debug, Clone)]
pub struct CidrAllocator {
    parent: Ipv4Cidr,
    cursor: u64,
}

impl CidrAllocator {
    pub fn new(parent: Ipv4Cidr) -> Self {
        Self {
            parent,
            cursor: parent.first(),
        }
    }

    /// Allocate the next free block with the given mask
    pub fn allocate(&mut self, mask: u8) -> Result<Ipv4Cidr, NetworkError> {
        if mask > 32 {
            return Err(NetworkError::InvalidPrefixLength(mask));
        }
        if mask < self.parent.prefix_length {
            return Err(NetworkError::MaskTooWide {
                mask,
                parent: self.parent.as_cidr(),
            });
        }

        let size = 1u64 << (32 - u32::from(mask));
        let start = self.cursor.div_ceil(size) * size;
        let end = start + size;

        if end > self.parent.end() {
            return Err(NetworkError::Exhausted(self.parent.as_cidr()));
        }

        self.cursor = end;
        // start < 2^32 because end is bounded by the parent network
        Ipv4Cidr::from_parts(Ipv4Addr::from(start as u32), mask)
    }

    /// Addresses not yet handed out
    pub fn remaining(&self) -> u64 {
        self.parent.end().saturating_sub(self.cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cidr_parse() {
        let cidr = Ipv4Cidr::new("10.10.0.0/16").unwrap();
        assert_eq!(cidr.network(), Ipv4Addr::new(10, 10, 0, 0));
        assert_eq!(cidr.prefix_length(), 16);
        assert_eq!(cidr.size(), 65536);
        assert_eq!(cidr.as_cidr(), "10.10.0.0/16");
    }

    #[test]
    fn test_invalid_cidr() {
        assert!(Ipv4Cidr::new("10.10.0.0").is_err()); // no prefix
        assert!(Ipv4Cidr::new("999.10.0.0/16").is_err());
        assert!(Ipv4Cidr::new("10.10.0.0/33").is_err());
        assert_eq!(
            Ipv4Cidr::new("10.10.1.0/16"),
            Err(NetworkError::HostBitsSet("10.10.1.0/16".to_string()))
        );
    }

    #[test]
    fn test_host_cidr() {
        let hsm = Ipv4Cidr::new("10.20.1.10/32").unwrap();
        assert_eq!(hsm, Ipv4Cidr::host(Ipv4Addr::new(10, 20, 1, 10)));
        assert_eq!(hsm.size(), 1);
    }

    #[test]
    fn test_containment() {
        let vpc = Ipv4Cidr::new("10.10.0.0/16").unwrap();
        let subnet = Ipv4Cidr::new("10.10.4.0/24").unwrap();
        let outside = Ipv4Cidr::new("10.11.0.0/24").unwrap();

        assert!(vpc.contains_cidr(&subnet));
        assert!(!vpc.contains_cidr(&outside));
        assert!(vpc.overlaps(&subnet));
        assert!(!subnet.overlaps(&outside));
        assert!(Ipv4Cidr::ANY.contains(Ipv4Addr::new(149, 134, 1, 1)));
    }

    #[test]
    fn test_serde_as_string() {
        let cidr = Ipv4Cidr::new("149.134.0.0/16").unwrap();
        let json = serde_json::to_string(&cidr).unwrap();
        assert_eq!(json, "\"149.134.0.0/16\"");
        let back: Ipv4Cidr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cidr);
    }

    #[test]
    fn test_allocator_sequential() {
        let mut allocator = CidrAllocator::new(Ipv4Cidr::new("10.10.0.0/16").unwrap());
        assert_eq!(allocator.allocate(24).unwrap().as_cidr(), "10.10.0.0/24");
        assert_eq!(allocator.allocate(24).unwrap().as_cidr(), "10.10.1.0/24");
        assert_eq!(allocator.allocate(26).unwrap().as_cidr(), "10.10.2.0/26");
        // realigns to the next /24 boundary
        assert_eq!(allocator.allocate(24).unwrap().as_cidr(), "10.10.3.0/24");
    }

    #[test]
    fn test_allocator_exhaustion() {
        let mut allocator = CidrAllocator::new(Ipv4Cidr::new("10.0.0.0/23").unwrap());
        assert!(allocator.allocate(24).is_ok());
        assert!(allocator.allocate(24).is_ok());
        assert_eq!(allocator.remaining(), 0);
        assert_eq!(
            allocator.allocate(24),
            Err(NetworkError::Exhausted("10.0.0.0/23".to_string()))
        );
    }

    #[test]
    fn test_allocator_mask_too_wide() {
        let mut allocator = CidrAllocator::new(Ipv4Cidr::new("10.0.0.0/24").unwrap());
        assert!(matches!(
            allocator.allocate(16),
            Err(NetworkError::MaskTooWide { mask: 16, .. })
        ));
    }
}
