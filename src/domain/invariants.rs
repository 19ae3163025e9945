// Copyright (c) 2025 - Cowboy AI, Inc.
//! Pure Validation Functions - Topology Invariants
//!
//! Business rules checked while the topology is declared. All functions
//! are pure and return detailed validation failures.

use std::net::Ipv4Addr;

use super::Ipv4Cidr;

/// Validation result with detailed error information
pub type ValidationResult = Result<(), ValidationError>;

/// Validation error with context
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid port range {from}-{to}")]
    InvalidPortRange { from: u16, to: u16 },

    #[error("NACL rule number {0} outside 1-32766")]
    InvalidRuleNumber(u16),

    #[error("Availability zone count must be at least 1")]
    InvalidAzCount,

    #[error("Invalid subnet group name: {0:?}")]
    InvalidGroupName(String),

    #[error("Private IP {ip} is outside subnet {subnet}")]
    IpOutsideSubnet { ip: Ipv4Addr, subnet: Ipv4Cidr },

    #[error("Private IP {ip} is reserved in subnet {subnet}")]
    ReservedAddress { ip: Ipv4Addr, subnet: Ipv4Cidr },
}

/// Validate a port range
///
/// # Rules
/// - `from` must not exceed `to`
pub fn validate_port_range(from: u16, to: u16) -> ValidationResult {
    if from > to {
        return Err(ValidationError::InvalidPortRange { from, to });
    }
    Ok(())
}

/// Validate a NACL rule number
///
/// # Rules
/// - 1 to 32766 inclusive (32767 is the implicit deny rule)
pub fn validate_nacl_rule_number(rule_number: u16) -> ValidationResult {
    if rule_number == 0 || rule_number > 32766 {
        return Err(ValidationError::InvalidRuleNumber(rule_number));
    }
    Ok(())
}

/// Validate the number of availability zones
pub fn validate_az_count(count: usize) -> ValidationResult {
    if count == 0 {
        return Err(ValidationError::InvalidAzCount);
    }
    Ok(())
}

/// Validate a subnet group name
///
/// # Rules
/// - Non-empty
/// - ASCII alphanumeric, since it is embedded in logical IDs
pub fn validate_group_name(name: &str) -> ValidationResult {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidGroupName(name.to_string()));
    }
    Ok(())
}

/// Validate a static private IP against the subnet it is placed in
///
/// # Rules
/// - Must lie inside the subnet
/// - Must not be one of the five addresses AWS reserves per subnet
///   (network, router, DNS, future use, broadcast)
pub fn validate_private_ip(ip: Ipv4Addr, subnet: &Ipv4Cidr) -> ValidationResult {
    if !subnet.contains(ip) {
        return Err(ValidationError::IpOutsideSubnet {
            ip,
            subnet: *subnet,
        });
    }

    let offset = u64::from(u32::from(ip)) - u64::from(u32::from(subnet.network()));
    if offset < 4 || offset == subnet.size() - 1 {
        return Err(ValidationError::ReservedAddress {
            ip,
            subnet: *subnet,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_port_range() {
        assert!(validate_port_range(48002, 48003).is_ok());
        assert!(validate_port_range(443, 443).is_ok());
        assert_eq!(
            validate_port_range(443, 80),
            Err(ValidationError::InvalidPortRange { from: 443, to: 80 })
        );
    }

    #[test_case(0 => false ; "zero")]
    #[test_case(1 => true ; "first")]
    #[test_case(100 => true ; "typical")]
    #[test_case(32766 => true ; "last")]
    #[test_case(32767 => false ; "implicit deny")]
    fn test_rule_number(rule_number: u16) -> bool {
        validate_nacl_rule_number(rule_number).is_ok()
    }

    #[test_case("SAGSNL" => true)]
    #[test_case("Database" => true)]
    #[test_case("" => false ; "empty")]
    #[test_case("My Group" => false ; "space")]
    fn test_group_name(name: &str) -> bool {
        validate_group_name(name).is_ok()
    }

    #[test_case("10.10.0.10" => true ; "usable")]
    #[test_case("10.10.0.0" => false ; "network address")]
    #[test_case("10.10.0.3" => false ; "reserved")]
    #[test_case("10.10.0.255" => false ; "broadcast")]
    #[test_case("10.10.1.10" => false ; "outside")]
    fn test_private_ip(ip: &str) -> bool {
        let subnet = Ipv4Cidr::new("10.10.0.0/24").unwrap();
        validate_private_ip(ip.parse().unwrap(), &subnet).is_ok()
    }
}
