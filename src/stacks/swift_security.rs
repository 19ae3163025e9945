// Copyright (c) 2025 - Cowboy AI, Inc.
//! SWIFT rule set applied on top of the generic security registry

use tracing::info;

use super::network::{NetworkStack, SubnetSelection};
use super::security::{
    Direction, NaclEntry, Peer, Protocol, RuleSpec, SecurityGroupHandle, SecurityStack,
    ENDPOINT_SECURITY_GROUP,
};
use crate::config::SwiftSettings;
use crate::domain::{Ipv4Cidr, SwiftComponent};
use crate::errors::SynthResult;
use crate::lookup::CloudLookup;

/// Prefix list of the regional S3 service
pub const S3_PREFIX_LIST: &str = "com.amazonaws.*.s3";

pub const RDS_SECURITY_GROUP: &str = "RDSSG";
pub const MQ_SECURITY_GROUP: &str = "MQSG";

/// Address ranges the SWIFT rules open up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwiftSecurityConfig {
    pub swift_ip_range: Ipv4Cidr,
    pub hsm_ip: Ipv4Cidr,
    pub workstation_ip_range: Ipv4Cidr,
}

impl From<&SwiftSettings> for SwiftSecurityConfig {
    fn from(settings: &SwiftSettings) -> Self {
        Self {
            swift_ip_range: settings.swift_ip_range,
            hsm_ip: settings.hsm_ip,
            workstation_ip_range: settings.workstation_ip_range,
        }
    }
}

/// Declare the endpoint security group every workload is wired to
pub fn create_endpoint_security_group(
    security: &mut SecurityStack,
) -> SynthResult<SecurityGroupHandle> {
    security.create_security_group(ENDPOINT_SECURITY_GROUP, None)
}

/// Apply the SWIFT connectivity rules
///
/// Runs once every consumer group exists: the gateway, handler, database
/// and broker groups are all required. The S3 prefix list is resolved
/// first, so a failed lookup leaves the registry untouched.
pub fn enforce_security_group_rules(
    security: &mut SecurityStack,
    config: &SwiftSecurityConfig,
    lookup: &dyn CloudLookup,
) -> SynthResult<()> {
    let sagsnl = SwiftComponent::Sagsnl.security_group_name();
    let amh = SwiftComponent::Amh.security_group_name();
    for group in [sagsnl.as_str(), amh.as_str(), RDS_SECURITY_GROUP, MQ_SECURITY_GROUP] {
        security.require_security_group(group)?;
    }

    let s3_prefix_list = lookup.prefix_list_id(S3_PREFIX_LIST)?;
    info!("Enforcing SWIFT rules with S3 prefix list {}", s3_prefix_list);

    // Gateway
    security.connect_with(
        &amh,
        &sagsnl,
        Protocol::Tcp,
        (48002, 48003),
        "AMH to SAGSNL connection",
        "Incoming connection from AMH",
    )?;
    security.add_rule(
        &sagsnl,
        RuleSpec::ingress(Protocol::Tcp, 2443, 2443)
            .peer(Peer::Cidr(config.workstation_ip_range))
            .description("SWP Web GUI Interface Ingress from workstation"),
    )?;
    security.add_rule(
        &sagsnl,
        RuleSpec::egress(Protocol::Tcp, 443, 443)
            .peer(Peer::PrefixList(s3_prefix_list.clone()))
            .description("Egress to S3 VPC Gateway Endpoint"),
    )?;
    security.add_rule(
        &sagsnl,
        RuleSpec::egress(Protocol::All, 0, 65535)
            .peer(Peer::Cidr(config.swift_ip_range))
            .description("To SWIFT via VGW and VPN"),
    )?;
    for (port, description) in [
        (1792, "To HSM via VGW"),
        (22, "To HSM (SSH) via VGW"),
        (48321, "TO HSM (Remote PED) via VGW"),
    ] {
        security.add_rule(
            &sagsnl,
            RuleSpec::egress(Protocol::Tcp, port, port)
                .peer(Peer::Cidr(config.hsm_ip))
                .description(description),
        )?;
    }

    // Handler
    security.connect(
        &amh,
        RDS_SECURITY_GROUP,
        Protocol::Tcp,
        (1521, 1521),
        "AMH - RDS (1521)",
    )?;
    security.connect(
        &amh,
        MQ_SECURITY_GROUP,
        Protocol::Tcp,
        (61617, 61617),
        "AMH - MQ (61617)",
    )?;
    security.add_rule(
        &amh,
        RuleSpec::egress(Protocol::Tcp, 443, 443)
            .peer(Peer::PrefixList(s3_prefix_list))
            .description("AMH Egress to S3"),
    )?;
    security.add_rule(
        &amh,
        RuleSpec::ingress(Protocol::Tcp, 8443, 8443).peer(Peer::Cidr(config.workstation_ip_range)),
    )?;

    // Broker console
    security.add_rule(
        MQ_SECURITY_GROUP,
        RuleSpec::ingress(Protocol::Tcp, 8162, 8162).peer(Peer::Cidr(config.workstation_ip_range)),
    )?;

    Ok(())
}

/// NACLs over the gateway and handler subnets, open in both directions
pub fn create_nacls(security: &mut SecurityStack, network: &NetworkStack) -> SynthResult<()> {
    for (component, description) in [
        (SwiftComponent::Sagsnl, "NACL for SAGSNL Subnet"),
        (SwiftComponent::Amh, "NACL For AMMH Subnet"),
    ] {
        let name = component.nacl_name();
        let subnets = network.select_subnets(&SubnetSelection::group(component.as_str()))?;
        security.create_nacl(&name, description, &subnets)?;

        security.add_nacl_entry(
            &name,
            NaclEntry::allow_all(format!("{name}Entry1"), 100, Direction::Egress),
        )?;
        security.add_nacl_entry(
            &name,
            NaclEntry::allow_all(format!("{name}Entry2"), 100, Direction::Ingress),
        )?;
    }
    info!("Created SWIFT NACLs");
    Ok(())
}
