// Copyright (c) 2025 - Cowboy AI, Inc.
//! Topology Builders
//!
//! One builder per nested stack. Generic builders ([`network`],
//! [`security`], [`host_group`]) know nothing about SWIFT; the SWIFT
//! specifics live in [`swift_security`], [`workloads`] and the assembly
//! sequence in [`main_stack`].

pub mod broker;
pub mod database;
pub mod endpoints;
pub mod host_group;
pub mod key;
pub mod main_stack;
pub mod network;
pub mod operator_role;
pub mod security;
pub mod swift_security;
pub mod workloads;

pub use broker::BrokerStack;
pub use database::DatabaseStack;
pub use endpoints::EndpointsStack;
pub use host_group::{AmiSource, HostGroup, HostGroupDeps, HostGroupSpec};
pub use key::KeyStack;
pub use main_stack::{build_app, root_output_names, SwiftTopology};
pub use network::{NetworkStack, SelectedSubnets, Subnet, SubnetSelection, SubnetType};
pub use operator_role::OperatorRoleStack;
pub use security::{
    Direction, InstanceRole, NaclAction, NaclEntry, Peer, Protocol, Registration, RulePeer,
    RuleSpec, SecurityGroupHandle, SecurityRule, SecurityStack, ENDPOINT_SECURITY_GROUP,
};

use crate::template::{Expr, Properties};

/// Nested stack names, as deployed
pub const KEY_STACK: &str = "SwiftConnectivityCMK";
pub const NETWORK_STACK: &str = "SwiftConnectivityVPC";
pub const SECURITY_STACK: &str = "SwiftConnectivitySecurity";
pub const DATABASE_STACK: &str = "Database";
pub const BROKER_STACK: &str = "MQMessageBroker";
pub const ENDPOINTS_STACK: &str = "VPCEndPointStack";
pub const OPERATOR_ROLE_STACK: &str = "IAMRole";

/// `{"Key": key, "Value": value}`
pub(crate) fn tag(key: &str, value: impl Into<Expr>) -> Expr {
    Properties::new().set("Key", key).set("Value", value).into()
}

/// Tag list holding only a `Name` tag
pub(crate) fn name_tags(name: &str) -> Expr {
    Expr::list([tag("Name", name)])
}

/// `arn:aws:s3:::<bucket>/*` for a region-suffixed bucket name
pub(crate) fn bucket_objects_arn(parts: impl IntoIterator<Item = Expr>) -> Expr {
    let mut arn = vec![Expr::str("arn:aws:s3:::")];
    arn.extend(parts);
    arn.push(Expr::str("/*"));
    Expr::concat(arn)
}
