// Copyright (c) 2025 - Cowboy AI, Inc.
//! Top-level Assembly
//!
//! Drives every builder in a fixed order and collects the resulting stacks
//! into an [`App`]. The sequence is strict: a step only runs once every
//! handle it consumes exists, and any error aborts the build.
//!
//! 1. workload key
//! 2. network (declare groups, then finalize)
//! 3. security shell with the endpoint security group
//! 4. operator key pair (root stack)
//! 5. gateway host groups, then handler host groups
//! 6. database, then message broker
//! 7. SWIFT security group rules, then NACLs
//! 8. VPC endpoints
//! 9. root outputs
//! 10. optional operator roles

use tracing::{debug, info};

use super::broker::BrokerStack;
use super::database::DatabaseStack;
use super::endpoints::{session_principal, EndpointsStack};
use super::host_group::{HostGroup, HostGroupDeps};
use super::key::KeyStack;
use super::network::{NetworkStack, SubnetSelection};
use super::operator_role::{OperatedResources, OperatorRoleStack};
use super::security::{SecurityStack, ENDPOINT_SECURITY_GROUP};
use super::swift_security::{
    create_endpoint_security_group, create_nacls, enforce_security_group_rules,
    SwiftSecurityConfig,
};
use super::workloads::{build_unit, UNIT_SIZE};
use super::{
    BROKER_STACK, DATABASE_STACK, ENDPOINTS_STACK, KEY_STACK, NETWORK_STACK, OPERATOR_ROLE_STACK,
    SECURITY_STACK,
};
use crate::config::{Environment, SwiftSettings};
use crate::domain::SwiftComponent;
use crate::errors::SynthResult;
use crate::lookup::CloudLookup;
use crate::template::{App, Expr, Properties, Resource, Stack};

pub const ROOT_DESCRIPTION: &str = "Quick Start for SWIFT Connectivity (qs-1rlbqnpbe)";
pub const KEY_PAIR: &str = "OperatorKeyPair2";
pub const VPC_OUTPUT: &str = "VPCID";

/// Subnet groups of the SWIFT VPC, all isolated
pub const SUBNET_GROUPS: [&str; 4] = ["SAGSNL", "AMH", "Database", "MQ"];

/// Root outputs every deployment declares
pub fn root_output_names() -> Vec<String> {
    SwiftComponent::WORKLOADS
        .iter()
        .flat_map(|component| {
            (1..=UNIT_SIZE).map(move |index| format!("{}InstanceID", component.unit_id(index)))
        })
        .chain(std::iter::once(VPC_OUTPUT.to_string()))
        .collect()
}

/// The assembled deployment
#[derive(Debug, Clone)]
pub struct SwiftTopology {
    pub app: App,
    /// Root output names, in declaration order
    pub root_outputs: Vec<String>,
}

impl SwiftTopology {
    pub fn build(
        env: &Environment,
        settings: &SwiftSettings,
        lookup: &dyn CloudLookup,
    ) -> SynthResult<Self> {
        let mut root = Stack::new(env.root_stack_name())?.with_description(ROOT_DESCRIPTION);
        info!("Assembling {} for account {}", root.id(), env.account);

        let key = KeyStack::new(KEY_STACK)?;

        let mut network = NetworkStack::new(NETWORK_STACK, settings.vpc_cidr)?;
        network.set_vgw(true)?;
        for group in SUBNET_GROUPS {
            network.add_isolated_subnets(group)?;
        }
        network.set_vgw_propagation_subnet(SubnetSelection::group(SwiftComponent::Sagsnl.as_str()))?;
        network.generate()?;
        info!("Network {} generated", settings.vpc_cidr);

        let mut security = SecurityStack::new(
            SECURITY_STACK,
            &network,
            &env.region,
            settings.qs_s3_bucket.as_deref(),
        )?;
        create_endpoint_security_group(&mut security)?;

        let key_pair = root.add_resource(
            KEY_PAIR,
            Resource::new(
                "AWS::EC2::KeyPair",
                Properties::new().set("KeyName", KEY_PAIR).set(
                    "Tags",
                    Expr::list([super::tag(
                        "Description",
                        "KeyPair for the systems operator, just in case.",
                    )]),
                ),
            ),
        )?;

        let deps = HostGroupDeps {
            network: &network,
            workload_key: key.key(),
            key_pair: Some(&key_pair),
            lookup,
            qs_s3_bucket: settings.qs_s3_bucket.as_deref(),
        };
        let gateways = build_unit(SwiftComponent::Sagsnl, settings, &mut security, &deps)?;
        let handlers = build_unit(SwiftComponent::Amh, settings, &mut security, &deps)?;

        let database = DatabaseStack::new(
            DATABASE_STACK,
            &network,
            &mut security,
            key.key(),
            settings.skip_oracle,
        )?;
        let broker = BrokerStack::new(BROKER_STACK, &network, &mut security, key.key())?;

        enforce_security_group_rules(&mut security, &SwiftSecurityConfig::from(settings), lookup)?;
        create_nacls(&mut security, &network)?;
        info!("Security rules and NACLs enforced");

        let principals: Vec<Expr> = handlers
            .iter()
            .chain(gateways.iter())
            .map(|host| session_principal(&env.account, host))
            .collect();
        let endpoints = EndpointsStack::new(
            ENDPOINTS_STACK,
            &network,
            &security.require_security_group(ENDPOINT_SECURITY_GROUP)?,
            principals,
            &env.region,
            settings.qs_s3_bucket()?,
        )?;

        let mut root_outputs = Vec::new();
        for host in gateways.iter().chain(handlers.iter()) {
            let name = format!("{}InstanceID", host.instance().stack());
            root.add_output(&name, host.instance_id(), None)?;
            root_outputs.push(name);
        }
        root.add_output(VPC_OUTPUT, network.vpc()?, None)?;
        root_outputs.push(VPC_OUTPUT.to_string());

        let operator_roles = if settings.create_sample_iam_role {
            let resources = OperatedResources {
                instance_ids: gateways
                    .iter()
                    .chain(handlers.iter())
                    .map(HostGroup::instance_id)
                    .collect(),
                database_arn: database.instance_arn(),
                broker_arn: broker.arn(),
            };
            Some(OperatorRoleStack::new(OPERATOR_ROLE_STACK, &resources)?)
        } else {
            None
        };

        let mut app = App::new(root, settings.assets.clone());
        app.add_nested(key.into_stack())?;
        app.add_nested(network.into_stack())?;
        app.add_nested(security.into_stack()?)?;
        for host in gateways.into_iter().chain(handlers) {
            app.add_nested(host.into_stack())?;
        }
        // A skipped database leaves nothing to deploy
        let database = database.into_stack();
        if database.resources().next().is_some() {
            app.add_nested(database)?;
        } else {
            debug!("Database stack is empty and not deployed");
        }
        app.add_nested(broker.into_stack())?;
        app.add_nested(endpoints.into_stack())?;
        if let Some(roles) = operator_roles {
            app.add_nested(roles.into_stack())?;
        }

        info!(
            "Assembled {} nested stacks under {}",
            app.nested_stacks().len(),
            app.root().id()
        );
        Ok(Self { app, root_outputs })
    }
}

/// Assemble the deployment and return only the app
pub fn build_app(
    env: &Environment,
    settings: &SwiftSettings,
    lookup: &dyn CloudLookup,
) -> SynthResult<App> {
    SwiftTopology::build(env, settings, lookup).map(|topology| topology.app)
}
