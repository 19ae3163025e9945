// Copyright (c) 2025 - Cowboy AI, Inc.
//! Host Group
//!
//! One EC2 instance behind its component security group, in its own nested
//! stack. Group, role and NACL declarations stay in the security registry;
//! the host group only consumes their handles.
//!
//! Build order:
//! 1. resolve or create `<component>SG`; a new group is then wired to the
//!    endpoint security group in a separate step
//! 2. resolve or create the component's instance role
//! 3. pick the machine image (explicit ID or latest RHEL 8.3 image)
//! 4. attach the agent bootstrap script when the image was looked up
//! 5. declare the instance profile and the instance

use std::net::Ipv4Addr;
use tracing::{debug, info};

use super::network::{NetworkStack, SubnetSelection};
use super::security::{InstanceRole, SecurityGroupHandle, SecurityStack};
use crate::domain::invariants::validate_private_ip;
use crate::errors::{SynthError, SynthResult};
use crate::lookup::{CloudLookup, ImageQuery};
use crate::template::{Expr, Properties, Pseudo, Resource, ResourceRef, Stack};

pub const INSTANCE_TYPE: &str = "m5.xlarge";
pub const ROOT_DEVICE: &str = "/dev/sda1";
pub const ROOT_VOLUME_GIB: u32 = 100;

pub const IMAGE_NAME_PATTERN: &str = "RHEL-8.3.0_HVM-????????-x86_64-0-Hourly2-GP2";
pub const IMAGE_OWNER: &str = "309956199498";

/// Where the machine image comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmiSource {
    Explicit(String),
    /// Latest RHEL 8.3 image, bootstrapped through user data
    Latest,
}

impl AmiSource {
    /// Empty or absent IDs fall back to the lookup
    pub fn from_option(ami: Option<&str>) -> Self {
        match ami.map(str::trim) {
            Some(id) if !id.is_empty() => Self::Explicit(id.to_string()),
            _ => Self::Latest,
        }
    }
}

/// What to build
#[derive(Debug, Clone)]
pub struct HostGroupSpec {
    /// Nested stack id, also the instance logical id (`SAGSNL1`)
    pub unit_id: String,
    /// Component name keying the security group, role and subnet group
    pub component: String,
    /// Defaults to the component's subnet group
    pub selection: Option<SubnetSelection>,
    pub private_ip: Option<Ipv4Addr>,
    pub ami: AmiSource,
}

/// Collaborators a host group is built against
pub struct HostGroupDeps<'a> {
    pub network: &'a NetworkStack,
    pub workload_key: &'a ResourceRef,
    pub key_pair: Option<&'a ResourceRef>,
    pub lookup: &'a dyn CloudLookup,
    pub qs_s3_bucket: Option<&'a str>,
}

/// A built host group
#[derive(Debug, Clone)]
pub struct HostGroup {
    stack: Stack,
    component: String,
    instance: ResourceRef,
    role: InstanceRole,
    security_group: SecurityGroupHandle,
    bootstrapped: bool,
}

impl HostGroup {
    pub fn build(
        spec: HostGroupSpec,
        security: &mut SecurityStack,
        deps: &HostGroupDeps<'_>,
    ) -> SynthResult<Self> {
        let sg_name = format!("{}SG", spec.component);
        let registration = security.get_or_create_security_group(&sg_name)?;
        if registration.is_created() {
            security.allow_endpoint_access(&sg_name)?;
        }
        let security_group = registration.into_inner();

        let role = security
            .get_or_create_instance_role(&spec.component)?
            .into_inner();

        let (image_id, user_data) = match &spec.ami {
            AmiSource::Explicit(id) => (id.clone(), None),
            AmiSource::Latest => {
                let bucket = deps
                    .qs_s3_bucket
                    .ok_or_else(|| SynthError::MissingContext("qs_s3_bucket".to_string()))?;
                let query = ImageQuery::new(IMAGE_NAME_PATTERN, &[IMAGE_OWNER]);
                let image = deps.lookup.latest_image(&query)?;
                (image, Some(bootstrap_script(security.region(), bucket)))
            }
        };

        let selection = spec
            .selection
            .clone()
            .unwrap_or_else(|| SubnetSelection::group(spec.component.as_str()));
        let subnets = deps.network.select_subnets(&selection)?;
        let subnet = subnets.first();
        if let Some(ip) = spec.private_ip {
            validate_private_ip(ip, &subnet.cidr)?;
        }

        let mut stack = Stack::new(spec.unit_id.as_str())?;
        let profile = stack.add_resource(
            &format!("{}InstanceProfile", spec.unit_id),
            Resource::new(
                "AWS::IAM::InstanceProfile",
                Properties::new().set("Roles", Expr::list([role.resource().to_ref()])),
            ),
        )?;

        let block_device = Properties::new().set("DeviceName", ROOT_DEVICE).set(
            "Ebs",
            Properties::new()
                .set("VolumeSize", ROOT_VOLUME_GIB)
                .set("Encrypted", true)
                .set("KmsKeyId", deps.workload_key.attr("Arn")),
        );

        let bootstrapped = user_data.is_some();
        let properties = Properties::new()
            .set("AvailabilityZone", subnet.availability_zone())
            .set("IamInstanceProfile", &profile)
            .set("ImageId", image_id.as_str())
            .set("InstanceType", INSTANCE_TYPE)
            .set("SubnetId", subnet.id())
            .set("SecurityGroupIds", Expr::list([security_group.group_id()]))
            .set("BlockDeviceMappings", Expr::list([block_device.into()]))
            .set("Tags", super::name_tags(&spec.unit_id))
            .set_opt("KeyName", deps.key_pair.map(ResourceRef::to_ref))
            .set_opt("PrivateIpAddress", spec.private_ip.map(|ip| ip.to_string()))
            .set_opt("UserData", user_data);

        let instance = stack.add_resource(
            &spec.unit_id,
            Resource::new("AWS::EC2::Instance", properties).depends_on(&profile),
        )?;
        debug!("Instance {} placed in {}", spec.unit_id, subnet.resource);

        info!(
            "Built host group {} ({}, image {})",
            spec.unit_id, spec.component, image_id
        );
        Ok(Self {
            stack,
            component: spec.component,
            instance,
            role,
            security_group,
            bootstrapped,
        })
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn instance(&self) -> &ResourceRef {
        &self.instance
    }

    /// `Ref` of the instance, its instance ID
    pub fn instance_id(&self) -> Expr {
        self.instance.to_ref()
    }

    pub fn role(&self) -> &InstanceRole {
        &self.role
    }

    pub fn security_group(&self) -> &SecurityGroupHandle {
        &self.security_group
    }

    /// Whether the instance carries the agent bootstrap script
    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn into_stack(self) -> Stack {
        self.stack
    }
}

/// Install the SSM and CloudWatch agents from regional buckets
fn bootstrap_script(region: &str, bucket: &str) -> Expr {
    let url_suffix = || Expr::from(Pseudo::UrlSuffix);
    let regional_s3 = || {
        Expr::concat([
            format!("https://s3.{region}.").into(),
            url_suffix(),
        ])
    };

    let lines = vec![
        Expr::str("#!/bin/bash"),
        Expr::str("sleep 120"),
        Expr::str("dnf config-manager --disable rhui-client-config-server-8"),
        Expr::str("dnf config-manager --disable rhel-8-appstream-rhui-rpms"),
        Expr::str("dnf config-manager --disable rhel-8-baseos-rhui-rpms"),
        Expr::concat([
            "dnf install -y ".into(),
            regional_s3(),
            format!("/amazon-ssm-{region}/latest/linux_amd64/amazon-ssm-agent.rpm").into(),
        ]),
        Expr::str("systemctl enable amazon-ssm-agent"),
        Expr::str("systemctl start amazon-ssm-agent"),
        Expr::concat([
            "curl ".into(),
            regional_s3(),
            format!(
                "/amazoncloudwatch-agent-{region}/redhat/amd64/latest/amazon-cloudwatch-agent.rpm -o /tmp/amazon-cloudwatch-agent.rpm"
            )
            .into(),
        ]),
        Expr::str("rpm -U /tmp/amazon-cloudwatch-agent.rpm"),
        Expr::concat([
            format!("curl https://{bucket}-{region}.s3.{region}.").into(),
            url_suffix(),
            "/quickstart-swift-digital-connectivity/assets/cw_agent_config.json -o /tmp/cw_agent_config.json".into(),
        ]),
        Expr::str(
            "/opt/aws/amazon-cloudwatch-agent/bin/amazon-cloudwatch-agent-ctl -a fetch-config -m ec2 -s -c file:/tmp/cw_agent_config.json",
        ),
    ];

    Expr::base64(Expr::join("\n", lines))
}
