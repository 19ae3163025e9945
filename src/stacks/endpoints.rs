// Copyright (c) 2025 - Cowboy AI, Inc.
//! VPC Endpoints
//!
//! Interface endpoints for the SSM and CloudWatch agents plus the S3
//! gateway endpoint. Interface endpoint policies only admit the workload
//! instances, identified by their assumed-role session ARN:
//!
//! `arn:aws:sts::<account>:assumed-role/<role name>/<instance id>`

use std::collections::BTreeSet;
use tracing::{debug, info};

use super::host_group::HostGroup;
use super::network::{NetworkStack, SubnetSelection};
use super::security::SecurityGroupHandle;
use crate::errors::{SynthError, SynthResult};
use crate::template::{
    Expr, PolicyDocument, PolicyStatement, Principal, Properties, Resource, ResourceRef, Stack,
};

/// Interface services and the actions their policy allows
const INTERFACE_ENDPOINTS: [(&str, &[&str]); 6] = [
    (
        "ssm",
        &[
            "ssm:DescribeAssociation",
            "ssm:GetDeployablePatchSnapshotForInstance",
            "ssm:GetDocument",
            "ssm:DescribeDocument",
            "ssm:GetManifest",
            "ssm:GetParameter",
            "ssm:GetParameters",
            "ssm:ListAssociations",
            "ssm:ListInstanceAssociations",
            "ssm:PutInventory",
            "ssm:PutComplianceItems",
            "ssm:PutConfigurePackageResult",
            "ssm:UpdateAssociationStatus",
            "ssm:UpdateInstanceAssociationStatus",
            "ssm:UpdateInstanceInformation",
        ],
    ),
    ("ec2", &["ec2:Describe*"]),
    (
        "ssmmessages",
        &[
            "ssmmessages:CreateControlChannel",
            "ssmmessages:CreateDataChannel",
            "ssmmessages:OpenControlChannel",
            "ssmmessages:OpenDataChannel",
        ],
    ),
    (
        "ec2messages",
        &[
            "ec2messages:AcknowledgeMessage",
            "ec2messages:DeleteMessage",
            "ec2messages:FailMessage",
            "ec2messages:GetEndpoint",
            "ec2messages:GetMessages",
            "ec2messages:SendReply",
        ],
    ),
    (
        "logs",
        &[
            "logs:PutLogEvents",
            "logs:DescribeLogStreams",
            "logs:DescribeLogGroups",
            "logs:CreateLogStream",
            "logs:CreateLogGroup",
        ],
    ),
    ("monitoring", &["cloudwatch:PutMetricData"]),
];

/// Regional buckets the agents download from, `{region}` substituted
const AGENT_BUCKETS: [&str; 8] = [
    "aws-ssm-{region}",
    "aws-windows-downloads-{region}",
    "amazon-ssm-{region}",
    "amazon-ssm-packages-{region}",
    "{region}-birdwatcher-prod",
    "aws-ssm-distributor-file-{region}",
    "patch-baseline-snapshot-{region}",
    "amazoncloudwatch-agent-{region}",
];

/// Session ARN of `host`'s role on its own instance
pub fn session_principal(account: &str, host: &HostGroup) -> Expr {
    Expr::concat([
        format!("arn:aws:sts::{account}:assumed-role/{}/", host.role().role_name()).into(),
        host.instance_id(),
    ])
}

#[derive(Debug, Clone)]
pub struct EndpointsStack {
    stack: Stack,
    endpoints: Vec<ResourceRef>,
}

impl EndpointsStack {
    pub fn new(
        id: &str,
        network: &NetworkStack,
        endpoint_sg: &SecurityGroupHandle,
        principals: Vec<Expr>,
        region: &str,
        qs_s3_bucket: &str,
    ) -> SynthResult<Self> {
        if principals.is_empty() {
            return Err(SynthError::MissingContext(
                "endpoint principals (no workload instances)".to_string(),
            ));
        }

        let mut stack = Stack::new(id)?;
        let vpc = network.vpc()?;

        // One subnet per AZ from the default (most private) selection
        let mut seen = BTreeSet::new();
        let subnet_ids: Vec<Expr> = network
            .select_subnets(&SubnetSelection::default())?
            .subnets()
            .iter()
            .filter(|subnet| seen.insert(subnet.az_index))
            .map(|subnet| subnet.id())
            .collect();

        let mut endpoints = Vec::new();
        for (service, actions) in INTERFACE_ENDPOINTS {
            let policy = PolicyDocument::new().statement(
                PolicyStatement::allow()
                    .actions(actions.iter().copied())
                    .resource("*")
                    .principal(Principal::Arn(principals.clone())),
            );
            let endpoint = stack.add_resource(
                &format!("{}VPCEndPoint", service.to_uppercase()),
                Resource::new(
                    "AWS::EC2::VPCEndpoint",
                    Properties::new()
                        .set("ServiceName", format!("com.amazonaws.{region}.{service}"))
                        .set("VpcEndpointType", "Interface")
                        .set("VpcId", vpc)
                        .set("PrivateDnsEnabled", true)
                        .set("SecurityGroupIds", Expr::list([endpoint_sg.group_id()]))
                        .set("SubnetIds", Expr::list(subnet_ids.clone()))
                        .set("PolicyDocument", policy),
                ),
            )?;
            debug!("Interface endpoint for {}", service);
            endpoints.push(endpoint);
        }

        let bucket_arns = AGENT_BUCKETS
            .iter()
            .map(|bucket| bucket.replace("{region}", region))
            .chain(std::iter::once(format!("{qs_s3_bucket}-{region}")))
            .map(|bucket| super::bucket_objects_arn([Expr::str(bucket)]));

        let route_tables: Vec<Expr> = network
            .subnets()?
            .iter()
            .map(|subnet| subnet.route_table.to_ref())
            .collect();

        let s3_policy = PolicyDocument::new().statement(
            PolicyStatement::allow()
                .actions(["s3:GetObject", "s3:PutObject"])
                .resources(bucket_arns)
                .principal(Principal::Any),
        );
        endpoints.push(stack.add_resource(
            "S3VPCEndPoint",
            Resource::new(
                "AWS::EC2::VPCEndpoint",
                Properties::new()
                    .set("ServiceName", format!("com.amazonaws.{region}.s3"))
                    .set("VpcEndpointType", "Gateway")
                    .set("VpcId", vpc)
                    .set("RouteTableIds", Expr::list(route_tables))
                    .set("PolicyDocument", s3_policy),
            ),
        )?);

        info!(
            "Declared {} VPC endpoints for {} principals",
            endpoints.len(),
            principals.len()
        );
        Ok(Self { stack, endpoints })
    }

    pub fn endpoints(&self) -> &[ResourceRef] {
        &self.endpoints
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn into_stack(self) -> Stack {
        self.stack
    }
}
