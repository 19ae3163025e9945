// Copyright (c) 2025 - Cowboy AI, Inc.
//! Sample operator roles for managing the deployed components
//!
//! Both roles are assumable by the account root only with MFA present.

use tracing::info;

use crate::errors::SynthResult;
use crate::template::{
    Expr, PolicyDocument, PolicyStatement, Principal, Properties, Pseudo, Resource, ResourceRef,
    Stack,
};

pub const INSTANCE_OPERATOR_ROLE: &str = "SWIFTInstanceOperatorRole";
pub const INFRASTRUCTURE_ROLE: &str = "SWIFTInfrastructureRole";

/// What the roles are scoped to
#[derive(Debug, Clone)]
pub struct OperatedResources {
    pub instance_ids: Vec<Expr>,
    /// Absent when the database was skipped
    pub database_arn: Option<Expr>,
    pub broker_arn: Expr,
}

#[derive(Debug, Clone)]
pub struct OperatorRoleStack {
    stack: Stack,
    instance_operator: ResourceRef,
    infrastructure: ResourceRef,
}

impl OperatorRoleStack {
    pub fn new(id: &str, resources: &OperatedResources) -> SynthResult<Self> {
        let mut stack = Stack::new(id)?;

        let instance_arns: Vec<Expr> = resources
            .instance_ids
            .iter()
            .map(|instance_id| {
                Expr::concat([
                    "arn:aws:ec2:".into(),
                    Pseudo::Region.into(),
                    ":".into(),
                    Pseudo::AccountId.into(),
                    ":instance/".into(),
                    instance_id.clone(),
                ])
            })
            .collect();

        let session_document = Expr::concat([
            "arn:aws:ssm:".into(),
            Pseudo::Region.into(),
            ":".into(),
            Pseudo::AccountId.into(),
            ":document/SSM-SessionManagerRunShell".into(),
        ]);

        let instance_operator = add_role(
            &mut stack,
            INSTANCE_OPERATOR_ROLE,
            "SSMInstanceAccessPolicy",
            PolicyDocument::new()
                .statement(
                    PolicyStatement::allow()
                        .actions(["ssm:StartSession", "ssm:SendCommand"])
                        .resource(session_document)
                        .resources(instance_arns.iter().cloned())
                        .condition("BoolIfExists", "ssm:SessionDocumentAccessCheck", "true"),
                )
                .statement(
                    PolicyStatement::allow()
                        .actions([
                            "ssm:DescribeSessions",
                            "ssm:GetConnectionStatus",
                            "ssm:DescribeInstanceInformation",
                            "ssm:DescribeInstanceProperties",
                            "ec2:DescribeInstances",
                        ])
                        .resource("*"),
                )
                .statement(
                    PolicyStatement::allow()
                        .actions(["ssm:TerminateSession"])
                        .resource("arn:aws:ssm:*:*:session/${aws:username}-*"),
                ),
        )?;

        let mut infrastructure_policy = PolicyDocument::new().statement(
            PolicyStatement::allow()
                .actions(["rds:Describe*"])
                .resource("*"),
        );
        if let Some(database_arn) = &resources.database_arn {
            infrastructure_policy.add_statement(
                PolicyStatement::allow()
                    .actions(["rds:Start*", "rds:Stop*"])
                    .resource(database_arn.clone()),
            );
        }
        infrastructure_policy = infrastructure_policy
            .statement(
                PolicyStatement::allow()
                    .actions(["ec2:Describe*"])
                    .resource("*"),
            )
            .statement(
                PolicyStatement::allow()
                    .actions(["ec2:Start*", "ec2:Stop*"])
                    .resources(instance_arns),
            )
            .statement(
                PolicyStatement::allow()
                    .actions(["mq:List*", "mq:Describe*", "mq:RebootBroker"])
                    .resource(resources.broker_arn.clone()),
            )
            .statement(
                PolicyStatement::allow()
                    .actions(["logs:List*", "logs:Describe*", "logs:Get*"])
                    .resource("*"),
            );

        let infrastructure = add_role(
            &mut stack,
            INFRASTRUCTURE_ROLE,
            "SwiftInfrastructurePolicy",
            infrastructure_policy,
        )?;

        info!("Declared operator roles in {}", id);
        Ok(Self {
            stack,
            instance_operator,
            infrastructure,
        })
    }

    pub fn instance_operator(&self) -> &ResourceRef {
        &self.instance_operator
    }

    pub fn infrastructure(&self) -> &ResourceRef {
        &self.infrastructure
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn into_stack(self) -> Stack {
        self.stack
    }
}

fn add_role(
    stack: &mut Stack,
    role_name: &str,
    policy_name: &str,
    policy: PolicyDocument,
) -> SynthResult<ResourceRef> {
    let assume = PolicyDocument::new().statement(
        PolicyStatement::allow()
            .actions(["sts:AssumeRole"])
            .principal(Principal::Account(Pseudo::AccountId.into()))
            .condition("Bool", "aws:MultiFactorAuthPresent", "true"),
    );

    let role = stack.add_resource(
        role_name,
        Resource::new(
            "AWS::IAM::Role",
            Properties::new()
                .set("RoleName", role_name)
                .set("AssumeRolePolicyDocument", assume),
        ),
    )?;

    stack.add_resource(
        policy_name,
        Resource::new(
            "AWS::IAM::Policy",
            Properties::new()
                .set("PolicyName", policy_name)
                .set("PolicyDocument", policy)
                .set("Roles", Expr::list([role.to_ref()])),
        ),
    )?;

    Ok(role)
}
