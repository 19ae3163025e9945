// Copyright (c) 2025 - Cowboy AI, Inc.
//! Customer-managed key shared by every encrypted resource

use tracing::info;

use crate::errors::SynthResult;
use crate::template::{
    DeletionPolicy, Expr, PolicyDocument, PolicyStatement, Principal, Properties, Pseudo, Resource,
    ResourceRef, Stack,
};

pub const KEY_NAME: &str = "SwiftConnectivityCMK";

#[derive(Debug, Clone)]
pub struct KeyStack {
    stack: Stack,
    key: ResourceRef,
}

impl KeyStack {
    pub fn new(id: &str) -> SynthResult<Self> {
        let mut stack = Stack::new(id)?;

        // Account root keeps administrative access, IAM policies grant the rest
        let key_policy = PolicyDocument::new().statement(
            PolicyStatement::allow()
                .actions(["kms:*"])
                .principal(Principal::Account(Pseudo::AccountId.into()))
                .resource("*"),
        );

        let key = stack.add_resource(
            KEY_NAME,
            Resource::new(
                "AWS::KMS::Key",
                Properties::new()
                    .set("KeyPolicy", key_policy)
                    .set("Description", "Swift Connectivity CMK for use for all resources")
                    .set("Enabled", true)
                    .set("EnableKeyRotation", true),
            )
            .deletion_policy(DeletionPolicy::Delete),
        )?;

        stack.add_resource(
            &format!("{KEY_NAME}Alias"),
            Resource::new(
                "AWS::KMS::Alias",
                Properties::new()
                    .set("AliasName", format!("alias/{KEY_NAME}"))
                    .set("TargetKeyId", key.attr("Arn")),
            ),
        )?;

        info!("Declared workload key {}", KEY_NAME);
        Ok(Self { stack, key })
    }

    pub fn key(&self) -> &ResourceRef {
        &self.key
    }

    pub fn key_id(&self) -> Expr {
        self.key.to_ref()
    }

    pub fn key_arn(&self) -> Expr {
        self.key.attr("Arn")
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn into_stack(self) -> Stack {
        self.stack
    }
}
