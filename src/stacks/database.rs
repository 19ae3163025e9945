// Copyright (c) 2025 - Cowboy AI, Inc.
//! Oracle database backing the message handler

use tracing::{info, warn};

use super::network::{NetworkStack, SubnetSelection};
use super::security::{SecurityGroupHandle, SecurityStack};
use super::swift_security::RDS_SECURITY_GROUP;
use crate::errors::SynthResult;
use crate::template::{
    DeletionPolicy, Expr, Properties, Pseudo, Resource, ResourceRef, Stack,
};

pub const DB_INSTANCE: &str = "AMHRDSOracleInstance";
pub const DB_SUBNET_GROUP: &str = "Database";

const ENGINE: &str = "oracle-ee";
const ENGINE_VERSION: &str = "12.2.0.1.ru-2020-07.rur-2020-07.r1";
const INSTANCE_CLASS: &str = "db.m5.large";
const LOG_EXPORTS: [&str; 4] = ["trace", "audit", "alert", "listener"];

/// `{{resolve:secretsmanager:<secret>:SecretString:<field>::}}`
pub(crate) fn secret_field(secret: &ResourceRef, field: &str) -> Expr {
    Expr::concat([
        "{{resolve:secretsmanager:".into(),
        secret.to_ref(),
        format!(":SecretString:{field}::}}}}").into(),
    ])
}

#[derive(Debug, Clone)]
pub struct DatabaseStack {
    stack: Stack,
    security_group: SecurityGroupHandle,
    instance: Option<ResourceRef>,
}

impl DatabaseStack {
    /// `RDSSG` is always declared; the instance only when `skip_oracle` is off
    pub fn new(
        id: &str,
        network: &NetworkStack,
        security: &mut SecurityStack,
        workload_key: &ResourceRef,
        skip_oracle: bool,
    ) -> SynthResult<Self> {
        let mut stack = Stack::new(id)?;
        let security_group = security.create_security_group(RDS_SECURITY_GROUP, None)?;

        if skip_oracle {
            warn!("skip_oracle is set, no database instance declared");
            return Ok(Self {
                stack,
                security_group,
                instance: None,
            });
        }

        let subnets = network.select_subnets(&SubnetSelection::group(DB_SUBNET_GROUP))?;

        let secret = stack.add_resource(
            &format!("{DB_INSTANCE}Secret"),
            Resource::new(
                "AWS::SecretsManager::Secret",
                Properties::new().set(
                    "GenerateSecretString",
                    Properties::new()
                        .set("SecretStringTemplate", r#"{"username":"admin"}"#)
                        .set("GenerateStringKey", "password")
                        .set("PasswordLength", 30u16)
                        .set("ExcludeCharacters", " %+~`#$&*()|[]{}:;<>?!'/@\"\\"),
                ),
            )
            .deletion_policy(DeletionPolicy::Delete),
        )?;

        let subnet_group = stack.add_resource(
            &format!("{DB_INSTANCE}SubnetGroup"),
            Resource::new(
                "AWS::RDS::DBSubnetGroup",
                Properties::new()
                    .set(
                        "DBSubnetGroupDescription",
                        format!("Subnet group for {DB_INSTANCE} database"),
                    )
                    .set("SubnetIds", Expr::list(subnets.ids())),
            ),
        )?;

        let instance = stack.add_resource(
            DB_INSTANCE,
            Resource::new(
                "AWS::RDS::DBInstance",
                Properties::new()
                    .set("Engine", ENGINE)
                    .set("EngineVersion", ENGINE_VERSION)
                    .set("DBInstanceClass", INSTANCE_CLASS)
                    .set("AllocatedStorage", "100")
                    .set("StorageType", "gp2")
                    .set("MultiAZ", true)
                    .set("StorageEncrypted", true)
                    .set("KmsKeyId", workload_key.attr("Arn"))
                    .set("CopyTagsToSnapshot", true)
                    .set("DBSubnetGroupName", &subnet_group)
                    .set(
                        "VPCSecurityGroups",
                        Expr::list([security_group.group_id()]),
                    )
                    .set(
                        "EnableCloudwatchLogsExports",
                        Expr::from(LOG_EXPORTS.to_vec()),
                    )
                    .set("MasterUsername", secret_field(&secret, "username"))
                    .set("MasterUserPassword", secret_field(&secret, "password")),
            )
            .deletion_policy(DeletionPolicy::Snapshot),
        )?;

        stack.add_resource(
            &format!("{DB_INSTANCE}SecretAttachment"),
            Resource::new(
                "AWS::SecretsManager::SecretTargetAttachment",
                Properties::new()
                    .set("SecretId", &secret)
                    .set("TargetId", &instance)
                    .set("TargetType", "AWS::RDS::DBInstance"),
            ),
        )?;

        info!("Declared database {} over {} subnets", DB_INSTANCE, subnets.len());
        Ok(Self {
            stack,
            security_group,
            instance: Some(instance),
        })
    }

    pub fn instance(&self) -> Option<&ResourceRef> {
        self.instance.as_ref()
    }

    /// `arn:<partition>:rds:<region>:<account>:db:<instance>`
    pub fn instance_arn(&self) -> Option<Expr> {
        self.instance.as_ref().map(|instance| {
            Expr::concat([
                "arn:".into(),
                Pseudo::Partition.into(),
                ":rds:".into(),
                Pseudo::Region.into(),
                ":".into(),
                Pseudo::AccountId.into(),
                ":db:".into(),
                instance.to_ref(),
            ])
        })
    }

    pub fn security_group(&self) -> &SecurityGroupHandle {
        &self.security_group
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn into_stack(self) -> Stack {
        self.stack
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Ipv4Cidr;
    use crate::errors::SynthError;
    use crate::template::LocalResolver;
    use serde_json::json;

    fn setup() -> (NetworkStack, SecurityStack, ResourceRef) {
        let mut network =
            NetworkStack::new("SwiftConnectivityVPC", Ipv4Cidr::new("10.10.0.0/16").unwrap())
                .unwrap();
        network.add_isolated_subnets("Database").unwrap();
        network.generate().unwrap();
        let security =
            SecurityStack::new("SwiftConnectivitySecurity", &network, "eu-west-1", None).unwrap();
        let mut keys = Stack::new("SwiftConnectivityCMK").unwrap();
        let key = keys
            .add_resource("SwiftConnectivityCMK", Resource::new("AWS::KMS::Key", Properties::new()))
            .unwrap();
        (network, security, key)
    }

    #[test]
    fn test_oracle_instance() {
        let (network, mut security, key) = setup();
        let database = DatabaseStack::new("Database", &network, &mut security, &key, false).unwrap();

        let instance = database.stack().resource(DB_INSTANCE).unwrap();
        assert_eq!(instance.policy(), Some(DeletionPolicy::Snapshot));
        assert_eq!(
            instance.property("MultiAZ").unwrap().render(&LocalResolver),
            json!(true)
        );
        assert_eq!(
            instance
                .property("EnableCloudwatchLogsExports")
                .unwrap()
                .render(&LocalResolver),
            json!(["trace", "audit", "alert", "listener"])
        );
        assert!(database.instance_arn().is_some());
        assert!(security.security_group(RDS_SECURITY_GROUP).is_some());

        let password = instance
            .property("MasterUserPassword")
            .unwrap()
            .render(&LocalResolver);
        assert_eq!(
            password,
            json!({"Fn::Join": ["", [
                "{{resolve:secretsmanager:",
                {"Ref": "AMHRDSOracleInstanceSecret"},
                ":SecretString:password::}}"
            ]]})
        );
    }

    #[test]
    fn test_skip_oracle_keeps_security_group() {
        let (network, mut security, key) = setup();
        let database = DatabaseStack::new("Database", &network, &mut security, &key, true).unwrap();

        assert!(database.instance().is_none());
        assert!(database.instance_arn().is_none());
        assert_eq!(database.stack().resources().count(), 0);
        assert!(security.security_group(RDS_SECURITY_GROUP).is_some());
    }

    #[test]
    fn test_security_group_is_strict() {
        let (network, mut security, key) = setup();
        security.create_security_group(RDS_SECURITY_GROUP, None).unwrap();
        assert!(matches!(
            DatabaseStack::new("Database", &network, &mut security, &key, true),
            Err(SynthError::SecurityGroupExists(_))
        ));
    }
}
