// Copyright (c) 2025 - Cowboy AI, Inc.
//! Amazon MQ broker used by the message handler for JMS integration

use tracing::info;

use super::database::secret_field;
use super::network::NetworkStack;
use super::security::{SecurityGroupHandle, SecurityStack};
use super::swift_security::MQ_SECURITY_GROUP;
use crate::errors::SynthResult;
use crate::template::{Expr, Properties, Resource, ResourceRef, Stack};

pub const BROKER_SUBNET_GROUP: &str = "MQ";

const ENGINE_TYPE: &str = "ACTIVEMQ";
const ENGINE_VERSION: &str = "5.15.13";
const HOST_INSTANCE_TYPE: &str = "mq.m5.large";
const DEPLOYMENT_MODE: &str = "ACTIVE_STANDBY_MULTI_AZ";
const PASSWORD_EXCLUDE: &str = "%+~`#$&*()|[]{}=:, ;<>?!'/@";

#[derive(Debug, Clone)]
pub struct BrokerStack {
    stack: Stack,
    broker: ResourceRef,
    secret: ResourceRef,
    security_group: SecurityGroupHandle,
}

impl BrokerStack {
    /// Broker named after the stack, credentials generated into a secret
    /// encrypted with the workload key
    pub fn new(
        id: &str,
        network: &NetworkStack,
        security: &mut SecurityStack,
        workload_key: &ResourceRef,
    ) -> SynthResult<Self> {
        let mut stack = Stack::new(id)?;
        let security_group = security.create_security_group(MQ_SECURITY_GROUP, None)?;
        let subnets = network.isolated_subnets(BROKER_SUBNET_GROUP)?;

        let secret = stack.add_resource(
            &format!("{id}Secret"),
            Resource::new(
                "AWS::SecretsManager::Secret",
                Properties::new()
                    .set("KmsKeyId", workload_key.attr("Arn"))
                    .set(
                        "GenerateSecretString",
                        Properties::new()
                            .set("SecretStringTemplate", r#"{"username":"admin"}"#)
                            .set("GenerateStringKey", "password")
                            .set("PasswordLength", 20u16)
                            .set("ExcludeCharacters", PASSWORD_EXCLUDE),
                    ),
            ),
        )?;

        let user = Properties::new()
            .set("Username", secret_field(&secret, "username"))
            .set("Password", secret_field(&secret, "password"));

        let broker = stack.add_resource(
            id,
            Resource::new(
                "AWS::AmazonMQ::Broker",
                Properties::new()
                    .set("AutoMinorVersionUpgrade", false)
                    .set("BrokerName", id)
                    .set("DeploymentMode", DEPLOYMENT_MODE)
                    .set("EngineType", ENGINE_TYPE)
                    .set("EngineVersion", ENGINE_VERSION)
                    .set("HostInstanceType", HOST_INSTANCE_TYPE)
                    .set("PubliclyAccessible", false)
                    .set(
                        "EncryptionOptions",
                        Properties::new()
                            .set("UseAwsOwnedKey", false)
                            .set("KmsKeyId", workload_key.to_ref()),
                    )
                    .set(
                        "Logs",
                        Properties::new().set("Audit", true).set("General", true),
                    )
                    .set("SubnetIds", Expr::list(subnets.ids()))
                    .set("SecurityGroups", Expr::list([security_group.group_id()]))
                    .set("Users", Expr::list([user.into()])),
            ),
        )?;

        info!("Declared {} broker {}", ENGINE_TYPE, id);
        Ok(Self {
            stack,
            broker,
            secret,
            security_group,
        })
    }

    pub fn broker(&self) -> &ResourceRef {
        &self.broker
    }

    pub fn secret(&self) -> &ResourceRef {
        &self.secret
    }

    /// `Fn::GetAtt [<broker>, Arn]`
    pub fn arn(&self) -> Expr {
        self.broker.attr("Arn")
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

    fn network(with_mq: bool) -> NetworkStack {
        let mut network =
            NetworkStack::new("SwiftConnectivityVPC", Ipv4Cidr::new("10.10.0.0/16").unwrap())
                .unwrap();
        network.add_isolated_subnets("AMH").unwrap();
        if with_mq {
            network.add_isolated_subnets(BROKER_SUBNET_GROUP).unwrap();
        }
        network.generate().unwrap();
        network
    }

    fn key() -> ResourceRef {
        Stack::new("SwiftConnectivityCMK")
            .unwrap()
            .add_resource("SwiftConnectivityCMK", Resource::new("AWS::KMS::Key", Properties::new()))
            .unwrap()
    }

    #[test]
    fn test_broker_properties() {
        let network = network(true);
        let mut security =
            SecurityStack::new("SwiftConnectivitySecurity", &network, "eu-west-1", None).unwrap();
        let broker = BrokerStack::new("MQMessageBroker", &network, &mut security, &key()).unwrap();

        let resource = broker.stack().resource("MQMessageBroker").unwrap();
        let render = |key: &str| resource.property(key).unwrap().render(&LocalResolver);
        assert_eq!(render("BrokerName"), json!("MQMessageBroker"));
        assert_eq!(render("DeploymentMode"), json!("ACTIVE_STANDBY_MULTI_AZ"));
        assert_eq!(render("SubnetIds").as_array().unwrap().len(), 2);
        assert_eq!(
            render("EncryptionOptions"),
            json!({"KmsKeyId": {"Ref": "SwiftConnectivityCMK"}, "UseAwsOwnedKey": false})
        );
        assert!(broker.stack().resource("MQMessageBrokerSecret").is_some());
        assert_eq!(
            broker.arn().render(&LocalResolver),
            json!({"Fn::GetAtt": ["MQMessageBroker", "Arn"]})
        );
    }

    #[test]
    fn test_requires_mq_subnets() {
        let network = network(false);
        let mut security =
            SecurityStack::new("SwiftConnectivitySecurity", &network, "eu-west-1", None).unwrap();
        assert!(matches!(
            BrokerStack::new("MQMessageBroker", &network, &mut security, &key()),
            Err(SynthError::UnknownSubnetGroup(_))
        ));
    }
}
