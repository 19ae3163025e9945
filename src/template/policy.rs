// Copyright (c) 2025 - Cowboy AI, Inc.
//! IAM policy documents

use std::collections::BTreeMap;

use super::expr::{Expr, Pseudo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "Allow",
            Self::Deny => "Deny",
        }
    }
}

/// Who a statement applies to
#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    Service(String),
    /// One or more ARNs
    Arn(Vec<Expr>),
    /// The root of an account
    Account(Expr),
    Any,
}

impl Principal {
    fn to_expr(&self) -> Expr {
        let mut principal = BTreeMap::new();
        match self {
            Self::Service(service) => {
                principal.insert("Service".to_string(), Expr::str(service.clone()));
            }
            Self::Arn(arns) if arns.len() == 1 => {
                principal.insert("AWS".to_string(), arns[0].clone());
            }
            Self::Arn(arns) => {
                principal.insert("AWS".to_string(), Expr::list(arns.iter().cloned()));
            }
            Self::Account(account) => {
                principal.insert(
                    "AWS".to_string(),
                    Expr::concat([
                        "arn:".into(),
                        Pseudo::Partition.into(),
                        ":iam::".into(),
                        account.clone(),
                        ":root".into(),
                    ]),
                );
            }
            Self::Any => return Expr::str("*"),
        }
        Expr::Object(principal)
    }
}

/// One policy statement, built fluently
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStatement {
    sid: Option<String>,
    effect: Effect,
    actions: Vec<String>,
    resources: Vec<Expr>,
    principal: Option<Principal>,
    conditions: BTreeMap<String, BTreeMap<String, Expr>>,
}

impl PolicyStatement {
    pub fn allow() -> Self {
        Self {
            sid: None,
            effect: Effect::Allow,
            actions: Vec::new(),
            resources: Vec::new(),
            principal: None,
            conditions: BTreeMap::new(),
        }
    }

    pub fn sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn effect(mut self, effect: Effect) -> Self {
        self.effect = effect;
        self
    }

    pub fn actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions.extend(actions.into_iter().map(Into::into));
        self
    }

    pub fn resource(mut self, resource: impl Into<Expr>) -> Self {
        self.resources.push(resource.into());
        self
    }

    pub fn resources(mut self, resources: impl IntoIterator<Item = Expr>) -> Self {
        self.resources.extend(resources);
        self
    }

    pub fn principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Add a condition, e.g. `("Bool", "aws:MultiFactorAuthPresent", "true")`
    pub fn condition(
        mut self,
        operator: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<Expr>,
    ) -> Self {
        self.conditions
            .entry(operator.into())
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    pub fn action_list(&self) -> &[String] {
        &self.actions
    }

    pub fn sid_str(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    fn to_expr(&self) -> Expr {
        let mut body = BTreeMap::new();
        if let Some(sid) = &self.sid {
            body.insert("Sid".to_string(), Expr::str(sid.clone()));
        }
        body.insert("Effect".to_string(), Expr::str(self.effect.as_str()));
        if let Some(principal) = &self.principal {
            body.insert("Principal".to_string(), principal.to_expr());
        }
        let actions = self.actions.iter().map(|a| Expr::str(a.clone())).collect();
        body.insert("Action".to_string(), single_or_list(actions));
        if !self.resources.is_empty() {
            body.insert("Resource".to_string(), single_or_list(self.resources.clone()));
        }
        if !self.conditions.is_empty() {
            let conditions = self
                .conditions
                .iter()
                .map(|(operator, entries)| (operator.clone(), Expr::Object(entries.clone())))
                .collect();
            body.insert("Condition".to_string(), Expr::Object(conditions));
        }
        Expr::Object(body)
    }
}

fn single_or_list(mut items: Vec<Expr>) -> Expr {
    if items.len() == 1 {
        items.remove(0)
    } else {
        Expr::List(items)
    }
}

/// `{"Version": "2012-10-17", "Statement": [...]}`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyDocument {
    statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub const VERSION: &'static str = "2012-10-17";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn statement(mut self, statement: PolicyStatement) -> Self {
        self.statements.push(statement);
        self
    }

    pub fn add_statement(&mut self, statement: PolicyStatement) {
        self.statements.push(statement);
    }

    pub fn statements(&self) -> &[PolicyStatement] {
        &self.statements
    }
}

impl From<PolicyDocument> for Expr {
    fn from(document: PolicyDocument) -> Self {
        let mut body = BTreeMap::new();
        body.insert("Version".to_string(), Expr::str(PolicyDocument::VERSION));
        body.insert(
            "Statement".to_string(),
            Expr::list(document.statements.iter().map(PolicyStatement::to_expr)),
        );
        Expr::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::expr::LocalResolver;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_assume_role_document() {
        let document = PolicyDocument::new().statement(
            PolicyStatement::allow()
                .actions(["sts:AssumeRole"])
                .principal(Principal::Service("ec2.amazonaws.com".to_string())),
        );

        assert_eq!(
            Expr::from(document).render(&LocalResolver),
            json!({
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "Service": "ec2.amazonaws.com" },
                    "Action": "sts:AssumeRole"
                }]
            })
        );
    }

    #[test]
    fn test_mfa_condition_and_resources() {
        let statement = PolicyStatement::allow()
            .sid("SSM")
            .actions(["ssm:StartSession", "ssm:TerminateSession"])
            .resource("arn:aws:ec2:*:*:instance/i-1")
            .resource("arn:aws:ec2:*:*:instance/i-2")
            .condition("Bool", "aws:MultiFactorAuthPresent", "true");

        let rendered = Expr::from(PolicyDocument::new().statement(statement)).render(&LocalResolver);
        let first = &rendered["Statement"][0];
        assert_eq!(first["Sid"], json!("SSM"));
        assert_eq!(first["Resource"].as_array().map(Vec::len), Some(2));
        assert_eq!(
            first["Condition"],
            json!({ "Bool": { "aws:MultiFactorAuthPresent": "true" } })
        );
    }

    #[test]
    fn test_any_principal() {
        let statement = PolicyStatement::allow()
            .actions(["s3:GetObject"])
            .principal(Principal::Any);
        let rendered = Expr::from(PolicyDocument::new().statement(statement)).render(&LocalResolver);
        assert_eq!(rendered["Statement"][0]["Principal"], json!("*"));
    }
}
