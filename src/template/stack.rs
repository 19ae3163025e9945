// Copyright (c) 2025 - Cowboy AI, Inc.
//! Stack: one template under construction

use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::expr::{Expr, Properties, ReferenceResolver, ResourceRef, StackId};
use crate::domain::LogicalId;
use crate::errors::{SynthError, SynthResult};

/// What CloudFormation does with a resource when it leaves the template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionPolicy {
    Delete,
    Retain,
    Snapshot,
}

impl DeletionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "Delete",
            Self::Retain => "Retain",
            Self::Snapshot => "Snapshot",
        }
    }
}

/// A declared resource
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    resource_type: String,
    properties: Properties,
    depends_on: BTreeSet<LogicalId>,
    deletion_policy: Option<DeletionPolicy>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, properties: Properties) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties,
            depends_on: BTreeSet::new(),
            deletion_policy: None,
        }
    }

    /// Explicit ordering on a resource of the same stack
    pub fn depends_on(mut self, target: &ResourceRef) -> Self {
        self.depends_on.insert(target.logical_id().clone());
        self
    }

    /// Sets both `DeletionPolicy` and `UpdateReplacePolicy`
    pub fn deletion_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&Expr> {
        self.properties.get(key)
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &LogicalId> {
        self.depends_on.iter()
    }

    pub fn policy(&self) -> Option<DeletionPolicy> {
        self.deletion_policy
    }

    fn render(&self, resolver: &dyn ReferenceResolver) -> Value {
        let mut body = Map::new();
        body.insert("Type".to_string(), json!(self.resource_type));
        if !self.properties.is_empty() {
            body.insert(
                "Properties".to_string(),
                Expr::from(self.properties.clone()).render(resolver),
            );
        }
        if !self.depends_on.is_empty() {
            let ids: Vec<&str> = self.depends_on.iter().map(LogicalId::as_str).collect();
            body.insert("DependsOn".to_string(), json!(ids));
        }
        if let Some(policy) = self.deletion_policy {
            body.insert("DeletionPolicy".to_string(), json!(policy.as_str()));
            body.insert("UpdateReplacePolicy".to_string(), json!(policy.as_str()));
        }
        Value::Object(body)
    }
}

/// Template parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub param_type: String,
    pub default: Option<String>,
    pub description: Option<String>,
}

impl Parameter {
    pub fn string() -> Self {
        Self {
            param_type: "String".to_string(),
            default: None,
            description: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn render(&self) -> Value {
        let mut body = Map::new();
        body.insert("Type".to_string(), json!(self.param_type));
        if let Some(default) = &self.default {
            body.insert("Default".to_string(), json!(default));
        }
        if let Some(description) = &self.description {
            body.insert("Description".to_string(), json!(description));
        }
        Value::Object(body)
    }
}

/// Template output
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub value: Expr,
    pub description: Option<String>,
}

/// One template: resources, parameters and outputs keyed by name
#[derive(Debug, Clone)]
pub struct Stack {
    id: StackId,
    description: Option<String>,
    parameters: BTreeMap<String, Parameter>,
    resources: BTreeMap<LogicalId, Resource>,
    outputs: BTreeMap<String, Output>,
}

impl Stack {
    pub fn new(id: impl Into<String>) -> SynthResult<Self> {
        Ok(Self {
            id: StackId::new(id)?,
            description: None,
            parameters: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn id(&self) -> &StackId {
        &self.id
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Declare a resource
    ///
    /// # Invariant
    /// - Logical IDs are unique within the stack
    pub fn add_resource(&mut self, logical_id: &str, resource: Resource) -> SynthResult<ResourceRef> {
        let logical_id = LogicalId::new(logical_id)?;
        if self.resources.contains_key(&logical_id) {
            return Err(SynthError::DuplicateResource {
                stack: self.id.to_string(),
                logical_id: logical_id.to_string(),
            });
        }

        debug!(
            "Declared {} {} in stack {}",
            resource.resource_type(),
            logical_id,
            self.id
        );
        self.resources.insert(logical_id.clone(), resource);
        Ok(ResourceRef::new(self.id.clone(), logical_id))
    }

    pub fn add_parameter(&mut self, name: impl Into<String>, parameter: Parameter) {
        self.parameters.insert(name.into(), parameter);
    }

    pub fn add_output(
        &mut self,
        name: &str,
        value: impl Into<Expr>,
        description: Option<&str>,
    ) -> SynthResult<()> {
        let name = LogicalId::new(name)?.to_string();
        if self.outputs.contains_key(&name) {
            return Err(SynthError::DuplicateResource {
                stack: self.id.to_string(),
                logical_id: name,
            });
        }
        self.outputs.insert(
            name,
            Output {
                value: value.into(),
                description: description.map(str::to_string),
            },
        );
        Ok(())
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        LogicalId::new(logical_id)
            .ok()
            .and_then(|id| self.resources.get(&id))
    }

    pub fn contains(&self, logical_id: &LogicalId) -> bool {
        self.resources.contains_key(logical_id)
    }

    pub fn resources(&self) -> impl Iterator<Item = (&LogicalId, &Resource)> {
        self.resources.iter()
    }

    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a LogicalId, &'a Resource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, resource)| resource.resource_type() == resource_type)
    }

    pub fn count_of_type(&self, resource_type: &str) -> usize {
        self.resources_of_type(resource_type).count()
    }

    pub fn parameters(&self) -> &BTreeMap<String, Parameter> {
        &self.parameters
    }

    pub fn outputs(&self) -> &BTreeMap<String, Output> {
        &self.outputs
    }

    /// Every expression of the stack, for reference scanning
    pub(crate) fn expressions(&self) -> impl Iterator<Item = Expr> + '_ {
        self.resources
            .values()
            .map(|resource| Expr::from(resource.properties.clone()))
            .chain(self.outputs.values().map(|output| output.value.clone()))
    }

    /// Render the template body
    ///
    /// `extra_parameters` and `extra_outputs` carry the nested-stack wiring
    /// computed during synthesis.
    pub(crate) fn render(
        &self,
        resolver: &dyn ReferenceResolver,
        extra_parameters: &BTreeMap<String, Parameter>,
        extra_resources: &BTreeMap<String, Value>,
        extra_outputs: &BTreeMap<String, Value>,
    ) -> Value {
        let mut template = Map::new();
        template.insert("AWSTemplateFormatVersion".to_string(), json!("2010-09-09"));
        if let Some(description) = &self.description {
            template.insert("Description".to_string(), json!(description));
        }

        let parameters: Map<String, Value> = self
            .parameters
            .iter()
            .chain(extra_parameters.iter())
            .map(|(name, parameter)| (name.clone(), parameter.render()))
            .collect();
        if !parameters.is_empty() {
            template.insert("Parameters".to_string(), Value::Object(parameters));
        }

        let mut resources: Map<String, Value> = self
            .resources
            .iter()
            .map(|(id, resource)| (id.to_string(), resource.render(resolver)))
            .collect();
        resources.extend(extra_resources.iter().map(|(k, v)| (k.clone(), v.clone())));
        template.insert("Resources".to_string(), Value::Object(resources));

        let mut outputs: Map<String, Value> = self
            .outputs
            .iter()
            .map(|(name, output)| {
                let mut body = Map::new();
                body.insert("Value".to_string(), output.value.render(resolver));
                if let Some(description) = &output.description {
                    body.insert("Description".to_string(), json!(description));
                }
                (name.clone(), Value::Object(body))
            })
            .collect();
        outputs.extend(extra_outputs.iter().map(|(k, v)| (k.clone(), v.clone())));
        if !outputs.is_empty() {
            template.insert("Outputs".to_string(), Value::Object(outputs));
        }

        Value::Object(template)
    }
}
