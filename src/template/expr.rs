// Copyright (c) 2025 - Cowboy AI, Inc.
//! Template Expressions
//!
//! [`Expr`] is the value language of a template: literals plus the
//! intrinsic functions the topology needs. References to resources are
//! kept symbolic ([`ResourceRef`]) until synthesis, where they are
//! resolved either locally (`Ref` / `Fn::GetAtt`) or through nested-stack
//! parameters.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::LogicalId;
use crate::errors::{SynthError, SynthResult};

/// Name of a stack in the assembly
///
/// Root stacks carry deployable stack names (`SWIFTMain-eu-west-1`), so
/// hyphens are allowed here, unlike in logical IDs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackId(String);

impl StackId {
    /// Maximum stack name length accepted by CloudFormation
    pub const MAX_LENGTH: usize = 128;

    pub fn new(id: impl Into<String>) -> SynthResult<Self> {
        let id = id.into();
        let starts_with_letter = id.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
        let valid_chars = id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');

        if !starts_with_letter || !valid_chars || id.len() > Self::MAX_LENGTH {
            return Err(SynthError::InvalidStackName(id));
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a resource declared in some stack
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    stack: StackId,
    logical_id: LogicalId,
}

impl ResourceRef {
    pub(crate) fn new(stack: StackId, logical_id: LogicalId) -> Self {
        Self { stack, logical_id }
    }

    pub fn stack(&self) -> &StackId {
        &self.stack
    }

    pub fn logical_id(&self) -> &LogicalId {
        &self.logical_id
    }

    /// `Ref` to this resource
    pub fn to_ref(&self) -> Expr {
        Expr::Ref(self.clone())
    }

    /// `Fn::GetAtt` on this resource
    pub fn attr(&self, attribute: impl Into<String>) -> Expr {
        Expr::GetAtt(self.clone(), attribute.into())
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stack, self.logical_id)
    }
}

/// Pseudo parameters provided by CloudFormation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pseudo {
    AccountId,
    Region,
    Partition,
    UrlSuffix,
    StackName,
}

impl Pseudo {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AccountId => "AWS::AccountId",
            Self::Region => "AWS::Region",
            Self::Partition => "AWS::Partition",
            Self::UrlSuffix => "AWS::URLSuffix",
            Self::StackName => "AWS::StackName",
        }
    }
}

/// A template value
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ref(ResourceRef),
    GetAtt(ResourceRef, String),
    /// `Ref` to a template parameter of the same stack
    Parameter(String),
    Pseudo(Pseudo),
    Join(String, Vec<Expr>),
    Select(usize, Box<Expr>),
    GetAzs,
    Base64(Box<Expr>),
    List(Vec<Expr>),
    Object(BTreeMap<String, Expr>),
}

impl Expr {
    pub fn str(value: impl Into<String>) -> Self {
        Self::Literal(Value::String(value.into()))
    }

    pub fn join(delimiter: impl Into<String>, parts: impl IntoIterator<Item = Expr>) -> Self {
        Self::Join(delimiter.into(), parts.into_iter().collect())
    }

    /// `Fn::Join` with an empty delimiter
    pub fn concat(parts: impl IntoIterator<Item = Expr>) -> Self {
        Self::join("", parts)
    }

    /// `Fn::Select [index, Fn::GetAZs ""]`, pins a resource to one AZ of the region
    pub fn select_az(index: usize) -> Self {
        Self::Select(index, Box::new(Self::GetAzs))
    }

    pub fn base64(inner: Expr) -> Self {
        Self::Base64(Box::new(inner))
    }

    pub fn list(items: impl IntoIterator<Item = Expr>) -> Self {
        Self::List(items.into_iter().collect())
    }

    pub fn parameter(name: impl Into<String>) -> Self {
        Self::Parameter(name.into())
    }

    /// Literal string content, if this is a plain string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Literal(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// Every resource reference contained in this expression
    pub fn references(&self) -> Vec<(&ResourceRef, Option<&str>)> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<(&'a ResourceRef, Option<&'a str>)>) {
        match self {
            Self::Ref(target) => out.push((target, None)),
            Self::GetAtt(target, attribute) => out.push((target, Some(attribute.as_str()))),
            Self::Join(_, parts) | Self::List(parts) => {
                parts.iter().for_each(|part| part.collect_references(out))
            }
            Self::Select(_, inner) | Self::Base64(inner) => inner.collect_references(out),
            Self::Object(map) => map.values().for_each(|value| value.collect_references(out)),
            Self::Literal(_) | Self::Parameter(_) | Self::Pseudo(_) | Self::GetAzs => {}
        }
    }

    /// Render to template JSON, resolving references through `resolver`
    pub fn render(&self, resolver: &dyn ReferenceResolver) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Ref(target) => resolver.resolve(target, None),
            Self::GetAtt(target, attribute) => resolver.resolve(target, Some(attribute)),
            Self::Parameter(name) => json!({ "Ref": name }),
            Self::Pseudo(pseudo) => json!({ "Ref": pseudo.name() }),
            Self::Join(delimiter, parts) => {
                let rendered: Vec<Value> = parts.iter().map(|p| p.render(resolver)).collect();
                // Fully literal joins collapse to a plain string
                if rendered.iter().all(Value::is_string) {
                    let joined: Vec<&str> = rendered.iter().filter_map(Value::as_str).collect();
                    Value::String(joined.join(delimiter))
                } else {
                    json!({ "Fn::Join": [delimiter, rendered] })
                }
            }
            Self::Select(index, inner) => {
                json!({ "Fn::Select": [index.to_string(), inner.render(resolver)] })
            }
            Self::GetAzs => json!({ "Fn::GetAZs": "" }),
            Self::Base64(inner) => json!({ "Fn::Base64": inner.render(resolver) }),
            Self::List(items) => Value::Array(items.iter().map(|i| i.render(resolver)).collect()),
            Self::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.render(resolver)))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }
}

/// Resolves resource references while rendering one stack
pub trait ReferenceResolver {
    fn resolve(&self, target: &ResourceRef, attribute: Option<&str>) -> Value;
}

/// Renders every reference as a local `Ref` / `Fn::GetAtt`
pub struct LocalResolver;

impl ReferenceResolver for LocalResolver {
    fn resolve(&self, target: &ResourceRef, attribute: Option<&str>) -> Value {
        local_reference(target, attribute)
    }
}

pub(crate) fn local_reference(target: &ResourceRef, attribute: Option<&str>) -> Value {
    match attribute {
        None => json!({ "Ref": target.logical_id().as_str() }),
        Some(attribute) => json!({ "Fn::GetAtt": [target.logical_id().as_str(), attribute] }),
    }
}

/// Ordered key/value bag used for resource properties and nested objects
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(BTreeMap<String, Expr>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn set_opt<V: Into<Expr>>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.set(key, value),
            None => self,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Expr>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Expr> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Expr)> {
        self.0.iter()
    }
}

impl From<Properties> for Expr {
    fn from(properties: Properties) -> Self {
        Expr::Object(properties.0)
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::str(value)
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Expr::str(value)
    }
}

impl From<&String> for Expr {
    fn from(value: &String) -> Self {
        Expr::str(value.clone())
    }
}

impl From<bool> for Expr {
    fn from(value: bool) -> Self {
        Expr::Literal(Value::Bool(value))
    }
}

impl From<u16> for Expr {
    fn from(value: u16) -> Self {
        Expr::Literal(Value::from(value))
    }
}

impl From<u32> for Expr {
    fn from(value: u32) -> Self {
        Expr::Literal(Value::from(value))
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Literal(Value::from(value))
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Literal(value)
    }
}

impl From<Pseudo> for Expr {
    fn from(pseudo: Pseudo) -> Self {
        Expr::Pseudo(pseudo)
    }
}

impl From<&ResourceRef> for Expr {
    fn from(target: &ResourceRef) -> Self {
        target.to_ref()
    }
}

impl From<ResourceRef> for Expr {
    fn from(target: ResourceRef) -> Self {
        Expr::Ref(target)
    }
}

impl From<Vec<Expr>> for Expr {
    fn from(items: Vec<Expr>) -> Self {
        Expr::List(items)
    }
}

impl From<Vec<&str>> for Expr {
    fn from(items: Vec<&str>) -> Self {
        Expr::List(items.into_iter().map(Expr::from).collect())
    }
}
