//! Error types for topology assembly and synthesis

use thiserror::Error;

use crate::domain::{LogicalIdError, NetworkError, ValidationError};

/// Errors that can occur while declaring or synthesizing the topology
#[derive(Debug, Error)]
pub enum SynthError {
    /// Network topology queried or consumed before `generate()`
    #[error("Network not generated: {0}")]
    NotGenerated(String),

    /// Network topology mutated after `generate()`
    #[error("Network already generated: {0}")]
    AlreadyGenerated(String),

    /// Topology declared without any subnet group
    #[error("No subnet groups declared")]
    NoSubnetGroups,

    /// Subnet group declared twice
    #[error("Duplicate subnet group: {0}")]
    DuplicateSubnetGroup(String),

    /// Subnet group never declared
    #[error("Unknown subnet group: {0}")]
    UnknownSubnetGroup(String),

    /// Subnet group queried with the wrong type
    #[error("Subnet group {group} is {actual}, not {expected}")]
    SubnetTypeMismatch {
        group: String,
        expected: String,
        actual: String,
    },

    /// Selection matched no subnet
    #[error("No subnet matches selection: {0}")]
    EmptySelection(String),

    /// Private subnets need NAT gateways, which need a public subnet
    #[error("Private subnet group {0} requires a public subnet group for NAT gateways")]
    NatRequiresPublicSubnet(String),

    /// Security group referenced before it was created
    #[error("Security group not found: {0}")]
    MissingSecurityGroup(String),

    /// Strict creation of a security group that already exists
    #[error("Security group already exists: {0}")]
    SecurityGroupExists(String),

    /// Instance role referenced before it was created
    #[error("Instance role not found: {0}")]
    MissingInstanceRole(String),

    /// Strict creation of an instance role that already exists
    #[error("Instance role already exists: {0}")]
    InstanceRoleExists(String),

    /// NACL referenced before it was created
    #[error("NACL not found: {0}")]
    MissingNacl(String),

    /// Logical ID used twice inside one stack
    #[error("Duplicate resource {logical_id} in stack {stack}")]
    DuplicateResource { stack: String, logical_id: String },

    /// Nested stack id used twice
    #[error("Duplicate stack: {0}")]
    DuplicateStack(String),

    /// Stack name CloudFormation would reject
    #[error("Invalid stack name: {0:?}")]
    InvalidStackName(String),

    /// Reference to a resource its stack does not declare
    #[error("Unknown resource {logical_id} in stack {stack}")]
    UnknownResource { stack: String, logical_id: String },

    /// Reference to a stack the assembly does not contain
    #[error("Unknown stack: {0}")]
    UnknownStack(String),

    /// External lookup (prefix list, image) returned nothing or failed
    #[error("Lookup failed: {0}")]
    LookupFailed(String),

    /// Required environment variable missing or empty
    #[error("Environment variable {0} is not set")]
    MissingEnvironment(String),

    /// Required context value missing
    #[error("Missing context value: {0}")]
    MissingContext(String),

    /// Context value present but unusable
    #[error("Invalid context value {key}: {reason}")]
    InvalidContext { key: String, reason: String },

    /// Deployed stack is missing a declared output
    #[error("Stack output not found: {0}")]
    MissingOutput(String),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    LogicalId(#[from] LogicalIdError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error while writing the assembly
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for topology operations
pub type SynthResult<T> = Result<T, SynthError>;
