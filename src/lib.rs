//! AWS infrastructure for SWIFT financial-messaging connectivity
//!
//! This crate declares the SWIFT connectivity topology (VPC, security
//! groups, NACLs, EC2 host groups, RDS, Amazon MQ, IAM roles and VPC
//! endpoints) and synthesizes it into CloudFormation templates: one root
//! stack plus one nested stack per component.

pub mod config;
pub mod domain;
pub mod errors;
pub mod lookup;
pub mod outputs;
pub mod stacks;
pub mod template;

// Re-export commonly used types
pub use config::{Context, Environment, SwiftSettings};
pub use errors::{SynthError, SynthResult};
pub use lookup::{CloudLookup, ContextLookup, ImageQuery};
pub use stacks::{build_app, SwiftTopology};
pub use template::{App, CloudAssembly};

#[cfg(feature = "aws")]
pub use lookup::Ec2Lookup;
