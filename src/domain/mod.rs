// Copyright (c) 2025 - Cowboy AI, Inc.
//! Topology Domain Models
//!
//! Value objects with validation invariants used while the SWIFT topology
//! is declared.
//!
//! # Value Objects with Invariants
//!
//! - [`Ipv4Cidr`] - IPv4 networks with host bits clear
//! - [`CidrAllocator`] - Sequential, aligned subnet carving
//! - [`LogicalId`] - CloudFormation logical IDs
//! - [`SwiftComponent`] - SWIFT component taxonomy

pub mod component;
pub mod invariants;
pub mod logical_id;
pub mod network;

pub use component::{SwiftComponent, UnknownComponent};
pub use invariants::{ValidationError, ValidationResult};
pub use logical_id::{LogicalId, LogicalIdError};
pub use network::{CidrAllocator, Ipv4Cidr, NetworkError};
