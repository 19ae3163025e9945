// Copyright (c) 2025 - Cowboy AI, Inc.
//! SWIFT Component Taxonomy
//!
//! Names the logical SWIFT connectivity components deployed in the VPC.
//! Security groups, NACLs, instance roles and subnet groups are all keyed
//! by these names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown SWIFT component: {0}")]
pub struct UnknownComponent(pub String);

/// SWIFT connectivity component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SwiftComponent {
    /// Alliance Access
    #[serde(rename = "SAA")]
    Saa,
    /// Alliance Gateway with SWIFTNet Link (message gateway)
    #[serde(rename = "SAGSNL")]
    Sagsnl,
    /// Alliance Messaging Hub (message handler)
    #[serde(rename = "AMH")]
    Amh,
}

impl SwiftComponent {
    /// Components that run as redundant EC2 host groups
    pub const WORKLOADS: [SwiftComponent; 2] = [SwiftComponent::Sagsnl, SwiftComponent::Amh];

    /// Get the canonical name (also the subnet group name)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Saa => "SAA",
            Self::Sagsnl => "SAGSNL",
            Self::Amh => "AMH",
        }
    }

    /// Get human-readable display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Saa => "Alliance Access",
            Self::Sagsnl => "Alliance Gateway / SWIFTNet Link",
            Self::Amh => "Alliance Messaging Hub",
        }
    }

    /// Name of the component's security group (`SAGSNLSG`)
    pub fn security_group_name(&self) -> String {
        format!("{}SG", self.as_str())
    }

    /// Name of the component's NACL (`SAGSNLNACL`)
    pub fn nacl_name(&self) -> String {
        format!("{}NACL", self.as_str())
    }

    /// Host group id for the `index`-th (1-based) instance (`AMH2`)
    pub fn unit_id(&self, index: usize) -> String {
        format!("{}{}", self.as_str(), index)
    }
}

impl fmt::Display for SwiftComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SwiftComponent {
    type Err = UnknownComponent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SAA" => Ok(Self::Saa),
            "SAGSNL" => Ok(Self::Sagsnl),
            "AMH" => Ok(Self::Amh),
            _ => Err(UnknownComponent(s.to_string())),
        }
    }
}

impl AsRef<str> for SwiftComponent {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
