// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for swift-infrastructure
//!
//! Deterministic environments and contexts. Every lookup a synthesis needs
//! is answered from cached context values, so no test touches the network.

#![allow(dead_code)]

use swift_infrastructure::lookup::{prefix_list_cache_key, ImageQuery};
use swift_infrastructure::stacks::host_group::{IMAGE_NAME_PATTERN, IMAGE_OWNER};
use swift_infrastructure::stacks::swift_security::S3_PREFIX_LIST;
use swift_infrastructure::{Context, ContextLookup, Environment, SwiftSettings};

pub const ACCOUNT: &str = "123456789012";
pub const REGION: &str = "us-east-1";
pub const ROOT_STACK: &str = "SWIFTMain-us-east-1";

pub const S3_PREFIX_LIST_ID: &str = "pl-63a5400a";
pub const LATEST_IMAGE_ID: &str = "ami-0b0af3577fe5e3532";
pub const QS_BUCKET: &str = "aws-quickstart";

pub fn environment() -> Environment {
    Environment::new(ACCOUNT, REGION).unwrap()
}

/// Context with both lookups cached and the quick-start bucket set
pub fn context() -> Context {
    Context::new()
        .with(prefix_list_cache_key(S3_PREFIX_LIST), S3_PREFIX_LIST_ID)
        .with(
            ImageQuery::new(IMAGE_NAME_PATTERN, &[IMAGE_OWNER]).cache_key(),
            LATEST_IMAGE_ID,
        )
        .with("qs_s3_bucket", QS_BUCKET)
}

/// Context pinning both images, so no image lookup happens
pub fn context_with_images() -> Context {
    context()
        .with("sagsnl_ami", "ami-0sagsnl00000000")
        .with("amh_ami", "ami-0amh0000000000")
}

pub fn settings(context: &Context) -> SwiftSettings {
    SwiftSettings::from_context(context).unwrap()
}

pub fn lookup(context: &Context) -> ContextLookup {
    ContextLookup::new(context.clone())
}
