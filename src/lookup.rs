// Copyright (c) 2025 - Cowboy AI, Inc.
//! Environment lookups resolved at synthesis time
//!
//! Two values cannot be expressed in a template and must be known before
//! synthesis: the ID of the regional S3 prefix list and the latest machine
//! image matching a name pattern. [`ContextLookup`] answers from cached
//! context entries; with the `aws` feature, `Ec2Lookup` asks EC2 directly.

use serde_json::Value;
use tracing::debug;

use crate::config::Context;
use crate::errors::{SynthError, SynthResult};

/// Image search: name pattern plus owning accounts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageQuery {
    pub name_pattern: String,
    pub owners: Vec<String>,
}

impl ImageQuery {
    pub fn new(name_pattern: impl Into<String>, owners: &[&str]) -> Self {
        Self {
            name_pattern: name_pattern.into(),
            owners: owners.iter().map(|o| o.to_string()).collect(),
        }
    }

    /// Context key under which a resolved image is cached
    pub fn cache_key(&self) -> String {
        format!("ami:{}:{}", self.owners.join(","), self.name_pattern)
    }
}

/// Resolves values that live outside the template
pub trait CloudLookup {
    /// ID of the managed prefix list named `name` (wildcards allowed)
    fn prefix_list_id(&self, name: &str) -> SynthResult<String>;

    /// Image ID of the most recently created image matching `query`
    fn latest_image(&self, query: &ImageQuery) -> SynthResult<String>;
}

/// Context key under which a resolved prefix list is cached
pub fn prefix_list_cache_key(name: &str) -> String {
    format!("prefix-list:{name}")
}

/// Answers lookups from cached context values
#[derive(Debug, Clone)]
pub struct ContextLookup {
    context: Context,
}

impl ContextLookup {
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    fn cached(&self, key: &str) -> SynthResult<String> {
        match self.context.get(key) {
            Some(Value::String(value)) if !value.is_empty() => {
                debug!("Lookup {} answered from context", key);
                Ok(value.clone())
            }
            _ => Err(SynthError::LookupFailed(format!(
                "no cached value for {key} in context"
            ))),
        }
    }
}

impl CloudLookup for ContextLookup {
    fn prefix_list_id(&self, name: &str) -> SynthResult<String> {
        self.cached(&prefix_list_cache_key(name))
    }

    fn latest_image(&self, query: &ImageQuery) -> SynthResult<String> {
        self.cached(&query.cache_key())
    }
}

#[cfg(feature = "aws")]
pub use live::Ec2Lookup;

#[cfg(feature = "aws")]
mod live {
    use aws_config::BehaviorVersion;
    use aws_sdk_ec2::types::Filter;
    use aws_sdk_ec2::Client;
    use tokio::runtime::Runtime;
    use tracing::info;

    use super::{CloudLookup, ImageQuery};
    use crate::errors::{SynthError, SynthResult};

    /// Live EC2 lookups driven on a private current-thread runtime
    pub struct Ec2Lookup {
        runtime: Runtime,
        client: Client,
    }

    impl Ec2Lookup {
        pub fn new(region: &str) -> SynthResult<Self> {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;

            let config = runtime.block_on(
                aws_config::defaults(BehaviorVersion::latest())
                    .region(aws_sdk_ec2::config::Region::new(region.to_string()))
                    .load(),
            );

            Ok(Self {
                runtime,
                client: Client::new(&config),
            })
        }
    }

    impl CloudLookup for Ec2Lookup {
        fn prefix_list_id(&self, name: &str) -> SynthResult<String> {
            let response = self
                .runtime
                .block_on(
                    self.client
                        .describe_prefix_lists()
                        .filters(Filter::builder().name("prefix-list-name").values(name).build())
                        .send(),
                )
                .map_err(|e| {
                    SynthError::LookupFailed(format!("describe prefix lists {name}: {e}"))
                })?;

            let id = response
                .prefix_lists()
                .iter()
                .find_map(|list| list.prefix_list_id())
                .ok_or_else(|| SynthError::LookupFailed(format!("no prefix list named {name}")))?;

            info!("Resolved prefix list {} to {}", name, id);
            Ok(id.to_string())
        }

        fn latest_image(&self, query: &ImageQuery) -> SynthResult<String> {
            let mut request = self.client.describe_images().filters(
                Filter::builder()
                    .name("name")
                    .values(&query.name_pattern)
                    .build(),
            );
            for owner in &query.owners {
                request = request.owners(owner);
            }

            let response = self.runtime.block_on(request.send()).map_err(|e| {
                SynthError::LookupFailed(format!("describe images {}: {e}", query.name_pattern))
            })?;

            // ISO-8601 creation dates order lexicographically
            let image = response
                .images()
                .iter()
                .filter(|image| image.image_id().is_some())
                .max_by(|a, b| a.creation_date().cmp(&b.creation_date()))
                .and_then(|image| image.image_id())
                .ok_or_else(|| {
                    SynthError::LookupFailed(format!(
                        "no image matches {} owned by {}",
                        query.name_pattern,
                        query.owners.join(",")
                    ))
                })?;

            info!("Resolved image {} to {}", query.name_pattern, image);
            Ok(image.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_lookup_hits() {
        let query = ImageQuery::new("RHEL-8.3.0_HVM-*", &["309956199498"]);
        let context = Context::new()
            .with(prefix_list_cache_key("com.amazonaws.*.s3"), "pl-6da54004")
            .with(query.cache_key(), "ami-0123456789abcdef0");
        let lookup = ContextLookup::new(context);

        assert_eq!(
            lookup.prefix_list_id("com.amazonaws.*.s3").unwrap(),
            "pl-6da54004"
        );
        assert_eq!(lookup.latest_image(&query).unwrap(), "ami-0123456789abcdef0");
    }

    #[test]
    fn test_context_lookup_miss_fails() {
        let lookup = ContextLookup::new(Context::new().with("prefix-list:other", ""));
        assert!(matches!(
            lookup.prefix_list_id("com.amazonaws.*.s3"),
            Err(SynthError::LookupFailed(_))
        ));
        assert!(matches!(
            lookup.prefix_list_id("other"),
            Err(SynthError::LookupFailed(_))
        ));
    }

    #[test]
    fn test_image_cache_key() {
        let query = ImageQuery::new("RHEL-8.3.0_HVM-????????-x86_64-0-Hourly2-GP2", &["309956199498"]);
        assert_eq!(
            query.cache_key(),
            "ami:309956199498:RHEL-8.3.0_HVM-????????-x86_64-0-Hourly2-GP2"
        );
    }
}
