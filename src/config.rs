// Copyright (c) 2025 - Cowboy AI, Inc.
//! Deployment configuration
//!
//! Three layers feed a synthesis run:
//!
//! - [`Environment`]: target account and region from `CDK_DEFAULT_ACCOUNT`
//!   and `CDK_DEFAULT_REGION`
//! - [`Context`]: free-form key/value map loaded from a `cdk.json` style
//!   file and overlaid with `--context key=value` flags
//! - [`SwiftSettings`]: the typed view of the context the topology reads

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::Path;
use tracing::{debug, warn};

use crate::domain::Ipv4Cidr;
use crate::errors::{SynthError, SynthResult};
use crate::template::AssetLocation;

pub const ACCOUNT_VAR: &str = "CDK_DEFAULT_ACCOUNT";
pub const REGION_VAR: &str = "CDK_DEFAULT_REGION";

const DEFAULT_VPC_CIDR: Ipv4Cidr = Ipv4Cidr::aligned(Ipv4Addr::new(10, 10, 0, 0), 16);
const DEFAULT_SWIFT_IP_RANGE: Ipv4Cidr = Ipv4Cidr::aligned(Ipv4Addr::new(149, 134, 0, 0), 16);
const DEFAULT_HSM_IP: Ipv4Cidr = Ipv4Cidr::aligned(Ipv4Addr::new(10, 20, 1, 10), 32);
const DEFAULT_WORKSTATION_IP_RANGE: Ipv4Cidr = Ipv4Cidr::aligned(Ipv4Addr::new(10, 1, 0, 0), 16);

/// Target account and region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub account: String,
    pub region: String,
}

impl Environment {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> SynthResult<Self> {
        let account = account.into();
        let region = region.into();
        if account.trim().is_empty() {
            return Err(SynthError::MissingEnvironment(ACCOUNT_VAR.to_string()));
        }
        if region.trim().is_empty() {
            return Err(SynthError::MissingEnvironment(REGION_VAR.to_string()));
        }
        Ok(Self { account, region })
    }

    /// Read both variables from the process environment
    pub fn from_env() -> SynthResult<Self> {
        let read = |name: &str| {
            std::env::var(name).map_err(|_| SynthError::MissingEnvironment(name.to_string()))
        };
        Self::new(read(ACCOUNT_VAR)?, read(REGION_VAR)?)
    }

    /// Name of the deployable root stack
    pub fn root_stack_name(&self) -> String {
        format!("SWIFTMain-{}", self.region)
    }
}

#[derive(Debug, Deserialize)]
struct ContextFile {
    #[serde(default)]
    context: BTreeMap<String, Value>,
}

/// Key/value context map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    values: BTreeMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `{"context": {...}}`; other top-level keys are ignored
    pub fn from_json_str(json: &str) -> SynthResult<Self> {
        let file: ContextFile = serde_json::from_str(json)?;
        Ok(Self {
            values: file.context,
        })
    }

    pub fn from_file(path: &Path) -> SynthResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let context = Self::from_json_str(&raw)?;
        debug!(
            "Loaded {} context values from {}",
            context.values.len(),
            path.display()
        );
        Ok(context)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Apply one `key=value` override; the value is kept as a string
    pub fn apply_override(&mut self, assignment: &str) -> SynthResult<()> {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| SynthError::InvalidContext {
                key: assignment.to_string(),
                reason: "expected key=value".to_string(),
            })?;
        if key.is_empty() {
            return Err(SynthError::InvalidContext {
                key: assignment.to_string(),
                reason: "empty key".to_string(),
            });
        }
        self.set(key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String form of a value; `null` and empty strings count as absent
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Only `"true"` and JSON `true` enable a flag
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(Value::Bool(true)))
            || matches!(self.values.get(key), Some(Value::String(s)) if s == "true")
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Typed settings for one SWIFT deployment
#[derive(Debug, Clone, PartialEq)]
pub struct SwiftSettings {
    pub vpc_cidr: Ipv4Cidr,
    /// SWIFT network range reached over the VPN
    pub swift_ip_range: Ipv4Cidr,
    pub hsm_ip: Ipv4Cidr,
    pub workstation_ip_range: Ipv4Cidr,
    pub sagsnl_ami: Option<String>,
    pub amh_ami: Option<String>,
    pub sagsnl_ips: [Option<Ipv4Addr>; 2],
    pub qs_s3_bucket: Option<String>,
    pub skip_oracle: bool,
    pub create_sample_iam_role: bool,
    pub assets: AssetLocation,
}

impl Default for SwiftSettings {
    fn default() -> Self {
        Self {
            vpc_cidr: DEFAULT_VPC_CIDR,
            swift_ip_range: DEFAULT_SWIFT_IP_RANGE,
            hsm_ip: DEFAULT_HSM_IP,
            workstation_ip_range: DEFAULT_WORKSTATION_IP_RANGE,
            sagsnl_ami: None,
            amh_ami: None,
            sagsnl_ips: [None, None],
            qs_s3_bucket: None,
            skip_oracle: false,
            create_sample_iam_role: false,
            assets: AssetLocation::default(),
        }
    }
}

impl SwiftSettings {
    pub fn from_context(context: &Context) -> SynthResult<Self> {
        let defaults = Self::default();

        let cidr = |key: &str, default: Ipv4Cidr| -> SynthResult<Ipv4Cidr> {
            match context.get_str(key) {
                Some(raw) => Ipv4Cidr::new(&raw).map_err(|e| SynthError::InvalidContext {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
                None => Ok(default),
            }
        };

        let ip = |key: &str| -> SynthResult<Option<Ipv4Addr>> {
            context
                .get_str(key)
                .map(|raw| {
                    raw.parse::<Ipv4Addr>().map_err(|e| SynthError::InvalidContext {
                        key: key.to_string(),
                        reason: e.to_string(),
                    })
                })
                .transpose()
        };

        let ami = |key: &str| {
            let value = context.get_str(key);
            if value.is_none() {
                warn!("No {} in context, the latest matching image will be looked up", key);
            }
            value
        };

        let mut assets = defaults.assets.clone();
        if let Some(bucket) = context.get_str("asset_bucket") {
            assets.bucket = bucket;
        }
        if let Some(prefix) = context.get_str("asset_prefix") {
            assets.prefix = prefix;
        }

        Ok(Self {
            vpc_cidr: cidr("vpc_cidr", defaults.vpc_cidr)?,
            swift_ip_range: cidr("swift_ip_range", defaults.swift_ip_range)?,
            hsm_ip: cidr("hsm_ip", defaults.hsm_ip)?,
            workstation_ip_range: cidr("workstation_ip_range", defaults.workstation_ip_range)?,
            sagsnl_ami: ami("sagsnl_ami"),
            amh_ami: ami("amh_ami"),
            sagsnl_ips: [ip("sagsnl1_ip")?, ip("sagsnl2_ip")?],
            qs_s3_bucket: context.get_str("qs_s3_bucket"),
            skip_oracle: context.flag("skip_oracle"),
            create_sample_iam_role: context.flag("create_sample_iam_role"),
            assets,
        })
    }

    /// Quick-start bucket name, required by instance roles and the S3 endpoint
    pub fn qs_s3_bucket(&self) -> SynthResult<&str> {
        self.qs_s3_bucket
            .as_deref()
            .ok_or_else(|| SynthError::MissingContext("qs_s3_bucket".to_string()))
    }

    /// Static IP of the `unit`-th gateway (1-based)
    pub fn sagsnl_ip(&self, unit: usize) -> Option<Ipv4Addr> {
        unit.checked_sub(1)
            .and_then(|i| self.sagsnl_ips.get(i).copied().flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_environment_requires_both_values() {
        assert!(Environment::new("123456789012", "eu-west-1").is_ok());
        assert!(matches!(
            Environment::new("", "eu-west-1"),
            Err(SynthError::MissingEnvironment(var)) if var == ACCOUNT_VAR
        ));
        assert!(matches!(
            Environment::new("123456789012", " "),
            Err(SynthError::MissingEnvironment(var)) if var == REGION_VAR
        ));
    }

    #[test]
    fn test_root_stack_name() {
        let env = Environment::new("123456789012", "us-east-1").unwrap();
        assert_eq!(env.root_stack_name(), "SWIFTMain-us-east-1");
    }

    #[test]
    fn test_context_file_and_overrides() {
        let mut context = Context::from_json_str(
            r#"{"app": "python3 app.py", "context": {"vpc_cidr": "10.10.0.0/16", "skip_oracle": "false"}}"#,
        )
        .unwrap();
        context.apply_override("skip_oracle=true").unwrap();
        context.apply_override("qs_s3_bucket=aws-quickstart").unwrap();

        assert!(context.flag("skip_oracle"));
        assert_eq!(context.get_str("qs_s3_bucket").as_deref(), Some("aws-quickstart"));
        assert!(context.apply_override("no-equals").is_err());
    }

    #[test]
    fn test_flags_accept_only_true() {
        let context = Context::new()
            .with("a", true)
            .with("b", "true")
            .with("c", "True")
            .with("d", "yes");
        assert!(context.flag("a"));
        assert!(context.flag("b"));
        assert!(!context.flag("c"));
        assert!(!context.flag("d"));
        assert!(!context.flag("missing"));
    }

    #[test]
    fn test_settings_defaults() {
        let settings = SwiftSettings::from_context(&Context::new()).unwrap();
        assert_eq!(settings.vpc_cidr.to_string(), "10.10.0.0/16");
        assert_eq!(settings.swift_ip_range.to_string(), "149.134.0.0/16");
        assert_eq!(settings.hsm_ip.to_string(), "10.20.1.10/32");
        assert_eq!(settings.workstation_ip_range.to_string(), "10.1.0.0/16");
        assert_eq!(settings.sagsnl_ami, None);
        assert!(!settings.skip_oracle);
        assert!(matches!(
            settings.qs_s3_bucket(),
            Err(SynthError::MissingContext(_))
        ));
    }

    #[test]
    fn test_settings_from_context() {
        let context = Context::new()
            .with("vpc_cidr", "10.50.0.0/16")
            .with("sagsnl_ami", "")
            .with("amh_ami", "ami-0123456789abcdef0")
            .with("sagsnl1_ip", "10.50.0.10")
            .with("create_sample_iam_role", "true")
            .with("asset_bucket", json!("my-assets"));

        let settings = SwiftSettings::from_context(&context).unwrap();
        assert_eq!(settings.vpc_cidr.to_string(), "10.50.0.0/16");
        assert_eq!(settings.sagsnl_ami, None);
        assert_eq!(settings.amh_ami.as_deref(), Some("ami-0123456789abcdef0"));
        assert_eq!(settings.sagsnl_ip(1), Some(Ipv4Addr::new(10, 50, 0, 10)));
        assert_eq!(settings.sagsnl_ip(2), None);
        assert_eq!(settings.sagsnl_ip(0), None);
        assert!(settings.create_sample_iam_role);
        assert_eq!(settings.assets.bucket, "my-assets");
    }

    #[test]
    fn test_invalid_context_values() {
        let bad_cidr = Context::new().with("hsm_ip", "10.20.1.10/33");
        assert!(matches!(
            SwiftSettings::from_context(&bad_cidr),
            Err(SynthError::InvalidContext { key, .. }) if key == "hsm_ip"
        ));

        let bad_ip = Context::new().with("sagsnl2_ip", "10.10.0");
        assert!(matches!(
            SwiftSettings::from_context(&bad_ip),
            Err(SynthError::InvalidContext { key, .. }) if key == "sagsnl2_ip"
        ));
    }
}
