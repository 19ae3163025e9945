// Copyright (c) 2025 - Cowboy AI, Inc.
//! Deployed stack outputs
//!
//! Converts a CloudFormation `describe-stacks` response into the outputs
//! file post-deployment checks read:
//!
//! ```json
//! {"SWIFTMain-us-east-1": {"VPCID": "vpc-0abc", "AMH1InstanceID": "i-0123"}}
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::errors::{SynthError, SynthResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeStacks {
    stacks: Vec<StackDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackDescription {
    stack_name: String,
    #[serde(default)]
    outputs: Vec<StackOutput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StackOutput {
    output_key: String,
    output_value: String,
}

/// `<region>_outputs.json`
pub fn outputs_file_name(region: &str) -> String {
    format!("{region}_outputs.json")
}

/// Extract the outputs of `stack_name`
///
/// # Errors
/// - `UnknownStack` if the response does not describe `stack_name`
/// - `MissingOutput` for the first expected output that is absent
pub fn collect_outputs(
    describe_stacks: &str,
    stack_name: &str,
    expected: &[String],
) -> SynthResult<Value> {
    let response: DescribeStacks = serde_json::from_str(describe_stacks)?;
    let stack = response
        .stacks
        .into_iter()
        .find(|stack| stack.stack_name == stack_name)
        .ok_or_else(|| SynthError::UnknownStack(stack_name.to_string()))?;

    let outputs: Map<String, Value> = stack
        .outputs
        .into_iter()
        .map(|output| (output.output_key, Value::String(output.output_value)))
        .collect();

    if let Some(missing) = expected.iter().find(|key| !outputs.contains_key(*key)) {
        return Err(SynthError::MissingOutput(missing.clone()));
    }
    debug!("Collected {} outputs of {}", outputs.len(), stack_name);

    let mut file = Map::new();
    file.insert(stack_name.to_string(), Value::Object(outputs));
    Ok(Value::Object(file))
}

/// Write the outputs file for `region` into `dir`
pub fn write_outputs(dir: &Path, region: &str, outputs: &Value) -> SynthResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(outputs_file_name(region));
    fs::write(&path, serde_json::to_string_pretty(outputs)?)?;
    info!("Wrote {}", path.display());
    Ok(path)
}
