// Copyright (c) 2025 - Cowboy AI, Inc.
//! Assembly Synthesis
//!
//! Turns one root [`Stack`] plus its nested stacks into CloudFormation
//! templates. Every reference that crosses a stack boundary is rewritten:
//!
//! - nested consumer, any producer: a `String` parameter on the consumer,
//!   fed by the consumer's `AWS::CloudFormation::Stack` resource in the root
//! - nested producer: an output on the producer, read in the root with
//!   `Fn::GetAtt [<Producer>NestedStack, Outputs.<Export>]`
//!
//! Template ordering and naming are deterministic, so two runs over the
//! same declarations produce byte-identical files.

use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::expr::{local_reference, Expr, Pseudo, ReferenceResolver, ResourceRef, StackId};
use super::stack::{Parameter, Stack};
use crate::domain::LogicalId;
use crate::errors::{SynthError, SynthResult};

/// Root parameter naming the bucket nested templates are uploaded to
pub const ASSET_BUCKET_PARAMETER: &str = "AssetBucket";
/// Root parameter naming the key prefix inside the asset bucket
pub const ASSET_PREFIX_PARAMETER: &str = "AssetPrefix";

/// Where nested templates are published before deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLocation {
    pub bucket: String,
    pub prefix: String,
}

impl Default for AssetLocation {
    fn default() -> Self {
        Self {
            bucket: "swift-connectivity-assets".to_string(),
            prefix: String::new(),
        }
    }
}

/// Root stack plus nested stacks, in declaration order
#[derive(Debug, Clone)]
pub struct App {
    root: Stack,
    nested: Vec<Stack>,
    assets: AssetLocation,
}

impl App {
    pub fn new(root: Stack, assets: AssetLocation) -> Self {
        Self {
            root,
            nested: Vec::new(),
            assets,
        }
    }

    pub fn root(&self) -> &Stack {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Stack {
        &mut self.root
    }

    pub fn add_nested(&mut self, stack: Stack) -> SynthResult<()> {
        if stack.id() == self.root.id() || self.nested(stack.id().as_str()).is_some() {
            return Err(SynthError::DuplicateStack(stack.id().to_string()));
        }
        debug!("Registered nested stack {}", stack.id());
        self.nested.push(stack);
        Ok(())
    }

    pub fn nested(&self, id: &str) -> Option<&Stack> {
        self.nested.iter().find(|stack| stack.id().as_str() == id)
    }

    pub fn nested_stacks(&self) -> &[Stack] {
        &self.nested
    }

    fn stack(&self, id: &StackId) -> Option<&Stack> {
        if self.root.id() == id {
            Some(&self.root)
        } else {
            self.nested.iter().find(|stack| stack.id() == id)
        }
    }

    /// Logical ID of a nested stack's `AWS::CloudFormation::Stack` resource
    pub fn nested_resource_id(stack: &StackId) -> SynthResult<LogicalId> {
        Ok(LogicalId::sanitized([stack.as_str(), "NestedStack"])?)
    }

    pub fn root_template_file(&self) -> String {
        format!("{}.template.json", self.root.id())
    }

    pub fn nested_template_file(&self, stack: &StackId) -> String {
        format!("{}.{}.nested.template.json", self.root.id(), stack)
    }

    /// Produce the templates and manifest
    ///
    /// # Errors
    /// - `UnknownStack` / `UnknownResource` for a reference to something
    ///   the assembly never declared
    pub fn synthesize(&self) -> SynthResult<CloudAssembly> {
        let wiring = self.wire()?;
        let root_id = self.root.id();

        let mut templates = BTreeMap::new();
        let mut nested_entries = Vec::new();

        for stack in &self.nested {
            let resolver = CrossStackResolver {
                current: stack.id(),
                root: root_id,
            };
            let plan = wiring.get(stack.id());
            let template = stack.render(
                &resolver,
                &plan.map(|p| p.parameters.clone()).unwrap_or_default(),
                &BTreeMap::new(),
                &plan.map(|p| p.outputs.clone()).unwrap_or_default(),
            );
            let file = self.nested_template_file(stack.id());
            nested_entries.push(json!({
                "stack": stack.id().as_str(),
                "logicalId": Self::nested_resource_id(stack.id())?.as_str(),
                "template": file,
            }));
            templates.insert(file, template);
        }

        let root_template = self.render_root(&wiring)?;
        templates.insert(self.root_template_file(), root_template);

        let manifest = json!({
            "version": "1.0",
            "root": {
                "stack": root_id.as_str(),
                "template": self.root_template_file(),
            },
            "nested": nested_entries,
            "assets": {
                "bucket": self.assets.bucket,
                "prefix": self.assets.prefix,
            },
        });

        info!(
            "Synthesized {} with {} nested stacks",
            root_id,
            self.nested.len()
        );

        Ok(CloudAssembly {
            root_template_file: self.root_template_file(),
            templates,
            manifest,
        })
    }

    /// Compute parameters and outputs for every cross-stack reference
    fn wire(&self) -> SynthResult<BTreeMap<StackId, Wiring>> {
        let root_id = self.root.id();
        let mut wiring: BTreeMap<StackId, Wiring> = BTreeMap::new();

        for consumer in std::iter::once(&self.root).chain(self.nested.iter()) {
            self.check_dependencies(consumer)?;

            for expr in consumer.expressions() {
                for (target, attribute) in expr.references() {
                    let producer = self
                        .stack(target.stack())
                        .ok_or_else(|| SynthError::UnknownStack(target.stack().to_string()))?;
                    if !producer.contains(target.logical_id()) {
                        return Err(SynthError::UnknownResource {
                            stack: target.stack().to_string(),
                            logical_id: target.logical_id().to_string(),
                        });
                    }
                    if target.stack() == consumer.id() {
                        continue;
                    }

                    let export = export_name(target, attribute)?;
                    if producer.id() != root_id {
                        wiring
                            .entry(producer.id().clone())
                            .or_default()
                            .outputs
                            .insert(
                                export.clone(),
                                json!({ "Value": local_reference(target, attribute) }),
                            );
                    }

                    if consumer.id() != root_id {
                        let parameter = parameter_name(target.stack(), &export)?;
                        let value = if producer.id() == root_id {
                            local_reference(target, attribute)
                        } else {
                            nested_output(producer.id(), &export)?
                        };
                        let plan = wiring.entry(consumer.id().clone()).or_default();
                        plan.parameters.insert(parameter.clone(), Parameter::string());
                        plan.parameter_values.insert(parameter, value);
                    }
                }
            }
        }

        Ok(wiring)
    }

    fn check_dependencies(&self, stack: &Stack) -> SynthResult<()> {
        for (id, resource) in stack.resources() {
            if let Some(missing) = resource.dependencies().find(|dep| !stack.contains(dep)) {
                return Err(SynthError::UnknownResource {
                    stack: stack.id().to_string(),
                    logical_id: format!("{missing} (dependency of {id})"),
                });
            }
        }
        Ok(())
    }

    fn render_root(&self, wiring: &BTreeMap<StackId, Wiring>) -> SynthResult<Value> {
        let root_id = self.root.id();

        let mut parameters = BTreeMap::new();
        parameters.insert(
            ASSET_BUCKET_PARAMETER.to_string(),
            Parameter::string()
                .with_default(self.assets.bucket.clone())
                .with_description("S3 bucket holding the nested stack templates"),
        );
        parameters.insert(
            ASSET_PREFIX_PARAMETER.to_string(),
            Parameter::string()
                .with_default(self.assets.prefix.clone())
                .with_description("Key prefix of the nested stack templates"),
        );

        let resolver = CrossStackResolver {
            current: root_id,
            root: root_id,
        };

        let mut nested_resources = BTreeMap::new();
        for stack in &self.nested {
            let mut properties = Map::new();
            properties.insert(
                "TemplateURL".to_string(),
                self.template_url(stack.id()).render(&resolver),
            );
            if let Some(plan) = wiring.get(stack.id()) {
                if !plan.parameter_values.is_empty() {
                    let values: Map<String, Value> = plan
                        .parameter_values
                        .iter()
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    properties.insert("Parameters".to_string(), Value::Object(values));
                }
            }

            let logical_id = Self::nested_resource_id(stack.id())?;
            if self.root.contains(&logical_id) {
                return Err(SynthError::DuplicateResource {
                    stack: root_id.to_string(),
                    logical_id: logical_id.to_string(),
                });
            }
            nested_resources.insert(
                logical_id.to_string(),
                json!({
                    "Type": "AWS::CloudFormation::Stack",
                    "Properties": properties,
                    "DeletionPolicy": "Delete",
                    "UpdateReplacePolicy": "Delete",
                }),
            );
        }

        Ok(self
            .root
            .render(&resolver, &parameters, &nested_resources, &BTreeMap::new()))
    }

    fn template_url(&self, stack: &StackId) -> Expr {
        Expr::concat([
            "https://".into(),
            Expr::parameter(ASSET_BUCKET_PARAMETER),
            ".s3.".into(),
            Pseudo::Region.into(),
            ".".into(),
            Pseudo::UrlSuffix.into(),
            "/".into(),
            Expr::parameter(ASSET_PREFIX_PARAMETER),
            self.nested_template_file(stack).into(),
        ])
    }
}

/// Per-stack wiring produced by the reference scan
#[derive(Debug, Default)]
struct Wiring {
    parameters: BTreeMap<String, Parameter>,
    /// Values the root passes for `parameters`
    parameter_values: BTreeMap<String, Value>,
    outputs: BTreeMap<String, Value>,
}

fn export_name(target: &ResourceRef, attribute: Option<&str>) -> SynthResult<String> {
    let suffix = attribute.unwrap_or("Ref");
    Ok(LogicalId::sanitized([target.logical_id().as_str(), suffix])?.to_string())
}

fn parameter_name(producer: &StackId, export: &str) -> SynthResult<String> {
    Ok(LogicalId::sanitized([producer.as_str(), export])?.to_string())
}

fn nested_output(producer: &StackId, export: &str) -> SynthResult<Value> {
    let nested = App::nested_resource_id(producer)?;
    Ok(json!({ "Fn::GetAtt": [nested.as_str(), format!("Outputs.{export}")] }))
}

/// Resolves references while rendering one stack of the assembly
struct CrossStackResolver<'a> {
    current: &'a StackId,
    root: &'a StackId,
}

impl ReferenceResolver for CrossStackResolver<'_> {
    fn resolve(&self, target: &ResourceRef, attribute: Option<&str>) -> Value {
        if target.stack() == self.current {
            return local_reference(target, attribute);
        }

        // Names were validated by App::wire before rendering started
        let export = export_name(target, attribute).unwrap_or_default();
        if self.current == self.root {
            nested_output(target.stack(), &export).unwrap_or(Value::Null)
        } else {
            let parameter = parameter_name(target.stack(), &export).unwrap_or_default();
            json!({ "Ref": parameter })
        }
    }
}

/// Synthesized templates ready to be written out
#[derive(Debug, Clone)]
pub struct CloudAssembly {
    root_template_file: String,
    templates: BTreeMap<String, Value>,
    manifest: Value,
}

impl CloudAssembly {
    pub fn root_template(&self) -> Option<&Value> {
        self.templates.get(&self.root_template_file)
    }

    pub fn root_template_file(&self) -> &str {
        &self.root_template_file
    }

    pub fn template(&self, file: &str) -> Option<&Value> {
        self.templates.get(file)
    }

    pub fn templates(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.templates.iter()
    }

    pub fn manifest(&self) -> &Value {
        &self.manifest
    }

    /// Write every template plus `manifest.json` into `dir`
    pub fn write_to(&self, dir: &Path) -> SynthResult<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let mut written = Vec::with_capacity(self.templates.len() + 1);
        for (file, template) in &self.templates {
            let path = dir.join(file);
            std::fs::write(&path, serde_json::to_string_pretty(template)?)?;
            debug!("Wrote {}", path.display());
            written.push(path);
        }

        let manifest_path = dir.join("manifest.json");
        std::fs::write(&manifest_path, serde_json::to_string_pretty(&self.manifest)?)?;
        written.push(manifest_path);

        info!("Wrote {} files to {}", written.len(), dir.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::expr::Properties;
    use crate::template::stack::Resource;
    use pretty_assertions::assert_eq;

    fn two_stack_app() -> (App, ResourceRef) {
        let mut network = Stack::new("SwiftConnectivityVPC").unwrap();
        let vpc = network
            .add_resource(
                "SwiftVPC",
                Resource::new(
                    "AWS::EC2::VPC",
                    Properties::new().set("CidrBlock", "10.10.0.0/16"),
                ),
            )
            .unwrap();

        let mut security = Stack::new("SwiftConnectivitySecurity").unwrap();
        security
            .add_resource(
                "VPCEndpointSG",
                Resource::new(
                    "AWS::EC2::SecurityGroup",
                    Properties::new()
                        .set("VpcId", &vpc)
                        .set("GroupDescription", "Security Group VPCEndpointSG"),
                ),
            )
            .unwrap();

        let mut root = Stack::new("SWIFTMain-eu-west-1").unwrap();
        root.add_output("VPCID", &vpc, None).unwrap();

        let mut app = App::new(root, AssetLocation::default());
        app.add_nested(network).unwrap();
        app.add_nested(security).unwrap();
        (app, vpc)
    }

    #[test]
    fn test_cross_stack_reference_becomes_parameter_and_output() {
        let (app, _) = two_stack_app();
        let assembly = app.synthesize().unwrap();

        let network = assembly
            .template("SWIFTMain-eu-west-1.SwiftConnectivityVPC.nested.template.json")
            .unwrap();
        assert_eq!(
            network["Outputs"]["SwiftVPCRef"],
            json!({ "Value": { "Ref": "SwiftVPC" } })
        );

        let security = assembly
            .template("SWIFTMain-eu-west-1.SwiftConnectivitySecurity.nested.template.json")
            .unwrap();
        let param = "SwiftConnectivityVPCSwiftVPCRef";
        assert_eq!(security["Parameters"][param], json!({ "Type": "String" }));
        assert_eq!(
            security["Resources"]["VPCEndpointSG"]["Properties"]["VpcId"],
            json!({ "Ref": param })
        );

        let root = assembly.root_template().unwrap();
        assert_eq!(
            root["Resources"]["SwiftConnectivitySecurityNestedStack"]["Properties"]["Parameters"]
                [param],
            json!({ "Fn::GetAtt": ["SwiftConnectivityVPCNestedStack", "Outputs.SwiftVPCRef"] })
        );
        assert_eq!(
            root["Outputs"]["VPCID"]["Value"],
            json!({ "Fn::GetAtt": ["SwiftConnectivityVPCNestedStack", "Outputs.SwiftVPCRef"] })
        );
    }

    #[test]
    fn test_template_url_uses_asset_parameters() {
        let (app, _) = two_stack_app();
        let assembly = app.synthesize().unwrap();
        let root = assembly.root_template().unwrap();

        let url = &root["Resources"]["SwiftConnectivityVPCNestedStack"]["Properties"]["TemplateURL"];
        let parts = url["Fn::Join"][1].as_array().unwrap();
        assert_eq!(parts[1], json!({ "Ref": ASSET_BUCKET_PARAMETER }));
        assert_eq!(
            parts.last().unwrap(),
            &json!("SWIFTMain-eu-west-1.SwiftConnectivityVPC.nested.template.json")
        );
        assert_eq!(
            root["Parameters"][ASSET_BUCKET_PARAMETER]["Default"],
            json!("swift-connectivity-assets")
        );
    }

    #[test]
    fn test_unknown_resource_rejected() {
        let (mut app, vpc) = two_stack_app();
        let ghost = ResourceRef::new(vpc.stack().clone(), LogicalId::new("Ghost").unwrap());
        app.root_mut().add_output("Ghost", &ghost, None).unwrap();

        let err = app.synthesize().unwrap_err();
        assert!(matches!(err, SynthError::UnknownResource { .. }));
    }

    #[test]
    fn test_duplicate_nested_stack_rejected() {
        let (mut app, _) = two_stack_app();
        let err = app
            .add_nested(Stack::new("SwiftConnectivityVPC").unwrap())
            .unwrap_err();
        assert!(matches!(err, SynthError::DuplicateStack(_)));
    }

    #[test]
    fn test_write_assembly() {
        let (app, _) = two_stack_app();
        let assembly = app.synthesize().unwrap();
        let dir = tempfile::tempdir().unwrap();

        let written = assembly.write_to(dir.path()).unwrap();
        assert_eq!(written.len(), 4);
        assert!(dir.path().join("manifest.json").exists());
        assert!(dir.path().join("SWIFTMain-eu-west-1.template.json").exists());
    }
}
