// Copyright (c) 2025 - Cowboy AI, Inc.
//! Cloud Assembly Tests
//!
//! Synthesize the whole deployment and check the rendered templates: every
//! reference resolves inside its own template, and cross-stack wiring runs
//! through the root stack.

mod fixtures;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::fs;
use swift_infrastructure::{build_app, CloudAssembly, Context, SynthError};

fn synthesize(context: &Context) -> CloudAssembly {
    build_app(
        &fixtures::environment(),
        &fixtures::settings(context),
        &fixtures::lookup(context),
    )
    .unwrap()
    .synthesize()
    .unwrap()
}

fn nested_file(stack: &str) -> String {
    format!("{}.{stack}.nested.template.json", fixtures::ROOT_STACK)
}

/// Collect every `Ref` target and every `Fn::GetAtt` resource in `value`
fn references(value: &Value, refs: &mut Vec<String>, attrs: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(target)) = map.get("Ref") {
                refs.push(target.clone());
            }
            if let Some(Value::Array(parts)) = map.get("Fn::GetAtt") {
                if let Some(Value::String(target)) = parts.first() {
                    attrs.push(target.clone());
                }
            }
            map.values().for_each(|v| references(v, refs, attrs));
        }
        Value::Array(items) => items.iter().for_each(|v| references(v, refs, attrs)),
        _ => {}
    }
}

#[test]
fn test_every_reference_resolves_locally() {
    let assembly = synthesize(&fixtures::context());

    for (file, template) in assembly.templates() {
        let resources = template["Resources"].as_object().unwrap();
        let parameters = template
            .get("Parameters")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let (mut refs, mut attrs) = (Vec::new(), Vec::new());
        references(template, &mut refs, &mut attrs);

        for target in refs {
            assert!(
                target.starts_with("AWS::")
                    || resources.contains_key(&target)
                    || parameters.contains_key(&target),
                "{file}: dangling Ref {target}"
            );
        }
        for target in attrs {
            assert!(
                resources.contains_key(&target),
                "{file}: dangling GetAtt {target}"
            );
        }
    }
}

#[test]
fn test_cross_stack_wiring() {
    let assembly = synthesize(&fixtures::context());

    let host = assembly.template(&nested_file("AMH1")).unwrap();
    assert_eq!(
        host["Resources"]["AMH1"]["Properties"]["SecurityGroupIds"],
        json!([{"Ref": "SwiftConnectivitySecurityAMHSGGroupId"}])
    );
    assert_eq!(
        host["Parameters"]["SwiftConnectivitySecurityAMHSGGroupId"],
        json!({"Type": "String"})
    );

    let security = assembly
        .template(&nested_file("SwiftConnectivitySecurity"))
        .unwrap();
    assert_eq!(
        security["Outputs"]["AMHSGGroupId"],
        json!({"Value": {"Fn::GetAtt": ["AMHSG", "GroupId"]}})
    );

    let root = assembly.root_template().unwrap();
    assert_eq!(
        root["Resources"]["AMH1NestedStack"]["Properties"]["Parameters"]
            ["SwiftConnectivitySecurityAMHSGGroupId"],
        json!({"Fn::GetAtt": ["SwiftConnectivitySecurityNestedStack", "Outputs.AMHSGGroupId"]})
    );
}

#[test]
fn test_root_template() {
    let assembly = synthesize(&fixtures::context());
    let root = assembly.root_template().unwrap();

    assert_eq!(assembly.root_template_file(), "SWIFTMain-us-east-1.template.json");
    assert_eq!(
        root["Description"],
        "Quick Start for SWIFT Connectivity (qs-1rlbqnpbe)"
    );
    assert_eq!(
        root["Outputs"]["AMH2InstanceID"]["Value"],
        json!({"Fn::GetAtt": ["AMH2NestedStack", "Outputs.AMH2Ref"]})
    );

    let nested: Vec<&String> = root["Resources"]
        .as_object()
        .unwrap()
        .iter()
        .filter(|(_, body)| body["Type"] == "AWS::CloudFormation::Stack")
        .map(|(id, _)| id)
        .collect();
    assert_eq!(nested.len(), 10);
}

#[test]
fn test_write_assembly() {
    let assembly = synthesize(&fixtures::context());
    let dir = tempfile::tempdir().unwrap();

    let written = assembly.write_to(dir.path()).unwrap();
    // Root, ten nested templates and the manifest
    assert_eq!(written.len(), 12);

    let manifest: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("manifest.json")).unwrap())
            .unwrap();
    assert_eq!(manifest["root"]["stack"], fixtures::ROOT_STACK);
    assert_eq!(manifest["nested"].as_array().unwrap().len(), 10);

    let root: Value = serde_json::from_str(
        &fs::read_to_string(dir.path().join(assembly.root_template_file())).unwrap(),
    )
    .unwrap();
    assert_eq!(&root, assembly.root_template().unwrap());
}

#[test]
fn test_skip_oracle_drops_database_stack() {
    let assembly = synthesize(&fixtures::context().with("skip_oracle", true));

    assert!(assembly.template(&nested_file("Database")).is_none());
    let root = assembly.root_template().unwrap();
    assert!(root["Resources"].get("DatabaseNestedStack").is_none());

    // The RDS group is still declared and admits the handlers
    let security = assembly
        .template(&nested_file("SwiftConnectivitySecurity"))
        .unwrap();
    assert_eq!(security["Resources"]["RDSSG"]["Type"], "AWS::EC2::SecurityGroup");
}

#[test]
fn test_sample_operator_roles() {
    let assembly = synthesize(&fixtures::context().with("create_sample_iam_role", true));

    let roles = assembly.template(&nested_file("IAMRole")).unwrap();
    for role in ["SWIFTInstanceOperatorRole", "SWIFTInfrastructureRole"] {
        assert_eq!(roles["Resources"][role]["Type"], "AWS::IAM::Role");
    }
    assert!(assembly
        .root_template()
        .unwrap()["Resources"]
        .get("IAMRoleNestedStack")
        .is_some());
}

#[test]
fn test_no_operator_roles_by_default() {
    let assembly = synthesize(&fixtures::context());
    assert!(assembly.template(&nested_file("IAMRole")).is_none());
}

#[test]
fn test_missing_bucket_fails() {
    let mut context = fixtures::context_with_images();
    context.set("qs_s3_bucket", Value::Null);

    let result = build_app(
        &fixtures::environment(),
        &fixtures::settings(&context),
        &fixtures::lookup(&context),
    );
    assert!(matches!(
        result,
        Err(SynthError::MissingContext(key)) if key == "qs_s3_bucket"
    ));
}
