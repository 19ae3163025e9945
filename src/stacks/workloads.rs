// Copyright (c) 2025 - Cowboy AI, Inc.
//! SWIFT workload units
//!
//! A unit is one SWIFT component running as redundant host groups. The
//! gateway (SAGSNL) pins unit `i` to AZ `i-1` with an optional static IP;
//! the handler (AMH) takes the first subnet of its group.

use tracing::info;

use super::host_group::{AmiSource, HostGroup, HostGroupDeps, HostGroupSpec};
use super::network::SubnetSelection;
use super::security::SecurityStack;
use crate::config::SwiftSettings;
use crate::domain::SwiftComponent;
use crate::errors::SynthResult;

/// Host groups per workload unit
pub const UNIT_SIZE: usize = 2;

/// Placement and image of the `index`-th (1-based) host group of `component`
pub fn unit_spec(component: SwiftComponent, index: usize, settings: &SwiftSettings) -> HostGroupSpec {
    let name = component.as_str();
    match component {
        SwiftComponent::Sagsnl => HostGroupSpec {
            unit_id: component.unit_id(index),
            component: name.to_string(),
            selection: Some(SubnetSelection::group(name).in_az(index.saturating_sub(1))),
            private_ip: settings.sagsnl_ip(index),
            ami: AmiSource::from_option(settings.sagsnl_ami.as_deref()),
        },
        SwiftComponent::Amh => HostGroupSpec {
            unit_id: component.unit_id(index),
            component: name.to_string(),
            selection: None,
            private_ip: None,
            ami: AmiSource::from_option(settings.amh_ami.as_deref()),
        },
        SwiftComponent::Saa => HostGroupSpec {
            unit_id: component.unit_id(index),
            component: name.to_string(),
            selection: None,
            private_ip: None,
            ami: AmiSource::Latest,
        },
    }
}

/// Build every host group of one component, in unit order
pub fn build_unit(
    component: SwiftComponent,
    settings: &SwiftSettings,
    security: &mut SecurityStack,
    deps: &HostGroupDeps<'_>,
) -> SynthResult<Vec<HostGroup>> {
    let groups = (1..=UNIT_SIZE)
        .map(|index| HostGroup::build(unit_spec(component, index, settings), security, deps))
        .collect::<SynthResult<Vec<_>>>()?;

    info!("Built {} {} host groups", groups.len(), component);
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(1, 0 ; "first unit in first az")]
    #[test_case(2, 1 ; "second unit in second az")]
    fn test_gateway_pinning(index: usize, az: usize) {
        let mut settings = SwiftSettings::default();
        settings.sagsnl_ips = [Some("10.10.0.10".parse().unwrap()), None];

        let spec = unit_spec(SwiftComponent::Sagsnl, index, &settings);
        let selection = spec.selection.unwrap();
        assert_eq!(selection.availability_zones, Some(vec![az]));
        assert_eq!(spec.private_ip.is_some(), index == 1);
        assert_eq!(spec.unit_id, format!("SAGSNL{index}"));
    }

    #[test]
    fn test_handler_uses_group_default() {
        let mut settings = SwiftSettings::default();
        settings.amh_ami = Some("ami-amh".to_string());

        let spec = unit_spec(SwiftComponent::Amh, 2, &settings);
        assert!(spec.selection.is_none());
        assert_eq!(spec.ami, AmiSource::Explicit("ami-amh".to_string()));
        assert_eq!(spec.component, "AMH");
    }
}
