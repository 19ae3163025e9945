// Copyright (c) 2025 - Cowboy AI, Inc.
//! Security Registry
//!
//! Named security groups, NACLs and instance roles of one nested stack.
//! Lookups are keyed by logical name and creation is explicit:
//! [`SecurityStack::get_or_create_security_group`] reports whether it
//! created the group, so callers can run one-time wiring only for new
//! groups.
//!
//! Security group rules are collected first and rendered when the stack is
//! finalized. That lets SWIFT rule enforcement run after every consumer
//! group exists, regardless of which stack created it.

use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

use super::network::{NetworkStack, SelectedSubnets};
use crate::domain::invariants::{validate_nacl_rule_number, validate_port_range};
use crate::domain::{Ipv4Cidr, LogicalId};
use crate::errors::{SynthError, SynthResult};
use crate::template::{
    Expr, PolicyDocument, PolicyStatement, Principal, Properties, Pseudo, Resource, ResourceRef,
    Stack,
};

/// Security group every workload reaches the interface endpoints through
pub const ENDPOINT_SECURITY_GROUP: &str = "VPCEndpointSG";

/// HTTPS, used by the interface endpoints
const ENDPOINT_PORT: u16 = 443;

/// Placeholder egress rendered for groups without outbound rules
fn disallow_all_egress() -> Expr {
    Expr::from(json!({
        "CidrIp": "255.255.255.255/32",
        "Description": "Disallow all traffic",
        "FromPort": 252,
        "IpProtocol": "icmp",
        "ToPort": 86
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    /// Every protocol (`-1`)
    All,
}

impl Protocol {
    pub fn ip_protocol(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
            Self::All => "-1",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            other => write!(f, "{}", other.ip_protocol()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Ingress,
    Egress,
}

/// Peer of a CIDR-style rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peer {
    Cidr(Ipv4Cidr),
    /// Managed prefix list ID (`pl-...`)
    PrefixList(String),
}

/// One rule request for [`SecurityStack::add_rule`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSpec {
    pub protocol: Protocol,
    pub from_port: u16,
    pub to_port: u16,
    /// `None` means the VPC CIDR
    pub peer: Option<Peer>,
    pub direction: Direction,
    pub description: Option<String>,
}

impl RuleSpec {
    pub fn ingress(protocol: Protocol, from_port: u16, to_port: u16) -> Self {
        Self {
            protocol,
            from_port,
            to_port,
            peer: None,
            direction: Direction::Ingress,
            description: None,
        }
    }

    pub fn egress(protocol: Protocol, from_port: u16, to_port: u16) -> Self {
        Self {
            direction: Direction::Egress,
            ..Self::ingress(protocol, from_port, to_port)
        }
    }

    pub fn peer(mut self, peer: Peer) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// A zero `to` port after a non-zero `from` port means a single port
    fn port_range(&self) -> (u16, u16) {
        if self.from_port != 0 && self.to_port == 0 {
            (self.from_port, self.from_port)
        } else {
            (self.from_port, self.to_port)
        }
    }
}

/// Handle to a declared security group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroupHandle {
    name: String,
    resource: ResourceRef,
}

impl SecurityGroupHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    /// `Fn::GetAtt [<group>, GroupId]`
    pub fn group_id(&self) -> Expr {
        self.resource.attr("GroupId")
    }
}

/// Outcome of a get-or-create request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration<T> {
    Created(T),
    Existing(T),
}

impl<T> Registration<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    pub fn get(&self) -> &T {
        match self {
            Self::Created(value) | Self::Existing(value) => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Created(value) | Self::Existing(value) => value,
        }
    }
}

/// Resolved peer of a recorded rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulePeer {
    VpcCidr,
    Cidr(Ipv4Cidr),
    PrefixList(String),
    SecurityGroup(String),
}

/// A recorded security group rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityRule {
    pub protocol: Protocol,
    pub from_port: u16,
    pub to_port: u16,
    pub peer: RulePeer,
    pub description: Option<String>,
}

impl SecurityRule {
    /// Rules that differ only in description are the same rule
    fn same_target(&self, other: &SecurityRule) -> bool {
        self.protocol == other.protocol
            && self.from_port == other.from_port
            && self.to_port == other.to_port
            && self.peer == other.peer
    }
}

#[derive(Debug, Clone)]
struct GroupEntry {
    handle: SecurityGroupHandle,
    description: String,
    ingress: Vec<SecurityRule>,
    egress: Vec<SecurityRule>,
}

impl GroupEntry {
    fn rules_mut(&mut self, direction: Direction) -> &mut Vec<SecurityRule> {
        match direction {
            Direction::Ingress => &mut self.ingress,
            Direction::Egress => &mut self.egress,
        }
    }

    /// Returns false when an equivalent rule already exists
    fn record(&mut self, direction: Direction, rule: SecurityRule) -> bool {
        let rules = self.rules_mut(direction);
        if rules.iter().any(|existing| existing.same_target(&rule)) {
            return false;
        }
        rules.push(rule);
        true
    }
}

/// EC2 instance role plus its inline policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRole {
    name: String,
    role_name: String,
    resource: ResourceRef,
}

impl InstanceRole {
    /// Registry key (the component name)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// IAM role name, `<name>FunctionalRole<region>`
    pub fn role_name(&self) -> &str {
        &self.role_name
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaclAction {
    Allow,
    Deny,
}

/// One NACL entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaclEntry {
    pub id: String,
    pub rule_number: u16,
    pub cidr: Ipv4Cidr,
    pub protocol: Protocol,
    /// Inclusive port range, ignored for `Protocol::All`
    pub ports: Option<(u16, u16)>,
    pub direction: Direction,
    pub action: NaclAction,
}

impl NaclEntry {
    /// Allow every protocol to or from anywhere
    pub fn allow_all(id: impl Into<String>, rule_number: u16, direction: Direction) -> Self {
        Self {
            id: id.into(),
            rule_number,
            cidr: Ipv4Cidr::ANY,
            protocol: Protocol::All,
            ports: None,
            direction,
            action: NaclAction::Allow,
        }
    }
}

#[derive(Debug, Clone)]
struct NaclRecord {
    resource: ResourceRef,
    rules: Vec<(Direction, u16)>,
}

/// Security groups, NACLs and instance roles of the deployment
#[derive(Debug, Clone)]
pub struct SecurityStack {
    stack: Stack,
    vpc: ResourceRef,
    vpc_cidr: Expr,
    region: String,
    qs_s3_bucket: Option<String>,
    groups: BTreeMap<String, GroupEntry>,
    roles: BTreeMap<String, InstanceRole>,
    nacls: BTreeMap<String, NaclRecord>,
}

impl SecurityStack {
    /// Requires a generated network; the VPC is the home of every group
    pub fn new(
        id: &str,
        network: &NetworkStack,
        region: &str,
        qs_s3_bucket: Option<&str>,
    ) -> SynthResult<Self> {
        Ok(Self {
            stack: Stack::new(id)?,
            vpc: network.vpc()?.clone(),
            vpc_cidr: network.vpc_cidr_block()?,
            region: region.to_string(),
            qs_s3_bucket: qs_s3_bucket.map(str::to_string),
            groups: BTreeMap::new(),
            roles: BTreeMap::new(),
            nacls: BTreeMap::new(),
        })
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    // ---- security groups ----

    /// Strict creation
    ///
    /// # Errors
    /// - `SecurityGroupExists` if `name` is already registered
    pub fn create_security_group(
        &mut self,
        name: &str,
        description: Option<&str>,
    ) -> SynthResult<SecurityGroupHandle> {
        if self.groups.contains_key(name) {
            return Err(SynthError::SecurityGroupExists(name.to_string()));
        }

        let logical_id = LogicalId::new(name)?;
        let handle = SecurityGroupHandle {
            name: name.to_string(),
            resource: ResourceRef::new(self.stack.id().clone(), logical_id),
        };
        let description = description
            .map(str::to_string)
            .unwrap_or_else(|| format!("Security Group {name}"));

        debug!("Created security group {}", name);
        self.groups.insert(
            name.to_string(),
            GroupEntry {
                handle: handle.clone(),
                description,
                ingress: Vec::new(),
                egress: Vec::new(),
            },
        );
        Ok(handle)
    }

    /// Return the registered group or create it
    pub fn get_or_create_security_group(
        &mut self,
        name: &str,
    ) -> SynthResult<Registration<SecurityGroupHandle>> {
        if let Some(entry) = self.groups.get(name) {
            return Ok(Registration::Existing(entry.handle.clone()));
        }
        self.create_security_group(name, None)
            .map(Registration::Created)
    }

    pub fn security_group(&self, name: &str) -> Option<&SecurityGroupHandle> {
        self.groups.get(name).map(|entry| &entry.handle)
    }

    pub fn require_security_group(&self, name: &str) -> SynthResult<SecurityGroupHandle> {
        self.security_group(name)
            .cloned()
            .ok_or_else(|| SynthError::MissingSecurityGroup(name.to_string()))
    }

    pub fn security_group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    fn entry_mut(&mut self, name: &str) -> SynthResult<&mut GroupEntry> {
        self.groups
            .get_mut(name)
            .ok_or_else(|| SynthError::MissingSecurityGroup(name.to_string()))
    }

    /// Add a CIDR or prefix-list rule
    ///
    /// Returns `false` when an identical rule was already present.
    pub fn add_rule(&mut self, group: &str, spec: RuleSpec) -> SynthResult<bool> {
        let (from_port, to_port) = spec.port_range();
        validate_port_range(from_port, to_port)?;

        let peer = match spec.peer {
            None => RulePeer::VpcCidr,
            Some(Peer::Cidr(cidr)) => RulePeer::Cidr(cidr),
            Some(Peer::PrefixList(id)) => RulePeer::PrefixList(id),
        };
        let rule = SecurityRule {
            protocol: spec.protocol,
            from_port,
            to_port,
            peer,
            description: spec.description,
        };

        let added = self.entry_mut(group)?.record(spec.direction, rule);
        if !added {
            debug!("Skipped duplicate rule on {}", group);
        }
        Ok(added)
    }

    /// Group-to-group rule: egress on `from`, ingress on `to`
    pub fn connect(
        &mut self,
        from: &str,
        to: &str,
        protocol: Protocol,
        ports: (u16, u16),
        description: &str,
    ) -> SynthResult<()> {
        self.connect_with(from, to, protocol, ports, description, description)
    }

    /// [`connect`](Self::connect) with a description per side
    pub fn connect_with(
        &mut self,
        from: &str,
        to: &str,
        protocol: Protocol,
        (from_port, to_port): (u16, u16),
        egress_description: &str,
        ingress_description: &str,
    ) -> SynthResult<()> {
        validate_port_range(from_port, to_port)?;
        // Both groups must exist before either side is recorded
        self.require_security_group(from)?;
        self.require_security_group(to)?;

        let rule = |peer: &str, description: &str| SecurityRule {
            protocol,
            from_port,
            to_port,
            peer: RulePeer::SecurityGroup(peer.to_string()),
            description: Some(description.to_string()),
        };

        self.entry_mut(from)?
            .record(Direction::Egress, rule(to, egress_description));
        self.entry_mut(to)?
            .record(Direction::Ingress, rule(from, ingress_description));
        debug!("Connected {} -> {} on {} {}-{}", from, to, protocol, from_port, to_port);
        Ok(())
    }

    /// Let `group` reach the interface endpoints over HTTPS
    ///
    /// # Errors
    /// - `MissingSecurityGroup` if `group` or the endpoint group is missing
    pub fn allow_endpoint_access(&mut self, group: &str) -> SynthResult<()> {
        let label = group.strip_suffix("SG").unwrap_or(group);
        self.connect_with(
            group,
            ENDPOINT_SECURITY_GROUP,
            Protocol::Tcp,
            (ENDPOINT_PORT, ENDPOINT_PORT),
            &format!("Egress rule to VPC Endpoint for {label}"),
            &format!("VPC Endpoint Ingress rule from {label}"),
        )
    }

    /// Recorded rules of one direction
    pub fn rules(&self, group: &str, direction: Direction) -> SynthResult<&[SecurityRule]> {
        let entry = self
            .groups
            .get(group)
            .ok_or_else(|| SynthError::MissingSecurityGroup(group.to_string()))?;
        Ok(match direction {
            Direction::Ingress => &entry.ingress,
            Direction::Egress => &entry.egress,
        })
    }

    pub fn vpc_cidr_block(&self) -> &Expr {
        &self.vpc_cidr
    }

    // ---- instance roles ----

    /// Strict creation of `<name>FunctionalRole<region>`
    ///
    /// The role is assumed by EC2, carries `AmazonSSMManagedInstanceCore`
    /// and an inline policy granting the SSM and CloudWatch agents what
    /// they need to bootstrap.
    ///
    /// # Errors
    /// - `InstanceRoleExists` if `name` is already registered
    /// - `MissingContext` without a quick-start bucket
    pub fn create_instance_role(&mut self, name: &str) -> SynthResult<InstanceRole> {
        if self.roles.contains_key(name) {
            return Err(SynthError::InstanceRoleExists(name.to_string()));
        }
        let bucket = self
            .qs_s3_bucket
            .clone()
            .ok_or_else(|| SynthError::MissingContext("qs_s3_bucket".to_string()))?;

        let role_name = format!("{name}FunctionalRole{}", self.region);
        let assume = PolicyDocument::new().statement(
            PolicyStatement::allow()
                .actions(["sts:AssumeRole"])
                .principal(Principal::Service("ec2.amazonaws.com".to_string())),
        );
        let role = self.stack.add_resource(
            LogicalId::sanitized([&role_name])?.as_str(),
            Resource::new(
                "AWS::IAM::Role",
                Properties::new()
                    .set("RoleName", role_name.as_str())
                    .set("AssumeRolePolicyDocument", assume)
                    .set(
                        "ManagedPolicyArns",
                        Expr::list([Expr::concat([
                            "arn:".into(),
                            Pseudo::Partition.into(),
                            ":iam::aws:policy/AmazonSSMManagedInstanceCore".into(),
                        ])]),
                    ),
            ),
        )?;

        let policy_name = format!("{name}InstanceProfilePolicy{}", self.region);
        self.stack.add_resource(
            LogicalId::sanitized([&policy_name])?.as_str(),
            Resource::new(
                "AWS::IAM::Policy",
                Properties::new()
                    .set("PolicyName", policy_name.as_str())
                    .set("PolicyDocument", self.instance_policy(&bucket))
                    .set("Roles", Expr::list([role.to_ref()])),
            ),
        )?;

        info!("Created instance role {}", role_name);
        let instance_role = InstanceRole {
            name: name.to_string(),
            role_name,
            resource: role,
        };
        self.roles.insert(name.to_string(), instance_role.clone());
        Ok(instance_role)
    }

    pub fn get_or_create_instance_role(
        &mut self,
        name: &str,
    ) -> SynthResult<Registration<InstanceRole>> {
        if let Some(role) = self.roles.get(name) {
            return Ok(Registration::Existing(role.clone()));
        }
        self.create_instance_role(name).map(Registration::Created)
    }

    pub fn instance_role(&self, name: &str) -> Option<&InstanceRole> {
        self.roles.get(name)
    }

    pub fn require_instance_role(&self, name: &str) -> SynthResult<&InstanceRole> {
        self.roles
            .get(name)
            .ok_or_else(|| SynthError::MissingInstanceRole(name.to_string()))
    }

    pub fn instance_roles(&self) -> &BTreeMap<String, InstanceRole> {
        &self.roles
    }

    fn instance_policy(&self, bucket: &str) -> PolicyDocument {
        let region = self.region.as_str();
        let agent_buckets = [
            format!("{bucket}-{region}"),
            format!("amazoncloudwatch-agent-{region}"),
            format!("aws-ssm-{region}"),
            format!("aws-windows-downloads-{region}"),
            format!("amazon-ssm-{region}"),
            format!("amazon-ssm-packages-{region}"),
            format!("{region}-birdwatcher-prod"),
            format!("aws-ssm-distributor-file-{region}"),
            format!("patch-baseline-snapshot-{region}"),
        ];

        PolicyDocument::new()
            .statement(
                PolicyStatement::allow()
                    .sid("SSMPermissionsPolicyForSSMandCWAgent")
                    .actions(["s3:GetObject"])
                    .resources(
                        agent_buckets
                            .iter()
                            .map(|b| Expr::str(format!("arn:aws:s3:::{b}/*"))),
                    ),
            )
            .statement(
                PolicyStatement::allow()
                    .sid("CWAgentPermissions")
                    .actions([
                        "cloudwatch:PutMetricData",
                        "ec2:DescribeVolumes",
                        "ec2:DescribeTags",
                        "logs:PutLogEvents",
                        "logs:DescribeLogStreams",
                        "logs:DescribeLogGroups",
                        "logs:CreateLogStream",
                        "logs:CreateLogGroup",
                    ])
                    .resource("*"),
            )
            .statement(
                PolicyStatement::allow()
                    .sid("SSMParameterStorePermissions")
                    .actions(["ssm:GetParameter"])
                    .resource("arn:aws:ssm:*:*:parameter/AmazonCloudWatch-*"),
            )
    }

    // ---- NACLs ----

    /// Create a NACL and associate it with `subnets`
    pub fn create_nacl(
        &mut self,
        name: &str,
        description: &str,
        subnets: &SelectedSubnets,
    ) -> SynthResult<ResourceRef> {
        let nacl = self.stack.add_resource(
            name,
            Resource::new(
                "AWS::EC2::NetworkAcl",
                Properties::new().set("VpcId", &self.vpc).set(
                    "Tags",
                    Expr::list([
                        super::tag("Name", name),
                        super::tag("Description", description),
                    ]),
                ),
            ),
        )?;

        for subnet in subnets.subnets() {
            self.stack.add_resource(
                &format!("{name}Association{}", subnet.resource.logical_id()),
                Resource::new(
                    "AWS::EC2::SubnetNetworkAclAssociation",
                    Properties::new()
                        .set("NetworkAclId", &nacl)
                        .set("SubnetId", subnet.id()),
                ),
            )?;
        }

        debug!("Created NACL {} over {} subnets", name, subnets.len());
        self.nacls.insert(
            name.to_string(),
            NaclRecord {
                resource: nacl.clone(),
                rules: Vec::new(),
            },
        );
        Ok(nacl)
    }

    /// Add an entry to a NACL created earlier
    ///
    /// # Errors
    /// - `MissingNacl` for an unknown NACL
    /// - `Validation` for rule numbers outside 1..=32766
    /// - `DuplicateResource` when the rule number is taken in that direction
    pub fn add_nacl_entry(&mut self, nacl: &str, entry: NaclEntry) -> SynthResult<()> {
        validate_nacl_rule_number(entry.rule_number)?;
        let stack_id = self.stack.id().to_string();
        let record = self
            .nacls
            .get_mut(nacl)
            .ok_or_else(|| SynthError::MissingNacl(nacl.to_string()))?;

        if record.rules.contains(&(entry.direction, entry.rule_number)) {
            return Err(SynthError::DuplicateResource {
                stack: stack_id,
                logical_id: format!("{nacl} rule {}", entry.rule_number),
            });
        }
        let nacl_ref = record.resource.clone();

        let mut properties = Properties::new()
            .set("NetworkAclId", &nacl_ref)
            .set("RuleNumber", entry.rule_number)
            .set("Protocol", protocol_number(entry.protocol))
            .set(
                "RuleAction",
                match entry.action {
                    NaclAction::Allow => "allow",
                    NaclAction::Deny => "deny",
                },
            )
            .set("Egress", entry.direction == Direction::Egress)
            .set("CidrBlock", entry.cidr.to_string());
        if let (Some((from, to)), false) = (entry.ports, entry.protocol == Protocol::All) {
            validate_port_range(from, to)?;
            properties.insert("PortRange", Properties::new().set("From", from).set("To", to));
        }

        self.stack.add_resource(
            &entry.id,
            Resource::new("AWS::EC2::NetworkAclEntry", properties),
        )?;

        // Rule numbers are only taken once the entry is declared
        if let Some(record) = self.nacls.get_mut(nacl) {
            record.rules.push((entry.direction, entry.rule_number));
        }
        Ok(())
    }

    // ---- rendering ----

    /// Render every group and rule into the stack
    pub fn into_stack(mut self) -> SynthResult<Stack> {
        let groups = std::mem::take(&mut self.groups);

        for entry in groups.values() {
            self.render_group(entry, &groups)?;
        }

        info!(
            "Security stack {} holds {} groups and {} roles",
            self.stack.id(),
            groups.len(),
            self.roles.len()
        );
        Ok(self.stack)
    }

    fn render_group(
        &mut self,
        entry: &GroupEntry,
        groups: &BTreeMap<String, GroupEntry>,
    ) -> SynthResult<()> {
        let name = entry.handle.name();
        let inline = |rules: &[SecurityRule], direction: Direction| -> Vec<Expr> {
            rules
                .iter()
                .filter(|rule| !matches!(rule.peer, RulePeer::SecurityGroup(_)))
                .map(|rule| self.inline_rule(rule, direction))
                .collect()
        };

        let ingress = inline(&entry.ingress, Direction::Ingress);
        // Group-to-group egress lives in separate resources; only an inline
        // rule displaces the default allow-all egress
        let mut egress = inline(&entry.egress, Direction::Egress);
        if egress.is_empty() {
            egress.push(disallow_all_egress());
        }

        let mut properties = Properties::new()
            .set("GroupDescription", entry.description.as_str())
            .set("GroupName", name)
            .set("VpcId", &self.vpc);
        if !egress.is_empty() {
            properties.insert("SecurityGroupEgress", Expr::list(egress));
        }
        if !ingress.is_empty() {
            properties.insert("SecurityGroupIngress", Expr::list(ingress));
        }
        self.stack.add_resource(
            name,
            Resource::new("AWS::EC2::SecurityGroup", properties),
        )?;

        for (direction, rules) in [
            (Direction::Ingress, &entry.ingress),
            (Direction::Egress, &entry.egress),
        ] {
            for rule in rules {
                if let RulePeer::SecurityGroup(peer) = &rule.peer {
                    let peer_handle = &groups
                        .get(peer)
                        .ok_or_else(|| SynthError::MissingSecurityGroup(peer.clone()))?
                        .handle;
                    self.render_group_rule(&entry.handle, peer_handle, rule, direction)?;
                }
            }
        }
        Ok(())
    }

    fn inline_rule(&self, rule: &SecurityRule, direction: Direction) -> Expr {
        let mut body = Properties::new()
            .set("IpProtocol", rule.protocol.ip_protocol())
            .set("FromPort", rule.from_port)
            .set("ToPort", rule.to_port)
            .set_opt("Description", rule.description.as_deref());
        match (&rule.peer, direction) {
            (RulePeer::VpcCidr, _) => body.insert("CidrIp", self.vpc_cidr.clone()),
            (RulePeer::Cidr(cidr), _) => body.insert("CidrIp", cidr.to_string()),
            (RulePeer::PrefixList(id), Direction::Ingress) => {
                body.insert("SourcePrefixListId", id.as_str())
            }
            (RulePeer::PrefixList(id), Direction::Egress) => {
                body.insert("DestinationPrefixListId", id.as_str())
            }
            (RulePeer::SecurityGroup(_), _) => {}
        }
        body.into()
    }

    fn render_group_rule(
        &mut self,
        group: &SecurityGroupHandle,
        peer: &SecurityGroupHandle,
        rule: &SecurityRule,
        direction: Direction,
    ) -> SynthResult<()> {
        let (resource_type, link, peer_key) = match direction {
            Direction::Ingress => ("AWS::EC2::SecurityGroupIngress", "from", "SourceSecurityGroupId"),
            Direction::Egress => (
                "AWS::EC2::SecurityGroupEgress",
                "to",
                "DestinationSecurityGroupId",
            ),
        };
        let ports = format!("{}to{}", rule.from_port, rule.to_port);
        let logical_id = LogicalId::sanitized([
            group.name(),
            link,
            peer.name(),
            rule.protocol.ip_protocol(),
            ports.as_str(),
        ])?;

        self.stack.add_resource(
            logical_id.as_str(),
            Resource::new(
                resource_type,
                Properties::new()
                    .set("GroupId", group.group_id())
                    .set(peer_key, peer.group_id())
                    .set("IpProtocol", rule.protocol.ip_protocol())
                    .set("FromPort", rule.from_port)
                    .set("ToPort", rule.to_port)
                    .set_opt("Description", rule.description.as_deref()),
            ),
        )?;
        Ok(())
    }
}

fn protocol_number(protocol: Protocol) -> i64 {
    match protocol {
        Protocol::Tcp => 6,
        Protocol::Udp => 17,
        Protocol::Icmp => 1,
        Protocol::All => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::network::SubnetSelection;
    use crate::template::LocalResolver;

    fn network() -> NetworkStack {
        let mut network =
            NetworkStack::new("SwiftConnectivityVPC", Ipv4Cidr::new("10.10.0.0/16").unwrap())
                .unwrap();
        network.add_isolated_subnets("SAGSNL").unwrap();
        network.add_isolated_subnets("AMH").unwrap();
        network.generate().unwrap();
        network
    }

    fn security() -> SecurityStack {
        SecurityStack::new(
            "SwiftConnectivitySecurity",
            &network(),
            "eu-west-1",
            Some("aws-quickstart"),
        )
        .unwrap()
    }

    #[test]
    fn test_requires_generated_network() {
        let mut network =
            NetworkStack::new("Net", Ipv4Cidr::new("10.10.0.0/16").unwrap()).unwrap();
        network.add_isolated_subnets("A").unwrap();
        assert!(matches!(
            SecurityStack::new("Sec", &network, "eu-west-1", None),
            Err(SynthError::NotGenerated(_))
        ));
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut security = security();
        let first = security.get_or_create_security_group("AMHSG").unwrap();
        let second = security.get_or_create_security_group("AMHSG").unwrap();

        assert!(first.is_created());
        assert!(!second.is_created());
        assert_eq!(first.get(), second.get());
        assert_eq!(security.security_group_names().count(), 1);
    }

    #[test]
    fn test_strict_create_rejects_existing() {
        let mut security = security();
        security.create_security_group("RDSSG", None).unwrap();
        assert!(matches!(
            security.create_security_group("RDSSG", None),
            Err(SynthError::SecurityGroupExists(_))
        ));
    }

    #[test]
    fn test_rules_are_deduplicated() {
        let mut security = security();
        security.create_security_group("MQSG", None).unwrap();
        let spec = RuleSpec::ingress(Protocol::Tcp, 8162, 0)
            .peer(Peer::Cidr(Ipv4Cidr::new("10.1.0.0/16").unwrap()));

        assert!(security.add_rule("MQSG", spec.clone()).unwrap());
        assert!(!security
            .add_rule("MQSG", spec.description("same rule"))
            .unwrap());

        let rules = security.rules("MQSG", Direction::Ingress).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!((rules[0].from_port, rules[0].to_port), (8162, 8162));
    }

    #[test]
    fn test_rule_on_missing_group() {
        let mut security = security();
        assert!(matches!(
            security.add_rule("AMHSG", RuleSpec::egress(Protocol::Tcp, 443, 443)),
            Err(SynthError::MissingSecurityGroup(_))
        ));
    }

    #[test]
    fn test_endpoint_access_wires_both_sides() {
        let mut security = security();
        security
            .create_security_group(ENDPOINT_SECURITY_GROUP, None)
            .unwrap();
        security.create_security_group("SAGSNLSG", None).unwrap();
        security.allow_endpoint_access("SAGSNLSG").unwrap();
        security.allow_endpoint_access("SAGSNLSG").unwrap();

        let ingress = security
            .rules(ENDPOINT_SECURITY_GROUP, Direction::Ingress)
            .unwrap();
        assert_eq!(ingress.len(), 1);
        assert_eq!(
            ingress[0].description.as_deref(),
            Some("VPC Endpoint Ingress rule from SAGSNL")
        );
        assert_eq!(
            security.rules("SAGSNLSG", Direction::Egress).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_render_placeholder_egress_and_group_rules() {
        let mut security = security();
        security
            .create_security_group(ENDPOINT_SECURITY_GROUP, None)
            .unwrap();
        security.create_security_group("AMHSG", None).unwrap();
        security.allow_endpoint_access("AMHSG").unwrap();

        let stack = security.into_stack().unwrap();
        let endpoint = stack.resource(ENDPOINT_SECURITY_GROUP).unwrap();
        let egress = endpoint
            .property("SecurityGroupEgress")
            .unwrap()
            .render(&LocalResolver);
        assert_eq!(egress[0]["Description"], json!("Disallow all traffic"));

        assert_eq!(stack.count_of_type("AWS::EC2::SecurityGroupIngress"), 1);
        assert_eq!(stack.count_of_type("AWS::EC2::SecurityGroupEgress"), 1);
        assert!(stack
            .resource("VPCEndpointSGfromAMHSGtcp443to443")
            .is_some());
    }

    #[test]
    fn test_group_only_egress_keeps_placeholder() {
        let mut security = security();
        security
            .create_security_group(ENDPOINT_SECURITY_GROUP, None)
            .unwrap();
        security.create_security_group("AMHSG", None).unwrap();
        security.create_security_group("RDSSG", None).unwrap();
        security.allow_endpoint_access("AMHSG").unwrap();
        security
            .connect("AMHSG", "RDSSG", Protocol::Tcp, (1521, 1521), "AMH - RDS (1521)")
            .unwrap();

        let stack = security.into_stack().unwrap();
        let egress = stack
            .resource("AMHSG")
            .unwrap()
            .property("SecurityGroupEgress")
            .unwrap()
            .render(&LocalResolver);
        assert_eq!(egress.as_array().unwrap().len(), 1);
        assert_eq!(egress[0]["Description"], json!("Disallow all traffic"));
        assert_eq!(stack.count_of_type("AWS::EC2::SecurityGroupEgress"), 2);
    }

    #[test]
    fn test_inline_egress_replaces_placeholder() {
        let mut security = security();
        security.create_security_group("AMHSG", None).unwrap();
        security
            .add_rule("AMHSG", RuleSpec::egress(Protocol::Tcp, 443, 443))
            .unwrap();

        let stack = security.into_stack().unwrap();
        let egress = stack
            .resource("AMHSG")
            .unwrap()
            .property("SecurityGroupEgress")
            .unwrap()
            .render(&LocalResolver);
        assert_eq!(egress.as_array().unwrap().len(), 1);
        assert_eq!(egress[0]["FromPort"], json!(443));
    }

    #[test]
    fn test_group_rule_ids_separate_ports() {
        let mut security = security();
        security.create_security_group("AMHSG", None).unwrap();
        security.create_security_group("RDSSG", None).unwrap();
        security
            .connect("AMHSG", "RDSSG", Protocol::Tcp, (1, 123), "low")
            .unwrap();
        security
            .connect("AMHSG", "RDSSG", Protocol::Tcp, (11, 23), "high")
            .unwrap();

        let stack = security.into_stack().unwrap();
        assert!(stack.resource("AMHSGtoRDSSGtcp1to123").is_some());
        assert!(stack.resource("AMHSGtoRDSSGtcp11to23").is_some());
        assert_eq!(stack.count_of_type("AWS::EC2::SecurityGroupEgress"), 2);
    }

    #[test]
    fn test_instance_role() {
        let mut security = security();
        let role = security.get_or_create_instance_role("SAGSNL").unwrap();
        assert!(role.is_created());
        assert_eq!(role.get().role_name(), "SAGSNLFunctionalRoleeu-west-1");

        let again = security.get_or_create_instance_role("SAGSNL").unwrap();
        assert!(!again.is_created());

        let stack = security.stack();
        assert!(stack.resource("SAGSNLFunctionalRoleeuwest1").is_some());
        let policy = stack
            .resource("SAGSNLInstanceProfilePolicyeuwest1")
            .unwrap()
            .property("PolicyDocument")
            .unwrap()
            .render(&LocalResolver);
        assert_eq!(policy["Statement"].as_array().unwrap().len(), 3);
        assert_eq!(
            policy["Statement"][0]["Resource"][0],
            json!("arn:aws:s3:::aws-quickstart-eu-west-1/*")
        );
    }

    #[test]
    fn test_instance_role_requires_bucket() {
        let mut security =
            SecurityStack::new("Sec", &network(), "eu-west-1", None).unwrap();
        assert!(matches!(
            security.create_instance_role("AMH"),
            Err(SynthError::MissingContext(_))
        ));
    }

    #[test]
    fn test_nacl_entries() {
        let net = network();
        let mut security =
            SecurityStack::new("Sec", &net, "eu-west-1", Some("qs")).unwrap();
        let subnets = net.select_subnets(&SubnetSelection::group("AMH")).unwrap();
        security.create_nacl("AMHNACL", "NACL for AMH", &subnets).unwrap();

        security
            .add_nacl_entry("AMHNACL", NaclEntry::allow_all("AMHNACLEntry1", 100, Direction::Egress))
            .unwrap();
        security
            .add_nacl_entry("AMHNACL", NaclEntry::allow_all("AMHNACLEntry2", 100, Direction::Ingress))
            .unwrap();

        assert!(matches!(
            security.add_nacl_entry("AMHNACL", NaclEntry::allow_all("Dup", 100, Direction::Ingress)),
            Err(SynthError::DuplicateResource { .. })
        ));
        assert!(matches!(
            security.add_nacl_entry("AMHNACL", NaclEntry::allow_all("Bad", 0, Direction::Ingress)),
            Err(SynthError::Validation(_))
        ));
        assert!(matches!(
            security.add_nacl_entry("SAGSNLNACL", NaclEntry::allow_all("X", 100, Direction::Ingress)),
            Err(SynthError::MissingNacl(_))
        ));

        let stack = security.stack();
        assert_eq!(stack.count_of_type("AWS::EC2::NetworkAclEntry"), 2);
        assert_eq!(stack.count_of_type("AWS::EC2::SubnetNetworkAclAssociation"), 2);
    }

    #[test]
    fn test_rejected_nacl_entry_frees_rule_number() {
        let net = network();
        let mut security =
            SecurityStack::new("Sec", &net, "eu-west-1", Some("qs")).unwrap();
        let subnets = net.select_subnets(&SubnetSelection::group("AMH")).unwrap();
        security.create_nacl("AMHNACL", "NACL for AMH", &subnets).unwrap();
        security
            .add_nacl_entry("AMHNACL", NaclEntry::allow_all("AMHNACLEntry1", 100, Direction::Egress))
            .unwrap();

        // Same logical ID, fresh rule number
        assert!(matches!(
            security.add_nacl_entry("AMHNACL", NaclEntry::allow_all("AMHNACLEntry1", 200, Direction::Egress)),
            Err(SynthError::DuplicateResource { .. })
        ));
        security
            .add_nacl_entry("AMHNACL", NaclEntry::allow_all("AMHNACLEntry3", 200, Direction::Egress))
            .unwrap();

        let mut bad_ports = NaclEntry::allow_all("AMHNACLEntry4", 300, Direction::Ingress);
        bad_ports.protocol = Protocol::Tcp;
        bad_ports.ports = Some((443, 80));
        assert!(matches!(
            security.add_nacl_entry("AMHNACL", bad_ports),
            Err(SynthError::Validation(_))
        ));
        security
            .add_nacl_entry("AMHNACL", NaclEntry::allow_all("AMHNACLEntry4", 300, Direction::Ingress))
            .unwrap();

        assert_eq!(security.stack().count_of_type("AWS::EC2::NetworkAclEntry"), 3);
    }
}
