// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Topology Builder
//!
//! Declares the VPC and its subnet groups, then materializes everything in
//! one [`NetworkStack::generate`] call. The builder has two phases:
//!
//! 1. **Declaring**: subnet groups, AZ count, VGW flag and the VGW route
//!    propagation selection may be changed; subnet queries fail with
//!    `NotGenerated`
//! 2. **Generated**: the topology is frozen; mutations fail with
//!    `AlreadyGenerated` and queries return concrete subnets
//!
//! # Allocation
//!
//! Subnets are carved group-major, AZ-minor, in declaration order. With
//! `10.10.0.0/16`, two AZs and groups `SAGSNL`, `AMH`:
//!
//! ```text
//! SAGSNL  AZ0 10.10.0.0/24   AZ1 10.10.1.0/24
//! AMH     AZ0 10.10.2.0/24   AZ1 10.10.3.0/24
//! ```

use std::fmt;
use tracing::{debug, info};

use super::name_tags;
use crate::domain::invariants::{validate_az_count, validate_group_name};
use crate::domain::{CidrAllocator, Ipv4Cidr};
use crate::errors::{SynthError, SynthResult};
use crate::template::{Expr, Properties, Resource, ResourceRef, Stack};

/// Default netmask of a subnet group
pub const DEFAULT_SUBNET_MASK: u8 = 24;
/// Default number of availability zones
pub const DEFAULT_MAX_AZS: usize = 2;

const VPC_ID: &str = "SwiftVPC";

/// Routing class of a subnet group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubnetType {
    /// Routes to an internet gateway
    Public,
    /// Routes to a NAT gateway in a public subnet
    Private,
    /// No route out of the VPC
    Isolated,
}

impl SubnetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "Public",
            Self::Private => "Private",
            Self::Isolated => "Isolated",
        }
    }
}

impl fmt::Display for SubnetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SubnetGroup {
    name: String,
    subnet_type: SubnetType,
    cidr_mask: u8,
}

/// One generated subnet
#[derive(Debug, Clone, PartialEq)]
pub struct Subnet {
    pub group: String,
    pub subnet_type: SubnetType,
    /// Position in the region's AZ list
    pub az_index: usize,
    pub cidr: Ipv4Cidr,
    pub resource: ResourceRef,
    pub route_table: ResourceRef,
}

impl Subnet {
    pub fn id(&self) -> Expr {
        self.resource.to_ref()
    }

    pub fn availability_zone(&self) -> Expr {
        Expr::select_az(self.az_index)
    }
}

/// Which subnets a consumer wants
///
/// An empty selection picks the most private subnet type present
/// (private, then isolated, then public).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubnetSelection {
    pub group: Option<String>,
    pub subnet_type: Option<SubnetType>,
    pub availability_zones: Option<Vec<usize>>,
}

impl SubnetSelection {
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            group: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn of_type(subnet_type: SubnetType) -> Self {
        Self {
            subnet_type: Some(subnet_type),
            ..Self::default()
        }
    }

    /// Restrict to a single AZ index
    pub fn in_az(mut self, az_index: usize) -> Self {
        self.availability_zones = Some(vec![az_index]);
        self
    }

    pub fn in_azs(mut self, az_indexes: impl IntoIterator<Item = usize>) -> Self {
        self.availability_zones = Some(az_indexes.into_iter().collect());
        self
    }
}

impl fmt::Display for SubnetSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let group = self.group.as_deref().unwrap_or("*");
        let subnet_type = self.subnet_type.map(|t| t.as_str()).unwrap_or("*");
        match &self.availability_zones {
            Some(azs) => write!(f, "group={group} type={subnet_type} azs={azs:?}"),
            None => write!(f, "group={group} type={subnet_type}"),
        }
    }
}

/// Result of a subnet query, never empty
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedSubnets {
    subnets: Vec<Subnet>,
}

impl SelectedSubnets {
    pub fn subnets(&self) -> &[Subnet] {
        &self.subnets
    }

    pub fn ids(&self) -> Vec<Expr> {
        self.subnets.iter().map(Subnet::id).collect()
    }

    pub fn route_table_ids(&self) -> Vec<Expr> {
        self.subnets.iter().map(|s| s.route_table.to_ref()).collect()
    }

    pub fn first(&self) -> &Subnet {
        &self.subnets[0]
    }

    pub fn len(&self) -> usize {
        self.subnets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subnets.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Generated {
    vpc: ResourceRef,
    subnets: Vec<Subnet>,
    internet_gateway: Option<ResourceRef>,
    nat_gateways: Vec<ResourceRef>,
    vpn_gateway: Option<ResourceRef>,
}

/// VPC, subnet groups and gateways in their own nested stack
#[derive(Debug, Clone)]
pub struct NetworkStack {
    stack: Stack,
    cidr: Ipv4Cidr,
    groups: Vec<SubnetGroup>,
    max_azs: usize,
    vgw: bool,
    propagation: Option<SubnetSelection>,
    generated: Option<Generated>,
}

impl NetworkStack {
    pub fn new(id: &str, cidr: Ipv4Cidr) -> SynthResult<Self> {
        Ok(Self {
            stack: Stack::new(id)?,
            cidr,
            groups: Vec::new(),
            max_azs: DEFAULT_MAX_AZS,
            vgw: false,
            propagation: None,
            generated: None,
        })
    }

    fn ensure_declaring(&self, what: &str) -> SynthResult<()> {
        if self.generated.is_some() {
            return Err(SynthError::AlreadyGenerated(what.to_string()));
        }
        Ok(())
    }

    fn generated(&self) -> SynthResult<&Generated> {
        self.generated
            .as_ref()
            .ok_or_else(|| SynthError::NotGenerated("call generate() first".to_string()))
    }

    /// Declare a subnet group with an explicit netmask
    pub fn add_subnet_group(
        &mut self,
        name: &str,
        subnet_type: SubnetType,
        cidr_mask: u8,
    ) -> SynthResult<()> {
        self.ensure_declaring(name)?;
        validate_group_name(name)?;
        if self.groups.iter().any(|g| g.name == name) {
            return Err(SynthError::DuplicateSubnetGroup(name.to_string()));
        }

        debug!("Declared {} subnet group {} (/{})", subnet_type, name, cidr_mask);
        self.groups.push(SubnetGroup {
            name: name.to_string(),
            subnet_type,
            cidr_mask,
        });
        Ok(())
    }

    pub fn add_public_subnets(&mut self, name: &str) -> SynthResult<()> {
        self.add_subnet_group(name, SubnetType::Public, DEFAULT_SUBNET_MASK)
    }

    /// Private groups require a public group to host the NAT gateways
    pub fn add_private_subnets(&mut self, name: &str) -> SynthResult<()> {
        self.add_subnet_group(name, SubnetType::Private, DEFAULT_SUBNET_MASK)
    }

    pub fn add_isolated_subnets(&mut self, name: &str) -> SynthResult<()> {
        self.add_subnet_group(name, SubnetType::Isolated, DEFAULT_SUBNET_MASK)
    }

    pub fn set_vgw(&mut self, enabled: bool) -> SynthResult<()> {
        self.ensure_declaring("vgw")?;
        self.vgw = enabled;
        Ok(())
    }

    pub fn set_max_azs(&mut self, max_azs: usize) -> SynthResult<()> {
        self.ensure_declaring("max_azs")?;
        validate_az_count(max_azs)?;
        self.max_azs = max_azs;
        Ok(())
    }

    pub fn set_vgw_propagation_subnet(&mut self, selection: SubnetSelection) -> SynthResult<()> {
        self.ensure_declaring("vgw propagation")?;
        self.propagation = Some(selection);
        Ok(())
    }

    pub fn max_azs(&self) -> usize {
        self.max_azs
    }

    pub fn cidr(&self) -> Ipv4Cidr {
        self.cidr
    }

    pub fn is_generated(&self) -> bool {
        self.generated.is_some()
    }

    fn has_group_of(&self, subnet_type: SubnetType) -> bool {
        self.groups.iter().any(|g| g.subnet_type == subnet_type)
    }

    /// Zero without private groups, otherwise one per AZ
    pub fn nat_gateway_count(&self) -> usize {
        if self.has_group_of(SubnetType::Private) {
            self.max_azs
        } else {
            0
        }
    }

    /// Materialize the topology
    ///
    /// # Errors
    /// - `AlreadyGenerated` on a second call
    /// - `NoSubnetGroups` when nothing was declared
    /// - `NatRequiresPublicSubnet` for private groups without a public group
    /// - `Network(Exhausted)` when the VPC CIDR cannot hold every subnet
    pub fn generate(&mut self) -> SynthResult<()> {
        self.ensure_declaring("generate")?;
        if self.groups.is_empty() {
            return Err(SynthError::NoSubnetGroups);
        }
        if let Some(private) = self
            .groups
            .iter()
            .find(|g| g.subnet_type == SubnetType::Private)
        {
            if !self.has_group_of(SubnetType::Public) {
                return Err(SynthError::NatRequiresPublicSubnet(private.name.clone()));
            }
        }

        let vpc = self.stack.add_resource(
            VPC_ID,
            Resource::new(
                "AWS::EC2::VPC",
                Properties::new()
                    .set("CidrBlock", self.cidr.to_string())
                    .set("EnableDnsHostnames", true)
                    .set("EnableDnsSupport", true)
                    .set("InstanceTenancy", "default")
                    .set("Tags", name_tags(VPC_ID)),
            ),
        )?;

        let internet_gateway = if self.has_group_of(SubnetType::Public) {
            let igw = self.stack.add_resource(
                &format!("{VPC_ID}IGW"),
                Resource::new(
                    "AWS::EC2::InternetGateway",
                    Properties::new().set("Tags", name_tags(VPC_ID)),
                ),
            )?;
            let attachment = self.stack.add_resource(
                &format!("{VPC_ID}VPCGW"),
                Resource::new(
                    "AWS::EC2::VPCGatewayAttachment",
                    Properties::new()
                        .set("VpcId", &vpc)
                        .set("InternetGatewayId", &igw),
                ),
            )?;
            Some((igw, attachment))
        } else {
            None
        };

        let subnets = self.allocate_subnets(&vpc, internet_gateway.as_ref())?;
        let nat_gateways = self.declare_nat_gateways(&subnets)?;
        self.route_private_subnets(&subnets, &nat_gateways)?;

        let vpn_gateway = if self.vgw {
            Some(self.declare_vpn_gateway(&vpc, &subnets)?)
        } else {
            None
        };

        info!(
            "Generated VPC {} with {} subnets across {} AZs ({} NAT gateways)",
            self.cidr,
            subnets.len(),
            self.max_azs,
            nat_gateways.len()
        );

        self.generated = Some(Generated {
            vpc,
            subnets,
            internet_gateway: internet_gateway.map(|(igw, _)| igw),
            nat_gateways,
            vpn_gateway,
        });
        Ok(())
    }

    fn allocate_subnets(
        &mut self,
        vpc: &ResourceRef,
        internet_gateway: Option<&(ResourceRef, ResourceRef)>,
    ) -> SynthResult<Vec<Subnet>> {
        let mut allocator = CidrAllocator::new(self.cidr);
        let mut subnets = Vec::with_capacity(self.groups.len() * self.max_azs);

        for group in self.groups.clone() {
            for az_index in 0..self.max_azs {
                let cidr = allocator.allocate(group.cidr_mask)?;
                let base = format!("{VPC_ID}{}Subnet{}", group.name, az_index + 1);

                let resource = self.stack.add_resource(
                    &base,
                    Resource::new(
                        "AWS::EC2::Subnet",
                        Properties::new()
                            .set("VpcId", vpc)
                            .set("CidrBlock", cidr.to_string())
                            .set("AvailabilityZone", Expr::select_az(az_index))
                            .set("MapPublicIpOnLaunch", group.subnet_type == SubnetType::Public)
                            .set("Tags", subnet_tags(&group, az_index)),
                    ),
                )?;
                let route_table = self.stack.add_resource(
                    &format!("{base}RouteTable"),
                    Resource::new(
                        "AWS::EC2::RouteTable",
                        Properties::new()
                            .set("VpcId", vpc)
                            .set("Tags", name_tags(&base)),
                    ),
                )?;
                self.stack.add_resource(
                    &format!("{base}RouteTableAssociation"),
                    Resource::new(
                        "AWS::EC2::SubnetRouteTableAssociation",
                        Properties::new()
                            .set("RouteTableId", &route_table)
                            .set("SubnetId", &resource),
                    ),
                )?;

                if let (SubnetType::Public, Some((igw, attachment))) =
                    (group.subnet_type, internet_gateway)
                {
                    self.stack.add_resource(
                        &format!("{base}DefaultRoute"),
                        Resource::new(
                            "AWS::EC2::Route",
                            Properties::new()
                                .set("RouteTableId", &route_table)
                                .set("DestinationCidrBlock", Ipv4Cidr::ANY.to_string())
                                .set("GatewayId", igw),
                        )
                        .depends_on(attachment),
                    )?;
                }

                debug!("Allocated {} for {} in AZ {}", cidr, group.name, az_index);
                subnets.push(Subnet {
                    group: group.name.clone(),
                    subnet_type: group.subnet_type,
                    az_index,
                    cidr,
                    resource,
                    route_table,
                });
            }
        }

        Ok(subnets)
    }

    /// One NAT gateway per AZ, hosted in the first public group
    fn declare_nat_gateways(&mut self, subnets: &[Subnet]) -> SynthResult<Vec<ResourceRef>> {
        if self.nat_gateway_count() == 0 {
            return Ok(Vec::new());
        }

        let Some(first_public) = subnets.iter().find(|s| s.subnet_type == SubnetType::Public)
        else {
            return Ok(Vec::new());
        };
        let hosts: Vec<Subnet> = subnets
            .iter()
            .filter(|s| s.group == first_public.group)
            .cloned()
            .collect();

        let mut nat_gateways = Vec::with_capacity(hosts.len());
        for host in hosts {
            let base = host.resource.logical_id().to_string();
            let eip = self.stack.add_resource(
                &format!("{base}EIP"),
                Resource::new("AWS::EC2::EIP", Properties::new().set("Domain", "vpc")),
            )?;
            let nat = self.stack.add_resource(
                &format!("{base}NATGateway"),
                Resource::new(
                    "AWS::EC2::NatGateway",
                    Properties::new()
                        .set("SubnetId", &host.resource)
                        .set("AllocationId", eip.attr("AllocationId"))
                        .set("Tags", name_tags(&base)),
                ),
            )?;
            nat_gateways.push(nat);
        }
        Ok(nat_gateways)
    }

    fn route_private_subnets(
        &mut self,
        subnets: &[Subnet],
        nat_gateways: &[ResourceRef],
    ) -> SynthResult<()> {
        for subnet in subnets.iter().filter(|s| s.subnet_type == SubnetType::Private) {
            let Some(nat) = nat_gateways.get(subnet.az_index) else {
                continue;
            };
            self.stack.add_resource(
                &format!("{}DefaultRoute", subnet.resource.logical_id()),
                Resource::new(
                    "AWS::EC2::Route",
                    Properties::new()
                        .set("RouteTableId", &subnet.route_table)
                        .set("DestinationCidrBlock", Ipv4Cidr::ANY.to_string())
                        .set("NatGatewayId", nat),
                ),
            )?;
        }
        Ok(())
    }

    fn declare_vpn_gateway(&mut self, vpc: &ResourceRef, subnets: &[Subnet]) -> SynthResult<ResourceRef> {
        let vgw = self.stack.add_resource(
            &format!("{VPC_ID}VpnGateway"),
            Resource::new(
                "AWS::EC2::VPNGateway",
                Properties::new()
                    .set("Type", "ipsec.1")
                    .set("Tags", name_tags(VPC_ID)),
            ),
        )?;
        let attachment = self.stack.add_resource(
            &format!("{VPC_ID}VPCVPNGW"),
            Resource::new(
                "AWS::EC2::VPCGatewayAttachment",
                Properties::new()
                    .set("VpcId", vpc)
                    .set("VpnGatewayId", &vgw),
            ),
        )?;

        let propagation = match &self.propagation {
            Some(selection) => select(&self.groups, subnets, selection)?,
            None => {
                let default_type = if self.has_group_of(SubnetType::Private) {
                    SubnetType::Private
                } else {
                    SubnetType::Isolated
                };
                match select(&self.groups, subnets, &SubnetSelection::of_type(default_type)) {
                    Ok(selected) => selected,
                    Err(SynthError::EmptySelection(_)) => {
                        debug!("No private or isolated subnets, skipping VGW route propagation");
                        return Ok(vgw);
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        self.stack.add_resource(
            &format!("{VPC_ID}RoutePropagation"),
            Resource::new(
                "AWS::EC2::VPNGatewayRoutePropagation",
                Properties::new()
                    .set("RouteTableIds", Expr::list(propagation.route_table_ids()))
                    .set("VpnGatewayId", &vgw),
            )
            .depends_on(&attachment),
        )?;
        debug!("VGW routes propagate to {} route tables", propagation.len());

        Ok(vgw)
    }

    pub fn vpc(&self) -> SynthResult<&ResourceRef> {
        Ok(&self.generated()?.vpc)
    }

    /// `Fn::GetAtt [SwiftVPC, CidrBlock]`
    pub fn vpc_cidr_block(&self) -> SynthResult<Expr> {
        Ok(self.vpc()?.attr("CidrBlock"))
    }

    pub fn internet_gateway(&self) -> SynthResult<Option<&ResourceRef>> {
        Ok(self.generated()?.internet_gateway.as_ref())
    }

    pub fn nat_gateways(&self) -> SynthResult<&[ResourceRef]> {
        Ok(&self.generated()?.nat_gateways)
    }

    pub fn vpn_gateway(&self) -> SynthResult<Option<&ResourceRef>> {
        Ok(self.generated()?.vpn_gateway.as_ref())
    }

    pub fn subnets(&self) -> SynthResult<&[Subnet]> {
        Ok(&self.generated()?.subnets)
    }

    /// General subnet query
    ///
    /// # Errors
    /// - `NotGenerated` before [`generate`](Self::generate)
    /// - `UnknownSubnetGroup` for an undeclared group
    /// - `SubnetTypeMismatch` when group and type disagree
    /// - `EmptySelection` when nothing matches
    pub fn select_subnets(&self, selection: &SubnetSelection) -> SynthResult<SelectedSubnets> {
        let generated = self.generated()?;
        select(&self.groups, &generated.subnets, selection)
    }

    fn typed_subnets(&self, subnet_type: SubnetType, group: &str) -> SynthResult<SelectedSubnets> {
        let selection = SubnetSelection {
            group: (!group.is_empty()).then(|| group.to_string()),
            subnet_type: Some(subnet_type),
            availability_zones: None,
        };
        self.select_subnets(&selection)
    }

    /// Public subnets of `group`, or of every public group when `group` is empty
    pub fn public_subnets(&self, group: &str) -> SynthResult<SelectedSubnets> {
        self.typed_subnets(SubnetType::Public, group)
    }

    pub fn private_subnets(&self, group: &str) -> SynthResult<SelectedSubnets> {
        self.typed_subnets(SubnetType::Private, group)
    }

    pub fn isolated_subnets(&self, group: &str) -> SynthResult<SelectedSubnets> {
        self.typed_subnets(SubnetType::Isolated, group)
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn into_stack(self) -> Stack {
        self.stack
    }
}

fn select(
    groups: &[SubnetGroup],
    subnets: &[Subnet],
    selection: &SubnetSelection,
) -> SynthResult<SelectedSubnets> {
    let subnet_type = match &selection.group {
        Some(name) => {
            let group = groups
                .iter()
                .find(|g| &g.name == name)
                .ok_or_else(|| SynthError::UnknownSubnetGroup(name.clone()))?;
            if let Some(expected) = selection.subnet_type {
                if expected != group.subnet_type {
                    return Err(SynthError::SubnetTypeMismatch {
                        group: name.clone(),
                        expected: expected.to_string(),
                        actual: group.subnet_type.to_string(),
                    });
                }
            }
            group.subnet_type
        }
        None => match selection.subnet_type {
            Some(subnet_type) => subnet_type,
            None => [SubnetType::Private, SubnetType::Isolated, SubnetType::Public]
                .into_iter()
                .find(|t| groups.iter().any(|g| g.subnet_type == *t))
                .ok_or(SynthError::NoSubnetGroups)?,
        },
    };

    let selected: Vec<Subnet> = subnets
        .iter()
        .filter(|s| s.subnet_type == subnet_type)
        .filter(|s| selection.group.as_ref().map_or(true, |g| &s.group == g))
        .filter(|s| {
            selection
                .availability_zones
                .as_ref()
                .map_or(true, |azs| azs.contains(&s.az_index))
        })
        .cloned()
        .collect();

    if selected.is_empty() {
        return Err(SynthError::EmptySelection(selection.to_string()));
    }
    Ok(SelectedSubnets { subnets: selected })
}

fn subnet_tags(group: &SubnetGroup, az_index: usize) -> Expr {
    let mut tags = name_tags(&format!("{}Subnet{}", group.name, az_index + 1));
    if let Expr::List(items) = &mut tags {
        items.push(super::tag("swift:subnet-name", group.name.as_str()));
        items.push(super::tag("swift:subnet-type", group.subnet_type.as_str()));
    }
    tags
}
