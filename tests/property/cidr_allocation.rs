// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Subnet Allocation
//!
//! Subnets carved out of a VPC range must be aligned, disjoint and inside
//! the parent range, whether they come straight from the allocator or from
//! a generated network topology.

use proptest::prelude::*;
use std::net::Ipv4Addr;
use swift_infrastructure::domain::network::NetworkError;
use swift_infrastructure::domain::{CidrAllocator, Ipv4Cidr};
use swift_infrastructure::stacks::{NetworkStack, SubnetType};

// ============================================================================
// Strategies
// ============================================================================

/// Private-range parent networks between /16 and /24
fn parent_cidr() -> impl Strategy<Value = Ipv4Cidr> {
    (any::<u32>(), 16u8..=24).prop_map(|(bits, prefix)| {
        let base = u32::from(Ipv4Addr::new(10, 0, 0, 0)) | (bits & 0x00ff_ffff);
        let mask = u32::MAX << (32 - u32::from(prefix));
        Ipv4Cidr::from_parts(Ipv4Addr::from(base & mask), prefix).unwrap()
    })
}

fn masks() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(16u8..=28, 1..24)
}

fn first(cidr: &Ipv4Cidr) -> u64 {
    u64::from(u32::from(cidr.network()))
}

// ============================================================================
// Allocator Properties
// ============================================================================

proptest! {
    /// Every block is aligned to its own size and lies inside the parent
    #[test]
    fn prop_blocks_aligned_and_contained(parent in parent_cidr(), masks in masks()) {
        let mut allocator = CidrAllocator::new(parent);
        for mask in masks {
            match allocator.allocate(mask) {
                Ok(block) => {
                    prop_assert_eq!(block.prefix_length(), mask);
                    prop_assert_eq!(first(&block) % block.size(), 0);
                    prop_assert!(parent.contains_cidr(&block));
                }
                Err(NetworkError::MaskTooWide { .. }) => prop_assert!(mask < parent.prefix_length()),
                Err(NetworkError::Exhausted(_)) => {}
                Err(other) => prop_assert!(false, "unexpected error {}", other),
            }
        }
    }

    /// No two blocks handed out by one allocator overlap
    #[test]
    fn prop_blocks_disjoint(parent in parent_cidr(), masks in masks()) {
        let mut allocator = CidrAllocator::new(parent);
        let blocks: Vec<Ipv4Cidr> = masks
            .into_iter()
            .filter_map(|mask| allocator.allocate(mask).ok())
            .collect();

        for (i, a) in blocks.iter().enumerate() {
            for b in &blocks[i + 1..] {
                prop_assert!(!a.overlaps(b), "{} overlaps {}", a, b);
            }
        }
    }

    /// Remaining space only shrinks, and never past zero
    #[test]
    fn prop_remaining_monotonic(parent in parent_cidr(), masks in masks()) {
        let mut allocator = CidrAllocator::new(parent);
        let mut remaining = allocator.remaining();
        prop_assert_eq!(remaining, parent.size());

        for mask in masks {
            let _ = allocator.allocate(mask);
            prop_assert!(allocator.remaining() <= remaining);
            remaining = allocator.remaining();
        }
    }
}

// ============================================================================
// Network Topology Properties
// ============================================================================

proptest! {
    /// Generated subnets are disjoint, inside the VPC, one per group and AZ
    #[test]
    fn prop_network_subnets_partition_vpc(groups in 1usize..=6, max_azs in 1usize..=3) {
        let vpc = Ipv4Cidr::new("10.10.0.0/16").unwrap();
        let mut network = NetworkStack::new("SwiftConnectivityVPC", vpc).unwrap();
        network.set_max_azs(max_azs).unwrap();
        for index in 0..groups {
            network.add_isolated_subnets(&format!("Group{index}")).unwrap();
        }
        network.generate().unwrap();

        let subnets = network.subnets().unwrap();
        prop_assert_eq!(subnets.len(), groups * max_azs);
        prop_assert_eq!(network.nat_gateway_count(), 0);

        for (i, a) in subnets.iter().enumerate() {
            prop_assert!(vpc.contains_cidr(&a.cidr));
            prop_assert_eq!(a.subnet_type, SubnetType::Isolated);
            prop_assert!(a.az_index < max_azs);
            for b in &subnets[i + 1..] {
                prop_assert!(!a.cidr.overlaps(&b.cidr), "{} overlaps {}", a.cidr, b.cidr);
            }
        }
    }

    /// A VPC too small for the layout fails generation instead of overlapping
    #[test]
    fn prop_small_vpc_exhausts(prefix in 20u8..=24, groups in 1usize..=20) {
        let vpc = Ipv4Cidr::from_parts(Ipv4Addr::new(10, 10, 0, 0), prefix).unwrap();
        let mut network = NetworkStack::new("SwiftConnectivityVPC", vpc).unwrap();
        for index in 0..groups {
            network.add_isolated_subnets(&format!("Group{index}")).unwrap();
        }

        let capacity = 1usize << (24 - prefix);
        let needed = groups * network.max_azs();
        prop_assert_eq!(network.generate().is_ok(), needed <= capacity);
    }
}
