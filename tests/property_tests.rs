// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests Entry Point
//!
//! This test suite uses proptest to verify properties of subnet allocation
//! that must hold for every VPC range and subnet layout.

mod property;
