// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Test Modules

mod cidr_allocation;
