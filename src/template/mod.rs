// Copyright (c) 2025 - Cowboy AI, Inc.
//! CloudFormation Template Model
//!
//! A small declarative model of what the topology builders emit:
//! stacks of typed resources whose property values are [`Expr`] trees.
//! Nothing here knows about SWIFT; the builders in [`crate::stacks`]
//! supply the semantics and [`App::synthesize`] produces the JSON.

pub mod expr;
pub mod policy;
pub mod stack;
pub mod synth;

pub use expr::{Expr, LocalResolver, Properties, Pseudo, ReferenceResolver, ResourceRef, StackId};
pub use policy::{Effect, PolicyDocument, PolicyStatement, Principal};
pub use stack::{DeletionPolicy, Output, Parameter, Resource, Stack};
pub use synth::{App, AssetLocation, CloudAssembly, ASSET_BUCKET_PARAMETER, ASSET_PREFIX_PARAMETER};
