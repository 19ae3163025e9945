// Copyright (c) 2025 - Cowboy AI, Inc.
//! SWIFT Connectivity Synthesizer
//!
//! Synthesizes the SWIFT connectivity deployment into CloudFormation
//! templates, and converts deployed stack outputs into the outputs file.
//!
//! Run with: cargo run --bin swift-synth -- synth --context-file cdk.json
//!
//! Prerequisites:
//! 1. CDK_DEFAULT_ACCOUNT and CDK_DEFAULT_REGION set
//! 2. Cached lookups (`prefix-list:*`, `ami:*`) in the context, or the
//!    `aws` feature with `--live` and AWS credentials

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::info;

use swift_infrastructure::config::{ACCOUNT_VAR, REGION_VAR};
use swift_infrastructure::lookup::{CloudLookup, ContextLookup};
use swift_infrastructure::outputs::{collect_outputs, write_outputs};
use swift_infrastructure::stacks::root_output_names;
use swift_infrastructure::{Context, Environment, SwiftSettings, SwiftTopology};

#[derive(Parser, Debug)]
#[command(name = "swift-synth")]
#[command(version)]
#[command(about = "Synthesize the SWIFT connectivity deployment", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Target account
    #[arg(long, global = true, env = ACCOUNT_VAR)]
    account: Option<String>,

    /// Target region
    #[arg(long, global = true, env = REGION_VAR)]
    region: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the root and nested templates plus the manifest
    Synth(SynthArgs),

    /// Convert `describe-stacks` JSON into `<region>_outputs.json`
    Outputs(OutputsArgs),
}

#[derive(Args, Debug)]
struct SynthArgs {
    /// Context file shaped like cdk.json
    #[arg(long)]
    context_file: Option<PathBuf>,

    /// Context override (key=value), repeatable
    #[arg(short = 'c', long = "context", action = clap::ArgAction::Append)]
    context: Vec<String>,

    /// Output directory
    #[arg(short, long, default_value = "cdk.out")]
    out_dir: PathBuf,

    /// Resolve prefix lists and images against EC2 instead of the context
    #[arg(long)]
    live: bool,
}

#[derive(Args, Debug)]
struct OutputsArgs {
    /// `aws cloudformation describe-stacks` response
    input: PathBuf,

    /// Directory the outputs file is written to
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let env = Environment::new(
        cli.account.unwrap_or_default(),
        cli.region.unwrap_or_default(),
    )
    .with_context(|| format!("Please set {REGION_VAR} and {ACCOUNT_VAR}"))?;

    match cli.command {
        Commands::Synth(args) => synth(&env, args),
        Commands::Outputs(args) => outputs(&env, args),
    }
}

fn synth(env: &Environment, args: SynthArgs) -> Result<()> {
    let mut context = match &args.context_file {
        Some(path) => Context::from_file(path)
            .with_context(|| format!("Failed to load context from {}", path.display()))?,
        None => Context::new(),
    };
    for assignment in &args.context {
        context
            .apply_override(assignment)
            .with_context(|| format!("Invalid --context {assignment}"))?;
    }

    let settings = SwiftSettings::from_context(&context).context("Invalid context")?;
    let lookup = lookup(env, context, args.live)?;

    let topology = SwiftTopology::build(env, &settings, lookup.as_ref())
        .context("Failed to assemble the SWIFT topology")?;
    let assembly = topology
        .app
        .synthesize()
        .context("Failed to synthesize templates")?;
    let written = assembly
        .write_to(&args.out_dir)
        .with_context(|| format!("Failed to write {}", args.out_dir.display()))?;

    info!(
        "Synthesized {} files into {}",
        written.len(),
        args.out_dir.display()
    );
    Ok(())
}

#[cfg(feature = "aws")]
fn lookup(env: &Environment, context: Context, live: bool) -> Result<Box<dyn CloudLookup>> {
    if live {
        let lookup = swift_infrastructure::Ec2Lookup::new(&env.region)
            .context("Failed to initialize EC2 lookups")?;
        return Ok(Box::new(lookup));
    }
    Ok(Box::new(ContextLookup::new(context)))
}

#[cfg(not(feature = "aws"))]
fn lookup(_env: &Environment, context: Context, live: bool) -> Result<Box<dyn CloudLookup>> {
    if live {
        anyhow::bail!("--live requires the `aws` feature");
    }
    Ok(Box::new(ContextLookup::new(context)))
}

fn outputs(env: &Environment, args: OutputsArgs) -> Result<()> {
    let response = fs::read_to_string(&args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    let outputs = collect_outputs(&response, &env.root_stack_name(), &root_output_names())
        .context("Deployed stack outputs are incomplete")?;
    write_outputs(&args.out_dir, &env.region, &outputs).context("Failed to write outputs")?;
    Ok(())
}
