/*
 * SPDX-FileCopyrightText: 2023 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::{fs::File, io::BufReader, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser};

use crate::{
    cli::{status, warning},
    config::{Config, ProfileSource},
    context,
    engine::{IdentityOverrideEngine, InitReport, Outcome},
    guard::AttestationGuard,
    identity::BuildInfo,
    state::ProcessState,
};

fn load_config(group: &EngineGroup) -> Result<Config> {
    let mut config = match &group.config {
        Some(p) => Config::load(p).with_context(|| format!("Failed to load config: {p:?}"))?,
        None => Config::default(),
    };

    if group.disable {
        config.enabled = false;
    }

    if group.legacy {
        config.profile.source = ProfileSource::Legacy;
    } else if let Some(p) = &group.profile {
        config.profile.source = ProfileSource::File;
        config.profile.path.clone_from(p);
    }

    Ok(config)
}

fn load_baseline(group: &EngineGroup) -> Result<BuildInfo> {
    let Some(path) = &group.build_prop else {
        return Ok(BuildInfo::default());
    };

    let file =
        File::open(path).with_context(|| format!("Failed to open for reading: {path:?}"))?;

    BuildInfo::from_build_prop(BufReader::new(file))
        .with_context(|| format!("Failed to load build properties: {path:?}"))
}

/// Load `baseline` into `state` and run the engine against it.
fn initialize(
    process: &ProcessGroup,
    group: &EngineGroup,
    baseline: BuildInfo,
    state: &ProcessState,
) -> Result<(IdentityOverrideEngine, InitReport)> {
    let config = load_config(group)?;
    state.reset_identity(baseline);

    let engine = IdentityOverrideEngine::new(config);
    let report = engine.initialize(state, &process.package, &process.process);

    match report.outcome {
        Outcome::MissingIdentity => warning!("Package or process name is empty"),
        Outcome::Disabled => status!("Identity spoofing is disabled"),
        Outcome::Evaluated => {}
    }

    for o in &report.overrides {
        match &o.result {
            Ok(()) => status!("Set {} to {:?}", o.key, o.value),
            Err(e) => warning!("Failed to set {} to {:?}: {e}", o.key, o.value),
        }
    }

    if let Some(e) = &report.profile_error {
        warning!("Profile was not applied: {e}");
    }

    Ok((engine, report))
}

fn print_identity(before: &BuildInfo, after: &BuildInfo, all: bool) {
    for ((key, old), (_, new)) in before.fields().into_iter().zip(after.fields()) {
        if old != new {
            println!("{key}: {old:?} -> {new:?}");
        } else if all {
            println!("{key}: {new:?}");
        }
    }
}

pub fn init_main(cli: &InitCli) -> Result<()> {
    let state = ProcessState::global();

    let baseline = load_baseline(&cli.engine)?;
    initialize(&cli.process, &cli.engine, baseline.clone(), state)?;

    print_identity(&baseline, &state.identity(), cli.all);
    status!("Process flagged as spoofed: {}", state.is_monitored());

    Ok(())
}

pub fn guard_main(cli: &GuardCli) -> Result<()> {
    let state = ProcessState::global();
    let baseline = load_baseline(&cli.engine)?;
    let (engine, _) = initialize(&cli.process, &cli.engine, baseline, state)?;

    let guard = AttestationGuard::from_config(state.flag(), &engine.config().guard);
    let _frames = cli
        .frame
        .iter()
        .map(|f| context::enter(f))
        .collect::<Vec<_>>();

    guard
        .check_current()
        .context("Certificate chain access was rejected")?;

    status!("Certificate chain access is allowed");

    Ok(())
}

#[derive(Debug, Args)]
pub struct ProcessGroup {
    /// Package name of the application being started.
    #[arg(long, value_name = "PACKAGE")]
    pub package: String,

    /// Process name of the application being started.
    #[arg(long, value_name = "PROCESS")]
    pub process: String,
}

#[derive(Debug, Args)]
pub struct EngineGroup {
    /// Path to engine config (TOML).
    #[arg(short, long, value_name = "FILE", value_parser)]
    pub config: Option<PathBuf>,

    /// Path to the identity profile (JSON).
    #[arg(long, value_name = "FILE", value_parser, conflicts_with = "legacy")]
    pub profile: Option<PathBuf>,

    /// Use the compiled-in legacy profile.
    #[arg(long)]
    pub legacy: bool,

    /// Disable identity spoofing.
    #[arg(long)]
    pub disable: bool,

    /// Load the baseline identity from a build.prop file.
    #[arg(long, value_name = "FILE", value_parser)]
    pub build_prop: Option<PathBuf>,
}

/// Run process initialization and show the resulting identity.
///
/// Only fields that differ from the baseline identity are shown unless
/// `--all` is specified.
#[derive(Debug, Parser)]
pub struct InitCli {
    #[command(flatten)]
    pub process: ProcessGroup,

    #[command(flatten)]
    pub engine: EngineGroup,

    /// Show all fields.
    #[arg(short, long)]
    pub all: bool,
}

/// Run process initialization and check certificate chain access.
///
/// Fails if access is rejected for the given call context.
#[derive(Debug, Parser)]
pub struct GuardCli {
    #[command(flatten)]
    pub process: ProcessGroup,

    #[command(flatten)]
    pub engine: EngineGroup,

    /// Component on the call path, outermost first. Can be repeated.
    #[arg(short, long, value_name = "NAME")]
    pub frame: Vec<String>,
}
