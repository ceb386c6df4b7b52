/*
 * SPDX-FileCopyrightText: 2023 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};

use crate::{
    cli::{status, warning},
    profile::{EntryValue, IdentityProfile},
};

fn load_profile(input: &InputGroup) -> Result<IdentityProfile> {
    let profile = match &input.input {
        Some(p) => IdentityProfile::load(p)?,
        None => IdentityProfile::legacy(),
    };

    Ok(profile)
}

pub fn profile_main(cli: &ProfileCli) -> Result<()> {
    match &cli.command {
        ProfileCommand::Show(c) => {
            let profile = load_profile(&c.input)?;

            for (key, value) in profile.entries() {
                match value {
                    EntryValue::Scalar(v) => println!("{key}: {v:?}"),
                    EntryValue::NotScalar(v) => println!("{key}: {v} (not applicable)"),
                }
            }
        }
        ProfileCommand::Check(c) => {
            let profile = load_profile(&c.input)?;
            let failed = profile.check();

            for (key, e) in &failed {
                warning!("{key}: {e}");
            }

            if !failed.is_empty() {
                bail!("{} of {} entries cannot be applied", failed.len(), profile.len());
            }

            status!("All {} entries can be applied", profile.len());
        }
    }

    Ok(())
}

#[derive(Debug, Args)]
pub struct InputGroup {
    /// Path to profile (JSON). The compiled-in legacy profile is used if
    /// unspecified.
    #[arg(short, long, value_name = "FILE", value_parser)]
    pub input: Option<PathBuf>,
}

/// Show profile entries in document order.
#[derive(Debug, Parser)]
pub struct ShowCli {
    #[command(flatten)]
    pub input: InputGroup,
}

/// Check that every profile entry refers to a writable field with a valid
/// value.
#[derive(Debug, Parser)]
pub struct CheckCli {
    #[command(flatten)]
    pub input: InputGroup,
}

#[derive(Debug, Subcommand)]
pub enum ProfileCommand {
    Show(ShowCli),
    Check(CheckCli),
}

/// Inspect identity profiles.
#[derive(Debug, Parser)]
pub struct ProfileCli {
    #[command(subcommand)]
    pub command: ProfileCommand,
}
