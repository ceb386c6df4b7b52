// SPDX-FileCopyrightText: 2023 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::profile;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to read config: {0:?}")]
    Read(PathBuf, #[source] io::Error),
    #[error("Failed to parse config: {0:?}")]
    Parse(PathBuf, #[source] toml_edit::de::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Callers whose identity is inspected during initialization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Targets {
    /// Package that gets a fresh `TIME` on every launch.
    pub package: String,
    /// Process of [`Self::package`] that receives the full profile.
    pub process: String,
    /// Packages with this prefix get the vendor brand override.
    pub vendor_prefix: String,
}

impl Default for Targets {
    fn default() -> Self {
        Self {
            package: "com.google.android.gms".to_owned(),
            process: "com.google.android.gms.unstable".to_owned(),
            vendor_prefix: "com.samsung.android.".to_owned(),
        }
    }
}

/// Values reported to vendor apps, which crash when they find their own brand
/// on a non-vendor build.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Vendor {
    pub brand: String,
    pub manufacturer: String,
}

impl Default for Vendor {
    fn default() -> Self {
        Self {
            brand: "google".to_owned(),
            manufacturer: "google".to_owned(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileSource {
    /// The compiled-in legacy device profile.
    Legacy,
    /// A persisted JSON document at [`Profile::path`].
    #[default]
    File,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Profile {
    pub source: ProfileSource,
    pub path: PathBuf,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            source: ProfileSource::default(),
            path: PathBuf::from(profile::DEFAULT_PATH),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Guard {
    /// Substring identifying the integrity verification component in a call
    /// context.
    pub marker: String,
}

impl Default for Guard {
    fn default() -> Self {
        Self {
            marker: "DroidGuard".to_owned(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Global spoofing toggle.
    pub enabled: bool,
    pub targets: Targets,
    pub vendor: Vendor,
    pub profile: Profile,
    pub guard: Guard,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            targets: Targets::default(),
            vendor: Vendor::default(),
            profile: Profile::default(),
            guard: Guard::default(),
        }
    }
}

impl Config {
    pub fn from_toml(data: &str, path: &Path) -> Result<Self> {
        toml_edit::de::from_str(data).map_err(|e| Error::Parse(path.to_owned(), e))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| Error::Read(path.to_owned(), e))?;

        Self::from_toml(&data, path)
    }
}
