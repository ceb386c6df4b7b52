// SPDX-FileCopyrightText: 2023 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::identity::{self, BuildInfo, FieldKey};

/// Well-known location of the persisted profile.
pub const DEFAULT_PATH: &str = "/data/system/gms_certified_props.json";

/// Profiles larger than this are rejected without being parsed.
pub const MAX_SIZE: u64 = 64 * 1024;

/// A device that is old enough to not be subject to hardware-backed
/// attestation.
static LEGACY: &[(&str, &str)] = &[
    (
        "FINGERPRINT",
        "google/marlin/marlin:7.1.2/NJH47F/4146041:user/release-keys",
    ),
    ("PRODUCT", "marlin"),
    ("DEVICE", "marlin"),
    ("MODEL", "Pixel XL"),
];

#[derive(Debug, Error)]
pub enum Error {
    #[error("Profile is empty: {0:?}")]
    Empty(PathBuf),
    #[error("Profile is larger than 64 KiB: {0:?}")]
    TooLarge(PathBuf),
    #[error("Profile is not a JSON object: {0:?}")]
    NotAnObject(PathBuf),
    #[error("Failed to parse profile: {0:?}")]
    Json(PathBuf, #[source] serde_json::Error),
    #[error("Failed to read profile: {0:?}")]
    Io(PathBuf, #[source] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// Value of a profile entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryValue {
    /// A string, or a number or boolean in its JSON representation.
    Scalar(String),
    /// A null, array, or object in its JSON representation. It is kept so that
    /// the entry can be reported, but it can never be applied.
    NotScalar(String),
}

impl EntryValue {
    /// The value as it appears in the profile.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Scalar(s) | Self::NotScalar(s) => s,
        }
    }

    /// Resolve the value to apply to `key`. Fails if the value is not a
    /// scalar.
    pub fn to_field_value(&self, key: &FieldKey) -> std::result::Result<&str, identity::Error> {
        match self {
            Self::Scalar(s) => Ok(s),
            Self::NotScalar(s) => Err(identity::Error::NotAScalar {
                key: key.clone(),
                value: s.clone(),
            }),
        }
    }
}

/// An ordered set of field overrides. Keys are raw field keys (see
/// [`FieldKey::parse`]) and are kept in the order they were loaded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityProfile {
    entries: Vec<(String, EntryValue)>,
}

impl IdentityProfile {
    pub fn new(entries: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k, EntryValue::Scalar(v)))
                .collect(),
        }
    }

    /// The compiled-in legacy device profile.
    pub fn legacy() -> Self {
        Self::new(LEGACY.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())))
    }

    /// Load a profile from a JSON document containing a single object. String
    /// values are used as-is and numbers and booleans are converted to their
    /// JSON representation. Other values are kept as [`EntryValue::NotScalar`]
    /// and fail individually when applied.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::Io(path.to_owned(), e))?;
        let mut data = Vec::new();

        // Read one byte past the limit to detect oversized files without
        // trusting the file size reported by the filesystem.
        file.take(MAX_SIZE + 1)
            .read_to_end(&mut data)
            .map_err(|e| Error::Io(path.to_owned(), e))?;

        if data.len() as u64 > MAX_SIZE {
            return Err(Error::TooLarge(path.to_owned()));
        }

        Self::parse(path, &data)
    }

    fn parse(path: &Path, data: &[u8]) -> Result<Self> {
        if data.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::Empty(path.to_owned()));
        }

        let value: Value =
            serde_json::from_slice(data).map_err(|e| Error::Json(path.to_owned(), e))?;
        let Value::Object(object) = value else {
            return Err(Error::NotAnObject(path.to_owned()));
        };

        let mut entries = Vec::with_capacity(object.len());

        for (key, value) in object {
            let value = match value {
                Value::String(s) => EntryValue::Scalar(s),
                Value::Number(n) => EntryValue::Scalar(n.to_string()),
                Value::Bool(b) => EntryValue::Scalar(b.to_string()),
                v @ (Value::Null | Value::Array(_) | Value::Object(_)) => {
                    EntryValue::NotScalar(v.to_string())
                }
            };

            entries.push((key, value));
        }

        debug!("Loaded {} profile entries from {path:?}", entries.len());

        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[(String, EntryValue)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Dry-run every entry against a scratch identity and return the entries
    /// that would fail to apply.
    pub fn check(&self) -> Vec<(String, identity::Error)> {
        let mut scratch = BuildInfo::default();

        self.entries
            .iter()
            .filter_map(|(k, v)| {
                let key = FieldKey::parse(k);

                v.to_field_value(&key)
                    .and_then(|v| scratch.set_field(&key, v))
                    .err()
                    .map(|e| (k.clone(), e))
            })
            .collect()
    }
}
