// SPDX-FileCopyrightText: 2023 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    fmt,
    io::{self, BufRead},
    num::ParseIntError,
};

use phf::phf_map;
use thiserror::Error;
use tracing::trace;

/// Prefix selecting the nested `Build.VERSION` namespace in a field key.
pub const VERSION_PREFIX: &str = "VERSION:";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown field: {0}")]
    UnknownField(FieldKey),
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue {
        key: FieldKey,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("Value for {key} is not a string, number, or boolean: {value}")]
    NotAScalar { key: FieldKey, value: String },
    #[error("Invalid value for property {name}: {value:?}")]
    InvalidProperty {
        name: String,
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("I/O error")]
    Io(#[from] io::Error),
}

type Result<T> = std::result::Result<T, Error>;

/// A parsed field key. Keys starting with [`VERSION_PREFIX`] refer to
/// `Build.VERSION` fields and everything else refers to top-level `Build`
/// fields.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Build(String),
    Version(String),
}

impl FieldKey {
    pub fn parse(key: &str) -> Self {
        match key.strip_prefix(VERSION_PREFIX) {
            Some(name) => Self::Version(name.to_owned()),
            None => Self::Build(key.to_owned()),
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build(n) => write!(f, "Build.{n}"),
            Self::Version(n) => write!(f, "Build.VERSION.{n}"),
        }
    }
}

/// Fields of `Build.VERSION`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VersionInfo {
    pub release: String,
    pub release_or_codename: String,
    pub codename: String,
    pub incremental: String,
    pub base_os: String,
    pub security_patch: String,
    pub sdk_int: i32,
    pub preview_sdk_int: i32,
    pub device_initial_sdk_int: i32,
    pub media_performance_class: i32,
}

/// The device identity fields of `Build`, which the rest of the process reads
/// as the platform identity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildInfo {
    pub id: String,
    pub display: String,
    pub product: String,
    pub device: String,
    pub board: String,
    pub manufacturer: String,
    pub brand: String,
    pub model: String,
    pub bootloader: String,
    pub hardware: String,
    pub fingerprint: String,
    pub r#type: String,
    pub tags: String,
    pub host: String,
    pub user: String,
    pub radio: String,
    pub sku: String,
    pub odm_sku: String,
    pub soc_manufacturer: String,
    pub soc_model: String,
    pub time: i64,
    pub version: VersionInfo,
}

type Setter<T> = fn(&mut T, &str) -> std::result::Result<(), ParseIntError>;

fn set_str(field: &mut String, value: &str) -> std::result::Result<(), ParseIntError> {
    value.clone_into(field);
    Ok(())
}

fn set_i32(field: &mut i32, value: &str) -> std::result::Result<(), ParseIntError> {
    *field = value.parse()?;
    Ok(())
}

fn set_i64(field: &mut i64, value: &str) -> std::result::Result<(), ParseIntError> {
    *field = value.parse()?;
    Ok(())
}

static BUILD_FIELDS: phf::Map<&'static str, Setter<BuildInfo>> = phf_map! {
    "ID" => |b: &mut BuildInfo, v: &str| set_str(&mut b.id, v),
    "DISPLAY" => |b: &mut BuildInfo, v: &str| set_str(&mut b.display, v),
    "PRODUCT" => |b: &mut BuildInfo, v: &str| set_str(&mut b.product, v),
    "DEVICE" => |b: &mut BuildInfo, v: &str| set_str(&mut b.device, v),
    "BOARD" => |b: &mut BuildInfo, v: &str| set_str(&mut b.board, v),
    "MANUFACTURER" => |b: &mut BuildInfo, v: &str| set_str(&mut b.manufacturer, v),
    "BRAND" => |b: &mut BuildInfo, v: &str| set_str(&mut b.brand, v),
    "MODEL" => |b: &mut BuildInfo, v: &str| set_str(&mut b.model, v),
    "BOOTLOADER" => |b: &mut BuildInfo, v: &str| set_str(&mut b.bootloader, v),
    "HARDWARE" => |b: &mut BuildInfo, v: &str| set_str(&mut b.hardware, v),
    "FINGERPRINT" => |b: &mut BuildInfo, v: &str| set_str(&mut b.fingerprint, v),
    "TYPE" => |b: &mut BuildInfo, v: &str| set_str(&mut b.r#type, v),
    "TAGS" => |b: &mut BuildInfo, v: &str| set_str(&mut b.tags, v),
    "HOST" => |b: &mut BuildInfo, v: &str| set_str(&mut b.host, v),
    "USER" => |b: &mut BuildInfo, v: &str| set_str(&mut b.user, v),
    "RADIO" => |b: &mut BuildInfo, v: &str| set_str(&mut b.radio, v),
    "SKU" => |b: &mut BuildInfo, v: &str| set_str(&mut b.sku, v),
    "ODM_SKU" => |b: &mut BuildInfo, v: &str| set_str(&mut b.odm_sku, v),
    "SOC_MANUFACTURER" => |b: &mut BuildInfo, v: &str| set_str(&mut b.soc_manufacturer, v),
    "SOC_MODEL" => |b: &mut BuildInfo, v: &str| set_str(&mut b.soc_model, v),
    "TIME" => |b: &mut BuildInfo, v: &str| set_i64(&mut b.time, v),
};

static VERSION_FIELDS: phf::Map<&'static str, Setter<VersionInfo>> = phf_map! {
    "RELEASE" => |b: &mut VersionInfo, v: &str| set_str(&mut b.release, v),
    "RELEASE_OR_CODENAME" => |b: &mut VersionInfo, v: &str| set_str(&mut b.release_or_codename, v),
    "CODENAME" => |b: &mut VersionInfo, v: &str| set_str(&mut b.codename, v),
    "INCREMENTAL" => |b: &mut VersionInfo, v: &str| set_str(&mut b.incremental, v),
    "BASE_OS" => |b: &mut VersionInfo, v: &str| set_str(&mut b.base_os, v),
    "SECURITY_PATCH" => |b: &mut VersionInfo, v: &str| set_str(&mut b.security_patch, v),
    "SDK_INT" => |b: &mut VersionInfo, v: &str| set_i32(&mut b.sdk_int, v),
    "PREVIEW_SDK_INT" => |b: &mut VersionInfo, v: &str| set_i32(&mut b.preview_sdk_int, v),
    "DEVICE_INITIAL_SDK_INT" => |b: &mut VersionInfo, v: &str| set_i32(&mut b.device_initial_sdk_int, v),
    "MEDIA_PERFORMANCE_CLASS" => |b: &mut VersionInfo, v: &str| set_i32(&mut b.media_performance_class, v),
};

/// System properties the platform derives `Build` fields from. Properties
/// listed earlier take precedence when several map to the same field.
static PROPERTIES: &[(&str, &str)] = &[
    ("ro.build.id", "ID"),
    ("ro.build.display.id", "DISPLAY"),
    ("ro.product.name", "PRODUCT"),
    ("ro.product.device", "DEVICE"),
    ("ro.product.board", "BOARD"),
    ("ro.product.manufacturer", "MANUFACTURER"),
    ("ro.product.brand", "BRAND"),
    ("ro.product.model", "MODEL"),
    ("ro.bootloader", "BOOTLOADER"),
    ("ro.hardware", "HARDWARE"),
    ("ro.build.fingerprint", "FINGERPRINT"),
    ("ro.build.type", "TYPE"),
    ("ro.build.tags", "TAGS"),
    ("ro.build.host", "HOST"),
    ("ro.build.user", "USER"),
    ("gsm.version.baseband", "RADIO"),
    ("ro.boot.hardware.sku", "SKU"),
    ("ro.boot.product.hardware.sku", "ODM_SKU"),
    ("ro.soc.manufacturer", "SOC_MANUFACTURER"),
    ("ro.soc.model", "SOC_MODEL"),
    ("ro.build.version.release", "VERSION:RELEASE"),
    ("ro.build.version.release_or_codename", "VERSION:RELEASE_OR_CODENAME"),
    ("ro.build.version.codename", "VERSION:CODENAME"),
    ("ro.build.version.incremental", "VERSION:INCREMENTAL"),
    ("ro.build.version.base_os", "VERSION:BASE_OS"),
    ("ro.build.version.security_patch", "VERSION:SECURITY_PATCH"),
    ("ro.build.version.sdk", "VERSION:SDK_INT"),
    ("ro.build.version.preview_sdk", "VERSION:PREVIEW_SDK_INT"),
    ("ro.product.first_api_level", "VERSION:DEVICE_INITIAL_SDK_INT"),
    ("ro.odm.build.media_performance_class", "VERSION:MEDIA_PERFORMANCE_CLASS"),
];

impl BuildInfo {
    /// Load the identity from a `build.prop`-style file. `ro.build.date.utc`
    /// is in seconds and is converted to the millisecond `TIME` field.
    pub fn from_build_prop(reader: impl BufRead) -> Result<Self> {
        let mut props = Vec::new();

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((name, value)) = line.split_once('=') {
                props.push((name.trim().to_owned(), value.trim().to_owned()));
            }
        }

        let mut info = Self::default();

        // Later duplicates win, matching how the property service loads files.
        for (prop, key) in PROPERTIES.iter().rev() {
            let Some((_, value)) = props.iter().rev().find(|(n, _)| n == prop) else {
                continue;
            };

            info.set_field(&FieldKey::parse(key), value)
                .map_err(|e| match e {
                    Error::InvalidValue { source, .. } => Error::InvalidProperty {
                        name: (*prop).to_owned(),
                        value: value.clone(),
                        source,
                    },
                    e => e,
                })?;
        }

        if let Some((name, value)) = props.iter().rev().find(|(n, _)| n == "ro.build.date.utc") {
            let secs: i64 = value.parse().map_err(|e| Error::InvalidProperty {
                name: name.clone(),
                value: value.clone(),
                source: e,
            })?;
            info.time = secs.saturating_mul(1000);
        }

        Ok(info)
    }

    /// Resolve `key` and store `value` after coercing it to the field's native
    /// type. On error, the field is left untouched.
    pub fn set_field(&mut self, key: &FieldKey, value: &str) -> Result<()> {
        let result = match key {
            FieldKey::Build(name) => BUILD_FIELDS
                .get(name.as_str())
                .map(|setter| setter(self, value)),
            FieldKey::Version(name) => VERSION_FIELDS
                .get(name.as_str())
                .map(|setter| setter(&mut self.version, value)),
        };

        match result {
            Some(Ok(())) => {
                trace!("Set {key} to {value:?}");
                Ok(())
            }
            Some(Err(e)) => Err(Error::InvalidValue {
                key: key.clone(),
                value: value.to_owned(),
                source: e,
            }),
            None => Err(Error::UnknownField(key.clone())),
        }
    }

    /// Whether `key` refers to a writable field.
    pub fn has_field(key: &FieldKey) -> bool {
        match key {
            FieldKey::Build(name) => BUILD_FIELDS.contains_key(name.as_str()),
            FieldKey::Version(name) => VERSION_FIELDS.contains_key(name.as_str()),
        }
    }

    /// List all fields as `(key, value)` pairs in a stable order. Version
    /// fields use the [`VERSION_PREFIX`] key form.
    pub fn fields(&self) -> Vec<(String, String)> {
        let v = &self.version;

        [
            ("ID", self.id.clone()),
            ("DISPLAY", self.display.clone()),
            ("PRODUCT", self.product.clone()),
            ("DEVICE", self.device.clone()),
            ("BOARD", self.board.clone()),
            ("MANUFACTURER", self.manufacturer.clone()),
            ("BRAND", self.brand.clone()),
            ("MODEL", self.model.clone()),
            ("BOOTLOADER", self.bootloader.clone()),
            ("HARDWARE", self.hardware.clone()),
            ("FINGERPRINT", self.fingerprint.clone()),
            ("TYPE", self.r#type.clone()),
            ("TAGS", self.tags.clone()),
            ("HOST", self.host.clone()),
            ("USER", self.user.clone()),
            ("RADIO", self.radio.clone()),
            ("SKU", self.sku.clone()),
            ("ODM_SKU", self.odm_sku.clone()),
            ("SOC_MANUFACTURER", self.soc_manufacturer.clone()),
            ("SOC_MODEL", self.soc_model.clone()),
            ("TIME", self.time.to_string()),
            ("VERSION:RELEASE", v.release.clone()),
            ("VERSION:RELEASE_OR_CODENAME", v.release_or_codename.clone()),
            ("VERSION:CODENAME", v.codename.clone()),
            ("VERSION:INCREMENTAL", v.incremental.clone()),
            ("VERSION:BASE_OS", v.base_os.clone()),
            ("VERSION:SECURITY_PATCH", v.security_patch.clone()),
            ("VERSION:SDK_INT", v.sdk_int.to_string()),
            ("VERSION:PREVIEW_SDK_INT", v.preview_sdk_int.to_string()),
            (
                "VERSION:DEVICE_INITIAL_SDK_INT",
                v.device_initial_sdk_int.to_string(),
            ),
            (
                "VERSION:MEDIA_PERFORMANCE_CLASS",
                v.media_performance_class.to_string(),
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect()
    }
}

/// Destination for field overrides. The engine only talks to this trait so
/// that the storage backing the identity can be swapped out.
pub trait IdentityStore {
    fn set_field(&mut self, key: &FieldKey, value: &str) -> Result<()>;
}

impl IdentityStore for BuildInfo {
    fn set_field(&mut self, key: &FieldKey, value: &str) -> Result<()> {
        BuildInfo::set_field(self, key, value)
    }
}
