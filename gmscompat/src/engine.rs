// SPDX-FileCopyrightText: 2023 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, debug_span, error, info, warn};

use crate::{
    config::{Config, ProfileSource},
    identity::{self, FieldKey, IdentityStore},
    profile::{self, EntryValue, IdentityProfile},
    state::{ProcessFlag, ProcessState},
};

/// Source of the wall-clock time in milliseconds since the Unix epoch.
pub type Clock = fn() -> i64;

pub fn system_clock() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The package or process name was empty. Nothing was changed.
    MissingIdentity,
    /// Spoofing is globally disabled. Nothing was changed.
    Disabled,
    /// The decision policy ran. This does not imply that any field changed.
    Evaluated,
}

/// A single field override attempt.
#[derive(Debug)]
pub struct Override {
    pub key: FieldKey,
    pub value: String,
    pub result: Result<(), identity::Error>,
}

#[derive(Debug)]
pub struct InitReport {
    pub outcome: Outcome,
    /// Every attempted override, in the order they were attempted.
    pub overrides: Vec<Override>,
    /// Set if the full profile should have been applied, but could not be
    /// loaded.
    pub profile_error: Option<profile::Error>,
}

impl InitReport {
    fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            overrides: vec![],
            profile_error: None,
        }
    }

    pub fn applied(&self) -> impl Iterator<Item = &Override> {
        self.overrides.iter().filter(|o| o.result.is_ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &Override> {
        self.overrides.iter().filter(|o| o.result.is_err())
    }
}

/// Decides which identity fields to override for the process being started.
#[derive(Debug)]
pub struct IdentityOverrideEngine {
    config: Config,
    clock: Clock,
}

impl IdentityOverrideEngine {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            clock: system_clock,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the decision policy against the process-wide state. This is meant
    /// to run once, before any application code.
    pub fn initialize(
        &self,
        state: &ProcessState,
        package_name: &str,
        process_name: &str,
    ) -> InitReport {
        let mut identity = state.identity_mut();

        self.apply(&mut *identity, state.flag(), package_name, process_name)
    }

    /// Run the decision policy against an arbitrary store. Failures to set
    /// individual fields are logged and recorded in the report, but never stop
    /// the remaining overrides.
    pub fn apply(
        &self,
        store: &mut dyn IdentityStore,
        flag: &ProcessFlag,
        package_name: &str,
        process_name: &str,
    ) -> InitReport {
        if package_name.is_empty() || process_name.is_empty() {
            error!("Missing package or process name");
            return InitReport::new(Outcome::MissingIdentity);
        }

        let _span = debug_span!("init", package_name, process_name).entered();

        if !self.config.enabled {
            debug!("Identity spoofing is disabled");
            return InitReport::new(Outcome::Disabled);
        }

        let mut report = InitReport::new(Outcome::Evaluated);
        let targets = &self.config.targets;

        if package_name == targets.package {
            let now = (self.clock)();
            set_field(store, &mut report, "TIME", &now.to_string());

            if process_name == targets.process {
                if flag.set() {
                    warn!("Process was already flagged as spoofed");
                }

                match self.load_profile() {
                    Ok(profile) => {
                        info!("Applying {} profile overrides", profile.len());

                        for (key, value) in profile.entries() {
                            set_profile_field(store, &mut report, key, value);
                        }
                    }
                    Err(e) => {
                        error!("Skipping profile overrides: {e}");
                        report.profile_error = Some(e);
                    }
                }
            }
        }

        if package_name.starts_with(&targets.vendor_prefix) {
            let vendor = &self.config.vendor;
            set_field(store, &mut report, "BRAND", &vendor.brand);
            set_field(store, &mut report, "MANUFACTURER", &vendor.manufacturer);
        }

        report
    }

    fn load_profile(&self) -> Result<IdentityProfile, profile::Error> {
        let config = &self.config.profile;

        match config.source {
            ProfileSource::Legacy => Ok(IdentityProfile::legacy()),
            ProfileSource::File => IdentityProfile::load(&config.path),
        }
    }
}

fn record(
    report: &mut InitReport,
    key: FieldKey,
    value: &str,
    result: Result<(), identity::Error>,
) {
    if let Err(e) = &result {
        error!("Failed to spoof {key}: {e}");
    }

    report.overrides.push(Override {
        key,
        value: value.to_owned(),
        result,
    });
}

fn set_field(store: &mut dyn IdentityStore, report: &mut InitReport, key: &str, value: &str) {
    let key = FieldKey::parse(key);
    let result = store.set_field(&key, value);

    record(report, key, value, result);
}

/// Like [`set_field`], but values that cannot be applied are recorded as
/// failures without reaching the store.
fn set_profile_field(
    store: &mut dyn IdentityStore,
    report: &mut InitReport,
    key: &str,
    value: &EntryValue,
) {
    let key = FieldKey::parse(key);
    let result = value
        .to_field_value(&key)
        .and_then(|v| store.set_field(&key, v));

    record(report, key, value.as_str(), result);
}
