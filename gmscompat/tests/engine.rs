// SPDX-FileCopyrightText: 2023 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{io::Write, path::Path};

use assert_matches::assert_matches;
use gmscompat::{
    config::{Config, ProfileSource},
    context::{self, CallContext},
    engine::{IdentityOverrideEngine, Outcome},
    guard::{self, AttestationGuard},
    identity::{self, BuildInfo, FieldKey, IdentityStore},
    profile,
    state::{ProcessFlag, ProcessState},
};
use tempfile::NamedTempFile;

const GMS: &str = "com.google.android.gms";
const UNSTABLE: &str = "com.google.android.gms.unstable";

/// Records every override attempt and forwards it to a real identity.
#[derive(Default)]
struct RecordingStore {
    attempts: Vec<(FieldKey, String)>,
    identity: BuildInfo,
}

impl IdentityStore for RecordingStore {
    fn set_field(&mut self, key: &FieldKey, value: &str) -> Result<(), identity::Error> {
        self.attempts.push((key.clone(), value.to_owned()));
        self.identity.set_field(key, value)
    }
}

fn profile_file(data: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(data.as_bytes()).unwrap();
    file
}

fn engine_with_profile(path: &Path) -> IdentityOverrideEngine {
    let mut config = Config::default();
    config.profile.path = path.to_owned();

    IdentityOverrideEngine::new(config).with_clock(|| 1_234)
}

fn attempted_keys(store: &RecordingStore) -> Vec<String> {
    store.attempts.iter().map(|(k, _)| k.to_string()).collect()
}

#[test]
fn unrelated_package_is_untouched() {
    let file = profile_file(r#"{"FINGERPRINT":"x"}"#);
    let engine = engine_with_profile(file.path());

    for (package, process) in [
        ("com.example.app", "com.example.app"),
        ("com.google.android.gmsx", UNSTABLE),
        ("com.google.android.gsf", GMS),
        ("com.samsung.android", "com.samsung.android"),
    ] {
        let flag = ProcessFlag::default();
        let mut store = RecordingStore::default();

        let report = engine.apply(&mut store, &flag, package, process);

        assert_eq!(report.outcome, Outcome::Evaluated);
        assert!(report.overrides.is_empty(), "{package}");
        assert!(store.attempts.is_empty(), "{package}");
        assert!(!flag.is_set(), "{package}");
    }
}

#[test]
fn sensitive_package_only_gets_time() {
    let file = profile_file(r#"{"FINGERPRINT":"x"}"#);
    let engine = engine_with_profile(file.path());
    let flag = ProcessFlag::default();
    let mut store = RecordingStore::default();

    let report = engine.apply(&mut store, &flag, GMS, "com.google.android.gms.persistent");

    assert_eq!(
        store.attempts,
        [(FieldKey::Build("TIME".to_owned()), "1234".to_owned())]
    );
    assert_eq!(store.identity.time, 1_234);
    assert_eq!(report.applied().count(), 1);
    assert!(!flag.is_set());
}

#[test]
fn unstable_process_gets_profile_in_order() {
    let file = profile_file(
        r#"{
            "MODEL": "Pixel 5",
            "FINGERPRINT": "google/redfin/redfin:11/RQ3A.211001.001/7641976:user/release-keys",
            "VERSION:SECURITY_PATCH": "2021-10-01",
            "BRAND": "google",
            "VERSION:DEVICE_INITIAL_SDK_INT": "30"
        }"#,
    );
    let engine = engine_with_profile(file.path());
    let flag = ProcessFlag::default();
    let mut store = RecordingStore::default();

    let report = engine.apply(&mut store, &flag, GMS, UNSTABLE);

    assert!(flag.is_set());
    assert!(report.profile_error.is_none());
    assert_eq!(
        attempted_keys(&store),
        [
            "Build.TIME",
            "Build.MODEL",
            "Build.FINGERPRINT",
            "Build.VERSION.SECURITY_PATCH",
            "Build.BRAND",
            "Build.VERSION.DEVICE_INITIAL_SDK_INT",
        ]
    );
    assert_eq!(store.identity.model, "Pixel 5");
    assert_eq!(store.identity.version.security_patch, "2021-10-01");
    assert_eq!(store.identity.version.device_initial_sdk_int, 30);
}

#[test]
fn version_prefix_selects_nested_field() {
    let file = profile_file(r#"{"FINGERPRINT":"x","VERSION:RELEASE":"9"}"#);
    let engine = engine_with_profile(file.path());
    let flag = ProcessFlag::default();
    let mut store = RecordingStore::default();

    engine.apply(&mut store, &flag, GMS, UNSTABLE);

    assert_eq!(
        store.attempts[1..],
        [
            (FieldKey::Build("FINGERPRINT".to_owned()), "x".to_owned()),
            (FieldKey::Version("RELEASE".to_owned()), "9".to_owned()),
        ]
    );
    assert_eq!(store.identity.fingerprint, "x");
    assert_eq!(store.identity.version.release, "9");
}

#[test]
fn bad_fields_do_not_stop_later_fields() {
    let file =
        profile_file(r#"{"NOT_A_FIELD":"x","VERSION:SDK_INT":"twenty-five","MODEL":"Pixel XL"}"#);
    let engine = engine_with_profile(file.path());
    let flag = ProcessFlag::default();
    let mut store = RecordingStore::default();

    let report = engine.apply(&mut store, &flag, GMS, UNSTABLE);

    assert_eq!(report.overrides.len(), 4);
    assert_eq!(report.failed().count(), 2);
    assert_matches!(
        report.overrides[1].result,
        Err(identity::Error::UnknownField(_))
    );
    assert_matches!(
        report.overrides[2].result,
        Err(identity::Error::InvalidValue { .. })
    );
    assert_eq!(store.identity.model, "Pixel XL");
}

#[test]
fn non_scalar_values_fail_individually() {
    let file = profile_file(r#"{"FINGERPRINT":"x","MODEL":null,"VERSION:RELEASE":"9"}"#);
    let engine = engine_with_profile(file.path());
    let flag = ProcessFlag::default();
    let mut store = RecordingStore::default();
    store.identity.model = "Pixel 8 Pro".to_owned();

    let report = engine.apply(&mut store, &flag, GMS, UNSTABLE);

    assert!(report.profile_error.is_none());
    assert_eq!(
        report
            .overrides
            .iter()
            .map(|o| o.key.to_string())
            .collect::<Vec<_>>(),
        [
            "Build.TIME",
            "Build.FINGERPRINT",
            "Build.MODEL",
            "Build.VERSION.RELEASE",
        ]
    );
    assert_matches!(
        &report.overrides[2].result,
        Err(identity::Error::NotAScalar { value, .. }) if value == "null"
    );
    assert_eq!(report.failed().count(), 1);

    // The null value never reaches the store.
    assert_eq!(
        attempted_keys(&store),
        ["Build.TIME", "Build.FINGERPRINT", "Build.VERSION.RELEASE"]
    );
    assert_eq!(store.identity.fingerprint, "x");
    assert_eq!(store.identity.model, "Pixel 8 Pro");
    assert_eq!(store.identity.version.release, "9");
}

#[test]
fn bad_profile_is_skipped() {
    let empty = profile_file("");
    let garbage = profile_file("FINGERPRINT=x");

    for path in [
        empty.path(),
        garbage.path(),
        Path::new("/nonexistent/gms_certified_props.json"),
    ] {
        let engine = engine_with_profile(path);
        let flag = ProcessFlag::default();
        let mut store = RecordingStore::default();

        let report = engine.apply(&mut store, &flag, GMS, UNSTABLE);

        // Only the timestamp is overridden, but the process is still flagged.
        assert_eq!(attempted_keys(&store), ["Build.TIME"], "{path:?}");
        assert!(report.profile_error.is_some(), "{path:?}");
        assert!(flag.is_set(), "{path:?}");
    }

    let engine = engine_with_profile(empty.path());
    let report = engine.apply(
        &mut RecordingStore::default(),
        &ProcessFlag::default(),
        GMS,
        UNSTABLE,
    );
    assert_matches!(report.profile_error, Some(profile::Error::Empty(_)));
}

#[test]
fn legacy_profile() {
    let mut config = Config::default();
    config.profile.source = ProfileSource::Legacy;
    config.profile.path = "/nonexistent".into();
    let engine = IdentityOverrideEngine::new(config).with_clock(|| 1);
    let flag = ProcessFlag::default();
    let mut store = RecordingStore::default();

    engine.apply(&mut store, &flag, GMS, UNSTABLE);

    assert_eq!(
        attempted_keys(&store),
        [
            "Build.TIME",
            "Build.FINGERPRINT",
            "Build.PRODUCT",
            "Build.DEVICE",
            "Build.MODEL",
        ]
    );
    assert_eq!(
        store.identity.fingerprint,
        "google/marlin/marlin:7.1.2/NJH47F/4146041:user/release-keys"
    );
}

#[test]
fn vendor_prefix() {
    let engine = IdentityOverrideEngine::new(Config::default());
    let flag = ProcessFlag::default();
    let mut store = RecordingStore::default();
    store.identity.brand = "samsung".to_owned();
    store.identity.manufacturer = "samsung".to_owned();

    engine.apply(
        &mut store,
        &flag,
        "com.samsung.android.oneconnect",
        "com.samsung.android.oneconnect",
    );

    assert_eq!(attempted_keys(&store), ["Build.BRAND", "Build.MANUFACTURER"]);
    assert_eq!(store.identity.brand, "google");
    assert_eq!(store.identity.manufacturer, "google");
    assert!(!flag.is_set());
}

#[test]
fn disabled_does_nothing() {
    let file = profile_file(r#"{"FINGERPRINT":"x"}"#);
    let mut config = Config::default();
    config.enabled = false;
    config.profile.path = file.path().to_owned();
    let engine = IdentityOverrideEngine::new(config);

    for package in [GMS, "com.samsung.android.app.watchmanager"] {
        let flag = ProcessFlag::default();
        let mut store = RecordingStore::default();

        let report = engine.apply(&mut store, &flag, package, UNSTABLE);

        assert_eq!(report.outcome, Outcome::Disabled);
        assert!(store.attempts.is_empty());
        assert!(!flag.is_set());
    }
}

#[test]
fn missing_identity_does_nothing() {
    let engine = IdentityOverrideEngine::new(Config::default());

    for (package, process) in [("", UNSTABLE), (GMS, ""), ("", "")] {
        let flag = ProcessFlag::default();
        let mut store = RecordingStore::default();

        let report = engine.apply(&mut store, &flag, package, process);

        assert_eq!(report.outcome, Outcome::MissingIdentity);
        assert!(store.attempts.is_empty());
        assert!(!flag.is_set());
    }
}

#[test]
fn initialize_is_idempotent() {
    let file = profile_file(r#"{"FINGERPRINT":"x","VERSION:RELEASE":"9","MODEL":"y"}"#);
    let engine = engine_with_profile(file.path());
    let state = ProcessState::default();

    engine.initialize(&state, GMS, UNSTABLE);
    let first = state.identity().clone();

    engine.initialize(&state, GMS, UNSTABLE);
    let second = state.identity().clone();

    assert_eq!(first, second);
    assert_eq!(second.fingerprint, "x");
    assert_eq!(second.version.release, "9");
    assert_eq!(second.time, 1_234);
}

#[test]
fn spoofed_process_blocks_droidguard() {
    let file = profile_file(r#"{"FINGERPRINT":"x"}"#);
    let engine = engine_with_profile(file.path());
    let state = ProcessState::default();
    let guard = AttestationGuard::from_config(state.flag(), &engine.config().guard);

    let _app = context::enter("com.google.android.gms.chimera.GmsApiService");
    assert_matches!(guard.check_current(), Ok(()));

    {
        let _dg = context::enter("com.google.android.gms.droidguard.DroidGuardChimeraService");
        // Not spoofed yet.
        assert_matches!(guard.check_current(), Ok(()));
    }

    engine.initialize(&state, GMS, UNSTABLE);
    assert!(state.is_monitored());

    assert_matches!(guard.check_current(), Ok(()));

    {
        let _dg = context::enter("com.google.android.gms.droidguard.DroidGuardChimeraService");
        assert_matches!(guard.check_current(), Err(guard::Error::Unsupported { .. }));
    }

    assert_matches!(
        guard.check_certificate_chain_access(&CallContext::from_frames([
            "com.google.ccc.abuse.droidguard.DroidGuard"
        ])),
        Err(guard::Error::Unsupported { .. })
    );
}
