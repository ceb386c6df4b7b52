// SPDX-FileCopyrightText: 2023 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::sync::{
    LazyLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
    atomic::{AtomicBool, Ordering},
};

use crate::identity::BuildInfo;

static GLOBAL: LazyLock<ProcessState> = LazyLock::new(ProcessState::default);

/// Marks that the current process had its identity spoofed. It can only go
/// from `false` to `true` and is never reset.
#[derive(Debug, Default)]
pub struct ProcessFlag(AtomicBool);

impl ProcessFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns whether the flag was already set.
    pub(crate) fn set(&self) -> bool {
        self.0.swap(true, Ordering::AcqRel)
    }
}

/// Process-wide identity state. The identity is only written by the
/// initialization path and everything else should treat it as read-only.
#[derive(Debug, Default)]
pub struct ProcessState {
    flag: ProcessFlag,
    identity: RwLock<BuildInfo>,
}

impl ProcessState {
    pub fn new(identity: BuildInfo) -> Self {
        Self {
            flag: ProcessFlag::default(),
            identity: RwLock::new(identity),
        }
    }

    /// The state for the current process.
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    pub fn flag(&self) -> &ProcessFlag {
        &self.flag
    }

    pub fn is_monitored(&self) -> bool {
        self.flag.is_set()
    }

    /// Current identity. A poisoned lock is still readable since every field
    /// write is a single assignment.
    pub fn identity(&self) -> RwLockReadGuard<'_, BuildInfo> {
        self.identity.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn identity_mut(&self) -> RwLockWriteGuard<'_, BuildInfo> {
        self.identity.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the baseline identity before initialization runs.
    pub(crate) fn reset_identity(&self, identity: BuildInfo) {
        *self.identity_mut() = identity;
    }
}
