/*
 * SPDX-FileCopyrightText: 2023 Andrew Gunnerson
 * SPDX-License-Identifier: GPL-3.0-only
 */

//! Device identity spoofing for GMS compatibility.
//!
//! [`engine::IdentityOverrideEngine`] runs once when a process starts and
//! decides which identity fields to override based on the package and process
//! name. [`guard::AttestationGuard`] later refuses certificate chain retrieval
//! to the integrity verification component if the process was spoofed.
//!
//! The identity is stored in [`state::ProcessState`], which is written only
//! during initialization.

pub mod cli;
pub mod config;
pub mod context;
pub mod engine;
pub mod guard;
pub mod identity;
pub mod profile;
pub mod state;
