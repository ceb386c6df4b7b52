// SPDX-FileCopyrightText: 2023 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use thiserror::Error;
use tracing::{debug, warn};

use crate::{config, context::CallContext, state::ProcessFlag};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Certificate chain access is not supported from {frame}")]
    Unsupported { frame: String },
}

type Result<T> = std::result::Result<T, Error>;

/// Refuses certificate chain retrieval to the integrity verification component
/// once the process identity has been spoofed, so that spoofed values never
/// end up in an attestation result.
#[derive(Clone, Debug)]
pub struct AttestationGuard<'a> {
    flag: &'a ProcessFlag,
    marker: String,
}

impl<'a> AttestationGuard<'a> {
    pub fn new(flag: &'a ProcessFlag, marker: impl Into<String>) -> Self {
        Self {
            flag,
            marker: marker.into(),
        }
    }

    pub fn from_config(flag: &'a ProcessFlag, config: &config::Guard) -> Self {
        Self::new(flag, config.marker.clone())
    }

    pub fn check_certificate_chain_access(&self, context: &CallContext) -> Result<()> {
        if !self.flag.is_set() {
            return Ok(());
        }

        match context.find(&self.marker) {
            Some(frame) => {
                warn!("Rejecting certificate chain access from {frame}");
                Err(Error::Unsupported {
                    frame: frame.to_owned(),
                })
            }
            None => {
                debug!("Allowing certificate chain access");
                Ok(())
            }
        }
    }

    /// Same as [`Self::check_certificate_chain_access`], but for the calling
    /// thread's current context.
    pub fn check_current(&self) -> Result<()> {
        self.check_certificate_chain_access(&CallContext::current())
    }
}
