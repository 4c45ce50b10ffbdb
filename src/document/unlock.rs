//! Unlock sequencing for encrypted documents
//!
//! The empty credential is probed first: many files are encrypted only to
//! carry permission flags and open with a blank password. A supplied password
//! is tried second. Failure is never fatal; the handle stays open and locked.

use serde::Serialize;
use tracing::{debug, warn};

use crate::engine::RasterEngine;

/// How the document ended up after open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockState {
    NotEncrypted,
    UnlockedWithEmptyPassword,
    UnlockedWithPassword,
    /// Encrypted and no credential worked; pages render blank
    Locked,
}

impl UnlockState {
    pub fn is_readable(&self) -> bool {
        !matches!(self, UnlockState::Locked)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UnlockOutcome {
    pub state: UnlockState,
    /// Non-empty password that was applied, successfully or not
    pub resolved_password: Option<String>,
}

pub(crate) fn unlock<E: RasterEngine>(
    engine: &E,
    handle: &mut E::Handle,
    password: Option<&str>,
    file_identity: &str,
) -> UnlockOutcome {
    if !engine.is_encrypted(handle) {
        return UnlockOutcome {
            state: UnlockState::NotEncrypted,
            resolved_password: None,
        };
    }

    if engine.unlock(handle, b"") {
        debug!("{} unlocked with empty password", file_identity);
        return UnlockOutcome {
            state: UnlockState::UnlockedWithEmptyPassword,
            resolved_password: None,
        };
    }

    let Some(password) = password.filter(|p| !p.is_empty()) else {
        warn!("{} is encrypted and no password was supplied", file_identity);
        return UnlockOutcome {
            state: UnlockState::Locked,
            resolved_password: None,
        };
    };

    let state = if engine.unlock(handle, password.as_bytes()) {
        debug!("{} unlocked with supplied password", file_identity);
        UnlockState::UnlockedWithPassword
    } else {
        warn!(
            "Failed to unlock {} with supplied password; pages will render blank",
            file_identity
        );
        UnlockState::Locked
    };

    UnlockOutcome {
        state,
        resolved_password: Some(password.to_string()),
    }
}
