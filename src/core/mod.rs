//! Core types for airlift
//!
//! This module forms the foundation of the update coordinator's type system:
//! error handling, the terminal outcome codes reported to the host, and the
//! transfer phase signal shared between the download path and the
//! notification relay.
//!
//! # Architecture Overview
//!
//! ## Error Management
//! - **Strongly-typed errors** ([`UpdateError`]) for precise handling in code
//! - **User-friendly contexts** ([`ErrorContext`]) with actionable suggestions
//!   for CLI users
//! - **Automatic conversion** from common standard library errors
//!
//! ## Terminal Outcomes
//! Every check cycle ends in exactly one [`CheckOutcome`], delivered to the
//! host callback at most once. The numeric codes are part of the host
//! contract and must not change.
//!
//! ## Transfer Phases
//! [`TransferPhase`] is the single source of truth for download progress,
//! broadcast over a `tokio::sync::watch` channel from the worker to the
//! notification relay and any other observer.

pub mod error;

pub use error::{user_friendly_error, ErrorContext, UpdateError};

use serde::{Deserialize, Serialize};

/// Terminal result of one update check cycle
///
/// Delivered to the registered host callback exactly once per cycle. The
/// discriminants are stable host-facing codes:
///
/// | Outcome | Code |
/// |---|---|
/// | `NeedUpdate` | 2 |
/// | `NoUpdate` | 1 |
/// | `UserCanceled` | 0 |
/// | `CheckFailed` | -1 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i8)]
pub enum CheckOutcome {
    /// A newer build exists (whether or not it was downloaded or installed)
    NeedUpdate = 2,
    /// The running build is current
    NoUpdate = 1,
    /// The user declined or deferred a non-mandatory update
    UserCanceled = 0,
    /// The version check could not be completed
    CheckFailed = -1,
}

impl CheckOutcome {
    /// The stable numeric code for this outcome
    #[must_use]
    pub const fn code(self) -> i8 {
        self as i8
    }
}

impl std::fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::NeedUpdate => "update available",
            Self::NoUpdate => "up to date",
            Self::UserCanceled => "canceled by user",
            Self::CheckFailed => "check failed",
        };
        write!(f, "{label}")
    }
}

/// Progress signal for an artifact transfer
///
/// Published over a `watch` channel by the worker while a download runs.
/// `Running` carries whole percent values and never regresses; the channel
/// always ends on `Complete` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    /// No transfer has started on this channel yet
    Idle,
    /// Transfer in flight at the given whole-percent completion
    Running(u8),
    /// Transfer finished successfully
    Complete,
    /// Transfer failed
    Failed,
}

impl TransferPhase {
    /// Whole-percent completion, if a transfer is in flight
    #[must_use]
    pub const fn percent(self) -> Option<u8> {
        match self {
            Self::Running(pct) => Some(pct),
            _ => None,
        }
    }

    /// Whether this phase is terminal for the transfer
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_codes_are_stable() {
        assert_eq!(CheckOutcome::NeedUpdate.code(), 2);
        assert_eq!(CheckOutcome::NoUpdate.code(), 1);
        assert_eq!(CheckOutcome::UserCanceled.code(), 0);
        assert_eq!(CheckOutcome::CheckFailed.code(), -1);
    }

    #[test]
    fn test_transfer_phase_percent() {
        assert_eq!(TransferPhase::Running(37).percent(), Some(37));
        assert_eq!(TransferPhase::Complete.percent(), None);
        assert_eq!(TransferPhase::Idle.percent(), None);
    }

    #[test]
    fn test_transfer_phase_terminal() {
        assert!(TransferPhase::Complete.is_terminal());
        assert!(TransferPhase::Failed.is_terminal());
        assert!(!TransferPhase::Running(99).is_terminal());
        assert!(!TransferPhase::Idle.is_terminal());
    }
}
