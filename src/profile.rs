#![forbid(unsafe_code)]

//! Pluggable profile rule packs.
//!
//! Networks such as Peppol or e-SENS layer additional conformance rules on
//! top of the generic engine. A profile runs after the structural checks
//! pass; its warnings accumulate and its failures abort like any stage.

use crate::ebms::error::ErrorSink;
use crate::ebms::{SignalMessage, UserMessage};
use crate::pmode::PMode;

pub trait ProfileValidator: Send + Sync {
    fn name(&self) -> &str;

    fn validate_pmode(&self, pmode: &PMode, errors: &mut ErrorSink) {
        let _ = (pmode, errors);
    }

    fn validate_user_message(&self, user: &UserMessage, errors: &mut ErrorSink) {
        let _ = (user, errors);
    }

    fn validate_signal_message(&self, signal: &SignalMessage, errors: &mut ErrorSink) {
        let _ = (signal, errors);
    }
}

/// Profile that imposes no rules beyond the generic engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProfile;

impl ProfileValidator for NoProfile {
    fn name(&self) -> &str {
        "none"
    }
}
