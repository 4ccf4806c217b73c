#![forbid(unsafe_code)]

//! Ordered header-validation pipeline.
//!
//! Processors own one SOAP header block each and run in registration order;
//! structural extraction registers before security, always. The registry is
//! built once at start-up and is immutable afterwards, so the pipeline
//! itself needs no locking.

pub mod messaging;
pub mod state;

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::ebms::error::{Ebms3Error, ErrorSink, INVALID_HEADER, OTHER};
use crate::error::Error as MshError;
use crate::soap::{HeaderBlock, QName, SoapEnvelope};

pub use state::{Certificate, CompressionMode, MessageState, TempScope};

const ORIGIN: &str = "pipeline";

/// Everything one pipeline run works on.
pub struct ProcessingContext<'a> {
    pub envelope: &'a SoapEnvelope,
    pub state: MessageState,
    pub errors: ErrorSink,
    /// Language tag for rendered error text.
    pub locale: String,
}

impl<'a> ProcessingContext<'a> {
    pub fn new(envelope: &'a SoapEnvelope, state: MessageState) -> Self {
        Self {
            envelope,
            state,
            errors: ErrorSink::new(),
            locale: "en".to_string(),
        }
    }
}

#[async_trait]
pub trait HeaderProcessor: Send + Sync {
    /// Qualified name of the header block this processor owns.
    fn header_name(&self) -> QName;

    /// Whether the envelope must carry the header block at all.
    fn mandatory(&self) -> bool {
        false
    }

    async fn process(
        &self,
        header: Option<&HeaderBlock>,
        ctx: &mut ProcessingContext<'_>,
    ) -> Result<(), MshError>;
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("a processor for header `{name}` is already registered")]
    DuplicateHeader { name: String },
}

/// Append-only processor registry, populated once at start-up.
#[derive(Default)]
pub struct HeaderProcessorRegistry {
    entries: Vec<Arc<dyn HeaderProcessor>>,
    keys: HashSet<(String, String)>,
}

impl HeaderProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, processor: Arc<dyn HeaderProcessor>) -> Result<(), RegistryError> {
        let name = processor.header_name();
        let key = (name.namespace.clone(), name.local.clone());
        if !self.keys.insert(key) {
            return Err(RegistryError::DuplicateHeader {
                name: name.to_string(),
            });
        }
        self.entries.push(processor);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs every processor in registration order.
    ///
    /// A stage that records a failure-severity error short-circuits the
    /// rest. Infrastructure errors from collaborators are folded into
    /// `EBMS:0004` so no exception escapes unmapped.
    pub async fn run(&self, ctx: &mut ProcessingContext<'_>) {
        for processor in &self.entries {
            let name = processor.header_name();
            let header = ctx.envelope.header(&name);

            if header.is_none() && processor.mandatory() {
                let ref_to = ctx.state.message_id().unwrap_or("").to_string();
                ctx.errors.push(
                    Ebms3Error::new(INVALID_HEADER)
                        .ref_to(ref_to)
                        .detail(format!("required header block `{name}` is missing"))
                        .origin(ORIGIN),
                );
                return;
            }

            tracing::debug!(
                target: "msh::pipeline",
                event = "processor_started",
                header = %name
            );

            if let Err(err) = processor.process(header, ctx).await {
                tracing::error!(
                    target: "msh::pipeline",
                    event = "processor_error",
                    header = %name,
                    error = %err
                );
                let ref_to = ctx.state.message_id().unwrap_or("").to_string();
                ctx.errors.push(
                    Ebms3Error::new(OTHER)
                        .ref_to(ref_to)
                        .detail(err.to_string())
                        .origin(ORIGIN),
                );
                return;
            }

            if ctx.errors.has_failure() {
                tracing::info!(
                    target: "msh::pipeline",
                    event = "pipeline_aborted",
                    header = %name,
                    errors = ctx.errors.len()
                );
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::SoapVersion;

    struct Noop {
        name: QName,
    }

    #[async_trait]
    impl HeaderProcessor for Noop {
        fn header_name(&self) -> QName {
            self.name.clone()
        }

        async fn process(
            &self,
            _header: Option<&HeaderBlock>,
            _ctx: &mut ProcessingContext<'_>,
        ) -> Result<(), MshError> {
            Ok(())
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = HeaderProcessorRegistry::new();
        registry
            .register(Arc::new(Noop {
                name: QName::messaging(),
            }))
            .expect("first registration");

        let err = registry
            .register(Arc::new(Noop {
                name: QName::messaging(),
            }))
            .expect_err("duplicate key");
        assert!(err.to_string().contains("Messaging"));
    }

    #[tokio::test]
    async fn missing_mandatory_header_reports_invalid_header() {
        struct Mandatory;

        #[async_trait]
        impl HeaderProcessor for Mandatory {
            fn header_name(&self) -> QName {
                QName::messaging()
            }

            fn mandatory(&self) -> bool {
                true
            }

            async fn process(
                &self,
                _header: Option<&HeaderBlock>,
                _ctx: &mut ProcessingContext<'_>,
            ) -> Result<(), MshError> {
                Ok(())
            }
        }

        let mut registry = HeaderProcessorRegistry::new();
        registry.register(Arc::new(Mandatory)).expect("register");

        let envelope = SoapEnvelope::new(SoapVersion::Soap12);
        let mut ctx = ProcessingContext::new(&envelope, MessageState::new(Vec::new()));
        registry.run(&mut ctx).await;

        assert!(ctx.errors.has_failure());
        assert_eq!(ctx.errors.errors()[0].code.code(), "EBMS:0009");
    }
}
