#![forbid(unsafe_code)]

//! Transport-agnostic receive entrypoint.
//!
//! One `receive` call per inbound exchange: builds the per-request state,
//! runs the header pipeline, applies the profile rules, performs duplicate
//! bookkeeping and hands back either a verified `MessageState` or the
//! non-empty coded error list.

use chrono::Duration as ChronoDuration;
use std::sync::Arc;

use crate::config::MshConfig;
use crate::ebms::error::Ebms3Error;
use crate::error::Result;
use crate::metrics;
use crate::pipeline::messaging::{MessagingProcessor, PullRequestHandler};
use crate::pipeline::{HeaderProcessorRegistry, MessageState, ProcessingContext};
use crate::pmode::resolver::StorePModeResolver;
use crate::pmode::store::{MpcStore, PModeStore};
use crate::pmode::PModeDocument;
use crate::profile::{NoProfile, ProfileValidator};
use crate::reliability::{DisposalJob, DuplicateCheck, DuplicateStore};
use crate::security::{Credentials, SecurityEngine, SecurityProcessor};
use crate::soap::{Attachment, SoapEnvelope};

pub struct MshEngineBuilder {
    config: MshConfig,
    pmode_store: Arc<PModeStore>,
    mpc_store: Arc<MpcStore>,
    security_engine: Arc<dyn SecurityEngine>,
    credentials: Credentials,
    profile: Arc<dyn ProfileValidator>,
    pull_handlers: Vec<Arc<dyn PullRequestHandler>>,
}

impl MshEngineBuilder {
    pub fn new(
        config: MshConfig,
        pmode_store: Arc<PModeStore>,
        mpc_store: Arc<MpcStore>,
        security_engine: Arc<dyn SecurityEngine>,
    ) -> Self {
        Self {
            config,
            pmode_store,
            mpc_store,
            security_engine,
            credentials: Credentials::default(),
            profile: Arc::new(NoProfile),
            pull_handlers: Vec::new(),
        }
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn profile(mut self, profile: Arc<dyn ProfileValidator>) -> Self {
        self.profile = profile;
        self
    }

    pub fn pull_handler(mut self, handler: Arc<dyn PullRequestHandler>) -> Self {
        self.pull_handlers.push(handler);
        self
    }

    pub fn build(self) -> Result<MshEngine> {
        let resolver = Arc::new(StorePModeResolver::new(Arc::clone(&self.pmode_store)));

        let mut messaging = MessagingProcessor::new(
            resolver,
            Arc::clone(&self.mpc_store),
            self.config.default_responder_address.clone(),
        );
        for handler in self.pull_handlers {
            messaging = messaging.with_pull_handler(handler);
        }

        let mut registry = HeaderProcessorRegistry::new();
        registry.register(Arc::new(messaging))?;
        registry.register(Arc::new(SecurityProcessor::new(
            Arc::clone(&self.security_engine),
            self.credentials,
        )))?;

        let duplicate_store = Arc::new(DuplicateStore::new());
        let disposal = DisposalJob::new(
            Arc::clone(&duplicate_store),
            self.config.duplicate_retention_minutes,
            self.config.disposal_interval(),
        );

        Ok(MshEngine {
            registry,
            profile: self.profile,
            pmode_store: self.pmode_store,
            duplicate_store,
            disposal,
            config: self.config,
        })
    }
}

pub struct MshEngine {
    registry: HeaderProcessorRegistry,
    profile: Arc<dyn ProfileValidator>,
    pmode_store: Arc<PModeStore>,
    duplicate_store: Arc<DuplicateStore>,
    disposal: DisposalJob,
    config: MshConfig,
}

impl MshEngine {
    /// Loads the configured PMode document into the store, if one is set.
    pub async fn load_pmode_document(&self) -> Result<usize> {
        let Some(path) = self.config.pmode_document_path.as_deref() else {
            return Ok(0);
        };
        let document = PModeDocument::from_path(path, self.config.debug_mode)?;
        let count = document.pmodes.len();
        for pmode in document.pmodes {
            self.pmode_store.create_or_update(pmode).await?;
        }
        tracing::info!(
            target: "msh::engine",
            event = "pmode_document_loaded",
            path = path,
            pmodes = count
        );
        Ok(count)
    }

    pub async fn start_disposal(&self) {
        self.disposal.schedule().await;
    }

    pub async fn shutdown(&self) {
        self.disposal.shutdown().await;
    }

    pub fn duplicate_store(&self) -> &Arc<DuplicateStore> {
        &self.duplicate_store
    }

    /// Processes one inbound exchange.
    ///
    /// On failure the returned list is non-empty and every entry carries a
    /// stable wire code; the caller turns it into an ebMS3 error signal or
    /// an HTTP failure.
    pub async fn receive(
        &self,
        envelope: SoapEnvelope,
        attachments: Vec<Attachment>,
    ) -> std::result::Result<MessageState, Vec<Ebms3Error>> {
        metrics::counters().record_message_received();

        let mut ctx = ProcessingContext::new(&envelope, MessageState::new(attachments));
        self.registry.run(&mut ctx).await;

        if !ctx.errors.has_failure() {
            self.apply_profile(&mut ctx);
        }

        if ctx.errors.has_failure() {
            metrics::counters().record_message_rejected();
            let errors = ctx.errors.into_errors();
            crate::msh_event!(
                info,
                "msh::engine",
                "message_rejected",
                message_id = ctx.state.message_id().unwrap_or(""),
                errors = errors.len()
            );
            return Err(errors);
        }

        let mut state = ctx.state;
        self.record_arrival(&mut state).await;

        metrics::counters().record_message_accepted();
        crate::msh_event!(
            info,
            "msh::engine",
            "message_accepted",
            message_id = state.message_id().unwrap_or(""),
            pmode = state
                .pmode
                .as_ref()
                .map(|pmode| pmode.id.as_str())
                .unwrap_or(""),
            duplicate = state.duplicate
        );
        Ok(state)
    }

    fn apply_profile(&self, ctx: &mut ProcessingContext<'_>) {
        if let Some(pmode) = ctx.state.pmode.clone() {
            self.profile.validate_pmode(&pmode, &mut ctx.errors);
        }
        let Some(messaging) = ctx.state.messaging.clone() else {
            return;
        };
        if let Some(user) = messaging.user_message() {
            self.profile.validate_user_message(user, &mut ctx.errors);
        }
        if let Some(signal) = messaging.signal_message() {
            self.profile.validate_signal_message(signal, &mut ctx.errors);
        }
    }

    /// Duplicate bookkeeping for successfully processed messages. Only
    /// PModes that enable duplicate detection participate.
    async fn record_arrival(&self, state: &mut MessageState) {
        let detection_enabled = state
            .pmode
            .as_ref()
            .and_then(|pmode| pmode.reception_awareness.as_ref())
            .is_some_and(|awareness| awareness.duplicate_detection_enabled());
        if !detection_enabled {
            return;
        }
        let Some(message_id) = state.message_id().map(str::to_string) else {
            return;
        };

        let retention = ChronoDuration::minutes(self.config.duplicate_retention_minutes as i64);
        if self.duplicate_store.record(&message_id, retention).await == DuplicateCheck::Duplicate
        {
            // Response strategy for duplicates is a PMode/profile decision;
            // the engine only flags it.
            state.duplicate = true;
        }
    }
}
