#![forbid(unsafe_code)]

//! The `Messaging` header processor.
//!
//! Structural extraction of the ebMS3 header plus every consistency law
//! that can be checked without cryptography: message counts, party
//! cardinality, PMode resolution, leg selection, MPC existence and the
//! payload/attachment accounting rules.

use async_trait::async_trait;
use std::sync::Arc;

use crate::ebms::error::{
    Ebms3Error, INVALID_HEADER, INVALID_RECEIPT, EXTERNAL_PAYLOAD_ERROR,
    PROCESSING_MODE_MISMATCH, VALUE_INCONSISTENT, VALUE_NOT_RECOGNIZED,
};
use crate::ebms::{self, Messaging, SignalMessage, UserMessage, GZIP_COMPRESSION};
use crate::error::Error as MshError;
use crate::pipeline::{CompressionMode, HeaderProcessor, ProcessingContext};
use crate::pmode::leg::select_leg;
use crate::pmode::resolver::{PModeResolver, ResolutionRequest};
use crate::pmode::store::{MpcStore, DEFAULT_MPC};
use crate::pmode::PMode;
use crate::soap::{HeaderBlock, QName};

const ORIGIN: &str = "ebms3";

/// Resolves the PMode serving a pull request on a given channel.
///
/// Pull support is pluggable; handlers are consulted in registration order
/// and the first one returning a PMode wins.
#[async_trait]
pub trait PullRequestHandler: Send + Sync {
    async fn resolve(&self, mpc: &str) -> Option<Arc<PMode>>;
}

pub struct MessagingProcessor {
    resolver: Arc<dyn PModeResolver>,
    mpc_store: Arc<MpcStore>,
    pull_handlers: Vec<Arc<dyn PullRequestHandler>>,
    default_responder_address: Option<String>,
}

impl MessagingProcessor {
    pub fn new(
        resolver: Arc<dyn PModeResolver>,
        mpc_store: Arc<MpcStore>,
        default_responder_address: Option<String>,
    ) -> Self {
        Self {
            resolver,
            mpc_store,
            pull_handlers: Vec::new(),
            default_responder_address,
        }
    }

    pub fn with_pull_handler(mut self, handler: Arc<dyn PullRequestHandler>) -> Self {
        self.pull_handlers.push(handler);
        self
    }

    async fn handle_user_message(
        &self,
        user: &UserMessage,
        ctx: &mut ProcessingContext<'_>,
    ) {
        let message_id = user.message_info.message_id.clone();

        let initiator_id = match party_identity(&user.party_info.from, "From") {
            Ok(identity) => identity,
            Err(detail) => {
                ctx.errors.push(
                    Ebms3Error::new(VALUE_INCONSISTENT)
                        .ref_to(message_id.as_str())
                        .detail(detail)
                        .origin(ORIGIN),
                );
                return;
            }
        };
        let responder_id = match party_identity(&user.party_info.to, "To") {
            Ok(identity) => identity,
            Err(detail) => {
                ctx.errors.push(
                    Ebms3Error::new(VALUE_INCONSISTENT)
                        .ref_to(message_id.as_str())
                        .detail(detail)
                        .origin(ORIGIN),
                );
                return;
            }
        };

        let request = ResolutionRequest {
            pmode_id: user
                .collaboration_info
                .agreement_ref
                .as_ref()
                .and_then(|agreement| agreement.pmode.clone()),
            service: user.collaboration_info.service.value.clone(),
            action: user.collaboration_info.action.clone(),
            initiator_id: initiator_id.clone(),
            responder_id: responder_id.clone(),
            default_responder_address: self.default_responder_address.clone(),
        };

        let Some(pmode) = self.resolver.resolve(&request).await else {
            ctx.errors.push(
                Ebms3Error::new(PROCESSING_MODE_MISMATCH)
                    .ref_to(message_id.as_str())
                    .detail(format!(
                        "no processing mode governs service `{}` action `{}`",
                        request.service, request.action
                    ))
                    .origin(ORIGIN),
            );
            return;
        };

        let (leg_number, leg) = match select_leg(&user.message_info, &pmode) {
            Ok(selected) => selected,
            Err(error) => {
                ctx.errors.push(error);
                return;
            }
        };

        // The leg's own channel declaration must name a registered MPC.
        if let Some(leg_mpc) = leg.business_info.mpc.as_deref() {
            if !self.mpc_store.contains(leg_mpc).await {
                ctx.errors.push(
                    Ebms3Error::new(PROCESSING_MODE_MISMATCH)
                        .ref_to(message_id.as_str())
                        .detail(format!(
                            "pmode `{}` leg {} declares unknown MPC `{leg_mpc}`",
                            pmode.id,
                            leg_number.as_u8()
                        ))
                        .origin(ORIGIN),
                );
                return;
            }
        }

        let effective_mpc = user
            .mpc
            .clone()
            .or_else(|| leg.business_info.mpc.clone())
            .unwrap_or_else(|| DEFAULT_MPC.to_string());
        if !self.mpc_store.contains(&effective_mpc).await {
            ctx.errors.push(
                Ebms3Error::new(VALUE_INCONSISTENT)
                    .ref_to(message_id.as_str())
                    .detail(format!("MPC `{effective_mpc}` does not exist"))
                    .origin(ORIGIN),
            );
            return;
        }

        let body_present = ctx.envelope.body_has_content();
        let compression = self.check_payloads(user, body_present, ctx);
        if ctx.errors.has_failure() {
            return;
        }

        ctx.state.pmode = Some(pmode);
        ctx.state.leg = Some(leg_number);
        ctx.state.mpc = Some(effective_mpc);
        ctx.state.compression = compression;
        ctx.state.initiator_id = initiator_id;
        ctx.state.responder_id = responder_id;
        ctx.state.soap_body_payload_present = body_present;
    }

    /// Payload/attachment accounting. Declared parts and attached parts
    /// must agree exactly; a SOAP-body payload needs an href-less PartInfo
    /// to justify it.
    fn check_payloads(
        &self,
        user: &UserMessage,
        body_present: bool,
        ctx: &mut ProcessingContext<'_>,
    ) -> std::collections::BTreeMap<String, CompressionMode> {
        let message_id = user.message_info.message_id.as_str();
        let attachment_count = ctx.state.attachments.len();
        let mut compression = std::collections::BTreeMap::new();

        let parts = match user.payload_info.as_deref() {
            Some(parts) if !parts.is_empty() => parts,
            _ => {
                if body_present {
                    ctx.errors.push(
                        Ebms3Error::new(VALUE_INCONSISTENT)
                            .ref_to(message_id)
                            .detail("SOAP body carries a payload but no PartInfo declares it")
                            .origin(ORIGIN),
                    );
                }
                if attachment_count > 0 {
                    ctx.errors.push(
                        Ebms3Error::new(EXTERNAL_PAYLOAD_ERROR)
                            .ref_to(message_id)
                            .detail(format!(
                                "{attachment_count} attachment(s) present but no PartInfo declared"
                            ))
                            .origin(ORIGIN),
                    );
                }
                return compression;
            }
        };

        if attachment_count > parts.len() {
            ctx.errors.push(
                Ebms3Error::new(EXTERNAL_PAYLOAD_ERROR)
                    .ref_to(message_id)
                    .detail(format!(
                        "{attachment_count} attachment(s) exceed {} declared part(s)",
                        parts.len()
                    ))
                    .origin(ORIGIN),
            );
        }

        let mut href_count = 0usize;
        for part in parts {
            if !part.has_href() {
                if !body_present {
                    ctx.errors.push(
                        Ebms3Error::new(VALUE_INCONSISTENT)
                            .ref_to(message_id)
                            .detail("PartInfo without href requires a SOAP body payload")
                            .origin(ORIGIN),
                    );
                }
                continue;
            }
            href_count += 1;

            if let Some(compression_type) = part.compression_type() {
                if compression_type != GZIP_COMPRESSION {
                    ctx.errors.push(
                        Ebms3Error::new(VALUE_INCONSISTENT)
                            .ref_to(message_id)
                            .detail(format!(
                                "unsupported CompressionType `{compression_type}`"
                            ))
                            .origin(ORIGIN),
                    );
                    continue;
                }
                if part.mime_type().is_none() {
                    ctx.errors.push(
                        Ebms3Error::new(VALUE_INCONSISTENT)
                            .ref_to(message_id)
                            .detail("CompressionType declared without a MimeType property")
                            .origin(ORIGIN),
                    );
                    continue;
                }
                if let Some(href) = part.href.as_deref() {
                    let content_id = href.strip_prefix("cid:").unwrap_or(href);
                    compression.insert(content_id.to_string(), CompressionMode::Gzip);
                }
            }
        }

        if href_count != attachment_count {
            ctx.errors.push(
                Ebms3Error::new(EXTERNAL_PAYLOAD_ERROR)
                    .ref_to(message_id)
                    .detail(format!(
                        "{href_count} referenced part(s) but {attachment_count} attachment(s)"
                    ))
                    .origin(ORIGIN),
            );
        }

        compression
    }

    async fn handle_signal_message(
        &self,
        signal: &SignalMessage,
        ctx: &mut ProcessingContext<'_>,
    ) {
        let message_id = signal.message_info.message_id.as_str();

        if let Some(pull_request) = &signal.pull_request {
            let mpc = pull_request.mpc.as_deref().unwrap_or(DEFAULT_MPC);
            if !self.mpc_store.contains(mpc).await {
                ctx.errors.push(
                    Ebms3Error::new(VALUE_NOT_RECOGNIZED)
                        .ref_to(message_id)
                        .detail(format!("pull request names unknown MPC `{mpc}`"))
                        .origin(ORIGIN),
                );
                return;
            }

            let mut resolved = None;
            for handler in &self.pull_handlers {
                if let Some(pmode) = handler.resolve(mpc).await {
                    resolved = Some(pmode);
                    break;
                }
            }
            match resolved {
                Some(pmode) => {
                    ctx.state.pmode = Some(pmode);
                    ctx.state.mpc = Some(mpc.to_string());
                }
                None => {
                    ctx.errors.push(
                        Ebms3Error::new(VALUE_NOT_RECOGNIZED)
                            .ref_to(message_id)
                            .detail(format!(
                                "no pull handler resolves a processing mode for MPC `{mpc}`"
                            ))
                            .origin(ORIGIN),
                    );
                    return;
                }
            }
        }

        if signal.receipt.is_some() && signal.message_info.ref_to_message_id().is_empty() {
            ctx.errors.push(
                Ebms3Error::new(INVALID_RECEIPT)
                    .ref_to(message_id)
                    .detail("receipt does not reference a message")
                    .origin(ORIGIN),
            );
        }

        for error_element in &signal.errors {
            if error_element
                .ref_to_message_in_error
                .as_deref()
                .unwrap_or("")
                .is_empty()
            {
                ctx.errors.push(
                    Ebms3Error::new(VALUE_INCONSISTENT)
                        .ref_to(message_id)
                        .detail(format!(
                            "error element `{}` does not reference a message",
                            error_element.error_code
                        ))
                        .origin(ORIGIN),
                );
            }
        }
    }
}

fn party_identity(party: &ebms::Party, side: &str) -> Result<Option<String>, String> {
    match party.party_ids.as_slice() {
        [] => Ok(None),
        [id] => Ok(Some(id.identity())),
        many => Err(format!(
            "{side} party carries {} PartyId elements, at most one allowed",
            many.len()
        )),
    }
}

#[async_trait]
impl HeaderProcessor for MessagingProcessor {
    fn header_name(&self) -> QName {
        QName::messaging()
    }

    fn mandatory(&self) -> bool {
        true
    }

    async fn process(
        &self,
        header: Option<&HeaderBlock>,
        ctx: &mut ProcessingContext<'_>,
    ) -> Result<(), MshError> {
        let Some(header) = header else {
            return Ok(());
        };

        let messaging: Messaging = match ebms::parse_messaging(&header.content) {
            Ok(messaging) => messaging,
            Err(diagnostics) => {
                for diagnostic in diagnostics {
                    ctx.errors.push(
                        Ebms3Error::new(INVALID_HEADER)
                            .detail(diagnostic)
                            .origin(ORIGIN),
                    );
                }
                return Ok(());
            }
        };

        if messaging.user_messages.len() > 1 || messaging.signal_messages.len() > 1 {
            ctx.errors.push(
                Ebms3Error::new(VALUE_INCONSISTENT)
                    .detail(format!(
                        "envelope carries {} user message(s) and {} signal message(s), \
                         at most one of each allowed",
                        messaging.user_messages.len(),
                        messaging.signal_messages.len()
                    ))
                    .origin(ORIGIN),
            );
            return Ok(());
        }
        if messaging.user_messages.is_empty() && messaging.signal_messages.is_empty() {
            ctx.errors.push(
                Ebms3Error::new(VALUE_INCONSISTENT)
                    .detail("Messaging header carries neither a user nor a signal message")
                    .origin(ORIGIN),
            );
            return Ok(());
        }

        if let Some(user) = messaging.user_message() {
            self.handle_user_message(user, ctx).await;
        }
        if let Some(signal) = messaging.signal_message() {
            if !ctx.errors.has_failure() {
                self.handle_signal_message(signal, ctx).await;
            }
        }

        ctx.state.messaging = Some(messaging);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::MessageState;
    use crate::soap::{SoapEnvelope, SoapVersion};
    use serde_json::json;

    struct NoResolver;

    #[async_trait]
    impl PModeResolver for NoResolver {
        async fn resolve(&self, _request: &ResolutionRequest) -> Option<Arc<PMode>> {
            None
        }
    }

    fn processor() -> MessagingProcessor {
        MessagingProcessor::new(Arc::new(NoResolver), Arc::new(MpcStore::new()), None)
    }

    async fn run(content: serde_json::Value) -> crate::ebms::ErrorSink {
        let envelope = SoapEnvelope::new(SoapVersion::Soap12)
            .with_header(QName::messaging(), content);
        let mut ctx = ProcessingContext::new(&envelope, MessageState::new(Vec::new()));
        let header = envelope.header(&QName::messaging());
        processor()
            .process(header, &mut ctx)
            .await
            .expect("no infrastructure error");
        ctx.errors
    }

    #[tokio::test]
    async fn empty_messaging_header_is_inconsistent() {
        let errors = run(json!({})).await;
        assert!(errors.has_failure());
        assert_eq!(errors.errors()[0].code.code(), "EBMS:0003");
    }

    #[tokio::test]
    async fn parse_diagnostics_become_invalid_header_errors() {
        let content = json!({
            "user_messages": [{
                "message_info": { "message_id": "" },
                "party_info": {
                    "from": { "party_ids": [{ "value": "org:a" }], "role": "Initiator" },
                    "to": { "party_ids": [{ "value": "org:b" }], "role": "Responder" }
                },
                "collaboration_info": {
                    "service": { "value": "urn:s" },
                    "action": "act",
                    "conversation_id": "c1"
                }
            }]
        });
        let errors = run(content).await;
        assert!(errors.has_failure());
        assert!(errors
            .errors()
            .iter()
            .all(|error| error.code.code() == "EBMS:0009"));
    }

    #[tokio::test]
    async fn receipt_without_reference_is_invalid() {
        let content = json!({
            "signal_messages": [{
                "message_info": { "message_id": "sig-1" },
                "receipt": {}
            }]
        });
        let errors = run(content).await;
        assert!(errors.has_failure());
        assert_eq!(errors.errors()[0].code.code(), "EBMS:0302");
        assert_eq!(
            errors.errors()[0].ref_to_message_in_error.as_deref(),
            Some("sig-1")
        );
    }

    #[tokio::test]
    async fn error_signal_elements_must_reference_a_message() {
        let content = json!({
            "signal_messages": [{
                "message_info": { "message_id": "sig-2", "ref_to_message_id": "m1" },
                "errors": [{ "error_code": "EBMS:0004", "severity": "failure" }]
            }]
        });
        let errors = run(content).await;
        assert!(errors.has_failure());
        assert_eq!(errors.errors()[0].code.code(), "EBMS:0003");
    }

    #[tokio::test]
    async fn pull_request_on_unknown_mpc_is_not_recognized() {
        let content = json!({
            "signal_messages": [{
                "message_info": { "message_id": "sig-3" },
                "pull_request": { "mpc": "urn:mpc:absent" }
            }]
        });
        let errors = run(content).await;
        assert!(errors.has_failure());
        assert_eq!(errors.errors()[0].code.code(), "EBMS:0001");
    }
}
