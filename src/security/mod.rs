#![forbid(unsafe_code)]

//! Security policy enforcement and engine delegation.
//!
//! The cryptography itself lives in an external engine; this module checks
//! the declared algorithms against the leg's policy, cross-checks attachment
//! identity against the declared parts, and maps engine failures onto the
//! wire error vocabulary.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::ebms::error::{Ebms3Error, FAILED_AUTHENTICATION, FAILED_DECRYPTION, VALUE_INCONSISTENT};
use crate::error::Error as MshError;
use crate::metrics;
use crate::pipeline::{Certificate, HeaderProcessor, ProcessingContext};
use crate::pmode::{DigestAlgorithm, SecurityPolicy, SignatureAlgorithm};
use crate::soap::{Attachment, HeaderBlock, QName, SoapEnvelope};

const ORIGIN: &str = "security";

/// Material handed to the engine for verification and decryption.
#[derive(Clone, Debug, Default)]
pub struct Credentials {
    pub key_alias: Option<String>,
    pub key_password: Option<String>,
}

/// What the engine actually did to the message.
#[derive(Clone, Debug, Default)]
pub struct SecurityOutcome {
    pub decrypted_body: Option<JsonValue>,
    pub decrypted_attachments: Vec<Attachment>,
    pub certificates: Vec<Certificate>,
    pub signed: bool,
    pub encrypted: bool,
}

/// Failure class reported by the engine.
///
/// Engines that cannot tell a bad signature from a failed decryption report
/// `Indeterminate`, which maps to the decryption error code on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecurityFailureKind {
    Signature,
    Decryption,
    Indeterminate,
}

#[derive(Clone, Debug, Error)]
#[error("security engine failure: {message}")]
pub struct SecurityFailure {
    pub kind: SecurityFailureKind,
    pub message: String,
}

impl SecurityFailure {
    pub fn new(kind: SecurityFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait SecurityEngine: Send + Sync {
    async fn verify_and_decrypt(
        &self,
        envelope: &SoapEnvelope,
        attachments: &[Attachment],
        credentials: &Credentials,
    ) -> Result<SecurityOutcome, SecurityFailure>;
}

/// Pipeline stage owning the WS-Security header.
pub struct SecurityProcessor {
    engine: std::sync::Arc<dyn SecurityEngine>,
    credentials: Credentials,
}

impl SecurityProcessor {
    pub fn new(engine: std::sync::Arc<dyn SecurityEngine>, credentials: Credentials) -> Self {
        Self { engine, credentials }
    }

    fn check_declared_algorithms(
        &self,
        header: &HeaderBlock,
        policy: &SecurityPolicy,
        ctx: &mut ProcessingContext<'_>,
    ) {
        let declared: RawSecurityHeader =
            match serde_json::from_value(header.content.clone()) {
                Ok(declared) => declared,
                Err(err) => {
                    ctx.errors.push(
                        Ebms3Error::new(FAILED_AUTHENTICATION)
                            .ref_to(ctx.state.message_id().unwrap_or(""))
                            .detail(format!("security header is not readable: {err}"))
                            .origin(ORIGIN),
                    );
                    return;
                }
            };

        let Some(signature) = declared.signature else {
            return;
        };
        let message_id = ctx.state.message_id().unwrap_or("").to_string();

        if let Some(uri) = signature.signature_method.as_deref() {
            match SignatureAlgorithm::from_uri(uri) {
                Some(algorithm) if algorithm == policy.signature_algorithm => {}
                Some(algorithm) => ctx.errors.push(
                    Ebms3Error::new(FAILED_AUTHENTICATION)
                        .ref_to(message_id.as_str())
                        .detail(format!(
                            "signature algorithm `{}` does not match the agreed `{}`",
                            algorithm.uri(),
                            policy.signature_algorithm.uri()
                        ))
                        .origin(ORIGIN),
                ),
                None => ctx.errors.push(
                    Ebms3Error::new(FAILED_AUTHENTICATION)
                        .ref_to(message_id.as_str())
                        .detail(format!("unsupported signature algorithm `{uri}`"))
                        .origin(ORIGIN),
                ),
            }
        }

        if let Some(uri) = signature.digest_method.as_deref() {
            match DigestAlgorithm::from_uri(uri) {
                Some(algorithm) if algorithm == policy.signature_digest => {}
                Some(algorithm) => ctx.errors.push(
                    Ebms3Error::new(FAILED_AUTHENTICATION)
                        .ref_to(message_id.as_str())
                        .detail(format!(
                            "digest algorithm `{}` does not match the agreed `{}`",
                            algorithm.uri(),
                            policy.signature_digest.uri()
                        ))
                        .origin(ORIGIN),
                ),
                None => ctx.errors.push(
                    Ebms3Error::new(FAILED_AUTHENTICATION)
                        .ref_to(message_id.as_str())
                        .detail(format!("unsupported digest algorithm `{uri}`"))
                        .origin(ORIGIN),
                ),
            }
        }
    }

    /// Each attachment must sit at the declared part position. A body
    /// payload occupies slot 0 and shifts the attachment parts by one.
    fn check_attachment_identity(&self, ctx: &mut ProcessingContext<'_>) {
        let Some(parts) = ctx
            .state
            .messaging
            .as_ref()
            .and_then(|messaging| messaging.user_message())
            .and_then(|user| user.payload_info.clone())
        else {
            return;
        };
        let message_id = ctx.state.message_id().unwrap_or("").to_string();
        let offset = usize::from(ctx.state.soap_body_payload_present);

        let mismatches: Vec<String> = ctx
            .state
            .attachments
            .iter()
            .enumerate()
            .filter_map(|(index, attachment)| {
                let href = parts.get(index + offset).and_then(|part| part.href.as_deref());
                match href {
                    Some(href) if attachment.matches_href(href) => None,
                    Some(href) => Some(format!(
                        "attachment `{}` does not match declared part `{href}`",
                        attachment.content_id
                    )),
                    None => Some(format!(
                        "attachment `{}` has no declared part at position {}",
                        attachment.content_id,
                        index + offset
                    )),
                }
            })
            .collect();

        for detail in mismatches {
            ctx.errors.push(
                Ebms3Error::new(VALUE_INCONSISTENT)
                    .ref_to(message_id.as_str())
                    .detail(detail)
                    .origin(ORIGIN),
            );
        }
    }
}

#[async_trait]
impl HeaderProcessor for SecurityProcessor {
    fn header_name(&self) -> QName {
        QName::security()
    }

    async fn process(
        &self,
        header: Option<&HeaderBlock>,
        ctx: &mut ProcessingContext<'_>,
    ) -> Result<(), MshError> {
        let policy = ctx
            .state
            .pmode
            .as_ref()
            .zip(ctx.state.leg)
            .and_then(|(pmode, leg)| pmode.leg(leg))
            .and_then(|leg| leg.security.clone());
        let Some(policy) = policy else {
            return Ok(());
        };

        if let Some(header) = header {
            self.check_declared_algorithms(header, &policy, ctx);
            if ctx.errors.has_failure() {
                return Ok(());
            }
        }

        self.check_attachment_identity(ctx);
        if ctx.errors.has_failure() {
            return Ok(());
        }

        let outcome = self
            .engine
            .verify_and_decrypt(ctx.envelope, &ctx.state.attachments, &self.credentials)
            .await;
        metrics::counters().record_security_verification();

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(failure) => {
                let code = match failure.kind {
                    SecurityFailureKind::Signature => FAILED_AUTHENTICATION,
                    SecurityFailureKind::Decryption | SecurityFailureKind::Indeterminate => {
                        FAILED_DECRYPTION
                    }
                };
                ctx.errors.push(
                    Ebms3Error::new(code)
                        .ref_to(ctx.state.message_id().unwrap_or(""))
                        .detail(failure.message)
                        .origin(ORIGIN),
                );
                return Ok(());
            }
        };

        for certificate in outcome.certificates {
            ctx.state.record_certificate(certificate);
        }
        if ctx.state.certificates.len() > 1 {
            tracing::warn!(
                target: "msh::security",
                event = "multiple_certificates",
                message_id = ctx.state.message_id().unwrap_or(""),
                certificates = ctx.state.certificates.len()
            );
        }

        ctx.state.soap_signature_checked = outcome.signed;
        ctx.state.soap_decrypted = outcome.encrypted;

        if !outcome.decrypted_attachments.is_empty() {
            // Copy into the request scope so downstream consumers can read
            // the content more than once.
            for attachment in &outcome.decrypted_attachments {
                let stored = {
                    let scope = ctx.state.temp_scope()?;
                    scope.store(&attachment.content_id, &attachment.data)?
                };
                tracing::debug!(
                    target: "msh::security",
                    event = "attachment_decrypted",
                    content_id = %attachment.content_id,
                    path = %stored.display()
                );
            }
            ctx.state.decrypted_attachments = outcome.decrypted_attachments;
        }

        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawSecurityHeader {
    #[serde(default, alias = "Signature")]
    signature: Option<RawSignature>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSignature {
    #[serde(default, alias = "SignatureMethod")]
    signature_method: Option<String>,
    #[serde(default, alias = "DigestMethod")]
    digest_method: Option<String>,
}
