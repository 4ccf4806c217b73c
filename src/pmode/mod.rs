#![forbid(unsafe_code)]

//! Processing Mode contract model.
//!
//! PModes are immutable value types: constructed once (from a YAML document
//! or programmatically), validated on every store write, and replaced
//! wholesale on update. Nothing mutates a stored PMode in place.

pub mod leg;
pub mod resolver;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

use crate::soap::SoapVersion;

/// Three-valued policy flag. "Unspecified" carries its own validation
/// consequences under strict profiles, so it is not collapsed into a
/// nullable boolean.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriState {
    Required,
    Forbidden,
    #[default]
    Unspecified,
}

impl TriState {
    pub fn is_required(self) -> bool {
        self == TriState::Required
    }

    pub fn from_bool(value: bool) -> Self {
        if value {
            TriState::Required
        } else {
            TriState::Forbidden
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mep {
    OneWay,
    TwoWay,
}

impl Mep {
    pub fn as_str(self) -> &'static str {
        match self {
            Mep::OneWay => "one_way",
            Mep::TwoWay => "two_way",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MepBinding {
    Push,
    Pull,
    PushPush,
    PushPull,
    PullPush,
    PullPull,
}

impl MepBinding {
    /// Number of legs the binding requires to be configured.
    pub fn required_leg_count(self) -> u8 {
        match self {
            MepBinding::Push | MepBinding::Pull => 1,
            MepBinding::PushPush
            | MepBinding::PushPull
            | MepBinding::PullPush
            | MepBinding::PullPull => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MepBinding::Push => "push",
            MepBinding::Pull => "pull",
            MepBinding::PushPush => "push_push",
            MepBinding::PushPull => "push_pull",
            MepBinding::PullPush => "pull_push",
            MepBinding::PullPull => "pull_pull",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PMode {
    pub id: String,
    #[serde(default)]
    pub initiator: Option<PModeParty>,
    #[serde(default)]
    pub responder: Option<PModeParty>,
    #[serde(default)]
    pub agreement: Option<String>,
    pub mep: Mep,
    pub binding: MepBinding,
    #[serde(default)]
    pub leg1: Option<PModeLeg>,
    #[serde(default)]
    pub leg2: Option<PModeLeg>,
    #[serde(default)]
    pub payload_service: Option<PayloadService>,
    #[serde(default)]
    pub reception_awareness: Option<ReceptionAwareness>,
    #[serde(default)]
    pub metadata: PModeMetadata,
}

impl PMode {
    pub fn leg(&self, number: leg::LegNumber) -> Option<&PModeLeg> {
        match number {
            leg::LegNumber::Leg1 => self.leg1.as_ref(),
            leg::LegNumber::Leg2 => self.leg2.as_ref(),
        }
    }

    pub fn initiator_identity(&self) -> Option<String> {
        self.initiator.as_ref().map(PModeParty::identity)
    }

    pub fn responder_identity(&self) -> Option<String> {
        self.responder.as_ref().map(PModeParty::identity)
    }

    /// Structural validation, enforced on every store write.
    ///
    /// Accumulates one message per defect. Debug mode relaxes the
    /// `https`-only endpoint rule to also allow `http`.
    pub fn validate(&self, debug_mode: bool) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.id.trim().is_empty() {
            errors.push("error[pmode]: identifier must be non-empty".to_string());
        }
        let label = if self.id.trim().is_empty() {
            "<unnamed>"
        } else {
            self.id.as_str()
        };

        if self.initiator.is_none() && self.responder.is_none() {
            errors.push(format!(
                "error[pmode {label}]: at least one of initiator or responder is required"
            ));
        }
        if let Some(party) = &self.initiator {
            validate_party(party, label, "initiator", &mut errors);
        }
        if let Some(party) = &self.responder {
            validate_party(party, label, "responder", &mut errors);
        }

        if self.leg1.is_none() {
            errors.push(format!("error[pmode {label}]: leg 1 is required"));
        }
        let required = self.binding.required_leg_count();
        let present = u8::from(self.leg1.is_some()) + u8::from(self.leg2.is_some());
        if required != present {
            errors.push(format!(
                "error[pmode {label}]: binding `{}` requires {} leg(s) but {} configured",
                self.binding.as_str(),
                required,
                present
            ));
        }

        for (number, leg) in [("1", &self.leg1), ("2", &self.leg2)] {
            if let Some(leg) = leg {
                validate_leg(leg, label, number, debug_mode, &mut errors);
            }
        }

        if let Some(compression) = self
            .payload_service
            .as_ref()
            .and_then(|service| service.compression_type.as_deref())
        {
            if compression != crate::ebms::GZIP_COMPRESSION {
                errors.push(format!(
                    "error[pmode {label}]: unsupported payload compression `{compression}`"
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn validate_party(party: &PModeParty, pmode: &str, side: &str, errors: &mut Vec<String>) {
    if party.id_value.trim().is_empty() {
        errors.push(format!(
            "error[pmode {pmode}]: {side} party id must be non-empty"
        ));
    }
    if party.role.trim().is_empty() {
        errors.push(format!(
            "error[pmode {pmode}]: {side} party role must be non-empty"
        ));
    }
}

fn validate_leg(
    leg: &PModeLeg,
    pmode: &str,
    number: &str,
    debug_mode: bool,
    errors: &mut Vec<String>,
) {
    if let Some(address) = leg.protocol.address.as_deref() {
        match url::Url::parse(address) {
            Ok(parsed) => {
                let scheme_ok = parsed.scheme() == "https"
                    || (debug_mode && parsed.scheme() == "http");
                if !scheme_ok {
                    errors.push(format!(
                        "error[pmode {pmode}]: leg {number} address `{address}` must use https"
                    ));
                }
            }
            Err(err) => errors.push(format!(
                "error[pmode {pmode}]: leg {number} address `{address}` is invalid: {err}"
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PModeParty {
    #[serde(default)]
    pub id_type: Option<String>,
    pub id_value: String,
    pub role: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl PModeParty {
    pub fn new(id_value: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id_type: None,
            id_value: id_value.into(),
            role: role.into(),
            username: None,
            password: None,
        }
    }

    /// `type:value` when a type is present, the bare value otherwise.
    pub fn identity(&self) -> String {
        match &self.id_type {
            Some(id_type) if !id_type.is_empty() => format!("{id_type}:{}", self.id_value),
            _ => self.id_value.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PModeLeg {
    #[serde(default)]
    pub protocol: LegProtocol,
    #[serde(default)]
    pub business_info: BusinessInfo,
    #[serde(default)]
    pub error_handling: ErrorHandling,
    #[serde(default)]
    pub reliability: Option<LegReliability>,
    #[serde(default)]
    pub security: Option<SecurityPolicy>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LegProtocol {
    #[serde(default)]
    pub address: Option<String>,
    pub soap_version: SoapVersion,
}

impl Default for LegProtocol {
    fn default() -> Self {
        Self {
            address: None,
            soap_version: SoapVersion::Soap12,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessInfo {
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub mpc: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorHandling {
    #[serde(default)]
    pub report_as_response: TriState,
    #[serde(default)]
    pub notify_consumer_on_error: TriState,
    #[serde(default)]
    pub notify_producer_on_delivery_failure: TriState,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegReliability {
    #[serde(default)]
    pub at_least_once: TriState,
    #[serde(default)]
    pub at_most_once: TriState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WssVersion {
    Wss10,
    Wss11,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyPattern {
    Response,
    Callback,
}

/// Signature algorithms this MSH knows how to negotiate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureAlgorithm {
    RsaSha256,
    RsaSha512,
    EcdsaSha256,
}

impl SignatureAlgorithm {
    pub fn uri(self) -> &'static str {
        match self {
            SignatureAlgorithm::RsaSha256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            SignatureAlgorithm::RsaSha512 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512",
            SignatureAlgorithm::EcdsaSha256 => {
                "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256"
            }
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        [
            SignatureAlgorithm::RsaSha256,
            SignatureAlgorithm::RsaSha512,
            SignatureAlgorithm::EcdsaSha256,
        ]
        .into_iter()
        .find(|algorithm| algorithm.uri() == uri)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestAlgorithm {
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    pub fn uri(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "http://www.w3.org/2001/04/xmlenc#sha256",
            DigestAlgorithm::Sha512 => "http://www.w3.org/2001/04/xmlenc#sha512",
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        [DigestAlgorithm::Sha256, DigestAlgorithm::Sha512]
            .into_iter()
            .find(|algorithm| algorithm.uri() == uri)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionAlgorithm {
    Aes128Gcm,
    Aes256Gcm,
}

impl EncryptionAlgorithm {
    pub fn uri(self) -> &'static str {
        match self {
            EncryptionAlgorithm::Aes128Gcm => "http://www.w3.org/2009/xmlenc11#aes128-gcm",
            EncryptionAlgorithm::Aes256Gcm => "http://www.w3.org/2009/xmlenc11#aes256-gcm",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SecurityPolicy {
    pub wss_version: WssVersion,
    pub signature_algorithm: SignatureAlgorithm,
    pub signature_digest: DigestAlgorithm,
    #[serde(default)]
    pub encryption_algorithm: Option<EncryptionAlgorithm>,
    #[serde(default)]
    pub min_key_strength: Option<u32>,
    #[serde(default)]
    pub pmode_authorize: bool,
    #[serde(default)]
    pub send_receipt: bool,
    #[serde(default)]
    pub reply_pattern: Option<ReplyPattern>,
    #[serde(default)]
    pub non_repudiation: bool,
}

/// Payload compression policy for the whole PMode.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadService {
    #[serde(default)]
    pub compression_type: Option<String>,
}

/// Reception awareness policy. Created with the PMode, read on every
/// inbound message, never mutated per-message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceptionAwareness {
    #[serde(default)]
    pub enabled: TriState,
    #[serde(default)]
    pub retry: TriState,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub retry_interval_ms: u64,
    #[serde(default)]
    pub duplicate_detection: TriState,
}

impl ReceptionAwareness {
    pub fn duplicate_detection_enabled(&self) -> bool {
        self.enabled.is_required() && self.duplicate_detection.is_required()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PModeMetadata {
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted: bool,
}

/// Operator-supplied PMode document (YAML).
#[derive(Clone, Debug, PartialEq)]
pub struct PModeDocument {
    pub pmodes: Vec<PMode>,
}

impl PModeDocument {
    pub fn from_path(path: impl AsRef<Path>, debug_mode: bool) -> Result<Self, PModeConfigError> {
        let file = File::open(path)?;
        Self::from_reader(file, debug_mode)
    }

    pub fn from_reader(
        mut reader: impl Read,
        debug_mode: bool,
    ) -> Result<Self, PModeConfigError> {
        let mut contents = String::new();
        reader.read_to_string(&mut contents)?;
        Self::from_yaml_str(&contents, debug_mode)
    }

    pub fn from_yaml_str(contents: &str, debug_mode: bool) -> Result<Self, PModeConfigError> {
        let raw: RawPModeDocument = serde_yaml::from_str(contents)?;

        let mut errors = Vec::new();
        for pmode in &raw.pmodes {
            if let Err(defects) = pmode.validate(debug_mode) {
                errors.extend(defects);
            }
        }

        let mut seen = std::collections::BTreeSet::new();
        for pmode in &raw.pmodes {
            if !seen.insert(pmode.id.as_str()) {
                errors.push(format!(
                    "error[pmode {}]: duplicate identifier in document",
                    pmode.id
                ));
            }
        }

        if errors.is_empty() {
            Ok(Self { pmodes: raw.pmodes })
        } else {
            Err(PModeConfigError::Invalid(PModeValidationError::new(errors)))
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPModeDocument {
    #[serde(default)]
    pmodes: Vec<PMode>,
}

#[derive(Debug, Error)]
pub enum PModeConfigError {
    #[error("failed to read pmode document: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse pmode document: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error(transparent)]
    Invalid(PModeValidationError),
}

#[derive(Debug, Error)]
#[error("pmode validation failed:\n{rendered}")]
pub struct PModeValidationError {
    rendered: String,
}

impl PModeValidationError {
    pub fn new(messages: Vec<String>) -> Self {
        let rendered = messages
            .iter()
            .map(|msg| format!("- {msg}"))
            .collect::<Vec<_>>()
            .join("\n");
        Self { rendered }
    }
}
