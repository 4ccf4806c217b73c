#![forbid(unsafe_code)]

//! Typed ebMS3 `Messaging` header model and its decoder.
//!
//! The marshaller hands the header over as a neutral tree; decoding runs in
//! two stages. A tolerant serde pass reads the raw shape, then a validation
//! pass accumulates one diagnostic per structural defect so the caller can
//! report every problem in a single response.

pub mod error;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub use error::{Ebms3Error, EbmsErrorCode, ErrorSink, Severity};

/// Part property names tracked by the payload consistency checks.
pub const MIME_TYPE_PROPERTY: &str = "MimeType";
pub const COMPRESSION_TYPE_PROPERTY: &str = "CompressionType";

/// The only compression scheme the AS4 payload service supports.
pub const GZIP_COMPRESSION: &str = "application/gzip";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Messaging {
    pub user_messages: Vec<UserMessage>,
    pub signal_messages: Vec<SignalMessage>,
}

impl Messaging {
    pub fn user_message(&self) -> Option<&UserMessage> {
        self.user_messages.first()
    }

    pub fn signal_message(&self) -> Option<&SignalMessage> {
        self.signal_messages.first()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MessageInfo {
    pub message_id: String,
    pub ref_to_message_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl MessageInfo {
    pub fn ref_to_message_id(&self) -> &str {
        self.ref_to_message_id.as_deref().unwrap_or("")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UserMessage {
    pub message_info: MessageInfo,
    pub mpc: Option<String>,
    pub party_info: PartyInfo,
    pub collaboration_info: CollaborationInfo,
    pub message_properties: Vec<Property>,
    pub payload_info: Option<Vec<PartInfo>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PartyInfo {
    pub from: Party,
    pub to: Party,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Party {
    pub party_ids: Vec<PartyId>,
    pub role: String,
}

impl Party {
    /// The single PartyId, when exactly one is present.
    pub fn sole_party_id(&self) -> Option<&PartyId> {
        match self.party_ids.as_slice() {
            [id] => Some(id),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PartyId {
    pub value: String,
    pub id_type: Option<String>,
}

impl PartyId {
    /// `type:value` when a type is present, the bare value otherwise.
    pub fn identity(&self) -> String {
        match &self.id_type {
            Some(id_type) if !id_type.is_empty() => format!("{id_type}:{}", self.value),
            _ => self.value.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CollaborationInfo {
    pub agreement_ref: Option<AgreementRef>,
    pub service: Service,
    pub action: String,
    pub conversation_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgreementRef {
    pub value: String,
    pub pmode: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Service {
    pub value: String,
    pub service_type: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Property {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PartInfo {
    pub href: Option<String>,
    pub properties: Vec<Property>,
}

impl PartInfo {
    pub fn has_href(&self) -> bool {
        self.href.as_deref().is_some_and(|href| !href.is_empty())
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|property| property.name == name)
            .map(|property| property.value.as_str())
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.property(MIME_TYPE_PROPERTY)
    }

    pub fn compression_type(&self) -> Option<&str> {
        self.property(COMPRESSION_TYPE_PROPERTY)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SignalMessage {
    pub message_info: MessageInfo,
    pub pull_request: Option<PullRequest>,
    pub receipt: Option<Receipt>,
    pub errors: Vec<ErrorElement>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PullRequest {
    pub mpc: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Receipt {
    /// Non-repudiation evidence carried verbatim; the engine does not
    /// interpret it.
    pub evidence: Option<JsonValue>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ErrorElement {
    pub error_code: String,
    pub severity: String,
    pub ref_to_message_in_error: Option<String>,
    pub short_description: Option<String>,
}

/// Decodes a `Messaging` header block, accumulating every diagnostic.
pub fn parse_messaging(content: &JsonValue) -> Result<Messaging, Vec<String>> {
    let raw: RawMessaging = match serde_json::from_value(content.clone()) {
        Ok(raw) => raw,
        Err(err) => return Err(vec![format!("error[messaging]: {err}")]),
    };

    let mut errors = Vec::new();

    let user_messages = raw
        .user_messages
        .iter()
        .enumerate()
        .map(|(index, raw)| parse_user_message(raw, index, &mut errors))
        .collect();

    let signal_messages = raw
        .signal_messages
        .iter()
        .enumerate()
        .map(|(index, raw)| parse_signal_message(raw, index, &mut errors))
        .collect();

    if errors.is_empty() {
        Ok(Messaging {
            user_messages,
            signal_messages,
        })
    } else {
        Err(errors)
    }
}

fn parse_user_message(
    raw: &RawUserMessage,
    index: usize,
    errors: &mut Vec<String>,
) -> UserMessage {
    let location = format!("user_message[{index}]");

    let message_info = parse_message_info(&raw.message_info, &location, errors);
    let party_info = parse_party_info(&raw.party_info, &location, errors);
    let collaboration_info =
        parse_collaboration_info(&raw.collaboration_info, &location, errors);

    let message_properties = raw
        .message_properties
        .iter()
        .map(|raw| parse_property(raw, &location, errors))
        .collect();

    let payload_info = raw.payload_info.as_ref().map(|parts| {
        parts
            .iter()
            .enumerate()
            .map(|(part_index, raw)| {
                parse_part_info(raw, &format!("{location}.part_info[{part_index}]"), errors)
            })
            .collect()
    });

    UserMessage {
        message_info,
        mpc: normalize(&raw.mpc),
        party_info,
        collaboration_info,
        message_properties,
        payload_info,
    }
}

fn parse_message_info(
    raw: &RawMessageInfo,
    location: &str,
    errors: &mut Vec<String>,
) -> MessageInfo {
    let message_id = raw.message_id.trim().to_string();
    if message_id.is_empty() {
        errors.push(format!("error[{location}]: MessageId must be non-empty"));
    }

    MessageInfo {
        message_id,
        ref_to_message_id: normalize(&raw.ref_to_message_id),
        timestamp: raw.timestamp,
    }
}

fn parse_party_info(raw: &RawPartyInfo, location: &str, errors: &mut Vec<String>) -> PartyInfo {
    PartyInfo {
        from: parse_party(&raw.from, &format!("{location}.from"), errors),
        to: parse_party(&raw.to, &format!("{location}.to"), errors),
    }
}

fn parse_party(raw: &RawParty, location: &str, errors: &mut Vec<String>) -> Party {
    let role = raw.role.trim().to_string();
    if role.is_empty() {
        errors.push(format!("error[{location}]: Role must be non-empty"));
    }

    let party_ids = raw
        .party_ids
        .iter()
        .enumerate()
        .map(|(index, raw_id)| {
            let value = raw_id.value.trim().to_string();
            if value.is_empty() {
                errors.push(format!(
                    "error[{location}.party_id[{index}]]: PartyId must be non-empty"
                ));
            }
            PartyId {
                value,
                id_type: normalize(&raw_id.id_type),
            }
        })
        .collect();

    Party { party_ids, role }
}

fn parse_collaboration_info(
    raw: &RawCollaborationInfo,
    location: &str,
    errors: &mut Vec<String>,
) -> CollaborationInfo {
    let service = Service {
        value: raw.service.value.trim().to_string(),
        service_type: normalize(&raw.service.service_type),
    };
    if service.value.is_empty() {
        errors.push(format!("error[{location}]: Service must be non-empty"));
    }

    let action = raw.action.trim().to_string();
    if action.is_empty() {
        errors.push(format!("error[{location}]: Action must be non-empty"));
    }

    CollaborationInfo {
        agreement_ref: raw.agreement_ref.as_ref().map(|agreement| AgreementRef {
            value: agreement.value.trim().to_string(),
            pmode: normalize(&agreement.pmode),
        }),
        service,
        action,
        conversation_id: raw.conversation_id.trim().to_string(),
    }
}

fn parse_property(raw: &RawProperty, location: &str, errors: &mut Vec<String>) -> Property {
    let name = raw.name.trim().to_string();
    if name.is_empty() {
        errors.push(format!("error[{location}]: property name must be non-empty"));
    }
    Property {
        name,
        value: raw.value.clone(),
    }
}

fn parse_part_info(raw: &RawPartInfo, location: &str, errors: &mut Vec<String>) -> PartInfo {
    PartInfo {
        href: normalize(&raw.href),
        properties: raw
            .properties
            .iter()
            .map(|raw| parse_property(raw, location, errors))
            .collect(),
    }
}

fn parse_signal_message(
    raw: &RawSignalMessage,
    index: usize,
    errors: &mut Vec<String>,
) -> SignalMessage {
    let location = format!("signal_message[{index}]");
    let message_info = parse_message_info(&raw.message_info, &location, errors);

    SignalMessage {
        message_info,
        pull_request: raw.pull_request.as_ref().map(|raw| PullRequest {
            mpc: normalize(&raw.mpc),
        }),
        receipt: raw.receipt.as_ref().map(|raw| Receipt {
            evidence: raw.evidence.clone(),
        }),
        errors: raw
            .errors
            .iter()
            .map(|raw| ErrorElement {
                error_code: raw.error_code.trim().to_string(),
                severity: raw.severity.trim().to_string(),
                ref_to_message_in_error: normalize(&raw.ref_to_message_in_error),
                short_description: normalize(&raw.short_description),
            })
            .collect(),
    }
}

fn normalize(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Default, Deserialize)]
struct RawMessaging {
    #[serde(default, alias = "UserMessage")]
    user_messages: Vec<RawUserMessage>,
    #[serde(default, alias = "SignalMessage")]
    signal_messages: Vec<RawSignalMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct RawUserMessage {
    #[serde(default, alias = "MessageInfo")]
    message_info: RawMessageInfo,
    #[serde(default)]
    mpc: Option<String>,
    #[serde(default, alias = "PartyInfo")]
    party_info: RawPartyInfo,
    #[serde(default, alias = "CollaborationInfo")]
    collaboration_info: RawCollaborationInfo,
    #[serde(default, alias = "MessageProperties")]
    message_properties: Vec<RawProperty>,
    #[serde(default, alias = "PayloadInfo")]
    payload_info: Option<Vec<RawPartInfo>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMessageInfo {
    #[serde(default, alias = "MessageId")]
    message_id: String,
    #[serde(default, alias = "RefToMessageId")]
    ref_to_message_id: Option<String>,
    #[serde(default, alias = "Timestamp")]
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPartyInfo {
    #[serde(default, alias = "From")]
    from: RawParty,
    #[serde(default, alias = "To")]
    to: RawParty,
}

#[derive(Debug, Default, Deserialize)]
struct RawParty {
    #[serde(default, alias = "PartyId")]
    party_ids: Vec<RawPartyId>,
    #[serde(default, alias = "Role")]
    role: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawPartyId {
    #[serde(default)]
    value: String,
    #[serde(default, alias = "type")]
    id_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCollaborationInfo {
    #[serde(default, alias = "AgreementRef")]
    agreement_ref: Option<RawAgreementRef>,
    #[serde(default, alias = "Service")]
    service: RawService,
    #[serde(default, alias = "Action")]
    action: String,
    #[serde(default, alias = "ConversationId")]
    conversation_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawAgreementRef {
    #[serde(default)]
    value: String,
    #[serde(default)]
    pmode: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawService {
    #[serde(default)]
    value: String,
    #[serde(default, alias = "type")]
    service_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProperty {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawPartInfo {
    #[serde(default)]
    href: Option<String>,
    #[serde(default, alias = "PartProperties")]
    properties: Vec<RawProperty>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSignalMessage {
    #[serde(default, alias = "MessageInfo")]
    message_info: RawMessageInfo,
    #[serde(default, alias = "PullRequest")]
    pull_request: Option<RawPullRequest>,
    #[serde(default, alias = "Receipt")]
    receipt: Option<RawReceipt>,
    #[serde(default, alias = "Error")]
    errors: Vec<RawErrorElement>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPullRequest {
    #[serde(default)]
    mpc: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawReceipt {
    #[serde(default)]
    evidence: Option<JsonValue>,
}

#[derive(Debug, Default, Deserialize)]
struct RawErrorElement {
    #[serde(default, alias = "errorCode")]
    error_code: String,
    #[serde(default)]
    severity: String,
    #[serde(default, alias = "refToMessageInError")]
    ref_to_message_in_error: Option<String>,
    #[serde(default, alias = "shortDescription")]
    short_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_minimal_user_message() {
        let content = json!({
            "user_messages": [{
                "message_info": { "message_id": "msg-1" },
                "party_info": {
                    "from": { "party_ids": [{ "value": "org:sender" }], "role": "Initiator" },
                    "to": { "party_ids": [{ "value": "org:receiver" }], "role": "Responder" }
                },
                "collaboration_info": {
                    "service": { "value": "urn:invoicing" },
                    "action": "submit",
                    "conversation_id": "conv-1"
                }
            }]
        });

        let messaging = parse_messaging(&content).expect("header should parse");
        let user = messaging.user_message().expect("one user message");
        assert_eq!(user.message_info.message_id, "msg-1");
        assert_eq!(user.party_info.from.party_ids[0].identity(), "org:sender");
        assert_eq!(user.collaboration_info.action, "submit");
    }

    #[test]
    fn collects_every_diagnostic() {
        let content = json!({
            "user_messages": [{
                "message_info": { "message_id": "" },
                "party_info": {
                    "from": { "party_ids": [{ "value": "" }], "role": "" },
                    "to": { "party_ids": [{ "value": "org:receiver" }], "role": "Responder" }
                },
                "collaboration_info": {
                    "service": { "value": "" },
                    "action": ""
                }
            }]
        });

        let errors = parse_messaging(&content).expect_err("defects should accumulate");
        assert_eq!(errors.len(), 5, "diagnostics: {errors:?}");
        assert!(errors.iter().any(|err| err.contains("MessageId")));
        assert!(errors.iter().any(|err| err.contains("Role")));
        assert!(errors.iter().any(|err| err.contains("Service")));
        assert!(errors.iter().any(|err| err.contains("Action")));
    }

    #[test]
    fn party_identity_includes_type_when_present() {
        let with_type = PartyId {
            value: "0088:12345".into(),
            id_type: Some("iso6523".into()),
        };
        assert_eq!(with_type.identity(), "iso6523:0088:12345");

        let bare = PartyId {
            value: "acme".into(),
            id_type: None,
        };
        assert_eq!(bare.identity(), "acme");
    }

    #[test]
    fn part_info_exposes_tracked_properties() {
        let part = PartInfo {
            href: Some("cid:payload-1".into()),
            properties: vec![
                Property {
                    name: MIME_TYPE_PROPERTY.into(),
                    value: "application/xml".into(),
                },
                Property {
                    name: COMPRESSION_TYPE_PROPERTY.into(),
                    value: GZIP_COMPRESSION.into(),
                },
            ],
        };
        assert!(part.has_href());
        assert_eq!(part.mime_type(), Some("application/xml"));
        assert_eq!(part.compression_type(), Some(GZIP_COMPRESSION));
    }
}
