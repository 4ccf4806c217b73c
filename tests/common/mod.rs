#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

use msh::config::MshConfig;
use msh::engine::{MshEngine, MshEngineBuilder};
use msh::pmode::store::{InMemoryKeyValueStore, MpcStore, PModeStore};
use msh::pmode::{
    BusinessInfo, DigestAlgorithm, ErrorHandling, LegProtocol, Mep, MepBinding, PMode, PModeLeg,
    PModeMetadata, PModeParty, ReceptionAwareness, SecurityPolicy, SignatureAlgorithm, TriState,
    WssVersion,
};
use msh::security::{
    Credentials, SecurityEngine, SecurityFailure, SecurityOutcome,
};
use msh::soap::{Attachment, QName, SoapEnvelope, SoapVersion};

pub const SERVICE: &str = "urn:invoicing";
pub const ACTION: &str = "submit";
pub const SENDER: &str = "org:sender";
pub const RECEIVER: &str = "org:receiver";

pub fn leg(service: &str, action: &str) -> PModeLeg {
    PModeLeg {
        protocol: LegProtocol {
            address: Some("https://receiver.example.org/msh".to_string()),
            soap_version: SoapVersion::Soap12,
        },
        business_info: BusinessInfo {
            service: Some(service.to_string()),
            action: Some(action.to_string()),
            mpc: None,
        },
        error_handling: ErrorHandling::default(),
        reliability: None,
        security: None,
    }
}

pub fn pmode(id: &str) -> PMode {
    PMode {
        id: id.to_string(),
        initiator: Some(PModeParty::new(SENDER, "Initiator")),
        responder: Some(PModeParty::new(RECEIVER, "Responder")),
        agreement: None,
        mep: Mep::OneWay,
        binding: MepBinding::Push,
        leg1: Some(leg(SERVICE, ACTION)),
        leg2: None,
        payload_service: None,
        reception_awareness: None,
        metadata: PModeMetadata::default(),
    }
}

pub fn pmode_with_security(id: &str) -> PMode {
    let mut pmode = pmode(id);
    if let Some(leg) = pmode.leg1.as_mut() {
        leg.security = Some(SecurityPolicy {
            wss_version: WssVersion::Wss11,
            signature_algorithm: SignatureAlgorithm::RsaSha256,
            signature_digest: DigestAlgorithm::Sha256,
            encryption_algorithm: None,
            min_key_strength: Some(2048),
            pmode_authorize: false,
            send_receipt: true,
            reply_pattern: None,
            non_repudiation: false,
        });
    }
    pmode
}

pub fn pmode_with_duplicate_detection(id: &str) -> PMode {
    let mut pmode = pmode(id);
    pmode.reception_awareness = Some(ReceptionAwareness {
        enabled: TriState::Required,
        retry: TriState::Required,
        retry_count: 3,
        retry_interval_ms: 5000,
        duplicate_detection: TriState::Required,
    });
    pmode
}

/// Messaging header content for a one-user-message envelope.
pub fn user_message_content(message_id: &str, payload_info: Option<JsonValue>) -> JsonValue {
    let mut user = json!({
        "message_info": { "message_id": message_id },
        "party_info": {
            "from": { "party_ids": [{ "value": SENDER }], "role": "Initiator" },
            "to": { "party_ids": [{ "value": RECEIVER }], "role": "Responder" }
        },
        "collaboration_info": {
            "service": { "value": SERVICE },
            "action": ACTION,
            "conversation_id": "conv-1"
        }
    });
    if let Some(payload_info) = payload_info {
        user["payload_info"] = payload_info;
    }
    json!({ "user_messages": [user] })
}

pub fn envelope_with_messaging(content: JsonValue, body: JsonValue) -> SoapEnvelope {
    SoapEnvelope::new(SoapVersion::Soap12)
        .with_header(QName::messaging(), content)
        .with_body(body)
}

/// Security engine stub returning a canned result.
pub struct MockSecurityEngine {
    result: Result<SecurityOutcome, SecurityFailure>,
}

impl MockSecurityEngine {
    pub fn accepting() -> Self {
        Self {
            result: Ok(SecurityOutcome::default()),
        }
    }

    pub fn accepting_with(outcome: SecurityOutcome) -> Self {
        Self {
            result: Ok(outcome),
        }
    }

    pub fn rejecting(failure: SecurityFailure) -> Self {
        Self {
            result: Err(failure),
        }
    }
}

#[async_trait]
impl SecurityEngine for MockSecurityEngine {
    async fn verify_and_decrypt(
        &self,
        _envelope: &SoapEnvelope,
        _attachments: &[Attachment],
        _credentials: &Credentials,
    ) -> Result<SecurityOutcome, SecurityFailure> {
        self.result.clone()
    }
}

pub async fn engine_with_pmodes(
    pmodes: Vec<PMode>,
    security: MockSecurityEngine,
) -> MshEngine {
    let store = Arc::new(PModeStore::new(
        Arc::new(InMemoryKeyValueStore::new()),
        false,
    ));
    for pmode in pmodes {
        store.create(pmode).await.expect("test pmode is valid");
    }

    MshEngineBuilder::new(
        MshConfig::default(),
        store,
        Arc::new(MpcStore::new()),
        Arc::new(security),
    )
    .build()
    .expect("engine builds")
}
