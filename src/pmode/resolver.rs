#![forbid(unsafe_code)]

//! PMode resolution contract and the store-backed default implementation.

use async_trait::async_trait;
use std::sync::Arc;

use super::store::PModeStore;
use super::PMode;

/// Everything the resolver may consult for one inbound message.
#[derive(Clone, Debug, Default)]
pub struct ResolutionRequest {
    /// PMode identifier carried in the AgreementRef, when present.
    pub pmode_id: Option<String>,
    pub service: String,
    pub action: String,
    pub initiator_id: Option<String>,
    pub responder_id: Option<String>,
    pub default_responder_address: Option<String>,
}

#[async_trait]
pub trait PModeResolver: Send + Sync {
    async fn resolve(&self, request: &ResolutionRequest) -> Option<Arc<PMode>>;
}

/// Resolves against the shared PMode store.
///
/// An explicit PMode identifier wins outright. Otherwise candidates are
/// looked up by (service, action) and narrowed by party identities; a
/// remaining tie is broken by the leg 1 endpoint matching the configured
/// default responder address.
pub struct StorePModeResolver {
    store: Arc<PModeStore>,
}

impl StorePModeResolver {
    pub fn new(store: Arc<PModeStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PModeResolver for StorePModeResolver {
    async fn resolve(&self, request: &ResolutionRequest) -> Option<Arc<PMode>> {
        if let Some(pmode_id) = request.pmode_id.as_deref() {
            let found = self.store.get_by_id(pmode_id).await;
            if found.is_none() {
                tracing::warn!(
                    target: "msh::pmode",
                    event = "pmode_id_unknown",
                    pmode = pmode_id
                );
            }
            return found;
        }

        let candidates = self
            .store
            .find_by_service_and_action(&request.service, &request.action)
            .await;

        let party_matches: Vec<_> = candidates
            .iter()
            .filter(|pmode| parties_match(pmode, request))
            .cloned()
            .collect();

        let pool = if party_matches.is_empty() {
            candidates
        } else {
            party_matches
        };

        if pool.len() > 1 {
            if let Some(address) = request.default_responder_address.as_deref() {
                if let Some(preferred) = pool.iter().find(|pmode| {
                    pmode
                        .leg1
                        .as_ref()
                        .and_then(|leg| leg.protocol.address.as_deref())
                        == Some(address)
                }) {
                    return Some(Arc::clone(preferred));
                }
            }
            tracing::warn!(
                target: "msh::pmode",
                event = "pmode_resolution_ambiguous",
                service = %request.service,
                action = %request.action,
                candidates = pool.len()
            );
        }

        pool.into_iter().next()
    }
}

fn parties_match(pmode: &PMode, request: &ResolutionRequest) -> bool {
    let initiator_ok = match (&pmode.initiator_identity(), &request.initiator_id) {
        (Some(configured), Some(observed)) => configured == observed,
        // A side the PMode leaves open matches any peer.
        (None, _) => true,
        (Some(_), None) => false,
    };
    let responder_ok = match (&pmode.responder_identity(), &request.responder_id) {
        (Some(configured), Some(observed)) => configured == observed,
        (None, _) => true,
        (Some(_), None) => false,
    };
    initiator_ok && responder_ok
}
