#![forbid(unsafe_code)]

//! Per-request message state.
//!
//! A `MessageState` is created when header processing starts and dropped at
//! the end of the HTTP exchange. It is owned by exactly one request; nothing
//! here is shared across requests.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use crate::ebms::Messaging;
use crate::pmode::leg::LegNumber;
use crate::pmode::PMode;
use crate::soap::Attachment;

/// Per-attachment compression mode as declared by its PartInfo properties.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompressionMode {
    #[default]
    None,
    Gzip,
}

/// Certificate observed while verifying the message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Certificate {
    pub subject: String,
    pub der: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct MessageState {
    pub messaging: Option<Messaging>,
    pub pmode: Option<Arc<PMode>>,
    pub leg: Option<LegNumber>,
    pub mpc: Option<String>,
    pub attachments: Vec<Attachment>,
    pub decrypted_attachments: Vec<Attachment>,
    /// Compression mode per attachment content id.
    pub compression: BTreeMap<String, CompressionMode>,
    pub initiator_id: Option<String>,
    pub responder_id: Option<String>,
    pub soap_body_payload_present: bool,
    pub soap_signature_checked: bool,
    pub soap_decrypted: bool,
    pub certificates: Vec<Certificate>,
    /// Set when duplicate detection recognized this message id.
    pub duplicate: bool,
    temp: Option<TempScope>,
}

impl MessageState {
    pub fn new(attachments: Vec<Attachment>) -> Self {
        Self {
            attachments,
            ..Self::default()
        }
    }

    pub fn message_id(&self) -> Option<&str> {
        let messaging = self.messaging.as_ref()?;
        messaging
            .user_message()
            .map(|user| user.message_info.message_id.as_str())
            .or_else(|| {
                messaging
                    .signal_message()
                    .map(|signal| signal.message_info.message_id.as_str())
            })
    }

    pub fn record_certificate(&mut self, certificate: Certificate) {
        if !self.certificates.contains(&certificate) {
            self.certificates.push(certificate);
        }
    }

    /// Lazily acquires the request-scoped scratch directory.
    pub fn temp_scope(&mut self) -> std::io::Result<&TempScope> {
        if self.temp.is_none() {
            self.temp = Some(TempScope::new()?);
        }
        Ok(self.temp.as_ref().expect("scope just created"))
    }
}

/// Request-scoped scratch storage for decrypted attachment content.
///
/// Files live inside one temporary directory that is deleted when the state
/// (and with it this scope) drops, on success and failure paths alike.
#[derive(Debug)]
pub struct TempScope {
    dir: TempDir,
}

impl TempScope {
    fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::Builder::new().prefix("msh-attachment-").tempdir()?,
        })
    }

    /// Copies `data` into the scope so downstream consumers can re-read it.
    pub fn store(&self, content_id: &str, data: &[u8]) -> std::io::Result<PathBuf> {
        let file_name: String = content_id
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
            .collect();
        let path = self.dir.path().join(file_name);
        let mut file = std::fs::File::create(&path)?;
        file.write_all(data)?;
        Ok(path)
    }

    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_scope_is_released_on_drop() {
        let mut state = MessageState::new(Vec::new());
        let path = {
            let scope = state.temp_scope().expect("scope");
            scope.store("payload-1@msh", b"decrypted").expect("stored")
        };
        assert_eq!(std::fs::read(&path).expect("readable"), b"decrypted");

        let dir = path.parent().expect("dir").to_path_buf();
        drop(state);
        assert!(!dir.exists(), "scope directory should be deleted");
    }

    #[test]
    fn duplicate_certificates_collapse() {
        let mut state = MessageState::new(Vec::new());
        let cert = Certificate {
            subject: "CN=peer".into(),
            der: vec![1, 2, 3],
        };
        state.record_certificate(cert.clone());
        state.record_certificate(cert);
        assert_eq!(state.certificates.len(), 1);
    }
}
