#![forbid(unsafe_code)]

//! Envelope surface at the marshalling boundary.
//!
//! The transport and XML marshaller live outside this crate; they hand the
//! engine an already-parsed envelope whose header blocks and body are neutral
//! `serde_json::Value` trees. Everything downstream decodes typed models from
//! those trees and never touches raw XML.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// ebMS3 core namespace owning the `Messaging` header block.
pub const EBMS_NS: &str = "http://docs.oasis-open.org/ebxml-msg/ebms/v3.0/ns/core/200704/";

/// WS-Security extension namespace owning the `Security` header block.
pub const WSSE_NS: &str =
    "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";

const SOAP11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const SOAP12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoapVersion {
    Soap11,
    Soap12,
}

impl SoapVersion {
    pub fn namespace(self) -> &'static str {
        match self {
            SoapVersion::Soap11 => SOAP11_NS,
            SoapVersion::Soap12 => SOAP12_NS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SoapVersion::Soap11 => "1.1",
            SoapVersion::Soap12 => "1.2",
        }
    }
}

/// Qualified name of a SOAP header block.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QName {
    pub namespace: String,
    pub local: String,
}

impl QName {
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }

    pub fn messaging() -> Self {
        Self::new(EBMS_NS, "Messaging")
    }

    pub fn security() -> Self {
        Self::new(WSSE_NS, "Security")
    }
}

impl std::fmt::Display for QName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}{}", self.namespace, self.local)
    }
}

/// One header block as delivered by the marshaller.
#[derive(Clone, Debug, PartialEq)]
pub struct HeaderBlock {
    pub name: QName,
    pub content: JsonValue,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SoapEnvelope {
    pub version: SoapVersion,
    pub headers: Vec<HeaderBlock>,
    pub body: JsonValue,
}

impl SoapEnvelope {
    pub fn new(version: SoapVersion) -> Self {
        Self {
            version,
            headers: Vec::new(),
            body: JsonValue::Null,
        }
    }

    pub fn with_header(mut self, name: QName, content: JsonValue) -> Self {
        self.headers.push(HeaderBlock { name, content });
        self
    }

    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.body = body;
        self
    }

    pub fn header(&self, name: &QName) -> Option<&HeaderBlock> {
        self.headers.iter().find(|block| &block.name == name)
    }

    /// Whether the SOAP Body element carries any content at all.
    pub fn body_has_content(&self) -> bool {
        match &self.body {
            JsonValue::Null => false,
            JsonValue::String(text) => !text.trim().is_empty(),
            JsonValue::Array(items) => !items.is_empty(),
            JsonValue::Object(map) => !map.is_empty(),
            JsonValue::Bool(_) | JsonValue::Number(_) => true,
        }
    }
}

/// MIME part attached to the envelope, identified by its Content-ID.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub content_id: String,
    pub mime_type: Option<String>,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(content_id: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            content_id: content_id.into(),
            mime_type: None,
            data,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Matches this attachment against a PartInfo `href` (`cid:` prefixed).
    pub fn matches_href(&self, href: &str) -> bool {
        href.strip_prefix("cid:").unwrap_or(href) == self.content_id
    }
}
