#![forbid(unsafe_code)]

//! Canonical ebMS3/AS4 error vocabulary.
//!
//! Codes, severities and categories are a bit-exact contract with
//! interoperating AS4 peers (OASIS ebMS 3.0 Core section 6.7.1 plus the AS4
//! profile additions). They must never be renamed or renumbered.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Failure,
    Warning,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Failure => "failure",
            Severity::Warning => "warning",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Category {
    Content,
    Communication,
    Unpackaging,
    Processing,
    Other,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Content => "Content",
            Category::Communication => "Communication",
            Category::Unpackaging => "UnPackaging",
            Category::Processing => "Processing",
            Category::Other => "Other",
        }
    }
}

/// Catalogue entry keyed by its wire code.
///
/// Variants are named after the code rather than the short description
/// because the OASIS table reuses `FeatureNotSupported` for both EBMS:0002
/// and EBMS:0008.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum EbmsErrorCode {
    Ebms0001,
    Ebms0002,
    Ebms0003,
    Ebms0004,
    Ebms0005,
    Ebms0006,
    Ebms0007,
    Ebms0008,
    Ebms0009,
    Ebms0010,
    Ebms0011,
    Ebms0101,
    Ebms0102,
    Ebms0103,
    Ebms0201,
    Ebms0202,
    Ebms0301,
    Ebms0302,
    Ebms0303,
}

pub const VALUE_NOT_RECOGNIZED: EbmsErrorCode = EbmsErrorCode::Ebms0001;
pub const FEATURE_NOT_SUPPORTED: EbmsErrorCode = EbmsErrorCode::Ebms0002;
pub const VALUE_INCONSISTENT: EbmsErrorCode = EbmsErrorCode::Ebms0003;
pub const OTHER: EbmsErrorCode = EbmsErrorCode::Ebms0004;
pub const CONNECTION_FAILURE: EbmsErrorCode = EbmsErrorCode::Ebms0005;
pub const EMPTY_MESSAGE_PARTITION_CHANNEL: EbmsErrorCode = EbmsErrorCode::Ebms0006;
pub const MIME_INCONSISTENCY: EbmsErrorCode = EbmsErrorCode::Ebms0007;
pub const INVALID_HEADER: EbmsErrorCode = EbmsErrorCode::Ebms0009;
pub const PROCESSING_MODE_MISMATCH: EbmsErrorCode = EbmsErrorCode::Ebms0010;
pub const EXTERNAL_PAYLOAD_ERROR: EbmsErrorCode = EbmsErrorCode::Ebms0011;
pub const FAILED_AUTHENTICATION: EbmsErrorCode = EbmsErrorCode::Ebms0101;
pub const FAILED_DECRYPTION: EbmsErrorCode = EbmsErrorCode::Ebms0102;
pub const POLICY_NONCOMPLIANCE: EbmsErrorCode = EbmsErrorCode::Ebms0103;
pub const DYSFUNCTIONAL_RELIABILITY: EbmsErrorCode = EbmsErrorCode::Ebms0201;
pub const DELIVERY_FAILURE: EbmsErrorCode = EbmsErrorCode::Ebms0202;
pub const MISSING_RECEIPT: EbmsErrorCode = EbmsErrorCode::Ebms0301;
pub const INVALID_RECEIPT: EbmsErrorCode = EbmsErrorCode::Ebms0302;
pub const DECOMPRESSION_FAILURE: EbmsErrorCode = EbmsErrorCode::Ebms0303;

impl EbmsErrorCode {
    pub fn code(self) -> &'static str {
        match self {
            EbmsErrorCode::Ebms0001 => "EBMS:0001",
            EbmsErrorCode::Ebms0002 => "EBMS:0002",
            EbmsErrorCode::Ebms0003 => "EBMS:0003",
            EbmsErrorCode::Ebms0004 => "EBMS:0004",
            EbmsErrorCode::Ebms0005 => "EBMS:0005",
            EbmsErrorCode::Ebms0006 => "EBMS:0006",
            EbmsErrorCode::Ebms0007 => "EBMS:0007",
            EbmsErrorCode::Ebms0008 => "EBMS:0008",
            EbmsErrorCode::Ebms0009 => "EBMS:0009",
            EbmsErrorCode::Ebms0010 => "EBMS:0010",
            EbmsErrorCode::Ebms0011 => "EBMS:0011",
            EbmsErrorCode::Ebms0101 => "EBMS:0101",
            EbmsErrorCode::Ebms0102 => "EBMS:0102",
            EbmsErrorCode::Ebms0103 => "EBMS:0103",
            EbmsErrorCode::Ebms0201 => "EBMS:0201",
            EbmsErrorCode::Ebms0202 => "EBMS:0202",
            EbmsErrorCode::Ebms0301 => "EBMS:0301",
            EbmsErrorCode::Ebms0302 => "EBMS:0302",
            EbmsErrorCode::Ebms0303 => "EBMS:0303",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            EbmsErrorCode::Ebms0002 | EbmsErrorCode::Ebms0006 => Severity::Warning,
            _ => Severity::Failure,
        }
    }

    pub fn category(self) -> Category {
        match self {
            EbmsErrorCode::Ebms0001
            | EbmsErrorCode::Ebms0002
            | EbmsErrorCode::Ebms0003
            | EbmsErrorCode::Ebms0004
            | EbmsErrorCode::Ebms0011 => Category::Content,
            EbmsErrorCode::Ebms0005
            | EbmsErrorCode::Ebms0006
            | EbmsErrorCode::Ebms0202
            | EbmsErrorCode::Ebms0301
            | EbmsErrorCode::Ebms0302 => Category::Communication,
            EbmsErrorCode::Ebms0007 | EbmsErrorCode::Ebms0008 | EbmsErrorCode::Ebms0009 => {
                Category::Unpackaging
            }
            EbmsErrorCode::Ebms0010
            | EbmsErrorCode::Ebms0101
            | EbmsErrorCode::Ebms0102
            | EbmsErrorCode::Ebms0103
            | EbmsErrorCode::Ebms0201
            | EbmsErrorCode::Ebms0303 => Category::Processing,
        }
    }

    pub fn short_description(self) -> &'static str {
        match self {
            EbmsErrorCode::Ebms0001 => "ValueNotRecognized",
            EbmsErrorCode::Ebms0002 => "FeatureNotSupported",
            EbmsErrorCode::Ebms0003 => "ValueInconsistent",
            EbmsErrorCode::Ebms0004 => "Other",
            EbmsErrorCode::Ebms0005 => "ConnectionFailure",
            EbmsErrorCode::Ebms0006 => "EmptyMessagePartitionChannel",
            EbmsErrorCode::Ebms0007 => "MimeInconsistency",
            EbmsErrorCode::Ebms0008 => "FeatureNotSupported",
            EbmsErrorCode::Ebms0009 => "InvalidHeader",
            EbmsErrorCode::Ebms0010 => "ProcessingModeMismatch",
            EbmsErrorCode::Ebms0011 => "ExternalPayloadError",
            EbmsErrorCode::Ebms0101 => "FailedAuthentication",
            EbmsErrorCode::Ebms0102 => "FailedDecryption",
            EbmsErrorCode::Ebms0103 => "PolicyNoncompliance",
            EbmsErrorCode::Ebms0201 => "DysfunctionalReliability",
            EbmsErrorCode::Ebms0202 => "DeliveryFailure",
            EbmsErrorCode::Ebms0301 => "MissingReceipt",
            EbmsErrorCode::Ebms0302 => "InvalidReceipt",
            EbmsErrorCode::Ebms0303 => "DecompressionFailure",
        }
    }

    pub fn long_description(self) -> &'static str {
        match self {
            EbmsErrorCode::Ebms0001 => {
                "Although the message document is well formed and schema valid, \
                 some element or attribute value cannot be recognized"
            }
            EbmsErrorCode::Ebms0002 => {
                "Although the message document is well formed and schema valid, \
                 some element or attribute value relates to an unsupported feature"
            }
            EbmsErrorCode::Ebms0003 => {
                "Although the message document is well formed and schema valid, \
                 some element or attribute value is inconsistent either with other \
                 content or with the processing mode"
            }
            EbmsErrorCode::Ebms0004 => "An undefined content-level error occurred",
            EbmsErrorCode::Ebms0005 => {
                "The MSH is experiencing temporary or permanent connection failure"
            }
            EbmsErrorCode::Ebms0006 => {
                "There is no message available for pulling from the requested MPC"
            }
            EbmsErrorCode::Ebms0007 => {
                "The MIME packaging does not comply with the packaging rules"
            }
            EbmsErrorCode::Ebms0008 => {
                "The message packaging relies on a feature this MSH does not support"
            }
            EbmsErrorCode::Ebms0009 => {
                "The ebMS header is either not compliant with the schema or \
                 contains a value inconsistent with the ebMS module"
            }
            EbmsErrorCode::Ebms0010 => {
                "The ebMS header or another received material is not consistent \
                 with the processing mode governing this message"
            }
            EbmsErrorCode::Ebms0011 => {
                "An external payload reference cannot be resolved, or the set of \
                 attached payloads does not match the declared payload parts"
            }
            EbmsErrorCode::Ebms0101 => {
                "The signature in the security header is invalid, or the declared \
                 security material does not match the agreed security policy"
            }
            EbmsErrorCode::Ebms0102 => {
                "The encrypted data in the message could not be decrypted"
            }
            EbmsErrorCode::Ebms0103 => {
                "The security element of the message does not comply with the \
                 agreed security policy"
            }
            EbmsErrorCode::Ebms0201 => {
                "A reliability function as implemented by the reliability module \
                 is not operational"
            }
            EbmsErrorCode::Ebms0202 => {
                "The message could not be delivered to its destination despite \
                 reliability guarantees"
            }
            EbmsErrorCode::Ebms0301 => {
                "An expected receipt for a previously sent message has not arrived"
            }
            EbmsErrorCode::Ebms0302 => {
                "A receipt was received but is not consistent with the message it \
                 acknowledges"
            }
            EbmsErrorCode::Ebms0303 => {
                "A compressed payload part could not be decompressed"
            }
        }
    }
}

/// Per-occurrence error carried through the pipeline and reported to peers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Ebms3Error {
    pub code: EbmsErrorCode,
    pub severity: Severity,
    pub ref_to_message_in_error: Option<String>,
    pub detail: Option<String>,
    pub origin: Option<String>,
}

impl Ebms3Error {
    pub fn new(code: EbmsErrorCode) -> Self {
        Self {
            code,
            severity: code.severity(),
            ref_to_message_in_error: None,
            detail: None,
            origin: None,
        }
    }

    pub fn ref_to(mut self, message_id: impl Into<String>) -> Self {
        let message_id = message_id.into();
        if !message_id.is_empty() {
            self.ref_to_message_in_error = Some(message_id);
        }
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn is_failure(&self) -> bool {
        self.severity == Severity::Failure
    }
}

impl std::fmt::Display for Ebms3Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} ({})",
            self.code.code(),
            self.code.short_description(),
            self.severity.as_str()
        )?;
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

/// Accumulating error list passed through the pipeline.
///
/// A stage that adds at least one failure-severity entry aborts the
/// pipeline; warnings accumulate without stopping processing.
#[derive(Debug, Default)]
pub struct ErrorSink {
    errors: Vec<Ebms3Error>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: Ebms3Error) {
        self.errors.push(error);
    }

    pub fn has_failure(&self) -> bool {
        self.errors.iter().any(Ebms3Error::is_failure)
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[Ebms3Error] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<Ebms3Error> {
        self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_render_the_wire_contract() {
        assert_eq!(VALUE_NOT_RECOGNIZED.code(), "EBMS:0001");
        assert_eq!(VALUE_INCONSISTENT.code(), "EBMS:0003");
        assert_eq!(EXTERNAL_PAYLOAD_ERROR.code(), "EBMS:0011");
        assert_eq!(FAILED_DECRYPTION.code(), "EBMS:0102");
        assert_eq!(INVALID_RECEIPT.code(), "EBMS:0302");
    }

    #[test]
    fn only_the_two_warning_codes_are_warnings() {
        for code in [
            FEATURE_NOT_SUPPORTED,
            EMPTY_MESSAGE_PARTITION_CHANNEL,
        ] {
            assert_eq!(code.severity(), Severity::Warning);
        }
        assert_eq!(PROCESSING_MODE_MISMATCH.severity(), Severity::Failure);
        assert_eq!(INVALID_HEADER.severity(), Severity::Failure);
    }

    #[test]
    fn sink_aborts_on_failure_only() {
        let mut sink = ErrorSink::new();
        sink.push(Ebms3Error::new(FEATURE_NOT_SUPPORTED).detail("soft check"));
        assert!(!sink.has_failure());

        sink.push(Ebms3Error::new(VALUE_INCONSISTENT).ref_to("msg-1"));
        assert!(sink.has_failure());
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn builder_drops_empty_ref() {
        let error = Ebms3Error::new(INVALID_RECEIPT).ref_to("");
        assert_eq!(error.ref_to_message_in_error, None);
    }
}
