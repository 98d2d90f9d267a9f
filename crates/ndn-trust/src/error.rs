//! Terminal validation failures.

use thiserror::Error;

use crate::name::Name;

/// Why a packet failed validation.
///
/// Every rejection the validator or a policy produces is one of these
/// reasons. The reason is final: once a validation run fails, no other
/// rule or fetch source is consulted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No configured rule covered the packet name.
    #[error("no rule matched packet {name}")]
    NoMatchingRule { name: Name },

    /// A certificate in the chain, or the packet itself, failed
    /// cryptographic verification.
    #[error("invalid signature on {name}")]
    InvalidSignature { name: Name },

    /// A certificate in the chain is outside its validity period.
    #[error("certificate {name} is outside its validity period")]
    ExpiredCertificate { name: Name },

    /// Following the issuer chain would exceed the validator's depth
    /// limit.
    #[error("certificate chain exceeds the depth limit of {limit}")]
    ExceededDepthLimit { limit: usize },

    /// A certificate names an already-visited certificate as its
    /// issuer.
    #[error("loop detected in the certificate chain at {name}")]
    LoopDetected { name: Name },

    /// The certificate was not produced by any source within the retry
    /// budget.
    #[error("cannot retrieve certificate {name}")]
    CannotRetrieveCertificate { name: Name },

    /// The packet carries no usable key locator name.
    #[error("malformed key locator: {reason}")]
    MalformedKeyLocator { reason: String },

    /// Fetched or loaded bytes do not form a usable certificate.
    #[error("malformed certificate: {reason}")]
    MalformedCertificate { reason: String },

    /// The packet violates the policy, or the policy itself is
    /// unusable for this packet.
    #[error("policy error: {reason}")]
    PolicyMisconfiguration { reason: String },
}
