//! Validation policies: the decision unit of the validator.
//!
//! `check_policy` answers one question about one packet: what happens
//! next? The answer is an explicit transition value: accept now,
//! reject now with a reason, or continue by retrieving the named
//! certificate. Policies form a closed set of variants dispatched by
//! match; wrapping policies (command freshness) hold their inner
//! policy by value, and recursion over certificate chains flows
//! through the shared [`ValidationState`], never back into the public
//! validator API.

mod command;
mod config;

pub use command::CommandOptions;
pub use command::FreshnessLedger;
pub use config::ConfigPolicy;

pub(crate) use config::{AnchorDirective, LoadedConfig};

use std::sync::Arc;

use tracing::warn;

use crate::certificate::{extract_identity_from_key_name, Certificate};
use crate::error::ValidationError;
use crate::name::Name;
use crate::packet::{Interest, Packet, SignatureInfo};
use crate::relation::NameRelation;
use crate::request::{CertificateRequest, ValidationState};

/// The identity-store seam: answers which certificate a key name
/// resolves to locally.
pub trait IdentityStore: Send + Sync {
    fn default_certificate(&self, key_name: &Name) -> Option<Certificate>;
}

/// What a policy decided about one packet.
#[derive(Debug)]
pub enum PolicyAction {
    /// Retrieve this certificate and validate it under the same state.
    Continue(CertificateRequest),
    /// Terminal success; no signature remains to check.
    Accept,
    /// Terminal failure.
    Reject(ValidationError),
}

/// The closed set of validation policies.
pub enum ValidationPolicy {
    /// Accepts everything, signatures included. For trust-disabled
    /// test contexts only.
    AcceptAll,

    /// Accepts a signer whose identity name is a strict prefix of the
    /// packet name.
    Hierarchical,

    /// Resolves the signer's key through a local identity store and
    /// anchors this one validation on the certificate found there.
    FromIdentityStore { store: Arc<dyn IdentityStore> },

    /// Replay protection for signed command interests: checks the
    /// timestamp and nonce components against a per-key ledger, then
    /// defers the signature question to the inner policy. Data packets
    /// pass straight through.
    CommandFreshness {
        inner: Box<ValidationPolicy>,
        ledger: FreshnessLedger,
    },

    /// The rule-driven policy configured from a TOML document.
    Config(ConfigPolicy),
}

impl ValidationPolicy {
    pub fn command_freshness(inner: ValidationPolicy, options: CommandOptions) -> Self {
        Self::CommandFreshness {
            inner: Box::new(inner),
            ledger: FreshnessLedger::new(options),
        }
    }

    pub(crate) fn check_policy(&self, packet: &Packet, state: &mut ValidationState) -> PolicyAction {
        match self {
            Self::AcceptAll => PolicyAction::Accept,
            Self::Hierarchical => hierarchical_check(packet),
            Self::FromIdentityStore { store } => identity_store_check(store.as_ref(), packet, state),
            Self::CommandFreshness { inner, ledger } => command::check(inner, ledger, packet, state),
            Self::Config(config) => config.check(packet),
        }
    }

    /// Commits a staged command-interest freshness record into every
    /// ledger along the policy chain. Called by the validator once the
    /// packet is accepted.
    pub(crate) fn commit_command(&self, key_name: &Name, timestamp_ms: u64, nonce: &[u8]) {
        if let Self::CommandFreshness { inner, ledger } = self {
            ledger.commit(key_name, timestamp_ms, nonce);
            inner.commit_command(key_name, timestamp_ms, nonce);
        }
    }

    /// The config policy inside this policy chain, if any.
    pub(crate) fn config_mut(&mut self) -> Option<&mut ConfigPolicy> {
        match self {
            Self::Config(config) => Some(config),
            Self::CommandFreshness { inner, .. } => inner.config_mut(),
            _ => None,
        }
    }

    /// Shifts the policy chain's view of now, for freshness tests.
    pub(crate) fn set_now_offset(&self, offset_ms: i64) {
        if let Self::CommandFreshness { inner, ledger } = self {
            ledger.set_now_offset(offset_ms);
            inner.set_now_offset(offset_ms);
        }
    }
}

/// The signature info of either packet kind. A signed Interest carries
/// its info in `name[-2]`; anything undecodable there is a malformed
/// key locator.
pub(crate) fn signature_info_of(packet: &Packet) -> Result<SignatureInfo, ValidationError> {
    match packet {
        Packet::Data(data) => Ok(data.signature_info.clone()),
        Packet::Interest(interest) => {
            if interest.name.len() < 2 {
                return Err(ValidationError::MalformedKeyLocator {
                    reason: format!("signed interest {} is too short", interest.name),
                });
            }
            interest
                .signature_info()
                .map_err(|error| ValidationError::MalformedKeyLocator {
                    reason: format!(
                        "cannot decode the signature info of {}: {error}",
                        interest.name
                    ),
                })
        }
    }
}

/// The name of the key expected to have signed `packet`.
pub(crate) fn key_locator_name(packet: &Packet) -> Result<Name, ValidationError> {
    signature_info_of(packet)?
        .key_locator
        .ok_or_else(|| ValidationError::MalformedKeyLocator {
            reason: format!("the signature on {} names no key", packet.name()),
        })
}

fn hierarchical_check(packet: &Packet) -> PolicyAction {
    let key_locator = match key_locator_name(packet) {
        Ok(name) => name,
        Err(error) => return PolicyAction::Reject(error),
    };
    let identity = match extract_identity_from_key_name(&key_locator) {
        Ok(name) => name,
        Err(error) => return PolicyAction::Reject(error),
    };
    if NameRelation::IsStrictPrefixOf.check(&identity, packet.name()) {
        PolicyAction::Continue(CertificateRequest::new(Interest::new(key_locator)))
    } else {
        warn!(
            name = %packet.name(),
            %identity,
            "signer does not fit the name hierarchy"
        );
        PolicyAction::Reject(ValidationError::InvalidSignature {
            name: packet.name().clone(),
        })
    }
}

fn identity_store_check(
    store: &dyn IdentityStore,
    packet: &Packet,
    state: &mut ValidationState,
) -> PolicyAction {
    let key_locator = match key_locator_name(packet) {
        Ok(name) => name,
        Err(error) => return PolicyAction::Reject(error),
    };
    let Some(certificate) = store.default_certificate(&key_locator) else {
        warn!(key = %key_locator, "identity store has no certificate for key");
        return PolicyAction::Reject(ValidationError::CannotRetrieveCertificate {
            name: key_locator,
        });
    };
    let request = CertificateRequest::new(Interest::new(certificate.name().clone()));
    state.set_temporary_anchor(certificate);
    PolicyAction::Continue(request)
}
