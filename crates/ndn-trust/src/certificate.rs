//! Certificates: signed Data packets carrying a public key.
//!
//! A certificate name follows the convention
//!
//! ```text
//! /<IdentityName>/KEY/<KeyId>/<IssuerId>/<Version>
//! ```
//!
//! so the last four components locate the key and its issuer, and
//! everything before them names the identity. The key name is the
//! prefix ending at `<KeyId>`.

use ed25519_dalek::VerifyingKey;

use crate::error::ValidationError;
use crate::name::{Component, Name};
use crate::packet::{Data, ValidityPeriod};

/// Certificate names have at least identity, `KEY`, key id, issuer id.
pub const MIN_CERT_NAME_LENGTH: usize = 4;

/// Key names have at least `KEY` and a key id after the identity.
pub const MIN_KEY_NAME_LENGTH: usize = 2;

const KEY_COMPONENT: &[u8] = b"KEY";

/// A Data packet whose name follows the certificate convention and
/// whose content is an Ed25519 public key.
///
/// Construction checks the shape, not the signature: whether the
/// certificate is trustworthy is the validator's question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    data: Data,
    public_key: VerifyingKey,
}

impl Certificate {
    pub fn from_data(data: Data) -> Result<Self, ValidationError> {
        if !Self::is_valid_name(&data.name) {
            return Err(ValidationError::MalformedCertificate {
                reason: format!(
                    "{} does not follow the certificate naming convention",
                    data.name
                ),
            });
        }
        let key_bytes: &[u8; 32] =
            data.content
                .as_slice()
                .try_into()
                .map_err(|_| ValidationError::MalformedCertificate {
                    reason: format!("{} does not carry a 32 byte Ed25519 public key", data.name),
                })?;
        let public_key = VerifyingKey::from_bytes(key_bytes).map_err(|_| {
            ValidationError::MalformedCertificate {
                reason: format!("{} carries an invalid public key point", data.name),
            }
        })?;
        Ok(Self { data, public_key })
    }

    /// Does `name` follow `/<IdentityName>/KEY/<KeyId>/<IssuerId>/<Version>`?
    pub fn is_valid_name(name: &Name) -> bool {
        name.len() >= MIN_CERT_NAME_LENGTH
            && name[name.len() - MIN_CERT_NAME_LENGTH].as_bytes() == KEY_COMPONENT
    }

    /// Does `name` follow `/<IdentityName>/KEY/<KeyId>`?
    pub fn is_valid_key_name(name: &Name) -> bool {
        name.len() > MIN_KEY_NAME_LENGTH
            && name[name.len() - MIN_KEY_NAME_LENGTH].as_bytes() == KEY_COMPONENT
    }

    pub fn name(&self) -> &Name {
        &self.data.name
    }

    pub fn data(&self) -> &Data {
        &self.data
    }

    pub fn public_key(&self) -> &VerifyingKey {
        &self.public_key
    }

    /// The certificate name without issuer id and version.
    pub fn key_name(&self) -> Name {
        self.data.name.prefix(self.data.name.len() - 2)
    }

    /// The name before the `KEY` component.
    pub fn identity(&self) -> Name {
        self.data.name.prefix(self.data.name.len() - MIN_CERT_NAME_LENGTH)
    }

    pub fn key_id(&self) -> &Component {
        &self.data.name[self.data.name.len() - 3]
    }

    pub fn issuer_id(&self) -> &Component {
        &self.data.name[self.data.name.len() - 2]
    }

    pub fn validity_period(&self) -> Option<&ValidityPeriod> {
        self.data.signature_info.validity_period.as_ref()
    }

    /// Is the certificate within its validity period at `now_ms`?
    /// A certificate without a validity period is never valid.
    pub fn is_valid_at(&self, now_ms: u64) -> bool {
        self.validity_period()
            .is_some_and(|period| period.contains(now_ms))
    }
}

impl TryFrom<Data> for Certificate {
    type Error = ValidationError;

    fn try_from(data: Data) -> Result<Self, Self::Error> {
        Self::from_data(data)
    }
}

/// The identity owning `key_name`, which must follow the key naming
/// convention.
pub fn extract_identity_from_key_name(key_name: &Name) -> Result<Name, ValidationError> {
    if !Certificate::is_valid_key_name(key_name) {
        return Err(ValidationError::MalformedKeyLocator {
            reason: format!("{key_name} does not follow the key naming convention"),
        });
    }
    Ok(key_name.prefix(key_name.len() - MIN_KEY_NAME_LENGTH))
}
