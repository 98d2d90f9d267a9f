//! Data and Interest packets and their signature metadata.
//!
//! The wire form used for certificates and embedded signature blocks is
//! a deterministic length-prefixed encoding. Determinism matters: the
//! byte range a signature covers is re-derived by encoding the packet
//! fields again, so encode-decode-encode must be the identity.
//!
//! A signed Interest carries its signature inside the name, as the two
//! trailing components: the encoded [`SignatureInfo`] followed by the
//! raw signature value. The signature covers the encoding of the name
//! without that final component.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::clock::unix_millis;
use crate::name::{Component, Name};

/// Errors raised while decoding wire bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// The input ended before the structure did.
    #[error("unexpected end of input")]
    UnexpectedEnd,

    /// The signature type tag is not one this crate produces.
    #[error("unknown signature type tag {tag}")]
    UnknownSignatureType { tag: u8 },

    /// An optional-field flag byte was neither 0 nor 1.
    #[error("unknown flag byte {value}")]
    BadFlag { value: u8 },

    /// The structure decoded but bytes were left over.
    #[error("{count} trailing bytes after the encoded value")]
    TrailingBytes { count: usize },
}

/// The algorithm a packet's signature commits to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureType {
    /// Ed25519 over the signed portion. Requires a key locator naming
    /// the signing key.
    Ed25519,
    /// A bare SHA-256 digest of the signed portion. Binds no key and
    /// carries no key locator.
    DigestSha256,
}

impl SignatureType {
    const fn tag(self) -> u8 {
        match self {
            Self::DigestSha256 => 0,
            Self::Ed25519 => 1,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, WireError> {
        match tag {
            0 => Ok(Self::DigestSha256),
            1 => Ok(Self::Ed25519),
            _ => Err(WireError::UnknownSignatureType { tag }),
        }
    }
}

/// The absolute interval, in milliseconds since the Unix epoch, in
/// which a certificate may be used. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidityPeriod {
    not_before_ms: u64,
    not_after_ms: u64,
}

impl ValidityPeriod {
    pub fn new(not_before_ms: u64, not_after_ms: u64) -> Self {
        Self {
            not_before_ms,
            not_after_ms,
        }
    }

    pub fn from_system_times(
        not_before: std::time::SystemTime,
        not_after: std::time::SystemTime,
    ) -> Self {
        Self::new(unix_millis(not_before), unix_millis(not_after))
    }

    pub fn not_before_ms(&self) -> u64 {
        self.not_before_ms
    }

    pub fn not_after_ms(&self) -> u64 {
        self.not_after_ms
    }

    pub fn contains(&self, at_ms: u64) -> bool {
        self.not_before_ms <= at_ms && at_ms <= self.not_after_ms
    }
}

/// Signature metadata carried alongside a signature value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    pub signature_type: SignatureType,
    /// The name of the key (or certificate) that produced the
    /// signature. Absent for digest signatures.
    pub key_locator: Option<Name>,
    /// Present on certificates; bounds when the enclosed key is
    /// trustworthy.
    pub validity_period: Option<ValidityPeriod>,
}

impl SignatureInfo {
    pub fn ed25519(key_locator: Name) -> Self {
        Self {
            signature_type: SignatureType::Ed25519,
            key_locator: Some(key_locator),
            validity_period: None,
        }
    }

    pub fn digest_sha256() -> Self {
        Self {
            signature_type: SignatureType::DigestSha256,
            key_locator: None,
            validity_period: None,
        }
    }

    #[must_use]
    pub fn with_validity_period(mut self, period: ValidityPeriod) -> Self {
        self.validity_period = Some(period);
        self
    }

    /// Encodes the block:
    ///
    /// ```text
    /// signature_type_tag (1 byte)
    /// key_locator_flag (1 byte) [+ encoded name]
    /// validity_flag (1 byte) [+ not_before_ms + not_after_ms (8 bytes LE each)]
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write(&mut out);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut reader = Reader::new(bytes);
        let info = Self::read(&mut reader)?;
        reader.finish()?;
        Ok(info)
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.push(self.signature_type.tag());
        match &self.key_locator {
            Some(name) => {
                out.push(1);
                put_name(out, name);
            }
            None => out.push(0),
        }
        match &self.validity_period {
            Some(period) => {
                out.push(1);
                out.extend_from_slice(&period.not_before_ms.to_le_bytes());
                out.extend_from_slice(&period.not_after_ms.to_le_bytes());
            }
            None => out.push(0),
        }
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, WireError> {
        let signature_type = SignatureType::from_tag(reader.u8()?)?;
        let key_locator = match reader.u8()? {
            0 => None,
            1 => Some(reader.name()?),
            value => return Err(WireError::BadFlag { value }),
        };
        let validity_period = match reader.u8()? {
            0 => None,
            1 => {
                let not_before_ms = reader.u64()?;
                let not_after_ms = reader.u64()?;
                Some(ValidityPeriod::new(not_before_ms, not_after_ms))
            }
            value => return Err(WireError::BadFlag { value }),
        };
        Ok(Self {
            signature_type,
            key_locator,
            validity_period,
        })
    }
}

/// A named, signed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    pub name: Name,
    pub content: Vec<u8>,
    pub signature_info: SignatureInfo,
    pub signature_value: Vec<u8>,
}

impl Data {
    /// The bytes the signature covers: everything up to and including
    /// the signature info block.
    pub fn signed_portion(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_name(&mut out, &self.name);
        put_bytes(&mut out, &self.content);
        self.signature_info.write(&mut out);
        out
    }

    /// Encodes the packet: the signed portion followed by the
    /// length-prefixed signature value.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.signed_portion();
        put_bytes(&mut out, &self.signature_value);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut reader = Reader::new(bytes);
        let name = reader.name()?;
        let content = reader.bytes()?.to_vec();
        let signature_info = SignatureInfo::read(&mut reader)?;
        let signature_value = reader.bytes()?.to_vec();
        reader.finish()?;
        Ok(Self {
            name,
            content,
            signature_info,
            signature_value,
        })
    }

    pub fn verify_with_key(&self, key: &VerifyingKey) -> bool {
        verify_portion(
            &self.signature_info,
            &self.signed_portion(),
            &self.signature_value,
            key,
        )
    }
}

/// A request packet. When signed, the two trailing name components are
/// the encoded [`SignatureInfo`] and the raw signature value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interest {
    pub name: Name,
}

impl Interest {
    pub fn new(name: impl Into<Name>) -> Self {
        Self { name: name.into() }
    }

    /// The bytes a signed Interest's signature covers: the encoding of
    /// the name without its final component.
    pub fn signed_portion(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put_name(&mut out, &self.name.prefix(self.name.len().saturating_sub(1)));
        out
    }

    /// Decodes the signature info component, `name[-2]`.
    pub fn signature_info(&self) -> Result<SignatureInfo, WireError> {
        let index = self
            .name
            .len()
            .checked_sub(2)
            .ok_or(WireError::UnexpectedEnd)?;
        SignatureInfo::decode(self.name[index].as_bytes())
    }

    pub fn verify_with_key(&self, key: &VerifyingKey) -> bool {
        let Some(value_index) = self.name.len().checked_sub(1) else {
            return false;
        };
        let Ok(info) = self.signature_info() else {
            return false;
        };
        verify_portion(
            &info,
            &self.signed_portion(),
            self.name[value_index].as_bytes(),
            key,
        )
    }
}

/// Either packet kind the validator accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Data(Data),
    Interest(Interest),
}

impl Packet {
    pub fn name(&self) -> &Name {
        match self {
            Self::Data(data) => &data.name,
            Self::Interest(interest) => &interest.name,
        }
    }

    pub fn verify_with_key(&self, key: &VerifyingKey) -> bool {
        match self {
            Self::Data(data) => data.verify_with_key(key),
            Self::Interest(interest) => interest.verify_with_key(key),
        }
    }
}

impl From<Data> for Packet {
    fn from(data: Data) -> Self {
        Self::Data(data)
    }
}

impl From<Interest> for Packet {
    fn from(interest: Interest) -> Self {
        Self::Interest(interest)
    }
}

fn verify_portion(
    info: &SignatureInfo,
    portion: &[u8],
    signature_value: &[u8],
    key: &VerifyingKey,
) -> bool {
    match info.signature_type {
        SignatureType::Ed25519 => Signature::from_slice(signature_value)
            .is_ok_and(|signature| key.verify(portion, &signature).is_ok()),
        // Digest signatures bind no key; the key argument plays no part.
        SignatureType::DigestSha256 => {
            Sha256::digest(portion).as_slice() == signature_value
        }
    }
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    #[allow(clippy::cast_possible_truncation)]
    let len = bytes.len() as u32;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(bytes);
}

fn put_name(out: &mut Vec<u8>, name: &Name) {
    #[allow(clippy::cast_possible_truncation)]
    let count = name.len() as u32;
    out.extend_from_slice(&count.to_le_bytes());
    for component in name {
        put_bytes(out, component.as_bytes());
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], WireError> {
        if count > self.bytes.len() {
            return Err(WireError::UnexpectedEnd);
        }
        let (head, rest) = self.bytes.split_at(count);
        self.bytes = rest;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u64(&mut self) -> Result<u64, WireError> {
        let bytes = self.take(8)?;
        let mut fixed = [0u8; 8];
        fixed.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(fixed))
    }

    fn bytes(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn name(&mut self) -> Result<Name, WireError> {
        let count = self.u32()?;
        let mut name = Name::new();
        for _ in 0..count {
            name.push(Component::new(self.bytes()?));
        }
        Ok(name)
    }

    fn finish(self) -> Result<(), WireError> {
        if self.bytes.is_empty() {
            Ok(())
        } else {
            Err(WireError::TrailingBytes {
                count: self.bytes.len(),
            })
        }
    }
}
