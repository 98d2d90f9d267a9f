//! The validator: drives one packet's trust chain to a verdict.
//!
//! One call to [`Validator::validate`] runs the whole protocol. The
//! policy examines the packet and either settles it or names the
//! certificate that must vouch for it; the validator retrieves that
//! certificate, re-runs the policy on it, and repeats until a trust
//! anchor is reached or the walk fails. Only then is any cryptography
//! done: the chain is verified from the anchor down, and finally the
//! original packet against the key that ends the chain.

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use crate::certificate::Certificate;
use crate::clock::shifted_now_millis;
use crate::error::ValidationError;
use crate::fetch::CertificateFetcher;
use crate::name::Name;
use crate::packet::Packet;
use crate::policy::{AnchorDirective, LoadedConfig, PolicyAction, ValidationPolicy};
use crate::request::{CertificateRequest, ValidationState};
use crate::storage::{AnchorError, CertificateStorage};

/// Validates packets against a policy, walking certificate chains up
/// to a trust anchor.
pub struct Validator {
    policy: ValidationPolicy,
    fetcher: CertificateFetcher,
    storage: CertificateStorage,
    max_depth: usize,
    now_offset_ms: AtomicI64,
}

impl Validator {
    /// How many certificates one validation may chain through before
    /// giving up.
    pub const DEFAULT_MAX_DEPTH: usize = 10;

    pub fn new(policy: ValidationPolicy, fetcher: CertificateFetcher) -> Self {
        Self {
            policy,
            fetcher,
            storage: CertificateStorage::new(),
            max_depth: Self::DEFAULT_MAX_DEPTH,
            now_offset_ms: AtomicI64::new(0),
        }
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Validates one packet.
    ///
    /// On success the returned chain starts at the trust anchor that
    /// grounded it and ends with the certificate whose key signed the
    /// packet. Policies that accept without consulting a certificate
    /// return an empty chain.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] the run hits; the reason
    /// is final and no other rule or source is consulted after it.
    pub async fn validate(&self, packet: Packet) -> Result<Vec<Certificate>, ValidationError> {
        let mut state = ValidationState::new(packet);
        let packet = state.packet().clone();
        let outcome = match self.policy.check_policy(&packet, &mut state) {
            PolicyAction::Accept => Ok(Vec::new()),
            PolicyAction::Reject(error) => Err(error),
            PolicyAction::Continue(request) => self.walk_chain(request, &mut state).await,
        };
        match &outcome {
            Ok(chain) => {
                if let Some(command) = state.pending_command.take() {
                    self.policy
                        .commit_command(&command.key_name, command.timestamp_ms, &command.nonce);
                }
                debug!(
                    name = %state.packet().name(),
                    chain = chain.len(),
                    "packet validated"
                );
            }
            Err(error) => {
                warn!(name = %state.packet().name(), %error, "validation failed");
            }
        }
        outcome
    }

    /// Follows certificate requests until a trusted certificate is
    /// found or the walk fails.
    async fn walk_chain(
        &self,
        request: CertificateRequest,
        state: &mut ValidationState,
    ) -> Result<Vec<Certificate>, ValidationError> {
        let mut request = request;
        loop {
            if state.depth() >= self.max_depth {
                warn!(
                    name = %state.packet().name(),
                    limit = self.max_depth,
                    "certificate chain is too deep"
                );
                return Err(ValidationError::ExceededDepthLimit {
                    limit: self.max_depth,
                });
            }
            let request_name = request.interest().name.clone();
            if state.record_seen(&request_name) {
                return Err(ValidationError::LoopDetected { name: request_name });
            }

            if let Some(trusted) = self.find_trusted(&request_name, state) {
                debug!(anchor = %trusted.name(), "trusted certificate found");
                return self.settle_chain(&trusted, state);
            }

            let certificate = self.fetcher.fetch(&mut request, &self.storage).await?;
            let now_ms = shifted_now_millis(self.now_offset_ms.load(Ordering::Relaxed));
            if !certificate.is_valid_at(now_ms) {
                warn!(
                    name = %certificate.name(),
                    "fetched certificate is outside its validity period"
                );
                return Err(ValidationError::ExpiredCertificate {
                    name: certificate.name().clone(),
                });
            }

            let as_packet = Packet::Data(certificate.data().clone());
            match self.policy.check_policy(&as_packet, state) {
                PolicyAction::Accept => {
                    return Err(ValidationError::PolicyMisconfiguration {
                        reason: format!(
                            "the policy is not allowed to designate {} as a trust anchor",
                            certificate.name()
                        ),
                    });
                }
                PolicyAction::Reject(error) => return Err(error),
                PolicyAction::Continue(next) => {
                    state.add_certificate(certificate);
                    request = next;
                }
            }
        }
    }

    /// A trusted certificate under `request_name`: the run's temporary
    /// anchor if it fits, else an anchor or cached verified
    /// certificate from storage.
    fn find_trusted(&self, request_name: &Name, state: &ValidationState) -> Option<Certificate> {
        if let Some(anchor) = state.temporary_anchor() {
            if request_name.is_prefix_of(anchor.name()) {
                return Some(anchor.clone());
            }
        }
        self.storage.find_trusted(request_name)
    }

    /// Verifies the collected chain from `trusted` down, caches the
    /// certificates that verified, then checks the original packet
    /// against the key that ends the chain.
    fn settle_chain(
        &self,
        trusted: &Certificate,
        state: &mut ValidationState,
    ) -> Result<Vec<Certificate>, ValidationError> {
        let result = verify_chain(trusted, state);
        for certificate in state.chain() {
            self.storage.cache_verified(certificate.clone());
        }
        let signer = result?;

        if state.packet().verify_with_key(signer.public_key()) {
            let mut chain = Vec::with_capacity(state.chain().len() + 1);
            chain.push(trusted.clone());
            chain.extend(state.chain().iter().cloned());
            Ok(chain)
        } else {
            warn!(
                name = %state.packet().name(),
                key = %signer.name(),
                "packet signature failed"
            );
            Err(ValidationError::InvalidSignature {
                name: state.packet().name().clone(),
            })
        }
    }

    /// Replaces the rules and trust anchors of the configuration
    /// driven policy from a TOML document and drops previously
    /// verified certificates.
    ///
    /// # Errors
    ///
    /// Fails with [`ValidationError::PolicyMisconfiguration`] if the
    /// document does not compile, an anchor source cannot be loaded,
    /// or the validator's policy is not configuration driven. A
    /// document that fails to compile leaves the validator untouched.
    pub fn load_config(&mut self, text: &str) -> Result<(), ValidationError> {
        self.apply_config(LoadedConfig::from_toml(text)?)
    }

    /// [`Validator::load_config`] from a file, with relative anchor
    /// paths resolved against the file's directory.
    pub fn load_config_file(&mut self, path: &Path) -> Result<(), ValidationError> {
        let text = std::fs::read_to_string(path).map_err(|error| {
            ValidationError::PolicyMisconfiguration {
                reason: format!("cannot read {}: {error}", path.display()),
            }
        })?;
        let mut loaded = LoadedConfig::from_toml(&text)?;
        if let Some(base) = path.parent() {
            loaded.resolve_paths(base);
        }
        self.apply_config(loaded)
    }

    fn apply_config(&mut self, loaded: LoadedConfig) -> Result<(), ValidationError> {
        if self.policy.config_mut().is_none() {
            return Err(ValidationError::PolicyMisconfiguration {
                reason: "the validator's policy is not configuration driven".to_string(),
            });
        }
        self.storage.reset_anchors();
        for (index, directive) in loaded.anchors.iter().enumerate() {
            let group = format!("config-{index}");
            match directive {
                AnchorDirective::Static(certificate) => self
                    .storage
                    .add_static_anchor(&group, certificate.clone())
                    .map_err(anchor_error)?,
                AnchorDirective::File { path, refresh } => self
                    .storage
                    .add_file_anchor(&group, path, *refresh)
                    .map_err(anchor_error)?,
                AnchorDirective::Directory { path, refresh } => self
                    .storage
                    .add_directory_anchor(&group, path, *refresh)
                    .map_err(anchor_error)?,
            }
        }
        if let Some(config) = self.policy.config_mut() {
            *config = loaded.policy;
        }
        self.storage.reset_verified();
        Ok(())
    }

    /// Installs a static trust anchor under `group`. A static group
    /// accepts any number of certificates.
    pub fn add_anchor(&self, group: &str, certificate: Certificate) -> Result<(), ValidationError> {
        self.storage
            .add_static_anchor(group, certificate)
            .map_err(anchor_error)
    }

    /// Installs a file-backed anchor group, reloaded every `refresh`.
    /// Group ids of dynamic groups must be new.
    pub fn add_anchor_file(
        &self,
        group: &str,
        path: &Path,
        refresh: Option<Duration>,
    ) -> Result<(), ValidationError> {
        self.storage
            .add_file_anchor(group, path, refresh)
            .map_err(anchor_error)
    }

    /// Installs a directory-backed anchor group holding every `.cert`
    /// file under `path`, reloaded every `refresh`.
    pub fn add_anchor_directory(
        &self,
        group: &str,
        path: &Path,
        refresh: Option<Duration>,
    ) -> Result<(), ValidationError> {
        self.storage
            .add_directory_anchor(group, path, refresh)
            .map_err(anchor_error)
    }

    /// Drops every trust anchor, static and dynamic.
    pub fn reset_anchors(&self) {
        self.storage.reset_anchors();
    }

    /// Drops every cached verified certificate.
    pub fn reset_verified_certificates(&self) {
        self.storage.reset_verified();
    }

    /// Shifts the validator's view of now, for expiry and freshness
    /// tests.
    #[doc(hidden)]
    pub fn set_now_offset(&self, offset_ms: i64) {
        self.now_offset_ms.store(offset_ms, Ordering::Relaxed);
        self.storage.set_now_offset(offset_ms);
        self.policy.set_now_offset(offset_ms);
    }
}

/// Walks the chain front to back, each certificate verified by its
/// predecessor's key. On the first failure the chain is truncated to
/// the prefix that verified and the failing certificate is reported.
fn verify_chain(
    trusted: &Certificate,
    state: &mut ValidationState,
) -> Result<Certificate, ValidationError> {
    let mut signer = trusted.clone();
    let mut failure: Option<(usize, Name)> = None;
    for (index, certificate) in state.chain().iter().enumerate() {
        if certificate.data().verify_with_key(signer.public_key()) {
            signer = certificate.clone();
        } else {
            failure = Some((index, certificate.name().clone()));
            break;
        }
    }
    if let Some((index, name)) = failure {
        warn!(%name, issuer = %signer.name(), "certificate signature failed");
        state.chain_mut().truncate(index);
        return Err(ValidationError::InvalidSignature { name });
    }
    Ok(signer)
}

fn anchor_error(error: AnchorError) -> ValidationError {
    ValidationError::PolicyMisconfiguration {
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::Component;
    use crate::packet::{Data, Interest, SignatureInfo, ValidityPeriod};
    use crate::policy::{CommandOptions, ConfigPolicy};
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    fn sign_data(data: &mut Data, key: &SigningKey) {
        data.signature_value = key.sign(&data.signed_portion()).to_bytes().to_vec();
    }

    fn make_certificate(
        uri: &str,
        subject: &SigningKey,
        issuer_locator: &str,
        issuer: &SigningKey,
    ) -> Certificate {
        let mut data = Data {
            name: Name::from_uri(uri),
            content: subject.verifying_key().to_bytes().to_vec(),
            signature_info: SignatureInfo::ed25519(Name::from_uri(issuer_locator))
                .with_validity_period(ValidityPeriod::new(0, u64::MAX)),
            signature_value: Vec::new(),
        };
        sign_data(&mut data, issuer);
        Certificate::from_data(data).unwrap()
    }

    fn signed_packet(uri: &str, key_locator: &str, key: &SigningKey) -> Packet {
        let mut data = Data {
            name: Name::from_uri(uri),
            content: b"payload".to_vec(),
            signature_info: SignatureInfo::ed25519(Name::from_uri(key_locator)),
            signature_value: Vec::new(),
        };
        sign_data(&mut data, key);
        Packet::Data(data)
    }

    fn signed_command(
        prefix: &str,
        timestamp_ms: u64,
        nonce: u64,
        locator: &str,
        key: &SigningKey,
    ) -> Packet {
        let info = SignatureInfo::ed25519(Name::from_uri(locator));
        let unsigned = Name::from_uri(prefix)
            .append(Component::from_number(timestamp_ms))
            .append(Component::from_number(nonce))
            .append(Component::new(info.encode()));
        let placeholder = Interest::new(unsigned.clone().append(Component::new(Vec::<u8>::new())));
        let signature = key.sign(&placeholder.signed_portion());
        Packet::Interest(Interest::new(
            unsigned.append(Component::new(signature.to_bytes().to_vec())),
        ))
    }

    #[tokio::test]
    async fn accept_all_takes_anything_without_a_chain() {
        let validator = Validator::new(ValidationPolicy::AcceptAll, CertificateFetcher::Offline);
        let packet = Packet::Data(Data {
            name: Name::from_uri("/garbage"),
            content: vec![1, 2, 3],
            signature_info: SignatureInfo::digest_sha256(),
            signature_value: vec![9u8; 4],
        });
        assert_eq!(validator.validate(packet).await.unwrap(), Vec::new());
    }

    #[tokio::test]
    async fn an_anchored_signer_validates_directly() {
        let root_key = SigningKey::generate(&mut OsRng);
        let anchor = make_certificate("/net/KEY/%01/self/v1", &root_key, "/net/KEY/%01", &root_key);

        let validator = Validator::new(ValidationPolicy::Hierarchical, CertificateFetcher::Offline);
        validator.add_anchor("root", anchor.clone()).unwrap();

        let packet = signed_packet("/net/readings/1", "/net/KEY/%01", &root_key);
        let chain = validator.validate(packet).await.unwrap();
        assert_eq!(chain, vec![anchor]);
    }

    #[tokio::test]
    async fn a_wrong_key_fails_the_packet_signature() {
        let root_key = SigningKey::generate(&mut OsRng);
        let anchor = make_certificate("/net/KEY/%01/self/v1", &root_key, "/net/KEY/%01", &root_key);

        let validator = Validator::new(ValidationPolicy::Hierarchical, CertificateFetcher::Offline);
        validator.add_anchor("root", anchor).unwrap();

        let impostor = SigningKey::generate(&mut OsRng);
        let packet = signed_packet("/net/readings/1", "/net/KEY/%01", &impostor);
        assert!(matches!(
            validator.validate(packet).await,
            Err(ValidationError::InvalidSignature { .. })
        ));
    }

    #[tokio::test]
    async fn an_unanchored_signer_cannot_be_retrieved_offline() {
        let key = SigningKey::generate(&mut OsRng);
        let validator = Validator::new(ValidationPolicy::Hierarchical, CertificateFetcher::Offline);
        let packet = signed_packet("/net/readings/1", "/net/KEY/%01", &key);
        assert!(matches!(
            validator.validate(packet).await,
            Err(ValidationError::CannotRetrieveCertificate { .. })
        ));
    }

    #[tokio::test]
    async fn the_default_config_policy_matches_nothing() {
        let validator = Validator::new(
            ValidationPolicy::Config(ConfigPolicy::default()),
            CertificateFetcher::Offline,
        );
        let key = SigningKey::generate(&mut OsRng);
        let packet = signed_packet("/app/x", "/app/KEY/%01", &key);
        assert!(matches!(
            validator.validate(packet).await,
            Err(ValidationError::NoMatchingRule { .. })
        ));
    }

    #[tokio::test]
    async fn loading_an_any_anchor_config_bypasses_validation() {
        let mut validator = Validator::new(
            ValidationPolicy::Config(ConfigPolicy::default()),
            CertificateFetcher::Offline,
        );
        validator
            .load_config("[[trust-anchor]]\ntype = \"any\"\n")
            .unwrap();

        let packet = Packet::Data(Data {
            name: Name::from_uri("/anything"),
            content: Vec::new(),
            signature_info: SignatureInfo::digest_sha256(),
            signature_value: Vec::new(),
        });
        assert_eq!(validator.validate(packet).await.unwrap(), Vec::new());
    }

    #[tokio::test]
    async fn load_config_requires_a_config_policy() {
        let mut validator =
            Validator::new(ValidationPolicy::AcceptAll, CertificateFetcher::Offline);
        assert!(matches!(
            validator.load_config(""),
            Err(ValidationError::PolicyMisconfiguration { .. })
        ));
    }

    #[tokio::test]
    async fn command_freshness_commits_only_on_success() {
        let root_key = SigningKey::generate(&mut OsRng);
        let anchor = make_certificate("/net/KEY/%01/self/v1", &root_key, "/net/KEY/%01", &root_key);

        let policy = ValidationPolicy::command_freshness(
            ValidationPolicy::Hierarchical,
            CommandOptions::default(),
        );
        let validator = Validator::new(policy, CertificateFetcher::Offline);
        validator.add_anchor("root", anchor).unwrap();

        let timestamp = crate::clock::now_millis();
        let command = signed_command("/net/restart", timestamp, 0x11, "/net/KEY/%01", &root_key);
        assert!(validator.validate(command.clone()).await.is_ok());

        // The committed timestamp now blocks its own replay.
        assert!(matches!(
            validator.validate(command).await,
            Err(ValidationError::PolicyMisconfiguration { .. })
        ));

        // So does the committed nonce, even at a fresher timestamp.
        let reused = signed_command("/net/restart", timestamp + 10, 0x11, "/net/KEY/%01", &root_key);
        assert!(matches!(
            validator.validate(reused).await,
            Err(ValidationError::PolicyMisconfiguration { .. })
        ));

        // A failed validation burns neither its timestamp nor its nonce.
        let impostor = SigningKey::generate(&mut OsRng);
        let forged = signed_command("/net/restart", timestamp + 10, 0x22, "/net/KEY/%01", &impostor);
        assert!(matches!(
            validator.validate(forged).await,
            Err(ValidationError::InvalidSignature { .. })
        ));
        let genuine = signed_command("/net/restart", timestamp + 10, 0x22, "/net/KEY/%01", &root_key);
        assert!(validator.validate(genuine).await.is_ok());
    }
}
