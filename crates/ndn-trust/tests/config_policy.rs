//! Configuration-driven validation, end to end.
//!
//! These tests exercise the TOML surface the way a deployment would:
//! documents loaded from disk with file and directory anchors next to
//! them, inline base64 anchors, reloads that replace the whole rule
//! set, and signed command interests admitted by an interest rule.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ed25519_dalek::{Signer, SigningKey};
use ndn_trust::{
    Certificate, CertificateFetcher, Component, ConfigPolicy, Data, Face, FetchResponse, Interest,
    Name, Packet, SignatureInfo, ValidationError, ValidationPolicy, Validator, ValidityPeriod,
};
use rand::rngs::OsRng;

// =============================================================================
// Fixtures
// =============================================================================

fn now_millis() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before the epoch");
    u64::try_from(elapsed.as_millis()).expect("timestamp overflows u64")
}

/// Serves certificates by name prefix and counts every interest.
struct Repository {
    certificates: Vec<Data>,
    calls: AtomicUsize,
}

impl Repository {
    fn new(certificates: Vec<&Certificate>) -> Arc<Self> {
        Arc::new(Self {
            certificates: certificates
                .into_iter()
                .map(|certificate| certificate.data().clone())
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Face for Repository {
    async fn express_interest(&self, interest: &Interest) -> FetchResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.certificates
            .iter()
            .find(|data| interest.name.is_prefix_of(&data.name))
            .map(|data| FetchResponse::Data(data.clone()))
            .unwrap_or(FetchResponse::Nack)
    }
}

fn issue(uri: &str, subject: &SigningKey, issuer_locator: &str, issuer: &SigningKey) -> Certificate {
    let mut data = Data {
        name: Name::from_uri(uri),
        content: subject.verifying_key().to_bytes().to_vec(),
        signature_info: SignatureInfo::ed25519(Name::from_uri(issuer_locator))
            .with_validity_period(ValidityPeriod::new(0, u64::MAX)),
        signature_value: Vec::new(),
    };
    data.signature_value = issuer.sign(&data.signed_portion()).to_bytes().to_vec();
    Certificate::from_data(data).expect("issued certificate is well formed")
}

fn signed_packet(uri: &str, key_locator: &str, key: &SigningKey) -> Packet {
    let mut data = Data {
        name: Name::from_uri(uri),
        content: b"reading".to_vec(),
        signature_info: SignatureInfo::ed25519(Name::from_uri(key_locator)),
        signature_value: Vec::new(),
    };
    data.signature_value = key.sign(&data.signed_portion()).to_bytes().to_vec();
    Packet::Data(data)
}

/// The base64 text form anchor files and inline anchors carry.
fn certificate_text(certificate: &Certificate) -> String {
    BASE64.encode(certificate.data().encode())
}

fn config_validator(fetcher: CertificateFetcher) -> Validator {
    Validator::new(ValidationPolicy::Config(ConfigPolicy::default()), fetcher)
}

// =============================================================================
// Anchors loaded from disk
// =============================================================================

#[tokio::test]
async fn a_file_anchored_config_validates_a_device_chain() {
    let root_key = SigningKey::generate(&mut OsRng);
    let site_key = SigningKey::generate(&mut OsRng);
    let device_key = SigningKey::generate(&mut OsRng);
    let root = issue("/net/KEY/%00/self/v1", &root_key, "/net/KEY/%00", &root_key);
    let site = issue(
        "/net/site/KEY/%01/root/v1",
        &site_key,
        "/net/KEY/%00",
        &root_key,
    );
    let device = issue(
        "/net/site/device/KEY/%02/site/v1",
        &device_key,
        "/net/site/KEY/%01",
        &site_key,
    );

    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("root.cert"), certificate_text(&root)).unwrap();
    fs::write(
        dir.path().join("policy.toml"),
        r#"
[[rule]]
id = "net data"
for = "data"

[[rule.filter]]
type = "name"
name = "/net"
relation = "is-prefix-of"

[[rule.checker]]
type = "hierarchical"

[[trust-anchor]]
type = "file"
file-name = "root.cert"
"#,
    )
    .unwrap();

    let repository = Repository::new(vec![&site, &device]);
    let mut validator = config_validator(CertificateFetcher::network(repository.clone()));
    validator
        .load_config_file(&dir.path().join("policy.toml"))
        .unwrap();

    let packet = signed_packet(
        "/net/site/device/temperature/v3",
        "/net/site/device/KEY/%02",
        &device_key,
    );
    let chain = validator.validate(packet).await.unwrap();
    assert_eq!(chain, vec![root, site, device]);
    assert_eq!(repository.calls(), 2);

    // Outside every rule: refused without consulting the network.
    let stray = signed_packet("/org/reading", "/net/site/device/KEY/%02", &device_key);
    assert!(matches!(
        validator.validate(stray).await,
        Err(ValidationError::NoMatchingRule { .. })
    ));
    assert_eq!(repository.calls(), 2);

    // Matches the rule but breaks the checker: the signer's identity
    // does not cover the packet.
    let overreach = signed_packet("/net/elsewhere", "/net/site/device/KEY/%02", &device_key);
    assert!(matches!(
        validator.validate(overreach).await,
        Err(ValidationError::InvalidSignature { .. })
    ));
    assert_eq!(repository.calls(), 2);
}

#[tokio::test]
async fn an_inline_base64_anchor_needs_no_filesystem() {
    let root_key = SigningKey::generate(&mut OsRng);
    let root = issue(
        "/zone/KEY/%01/self/v1",
        &root_key,
        "/zone/KEY/%01",
        &root_key,
    );

    let config = format!(
        r#"
[[rule]]
id = "zone data"
for = "data"

[[rule.checker]]
type = "customized"
sig-type = "ed25519"

[rule.checker.key-locator]
type = "name"
name = "/zone/KEY/%01"
relation = "equal"

[[trust-anchor]]
type = "base64"
base64-string = "{}"
"#,
        certificate_text(&root)
    );

    let mut validator = config_validator(CertificateFetcher::Offline);
    validator.load_config(&config).unwrap();

    let packet = signed_packet("/zone/reading", "/zone/KEY/%01", &root_key);
    assert_eq!(validator.validate(packet).await.unwrap(), vec![root]);

    // Any other key locator fails the equality constraint.
    let other_key = SigningKey::generate(&mut OsRng);
    let wrong = signed_packet("/zone/reading", "/zone/KEY/%02", &other_key);
    assert!(matches!(
        validator.validate(wrong).await,
        Err(ValidationError::InvalidSignature { .. })
    ));
}

#[tokio::test]
async fn an_anchor_file_can_back_any_policy() {
    let root_key = SigningKey::generate(&mut OsRng);
    let root = issue(
        "/zone/KEY/%01/self/v1",
        &root_key,
        "/zone/KEY/%01",
        &root_key,
    );
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("zone.cert");
    fs::write(&path, certificate_text(&root)).unwrap();

    let validator = Validator::new(ValidationPolicy::Hierarchical, CertificateFetcher::Offline);
    validator.add_anchor_file("zone", &path, None).unwrap();

    let packet = signed_packet("/zone/reading", "/zone/KEY/%01", &root_key);
    assert_eq!(validator.validate(packet).await.unwrap(), vec![root]);
}

#[tokio::test]
async fn a_directory_anchor_follows_its_refresh_period() {
    let key_a = SigningKey::generate(&mut OsRng);
    let key_b = SigningKey::generate(&mut OsRng);
    let anchor_a = issue("/zone/KEY/%0A/self/v1", &key_a, "/zone/KEY/%0A", &key_a);
    let anchor_b = issue("/zone/KEY/%0B/self/v1", &key_b, "/zone/KEY/%0B", &key_b);

    let dir = tempfile::tempdir().unwrap();
    let anchor_dir = dir.path().join("anchors");
    fs::create_dir(&anchor_dir).unwrap();
    fs::write(anchor_dir.join("a.cert"), certificate_text(&anchor_a)).unwrap();
    fs::write(
        dir.path().join("policy.toml"),
        r#"
[[rule]]
id = "zone data"
for = "data"

[[rule.checker]]
type = "hierarchical"

[[trust-anchor]]
type = "dir"
dir = "anchors"
refresh = "1h"
"#,
    )
    .unwrap();

    let mut validator = config_validator(CertificateFetcher::Offline);
    validator
        .load_config_file(&dir.path().join("policy.toml"))
        .unwrap();

    let from_a = signed_packet("/zone/reading", "/zone/KEY/%0A", &key_a);
    let from_b = signed_packet("/zone/reading", "/zone/KEY/%0B", &key_b);
    assert!(validator.validate(from_a.clone()).await.is_ok());
    assert!(validator.validate(from_b.clone()).await.is_err());

    // Rotate the directory contents. Nothing changes until the
    // refresh period elapses.
    fs::remove_file(anchor_dir.join("a.cert")).unwrap();
    fs::write(anchor_dir.join("b.cert"), certificate_text(&anchor_b)).unwrap();
    assert!(validator.validate(from_a.clone()).await.is_ok());
    assert!(validator.validate(from_b.clone()).await.is_err());

    validator.set_now_offset(3_600_001);
    assert!(matches!(
        validator.validate(from_a).await,
        Err(ValidationError::CannotRetrieveCertificate { .. })
    ));
    assert!(validator.validate(from_b).await.is_ok());
}

#[tokio::test]
async fn a_strict_prefix_rule_keeps_signing_below_the_root() {
    let root_key = SigningKey::generate(&mut OsRng);
    let app_key = SigningKey::generate(&mut OsRng);
    let root = issue(
        "/root/KEY/%01/self/v1",
        &root_key,
        "/root/KEY/%01",
        &root_key,
    );
    let app = issue(
        "/root/app/KEY/%02/root/v1",
        &app_key,
        "/root/KEY/%01",
        &root_key,
    );

    // Certificates may be signed from the root itself; everything else
    // must be signed strictly below it.
    let config = format!(
        r#"
[[rule]]
id = "certificates"
for = "data"

[[rule.filter]]
type = "name"
regex = "<KEY>"

[[rule.checker]]
type = "customized"

[rule.checker.key-locator]
type = "name"
name = "/root"
relation = "is-prefix-of"

[[rule]]
id = "app data"
for = "data"

[[rule.filter]]
type = "name"
name = "/root"
relation = "is-prefix-of"

[[rule.checker]]
type = "customized"

[rule.checker.key-locator]
type = "name"
name = "/root"
relation = "is-strict-prefix-of"

[[trust-anchor]]
type = "base64"
base64-string = "{}"
"#,
        certificate_text(&root)
    );

    let repository = Repository::new(vec![&app]);
    let mut validator = config_validator(CertificateFetcher::network(repository.clone()));
    validator.load_config(&config).unwrap();

    let packet = signed_packet("/root/app/data", "/root/app/KEY/%02", &app_key);
    let chain = validator.validate(packet).await.unwrap();
    assert_eq!(chain, vec![root, app]);

    // A root-signed packet fails the strict-prefix constraint.
    let from_root = signed_packet("/root/notice", "/root/KEY/%01", &root_key);
    assert!(matches!(
        validator.validate(from_root).await,
        Err(ValidationError::InvalidSignature { .. })
    ));

    // Outside the root there is no rule at all.
    let stray = signed_packet("/other/data", "/root/app/KEY/%02", &app_key);
    assert!(matches!(
        validator.validate(stray).await,
        Err(ValidationError::NoMatchingRule { .. })
    ));
}

// =============================================================================
// Reloads
// =============================================================================

#[tokio::test]
async fn a_reload_drops_previously_verified_certificates() {
    let root_key = SigningKey::generate(&mut OsRng);
    let device_key = SigningKey::generate(&mut OsRng);
    let root = issue("/net/KEY/%00/self/v1", &root_key, "/net/KEY/%00", &root_key);
    let device = issue(
        "/net/dev/KEY/%02/root/v1",
        &device_key,
        "/net/KEY/%00",
        &root_key,
    );
    let backup_key = SigningKey::generate(&mut OsRng);
    let backup = issue(
        "/backup/KEY/%09/self/v1",
        &backup_key,
        "/backup/KEY/%09",
        &backup_key,
    );

    let rule = r#"
[[rule]]
id = "net data"
for = "data"

[[rule.filter]]
type = "name"
name = "/net"
relation = "is-prefix-of"

[[rule.checker]]
type = "hierarchical"
"#;
    let with_root = format!(
        "{rule}\n[[trust-anchor]]\ntype = \"base64\"\nbase64-string = \"{}\"\n",
        certificate_text(&root)
    );
    let with_backup = format!(
        "{rule}\n[[trust-anchor]]\ntype = \"base64\"\nbase64-string = \"{}\"\n",
        certificate_text(&backup)
    );

    let repository = Repository::new(vec![&device]);
    let mut validator = config_validator(CertificateFetcher::network(repository.clone()));
    validator.load_config(&with_root).unwrap();

    let packet = signed_packet("/net/dev/reading", "/net/dev/KEY/%02", &device_key);
    assert!(validator.validate(packet.clone()).await.is_ok());
    assert_eq!(repository.calls(), 1);

    // The verified device certificate settles the second run alone.
    assert!(validator.validate(packet.clone()).await.is_ok());
    assert_eq!(repository.calls(), 1);

    // After the reload the old chain must be walked again, and the old
    // root is no longer an anchor anywhere.
    validator.load_config(&with_backup).unwrap();
    assert!(matches!(
        validator.validate(packet).await,
        Err(ValidationError::CannotRetrieveCertificate { name })
            if name == Name::from_uri("/net/KEY/%00")
    ));
    assert_eq!(repository.calls(), 4);
}

// =============================================================================
// Interest rules
// =============================================================================

/// A signed command: `<prefix>/<timestamp>/<nonce>/<sig-info>/<sig>`.
fn signed_command(prefix: &str, timestamp_ms: u64, locator: &str, key: &SigningKey) -> Packet {
    let info = SignatureInfo::ed25519(Name::from_uri(locator));
    let unsigned = Name::from_uri(prefix)
        .append(Component::from_number(timestamp_ms))
        .append(Component::from_number(7))
        .append(Component::new(info.encode()));
    let placeholder = Interest::new(unsigned.clone().append(Component::new(Vec::<u8>::new())));
    let signature = key.sign(&placeholder.signed_portion());
    Packet::Interest(Interest::new(
        unsigned.append(Component::new(signature.to_bytes().to_vec())),
    ))
}

#[tokio::test]
async fn an_interest_rule_admits_signed_commands() {
    let root_key = SigningKey::generate(&mut OsRng);
    let root = issue(
        "/zone/KEY/%01/self/v1",
        &root_key,
        "/zone/KEY/%01",
        &root_key,
    );

    let config = format!(
        r#"
[[rule]]
id = "restart command"
for = "interest"

[[rule.filter]]
type = "name"
regex = "^<zone><restart><><>$"

[[rule.checker]]
type = "customized"

[rule.checker.key-locator]
type = "name"
name = "/zone/KEY/%01"
relation = "equal"

[[trust-anchor]]
type = "base64"
base64-string = "{}"
"#,
        certificate_text(&root)
    );

    let mut validator = config_validator(CertificateFetcher::Offline);
    validator.load_config(&config).unwrap();

    let command = signed_command("/zone/restart", now_millis(), "/zone/KEY/%01", &root_key);
    assert_eq!(validator.validate(command).await.unwrap(), vec![root]);

    // A forged signature fails after the chain settles.
    let impostor = SigningKey::generate(&mut OsRng);
    let forged = signed_command("/zone/restart", now_millis(), "/zone/KEY/%01", &impostor);
    assert!(matches!(
        validator.validate(forged).await,
        Err(ValidationError::InvalidSignature { .. })
    ));

    // The wrong command prefix matches no interest rule.
    let other = signed_command("/zone/shutdown", now_millis(), "/zone/KEY/%01", &root_key);
    assert!(matches!(
        validator.validate(other).await,
        Err(ValidationError::NoMatchingRule { .. })
    ));
}
