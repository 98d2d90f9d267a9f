//! Trust-anchor groups: certificates trusted unconditionally.
//!
//! A group is either static (populated at load time or by direct
//! insert) or backed by a file or directory and reloaded when its
//! refresh period elapses. A reload replaces the group's set, so
//! anchors whose source entries disappeared drop out. Certificate
//! files hold the base64 text of the certificate's wire encoding;
//! directory groups read every `.cert` file.

use std::collections::BTreeMap;
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use thiserror::Error;
use tracing::{debug, warn};

use crate::certificate::Certificate;
use crate::clock;
use crate::name::Name;
use crate::packet::Data;

#[derive(Debug, Error)]
pub(crate) enum AnchorError {
    /// Every group id may be configured once.
    #[error("trust anchor group `{group}` already exists")]
    DuplicateGroup { group: String },

    /// Direct inserts only apply to static groups.
    #[error("trust anchor group `{group}` does not accept direct inserts")]
    NotStatic { group: String },

    #[error("cannot read trust anchor source {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} does not hold a certificate: {reason}")]
    BadCertificate { path: PathBuf, reason: String },
}

/// Where and how often a dynamic group reloads.
#[derive(Debug, Clone)]
struct RefreshSource {
    path: PathBuf,
    directory: bool,
    period_ms: u64,
    next_at_ms: u64,
}

struct AnchorGroup {
    id: String,
    refresh: Option<RefreshSource>,
    certificates: BTreeMap<Name, Certificate>,
}

pub(crate) struct TrustAnchorContainer {
    groups: Vec<AnchorGroup>,
    now_offset_ms: i64,
}

impl TrustAnchorContainer {
    pub(crate) fn new() -> Self {
        Self {
            groups: Vec::new(),
            now_offset_ms: 0,
        }
    }

    /// Adds `certificate` to static group `group_id`, creating the
    /// group on first use.
    pub(crate) fn insert_static(
        &mut self,
        group_id: &str,
        certificate: Certificate,
    ) -> Result<(), AnchorError> {
        if let Some(group) = self.groups.iter_mut().find(|g| g.id == group_id) {
            if group.refresh.is_some() {
                return Err(AnchorError::NotStatic {
                    group: group_id.to_string(),
                });
            }
            group
                .certificates
                .insert(certificate.name().clone(), certificate);
            return Ok(());
        }
        let mut certificates = BTreeMap::new();
        certificates.insert(certificate.name().clone(), certificate);
        self.groups.push(AnchorGroup {
            id: group_id.to_string(),
            refresh: None,
            certificates,
        });
        Ok(())
    }

    /// Creates a group from one certificate file. With a refresh
    /// period the file is re-read when the period elapses; without one
    /// it is read once, here.
    pub(crate) fn insert_from_file(
        &mut self,
        group_id: &str,
        path: &Path,
        refresh: Option<Duration>,
    ) -> Result<(), AnchorError> {
        self.ensure_new_group(group_id)?;
        let certificate = load_certificate_file(path)?;
        let mut certificates = BTreeMap::new();
        certificates.insert(certificate.name().clone(), certificate);
        self.groups.push(AnchorGroup {
            id: group_id.to_string(),
            refresh: self.refresh_source(path, false, refresh),
            certificates,
        });
        Ok(())
    }

    /// Creates a group from every `.cert` file in a directory.
    pub(crate) fn insert_from_directory(
        &mut self,
        group_id: &str,
        path: &Path,
        refresh: Option<Duration>,
    ) -> Result<(), AnchorError> {
        self.ensure_new_group(group_id)?;
        let certificates = load_certificate_directory(path)?;
        self.groups.push(AnchorGroup {
            id: group_id.to_string(),
            refresh: self.refresh_source(path, true, refresh),
            certificates,
        });
        Ok(())
    }

    fn refresh_source(
        &self,
        path: &Path,
        directory: bool,
        refresh: Option<Duration>,
    ) -> Option<RefreshSource> {
        refresh.map(|period| {
            let period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
            RefreshSource {
                path: path.to_path_buf(),
                directory,
                period_ms,
                next_at_ms: self.now_ms().saturating_add(period_ms),
            }
        })
    }

    fn ensure_new_group(&self, group_id: &str) -> Result<(), AnchorError> {
        if self.groups.iter().any(|g| g.id == group_id) {
            return Err(AnchorError::DuplicateGroup {
                group: group_id.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.groups.clear();
    }

    /// The anchor with the canonically first name starting with
    /// `prefix`, across all groups. Dynamic groups whose refresh
    /// period has elapsed reload first.
    pub(crate) fn find(&mut self, prefix: &Name) -> Option<Certificate> {
        self.refresh_due();
        let mut best: Option<&Certificate> = None;
        for group in &self.groups {
            let candidate = group
                .certificates
                .range((Bound::Included(prefix), Bound::Unbounded))
                .next()
                .filter(|(name, _)| prefix.is_prefix_of(name))
                .map(|(_, certificate)| certificate);
            if let Some(certificate) = candidate {
                if best.map_or(true, |b| certificate.name() < b.name()) {
                    best = Some(certificate);
                }
            }
        }
        best.cloned()
    }

    pub(crate) fn set_now_offset(&mut self, offset_ms: i64) {
        self.now_offset_ms = offset_ms;
    }

    fn refresh_due(&mut self) {
        let now = self.now_ms();
        for group in &mut self.groups {
            let Some(refresh) = &mut group.refresh else {
                continue;
            };
            if now < refresh.next_at_ms {
                continue;
            }
            refresh.next_at_ms = now.saturating_add(refresh.period_ms);
            let loaded = if refresh.directory {
                load_certificate_directory(&refresh.path)
            } else {
                load_certificate_file(&refresh.path).map(|certificate| {
                    let mut certificates = BTreeMap::new();
                    certificates.insert(certificate.name().clone(), certificate);
                    certificates
                })
            };
            match loaded {
                Ok(certificates) => {
                    debug!(
                        group = %group.id,
                        count = certificates.len(),
                        "refreshed trust anchor group"
                    );
                    group.certificates = certificates;
                }
                Err(error) => {
                    warn!(
                        group = %group.id,
                        %error,
                        "trust anchor refresh failed; keeping previous set"
                    );
                }
            }
        }
    }

    fn now_ms(&self) -> u64 {
        clock::shifted_now_millis(self.now_offset_ms)
    }
}

/// Decodes the base64 text form of a certificate.
pub(crate) fn decode_certificate_text(text: &str) -> Result<Certificate, String> {
    let compact: String = text.split_whitespace().collect();
    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|error| format!("bad base64: {error}"))?;
    let data = Data::decode(&bytes).map_err(|error| format!("bad wire format: {error}"))?;
    Certificate::from_data(data).map_err(|error| error.to_string())
}

fn load_certificate_file(path: &Path) -> Result<Certificate, AnchorError> {
    let text = fs::read_to_string(path).map_err(|source| AnchorError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_certificate_text(&text).map_err(|reason| AnchorError::BadCertificate {
        path: path.to_path_buf(),
        reason,
    })
}

fn load_certificate_directory(path: &Path) -> Result<BTreeMap<Name, Certificate>, AnchorError> {
    let entries = fs::read_dir(path).map_err(|source| AnchorError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| AnchorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        paths.push(entry.path());
    }
    paths.sort();
    let mut certificates = BTreeMap::new();
    for file in paths {
        if file.extension().and_then(|e| e.to_str()) != Some("cert") {
            continue;
        }
        match load_certificate_file(&file) {
            Ok(certificate) => {
                certificates.insert(certificate.name().clone(), certificate);
            }
            Err(error) => warn!(%error, "skipping unreadable trust anchor file"),
        }
    }
    Ok(certificates)
}
