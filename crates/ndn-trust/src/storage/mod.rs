//! Certificate storage shared by all validations: the trust-anchor
//! container, the verified-certificate cache, and the unverified cache
//! fed by network fetches.
//!
//! Lookups may mutate (lazy expiry purges, due refreshes), so every
//! operation serializes on the write side of the lock; none is held
//! across an await.

mod anchors;
mod cache;

pub(crate) use anchors::{decode_certificate_text, AnchorError};

use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;

use crate::certificate::Certificate;
use crate::name::Name;
use anchors::TrustAnchorContainer;
use cache::CertificateCache;

/// How long a verified certificate may be reused without re-checking.
const VERIFIED_CACHE_LIFETIME: Duration = Duration::from_secs(3600);

/// Unverified fetch results are only bridged between retries.
const UNVERIFIED_CACHE_LIFETIME: Duration = Duration::from_secs(300);

/// Entry bound on the verified cache.
const VERIFIED_CACHE_CAPACITY: usize = 1000;

pub(crate) struct CertificateStorage {
    inner: RwLock<StorageInner>,
}

struct StorageInner {
    anchors: TrustAnchorContainer,
    verified: CertificateCache,
    unverified: CertificateCache,
}

impl CertificateStorage {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(StorageInner {
                anchors: TrustAnchorContainer::new(),
                verified: CertificateCache::with_capacity(
                    VERIFIED_CACHE_LIFETIME,
                    VERIFIED_CACHE_CAPACITY,
                ),
                unverified: CertificateCache::new(UNVERIFIED_CACHE_LIFETIME),
            }),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, StorageInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// A certificate already trusted for `prefix`: a trust anchor when
    /// one matches, else a previously verified certificate.
    pub(crate) fn find_trusted(&self, prefix: &Name) -> Option<Certificate> {
        let mut guard = self.write();
        let StorageInner {
            anchors, verified, ..
        } = &mut *guard;
        anchors.find(prefix).or_else(|| verified.find(prefix))
    }

    pub(crate) fn find_unverified(&self, prefix: &Name) -> Option<Certificate> {
        self.write().unverified.find(prefix)
    }

    pub(crate) fn cache_verified(&self, certificate: Certificate) {
        self.write().verified.insert(certificate);
    }

    pub(crate) fn cache_unverified(&self, certificate: Certificate) {
        self.write().unverified.insert(certificate);
    }

    pub(crate) fn add_static_anchor(
        &self,
        group: &str,
        certificate: Certificate,
    ) -> Result<(), AnchorError> {
        self.write().anchors.insert_static(group, certificate)
    }

    pub(crate) fn add_file_anchor(
        &self,
        group: &str,
        path: &Path,
        refresh: Option<Duration>,
    ) -> Result<(), AnchorError> {
        self.write().anchors.insert_from_file(group, path, refresh)
    }

    pub(crate) fn add_directory_anchor(
        &self,
        group: &str,
        path: &Path,
        refresh: Option<Duration>,
    ) -> Result<(), AnchorError> {
        self.write()
            .anchors
            .insert_from_directory(group, path, refresh)
    }

    pub(crate) fn reset_anchors(&self) {
        self.write().anchors.clear();
    }

    pub(crate) fn reset_verified(&self) {
        self.write().verified.clear();
    }

    /// Shifts this storage's view of now, for expiry and refresh tests.
    pub(crate) fn set_now_offset(&self, offset_ms: i64) {
        let mut guard = self.write();
        guard.anchors.set_now_offset(offset_ms);
        guard.verified.set_now_offset(offset_ms);
        guard.unverified.set_now_offset(offset_ms);
    }
}
