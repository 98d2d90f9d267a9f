//! Certificate retrieval strategies.
//!
//! The validator asks a fetcher for certificates it does not already
//! trust. The network variant expresses the request over a transport
//! with a bounded wait per attempt; the offline variant fails
//! immediately, for validators that must never touch the network.
//! Fetched certificates pass through the unverified cache, so retries
//! and parallel validations do not re-fetch the same name.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::certificate::Certificate;
use crate::error::ValidationError;
use crate::packet::{Data, Interest};
use crate::request::CertificateRequest;
use crate::storage::CertificateStorage;

/// Default bound on one network attempt.
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(4);

/// One transport response for one expressed interest.
#[derive(Debug, Clone)]
pub enum FetchResponse {
    Data(Data),
    Timeout,
    /// The network answered that it cannot satisfy the request.
    Nack,
}

/// The transport seam. Implementations resolve one interest with one
/// response; tests substitute scripted transports.
#[async_trait]
pub trait Face: Send + Sync {
    async fn express_interest(&self, interest: &Interest) -> FetchResponse;
}

/// How the validator obtains certificates.
pub enum CertificateFetcher {
    /// Never fetches: validation succeeds only from anchors and caches.
    Offline,
    /// Fetches over `face`, waiting at most `timeout` per attempt.
    Network {
        face: Arc<dyn Face>,
        timeout: Duration,
    },
}

impl CertificateFetcher {
    pub fn network(face: Arc<dyn Face>) -> Self {
        Self::Network {
            face,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Retrieves the certificate `request` names, consuming attempts
    /// from its budget. Earlier unverified fetch results answer
    /// without touching the network.
    pub(crate) async fn fetch(
        &self,
        request: &mut CertificateRequest,
        storage: &CertificateStorage,
    ) -> Result<Certificate, ValidationError> {
        let interest_name = request.interest().name.clone();
        if let Some(cached) = storage.find_unverified(&interest_name) {
            debug!(name = %interest_name, "certificate served from unverified cache");
            return Ok(cached);
        }
        match self {
            Self::Offline => {
                warn!(name = %interest_name, "offline fetcher cannot retrieve certificate");
                Err(ValidationError::CannotRetrieveCertificate {
                    name: interest_name,
                })
            }
            Self::Network { face, timeout } => {
                while request.take_attempt() {
                    match tokio::time::timeout(*timeout, face.express_interest(request.interest()))
                        .await
                    {
                        Ok(FetchResponse::Data(data)) => {
                            let certificate = Certificate::from_data(data)?;
                            storage.cache_unverified(certificate.clone());
                            return Ok(certificate);
                        }
                        Ok(FetchResponse::Timeout) | Err(_) => {
                            debug!(
                                name = %interest_name,
                                attempts_left = request.attempts_left(),
                                "certificate fetch timed out"
                            );
                        }
                        Ok(FetchResponse::Nack) => {
                            debug!(
                                name = %interest_name,
                                attempts_left = request.attempts_left(),
                                "certificate fetch was nacked"
                            );
                        }
                    }
                }
                warn!(name = %interest_name, "certificate retrieval attempts exhausted");
                Err(ValidationError::CannotRetrieveCertificate {
                    name: interest_name,
                })
            }
        }
    }
}

impl fmt::Debug for CertificateFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => f.write_str("Offline"),
            Self::Network { timeout, .. } => f
                .debug_struct("Network")
                .field("timeout", timeout)
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock;
    use crate::name::Name;
    use crate::packet::{SignatureInfo, ValidityPeriod};
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_cert_data(uri: &str) -> Data {
        let key = SigningKey::generate(&mut OsRng);
        let name = Name::from_uri(uri);
        let info = SignatureInfo::ed25519(name.prefix(name.len() - 2)).with_validity_period(
            ValidityPeriod::new(0, clock::now_millis() + 86_400_000),
        );
        Data {
            name,
            content: key.verifying_key().to_bytes().to_vec(),
            signature_info: info,
            signature_value: vec![0; 64],
        }
    }

    struct ScriptedFace {
        response: FetchResponse,
        calls: AtomicUsize,
    }

    impl ScriptedFace {
        fn new(response: FetchResponse) -> Self {
            Self {
                response,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Face for ScriptedFace {
        async fn express_interest(&self, _interest: &Interest) -> FetchResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }
    }

    fn request_for(uri: &str) -> CertificateRequest {
        CertificateRequest::new(Interest::new(uri))
    }

    #[tokio::test]
    async fn offline_fails_without_spending_attempts() {
        let storage = CertificateStorage::new();
        let mut request = request_for("/net/a/KEY/1");
        let outcome = CertificateFetcher::Offline
            .fetch(&mut request, &storage)
            .await;
        assert!(matches!(
            outcome,
            Err(ValidationError::CannotRetrieveCertificate { .. })
        ));
        assert_eq!(request.attempts_left(), 3);
    }

    #[tokio::test]
    async fn timeouts_spend_exactly_three_attempts() {
        let storage = CertificateStorage::new();
        let face = Arc::new(ScriptedFace::new(FetchResponse::Timeout));
        let fetcher = CertificateFetcher::network(face.clone());

        let mut request = request_for("/net/a/KEY/1");
        let outcome = fetcher.fetch(&mut request, &storage).await;
        assert!(matches!(
            outcome,
            Err(ValidationError::CannotRetrieveCertificate { .. })
        ));
        assert_eq!(face.calls.load(Ordering::SeqCst), 3);
        assert_eq!(request.attempts_left(), 0);
    }

    #[tokio::test]
    async fn nacks_spend_the_same_budget() {
        let storage = CertificateStorage::new();
        let face = Arc::new(ScriptedFace::new(FetchResponse::Nack));
        let fetcher = CertificateFetcher::network(face.clone());

        let mut request = request_for("/net/a/KEY/1");
        assert!(fetcher.fetch(&mut request, &storage).await.is_err());
        assert_eq!(face.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn malformed_data_fails_on_the_first_attempt() {
        let storage = CertificateStorage::new();
        let mut bad = make_cert_data("/net/a/KEY/1/self/v1");
        bad.name = Name::from_uri("/not/a/cert/name/at/all");
        let face = Arc::new(ScriptedFace::new(FetchResponse::Data(bad)));
        let fetcher = CertificateFetcher::network(face.clone());

        let mut request = request_for("/net/a/KEY/1");
        let outcome = fetcher.fetch(&mut request, &storage).await;
        assert!(matches!(
            outcome,
            Err(ValidationError::MalformedCertificate { .. })
        ));
        assert_eq!(face.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetched_certificates_land_in_the_unverified_cache() {
        let storage = CertificateStorage::new();
        let data = make_cert_data("/net/a/KEY/1/self/v1");
        let face = Arc::new(ScriptedFace::new(FetchResponse::Data(data)));
        let fetcher = CertificateFetcher::network(face.clone());

        let mut request = request_for("/net/a/KEY/1");
        fetcher.fetch(&mut request, &storage).await.unwrap();
        assert!(storage
            .find_unverified(&Name::from_uri("/net/a/KEY/1"))
            .is_some());

        // The second fetch answers from the cache.
        let mut request = request_for("/net/a/KEY/1");
        fetcher.fetch(&mut request, &storage).await.unwrap();
        assert_eq!(face.calls.load(Ordering::SeqCst), 1);
    }
}
