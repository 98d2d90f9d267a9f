//! # ndn-trust
//!
//! Trust schema validation for Named Data Networking packets.
//!
//! A [`Validator`] answers one question: should this Data or signed
//! Interest packet be believed? The answer comes from walking the
//! packet's certificate chain. A [`ValidationPolicy`] inspects the
//! packet and names the certificate that must vouch for it; the
//! validator retrieves that certificate through a [`CertificateFetcher`],
//! re-runs the policy on it, and repeats until it reaches a configured
//! trust anchor. Only then is any cryptography done: signatures are
//! verified from the anchor down to the original packet, and the chain
//! that grounded the decision is returned.
//!
//! Policies range from [`ValidationPolicy::AcceptAll`] for
//! trust-disabled testing to a rule engine configured from TOML, with
//! name-pattern matching, signed-interest replay protection, and
//! file or directory backed trust anchors that reload themselves.
//!
//! # Modules
//!
//! - [`name`]: hierarchical names and their components
//! - [`packet`]: Data and Interest packets and their signatures
//! - [`certificate`]: the certificate naming convention over Data
//! - [`pattern`]: the name pattern language used by rule checkers
//! - [`relation`]: prefix and equality relations between names
//! - [`policy`]: the validation policies
//! - [`fetch`]: certificate retrieval and the transport seam
//! - [`request`]: per-run certificate requests and validation state
//! - [`validator`]: the chain walk itself
//! - [`error`]: terminal validation failures
//!
//! # Example
//!
//! ```
//! use ndn_trust::{
//!     CertificateFetcher, Data, Name, Packet, SignatureInfo, ValidationPolicy, Validator,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let validator = Validator::new(ValidationPolicy::AcceptAll, CertificateFetcher::Offline);
//! let packet = Packet::Data(Data {
//!     name: Name::from_uri("/app/readings/1"),
//!     content: b"21.5".to_vec(),
//!     signature_info: SignatureInfo::digest_sha256(),
//!     signature_value: Vec::new(),
//! });
//!
//! let runtime = tokio::runtime::Runtime::new()?;
//! let chain = runtime.block_on(validator.validate(packet))?;
//! assert!(chain.is_empty());
//! # Ok(())
//! # }
//! ```

mod clock;
mod storage;

pub mod certificate;
pub mod error;
pub mod fetch;
pub mod name;
pub mod packet;
pub mod pattern;
pub mod policy;
pub mod relation;
pub mod request;
pub mod validator;

pub use certificate::Certificate;
pub use error::ValidationError;
pub use fetch::{CertificateFetcher, Face, FetchResponse};
pub use name::{Component, Name};
pub use packet::{Data, Interest, Packet, SignatureInfo, SignatureType, ValidityPeriod};
pub use pattern::NamePattern;
pub use policy::{CommandOptions, ConfigPolicy, IdentityStore, PolicyAction, ValidationPolicy};
pub use relation::NameRelation;
pub use request::{CertificateRequest, ValidationState};
pub use validator::Validator;
