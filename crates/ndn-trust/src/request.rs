//! Per-validation bookkeeping: the certificate request a policy hands
//! back and the state one validation run threads through its chain
//! walk.

use std::collections::{HashSet, VecDeque};

use crate::certificate::Certificate;
use crate::name::Name;
use crate::packet::{Interest, Packet};

/// An instruction to retrieve a certificate, with its retry budget.
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    interest: Interest,
    attempts_left: u32,
}

impl CertificateRequest {
    /// How many times a retrieval is attempted in total, counting the
    /// first try.
    pub const TOTAL_ATTEMPTS: u32 = 3;

    pub fn new(interest: Interest) -> Self {
        Self {
            interest,
            attempts_left: Self::TOTAL_ATTEMPTS,
        }
    }

    pub fn interest(&self) -> &Interest {
        &self.interest
    }

    pub fn attempts_left(&self) -> u32 {
        self.attempts_left
    }

    /// Consumes one attempt. Returns false once the budget is spent.
    pub(crate) fn take_attempt(&mut self) -> bool {
        if self.attempts_left == 0 {
            return false;
        }
        self.attempts_left -= 1;
        true
    }
}

/// Freshness evidence taken from a signed command interest, staged by
/// the policy and committed by the validator only when validation
/// succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingCommand {
    pub(crate) key_name: Name,
    pub(crate) timestamp_ms: u64,
    pub(crate) nonce: Vec<u8>,
}

/// State for one validation run.
///
/// The chain grows from the packet toward a trust anchor; certificates
/// are prepended, so the front is the one a trusted certificate
/// verifies and the back is the one that verifies the original packet.
/// The seen set catches key locators that loop back on themselves, and
/// a temporary anchor scopes an override anchor to this run alone.
#[derive(Debug)]
pub struct ValidationState {
    packet: Packet,
    chain: VecDeque<Certificate>,
    seen: HashSet<Name>,
    temporary_anchor: Option<Certificate>,
    pub(crate) pending_command: Option<PendingCommand>,
}

impl ValidationState {
    pub(crate) fn new(packet: Packet) -> Self {
        Self {
            packet,
            chain: VecDeque::new(),
            seen: HashSet::new(),
            temporary_anchor: None,
            pending_command: None,
        }
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    /// How many certificates the chain walk has collected so far.
    pub fn depth(&self) -> usize {
        self.chain.len()
    }

    pub(crate) fn chain(&self) -> &VecDeque<Certificate> {
        &self.chain
    }

    pub(crate) fn chain_mut(&mut self) -> &mut VecDeque<Certificate> {
        &mut self.chain
    }

    pub(crate) fn add_certificate(&mut self, certificate: Certificate) {
        self.chain.push_front(certificate);
    }

    /// Records `name` as visited. Returns true if it was already seen.
    pub(crate) fn record_seen(&mut self, name: &Name) -> bool {
        !self.seen.insert(name.clone())
    }

    pub(crate) fn set_temporary_anchor(&mut self, anchor: Certificate) {
        self.temporary_anchor = Some(anchor);
    }

    pub(crate) fn temporary_anchor(&self) -> Option<&Certificate> {
        self.temporary_anchor.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_run_out_after_three() {
        let mut request = CertificateRequest::new(Interest::new("/key/locator"));
        assert_eq!(request.attempts_left(), 3);
        assert!(request.take_attempt());
        assert!(request.take_attempt());
        assert!(request.take_attempt());
        assert!(!request.take_attempt());
        assert_eq!(request.attempts_left(), 0);
    }

    #[test]
    fn seen_names_detect_revisits() {
        let mut state = ValidationState::new(Packet::Interest(Interest::new("/p")));
        assert!(!state.record_seen(&Name::from_uri("/a/KEY/1")));
        assert!(!state.record_seen(&Name::from_uri("/b/KEY/2")));
        assert!(state.record_seen(&Name::from_uri("/a/KEY/1")));
    }
}
