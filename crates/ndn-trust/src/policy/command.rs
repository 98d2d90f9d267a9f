//! Replay protection for signed command interests.
//!
//! A command interest carries a millisecond timestamp four components
//! from the end of its name and a nonce right after it. The ledger
//! keeps, per signing key, the newest timestamp it has committed and
//! the nonces it has seen lately; a command whose timestamp does not
//! strictly increase, or whose nonce repeats, is treated as a replay.
//! Records are only committed once the whole validation run succeeds,
//! so a command that fails its signature check burns neither its
//! timestamp nor its nonce.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::clock::shifted_now_millis;
use crate::error::ValidationError;
use crate::name::Name;
use crate::packet::Packet;
use crate::request::{PendingCommand, ValidationState};

use super::{key_locator_name, PolicyAction, ValidationPolicy};

/// The timestamp component, counted from the end of the name:
/// `/<prefix>/<timestamp>/<nonce>/<sig-info>/<sig-value>`.
const TIMESTAMP_FROM_END: usize = 4;
/// The nonce component, counted from the end of the name.
const NONCE_FROM_END: usize = 3;
/// A command interest name carries at least the four trailing
/// components.
const MINIMUM_NAME_LENGTH: usize = 4;

/// Tuning knobs for command-interest freshness.
#[derive(Debug, Clone)]
pub struct CommandOptions {
    /// Tolerated clock skew on either side of now.
    pub grace_period: Duration,
    /// How many signing keys the ledger tracks before dropping the
    /// stalest.
    pub max_records: usize,
    /// How long an untouched record stays in the ledger.
    pub record_lifetime: Duration,
    /// How many recent nonces each key record retains, oldest out
    /// first.
    pub max_nonce_records: usize,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(120),
            max_records: 1000,
            record_lifetime: Duration::from_secs(3600),
            max_nonce_records: 1000,
        }
    }
}

#[derive(Debug)]
struct KeyRecord {
    key_name: Name,
    timestamp_ms: u64,
    nonces: VecDeque<Vec<u8>>,
    last_refreshed_ms: u64,
}

impl KeyRecord {
    fn has_nonce(&self, nonce: &[u8]) -> bool {
        self.nonces.iter().any(|seen| seen.as_slice() == nonce)
    }
}

/// Committed freshness evidence per signing key, stalest record first.
#[derive(Debug)]
pub struct FreshnessLedger {
    options: CommandOptions,
    inner: Mutex<LedgerInner>,
}

#[derive(Debug, Default)]
struct LedgerInner {
    records: VecDeque<KeyRecord>,
    now_offset_ms: i64,
}

impl FreshnessLedger {
    pub(crate) fn new(options: CommandOptions) -> Self {
        Self {
            options,
            inner: Mutex::new(LedgerInner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admits a command or rejects it as stale, future-dated or
    /// replayed. Admission does not record anything.
    fn admit(
        &self,
        interest_name: &Name,
        key_name: &Name,
        timestamp_ms: u64,
        nonce: &[u8],
    ) -> Result<(), ValidationError> {
        let mut inner = self.lock();
        let now_ms = shifted_now_millis(inner.now_offset_ms);
        Self::drop_stale(&mut inner, &self.options, now_ms);

        let grace_ms = millis(self.options.grace_period);
        if timestamp_ms < now_ms.saturating_sub(grace_ms)
            || timestamp_ms > now_ms.saturating_add(grace_ms)
        {
            warn!(
                name = %interest_name,
                timestamp_ms,
                now_ms,
                "command timestamp is outside the grace period"
            );
            return Err(ValidationError::PolicyMisconfiguration {
                reason: format!("the timestamp of {interest_name} is outside the grace period"),
            });
        }

        if let Some(record) = inner.records.iter().find(|r| &r.key_name == key_name) {
            if timestamp_ms <= record.timestamp_ms {
                warn!(
                    name = %interest_name,
                    key = %key_name,
                    timestamp_ms,
                    newest_ms = record.timestamp_ms,
                    "command timestamp did not increase"
                );
                return Err(ValidationError::PolicyMisconfiguration {
                    reason: format!(
                        "the timestamp of {interest_name} does not increase for key {key_name}"
                    ),
                });
            }
            if record.has_nonce(nonce) {
                warn!(
                    name = %interest_name,
                    key = %key_name,
                    "command nonce was recently used"
                );
                return Err(ValidationError::PolicyMisconfiguration {
                    reason: format!(
                        "the nonce of {interest_name} was recently used for key {key_name}"
                    ),
                });
            }
        }
        Ok(())
    }

    /// Records the command's timestamp and nonce for `key_name`,
    /// refreshing the record's position in the ledger.
    pub(crate) fn commit(&self, key_name: &Name, timestamp_ms: u64, nonce: &[u8]) {
        let mut inner = self.lock();
        let now_ms = shifted_now_millis(inner.now_offset_ms);
        Self::drop_stale(&mut inner, &self.options, now_ms);

        let mut record = inner
            .records
            .iter()
            .position(|r| &r.key_name == key_name)
            .and_then(|index| inner.records.remove(index))
            .unwrap_or_else(|| KeyRecord {
                key_name: key_name.clone(),
                timestamp_ms,
                nonces: VecDeque::new(),
                last_refreshed_ms: now_ms,
            });
        record.timestamp_ms = record.timestamp_ms.max(timestamp_ms);
        record.last_refreshed_ms = now_ms;
        if !record.has_nonce(nonce) {
            record.nonces.push_back(nonce.to_vec());
            while record.nonces.len() > self.options.max_nonce_records {
                record.nonces.pop_front();
            }
        }
        inner.records.push_back(record);
        debug!(key = %key_name, timestamp_ms, "committed command freshness record");
    }

    /// Pops records from the stale end until the ledger is within its
    /// lifetime and size bounds.
    fn drop_stale(inner: &mut LedgerInner, options: &CommandOptions, now_ms: u64) {
        let expire_at = now_ms.saturating_sub(millis(options.record_lifetime));
        while inner
            .records
            .front()
            .is_some_and(|r| r.last_refreshed_ms <= expire_at)
            || inner.records.len() > options.max_records
        {
            inner.records.pop_front();
        }
    }

    pub(crate) fn set_now_offset(&self, offset_ms: i64) {
        self.lock().now_offset_ms = offset_ms;
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// The freshness check in front of an inner policy. Data packets carry
/// no command timestamp and pass straight through; that also covers
/// every certificate retrieved during the chain walk.
pub(crate) fn check(
    inner: &ValidationPolicy,
    ledger: &FreshnessLedger,
    packet: &Packet,
    state: &mut ValidationState,
) -> PolicyAction {
    let Packet::Interest(interest) = packet else {
        return inner.check_policy(packet, state);
    };

    if interest.name.len() < MINIMUM_NAME_LENGTH {
        return PolicyAction::Reject(ValidationError::PolicyMisconfiguration {
            reason: format!("command interest {} is too short", interest.name),
        });
    }
    let timestamp_ms = interest.name[interest.name.len() - TIMESTAMP_FROM_END].to_number();
    let nonce = interest.name[interest.name.len() - NONCE_FROM_END]
        .as_bytes()
        .to_vec();

    let key_name = match key_locator_name(packet) {
        Ok(name) => name,
        Err(error) => return PolicyAction::Reject(error),
    };
    if let Err(error) = ledger.admit(&interest.name, &key_name, timestamp_ms, &nonce) {
        return PolicyAction::Reject(error);
    }

    state.pending_command = Some(PendingCommand {
        key_name,
        timestamp_ms,
        nonce,
    });
    inner.check_policy(packet, state)
}
