//! Per-key usage limits.
//!
//! A use is reserved with `QuotaGuard::check` before calling the model
//! and only committed with `QuotaPermit::consume` once a reply has
//! been received. Reservations count against the limit so concurrent
//! requests on the same key can't overshoot `max_uses`, and no lock
//! is held while the model call is in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::store::{KeyStore, UserKeyRecord};
use crate::core::ChatError;

type InFlight = Arc<Mutex<HashMap<String, u32>>>;

#[derive(Clone)]
pub struct QuotaGuard {
    keys: Arc<KeyStore>,
    // Lock order: `in_flight` first, then the key store
    in_flight: InFlight,
}

impl QuotaGuard {
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self {
            keys,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Reserve one use for `key`.
    pub fn check(&self, key: &str) -> Result<QuotaPermit, ChatError> {
        let mut in_flight = lock(&self.in_flight);
        let record = self.keys.get(key).ok_or(ChatError::Unauthorized)?;
        let pending = in_flight.get(key).copied().unwrap_or(0);

        if record.usage_count.saturating_add(pending) >= record.max_uses {
            tracing::info!(
                "Quota exhausted for user '{}' ({}/{}, {} pending)",
                record.user_id,
                record.usage_count,
                record.max_uses,
                pending
            );
            return Err(ChatError::QuotaExceeded {
                usage_count: record.usage_count,
                max_uses: record.max_uses,
            });
        }

        *in_flight.entry(key.to_string()).or_insert(0) += 1;

        Ok(QuotaPermit {
            keys: Arc::clone(&self.keys),
            in_flight: Arc::clone(&self.in_flight),
            record,
            released: false,
        })
    }

    /// Number of reserved but not yet consumed uses for `key`.
    pub fn pending(&self, key: &str) -> u32 {
        lock(&self.in_flight).get(key).copied().unwrap_or(0)
    }
}

/// A reserved use. Dropping the permit without calling `consume`
/// gives the use back.
#[must_use = "a permit that is dropped without being consumed releases its reservation"]
pub struct QuotaPermit {
    keys: Arc<KeyStore>,
    in_flight: InFlight,
    record: UserKeyRecord,
    released: bool,
}

impl QuotaPermit {
    /// The key's record as it was when the use was reserved.
    pub fn record(&self) -> &UserKeyRecord {
        &self.record
    }

    /// Commit the reserved use: increment the key's usage count by one
    /// and persist the key store. The reservation becomes a real use
    /// under the `in_flight` lock; the file write happens after both
    /// locks are released.
    pub fn consume(mut self) -> Result<UserKeyRecord, ChatError> {
        let staged = {
            let mut in_flight = lock(&self.in_flight);
            let staged = self.keys.update(&self.record.key, |record| {
                if record.is_exhausted() {
                    return Err(ChatError::QuotaExceeded {
                        usage_count: record.usage_count,
                        max_uses: record.max_uses,
                    });
                }
                record.usage_count += 1;
                Ok(())
            });
            release(&mut in_flight, &self.record.key);
            self.released = true;
            staged
        };

        let (updated, write) = staged?;
        write.commit()?;
        tracing::debug!(
            "Consumed one use for user '{}' ({}/{})",
            updated.user_id,
            updated.usage_count,
            updated.max_uses
        );
        Ok(updated)
    }
}

impl Drop for QuotaPermit {
    fn drop(&mut self) {
        if !self.released {
            release(&mut lock(&self.in_flight), &self.record.key);
        }
    }
}

fn release(in_flight: &mut HashMap<String, u32>, key: &str) {
    if let Some(count) = in_flight.get_mut(key) {
        *count = count.saturating_sub(1);
        if *count == 0 {
            in_flight.remove(key);
        }
    }
}

fn lock(in_flight: &InFlight) -> MutexGuard<'_, HashMap<String, u32>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}
