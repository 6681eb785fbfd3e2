use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("sweep lease unavailable: {0}")]
pub struct LeaseError(pub String);

/// Exclusive claim on running a sweep, shared by every process that sweeps the same store.
#[async_trait]
pub trait SweepLease: Send + Sync {
    /// Claims the sweep for `holder` until `expires_at`. Returns `false` while another
    /// holder's claim is still live at `now`.
    async fn try_acquire(
        &self,
        holder: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, LeaseError>;

    /// Drops the claim if `holder` still owns it.
    async fn release(&self, holder: &str) -> Result<(), LeaseError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Claim {
    holder: String,
    expires_at: DateTime<Utc>,
}

/// Lease held in process memory.
#[derive(Clone, Default)]
pub struct InMemorySweepLease {
    claim: Arc<Mutex<Option<Claim>>>,
}

impl InMemorySweepLease {
    pub fn holder(&self) -> Option<String> {
        match self.claim.lock() {
            Ok(claim) => claim.as_ref().map(|claim| claim.holder.clone()),
            Err(poisoned) => poisoned.into_inner().as_ref().map(|claim| claim.holder.clone()),
        }
    }
}

#[async_trait]
impl SweepLease for InMemorySweepLease {
    async fn try_acquire(
        &self,
        holder: &str,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, LeaseError> {
        let mut claim = match self.claim.lock() {
            Ok(claim) => claim,
            Err(poisoned) => poisoned.into_inner(),
        };
        let live_elsewhere =
            claim.as_ref().is_some_and(|claim| claim.holder != holder && claim.expires_at > now);
        if live_elsewhere {
            return Ok(false);
        }
        *claim = Some(Claim { holder: holder.to_string(), expires_at });
        Ok(true)
    }

    async fn release(&self, holder: &str) -> Result<(), LeaseError> {
        let mut claim = match self.claim.lock() {
            Ok(claim) => claim,
            Err(poisoned) => poisoned.into_inner(),
        };
        if claim.as_ref().is_some_and(|claim| claim.holder == holder) {
            *claim = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{InMemorySweepLease, SweepLease};

    #[tokio::test]
    async fn live_claim_excludes_other_holders_until_it_expires() {
        let t0 = Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).single().expect("valid time");
        let lease = InMemorySweepLease::default();

        assert!(lease.try_acquire("server", t0, t0 + Duration::seconds(90)).await.expect("a"));
        assert!(!lease.try_acquire("cli", t0, t0 + Duration::seconds(90)).await.expect("b"));
        assert!(lease
            .try_acquire("cli", t0 + Duration::seconds(91), t0 + Duration::seconds(180))
            .await
            .expect("c"));
        assert_eq!(lease.holder().as_deref(), Some("cli"));
    }

    #[tokio::test]
    async fn release_only_drops_own_claim() {
        let t0 = Utc.with_ymd_and_hms(2026, 6, 1, 8, 0, 0).single().expect("valid time");
        let lease = InMemorySweepLease::default();
        lease.try_acquire("server", t0, t0 + Duration::seconds(90)).await.expect("acquire");

        lease.release("cli").await.expect("foreign release");
        assert_eq!(lease.holder().as_deref(), Some("server"));

        lease.release("server").await.expect("own release");
        assert_eq!(lease.holder(), None);
    }
}
