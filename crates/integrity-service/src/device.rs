//! Device session tracker.
//!
//! Sessions are keyed by a fingerprint of `(ip, user agent)`. Users
//! behind one NAT or proxy with the same browser build share a
//! fingerprint, and therefore a session row; multi-account detection
//! inherits that blind spot.

use chrono::Utc;
use integrity_core::error::{IntegrityError, IntegrityResult};
use integrity_core::models::device::{
    ActivityContext, CreateDeviceSession, DeviceInfo, DeviceSession, TouchDeviceSession,
};
use integrity_core::repository::DeviceSessionRepository;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Hex characters kept from the SHA-256 digest.
const FINGERPRINT_LEN: usize = 32;

/// Deterministic fingerprint of an `(ip, user agent)` pair.
pub fn fingerprint(ip_address: &str, user_agent: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{ip_address}::{user_agent}").as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(FINGERPRINT_LEN);
    digest
}

/// Records who was seen on which device.
pub struct DeviceTracker<D: DeviceSessionRepository> {
    repo: D,
}

impl<D: DeviceSessionRepository> DeviceTracker<D> {
    pub fn new(repo: D) -> Self {
        Self { repo }
    }

    /// Upsert the session for this sighting.
    ///
    /// Returns `Ok(None)` when the context carries no IP. A fingerprint
    /// supplied in the context wins over the derived one. When two
    /// observers race to create the same fingerprint, the loser retries
    /// as an update.
    pub async fn observe(
        &self,
        context: &ActivityContext,
        device: DeviceInfo,
    ) -> IntegrityResult<Option<DeviceSession>> {
        let Some(ip_address) = context.ip_address.as_deref() else {
            return Ok(None);
        };
        let fingerprint = context
            .device_fingerprint
            .clone()
            .unwrap_or_else(|| fingerprint(ip_address, &device.user_agent));

        let seen_at = Utc::now();
        let touch = TouchDeviceSession {
            user_id: context.user_id.clone(),
            customer_id: context.customer_id.clone(),
            session_token: context.session_id.clone(),
            seen_at,
        };

        match self.repo.get_by_fingerprint(&fingerprint).await {
            Ok(_) => return self.repo.touch(&fingerprint, touch).await.map(Some),
            Err(IntegrityError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let created = self
            .repo
            .create(CreateDeviceSession {
                fingerprint: fingerprint.clone(),
                user_id: context.user_id.clone(),
                customer_id: context.customer_id.clone(),
                ip_address: ip_address.to_string(),
                device,
                session_token: context.session_id.clone(),
                seen_at,
            })
            .await;

        match created {
            Ok(session) => Ok(Some(session)),
            Err(IntegrityError::AlreadyExists { .. }) => {
                debug!(%fingerprint, "device session created concurrently, retrying as update");
                self.repo.touch(&fingerprint, touch).await.map(Some)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic_and_truncated() {
        let a = fingerprint("10.0.0.1", "Mozilla/5.0");
        let b = fingerprint("10.0.0.1", "Mozilla/5.0");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_depends_on_both_parts() {
        let base = fingerprint("10.0.0.1", "Mozilla/5.0");
        assert_ne!(base, fingerprint("10.0.0.2", "Mozilla/5.0"));
        assert_ne!(base, fingerprint("10.0.0.1", "curl/8.0"));
    }
}
