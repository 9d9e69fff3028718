//! Device session domain model.
//!
//! A device session is keyed by a fingerprint derived from the
//! (IP, user-agent) pair. Distinct people behind the same NAT or proxy
//! with the same browser share a fingerprint, which is a known source of
//! false positives in multi-account detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity and network context of the request being observed or
/// screened.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityContext {
    pub user_id: Option<String>,
    pub customer_id: Option<String>,
    pub ip_address: Option<String>,
    pub session_id: Option<String>,
    /// Caller-supplied fingerprint; overrides the derived one.
    pub device_fingerprint: Option<String>,
}

/// Client-reported device details accompanying an observation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceInfo {
    pub user_agent: String,
    pub platform: Option<String>,
    pub browser: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceSession {
    pub id: Uuid,
    pub fingerprint: String,
    /// Most recently observed user on this device.
    pub user_id: Option<String>,
    /// Most recently observed customer on this device.
    pub customer_id: Option<String>,
    /// Every user ever observed on this device.
    pub linked_user_ids: Vec<String>,
    /// Every customer ever observed on this device.
    pub linked_customer_ids: Vec<String>,
    pub ip_address: String,
    pub user_agent: String,
    pub platform: Option<String>,
    pub browser: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub session_token: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

/// Fields required to record a first sighting of a fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDeviceSession {
    pub fingerprint: String,
    pub user_id: Option<String>,
    pub customer_id: Option<String>,
    pub ip_address: String,
    pub device: DeviceInfo,
    pub session_token: Option<String>,
    pub seen_at: DateTime<Utc>,
}

/// Refresh applied on a repeat sighting. Identity fields that are `None`
/// leave the stored values untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TouchDeviceSession {
    pub user_id: Option<String>,
    pub customer_id: Option<String>,
    pub session_token: Option<String>,
    pub seen_at: DateTime<Utc>,
}

impl DeviceSession {
    /// Apply a repeat sighting in place, preserving earlier identity
    /// links.
    pub fn touch(&mut self, touch: &TouchDeviceSession) {
        self.last_active_at = touch.seen_at;
        if let Some(user_id) = &touch.user_id {
            self.user_id = Some(user_id.clone());
            if !self.linked_user_ids.contains(user_id) {
                self.linked_user_ids.push(user_id.clone());
            }
        }
        if let Some(customer_id) = &touch.customer_id {
            self.customer_id = Some(customer_id.clone());
            if !self.linked_customer_ids.contains(customer_id) {
                self.linked_customer_ids.push(customer_id.clone());
            }
        }
        if touch.session_token.is_some() {
            self.session_token.clone_from(&touch.session_token);
        }
    }

    /// Whether the customer has ever been observed on this device.
    pub fn is_linked_to_customer(&self, customer_id: &str) -> bool {
        self.customer_id.as_deref() == Some(customer_id)
            || self.linked_customer_ids.iter().any(|c| c == customer_id)
    }
}
