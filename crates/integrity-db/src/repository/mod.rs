//! SurrealDB implementations of the repository traits.

mod account_flag;
mod alert;
mod audit;
mod device_session;
mod restriction;

pub use account_flag::SurrealAccountFlagRepository;
pub use alert::SurrealAlertRepository;
pub use audit::SurrealAuditLogRepository;
pub use device_session::SurrealDeviceSessionRepository;
pub use restriction::SurrealRestrictionRepository;

use serde::Serialize;
use serde::de::DeserializeOwned;
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
pub(crate) struct CountRow {
    pub(crate) total: u64,
}

/// Enums are stored under their serde name (e.g. `WALLET_HOLD`).
pub(crate) fn enum_to_string<T: Serialize>(entity: &str, value: &T) -> Result<String, DbError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(name)) => Ok(name),
        Ok(other) => Err(DbError::decode(
            entity,
            format!("enum serialized to non-string {other}"),
        )),
        Err(e) => Err(DbError::decode(entity, e.to_string())),
    }
}

pub(crate) fn parse_enum<T: DeserializeOwned>(entity: &str, raw: &str) -> Result<T, DbError> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|e| DbError::decode(entity, format!("unknown value '{raw}': {e}")))
}

pub(crate) fn parse_record_id(entity: &str, raw: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(raw).map_err(|e| DbError::decode(entity, format!("invalid UUID: {e}")))
}

const BLOB_KEY: &str = "value";

/// JSON blob columns are flexible objects; scalars and arrays are
/// wrapped as `{ "value": ... }`. An object that already has that exact
/// shape is wrapped too, so [`unwrap_blob`] always restores the input.
pub(crate) fn object_blob(value: serde_json::Value) -> serde_json::Value {
    if value.as_object().is_some_and(|map| !is_wrapped(map)) {
        return value;
    }
    let mut map = serde_json::Map::new();
    map.insert(BLOB_KEY.to_string(), value);
    serde_json::Value::Object(map)
}

/// Inverse of [`object_blob`].
pub(crate) fn unwrap_blob(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(mut map) if is_wrapped(&map) => {
            map.remove(BLOB_KEY).unwrap_or_default()
        }
        other => other,
    }
}

fn is_wrapped(map: &serde_json::Map<String, serde_json::Value>) -> bool {
    map.len() == 1 && map.contains_key(BLOB_KEY)
}

pub(crate) fn first_row<T>(rows: Vec<T>, entity: &str, id: &str) -> Result<T, DbError> {
    rows.into_iter().next().ok_or_else(|| DbError::NotFound {
        entity: entity.into(),
        id: id.into(),
    })
}
