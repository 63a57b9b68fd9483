use chrono::{DateTime, Utc};
use mongodb::bson::Bson;

/// Serialize a timestamp the same way serde does when whole documents are
/// inserted, so `$set` updates stay readable by the model structs.
pub fn bson_datetime(dt: DateTime<Utc>) -> Bson {
    mongodb::bson::to_bson(&dt).unwrap_or_else(|_| Bson::String(dt.to_rfc3339()))
}
