use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Builds an order number: `ORD-<UTC yyyymmddHHMMSS>-<8 uppercase hex>`.
///
/// Numbers sort by creation second. Uniqueness is enforced by storage.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("ORD-{}-{}", now.format("%Y%m%d%H%M%S"), suffix)
}
