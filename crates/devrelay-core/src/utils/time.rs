// Timestamp formatting shared by the services.

use chrono::{SecondsFormat, Utc};

/// Current instant as an RFC 3339 string with millisecond precision and a
/// `Z` suffix. All `createdAt`/`updatedAt` fields use this format, which
/// sorts lexicographically in timestamp order.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
