use chrono::{DateTime, Utc};
use time::OffsetDateTime;

use backend_domain::millis_to_utc;

pub fn utc_to_offset(value: DateTime<Utc>) -> OffsetDateTime {
    let nanos = i128::from(value.timestamp_millis()).saturating_mul(1_000_000);
    OffsetDateTime::from_unix_timestamp_nanos(nanos).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

pub fn offset_to_utc(value: OffsetDateTime) -> DateTime<Utc> {
    millis_to_utc((value.unix_timestamp_nanos() / 1_000_000) as i64)
}
