//! Human-decodable order numbers.

use chrono::{DateTime, Utc};
use common::UserId;
use rand::Rng;

/// Builds an order number from the current time, the buyer and a random
/// suffix.
///
/// Layout, all decimal digits: `YYYYMMDDhhmmss`, nine digits of nanoseconds,
/// the user id, then a suffix in `10..=99`. Two orders by the same user in
/// the same nanosecond collide with probability 1/90, so the order store
/// enforces uniqueness and the caller regenerates on conflict.
pub fn generate(user_id: UserId) -> String {
    let suffix = rand::thread_rng().gen_range(10..=99);
    format_number(Utc::now(), user_id, suffix)
}

fn format_number(at: DateTime<Utc>, user_id: UserId, suffix: u8) -> String {
    format!(
        "{}{:09}{}{}",
        at.format("%Y%m%d%H%M%S"),
        at.timestamp_subsec_nanos(),
        user_id.as_i64().unsigned_abs(),
        suffix
    )
}
