// Id generation.
//
// Record primary keys are nanoids. Device identifiers use the
// `dev_<millis>_<random>` scheme mobile clients already pattern-match on;
// the registry pre-checks candidates against the store and retries a
// bounded number of times.

use rand::Rng;

/// Generate an opaque record id (nanoid, 21 characters).
pub fn generate_record_id() -> String {
    nanoid::nanoid!()
}

/// Generate a device-id candidate of the form `dev_<millis>_<rand 0..99999>`.
///
/// Candidates are not guaranteed unique; callers must check the registry
/// and regenerate on collision.
pub fn device_id_candidate() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let random: u32 = rand::thread_rng().gen_range(0..100_000);
    format!("dev_{millis}_{random}")
}
