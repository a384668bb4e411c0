//! Small shared utilities: timestamps, ids, access codes.

use rand::Rng;

/// Current UTC timestamp in milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Current UTC timestamp in RFC 3339 form, as stored in the backend.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Generate a prefixed resource id: `{prefix}_{millis}_{rand}`.
///
/// Millisecond timestamp plus a 9-char random suffix keeps ids sortable by
/// creation time and collision-free at kiosk scale.
pub fn prefixed_id(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(9)
        .map(|c| (c as char).to_ascii_lowercase())
        .collect();
    format!("{prefix}_{}_{suffix}", now_millis())
}

/// Characters used for access codes. No 0/O or 1/I, codes are read aloud
/// and typed on a keypad.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Generate a 6-character customer access code.
pub fn generate_access_code() -> String {
    let mut rng = rand::thread_rng();
    (0..6)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}
