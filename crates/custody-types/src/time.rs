use chrono::Utc;

/// Wall-clock milliseconds since the UNIX epoch.
///
/// Clamps pre-epoch clocks to zero.
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
