use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

/// Current wall-clock time as epoch milliseconds.
///
/// Used directly by the Clock Service: the server records this on receipt
/// and again just before sending, with no blocking I/O in between.
#[must_use]
pub fn now_ms() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("system clock is before the unix epoch")
		.as_millis() as i64
}

#[must_use]
pub fn now() -> DateTime<Utc> { Utc::now() }

#[must_use]
pub fn to_ms(at: DateTime<Utc>) -> i64 { at.timestamp_millis() }

/// Recomputes the effective playback position so it stays monotonically
/// consistent with wall time while status is PLAYING: the server recomputes
/// the effective position on read as `stored_position + (now - updated_at)`
/// whenever playback is active.
#[must_use]
pub fn effective_position_ms(stored_position_ms: i64, playing: bool, updated_at: DateTime<Utc>) -> i64 {
	if !playing {
		return stored_position_ms;
	}
	let elapsed = (Utc::now() - updated_at).num_milliseconds().max(0);
	stored_position_ms.saturating_add(elapsed)
}

#[cfg(test)]
mod tests {
	use chrono::Duration;

	use super::*;

	#[test]
	fn paused_position_is_unchanged() {
		let updated_at = Utc::now() - Duration::seconds(10);
		assert_eq!(effective_position_ms(5_000, false, updated_at), 5_000);
	}

	#[test]
	fn playing_position_advances_with_elapsed_time() {
		let updated_at = Utc::now() - Duration::seconds(2);
		let pos = effective_position_ms(5_000, true, updated_at);
		assert!(pos >= 6_900 && pos <= 7_100, "pos was {pos}");
	}

	#[test]
	fn now_ms_is_monotonic_enough_across_calls() {
		let a = now_ms();
		let b = now_ms();
		assert!(b >= a);
	}
}
