use rand::Rng;

/// Characters allowed in a shareable room code. Excludes `0 O 1 I` because
/// they're easy to transpose when read aloud or typed on a phone.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const ROOM_CODE_LEN: usize = 6;

/// Generates a random 6-character uppercase alphanumeric code from
/// [`ALPHABET`]. Uniqueness among active rooms is enforced by the durable
/// store's unique constraint; callers retry generation on a `Conflict`.
#[must_use]
pub fn generate() -> String {
	let mut rng = rand::thread_rng();
	(0..ROOM_CODE_LEN)
		.map(|_| {
			let idx = rng.gen_range(0..ALPHABET.len());
			ALPHABET[idx] as char
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn excludes_ambiguous_characters() {
		for _ in 0..1000 {
			let code = generate();
			assert_eq!(code.len(), ROOM_CODE_LEN);
			assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
			assert!(!code.contains(['0', 'O', '1', 'I']));
		}
	}
}
