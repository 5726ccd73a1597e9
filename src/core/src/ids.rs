use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A room identifier. Newtype over [`uuid::Uuid`] so call sites can't
/// accidentally swap a room id for a user id, both of which would otherwise
/// be bare strings on the wire. Always encoded as its canonical textual form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(uuid::Uuid);

impl RoomId {
	#[must_use]
	pub fn new() -> Self { Self(uuid::Uuid::new_v4()) }

	#[must_use]
	pub fn as_uuid(&self) -> uuid::Uuid { self.0 }
}

impl Default for RoomId {
	fn default() -> Self { Self::new() }
}

impl From<uuid::Uuid> for RoomId {
	fn from(id: uuid::Uuid) -> Self { Self(id) }
}

impl FromStr for RoomId {
	type Err = Error;

	fn from_str(s: &str) -> Result<Self> {
		Ok(Self(uuid::Uuid::parse_str(s).map_err(Error::from)?))
	}
}

impl fmt::Display for RoomId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl fmt::Debug for RoomId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "RoomId({})", self.0) }
}

/// Caller identity is opaque to this engine; user management is a different
/// system. Kept as a plain string rather than a UUID newtype since the
/// upstream identity provider's format is not our concern.
pub type UserId = String;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_through_display_and_parse() {
		let id = RoomId::new();
		let parsed: RoomId = id.to_string().parse().expect("valid uuid text");
		assert_eq!(id, parsed);
	}

	#[test]
	fn rejects_garbage() { assert!("not-a-uuid".parse::<RoomId>().is_err()); }
}
