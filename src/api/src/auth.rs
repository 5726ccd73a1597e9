//! Caller identity extraction.
//!
//! Auth and TLS termination are external collaborators (edge tunneling, the
//! process-manager launcher); this engine trusts that whatever sits in front
//! of it has already authenticated the caller and forwarded their user id in
//! a metadata header. Everything downstream of [`caller_id`] treats that
//! string as the authenticated actor.

use synq_core::{Error, Result, UserId};
use tonic::Request;

const CALLER_ID_HEADER: &str = "x-synqit-user-id";

/// Reads the authenticated caller id off request metadata.
///
/// Returns `Unauthorized` if the header is missing or not valid ASCII; the
/// engine never falls back to a field inside the message body for identity,
/// since that would let a caller impersonate another user.
pub fn caller_id<T>(request: &Request<T>) -> Result<UserId> {
	request
		.metadata()
		.get(CALLER_ID_HEADER)
		.ok_or_else(|| Error::Unauthorized("missing caller identity".to_owned()))?
		.to_str()
		.map_err(|_| Error::Unauthorized("caller identity header is not valid ascii".to_owned()))
		.map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
	use tonic::metadata::MetadataValue;

	use super::*;

	#[test]
	fn reads_caller_id_from_metadata() {
		let mut request = Request::new(());
		request.metadata_mut().insert(CALLER_ID_HEADER, MetadataValue::from_static("alice"));
		assert_eq!(caller_id(&request).expect("present"), "alice");
	}

	#[test]
	fn missing_header_is_unauthorized() {
		let request = Request::new(());
		let err = caller_id(&request).expect_err("should be unauthorized");
		assert_eq!(err.kind(), synq_core::ErrorKind::Unauthorized);
	}
}
