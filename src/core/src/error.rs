use std::fmt;

/// The engine's error taxonomy, independent of any transport.
///
/// Service-layer code (gRPC handlers) is the only place allowed to turn this
/// into a transport status; nothing downstream of [`crate::Result`] should
/// construct a `tonic::Status` directly.
#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("not found: {0}")]
	NotFound(String),

	#[error("conflict: {0}")]
	Conflict(String),

	#[error("unauthorized: {0}")]
	Unauthorized(String),

	#[error("failed precondition: {0}")]
	FailedPrecondition(String),

	#[error("invalid: {0}")]
	Invalid(String),

	#[error("transient: {0}")]
	Transient(String),

	#[error("internal: {0}")]
	Internal(String),

	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),

	#[error("ephemeral store error: {0}")]
	Redis(#[from] redis::RedisError),

	#[error("serialization error: {0}")]
	Serde(#[from] serde_json::Error),

	#[error("malformed id: {0}")]
	Uuid(#[from] uuid::Error),

	#[error("configuration error: {0}")]
	Config(#[from] figment::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
	/// Short, caller-safe message. Never includes the underlying store or
	/// transport string.
	#[must_use]
	pub fn public_message(&self) -> String {
		match self {
			| Self::NotFound(msg)
			| Self::Conflict(msg)
			| Self::Unauthorized(msg)
			| Self::FailedPrecondition(msg)
			| Self::Invalid(msg) => msg.clone(),

			| Self::Transient(_) => "temporarily unavailable, try again".to_owned(),

			| Self::Database(_) | Self::Redis(_) | Self::Serde(_) | Self::Uuid(_) | Self::Config(_) | Self::Internal(_) => {
				"internal error".to_owned()
			},
		}
	}
}

/// Maps the taxonomy onto gRPC status codes. This is the single seam where
/// [`Error`] becomes transport-specific.
impl From<Error> for tonic::Status {
	fn from(err: Error) -> Self {
		let code = match &err {
			| Error::NotFound(_) => tonic::Code::NotFound,
			| Error::Conflict(_) => tonic::Code::AlreadyExists,
			| Error::Unauthorized(_) => tonic::Code::PermissionDenied,
			| Error::FailedPrecondition(_) => tonic::Code::FailedPrecondition,
			| Error::Invalid(_) | Error::Uuid(_) => tonic::Code::InvalidArgument,
			| Error::Transient(_) => tonic::Code::Unavailable,
			| Error::Database(_) | Error::Redis(_) | Error::Serde(_) | Error::Config(_) | Error::Internal(_) => {
				tonic::Code::Internal
			},
		};

		if !matches!(code, tonic::Code::Internal) {
			tracing::debug!(%err, "request failed");
		} else {
			tracing::error!(%err, "internal error");
		}

		Self::new(code, err.public_message())
	}
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			| Self::NotFound => "not_found",
			| Self::Conflict => "conflict",
			| Self::Unauthorized => "unauthorized",
			| Self::FailedPrecondition => "failed_precondition",
			| Self::Invalid => "invalid",
			| Self::Transient => "transient",
			| Self::Internal => "internal",
		};
		f.write_str(s)
	}
}

/// Tag-only view of the taxonomy, handy for assertions in tests that don't
/// want to match on the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	NotFound,
	Conflict,
	Unauthorized,
	FailedPrecondition,
	Invalid,
	Transient,
	Internal,
}

impl Error {
	#[must_use]
	pub fn kind(&self) -> ErrorKind {
		match self {
			| Self::NotFound(_) => ErrorKind::NotFound,
			| Self::Conflict(_) => ErrorKind::Conflict,
			| Self::Unauthorized(_) => ErrorKind::Unauthorized,
			| Self::FailedPrecondition(_) => ErrorKind::FailedPrecondition,
			| Self::Invalid(_) | Self::Uuid(_) => ErrorKind::Invalid,
			| Self::Transient(_) => ErrorKind::Transient,
			| Self::Database(_) | Self::Redis(_) | Self::Serde(_) | Self::Config(_) | Self::Internal(_) => {
				ErrorKind::Internal
			},
		}
	}
}
