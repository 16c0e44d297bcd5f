use reqwest::StatusCode;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
	#[error("{message}")]
	NotFound { message: String },
	/// The upstream answered but reported a failure it may recover from.
	#[error("{message}")]
	Upstream { message: String },
}
impl Error {
	/// Whether another attempt of the same request may succeed.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Reqwest(err) => match err.status() {
				Some(status) => status_is_retryable(status),
				None => err.is_timeout() || err.is_connect() || err.is_request() || err.is_body(),
			},
			Self::Upstream { .. } => true,
			Self::SerdeJson(_)
			| Self::InvalidHeaderName(_)
			| Self::InvalidHeaderValue(_)
			| Self::InvalidConfig { .. }
			| Self::InvalidResponse { .. }
			| Self::NotFound { .. } => false,
		}
	}

	pub fn is_timeout(&self) -> bool {
		match self {
			Self::Reqwest(err) =>
				err.is_timeout() || err.status() == Some(StatusCode::REQUEST_TIMEOUT),
			_ => false,
		}
	}

	pub fn is_not_found(&self) -> bool {
		match self {
			Self::NotFound { .. } => true,
			Self::Reqwest(err) => err.status() == Some(StatusCode::NOT_FOUND),
			_ => false,
		}
	}
}

pub fn status_is_retryable(status: StatusCode) -> bool {
	status == StatusCode::REQUEST_TIMEOUT
		|| status == StatusCode::TOO_MANY_REQUESTS
		|| status.is_server_error()
}
