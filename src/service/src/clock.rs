use synq_core::time::now_ms;
use tracing::instrument;

/// One RTT sample: the client's send timestamp is echoed back implicitly by
/// the caller (the service itself never needs it), paired with the two wall
/// clock reads the server takes around the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingSample {
	pub server_receive_ms: i64,
	pub server_send_ms: i64,
}

/// Idempotent, unauthenticated clock exchange used by clients to estimate
/// one-way delay and offset against the server's wall clock.
///
/// The two timestamps MUST bracket no blocking I/O: a client computing
/// `((server_receive - client_send) + (client_receive - server_send)) / 2`
/// only gets a meaningful one-way delay estimate if the server gap reflects
/// pure scheduling jitter, not database or network waits.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClockService;

impl ClockService {
	#[must_use]
	pub fn new() -> Self { Self }

	/// `client_send_ms` is accepted for API symmetry with the wire message
	/// but is not otherwise consulted: filtering across repeated samples for
	/// the smallest RTT is the client's responsibility.
	#[instrument(skip(self))]
	pub fn timing_sync(&self, client_send_ms: i64) -> TimingSample {
		let server_receive_ms = now_ms();
		let server_send_ms = now_ms();
		tracing::trace!(client_send_ms, server_receive_ms, server_send_ms, "timing sync");
		TimingSample { server_receive_ms, server_send_ms }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn server_send_never_precedes_server_receive() {
		let sample = ClockService::new().timing_sync(0);
		assert!(sample.server_send_ms >= sample.server_receive_ms);
	}
}
