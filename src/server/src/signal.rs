/// Waits for a process shutdown signal: SIGINT or SIGTERM on unix, Ctrl+C
/// elsewhere. The caller is responsible for running the drain sequence
/// once this resolves.
#[cfg(unix)]
pub async fn wait_for_shutdown() {
	use tokio::signal::unix::{signal, SignalKind};

	let mut term = signal(SignalKind::terminate()).expect("installing SIGTERM handler");
	tokio::select! {
		_ = tokio::signal::ctrl_c() => tracing::warn!("received SIGINT, shutting down"),
		_ = term.recv() => tracing::warn!("received SIGTERM, shutting down"),
	}
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown() {
	let _ = tokio::signal::ctrl_c().await;
	tracing::warn!("received ctrl-c, shutting down");
}
