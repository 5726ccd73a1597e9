//! Process entry point: loads configuration, builds the store pools and the
//! `Services` aggregate, binds the tonic server, and runs the graceful
//! shutdown sequence.

mod cli;
mod signal;

use std::{sync::Arc, time::Duration};

use synq_api::{
	pb::{
		room::v1::room_service_server::RoomServiceServer, roomstream::v1::room_stream_service_server::RoomStreamServiceServer,
		streaming::v1::sync_service_server::SyncServiceServer,
	},
	RoomService, RoomStreamService, SyncService,
};
use synq_core::{Config, Result};
use synq_database::PostgresStore;
use synq_ess::RedisStore;
use synq_service::Services;
use tonic::transport::Server;

/// Bounded grace period given to attached streams to notice the
/// `server_shutdown` notice and close themselves before the process exits.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
	let args = cli::parse();
	let config = Config::load(args.config.as_deref())?;

	let log_filter = args.log.as_deref().unwrap_or(&config.log);
	synq_core::log::init(log_filter);

	if args.check_config {
		tracing::info!("configuration OK");
		return Ok(());
	}

	let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build().map_err(|err| {
		synq_core::Error::Internal(format!("failed to start tokio runtime: {err}"))
	})?;

	runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
	tracing::info!(listen = %config.rpc_listen, "starting synqit room synchronization engine");

	let ds = PostgresStore::connect(&config.database_url, config.database_pool_size).await?;
	ds.migrate().await?;
	let ess = RedisStore::connect(&config.redis_url).await?;
	let ds = Arc::new(ds);
	let ess = Arc::new(ess);

	let services = Arc::new(Services::build(Arc::clone(&ds), Arc::clone(&ess), &config));

	let room_service = RoomServiceServer::new(RoomService::new(Arc::clone(&services)));
	let roomstream_service = RoomStreamServiceServer::new(RoomStreamService::new(Arc::clone(&services)));
	let sync_service = SyncServiceServer::new(SyncService::new(Arc::clone(&services)));

	let addr = config.rpc_listen;
	let keepalive_interval = config.keepalive_interval;
	let keepalive_timeout = config.keepalive_timeout;
	let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

	let server = tokio::spawn(async move {
		// RoomService and RoomStreamService (unary + server-streaming CRUD
		// and fan-out reads) are additionally reachable from browser-origin
		// callers via grpc-web; the two bidi-streaming RPCs on SyncService
		// stay native gRPC only — grpc-web does not support bidi streams.
		Server::builder()
			.accept_http1(true)
			.http2_keepalive_interval(Some(keepalive_interval))
			.http2_keepalive_timeout(Some(keepalive_timeout))
			.add_service(tonic_web::enable(room_service))
			.add_service(tonic_web::enable(roomstream_service))
			.add_service(sync_service)
			// `serve_with_shutdown` stops *accepting new* connections as
			// soon as the shutdown future resolves but leaves connections
			// already established (including attached bidi streams) to run
			// until they close on their own, unlike an abort.
			.serve_with_shutdown(addr, async {
				let _ = shutdown_rx.await;
			})
			.await
	});
	let server_abort = server.abort_handle();

	signal::wait_for_shutdown().await;

	tracing::info!("no longer accepting new streams; notifying active rooms of shutdown");
	if let Err(err) = services.rooms.broadcast_shutdown().await {
		tracing::warn!(%err, "failed to broadcast shutdown notice to active rooms");
	}

	// Trigger `serve_with_shutdown`'s shutdown future, then give already
	// attached streams the drain window to observe the broadcast above and
	// close themselves; only abort outright if they haven't by then.
	let _ = shutdown_tx.send(());
	match tokio::time::timeout(SHUTDOWN_DRAIN, server).await {
		| Ok(Ok(Ok(()))) => tracing::info!("server exited cleanly"),
		| Ok(Ok(Err(err))) => tracing::warn!(%err, "server exited with an error"),
		| Ok(Err(err)) => tracing::warn!(%err, "server task panicked during shutdown"),
		| Err(_) => {
			tracing::warn!("shutdown drain window elapsed with streams still attached, aborting");
			server_abort.abort();
		},
	}

	drop(services);
	ds.close().await;
	ess.close().await;

	tracing::info!("shutdown complete");
	Ok(())
}
