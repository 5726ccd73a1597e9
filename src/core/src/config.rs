use std::{net::SocketAddr, time::Duration};

use figment::{
	providers::{Env, Format, Toml},
	Figment,
};
use serde::Deserialize;

use crate::Result;

fn default_rpc_listen() -> SocketAddr { "0.0.0.0:6969".parse().expect("valid socket addr") }

fn default_grace_window() -> Duration { Duration::from_secs(180) }

fn default_queue_capacity() -> usize { 64 }

fn default_keepalive_interval() -> Duration { Duration::from_secs(30) }

fn default_keepalive_timeout() -> Duration { Duration::from_secs(10) }

fn default_ds_pool_size() -> u32 { 10 }

fn default_ess_pool_size() -> u32 { 10 }

fn default_log() -> String { "info".to_owned() }

/// Whether participants may add to the room queue without host permission.
///
/// The source system was inconsistent here, so this is a config knob rather
/// than a hardcoded choice; it defaults to host-only.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueAddPolicy {
	HostOnly,
	Open,
}

impl Default for QueueAddPolicy {
	fn default() -> Self { Self::HostOnly }
}

/// All configuration for the engine, deserialized from a layered
/// `Figment` (TOML file + environment overrides).
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	/// Address the gRPC server listens on.
	#[serde(default = "default_rpc_listen")]
	pub rpc_listen: SocketAddr,

	/// Postgres connection string for the durable store.
	pub database_url: String,

	/// Connection pool size for the durable store.
	#[serde(default = "default_ds_pool_size")]
	pub database_pool_size: u32,

	/// Redis connection string for the ephemeral state store.
	pub redis_url: String,

	/// Connection pool size for the ephemeral state store.
	#[serde(default = "default_ess_pool_size")]
	pub redis_pool_size: u32,

	/// How long a room stays `AWAITING_HOST` before it is torn down.
	#[serde(default = "default_grace_window", with = "humantime_serde")]
	pub host_grace_window: Duration,

	/// Bounded capacity of each member's outbound event queue.
	#[serde(default = "default_queue_capacity")]
	pub outbound_queue_capacity: usize,

	/// gRPC keepalive ping interval.
	#[serde(default = "default_keepalive_interval", with = "humantime_serde")]
	pub keepalive_interval: Duration,

	/// gRPC keepalive ping timeout.
	#[serde(default = "default_keepalive_timeout", with = "humantime_serde")]
	pub keepalive_timeout: Duration,

	/// Who may add tracks to a room's queue.
	#[serde(default)]
	pub queue_add_policy: QueueAddPolicy,

	/// `tracing-subscriber` env-filter directives.
	#[serde(default = "default_log")]
	pub log: String,
}

impl Config {
	/// Loads configuration from an optional TOML file plus `SYNQIT_`-prefixed
	/// environment variables, the latter taking precedence.
	pub fn load(path: Option<&std::path::Path>) -> Result<Self> {
		let mut figment = Figment::new();
		if let Some(path) = path {
			figment = figment.merge(Toml::file(path));
		}
		figment = figment.merge(Env::prefixed("SYNQIT_").split("_"));

		let config: Self = figment.extract()?;
		config.check()?;
		Ok(config)
	}

	/// Cheap sanity checks run once at startup (`--check-config` uses this
	/// path without booting the server).
	pub fn check(&self) -> Result<()> {
		if self.outbound_queue_capacity == 0 {
			return Err(crate::Error::Invalid("outbound_queue_capacity must be > 0".to_owned()));
		}
		if self.host_grace_window.is_zero() {
			return Err(crate::Error::Invalid("host_grace_window must be > 0".to_owned()));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn queue_add_policy_defaults_host_only() {
		assert_eq!(QueueAddPolicy::default(), QueueAddPolicy::HostOnly);
	}

	#[test]
	fn check_rejects_zero_capacity() {
		let config = Config {
			rpc_listen: default_rpc_listen(),
			database_url: "postgres://localhost/synqit".to_owned(),
			database_pool_size: default_ds_pool_size(),
			redis_url: "redis://localhost".to_owned(),
			redis_pool_size: default_ess_pool_size(),
			host_grace_window: default_grace_window(),
			outbound_queue_capacity: 0,
			keepalive_interval: default_keepalive_interval(),
			keepalive_timeout: default_keepalive_timeout(),
			queue_add_policy: QueueAddPolicy::default(),
			log: default_log(),
		};

		assert!(config.check().is_err());
	}
}
