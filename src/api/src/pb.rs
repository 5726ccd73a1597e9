//! Generated protobuf/gRPC bindings, compiled by `build.rs` from `proto/`.

pub mod common {
	pub mod v1 {
		tonic::include_proto!("synqit.common.v1");
	}
}

pub mod room {
	pub mod v1 {
		tonic::include_proto!("synqit.room.v1");
	}
}

pub mod roomstream {
	pub mod v1 {
		tonic::include_proto!("synqit.roomstream.v1");
	}
}

pub mod streaming {
	pub mod v1 {
		tonic::include_proto!("synqit.streaming.v1");
	}
}
