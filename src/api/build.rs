fn main() -> Result<(), Box<dyn std::error::Error>> {
	let proto_dir = "../../proto";
	let protos = ["common.proto", "room.proto", "room_stream.proto", "streaming.proto"];

	tonic_build::configure().build_server(true).build_client(false).compile_protos(
		&protos.map(|p| format!("{proto_dir}/{p}")),
		&[proto_dir],
	)?;

	for proto in protos {
		println!("cargo:rerun-if-changed={proto_dir}/{proto}");
	}

	Ok(())
}
