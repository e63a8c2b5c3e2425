use clap::Parser;
use simse_commerce_engine::config::CliArgs;
use simse_commerce_engine::server::CommerceServer;
use simse_commerce_engine::transport::NdjsonTransport;

fn main() {
	let args = CliArgs::parse();

	// stdout carries the protocol, so logs go to stderr
	tracing_subscriber::fmt()
		.with_writer(std::io::stderr)
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
		)
		.init();

	let config = args.engine_config();
	tracing::info!(
		clusters = config.clusters,
		max_iterations = config.max_iterations,
		dimensions = config.dimensions,
		vectorizer = ?config.vectorizer,
		"Engine configuration"
	);

	let transport = NdjsonTransport::new();
	let mut server = CommerceServer::new(transport, config);

	if let Some(path) = &args.data {
		match server.initialize_from_path(path) {
			Ok(products) => tracing::info!(path = %path.display(), products, "Dataset preloaded"),
			Err(e) => {
				tracing::error!("Failed to load {}: {}", path.display(), e);
				std::process::exit(1);
			}
		}
	}

	tracing::info!("simse-commerce-engine ready");

	if let Err(e) = server.run() {
		tracing::error!("Server error: {}", e);
		std::process::exit(1);
	}
}
