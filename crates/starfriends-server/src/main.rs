#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use futures::Stream;
use server::config::{CliArgs, ServerConfig};
use server::service::{
    Services, archiver::ArchiverService, database::DatabaseService, handler::FilmService,
    tokenizer::TokenizerService,
};
use server::telemetry::init_telemetry;
use server::trailers::TrailersLayer;
use starfriends_core::proto::{
    FILE_DESCRIPTOR_SET, archiver_server::ArchiverServer, database_server::DatabaseServer,
    starfriends_server::StarfriendsServer, tokenizer_server::TokenizerServer,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Connected;
use tonic::{codec::CompressionEncoding, transport::Server};
use tonic_health::server::HealthReporter;
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Accepts and offers every compression scheme tonic was built with.
macro_rules! compressed {
    ($server:expr) => {
        $server
            .send_compressed(CompressionEncoding::Zstd)
            .send_compressed(CompressionEncoding::Gzip)
            .send_compressed(CompressionEncoding::Deflate)
            .accept_compressed(CompressionEncoding::Zstd)
            .accept_compressed(CompressionEncoding::Gzip)
            .accept_compressed(CompressionEncoding::Deflate)
    };
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;
    let services = Services::new(&config);

    let result = if config.uds {
        #[cfg(unix)]
        {
            use tokio::net::UnixListener;
            use tokio_stream::wrappers::UnixListenerStream;
            let uds_path = config.server_addr.clone();
            let uds = UnixListener::bind(&uds_path)?;
            let incoming = UnixListenerStream::new(uds);
            log_startup_info(&uds_path, &config);
            let res = run_server_with_incoming(incoming, services, shutdown_signal()).await;
            // Best effort to clean up the socket file; a panic
            // leaves it behind.
            let _ = std::fs::remove_file(&uds_path);
            res
        }
        #[cfg(not(unix))]
        {
            anyhow::bail!("Unix domain sockets are not supported on this platform");
        }
    } else {
        let tcp_path = config.server_addr.clone();
        let tcp = TcpListener::bind(&tcp_path).await?;
        let incoming = TcpListenerStream::new(tcp);
        log_startup_info(&tcp_path, &config);
        run_server_with_incoming(incoming, services, shutdown_signal()).await
    };

    providers.shutdown();
    result
}

/// Serves every Starfriends service on `incoming` until `signal` resolves,
/// then shuts down gracefully.
async fn run_server_with_incoming<I, IO, IE, F>(
    incoming: I,
    services: Services,
    signal: F,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
    F: Future<Output = ()>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    set_serving(&health_reporter, true).await;

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let shutdown = {
        let services = services.clone();
        let health_reporter = health_reporter.clone();
        async move {
            signal.await;
            tracing::info!("Shutdown signal received, terminating gracefully...");

            // 1. Publish the status
            set_serving(&health_reporter, false).await;

            // 2. Drain, then cancel, in-flight streams
            services.shutdown().await;
        }
    };

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any)
                        .expose_headers(Any),
                )
                .layer(GrpcWebLayer::new())
                .layer(TrailersLayer),
        )
        .add_service(health_service)
        .add_service(reflection)
        .add_service(compressed!(StarfriendsServer::new(services.films)))
        .add_service(compressed!(ArchiverServer::new(services.archiver)))
        .add_service(compressed!(DatabaseServer::new(services.database)))
        .add_service(compressed!(TokenizerServer::new(services.tokenizer)))
        .serve_with_incoming_shutdown(incoming, shutdown)
        .await?;

    tracing::info!("Service shut down successfully");
    Ok(())
}

async fn set_serving(reporter: &HealthReporter, serving: bool) {
    if serving {
        reporter.set_serving::<StarfriendsServer<FilmService>>().await;
        reporter.set_serving::<ArchiverServer<ArchiverService>>().await;
        reporter.set_serving::<DatabaseServer<DatabaseService>>().await;
        reporter.set_serving::<TokenizerServer<TokenizerService>>().await;
    } else {
        reporter
            .set_not_serving::<StarfriendsServer<FilmService>>()
            .await;
        reporter
            .set_not_serving::<ArchiverServer<ArchiverService>>()
            .await;
        reporter
            .set_not_serving::<DatabaseServer<DatabaseService>>()
            .await;
        reporter
            .set_not_serving::<TokenizerServer<TokenizerService>>()
            .await;
    }
}

fn log_startup_info(addr: &str, config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting Starfriends service on {} with full config: {:#?}",
            addr,
            config
        );
    } else {
        tracing::info!(
            "Starting Starfriends service on {} (search pacing {:?}, token delay {:?})",
            addr,
            config.search_pacing,
            config.token_delay
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
}
