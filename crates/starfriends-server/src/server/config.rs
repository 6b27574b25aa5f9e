use anyhow::bail;
use clap::Parser;
use core::time::Duration;

use crate::server::streaming::search::Pacing;

/// Runtime configuration for the `starfriends-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first). The pacing delays only simulate latency and
/// can be set to zero.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "starfriends-server",
    version,
    about = "A gRPC film catalogue demonstrating unary and streaming calls"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/starfriends.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Delay before the first search result, in milliseconds.
    ///
    /// Environment variable: `SEARCH_INITIAL_DELAY_MS`
    #[arg(long, env = "SEARCH_INITIAL_DELAY_MS", default_value_t = 2_000)]
    pub search_initial_delay_ms: u64,

    /// Delay between consecutive search results, in milliseconds.
    ///
    /// Environment variable: `SEARCH_INTERVAL_MS`
    #[arg(long, env = "SEARCH_INTERVAL_MS", default_value_t = 1_000)]
    pub search_interval_ms: u64,

    /// Simulated work per token while tokenizing, in milliseconds.
    ///
    /// Environment variable: `TOKEN_DELAY_MS`
    #[arg(long, env = "TOKEN_DELAY_MS", default_value_t = 100)]
    pub token_delay_ms: u64,

    /// Capacity of each server-to-client response buffer.
    ///
    /// A full buffer suspends the producing task until the client reads more,
    /// which is how a slow client pushes back.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Seconds to wait for in-flight streams to finish on shutdown before
    /// cancelling them.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,

    /// Start with an empty catalogue instead of the original trilogy.
    ///
    /// Environment variable: `EMPTY_STORE`
    #[arg(long, env = "EMPTY_STORE", default_value_t = false)]
    pub empty_store: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub search_pacing: Pacing,
    pub token_delay: Duration,
    pub stream_buffer_size: usize,
    pub shutdown_timeout: Duration,
    pub seed_store: bool,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if args.uds && args.server_addr.is_empty() {
            bail!("SERVER_ADDR must name a socket path when --uds is set");
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            search_pacing: Pacing {
                initial: Duration::from_millis(args.search_initial_delay_ms),
                between: Duration::from_millis(args.search_interval_ms),
            },
            token_delay: Duration::from_millis(args.token_delay_ms),
            stream_buffer_size: args.stream_buffer_size,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
            seed_store: !args.empty_store,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<ServerConfig> {
        let args = CliArgs::try_parse_from(
            core::iter::once("starfriends-server").chain(args.iter().copied()),
        )?;
        ServerConfig::try_from(args)
    }

    #[test]
    fn defaults_match_the_demo_pacing() {
        let config = parse(&[]).unwrap();

        assert_eq!(config.search_pacing.initial, Duration::from_secs(2));
        assert_eq!(config.search_pacing.between, Duration::from_secs(1));
        assert_eq!(config.token_delay, Duration::from_millis(100));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(3));
        assert!(config.seed_store);
        assert!(!config.uds);
    }

    #[test]
    fn pacing_can_be_disabled() {
        let config = parse(&[
            "--search-initial-delay-ms",
            "0",
            "--search-interval-ms",
            "0",
            "--token-delay-ms",
            "0",
            "--empty-store",
        ])
        .unwrap();

        assert_eq!(config.search_pacing, Pacing::default());
        assert_eq!(config.token_delay, Duration::ZERO);
        assert!(!config.seed_store);
    }

    #[test]
    fn rejects_an_empty_stream_buffer() {
        let err = parse(&["--stream-buffer-size", "0"]).unwrap_err();
        assert!(err.to_string().contains("STREAM_BUFFER_SIZE"));
    }
}
