//! Sample driver for the connection pool.
//!
//! Builds a pool against `--address`, acquires a connection, sends one
//! length-prefixed message, prints the framed reply and hands the
//! connection back.
//!
//! ```bash
//! cargo run -p tcpool-demo -- --address 127.0.0.1:9998 --message hello
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tcpool::{Pool, PoolConfig, PoolError, PoolEvent};
use tcpool_frame::{HEADER_LEN, decode_header, encode_frame};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tcpool-demo", about = "Exchange one framed message over a pooled connection")]
struct Cli {
    /// Remote endpoint as host:port
    #[arg(long)]
    address: String,

    /// Number of pooled connections
    #[arg(long, default_value_t = 1)]
    capacity: u32,

    /// How long to wait for a connection, in milliseconds
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Read and connect timeout, in milliseconds
    #[arg(long, default_value_t = 1000)]
    io_timeout_ms: u64,

    /// Payload to send
    #[arg(long, default_value = "hello")]
    message: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let io_timeout = Duration::from_millis(cli.io_timeout_ms);

    let config = PoolConfig::new(&cli.address)
        .capacity(cli.capacity)
        .read_timeout(io_timeout)
        .connect_timeout(io_timeout);

    let pool = Pool::builder()
        .pool_config(config)
        .notifier(|event: PoolEvent| tracing::info!(%event, code = event.code(), "pool event"))
        .build()
        .context("failed to create connection pool")?;

    let result = exchange(&pool, &cli).await;
    pool.shutdown();

    let reply = result?;
    println!("{}", String::from_utf8_lossy(&reply));
    Ok(())
}

async fn exchange(pool: &Pool, cli: &Cli) -> Result<Vec<u8>> {
    let mut conn = match pool.get(Duration::from_millis(cli.timeout_ms)).await {
        Ok(conn) => conn,
        Err(e @ PoolError::AcquireTimeout(_)) => {
            return Err(e).context(format!("no connection to {} became available", cli.address));
        }
        Err(e) => return Err(e.into()),
    };

    tracing::info!(
        connection_id = conn.id(),
        local = ?conn.local_id(),
        "acquired connection"
    );

    conn.send_data(&encode_frame(cli.message.as_bytes())?).await?;
    let header = conn.read_data(HEADER_LEN, None).await?;
    let len = decode_header(&header)?;
    let reply = conn.read_data(len, None).await?;

    conn.close();
    Ok(reply)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use tcpool_testing::{ServerMode, TestServer, unreachable_address};

    fn pool_for(cli: &Cli) -> Pool {
        Pool::builder()
            .address(cli.address.clone())
            .capacity(cli.capacity)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_exchange_returns_framed_reply() {
        let server = TestServer::start(ServerMode::Framed).await.unwrap();
        let address = server.address();
        let cli = Cli::parse_from([
            "tcpool-demo",
            "--address",
            address.as_str(),
            "--message",
            "ping",
        ]);
        let pool = pool_for(&cli);

        let reply = exchange(&pool, &cli).await.unwrap();
        assert_eq!(reply, b"ping");
        pool.shutdown();
    }

    #[tokio::test]
    async fn test_exchange_timeout_carries_address() {
        let address = unreachable_address().await.unwrap();
        let cli = Cli::parse_from([
            "tcpool-demo",
            "--address",
            address.as_str(),
            "--timeout-ms",
            "100",
        ]);
        let pool = pool_for(&cli);

        let err = exchange(&pool, &cli).await.unwrap_err();
        assert!(err.to_string().contains(&address));
        assert!(matches!(
            err.downcast_ref::<PoolError>(),
            Some(PoolError::AcquireTimeout(_))
        ));
        pool.shutdown();
    }
}
