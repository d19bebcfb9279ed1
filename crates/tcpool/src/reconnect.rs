//! Background reconnection.
//!
//! A single coordinator drains the dead queue and spawns one attempt task
//! per entry, so slow dials never hold up the queue and no entry is ever
//! dequeued twice.

use std::sync::Arc;

use crate::connection::Connection;
use crate::pool::PoolInner;

/// Drain the dead queue until the pool shuts down.
pub(crate) async fn run(pool: Arc<PoolInner>) {
    loop {
        let next = tokio::select! {
            conn = pool.dead.pop() => conn,
            () = pool.shutdown_token.cancelled() => None,
        };
        let Some(conn) = next else {
            break;
        };

        if pool.is_closed() {
            pool.park(conn);
            break;
        }

        tokio::spawn(attempt(Arc::clone(&pool), conn));
    }

    tracing::info!(
        address = %pool.config.address,
        "reconnection loop exiting"
    );
}

/// Dial one dead connection; on failure back off and send it round again.
async fn attempt(pool: Arc<PoolInner>, mut conn: Connection) {
    let config = &pool.config;
    let result = conn
        .connect(&config.address, config.connect_timeout, config.keep_alive)
        .await;

    match result {
        Err(e) => {
            tracing::warn!(
                connection_id = conn.id(),
                address = %config.address,
                error = %e,
                "error connecting"
            );
            pool.record_connect_failure();

            tokio::select! {
                () = tokio::time::sleep(config.reconnect_delay) => {}
                () = pool.shutdown_token.cancelled() => {}
            }
            pool.park(conn);
        }
        Ok(()) => {
            if pool.is_closed() {
                conn.shutdown();
                pool.park(conn);
                return;
            }
            pool.activate(conn);
        }
    }
}
