use std::collections::HashMap;
use std::time::Duration;

use lbpool::options::{ConnectionOptions, PoolOptions};
use lbpool::pool_manager::pool_mgr;
use lbpool::udbc::{QueryResult, Value};
use lbpool::udbc_memory::MemoryDriver;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Deserialize, Debug)]
struct Answer {
    answer: i64,
}

fn answer(_: &str, params: &[Value]) -> Result<QueryResult, lbpool::DbError> {
    let answer = params.first().cloned().unwrap_or(Value::I64(42));
    Ok(QueryResult {
        columns: vec!["answer".into()],
        rows: vec![HashMap::from([("answer".to_string(), answer)])],
        affected_rows: 0,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let driver = MemoryDriver::new()
        .latency(Duration::from_millis(50))
        .responder(answer);
    let pool = pool_mgr().create(
        "main",
        PoolOptions::new(4),
        ConnectionOptions::new().database("demo"),
        &driver,
    )?;
    pool.connect().await?;

    let pending: Vec<_> = (0..10i64)
        .map(|i| pool.query("SELECT ?", &(i,)))
        .collect();
    info!(load = ?pool.running_load(), "queries dispatched");

    let reservation = pool.reserve()?;
    info!(handle = reservation.id(), load = ?pool.running_load(), "connection reserved");
    let own = reservation.query("SELECT 1", Vec::new()).await?;
    info!(rows = own.row_count(), "private query finished");
    drop(reservation);

    for p in pending {
        let rows: Vec<Answer> = p.await?.map()?;
        info!(?rows, "query finished");
    }
    info!(load = ?pool.running_load(), "all queries settled");

    pool.close().await?;
    info!(states = ?pool.states(), "pool closed");
    Ok(())
}
