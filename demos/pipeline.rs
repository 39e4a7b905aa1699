//! Pipelining demo against a live server.
//!
//! ```text
//! REDIS_ADDR=127.0.0.1:6379 RUST_LOG=resp3_client=debug cargo run --example pipeline
//! ```

use resp3_client::{Batch, Command, ConnectionBuilder, Result, Status};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let addr = std::env::var("REDIS_ADDR").unwrap_or_else(|_| "127.0.0.1:6379".to_string());
    let (conn, mut pushes) = ConnectionBuilder::new()
        .setup(Command::new("HELLO").arg(3))
        .connect_tcp(addr.as_str())
        .await?;

    let (set, get): (Result<Status>, Result<String>) = conn
        .send_batch(
            Batch::new()
                .command(Command::new("SET").arg("resp3:demo").arg("hello"))
                .command(Command::new("GET").arg("resp3:demo")),
        )
        .await?;
    println!("SET -> {:?}", set);
    println!("GET -> {:?}", get);

    // Many tasks, one connection.
    let mut tasks = Vec::new();
    for i in 0..10 {
        let conn = conn.clone();
        tasks.push(tokio::spawn(async move {
            conn.send::<i64>(Command::new("INCR").arg("resp3:counter"))
                .await
                .map(|n| (i, n))
        }));
    }
    for task in tasks {
        match task.await {
            Ok(Ok((i, n))) => println!("task {} -> {}", i, n),
            Ok(Err(e)) => println!("task failed: {}", e),
            Err(e) => println!("task panicked: {}", e),
        }
    }

    let missing: Option<String> = conn.send(Command::new("GET").arg("resp3:missing")).await?;
    println!("GET missing -> {:?}", missing);

    if let Err(e) = conn.send::<String>(Command::new("NOSUCHCOMMAND")).await {
        println!("server error ({}): {}", e.category(), e);
    }

    conn.drain().await;
    while let Some(push) = pushes.try_recv() {
        println!("push: {:?}", push);
    }
    Ok(())
}
