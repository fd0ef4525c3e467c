//! Bridge demo over the in-memory protocol stack.
//!
//! Starts the broker layer on the configured endpoint (see `RpcConfig::from_env`,
//! port 0 by default here), lets the loopback stack play the messaging server,
//! and drives both remote commands through a TCP client.
//!
//! Run with: cargo run --example bridge_memory
//!
//! Set `RUST_LOG=debug` to watch the correlation at work.

use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

use yowsup_rpc_bridge::{
    // ---
    create_memory_stack,
    spawn_loopback,
    BrokerLayer,
    EntityHandler,
    Jid,
    LayerEvent,
    RpcConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = RpcConfig::from_env()?;
    if std::env::var("BRIDGE_RPC_ADDR").is_err() {
        config = config.with_bind_addr("127.0.0.1:0");
    }

    // ---
    // Stack, bridge and server
    let (stack, outbox) = create_memory_stack();
    let layer = Arc::new(BrokerLayer::new(config, stack));
    let handler: Arc<dyn EntityHandler> = layer.clone();
    spawn_loopback(outbox, Jid::normalize("49170000000"), Arc::downgrade(&handler));

    layer.on_event(&LayerEvent::Start).await?;
    let addr = layer
        .server()
        .local_addr()
        .ok_or_else(|| anyhow::anyhow!("server did not bind"))?;

    // ---
    // Remote caller
    let stream = TcpStream::connect(addr).await?;
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let requests = [
        json!({"cmd": "message_send", "number": "49176123456", "msg": "How are you? :)"}),
        json!({
            "cmd": "group_create",
            "subject": "Lets discuss about nerdy topics",
            "numbers": "49176123456,49175654321"
        }),
        json!({"cmd": "contact_sync"}),
    ];

    for request in requests {
        writer.write_all(format!("{request}\n").as_bytes()).await?;
        let reply: Value = match lines.next_line().await? {
            Some(line) => serde_json::from_str(&line)?,
            None => anyhow::bail!("server hung up"),
        };
        println!("{} -> {reply}", request["cmd"]);
    }

    drop(writer);
    layer.on_event(&LayerEvent::Stop).await?;
    layer.shutdown().await;

    Ok(())
}
