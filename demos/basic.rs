//! A minimal extension: logs lifecycle events and blocks a chat message
//! when it starts with a colon.

use tether::extension::{ExtInfo, Extension};
use tether::protocol::{Direction, Identifier};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tether=debug".into()),
        )
        .init();

    let ext = Extension::new(ExtInfo {
        title: "Tether".into(),
        author: "tether".into(),
        version: "1.0".into(),
        description: "demo: basic".into(),
        ..Default::default()
    });

    ext.on_initialized(|args| {
        tracing::info!(connected = args.connected, "extension initialized");
    });
    ext.on_activated(|| tracing::info!("extension activated"));
    ext.on_connected(|args| {
        tracing::info!(
            host = %args.host,
            port = args.port,
            client = %args.client.client_type,
            messages = args.messages.len(),
            "game connected"
        );
    });
    ext.on_disconnected(|| tracing::info!("game disconnected"));

    ext.intercept([Identifier::new(Direction::Out, "Chat")])
        .with(|e| {
            e.packet.skip::<i16>()?;
            let message = e.packet.read_string()?;
            if message.starts_with(':') {
                e.block();
                tracing::info!(%message, "blocked command message");
            }
            Ok(())
        })
        .expect("register chat intercept");

    if let Err(err) = ext.run().await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
