//! Logs room chat with the speaker's name, using the room manager.

use tether::extension::{ExtInfo, Extension};
use tether::managers::room::{ChatType, RoomManager};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let ext = Extension::new(ExtInfo {
        title: "Chat Logger".into(),
        author: "tether".into(),
        version: "1.0".into(),
        description: "demo: logs room chat".into(),
        ..Default::default()
    });

    let room = RoomManager::new(&ext).expect("register room manager");
    room.entered(|args| match &args.info {
        Some(info) => tracing::info!(id = args.id, name = %info.name, "entered room"),
        None => tracing::info!(id = args.id, "entered room"),
    });
    room.entity_chat(|args| {
        let indicator = match args.chat_type {
            ChatType::Talk => "-",
            ChatType::Whisper => "*",
            ChatType::Shout => "!",
        };
        tracing::info!("[{}] {}: {}", indicator, args.entity.name, args.message);
    });
    room.left(|args| tracing::info!(id = args.id, "left room"));

    if let Err(err) = ext.run().await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}
