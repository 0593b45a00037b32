use pong_server::config::ServerConfig;
use pong_server::game_loop::{run_lobby, LobbyCommand};
use pong_server::ws::{router, AppState};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid server configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        eprintln!("Invalid server configuration: {}", e);
        std::process::exit(1);
    }

    let listen_addr = config.listen_addr.clone();
    let shutdown = CancellationToken::new();

    let (lobby_tx, lobby_rx) = mpsc::channel::<LobbyCommand>(config.command_buffer);

    // Spawn lobby
    let app_state = AppState {
        lobby_tx,
        outbound_buffer: config.outbound_buffer,
        game: config.game,
    };
    let lobby_shutdown = shutdown.clone();
    let lobby = tokio::spawn(async move {
        run_lobby(lobby_rx, config, lobby_shutdown).await;
    });

    let app = router(app_state);

    tracing::info!("Starting pong server on {}", listen_addr);
    println!("Pong server listening on {}", listen_addr);

    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Failed to bind {}: {}", listen_addr, e);
            std::process::exit(1);
        }
    };

    let signal_token = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown requested");
            signal_token.cancel();
        })
        .await;
    if let Err(e) = served {
        tracing::error!("Server error: {}", e);
    }

    shutdown.cancel();
    let _ = lobby.await;
    tracing::info!("Pong server stopped");
}
