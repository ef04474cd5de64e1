//! Key Deck Daemon
//!
//! Renders the key faces described in `config.yaml` onto the first attached
//! Stream Deck and runs the configured shell command when a key is pressed.
//! SIGINT and SIGTERM reset the deck before exiting.

mod config;
mod dispatch;
mod rendering;
mod session;

use anyhow::{Context, Result};
use keydeck_hw::DeviceManager;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{Config, CONFIG_FILE_NAME};
use dispatch::{CommandDispatcher, ShellLauncher};
use rendering::KeyRenderer;
use session::DeckSession;

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let program_dir = config::program_dir()?;

    let manager = DeviceManager::new().context("Failed to initialize HID API")?;
    let deck = manager
        .open_first()
        .context("Failed to open Stream Deck")?;
    let session = DeckSession::start(deck)?;

    // Setup Unix signal handlers
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down");
            }
        }
    };

    serve(session, &program_dir, shutdown).await
}

/// Runs the session until `shutdown` resolves or startup fails, then resets
/// and closes the deck either way.
async fn serve(
    mut session: DeckSession,
    program_dir: &Path,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let result = run(&session, program_dir, shutdown).await;
    session.shutdown();
    result
}

/// Pushes the configured keys and serves presses until `shutdown` resolves.
async fn run(
    session: &DeckSession,
    program_dir: &Path,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let config = Config::load(program_dir).context("Failed to load configuration")?;
    info!(
        "Loaded configuration from: {}",
        program_dir.join(CONFIG_FILE_NAME).display()
    );

    let renderer = KeyRenderer::new(program_dir);
    let pushed = session.push_keys(&config, &renderer)?;
    info!("{} of {} configured keys pushed", pushed, config.len());

    let dispatcher = CommandDispatcher::new(&config, Arc::new(ShellLauncher::new()));
    session.install_dispatcher(dispatcher)?;
    info!("Waiting for key presses");

    shutdown.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keydeck_hw::mock::{MockPanel, MockTransport};
    use keydeck_hw::{Model, StreamDeck};
    use std::time::Duration;

    fn start(model: Model) -> (DeckSession, MockPanel) {
        let (transport, panel) = MockTransport::new(model);
        let deck = StreamDeck::with_transport(model, Box::new(transport));
        (DeckSession::start(deck).unwrap(), panel)
    }

    #[tokio::test]
    async fn test_missing_config_resets_and_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (session, panel) = start(Model::Mk2);
        session.deck().set_brightness(90).unwrap();

        let result = serve(session, dir.path(), std::future::pending()).await;
        assert!(result.is_err());
        assert!(panel.keys_with_images().is_empty());
        assert_eq!(panel.brightness(), Some(30));
        assert_eq!(panel.reset_count(), 2);
        assert!(panel.is_closed());
    }

    #[tokio::test]
    async fn test_shutdown_after_serving_presses() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("pressed");
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            format!(
                "keys:\n  0:\n    text: Hi\n  1:\n    command: \"touch '{}'\"\n",
                marker.display()
            ),
        )
        .unwrap();
        let (session, panel) = start(Model::Mk2);

        let shutdown = {
            let panel = panel.clone();
            let marker = marker.clone();
            async move {
                assert_eq!(panel.keys_with_images(), vec![0, 1]);
                panel.press(1);
                panel.release(1);
                for _ in 0..250 {
                    if marker.exists() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            }
        };

        serve(session, dir.path(), shutdown).await.unwrap();
        assert!(marker.exists());
        assert!(panel.keys_with_images().is_empty());
        assert_eq!(panel.brightness(), Some(30));
        assert!(panel.is_closed());
    }
}
