//! Device session.
//!
//! The session owns the open deck for the whole run. Every operation on the
//! device goes through it, and it always leaves the hardware in its default
//! state (images cleared, brightness 30) when it ends, including when it is
//! dropped during a panic.

use anyhow::{Context, Result};
use keydeck_hw::protocol::DEFAULT_BRIGHTNESS;
use keydeck_hw::{to_native_format, StreamDeck};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dispatch::CommandDispatcher;
use crate::rendering::KeyRenderer;

/// Owner of the open deck.
pub struct DeckSession {
    deck: StreamDeck,
}

impl DeckSession {
    /// Takes ownership of an open deck and puts it in its default state.
    pub fn start(deck: StreamDeck) -> Result<Self> {
        let session = Self { deck };
        session.reset_deck()?;
        Ok(session)
    }

    /// Returns the deck.
    #[cfg(test)]
    pub fn deck(&self) -> &StreamDeck {
        &self.deck
    }

    /// Clears all key images and restores the default brightness.
    pub fn reset_deck(&self) -> Result<()> {
        self.deck.reset().context("Failed to reset deck")?;
        self.deck
            .set_brightness(DEFAULT_BRIGHTNESS)
            .context("Failed to set brightness")?;
        Ok(())
    }

    /// Renders every configured key and pushes it to the device.
    ///
    /// Keys beyond the device's key count are skipped. Returns the number of
    /// keys pushed.
    pub fn push_keys(&self, config: &Config, renderer: &KeyRenderer) -> Result<usize> {
        let format = self.deck.key_image_format();
        let key_count = self.deck.key_count();
        let mut pushed = 0;

        for key in config.keys() {
            if key.index >= key_count {
                warn!(
                    "Key {} is configured but {} only has {} keys, skipping",
                    key.index,
                    self.deck.model(),
                    key_count
                );
                continue;
            }

            let image = renderer.render(format.size(), key);
            let native = to_native_format(&format, &image)
                .with_context(|| format!("Failed to encode key {}", key.index))?;
            self.deck
                .set_key_image(key.index, &native)
                .with_context(|| format!("Failed to push key {}", key.index))?;
            debug!("Key {} pushed", key.index);
            pushed += 1;
        }

        Ok(pushed)
    }

    /// Routes key presses to the dispatcher.
    pub fn install_dispatcher(&self, dispatcher: CommandDispatcher) -> Result<()> {
        self.deck
            .set_key_callback(move |key, pressed| dispatcher.on_key_event(key, pressed))
            .context("Failed to register key callback")?;
        Ok(())
    }

    /// Resets and closes the deck. Does nothing once the deck is closed.
    pub fn shutdown(&mut self) {
        if !self.deck.is_open() {
            return;
        }

        // Stop dispatching before touching the hardware.
        self.deck.clear_key_callback();
        if let Err(e) = self.reset_deck() {
            warn!("{:#}", e);
        }
        self.deck.close();
        info!("Deck reset and closed");
    }
}

impl Drop for DeckSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
