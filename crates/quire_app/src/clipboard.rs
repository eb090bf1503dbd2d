//! System clipboard backed by `arboard`.

use anyhow::Context;
use quire_ui::clipboard::Clipboard;

/// Opens the platform clipboard for each copy; some platforms drop the
/// contents when the handle goes away, so nothing is cached.
#[derive(Debug, Default)]
pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn set_text(&mut self, text: &str) -> anyhow::Result<()> {
        let mut clipboard = arboard::Clipboard::new().context("Clipboard unavailable")?;
        clipboard
            .set_text(text)
            .context("Failed to write to clipboard")?;
        Ok(())
    }
}
