//! System clipboard access
//!
//! Failures are logged and swallowed: a missing clipboard (headless session,
//! no display server) must never take the terminal down.

use tracing::warn;

/// Put `text` on the clipboard. Empty text is not written.
pub fn copy(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    match arboard::Clipboard::new().and_then(|mut cb| cb.set_text(text.to_string())) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Clipboard write failed");
            false
        }
    }
}

/// Clipboard text, if there is any
pub fn paste() -> Option<String> {
    match arboard::Clipboard::new().and_then(|mut cb| cb.get_text()) {
        Ok(text) if !text.is_empty() => Some(text),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "Clipboard read failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_is_not_copied() {
        assert!(!copy(""));
    }
}
