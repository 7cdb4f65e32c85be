// Text delivery: plain key events for printable ASCII, clipboard paste for
// everything else (CJK, emoji, accented letters).
use crate::errors::SeeClawResult;
use crate::executor::input::{shortcut_modifier, InputDevice, KeyToken};

/// True when `text` cannot be typed reliably with per-character key events.
pub fn needs_clipboard(text: &str) -> bool {
    text.chars()
        .any(|c| !(c.is_ascii_graphic() || c == ' ' || c == '\n' || c == '\t'))
}

/// Type `text` into the focused control, optionally clearing it first.
pub async fn deliver_text(input: &dyn InputDevice, text: &str, clear_first: bool) -> SeeClawResult<()> {
    if clear_first {
        input
            .key_combo(&[shortcut_modifier(), KeyToken::Char('a')])
            .await?;
        input.key_combo(&[KeyToken::Delete]).await?;
    }
    if text.is_empty() {
        return Ok(());
    }
    if needs_clipboard(text) {
        tracing::debug!(chars = text.chars().count(), "typing via clipboard paste");
        input.paste_text(text).await
    } else {
        input.type_text(text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_is_typed_everything_else_pasted() {
        assert!(!needs_clipboard("hello world 123!@#"));
        assert!(!needs_clipboard("line one\nline two"));
        assert!(needs_clipboard("你好"));
        assert!(needs_clipboard("café"));
        assert!(needs_clipboard("ok 👍"));
    }
}
