/// Physical input simulation.
use async_trait::async_trait;

use crate::agent_engine::state::ScrollDirection;
use crate::errors::{SeeClawError, SeeClawResult};
use crate::executor::coordinator::PhysicalPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
}

/// One key of a hotkey combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyToken {
    Ctrl,
    Shift,
    Alt,
    /// Windows / Command / Super.
    Meta,
    Enter,
    Tab,
    Escape,
    Backspace,
    Delete,
    Space,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    /// F1–F12.
    F(u8),
    Char(char),
}

impl KeyToken {
    pub fn parse(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        let key = match lower.as_str() {
            "ctrl" | "control" => KeyToken::Ctrl,
            "shift" => KeyToken::Shift,
            "alt" | "option" => KeyToken::Alt,
            "win" | "windows" | "meta" | "cmd" | "command" | "super" => KeyToken::Meta,
            "enter" | "return" => KeyToken::Enter,
            "tab" => KeyToken::Tab,
            "esc" | "escape" => KeyToken::Escape,
            "backspace" => KeyToken::Backspace,
            "delete" | "del" => KeyToken::Delete,
            "space" => KeyToken::Space,
            "up" => KeyToken::Up,
            "down" => KeyToken::Down,
            "left" => KeyToken::Left,
            "right" => KeyToken::Right,
            "home" => KeyToken::Home,
            "end" => KeyToken::End,
            "pageup" | "pgup" => KeyToken::PageUp,
            "pagedown" | "pgdn" => KeyToken::PageDown,
            other => {
                if let Some(n) = other.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
                    if (1..=12).contains(&n) {
                        return Some(KeyToken::F(n));
                    }
                    return None;
                }
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if !c.is_whitespace() => KeyToken::Char(c),
                    _ => return None,
                }
            }
        };
        Some(key)
    }

    pub fn is_modifier(self) -> bool {
        matches!(self, KeyToken::Ctrl | KeyToken::Shift | KeyToken::Alt | KeyToken::Meta)
    }
}

/// `"ctrl+shift+s"` → `[Ctrl, Shift, Char('s')]`.
pub fn parse_key_combo(keys: &str) -> SeeClawResult<Vec<KeyToken>> {
    let combo = keys
        .split('+')
        .map(|part| {
            KeyToken::parse(part)
                .ok_or_else(|| SeeClawError::Executor(format!("unknown key '{}' in '{keys}'", part.trim())))
        })
        .collect::<SeeClawResult<Vec<_>>>()?;
    if combo.is_empty() || combo.iter().all(|k| k.is_modifier()) {
        return Err(SeeClawError::Executor(format!("'{keys}' has no non-modifier key")));
    }
    Ok(combo)
}

/// Primary shortcut modifier on this platform (Cmd on macOS, Ctrl elsewhere).
pub fn shortcut_modifier() -> KeyToken {
    if cfg!(target_os = "macos") {
        KeyToken::Meta
    } else {
        KeyToken::Ctrl
    }
}

/// Pointer and keyboard device. Exclusively used by the engine during a run.
#[async_trait]
pub trait InputDevice: Send + Sync {
    async fn click(&self, at: PhysicalPoint, button: MouseButton, clicks: u8) -> SeeClawResult<()>;

    /// Scroll by wheel notches, optionally after moving the pointer to `at`.
    async fn scroll(
        &self,
        at: Option<PhysicalPoint>,
        direction: ScrollDirection,
        notches: i32,
    ) -> SeeClawResult<()>;

    /// Type directly-typeable text with key events.
    async fn type_text(&self, text: &str) -> SeeClawResult<()>;

    /// Deliver text through the clipboard and a paste shortcut.
    async fn paste_text(&self, text: &str) -> SeeClawResult<()>;

    /// Press every key in order, then release them in reverse.
    async fn key_combo(&self, keys: &[KeyToken]) -> SeeClawResult<()>;
}

#[cfg(feature = "native")]
pub use native::EnigoInput;

#[cfg(feature = "native")]
mod native {
    use std::time::Duration;

    use async_trait::async_trait;
    use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

    use super::{shortcut_modifier, InputDevice, KeyToken, MouseButton};
    use crate::agent_engine::state::ScrollDirection;
    use crate::errors::{SeeClawError, SeeClawResult};
    use crate::executor::coordinator::PhysicalPoint;

    /// Settle time between clipboard writes and the paste shortcut.
    const CLIPBOARD_SETTLE: Duration = Duration::from_millis(80);

    /// `enigo` backed input. A fresh `Enigo` is created per action on a blocking thread.
    #[derive(Default)]
    pub struct EnigoInput;

    fn enigo_err(e: impl std::fmt::Display) -> SeeClawError {
        SeeClawError::Executor(format!("input: {e}"))
    }

    fn to_key(token: KeyToken) -> Key {
        match token {
            KeyToken::Ctrl => Key::Control,
            KeyToken::Shift => Key::Shift,
            KeyToken::Alt => Key::Alt,
            KeyToken::Meta => Key::Meta,
            KeyToken::Enter => Key::Return,
            KeyToken::Tab => Key::Tab,
            KeyToken::Escape => Key::Escape,
            KeyToken::Backspace => Key::Backspace,
            KeyToken::Delete => Key::Delete,
            KeyToken::Space => Key::Space,
            KeyToken::Up => Key::UpArrow,
            KeyToken::Down => Key::DownArrow,
            KeyToken::Left => Key::LeftArrow,
            KeyToken::Right => Key::RightArrow,
            KeyToken::Home => Key::Home,
            KeyToken::End => Key::End,
            KeyToken::PageUp => Key::PageUp,
            KeyToken::PageDown => Key::PageDown,
            KeyToken::F(n) => match n {
                1 => Key::F1,
                2 => Key::F2,
                3 => Key::F3,
                4 => Key::F4,
                5 => Key::F5,
                6 => Key::F6,
                7 => Key::F7,
                8 => Key::F8,
                9 => Key::F9,
                10 => Key::F10,
                11 => Key::F11,
                _ => Key::F12,
            },
            KeyToken::Char(c) => Key::Unicode(c),
        }
    }

    fn press_combo(enigo: &mut Enigo, keys: &[KeyToken]) -> SeeClawResult<()> {
        for &k in keys {
            enigo.key(to_key(k), Direction::Press).map_err(enigo_err)?;
        }
        for &k in keys.iter().rev() {
            enigo.key(to_key(k), Direction::Release).map_err(enigo_err)?;
        }
        Ok(())
    }

    async fn with_enigo<F>(job: F) -> SeeClawResult<()>
    where
        F: FnOnce(&mut Enigo) -> SeeClawResult<()> + Send + 'static,
    {
        tokio::task::spawn_blocking(move || {
            let mut enigo = Enigo::new(&Settings::default()).map_err(enigo_err)?;
            job(&mut enigo)
        })
        .await
        .map_err(|e| SeeClawError::Executor(format!("input task: {e}")))?
    }

    #[async_trait]
    impl InputDevice for EnigoInput {
        async fn click(&self, at: PhysicalPoint, button: MouseButton, clicks: u8) -> SeeClawResult<()> {
            let button = match button {
                MouseButton::Left => Button::Left,
                MouseButton::Right => Button::Right,
            };
            with_enigo(move |enigo| {
                enigo.move_mouse(at.x, at.y, Coordinate::Abs).map_err(enigo_err)?;
                for _ in 0..clicks.max(1) {
                    enigo.button(button, Direction::Click).map_err(enigo_err)?;
                }
                Ok(())
            })
            .await
        }

        async fn scroll(
            &self,
            at: Option<PhysicalPoint>,
            direction: ScrollDirection,
            notches: i32,
        ) -> SeeClawResult<()> {
            // enigo: positive = down / right.
            let (axis, amount) = match direction {
                ScrollDirection::Up => (Axis::Vertical, -notches),
                ScrollDirection::Down => (Axis::Vertical, notches),
                ScrollDirection::Left => (Axis::Horizontal, -notches),
                ScrollDirection::Right => (Axis::Horizontal, notches),
            };
            with_enigo(move |enigo| {
                if let Some(p) = at {
                    enigo.move_mouse(p.x, p.y, Coordinate::Abs).map_err(enigo_err)?;
                }
                enigo.scroll(amount, axis).map_err(enigo_err)
            })
            .await
        }

        async fn type_text(&self, text: &str) -> SeeClawResult<()> {
            let text = text.to_string();
            with_enigo(move |enigo| enigo.text(&text).map_err(enigo_err)).await
        }

        async fn paste_text(&self, text: &str) -> SeeClawResult<()> {
            let text = text.to_string();
            let modifier = shortcut_modifier();
            tokio::task::spawn_blocking(move || {
                let mut clipboard = arboard::Clipboard::new()
                    .map_err(|e| SeeClawError::Executor(format!("clipboard: {e}")))?;
                let previous = clipboard.get_text().ok();
                clipboard
                    .set_text(text)
                    .map_err(|e| SeeClawError::Executor(format!("clipboard write: {e}")))?;
                std::thread::sleep(CLIPBOARD_SETTLE);

                let mut enigo = Enigo::new(&Settings::default()).map_err(enigo_err)?;
                let pasted = press_combo(&mut enigo, &[modifier, KeyToken::Char('v')]);
                std::thread::sleep(CLIPBOARD_SETTLE);

                if let Some(prev) = previous {
                    if let Err(e) = clipboard.set_text(prev) {
                        tracing::warn!(error = %e, "failed to restore clipboard");
                    }
                }
                pasted
            })
            .await
            .map_err(|e| SeeClawError::Executor(format!("paste task: {e}")))?
        }

        async fn key_combo(&self, keys: &[KeyToken]) -> SeeClawResult<()> {
            let keys = keys.to_vec();
            with_enigo(move |enigo| press_combo(enigo, &keys)).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_combos() {
        assert_eq!(
            parse_key_combo("ctrl+shift+s").unwrap(),
            vec![KeyToken::Ctrl, KeyToken::Shift, KeyToken::Char('s')]
        );
        assert_eq!(parse_key_combo("Alt + F4").unwrap(), vec![KeyToken::Alt, KeyToken::F(4)]);
        assert_eq!(parse_key_combo("win+r").unwrap(), vec![KeyToken::Meta, KeyToken::Char('r')]);
        assert_eq!(parse_key_combo("enter").unwrap(), vec![KeyToken::Enter]);
    }

    #[test]
    fn rejects_unknown_and_modifier_only_combos() {
        assert!(parse_key_combo("ctrl+banana").is_err());
        assert!(parse_key_combo("ctrl+shift").is_err());
        assert!(parse_key_combo("f13").is_err());
        assert!(parse_key_combo("").is_err());
    }
}
