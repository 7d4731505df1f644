//! Browser key events → device-native input commands.
//!
//! The emulator's structured `sendKey` RPC is unreliable (broken in emulator
//! v36), so key input is injected through the adb command channel instead:
//! `input keyevent`, `input keycombination`, or `input text`. The Linux
//! desktop target has no structured input API at all and is driven with
//! `xdotool` over its container shell.
//!
//! Translation is pure: callers render the resulting [`KeyCommand`] to a
//! shell line and submit it to the matching [`crate::command::CommandChannel`].

/// Android `KEYCODE_CTRL_LEFT`.
const KEYCODE_CTRL_LEFT: u16 = 113;
/// Android `KEYCODE_SHIFT_LEFT`.
const KEYCODE_SHIFT_LEFT: u16 = 59;
/// Android `KEYCODE_ALT_LEFT`.
const KEYCODE_ALT_LEFT: u16 = 57;

/// Result of translating one browser key event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyCommand {
    /// Nothing to inject (key-up, pure modifier, unmappable multi-char key).
    None,
    /// A single named keycode, injected as `input keyevent <code>`.
    Keycode(u16),
    /// Modifier codes in (ctrl, shift, alt) order followed by the base code,
    /// injected as `input keycombination <codes...>`.
    Combination(Vec<u16>),
    /// A literal printable character, injected as `input text '<escaped>'`.
    Text(String),
}

/// Translate a browser key event into a device key command.
///
/// Key-up events are no-ops because `input keyevent` performs a full
/// press-release cycle on its own. When any of ctrl/shift/alt is set and the
/// base key resolves to an alphanumeric keycode, the combination form is
/// always used — never a plain keycode — so modifier state is preserved on
/// the device. Named-key lookup takes priority over the literal-character
/// fallback.
pub fn translate(event_type: &str, key: &str, ctrl: bool, shift: bool, alt: bool) -> KeyCommand {
    if event_type == "keyup" {
        return KeyCommand::None;
    }
    if is_modifier(key) {
        return KeyCommand::None;
    }

    if ctrl || shift || alt {
        if let Some(base) = char_keycode(key) {
            let mut codes = Vec::with_capacity(4);
            if ctrl {
                codes.push(KEYCODE_CTRL_LEFT);
            }
            if shift {
                codes.push(KEYCODE_SHIFT_LEFT);
            }
            if alt {
                codes.push(KEYCODE_ALT_LEFT);
            }
            codes.push(base);
            return KeyCommand::Combination(codes);
        }
    }

    if let Some(code) = named_keycode(key) {
        return KeyCommand::Keycode(code);
    }

    let mut chars = key.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        // e.key already accounts for Shift, so the character goes in as-is.
        return KeyCommand::Text(c.to_string());
    }

    KeyCommand::None
}

/// Render a [`KeyCommand`] to an adb shell line, or `None` for no-ops.
pub fn to_adb_line(cmd: &KeyCommand) -> Option<String> {
    match cmd {
        KeyCommand::None => None,
        KeyCommand::Keycode(code) => Some(format!("input keyevent {code}")),
        KeyCommand::Combination(codes) => {
            let joined = codes
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            Some(format!("input keycombination {joined}"))
        }
        KeyCommand::Text(text) => Some(format!("input text {}", shell_quote(text))),
    }
}

/// Single-quote a string for `sh`, escaping embedded quotes so a literal `'`
/// is injected correctly.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

/// Pure modifier keys produce no injection of their own.
fn is_modifier(key: &str) -> bool {
    matches!(
        key,
        "Shift" | "Control" | "Alt" | "Meta" | "CapsLock" | "NumLock" | "ScrollLock"
    )
}

/// Keycode for a single alphanumeric character (`KEYCODE_A` = 29,
/// `KEYCODE_0` = 7), used as the base of modifier combinations.
fn char_keycode(key: &str) -> Option<u16> {
    let mut chars = key.chars();
    let (c, rest) = (chars.next()?, chars.next());
    if rest.is_some() {
        return None;
    }
    let c = c.to_ascii_lowercase();
    match c {
        'a'..='z' => Some(c as u16 - 'a' as u16 + 29),
        '0'..='9' => Some(c as u16 - '0' as u16 + 7),
        _ => None,
    }
}

/// W3C `KeyboardEvent.key` names → Android keycodes.
fn named_keycode(key: &str) -> Option<u16> {
    let code = match key {
        "GoBack" => 4,
        "GoHome" => 3,
        "AppSwitch" => 187,
        "Power" => 26,
        "Enter" => 66,
        "Backspace" => 67,
        "Delete" => 112,
        "Tab" => 61,
        "Escape" => 111,
        "ArrowUp" => 19,
        "ArrowDown" => 20,
        "ArrowLeft" => 21,
        "ArrowRight" => 22,
        "Home" => 122,
        "End" => 123,
        "PageUp" => 92,
        "PageDown" => 93,
        "AudioVolumeUp" => 24,
        "AudioVolumeDown" => 25,
        "F1" => 131,
        "F2" => 132,
        "F3" => 133,
        "F4" => 134,
        "F5" => 135,
        "F6" => 136,
        "F7" => 137,
        "F8" => 138,
        "F9" => 139,
        "F10" => 140,
        "F11" => 141,
        "F12" => 142,
        _ => return None,
    };
    Some(code)
}

// ── Linux target (xdotool over the container shell) ────────────────────────

/// Browser key names → X11 keysyms accepted by `xdotool key`.
fn x11_keysym(key: &str) -> &str {
    match key {
        "ArrowUp" => "Up",
        "ArrowDown" => "Down",
        "ArrowLeft" => "Left",
        "ArrowRight" => "Right",
        "Backspace" => "BackSpace",
        "Enter" => "Return",
        "PageUp" => "Prior",
        "PageDown" => "Next",
        " " => "space",
        // Escape, Tab, Delete, Home, End, F1–F12 and raw keysyms pass through.
        other => other,
    }
}

/// Render a Linux key event to an `xdotool key` line, or `None` for pure
/// modifiers.
pub fn linux_key_line(key: &str, ctrl: bool, shift: bool, alt: bool) -> Option<String> {
    if is_modifier(key) {
        return None;
    }
    let mut combo = String::new();
    if ctrl {
        combo.push_str("ctrl+");
    }
    if shift {
        combo.push_str("shift+");
    }
    if alt {
        combo.push_str("alt+");
    }
    combo.push_str(x11_keysym(key));
    Some(format!("xdotool key --clearmodifiers {combo}"))
}

/// Render literal text typing to an `xdotool type` line.
pub fn linux_type_line(text: &str) -> String {
    format!("xdotool type --clearmodifiers -- {}", shell_quote(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyup_is_noop() {
        assert_eq!(translate("keyup", "a", false, false, false), KeyCommand::None);
    }

    #[test]
    fn test_modifier_alone_is_noop() {
        assert_eq!(translate("keydown", "Shift", false, true, false), KeyCommand::None);
        assert_eq!(translate("keydown", "Control", true, false, false), KeyCommand::None);
    }

    #[test]
    fn test_ctrl_shift_combination_ordering() {
        // ctrl+shift+a must be a combination with (ctrl, shift, base), never
        // a plain keycode.
        let cmd = translate("keydown", "a", true, true, false);
        assert_eq!(cmd, KeyCommand::Combination(vec![113, 59, 29]));
    }

    #[test]
    fn test_alt_combination() {
        let cmd = translate("keydown", "d", false, false, true);
        assert_eq!(cmd, KeyCommand::Combination(vec![57, 32]));
    }

    #[test]
    fn test_ctrl_digit_combination() {
        assert_eq!(
            translate("keydown", "0", true, false, false),
            KeyCommand::Combination(vec![113, 7])
        );
    }

    #[test]
    fn test_ctrl_with_unmappable_base_falls_through() {
        // Ctrl+Enter: no alphanumeric base code, so the named keycode wins.
        assert_eq!(
            translate("keydown", "Enter", true, false, false),
            KeyCommand::Keycode(66)
        );
    }

    #[test]
    fn test_named_key_priority_over_literal() {
        assert_eq!(translate("keypress", "GoBack", false, false, false), KeyCommand::Keycode(4));
        assert_eq!(translate("keydown", "F5", false, false, false), KeyCommand::Keycode(135));
    }

    #[test]
    fn test_printable_char_is_text() {
        assert_eq!(
            translate("keydown", "A", false, false, false),
            KeyCommand::Text("A".to_string())
        );
    }

    #[test]
    fn test_unknown_multichar_key_is_noop() {
        assert_eq!(translate("keydown", "MediaPlay", false, false, false), KeyCommand::None);
    }

    #[test]
    fn test_apostrophe_escaped() {
        let cmd = translate("keydown", "'", false, false, false);
        let line = to_adb_line(&cmd).unwrap();
        assert!(line.starts_with("input text "));
        assert!(line.contains("'\\''"));
    }

    #[test]
    fn test_adb_lines() {
        assert_eq!(to_adb_line(&KeyCommand::Keycode(66)).unwrap(), "input keyevent 66");
        assert_eq!(
            to_adb_line(&KeyCommand::Combination(vec![113, 50])).unwrap(),
            "input keycombination 113 50"
        );
        assert_eq!(to_adb_line(&KeyCommand::None), None);
    }

    #[test]
    fn test_linux_key_lines() {
        assert_eq!(
            linux_key_line("ArrowLeft", true, false, false).unwrap(),
            "xdotool key --clearmodifiers ctrl+Left"
        );
        assert_eq!(
            linux_key_line("v", true, true, false).unwrap(),
            "xdotool key --clearmodifiers ctrl+shift+v"
        );
        assert_eq!(linux_key_line("Shift", false, true, false), None);
    }

    #[test]
    fn test_linux_type_quotes_text() {
        assert_eq!(
            linux_type_line("it's"),
            "xdotool type --clearmodifiers -- 'it'\\''s'"
        );
    }
}
