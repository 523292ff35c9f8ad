//! Key translation tables.
//!
//! Two wire encodings map onto the same abstract [`Key`] set: the
//! legacy numeric code (browser virtual-key style, opcode 1) and the
//! Unicode code point (opcode 85). Unmapped codes are dropped by
//! returning `None`; the session logs and moves on.

/// Key press direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Down,
    Up,
}

/// An abstract key, decoupled from any platform key-code space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// `a`..=`z`.
    Letter(char),
    /// `0`..=`9` on the main row.
    Digit(u8),
    /// `0`..=`9` on the numeric pad.
    Numpad(u8),
    /// F1..=F12 (stored as 1..=12).
    Function(u8),
    Backspace,
    Tab,
    Enter,
    ShiftLeft,
    CtrlLeft,
    AltLeft,
    CapsLock,
    Escape,
    Space,
    End,
    Home,
    Insert,
    Delete,
    MetaLeft,
    MetaRight,
    Menu,
    NumLock,
    ScrollLock,
    Semicolon,
    Equals,
    Comma,
    Minus,
    Period,
    Slash,
    Grave,
    LeftBracket,
    Backslash,
    RightBracket,
    Apostrophe,
}

/// A decoded key with its shift modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub key: Key,
    pub shift: bool,
}

impl KeyPress {
    fn plain(key: Key) -> Self {
        Self { key, shift: false }
    }

    fn shifted(key: Key) -> Self {
        Self { key, shift: true }
    }
}

/// Decodes a legacy key payload: action flag (0/3 = down, 1/4 = up,
/// anything else ignored) plus the remote numeric key code.
pub fn decode_legacy_key(flag: u8, code: u8) -> Option<(KeyAction, KeyPress)> {
    let action = match flag {
        0 | 3 => KeyAction::Down,
        1 | 4 => KeyAction::Up,
        _ => return None,
    };
    let key = legacy_key(code)?;
    Some((action, KeyPress::plain(key)))
}

fn legacy_key(code: u8) -> Option<Key> {
    Some(match code {
        65..=90 => Key::Letter((b'a' + (code - 65)) as char),
        48..=57 => Key::Digit(code - 48),
        96..=105 => Key::Numpad(code - 96),
        112..=123 => Key::Function(code - 111),
        8 => Key::Backspace,
        9 => Key::Tab,
        13 => Key::Enter,
        16 => Key::ShiftLeft,
        17 => Key::CtrlLeft,
        18 => Key::AltLeft,
        20 => Key::CapsLock,
        27 => Key::Escape,
        32 => Key::Space,
        35 => Key::End,
        36 => Key::Home,
        45 => Key::Insert,
        46 => Key::Delete,
        91 => Key::MetaLeft,
        92 => Key::MetaRight,
        93 => Key::Menu,
        144 => Key::NumLock,
        145 => Key::ScrollLock,
        186 => Key::Semicolon,
        187 => Key::Equals,
        188 => Key::Comma,
        189 => Key::Minus,
        190 => Key::Period,
        191 => Key::Slash,
        192 => Key::Grave,
        219 => Key::LeftBracket,
        220 => Key::Backslash,
        221 => Key::RightBracket,
        222 => Key::Apostrophe,
        _ => return None,
    })
}

/// Decodes a Unicode key payload: action flag (0 = down, else up) plus
/// a UTF-16 code unit. Characters outside the table are dropped.
pub fn decode_unicode_key(flag: u8, code_unit: u16) -> Option<(KeyAction, KeyPress)> {
    let action = if flag == 0 {
        KeyAction::Down
    } else {
        KeyAction::Up
    };
    let ch = char::from_u32(u32::from(code_unit))?;
    let press = unicode_press(ch)?;
    Some((action, press))
}

fn unicode_press(ch: char) -> Option<KeyPress> {
    Some(match ch {
        'a'..='z' => KeyPress::plain(Key::Letter(ch)),
        'A'..='Z' => KeyPress::shifted(Key::Letter(ch.to_ascii_lowercase())),
        '0'..='9' => KeyPress::plain(Key::Digit(ch as u8 - b'0')),
        ' ' => KeyPress::plain(Key::Space),
        '\n' | '\r' => KeyPress::plain(Key::Enter),
        '\t' => KeyPress::plain(Key::Tab),
        ',' => KeyPress::plain(Key::Comma),
        '.' => KeyPress::plain(Key::Period),
        ';' => KeyPress::plain(Key::Semicolon),
        ':' => KeyPress::shifted(Key::Semicolon),
        '+' => KeyPress::shifted(Key::Equals),
        '-' => KeyPress::plain(Key::Minus),
        '_' => KeyPress::shifted(Key::Minus),
        '=' => KeyPress::plain(Key::Equals),
        '/' => KeyPress::plain(Key::Slash),
        '?' => KeyPress::shifted(Key::Slash),
        '@' => KeyPress::shifted(Key::Digit(2)),
        '#' => KeyPress::shifted(Key::Digit(3)),
        '$' => KeyPress::shifted(Key::Digit(4)),
        '%' => KeyPress::shifted(Key::Digit(5)),
        '^' => KeyPress::shifted(Key::Digit(6)),
        '&' => KeyPress::shifted(Key::Digit(7)),
        '*' => KeyPress::shifted(Key::Digit(8)),
        '(' => KeyPress::shifted(Key::Digit(9)),
        ')' => KeyPress::shifted(Key::Digit(0)),
        '!' => KeyPress::shifted(Key::Digit(1)),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_letters_and_digits() {
        assert_eq!(
            decode_legacy_key(0, 65),
            Some((KeyAction::Down, KeyPress::plain(Key::Letter('a'))))
        );
        assert_eq!(
            decode_legacy_key(1, 90),
            Some((KeyAction::Up, KeyPress::plain(Key::Letter('z'))))
        );
        assert_eq!(
            decode_legacy_key(3, 53),
            Some((KeyAction::Down, KeyPress::plain(Key::Digit(5))))
        );
        assert_eq!(
            decode_legacy_key(4, 99),
            Some((KeyAction::Up, KeyPress::plain(Key::Numpad(3))))
        );
    }

    #[test]
    fn legacy_function_keys() {
        assert_eq!(
            decode_legacy_key(0, 112).unwrap().1.key,
            Key::Function(1)
        );
        assert_eq!(
            decode_legacy_key(0, 123).unwrap().1.key,
            Key::Function(12)
        );
    }

    #[test]
    fn legacy_specials() {
        assert_eq!(decode_legacy_key(0, 13).unwrap().1.key, Key::Enter);
        assert_eq!(decode_legacy_key(0, 27).unwrap().1.key, Key::Escape);
        assert_eq!(decode_legacy_key(0, 222).unwrap().1.key, Key::Apostrophe);
    }

    #[test]
    fn legacy_bad_flag_or_code_dropped() {
        assert_eq!(decode_legacy_key(7, 65), None);
        assert_eq!(decode_legacy_key(0, 200), None);
    }

    #[test]
    fn unicode_case_and_symbols() {
        assert_eq!(
            decode_unicode_key(0, u16::from(b'a')),
            Some((KeyAction::Down, KeyPress::plain(Key::Letter('a'))))
        );
        assert_eq!(
            decode_unicode_key(0, u16::from(b'A')),
            Some((KeyAction::Down, KeyPress::shifted(Key::Letter('a'))))
        );
        assert_eq!(
            decode_unicode_key(1, u16::from(b'@')),
            Some((KeyAction::Up, KeyPress::shifted(Key::Digit(2))))
        );
        assert_eq!(
            decode_unicode_key(0, u16::from(b'\n')).unwrap().1.key,
            Key::Enter
        );
    }

    #[test]
    fn unicode_unmapped_dropped() {
        assert_eq!(decode_unicode_key(0, 0x00E9), None); // 'é'
        assert_eq!(decode_unicode_key(0, 0x0007), None);
    }
}
