//! ANSI colour helpers for `%x` substitutions
//!
//! Letter codes map onto the classic 8-colour SGR sequences (lowercase for
//! foreground and attributes, uppercase for background). `%x<spec>` and
//! `%x/<spec>` select xterm-256 colours, where the spec is `#rrggbb`, an
//! `r g b` triple, a 24-bit decimal value or a palette index.

/// Reset all attributes
pub const ANSI_NORMAL: &str = "\x1b[0m";

const ANSI_XTERM_FG: &str = "\x1b[38;5;";
const ANSI_XTERM_BG: &str = "\x1b[48;5;";

/// SGR sequence for a `%x` letter, `None` for letters with no meaning
pub fn ansi_letter(c: u8) -> Option<&'static str> {
    let code = match c {
        b'n' => "\x1b[0m",
        b'h' => "\x1b[1m",
        b'u' => "\x1b[4m",
        b'f' => "\x1b[5m",
        b'i' => "\x1b[7m",
        b'x' => "\x1b[30m",
        b'r' => "\x1b[31m",
        b'g' => "\x1b[32m",
        b'y' => "\x1b[33m",
        b'b' => "\x1b[34m",
        b'm' => "\x1b[35m",
        b'c' => "\x1b[36m",
        b'w' => "\x1b[37m",
        b'X' => "\x1b[40m",
        b'R' => "\x1b[41m",
        b'G' => "\x1b[42m",
        b'Y' => "\x1b[43m",
        b'B' => "\x1b[44m",
        b'M' => "\x1b[45m",
        b'C' => "\x1b[46m",
        b'W' => "\x1b[47m",
        _ => return None,
    };
    Some(code)
}

/// SGR sequence selecting xterm palette entry `index`
pub fn xterm_code(index: u8, background: bool) -> String {
    let prefix = if background { ANSI_XTERM_BG } else { ANSI_XTERM_FG };
    format!("{}{}m", prefix, index)
}

/// Convert a colour spec into an xterm-256 palette index
///
/// # Returns
/// `None` when the spec cannot be read as a colour
pub fn str2xterm(spec: &str) -> Option<u8> {
    if let Some(hex) = spec.strip_prefix('#') {
        let (rgb, used) = leading_number(hex, 16);
        if used == 0 {
            return None;
        }
        return Some(rgb2xterm(rgb));
    }

    let (r, used) = leading_number(spec, 10);
    if used == 0 {
        return None;
    }
    let rest = &spec[used..];
    if rest.is_empty() {
        return Some(if r < 256 { r as u8 } else { rgb2xterm(r) });
    }

    let rest = rest.trim_start_matches(|c: char| !c.is_ascii_digit());
    let (g, used) = leading_number(rest, 10);
    if used == 0 {
        return None;
    }
    let rest = rest[used..].trim_start_matches(|c: char| !c.is_ascii_digit());
    let (b, used) = leading_number(rest, 10);
    if used == 0 {
        return None;
    }
    Some(rgb2xterm(((r & 0xff) << 16) | ((g & 0xff) << 8) | (b & 0xff)))
}

/// Map a 24-bit RGB value to the nearest xterm-256 palette index
pub fn rgb2xterm(rgb: u32) -> u8 {
    const STANDARD: [u32; 16] = [
        0x000000, 0x800000, 0x008000, 0x808000, 0x000080, 0x800080, 0x008080, 0xc0c0c0,
        0x808080, 0xff0000, 0x00ff00, 0xffff00, 0x0000ff, 0xff00ff, 0x00ffff, 0xffffff,
    ];
    if let Some(index) = STANDARD.iter().position(|&c| c == rgb) {
        return index as u8;
    }

    let r = (rgb >> 16) & 0xff;
    let g = (rgb >> 8) & 0xff;
    let b = rgb & 0xff;

    // Greyscale ramp 232..=255 covers 0x08 to 0xee in steps of 10.
    if r == g && r == b && r <= 0xee {
        let step = if r <= 0x08 { 0 } else { (r - 0x08 + 9) / 10 };
        return 232 + step.min(23) as u8;
    }

    let xterm = (r / 51) * 36 + (g / 51) * 6 + (b / 51) + 16;
    xterm.clamp(16, 231) as u8
}

fn leading_number(text: &str, radix: u32) -> (u32, usize) {
    let used = text
        .char_indices()
        .take_while(|(_, c)| c.is_digit(radix))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    let value = u32::from_str_radix(&text[..used], radix).unwrap_or(u32::MAX);
    (value, used)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters() {
        assert_eq!(ansi_letter(b'r'), Some("\x1b[31m"));
        assert_eq!(ansi_letter(b'R'), Some("\x1b[41m"));
        assert_eq!(ansi_letter(b'n'), Some(ANSI_NORMAL));
        assert_eq!(ansi_letter(b'q'), None);
    }

    #[test]
    fn test_str2xterm_forms() {
        assert_eq!(str2xterm("196"), Some(196));
        assert_eq!(str2xterm("#ff0000"), Some(9));
        assert_eq!(str2xterm("255 0 0"), Some(9));
        assert_eq!(str2xterm("red"), None);
        assert_eq!(str2xterm("#"), None);
    }

    #[test]
    fn test_rgb2xterm_grey_and_cube() {
        assert_eq!(rgb2xterm(0x080808), 232);
        assert_eq!(rgb2xterm(0x121212), 233);
        assert_eq!(rgb2xterm(0xeeeeee), 255);
        assert_eq!(rgb2xterm(0x5f87af), 67);
    }

    #[test]
    fn test_xterm_code() {
        assert_eq!(xterm_code(9, false), "\x1b[38;5;9m");
        assert_eq!(xterm_code(21, true), "\x1b[48;5;21m");
    }
}
