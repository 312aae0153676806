//! Color parsing for the layout document's CSS-flavored color strings.

/// Straight-alpha RGBA8 color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const BLACK: Self = Self::opaque(0, 0, 0);
    pub const WHITE: Self = Self::opaque(255, 255, 255);
    pub const TRANSPARENT: Self = Self {
        r: 0,
        g: 0,
        b: 0,
        a: 0,
    };

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Premultiply a channel by alpha with round-to-nearest.
    pub fn premultiplied(self) -> [u8; 4] {
        fn premul(c: u8, a: u8) -> u8 {
            (((u16::from(c) * u16::from(a)) + 127) / 255) as u8
        }
        [
            premul(self.r, self.a),
            premul(self.g, self.a),
            premul(self.b, self.a),
            self.a,
        ]
    }
}

/// Parse a document color string.
///
/// Accepted forms: `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(r, g, b)`,
/// `rgba(r, g, b, a)` with alpha in `0..=1`, and a small set of named
/// colors. Returns `None` when the string cannot be interpreted.
pub fn parse_color(input: &str) -> Option<Rgba8> {
    let s = input.trim().to_ascii_lowercase();

    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex);
    }
    if let Some(body) = s.strip_prefix("rgba(").and_then(|r| r.strip_suffix(')')) {
        return parse_rgba_body(body);
    }
    if let Some(body) = s.strip_prefix("rgb(").and_then(|r| r.strip_suffix(')')) {
        return parse_rgb_body(body);
    }

    match s.as_str() {
        "black" => Some(Rgba8::BLACK),
        "white" => Some(Rgba8::WHITE),
        "red" => Some(Rgba8::opaque(255, 0, 0)),
        "green" => Some(Rgba8::opaque(0, 128, 0)),
        "blue" => Some(Rgba8::opaque(0, 0, 255)),
        "transparent" => Some(Rgba8::TRANSPARENT),
        _ => None,
    }
}

fn parse_hex(hex: &str) -> Option<Rgba8> {
    let nibble = |c: u8| char::from(c).to_digit(16).map(|d| d as u8);
    let byte_at = |i: usize| -> Option<u8> {
        let hi = nibble(*hex.as_bytes().get(i)?)?;
        let lo = nibble(*hex.as_bytes().get(i + 1)?)?;
        Some(hi << 4 | lo)
    };

    match hex.len() {
        3 => {
            let expand = |i: usize| nibble(hex.as_bytes()[i]).map(|d| d << 4 | d);
            Some(Rgba8::opaque(expand(0)?, expand(1)?, expand(2)?))
        }
        6 => Some(Rgba8::opaque(byte_at(0)?, byte_at(2)?, byte_at(4)?)),
        8 => Some(Rgba8 {
            r: byte_at(0)?,
            g: byte_at(2)?,
            b: byte_at(4)?,
            a: byte_at(6)?,
        }),
        _ => None,
    }
}

fn parse_rgb_body(body: &str) -> Option<Rgba8> {
    let mut parts = body.split(',').map(str::trim);
    let r = parts.next()?.parse::<u8>().ok()?;
    let g = parts.next()?.parse::<u8>().ok()?;
    let b = parts.next()?.parse::<u8>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(Rgba8::opaque(r, g, b))
}

fn parse_rgba_body(body: &str) -> Option<Rgba8> {
    let mut parts = body.split(',').map(str::trim);
    let r = parts.next()?.parse::<u8>().ok()?;
    let g = parts.next()?.parse::<u8>().ok()?;
    let b = parts.next()?.parse::<u8>().ok()?;
    let a_float = parts.next()?.parse::<f64>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let a = (a_float.clamp(0.0, 1.0) * 255.0).round() as u8;
    Some(Rgba8 { r, g, b, a })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_forms() {
        assert_eq!(parse_color("#fff"), Some(Rgba8::WHITE));
        assert_eq!(parse_color("#FF0000"), Some(Rgba8::opaque(255, 0, 0)));
        assert_eq!(
            parse_color("#11223344"),
            Some(Rgba8 {
                r: 0x11,
                g: 0x22,
                b: 0x33,
                a: 0x44
            })
        );
    }

    #[test]
    fn parses_functional_forms() {
        assert_eq!(parse_color("rgb(1, 2, 3)"), Some(Rgba8::opaque(1, 2, 3)));
        assert_eq!(
            parse_color("rgba(10, 20, 30, 0.5)"),
            Some(Rgba8 {
                r: 10,
                g: 20,
                b: 30,
                a: 128
            })
        );
        // Alpha outside 0..1 is clamped, not rejected.
        assert_eq!(
            parse_color("rgba(0, 0, 0, 4.0)").map(|c| c.a),
            Some(255)
        );
    }

    #[test]
    fn parses_named_colors() {
        assert_eq!(parse_color("  Black "), Some(Rgba8::BLACK));
        assert_eq!(parse_color("green"), Some(Rgba8::opaque(0, 128, 0)));
        assert_eq!(parse_color("transparent"), Some(Rgba8::TRANSPARENT));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_color("#12"), None);
        assert_eq!(parse_color("rgb(300, 0, 0)"), None);
        assert_eq!(parse_color("chartreuse-ish"), None);
        assert_eq!(parse_color("rgb(1,2,3,4)"), None);
    }

    #[test]
    fn premultiply_rounds_to_nearest() {
        let c = Rgba8 {
            r: 255,
            g: 128,
            b: 0,
            a: 128,
        };
        assert_eq!(c.premultiplied(), [128, 64, 0, 128]);
    }
}
