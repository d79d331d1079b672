//! 3x5 bitmap font. Each glyph packs five 3-bit rows, top row in the high
//! bits. Lowercase draws as uppercase and accented Latin letters fold to
//! their base letter.

pub const GLYPH_WIDTH: i32 = 3;
pub const GLYPH_HEIGHT: i32 = 5;
pub const GLYPH_ADVANCE: i32 = GLYPH_WIDTH + 1;
pub const LINE_ADVANCE: i32 = GLYPH_HEIGHT + 2;

const fn pack(rows: [u16; 5]) -> u16 {
    (rows[0] << 12) | (rows[1] << 9) | (rows[2] << 6) | (rows[3] << 3) | rows[4]
}

const UNKNOWN: u16 = pack([0b110, 0b001, 0b010, 0b000, 0b010]);

fn glyph_bits(ch: char) -> u16 {
    let rows = match fold(ch) {
        ' ' => [0, 0, 0, 0, 0],
        'A' => [0b010, 0b101, 0b111, 0b101, 0b101],
        'B' => [0b110, 0b101, 0b110, 0b101, 0b110],
        'C' => [0b011, 0b100, 0b100, 0b100, 0b011],
        'D' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'E' => [0b111, 0b100, 0b110, 0b100, 0b111],
        'F' => [0b111, 0b100, 0b110, 0b100, 0b100],
        'G' => [0b011, 0b100, 0b101, 0b101, 0b011],
        'H' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'I' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'J' => [0b001, 0b001, 0b001, 0b101, 0b010],
        'K' => [0b101, 0b101, 0b110, 0b101, 0b101],
        'L' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'M' => [0b101, 0b111, 0b111, 0b101, 0b101],
        'N' => [0b110, 0b101, 0b101, 0b101, 0b101],
        'O' => [0b010, 0b101, 0b101, 0b101, 0b010],
        'P' => [0b110, 0b101, 0b110, 0b100, 0b100],
        'Q' => [0b010, 0b101, 0b101, 0b110, 0b011],
        'R' => [0b110, 0b101, 0b110, 0b101, 0b101],
        'S' => [0b011, 0b100, 0b010, 0b001, 0b110],
        'T' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'U' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'V' => [0b101, 0b101, 0b101, 0b101, 0b010],
        'W' => [0b101, 0b101, 0b111, 0b111, 0b101],
        'X' => [0b101, 0b101, 0b010, 0b101, 0b101],
        'Y' => [0b101, 0b101, 0b010, 0b010, 0b010],
        'Z' => [0b111, 0b001, 0b010, 0b100, 0b111],
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b110, 0b001, 0b010, 0b100, 0b111],
        '3' => [0b110, 0b001, 0b010, 0b001, 0b110],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b110, 0b001, 0b110],
        '6' => [0b011, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b010, 0b010, 0b010],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b110],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        ',' => [0b000, 0b000, 0b000, 0b010, 0b100],
        '!' => [0b010, 0b010, 0b010, 0b000, 0b010],
        ':' => [0b000, 0b010, 0b000, 0b010, 0b000],
        '\'' => [0b010, 0b010, 0b000, 0b000, 0b000],
        '"' => [0b101, 0b101, 0b000, 0b000, 0b000],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        '_' => [0b000, 0b000, 0b000, 0b000, 0b111],
        '+' => [0b000, 0b010, 0b111, 0b010, 0b000],
        '=' => [0b000, 0b111, 0b000, 0b111, 0b000],
        '*' => [0b000, 0b101, 0b010, 0b101, 0b000],
        '/' => [0b001, 0b001, 0b010, 0b100, 0b100],
        '%' => [0b101, 0b001, 0b010, 0b100, 0b101],
        '(' => [0b001, 0b010, 0b010, 0b010, 0b001],
        ')' => [0b100, 0b010, 0b010, 0b010, 0b100],
        '<' => [0b001, 0b010, 0b100, 0b010, 0b001],
        '>' => [0b100, 0b010, 0b001, 0b010, 0b100],
        // '?' and anything without a glyph.
        _ => return UNKNOWN,
    };
    pack(rows)
}

fn fold(ch: char) -> char {
    let upper = ch.to_uppercase().next().unwrap_or(ch);
    match upper {
        'Á' | 'À' | 'Â' | 'Ä' => 'A',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'Ó' | 'Ò' | 'Ô' | 'Ö' => 'O',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'Ñ' => 'N',
        'Ç' => 'C',
        '¿' => '?',
        '¡' => '!',
        other => other,
    }
}

/// Offsets of the lit pixels of `ch`, relative to its top-left corner.
pub(crate) fn glyph_pixels(ch: char) -> impl Iterator<Item = (i32, i32)> {
    let bits = glyph_bits(ch);
    (0..GLYPH_HEIGHT).flat_map(move |row| {
        (0..GLYPH_WIDTH).filter_map(move |col| {
            let shift = (GLYPH_HEIGHT - 1 - row) * GLYPH_WIDTH + (GLYPH_WIDTH - 1 - col);
            (bits >> shift & 1 == 1).then_some((col, row))
        })
    })
}

/// Width in pixels of `text` on one line.
pub fn text_width(text: &str) -> u32 {
    let chars = text.chars().count() as u32;
    (chars * GLYPH_ADVANCE as u32).saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercase_and_accents_share_base_glyphs() {
        assert_eq!(glyph_bits('a'), glyph_bits('A'));
        assert_eq!(glyph_bits('ñ'), glyph_bits('N'));
        assert_eq!(glyph_bits('é'), glyph_bits('E'));
    }

    #[test]
    fn unknown_characters_draw_question_mark() {
        assert_eq!(glyph_bits('€'), UNKNOWN);
        assert_eq!(glyph_pixels('?').count(), glyph_pixels('€').count());
    }

    #[test]
    fn glyph_pixels_stay_inside_cell() {
        for ch in "KAIXO 0123456789!".chars() {
            for (col, row) in glyph_pixels(ch) {
                assert!((0..GLYPH_WIDTH).contains(&col));
                assert!((0..GLYPH_HEIGHT).contains(&row));
            }
        }
        assert_eq!(glyph_pixels(' ').count(), 0);
        assert_eq!(glyph_pixels('T').collect::<Vec<_>>()[..3], [(0, 0), (1, 0), (2, 0)]);
    }

    #[test]
    fn width_counts_characters() {
        assert_eq!(text_width(""), 0);
        assert_eq!(text_width("ab"), 7);
        assert_eq!(text_width("ñu"), 7);
    }
}
