use crate::converter::Converter;
use crate::error::DecodeError;
use crate::text;

/// Convert data into an Ascii85 encoded form where every four bytes of
/// data become five characters in the range `!`..`u`.
///
/// Two single-character shortcuts and a framing convention vary between
/// dialects: `z` for four zero bytes, `y` for four spaces (0x20), and the
/// `<~` .. `~>` quoting used by the framed dialect. Shortcuts apply only at
/// full-block positions, never inside a trailing partial block.
///
/// Note Ascii85 uses many characters which are considered special in some
/// systems. For maximum portability, use Base64 instead.
pub struct Ascii85 {
    /// A `z` can represent four consecutive zero bytes.
    use_z: bool,
    /// A `y` can represent four consecutive spaces (0x20).
    use_y: bool,
    /// The encoding is quoted between `<~` and `~>`.
    use_frame: bool,
}

impl Ascii85 {
    /// The framed dialect: `z` shortcut, `<~` .. `~>` quoting, no `y`.
    pub const fn standard() -> Self {
        Ascii85 { use_z: true, use_y: false, use_frame: true }
    }

    /// The btoa dialect: `z` and `y` shortcuts, no quoting.
    pub const fn b_to_a() -> Self {
        Ascii85 { use_z: true, use_y: true, use_frame: false }
    }

    fn decode_stripped(&self, work: &[char]) -> Result<Vec<u8>, DecodeError> {
        let mut start = 0;
        let mut end = work.len();
        if let Some(p) = index_of(work, 0, '<', '~') {
            start = p + 2;
        }
        if let Some(p) = index_of(work, start, '~', '>') {
            end = p;
        }
        let body = &work[start..end];

        // first pass sizes the output and validates the characters
        let mut len = 0usize;
        let mut block = 0u64;
        let mut j = 0usize;
        for (i, &ch) in body.iter().enumerate() {
            if j == 0 && ((self.use_z && ch == 'z') || (self.use_y && ch == 'y')) {
                // z is 4 zeroes, y is 4 spaces
                len += 4;
                continue;
            }
            if !('!'..='u').contains(&ch) {
                return Err(DecodeError::bad_character(ch, start + i));
            }
            if j == 0 {
                j = 1;
                block = (ch as u64) - ('!' as u64);
            } else {
                len += 1;
                j += 1;
                block = block * 85 + ((ch as u64) - ('!' as u64));
                if block >= 0x1_0000_0000 {
                    return Err(DecodeError::BadBlock {
                        block: body[i - 4..=i].iter().collect(),
                    });
                }
                if j == 5 {
                    j = 0;
                }
            }
        }
        if j == 1 {
            return Err(DecodeError::TruncatedBlock { input: work.iter().collect() });
        }

        // second pass extracts the bytes
        let mut data = vec![0u8; len];
        let mut len = 0usize;
        let mut block = 0u64;
        let mut j = 0usize;
        for &ch in body {
            if j == 0 {
                if ch == 'z' {
                    data[len..len + 4].fill(0);
                    len += 4;
                } else if ch == 'y' {
                    data[len..len + 4].fill(0x20);
                    len += 4;
                } else {
                    block = (ch as u64) - ('!' as u64);
                    j = 1;
                }
            } else {
                block = block * 85 + ((ch as u64) - ('!' as u64));
                j += 1;
                if j == 5 {
                    j = 0;
                    data[len] = ((block >> 24) & 0xff) as u8;
                    data[len + 1] = ((block >> 16) & 0xff) as u8;
                    data[len + 2] = ((block >> 8) & 0xff) as u8;
                    data[len + 3] = (block & 0xff) as u8;
                    len += 4;
                    block = 0;
                }
            }
        }

        // a partial block is scaled up as though right-padded with zero
        // digits, then the covered leading bytes are kept; a scaled value
        // past 32 bits could not have come from the encoder
        if j >= 2 {
            for _ in j..5 {
                block *= 85;
            }
            if block >= 0x1_0000_0000 {
                return Err(DecodeError::BadBlock {
                    block: body[body.len() - j..].iter().collect(),
                });
            }
            data[len] = ((block >> 24) & 0xff) as u8;
            if j >= 3 {
                data[len + 1] = ((block >> 16) & 0xff) as u8;
            }
            if j >= 4 {
                data[len + 2] = ((block >> 8) & 0xff) as u8;
            }
        }
        Ok(data)
    }

    /// Emit one full block, using the shortcuts where allowed.
    fn put_block(&self, output: &mut Vec<char>, pos: usize, block: &[u8]) -> usize {
        let v = ((block[0] as u64) << 24)
            | ((block[1] as u64) << 16)
            | ((block[2] as u64) << 8)
            | block[3] as u64;

        if v == 0 && self.use_z {
            output[pos] = 'z';
            return 1;
        }
        if v == 0x2020_2020 && self.use_y {
            output[pos] = 'y';
            return 1;
        }

        let mut v = v;
        for i in (0..5).rev() {
            output[pos + i] = digit(v % 85);
            v /= 85;
        }
        5
    }

    /// Emit the final partial block of `count` bytes as `count + 1`
    /// characters; the uncovered bytes are padded with 0xFF.
    fn put_final_block(&self, output: &mut Vec<char>, pos: usize, count: usize, block: [u8; 3]) {
        let mut v = ((block[0] as u64) << 24)
            | ((block[1] as u64) << 16)
            | ((block[2] as u64) << 8)
            | 0xff;

        for _ in count..4 {
            v /= 85;
        }
        for i in (0..=count).rev() {
            output[pos + i] = digit(v % 85);
            v /= 85;
        }
    }
}

fn digit(value: u64) -> char {
    (b'!' + value as u8) as char
}

/// Find two adjacent characters in the text.
fn index_of(text: &[char], start: usize, c1: char, c2: char) -> Option<usize> {
    if text.len() < 2 {
        return None;
    }
    (start..text.len() - 1).find(|&i| text[i] == c1 && text[i + 1] == c2)
}

impl Converter for Ascii85 {
    fn encode_chars(&self, bytes: &[u8]) -> Vec<char> {
        // every 4 bytes requires 5 characters of output
        let full_blocks = bytes.len() / 4;
        let extra_bytes = bytes.len() - 4 * full_blocks;
        let extra_chars = match extra_bytes {
            0 => 0,
            1 => 3, // one spare slot, trimmed below
            _ => extra_bytes + 1,
        };

        let frame_chars = if self.use_frame { 4 } else { 0 };
        let mut output = vec!['\0'; 5 * full_blocks + extra_chars + frame_chars];

        let mut j = 0;
        if self.use_frame {
            output[0] = '<';
            output[1] = '~';
            j = 2;
        }
        for i in 0..full_blocks {
            j += self.put_block(&mut output, j, &bytes[i * 4..i * 4 + 4]);
        }

        let k = full_blocks * 4;
        match extra_bytes {
            1 => {
                self.put_final_block(&mut output, j, 1, [bytes[k], 0xff, 0xff]);
                j += 2;
            }
            2 => {
                self.put_final_block(&mut output, j, 2, [bytes[k], bytes[k + 1], 0xff]);
                j += 3;
            }
            3 => {
                self.put_final_block(&mut output, j, 3, [bytes[k], bytes[k + 1], bytes[k + 2]]);
                j += 4;
            }
            _ => {}
        }

        if self.use_frame {
            output[j] = '~';
            output[j + 1] = '>';
            j += 2;
        }

        text::trim(output, j)
    }

    fn decode_chars(&self, text: &[char]) -> Result<Vec<u8>, DecodeError> {
        let mut work = text.to_vec();
        let end = text::remove_whitespace_in_place(&mut work);
        let result = self.decode_stripped(&work[..end]);
        text::scrub(&mut work);
        result
    }

    fn clean_chars(&self, text: &[char]) -> Vec<char> {
        // strip whitespace first so frame detection sees what decode sees
        let mut work = text.to_vec();
        let stripped = text::remove_whitespace_in_place(&mut work);
        let cleaned = self.clean_stripped(&work[..stripped]);
        text::scrub(&mut work);
        cleaned
    }
}

impl Ascii85 {
    fn clean_stripped(&self, text: &[char]) -> Vec<char> {
        let mut start = 0;
        let mut end = text.len();
        if let Some(p) = index_of(text, 0, '<', '~') {
            start = p + 2;
        }
        if let Some(p) = index_of(text, start, '~', '>') {
            end = p;
        }

        let mut buf = vec!['\0'; end - start];
        let mut pos = 0;
        if self.use_frame {
            buf = text::append(buf, pos, '<');
            pos += 1;
            buf = text::append(buf, pos, '~');
            pos += 1;
        }

        let mut j = 0usize;
        let mut v = 0u64;
        for &ch in &text[start..end] {
            if j == 0 {
                if ch == 'z' && self.use_z {
                    buf = text::append(buf, pos, 'z');
                    pos += 1;
                    continue;
                }
                if ch == 'y' && self.use_y {
                    buf = text::append(buf, pos, 'y');
                    pos += 1;
                    continue;
                }
            }

            if !('!'..='u').contains(&ch) {
                // bad character, skip
                continue;
            }

            buf = text::append(buf, pos, ch);
            pos += 1;
            j += 1;
            v = v * 85 + ((ch as u64) - ('!' as u64));
            if j == 5 {
                // remove invalid patterns
                if v >= 0x1_0000_0000 {
                    pos -= 5;
                }
                if v == 0 && self.use_z {
                    pos -= 5;
                    buf = text::append(buf, pos, 'z');
                    pos += 1;
                }
                if v == 0x2020_2020 && self.use_y {
                    pos -= 5;
                    buf = text::append(buf, pos, 'y');
                    pos += 1;
                }
                j = 0;
                v = 0;
            }
        }

        if j == 1 {
            // an undecodable single trailing character, remove it
            pos -= 1;
        } else if j > 1 {
            // re-encode the final bytes so the tail is in canonical form
            for _ in j..=4 {
                v *= 85;
            }
            for i in j..=4 {
                v |= 0xff << (8 * (i - j));
            }

            if v >= 0x1_0000_0000 {
                // final bytes would have been invalid, so remove
                pos -= j;
            } else {
                for _ in j..=4 {
                    v /= 85;
                }
                for i in 1..=j {
                    buf[pos - i] = digit(v % 85);
                    v /= 85;
                }
            }
        }

        if self.use_frame {
            buf = text::append(buf, pos, '~');
            pos += 1;
            buf = text::append(buf, pos, '>');
            pos += 1;
        }

        text::trim(buf, pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed() -> Ascii85 {
        Ascii85::standard()
    }

    fn btoa() -> Ascii85 {
        Ascii85::b_to_a()
    }

    #[test]
    fn empty_input() {
        assert_eq!(framed().encode(&[]), "<~~>");
        assert_eq!(framed().clean(""), "<~~>");
        assert_eq!(framed().decode("").unwrap(), Vec::<u8>::new());
        assert_eq!(btoa().encode(&[]), "");
        assert_eq!(btoa().decode("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn zero_block_shortcut() {
        assert_eq!(framed().encode(&[0, 0, 0, 0]), "<~z~>");
        assert_eq!(framed().decode("<~z~>").unwrap(), vec![0, 0, 0, 0]);
        assert_eq!(btoa().encode(&[0, 0, 0, 0]), "z");
        // never inside a trailing partial block
        assert!(!btoa().encode(&[0, 0, 0]).contains('z'));
    }

    #[test]
    fn space_block_shortcut() {
        assert_eq!(btoa().encode(&[0x20, 0x20, 0x20, 0x20]), "y");
        assert_eq!(btoa().decode("y").unwrap(), vec![0x20; 4]);
        // the framed dialect spells spaces out
        assert_eq!(framed().encode(&[0x20; 4]), "<~+<VdL~>");
        assert_eq!(framed().decode("<~+<VdL~>").unwrap(), vec![0x20; 4]);
    }

    #[test]
    fn known_blocks() {
        // "Man " and "is d" are the first two blocks of the classic sample
        assert_eq!(btoa().encode(b"Man "), "9jqo^");
        assert_eq!(btoa().encode(b"Man is d"), "9jqo^BlbD-");
        // a three-byte tail emits four characters, 0xFF padded
        let plain = &b"Man is dist"[..];
        let encoded = btoa().encode(plain);
        assert_eq!(encoded, "9jqo^BlbD-BleC");
        assert_eq!(btoa().decode(&encoded).unwrap(), plain);
    }

    #[test]
    fn framing_is_optional_on_decode() {
        assert_eq!(framed().decode("9jqo^").unwrap(), b"Man ");
        assert_eq!(framed().decode("<~9jqo^~>").unwrap(), b"Man ");
        assert_eq!(framed().decode("junk<~9jqo^~>junk").unwrap(), b"Man ");
        assert_eq!(btoa().decode("<~9jqo^~>").unwrap(), b"Man ");
    }

    #[test]
    fn decode_tolerates_whitespace() {
        assert_eq!(btoa().decode("9jqo ^\n").unwrap(), b"Man ");
    }

    #[test]
    fn decode_rejects_bad_characters() {
        for input in ["€2345", "x2345", "12x45", "12€45"] {
            let err = btoa().decode(input).unwrap_err();
            assert!(matches!(err, DecodeError::BadCharacter { .. }), "{:?}: {}", input, err);
        }
        // 'z' mid-block is out of the digit range
        assert!(btoa().decode("12z45").is_err());
    }

    #[test]
    fn decode_rejects_single_character_tail() {
        let err = btoa().decode("1").unwrap_err();
        assert!(matches!(err, DecodeError::TruncatedBlock { .. }));
        let err = btoa().decode("9jqo^1").unwrap_err();
        assert!(matches!(err, DecodeError::TruncatedBlock { .. }));
    }

    #[test]
    fn decode_rejects_overflowing_block() {
        // "uuuuu" encodes 85^5 - 1, which exceeds 32 bits
        let err = btoa().decode("uuuuu").unwrap_err();
        assert_eq!(err, DecodeError::BadBlock { block: "uuuuu".to_string() });
        // an overflowing trailing block is rejected, not truncated
        let err = btoa().decode("uu").unwrap_err();
        assert_eq!(err, DecodeError::BadBlock { block: "uu".to_string() });
        // the largest single-byte tail still decodes
        assert_eq!(btoa().decode(&btoa().encode(&[0xff])).unwrap(), vec![0xff]);
    }

    #[test]
    fn partial_blocks_round_trip() {
        for data in [&[0x41u8][..], &[0x41, 0x42], &[0x41, 0x42, 0x43], &[0xff], &[0xff, 0xff, 0xff]]
        {
            for converter in [framed(), btoa()] {
                let encoded = converter.encode(data);
                assert_eq!(converter.decode(&encoded).unwrap(), data, "failed for {:?}", data);
            }
        }
    }

    #[test]
    fn clean_canonicalises() {
        let c = btoa();
        for dirty in ["  <~~>  ", "<~123 45     ", "12345uuuUU12345", "zyzy!!!!!+<VdL", "!!!!!+<VdLzz", "!!!!!!"] {
            let cleaned = c.clean(dirty);
            let decoded = c.decode(&cleaned).unwrap();
            assert_eq!(c.encode(&decoded), cleaned, "not canonical for {:?}", dirty);
            assert_eq!(c.clean(&cleaned), cleaned, "not idempotent for {:?}", dirty);
        }
    }

    #[test]
    fn clean_keeps_shortcuts_at_block_boundaries() {
        let c = btoa();
        assert_eq!(c.clean("zy"), "zy");
        // five explicit zero digits collapse to the shortcut
        assert_eq!(c.clean("!!!!!"), "z");
        assert_eq!(c.clean("!!!!!z"), "zz");
    }

    #[test]
    fn clean_restores_framing() {
        assert_eq!(framed().clean("z"), "<~z~>");
        assert_eq!(framed().clean("<~z~>"), "<~z~>");
        assert_eq!(btoa().clean("<~z~>"), "z");
    }
}
