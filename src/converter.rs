use crate::error::DecodeError;
use crate::text;

/// Common contract for transforming binary data into a safe textual form
/// such as hexadecimal, Base32, or Ascii85, and back again.
///
/// Implementations are stateless after construction and therefore thread
/// safe: their lookup tables are immutable and all working state lives in
/// per-call buffers. For every implementation and every byte sequence `b`,
/// `decode(encode(b))` yields `b` again, and `encode(b)` is canonical, i.e.
/// unchanged by [`clean`](Converter::clean).
///
/// The `&str`/`String` conveniences delegate to the char-slice forms; the
/// intermediate char buffers they allocate are scrubbed before release so
/// that encoded secrets do not linger on the heap.
pub trait Converter {
    /// Encode the provided binary data in a textual form.
    fn encode_chars(&self, bytes: &[u8]) -> Vec<char>;

    /// Decode the provided textual representation back into binary data.
    ///
    /// Whitespace is tolerated unless documented otherwise. Structurally
    /// invalid input raises a [`DecodeError`] carrying the offending
    /// character and its zero-based position, or the offending length.
    fn decode_chars(&self, text: &[char]) -> Result<Vec<u8>, DecodeError>;

    /// Remove invalid characters from an encoded form and canonicalise the
    /// representation.
    ///
    /// The result decodes successfully, is idempotent under `clean`, and
    /// leaves output of [`encode_chars`](Converter::encode_chars) unchanged.
    fn clean_chars(&self, text: &[char]) -> Vec<char>;

    /// Encode the provided binary data as a `String`.
    fn encode(&self, bytes: &[u8]) -> String {
        let mut chars = self.encode_chars(bytes);
        let out: String = chars.iter().collect();
        text::scrub(&mut chars);
        out
    }

    /// Decode the provided textual representation back into binary data.
    fn decode(&self, text: &str) -> Result<Vec<u8>, DecodeError> {
        let mut chars: Vec<char> = text.chars().collect();
        let out = self.decode_chars(&chars);
        text::scrub(&mut chars);
        out
    }

    /// Remove invalid characters from an encoded form, as a `String`.
    fn clean(&self, text: &str) -> String {
        let mut chars: Vec<char> = text.chars().collect();
        let mut cleaned = self.clean_chars(&chars);
        let out: String = cleaned.iter().collect();
        text::scrub(&mut chars);
        text::scrub(&mut cleaned);
        out
    }
}
