use std::fmt;

/// Errors that can occur when decoding a textual representation back into
/// binary data.
///
/// The `Display` texts are part of the contract: downstream consumers are
/// known to compare the hex messages verbatim, so they must not change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The input contains a character that is not part of the alphabet.
    BadCharacter {
        /// The offending character.
        ch: char,
        /// Zero-based position within the (whitespace-stripped) input.
        position: usize,
    },
    /// The input length cannot correspond to any byte sequence.
    BadLength {
        /// Observed length after whitespace and padding were stripped.
        length: usize,
        /// The stripped input.
        input: String,
    },
    /// The final character carries bits beyond the decoded output length.
    TrailingBits {
        /// The trailing partial block.
        tail: String,
    },
    /// A five-character Ascii85 group whose value exceeds 32 bits.
    BadBlock {
        /// The offending five-character sequence.
        block: String,
    },
    /// An Ascii85 tail of exactly one character, which is undecodable.
    TruncatedBlock {
        /// The stripped input.
        input: String,
    },
    /// Hexadecimal input with an odd number of digits.
    OddLength {
        /// The stripped input.
        input: String,
    },
}

impl DecodeError {
    pub(crate) fn bad_character(ch: char, position: usize) -> Self {
        DecodeError::BadCharacter { ch, position }
    }

    pub(crate) fn bad_length(length: usize, input: &[char]) -> Self {
        DecodeError::BadLength {
            length,
            input: input.iter().collect(),
        }
    }

    pub(crate) fn trailing_bits(tail: &[char]) -> Self {
        DecodeError::TrailingBits {
            tail: tail.iter().collect(),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::BadCharacter { ch, position } => {
                write!(f, "Invalid character '{}' at position {} in input.", ch, position)
            }
            DecodeError::BadLength { length, input } => {
                write!(f, "Input text has invalid length of {}: {}", length, input)
            }
            DecodeError::TrailingBits { tail } => {
                write!(f, "Trailing bits detected in encoding \"...{}\".", tail)
            }
            DecodeError::BadBlock { block } => {
                write!(f, "Invalid ASCII85. Bad 5 character sequence \"{}\" in input", block)
            }
            DecodeError::TruncatedBlock { input } => {
                write!(
                    f,
                    "Invalid ASCII85. Only one character in final 5-character block of: {}",
                    input
                )
            }
            DecodeError::OddLength { input } => {
                write!(f, "Input data contains an odd number of characters \"{}\"", input)
            }
        }
    }
}

impl std::error::Error for DecodeError {}
