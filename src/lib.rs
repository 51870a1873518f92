//! Text-encoded binary codecs and a cross-process safe-file subsystem.
//!
//! The codec half converts bytes to and from textual forms with exact
//! bit-level contracts: hex, the RFC 4648 Base32/Base64 families and their
//! non-standard cousins (Crockford and Z-Base32, an order-preserving
//! Base64, dense Base128), and the Ascii85 dialects. Every codec is
//! reached through the common [`Converter`] contract and guarantees that
//! decoding its own output round-trips and that [`Converter::clean`]
//! produces canonical, decodable text.
//!
//! The file half provides [`filelock`] — reentrant shared/exclusive locks
//! on filesystem entities that also exclude other processes — and
//! [`SafeFileOutput`], which uses those locks to publish files atomically:
//! a destination path is only ever observed absent or fully written.
//!
//! # Examples
//!
//! ```
//! use bintext::{Converter, BASE32, HEX};
//!
//! assert_eq!(HEX.encode(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
//! assert_eq!(BASE32.encode(b"foo"), "MZXW6===");
//! assert_eq!(BASE32.decode("mzxw6").unwrap(), b"foo");
//! ```

pub mod ascii85;
pub mod base128;
pub mod base32;
pub mod base64;
pub mod base64_hex;
pub mod converter;
pub mod error;
pub mod filelock;
pub mod hex;
pub mod safe_output;
pub mod text;

use std::sync::LazyLock;

pub use converter::Converter;
pub use error::DecodeError;
pub use filelock::{canonical_file, locking_file, LockError, LockMode, LockingFile};
pub use safe_output::{Progress, SafeFileOutput};

/// Common Ascii85 converter (framed, `z` shortcut).
pub static ASCII85: ascii85::Ascii85 = ascii85::Ascii85::standard();

/// Common Ascii85 btoa converter (`z` and `y` shortcuts, unframed).
pub static ASCII85_B_TO_A: ascii85::Ascii85 = ascii85::Ascii85::b_to_a();

/// Common Base128 converter.
pub static BASE128: LazyLock<base128::Base128> = LazyLock::new(base128::Base128::new);

/// Common RFC 4648 Base32 converter.
pub static BASE32: LazyLock<base32::Base32> = LazyLock::new(base32::Base32::rfc4648);

/// Common Crockford Base32 converter.
pub static BASE32_CROCKFORD: LazyLock<base32::Base32> = LazyLock::new(base32::Base32::crockford);

/// Common Base32hex converter.
pub static BASE32_HEX: LazyLock<base32::Base32> = LazyLock::new(base32::Base32::hex_upper);

/// Common lower-case Base32hex converter.
pub static BASE32_LOWER_HEX: LazyLock<base32::Base32> = LazyLock::new(base32::Base32::hex_lower);

/// Common Z-Base32 converter.
pub static ZBASE32: LazyLock<base32::Base32> = LazyLock::new(base32::Base32::zbase32);

/// Common RFC 4648 Base64 converter.
pub static BASE64: LazyLock<base64::Base64> = LazyLock::new(base64::Base64::standard);

/// Common URL-safe Base64 converter.
pub static BASE64URL: LazyLock<base64::Base64> = LazyLock::new(base64::Base64::url_safe);

/// Common hexadecimal converter.
pub static HEX: LazyLock<hex::Hex> = LazyLock::new(hex::Hex::new);
