//! # Command Arguments
//!
//! Binary-safe command arguments and the conversions callers use to build
//! them. Numbers are sent as decimal text and booleans as `1`/`0`, which is
//! how Redis-compatible servers expect them.

use std::fmt;

use bytes::Bytes;

/// One opaque command argument.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Arg(Bytes);

impl Arg {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

impl AsRef<[u8]> for Arg {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Bytes> for Arg {
    fn from(data: Bytes) -> Self {
        Arg(data)
    }
}

impl From<Vec<u8>> for Arg {
    fn from(data: Vec<u8>) -> Self {
        Arg(Bytes::from(data))
    }
}

impl From<&[u8]> for Arg {
    fn from(data: &[u8]) -> Self {
        Arg(Bytes::copy_from_slice(data))
    }
}

impl<const N: usize> From<&[u8; N]> for Arg {
    fn from(data: &[u8; N]) -> Self {
        Arg(Bytes::copy_from_slice(data))
    }
}

impl From<&str> for Arg {
    fn from(text: &str) -> Self {
        Arg(Bytes::copy_from_slice(text.as_bytes()))
    }
}

impl From<String> for Arg {
    fn from(text: String) -> Self {
        Arg(Bytes::from(text.into_bytes()))
    }
}

impl From<&String> for Arg {
    fn from(text: &String) -> Self {
        Arg::from(text.as_str())
    }
}

impl From<bool> for Arg {
    fn from(flag: bool) -> Self {
        Arg(Bytes::from_static(if flag { b"1" } else { b"0" }))
    }
}

macro_rules! arg_from_display {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Self {
                    Arg(Bytes::from(value.to_string().into_bytes()))
                }
            }
        )*
    };
}

arg_from_display!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

/// Builds a `Vec<Arg>` from heterogeneous values.
///
/// ```rust
/// use hkv_common::{args, Arg};
///
/// let built = args!["counter", 1, true];
/// assert_eq!(built, vec![Arg::from("counter"), Arg::from("1"), Arg::from("1")]);
/// ```
#[macro_export]
macro_rules! args {
    ($($arg:expr),* $(,)?) => {{
        let built: ::std::vec::Vec<$crate::Arg> = ::std::vec![$($crate::Arg::from($arg)),*];
        built
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_render_as_decimal_text() {
        assert_eq!(Arg::from(0i32).as_bytes(), b"0");
        assert_eq!(Arg::from(-15i64).as_bytes(), b"-15");
        assert_eq!(Arg::from(1.5f64).as_bytes(), b"1.5");
        assert_eq!(Arg::from(false).as_bytes(), b"0");
    }

    #[test]
    fn macro_accepts_mixed_types() {
        let built = crate::args!["k-1-2", String::from("v"), 7u64, b"raw"];
        assert_eq!(built.len(), 4);
        assert_eq!(built[0].as_bytes(), b"k-1-2");
        assert_eq!(built[2].as_bytes(), b"7");
        assert_eq!(built[3].as_bytes(), b"raw");

        let empty = crate::args![];
        assert!(empty.is_empty());
    }
}
