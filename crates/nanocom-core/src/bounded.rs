//! Fixed-capacity text that can cross a module boundary by value.

use std::fmt;

/// NUL-terminated UTF-8 text stored inline in `N` bytes.
///
/// At most `N - 1` content bytes are kept; longer input is truncated on a
/// character boundary so the stored value always reads back as valid UTF-8.
/// The layout is a plain `[u8; N]`, identical on both sides of the ABI.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundedText<const N: usize> {
    data: [u8; N],
}

impl<const N: usize> BoundedText<N> {
    /// Size of the buffer in bytes, terminator included.
    pub const CAPACITY: usize = N;

    /// Largest number of content bytes the buffer can hold.
    pub const MAX_LEN: usize = N.saturating_sub(1);

    /// An empty buffer.
    pub const fn empty() -> Self {
        Self { data: [0; N] }
    }

    /// Copy `text` into a new buffer, truncating if it does not fit.
    pub fn new(text: &str) -> Self {
        let mut bounded = Self::empty();
        bounded.assign(text);
        bounded
    }

    /// Whether `text` fits without truncation.
    pub fn fits(text: &str) -> bool {
        text.len() <= Self::MAX_LEN
    }

    /// Replace the contents with `text`, truncating if it does not fit.
    ///
    /// Returns the number of content bytes stored.
    pub fn assign(&mut self, text: &str) -> usize {
        let len = floor_char_boundary(text, Self::MAX_LEN);
        self.data = [0; N];
        self.data[..len].copy_from_slice(&text.as_bytes()[..len]);
        len
    }

    /// Number of content bytes, up to the first NUL.
    pub fn len(&self) -> usize {
        self.data.iter().position(|&b| b == 0).unwrap_or(N)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Content bytes without the terminator.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len()]
    }

    /// Content as text.
    ///
    /// A buffer filled by a foreign module may hold invalid UTF-8; the valid
    /// prefix is returned in that case.
    pub fn as_str(&self) -> &str {
        let bytes = self.as_bytes();
        match std::str::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => {
                // SAFETY: `valid_up_to` marks the end of the longest valid prefix.
                unsafe { std::str::from_utf8_unchecked(&bytes[..err.valid_up_to()]) }
            }
        }
    }
}

/// Largest index `<= max` that is a char boundary of `text`.
fn floor_char_boundary(text: &str, max: usize) -> usize {
    if text.len() <= max {
        return text.len();
    }
    let mut index = max;
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

impl<const N: usize> Default for BoundedText<N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const N: usize> From<&str> for BoundedText<N> {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl<const N: usize> AsRef<str> for BoundedText<N> {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl<const N: usize> fmt::Display for BoundedText<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<const N: usize> fmt::Debug for BoundedText<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoundedText<{}>({:?})", N, self.as_str())
    }
}

impl<const N: usize> PartialEq<str> for BoundedText<N> {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl<const N: usize> PartialEq<&str> for BoundedText<N> {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_round_trips() {
        let text = BoundedText::<16>::new("key_one");
        assert_eq!(text.as_str(), "key_one");
        assert_eq!(text.len(), 7);
        assert!(!text.is_empty());
    }

    #[test]
    fn test_truncates_to_capacity() {
        let long = "x".repeat(40);
        let text = BoundedText::<16>::new(&long);
        assert_eq!(text.len(), 15);
        assert_eq!(text.as_str(), &long[..15]);
        assert!(!BoundedText::<16>::fits(&long));
    }

    #[test]
    fn test_truncates_on_char_boundary() {
        // "é" is two bytes; a 4-byte buffer holds three content bytes.
        let text = BoundedText::<4>::new("aéé");
        assert_eq!(text.as_str(), "aé");
        assert_eq!(text.len(), 3);
    }

    #[test]
    fn test_assign_clears_previous_content() {
        let mut text = BoundedText::<16>::new("a longer value");
        text.assign("short");
        assert_eq!(text, "short");
        assert_eq!(text.as_bytes(), b"short");
    }

    #[test]
    fn test_zero_capacity() {
        let text = BoundedText::<0>::new("anything");
        assert!(text.is_empty());
        assert_eq!(text.as_str(), "");
    }

    #[test]
    fn test_debug_shows_content() {
        let text = BoundedText::<8>::new("abc");
        assert_eq!(format!("{:?}", text), "BoundedText<8>(\"abc\")");
        assert_eq!(text.to_string(), "abc");
    }
}
