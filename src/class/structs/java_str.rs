use std::{
    borrow::Cow,
    fmt::{self, Debug},
    sync::Arc,
};

use cesu8_str::java as cesu8_java;

/// Modified UTF-8 text as stored in `CONSTANT_Utf8` entries.
#[derive(Hash, Eq, PartialEq)]
#[repr(transparent)]
pub(crate) struct JavaStr {
    inner: [u8],
}

impl JavaStr {
    /// Wraps any bytes; the encoding is checked when decoding with [`JavaStr::to_str`].
    pub(crate) fn new(inner: &[u8]) -> &Self {
        // SAFETY: `JavaStr` is `repr(transparent)` over `[u8]`
        unsafe { &*(inner as *const [u8] as *const JavaStr) }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.inner
    }

    /// `None` when the bytes are not valid modified UTF-8.
    pub fn to_str(&self) -> Option<Cow<'_, str>> {
        let java_str = cesu8_java::JavaStr::from_java_cesu8(&self.inner).ok()?;
        Some(cesu8_java::from_java_cesu8(java_str))
    }

    pub fn to_str_arc(&self) -> Option<Arc<str>> {
        self.to_str().map(|s| Arc::from(s.as_ref()))
    }
}

impl Debug for JavaStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(&String::from_utf8_lossy(&self.inner), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ascii_and_null() {
        let ascii = JavaStr::new(b"java/lang/Object");
        assert_eq!(ascii.to_str().unwrap(), "java/lang/Object");

        // modified UTF-8 encodes U+0000 as two bytes
        let nul = JavaStr::new(&[b'a', 0xc0, 0x80, b'b']);
        assert_eq!(nul.to_str().unwrap(), "a\0b");
    }

    #[test]
    fn test_invalid_bytes_do_not_decode() {
        // a bare continuation byte, then a raw NUL that modified UTF-8 never contains
        assert!(JavaStr::new(&[b'a', 0x80]).to_str().is_none());
        assert!(JavaStr::new(&[b'a', 0]).to_str().is_none());
        assert!(JavaStr::new(&[0xed, 0xa0]).to_str_arc().is_none());
    }
}
