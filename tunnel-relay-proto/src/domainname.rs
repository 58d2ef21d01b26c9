use std::{
    fmt,
    hash::{Hash, Hasher},
    ops::Deref,
};

/// The longest domain name the address field can carry, limited by its one-byte length prefix.
pub const MAX_DOMAINNAME_LEN: usize = 255;

/// A domain name stored inline, with room for up to `N` bytes (clamped to
/// [`MAX_DOMAINNAME_LEN`]).
///
/// Domain names are typically far shorter than 255 bytes, but the address field allows it, so by
/// default this type reserves the full 255. Cloning it is a plain memory copy and it never touches
/// the heap. Bytes past the current length are always zero.
///
/// The name is kept as raw bytes: the wire format makes no promise that it is valid UTF-8.
#[derive(Clone, Copy)]
pub struct Domainname<const N: usize = MAX_DOMAINNAME_LEN> {
    len: u8,
    bytes: [u8; N],
}

impl<const N: usize> Domainname<N> {
    /// The maximum amount of bytes this `Domainname` can hold.
    pub const CAPACITY: usize = if N < MAX_DOMAINNAME_LEN { N } else { MAX_DOMAINNAME_LEN };

    /// Creates a new empty `Domainname`.
    pub const fn new() -> Self {
        Self { len: 0, bytes: [0; N] }
    }

    /// Copies `bytes` into a new `Domainname`, or returns `None` if they don't fit in
    /// [`Self::CAPACITY`]. The bytes are never truncated.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > Self::CAPACITY {
            return None;
        }

        let mut name = Self::new();
        name.bytes[..bytes.len()].copy_from_slice(bytes);
        name.len = bytes.len() as u8;
        Some(name)
    }

    /// Returns the length of this name, in bytes.
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Returns the name as a string slice, or `None` if it isn't valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(self.as_bytes()).ok()
    }
}

impl<const N: usize> Default for Domainname<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Deref for Domainname<N> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.as_bytes()
    }
}

impl<const N: usize> PartialEq for Domainname<N> {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl<const N: usize> Eq for Domainname<N> {}

impl<const N: usize> Hash for Domainname<N> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_bytes().hash(state)
    }
}

impl<'a, const N: usize> TryFrom<&'a str> for Domainname<N> {
    type Error = usize;

    /// Fails with the length of the string if it's longer than [`Self::CAPACITY`].
    fn try_from(value: &'a str) -> Result<Self, Self::Error> {
        Self::from_bytes(value.as_bytes()).ok_or(value.len())
    }
}

impl<const N: usize> fmt::Debug for Domainname<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&String::from_utf8_lossy(self.as_bytes()), f)
    }
}

impl<const N: usize> fmt::Display for Domainname<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&String::from_utf8_lossy(self.as_bytes()), f)
    }
}

#[cfg(test)]
mod tests {
    use super::{Domainname, MAX_DOMAINNAME_LEN};

    #[test]
    fn test_capacity_clamped() {
        assert_eq!(Domainname::<MAX_DOMAINNAME_LEN>::CAPACITY, 255);
        assert_eq!(Domainname::<8>::CAPACITY, 8);
        assert_eq!(Domainname::<1000>::CAPACITY, 255);
    }

    #[test]
    fn test_from_bytes() {
        let name = Domainname::<8>::from_bytes(b"example").unwrap();
        assert_eq!(name.len(), 7);
        assert_eq!(name.as_str(), Some("example"));
        assert_eq!(&*name, b"example");

        assert_eq!(Domainname::<8>::from_bytes(b"examples"), Domainname::try_from("examples").ok());
        assert_eq!(Domainname::<8>::from_bytes(b"example.com"), None);
        assert_eq!(Domainname::<8>::try_from("example.com"), Err(11));
    }

    #[test]
    fn test_non_utf8() {
        let name = Domainname::<MAX_DOMAINNAME_LEN>::from_bytes(&[b'a', 0xFF, b'b']).unwrap();
        assert_eq!(name.as_str(), None);
        assert_eq!(name.to_string(), "a\u{FFFD}b");
    }
}
