//! NDN names and name components.
//!
//! A name is an ordered sequence of opaque byte components. The textual
//! form follows the NDN URI scheme: components are joined with `/`, bytes
//! outside the unreserved set are percent-encoded, and a component made
//! entirely of periods gains three extra periods so the empty component
//! survives the round trip.
//!
//! Ordering is NDN canonical order: shorter components sort before longer
//! ones, equal-length components compare bytewise, and a name sorts before
//! any name it is a proper prefix of. This is what lets the certificate
//! stores answer longest-prefix queries out of a `BTreeMap`.

use std::cmp::Ordering;
use std::fmt;

/// A single name component: an opaque sequence of bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Component {
    value: Vec<u8>,
}

impl Component {
    /// Creates a component from raw bytes. No escaping is applied.
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// The raw component bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.value
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Decodes one URI segment, undoing percent-escapes first.
    ///
    /// Returns `None` for segments that reduce to zero, one or two
    /// periods; those have no component form and callers skip them.
    /// A segment of three or more periods encodes a component of
    /// `length - 3` periods.
    pub fn from_escaped_string(segment: &str) -> Option<Self> {
        let value = unescape(segment.trim());
        if value.iter().all(|&b| b == b'.') {
            if value.len() < 3 {
                return None;
            }
            return Some(Self::new(&value[3..]));
        }
        Some(Self::new(value))
    }

    /// Encodes the component as a URI segment.
    pub fn to_escaped_string(&self) -> String {
        self.to_string()
    }

    /// Interprets the bytes as a big-endian unsigned integer.
    pub fn to_number(&self) -> u64 {
        self.value
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
    }

    /// Encodes a big-endian unsigned integer in the shortest of the
    /// 1, 2, 4 or 8 byte widths that fits.
    pub fn from_number(number: u64) -> Self {
        let bytes: Vec<u8> = if number <= 0xff {
            vec![number as u8]
        } else if number <= 0xffff {
            (number as u16).to_be_bytes().to_vec()
        } else if number <= 0xffff_ffff {
            (number as u32).to_be_bytes().to_vec()
        } else {
            number.to_be_bytes().to_vec()
        };
        Self::new(bytes)
    }
}

impl From<&str> for Component {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl From<String> for Component {
    fn from(value: String) -> Self {
        Self::new(value.into_bytes())
    }
}

impl From<&[u8]> for Component {
    fn from(value: &[u8]) -> Self {
        Self::new(value)
    }
}

impl From<Vec<u8>> for Component {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value
            .len()
            .cmp(&other.value.len())
            .then_with(|| self.value.cmp(&other.value))
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.iter().all(|&b| b == b'.') {
            for _ in 0..self.value.len() + 3 {
                f.write_str(".")?;
            }
            return Ok(());
        }
        for &b in &self.value {
            if b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.' | b'_') {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "%{b:02X}")?;
            }
        }
        Ok(())
    }
}

/// Undoes `%XX` escapes. A `%` not followed by two hex digits is kept
/// literally, together with the characters it would have consumed.
fn unescape(segment: &str) -> Vec<u8> {
    fn hex_value(b: u8) -> Option<u8> {
        (b as char).to_digit(16).map(|v| v as u8)
    }

    let bytes = segment.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                (Some(hi), Some(lo)) => result.push(hi << 4 | lo),
                _ => result.extend_from_slice(&bytes[i..i + 3]),
            }
            i += 3;
        } else {
            result.push(bytes[i]);
            i += 1;
        }
    }
    result
}

/// A hierarchical NDN name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Name {
    components: Vec<Component>,
}

impl Name {
    /// The empty name, printed as `/`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an NDN URI. Parsing is lenient: an optional `ndn:` scheme
    /// and authority are accepted, repeated slashes collapse, and
    /// segments with no component form (`.`, `..`) are skipped.
    pub fn from_uri(uri: &str) -> Self {
        let mut rest = uri.trim();
        if let Some(stripped) = rest.strip_prefix("ndn:") {
            rest = stripped;
        }
        if let Some(stripped) = rest.strip_prefix("//") {
            rest = stripped.find('/').map_or("", |i| &stripped[i..]);
        }
        let components = rest
            .split('/')
            .filter(|segment| !segment.is_empty())
            .filter_map(Component::from_escaped_string)
            .collect();
        Self { components }
    }

    pub fn from_components(components: Vec<Component>) -> Self {
        Self { components }
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Component> {
        self.components.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Component> {
        self.components.iter()
    }

    /// Appends a component, returning the extended name.
    #[must_use]
    pub fn append(mut self, component: impl Into<Component>) -> Self {
        self.components.push(component.into());
        self
    }

    pub fn push(&mut self, component: impl Into<Component>) {
        self.components.push(component.into());
    }

    /// The first `count` components (all of them when `count` exceeds
    /// the length).
    pub fn prefix(&self, count: usize) -> Name {
        Self {
            components: self.components[..count.min(self.components.len())].to_vec(),
        }
    }

    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.components.len() <= other.components.len()
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(a, b)| a == b)
    }
}

impl From<&str> for Name {
    fn from(uri: &str) -> Self {
        Self::from_uri(uri)
    }
}

impl std::ops::Index<usize> for Name {
    type Output = Component;

    fn index(&self, index: usize) -> &Component {
        &self.components[index]
    }
}

impl<'a> IntoIterator for &'a Name {
    type Item = &'a Component;
    type IntoIter = std::slice::Iter<'a, Component>;

    fn into_iter(self) -> Self::IntoIter {
        self.components.iter()
    }
}

impl FromIterator<Component> for Name {
    fn from_iter<I: IntoIterator<Item = Component>>(iter: I) -> Self {
        Self {
            components: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{component}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_round_trip() {
        for uri in ["/", "/hello/world", "/a/b/c/d", "/KEY/%00%01"] {
            let name = Name::from_uri(uri);
            assert_eq!(name.to_string(), uri);
        }
    }

    #[test]
    fn lenient_parse() {
        assert_eq!(Name::from_uri(""), Name::new());
        assert_eq!(Name::from_uri("   /a/b  "), Name::from_uri("/a/b"));
        assert_eq!(Name::from_uri("a/b"), Name::from_uri("/a/b"));
        assert_eq!(Name::from_uri("/a//b/"), Name::from_uri("/a/b"));
        assert_eq!(Name::from_uri("ndn://host/a/b"), Name::from_uri("/a/b"));
        assert_eq!(Name::from_uri("/a/./b/../c"), Name::from_uri("/a/b/c"));
    }

    #[test]
    fn dot_components() {
        assert_eq!(Component::from_escaped_string("."), None);
        assert_eq!(Component::from_escaped_string(".."), None);
        assert_eq!(
            Component::from_escaped_string("..."),
            Some(Component::new(b"".as_slice()))
        );
        assert_eq!(
            Component::from_escaped_string("...."),
            Some(Component::from("."))
        );
        assert_eq!(Component::new(b"".as_slice()).to_escaped_string(), "...");
        assert_eq!(Component::from("..").to_escaped_string(), ".....");
        assert_eq!(Component::from(".a").to_escaped_string(), ".a");
    }

    #[test]
    fn percent_escapes() {
        assert_eq!(
            Component::from_escaped_string("%41%62"),
            Some(Component::from("Ab"))
        );
        // Lowercase digits decode; encoding always emits uppercase.
        assert_eq!(
            Component::from_escaped_string("%2f"),
            Some(Component::from("/"))
        );
        assert_eq!(Component::from("/").to_escaped_string(), "%2F");
        assert_eq!(Component::from("a b").to_escaped_string(), "a%20b");
        // A malformed escape is kept literally.
        assert_eq!(
            Component::from_escaped_string("%4g"),
            Some(Component::from("%4g"))
        );
        assert_eq!(
            Component::from_escaped_string("a%4"),
            Some(Component::from("a%4"))
        );
    }

    #[test]
    fn canonical_order_is_shortlex() {
        assert!(Component::from("b") < Component::from("aa"));
        assert!(Component::from("aa") < Component::from("ab"));
        assert!(Name::from_uri("/a") < Name::from_uri("/a/b"));
        assert!(Name::from_uri("/a/b") < Name::from_uri("/b"));
        assert!(Name::from_uri("/") < Name::from_uri("/a"));
    }

    #[test]
    fn numbers() {
        assert_eq!(Component::from_number(0).as_bytes(), [0x00]);
        assert_eq!(Component::from_number(0x1234).as_bytes(), [0x12, 0x34]);
        assert_eq!(
            Component::from_number(0x0100_0000).as_bytes(),
            [0x01, 0x00, 0x00, 0x00]
        );
        assert_eq!(Component::from_number(u64::MAX).as_bytes(), [0xff; 8]);
        for number in [0, 1, 255, 256, 0x1_0000_0000, u64::MAX] {
            assert_eq!(Component::from_number(number).to_number(), number);
        }
        assert_eq!(Component::new([0x01, 0x00]).to_number(), 256);
    }

    #[test]
    fn prefixes() {
        let name = Name::from_uri("/a/b/c");
        assert_eq!(name.prefix(2), Name::from_uri("/a/b"));
        assert_eq!(name.prefix(9), name);
        assert!(Name::from_uri("/a/b").is_prefix_of(&name));
        assert!(name.is_prefix_of(&name));
        assert!(!Name::from_uri("/a/c").is_prefix_of(&name));
        assert!(Name::new().is_prefix_of(&name));
    }
}
