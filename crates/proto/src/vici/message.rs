//! VICI message encoding
//!
//! A message is an ordered sequence of named elements. Each element is a
//! key/value pair, a list of values, or a nested section:
//!
//! ```text
//! byte      SECTION_START (1)   byte name_len   name
//! byte      SECTION_END (2)
//! byte      KEY_VALUE (3)       byte name_len   name   uint16 len   value
//! byte      LIST_START (4)      byte name_len   name
//! byte      LIST_ITEM (5)       uint16 len      value
//! byte      LIST_END (6)
//! ```

use bytes::{Buf, BufMut, BytesMut};
use swanmon_platform::{SwanmonError, SwanmonResult};

/// Nested section depth accepted when decoding
const MAX_DEPTH: usize = 64;

/// Element type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ElementType {
    /// Begin a named section
    SectionStart = 1,
    /// End the innermost section
    SectionEnd = 2,
    /// Named value
    KeyValue = 3,
    /// Begin a named list
    ListStart = 4,
    /// List value
    ListItem = 5,
    /// End the current list
    ListEnd = 6,
}

impl ElementType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::SectionStart),
            2 => Some(Self::SectionEnd),
            3 => Some(Self::KeyValue),
            4 => Some(Self::ListStart),
            5 => Some(Self::ListItem),
            6 => Some(Self::ListEnd),
            _ => None,
        }
    }
}

/// Message element value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    /// Raw value
    Value(Vec<u8>),
    /// List of raw values
    List(Vec<Vec<u8>>),
    /// Nested section
    Section(Message),
}

/// Ordered VICI message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    entries: Vec<(String, Element)>,
}

impl Message {
    /// Create an empty message
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element
    pub fn insert(&mut self, key: impl Into<String>, element: Element) {
        self.entries.push((key.into(), element));
    }

    /// Append a key/value pair, builder style
    pub fn with_value(mut self, key: impl Into<String>, value: impl AsRef<[u8]>) -> Self {
        self.insert(key, Element::Value(value.as_ref().to_vec()));
        self
    }

    /// Append a list, builder style
    pub fn with_list<I, V>(mut self, key: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: AsRef<[u8]>,
    {
        let items = items.into_iter().map(|v| v.as_ref().to_vec()).collect();
        self.insert(key, Element::List(items));
        self
    }

    /// Append a section, builder style
    pub fn with_section(mut self, key: impl Into<String>, section: Message) -> Self {
        self.insert(key, Element::Section(section));
        self
    }

    /// First element stored under `key`
    pub fn get(&self, key: &str) -> Option<&Element> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, element)| element)
    }

    /// Value stored under `key`, decoded as UTF-8 (lossy)
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Element::Value(value) => Some(String::from_utf8_lossy(value).into_owned()),
            _ => None,
        }
    }

    /// Section stored under `key`
    pub fn get_section(&self, key: &str) -> Option<&Message> {
        match self.get(key)? {
            Element::Section(section) => Some(section),
            _ => None,
        }
    }

    /// List stored under `key`, decoded as UTF-8 (lossy)
    pub fn get_list(&self, key: &str) -> Option<Vec<String>> {
        match self.get(key)? {
            Element::List(items) => Some(
                items
                    .iter()
                    .map(|item| String::from_utf8_lossy(item).into_owned())
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Elements in wire order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Element)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of top-level elements
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the message has no elements
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check a command result
    ///
    /// # Errors
    ///
    /// Returns `SwanmonError::Protocol` carrying `errmsg` when the message
    /// reports `success = no`.
    pub fn check_success(&self) -> SwanmonResult<()> {
        if self.get_str("success").as_deref() == Some("no") {
            let errmsg = self
                .get_str("errmsg")
                .unwrap_or_else(|| "command failed".to_string());
            return Err(SwanmonError::Protocol(errmsg));
        }
        Ok(())
    }

    /// Serialize into `buf`
    ///
    /// # Errors
    ///
    /// Returns an error if a name exceeds 255 bytes or a value exceeds
    /// 65535 bytes.
    pub fn encode(&self, buf: &mut BytesMut) -> SwanmonResult<()> {
        for (key, element) in &self.entries {
            match element {
                Element::Value(value) => {
                    buf.put_u8(ElementType::KeyValue as u8);
                    put_name(buf, key)?;
                    put_value(buf, value)?;
                }
                Element::List(items) => {
                    buf.put_u8(ElementType::ListStart as u8);
                    put_name(buf, key)?;
                    for item in items {
                        buf.put_u8(ElementType::ListItem as u8);
                        put_value(buf, item)?;
                    }
                    buf.put_u8(ElementType::ListEnd as u8);
                }
                Element::Section(section) => {
                    buf.put_u8(ElementType::SectionStart as u8);
                    put_name(buf, key)?;
                    section.encode(buf)?;
                    buf.put_u8(ElementType::SectionEnd as u8);
                }
            }
        }
        Ok(())
    }

    /// Serialize to a new buffer
    ///
    /// # Errors
    ///
    /// See [`Message::encode`].
    pub fn to_bytes(&self) -> SwanmonResult<Vec<u8>> {
        let mut buf = BytesMut::new();
        self.encode(&mut buf)?;
        Ok(buf.to_vec())
    }

    /// Parse a complete message
    ///
    /// # Errors
    ///
    /// Returns `SwanmonError::Protocol` for truncated input, unknown element
    /// types, unbalanced sections or lists, and excessive nesting.
    pub fn from_bytes(data: &[u8]) -> SwanmonResult<Self> {
        let mut buf = data;
        let mut current = Message::new();
        let mut parents: Vec<(String, Message)> = Vec::new();
        let mut list: Option<(String, Vec<Vec<u8>>)> = None;

        while buf.has_remaining() {
            let tag = buf.get_u8();
            let element = ElementType::from_u8(tag)
                .ok_or_else(|| SwanmonError::Protocol(format!("Unknown element type: {}", tag)))?;

            if list.is_some() && !matches!(element, ElementType::ListItem | ElementType::ListEnd) {
                return Err(SwanmonError::Protocol(format!(
                    "Unexpected {:?} inside list",
                    element
                )));
            }

            match element {
                ElementType::SectionStart => {
                    if parents.len() >= MAX_DEPTH {
                        return Err(SwanmonError::Protocol("Sections nested too deeply".into()));
                    }
                    let name = get_name(&mut buf)?;
                    parents.push((name, std::mem::take(&mut current)));
                }
                ElementType::SectionEnd => {
                    let (name, mut parent) = parents
                        .pop()
                        .ok_or_else(|| SwanmonError::Protocol("Unbalanced section end".into()))?;
                    parent.insert(name, Element::Section(std::mem::take(&mut current)));
                    current = parent;
                }
                ElementType::KeyValue => {
                    let name = get_name(&mut buf)?;
                    let value = get_value(&mut buf)?;
                    current.insert(name, Element::Value(value));
                }
                ElementType::ListStart => {
                    let name = get_name(&mut buf)?;
                    list = Some((name, Vec::new()));
                }
                ElementType::ListItem => {
                    let value = get_value(&mut buf)?;
                    match list.as_mut() {
                        Some((_, items)) => items.push(value),
                        None => {
                            return Err(SwanmonError::Protocol("List item outside list".into()))
                        }
                    }
                }
                ElementType::ListEnd => {
                    let (name, items) = list
                        .take()
                        .ok_or_else(|| SwanmonError::Protocol("Unbalanced list end".into()))?;
                    current.insert(name, Element::List(items));
                }
            }
        }

        if list.is_some() || !parents.is_empty() {
            return Err(SwanmonError::Protocol("Message truncated".into()));
        }
        Ok(current)
    }
}

pub(super) fn put_name(buf: &mut BytesMut, name: &str) -> SwanmonResult<()> {
    let len = u8::try_from(name.len())
        .map_err(|_| SwanmonError::Protocol(format!("Name too long: {} bytes", name.len())))?;
    buf.put_u8(len);
    buf.put_slice(name.as_bytes());
    Ok(())
}

fn put_value(buf: &mut BytesMut, value: &[u8]) -> SwanmonResult<()> {
    let len = u16::try_from(value.len())
        .map_err(|_| SwanmonError::Protocol(format!("Value too long: {} bytes", value.len())))?;
    buf.put_u16(len);
    buf.put_slice(value);
    Ok(())
}

pub(super) fn get_name(buf: &mut &[u8]) -> SwanmonResult<String> {
    if buf.remaining() < 1 {
        return Err(SwanmonError::Protocol("Truncated name length".into()));
    }
    let len = buf.get_u8() as usize;
    if buf.remaining() < len {
        return Err(SwanmonError::Protocol(format!(
            "Truncated name: expected {} bytes, got {}",
            len,
            buf.remaining()
        )));
    }
    let name = String::from_utf8_lossy(&buf[..len]).into_owned();
    buf.advance(len);
    Ok(name)
}

fn get_value(buf: &mut &[u8]) -> SwanmonResult<Vec<u8>> {
    if buf.remaining() < 2 {
        return Err(SwanmonError::Protocol("Truncated value length".into()));
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(SwanmonError::Protocol(format!(
            "Truncated value: expected {} bytes, got {}",
            len,
            buf.remaining()
        )));
    }
    let value = buf[..len].to_vec();
    buf.advance(len);
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        Message::new()
            .with_value("version", "2")
            .with_list("local-vips", ["10.3.0.1", "fec3::1"])
            .with_section(
                "child-sas",
                Message::new().with_section("rw-1", Message::new().with_value("uniqueid", "1")),
            )
    }

    #[test]
    fn test_element_type_conversion() {
        assert_eq!(ElementType::from_u8(1), Some(ElementType::SectionStart));
        assert_eq!(ElementType::from_u8(6), Some(ElementType::ListEnd));
        assert_eq!(ElementType::from_u8(0), None);
        assert_eq!(ElementType::from_u8(7), None);
    }

    #[test]
    fn test_encode_layout() {
        let bytes = Message::new().with_value("a", "xy").to_bytes().unwrap();
        assert_eq!(bytes, vec![3, 1, b'a', 0, 2, b'x', b'y']);

        let bytes = Message::new().with_list("l", ["v"]).to_bytes().unwrap();
        assert_eq!(bytes, vec![4, 1, b'l', 5, 0, 1, b'v', 6]);
    }

    #[test]
    fn test_nested_sections_decode() {
        let message = sample();
        let decoded = Message::from_bytes(&message.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, message);

        let child = decoded
            .get_section("child-sas")
            .and_then(|s| s.get_section("rw-1"))
            .unwrap();
        assert_eq!(child.get_str("uniqueid").as_deref(), Some("1"));
        assert_eq!(
            decoded.get_list("local-vips").unwrap(),
            vec!["10.3.0.1", "fec3::1"]
        );
        assert!(decoded.get_section("version").is_none());
    }

    #[test]
    fn test_order_preserved() {
        let message = Message::new()
            .with_value("z", "1")
            .with_value("a", "2")
            .with_value("m", "3");
        let decoded = Message::from_bytes(&message.to_bytes().unwrap()).unwrap();
        let keys: Vec<_> = decoded.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_truncated_rejected() {
        let bytes = Message::new()
            .with_section("outer", sample())
            .to_bytes()
            .unwrap();
        for len in 1..bytes.len() {
            assert!(
                Message::from_bytes(&bytes[..len]).is_err(),
                "prefix of {} bytes accepted",
                len
            );
        }
    }

    #[test]
    fn test_malformed_rejected() {
        assert!(Message::from_bytes(&[2]).is_err());
        assert!(Message::from_bytes(&[6]).is_err());
        assert!(Message::from_bytes(&[5, 0, 0]).is_err());
        assert!(Message::from_bytes(&[9]).is_err());
        assert!(Message::from_bytes(&[4, 1, b'l', 3, 1, b'k', 0, 0]).is_err());
        assert!(Message::from_bytes(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_check_success() {
        assert!(Message::new().check_success().is_ok());
        assert!(Message::new().with_value("success", "yes").check_success().is_ok());

        let err = Message::new()
            .with_value("success", "no")
            .with_value("errmsg", "no matching SA")
            .check_success()
            .unwrap_err();
        assert!(matches!(err, SwanmonError::Protocol(ref msg) if msg == "no matching SA"));
    }

    #[test]
    fn test_oversized_value_rejected() {
        let message = Message::new().with_value("big", vec![0u8; 70_000]);
        assert!(message.to_bytes().is_err());
    }
}
