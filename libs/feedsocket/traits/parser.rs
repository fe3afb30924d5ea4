/// A data frame received from or sent to the feed
///
/// Control frames (ping/pong/close) never surface as `WsMessage`;
/// the client answers pings itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl WsMessage {
    /// Get the message as text, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsMessage::Text(s) => Some(s),
            WsMessage::Binary(_) => None,
        }
    }

    /// Get the message as binary, if it is binary
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            WsMessage::Text(_) => None,
            WsMessage::Binary(b) => Some(b),
        }
    }

    /// Text view of the payload, decoding binary frames as UTF-8
    ///
    /// Some feeds deliver JSON in binary frames.
    pub fn text_lossy(&self) -> std::borrow::Cow<'_, str> {
        match self {
            WsMessage::Text(s) => std::borrow::Cow::Borrowed(s.as_str()),
            WsMessage::Binary(b) => String::from_utf8_lossy(b),
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        match self {
            WsMessage::Text(s) => s.len(),
            WsMessage::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for WsMessage {
    fn from(text: String) -> Self {
        WsMessage::Text(text)
    }
}

impl From<&str> for WsMessage {
    fn from(text: &str) -> Self {
        WsMessage::Text(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_json_decodes_as_text() {
        let msg = WsMessage::Binary(br#"{"a":1}"#.to_vec());
        assert_eq!(msg.text_lossy(), r#"{"a":1}"#);
        assert!(msg.as_text().is_none());
        assert_eq!(msg.len(), 7);
    }

    #[test]
    fn test_from_str() {
        let msg: WsMessage = "hello".into();
        assert_eq!(msg.as_text(), Some("hello"));
        assert!(!msg.is_empty());
    }
}
