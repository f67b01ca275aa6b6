use bytes::Bytes;
use std::fmt;

/// Semantic close codes understood by both sides of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// Graceful closure, either side may initiate
    Normal,
    /// The endpoint is leaving; the peer may reconnect
    GoingAway,
    /// Protocol violation; no retry expected
    UnacceptableData,
    /// Any other code carried by the transport
    Other(u16),
}

impl CloseCode {
    /// Numeric value on the wire (RFC 6455 numbering)
    pub fn as_u16(self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::UnacceptableData => 1003,
            CloseCode::Other(code) => code,
        }
    }

    /// Map a numeric close code back to its semantic value
    pub fn from_u16(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1003 => CloseCode::UnacceptableData,
            other => CloseCode::Other(other),
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseCode::Normal => write!(f, "normal (1000)"),
            CloseCode::GoingAway => write!(f, "going-away (1001)"),
            CloseCode::UnacceptableData => write!(f, "unacceptable-data (1003)"),
            CloseCode::Other(code) => write!(f, "{code}"),
        }
    }
}

/// One discrete unit delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Encoded message payload
    Binary(Bytes),
    /// Text payload; channels only accept binary
    Text(String),
    /// Close signal, with the code when the peer sent one
    Close(Option<CloseCode>),
}

impl Frame {
    /// Short name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Binary(_) => "binary",
            Frame::Text(_) => "text",
            Frame::Close(_) => "close",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_code_numbering() {
        assert_eq!(CloseCode::Normal.as_u16(), 1000);
        assert_eq!(CloseCode::GoingAway.as_u16(), 1001);
        assert_eq!(CloseCode::UnacceptableData.as_u16(), 1003);
        assert_eq!(CloseCode::from_u16(1003), CloseCode::UnacceptableData);
        assert_eq!(CloseCode::from_u16(4000), CloseCode::Other(4000));
        assert_eq!(CloseCode::Other(4000).as_u16(), 4000);
    }

    #[test]
    fn frame_kind_names() {
        assert_eq!(Frame::Binary(Bytes::new()).kind(), "binary");
        assert_eq!(Frame::Text(String::new()).kind(), "text");
        assert_eq!(Frame::Close(None).kind(), "close");
    }
}
