use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Delimiter written after every message on a consumer connection.
pub const FRAME_DELIMITER: u8 = b'\n';

/// One publisher connection's entire input stream.
///
/// A message carries no id, timestamp, or size bound. It is created when the
/// publisher closes its connection and handed, unmodified, to exactly one
/// consumer.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    payload: Bytes,
}

impl Message {
    #[inline]
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Lossy UTF-8 view of the payload.
    pub fn as_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// Encodes the consumer-side frame: `payload` followed by `\n`.
    ///
    /// The frame is built in one buffer so it goes out in a single write.
    pub fn to_frame(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.payload.len() + 1);
        buf.extend_from_slice(&self.payload);
        buf.put_u8(FRAME_DELIMITER);
        buf.freeze()
    }
}

impl From<Vec<u8>> for Message {
    fn from(v: Vec<u8>) -> Self {
        Message::new(v)
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Message::new(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Message::new(s.into_bytes())
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("len", &self.payload.len())
            .field("payload", &self.as_text())
            .finish()
    }
}
