//! The multi-frame wire message. Every command, reply and published event is
//! a sequence of opaque byte frames — `[routing] [empty] [tag] [command]
//! [key] [value] ...` for commands, `[topic] [key] [value] ...` for events —
//! exactly as laid out in the bridge control and event protocols. Frame
//! *meaning* is assigned by the message queue and handlers; this type only
//! knows how to move the frames across the wire intact.

use bridgeutil::error::{ErrorType, NetworkError, NetworkResult};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

pub const MAX_FRAMES: u16 = 4096;
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Message {
    frames: Vec<Vec<u8>>,
}

impl Message {
    #[inline]
    pub fn new() -> Message {
        Message { frames: Vec::new() }
    }

    #[inline]
    pub fn from_frames(frames: Vec<Vec<u8>>) -> Message {
        Message { frames }
    }

    #[inline]
    pub fn push(&mut self, frame: impl Into<Vec<u8>>) -> &mut Message {
        self.frames.push(frame.into());
        self
    }

    #[inline]
    pub fn push_empty(&mut self) -> &mut Message {
        self.frames.push(Vec::new());
        self
    }

    #[inline]
    pub fn frames(&self) -> &[Vec<u8>] {
        &self.frames
    }

    #[inline]
    pub fn into_frames(self) -> Vec<Vec<u8>> {
        self.frames
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    #[inline]
    pub fn frame(&self, idx: usize) -> Option<&[u8]> {
        self.frames.get(idx).map(Vec::as_slice)
    }

    /// Encodes the message as `frame_count (u16) | (len (u32) | bytes)*`.
    pub fn encode(&self) -> NetworkResult<Vec<u8>> {
        if self.frames.len() > MAX_FRAMES as usize {
            return Err(NetworkError::Fatal(ErrorType::PayloadTooLarge));
        }

        let mut out = Vec::new();
        out.write_u16::<BigEndian>(self.frames.len() as u16)?;

        for frame in &self.frames {
            if frame.len() as u64 > MAX_FRAME_SIZE as u64 {
                return Err(NetworkError::Fatal(ErrorType::PayloadTooLarge));
            }
            out.write_u32::<BigEndian>(frame.len() as u32)?;
            out.extend_from_slice(frame);
        }

        Ok(out)
    }

    /// Decodes a message previously produced by `encode`.
    pub fn decode(bytes: &[u8]) -> NetworkResult<Message> {
        let mut cursor = Cursor::new(bytes);
        let frame_count = cursor.read_u16::<BigEndian>()?;

        if frame_count > MAX_FRAMES {
            return Err(NetworkError::Fatal(ErrorType::PayloadTooLarge));
        }

        let mut frames = Vec::with_capacity(frame_count as usize);

        for _ in 0..frame_count {
            let len = cursor.read_u32::<BigEndian>()?;
            if len > MAX_FRAME_SIZE {
                return Err(NetworkError::Fatal(ErrorType::PayloadTooLarge));
            }

            let start = cursor.position() as usize;
            let end = start + len as usize;
            if end > bytes.len() {
                return Err(NetworkError::Fatal(ErrorType::Serialization));
            }

            frames.push(bytes[start..end].to_vec());
            cursor.set_position(end as u64);
        }

        Ok(Message { frames })
    }
}

impl From<Vec<Vec<u8>>> for Message {
    #[inline]
    fn from(frames: Vec<Vec<u8>>) -> Message {
        Message { frames }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_frame() {
        let msg = Message::from_frames(vec![
            b"routing-id".to_vec(),
            Vec::new(),
            b"tag-1".to_vec(),
            b"call".to_vec(),
            b"position".to_vec(),
            b"\"north\"".to_vec(),
        ]);

        let encoded = msg.encode().unwrap();
        let decoded = Message::decode(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn rejects_truncated_input() {
        let msg = Message::from_frames(vec![b"only-frame".to_vec()]);
        let mut encoded = msg.encode().unwrap();
        encoded.truncate(encoded.len() - 2);
        assert!(Message::decode(&encoded).is_err());
    }
}
