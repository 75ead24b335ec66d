//! One length-prefixed record on a channel: a category byte followed by a
//! 4-byte length and that many bytes. Category `Payload` carries an
//! application `Message`; the others are zero-payload control signals.

use bridgeutil::error::{ErrorType, NetworkError};

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum Category {
    Payload = 0,
    Keepalive = 1,
    ConnectionAccepted = 2,
    ConnectionClosed = 3,
}

impl From<Category> for u8 {
    #[inline]
    fn from(cat: Category) -> Self {
        cat as u8
    }
}

impl Category {
    #[inline]
    pub fn from_byte(byte: u8) -> Result<Category, NetworkError> {
        match byte {
            0 => Ok(Category::Payload),
            1 => Ok(Category::Keepalive),
            2 => Ok(Category::ConnectionAccepted),
            3 => Ok(Category::ConnectionClosed),
            _ => Err(NetworkError::Fatal(ErrorType::IncorrectCategory)),
        }
    }
}

#[derive(Debug, Eq, PartialEq)]
pub enum ControlFrame {
    Keepalive,
    ConnectionAccepted,
    ConnectionClosed,
}

impl ControlFrame {
    #[inline]
    pub fn category(&self) -> Category {
        match self {
            ControlFrame::Keepalive => Category::Keepalive,
            ControlFrame::ConnectionAccepted => Category::ConnectionAccepted,
            ControlFrame::ConnectionClosed => Category::ConnectionClosed,
        }
    }
}

#[derive(Debug, Eq, PartialEq)]
pub enum Frame {
    Control(ControlFrame),
    Payload(Vec<u8>),
}

impl Frame {
    #[inline]
    pub fn from_parts(category: Category, payload: Vec<u8>) -> Frame {
        match category {
            Category::Payload => Frame::Payload(payload),
            Category::Keepalive => Frame::Control(ControlFrame::Keepalive),
            Category::ConnectionAccepted => Frame::Control(ControlFrame::ConnectionAccepted),
            Category::ConnectionClosed => Frame::Control(ControlFrame::ConnectionClosed),
        }
    }
}
