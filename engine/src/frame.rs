// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Control messages exchanged over a channel.
//!
//! A [`Frame`] is one cache line: an 8 byte header (action, payload length, reserved word)
//! followed by the payload. On the wire every field is little endian.

use static_assertions::const_assert_eq;
use std::fmt::{Debug, Display, Formatter};

/// Size of a frame, in bytes.
pub const FRAME_SIZE: usize = 64;
/// Header bytes ahead of the payload.
pub const FRAME_HEADER_LEN: usize = 8;
/// Payload capacity of a frame.
pub const MAX_PAYLOAD: usize = FRAME_SIZE - FRAME_HEADER_LEN;

/// Command carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Action {
    Unknown = 0,
    Exit = 1,
    Launch = 2,
    Port = 3,
}

impl Action {
    /// Decode an action code; codes out of range map to [`Action::Unknown`].
    #[must_use]
    pub const fn from_code(code: u16) -> Action {
        match code {
            1 => Action::Exit,
            2 => Action::Launch,
            3 => Action::Port,
            _ => Action::Unknown,
        }
    }

    #[must_use]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Name of an action code, as it appears in logs.
    #[must_use]
    pub const fn name(code: u16) -> &'static str {
        match code {
            0 => "NOOP",
            1 => "EXIT",
            2 => "LAUNCH",
            3 => "PORT",
            _ => "Unknown",
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Action::name(self.code()))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("payload of {len} bytes exceeds the {MAX_PAYLOAD} byte frame capacity")]
    PayloadTooLong { len: usize },
    #[error("{action} payload of {len} bytes is shorter than {expected}")]
    ShortPayload {
        action: Action,
        len: usize,
        expected: usize,
    },
}

/// Fixed size control message.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C, align(64))]
pub struct Frame {
    action: u16,
    len: u16,
    reserved: u32,
    data: [u8; MAX_PAYLOAD],
}

const_assert_eq!(std::mem::size_of::<Frame>(), FRAME_SIZE);

impl Frame {
    /// Build a frame for `action` carrying `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::PayloadTooLong`] if `payload` does not fit.
    pub fn new(action: Action, payload: &[u8]) -> Result<Frame, FrameError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLong { len: payload.len() });
        }
        let mut data = [0u8; MAX_PAYLOAD];
        data[..payload.len()].copy_from_slice(payload);
        #[allow(clippy::cast_possible_truncation)] // bounded by MAX_PAYLOAD
        let len = payload.len() as u16;
        Ok(Frame {
            action: action.code(),
            len,
            reserved: 0,
            data,
        })
    }

    /// Exit frame.
    #[must_use]
    pub fn exit() -> Frame {
        Message::Exit.to_frame()
    }

    /// Launch frame; with `call_main` the main core runs a worker as well.
    #[must_use]
    pub fn launch(call_main: bool) -> Frame {
        Message::Launch(LaunchMsg { call_main }).to_frame()
    }

    /// Port control frame for the ports set in `portlist`.
    #[must_use]
    pub fn port(portlist: u32, enable: bool) -> Frame {
        Message::Port(PortCtlMsg { portlist, enable }).to_frame()
    }

    /// Raw action code.
    #[must_use]
    pub const fn action_code(&self) -> u16 {
        self.action
    }

    #[must_use]
    pub const fn action(&self) -> Action {
        Action::from_code(self.action)
    }

    /// Declared payload length. It is not validated until the frame is decoded.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The declared payload.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::PayloadTooLong`] if the declared length exceeds the capacity.
    pub fn payload(&self) -> Result<&[u8], FrameError> {
        self.data
            .get(..self.len())
            .ok_or(FrameError::PayloadTooLong { len: self.len() })
    }

    /// Decode the frame into a [`Message`].
    pub fn message(&self) -> Result<Message, FrameError> {
        let payload = self.payload()?;
        let action = self.action();
        let word = |index: usize| -> Result<u32, FrameError> {
            let start = index * 4;
            payload
                .get(start..start + 4)
                .and_then(|bytes| bytes.try_into().ok())
                .map(u32::from_le_bytes)
                .ok_or(FrameError::ShortPayload {
                    action,
                    len: payload.len(),
                    expected: start + 4,
                })
        };
        Ok(match action {
            Action::Unknown => Message::Unknown(self.action),
            Action::Exit => Message::Exit,
            Action::Launch => Message::Launch(LaunchMsg {
                call_main: word(0)? != 0,
            }),
            Action::Port => Message::Port(PortCtlMsg {
                portlist: word(0)?,
                enable: word(1)? != 0,
            }),
        })
    }

    /// Wire image of the frame.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; FRAME_SIZE] {
        let mut bytes = [0u8; FRAME_SIZE];
        bytes[0..2].copy_from_slice(&self.action.to_le_bytes());
        bytes[2..4].copy_from_slice(&self.len.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.reserved.to_le_bytes());
        bytes[FRAME_HEADER_LEN..].copy_from_slice(&self.data);
        bytes
    }

    /// Frame from its wire image. Nothing is validated; see [`Frame::message`].
    #[must_use]
    pub fn from_bytes(bytes: &[u8; FRAME_SIZE]) -> Frame {
        let mut data = [0u8; MAX_PAYLOAD];
        data.copy_from_slice(&bytes[FRAME_HEADER_LEN..]);
        Frame {
            action: u16::from_le_bytes([bytes[0], bytes[1]]),
            len: u16::from_le_bytes([bytes[2], bytes[3]]),
            reserved: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            data,
        }
    }
}

impl Debug for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("action", &Action::name(self.action))
            .field("code", &self.action)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// Payload of a launch frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchMsg {
    pub call_main: bool,
}

/// Payload of a port control frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortCtlMsg {
    /// One bit per port id
    pub portlist: u32,
    pub enable: bool,
}

/// Decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Unrecognized action code, kept for logging
    Unknown(u16),
    Exit,
    Launch(LaunchMsg),
    Port(PortCtlMsg),
}

impl Message {
    #[must_use]
    pub fn to_frame(&self) -> Frame {
        let mut payload = [0u8; 8];
        let (action, len): (u16, u16) = match self {
            Message::Unknown(code) => (*code, 0),
            Message::Exit => (Action::Exit.code(), 0),
            Message::Launch(msg) => {
                payload[..4].copy_from_slice(&u32::from(msg.call_main).to_le_bytes());
                (Action::Launch.code(), 4)
            }
            Message::Port(msg) => {
                payload[..4].copy_from_slice(&msg.portlist.to_le_bytes());
                payload[4..].copy_from_slice(&u32::from(msg.enable).to_le_bytes());
                (Action::Port.code(), 8)
            }
        };
        let mut data = [0u8; MAX_PAYLOAD];
        data[..payload.len()].copy_from_slice(&payload);
        Frame {
            action,
            len,
            reserved: 0,
            data,
        }
    }
}

impl From<Message> for Frame {
    fn from(message: Message) -> Frame {
        message.to_frame()
    }
}
