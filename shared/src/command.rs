//! One-byte LED command payloads
//!
//! Every command travels as exactly one byte over the serial channel:
//! ```text
//! RawByte:  0x01 = on, 0x00 = off
//! Ascii:    '1'  = on, '0'  = off
//! ```
//!
//! The firmware on the peer compares `Serial.read()` against one of these
//! representations, so both ends must agree on the encoding up front.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Serial Port Profile service class UUID
pub const SPP_UUID: Uuid = Uuid::from_u128(0x0000_1101_0000_1000_8000_0080_5F9B_34FB);

/// Errors that can occur while encoding or decoding commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unknown command byte: 0x{0:02x}")]
    UnknownCommand(u8),

    #[error("Unknown command: {0:?} (expected on/off)")]
    UnknownCommandName(String),

    #[error("Unknown payload encoding: {0:?} (expected raw-byte/ascii)")]
    UnknownEncoding(String),
}

/// A command understood by the LED firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedCommand {
    On,
    Off,
}

impl fmt::Display for LedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedCommand::On => write!(f, "on"),
            LedCommand::Off => write!(f, "off"),
        }
    }
}

impl FromStr for LedCommand {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" | "1" => Ok(LedCommand::On),
            "off" | "0" => Ok(LedCommand::Off),
            other => Err(CodecError::UnknownCommandName(other.to_string())),
        }
    }
}

/// How a command is represented on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayloadEncoding {
    /// Integer byte values 1 and 0
    #[default]
    RawByte,
    /// ASCII digits '1' and '0'
    Ascii,
}

impl fmt::Display for PayloadEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadEncoding::RawByte => write!(f, "raw-byte"),
            PayloadEncoding::Ascii => write!(f, "ascii"),
        }
    }
}

impl FromStr for PayloadEncoding {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw-byte" | "raw" | "byte" => Ok(PayloadEncoding::RawByte),
            "ascii" | "char" => Ok(PayloadEncoding::Ascii),
            other => Err(CodecError::UnknownEncoding(other.to_string())),
        }
    }
}

impl PayloadEncoding {
    /// The single wire byte for a command
    pub fn byte_for(self, command: LedCommand) -> u8 {
        match (self, command) {
            (PayloadEncoding::RawByte, LedCommand::On) => 0x01,
            (PayloadEncoding::RawByte, LedCommand::Off) => 0x00,
            (PayloadEncoding::Ascii, LedCommand::On) => b'1',
            (PayloadEncoding::Ascii, LedCommand::Off) => b'0',
        }
    }
}

/// Encode a command into its one-byte payload
pub fn encode(command: LedCommand, encoding: PayloadEncoding) -> Bytes {
    Bytes::copy_from_slice(&[encoding.byte_for(command)])
}

/// Decode a single payload byte
pub fn decode(byte: u8, encoding: PayloadEncoding) -> Result<LedCommand, CodecError> {
    if byte == encoding.byte_for(LedCommand::On) {
        Ok(LedCommand::On)
    } else if byte == encoding.byte_for(LedCommand::Off) {
        Ok(LedCommand::Off)
    } else {
        Err(CodecError::UnknownCommand(byte))
    }
}

/// Streaming decoder for a serial byte stream
///
/// Serial reads arrive in arbitrary chunks. Unknown bytes are reported
/// alongside the decoded commands instead of aborting the stream, matching
/// firmware that simply ignores bytes it doesn't recognise.
#[derive(Debug, Default)]
pub struct CommandDecoder {
    encoding: PayloadEncoding,
    /// Count of bytes that were neither a command nor line noise
    rejected: u64,
}

impl CommandDecoder {
    /// Create a new decoder for the given encoding
    pub fn new(encoding: PayloadEncoding) -> Self {
        Self {
            encoding,
            rejected: 0,
        }
    }

    /// Decode every byte of a chunk
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Result<LedCommand, CodecError>> {
        let mut out = Vec::with_capacity(chunk.len());
        for &byte in chunk {
            // Serial terminals append line endings to typed digits
            if self.encoding == PayloadEncoding::Ascii && matches!(byte, b'\r' | b'\n') {
                continue;
            }
            let result = decode(byte, self.encoding);
            if result.is_err() {
                self.rejected += 1;
            }
            out.push(result);
        }
        out
    }

    /// Number of unrecognised bytes seen so far
    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spp_uuid() {
        assert_eq!(
            SPP_UUID.to_string(),
            "00001101-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_raw_byte_payloads() {
        assert_eq!(&encode(LedCommand::On, PayloadEncoding::RawByte)[..], &[0x01]);
        assert_eq!(&encode(LedCommand::Off, PayloadEncoding::RawByte)[..], &[0x00]);
    }

    #[test]
    fn test_ascii_payloads() {
        assert_eq!(&encode(LedCommand::On, PayloadEncoding::Ascii)[..], b"1");
        assert_eq!(&encode(LedCommand::Off, PayloadEncoding::Ascii)[..], b"0");
    }

    #[test]
    fn test_decode_rejects_other_encoding() {
        // An ASCII '1' is not a command for raw-byte firmware
        assert_eq!(
            decode(b'1', PayloadEncoding::RawByte),
            Err(CodecError::UnknownCommand(b'1'))
        );
        assert_eq!(
            decode(0x01, PayloadEncoding::Ascii),
            Err(CodecError::UnknownCommand(0x01))
        );
    }

    #[test]
    fn test_streaming_decoder_skips_line_endings() {
        let mut decoder = CommandDecoder::new(PayloadEncoding::Ascii);
        let decoded = decoder.feed(b"1\r\n0x");

        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0], Ok(LedCommand::On));
        assert_eq!(decoded[1], Ok(LedCommand::Off));
        assert_eq!(decoded[2], Err(CodecError::UnknownCommand(b'x')));
        assert_eq!(decoder.rejected(), 1);
    }

    #[test]
    fn test_raw_decoder_keeps_newline_bytes() {
        let mut decoder = CommandDecoder::new(PayloadEncoding::RawByte);
        let decoded = decoder.feed(&[0x01, b'\n', 0x00]);

        assert_eq!(decoded.len(), 3);
        assert!(decoded[1].is_err());
    }

    #[test]
    fn test_parse_command_names() {
        assert_eq!("ON".parse::<LedCommand>(), Ok(LedCommand::On));
        assert_eq!(" off ".parse::<LedCommand>(), Ok(LedCommand::Off));
        assert_eq!("1".parse::<LedCommand>(), Ok(LedCommand::On));
        assert!("blink".parse::<LedCommand>().is_err());
    }

    #[test]
    fn test_parse_encoding() {
        assert_eq!("ascii".parse::<PayloadEncoding>(), Ok(PayloadEncoding::Ascii));
        assert_eq!("raw-byte".parse::<PayloadEncoding>(), Ok(PayloadEncoding::RawByte));
        assert_eq!(PayloadEncoding::default(), PayloadEncoding::RawByte);
        assert!("utf16".parse::<PayloadEncoding>().is_err());
    }
}
