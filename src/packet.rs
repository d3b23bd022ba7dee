//! CombiAdapter wire codec
//!
//! Every exchange with the adapter firmware is one protocol message:
//! a command byte, a 16-bit big-endian payload length, the payload and a
//! terminator byte. The length field counts only the payload, never the
//! terminator.

use crate::constants::{
    CAN_MAX_DLEN, CMD_TX_FRAME, FRAME_DATA_OFFSET, FRAME_LEN_OFFSET, FRAME_PAYLOAD_LEN, HEADER_LEN,
    TERMINATOR, TX_PACKET_LEN,
};
use crate::error::{CombiError, Result};
use crate::frame::CanFrame;

/// One command/length/payload/terminator unit
///
/// Constructed per send and reconstructed per receive; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombiPacket {
    /// Command code
    pub cmd: u8,
    /// Payload bytes; the caller guarantees the length fits in 16 bits
    pub data: Vec<u8>,
}

impl CombiPacket {
    /// Create a new packet
    pub fn new(cmd: u8, data: Vec<u8>) -> Self {
        Self { cmd, data }
    }

    /// Encode into wire framing: `[cmd][len_hi][len_lo][payload...][term]`
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.data.len() + 1);
        buf.push(self.cmd);
        buf.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
        buf.extend_from_slice(&self.data);
        buf.push(TERMINATOR);
        buf
    }

    /// Decode one message from the front of `buf`
    ///
    /// Returns `None` while the buffer does not yet hold a complete message;
    /// the caller retries once more bytes arrive. On success returns the
    /// packet and the number of bytes consumed.
    pub fn parse(buf: &[u8]) -> Option<(CombiPacket, usize)> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        let cmd = buf[0];
        let len = u16::from_be_bytes([buf[1], buf[2]]) as usize;
        let total = HEADER_LEN + len + 1;
        if buf.len() < total {
            return None;
        }
        let data = buf[HEADER_LEN..HEADER_LEN + len].to_vec();
        Some((CombiPacket::new(cmd, data), total))
    }
}

/// Encode a CAN frame into the fixed 19-byte transmit packet
///
/// Layout: 3-byte header (`0x83`, length 15), 4-byte little-endian
/// identifier, 8 data bytes zero-padded to width, the actual data length,
/// two reserved flag bytes (extended, remote) and the terminator.
pub fn encode_tx_frame(frame: &CanFrame) -> [u8; TX_PACKET_LEN] {
    let mut buf = [0u8; TX_PACKET_LEN];
    buf[0] = CMD_TX_FRAME;
    buf[1] = (FRAME_PAYLOAD_LEN >> 8) as u8;
    buf[2] = (FRAME_PAYLOAD_LEN & 0xFF) as u8;
    buf[3..7].copy_from_slice(&frame.id().to_le_bytes());
    buf[7..7 + frame.data().len()].copy_from_slice(frame.data());
    buf[15] = frame.len();
    buf[16] = 0x00; // is extended
    buf[17] = 0x00; // is remote
    buf[18] = TERMINATOR;
    buf
}

/// Decode an RxFrame payload into an incoming CAN frame
///
/// The payload mirrors the transmit layout: little-endian identifier at
/// offset 0, data bytes from offset 4, actual data length at offset 12.
pub fn decode_rx_payload(payload: &[u8]) -> Result<CanFrame> {
    if payload.len() <= FRAME_LEN_OFFSET {
        return Err(CombiError::MalformedFrame(payload.len()));
    }
    let id = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let len = payload[FRAME_LEN_OFFSET] as usize;
    if len > CAN_MAX_DLEN || FRAME_DATA_OFFSET + len > payload.len() {
        return Err(CombiError::MalformedFrame(payload.len()));
    }
    Ok(CanFrame::incoming(
        id,
        &payload[FRAME_DATA_OFFSET..FRAME_DATA_OFFSET + len],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{CMD_OPEN, CMD_SET_BITRATE, CMD_VERSION};

    #[test]
    fn test_encode_layout() {
        let pkt = CombiPacket::new(CMD_OPEN, vec![1]);
        assert_eq!(pkt.encode(), vec![0x80, 0x00, 0x01, 0x01, 0x00]);
    }

    #[test]
    fn test_encode_empty_payload() {
        let pkt = CombiPacket::new(CMD_VERSION, Vec::new());
        assert_eq!(pkt.encode(), vec![0x20, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_parse_roundtrip() {
        let payloads: [&[u8]; 4] = [&[], &[0x01], &[0xDE, 0xAD, 0xBE, 0xEF], &[0x55; 300]];
        for payload in payloads {
            let pkt = CombiPacket::new(CMD_SET_BITRATE, payload.to_vec());
            let wire = pkt.encode();
            let (decoded, used) = CombiPacket::parse(&wire).unwrap();
            assert_eq!(used, wire.len());
            assert_eq!(decoded, pkt);
        }
    }

    #[test]
    fn test_parse_incomplete_is_not_an_error() {
        let wire = CombiPacket::new(CMD_OPEN, vec![1]).encode();
        for cut in 0..wire.len() {
            assert!(CombiPacket::parse(&wire[..cut]).is_none());
        }
        assert!(CombiPacket::parse(&wire).is_some());
    }

    #[test]
    fn test_parse_leaves_trailing_bytes() {
        let mut wire = CombiPacket::new(CMD_OPEN, vec![0]).encode();
        let first_len = wire.len();
        wire.extend_from_slice(&CombiPacket::new(CMD_VERSION, Vec::new()).encode());
        let (pkt, used) = CombiPacket::parse(&wire).unwrap();
        assert_eq!(pkt.cmd, CMD_OPEN);
        assert_eq!(used, first_len);
    }

    #[test]
    fn test_encode_tx_frame_scenario() {
        let frame = CanFrame::outgoing(0x7E0, &[0x02, 0x10, 0x01]);
        let bytes = encode_tx_frame(&frame);
        assert_eq!(
            bytes,
            [
                0x83, 0x00, 0x0F, 0xE0, 0x07, 0x00, 0x00, 0x02, 0x10, 0x01, 0x00, 0x00, 0x00,
                0x00, 0x00, 0x03, 0x00, 0x00, 0x00
            ]
        );
    }

    #[test]
    fn test_decode_rx_payload_scenario() {
        let payload = [
            0xE8, 0x03, 0x00, 0x00, 0x02, 0x10, 0x41, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00,
            0x00,
        ];
        let frame = decode_rx_payload(&payload).unwrap();
        assert_eq!(frame.id(), 0x3E8);
        assert_eq!(frame.data(), &[0x02, 0x10]);
    }

    #[test]
    fn test_decode_rx_payload_too_short() {
        assert!(decode_rx_payload(&[0x00; 5]).is_err());
    }

    #[test]
    fn test_decode_rx_payload_bad_length_byte() {
        let mut payload = [0u8; FRAME_PAYLOAD_LEN];
        payload[FRAME_LEN_OFFSET] = 12;
        assert!(decode_rx_payload(&payload).is_err());
    }
}
