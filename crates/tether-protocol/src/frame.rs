//! Control-channel framing.
//!
//! Frames exchanged with the proxy host are length-prefixed, big-endian:
//!
//! ```text
//! ┌─────────┬──────┬──────────────────┐
//! │ length  │ u32  │ 2 + payload size │
//! ├─────────┼──────┼──────────────────┤
//! │ header  │ u16  │ control opcode   │
//! ├─────────┼──────┼──────────────────┤
//! │ payload │ [u8] │ length - 2 bytes │
//! └─────────┴──────┴──────────────────┘
//! ```
//!
//! An intercept frame payload carries tab-delimited metadata followed by
//! the embedded game packet:
//!
//! ```text
//! u32 inner_len | blocked '0'/'1' | 0x09 | sequence (ASCII decimal) | 0x09
//!   | direction (3rd char 'S' = outgoing) | 0x09 | modified '0'/'1'
//!   | embedded packet
//! ```
//!
//! The embedded packet is `u32 length | u16 header | data` on the binary
//! dialects and `B64(2) header | data` on Shockwave.

use bytes::{BufMut, BytesMut};

use crate::client::ClientType;
use crate::encoding;
use crate::error::{ProtocolError, Result};
use crate::message::{Direction, Header};
use crate::packet::Packet;
use crate::parse::B64;

/// Maximum size of an intercepted (incoming) game packet.
pub const MAX_INCOMING_PACKET_SIZE: usize = 128 * 1024;
/// Maximum size of an injected (outgoing) game packet.
pub const MAX_OUTGOING_PACKET_SIZE: usize = 8 * 1024;
/// Control-protocol overhead allowed on top of the incoming maximum.
pub const FRAME_OVERHEAD: usize = 64;
/// Size of the frame read buffer.
pub const READ_BUFFER_SIZE: usize = FRAME_OVERHEAD + MAX_INCOMING_PACKET_SIZE;

/// Control opcodes sent by the host.
pub mod host {
    pub const ACTIVATED: u16 = 1;
    pub const INFO_REQUEST: u16 = 2;
    pub const INTERCEPT: u16 = 3;
    pub const FLAGS_CHECK: u16 = 4;
    pub const CONNECTION_START: u16 = 5;
    pub const CONNECTION_END: u16 = 6;
    pub const INIT: u16 = 7;
}

/// Control opcodes sent by the extension.
pub mod ext {
    pub const INFO: u16 = 1;
    pub const MANIPULATED_PACKET: u16 = 2;
    pub const SEND_MESSAGE: u16 = 4;
    pub const CONSOLE_LOG: u16 = 98;
}

/// Encodes one control frame.
pub fn encode_frame(header: u16, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(6 + payload.len());
    buf.put_u32((2 + payload.len()) as u32);
    buf.put_u16(header);
    buf.put_slice(payload);
    buf
}

fn zero_one(b: bool) -> u8 {
    if b {
        b'1'
    } else {
        b'0'
    }
}

/// Parsed metadata of one intercept frame payload.
///
/// Field offsets are retained so the frame can be rewritten in place after
/// dispatch without reparsing.
#[derive(Debug, Clone)]
pub struct InterceptMeta {
    pub client: ClientType,
    pub blocked: bool,
    pub sequence: u32,
    pub dir: Direction,
    pub modified: bool,
    pub header_value: u16,
    tabs: [usize; 3],
    packet_offset: usize,
    tail_offset: usize,
}

impl InterceptMeta {
    /// Parses the metadata of an intercept frame payload.
    pub fn parse(data: &[u8], client: ClientType) -> Result<Self> {
        if data.len() < 4 {
            return Err(ProtocolError::TruncatedIntercept);
        }
        let inner_len = u32::from_be_bytes(data[0..4].try_into().unwrap()) as usize;

        let mut tabs = [0usize; 3];
        let mut found = 0;
        let end = usize::min(inner_len + 4, data.len());
        for (i, &b) in data.iter().enumerate().take(end).skip(4) {
            if b == 0x09 {
                tabs[found] = i;
                found += 1;
                if found == 3 {
                    break;
                }
            }
        }
        if found != 3 {
            return Err(ProtocolError::MissingDelimiters);
        }

        let blocked = data[4] == b'1';

        let sequence = std::str::from_utf8(&data[tabs[0] + 1..tabs[1]])
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or(ProtocolError::InvalidSequence)?;

        if tabs[1] + 3 >= data.len() || tabs[2] + 1 >= data.len() {
            return Err(ProtocolError::TruncatedIntercept);
        }
        let dir = if data[tabs[1] + 3] == b'S' {
            Direction::Out
        } else {
            Direction::In
        };
        let modified = data[tabs[2] + 1] == b'1';

        let tail_offset = 4 + inner_len;
        let packet_offset = if client == ClientType::Shockwave {
            tabs[2] + 2
        } else {
            tabs[2] + 6
        };
        if packet_offset + 2 > tail_offset || tail_offset > data.len() {
            return Err(ProtocolError::TruncatedIntercept);
        }

        let header_value = if client == ClientType::Shockwave {
            encoding::b64_decode(&data[packet_offset..packet_offset + 2]) as u16
        } else {
            u16::from_be_bytes([data[packet_offset], data[packet_offset + 1]])
        };

        Ok(Self {
            client,
            blocked,
            sequence,
            dir,
            modified,
            header_value,
            tabs,
            packet_offset,
            tail_offset,
        })
    }

    /// Extracts the embedded game packet.
    pub fn packet_from(&self, data: &[u8]) -> Packet {
        Packet::with_data(
            self.client,
            Header::new(self.dir, self.header_value),
            data[self.packet_offset + 2..self.tail_offset].to_vec(),
        )
    }

    /// Rewrites the original frame payload in place with the dispatched
    /// packet and the final blocked/modified flags, producing the payload
    /// for a MANIPULATED_PACKET frame.
    pub fn reserialize(&self, frame: &mut Vec<u8>, packet: &Packet, blocked: bool, modified: bool) {
        let tail = frame[self.tail_offset..].to_vec();
        let pre_len = self.tail_offset - self.packet_offset - 2;
        let diff = packet.len() as isize - pre_len as isize;
        let new_len = (frame.len() as isize + diff) as usize;

        frame.resize(usize::max(new_len, frame.len()), 0);

        let inner_len = (new_len - 4 - tail.len()) as u32;
        frame[0..4].copy_from_slice(&inner_len.to_be_bytes());
        frame[4] = zero_one(blocked);
        frame[self.tabs[2] + 1] = zero_one(modified);

        if self.client == ClientType::Shockwave {
            encoding::b64_encode(
                &mut frame[self.packet_offset..self.packet_offset + 2],
                packet.header.value as i32,
            );
        } else {
            frame[self.tabs[2] + 2..self.tabs[2] + 6]
                .copy_from_slice(&((2 + packet.len()) as u32).to_be_bytes());
            frame[self.packet_offset..self.packet_offset + 2]
                .copy_from_slice(&packet.header.value.to_be_bytes());
        }

        let data_at = self.packet_offset + 2;
        frame[data_at..data_at + packet.len()].copy_from_slice(packet.data());
        let tail_at = (self.tail_offset as isize + diff) as usize;
        frame[tail_at..tail_at + tail.len()].copy_from_slice(&tail);
        frame.truncate(new_len);
    }
}

/// Wraps a game packet for a SEND_MESSAGE frame.
pub fn wrap_packet(packet: &Packet) -> Result<Packet> {
    let mut wrapped = Packet::new(
        ClientType::Unknown,
        Header::new(Direction::Out, ext::SEND_MESSAGE),
    );
    wrapped.write_byte(if packet.header.dir == Direction::Out { 1 } else { 0 })?;
    if packet.client != ClientType::Shockwave {
        wrapped.write_int((6 + packet.len()) as i32)?;
    }
    wrapped.write_int((2 + packet.len()) as i32)?;
    if packet.client == ClientType::Shockwave {
        wrapped.write(&B64(packet.header.value as i16))?;
    } else {
        wrapped.write_short(packet.header.value as i16)?;
    }
    wrapped.write_bytes(packet.data())?;
    if packet.client == ClientType::Shockwave {
        wrapped.write_int(if packet.header.dir == Direction::Out { 2 } else { 1 })?;
    }
    Ok(wrapped)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds an intercept frame payload the way the host does.
    fn build_intercept(
        client: ClientType,
        seq: u32,
        dir: Direction,
        blocked: bool,
        modified: bool,
        header: u16,
        data: &[u8],
    ) -> Vec<u8> {
        let mut body = Vec::new();
        body.push(zero_one(blocked));
        body.push(0x09);
        body.extend_from_slice(seq.to_string().as_bytes());
        body.push(0x09);
        body.extend_from_slice(if dir == Direction::Out {
            b"TOSERVER"
        } else {
            b"TOCLIENT"
        });
        body.push(0x09);
        body.push(zero_one(modified));
        if client == ClientType::Shockwave {
            let mut b64 = [0u8; 2];
            encoding::b64_encode(&mut b64, header as i32);
            body.extend_from_slice(&b64);
        } else {
            body.extend_from_slice(&((2 + data.len()) as u32).to_be_bytes());
            body.extend_from_slice(&header.to_be_bytes());
        }
        body.extend_from_slice(data);

        let mut payload = Vec::with_capacity(4 + body.len());
        payload.extend_from_slice(&(body.len() as u32).to_be_bytes());
        payload.extend_from_slice(&body);
        payload
    }

    #[test]
    fn test_encode_frame() {
        let frame = encode_frame(2, b"abc");
        assert_eq!(&frame[..], &[0, 0, 0, 5, 0, 2, b'a', b'b', b'c']);
    }

    #[test]
    fn test_parse_flash_intercept() {
        let payload = build_intercept(
            ClientType::Flash,
            117,
            Direction::Out,
            false,
            false,
            0x1234,
            b"\x00\x00\x00\x05apple",
        );
        let meta = InterceptMeta::parse(&payload, ClientType::Flash).unwrap();
        assert!(!meta.blocked);
        assert!(!meta.modified);
        assert_eq!(meta.sequence, 117);
        assert_eq!(meta.dir, Direction::Out);
        assert_eq!(meta.header_value, 0x1234);

        let packet = meta.packet_from(&payload);
        assert_eq!(packet.data(), b"\x00\x00\x00\x05apple");
        assert_eq!(packet.header, Header::new(Direction::Out, 0x1234));
    }

    #[test]
    fn test_parse_shockwave_intercept() {
        let payload = build_intercept(
            ClientType::Shockwave,
            1,
            Direction::In,
            false,
            false,
            52,
            b"hello\x02",
        );
        let meta = InterceptMeta::parse(&payload, ClientType::Shockwave).unwrap();
        assert_eq!(meta.header_value, 52);
        assert_eq!(meta.dir, Direction::In);
        let packet = meta.packet_from(&payload);
        assert_eq!(packet.data(), b"hello\x02");
    }

    #[test]
    fn test_parse_rejects_missing_delimiters() {
        let payload = [0u8, 0, 0, 4, b'0', 0x09, b'1', 0x09];
        assert!(matches!(
            InterceptMeta::parse(&payload, ClientType::Flash),
            Err(ProtocolError::MissingDelimiters)
        ));
    }

    #[test]
    fn test_reserialize_same_size() {
        let mut payload = build_intercept(
            ClientType::Flash,
            5,
            Direction::Out,
            false,
            false,
            77,
            b"same",
        );
        let original = payload.clone();
        let meta = InterceptMeta::parse(&payload, ClientType::Flash).unwrap();
        let packet = meta.packet_from(&payload);

        meta.reserialize(&mut payload, &packet, true, false);

        // Only the blocked flag differs.
        assert_eq!(payload.len(), original.len());
        assert_eq!(payload[4], b'1');
        let meta2 = InterceptMeta::parse(&payload, ClientType::Flash).unwrap();
        assert!(meta2.blocked);
        assert!(!meta2.modified);
        assert_eq!(meta2.packet_from(&payload).data(), b"same");
    }

    #[test]
    fn test_reserialize_grown_packet() {
        let mut payload = build_intercept(
            ClientType::Flash,
            9,
            Direction::Out,
            false,
            false,
            77,
            b"\x00\x00\x00\x05apple",
        );
        let meta = InterceptMeta::parse(&payload, ClientType::Flash).unwrap();
        let mut packet = meta.packet_from(&payload);
        packet.pos = 2;
        packet.replace_string("orange").unwrap();

        let pre_len = payload.len();
        meta.reserialize(&mut payload, &packet, false, true);
        assert_eq!(payload.len(), pre_len + 1);

        let meta2 = InterceptMeta::parse(&payload, ClientType::Flash).unwrap();
        assert!(meta2.modified);
        assert_eq!(meta2.packet_from(&payload).data(), b"\x00\x00\x00\x06orange");
    }

    #[test]
    fn test_reserialize_shrunk_shockwave_packet() {
        let mut payload = build_intercept(
            ClientType::Shockwave,
            2,
            Direction::In,
            false,
            false,
            52,
            b"hello\x02",
        );
        let meta = InterceptMeta::parse(&payload, ClientType::Shockwave).unwrap();
        let mut packet = meta.packet_from(&payload);
        packet.replace_string_at(0, "hi").unwrap();

        let pre_len = payload.len();
        meta.reserialize(&mut payload, &packet, false, true);
        assert_eq!(payload.len(), pre_len - 3);

        let meta2 = InterceptMeta::parse(&payload, ClientType::Shockwave).unwrap();
        assert_eq!(meta2.packet_from(&payload).data(), b"hi\x02");
    }

    #[test]
    fn test_reserialize_changed_header() {
        let mut payload =
            build_intercept(ClientType::Flash, 3, Direction::In, false, false, 10, b"x");
        let meta = InterceptMeta::parse(&payload, ClientType::Flash).unwrap();
        let mut packet = meta.packet_from(&payload);
        packet.header.value = 999;

        meta.reserialize(&mut payload, &packet, false, true);
        let meta2 = InterceptMeta::parse(&payload, ClientType::Flash).unwrap();
        assert_eq!(meta2.header_value, 999);
    }

    #[test]
    fn test_wrap_packet_flash() {
        let mut packet = Packet::new(ClientType::Flash, Header::new(Direction::Out, 0x1234));
        packet.write_string("hi").unwrap();

        let wrapped = wrap_packet(&packet).unwrap();
        assert_eq!(wrapped.header.value, ext::SEND_MESSAGE);

        let mut expected = Vec::new();
        expected.push(1u8); // outgoing
        expected.extend_from_slice(&10u32.to_be_bytes()); // 6 + len
        expected.extend_from_slice(&6u32.to_be_bytes()); // 2 + len
        expected.extend_from_slice(&0x1234u16.to_be_bytes());
        expected.extend_from_slice(&[0, 2, b'h', b'i']);
        assert_eq!(wrapped.data(), &expected[..]);
    }

    #[test]
    fn test_wrap_packet_shockwave() {
        let mut packet = Packet::new(ClientType::Shockwave, Header::new(Direction::In, 52));
        packet.write_string("hey").unwrap();

        let wrapped = wrap_packet(&packet).unwrap();

        let mut expected = Vec::new();
        expected.push(0u8); // incoming
        expected.extend_from_slice(&6u32.to_be_bytes()); // 2 + len
        let mut b64 = [0u8; 2];
        encoding::b64_encode(&mut b64, 52);
        expected.extend_from_slice(&b64);
        expected.extend_from_slice(b"hey\x02");
        expected.extend_from_slice(&1u32.to_be_bytes()); // incoming tag
        assert_eq!(wrapped.data(), &expected[..]);
    }
}
