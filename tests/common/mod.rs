//! A simulated proxy host driving an extension over an in-memory duplex
//! stream.

#![allow(dead_code)]

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use tether::extension::Extension;
use tether::protocol::encoding;
use tether::protocol::frame::{ext as ext_op, host as host_op, InterceptMeta};
use tether::protocol::{ClientType, Direction, Header, Packet};

pub struct Host {
    stream: DuplexStream,
    next_seq: u32,
}

/// A parsed MANIPULATED_PACKET response.
pub struct Manipulated {
    pub blocked: bool,
    pub modified: bool,
    pub header: u16,
    pub data: Vec<u8>,
}

/// A parsed SEND_MESSAGE frame.
pub struct SentMessage {
    pub outgoing: bool,
    pub header: u16,
    pub data: Vec<u8>,
}

impl Host {
    /// Spawns `ext.run_with` over one side of a duplex stream and returns
    /// the host side.
    pub fn start(ext: &Extension) -> Host {
        let (ext_side, host_side) = tokio::io::duplex(1 << 20);
        let ext = ext.clone();
        tokio::spawn(async move {
            if let Err(err) = ext.run_with(ext_side).await {
                panic!("extension terminated: {err}");
            }
        });
        Host {
            stream: host_side,
            next_seq: 1,
        }
    }

    /// Like [`Host::start`], for tests that expect the run loop to fail.
    pub fn start_fallible(ext: &Extension) -> Host {
        let (ext_side, host_side) = tokio::io::duplex(1 << 20);
        let ext = ext.clone();
        tokio::spawn(async move {
            let _ = ext.run_with(ext_side).await;
        });
        Host {
            stream: host_side,
            next_seq: 1,
        }
    }

    pub async fn write_frame(&mut self, header: u16, payload: &[u8]) {
        let mut buf = Vec::with_capacity(6 + payload.len());
        buf.extend_from_slice(&((2 + payload.len()) as u32).to_be_bytes());
        buf.extend_from_slice(&header.to_be_bytes());
        buf.extend_from_slice(payload);
        self.stream.write_all(&buf).await.unwrap();
    }

    pub async fn read_frame(&mut self) -> (u16, Vec<u8>) {
        let mut len_buf = [0u8; 4];
        self.stream.read_exact(&mut len_buf).await.unwrap();
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf).await.unwrap();
        let header = u16::from_be_bytes([buf[0], buf[1]]);
        (header, buf.split_off(2))
    }

    pub async fn send_init(&mut self, connected: bool) {
        self.write_frame(host_op::INIT, &[connected as u8]).await;
    }

    pub async fn send_info_request(&mut self) {
        self.write_frame(host_op::INFO_REQUEST, &[]).await;
    }

    /// Announces a game connection with the given client type and message
    /// table entries `(name, header value, outgoing)`.
    pub async fn send_connection_start(
        &mut self,
        client_type: &str,
        messages: &[(&str, u16, bool)],
    ) {
        let mut p = Packet::new(ClientType::Unknown, Header::new(Direction::In, 0));
        p.write_string("game.example.com").unwrap();
        p.write_int(38101).unwrap();
        p.write_string("100.0").unwrap();
        p.write_string("client-id").unwrap();
        p.write_string(client_type).unwrap();
        p.write_int(messages.len() as i32).unwrap();
        for (name, value, outgoing) in messages {
            p.write_int(*value as i32).unwrap();
            p.write_string("").unwrap(); // hash
            p.write_string(name).unwrap();
            p.write_string("").unwrap(); // structure
            p.write_bool(*outgoing).unwrap();
            p.write_string("test").unwrap();
        }
        self.write_frame(host_op::CONNECTION_START, p.data()).await;
    }

    pub async fn send_connection_end(&mut self) {
        self.write_frame(host_op::CONNECTION_END, &[]).await;
    }

    /// Delivers a game packet to the extension as an intercept frame and
    /// returns its sequence number.
    pub async fn send_intercept(&mut self, packet: &Packet) -> u32 {
        let seq = self.next_seq;
        self.next_seq += 1;

        let mut body = Vec::new();
        body.push(b'0'); // blocked
        body.push(0x09);
        body.extend_from_slice(seq.to_string().as_bytes());
        body.push(0x09);
        body.extend_from_slice(if packet.header.dir == Direction::Out {
            b"TOSERVER"
        } else {
            b"TOCLIENT"
        });
        body.push(0x09);
        body.push(b'0'); // modified
        if packet.client == ClientType::Shockwave {
            let mut b64 = [0u8; 2];
            encoding::b64_encode(&mut b64, packet.header.value as i32);
            body.extend_from_slice(&b64);
        } else {
            body.extend_from_slice(&((2 + packet.len()) as u32).to_be_bytes());
            body.extend_from_slice(&packet.header.value.to_be_bytes());
        }
        body.extend_from_slice(packet.data());

        let mut payload = Vec::with_capacity(4 + body.len());
        payload.extend_from_slice(&(body.len() as u32).to_be_bytes());
        payload.extend_from_slice(&body);
        self.write_frame(host_op::INTERCEPT, &payload).await;
        seq
    }

    /// Reads frames until the next MANIPULATED_PACKET arrives.
    pub async fn expect_manipulated(&mut self, client: ClientType) -> Manipulated {
        loop {
            let (header, payload) = self.read_frame().await;
            if header != ext_op::MANIPULATED_PACKET {
                continue;
            }
            let meta = InterceptMeta::parse(&payload, client).unwrap();
            let packet = meta.packet_from(&payload);
            return Manipulated {
                blocked: meta.blocked,
                modified: meta.modified,
                header: packet.header.value,
                data: packet.data().to_vec(),
            };
        }
    }

    /// Reads frames until the next SEND_MESSAGE arrives, unwrapping the
    /// carried packet.
    pub async fn expect_send_message(&mut self, client: ClientType) -> SentMessage {
        loop {
            let (header, payload) = self.read_frame().await;
            if header != ext_op::SEND_MESSAGE {
                continue;
            }
            let mut p = Packet::with_data(ClientType::Unknown, Header::new(Direction::In, 0), payload);
            let outgoing = p.read_byte().unwrap() == 1;
            if client != ClientType::Shockwave {
                let _ = p.read_int().unwrap(); // 6 + len
            }
            let inner_len = p.read_int().unwrap() as usize - 2;
            let header_value = if client == ClientType::Shockwave {
                let raw = p.read_bytes(2).unwrap();
                encoding::b64_decode(&raw) as u16
            } else {
                p.read_short().unwrap() as u16
            };
            let data = p.read_bytes(inner_len).unwrap();
            return SentMessage {
                outgoing,
                header: header_value,
                data,
            };
        }
    }

    /// Round-trips a throwaway intercept so all previously written frames
    /// are known to have been dispatched.
    pub async fn barrier(&mut self, client: ClientType) {
        // Must stay within 12 bits for the B64 header encoding.
        const BARRIER_HEADER: u16 = 0xff0;
        let packet = Packet::new(client, Header::new(Direction::In, BARRIER_HEADER));
        self.send_intercept(&packet).await;
        loop {
            let (header, payload) = self.read_frame().await;
            if header == ext_op::MANIPULATED_PACKET {
                let meta = InterceptMeta::parse(&payload, client).unwrap();
                let packet = meta.packet_from(&payload);
                if packet.header.value == BARRIER_HEADER {
                    return;
                }
            }
        }
    }
}

/// A Flash-dialect chat packet: `[i16 0][u16 length]<text>`.
pub fn flash_chat_packet(header: u16, text: &str) -> Packet {
    let mut packet = Packet::new(ClientType::Flash, Header::new(Direction::Out, header));
    packet.write_short(0).unwrap();
    packet.write_string(text).unwrap();
    packet
}
