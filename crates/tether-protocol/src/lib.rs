//! # tether-protocol
//!
//! Wire-level building blocks for tether extensions:
//!
//! - [`encoding`]: the printable base-64 integer codecs (B64, VL64) used
//!   by the Shockwave dialect
//! - [`Packet`]: a mutable game packet with dialect-aware primitive reads
//!   and writes at a tracked cursor
//! - [`Parse`] / [`Compose`]: structural reads and writes for aggregates
//! - [`Headers`]: the registry binding message names to per-connection
//!   numeric headers
//! - [`frame`]: the length-prefixed control-channel framing, intercept
//!   frame metadata and packet wrapping
//!
//! ## Example
//!
//! ```
//! use tether_protocol::{ClientType, Direction, Header, Packet};
//!
//! let mut packet = Packet::new(ClientType::Flash, Header::new(Direction::Out, 52));
//! packet.write_int(0).unwrap();
//! packet.write_string("hello").unwrap();
//!
//! packet.pos = 0;
//! assert_eq!(packet.read_int().unwrap(), 0);
//! assert_eq!(packet.read_string().unwrap(), "hello");
//! ```

pub mod client;
pub mod encoding;
pub mod error;
pub mod frame;
pub mod message;
pub mod packet;
pub mod parse;

pub use client::{ClientInfo, ClientType};
pub use error::{ProtocolError, Result};
pub use message::{Direction, Header, Headers, Identifier, MsgInfo};
pub use packet::Packet;
pub use parse::{Compose, Id, Length, Parse, B64, Vl64};
