//! Message identities: directions, named identifiers, numeric headers and
//! the bidirectional registry binding one to the other.
//!
//! An [`Identifier`] is the name an extension uses to refer to a message;
//! a [`Header`] is the numeric identity a message has on the wire for the
//! duration of one connection. The [`Headers`] registry is populated from
//! the message table delivered at connection start and cleared when the
//! connection ends, so header values may differ between connections.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use crate::error::Result;
use crate::packet::Packet;
use crate::parse::{Compose, Parse};

/// A message direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Unknown,
    /// Server to client.
    In,
    /// Client to server.
    Out,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::In => "incoming",
            Self::Out => "outgoing",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A message name and direction.
///
/// Names are matched case-insensitively by the registry but preserved as
/// supplied.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub dir: Direction,
    pub name: Cow<'static, str>,
}

impl Identifier {
    /// Creates an identifier from a static name, usable in `const` tables.
    pub const fn new_static(dir: Direction, name: &'static str) -> Self {
        Self {
            dir,
            name: Cow::Borrowed(name),
        }
    }

    pub fn new(dir: Direction, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            dir,
            name: name.into(),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.dir, self.name)
    }
}

/// A message direction and numeric value; the on-wire identity of a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Header {
    pub dir: Direction,
    pub value: u16,
}

impl Header {
    pub const fn new(dir: Direction, value: u16) -> Self {
        Self { dir, value }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.dir, self.value)
    }
}

/// Metadata for one message, delivered in the connection-start frame.
#[derive(Debug, Clone, Default)]
pub struct MsgInfo {
    pub id: i32,
    pub hash: String,
    pub name: String,
    pub structure: String,
    pub outgoing: bool,
    pub source: String,
}

impl MsgInfo {
    pub fn dir(&self) -> Direction {
        if self.outgoing {
            Direction::Out
        } else {
            Direction::In
        }
    }

    pub fn header(&self) -> Header {
        Header::new(self.dir(), self.id as u16)
    }
}

impl Parse for MsgInfo {
    fn parse(p: &mut Packet) -> Result<Self> {
        Ok(Self {
            id: p.read()?,
            hash: p.read()?,
            name: p.read()?,
            structure: p.read()?,
            outgoing: p.read()?,
            source: p.read()?,
        })
    }
}

impl Compose for MsgInfo {
    fn compose(&self, p: &mut Packet) -> Result<()> {
        p.write(&self.id)?
            .write(&self.hash)?
            .write(&self.name)?
            .write(&self.structure)?
            .write(&self.outgoing)?
            .write(&self.source)?;
        Ok(())
    }
}

/// Bidirectional map between message identifiers and headers.
///
/// Empty at construction, populated from `MsgInfo` records at connection
/// start, cleared on disconnect.
#[derive(Debug, Default)]
pub struct Headers {
    by_name: HashMap<(Direction, String), Header>,
    names: HashMap<Header, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a name to header binding.
    pub fn add(&mut self, name: &str, header: Header) {
        self.by_name
            .insert((header.dir, name.to_lowercase()), header);
        self.names.insert(header, name.to_owned());
    }

    /// Adds bindings for every record in a connection-start message table.
    pub fn populate(&mut self, messages: &[MsgInfo]) {
        for msg in messages {
            self.add(&msg.name, msg.header());
        }
    }

    /// Looks up the header bound to an identifier. Names are matched
    /// case-insensitively.
    pub fn get(&self, identifier: &Identifier) -> Option<Header> {
        self.by_name
            .get(&(identifier.dir, identifier.name.to_lowercase()))
            .copied()
    }

    /// Looks up the name bound to a header.
    pub fn name_of(&self, header: Header) -> Option<&str> {
        self.names.get(&header).map(String::as_str)
    }

    /// Reports whether `header` is currently bound to `identifier`.
    pub fn is(&self, header: Header, identifier: &Identifier) -> bool {
        self.get(identifier) == Some(header)
    }

    pub fn clear(&mut self) {
        self.by_name.clear();
        self.names.clear();
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut headers = Headers::new();
        headers.add("GetGuestRoomResult", Header::new(Direction::In, 0x1234));

        let id = Identifier::new(Direction::In, "getguestroomresult");
        assert_eq!(headers.get(&id), Some(Header::new(Direction::In, 0x1234)));

        let id = Identifier::new(Direction::In, "GETGUESTROOMRESULT");
        assert_eq!(headers.get(&id), Some(Header::new(Direction::In, 0x1234)));
    }

    #[test]
    fn test_lookup_is_keyed_by_direction() {
        let mut headers = Headers::new();
        headers.add("Chat", Header::new(Direction::Out, 52));

        assert!(headers.get(&Identifier::new(Direction::In, "Chat")).is_none());
        assert!(headers.get(&Identifier::new(Direction::Out, "Chat")).is_some());
    }

    #[test]
    fn test_name_preserved_as_supplied() {
        let mut headers = Headers::new();
        let header = Header::new(Direction::In, 7);
        headers.add("RoomReady", header);
        assert_eq!(headers.name_of(header), Some("RoomReady"));
    }

    #[test]
    fn test_clear() {
        let mut headers = Headers::new();
        headers.add("Chat", Header::new(Direction::Out, 52));
        headers.clear();
        assert!(headers.is_empty());
        assert!(headers.get(&Identifier::new(Direction::Out, "Chat")).is_none());
    }

    #[test]
    fn test_populate_from_msg_infos() {
        let mut headers = Headers::new();
        headers.populate(&[
            MsgInfo {
                id: 52,
                name: "Chat".into(),
                outgoing: true,
                ..Default::default()
            },
            MsgInfo {
                id: 28,
                name: "Users".into(),
                outgoing: false,
                ..Default::default()
            },
        ]);

        assert_eq!(headers.len(), 2);
        assert_eq!(
            headers.get(&Identifier::new(Direction::Out, "chat")),
            Some(Header::new(Direction::Out, 52))
        );
        assert!(headers.is(
            Header::new(Direction::In, 28),
            &Identifier::new(Direction::In, "Users")
        ));
    }
}
