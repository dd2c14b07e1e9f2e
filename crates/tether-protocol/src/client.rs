use std::fmt;

use crate::error::{ProtocolError, Result};
use crate::packet::Packet;
use crate::parse::{Compose, Parse};

/// A type of game client, selecting the wire dialect for packet primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClientType {
    /// No client associated yet. Control-channel packets use this dialect;
    /// it encodes like [`ClientType::Flash`] for the primitives the control
    /// protocol uses and rejects everything else.
    #[default]
    Unknown,
    Flash,
    Unity,
    Shockwave,
}

impl ClientType {
    fn from_wire(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "FLASH" => Ok(Self::Flash),
            "UNITY" => Ok(Self::Unity),
            "SHOCKWAVE" => Ok(Self::Shockwave),
            _ => Err(ProtocolError::UnknownClient(s.to_owned())),
        }
    }

    fn wire_name(self) -> &'static str {
        match self {
            Self::Unknown => "",
            Self::Flash => "FLASH",
            Self::Unity => "UNITY",
            Self::Shockwave => "SHOCKWAVE",
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "Unknown",
            Self::Flash => "Flash",
            Self::Unity => "Unity",
            Self::Shockwave => "Shockwave",
        };
        f.write_str(name)
    }
}

impl Parse for ClientType {
    fn parse(p: &mut Packet) -> Result<Self> {
        Self::from_wire(&p.read_string()?)
    }
}

impl Compose for ClientType {
    fn compose(&self, p: &mut Packet) -> Result<()> {
        p.write_string(self.wire_name())?;
        Ok(())
    }
}

/// Information about the game client behind the current connection.
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub version: String,
    pub identifier: String,
    pub client_type: ClientType,
}

impl Parse for ClientInfo {
    fn parse(p: &mut Packet) -> Result<Self> {
        Ok(Self {
            version: p.read()?,
            identifier: p.read()?,
            client_type: p.read()?,
        })
    }
}

impl Compose for ClientInfo {
    fn compose(&self, p: &mut Packet) -> Result<()> {
        p.write(&self.version)?
            .write(&self.identifier)?
            .write(&self.client_type)?;
        Ok(())
    }
}
