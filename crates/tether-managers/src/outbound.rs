//! Outgoing (client to server) message identifiers used by the managers.

use tether_protocol::{Direction, Identifier};

const fn id(name: &'static str) -> Identifier {
    Identifier::new_static(Direction::Out, name)
}

// inventory
pub const GETSTRIP: Identifier = id("GETSTRIP");

// trade
pub const TRADE_ADDITEM: Identifier = id("TRADE_ADDITEM");
pub const TRADE_ACCEPT: Identifier = id("TRADE_ACCEPT");
pub const TRADE_UNACCEPT: Identifier = id("TRADE_UNACCEPT");

// profile
pub const INFORETRIEVE: Identifier = id("INFORETRIEVE");

// navigator
pub const NAVIGATE: Identifier = id("NAVIGATE");
pub const SRCHF: Identifier = id("SRCHF");
pub const SUSERF: Identifier = id("SUSERF");
pub const GETFVRF: Identifier = id("GETFVRF");
