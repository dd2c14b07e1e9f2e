//! Incoming (server to client) message identifiers consumed by the
//! managers.

use tether_protocol::{Direction, Identifier};

const fn id(name: &'static str) -> Identifier {
    Identifier::new_static(Direction::In, name)
}

// room
pub const OPC_OK: Identifier = id("OPC_OK");
pub const FLATINFO: Identifier = id("FLATINFO");
pub const ROOM_READY: Identifier = id("ROOM_READY");
pub const ROOM_RIGHTS: Identifier = id("ROOM_RIGHTS");
pub const ROOM_RIGHTS_2: Identifier = id("ROOM_RIGHTS_2");
pub const ROOM_RIGHTS_3: Identifier = id("ROOM_RIGHTS_3");
pub const HEIGHTMAP: Identifier = id("HEIGHTMAP");
pub const ACTIVEOBJECTS: Identifier = id("ACTIVEOBJECTS");
pub const ACTIVEOBJECT_ADD: Identifier = id("ACTIVEOBJECT_ADD");
pub const ACTIVEOBJECT_UPDATE: Identifier = id("ACTIVEOBJECT_UPDATE");
pub const ACTIVEOBJECT_REMOVE: Identifier = id("ACTIVEOBJECT_REMOVE");
pub const SLIDEOBJECTBUNDLE: Identifier = id("SLIDEOBJECTBUNDLE");
pub const ITEMS: Identifier = id("ITEMS");
pub const ITEMS_2: Identifier = id("ITEMS_2");
pub const UPDATEITEM: Identifier = id("UPDATEITEM");
pub const REMOVEITEM: Identifier = id("REMOVEITEM");
pub const USERS: Identifier = id("USERS");
pub const STATUS: Identifier = id("STATUS");
pub const CHAT: Identifier = id("CHAT");
pub const CHAT_2: Identifier = id("CHAT_2");
pub const CHAT_3: Identifier = id("CHAT_3");
pub const LOGOUT: Identifier = id("LOGOUT");
pub const CLC: Identifier = id("CLC");

// inventory
pub const STRIPINFO_2: Identifier = id("STRIPINFO_2");
pub const REMOVESTRIPITEM: Identifier = id("REMOVESTRIPITEM");

// trade
pub const TRADE_ITEMS: Identifier = id("TRADE_ITEMS");
pub const TRADE_ACCEPT: Identifier = id("TRADE_ACCEPT");
pub const TRADE_CLOSE: Identifier = id("TRADE_CLOSE");
pub const TRADE_COMPLETED_2: Identifier = id("TRADE_COMPLETED_2");

// profile
pub const USER_OBJ: Identifier = id("USER_OBJ");

// navigator
pub const NAVNODEINFO: Identifier = id("NAVNODEINFO");
pub const FLAT_RESULTS: Identifier = id("FLAT_RESULTS");
pub const FLAT_RESULTS_2: Identifier = id("FLAT_RESULTS_2");
pub const FAVOURITEROOMRESULTS: Identifier = id("FAVOURITEROOMRESULTS");
