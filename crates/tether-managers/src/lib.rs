//! # tether-managers
//!
//! State trackers built on the intercept layer. Each manager subscribes
//! persistently to a fixed set of messages, reconciles its state from the
//! intercepted traffic, and publishes typed events through the same
//! handler-list model as the packet layer.
//!
//! The managers target the Shockwave dialect, whose protocol has no
//! dedicated events for several state transitions; the room and trade
//! managers reconstruct those heuristically (see their module docs).

pub mod inbound;
pub mod inventory;
pub mod nav;
pub mod outbound;
pub mod profile;
pub mod room;
pub mod trade;

pub use inventory::InventoryManager;
pub use nav::NavManager;
pub use profile::ProfileManager;
pub use room::RoomManager;
pub use trade::TradeManager;
