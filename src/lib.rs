//! # Tether
//!
//! A runtime for building extensions that attach to an intercepting
//! game-client proxy. The proxy sits between a game client and its server
//! and hands every protocol packet to connected extensions, which may
//! observe, modify, block or inject packets over a local control channel.
//!
//! ## Components
//!
//! - `tether-protocol`: wire encodings, the multi-dialect packet codec,
//!   the header registry and the control-channel framing
//! - `tether-extension`: the extension façade, intercept dispatch engine
//!   and inline receivers
//! - `tether-managers`: room, inventory, trade, profile and navigator
//!   state trackers built on top of the intercept layer
//!
//! ## Example
//!
//! See the `demos/` directory for runnable extensions.

pub use tether_extension as extension;
pub use tether_managers as managers;
pub use tether_protocol as protocol;
