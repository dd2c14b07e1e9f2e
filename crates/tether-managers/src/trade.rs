//! Trade state tracking.
//!
//! The dialect has no trade-opened packet. The server re-sends the offer
//! list whenever a trade window changes, so the manager infers openings:
//! receiving offers while not trading opens a trade, and receiving offers
//! whose trader names differ from the current ones means a new trade
//! replaced the old window.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use tether_extension::events::Event;
use tether_extension::intercept::{HandlerResult, Intercept};
use tether_extension::{ExtError, Extension};
use tether_protocol::{Packet, Parse, Result as ProtocolResult};

use crate::inventory::Item;
use crate::{inbound, outbound};

/// One side of a trade.
#[derive(Debug, Clone, Default)]
pub struct Offer {
    pub name: String,
    pub accepted: bool,
    pub items: Vec<Item>,
}

impl Parse for Offer {
    fn parse(p: &mut Packet) -> ProtocolResult<Self> {
        Ok(Self {
            name: p.read()?,
            accepted: p.read()?,
            items: p.read()?,
        })
    }
}

/// The two offers of a trade: the trader's (who initiated it) and the
/// tradee's.
#[derive(Debug, Clone, Default)]
pub struct Offers(pub [Offer; 2]);

impl Offers {
    /// The offer of the user who initiated the trade.
    pub fn trader(&self) -> &Offer {
        &self.0[0]
    }

    /// The offer of the user who received the trade request.
    pub fn tradee(&self) -> &Offer {
        &self.0[1]
    }
}

impl Parse for Offers {
    fn parse(p: &mut Packet) -> ProtocolResult<Self> {
        Ok(Self([p.read()?, p.read()?]))
    }
}

/// Arguments for trade update events.
#[derive(Debug, Clone)]
pub struct TradeArgs {
    /// Whether this update opened a trade.
    pub opened: bool,
    pub offers: Offers,
}

/// Arguments for trade accept events.
#[derive(Debug, Clone)]
pub struct AcceptArgs {
    pub name: String,
    pub accepted: bool,
}

#[derive(Default)]
struct TradeState {
    trading: bool,
    offers: Offers,
}

struct TradeInner {
    ext: Extension,
    updated: Event<TradeArgs>,
    accepted: Event<AcceptArgs>,
    completed: Event<TradeArgs>,
    closed: Event<TradeArgs>,
    state: RwLock<TradeState>,
}

/// Tracks the state of trades.
pub struct TradeManager {
    inner: Arc<TradeInner>,
}

impl TradeManager {
    /// Creates a trade manager subscribed to the trade packets of `ext`.
    pub fn new(ext: &Extension) -> Result<Self, ExtError> {
        let inner = Arc::new(TradeInner {
            ext: ext.clone(),
            updated: Event::new(),
            accepted: Event::new(),
            completed: Event::new(),
            closed: Event::new(),
            state: RwLock::new(TradeState::default()),
        });

        {
            let inner = Arc::clone(&inner);
            ext.intercept([inbound::TRADE_ITEMS])
                .with(move |e| inner.handle_trade_items(e))?;
        }
        {
            let inner = Arc::clone(&inner);
            ext.intercept([inbound::TRADE_ACCEPT])
                .with(move |e| inner.handle_trade_accept(e))?;
        }
        {
            let inner = Arc::clone(&inner);
            ext.intercept([inbound::TRADE_CLOSE])
                .with(move |e| inner.handle_trade_close(e))?;
        }
        {
            let inner = Arc::clone(&inner);
            ext.intercept([inbound::TRADE_COMPLETED_2])
                .with(move |e| inner.handle_trade_completed(e))?;
        }

        Ok(Self { inner })
    }

    /// Whether a trade is currently open.
    pub fn is_trading(&self) -> bool {
        self.inner.state.read().trading
    }

    /// The current offers.
    pub fn offers(&self) -> Offers {
        self.inner.state.read().offers.clone()
    }

    /// Offers the item with the given inventory id in the current trade.
    pub fn offer(&self, item_id: i32) -> Result<(), ExtError> {
        // The item id travels as a bare decimal string.
        self.inner
            .ext
            .send(
                outbound::TRADE_ADDITEM,
                &Bytes::from(item_id.to_string().into_bytes()),
            )
    }

    /// Offers the given inventory item in the current trade.
    pub fn offer_item(&self, item: &Item) -> Result<(), ExtError> {
        self.offer(item.item_id)
    }

    /// Accepts the trade.
    pub fn accept(&self) -> Result<(), ExtError> {
        self.inner.ext.send(outbound::TRADE_ACCEPT, &())
    }

    /// Withdraws acceptance of the trade.
    pub fn unaccept(&self) -> Result<(), ExtError> {
        self.inner.ext.send(outbound::TRADE_UNACCEPT, &())
    }

    /// Registers a handler invoked when the trade is updated. The
    /// `opened` flag is set when the update opened a (new) trade.
    pub fn updated(&self, handler: impl Fn(&TradeArgs) + Send + Sync + 'static) {
        self.inner.updated.register(handler);
    }

    /// Registers a handler invoked when either side accepts or unaccepts.
    pub fn accepted(&self, handler: impl Fn(&AcceptArgs) + Send + Sync + 'static) {
        self.inner.accepted.register(handler);
    }

    /// Registers a handler invoked when the trade completes.
    pub fn completed(&self, handler: impl Fn(&TradeArgs) + Send + Sync + 'static) {
        self.inner.completed.register(handler);
    }

    /// Registers a handler invoked when the trade closes.
    pub fn closed(&self, handler: impl Fn(&TradeArgs) + Send + Sync + 'static) {
        self.inner.closed.register(handler);
    }
}

impl TradeInner {
    fn handle_trade_items(&self, e: &mut Intercept) -> HandlerResult {
        let offers: Offers = e.packet.read()?;

        let opened = {
            let mut state = self.state.write();
            let opened = if state.trading {
                // A name change means the old window was silently replaced.
                let changed = (0..2).any(|i| state.offers.0[i].name != offers.0[i].name);
                if changed {
                    tracing::debug!(
                        trader = %offers.trader().name,
                        tradee = %offers.tradee().name,
                        "detected trade open from trader name change"
                    );
                }
                changed
            } else {
                state.trading = true;
                true
            };
            state.offers = offers.clone();
            opened
        };

        tracing::debug!(
            opened,
            trader_items = offers.trader().items.len(),
            tradee_items = offers.tradee().items.len(),
            "trade updated"
        );
        self.updated.dispatch(&TradeArgs { opened, offers });
        Ok(())
    }

    fn handle_trade_accept(&self, e: &mut Intercept) -> HandlerResult {
        if !self.state.read().trading {
            return Ok(());
        }

        let s = e.packet.read_string()?;
        let Some((name, accepted)) = s.split_once('/') else {
            tracing::warn!(value = %s, "malformed trade accept payload");
            return Ok(());
        };
        let name = name.to_owned();
        let accepted = accepted == "true";

        let found = {
            let mut state = self.state.write();
            match state.offers.0.iter_mut().find(|offer| offer.name == name) {
                Some(offer) => {
                    offer.accepted = accepted;
                    true
                }
                None => false,
            }
        };

        if found {
            self.accepted.dispatch(&AcceptArgs { name, accepted });
        } else {
            tracing::warn!(name = %name, "failed to find offer to accept");
        }
        Ok(())
    }

    fn handle_trade_completed(&self, _e: &mut Intercept) -> HandlerResult {
        let state = self.state.read();
        if !state.trading {
            return Ok(());
        }
        tracing::debug!("trade completed");
        let args = TradeArgs {
            opened: false,
            offers: state.offers.clone(),
        };
        drop(state);
        self.completed.dispatch(&args);
        Ok(())
    }

    fn handle_trade_close(&self, _e: &mut Intercept) -> HandlerResult {
        let offers = {
            let mut state = self.state.write();
            if !state.trading {
                return Ok(());
            }
            state.trading = false;
            std::mem::take(&mut state.offers)
        };
        tracing::debug!("trade closed");
        self.closed.dispatch(&TradeArgs {
            opened: false,
            offers,
        });
        Ok(())
    }
}
