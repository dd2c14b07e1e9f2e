//! Inventory state tracking.
//!
//! The inventory is delivered in pages of up to nine items, one page per
//! `GETSTRIP` request. [`InventoryManager::scan`] drives a full load by
//! paging until a short page or a repeated item id (the server wraps
//! around to the first page). While a scan is active, the user's own
//! `GETSTRIP` requests and the paged responses are blocked so the client
//! UI does not flicker through the pages.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use tether_extension::events::Event;
use tether_extension::intercept::{HandlerResult, Intercept};
use tether_extension::{ConnectionToken, ExtError, Extension};
use tether_protocol::{Packet, Parse, Result as ProtocolResult};

use crate::{inbound, outbound};

/// Full page size; a shorter page is the last one.
const PAGE_SIZE: usize = 9;
/// Delay between page requests.
const PAGE_DELAY: Duration = Duration::from_millis(550);
/// How long to wait for a page before retrying.
const PAGE_TIMEOUT: Duration = Duration::from_secs(1);
/// Page attempts before a scan fails.
const MAX_ATTEMPTS: u32 = 3;

/// The kind of an inventory item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemType {
    /// A floor item ("stuff").
    Floor,
    /// A wall item.
    Wall,
    Other(String),
}

impl Default for ItemType {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Floor => f.write_str("S"),
            Self::Wall => f.write_str("I"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

impl Parse for ItemType {
    fn parse(p: &mut Packet) -> ProtocolResult<Self> {
        Ok(match p.read_string()?.as_str() {
            "S" => Self::Floor,
            "I" => Self::Wall,
            other => Self::Other(other.to_owned()),
        })
    }
}

/// An item owned by the user.
#[derive(Debug, Clone, Default)]
pub struct Item {
    /// The inventory slot identity of the item.
    pub item_id: i32,
    /// The position of the item within its inventory page.
    pub pos: i32,
    pub item_type: ItemType,
    pub id: i32,
    pub class: String,
    pub dim_x: i32,
    pub dim_y: i32,
    pub colors: String,
    pub props: String,
}

impl Parse for Item {
    fn parse(p: &mut Packet) -> ProtocolResult<Self> {
        let mut item = Item {
            item_id: p.read()?,
            pos: p.read()?,
            item_type: p.read()?,
            id: p.read()?,
            class: p.read()?,
            ..Default::default()
        };
        match item.item_type {
            ItemType::Floor => {
                item.dim_x = p.read()?;
                item.dim_y = p.read()?;
                item.colors = p.read()?;
            }
            ItemType::Wall => item.props = p.read()?,
            ItemType::Other(_) => {}
        }
        Ok(item)
    }
}

/// Arguments for inventory events involving a single item.
#[derive(Debug, Clone)]
pub struct ItemArgs {
    pub item: Item,
}

/// How a scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// All pages were collected.
    Completed,
    /// The server stopped answering page requests.
    TimedOut,
    /// The scan was cancelled, or the connection ended.
    Cancelled,
}

/// A handle to an in-progress inventory scan.
#[derive(Clone)]
pub struct ScanHandle {
    rx: watch::Receiver<Option<ScanOutcome>>,
}

impl ScanHandle {
    /// Waits for the scan to finish.
    pub async fn wait(&self) -> ScanOutcome {
        let mut rx = self.rx.clone();
        let result = match rx.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) => outcome.unwrap_or(ScanOutcome::Cancelled),
            Err(_) => ScanOutcome::Cancelled,
        };
        result
    }

    /// The outcome, if the scan has finished.
    pub fn outcome(&self) -> Option<ScanOutcome> {
        *self.rx.borrow()
    }
}

struct ScanState {
    pages_tx: mpsc::Sender<Vec<Item>>,
    done_rx: watch::Receiver<Option<ScanOutcome>>,
    cancel_tx: watch::Sender<bool>,
}

struct InvInner {
    ext: Extension,
    updated: Event<()>,
    item_removed: Event<ItemArgs>,
    items: RwLock<HashMap<i32, Item>>,
    scan: Mutex<Option<ScanState>>,
}

/// Tracks the user's inventory.
pub struct InventoryManager {
    inner: Arc<InvInner>,
}

impl InventoryManager {
    /// Creates an inventory manager subscribed to the inventory packets
    /// of `ext`.
    pub fn new(ext: &Extension) -> Result<Self, ExtError> {
        let inner = Arc::new(InvInner {
            ext: ext.clone(),
            updated: Event::new(),
            item_removed: Event::new(),
            items: RwLock::new(HashMap::new()),
            scan: Mutex::new(None),
        });

        {
            let inner = Arc::clone(&inner);
            ext.intercept([outbound::GETSTRIP])
                .with(move |e| inner.handle_get_strip(e))?;
        }
        {
            let inner = Arc::clone(&inner);
            ext.intercept([inbound::STRIPINFO_2])
                .with(move |e| inner.handle_strip_info(e))?;
        }
        {
            let inner = Arc::clone(&inner);
            ext.intercept([inbound::REMOVESTRIPITEM])
                .with(move |e| inner.handle_remove_strip_item(e))?;
        }

        Ok(Self { inner })
    }

    /// Registers a handler invoked when inventory items are loaded.
    pub fn updated(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.inner.updated.register(move |_: &()| handler());
    }

    /// Registers a handler invoked when an item leaves the inventory.
    pub fn item_removed(&self, handler: impl Fn(&ItemArgs) + Send + Sync + 'static) {
        self.inner.item_removed.register(handler);
    }

    /// Gets an item by its inventory id.
    pub fn item(&self, item_id: i32) -> Option<Item> {
        self.inner.items.read().get(&item_id).cloned()
    }

    /// A snapshot of all known inventory items.
    pub fn items(&self) -> Vec<Item> {
        self.inner.items.read().values().cloned().collect()
    }

    pub fn item_count(&self) -> usize {
        self.inner.items.read().len()
    }

    /// Performs a full load of the inventory by paging through it.
    ///
    /// Concurrent calls coalesce into the scan already in progress and
    /// share its outcome.
    pub fn scan(&self) -> ScanHandle {
        let mut guard = self.inner.scan.lock();
        if let Some(state) = guard.as_ref() {
            return ScanHandle {
                rx: state.done_rx.clone(),
            };
        }

        tracing::debug!("beginning inventory scan");

        let (pages_tx, pages_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = watch::channel(None);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let token = self.inner.ext.connection_token();

        *guard = Some(ScanState {
            pages_tx,
            done_rx: done_rx.clone(),
            cancel_tx,
        });

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            run_scan(inner, pages_rx, done_tx, cancel_rx, token).await;
        });

        ScanHandle { rx: done_rx }
    }

    /// Cancels the scan in progress, if any.
    pub fn cancel_scan(&self) -> bool {
        let guard = self.inner.scan.lock();
        match guard.as_ref() {
            Some(state) => {
                tracing::debug!("cancelling inventory scan");
                let _ = state.cancel_tx.send(true);
                true
            }
            None => false,
        }
    }
}

impl InvInner {
    fn is_scanning(&self) -> bool {
        self.scan.lock().is_some()
    }

    fn load_items(&self, items: &[Item]) {
        let mut map = self.items.write();
        let mut added = 0;
        for item in items {
            if !map.contains_key(&item.item_id) {
                added += 1;
            }
            map.insert(item.item_id, item.clone());
        }
        if added > 0 {
            tracing::debug!(added, "added inventory items");
        }
    }

    /* handlers */

    fn handle_get_strip(&self, e: &mut Intercept) -> HandlerResult {
        // The scan owns the paging; user requests would desynchronize it.
        if self.is_scanning() {
            e.block();
        }
        Ok(())
    }

    fn handle_strip_info(&self, e: &mut Intercept) -> HandlerResult {
        let items: Vec<Item> = e.packet.read()?;

        self.load_items(&items);
        self.updated.dispatch(&());

        let guard = self.scan.lock();
        if let Some(state) = guard.as_ref() {
            e.block();
            if state.pages_tx.try_send(items).is_err() {
                tracing::warn!("failed to hand page to inventory scan");
            }
        }
        Ok(())
    }

    fn handle_remove_strip_item(&self, e: &mut Intercept) -> HandlerResult {
        let item_id = e.packet.read_int()?;
        match self.items.write().remove(&item_id) {
            Some(item) => {
                tracing::debug!(id = item_id, "removed inventory item");
                self.item_removed.dispatch(&ItemArgs { item });
            }
            None => tracing::debug!(id = item_id, "failed to find inventory item to remove"),
        }
        Ok(())
    }
}

async fn connection_closed(token: &Option<ConnectionToken>) {
    match token {
        Some(token) => token.closed().await,
        None => std::future::pending().await,
    }
}

async fn run_scan(
    inner: Arc<InvInner>,
    mut pages_rx: mpsc::Receiver<Vec<Item>>,
    done_tx: watch::Sender<Option<ScanOutcome>>,
    cancel_rx: watch::Receiver<bool>,
    token: Option<ConnectionToken>,
) {
    let mut attempt = 1;
    let mut page = 0u32;
    let mut seen: HashSet<i32> = HashSet::new();
    let mut cancel_wait_rx = cancel_rx.clone();

    let outcome = if inner
        .ext
        .send(outbound::GETSTRIP, &Bytes::from_static(b"new"))
        .is_err()
    {
        ScanOutcome::Cancelled
    } else {
        loop {
            tokio::select! {
                maybe_items = pages_rx.recv() => {
                    let Some(items) = maybe_items else {
                        break ScanOutcome::Cancelled;
                    };
                    page += 1;

                    let last = items.len() < PAGE_SIZE;
                    let wrapped =
                        !last && items.iter().any(|item| !seen.insert(item.item_id));
                    if !wrapped {
                        tracing::debug!(page, items = items.len(), "scanned page");
                    }
                    if last || wrapped {
                        tracing::debug!(pages = page, "completing inventory scan");
                        break ScanOutcome::Completed;
                    }

                    // Pace the next request; bail if cancelled meanwhile.
                    tokio::time::sleep(PAGE_DELAY).await;
                    let is_cancelled = *cancel_rx.borrow();
                    if is_cancelled
                        || token.as_ref().map(|t| t.is_closed()).unwrap_or(false)
                    {
                        break ScanOutcome::Cancelled;
                    }
                    if inner
                        .ext
                        .send(outbound::GETSTRIP, &Bytes::from_static(b"next"))
                        .is_err()
                    {
                        break ScanOutcome::Cancelled;
                    }
                }
                _ = tokio::time::sleep(PAGE_TIMEOUT) => {
                    if attempt < MAX_ATTEMPTS {
                        attempt += 1;
                        tracing::debug!(attempt, "inventory page timed out, retrying");
                        if inner
                            .ext
                            .send(outbound::GETSTRIP, &Bytes::from_static(b"next"))
                            .is_err()
                        {
                            break ScanOutcome::Cancelled;
                        }
                    } else {
                        tracing::debug!(attempt, "inventory scan timed out");
                        break ScanOutcome::TimedOut;
                    }
                }
                _ = async { let _ = cancel_wait_rx.wait_for(|cancelled| *cancelled).await; } => {
                    break ScanOutcome::Cancelled;
                }
                _ = connection_closed(&token) => {
                    break ScanOutcome::Cancelled;
                }
            }
        }
    };

    *inner.scan.lock() = None;
    let _ = done_tx.send(Some(outcome));
}
