//! Manager behavior over a simulated Shockwave session.

mod common;

use std::sync::Arc;

use parking_lot::Mutex;

use common::Host;
use tether::extension::{ExtInfo, Extension};
use tether::managers::inventory::ScanOutcome;
use tether::managers::room::ChatType;
use tether::managers::{
    InventoryManager, NavManager, ProfileManager, RoomManager, TradeManager,
};
use tether::protocol::{ClientType, Direction, Header, Packet};

const SHOCKWAVE: ClientType = ClientType::Shockwave;

fn ext() -> Extension {
    Extension::new(ExtInfo {
        title: "test".into(),
        ..Default::default()
    })
}

/// The full message table the managers bind against.
fn message_table() -> Vec<(&'static str, u16, bool)> {
    vec![
        // room
        ("OPC_OK", 1, false),
        ("FLATINFO", 2, false),
        ("ROOM_READY", 3, false),
        ("ROOM_RIGHTS", 4, false),
        ("ROOM_RIGHTS_2", 5, false),
        ("ROOM_RIGHTS_3", 6, false),
        ("HEIGHTMAP", 7, false),
        ("ACTIVEOBJECTS", 8, false),
        ("ACTIVEOBJECT_ADD", 9, false),
        ("ACTIVEOBJECT_UPDATE", 10, false),
        ("ACTIVEOBJECT_REMOVE", 11, false),
        ("SLIDEOBJECTBUNDLE", 12, false),
        ("ITEMS", 13, false),
        ("ITEMS_2", 14, false),
        ("UPDATEITEM", 15, false),
        ("REMOVEITEM", 16, false),
        ("USERS", 17, false),
        ("STATUS", 18, false),
        ("CHAT", 19, false),
        ("CHAT_2", 20, false),
        ("CHAT_3", 21, false),
        ("LOGOUT", 22, false),
        ("CLC", 23, false),
        // inventory
        ("GETSTRIP", 30, true),
        ("STRIPINFO_2", 31, false),
        ("REMOVESTRIPITEM", 32, false),
        // trade
        ("TRADE_ITEMS", 40, false),
        ("TRADE_ACCEPT", 41, false),
        ("TRADE_CLOSE", 42, false),
        ("TRADE_COMPLETED_2", 43, false),
        ("TRADE_ADDITEM", 44, true),
        ("TRADE_ACCEPT", 45, true),
        ("TRADE_UNACCEPT", 46, true),
        // profile
        ("USER_OBJ", 50, false),
        ("INFORETRIEVE", 51, true),
        // navigator
        ("NAVIGATE", 60, true),
        ("NAVNODEINFO", 61, false),
        ("SRCHF", 62, true),
        ("FLAT_RESULTS_2", 63, false),
        ("SUSERF", 64, true),
        ("FLAT_RESULTS", 65, false),
        ("GETFVRF", 66, true),
        ("FAVOURITEROOMRESULTS", 67, false),
    ]
}

fn incoming(value: u16) -> Packet {
    Packet::new(SHOCKWAVE, Header::new(Direction::In, value))
}

fn outgoing(value: u16) -> Packet {
    Packet::new(SHOCKWAVE, Header::new(Direction::Out, value))
}

fn room_ready_packet(model: &str, id: i32) -> Packet {
    let mut p = incoming(3);
    p.write_string(&format!("{model} {id}")).unwrap();
    p
}

fn users_packet(entities: &[(i32, &str)]) -> Packet {
    let mut p = incoming(17);
    p.write_short(entities.len() as i16).unwrap();
    for (index, name) in entities {
        p.write_int(*index).unwrap();
        p.write_string(name).unwrap();
        p.write_string("figure").unwrap(); // figure
        p.write_string("F").unwrap(); // gender
        p.write_string("").unwrap(); // custom
        p.write_int(1).unwrap(); // x
        p.write_int(2).unwrap(); // y
        p.write_float(0.0).unwrap(); // z
        p.write_string("").unwrap(); // pool figure
        p.write_string("").unwrap(); // badge
        p.write_int(1).unwrap(); // kind: user
    }
    p
}

fn inventory_page(ids: impl IntoIterator<Item = i32>) -> Packet {
    let ids: Vec<i32> = ids.into_iter().collect();
    let mut p = incoming(31);
    p.write_short(ids.len() as i16).unwrap();
    for (slot, id) in ids.iter().enumerate() {
        p.write_int(*id).unwrap(); // item id
        p.write_int(slot as i32).unwrap(); // pos
        p.write_string("S").unwrap(); // floor item
        p.write_int(*id + 10_000).unwrap(); // furni id
        p.write_string("shelf").unwrap(); // class
        p.write_int(1).unwrap(); // dim x
        p.write_int(1).unwrap(); // dim y
        p.write_string("ff0000").unwrap(); // colors
    }
    p
}

fn trade_items_packet(trader: &str, tradee: &str) -> Packet {
    let mut p = incoming(40);
    for name in [trader, tradee] {
        p.write_string(name).unwrap();
        p.write_bool(false).unwrap();
        p.write_short(0).unwrap(); // no items
    }
    p
}

#[tokio::test]
async fn room_users_entry_heuristic() {
    let ext = ext();
    let room = RoomManager::new(&ext).unwrap();

    let seen: Arc<Mutex<Vec<(bool, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        room.entities_added(move |args| {
            seen.lock().push((args.entered, args.entities.len()));
        });
    }

    let mut host = Host::start(&ext);
    host.send_connection_start("SHOCKWAVE", &message_table()).await;

    host.send_intercept(&room_ready_packet("model_a", 123)).await;
    host.expect_manipulated(SHOCKWAVE).await;
    assert!(room.is_in_room());
    assert_eq!(room.id(), 123);
    assert_eq!(room.model(), "model_a");

    // Two replayed occupant lists, then a real arrival.
    host.send_intercept(&users_packet(&[
        (1, "a"),
        (2, "b"),
        (3, "c"),
        (4, "d"),
        (5, "e"),
    ]))
    .await;
    host.expect_manipulated(SHOCKWAVE).await;
    host.send_intercept(&users_packet(&[(6, "f")])).await;
    host.expect_manipulated(SHOCKWAVE).await;
    host.send_intercept(&users_packet(&[(7, "g")])).await;
    host.expect_manipulated(SHOCKWAVE).await;

    assert_eq!(&*seen.lock(), &[(false, 5), (false, 1), (true, 1)]);
    assert_eq!(room.entity_count(), 7);
    assert_eq!(room.entity_by_name("G").unwrap().index, 7);
}

#[tokio::test]
async fn room_teardown_publishes_left() {
    let ext = ext();
    let room = RoomManager::new(&ext).unwrap();

    let left: Arc<Mutex<Vec<i32>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let left = Arc::clone(&left);
        room.left(move |args| left.lock().push(args.id));
    }

    let mut host = Host::start(&ext);
    host.send_connection_start("SHOCKWAVE", &message_table()).await;

    host.send_intercept(&room_ready_packet("model_b", 9)).await;
    host.expect_manipulated(SHOCKWAVE).await;
    host.send_intercept(&users_packet(&[(1, "a")])).await;
    host.expect_manipulated(SHOCKWAVE).await;

    // OPC_OK tears the room down.
    host.send_intercept(&incoming(1)).await;
    host.expect_manipulated(SHOCKWAVE).await;

    assert_eq!(&*left.lock(), &[9]);
    assert!(!room.is_in_room());
    assert_eq!(room.entity_count(), 0);

    // Re-entering restarts the users heuristic.
    host.send_intercept(&room_ready_packet("model_b", 10)).await;
    host.expect_manipulated(SHOCKWAVE).await;
    host.send_intercept(&users_packet(&[(1, "a")])).await;
    host.expect_manipulated(SHOCKWAVE).await;
    assert_eq!(room.entity_count(), 1);
}

#[tokio::test]
async fn room_chat_types_distinguished_by_header() {
    let ext = ext();
    let room = RoomManager::new(&ext).unwrap();

    let chats: Arc<Mutex<Vec<(String, ChatType, String)>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let chats = Arc::clone(&chats);
        room.entity_chat(move |args| {
            chats
                .lock()
                .push((args.entity.name.clone(), args.chat_type, args.message.clone()));
        });
    }

    let mut host = Host::start(&ext);
    host.send_connection_start("SHOCKWAVE", &message_table()).await;
    host.send_intercept(&room_ready_packet("model_a", 1)).await;
    host.expect_manipulated(SHOCKWAVE).await;
    host.send_intercept(&users_packet(&[(4, "speaker")])).await;
    host.expect_manipulated(SHOCKWAVE).await;

    for (header, message) in [(19u16, "hello"), (21u16, "HEY")] {
        let mut p = incoming(header);
        p.write_int(4).unwrap();
        p.write_string(message).unwrap();
        host.send_intercept(&p).await;
        host.expect_manipulated(SHOCKWAVE).await;
    }

    let chats = chats.lock();
    assert_eq!(chats.len(), 2);
    assert_eq!(chats[0], ("speaker".into(), ChatType::Talk, "hello".into()));
    assert_eq!(chats[1], ("speaker".into(), ChatType::Shout, "HEY".into()));
}

#[tokio::test]
async fn trade_open_heuristic() {
    let ext = ext();
    let trade = TradeManager::new(&ext).unwrap();

    let updates: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let updates = Arc::clone(&updates);
        trade.updated(move |args| updates.lock().push(args.opened));
    }

    let mut host = Host::start(&ext);
    host.send_connection_start("SHOCKWAVE", &message_table()).await;

    // Not trading: first offer list opens the trade.
    host.send_intercept(&trade_items_packet("alice", "bob")).await;
    host.expect_manipulated(SHOCKWAVE).await;
    assert!(trade.is_trading());
    assert_eq!(trade.offers().trader().name, "alice");

    // Same names: plain update.
    host.send_intercept(&trade_items_packet("alice", "bob")).await;
    host.expect_manipulated(SHOCKWAVE).await;

    // Changed trader name: a new trade replaced the window.
    host.send_intercept(&trade_items_packet("carol", "bob")).await;
    host.expect_manipulated(SHOCKWAVE).await;

    assert_eq!(&*updates.lock(), &[true, false, true]);
    assert_eq!(trade.offers().trader().name, "carol");
}

#[tokio::test]
async fn trade_accept_and_close() {
    let ext = ext();
    let trade = TradeManager::new(&ext).unwrap();

    let accepts: Arc<Mutex<Vec<(String, bool)>>> = Arc::new(Mutex::new(Vec::new()));
    {
        let accepts = Arc::clone(&accepts);
        trade.accepted(move |args| accepts.lock().push((args.name.clone(), args.accepted)));
    }
    let closed = Arc::new(Mutex::new(0u32));
    {
        let closed = Arc::clone(&closed);
        trade.closed(move |_| *closed.lock() += 1);
    }

    let mut host = Host::start(&ext);
    host.send_connection_start("SHOCKWAVE", &message_table()).await;

    host.send_intercept(&trade_items_packet("alice", "bob")).await;
    host.expect_manipulated(SHOCKWAVE).await;

    let mut p = incoming(41);
    p.write_string("bob/true").unwrap();
    host.send_intercept(&p).await;
    host.expect_manipulated(SHOCKWAVE).await;

    assert_eq!(&*accepts.lock(), &[("bob".into(), true)]);
    assert!(trade.offers().tradee().accepted);

    host.send_intercept(&incoming(42)).await;
    host.expect_manipulated(SHOCKWAVE).await;
    assert_eq!(*closed.lock(), 1);
    assert!(!trade.is_trading());
}

#[tokio::test(start_paused = true)]
async fn inventory_scan_collects_all_pages() {
    let ext = ext();
    let inventory = InventoryManager::new(&ext).unwrap();

    let mut host = Host::start(&ext);
    host.send_connection_start("SHOCKWAVE", &message_table()).await;
    host.barrier(SHOCKWAVE).await;

    let handle = inventory.scan();

    // "new", then one paced "next" per full page.
    let sent = host.expect_send_message(SHOCKWAVE).await;
    assert_eq!(sent.header, 30);
    assert_eq!(sent.data, b"new");

    for page in [inventory_page(1..=9), inventory_page(10..=18)] {
        host.send_intercept(&page).await;
        // Pages are blocked while the scan drives the paging.
        assert!(host.expect_manipulated(SHOCKWAVE).await.blocked);
        let sent = host.expect_send_message(SHOCKWAVE).await;
        assert_eq!(sent.data, b"next");
    }

    // A short page ends the scan; no further request follows.
    host.send_intercept(&inventory_page(19..=22)).await;
    assert!(host.expect_manipulated(SHOCKWAVE).await.blocked);

    assert_eq!(handle.wait().await, ScanOutcome::Completed);
    assert_eq!(inventory.item_count(), 22);
    assert_eq!(inventory.item(22).unwrap().class, "shelf");
}

#[tokio::test(start_paused = true)]
async fn inventory_scan_detects_wraparound() {
    let ext = ext();
    let inventory = InventoryManager::new(&ext).unwrap();

    let mut host = Host::start(&ext);
    host.send_connection_start("SHOCKWAVE", &message_table()).await;
    host.barrier(SHOCKWAVE).await;

    let handle = inventory.scan();
    host.expect_send_message(SHOCKWAVE).await;

    host.send_intercept(&inventory_page(1..=9)).await;
    host.expect_manipulated(SHOCKWAVE).await;
    let sent = host.expect_send_message(SHOCKWAVE).await;
    assert_eq!(sent.data, b"next");

    // The server wrapped around to the first page.
    host.send_intercept(&inventory_page(1..=9)).await;
    host.expect_manipulated(SHOCKWAVE).await;

    assert_eq!(handle.wait().await, ScanOutcome::Completed);
    assert_eq!(inventory.item_count(), 9);
}

#[tokio::test(start_paused = true)]
async fn inventory_scan_times_out_after_retries() {
    let ext = ext();
    let inventory = InventoryManager::new(&ext).unwrap();

    let mut host = Host::start(&ext);
    host.send_connection_start("SHOCKWAVE", &message_table()).await;
    host.barrier(SHOCKWAVE).await;

    let handle = inventory.scan();

    // Never answer any page request.
    assert_eq!(handle.wait().await, ScanOutcome::TimedOut);

    // The scan slot is cleared; a new scan can start.
    assert!(!inventory.cancel_scan());
}

#[tokio::test(start_paused = true)]
async fn inventory_scan_coalesces_and_blocks_user_paging() {
    let ext = ext();
    let inventory = InventoryManager::new(&ext).unwrap();

    let mut host = Host::start(&ext);
    host.send_connection_start("SHOCKWAVE", &message_table()).await;
    host.barrier(SHOCKWAVE).await;

    let first = inventory.scan();
    let second = inventory.scan();
    host.expect_send_message(SHOCKWAVE).await;

    // The user's own page request is swallowed while scanning.
    let mut user_request = outgoing(30);
    user_request.write_bytes(b"next").unwrap();
    host.send_intercept(&user_request).await;
    assert!(host.expect_manipulated(SHOCKWAVE).await.blocked);

    host.send_intercept(&inventory_page(1..=3)).await;
    host.expect_manipulated(SHOCKWAVE).await;

    assert_eq!(first.wait().await, ScanOutcome::Completed);
    assert_eq!(second.wait().await, ScanOutcome::Completed);
}

#[tokio::test(start_paused = true)]
async fn inventory_scan_can_be_cancelled() {
    let ext = ext();
    let inventory = InventoryManager::new(&ext).unwrap();

    let mut host = Host::start(&ext);
    host.send_connection_start("SHOCKWAVE", &message_table()).await;
    host.barrier(SHOCKWAVE).await;

    let handle = inventory.scan();
    host.expect_send_message(SHOCKWAVE).await;

    assert!(inventory.cancel_scan());
    assert_eq!(handle.wait().await, ScanOutcome::Cancelled);
}

#[tokio::test]
async fn inventory_remove_item() {
    let ext = ext();
    let inventory = InventoryManager::new(&ext).unwrap();

    let mut host = Host::start(&ext);
    host.send_connection_start("SHOCKWAVE", &message_table()).await;

    host.send_intercept(&inventory_page([5, 6])).await;
    host.expect_manipulated(SHOCKWAVE).await;
    assert_eq!(inventory.item_count(), 2);

    let mut p = incoming(32);
    p.write_int(5).unwrap();
    host.send_intercept(&p).await;
    host.expect_manipulated(SHOCKWAVE).await;

    assert_eq!(inventory.item_count(), 1);
    assert!(inventory.item(5).is_none());
    assert!(inventory.item(6).is_some());
}

#[tokio::test]
async fn profile_requested_when_attached_mid_connection() {
    let ext = ext();
    let profile = ProfileManager::new(&ext).unwrap();

    let mut host = Host::start(&ext);
    host.send_init(true).await;
    host.send_connection_start("SHOCKWAVE", &message_table()).await;

    // Attached to a live connection: the manager asks for the user
    // object itself.
    let sent = host.expect_send_message(SHOCKWAVE).await;
    assert_eq!(sent.header, 51);

    let mut p = incoming(50);
    p.write_string("name=b7\rfigure=f\rsex=M\rph_tickets=3\ronlineStatus=1")
        .unwrap();
    host.send_intercept(&p).await;
    host.expect_manipulated(SHOCKWAVE).await;

    let current = profile.profile();
    assert_eq!(current.name, "b7");
    assert_eq!(current.gender, "M");
    assert_eq!(current.ph_tickets, 3);
    assert!(current.online_status);
}

#[tokio::test(start_paused = true)]
async fn navigator_navigate_round_trip() {
    let ext = ext();
    let nav = Arc::new(NavManager::new(&ext));

    let mut host = Host::start(&ext);
    host.send_connection_start("SHOCKWAVE", &message_table()).await;
    host.barrier(SHOCKWAVE).await;

    let task = {
        let nav = Arc::clone(&nav);
        tokio::spawn(async move { nav.navigate(5).await.unwrap() })
    };
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }

    let sent = host.expect_send_message(SHOCKWAVE).await;
    assert_eq!(sent.header, 60);

    // Reply whose root node id matches the query.
    let mut p = incoming(61);
    p.write_int(0).unwrap(); // node mask
    p.write_int(5).unwrap(); // root id
    p.write_int(0).unwrap(); // category
    p.write_string("root").unwrap();
    p.write_int(0).unwrap();
    p.write_int(10).unwrap();
    p.write_int(0).unwrap(); // parent
    host.send_intercept(&p).await;

    // The reply is consumed by the receiver, not the client.
    assert!(host.expect_manipulated(SHOCKWAVE).await.blocked);

    let tree = task.await.unwrap().expect("node tree");
    assert_eq!(tree.root().id, 5);
    assert_eq!(tree.root().name(), "root");
}
