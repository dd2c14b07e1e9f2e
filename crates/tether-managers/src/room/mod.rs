//! Room state tracking.
//!
//! The dialect has no dedicated room-entry event, so two reconciliations
//! are heuristic:
//!
//! - Room info (`FLATINFO`) arrives before `ROOM_READY` and is cached by
//!   id; entry promotes the cached record to the current room.
//! - The entity list (`USERS`) is replayed on entry. The first two
//!   packets for a room are the pre-populated occupant list; the third
//!   and later ones announce entities that actually entered.

mod events;
mod types;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use tether_extension::intercept::{HandlerResult, Intercept};
use tether_extension::{ExtError, Extension};

use crate::inbound;

pub use events::{
    EntitiesArgs, EntityArgs, EntityChatArgs, EntityUpdateArgs, ItemArgs, ItemUpdateArgs,
    ItemsArgs, ObjectArgs, ObjectUpdateArgs, ObjectsArgs, RoomArgs, SlideArgs, SlideEntityArgs,
    SlideObjectArgs,
};
pub use types::{
    ChatType, Entity, EntityKind, EntityStatus, Item, Items, Object, Point, RoomInfo,
    SlideMoveType, SlideObject, SlideObjectBundle, Tile,
};

use events::RoomEvents;

#[derive(Default)]
struct RoomState {
    is_in_room: bool,
    room_id: i32,
    model: String,
    info: Option<RoomInfo>,
    is_owner: bool,
    has_rights: bool,
    heightmap: Vec<String>,
    users_packet_count: u32,
}

struct RoomInner {
    events: RoomEvents,
    info_cache: RwLock<HashMap<i32, RoomInfo>>,
    state: RwLock<RoomState>,
    objects: RwLock<HashMap<i32, Object>>,
    items: RwLock<HashMap<i32, Item>>,
    entities: RwLock<HashMap<i32, Entity>>,
}

/// Tracks the current room: its info, floor and wall items, entities,
/// rights and heightmap.
pub struct RoomManager {
    inner: Arc<RoomInner>,
}

impl RoomManager {
    /// Creates a room manager subscribed to the room packets of `ext`.
    pub fn new(ext: &Extension) -> Result<Self, ExtError> {
        let inner = Arc::new(RoomInner {
            events: RoomEvents::default(),
            info_cache: RwLock::new(HashMap::new()),
            state: RwLock::new(RoomState::default()),
            objects: RwLock::new(HashMap::new()),
            items: RwLock::new(HashMap::new()),
            entities: RwLock::new(HashMap::new()),
        });

        macro_rules! subscribe {
            ($ids:expr, $method:ident) => {{
                let inner = Arc::clone(&inner);
                ext.intercept($ids)
                    .with(move |e| inner.$method(e))?;
            }};
        }

        subscribe!([inbound::FLATINFO], handle_flat_info);
        subscribe!([inbound::OPC_OK], handle_opc_ok);
        subscribe!([inbound::ROOM_READY], handle_room_ready);
        subscribe!(
            [
                inbound::ROOM_RIGHTS,
                inbound::ROOM_RIGHTS_2,
                inbound::ROOM_RIGHTS_3
            ],
            handle_room_rights
        );
        subscribe!([inbound::HEIGHTMAP], handle_heightmap);
        subscribe!([inbound::ACTIVEOBJECTS], handle_active_objects);
        subscribe!([inbound::ACTIVEOBJECT_ADD], handle_active_object_add);
        subscribe!([inbound::ACTIVEOBJECT_UPDATE], handle_active_object_update);
        subscribe!([inbound::ACTIVEOBJECT_REMOVE], handle_active_object_remove);
        subscribe!([inbound::SLIDEOBJECTBUNDLE], handle_slide_object_bundle);
        subscribe!([inbound::ITEMS], handle_items);
        subscribe!([inbound::ITEMS_2, inbound::UPDATEITEM], handle_add_or_update_item);
        subscribe!([inbound::REMOVEITEM], handle_remove_item);
        subscribe!([inbound::USERS], handle_users);
        subscribe!([inbound::STATUS], handle_status);
        subscribe!([inbound::CHAT, inbound::CHAT_2, inbound::CHAT_3], handle_chat);
        subscribe!([inbound::LOGOUT], handle_logout);
        subscribe!([inbound::CLC], handle_clc);

        Ok(Self { inner })
    }

    /* queries */

    /// Whether the user is currently in a room.
    pub fn is_in_room(&self) -> bool {
        self.inner.state.read().is_in_room
    }

    /// The id of the current room.
    pub fn id(&self) -> i32 {
        self.inner.state.read().room_id
    }

    /// The model name of the current room.
    pub fn model(&self) -> String {
        self.inner.state.read().model.clone()
    }

    /// Info for the current room, when it was seen before entry.
    pub fn info(&self) -> Option<RoomInfo> {
        self.inner.state.read().info.clone()
    }

    /// Whether the user owns the current room.
    pub fn is_owner(&self) -> bool {
        self.inner.state.read().is_owner
    }

    /// Whether the user has rights in the current room.
    pub fn has_rights(&self) -> bool {
        self.inner.state.read().has_rights
    }

    /// The heightmap rows of the current room.
    pub fn heightmap(&self) -> Vec<String> {
        self.inner.state.read().heightmap.clone()
    }

    /// Gets a floor item by id.
    pub fn object(&self, id: i32) -> Option<Object> {
        self.inner.objects.read().get(&id).cloned()
    }

    /// A snapshot of all floor items in the room.
    pub fn objects(&self) -> Vec<Object> {
        self.inner.objects.read().values().cloned().collect()
    }

    pub fn object_count(&self) -> usize {
        self.inner.objects.read().len()
    }

    /// Gets a wall item by id.
    pub fn item(&self, id: i32) -> Option<Item> {
        self.inner.items.read().get(&id).cloned()
    }

    /// A snapshot of all wall items in the room.
    pub fn items(&self) -> Vec<Item> {
        self.inner.items.read().values().cloned().collect()
    }

    pub fn item_count(&self) -> usize {
        self.inner.items.read().len()
    }

    /// Gets an entity by its index.
    pub fn entity(&self, index: i32) -> Option<Entity> {
        self.inner.entities.read().get(&index).cloned()
    }

    /// Gets an entity by name, case-insensitively.
    pub fn entity_by_name(&self, name: &str) -> Option<Entity> {
        self.inner
            .entities
            .read()
            .values()
            .find(|entity| entity.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// A snapshot of all entities in the room.
    pub fn entities(&self) -> Vec<Entity> {
        self.inner.entities.read().values().cloned().collect()
    }

    pub fn entity_count(&self) -> usize {
        self.inner.entities.read().len()
    }
}

impl RoomInner {
    fn enter_room(&self, model: String, id: i32) {
        let mut state = self.state.write();
        state.model = model;
        state.room_id = id;
        state.is_in_room = true;
        state.info = self.info_cache.read().get(&id).cloned();
    }

    fn leave_room(&self) {
        let args = {
            let mut state = self.state.write();
            if !state.is_in_room {
                return;
            }
            let args = RoomArgs {
                id: state.room_id,
                info: state.info.take(),
            };
            *state = RoomState::default();
            args
        };

        self.objects.write().clear();
        self.items.write().clear();
        self.entities.write().clear();

        tracing::debug!(id = args.id, "left room");
        self.events.left.dispatch(&args);
    }

    fn is_in_room(&self) -> bool {
        self.state.read().is_in_room
    }

    /* handlers */

    fn handle_flat_info(&self, e: &mut Intercept) -> HandlerResult {
        let info: RoomInfo = e.packet.read()?;
        tracing::debug!(id = info.id, "cached room info");
        self.info_cache.write().insert(info.id, info);
        Ok(())
    }

    fn handle_opc_ok(&self, _e: &mut Intercept) -> HandlerResult {
        self.leave_room();
        Ok(())
    }

    fn handle_clc(&self, _e: &mut Intercept) -> HandlerResult {
        self.leave_room();
        Ok(())
    }

    fn handle_room_ready(&self, e: &mut Intercept) -> HandlerResult {
        if self.is_in_room() {
            tracing::warn!("received room ready while already in a room");
        }

        let s = e.packet.read_string()?;
        let fields: Vec<&str> = s.split_whitespace().collect();
        if fields.len() != 2 {
            tracing::warn!(value = %s, "malformed room ready payload");
            return Ok(());
        }
        let model = fields[0].to_owned();
        let Ok(room_id) = fields[1].parse::<i32>() else {
            tracing::warn!(value = %fields[1], "room id is not an integer");
            return Ok(());
        };

        self.enter_room(model, room_id);

        let info = self.state.read().info.clone();
        match &info {
            Some(info) => {
                tracing::debug!(id = room_id, name = %info.name, owner = %info.owner, "entered room")
            }
            None => tracing::debug!(id = room_id, "entered room (no cached info)"),
        }
        self.events.entered.dispatch(&RoomArgs { id: room_id, info });
        Ok(())
    }

    fn handle_room_rights(&self, e: &mut Intercept) -> HandlerResult {
        if !self.is_in_room() {
            return Ok(());
        }

        if e.is(&inbound::ROOM_RIGHTS) {
            self.state.write().has_rights = true;
            self.events.rights_updated.dispatch(&());
        } else if e.is(&inbound::ROOM_RIGHTS_2) {
            self.state.write().has_rights = false;
            self.events.rights_updated.dispatch(&());
        } else if e.is(&inbound::ROOM_RIGHTS_3) {
            self.state.write().is_owner = true;
        }
        Ok(())
    }

    fn handle_heightmap(&self, e: &mut Intercept) -> HandlerResult {
        if !self.is_in_room() {
            return Ok(());
        }

        let rows: Vec<String> = e
            .packet
            .read_string()?
            .split('\r')
            .map(str::to_owned)
            .collect();
        tracing::debug!(rows = rows.len(), "received heightmap");
        self.state.write().heightmap = rows;
        Ok(())
    }

    fn handle_active_objects(&self, e: &mut Intercept) -> HandlerResult {
        if !self.is_in_room() {
            return Ok(());
        }

        let objects: Vec<Object> = e.packet.read()?;
        {
            let mut map = self.objects.write();
            for object in &objects {
                map.insert(object.id, object.clone());
            }
        }
        tracing::debug!(count = objects.len(), "loaded objects");
        self.events.objects_loaded.dispatch(&ObjectsArgs { objects });
        Ok(())
    }

    fn handle_active_object_add(&self, e: &mut Intercept) -> HandlerResult {
        if !self.is_in_room() {
            return Ok(());
        }

        let object: Object = e.packet.read()?;
        self.objects.write().insert(object.id, object.clone());
        tracing::debug!(id = object.id, class = %object.class, "added object");
        self.events.object_added.dispatch(&ObjectArgs { object });
        Ok(())
    }

    fn handle_active_object_update(&self, e: &mut Intercept) -> HandlerResult {
        if !self.is_in_room() {
            return Ok(());
        }

        let object: Object = e.packet.read()?;
        let pre = self.objects.write().insert(object.id, object.clone());
        match pre {
            Some(pre) => {
                tracing::debug!(id = object.id, "updated object");
                self.events
                    .object_updated
                    .dispatch(&ObjectUpdateArgs { pre, object });
            }
            None => tracing::warn!(id = object.id, "failed to find object to update"),
        }
        Ok(())
    }

    fn handle_active_object_remove(&self, e: &mut Intercept) -> HandlerResult {
        if !self.is_in_room() {
            return Ok(());
        }

        let object: Object = e.packet.read()?;
        match self.objects.write().remove(&object.id) {
            Some(object) => {
                tracing::debug!(id = object.id, "removed object");
                self.events.object_removed.dispatch(&ObjectArgs { object });
            }
            None => tracing::warn!(id = object.id, "failed to find object to remove"),
        }
        Ok(())
    }

    fn handle_slide_object_bundle(&self, e: &mut Intercept) -> HandlerResult {
        if !self.is_in_room() {
            return Ok(());
        }

        let bundle: SlideObjectBundle = e.packet.read()?;
        let args = self.process_slide(bundle);
        self.events.slide.dispatch(&args);
        Ok(())
    }

    fn process_slide(&self, bundle: SlideObjectBundle) -> SlideArgs {
        let mut objects = self.objects.write();
        let mut entities = self.entities.write();

        let source = if bundle.roller_id != 0 {
            let source = objects.get(&bundle.roller_id).cloned();
            if source.is_none() {
                tracing::warn!(id = bundle.roller_id, "failed to find slide source");
            }
            source
        } else {
            None
        };

        let mut args = SlideArgs {
            from: bundle.from,
            to: bundle.to,
            source,
            slide_move_type: bundle.slide_move_type,
            object_slides: Vec::new(),
            entity_slide: None,
        };

        for slide in &bundle.objects {
            match objects.get_mut(&slide.id) {
                Some(object) => {
                    object.x = bundle.to.x;
                    object.y = bundle.to.y;
                    object.z = slide.to_z;
                    args.object_slides.push(SlideObjectArgs {
                        object: object.clone(),
                        from: Tile {
                            x: bundle.from.x,
                            y: bundle.from.y,
                            z: slide.from_z,
                        },
                        to: Tile {
                            x: bundle.to.x,
                            y: bundle.to.y,
                            z: slide.to_z,
                        },
                    });
                }
                None => tracing::warn!(id = slide.id, "failed to find sliding object"),
            }
        }

        if bundle.slide_move_type != SlideMoveType::None {
            if let Some(slide) = &bundle.entity {
                match entities.get_mut(&slide.id) {
                    Some(entity) => {
                        entity.tile.x = bundle.to.x;
                        entity.tile.y = bundle.to.y;
                        entity.tile.z = slide.to_z;
                        args.entity_slide = Some(SlideEntityArgs {
                            entity: entity.clone(),
                            from: Tile {
                                x: bundle.from.x,
                                y: bundle.from.y,
                                z: slide.from_z,
                            },
                            to: Tile {
                                x: bundle.to.x,
                                y: bundle.to.y,
                                z: slide.to_z,
                            },
                        });
                    }
                    None => tracing::warn!(id = slide.id, "failed to find sliding entity"),
                }
            }
        }

        tracing::debug!(
            objects = args.object_slides.len(),
            with_entity = args.entity_slide.is_some(),
            "processed slide bundle"
        );
        args
    }

    fn handle_items(&self, e: &mut Intercept) -> HandlerResult {
        if !self.is_in_room() {
            return Ok(());
        }

        let Items(items) = e.packet.read()?;
        {
            let mut map = self.items.write();
            for item in &items {
                if map.insert(item.id, item.clone()).is_some() {
                    tracing::warn!(id = item.id, "duplicate wall item");
                }
            }
        }
        tracing::debug!(count = items.len(), "loaded items");
        self.events.items_loaded.dispatch(&ItemsArgs { items });
        Ok(())
    }

    fn handle_add_or_update_item(&self, e: &mut Intercept) -> HandlerResult {
        if !self.is_in_room() {
            return Ok(());
        }

        let item: Item = e.packet.read()?;
        if e.is(&inbound::ITEMS_2) {
            self.items.write().insert(item.id, item.clone());
            tracing::debug!(id = item.id, class = %item.class, "added item");
            self.events.item_added.dispatch(&ItemArgs { item });
        } else {
            let pre = self.items.write().insert(item.id, item.clone());
            match pre {
                Some(pre) => {
                    tracing::debug!(id = item.id, "updated item");
                    self.events.item_updated.dispatch(&ItemUpdateArgs { pre, item });
                }
                None => tracing::warn!(id = item.id, "failed to find item to update"),
            }
        }
        Ok(())
    }

    fn handle_remove_item(&self, e: &mut Intercept) -> HandlerResult {
        if !self.is_in_room() {
            return Ok(());
        }

        let raw_id = e.packet.read_string()?;
        let Ok(id) = raw_id.parse::<i32>() else {
            tracing::warn!(value = %raw_id, "invalid wall item id");
            return Ok(());
        };

        match self.items.write().remove(&id) {
            Some(item) => {
                tracing::debug!(id, "removed item");
                self.events.item_removed.dispatch(&ItemArgs { item });
            }
            None => tracing::warn!(id, "failed to find item to remove"),
        }
        Ok(())
    }

    fn handle_users(&self, e: &mut Intercept) -> HandlerResult {
        if !self.is_in_room() {
            return Ok(());
        }

        let entities: Vec<Entity> = e.packet.read()?;
        {
            let mut map = self.entities.write();
            for entity in &entities {
                if map.insert(entity.index, entity.clone()).is_some() {
                    tracing::warn!(index = entity.index, "duplicate entity index");
                }
            }
        }

        // The entity list is replayed twice when entering a room; only
        // packets after that announce actual arrivals.
        let entered = {
            let mut state = self.state.write();
            if state.users_packet_count < 3 {
                state.users_packet_count += 1;
            }
            state.users_packet_count >= 3
        };

        tracing::debug!(count = entities.len(), entered, "added entities");
        self.events
            .entities_added
            .dispatch(&EntitiesArgs { entered, entities });
        Ok(())
    }

    fn handle_status(&self, e: &mut Intercept) -> HandlerResult {
        if !self.is_in_room() {
            return Ok(());
        }

        let statuses: Vec<EntityStatus> = e.packet.read()?;
        let mut updates = Vec::with_capacity(statuses.len());
        {
            let mut map = self.entities.write();
            for status in statuses {
                match map.get_mut(&status.index) {
                    Some(entity) => {
                        let pre = entity.clone();
                        entity.tile = status.tile;
                        entity.head_dir = status.head_dir;
                        entity.dir = status.body_dir;
                        entity.action = status.action;
                        updates.push(EntityUpdateArgs {
                            pre,
                            entity: entity.clone(),
                        });
                    }
                    None => {
                        tracing::warn!(index = status.index, "failed to find entity to update")
                    }
                }
            }
        }

        for update in &updates {
            self.events.entity_updated.dispatch(update);
        }
        Ok(())
    }

    fn handle_chat(&self, e: &mut Intercept) -> HandlerResult {
        if !self.is_in_room() {
            return Ok(());
        }

        let index = e.packet.read_int()?;
        let message = e.packet.read_string()?;
        let chat_type = if e.is(&inbound::CHAT) {
            ChatType::Talk
        } else if e.is(&inbound::CHAT_2) {
            ChatType::Whisper
        } else {
            ChatType::Shout
        };

        match self.entities.read().get(&index).cloned() {
            Some(entity) => {
                tracing::debug!(name = %entity.name, ?chat_type, %message, "entity chat");
                self.events.entity_chat.dispatch(&EntityChatArgs {
                    entity,
                    chat_type,
                    message,
                });
            }
            None => tracing::warn!(index, "failed to find chatting entity"),
        }
        Ok(())
    }

    fn handle_logout(&self, e: &mut Intercept) -> HandlerResult {
        if !self.is_in_room() {
            return Ok(());
        }

        let raw_index = e.packet.read_string()?;
        let Ok(index) = raw_index.parse::<i32>() else {
            tracing::warn!(value = %raw_index, "invalid entity index");
            return Ok(());
        };

        match self.entities.write().remove(&index) {
            Some(entity) => {
                tracing::debug!(index, name = %entity.name, "entity left");
                self.events.entity_left.dispatch(&EntityArgs { entity });
            }
            None => tracing::warn!(index, "failed to find entity to remove"),
        }
        Ok(())
    }
}
