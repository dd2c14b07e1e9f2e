//! Room event argument types and registration methods.

use tether_extension::events::Event;

use super::types::{ChatType, Entity, Item, Object, Point, RoomInfo, SlideMoveType, Tile};
use super::RoomManager;

/// Arguments for room entry and exit events.
#[derive(Debug, Clone)]
pub struct RoomArgs {
    pub id: i32,
    pub info: Option<RoomInfo>,
}

/// Arguments for floor item events involving a single item.
#[derive(Debug, Clone)]
pub struct ObjectArgs {
    pub object: Object,
}

/// Arguments for floor item events involving a list of items.
#[derive(Debug, Clone)]
pub struct ObjectsArgs {
    pub objects: Vec<Object>,
}

/// Arguments for floor item updates, carrying the previous state.
#[derive(Debug, Clone)]
pub struct ObjectUpdateArgs {
    pub pre: Object,
    pub object: Object,
}

/// Arguments for wall item events involving a single item.
#[derive(Debug, Clone)]
pub struct ItemArgs {
    pub item: Item,
}

/// Arguments for wall item events involving a list of items.
#[derive(Debug, Clone)]
pub struct ItemsArgs {
    pub items: Vec<Item>,
}

/// Arguments for wall item updates, carrying the previous state.
#[derive(Debug, Clone)]
pub struct ItemUpdateArgs {
    pub pre: Item,
    pub item: Item,
}

/// Arguments for events involving a single entity.
#[derive(Debug, Clone)]
pub struct EntityArgs {
    pub entity: Entity,
}

/// Arguments for events involving a list of entities.
#[derive(Debug, Clone)]
pub struct EntitiesArgs {
    /// Whether the entities entered the room. When false, the entities
    /// were already present and are being loaded.
    pub entered: bool,
    pub entities: Vec<Entity>,
}

/// Arguments for entity position/action updates.
#[derive(Debug, Clone)]
pub struct EntityUpdateArgs {
    pub pre: Entity,
    pub entity: Entity,
}

/// Arguments for entity chat events.
#[derive(Debug, Clone)]
pub struct EntityChatArgs {
    pub entity: Entity,
    pub chat_type: ChatType,
    pub message: String,
}

/// Arguments for one object carried by a slide.
#[derive(Debug, Clone)]
pub struct SlideObjectArgs {
    pub object: Object,
    pub from: Tile,
    pub to: Tile,
}

/// Arguments for an entity carried by a slide.
#[derive(Debug, Clone)]
pub struct SlideEntityArgs {
    pub entity: Entity,
    pub from: Tile,
    pub to: Tile,
}

/// Arguments for roller slide events.
#[derive(Debug, Clone)]
pub struct SlideArgs {
    pub from: Point,
    pub to: Point,
    pub source: Option<Object>,
    pub slide_move_type: SlideMoveType,
    pub object_slides: Vec<SlideObjectArgs>,
    pub entity_slide: Option<SlideEntityArgs>,
}

#[derive(Default)]
pub(super) struct RoomEvents {
    pub entered: Event<RoomArgs>,
    pub rights_updated: Event<()>,
    pub objects_loaded: Event<ObjectsArgs>,
    pub object_added: Event<ObjectArgs>,
    pub object_updated: Event<ObjectUpdateArgs>,
    pub object_removed: Event<ObjectArgs>,
    pub slide: Event<SlideArgs>,
    pub items_loaded: Event<ItemsArgs>,
    pub item_added: Event<ItemArgs>,
    pub item_updated: Event<ItemUpdateArgs>,
    pub item_removed: Event<ItemArgs>,
    pub entities_added: Event<EntitiesArgs>,
    pub entity_updated: Event<EntityUpdateArgs>,
    pub entity_chat: Event<EntityChatArgs>,
    pub entity_left: Event<EntityArgs>,
    pub left: Event<RoomArgs>,
}

impl RoomManager {
    /// Registers a handler invoked when the user enters a room.
    pub fn entered(&self, handler: impl Fn(&RoomArgs) + Send + Sync + 'static) {
        self.inner.events.entered.register(handler);
    }

    /// Registers a handler invoked when the user's rights change.
    pub fn rights_updated(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.inner.events.rights_updated.register(move |_: &()| handler());
    }

    /// Registers a handler invoked when floor items are loaded.
    pub fn objects_loaded(&self, handler: impl Fn(&ObjectsArgs) + Send + Sync + 'static) {
        self.inner.events.objects_loaded.register(handler);
    }

    /// Registers a handler invoked when a floor item is placed.
    pub fn object_added(&self, handler: impl Fn(&ObjectArgs) + Send + Sync + 'static) {
        self.inner.events.object_added.register(handler);
    }

    /// Registers a handler invoked when a floor item changes.
    pub fn object_updated(&self, handler: impl Fn(&ObjectUpdateArgs) + Send + Sync + 'static) {
        self.inner.events.object_updated.register(handler);
    }

    /// Registers a handler invoked when a floor item is removed.
    pub fn object_removed(&self, handler: impl Fn(&ObjectArgs) + Send + Sync + 'static) {
        self.inner.events.object_removed.register(handler);
    }

    /// Registers a handler invoked when objects slide on rollers.
    pub fn slide(&self, handler: impl Fn(&SlideArgs) + Send + Sync + 'static) {
        self.inner.events.slide.register(handler);
    }

    /// Registers a handler invoked when wall items are loaded.
    pub fn items_loaded(&self, handler: impl Fn(&ItemsArgs) + Send + Sync + 'static) {
        self.inner.events.items_loaded.register(handler);
    }

    /// Registers a handler invoked when a wall item is placed.
    pub fn item_added(&self, handler: impl Fn(&ItemArgs) + Send + Sync + 'static) {
        self.inner.events.item_added.register(handler);
    }

    /// Registers a handler invoked when a wall item changes.
    pub fn item_updated(&self, handler: impl Fn(&ItemUpdateArgs) + Send + Sync + 'static) {
        self.inner.events.item_updated.register(handler);
    }

    /// Registers a handler invoked when a wall item is removed.
    pub fn item_removed(&self, handler: impl Fn(&ItemArgs) + Send + Sync + 'static) {
        self.inner.events.item_removed.register(handler);
    }

    /// Registers a handler invoked when entities are loaded or enter the
    /// room. The `entered` flag distinguishes the two.
    pub fn entities_added(&self, handler: impl Fn(&EntitiesArgs) + Send + Sync + 'static) {
        self.inner.events.entities_added.register(handler);
    }

    /// Registers a handler invoked when an entity moves or changes its
    /// action.
    pub fn entity_updated(&self, handler: impl Fn(&EntityUpdateArgs) + Send + Sync + 'static) {
        self.inner.events.entity_updated.register(handler);
    }

    /// Registers a handler invoked when an entity sends a chat message.
    pub fn entity_chat(&self, handler: impl Fn(&EntityChatArgs) + Send + Sync + 'static) {
        self.inner.events.entity_chat.register(handler);
    }

    /// Registers a handler invoked when an entity leaves the room.
    pub fn entity_left(&self, handler: impl Fn(&EntityArgs) + Send + Sync + 'static) {
        self.inner.events.entity_left.register(handler);
    }

    /// Registers a handler invoked when the user leaves the room.
    pub fn left(&self, handler: impl Fn(&RoomArgs) + Send + Sync + 'static) {
        self.inner.events.left.register(handler);
    }
}
