//! Room entities and their wire parsers.

use std::fmt;

use tether_protocol::{Packet, Parse, ProtocolError, Result};

/// Information about a room, cached from `FLATINFO` and promoted to the
/// current room on entry.
#[derive(Debug, Clone, Default)]
pub struct RoomInfo {
    pub can_others_move_furni: bool,
    pub door: i32,
    pub id: i32,
    pub owner: String,
    pub marker: String,
    pub name: String,
    pub description: String,
    pub show_owner_name: bool,
    pub trading: i32,
    pub alert: i32,
    pub max_visitors: i32,
    pub absolute_max_visitors: i32,
}

impl Parse for RoomInfo {
    fn parse(p: &mut Packet) -> Result<Self> {
        Ok(Self {
            can_others_move_furni: p.read()?,
            door: p.read()?,
            id: p.read()?,
            owner: p.read()?,
            marker: p.read()?,
            name: p.read()?,
            description: p.read()?,
            show_owner_name: p.read()?,
            trading: p.read()?,
            alert: p.read()?,
            max_visitors: p.read()?,
            absolute_max_visitors: p.read()?,
        })
    }
}

/// 2-dimensional room coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Parse for Point {
    fn parse(p: &mut Packet) -> Result<Self> {
        Ok(Self {
            x: p.read()?,
            y: p.read()?,
        })
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.x, self.y)
    }
}

/// 3-dimensional room coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Tile {
    pub x: i32,
    pub y: i32,
    pub z: f64,
}

impl Tile {
    pub fn to_point(self) -> Point {
        Point { x: self.x, y: self.y }
    }
}

impl Parse for Tile {
    fn parse(p: &mut Packet) -> Result<Self> {
        Ok(Self {
            x: p.read()?,
            y: p.read()?,
            z: p.read()?,
        })
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}, {:.2}", self.x, self.y, self.z)
    }
}

/// A floor item in a room.
#[derive(Debug, Clone, Default)]
pub struct Object {
    pub id: i32,
    pub class: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub direction: i32,
    pub z: f64,
    pub colors: String,
    pub runtime_data: String,
    pub extra: i32,
    pub stuff_data: String,
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.class, self.id)
    }
}

impl Parse for Object {
    fn parse(p: &mut Packet) -> Result<Self> {
        // The ID travels as a decimal string.
        let raw_id = p.read_string()?;
        let id = raw_id.parse().map_err(|_| ProtocolError::InvalidField {
            what: "object id",
            value: raw_id,
        })?;
        Ok(Self {
            id,
            class: p.read()?,
            x: p.read()?,
            y: p.read()?,
            width: p.read()?,
            height: p.read()?,
            direction: p.read()?,
            z: p.read()?,
            colors: p.read()?,
            runtime_data: p.read()?,
            extra: p.read()?,
            stuff_data: p.read()?,
        })
    }
}

/// A wall item in a room.
#[derive(Debug, Clone, Default)]
pub struct Item {
    pub id: i32,
    pub class: String,
    pub owner: String,
    pub location: String,
    pub item_type: String,
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.class, self.id)
    }
}

impl Item {
    /// Parses an item from its 5-field tab-separated line form.
    pub fn from_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 5 {
            return Err(ProtocolError::InvalidField {
                what: "item line",
                value: line.to_owned(),
            });
        }
        let id = fields[0].parse().map_err(|_| ProtocolError::InvalidField {
            what: "item id",
            value: fields[0].to_owned(),
        })?;
        Ok(Self {
            id,
            class: fields[1].to_owned(),
            owner: fields[2].to_owned(),
            location: fields[3].to_owned(),
            item_type: fields[4].to_owned(),
        })
    }
}

impl Parse for Item {
    fn parse(p: &mut Packet) -> Result<Self> {
        Self::from_line(&p.read_string()?)
    }
}

/// The wall item list, one line-formatted item per string until the end
/// of the packet.
#[derive(Debug, Clone, Default)]
pub struct Items(pub Vec<Item>);

impl Parse for Items {
    fn parse(p: &mut Packet) -> Result<Self> {
        let mut items = Vec::new();
        while p.pos < p.len() {
            let line = p.read_string()?;
            items.push(Item::from_line(line.trim_end_matches('\r'))?);
        }
        Ok(Self(items))
    }
}

/// How an entity moves with a slide bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlideMoveType {
    #[default]
    None,
    Move,
    Slide,
}

impl Parse for SlideMoveType {
    fn parse(p: &mut Packet) -> Result<Self> {
        Ok(match p.read_int()? {
            1 => Self::Move,
            2 => Self::Slide,
            _ => Self::None,
        })
    }
}

/// One object carried by a roller.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlideObject {
    pub id: i32,
    pub from_z: f64,
    pub to_z: f64,
}

impl Parse for SlideObject {
    fn parse(p: &mut Packet) -> Result<Self> {
        Ok(Self {
            id: p.read()?,
            from_z: p.read()?,
            to_z: p.read()?,
        })
    }
}

/// A roller movement bundle: objects, and optionally an entity, sliding
/// from one tile to an adjacent one.
#[derive(Debug, Clone, Default)]
pub struct SlideObjectBundle {
    pub from: Point,
    pub to: Point,
    pub objects: Vec<SlideObject>,
    pub roller_id: i32,
    pub slide_move_type: SlideMoveType,
    pub entity: Option<SlideObject>,
}

impl Parse for SlideObjectBundle {
    fn parse(p: &mut Packet) -> Result<Self> {
        let mut bundle = Self {
            from: p.read()?,
            to: p.read()?,
            objects: p.read()?,
            roller_id: p.read()?,
            ..Default::default()
        };
        if p.pos < p.len() {
            bundle.slide_move_type = p.read()?;
            if bundle.slide_move_type != SlideMoveType::None {
                bundle.entity = Some(p.read()?);
            }
        }
        Ok(bundle)
    }
}

/// What kind of entity occupies a room slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Pet,
    PublicBot,
    PrivateBot,
    Other(i32),
}

impl Default for EntityKind {
    fn default() -> Self {
        Self::Other(0)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Pet => f.write_str("pet"),
            Self::PublicBot => f.write_str("public bot"),
            Self::PrivateBot => f.write_str("private bot"),
            Self::Other(value) => write!(f, "{value}"),
        }
    }
}

impl Parse for EntityKind {
    fn parse(p: &mut Packet) -> Result<Self> {
        Ok(match p.read_int()? {
            1 => Self::User,
            2 => Self::Pet,
            3 => Self::PublicBot,
            4 => Self::PrivateBot,
            other => Self::Other(other),
        })
    }
}

/// A user, pet or bot in a room.
#[derive(Debug, Clone, Default)]
pub struct Entity {
    pub index: i32,
    pub name: String,
    pub figure: String,
    pub gender: String,
    pub custom: String,
    pub tile: Tile,
    pub pool_figure: String,
    pub badge_code: String,
    pub kind: EntityKind,
    /// Not carried by the entity list; updated from status packets.
    pub dir: i32,
    pub head_dir: i32,
    pub action: String,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Parse for Entity {
    fn parse(p: &mut Packet) -> Result<Self> {
        Ok(Self {
            index: p.read()?,
            name: p.read()?,
            figure: p.read()?,
            gender: p.read()?,
            custom: p.read()?,
            tile: p.read()?,
            pool_figure: p.read()?,
            badge_code: p.read()?,
            kind: p.read()?,
            ..Default::default()
        })
    }
}

/// A position/action update for one entity.
#[derive(Debug, Clone, Default)]
pub struct EntityStatus {
    pub index: i32,
    pub tile: Tile,
    pub head_dir: i32,
    pub body_dir: i32,
    pub action: String,
}

impl Parse for EntityStatus {
    fn parse(p: &mut Packet) -> Result<Self> {
        Ok(Self {
            index: p.read()?,
            tile: p.read()?,
            head_dir: p.read()?,
            body_dir: p.read()?,
            action: p.read()?,
        })
    }
}

/// How a chat message was spoken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatType {
    Talk,
    Whisper,
    Shout,
}
