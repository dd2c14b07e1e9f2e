//! Navigator queries.
//!
//! The navigator protocol is request/reply: each operation sends a query
//! and waits for the matching result packet with a blocking inline
//! receiver, so the reply never reaches the client UI.
//!
//! Node listings arrive as a flat stream of records referencing their
//! parents by id. The tree is rebuilt into an arena of nodes indexed by
//! position; parents and children are arena indices, so no reference
//! cycles exist. Records whose parent has not been seen are logged and
//! dropped.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tether_extension::{Extension, Result};
use tether_protocol::{Packet, ProtocolError};

use crate::{inbound, outbound};

const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// A room category in the navigator.
#[derive(Debug, Clone, Default)]
pub struct Category {
    pub name: String,
    pub max_users: i32,
    pub user_count: i32,
}

/// A room in the navigator.
#[derive(Debug, Clone, Default)]
pub struct Room {
    pub id: i32,
    pub name: String,
    pub max_users: i32,
    pub user_count: i32,
    pub port: String,
    pub door: String,
    pub unit_id: String,
    pub casts: String,
    pub visible: bool,
    pub users_in_queue: i32,
    pub owner: String,
    pub description: String,
    pub filter: String,
}

/// The payload of a navigator node.
#[derive(Debug, Clone)]
pub enum NodeData {
    Category(Category),
    Room(Room),
}

/// The kind of a navigator node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Category,
    PublicRoom,
    UserRoom,
}

/// One node in a reconstructed navigator tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: i32,
    pub kind: NodeKind,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub data: NodeData,
}

impl Node {
    pub fn name(&self) -> &str {
        match &self.data {
            NodeData::Category(category) => &category.name,
            NodeData::Room(room) => &room.name,
        }
    }

    pub fn room(&self) -> Option<&Room> {
        match &self.data {
            NodeData::Room(room) => Some(room),
            NodeData::Category(_) => None,
        }
    }
}

/// A navigator node hierarchy stored as an arena.
#[derive(Debug, Clone)]
pub struct NodeTree {
    pub node_mask: i32,
    nodes: Vec<Node>,
}

impl NodeTree {
    /// The root node.
    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    /// Looks a node up by arena index.
    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Visits nodes breadth-first, root included. Returning false from
    /// `visit` stops the traversal.
    pub fn visit(&self, mut visit: impl FnMut(&Node) -> bool) {
        let mut queue = VecDeque::from([0usize]);
        while let Some(index) = queue.pop_front() {
            let node = &self.nodes[index];
            if !visit(node) {
                return;
            }
            queue.extend(node.children.iter().copied());
        }
    }

    /// Returns the first node matching `cond`, breadth-first.
    pub fn find(&self, cond: impl Fn(&Node) -> bool) -> Option<&Node> {
        let mut queue = VecDeque::from([0usize]);
        while let Some(index) = queue.pop_front() {
            let node = &self.nodes[index];
            if cond(node) {
                return Some(node);
            }
            queue.extend(node.children.iter().copied());
        }
        None
    }

    /// All rooms in the hierarchy.
    pub fn rooms(&self) -> Vec<Room> {
        let mut rooms = Vec::new();
        self.visit(|node| {
            if let Some(room) = node.room() {
                rooms.push(room.clone());
            }
            true
        });
        rooms
    }

    /// Parses a node hierarchy from a flat record stream.
    pub fn parse(p: &mut Packet) -> std::result::Result<Self, ProtocolError> {
        let node_mask = p.read_int()?;
        let mut tree = Self {
            node_mask,
            nodes: Vec::new(),
        };
        let mut by_id: HashMap<i32, usize> = HashMap::new();

        let root = RawNode::parse(p)?;
        tree.insert(root, None, &mut by_id);

        while p.pos < p.len() {
            let raw = RawNode::parse(p)?;
            if by_id.contains_key(&raw.id) {
                tracing::debug!(id = raw.id, "skipping duplicate nav node");
                continue;
            }
            match by_id.get(&raw.parent_id).copied() {
                Some(parent) => tree.insert(raw, Some(parent), &mut by_id),
                None => {
                    tracing::warn!(id = raw.id, parent = raw.parent_id, "orphaned nav node")
                }
            }
        }
        Ok(tree)
    }

    fn insert(&mut self, raw: RawNode, parent: Option<usize>, by_id: &mut HashMap<i32, usize>) {
        let index = self.nodes.len();
        self.nodes.push(Node {
            id: raw.id,
            kind: raw.kind,
            parent,
            children: Vec::new(),
            data: raw.data,
        });
        by_id.insert(raw.id, index);
        if let Some(parent) = parent {
            self.nodes[parent].children.push(index);
        }
        for (id, room) in raw.inline_rooms {
            let child = self.nodes.len();
            self.nodes.push(Node {
                id,
                kind: NodeKind::UserRoom,
                parent: Some(index),
                children: Vec::new(),
                data: NodeData::Room(room),
            });
            self.nodes[index].children.push(child);
        }
    }
}

struct RawNode {
    id: i32,
    kind: NodeKind,
    parent_id: i32,
    data: NodeData,
    /// Rooms carried inline by a user-room category record.
    inline_rooms: Vec<(i32, Room)>,
}

impl RawNode {
    fn parse(p: &mut Packet) -> std::result::Result<Self, ProtocolError> {
        let id = p.read_int()?;
        let kind_raw = p.read_int()?;
        let name = p.read_string()?;
        let user_count = p.read_int()?;
        let max_users = p.read_int()?;
        let parent_id = p.read_int()?;

        match kind_raw {
            0 => Ok(Self {
                id,
                kind: NodeKind::Category,
                parent_id,
                data: NodeData::Category(Category {
                    name,
                    max_users,
                    user_count,
                }),
                inline_rooms: Vec::new(),
            }),
            1 => {
                let room = Room {
                    // Public room ids share a space with node ids; offset
                    // them out of the way.
                    id: 1000 + id,
                    name,
                    user_count,
                    max_users,
                    unit_id: p.read_string()?,
                    port: p.read_int()?.to_string(),
                    door: p.read_int()?.to_string(),
                    casts: p.read_string()?,
                    users_in_queue: p.read_int()?,
                    visible: p.read_bool()?,
                    ..Default::default()
                };
                Ok(Self {
                    id,
                    kind: NodeKind::PublicRoom,
                    parent_id,
                    data: NodeData::Room(room),
                    inline_rooms: Vec::new(),
                })
            }
            2 => {
                // A user-room category carries its rooms inline,
                // count-prefixed.
                let count = p.read_int()?;
                let mut inline_rooms = Vec::with_capacity(count.max(0) as usize);
                for _ in 0..count {
                    let room_id = p.read_int()?;
                    let room = Room {
                        id: room_id,
                        name: p.read_string()?,
                        owner: p.read_string()?,
                        door: p.read_string()?,
                        user_count: p.read_int()?,
                        max_users: p.read_int()?,
                        description: p.read_string()?,
                        visible: true,
                        ..Default::default()
                    };
                    inline_rooms.push((room_id, room));
                }
                Ok(Self {
                    id,
                    kind: NodeKind::Category,
                    parent_id,
                    data: NodeData::Category(Category {
                        name,
                        max_users,
                        user_count,
                    }),
                    inline_rooms,
                })
            }
            other => Err(ProtocolError::InvalidField {
                what: "nav node type",
                value: other.to_string(),
            }),
        }
    }
}

/// Parses the flat 9-field tab/CR room list format.
pub fn parse_room_lines(p: &mut Packet) -> std::result::Result<Vec<Room>, ProtocolError> {
    let s = p.read_string()?;
    let mut rooms = Vec::new();
    for line in s.split('\r') {
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 9 {
            return Err(ProtocolError::InvalidField {
                what: "room result line",
                value: line.to_owned(),
            });
        }
        let parse_int = |what, value: &str| {
            value
                .parse::<i32>()
                .map_err(|_| ProtocolError::InvalidField {
                    what,
                    value: value.to_owned(),
                })
        };
        rooms.push(Room {
            id: parse_int("room id", fields[0])?,
            name: fields[1].to_owned(),
            owner: fields[2].to_owned(),
            door: fields[3].to_owned(),
            port: fields[4].to_owned(),
            user_count: parse_int("room user count", fields[5])?,
            max_users: parse_int("room max users", fields[6])?,
            filter: fields[7].to_owned(),
            description: fields[8].to_owned(),
            visible: true,
            ..Default::default()
        });
    }
    Ok(rooms)
}

/// Synchronous navigator queries over inline receivers.
pub struct NavManager {
    ext: Extension,
}

impl NavManager {
    pub fn new(ext: &Extension) -> Self {
        Self { ext: ext.clone() }
    }

    /// Requests the node listing under `node_id`.
    ///
    /// Returns `None` when the server does not answer within the query
    /// timeout.
    pub async fn navigate(&self, node_id: i32) -> Result<Option<NodeTree>> {
        self.ext
            .send(outbound::NAVIGATE, &(false, node_id, 1i32))?;
        let received = self
            .ext
            .recv([inbound::NAVNODEINFO])
            .if_cond(move |p| {
                // The second int of the reply is the queried node id.
                let _ = p.read_int();
                matches!(p.read_int(), Ok(id) if id == node_id)
            })
            .timeout(QUERY_TIMEOUT)
            .block()
            .wait()
            .await?;
        match received {
            Some(mut packet) => Ok(Some(NodeTree::parse(&mut packet)?)),
            None => Ok(None),
        }
    }

    /// Searches rooms by name.
    pub async fn search(&self, query: &str) -> Result<Option<Vec<Room>>> {
        self.ext.send(outbound::SRCHF, query)?;
        self.flat_results(inbound::FLAT_RESULTS_2).await
    }

    /// Requests the user's own rooms.
    pub async fn own_rooms(&self) -> Result<Option<Vec<Room>>> {
        self.ext.send(outbound::SUSERF, &())?;
        self.flat_results(inbound::FLAT_RESULTS).await
    }

    /// Requests the user's favourite rooms.
    pub async fn favourite_rooms(&self) -> Result<Option<Vec<Room>>> {
        self.ext.send(outbound::GETFVRF, &false)?;
        let received = self
            .ext
            .recv([inbound::FAVOURITEROOMRESULTS])
            .timeout(QUERY_TIMEOUT)
            .block()
            .wait()
            .await?;
        match received {
            Some(mut packet) => Ok(Some(NodeTree::parse(&mut packet)?.rooms())),
            None => Ok(None),
        }
    }

    async fn flat_results(
        &self,
        reply: tether_protocol::Identifier,
    ) -> Result<Option<Vec<Room>>> {
        let received = self
            .ext
            .recv([reply])
            .timeout(QUERY_TIMEOUT)
            .block()
            .wait()
            .await?;
        match received {
            Some(mut packet) => Ok(Some(parse_room_lines(&mut packet)?)),
            None => Ok(None),
        }
    }
}
