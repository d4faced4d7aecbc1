//! Handle identifiers and kinds
//!
//! A handle is the stable, connection-scoped reference the outer object
//! model uses for a contact, room, list or group. The registry that hands
//! them out lives in the runtime crate; this module only names things.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric handle identifier, unique per connection.
///
/// `0` is reserved for the none handle.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct HandleId(pub u32);

impl HandleId {
    pub const NONE: HandleId = HandleId(0);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a handle stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleKind {
    None,
    #[serde(rename = "self")]
    SelfHandle,
    Contact,
    Room,
    List,
    Group,
}

impl HandleKind {
    /// Kinds whose natural key must be non-empty.
    pub fn requires_key(self) -> bool {
        matches!(
            self,
            HandleKind::Contact | HandleKind::Room | HandleKind::List | HandleKind::Group
        )
    }

    /// External handle type. The self handle is a contact to outsiders.
    pub fn handle_type(self) -> HandleType {
        match self {
            HandleKind::None => HandleType::None,
            HandleKind::SelfHandle | HandleKind::Contact => HandleType::Contact,
            HandleKind::Room => HandleType::Room,
            HandleKind::List => HandleType::List,
            HandleKind::Group => HandleType::Group,
        }
    }

    /// Kind used when an external caller names a handle type.
    pub fn for_type(handle_type: HandleType) -> Self {
        match handle_type {
            HandleType::None => HandleKind::None,
            HandleType::Contact => HandleKind::Contact,
            HandleType::Room => HandleKind::Room,
            HandleType::List => HandleKind::List,
            HandleType::Group => HandleKind::Group,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HandleKind::None => "none",
            HandleKind::SelfHandle => "self",
            HandleKind::Contact => "contact",
            HandleKind::Room => "room",
            HandleKind::List => "list",
            HandleKind::Group => "group",
        }
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle type codes as seen on the wire by the outer framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleType {
    None,
    Contact,
    Room,
    List,
    Group,
}

impl HandleType {
    pub fn code(self) -> u32 {
        match self {
            HandleType::None => 0,
            HandleType::Contact => 1,
            HandleType::Room => 2,
            HandleType::List => 3,
            HandleType::Group => 4,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(HandleType::None),
            1 => Some(HandleType::Contact),
            2 => Some(HandleType::Room),
            3 => Some(HandleType::List),
            4 => Some(HandleType::Group),
            _ => None,
        }
    }
}

/// A handle named either by id or by natural key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleRef {
    Id(HandleId),
    Name(String),
}

impl From<HandleId> for HandleRef {
    fn from(id: HandleId) -> Self {
        HandleRef::Id(id)
    }
}

impl From<&str> for HandleRef {
    fn from(name: &str) -> Self {
        HandleRef::Name(name.to_string())
    }
}

/// An external caller holding handles (a bus unique name, typically).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(String);

impl ClientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client:{}", self.0)
    }
}
