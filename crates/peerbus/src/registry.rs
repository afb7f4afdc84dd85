// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Name to integer id registries.
//!
//! Components agree on message kinds and origins by *name*; the integer ids
//! are local to one registry and get re-resolved on every connection. Each
//! endpoint owns a [`TypeRegistry`], a [`SenderRegistry`] and a pair of
//! [`TranslationTable`]s mapping the peer's ids onto local ones.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Identifier of a message kind within one type registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(pub i32);

/// Identifier of a message origin within one sender registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SenderId(pub i32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sender#{}", self.0)
    }
}

/// Integer id newtype usable as a registry key.
pub trait RegistryId: Copy + Eq + fmt::Debug {
    fn from_raw(raw: i32) -> Self;
    fn raw(self) -> i32;
}

impl RegistryId for TypeId {
    fn from_raw(raw: i32) -> Self {
        TypeId(raw)
    }
    fn raw(self) -> i32 {
        self.0
    }
}

impl RegistryId for SenderId {
    fn from_raw(raw: i32) -> Self {
        SenderId(raw)
    }
    fn raw(self) -> i32 {
        self.0
    }
}

// =======================================================================
// System messages
// =======================================================================

/// First connection established on an endpoint.
pub const GOT_CONNECTION: TypeId = TypeId(0);
/// The peer of an endpoint went away.
pub const DROPPED_CONNECTION: TypeId = TypeId(1);
/// The last live endpoint of a connection went away.
pub const DROPPED_LAST_CONNECTION: TypeId = TypeId(2);
/// Round-trip request; answered with [`PONG`].
pub const PING: TypeId = TypeId(3);
pub const PONG: TypeId = TypeId(4);

/// Sender of the connection lifecycle messages an endpoint raises locally.
pub const SYSTEM_SENDER: SenderId = SenderId(-1);

/// Names of the system messages, indexed by their id.
pub const SYSTEM_TYPE_NAMES: [&str; 5] = [
    "peerbus got connection",
    "peerbus dropped connection",
    "peerbus dropped last connection",
    "peerbus ping",
    "peerbus pong",
];

/// First id handed out for user-registered types.
pub const FIRST_USER_TYPE_ID: i32 = SYSTEM_TYPE_NAMES.len() as i32;

/// True for the reserved system type ids, which are the same on every peer.
pub fn is_system_type(id: TypeId) -> bool {
    (0..FIRST_USER_TYPE_ID).contains(&id.0)
}

// =======================================================================
// Registry
// =======================================================================

/// A registry refused a new name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry already holds `limit` names.
    Full { name: String, limit: usize },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Full { name, limit } => {
                write!(f, "cannot register {:?}: registry holds {} names", name, limit)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Insertion-ordered, idempotent name registry holding at most `limit`
/// names (ids stay within `i32`).
///
/// Not thread-safe; lives on the mainloop thread.
#[derive(Debug, Clone)]
pub struct NameRegistry<Id> {
    names: Vec<Arc<str>>,
    ids: HashMap<Arc<str>, i32>,
    base: i32,
    limit: usize,
    _id: PhantomData<Id>,
}

pub type TypeRegistry = NameRegistry<TypeId>;
pub type SenderRegistry = NameRegistry<SenderId>;

impl<Id: RegistryId> NameRegistry<Id> {
    /// Empty, unbounded registry whose first id will be `base`.
    pub fn with_base(base: i32) -> Self {
        Self::with_limit(base, usize::MAX)
    }

    /// Empty registry whose first id will be `base`, refusing new names once
    /// it holds `limit` of them.
    pub fn with_limit(base: i32, limit: usize) -> Self {
        // Ids must not run past i32::MAX.
        let id_room = usize::try_from(i32::MAX - base.max(0)).unwrap_or(0);
        Self {
            names: Vec::new(),
            ids: HashMap::new(),
            base,
            limit: limit.min(id_room),
            _id: PhantomData,
        }
    }

    /// Id of `name`, assigning the next sequential id on first sight.
    pub fn register(&mut self, name: &str) -> Result<Id, RegistryError> {
        self.register_new(name).map(|(id, _)| id)
    }

    /// Like [`register`](Self::register), also reporting whether the name
    /// was new.
    pub fn register_new(&mut self, name: &str) -> Result<(Id, bool), RegistryError> {
        if let Some(&id) = self.ids.get(name) {
            return Ok((Id::from_raw(id), false));
        }
        if self.names.len() >= self.limit {
            return Err(RegistryError::Full {
                name: name.to_string(),
                limit: self.limit,
            });
        }
        // Bounded by `limit`, which leaves room below i32::MAX.
        let id = self.base + self.names.len() as i32;
        let name: Arc<str> = Arc::from(name);
        self.names.push(Arc::clone(&name));
        self.ids.insert(name, id);
        Ok((Id::from_raw(id), true))
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn lookup(&self, name: &str) -> Option<Id> {
        self.ids.get(name).map(|&id| Id::from_raw(id))
    }

    pub fn name(&self, id: Id) -> Option<&str> {
        let index = id.raw().checked_sub(self.base)?;
        let index = usize::try_from(index).ok()?;
        self.names.get(index).map(|n| &**n)
    }

    pub fn contains(&self, id: Id) -> bool {
        self.name(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// `(id, name)` pairs in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (Id, &str)> + '_ {
        self.names
            .iter()
            .enumerate()
            .map(move |(i, n)| (Id::from_raw(self.base + i as i32), &**n))
    }
}

impl TypeRegistry {
    /// Type registry with the system messages pre-registered at their fixed ids.
    pub fn new() -> Self {
        Self::with_capacity(usize::MAX)
    }

    /// Type registry holding at most `limit` names, the system messages
    /// included (they are always registered).
    pub fn with_capacity(limit: usize) -> Self {
        let mut reg = Self::with_base(0);
        for (i, name) in SYSTEM_TYPE_NAMES.iter().enumerate() {
            let name: Arc<str> = Arc::from(*name);
            reg.names.push(Arc::clone(&name));
            reg.ids.insert(name, i as i32);
        }
        reg.limit = reg.limit.min(limit.max(SYSTEM_TYPE_NAMES.len()));
        reg
    }

    /// User-registered types only.
    pub fn user_types(&self) -> impl Iterator<Item = (TypeId, &str)> + '_ {
        self.iter().filter(|(id, _)| !is_system_type(*id))
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SenderRegistry {
    pub fn new() -> Self {
        Self::with_base(0)
    }

    pub fn with_capacity(limit: usize) -> Self {
        Self::with_limit(0, limit)
    }
}

impl Default for SenderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =======================================================================
// Translation
// =======================================================================

/// Maps a peer's ids onto local ids of the same name.
#[derive(Debug, Clone)]
pub struct TranslationTable<Id> {
    map: HashMap<i32, Id>,
}

impl<Id: RegistryId> TranslationTable<Id> {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Record that the peer's `remote` id means local `local`.
    pub fn insert(&mut self, remote: i32, local: Id) {
        if let Some(prev) = self.map.insert(remote, local) {
            if prev != local {
                log::debug!(
                    "[TranslationTable] remote id {} remapped from {:?} to {:?}",
                    remote,
                    prev,
                    local
                );
            }
        }
    }

    pub fn to_local(&self, remote: i32) -> Option<Id> {
        self.map.get(&remote).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl<Id: RegistryId> Default for TranslationTable<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl TranslationTable<TypeId> {
    /// Local type for a peer's type id; system types map to themselves.
    pub fn local_type(&self, remote: i32) -> Option<TypeId> {
        let id = TypeId(remote);
        if is_system_type(id) {
            return Some(id);
        }
        self.to_local(remote)
    }
}
