//! Scope → sessions map owned by a hub actor.
//!
//! A [`Member`] holds the only strong sender of its session's outbound
//! queue, so removing a member from the registry and dropping it is what
//! closes the queue. Nothing else in the crate can close it.

use std::collections::HashMap;

use relay_core::{Envelope, SessionId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// A registered session as seen by the hub.
#[derive(Debug)]
pub struct Member {
    id: SessionId,
    user_id: i64,
    outbox: mpsc::Sender<Envelope>,
}

impl Member {
    /// Wrap a session's queue sender.
    pub fn new(id: SessionId, user_id: i64, outbox: mpsc::Sender<Envelope>) -> Self {
        Self {
            id,
            user_id,
            outbox,
        }
    }

    /// Session id.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Owning user.
    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// Non-blocking enqueue onto the session's outbound queue.
    pub fn try_deliver(&self, envelope: Envelope) -> Result<(), TrySendError<Envelope>> {
        self.outbox.try_send(envelope)
    }
}

/// Collection of members under one scope key.
pub trait Bucket: Default + Send + 'static {
    /// Add a member.
    fn insert(&mut self, member: Member);
    /// Remove a member by id.
    fn remove(&mut self, id: &SessionId) -> Option<Member>;
    /// Number of members.
    fn len(&self) -> usize;
    /// Whether the bucket is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Iterate members.
    fn members(&self) -> Box<dyn Iterator<Item = &Member> + '_>;
}

/// Unordered set of sessions (chat conversations).
#[derive(Debug, Default)]
pub struct SessionSet(HashMap<SessionId, Member>);

impl Bucket for SessionSet {
    fn insert(&mut self, member: Member) {
        let _ = self.0.insert(member.id.clone(), member);
    }

    fn remove(&mut self, id: &SessionId) -> Option<Member> {
        self.0.remove(id)
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn members(&self) -> Box<dyn Iterator<Item = &Member> + '_> {
        Box::new(self.0.values())
    }
}

/// Sessions in registration order (one user's devices).
#[derive(Debug, Default)]
pub struct SessionList(Vec<Member>);

impl Bucket for SessionList {
    fn insert(&mut self, member: Member) {
        self.0.push(member);
    }

    fn remove(&mut self, id: &SessionId) -> Option<Member> {
        let pos = self.0.iter().position(|m| &m.id == id)?;
        Some(self.0.remove(pos))
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn members(&self) -> Box<dyn Iterator<Item = &Member> + '_> {
        Box::new(self.0.iter())
    }
}

/// Scope-keyed registry of live sessions.
///
/// Invariants:
/// - a session id appears under at most one scope;
/// - no scope key maps to an empty bucket.
#[derive(Debug)]
pub struct Registry<B> {
    scopes: HashMap<i64, B>,
    index: HashMap<SessionId, i64>,
}

impl<B: Bucket> Registry<B> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            scopes: HashMap::new(),
            index: HashMap::new(),
        }
    }

    /// Add `member` under `scope_id`.
    ///
    /// If the same session id is already registered anywhere, that entry is
    /// removed first and returned so the caller decides when it drops.
    pub fn insert(&mut self, scope_id: i64, member: Member) -> Option<Member> {
        let displaced = self.remove(&member.id);
        let _ = self.index.insert(member.id.clone(), scope_id);
        self.scopes.entry(scope_id).or_default().insert(member);
        displaced
    }

    /// Remove a session, pruning its scope if it became empty.
    pub fn remove(&mut self, id: &SessionId) -> Option<Member> {
        let scope_id = self.index.remove(id)?;
        let bucket = self.scopes.get_mut(&scope_id)?;
        let member = bucket.remove(id);
        if bucket.is_empty() {
            let _ = self.scopes.remove(&scope_id);
        }
        member
    }

    /// Members registered under `scope_id`.
    pub fn members(&self, scope_id: i64) -> impl Iterator<Item = &Member> {
        self.scopes
            .get(&scope_id)
            .into_iter()
            .flat_map(|bucket| bucket.members())
    }

    /// Whether `user_id` holds at least one session under `scope_id`.
    pub fn contains_user(&self, scope_id: i64, user_id: i64) -> bool {
        self.members(scope_id).any(|m| m.user_id == user_id)
    }

    /// Whether a session id is registered.
    pub fn contains(&self, id: &SessionId) -> bool {
        self.index.contains_key(id)
    }

    /// Scope a session is registered under.
    pub fn scope_of(&self, id: &SessionId) -> Option<i64> {
        self.index.get(id).copied()
    }

    /// Whether a scope key is present.
    pub fn has_scope(&self, scope_id: i64) -> bool {
        self.scopes.contains_key(&scope_id)
    }

    /// Number of non-empty scopes.
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.index.len()
    }

    /// Scope keys, sorted.
    pub fn scope_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.scopes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl<B: Bucket> Default for Registry<B> {
    fn default() -> Self {
        Self::new()
    }
}
