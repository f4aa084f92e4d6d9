//! The account manager: logged-in accounts, game accounts, presence data,
//! and the subscription fan-out list.
//!
//! Single-writer by construction: the manager sits behind one mutex shared
//! by the services of all sessions, and every mutation happens under it.
//! Sessions are referenced weakly — the manager never keeps a connection
//! alive.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use brazier_protocol::{AttributeValue, EntityId, FieldKey};
use brazier_session::{Session, SessionId, SessionState};

/// A presence field key scoped to its owning entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PresenceKey {
    pub entity: EntityId,
    pub field: FieldKey,
}

/// A logged-in account.
pub struct AccountEntry {
    pub entity_id: EntityId,
    pub battle_tag: String,
    pub session: Weak<Session>,
}

/// Tracks accounts, game accounts, presence fields, and subscriptions.
#[derive(Default)]
pub struct AccountManager {
    accounts: HashMap<EntityId, AccountEntry>,
    game_accounts: HashSet<EntityId>,
    battle_tags: HashMap<String, EntityId>,
    session_accounts: HashMap<SessionId, EntityId>,
    presence: HashMap<PresenceKey, AttributeValue>,
    /// Subscribed entity → accounts to notify when its presence changes.
    subscribers: HashMap<EntityId, Vec<EntityId>>,
}

impl AccountManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a logged-in account and indexes it by battle tag and session.
    pub fn add_account(
        &mut self,
        entity_id: EntityId,
        battle_tag: impl Into<String>,
        session: &Arc<Session>,
    ) {
        let battle_tag = battle_tag.into();
        tracing::info!(%entity_id, %battle_tag, session = %session.id(), "account online");
        self.battle_tags.insert(battle_tag.clone(), entity_id);
        self.session_accounts.insert(session.id(), entity_id);
        self.accounts.insert(
            entity_id,
            AccountEntry {
                entity_id,
                battle_tag,
                session: Arc::downgrade(session),
            },
        );
    }

    /// Records a game account. Returns false if it was already known.
    pub fn add_game_account(&mut self, entity_id: EntityId) -> bool {
        self.game_accounts.insert(entity_id)
    }

    pub fn battle_tag(&self, entity_id: EntityId) -> Option<&str> {
        self.accounts
            .get(&entity_id)
            .map(|entry| entry.battle_tag.as_str())
    }

    pub fn account_by_tag(&self, battle_tag: &str) -> Option<EntityId> {
        self.battle_tags.get(battle_tag).copied()
    }

    /// The account logged in on the given session, if any.
    pub fn account_for_session(&self, session: SessionId) -> Option<EntityId> {
        self.session_accounts.get(&session).copied()
    }

    // -- Subscriptions -----------------------------------------------------

    /// Subscribes `subscriber` to changes on `target`. Duplicate
    /// subscriptions collapse to one.
    pub fn subscribe(&mut self, target: EntityId, subscriber: EntityId) {
        let list = self.subscribers.entry(target).or_default();
        if !list.contains(&subscriber) {
            tracing::debug!(%target, %subscriber, "presence subscription added");
            list.push(subscriber);
        }
    }

    /// Removes the subscription; returns whether it existed.
    pub fn unsubscribe(&mut self, target: EntityId, subscriber: EntityId) -> bool {
        match self.subscribers.get_mut(&target) {
            Some(list) => {
                let before = list.len();
                list.retain(|id| *id != subscriber);
                let removed = list.len() != before;
                if list.is_empty() {
                    self.subscribers.remove(&target);
                }
                removed
            }
            None => false,
        }
    }

    /// Sessions of subscribers that are live and ready to receive a
    /// fan-out for `target`.
    pub fn fanout_sessions(&self, target: EntityId) -> Vec<Arc<Session>> {
        let Some(list) = self.subscribers.get(&target) else {
            return Vec::new();
        };
        list.iter()
            .filter_map(|id| self.accounts.get(id))
            .filter_map(|entry| entry.session.upgrade())
            .filter(|session| session.state() == SessionState::Ready)
            .collect()
    }

    // -- Presence data -----------------------------------------------------

    pub fn update_presence(&mut self, key: PresenceKey, value: AttributeValue) {
        self.presence.insert(key, value);
    }

    pub fn clear_presence(&mut self, key: PresenceKey) {
        self.presence.remove(&key);
    }

    pub fn presence(&self, key: PresenceKey) -> Option<&AttributeValue> {
        self.presence.get(&key)
    }
}
