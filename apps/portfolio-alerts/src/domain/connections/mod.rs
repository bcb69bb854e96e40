//! Connection Registry
//!
//! Maps each user to the handle of their live push connection.
//!
//! # Design
//!
//! - One handle per user: a new registration replaces the previous one.
//! - Unregistration resolves by handle value, never by a claimed user id,
//!   so a stale teardown arriving after a reconnect leaves the new
//!   connection in place.
//! - Every operation is atomic on its own; nothing spans calls.
//!
//! The registry is generic over the handle type so the domain stays
//! independent of the transport.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::domain::market::UserId;

/// Live user → connection handle mapping.
///
/// # Example
///
/// ```rust
/// use portfolio_alerts::domain::connections::ConnectionRegistry;
/// use portfolio_alerts::domain::market::UserId;
///
/// let registry = ConnectionRegistry::new();
/// let alice = UserId::new("alice");
///
/// registry.register(alice.clone(), 1_u64);
/// // Reconnect before the old socket's teardown is observed.
/// registry.register(alice.clone(), 2_u64);
///
/// // Teardown of the old socket is a no-op.
/// registry.unregister(&1);
/// assert_eq!(registry.lookup(&alice), Some(2));
/// ```
#[derive(Debug)]
pub struct ConnectionRegistry<H> {
    handles: RwLock<HashMap<UserId, H>>,
}

impl<H> Default for ConnectionRegistry<H> {
    fn default() -> Self {
        Self {
            handles: RwLock::new(HashMap::new()),
        }
    }
}

impl<H> ConnectionRegistry<H>
where
    H: Clone + PartialEq,
{
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the handle for `user`.
    ///
    /// Returns the handle that was replaced, if any.
    pub fn register(&self, user: UserId, handle: H) -> Option<H> {
        self.handles.write().insert(user, handle)
    }

    /// Remove every mapping that currently holds exactly `handle`.
    ///
    /// Returns the users that were mapped to it; empty when the handle was
    /// never registered or has already been replaced.
    pub fn unregister(&self, handle: &H) -> Vec<UserId> {
        let mut handles = self.handles.write();
        let users: Vec<UserId> = handles
            .iter()
            .filter(|(_, h)| *h == handle)
            .map(|(user, _)| user.clone())
            .collect();

        for user in &users {
            handles.remove(user);
        }

        users
    }

    /// Current handle for `user`, or `None` when offline.
    #[must_use]
    pub fn lookup(&self, user: &UserId) -> Option<H> {
        self.handles.read().get(user).cloned()
    }

    /// Whether `user` has a live connection.
    #[must_use]
    pub fn is_online(&self, user: &UserId) -> bool {
        self.handles.read().contains_key(user)
    }

    /// Number of users with a live connection.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.handles.read().len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as Model;

    use proptest::prelude::*;

    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    #[test]
    fn lookup_after_register_returns_handle() {
        let registry = ConnectionRegistry::new();
        assert!(registry.register(user("u1"), 10_u64).is_none());

        assert_eq!(registry.lookup(&user("u1")), Some(10));
        assert!(registry.is_online(&user("u1")));
        assert_eq!(registry.online_count(), 1);
    }

    #[test]
    fn lookup_unknown_user_is_none() {
        let registry: ConnectionRegistry<u64> = ConnectionRegistry::new();
        assert_eq!(registry.lookup(&user("ghost")), None);
        assert!(!registry.is_online(&user("ghost")));
    }

    #[test]
    fn reconnect_replaces_previous_handle() {
        let registry = ConnectionRegistry::new();
        registry.register(user("u1"), 1_u64);

        let replaced = registry.register(user("u1"), 2_u64);

        assert_eq!(replaced, Some(1));
        assert_eq!(registry.lookup(&user("u1")), Some(2));
        assert_eq!(registry.online_count(), 1);
    }

    #[test]
    fn stale_teardown_keeps_newer_connection() {
        let registry = ConnectionRegistry::new();
        registry.register(user("u1"), 1_u64);
        registry.register(user("u1"), 2_u64);

        let removed = registry.unregister(&1);

        assert!(removed.is_empty());
        assert_eq!(registry.lookup(&user("u1")), Some(2));
    }

    #[test]
    fn unregister_removes_by_handle() {
        let registry = ConnectionRegistry::new();
        registry.register(user("u1"), 1_u64);
        registry.register(user("u2"), 2_u64);

        let removed = registry.unregister(&1);

        assert_eq!(removed, vec![user("u1")]);
        assert_eq!(registry.lookup(&user("u1")), None);
        assert_eq!(registry.lookup(&user("u2")), Some(2));
    }

    #[test]
    fn unregister_unknown_handle_is_noop() {
        let registry = ConnectionRegistry::new();
        registry.register(user("u1"), 1_u64);

        assert!(registry.unregister(&99).is_empty());
        assert_eq!(registry.online_count(), 1);
    }

    #[test]
    fn handle_registered_for_two_users_is_fully_removed() {
        let registry = ConnectionRegistry::new();
        registry.register(user("u1"), 7_u64);
        registry.register(user("u2"), 7_u64);

        let mut removed = registry.unregister(&7);
        removed.sort();

        assert_eq!(removed, vec![user("u1"), user("u2")]);
        assert_eq!(registry.online_count(), 0);
    }

    #[test]
    fn thread_safety_concurrent_register_and_unregister() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(ConnectionRegistry::new());
        let mut handles = vec![];

        for i in 0..10u64 {
            let r = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                r.register(UserId::new(format!("user-{i}")), i);
                if i % 2 == 0 {
                    r.unregister(&i);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.online_count(), 5);
        assert_eq!(registry.lookup(&user("user-1")), Some(1));
        assert_eq!(registry.lookup(&user("user-2")), None);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Register(u8, u8),
        Unregister(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..4, 0u8..8).prop_map(|(u, h)| Op::Register(u, h)),
            (0u8..8).prop_map(Op::Unregister),
        ]
    }

    proptest! {
        #[test]
        fn matches_last_write_wins_model(ops in proptest::collection::vec(op(), 0..64)) {
            let registry = ConnectionRegistry::new();
            let mut model: Model<u8, u8> = Model::new();

            for op in ops {
                match op {
                    Op::Register(u, h) => {
                        registry.register(UserId::new(u.to_string()), h);
                        model.insert(u, h);
                        prop_assert_eq!(registry.lookup(&UserId::new(u.to_string())), Some(h));
                    }
                    Op::Unregister(h) => {
                        registry.unregister(&h);
                        model.retain(|_, v| *v != h);
                        for u in 0u8..4 {
                            prop_assert_ne!(registry.lookup(&UserId::new(u.to_string())), Some(h));
                        }
                    }
                }
            }

            for u in 0u8..4 {
                prop_assert_eq!(
                    registry.lookup(&UserId::new(u.to_string())),
                    model.get(&u).copied()
                );
            }
        }
    }
}
