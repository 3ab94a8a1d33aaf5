//! Presence gateway: the user store the hub keeps in sync with connection
//! lifecycle.
//!
//! The hub awaits these calls inline, so a slow backend stalls every other
//! registration, unregistration and broadcast until it returns.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::db::pool::DbPool;
use crate::error::PresenceError;
use crate::models::chat_user;

/// Result of looking up a user identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserExistence {
    Exists,
    NotExists,
}

/// Abstraction over the store holding user records and their online flag.
///
/// Backed by PostgreSQL in production and an in-memory map in tests.
#[async_trait]
pub trait PresenceGateway: Send + Sync {
    async fn exists(&self, user_id: &str) -> Result<UserExistence, PresenceError>;
    /// Create the user record, marked online.
    async fn create_user(&self, username: &str, user_id: &str) -> Result<(), PresenceError>;
    async fn set_online_status(&self, user_id: &str, online: bool) -> Result<(), PresenceError>;
}

// ---------------------------------------------------------------------------
// PostgreSQL implementation
// ---------------------------------------------------------------------------

pub struct PgPresence {
    pool: DbPool,
}

impl PgPresence {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PresenceGateway for PgPresence {
    async fn exists(&self, user_id: &str) -> Result<UserExistence, PresenceError> {
        let found = chat_user::find(&self.pool, user_id).await?;
        Ok(if found.is_some() {
            UserExistence::Exists
        } else {
            UserExistence::NotExists
        })
    }

    async fn create_user(&self, username: &str, user_id: &str) -> Result<(), PresenceError> {
        chat_user::create(&self.pool, username, user_id).await
    }

    async fn set_online_status(&self, user_id: &str, online: bool) -> Result<(), PresenceError> {
        chat_user::set_online(&self.pool, user_id, online).await
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation (no database configured / tests)
// ---------------------------------------------------------------------------

struct MemoryUser {
    username: String,
    online: bool,
}

pub struct MemoryPresence {
    users: Mutex<HashMap<String, MemoryUser>>,
}

impl MemoryPresence {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
        }
    }

    /// Current online flag, or `None` if the user was never created.
    pub fn is_online(&self, user_id: &str) -> Option<bool> {
        self.users.lock().get(user_id).map(|u| u.online)
    }

    pub fn username(&self, user_id: &str) -> Option<String> {
        self.users.lock().get(user_id).map(|u| u.username.clone())
    }
}

impl Default for MemoryPresence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PresenceGateway for MemoryPresence {
    async fn exists(&self, user_id: &str) -> Result<UserExistence, PresenceError> {
        Ok(if self.users.lock().contains_key(user_id) {
            UserExistence::Exists
        } else {
            UserExistence::NotExists
        })
    }

    async fn create_user(&self, username: &str, user_id: &str) -> Result<(), PresenceError> {
        let mut users = self.users.lock();
        if users.contains_key(user_id) {
            return Err(PresenceError::Internal(format!("user {user_id} already exists")));
        }
        users.insert(
            user_id.to_string(),
            MemoryUser {
                username: username.to_string(),
                online: true,
            },
        );
        Ok(())
    }

    async fn set_online_status(&self, user_id: &str, online: bool) -> Result<(), PresenceError> {
        match self.users.lock().get_mut(user_id) {
            Some(user) => {
                user.online = online;
                Ok(())
            }
            None => Err(PresenceError::Internal(format!("user {user_id} not found"))),
        }
    }
}
