//! Role lookup contract.
//!
//! The rule engine never fetches roles itself. Whatever talks to the chat
//! platform implements [`RoleResolver`]; the engine calls it lazily, at most
//! once per message.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::RwLock;

use crate::core::error::ResolutionError;

pub trait RoleResolver: Send + Sync {
    /// Role names held by `author_id` in the given guild.
    fn resolve_roles(
        &self,
        guild_id: Option<&str>,
        author_id: &str,
    ) -> impl Future<Output = Result<HashSet<String>, ResolutionError>> + Send;
}

/// In-memory author to roles map.
///
/// Unknown authors resolve to an empty set.
#[derive(Debug, Default)]
pub struct StaticRoles {
    roles: RwLock<HashMap<String, HashSet<String>>>,
}

impl StaticRoles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roles<I, S>(self, author_id: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_roles(author_id, roles);
        self
    }

    /// Replace the roles recorded for an author.
    pub fn set_roles<I, S>(&self, author_id: &str, roles: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles = roles.into_iter().map(Into::into).collect();
        match self.roles.write() {
            Ok(mut map) => {
                map.insert(author_id.to_string(), roles);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(author_id.to_string(), roles);
            }
        }
    }

    fn lookup(&self, author_id: &str) -> Result<HashSet<String>, ResolutionError> {
        let map = self
            .roles
            .read()
            .map_err(|_| ResolutionError::new(author_id, "role table lock poisoned"))?;
        Ok(map.get(author_id).cloned().unwrap_or_default())
    }
}

impl RoleResolver for StaticRoles {
    async fn resolve_roles(
        &self,
        _guild_id: Option<&str>,
        author_id: &str,
    ) -> Result<HashSet<String>, ResolutionError> {
        self.lookup(author_id)
    }
}
