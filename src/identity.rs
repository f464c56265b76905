use tracing::debug;

use crate::error::StorageError;
use crate::storage::Storage;

/// Storage key of the per-install user id.
pub const USER_ID_KEY: &str = "chat_user_id";

/// Token keys, checked in order.
pub const TOKEN_KEYS: [&str; 2] = ["access_token", "auth_token"];

/// Identifiers attached to outbound requests for routing and logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: String,
    pub session_id: String,
}

impl SessionIdentity {
    /// Read the stored user id, minting and persisting a UUID the first time,
    /// and derive this run's session id from it.
    pub fn load_or_create<S: Storage + ?Sized>(
        storage: &mut S,
        now_ms: u64,
    ) -> Result<Self, StorageError> {
        let user_id = match storage.get(USER_ID_KEY)? {
            Some(id) if !id.is_empty() => id,
            _ => {
                let id = uuid::Uuid::new_v4().to_string();
                storage.set(USER_ID_KEY, &id)?;
                debug!(user_id = %id, "minted new user id");
                id
            }
        };
        Ok(Self::new(user_id, now_ms))
    }

    pub fn new(user_id: impl Into<String>, now_ms: u64) -> Self {
        let user_id = user_id.into();
        let session_id = format!("session_{}_{}", user_id, now_ms);
        SessionIdentity { user_id, session_id }
    }
}

/// Bearer token from storage: `access_token`, falling back to `auth_token`.
pub fn read_auth_token<S: Storage + ?Sized>(storage: &S) -> Option<String> {
    TOKEN_KEYS
        .iter()
        .find_map(|key| storage.get(key).ok().flatten().filter(|t| !t.is_empty()))
}
