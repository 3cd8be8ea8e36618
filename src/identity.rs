//! Identity context: resolving credentials to users and reading user
//! display attributes.
//!
//! Credential issuance (passwords, token minting) lives outside this crate.
//! The core only consumes the two narrow traits below.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;

use crate::error::{ChatError, ChatResult, StorageError};
use crate::storage::{Db, SessionRow, UserRow};
use crate::types::{now_millis, UserId, UserProfile};

/// Resolves a credential token to a user.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> ChatResult<UserId>;
}

/// Read access to user display attributes.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, user_id: &UserId) -> ChatResult<Option<UserProfile>>;

    /// Every known user except `requester`.
    async fn list_peers(&self, requester: &UserId) -> ChatResult<Vec<UserProfile>>;

    async fn update_avatar(&self, user_id: &UserId, avatar_url: &str) -> ChatResult<UserProfile>;
}

impl From<UserRow> for UserProfile {
    fn from(row: UserRow) -> Self {
        Self {
            id: UserId(row.user_id),
            name: row.full_name,
            email: row.email,
            avatar_url: row.avatar_url,
        }
    }
}

/// Identity context backed by the `users` and `sessions` tables.
#[derive(Clone)]
pub struct SqliteIdentity {
    db: Db,
}

impl SqliteIdentity {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Authenticator for SqliteIdentity {
    async fn authenticate(&self, token: &str) -> ChatResult<UserId> {
        if token.is_empty() {
            return Err(ChatError::Unauthorized);
        }
        let token = token.to_string();
        let now = now_millis();
        let user = self
            .db
            .run(move |s| s.user_for_token(&token, now))
            .await
            .map_err(|e| {
                tracing::warn!("auth: session lookup failed: {}", e);
                ChatError::from(e)
            })?;
        user.map(UserId).ok_or(ChatError::Unauthorized)
    }
}

#[async_trait]
impl UserDirectory for SqliteIdentity {
    async fn get_user(&self, user_id: &UserId) -> ChatResult<Option<UserProfile>> {
        let id = user_id.0.clone();
        let row = self.db.run(move |s| s.get_user(&id)).await?;
        Ok(row.map(UserProfile::from))
    }

    async fn list_peers(&self, requester: &UserId) -> ChatResult<Vec<UserProfile>> {
        let id = requester.0.clone();
        let rows = self.db.run(move |s| s.list_users_except(&id)).await?;
        Ok(rows.into_iter().map(UserProfile::from).collect())
    }

    async fn update_avatar(&self, user_id: &UserId, avatar_url: &str) -> ChatResult<UserProfile> {
        let id = user_id.0.clone();
        let url = avatar_url.to_string();
        let row = self.db.run(move |s| s.update_avatar(&id, &url)).await?;
        row.map(UserProfile::from).ok_or(ChatError::UnknownPeer)
    }
}

/// Random URL-safe identifier with `bytes` bytes of entropy.
pub fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}

/// Create a user together with a session token. Used by the `add-user`
/// operator command and by tests; returns `(user_id, token)`.
pub fn provision_user(
    db: &Db,
    full_name: &str,
    email: Option<&str>,
    avatar_url: Option<&str>,
    ttl_millis: Option<u64>,
) -> Result<(UserId, String), StorageError> {
    let now = now_millis();
    let user = UserRow {
        user_id: random_token(12),
        full_name: full_name.to_string(),
        email: email.map(str::to_string),
        avatar_url: avatar_url.map(str::to_string),
        created_at: now,
    };
    let session = SessionRow {
        token: random_token(32),
        user_id: user.user_id.clone(),
        created_at: now,
        expires_at: ttl_millis.map(|ttl| now + ttl),
    };
    db.with(|s| {
        s.insert_user(&user)?;
        s.insert_session(&session)
    })?;
    Ok((UserId(user.user_id), session.token))
}
