//! Snapshot source port.

use crate::error::FetchError;
use crate::session::Credentials;
use crate::snapshot::UserSnapshot;
use async_trait::async_trait;

/// Fetches the authoritative snapshot for the signed-in account.
///
/// Implemented over REST by `usync-rest`. The returned snapshot carries no
/// timestamp; callers stamp it at fetch completion.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self, credentials: &Credentials) -> Result<UserSnapshot, FetchError>;
}
