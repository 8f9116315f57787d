//! Session credentials handed over by the authentication collaborator.

/// Credentials of an authenticated session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Identity key of the signed-in account.
    pub identity: String,
    /// Bearer token for the push channel and the snapshot endpoint.
    pub token: String,
}

impl Credentials {
    pub fn new(identity: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            token: token.into(),
        }
    }
}

// Tokens never reach the logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("token", &"<redacted>")
            .finish()
    }
}
