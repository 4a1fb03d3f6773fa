//! Bearer token capability.
//!
//! Secure credential storage lives outside this crate; the session manager
//! only asks for the current token right before each connect.

/// Environment variable read by [`EnvToken`]
pub const TOKEN_ENV_VAR: &str = "RIDELINK_TOKEN";

/// Supplies the bearer token attached to every connect
pub trait TokenProvider: Send + Sync {
    /// Current token, or `None` if the user is not signed in
    fn bearer_token(&self) -> Option<String>;
}

/// A fixed token
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        non_blank(&self.0)
    }
}

/// Reads the token from [`TOKEN_ENV_VAR`] on every call
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvToken;

impl TokenProvider for EnvToken {
    fn bearer_token(&self) -> Option<String> {
        std::env::var(TOKEN_ENV_VAR)
            .ok()
            .and_then(|token| non_blank(&token))
    }
}

fn non_blank(token: &str) -> Option<String> {
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}
