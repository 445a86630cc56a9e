#![forbid(unsafe_code)]

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// REST endpoints the client talks to. The server owns all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ApiEndpoint {
    AuthMe,
    AuthLogin,
    AuthLogout,
    AuthSignup,
    DiscordUrl,
    DiscordStatus,
    DiscordCallback,
    DiscordDisconnect,
    ShiftLogs,
}

impl ApiEndpoint {
    pub const fn method(self) -> HttpMethod {
        match self {
            Self::AuthMe | Self::DiscordUrl | Self::DiscordStatus => HttpMethod::Get,
            Self::AuthLogin
            | Self::AuthLogout
            | Self::AuthSignup
            | Self::DiscordCallback
            | Self::DiscordDisconnect
            | Self::ShiftLogs => HttpMethod::Post,
        }
    }

    pub const fn path(self) -> &'static str {
        match self {
            Self::AuthMe => "/api/auth/me",
            Self::AuthLogin => "/api/auth/login",
            Self::AuthLogout => "/api/auth/logout",
            Self::AuthSignup => "/api/auth/signup",
            Self::DiscordUrl => "/api/auth/discord/url",
            Self::DiscordStatus => "/api/auth/discord/status",
            Self::DiscordCallback => "/api/auth/discord/callback",
            Self::DiscordDisconnect => "/api/auth/discord/disconnect",
            Self::ShiftLogs => "/api/shift-logs",
        }
    }

    pub const fn all() -> &'static [Self] {
        &[
            Self::AuthMe,
            Self::AuthLogin,
            Self::AuthLogout,
            Self::AuthSignup,
            Self::DiscordUrl,
            Self::DiscordStatus,
            Self::DiscordCallback,
            Self::DiscordDisconnect,
            Self::ShiftLogs,
        ]
    }

    /// Cache key for endpoints whose reads are cached by the query layer.
    pub fn query_key(self) -> Option<QueryKey> {
        match self {
            Self::AuthMe | Self::DiscordStatus => Some(QueryKey::new(self.path())),
            _ => None,
        }
    }
}

/// Identifier of a cached query. Query keys are the endpoint paths they read.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn session() -> Self {
        Self::new(ApiEndpoint::AuthMe.path())
    }

    pub fn discord_status() -> Self {
        Self::new(ApiEndpoint::DiscordStatus.path())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
