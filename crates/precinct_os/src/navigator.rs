#![forbid(unsafe_code)]

use std::fmt;
use std::sync::{Mutex, PoisonError};

use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Landing,
    Login,
    Signup,
    ShiftLog,
    DiscordCallback,
}

impl Route {
    pub const fn path(self) -> &'static str {
        match self {
            Self::Landing => "/",
            Self::Login => "/login",
            Self::Signup => "/signup",
            Self::ShiftLog => "/shift-log",
            Self::DiscordCallback => "/auth/discord/callback",
        }
    }

    /// Matches on the path only; any query string is ignored.
    pub fn from_path(raw: &str) -> Option<Self> {
        let path = raw.split(['?', '#']).next().unwrap_or_default().trim();
        let path = match path.trim_end_matches('/') {
            "" => "/",
            trimmed => trimmed,
        };
        [
            Self::Landing,
            Self::Login,
            Self::Signup,
            Self::ShiftLog,
            Self::DiscordCallback,
        ]
        .into_iter()
        .find(|route| route.path() == path)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Where the client sends the user next. In-app routes and full navigations to another origin
/// are kept apart because the latter drops all in-memory state.
pub trait Navigator {
    fn open_external(&self, url: &str);
    fn go_to(&self, route: Route);
}

impl<V: Navigator + ?Sized> Navigator for &V {
    fn open_external(&self, url: &str) {
        (**self).open_external(url)
    }

    fn go_to(&self, route: Route) {
        (**self).go_to(route)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNavigator;

impl Navigator for LoggingNavigator {
    fn open_external(&self, url: &str) {
        info!(url, "external navigation");
    }

    fn go_to(&self, route: Route) {
        info!(route = %route, "navigate");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    External(String),
    Internal(Route),
}

#[derive(Debug, Default)]
pub struct RecordingNavigator {
    history: Mutex<Vec<Navigation>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<Navigation> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<Navigation> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    fn record(&self, navigation: Navigation) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(navigation);
    }
}

impl Navigator for RecordingNavigator {
    fn open_external(&self, url: &str) {
        self.record(Navigation::External(url.to_string()));
    }

    fn go_to(&self, route: Route) {
        self.record(Navigation::Internal(route));
    }
}
