#![forbid(unsafe_code)]

use precinct_contracts::auth::SessionUser;
use precinct_engines::{ApiTransport, Notifier};
use precinct_storage::KvStore;

use crate::app::ClientApp;
use crate::navigator::{Navigator, Route};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    Login,
    Signup,
    ShiftLog,
    Logout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormChoice {
    pub kind: FormKind,
    pub label: &'static str,
    /// `None` for actions that are not a page of their own.
    pub route: Option<Route>,
}

impl FormChoice {
    fn page(kind: FormKind, label: &'static str, route: Route) -> Self {
        Self {
            kind,
            label,
            route: Some(route),
        }
    }
}

pub fn form_choices(session: Option<&SessionUser>) -> Vec<FormChoice> {
    match session {
        None => vec![
            FormChoice::page(FormKind::Login, "Log in", Route::Login),
            FormChoice::page(FormKind::Signup, "Sign up", Route::Signup),
        ],
        Some(_) => vec![
            FormChoice::page(FormKind::ShiftLog, "Submit a shift log", Route::ShiftLog),
            FormChoice {
                kind: FormKind::Logout,
                label: "Log out",
                route: None,
            },
        ],
    }
}

/// Landing page text: a greeting for the logged-in officer, then one line per choice.
pub fn render_landing(session: Option<&SessionUser>) -> String {
    let mut lines = Vec::new();
    if let Some(user) = session {
        let name = user
            .full_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(user.username.as_str());
        lines.push(format!("Signed in as {name} (badge {})", user.badge_number));
    }
    for choice in form_choices(session) {
        match choice.route {
            Some(route) => lines.push(format!("{:<20} {}", choice.label, route)),
            None => lines.push(choice.label.to_string()),
        }
    }
    lines.join("\n")
}

pub async fn landing<T, S, N, V>(app: &ClientApp<T, S, N, V>) -> Vec<FormChoice>
where
    T: ApiTransport,
    S: KvStore,
    N: Notifier,
    V: Navigator,
{
    let session = app.session().current().await;
    form_choices(session.as_ref())
}
