#![forbid(unsafe_code)]

pub mod app;
pub mod discord_verify;
pub mod error;
pub mod forms;
pub mod landing;
pub mod navigator;
pub mod profile_sync;
pub mod session;

pub use app::{ClientApp, ClientConfig};
pub use discord_verify::DiscordVerification;
pub use error::ClientError;
pub use forms::{logout, LoginForm, ShiftLogForm, SignupForm};
pub use landing::{form_choices, landing, render_landing, FormChoice, FormKind};
pub use navigator::{LoggingNavigator, Navigation, Navigator, RecordingNavigator, Route};
pub use profile_sync::{ProfileSync, SyncOutcome};
pub use session::SessionQuery;
