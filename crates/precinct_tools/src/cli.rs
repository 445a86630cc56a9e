#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use precinct_contracts::discord::VerificationState;
use precinct_contracts::profile::{OfficerProfile, DEFAULT_RANK};
use precinct_contracts::shiftlog::ShiftLogOfficer;
use precinct_engines::{ApiTransport, Notice, Notifier, TracingNotifier};
use precinct_os::{
    logout, render_landing, ClientApp, ClientError, LoginForm, Navigator, ShiftLogForm,
    SignupForm,
};
use precinct_storage::{ClientStore, KvStore, StorageError};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "precinct")]
#[command(version, about = "Department records client", long_about = None)]
pub struct Cli {
    /// Log filter when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Send notifications to the log instead of stderr
    #[arg(long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List the forms available to the current session
    Forms,
    /// Log in; the password is read from the terminal or stdin
    Login {
        /// Defaults to the verified Discord username
        #[arg(long)]
        username: Option<String>,
    },
    Logout,
    /// Show the logged-in officer
    Whoami,
    /// Create an account for the verified Discord identity
    Signup {
        #[arg(long)]
        badge_number: String,
        #[arg(long, default_value = DEFAULT_RANK)]
        rank: String,
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        callsign: Option<String>,
    },
    /// Discord verification
    #[command(subcommand)]
    Discord(DiscordCommand),
    /// Locally cached officer profile and saved officers
    #[command(subcommand)]
    Profile(ProfileCommand),
    #[command(subcommand)]
    ShiftLog(ShiftLogCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum DiscordCommand {
    /// Print the provider authorization URL
    Url,
    /// Finish verification from the URL the provider redirected to
    Callback { url: String },
    Status,
    Disconnect,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ProfileCommand {
    Show,
    Save {
        #[arg(long)]
        badge: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = DEFAULT_RANK)]
        rank: String,
        #[arg(long, default_value = "")]
        callsign: String,
        #[arg(long)]
        discord_id: Option<String>,
        /// Also keep this officer in the saved officer list
        #[arg(long)]
        add_to_list: bool,
    },
    /// Drop an officer from the saved officer list
    Forget { badge: String },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ShiftLogCommand {
    /// Submit a shift log described by a JSON file
    Submit {
        file: PathBuf,
        /// Badge of a saved officer to add (repeatable)
        #[arg(long = "with")]
        with_officers: Vec<String>,
    },
}

/// Secrets collected by the binary before dispatch; never logged.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secrets {
    pub password: Option<String>,
    pub confirm_password: Option<String>,
}

impl Command {
    pub fn needs_password(&self) -> bool {
        matches!(self, Self::Login { .. } | Self::Signup { .. })
    }

    pub fn needs_confirmation(&self) -> bool {
        matches!(self, Self::Signup { .. })
    }
}

/// Shift log file layout. `officers` is optional: the cached profile is always listed first.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShiftLogDraft {
    shift_date: String,
    start_time: String,
    end_time: String,
    patrol_area: String,
    #[serde(default)]
    officers: Vec<ShiftLogOfficer>,
    #[serde(default)]
    notes: String,
}

/// Notices go to stderr, or only to the log with `--quiet`.
#[derive(Debug, Clone, Copy)]
pub enum CliNotifier {
    Stderr,
    Log(TracingNotifier),
}

impl CliNotifier {
    pub fn for_quiet(quiet: bool) -> Self {
        if quiet {
            Self::Log(TracingNotifier)
        } else {
            Self::Stderr
        }
    }
}

impl Notifier for CliNotifier {
    fn notify(&self, notice: Notice) {
        match self {
            Self::Stderr => eprintln!("{}", notice.render()),
            Self::Log(inner) => inner.notify(notice),
        }
    }
}

pub async fn execute_command<T, S, N, V>(
    app: &ClientApp<T, S, N, V>,
    command: &Command,
    secrets: &Secrets,
) -> Result<String, String>
where
    T: ApiTransport,
    S: KvStore,
    N: Notifier,
    V: Navigator,
{
    app.discord().restore().map_err(describe)?;
    match command {
        Command::Forms => {
            let session = app.session().current().await;
            Ok(render_landing(session.as_ref()))
        }
        Command::Login { username } => {
            let username = match username {
                Some(username) => username.clone(),
                None => app
                    .verification_state()
                    .identity()
                    .map(|identity| identity.username.clone())
                    .ok_or_else(|| "missing --username".to_string())?,
            };
            let password = require_password(secrets)?;
            let user = LoginForm::new(username, password)
                .submit(app)
                .await
                .map_err(describe)?;
            Ok(format!("logged in as {} (badge {})", user.username, user.badge_number))
        }
        Command::Logout => {
            logout(app).await.map_err(describe)?;
            Ok("logged out".to_string())
        }
        Command::Whoami => {
            let user = app
                .session()
                .current()
                .await
                .ok_or_else(|| describe(ClientError::NotAuthenticated))?;
            let profile = app.profiles().profile().map_err(describe_storage)?;
            let mut lines = vec![
                format!("username: {}", user.username),
                format!("badge: {}", user.badge_number),
                format!("rank: {}", user.rank.as_deref().unwrap_or(DEFAULT_RANK)),
            ];
            if let Some(callsign) = user.callsign.as_deref().filter(|c| !c.is_empty()) {
                lines.push(format!("callsign: {callsign}"));
            }
            if user.is_admin {
                lines.push("admin: yes".to_string());
            }
            if let Some(profile) = profile {
                lines.push(format!("cached profile: {} ({})", profile.name, profile.badge));
            }
            Ok(lines.join("\n"))
        }
        Command::Signup {
            badge_number,
            rank,
            full_name,
            callsign,
        } => {
            let mut form = SignupForm::new(&app.verification_state()).map_err(describe)?;
            form.badge_number = badge_number.clone();
            form.rank = rank.clone();
            form.full_name = full_name.clone();
            form.callsign = callsign.clone();
            form.password = require_password(secrets)?;
            form.confirm_password = secrets
                .confirm_password
                .clone()
                .unwrap_or_else(|| form.password.clone());
            let user = form.submit(app).await.map_err(describe)?;
            Ok(format!("account created for {} (badge {})", user.username, user.badge_number))
        }
        Command::Discord(sub) => execute_discord(app, sub).await,
        Command::Profile(sub) => execute_profile(app, sub),
        Command::ShiftLog(ShiftLogCommand::Submit {
            file,
            with_officers,
        }) => {
            let raw = fs::read_to_string(file)
                .map_err(|e| format!("failed to read {}: {e}", file.display()))?;
            let draft: ShiftLogDraft = serde_json::from_str(&raw)
                .map_err(|e| format!("invalid shift log file {}: {e}", file.display()))?;
            let mut form = ShiftLogForm::seeded(app.store()).map_err(describe_storage)?;
            form.shift_date = draft.shift_date;
            form.start_time = draft.start_time;
            form.end_time = draft.end_time;
            form.patrol_area = draft.patrol_area;
            form.notes = draft.notes;
            for officer in draft.officers {
                form.add_officer(officer);
            }
            if !with_officers.is_empty() {
                let saved = app.store().saved_officers().map_err(describe_storage)?;
                for badge in with_officers {
                    let officer = saved
                        .iter()
                        .find(|o| o.badge == *badge)
                        .ok_or_else(|| format!("no saved officer with badge {badge}"))?;
                    form.add_saved_officer(officer);
                }
            }
            let record = form.submit(app).await.map_err(describe)?;
            Ok(format!(
                "shift log #{} submitted ({} officers)",
                record.id,
                record.entry.officers.len()
            ))
        }
    }
}

async fn execute_discord<T, S, N, V>(
    app: &ClientApp<T, S, N, V>,
    command: &DiscordCommand,
) -> Result<String, String>
where
    T: ApiTransport,
    S: KvStore,
    N: Notifier,
    V: Navigator,
{
    let discord = app.discord();
    match command {
        DiscordCommand::Url => {
            let url = discord.initiate().await.map_err(describe)?;
            Ok(format!("open this URL to verify with Discord:\n{url}"))
        }
        DiscordCommand::Callback { url } => {
            match discord.handle_callback(url).await.map_err(describe)? {
                VerificationState::Verified(identity) => {
                    Ok(format!("verified as {}", identity.display_tag()))
                }
                VerificationState::Failed(reason) => {
                    discord.settle_failure().await;
                    Err(reason.message())
                }
                other => Err(format!("verification is {}", other.label())),
            }
        }
        DiscordCommand::Status => match discord.refresh_status().await.map_err(describe)? {
            VerificationState::Verified(identity) => {
                Ok(format!("verified as {}", identity.display_tag()))
            }
            other => Ok(other.label().to_string()),
        },
        DiscordCommand::Disconnect => {
            discord.disconnect().await.map_err(describe)?;
            Ok("Discord disconnected".to_string())
        }
    }
}

fn execute_profile<T, S, N, V>(
    app: &ClientApp<T, S, N, V>,
    command: &ProfileCommand,
) -> Result<String, String>
where
    T: ApiTransport,
    S: KvStore,
    N: Notifier,
    V: Navigator,
{
    let store = app.store();
    match command {
        ProfileCommand::Show => {
            let profile = store.officer_profile().map_err(describe_storage)?;
            let saved = store.saved_officers().map_err(describe_storage)?;
            serde_json::to_string_pretty(&json!({
                "officerProfile": profile,
                "savedOfficerList": saved,
            }))
            .map_err(|e| e.to_string())
        }
        ProfileCommand::Save {
            badge,
            name,
            rank,
            callsign,
            discord_id,
            add_to_list,
        } => {
            let profile = OfficerProfile {
                badge: badge.trim().to_string(),
                name: name.trim().to_string(),
                rank: rank.trim().to_string(),
                discord_id: discord_id.clone().filter(|id| !id.trim().is_empty()),
                callsign: callsign.trim().to_string(),
            };
            let profiles = app.profiles();
            profiles.save_profile(&profile).map_err(describe)?;
            if *add_to_list {
                profiles.save_to_officer_list(&profile).map_err(describe)?;
            }
            Ok("OK".to_string())
        }
        ProfileCommand::Forget { badge } => {
            if app
                .profiles()
                .remove_from_officer_list(badge)
                .map_err(describe_storage)?
            {
                Ok("OK".to_string())
            } else {
                Err(format!("no saved officer with badge {badge}"))
            }
        }
    }
}

/// Keeps the server session for the next invocation. A jar without cookies clears the key.
pub fn persist_session_cookie<S: KvStore>(
    store: &ClientStore<S>,
    cookie_header: Option<&str>,
) -> Result<(), String> {
    match cookie_header {
        Some(cookie) => {
            store
                .put_session_cookie(cookie)
                .map_err(|e| format!("failed to store session: {e}"))?;
            debug!("session cookie persisted");
        }
        None => {
            let cleared = store
                .clear_session_cookie()
                .map_err(|e| format!("failed to clear session: {e}"))?;
            debug!(cleared, "no session cookie to keep");
        }
    }
    Ok(())
}

fn require_password(secrets: &Secrets) -> Result<String, String> {
    secrets
        .password
        .clone()
        .ok_or_else(|| "missing password input".to_string())
}

fn describe(err: ClientError) -> String {
    match err.field_errors() {
        Some(errors) => {
            let mut lines = vec!["invalid input:".to_string()];
            lines.extend(errors.iter().map(|v| format!("  {v}")));
            lines.join("\n")
        }
        None => err.to_string(),
    }
}

fn describe_storage(err: StorageError) -> String {
    describe(ClientError::Storage(err))
}
