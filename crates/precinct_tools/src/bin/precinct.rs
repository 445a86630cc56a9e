#![forbid(unsafe_code)]

use std::io::{self, IsTerminal, Read};

use clap::Parser;
use precinct_engines::UreqTransport;
use precinct_os::{ClientApp, ClientConfig, LoggingNavigator};
use precinct_storage::{ClientStore, FileKvStore};
use precinct_tools::cli::{
    execute_command, persist_session_cookie, Cli, CliNotifier, Command, Secrets,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    if let Err(err) = run(cli) {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();
}

fn run(cli: Cli) -> Result<(), String> {
    let config = ClientConfig::from_env();
    let kv = FileKvStore::for_path(config.store_path.clone());
    let cookie = ClientStore::new(kv.clone())
        .session_cookie()
        .map_err(|e| format!("failed to read session: {e}"))?;
    let transport = UreqTransport::new(&config.transport)
        .map_err(|e| e.to_string())?
        .with_cookie_header(cookie.as_deref());
    let secrets = read_secrets(&cli.command)?;

    let app = ClientApp::new(transport, kv, CliNotifier::for_quiet(cli.quiet), LoggingNavigator)
        .with_policies(config.query, config.mutation);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| format!("failed to start runtime: {e}"))?;
    let outcome = runtime.block_on(execute_command(&app, &cli.command, &secrets));

    if matches!(cli.command, Command::Logout) && outcome.is_ok() {
        app.transport().clear_cookies();
    }
    persist_session_cookie(app.store(), app.transport().cookie_header().as_deref())?;

    let output = outcome?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn read_secrets(command: &Command) -> Result<Secrets, String> {
    if !command.needs_password() {
        return Ok(Secrets::default());
    }
    if io::stdin().is_terminal() {
        let password = prompt_secret("Password:")?;
        let confirm_password = if command.needs_confirmation() {
            Some(prompt_secret("Confirm password:")?)
        } else {
            None
        };
        return Ok(Secrets {
            password: Some(password),
            confirm_password,
        });
    }
    // Piped input: first line is the password, an optional second line the confirmation.
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| e.to_string())?;
    let mut lines = input.lines();
    let password = lines
        .next()
        .map(str::to_string)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| "password must not be empty".to_string())?;
    Ok(Secrets {
        password: Some(password),
        confirm_password: lines.next().map(str::to_string),
    })
}

fn prompt_secret(prompt: &str) -> Result<String, String> {
    let value = rpassword::prompt_password(prompt).map_err(|e| e.to_string())?;
    if value.is_empty() {
        return Err("password must not be empty".to_string());
    }
    Ok(value)
}
