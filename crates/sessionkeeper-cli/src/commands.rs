//! Command parsing and execution.

use std::io::{self, Write};

use anyhow::{bail, Result};
use chrono::Local;
use tracing::debug;

use sessionkeeper_core::{AuthError, SessionManager, SessionState};

pub const USAGE: &str = "\
Usage: sessionkeeper <command>

Commands:
  login [email]              Log in and persist the session
  register [email] [role]    Create an account (role defaults to viewer)
  logout                     End the session, locally and on the server
  status                     Validate the persisted session and print it
  watch                      Keep the session alive, printing every change
  help                       Show this message

Environment:
  SESSIONKEEPER_API_URL      Auth service base URL
  SESSIONKEEPER_STORAGE      file | keyring
  SESSIONKEEPER_LOG_DIR      Also write logs to a daily file in this directory
  RUST_LOG                   Log filter (default: warn)";

/// Role assigned by the server when none is given
const DEFAULT_ROLE: &str = "viewer";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Login { email: Option<String> },
    Register { email: Option<String>, role: String },
    Logout,
    Status,
    Watch,
    Help,
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut args = args.iter().map(String::as_str);
        let command = match args.next() {
            None | Some("help") | Some("--help") | Some("-h") => Command::Help,
            Some("login") => Command::Login {
                email: args.next().map(str::to_string),
            },
            Some("register") => Command::Register {
                email: args.next().map(str::to_string),
                role: args.next().unwrap_or(DEFAULT_ROLE).to_string(),
            },
            Some("logout") => Command::Logout,
            Some("status") => Command::Status,
            Some("watch") => Command::Watch,
            Some(other) => bail!("Unknown command '{}'", other),
        };
        if let Some(extra) = args.next() {
            bail!("Unexpected argument '{}'", extra);
        }
        Ok(command)
    }
}

pub async fn run(command: Command, manager: &SessionManager) -> Result<()> {
    match command {
        Command::Login { email } => {
            let email = match email {
                Some(email) => email,
                None => prompt_email()?,
            };
            let password = prompt_password()?;
            println!("\nAuthenticating...");
            match manager.login(&email, &password).await {
                Ok(user) => println!("Logged in as {} ({})", user.email, user.role),
                Err(e) => return Err(login_failure(e)),
            }
        }
        Command::Register { email, role } => {
            let email = match email {
                Some(email) => email,
                None => prompt_email()?,
            };
            let password = prompt_password()?;
            println!("\nRegistering...");
            match manager.register(&email, &password, &role).await {
                Ok(user) => println!("Registered and logged in as {} ({})", user.email, user.role),
                Err(e) => return Err(login_failure(e)),
            }
        }
        Command::Logout => {
            manager.logout().await;
            println!("Logged out");
        }
        Command::Status => {
            let state = manager.initialize().await;
            print_state(&state, manager)?;
        }
        Command::Watch => watch(manager).await?,
        Command::Help => println!("{}", USAGE),
    }
    Ok(())
}

async fn watch(manager: &SessionManager) -> Result<()> {
    // The listener holds a handle to the manager; unsubscribing breaks the
    // cycle so dropping the manager still cancels its refresh timer
    let observer = manager.clone();
    let subscription = manager.subscribe(move |state| {
        let next = observer
            .next_refresh_at()
            .map(|at| format!(", next refresh {}", at.format("%H:%M:%S")))
            .unwrap_or_default();
        println!("[{}] {}{}", Local::now().format("%H:%M:%S"), describe(state), next);
    });

    let result = watch_until_interrupted(manager).await;
    manager.unsubscribe(subscription);
    result
}

async fn watch_until_interrupted(manager: &SessionManager) -> Result<()> {
    let state = manager.initialize().await;
    if !state.is_authenticated() {
        bail!("No active session. Run `sessionkeeper login` first.");
    }
    println!("{}", describe(&state));
    if let Some(at) = manager.next_refresh_at() {
        println!("Next refresh at {}", at.to_rfc3339());
    }
    println!("Watching session; press Ctrl-C to stop.");

    tokio::signal::ctrl_c().await?;
    debug!("Interrupted");
    Ok(())
}

fn print_state(state: &SessionState, manager: &SessionManager) -> Result<()> {
    let mut json = serde_json::to_value(state)?;
    if let (Some(at), Some(object)) = (manager.next_refresh_at(), json.as_object_mut()) {
        object.insert("next_refresh_at".to_string(), at.to_rfc3339().into());
    }
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn describe(state: &SessionState) -> String {
    match state {
        SessionState::Authenticated { user, .. } => {
            format!("authenticated as {} ({})", user.email, user.role)
        }
        other => other.label().to_string(),
    }
}

/// Turn a login/register failure into the message shown to the user
fn login_failure(error: AuthError) -> anyhow::Error {
    match error {
        AuthError::Credentials(message) => anyhow::anyhow!(message),
        AuthError::Network(message) => anyhow::anyhow!(
            "Unable to reach the auth service ({}). Check the URL and your connection.",
            message
        ),
        other => other.into(),
    }
}

fn prompt_email() -> Result<String> {
    print!("Email: ");
    io::stdout().flush()?;

    let mut email = String::new();
    io::stdin().read_line(&mut email)?;
    let email = email.trim().to_string();
    if email.is_empty() {
        bail!("Email required");
    }
    Ok(email)
}

fn prompt_password() -> Result<String> {
    let password = rpassword::prompt_password("Password: ")?;
    if password.is_empty() {
        bail!("Password required");
    }
    Ok(password)
}
