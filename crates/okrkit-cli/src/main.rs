//! okrkit - command line access to the objectives API.
//!
//! Credentials live in the OS keychain between runs, so `okrkit login` once
//! and every later command is authenticated. Expired access tokens are
//! refreshed transparently.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use okrkit_core::api::{ApiClient, AuthService, OkrApi, RequestOptions};
use okrkit_core::auth::{CredentialStore, KeyringStorage, Navigator};
use okrkit_core::cache::{self, ResponseCache};
use okrkit_core::config::{Config, APP_NAME, ENV_API_BASE, ENV_LOCALE};
use okrkit_core::models::Objective;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "\
Usage: okrkit <command> [args]

Commands:
  login [email]                      Sign in and store credentials
  register <email> <full name>       Create an account
  logout                             Sign out and forget credentials
  me                                 Show the signed-in user
  objectives                         List objectives
  objective <id>                     Show one objective
  key-results <objective id>         List key results of an objective
  duplicate-objective <id>           Copy an objective
  move-objective <id> [--team <id>] [--workspace <id>]
  delete-objective <id>              Delete an objective
  delete-key-result <id>             Delete a key result
  get <path>                         Authenticated GET, prints raw JSON

Environment:
  OKRKIT_API_BASE, OKRKIT_LOCALE override the config file.
  RUST_LOG controls log output (default: warn).";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

struct Services {
    auth: AuthService,
    okr: OkrApi,
    api: ApiClient,
}

impl Services {
    fn new(config: &Config) -> Result<Self> {
        let storage = Arc::new(KeyringStorage::new(APP_NAME));
        let credentials = CredentialStore::restore(storage);

        let navigator: Arc<dyn Navigator> = Arc::new(|| {
            eprintln!("Session expired. Run `okrkit login` to sign in again.");
        });
        let api = ApiClient::new(config, credentials)
            .context("Failed to create API client")?
            .with_navigator(navigator);

        cache::init(ResponseCache::new().with_default_ttl(config.cache_ttl()));
        let response_cache = cache::global().clone();

        Ok(Self {
            auth: AuthService::new(api.clone(), response_cache.clone()),
            okr: OkrApi::new(api.clone(), response_cache),
            api,
        })
    }
}

fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            let mut config = Config::default();
            config.apply_overrides(std::env::var(ENV_API_BASE).ok(), std::env::var(ENV_LOCALE).ok());
            config
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{}", USAGE);
        return Ok(());
    };
    if matches!(command, "-h" | "--help" | "help") {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = load_config();
    debug!(api_base = %config.api_base, locale = %config.locale, "Config loaded");
    let services = Services::new(&config)?;

    match command {
        "login" => login(&services, &mut config, args.get(1)).await,
        "register" => register(&services, &args[1..]).await,
        "logout" => {
            services.auth.logout().await;
            println!("Signed out.");
            Ok(())
        }
        "me" => {
            let user = services.auth.me().await?;
            println!("{} <{}>", user.display_name(), user.email);
            Ok(())
        }
        "objectives" => {
            let objectives = services.okr.list_objectives().await?;
            if objectives.is_empty() {
                println!("No objectives.");
            }
            for objective in &objectives {
                print_objective(objective);
            }
            Ok(())
        }
        "objective" => {
            let id = required(&args, 1, "objective id")?;
            print_objective(&services.okr.get_objective(id).await?);
            Ok(())
        }
        "key-results" => {
            let id = required(&args, 1, "objective id")?;
            for kr in services.okr.list_key_results(id).await? {
                let completion = kr
                    .completion()
                    .map(|c| format!("{:.0}%", c))
                    .unwrap_or_else(|| "-".to_string());
                println!("{:<38} {:>5}  {}", kr.id, completion, kr.title);
            }
            Ok(())
        }
        "duplicate-objective" => {
            let id = required(&args, 1, "objective id")?;
            let copy = services.okr.duplicate_objective(id).await?;
            println!("Created {}", copy.id);
            Ok(())
        }
        "move-objective" => {
            let id = required(&args, 1, "objective id")?;
            let team = flag_value(&args, "--team");
            let workspace = flag_value(&args, "--workspace");
            if team.is_none() && workspace.is_none() {
                bail!("move-objective needs --team and/or --workspace");
            }
            let moved = services.okr.move_objective(id, team, workspace).await?;
            print_objective(&moved);
            Ok(())
        }
        "delete-objective" => {
            let id = required(&args, 1, "objective id")?;
            services.okr.delete_objective(id).await?;
            println!("Deleted objective {}", id);
            Ok(())
        }
        "delete-key-result" => {
            let id = required(&args, 1, "key result id")?;
            services.okr.delete_key_result(id).await?;
            println!("Deleted key result {}", id);
            Ok(())
        }
        "get" => {
            let path = required(&args, 1, "path")?;
            let value = services.api.request(path, RequestOptions::get()).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        other => {
            eprintln!("{}", USAGE);
            bail!("Unknown command: {}", other)
        }
    }
}

async fn login(services: &Services, config: &mut Config, email: Option<&String>) -> Result<()> {
    let email = match email.cloned().or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let password = rpassword::prompt_password(format!("Password for {}: ", email))
        .context("Failed to read password")?;

    services.auth.login(&email, &password).await?;
    info!(email = %email, "Login succeeded");

    config.last_email = Some(email.clone());
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
    println!("Signed in as {}", email);
    Ok(())
}

async fn register(services: &Services, args: &[String]) -> Result<()> {
    let (email, full_name) = match args {
        [email, name @ ..] if !name.is_empty() => (email.clone(), name.join(" ")),
        _ => bail!("register needs <email> <full name>"),
    };
    let password = rpassword::prompt_password("Choose a password: ")
        .context("Failed to read password")?;

    let response = services.auth.register(&email, &password, &full_name).await?;
    println!(
        "{}",
        response
            .message
            .unwrap_or_else(|| format!("Registered {}", email))
    );
    Ok(())
}

fn print_objective(objective: &Objective) {
    println!(
        "{:<38} {:>5}  {:<10} {}",
        objective.id,
        objective.progress_display(),
        objective.status.as_deref().unwrap_or("-"),
        objective.title
    );
}

fn required<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .filter(|value| !value.starts_with("--"))
        .with_context(|| format!("Missing {}", what))
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let value = line.trim().to_string();
    if value.is_empty() {
        bail!("No input given");
    }
    Ok(value)
}
