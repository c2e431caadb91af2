mod api;
mod auth;
mod cli;
mod config;
mod dashboard;
mod db;
mod metrics;
mod model;
mod scheduler;

use crate::auth::{AuthEvent, Identity, UserMetadata};
use crate::cli::accounts::create_account;
use crate::cli::onboard::run_onboarding;
use crate::cli::{Cli, Commands, ConfigCommands, TaskCommands, UserCommands};
use crate::config::{Config, IdentityBackendKind};
use crate::db::Database;
use crate::metrics::rollup::rollup_day;
use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use clap::Parser;
use dialoguer::Password;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Onboard => {
            let _ = run_onboarding().await?;
            Ok(())
        }
        Commands::Config { command } => handle_config_command(command),
        Commands::Service => {
            let config = load_config()?;
            run_service(config).await
        }
        Commands::Status => handle_status(),
        Commands::Doctor => handle_doctor(),
        Commands::Rollup { date } => handle_rollup(date),
        Commands::User { command } => handle_user_command(command).await,
        Commands::Tasks { command } => handle_tasks_command(command),
    }
}

fn handle_config_command(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Set { key, value } => {
            let mut config = load_or_default_config()?;
            config.set_value(&key, &value)?;
            config.ensure_bootstrap_files()?;
            config.save()?;

            let masked = if key.contains("api_key") {
                "***hidden***".to_string()
            } else {
                value
            };
            println!("Config saved: {key} = {masked}");
            Ok(())
        }
        ConfigCommands::Get { key } => {
            let config = load_config()?;
            let value = config
                .get_value(&key)
                .with_context(|| format!("Unsupported config key: {key}"))?;

            println!("{value}");
            Ok(())
        }
    }
}

fn handle_status() -> Result<()> {
    let config = load_config()?;
    let database = Database::open(&config.db_path)?;
    let profiles = database.list_profiles()?;
    let active = profiles.iter().filter(|profile| profile.is_active).count();

    println!("TaskPulse status");
    println!("- api: http://127.0.0.1:{}", config.api_port);
    println!("- api_running: {}", is_port_open(config.api_port));
    println!("- identity_provider: {:?}", config.identity_provider);
    println!("- users: {} ({} active)", profiles.len(), active);
    println!("- core_tasks: {}", database.core_tasks()?.len());
    println!("- rollup_time: {}", config.rollup_time);
    println!(
        "- latest_summary_date: {}",
        database
            .latest_summary_date()?
            .unwrap_or_else(|| "none".to_string())
    );

    Ok(())
}

fn handle_doctor() -> Result<()> {
    let config_path = Config::config_path()?;
    let mut issues = Vec::new();

    if config_path.exists() {
        println!("[OK] config.json found: {}", config_path.display());
    } else {
        println!("[WARN] config.json not found: {}", config_path.display());
        issues.push("config missing".to_string());
    }

    let config = load_or_default_config()?;

    match Database::open(&config.db_path) {
        Ok(database) => {
            println!("[OK] SQLite reachable: {}", config.db_path.display());
            match database.list_profiles() {
                Ok(profiles) if profiles.iter().any(|p| p.role.is_admin() && p.is_active) => {
                    println!("[OK] active admin account present");
                }
                Ok(_) => {
                    println!("[WARN] no active admin. Run `taskpulse user create --role admin`");
                    issues.push("no admin".to_string());
                }
                Err(error) => {
                    println!("[WARN] profile lookup failed: {error}");
                    issues.push("profiles unreadable".to_string());
                }
            }
        }
        Err(error) => {
            println!("[WARN] SQLite check failed: {error}");
            issues.push("db unreachable".to_string());
        }
    }

    match config.load_core_tasks() {
        Ok(catalog) => println!(
            "[OK] core task catalog valid: {} task(s) in {}",
            catalog.tasks.len(),
            config.core_tasks_path.display()
        ),
        Err(error) => {
            println!("[WARN] core task catalog invalid: {error:#}");
            issues.push("catalog invalid".to_string());
        }
    }

    if let Err(error) = config.parse_rollup_time() {
        println!("[WARN] invalid rollup_time setting: {error}");
        issues.push("invalid rollup_time".to_string());
    } else {
        println!("[OK] rollup_time format valid: {}", config.rollup_time);
    }

    if config.identity_provider == IdentityBackendKind::Remote {
        if config.resolved_auth_api_key().is_some() {
            println!("[OK] identity service API key is configured");
        } else {
            println!("[WARN] remote identity selected but API key is missing");
            issues.push("auth api key missing".to_string());
        }
        if let Err(error) = Identity::from_config(&config) {
            println!("[WARN] identity service settings invalid: {error}");
            issues.push("auth settings invalid".to_string());
        }
    } else {
        println!("[OK] local identity provider");
    }

    if issues.is_empty() {
        println!("doctor result: no issues");
    } else {
        println!("doctor result: {} warning(s)", issues.len());
    }

    Ok(())
}

fn handle_rollup(date: Option<String>) -> Result<()> {
    let config = load_config()?;
    let target_date = parse_optional_date(date)?;

    let outcome = rollup_day(
        &Database::open(&config.db_path)?,
        target_date,
        config.target_minutes,
    )?;
    println!(
        "Rollup {}: {} summary row(s) written, {} user(s) without logged time",
        outcome.date, outcome.written, outcome.skipped
    );

    Ok(())
}

async fn handle_user_command(command: UserCommands) -> Result<()> {
    let config = load_config()?;

    match command {
        UserCommands::Create {
            email,
            name,
            role,
            password,
        } => {
            let password = match password {
                Some(value) => value,
                None => Password::new()
                    .with_prompt("Password")
                    .with_confirmation("Repeat password", "Passwords do not match")
                    .interact()
                    .context("Failed to read password")?,
            };

            let identity = Identity::from_config(&config)?;
            let created = create_account(
                &config,
                &identity,
                &email,
                &password,
                UserMetadata {
                    full_name: name,
                    role: role.into(),
                },
            )
            .await?;

            println!(
                "User created: {} ({}, {})",
                created.profile.email,
                created.profile.id,
                created.profile.role.as_str()
            );
            if created.confirmation_required {
                println!("Email confirmation is pending for this account");
            }
            Ok(())
        }
        UserCommands::List => {
            let database = Database::open(&config.db_path)?;
            for profile in database.list_profiles()? {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    profile.id,
                    profile.full_name,
                    profile.email,
                    profile.role.as_str(),
                    if profile.is_active { "active" } else { "inactive" }
                );
            }
            Ok(())
        }
        UserCommands::Activate { id } => set_user_active(&config, &id, true),
        UserCommands::Deactivate { id } => set_user_active(&config, &id, false),
    }
}

fn set_user_active(config: &Config, id: &str, is_active: bool) -> Result<()> {
    let database = Database::open(&config.db_path)?;
    if !database.set_profile_active(id, is_active)? {
        bail!("No user with id {id}. Run `taskpulse user list` to see ids.");
    }

    println!(
        "User {id} {}",
        if is_active { "activated" } else { "deactivated" }
    );
    Ok(())
}

fn handle_tasks_command(command: TaskCommands) -> Result<()> {
    let config = load_config()?;

    match command {
        TaskCommands::List => {
            let database = Database::open(&config.db_path)?;
            for task in database.core_tasks()? {
                println!(
                    "{}\t{}\t{} min\t{}",
                    task.id, task.name, task.allocated_time, task.category
                );
            }
            Ok(())
        }
        TaskCommands::Sync => {
            let synced = sync_catalog(&config)?;
            println!(
                "Core tasks synced: {synced} from {}",
                config.core_tasks_path.display()
            );
            Ok(())
        }
    }
}

async fn run_service(config: Config) -> Result<()> {
    config.ensure_bootstrap_files()?;
    let synced = sync_catalog(&config)?;
    info!(count = synced, "core task catalog loaded");

    let identity = Identity::from_config(&config)?;
    let auth_events = identity.subscribe();

    let shared_config = Arc::new(config);
    let scheduler_config = Arc::clone(&shared_config);
    let scheduler_schedule_fallback = Arc::clone(&shared_config);
    let api_config = Arc::clone(&shared_config);

    info!(
        identity = identity.backend_name(),
        "TaskPulse service started"
    );

    tokio::select! {
        api_result = api::run_server(api_config, identity) => {
            api_result?;
        }
        scheduler_result = scheduler::run_daily_scheduler(move || {
            Config::load()
                .unwrap_or_else(|_| (*scheduler_schedule_fallback).clone())
                .parse_rollup_time()
        }, move |date| {
            let config = Arc::clone(&scheduler_config);
            async move {
                let runtime_config = Config::load().unwrap_or_else(|_| (*config).clone());
                let database = Database::open(&runtime_config.db_path)?;
                rollup_day(&database, date, runtime_config.target_minutes).map(|_| ())
            }
        }) => {
            scheduler_result?;
        }
        _ = log_auth_events(auth_events) => {}
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}

async fn log_auth_events(mut events: broadcast::Receiver<AuthEvent>) {
    loop {
        match events.recv().await {
            Ok(AuthEvent::SignedUp { user_id }) => info!(user_id = %user_id, "user signed up"),
            Ok(AuthEvent::SignedIn { user_id }) => info!(user_id = %user_id, "user signed in"),
            Ok(AuthEvent::SignedOut) => info!("user signed out"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "auth event log lagged"),
            Err(RecvError::Closed) => break,
        }
    }

    // Sender lives as long as the server; keep the select arm quiet if it ever drops.
    std::future::pending::<()>().await
}

fn sync_catalog(config: &Config) -> Result<usize> {
    let catalog = config.load_core_tasks()?;
    let mut database = Database::open(&config.db_path)?;
    database.sync_core_tasks(&catalog.tasks)
}

fn parse_optional_date(input: Option<String>) -> Result<NaiveDate> {
    input
        .as_deref()
        .map(|date| {
            NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .with_context(|| format!("Invalid date format: {date}. Example: 2026-03-10"))
        })
        .transpose()?
        .map_or_else(|| Ok(Local::now().date_naive()), Ok)
}

fn load_or_default_config() -> Result<Config> {
    Config::load().or_else(|_| {
        let config = Config::default();
        config.ensure_bootstrap_files()?;
        config.save()?;
        Ok(config)
    })
}

fn load_config() -> Result<Config> {
    Config::load()
        .with_context(|| "Config file not found. Run `taskpulse onboard` first.".to_string())
}

fn is_port_open(port: u16) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    TcpStream::connect_timeout(&addr, Duration::from_millis(250)).is_ok()
}
