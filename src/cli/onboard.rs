use crate::auth::{Identity, UserMetadata};
use crate::cli::accounts::create_account;
use crate::config::{AUTH_API_KEY_ENV, Config, IdentityBackendKind, expand_home, parse_hhmm};
use crate::db::Database;
use crate::model::Role;
use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, Password, Select, theme::ColorfulTheme};

pub async fn run_onboarding() -> Result<Config> {
    println!("──────────────────────────────────────────");
    println!("  Welcome to TaskPulse onboarding.");
    println!("──────────────────────────────────────────");

    let theme = ColorfulTheme::default();
    let defaults = Config::default();

    println!("\n[1/5] Identity provider");
    let providers = ["Local accounts (stored in SQLite)", "Hosted GoTrue service"];
    let provider_index = Select::with_theme(&theme)
        .with_prompt("  Where should accounts live?")
        .default(0)
        .items(&providers)
        .interact()
        .context("Failed to select identity provider")?;

    let identity_provider = if provider_index == 1 {
        IdentityBackendKind::Remote
    } else {
        IdentityBackendKind::Local
    };

    let (auth_base_url, auth_api_key) = if identity_provider == IdentityBackendKind::Remote {
        let base_url: String = Input::with_theme(&theme)
            .with_prompt("  Identity service URL")
            .default(defaults.auth_base_url.clone())
            .validate_with(|input: &String| -> std::result::Result<(), &str> {
                url::Url::parse(input.trim())
                    .map(|_| ())
                    .map_err(|_| "Enter a full URL (example: https://project.example.co)")
            })
            .interact_text()
            .context("Failed to read identity service URL")?;

        println!("  Leave empty to use the {AUTH_API_KEY_ENV} environment variable.");
        let key = Password::with_theme(&theme)
            .with_prompt("  Service API key")
            .allow_empty_password(true)
            .interact()
            .context("Failed to read API key")?;

        (base_url.trim().to_string(), Some(key).filter(|k| !k.trim().is_empty()))
    } else {
        (defaults.auth_base_url.clone(), None)
    };
    println!("  ✓ Provider: {}", providers[provider_index]);

    println!("\n[2/5] Database location");
    let db_input: String = Input::with_theme(&theme)
        .with_prompt("  SQLite file")
        .default(defaults.db_path.display().to_string())
        .interact_text()
        .context("Failed to read database path")?;
    let db_path = expand_home(&db_input);
    println!("  ✓ {}", db_path.display());

    println!("\n[3/5] API port");
    let api_port: u16 = Input::with_theme(&theme)
        .with_prompt("  Local port for the dashboard API")
        .default(defaults.api_port)
        .interact_text()
        .context("Failed to read API port")?;

    println!("\n[4/5] Nightly rollup time");
    let rollup_time: String = Input::with_theme(&theme)
        .with_prompt("  Time to write daily summaries")
        .default(defaults.rollup_time.clone())
        .validate_with(|input: &String| -> std::result::Result<(), &str> {
            parse_hhmm(input)
                .map(|_| ())
                .map_err(|_| "Use HH:MM format (example: 23:55)")
        })
        .interact_text()
        .context("Failed to read rollup time")?;
    println!("  ✓ Summaries will be written daily at {rollup_time}");

    let config = Config {
        db_path,
        api_port,
        rollup_time,
        identity_provider,
        auth_base_url,
        auth_api_key,
        ..defaults
    };

    config.ensure_bootstrap_files()?;
    config.save()?;

    let catalog = config.load_core_tasks()?;
    let synced = Database::open(&config.db_path)?.sync_core_tasks(&catalog.tasks)?;
    println!("  ✓ Loaded {synced} core task(s) from {}", config.core_tasks_path.display());

    println!("\n[5/5] First admin account");
    let create_admin = Confirm::with_theme(&theme)
        .with_prompt("  Create an admin account now?")
        .default(true)
        .interact()
        .context("Failed to read admin prompt input")?;

    if create_admin {
        let email: String = Input::with_theme(&theme)
            .with_prompt("  Admin email")
            .interact_text()
            .context("Failed to read admin email")?;
        let full_name: String = Input::with_theme(&theme)
            .with_prompt("  Full name")
            .interact_text()
            .context("Failed to read admin name")?;
        let password = Password::with_theme(&theme)
            .with_prompt("  Password")
            .with_confirmation("  Repeat password", "Passwords do not match")
            .interact()
            .context("Failed to read admin password")?;

        let identity = Identity::from_config(&config)?;
        let created = create_account(
            &config,
            &identity,
            &email,
            &password,
            UserMetadata {
                full_name,
                role: Role::Admin,
            },
        )
        .await?;

        println!("  ✓ Admin created: {}", created.profile.email);
        if created.confirmation_required {
            println!("  ! Confirm the email address before signing in");
        }
    } else {
        println!("  ✓ Skipped. Run `taskpulse user create --role admin` later");
    }

    println!("\n──────────────────────────────────────────");
    println!("  Onboarding complete!");
    println!("  Run `taskpulse service` to start the dashboard API.");
    println!("──────────────────────────────────────────");

    Ok(config)
}
