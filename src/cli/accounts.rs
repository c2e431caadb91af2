use crate::auth::messages::sign_up_message;
use crate::auth::{Identity, UserMetadata};
use crate::config::Config;
use crate::db::{Database, ProfileRow};
use anyhow::{Result, anyhow};
use tracing::info;

#[derive(Debug)]
pub struct CreatedAccount {
    pub profile: ProfileRow,
    pub confirmation_required: bool,
}

pub async fn create_account(
    config: &Config,
    identity: &Identity,
    email: &str,
    password: &str,
    metadata: UserMetadata,
) -> Result<CreatedAccount> {
    let registration = identity
        .register(email, password, metadata)
        .await
        .map_err(|error| anyhow!(sign_up_message(&error)))?;
    let user = registration.user;
    let confirmation_required = registration.confirmation_required;

    let profile = Database::open(&config.db_path)?.ensure_profile(&user.to_profile())?;
    info!(user_id = %profile.id, role = profile.role.as_str(), "account created");

    Ok(CreatedAccount {
        profile,
        confirmation_required,
    })
}
