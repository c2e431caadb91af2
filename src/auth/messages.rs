use crate::auth::AuthError;

pub const UNCONFIRMED_EMAIL_MESSAGE: &str = "Please confirm your email address before signing in. Check your inbox for the confirmation link.";
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid email or password. Please try again.";
pub const RESEND_FALLBACK_MESSAGE: &str = "Failed to resend email";

pub fn sign_in_message(error: &AuthError) -> String {
    match error {
        AuthError::EmailNotConfirmed => UNCONFIRMED_EMAIL_MESSAGE.to_string(),
        AuthError::InvalidCredentials => INVALID_CREDENTIALS_MESSAGE.to_string(),
        other => {
            let raw = other.to_string();
            if raw.contains("Email not confirmed") {
                UNCONFIRMED_EMAIL_MESSAGE.to_string()
            } else if raw.contains("Invalid login credentials") {
                INVALID_CREDENTIALS_MESSAGE.to_string()
            } else {
                raw
            }
        }
    }
}

pub fn sign_up_message(error: &AuthError) -> String {
    error.to_string()
}

pub fn resend_message(error: &AuthError) -> String {
    let raw = error.to_string();
    if raw.trim().is_empty() {
        RESEND_FALLBACK_MESSAGE.to_string()
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::{
        INVALID_CREDENTIALS_MESSAGE, RESEND_FALLBACK_MESSAGE, UNCONFIRMED_EMAIL_MESSAGE,
        resend_message, sign_in_message,
    };
    use crate::auth::AuthError;

    #[test]
    fn sign_in_failures_map_to_three_messages() {
        assert_eq!(
            sign_in_message(&AuthError::EmailNotConfirmed),
            UNCONFIRMED_EMAIL_MESSAGE
        );
        assert_eq!(
            sign_in_message(&AuthError::InvalidCredentials),
            INVALID_CREDENTIALS_MESSAGE
        );
        assert_eq!(
            sign_in_message(&AuthError::Rejected("Email not confirmed yet".to_string())),
            UNCONFIRMED_EMAIL_MESSAGE
        );
        assert_eq!(
            sign_in_message(&AuthError::Rejected("Too many requests".to_string())),
            "Too many requests"
        );
    }

    #[test]
    fn resend_falls_back_when_provider_gives_no_text() {
        assert_eq!(
            resend_message(&AuthError::Rejected("  ".to_string())),
            RESEND_FALLBACK_MESSAGE
        );
        assert_eq!(
            resend_message(&AuthError::Rejected("Rate limited".to_string())),
            "Rate limited"
        );
    }
}
