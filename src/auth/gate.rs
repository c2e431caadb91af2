use crate::config::AuthFailurePolicy;

pub const LOGIN_PATH: &str = "/auth/login";
pub const SIGN_UP_PATH: &str = "/auth/sign-up";
pub const DASHBOARD_PATH: &str = "/dashboard";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityCheck {
    Authenticated,
    Anonymous,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    RedirectToLogin,
    RedirectToDashboard,
}

pub fn is_public_path(path: &str) -> bool {
    path == "/" || path.starts_with("/auth/")
}

pub fn is_auth_page(path: &str) -> bool {
    path == LOGIN_PATH || path == SIGN_UP_PATH
}

pub fn needs_identity_check(path: &str, is_page_request: bool) -> bool {
    !is_public_path(path) || (is_page_request && is_auth_page(path))
}

pub fn decide(
    path: &str,
    is_page_request: bool,
    check: IdentityCheck,
    policy: AuthFailurePolicy,
) -> GateDecision {
    if is_public_path(path) {
        return if is_page_request && is_auth_page(path) && check == IdentityCheck::Authenticated {
            GateDecision::RedirectToDashboard
        } else {
            GateDecision::Pass
        };
    }

    match (check, policy) {
        (IdentityCheck::Authenticated, _) => GateDecision::Pass,
        (IdentityCheck::Anonymous, _) => GateDecision::RedirectToLogin,
        (IdentityCheck::Failed, AuthFailurePolicy::Deny) => GateDecision::RedirectToLogin,
        (IdentityCheck::Failed, AuthFailurePolicy::Allow) => GateDecision::Pass,
    }
}
