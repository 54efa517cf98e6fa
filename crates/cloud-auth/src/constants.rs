//! Login endpoint and token timing defaults

/// Login exchange path, relative to `{base_url}{api_suffix}`
pub const LOGIN_PATH: &str = "/iam/v2/auth/personal_access_token";

/// Default API suffix appended to the base URL
pub const DEFAULT_API_SUFFIX: &str = "/api";

/// Seconds before `exp` at which a cached token is treated as stale
pub const DEFAULT_REFRESH_MARGIN_SECS: u64 = 60;

/// Lifetime assumed when the token carries no `exp` claim
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 300;
