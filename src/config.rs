//! Runtime configuration for the session core. Values are public knobs; do
//! not store secrets here.

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_LANDING_ROUTE: &str = "/";
const DEFAULT_REMEMBER_REQUESTED_ROUTE: bool = true;

const ENV_BASE_URL: &str = "PORDISTO_BASE_URL";
const ENV_TIMEOUT_MS: &str = "PORDISTO_TIMEOUT_MS";
const ENV_LANDING_ROUTE: &str = "PORDISTO_LANDING_ROUTE";
const ENV_MAX_MFA_ATTEMPTS: &str = "PORDISTO_MAX_MFA_ATTEMPTS";
const ENV_REMEMBER_REQUESTED_ROUTE: &str = "PORDISTO_REMEMBER_REQUESTED_ROUTE";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    base_url: String,
    timeout_ms: u64,
    landing_route: String,
    max_mfa_attempts: Option<u32>,
    remember_requested_route: bool,
}

impl AuthConfig {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        // Ensure the base URL does not have a trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        Self {
            base_url,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            landing_route: DEFAULT_LANDING_ROUTE.to_string(),
            max_mfa_attempts: None,
            remember_requested_route: DEFAULT_REMEMBER_REQUESTED_ROUTE,
        }
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Route authenticated operators land on when a guest-only page turns
    /// them away.
    #[must_use]
    pub fn with_landing_route(mut self, route: String) -> Self {
        self.landing_route = route;
        self
    }

    /// Caps failed login-phase verification attempts. `None` leaves retries
    /// unlimited; reaching the cap cancels the pending challenge.
    #[must_use]
    pub fn with_max_mfa_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_mfa_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_remember_requested_route(mut self, remember: bool) -> Self {
        self.remember_requested_route = remember;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    #[must_use]
    pub fn landing_route(&self) -> &str {
        &self.landing_route
    }

    #[must_use]
    pub fn max_mfa_attempts(&self) -> Option<u32> {
        self.max_mfa_attempts
    }

    #[must_use]
    pub fn remember_requested_route(&self) -> bool {
        self.remember_requested_route
    }

    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let base_url = std::env::var(ENV_BASE_URL)
            .ok()
            .and_then(|value| normalize_env_value(&value))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let mut config = Self::new(base_url);
        if let Some(timeout_ms) = parse_env::<u64>(ENV_TIMEOUT_MS) {
            config = config.with_timeout_ms(timeout_ms);
        }
        if let Some(route) = std::env::var(ENV_LANDING_ROUTE)
            .ok()
            .and_then(|value| normalize_env_value(&value))
        {
            config = config.with_landing_route(route);
        }
        if let Some(attempts) = parse_env::<u32>(ENV_MAX_MFA_ATTEMPTS) {
            config = config.with_max_mfa_attempts(Some(attempts));
        }
        if let Some(remember) = parse_bool_env(ENV_REMEMBER_REQUESTED_ROUTE) {
            config = config.with_remember_requested_route(remember);
        }
        config
    }
}

fn normalize_env_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_bool_env(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|value| match value.trim() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::AuthConfig;

    #[test]
    fn defaults_and_overrides() {
        let config = AuthConfig::new("https://api.permesi.dev/".to_string());

        assert_eq!(config.base_url(), "https://api.permesi.dev");
        assert_eq!(config.timeout_ms(), super::DEFAULT_TIMEOUT_MS);
        assert_eq!(config.landing_route(), "/");
        assert_eq!(config.max_mfa_attempts(), None);
        assert!(config.remember_requested_route());

        let config = config
            .with_timeout_ms(2_500)
            .with_landing_route("/dashboard".to_string())
            .with_max_mfa_attempts(Some(3))
            .with_remember_requested_route(false);

        assert_eq!(config.timeout_ms(), 2_500);
        assert_eq!(config.landing_route(), "/dashboard");
        assert_eq!(config.max_mfa_attempts(), Some(3));
        assert!(!config.remember_requested_route());
    }

    #[test]
    fn from_env_reads_overrides() {
        temp_env::with_vars(
            [
                (super::ENV_BASE_URL, Some("https://api.test/ ")),
                (super::ENV_TIMEOUT_MS, Some("500")),
                (super::ENV_MAX_MFA_ATTEMPTS, Some("5")),
                (super::ENV_REMEMBER_REQUESTED_ROUTE, Some("no")),
            ],
            || {
                let config = AuthConfig::from_env();
                assert_eq!(config.base_url(), "https://api.test");
                assert_eq!(config.timeout_ms(), 500);
                assert_eq!(config.max_mfa_attempts(), Some(5));
                assert!(!config.remember_requested_route());
            },
        );
    }

    #[test]
    fn from_env_ignores_empty_and_invalid_values() {
        temp_env::with_vars(
            [
                (super::ENV_BASE_URL, Some("   ")),
                (super::ENV_TIMEOUT_MS, Some("soon")),
                (super::ENV_REMEMBER_REQUESTED_ROUTE, Some("maybe")),
            ],
            || {
                let config = AuthConfig::from_env();
                assert_eq!(config.base_url(), super::DEFAULT_BASE_URL);
                assert_eq!(config.timeout_ms(), super::DEFAULT_TIMEOUT_MS);
                assert!(config.remember_requested_route());
            },
        );
    }
}
