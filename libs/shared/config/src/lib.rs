use std::env;
use std::str::FromStr;
use tracing::warn;

/// Which record store backend the API talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Supabase,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            "supabase" | "postgrest" => Ok(StoreBackend::Supabase),
            other => Err(format!("unknown store backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub server_port: u16,
    pub store_backend: StoreBackend,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub store_timeout_secs: u64,
    pub lock_wait_ms: u64,
    pub lock_ttl_secs: u64,
    pub consultation_horizon_days: i64,
    pub appointment_horizon_days: i64,
    pub bootstrap_admin_email: Option<String>,
    pub bootstrap_admin_password: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_hours: 24,
            server_port: 3000,
            store_backend: StoreBackend::Memory,
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            store_timeout_secs: 10,
            lock_wait_ms: 5_000,
            lock_ttl_secs: 30,
            consultation_horizon_days: 365,
            appointment_horizon_days: 365,
            bootstrap_admin_email: None,
            bootstrap_admin_password: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("JWT_SECRET not set, using empty value");
                    String::new()
                }),
            token_ttl_hours: parse_or("TOKEN_TTL_HOURS", defaults.token_ttl_hours),
            server_port: parse_or("SERVER_PORT", defaults.server_port),
            store_backend: parse_or("STORE_BACKEND", defaults.store_backend),
            supabase_url: env::var("SUPABASE_URL").unwrap_or_default(),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY").unwrap_or_default(),
            store_timeout_secs: parse_or("STORE_TIMEOUT_SECS", defaults.store_timeout_secs),
            lock_wait_ms: parse_or("LOCK_WAIT_MS", defaults.lock_wait_ms),
            lock_ttl_secs: parse_or("LOCK_TTL_SECS", defaults.lock_ttl_secs),
            consultation_horizon_days: parse_or(
                "CONSULTATION_HORIZON_DAYS",
                defaults.consultation_horizon_days,
            ),
            appointment_horizon_days: parse_or(
                "APPOINTMENT_HORIZON_DAYS",
                defaults.appointment_horizon_days,
            ),
            bootstrap_admin_email: env::var("BOOTSTRAP_ADMIN_EMAIL").ok(),
            bootstrap_admin_password: env::var("BOOTSTRAP_ADMIN_PASSWORD").ok(),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }
        if !config.lock_ttl_covers_store_round_trips() {
            warn!(
                "LOCK_TTL_SECS ({}) is below twice STORE_TIMEOUT_SECS ({}); a lease may expire mid-write",
                config.lock_ttl_secs, config.store_timeout_secs
            );
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        let store_ready = match self.store_backend {
            StoreBackend::Memory => true,
            StoreBackend::Supabase => self.is_supabase_configured(),
        };

        !self.jwt_secret.is_empty() && store_ready
    }

    pub fn is_supabase_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    /// A lease must outlive the check and the write it guards, each of which
    /// may take a full store timeout.
    pub fn lock_ttl_covers_store_round_trips(&self) -> bool {
        self.lock_ttl_secs >= self.store_timeout_secs.saturating_mul(2)
    }

    /// The administrator credentials to seed at startup, when both are set.
    pub fn bootstrap_admin(&self) -> Option<(&str, &str)> {
        let email = self.bootstrap_admin_email.as_deref().filter(|e| !e.is_empty())?;
        let password = self.bootstrap_admin_password.as_deref().filter(|p| !p.is_empty())?;
        Some((email, password))
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}
