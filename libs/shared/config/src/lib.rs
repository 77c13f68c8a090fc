use std::env;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_MAX_SERVICES: usize = 3;
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_RESOLVER_TIMEOUT_SECONDS: u64 = 10;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub max_services_per_booking: usize,
    pub request_timeout_seconds: u64,
    pub resolver_timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            max_services_per_booking: DEFAULT_MAX_SERVICES,
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            resolver_timeout_seconds: DEFAULT_RESOLVER_TIMEOUT_SECONDS,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            max_services_per_booking: parse_or_default("BOOKING_MAX_SERVICES", DEFAULT_MAX_SERVICES),
            request_timeout_seconds: parse_or_default(
                "BOOKING_REQUEST_TIMEOUT_SECONDS",
                DEFAULT_REQUEST_TIMEOUT_SECONDS,
            ),
            resolver_timeout_seconds: parse_or_default(
                "BOOKING_RESOLVER_TIMEOUT_SECONDS",
                DEFAULT_RESOLVER_TIMEOUT_SECONDS,
            ),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }
}

fn parse_or_default<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
