use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub server: ServerConfig,
    #[serde(default)]
    pub mpesa: MpesaConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Seed the demo event catalog when the store starts empty.
    #[serde(default)]
    pub seed_demo_events: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MpesaConfig {
    /// Daraja API base, sandbox or production.
    pub base_url: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    /// Paybill / till number (BusinessShortCode).
    pub shortcode: String,
    pub passkey: String,
    /// Public URL the gateway posts STK callbacks to.
    pub callback_url: String,
    /// Dialing prefix for phone normalization.
    pub country_code: String,
}

impl Default for MpesaConfig {
    fn default() -> Self {
        Self {
            base_url: "https://sandbox.safaricom.co.ke".to_string(),
            consumer_key: String::new(),
            consumer_secret: String::new(),
            shortcode: "174379".to_string(),
            passkey: String::new(),
            callback_url: "https://example.com/api/mpesa/callback".to_string(),
            country_code: "254".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dev-only-secret".to_string(),
            token_ttl_hours: 24,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> Self {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .unwrap_or_else(|_| panic!("Failed to read config file: {}", config_path));
        let mut config: AppConfig =
            serde_yaml::from_str(&content).expect("Failed to parse config yaml");
        config.apply_env_overrides();
        config
    }

    /// Credentials come from the environment when set, so the yaml files can
    /// stay free of secrets.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MPESA_CONSUMER_KEY") {
            self.mpesa.consumer_key = v;
        }
        if let Ok(v) = std::env::var("MPESA_CONSUMER_SECRET") {
            self.mpesa.consumer_secret = v;
        }
        if let Ok(v) = std::env::var("MPESA_PASSKEY") {
            self.mpesa.passkey = v;
        }
        if let Ok(v) = std::env::var("JWT_SECRET") {
            self.auth.jwt_secret = v;
        }
    }
}
