use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub backend: BackendConfig,
    pub app_check: AppCheckConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub max_request_size_bytes: usize,
    pub enable_request_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub project_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppCheckConfig {
    /// Numeric project identifier used for the audience and issuer checks.
    pub project_number: Option<String>,
    pub jwks_url: String,
    pub jwks_cache_secs: u64,
}

const DEFAULT_JWKS_URL: &str = "https://firebaseappcheck.googleapis.com/v1/jwks";

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }
        if let Ok(v) = env::var("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }

        if let Ok(v) = env::var("SECURITY_JWT_SECRET").or_else(|_| env::var("JWT_SECRET")) {
            self.security.jwt_secret = v.trim_matches('"').to_string();
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v.split(',').map(|s| s.trim().to_string()).collect();
        }

        if let Ok(v) = env::var("BACKEND_PROJECT_ID").or_else(|_| env::var("GCLOUD_PROJECT")) {
            self.backend.project_id = v;
        }

        if let Ok(v) = env::var("APP_CHECK_PROJECT_NUMBER") {
            self.app_check.project_number = Some(v).filter(|s| !s.is_empty());
        }
        if let Ok(v) = env::var("APP_CHECK_JWKS_URL") {
            self.app_check.jwks_url = v;
        }
        if let Ok(v) = env::var("APP_CHECK_JWKS_CACHE_SECS") {
            self.app_check.jwks_cache_secs = v.parse().unwrap_or(self.app_check.jwks_cache_secs);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            api: ApiConfig {
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
                enable_request_logging: true,
            },
            security: SecurityConfig {
                jwt_secret: "development-secret".to_string(),
                jwt_expiry_hours: 24 * 7,
                cors_origins: vec!["http://localhost:3000".to_string(), "http://localhost:5173".to_string()],
            },
            backend: BackendConfig {
                project_id: "demo-project".to_string(),
            },
            app_check: AppCheckConfig {
                project_number: None,
                jwks_url: DEFAULT_JWKS_URL.to_string(),
                jwks_cache_secs: 6 * 60 * 60,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            api: ApiConfig {
                max_request_size_bytes: 5 * 1024 * 1024,
                enable_request_logging: true,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
            backend: BackendConfig {
                project_id: String::new(),
            },
            app_check: AppCheckConfig {
                project_number: None,
                jwks_url: DEFAULT_JWKS_URL.to_string(),
                jwks_cache_secs: 6 * 60 * 60,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            api: ApiConfig {
                max_request_size_bytes: 2 * 1024 * 1024,
                enable_request_logging: false,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
            backend: BackendConfig {
                project_id: String::new(),
            },
            app_check: AppCheckConfig {
                project_number: None,
                jwks_url: DEFAULT_JWKS_URL.to_string(),
                jwks_cache_secs: 6 * 60 * 60,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_development {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Development)
    };
}
