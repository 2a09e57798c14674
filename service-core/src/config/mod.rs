use crate::error::AppError;
use serde::Deserialize;
use std::env;

/// Settings shared by every service binary.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    pub fn is_prod(self) -> bool {
        matches!(self, Environment::Prod)
    }
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let environment = match env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "dev".to_string())
            .to_lowercase()
            .as_str()
        {
            "prod" | "production" => Environment::Prod,
            _ => Environment::Dev,
        };

        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid PORT: {}", e)))?;

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            environment,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// Read an environment variable with eager validation.
///
/// Missing values fall back to `default` in dev; in prod any missing value
/// is a startup failure regardless of the default.
pub fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_env_uses_default_in_dev() {
        let value = get_env("SERVICE_CORE_TEST_UNSET", Some("fallback"), false).unwrap();
        assert_eq!(value, "fallback");
    }

    #[test]
    fn get_env_fails_in_prod_without_value() {
        let result = get_env("SERVICE_CORE_TEST_UNSET", Some("fallback"), true);
        assert!(result.is_err());
    }
}
