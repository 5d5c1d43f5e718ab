//! Database configuration

use serde::{Deserialize, Serialize};

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub postgres_url: String,
    /// Maximum pool connections
    pub max_connections: u32,
    /// Minimum pool connections
    pub min_connections: u32,
    /// Connection acquire timeout in seconds
    pub acquire_timeout_secs: u64,
    /// Apply pending migrations on startup
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/credora".to_string()),
            max_connections: 20,
            min_connections: 2,
            acquire_timeout_secs: 30,
            run_migrations: true,
        }
    }
}

impl DatabaseConfig {
    /// Mask the password in the PostgreSQL URL for logging
    pub fn postgres_url_masked(&self) -> String {
        mask_url(&self.postgres_url)
    }
}

fn mask_url(url: &str) -> String {
    let (Some(at_pos), Some(scheme_end)) = (url.rfind('@'), url.find("://")) else {
        return url.to_string();
    };
    if at_pos < scheme_end {
        return url.to_string();
    }
    let user_pass = &url[scheme_end + 3..at_pos];
    match user_pass.split_once(':') {
        Some((user, _)) => format!("{}{}:***{}", &url[..scheme_end + 3], user, &url[at_pos..]),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_postgres_url() {
        let masked = mask_url("postgresql://credora:s3cret@db:5432/credora");
        assert_eq!(masked, "postgresql://credora:***@db:5432/credora");
    }

    #[test]
    fn test_password_containing_at_sign() {
        let masked = mask_url("postgresql://app:p@ss@localhost/credora");
        assert!(!masked.contains("p@ss"));
    }

    #[test]
    fn test_no_password() {
        let url = "postgresql://localhost/credora";
        assert_eq!(mask_url(url), url);
        assert_eq!(mask_url("postgresql://app@localhost/credora"), "postgresql://app@localhost/credora");
    }
}
