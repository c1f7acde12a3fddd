use anyhow::Context;
use serde::Deserialize;
use time::UtcOffset;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    /// Lower-cased domains (without `@`) accepted for account emails. Empty accepts any.
    pub allowed_email_domains: Vec<String>,
    /// Offset used to decide what "today" and "now" mean on campus.
    pub campus_offset: UtcOffset,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let database_max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);

        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "smartattend".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "smartattend-clients".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24),
        };

        let storage = StorageConfig {
            endpoint: std::env::var("MINIO_ENDPOINT").context("MINIO_ENDPOINT is not set")?,
            bucket: std::env::var("MINIO_BUCKET").context("MINIO_BUCKET is not set")?,
            access_key: std::env::var("MINIO_ACCESS_KEY").context("MINIO_ACCESS_KEY is not set")?,
            secret_key: std::env::var("MINIO_SECRET_KEY").context("MINIO_SECRET_KEY is not set")?,
            region: std::env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".into()),
        };

        let allowed_email_domains = parse_domains(
            &std::env::var("ALLOWED_EMAIL_DOMAINS").unwrap_or_default(),
        );

        let offset_minutes = std::env::var("CAMPUS_UTC_OFFSET_MINUTES")
            .ok()
            .and_then(|v| v.parse::<i32>().ok())
            .unwrap_or(0);
        let campus_offset = UtcOffset::from_whole_seconds(offset_minutes * 60)
            .context("CAMPUS_UTC_OFFSET_MINUTES out of range")?;

        Ok(Self {
            database_url,
            database_max_connections,
            jwt,
            storage,
            allowed_email_domains,
            campus_offset,
        })
    }
}

fn parse_domains(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|d| d.trim().trim_start_matches('@').to_lowercase())
        .filter(|d| !d.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::parse_domains;

    #[test]
    fn parses_domain_list() {
        assert_eq!(
            parse_domains(" klu.ac.in, @Gmail.com ,,"),
            vec!["klu.ac.in".to_string(), "gmail.com".to_string()]
        );
        assert!(parse_domains("").is_empty());
    }
}
