// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names, default values and the
//! [`Settings`] struct built from them. Configuration is loaded once from the
//! environment (and an optional `.env` file) at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `APP_NAME` | Service name (OpenAPI title, outbound User-Agent) | `PIdP` |
//! | `SECRET_KEY` | Shared HMAC secret for symmetric tokens | Required |
//! | `TOKEN_ALGORITHM` | JWT algorithm (`HS*`, `RS*`, `PS*`) | `HS256` |
//! | `ACCESS_TOKEN_EXPIRE_MINUTES` | Token lifetime | `60` |
//! | `TOKEN_ISSUER` | `iss` claim issued and required | Optional |
//! | `TOKEN_AUDIENCE` | `aud` claim issued and required | Optional |
//! | `JWT_PRIVATE_KEY` / `JWT_PUBLIC_KEY` | PEM key pair for asymmetric algorithms | Generated |
//! | `PASSWORD_HASH_COST` | bcrypt cost factor | `12` |
//! | `GOOGLE_CLIENT_ID` / `_SECRET` / `_REDIRECT_URI` | Google OAuth client | Disabled |
//! | `GITHUB_CLIENT_ID` / `_SECRET` / `_REDIRECT_URI` | GitHub OAuth client | Disabled |
//! | `FRONTEND_REDIRECT_URL` | Redirect target after OAuth callbacks | Optional |
//! | `ALLOWED_ORIGINS` | Comma-separated CORS origins | None |
//! | `ACCOUNT_LINKING` | `trust_email` or `disabled` | `trust_email` |
//! | `DATA_DIR` | Directory holding the identity database | `./data` |
//! | `HOST` / `PORT` | Server bind address | `0.0.0.0` / `8000` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files enabling HTTPS | Plain HTTP |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;
use std::str::FromStr;

use jsonwebtoken::Algorithm;

use crate::identity::LinkPolicy;

pub const APP_NAME_ENV: &str = "APP_NAME";
pub const SECRET_KEY_ENV: &str = "SECRET_KEY";
pub const TOKEN_ALGORITHM_ENV: &str = "TOKEN_ALGORITHM";
pub const TOKEN_TTL_ENV: &str = "ACCESS_TOKEN_EXPIRE_MINUTES";
pub const TOKEN_ISSUER_ENV: &str = "TOKEN_ISSUER";
pub const TOKEN_AUDIENCE_ENV: &str = "TOKEN_AUDIENCE";
pub const JWT_PRIVATE_KEY_ENV: &str = "JWT_PRIVATE_KEY";
pub const JWT_PUBLIC_KEY_ENV: &str = "JWT_PUBLIC_KEY";
pub const PASSWORD_HASH_COST_ENV: &str = "PASSWORD_HASH_COST";
pub const FRONTEND_REDIRECT_URL_ENV: &str = "FRONTEND_REDIRECT_URL";
pub const ALLOWED_ORIGINS_ENV: &str = "ALLOWED_ORIGINS";
pub const ACCOUNT_LINKING_ENV: &str = "ACCOUNT_LINKING";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Environment variable name for the database directory.
///
/// The identity database (`pidp.redb`) is created inside this directory.
///
/// # Default
/// `./data`
pub const DATA_DIR_ENV: &str = "DATA_DIR";

pub const DEFAULT_APP_NAME: &str = "PIdP";
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 60;
pub const DEFAULT_PASSWORD_HASH_COST: u32 = 12;
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;

/// Configuration errors raised while reading the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Token signing settings consumed by the key manager, issuer and verifier.
#[derive(Clone)]
pub struct TokenSettings {
    pub algorithm: Algorithm,
    pub secret: String,
    pub ttl_minutes: i64,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub private_key_pem: Option<String>,
    pub public_key_pem: Option<String>,
}

impl std::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("algorithm", &self.algorithm)
            .field("secret", &"<redacted>")
            .field("ttl_minutes", &self.ttl_minutes)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("private_key_pem", &self.private_key_pem.as_ref().map(|_| "<redacted>"))
            .field("public_key_pem", &self.public_key_pem.is_some())
            .finish()
    }
}

/// OAuth client credentials for one provider.
#[derive(Clone)]
pub struct ProviderSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Fully resolved service configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub app_name: String,
    pub token: TokenSettings,
    pub password_hash_cost: u32,
    pub google: Option<ProviderSettings>,
    pub github: Option<ProviderSettings>,
    pub frontend_redirect_url: Option<url::Url>,
    pub allowed_origins: Vec<String>,
    pub link_policy: LinkPolicy,
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
}

impl Settings {
    /// Load settings from `.env` (if present) and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let algorithm = match get(TOKEN_ALGORITHM_ENV) {
            Some(value) => Algorithm::from_str(&value).map_err(|e| ConfigError::Invalid {
                name: TOKEN_ALGORITHM_ENV,
                reason: e.to_string(),
            })?,
            None => Algorithm::HS256,
        };

        let token = TokenSettings {
            algorithm,
            secret: get(SECRET_KEY_ENV).ok_or(ConfigError::Missing(SECRET_KEY_ENV))?,
            ttl_minutes: parse_or(get(TOKEN_TTL_ENV), TOKEN_TTL_ENV, DEFAULT_TOKEN_TTL_MINUTES)?,
            issuer: get(TOKEN_ISSUER_ENV),
            audience: get(TOKEN_AUDIENCE_ENV),
            private_key_pem: get(JWT_PRIVATE_KEY_ENV).map(|pem| unescape_newlines(&pem)),
            public_key_pem: get(JWT_PUBLIC_KEY_ENV).map(|pem| unescape_newlines(&pem)),
        };
        if token.ttl_minutes <= 0 {
            return Err(ConfigError::Invalid {
                name: TOKEN_TTL_ENV,
                reason: "must be a positive number of minutes".to_string(),
            });
        }

        let password_hash_cost = parse_or(
            get(PASSWORD_HASH_COST_ENV),
            PASSWORD_HASH_COST_ENV,
            DEFAULT_PASSWORD_HASH_COST,
        )?;
        if !(4..=31).contains(&password_hash_cost) {
            return Err(ConfigError::Invalid {
                name: PASSWORD_HASH_COST_ENV,
                reason: "bcrypt cost must be between 4 and 31".to_string(),
            });
        }

        let frontend_redirect_url = match get(FRONTEND_REDIRECT_URL_ENV) {
            Some(raw) => Some(url::Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                name: FRONTEND_REDIRECT_URL_ENV,
                reason: e.to_string(),
            })?),
            None => None,
        };

        let link_policy = match get(ACCOUNT_LINKING_ENV) {
            Some(raw) => LinkPolicy::from_str(&raw).map_err(|reason| ConfigError::Invalid {
                name: ACCOUNT_LINKING_ENV,
                reason,
            })?,
            None => LinkPolicy::default(),
        };

        Ok(Self {
            app_name: get(APP_NAME_ENV).unwrap_or_else(|| DEFAULT_APP_NAME.to_string()),
            token,
            password_hash_cost,
            google: provider_settings(&get, "GOOGLE"),
            github: provider_settings(&get, "GITHUB"),
            frontend_redirect_url,
            allowed_origins: split_origins(get(ALLOWED_ORIGINS_ENV).as_deref().unwrap_or("")),
            link_policy,
            data_dir: PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())),
            host: get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or(get(PORT_ENV), PORT_ENV, DEFAULT_PORT)?,
            tls_cert_path: get(TLS_CERT_PATH_ENV).map(PathBuf::from),
            tls_key_path: get(TLS_KEY_PATH_ENV).map(PathBuf::from),
        })
    }

    /// Path of the redb database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("pidp.redb")
    }
}

fn parse_or<T: FromStr>(value: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// A provider is enabled only when id, secret and redirect URI are all set.
fn provider_settings<G>(get: &G, prefix: &str) -> Option<ProviderSettings>
where
    G: Fn(&str) -> Option<String>,
{
    let client_id = get(format!("{prefix}_CLIENT_ID").as_str());
    let client_secret = get(format!("{prefix}_CLIENT_SECRET").as_str());
    let redirect_uri = get(format!("{prefix}_REDIRECT_URI").as_str());

    match (client_id, client_secret, redirect_uri) {
        (Some(client_id), Some(client_secret), Some(redirect_uri)) => Some(ProviderSettings {
            client_id,
            client_secret,
            redirect_uri,
        }),
        (None, None, None) => None,
        _ => {
            tracing::warn!(
                provider = prefix,
                "OAuth provider partially configured (needs client id, secret and redirect URI), leaving it disabled"
            );
            None
        }
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

// PEM blocks passed through env files often carry literal "\n".
fn unescape_newlines(value: &str) -> String {
    value.replace("\\n", "\n")
}
