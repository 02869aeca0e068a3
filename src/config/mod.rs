//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroUsize, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::{
    cache::CacheStrategy,
    content::{ClientConfig, SecretToken},
    domain::{api_version::ApiVersion, perspective::ClientPerspective},
    preview::{CookieSettings, SameSite},
};

mod cli;

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "vitrine";
const ENV_PREFIX: &str = "VITRINE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_API_VERSION: &str = "2025-02-19";
const DEFAULT_API_HOST: &str = "api.sanity.io";
const DEFAULT_CDN_HOST: &str = "apicdn.sanity.io";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PREVIEW_ROUTE: &str = "/api/preview";
const DEFAULT_SECRET_TTL_SECS: u64 = 60 * 60;
const DEFAULT_COOKIE_NAME: &str = "__vitrine_preview";
const DEFAULT_COOKIE_PATH: &str = "/";
const DEFAULT_STORE_CAPACITY: usize = 1024;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub content: ContentSettings,
    pub preview: PreviewSettings,
    pub session: SessionSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct ContentSettings {
    pub project_id: String,
    pub dataset: String,
    pub api_version: ApiVersion,
    pub api_host: String,
    pub cdn_host: String,
    pub use_cdn: bool,
    pub token: Option<SecretToken>,
    pub request_timeout: Duration,
}

impl ContentSettings {
    /// Base client configuration: anonymous, published perspective.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            project_id: self.project_id.clone(),
            dataset: self.dataset.clone(),
            api_version: self.api_version,
            api_host: self.api_host.clone(),
            cdn_host: self.cdn_host.clone(),
            use_cdn: self.use_cdn,
            perspective: ClientPerspective::Published,
            token: self.token.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreviewSettings {
    pub route: String,
    /// Preview-scoped read token. Preview is disabled without one.
    pub token: Option<SecretToken>,
    pub secret_ttl: Duration,
}

impl PreviewSettings {
    pub fn is_configured(&self) -> bool {
        self.token.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cookie: CookieSettings,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub default_strategy: CacheStrategy,
    pub store_capacity: NonZeroUsize,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("session.secrets"),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    content: RawContentSettings,
    preview: RawPreviewSettings,
    session: RawSessionSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(project_id) = overrides.content_project_id.as_ref() {
            self.content.project_id = Some(project_id.clone());
        }
        if let Some(dataset) = overrides.content_dataset.as_ref() {
            self.content.dataset = Some(dataset.clone());
        }
        if let Some(version) = overrides.content_api_version.as_ref() {
            self.content.api_version = Some(version.clone());
        }
        if let Some(use_cdn) = overrides.content_use_cdn {
            self.content.use_cdn = Some(use_cdn);
        }
        if let Some(route) = overrides.preview_route.as_ref() {
            self.preview.route = Some(route.clone());
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(strategy) = overrides.cache_default_strategy.as_ref() {
            self.cache.default_strategy = Some(strategy.clone());
        }
        if let Some(capacity) = overrides.cache_store_capacity {
            self.cache.store_capacity = Some(capacity);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            content,
            preview,
            session,
            cache,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let content = build_content_settings(content)?;
        let preview = build_preview_settings(preview)?;
        let session = build_session_settings(session, &preview)?;
        let cache = build_cache_settings(cache)?;

        Ok(Self {
            server,
            logging,
            content,
            preview,
            session,
            cache,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_content_settings(content: RawContentSettings) -> Result<ContentSettings, LoadError> {
    let project_id = required(content.project_id, "content.project_id")?;
    if !project_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(LoadError::invalid(
            "content.project_id",
            "may only contain a-z, 0-9 and dashes",
        ));
    }
    let dataset = required(content.dataset, "content.dataset")?;

    let api_version = content
        .api_version
        .as_deref()
        .unwrap_or(DEFAULT_API_VERSION)
        .parse::<ApiVersion>()
        .map_err(|err| LoadError::invalid("content.api_version", err.to_string()))?;

    let api_host = non_blank(content.api_host).unwrap_or_else(|| DEFAULT_API_HOST.to_string());
    let cdn_host = non_blank(content.cdn_host).unwrap_or_else(|| DEFAULT_CDN_HOST.to_string());

    let timeout_secs = content
        .request_timeout_seconds
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "content.request_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ContentSettings {
        project_id,
        dataset,
        api_version,
        api_host,
        cdn_host,
        use_cdn: content.use_cdn.unwrap_or(true),
        token: non_blank(content.token).map(SecretToken::new),
        request_timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_preview_settings(preview: RawPreviewSettings) -> Result<PreviewSettings, LoadError> {
    let route = non_blank(preview.route).unwrap_or_else(|| DEFAULT_PREVIEW_ROUTE.to_string());
    if !route.starts_with('/') {
        return Err(LoadError::invalid(
            "preview.route",
            "route must start with `/`",
        ));
    }

    let ttl_secs = preview
        .secret_ttl_seconds
        .unwrap_or(DEFAULT_SECRET_TTL_SECS);
    if ttl_secs == 0 {
        return Err(LoadError::invalid(
            "preview.secret_ttl_seconds",
            "must be greater than zero",
        ));
    }

    Ok(PreviewSettings {
        route,
        token: non_blank(preview.token).map(SecretToken::new),
        secret_ttl: Duration::from_secs(ttl_secs),
    })
}

fn build_session_settings(
    session: RawSessionSettings,
    preview: &PreviewSettings,
) -> Result<SessionSettings, LoadError> {
    let secrets: Vec<String> = session
        .secrets
        .unwrap_or_default()
        .into_iter()
        .map(|secret| secret.trim().to_string())
        .filter(|secret| !secret.is_empty())
        .collect();
    if preview.is_configured() && secrets.is_empty() {
        return Err(LoadError::invalid(
            "session.secrets",
            "at least one secret is required when preview.token is set",
        ));
    }

    let same_site = match session.same_site.as_deref() {
        Some(value) => SameSite::from_str(value)
            .map_err(|reason| LoadError::invalid("session.same_site", reason))?,
        None => SameSite::None,
    };
    let secure = session.secure.unwrap_or(true);
    if same_site == SameSite::None && !secure {
        return Err(LoadError::invalid(
            "session.secure",
            "SameSite=None cookies must be secure",
        ));
    }

    Ok(SessionSettings {
        cookie: CookieSettings {
            name: non_blank(session.cookie_name).unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_string()),
            secrets,
            path: non_blank(session.path).unwrap_or_else(|| DEFAULT_COOKIE_PATH.to_string()),
            http_only: session.http_only.unwrap_or(true),
            secure,
            same_site,
            max_age: session.max_age_seconds.map(Duration::from_secs),
        },
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let default_strategy = match cache.default_strategy.as_deref() {
        Some(value) => CacheStrategy::from_str(value)
            .map_err(|err| LoadError::invalid("cache.default_strategy", err.to_string()))?,
        None => CacheStrategy::default(),
    };

    let capacity = cache.store_capacity.unwrap_or(DEFAULT_STORE_CAPACITY);
    let store_capacity = NonZeroUsize::new(capacity)
        .ok_or_else(|| LoadError::invalid("cache.store_capacity", "must be greater than zero"))?;

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        default_strategy,
        store_capacity,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawContentSettings {
    project_id: Option<String>,
    dataset: Option<String>,
    api_version: Option<String>,
    api_host: Option<String>,
    cdn_host: Option<String>,
    use_cdn: Option<bool>,
    token: Option<String>,
    request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPreviewSettings {
    route: Option<String>,
    token: Option<String>,
    secret_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSessionSettings {
    cookie_name: Option<String>,
    secrets: Option<Vec<String>>,
    path: Option<String>,
    http_only: Option<bool>,
    secure: Option<bool>,
    same_site: Option<String>,
    max_age_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    default_strategy: Option<String>,
    store_capacity: Option<usize>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn required(value: Option<String>, key: &'static str) -> Result<String, LoadError> {
    non_blank(value).ok_or_else(|| LoadError::invalid(key, "value is required"))
}
