use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the vitrine binary.
#[derive(Debug, Parser)]
#[command(
    name = "vitrine",
    version,
    about = "Cached content queries and live preview for storefronts"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "VITRINE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the storefront HTTP service.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the content project id.
    #[arg(long = "content-project-id", value_name = "ID")]
    pub content_project_id: Option<String>,

    /// Override the content dataset.
    #[arg(long = "content-dataset", value_name = "NAME")]
    pub content_dataset: Option<String>,

    /// Override the content API version (YYYY-MM-DD or X).
    #[arg(long = "content-api-version", value_name = "VERSION")]
    pub content_api_version: Option<String>,

    /// Toggle reads through the content CDN.
    #[arg(
        long = "content-use-cdn",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub content_use_cdn: Option<bool>,

    /// Override the preview route path.
    #[arg(long = "preview-route", value_name = "PATH")]
    pub preview_route: Option<String>,

    /// Toggle the query cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the default cache strategy (long|short|none).
    #[arg(long = "cache-default-strategy", value_name = "STRATEGY")]
    pub cache_default_strategy: Option<String>,

    /// Override the in-memory cache capacity.
    #[arg(long = "cache-store-capacity", value_name = "COUNT")]
    pub cache_store_capacity: Option<usize>,
}
