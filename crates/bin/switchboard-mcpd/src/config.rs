use clap::{Parser, ValueEnum};
use std::error::Error;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use switchboard_core::GatewaySettings;
use switchboard_core::connectors::{
    GithubSettings,
    MilvusSettings,
    Neo4jSettings,
    PostgresSettings,
};
use switchboard_mcp::server::{DEFAULT_HTTP_ADDR, McpHttpServerConfig};

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
const DEFAULT_GITHUB_TIMEOUT_SECS: u64 = 30;
const DEFAULT_NEO4J_URI: &str = "bolt://localhost:7687";
const DEFAULT_NEO4J_USER: &str = "neo4j";
const DEFAULT_NEO4J_PASSWORD: &str = "password";
const DEFAULT_POSTGRES_HOST: &str = "localhost";
const DEFAULT_POSTGRES_PORT: u16 = 5432;
const DEFAULT_POSTGRES_USER: &str = "postgres";
const DEFAULT_POSTGRES_PASSWORD: &str = "postgres";
const DEFAULT_POSTGRES_DB: &str = "postgres";
const DEFAULT_MILVUS_HOST: &str = "localhost";
const DEFAULT_MILVUS_PORT: u16 = 19530;
const DEFAULT_MILVUS_DB: &str = "default";
const DEFAULT_MILVUS_TIMEOUT_SECS: u64 = 30;

/// How the MCP protocol is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// JSON-RPC over stdin/stdout.
    Stdio,
    /// Streamable HTTP listener.
    Http,
}

#[derive(Parser, Debug)]
#[command(name = "switchboard-mcpd", version, about = "Switchboard MCP daemon.")]
struct CliArgs {
    #[arg(long, env = "SWITCHBOARD_TRANSPORT", value_enum, default_value_t = Transport::Stdio)]
    transport: Transport,

    #[arg(long, env = "SWITCHBOARD_HTTP_ADDR", default_value = DEFAULT_HTTP_ADDR)]
    http_addr: SocketAddr,

    #[arg(
        long,
        env = "SWITCHBOARD_CONNECT_TIMEOUT_SECS",
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS
    )]
    connect_timeout_secs: u64,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,

    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_GITHUB_API_URL)]
    github_api_url: String,

    #[arg(long, env = "GITHUB_TIMEOUT_SECS", default_value_t = DEFAULT_GITHUB_TIMEOUT_SECS)]
    github_timeout_secs: u64,

    #[arg(long, env = "NEO4J_URI", default_value = DEFAULT_NEO4J_URI)]
    neo4j_uri: String,

    #[arg(long, env = "NEO4J_USER", default_value = DEFAULT_NEO4J_USER)]
    neo4j_user: String,

    #[arg(
        long,
        env = "NEO4J_PASSWORD",
        default_value = DEFAULT_NEO4J_PASSWORD,
        hide_env_values = true
    )]
    neo4j_password: String,

    #[arg(long, env = "POSTGRES_HOST", default_value = DEFAULT_POSTGRES_HOST)]
    postgres_host: String,

    #[arg(long, env = "POSTGRES_PORT", default_value_t = DEFAULT_POSTGRES_PORT)]
    postgres_port: u16,

    #[arg(long, env = "POSTGRES_USER", default_value = DEFAULT_POSTGRES_USER)]
    postgres_user: String,

    #[arg(
        long,
        env = "POSTGRES_PASSWORD",
        default_value = DEFAULT_POSTGRES_PASSWORD,
        hide_env_values = true
    )]
    postgres_password: String,

    #[arg(long, env = "POSTGRES_DB", default_value = DEFAULT_POSTGRES_DB)]
    postgres_db: String,

    #[arg(long, env = "MILVUS_HOST", default_value = DEFAULT_MILVUS_HOST)]
    milvus_host: String,

    #[arg(long, env = "MILVUS_PORT", default_value_t = DEFAULT_MILVUS_PORT)]
    milvus_port: u16,

    #[arg(long, env = "MILVUS_USER")]
    milvus_user: Option<String>,

    #[arg(long, env = "MILVUS_PASSWORD", hide_env_values = true)]
    milvus_password: Option<String>,

    #[arg(long, env = "MILVUS_DB", default_value = DEFAULT_MILVUS_DB)]
    milvus_db: String,

    #[arg(long, env = "MILVUS_TIMEOUT_SECS", default_value_t = DEFAULT_MILVUS_TIMEOUT_SECS)]
    milvus_timeout_secs: u64,
}

/// Runtime configuration loaded from CLI arguments and environment variables.
#[derive(Clone)]
pub struct SwitchboardConfig {
    pub transport: Transport,
    pub http_addr: SocketAddr,
    pub gateway: GatewaySettings,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidSetting { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSetting { name, value } => {
                write!(f, "invalid {name} value: {value:?}")
            }
        }
    }
}

impl Error for ConfigError {}

impl SwitchboardConfig {
    pub fn from_args() -> Result<Self, ConfigError> {
        let args = CliArgs::parse();
        Self::try_from(args)
    }

    pub const fn http_server_config(&self) -> McpHttpServerConfig {
        McpHttpServerConfig::new(self.http_addr)
    }
}

fn require(name: &'static str, value: String) -> Result<String, ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidSetting { name, value });
    }
    Ok(value)
}

fn optional(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn timeout(name: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::InvalidSetting {
            name,
            value: secs.to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

impl TryFrom<CliArgs> for SwitchboardConfig {
    type Error = ConfigError;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let github = GithubSettings::new(optional(args.github_token))
            .with_api_url(require("GITHUB_API_URL", args.github_api_url)?)
            .with_timeout(timeout("GITHUB_TIMEOUT_SECS", args.github_timeout_secs)?);

        let neo4j = Neo4jSettings {
            uri: require("NEO4J_URI", args.neo4j_uri)?,
            user: args.neo4j_user,
            password: args.neo4j_password,
        };

        let postgres = PostgresSettings {
            host: require("POSTGRES_HOST", args.postgres_host)?,
            port: args.postgres_port,
            user: args.postgres_user,
            password: args.postgres_password,
            database: require("POSTGRES_DB", args.postgres_db)?,
        };

        let milvus = MilvusSettings {
            host: require("MILVUS_HOST", args.milvus_host)?,
            port: args.milvus_port,
            user: optional(args.milvus_user),
            password: optional(args.milvus_password),
            database: require("MILVUS_DB", args.milvus_db)?,
            timeout: timeout("MILVUS_TIMEOUT_SECS", args.milvus_timeout_secs)?,
        };

        Ok(Self {
            transport: args.transport,
            http_addr: args.http_addr,
            gateway: GatewaySettings {
                github,
                neo4j,
                postgres,
                milvus,
                connect_timeout: timeout(
                    "SWITCHBOARD_CONNECT_TIMEOUT_SECS",
                    args.connect_timeout_secs,
                )?,
            },
        })
    }
}
