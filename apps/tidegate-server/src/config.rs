use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "tidegate-server",
    author,
    version,
    about = "HTTP long-poll gateway over reactive thing state"
)]
pub struct Cli {
    /// Address to bind the HTTP listener to.
    #[arg(long, env = "TIDEGATE_LISTEN_ADDR", default_value = "127.0.0.1:8080")]
    listen_addr: String,

    /// Path prefix the thing routes are mounted under.
    #[arg(long, env = "TIDEGATE_PREFIX", default_value = "/things")]
    prefix: String,

    /// Name of the session cookie issued to long-poll clients.
    #[arg(long, env = "TIDEGATE_COOKIE_NAME", default_value = "transport-longpoll")]
    cookie_name: String,

    /// Session cookie lifetime in seconds.
    #[arg(long, env = "TIDEGATE_COOKIE_MAX_AGE_SECS", default_value_t = 900)]
    cookie_max_age_secs: u64,

    /// Replay window and maximum long-poll wait, in seconds.
    #[arg(long, env = "TIDEGATE_WINDOW_SECS", default_value_t = 300)]
    window_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Normalized mount prefix: no trailing slash, empty means root.
    pub prefix: String,
    pub cookie_name: String,
    pub cookie_max_age: Duration,
    pub window: Duration,
}

impl TryFrom<Cli> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let listen_addr: SocketAddr = cli
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address: {}", cli.listen_addr))?;

        if !cli.prefix.starts_with('/') {
            anyhow::bail!("prefix must start with '/': {}", cli.prefix);
        }
        let prefix = cli.prefix.trim_end_matches('/').to_string();

        if cli.cookie_name.is_empty() || !cli.cookie_name.chars().all(cookie_name_char) {
            anyhow::bail!("cookie name contains invalid characters: {}", cli.cookie_name);
        }

        Ok(ServerConfig {
            listen_addr,
            prefix,
            cookie_name: cli.cookie_name,
            cookie_max_age: Duration::from_secs(cli.cookie_max_age_secs),
            window: Duration::from_secs(cli.window_secs),
        })
    }
}

fn cookie_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}
