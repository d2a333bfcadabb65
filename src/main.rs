use anyhow::Context;
use tokio::net::TcpListener;

mod common;
mod config;
mod extractors;
mod logging;
mod middlewares;
mod models;
mod routes;
mod server;
mod services;
mod state;
mod utils;

/// Lifetime of tokens minted with `--issue-token`.
const ISSUED_TOKEN_SECS: i64 = 30 * 24 * 60 * 60;

fn issue_token_arg(args: &[String]) -> Option<&str> {
    args.iter()
        .position(|it| it == "--issue-token")
        .and_then(|index| args.get(index + 1))
        .map(String::as_str)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let config_path = config::parse_config_path(args.iter().cloned())?;
    let config = config::load(&config_path)?;
    if let Some(user) = issue_token_arg(&args) {
        let keys = extractors::AuthKeys::new(&config.authorize);
        println!("{}", keys.issue(user, ISSUED_TOKEN_SECS)?);
        return Ok(());
    }
    logging::registry_logs(config.logs.level)?;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Listening on http://{}", addr);
    server::run_until_done(config, listener).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_token_flag() {
        let args = ["-c", "a.toml", "--issue-token", "u1"].map(String::from);
        assert_eq!(issue_token_arg(&args), Some("u1"));
        assert_eq!(issue_token_arg(&args[..2]), None);
    }
}
