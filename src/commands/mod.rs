pub mod call;
pub mod config;
pub mod serve;
pub mod worker;

use colored::Colorize;
use serde_json::Value;

use crate::bridge::{websocket, Controller};
use crate::cli::Cli;
use crate::error::Result;

/// Connect to the running bridge described by the effective configuration.
async fn connect(cli: &Cli) -> Result<Controller> {
    let config = cli.load_config()?;
    let url = config.bridge_url();
    tracing::debug!("Connecting to bridge at {}", url);
    let endpoint = websocket::connect(&url).await?;
    Ok(Controller::new(endpoint).with_call_timeout(config.call_timeout()))
}

/// Command-line arguments are JSON when they parse as JSON, plain strings otherwise.
fn parse_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Report a completed operation that has no result of its own.
fn print_done(cli: &Cli, action: &str, detail: &str) {
    if cli.json {
        println!(
            "{}",
            serde_json::json!({ "success": true, "action": action, "target": detail })
        );
    } else {
        println!("{} {} {}", "✓".green(), action, detail.cyan());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn args_parse_as_json_first() {
        assert_eq!(parse_arg("42"), json!(42));
        assert_eq!(parse_arg("[1,2]"), json!([1, 2]));
        assert_eq!(parse_arg("\"quoted\""), json!("quoted"));
        assert_eq!(parse_arg("1+1"), json!("1+1"));
        assert_eq!(parse_arg("http://w.js"), json!("http://w.js"));
    }
}
