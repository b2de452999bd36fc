use colored::Colorize;

use crate::cli::{Cli, ConfigCommands};
use crate::config::Config;
use crate::content::ScriptKind;
use crate::error::{BridgeError, Result};

pub async fn run(cli: &Cli, command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => show(cli).await,
        ConfigCommands::Set { key, value } => set(cli, key, value).await,
        ConfigCommands::Get { key } => get(cli, key).await,
        ConfigCommands::Path => path(cli).await,
    }
}

async fn show(cli: &Cli) -> Result<()> {
    let config = cli.load_config()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("{}", config.to_toml()?);
    }

    Ok(())
}

fn parse_script(value: &str) -> Result<Option<ScriptKind>> {
    if value == "none" {
        return Ok(None);
    }
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map(Some)
        .map_err(|_| {
            BridgeError::ConfigError(format!(
                "Unknown worker script '{}' (expected echo, counter, silent, crash or none)",
                value
            ))
        })
}

async fn set(cli: &Cli, key: &str, value: &str) -> Result<()> {
    let path = cli.config_path();
    let mut config = Config::load_from(&path)?;

    match key {
        "bridge.host" => config.bridge.host = value.to_string(),
        "bridge.port" => {
            config.bridge.port = value.parse().map_err(|_| {
                BridgeError::ConfigError("port must be a number between 0 and 65535".to_string())
            })?
        }
        "bridge.call_timeout_ms" => {
            config.bridge.call_timeout_ms = Some(value.parse().map_err(|_| {
                BridgeError::ConfigError("call_timeout_ms must be a number".to_string())
            })?)
        }
        "content.document" => config.content.document = Some(value.into()),
        "content.default_worker_script" => {
            config.content.default_worker_script = parse_script(value)?
        }
        _ => {
            return Err(BridgeError::ConfigError(format!(
                "Unknown config key: {}",
                key
            )))
        }
    }

    config.save_to(&path)?;
    println!("{} Set {} = {}", "✓".green(), key, value);

    Ok(())
}

async fn get(cli: &Cli, key: &str) -> Result<()> {
    let config = cli.load_config()?;

    let value = match key {
        "bridge.host" => Some(config.bridge.host.clone()),
        "bridge.port" => Some(config.bridge.port.to_string()),
        "bridge.call_timeout_ms" => config.bridge.call_timeout_ms.map(|ms| ms.to_string()),
        "content.document" => config
            .content
            .document
            .as_ref()
            .map(|p| p.display().to_string()),
        "content.default_worker_script" => Some(
            config
                .content
                .default_worker_script
                .map_or("none", |kind| kind.name())
                .to_string(),
        ),
        _ => {
            return Err(BridgeError::ConfigError(format!(
                "Unknown config key: {}",
                key
            )))
        }
    };

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "key": key,
                "value": value
            })
        );
    } else {
        match value {
            Some(v) => println!("{}", v),
            None => println!("{}", "(not set)".dimmed()),
        }
    }

    Ok(())
}

async fn path(cli: &Cli) -> Result<()> {
    let path = cli.config_path();

    if cli.json {
        println!(
            "{}",
            serde_json::json!({
                "path": path.display().to_string(),
                "exists": path.exists()
            })
        );
    } else {
        println!("{}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_names_parse() {
        assert_eq!(parse_script("counter").unwrap(), Some(ScriptKind::Counter));
        assert_eq!(parse_script("none").unwrap(), None);
        assert!(parse_script("bogus").is_err());
    }
}
