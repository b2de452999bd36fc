use super::{connect, parse_arg, print_done};
use crate::cli::Cli;
use crate::error::{BridgeError, Result};

/// Invoke any method by name and print its raw response.
pub async fn run(cli: &Cli, method: &str, params: &[String]) -> Result<()> {
    let controller = connect(cli).await?;
    let params = params.iter().map(|p| parse_arg(p)).collect();
    let response = controller.request(method, params).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return match response.error() {
            Some(message) => Err(BridgeError::Remote(message.to_string())),
            None => Ok(()),
        };
    }

    let value = response.into_result()?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

pub async fn eval(cli: &Cli, code: &str) -> Result<()> {
    let controller = connect(cli).await?;
    let value = controller.evaluate(code).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

pub async fn click(cli: &Cli, path: &str) -> Result<()> {
    let controller = connect(cli).await?;
    controller.generate_mouse_click(path).await?;
    print_done(cli, "Clicked", path);
    Ok(())
}
