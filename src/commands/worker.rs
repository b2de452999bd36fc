use super::{connect, parse_arg, print_done};
use crate::cli::{Cli, WorkerCommands};
use crate::error::Result;

pub async fn run(cli: &Cli, command: &WorkerCommands) -> Result<()> {
    let controller = connect(cli).await?;

    match command {
        WorkerCommands::Create { url } => {
            controller.create_worker(url).await?;
            print_done(cli, "Created worker", url);
        }
        WorkerCommands::Terminate { url } => {
            controller.terminate_worker(url).await?;
            print_done(cli, "Terminated worker", url);
        }
        WorkerCommands::Post {
            url,
            message,
            direct,
        } => {
            let message = parse_arg(message);
            if *direct {
                controller.post_message_to_worker_direct(url, message).await?;
            } else {
                controller.post_message_to_worker(url, message).await?;
            }
            print_done(cli, "Worker replied", url);
        }
    }

    Ok(())
}
