use tracing::error;
use wikispider::{command_argument_builder, handle_crawl};

#[tokio::main]
async fn main() {
    let matches = command_argument_builder().get_matches();

    if let Err(e) = handle_crawl(&matches).await {
        error!(error = %format!("{e:#}"), "wikispider failed");
        std::process::exit(1);
    }
}
