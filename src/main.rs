use clap::Parser;

mod cli;

use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    cli::init_logging(cli.debug);

    if let Err(e) = cli::run_command(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
