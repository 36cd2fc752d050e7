use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = splicegate::cli::Cli::parse();
    if let Err(e) = splicegate::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
