use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = restreamctl::Cli::parse();
    restreamctl::init_tracing(&cli.log_level);
    if let Err(err) = restreamctl::run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
