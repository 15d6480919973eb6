// src/main.rs

use devmon::{cli, logging, run, settings_from_args};

#[tokio::main]
async fn main() {
    if let Err(err) = run_main().await {
        eprintln!("devmon error: {err:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> anyhow::Result<()> {
    let args = cli::parse();
    let settings = settings_from_args(&args)?;
    logging::init_logging(args.log_level, settings.log_time)?;
    run(args, settings).await
}
