use anyhow::Context;
use clap::Parser;
use pagestitch::{setup_logging, Cli, CliRunner, Config};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    setup_logging(args.verbose);

    info!("starting pagestitch v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args).await?;
    let runner = CliRunner::new(config, &args);

    let result = tokio::select! {
        result = runner.run(args.command) => result,
        _ = signal::ctrl_c() => {
            info!("interrupted, shutting down");
            Ok(())
        }
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn load_config(args: &Cli) -> anyhow::Result<Config> {
    let config = if let Some(config_path) = &args.config {
        let content = tokio::fs::read_to_string(config_path)
            .await
            .with_context(|| format!("cannot read {}", config_path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("cannot parse {}", config_path.display()))?
    } else {
        Config::default()
    };

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    Ok(config)
}
