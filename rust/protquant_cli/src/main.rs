mod cli;
mod config;
mod errors;
mod input;
mod processing;

use clap::Parser;
use protquant::Hyperparameters;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::Config;
use errors::CliError;

#[cfg(target_os = "windows")]
use mimalloc::MiMalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> std::result::Result<(), CliError> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        ) // This uses RUST_LOG environment variable
        .init();

    let args = Cli::parse();

    let content = std::fs::read_to_string(&args.config).map_err(|e| CliError::Io {
        source: e.to_string(),
        path: Some(args.config.to_string_lossy().to_string()),
    })?;
    let config = Config::from_json_str(&content)?.with_cli_args(&args);

    let input = config.input.clone().ok_or_else(|| CliError::Config {
        source: "No input provided, please provide one in either the config file or with the --input-file flag".to_string(),
    })?;
    let output = config.output.clone().ok_or_else(|| CliError::Config {
        source: "No output directory provided, please provide one in either the config file or with the --output-dir flag".to_string(),
    })?;
    info!("Parsed configuration: {:#?}", config);

    let layout = config.analysis.sample_layout()?;
    let params = Hyperparameters::from_config(&config.analysis.hyperparameters, layout.groups.clone())?;

    std::fs::create_dir_all(&output.directory).map_err(|e| CliError::Io {
        source: e.to_string(),
        path: Some(output.directory.to_string_lossy().to_string()),
    })?;

    let proteins = input::read_quant_file(&input.path, &layout)?;
    processing::process_proteins(&proteins, &params, &layout.names, &output)?;
    Ok(())
}
