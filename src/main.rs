use clap::Parser;
use hanzi_gloss::cli::CliArgs;
use hanzi_gloss::settings::load_settings;
use log::error;
use std::process::ExitCode;
use tokio::runtime::Runtime;

fn main() -> ExitCode {
    let args = CliArgs::parse();
    let settings = load_settings(args.settings.as_deref());

    let debug = args.debug || settings.as_ref().map(|s| s.debug_mode).unwrap_or(false);
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if debug { "debug" } else { "info" }),
    )
    .format_timestamp(None)
    .format_target(false)
    .init();

    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let rt = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(hanzi_gloss::run(args, settings)) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
