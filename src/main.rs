mod app;
mod cli;
mod core;
mod selector;
mod widgets;

use std::process::ExitCode;

use env_logger::Env;
use log::error;

use app::App;
use cli::parse_args;

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_target(false)
        .init();

    let settings = parse_args();

    match App::new(settings).run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
