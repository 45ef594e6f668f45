mod app;
mod cli;
mod commands;
mod exit_codes;
mod output;
mod prompt;

use std::process::ExitCode;

fn main() -> ExitCode {
    app::run()
}
