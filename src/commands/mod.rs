mod account;
mod entry;

use crate::app::AppContext;
use crate::{cli, exit_codes, prompt};
use quietquill::diary::Session;
use secrecy::SecretString;
use std::process::ExitCode;

pub fn dispatch(command: cli::Commands, ctx: &AppContext) -> ExitCode {
    match command {
        cli::Commands::Path => account::path(ctx),
        cli::Commands::Register(args) => account::register(args, ctx),
        cli::Commands::Passwd(args) => account::passwd(args, ctx),
        cli::Commands::Write(args) => entry::write(args, ctx),
        cli::Commands::Read(args) => entry::read(args, ctx),
        cli::Commands::List(args) => entry::list(args, ctx),
        cli::Commands::Search(args) => entry::search(args, ctx),
        cli::Commands::Tags(args) => entry::tags(args, ctx),
        cli::Commands::Stats(args) => entry::stats(args, ctx),
        cli::Commands::Delete(args) => entry::delete(args, ctx),
    }
}

/// Prompt for the password and derive the key off the main thread.
fn login(user: &str, ctx: &AppContext) -> Result<Session, ExitCode> {
    let password = match prompt::prompt_password("Password") {
        Ok(pw) => pw,
        Err(error) => {
            eprintln!("Error: {error}");
            return Err(exit_codes::exit_code_for_prompt_error(&error));
        }
    };
    login_with(user, password, ctx)
}

fn login_with(user: &str, password: SecretString, ctx: &AppContext) -> Result<Session, ExitCode> {
    match ctx.diary.login_in_background(user, password).wait() {
        Ok(Ok(session)) => Ok(session),
        Ok(Err(error)) => {
            eprintln!("Error: {error}");
            Err(exit_codes::exit_code_for_diary_error(&error))
        }
        Err(error) => {
            eprintln!("Error: {error}");
            Err(exit_codes::exit_code_for_pending_error(&error))
        }
    }
}
