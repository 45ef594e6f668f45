use crate::app::AppContext;
use crate::{cli, exit_codes, output, prompt};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use std::process::ExitCode;

pub fn path(ctx: &AppContext) -> ExitCode {
    let path = ctx.data_dir.display().to_string();
    output::print_value(
        path.clone(),
        json!({
            "kind": "data-path",
            "path": path,
        }),
        &ctx.output_mode,
    )
}

pub fn register(args: cli::UserArgs, ctx: &AppContext) -> ExitCode {
    let password = match prompt::prompt_new_password("Password") {
        Ok(pw) => pw,
        Err(error) => {
            eprintln!("Error: {error}");
            return exit_codes::exit_code_for_prompt_error(&error);
        }
    };

    let outcome = ctx
        .diary
        .register_in_background(&args.user, password)
        .wait();
    match outcome {
        Ok(Ok(())) => {
            let meta = json!({
                "kind": "register",
                "user": args.user,
            });
            if ctx.output_mode.quiet {
                output::print_value(args.user.clone(), meta, &ctx.output_mode)
            } else {
                output::print_value(format!("Registered {}", args.user), meta, &ctx.output_mode)
            }
        }
        Ok(Err(error)) => {
            eprintln!("Error: {error}");
            exit_codes::exit_code_for_diary_error(&error)
        }
        Err(error) => {
            eprintln!("Error: {error}");
            exit_codes::exit_code_for_pending_error(&error)
        }
    }
}

pub fn passwd(args: cli::UserArgs, ctx: &AppContext) -> ExitCode {
    let old_password = match prompt::prompt_password("Current password") {
        Ok(pw) => pw,
        Err(error) => {
            eprintln!("Error: {error}");
            return exit_codes::exit_code_for_prompt_error(&error);
        }
    };
    let new_password = match prompt::prompt_new_password("New password") {
        Ok(pw) => pw,
        Err(error) => {
            eprintln!("Error: {error}");
            return exit_codes::exit_code_for_prompt_error(&error);
        }
    };

    let for_login = SecretString::from(old_password.expose_secret().to_owned());
    let session = match super::login_with(&args.user, for_login, ctx) {
        Ok(session) => session,
        Err(code) => return code,
    };

    let outcome = ctx
        .diary
        .change_password_in_background(session, old_password, new_password)
        .wait();
    let result = match outcome {
        Ok((session, result)) => {
            ctx.diary.logout(session);
            result
        }
        Err(error) => {
            eprintln!("Error: {error}");
            return exit_codes::exit_code_for_pending_error(&error);
        }
    };

    match result {
        Ok(()) => {
            let meta = json!({
                "kind": "passwd",
                "user": args.user,
            });
            if ctx.output_mode.quiet {
                output::print_value(String::new(), meta, &ctx.output_mode)
            } else {
                output::print_value(
                    format!("Password changed for {}", args.user),
                    meta,
                    &ctx.output_mode,
                )
            }
        }
        Err(error) => {
            eprintln!("Error: {error}");
            exit_codes::exit_code_for_diary_error(&error)
        }
    }
}

