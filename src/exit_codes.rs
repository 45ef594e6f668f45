use crate::prompt::PromptError;
use quietquill::config::ConfigError;
use quietquill::diary::{DiaryError, PendingError};
use std::process::ExitCode;

pub const EXIT_USAGE: u8 = 64;
pub const EXIT_IO: u8 = 2;
pub const EXIT_SOFTWARE: u8 = 1;

pub fn exit_code_for_config_error(error: &ConfigError) -> ExitCode {
    use ConfigError::*;

    match error {
        ConfigDirUnavailable | DataDirUnavailable | Io(_) => ExitCode::from(EXIT_IO),
        Parse(_) | InvalidKdf(_) => ExitCode::from(EXIT_USAGE),
    }
}

pub fn exit_code_for_prompt_error(error: &PromptError) -> ExitCode {
    use PromptError::*;

    match error {
        Io(_) => ExitCode::from(EXIT_IO),
        Empty | Mismatch | InvalidUtf8 => ExitCode::from(EXIT_USAGE),
    }
}

pub fn exit_code_for_diary_error(error: &DiaryError) -> ExitCode {
    use DiaryError::*;

    match error {
        StorageUnavailable(_) => ExitCode::from(EXIT_IO),
        DuplicateUser | UserNotFound | WrongPassword | InvalidInput(_) | EntryNotFound(_)
        | NotLoggedIn | SessionExpired => ExitCode::from(EXIT_USAGE),
        IntegrityFailure(_) | CorruptRecord(_) | Crypto(_) => ExitCode::from(EXIT_SOFTWARE),
    }
}

pub fn exit_code_for_pending_error(error: &PendingError) -> ExitCode {
    match error {
        PendingError::Lost => ExitCode::from(EXIT_SOFTWARE),
    }
}
