use secrecy::SecretString;
use std::io::IsTerminal;
use std::io::{self, BufRead, Read, Write};
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("input cannot be empty")]
    Empty,

    #[error("passwords do not match")]
    Mismatch,

    #[error("entry body is not valid UTF-8")]
    InvalidUtf8,
}

/// Ask for a new password twice.
pub fn prompt_new_password(label: &str) -> Result<SecretString, PromptError> {
    let first = read_secret_line(&format!("{label}: "))?;
    if first.is_empty() {
        return Err(PromptError::Empty);
    }
    let confirm = read_secret_line(&format!("Confirm {}: ", label.to_lowercase()))?;
    if *first != *confirm {
        return Err(PromptError::Mismatch);
    }
    Ok(into_secret(first))
}

pub fn prompt_password(label: &str) -> Result<SecretString, PromptError> {
    let pw = read_secret_line(&format!("{label}: "))?;
    if pw.is_empty() {
        return Err(PromptError::Empty);
    }
    Ok(into_secret(pw))
}

/// Everything left on stdin after the password lines.
pub fn read_body() -> Result<String, PromptError> {
    if io::stdin().is_terminal() {
        eprintln!("Entry body (end with Ctrl-D):");
    }
    let mut bytes = Vec::new();
    io::stdin().lock().read_to_end(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| PromptError::InvalidUtf8)
}

fn into_secret(value: Zeroizing<String>) -> SecretString {
    SecretString::from(value.as_str().to_owned())
}

fn read_secret_line(prompt: &str) -> Result<Zeroizing<String>, PromptError> {
    eprint!("{prompt}");
    io::stderr().flush()?;

    if io::stdin().is_terminal() {
        #[cfg(unix)]
        {
            return read_line_no_echo_unix();
        }
    }

    read_line_plain()
}

fn read_line_plain() -> Result<Zeroizing<String>, PromptError> {
    let mut line = Zeroizing::new(String::new());
    io::stdin().lock().read_line(&mut line)?;
    let len = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(len);
    Ok(line)
}

#[cfg(unix)]
fn read_line_no_echo_unix() -> Result<Zeroizing<String>, PromptError> {
    use std::mem::MaybeUninit;
    use std::os::unix::io::AsRawFd;

    let stdin = io::stdin();
    let fd = stdin.as_raw_fd();

    let mut original = MaybeUninit::<libc::termios>::uninit();
    // SAFETY: `fd` is stdin and `original` is a valid out-pointer.
    if unsafe { libc::tcgetattr(fd, original.as_mut_ptr()) } != 0 {
        return read_line_plain();
    }
    // SAFETY: tcgetattr succeeded and initialized the struct.
    let original = unsafe { original.assume_init() };

    let mut modified = original;
    modified.c_lflag &= !(libc::ECHO | libc::ECHONL);
    // SAFETY: `modified` is a fully initialized termios for this fd.
    let active = unsafe { libc::tcsetattr(fd, libc::TCSANOW, &modified) } == 0;
    let _guard = TermiosGuard {
        fd,
        original,
        active,
    };

    let line = read_line_plain()?;
    eprintln!();
    Ok(line)
}

#[cfg(unix)]
struct TermiosGuard {
    fd: i32,
    original: libc::termios,
    active: bool,
}

#[cfg(unix)]
impl Drop for TermiosGuard {
    fn drop(&mut self) {
        if self.active {
            // SAFETY: restores the settings captured from the same fd.
            unsafe {
                let _ = libc::tcsetattr(self.fd, libc::TCSANOW, &self.original);
            }
        }
    }
}
