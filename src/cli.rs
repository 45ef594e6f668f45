use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "quietquill",
    author,
    version,
    about = "An encrypted, password-protected diary.",
    long_about = "An encrypted, password-protected diary. Entries are sealed with a key derived \
                  from your password; a lost password cannot be recovered."
)]
pub struct Cli {
    #[arg(long, global = true, help = "Emit machine-readable JSON.")]
    pub json: bool,

    #[arg(long, global = true, help = "Print only identifiers or bare values.")]
    pub quiet: bool,

    #[arg(long, global = true, value_name = "PATH", help = "Diary data directory.")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Print the data directory in use.")]
    Path,

    #[command(about = "Create a new diary user.")]
    Register(UserArgs),

    #[command(about = "Write or replace an entry.")]
    Write(WriteArgs),

    #[command(about = "Decrypt and print an entry.")]
    Read(EntryArgs),

    #[command(about = "List entries, pinned first.")]
    List(UserArgs),

    #[command(about = "Search entries by text, tag, category or date.")]
    Search(SearchArgs),

    #[command(about = "List every tag in use.")]
    Tags(UserArgs),

    #[command(about = "Summarize entry counts, lengths and activity.")]
    Stats(UserArgs),

    #[command(about = "Delete an entry.")]
    Delete(EntryArgs),

    #[command(about = "Change the password and re-encrypt all entries.")]
    Passwd(UserArgs),
}

#[derive(Debug, Args)]
pub struct UserArgs {
    #[arg(short, long, help = "User name.")]
    pub user: String,
}

#[derive(Debug, Args)]
pub struct EntryArgs {
    #[arg(short, long, help = "User name.")]
    pub user: String,

    #[arg(long, help = "Entry identifier.")]
    pub id: String,
}

#[derive(Debug, Args)]
pub struct WriteArgs {
    #[arg(short, long, help = "User name.")]
    pub user: String,

    #[arg(long, help = "Entry identifier (defaults to a new random id).")]
    pub id: Option<String>,

    #[arg(long, help = "Entry title.")]
    pub title: Option<String>,

    #[arg(long = "tag", help = "Tag (repeatable).")]
    pub tags: Vec<String>,

    #[arg(long, help = "Category.")]
    pub category: Option<String>,

    #[arg(long, help = "Pin the entry to the top of listings.")]
    pub pin: bool,

    #[arg(long, help = "Entry body; read from stdin after the password when omitted.")]
    pub body: Option<String>,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(short, long, help = "User name.")]
    pub user: String,

    #[arg(long, help = "Case-insensitive text in title or body.")]
    pub text: Option<String>,

    #[arg(long, help = "Tag to match.")]
    pub tag: Option<String>,

    #[arg(long, help = "Category to match.")]
    pub category: Option<String>,

    #[arg(long, value_name = "YYYY-MM-DD", help = "Created on or after this day (UTC).")]
    pub from: Option<NaiveDate>,

    #[arg(long, value_name = "YYYY-MM-DD", help = "Created on or before this day (UTC).")]
    pub until: Option<NaiveDate>,
}
