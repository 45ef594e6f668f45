use super::login;
use crate::app::AppContext;
use crate::output::entry::{
    document_json, document_text, stats_json, stats_text, summary_json, summary_text,
};
use crate::{cli, exit_codes, output, prompt};
use quietquill::diary::{EntryDocument, SearchQuery};
use serde_json::json;
use std::process::ExitCode;

pub fn write(args: cli::WriteArgs, ctx: &AppContext) -> ExitCode {
    let session = match login(&args.user, ctx) {
        Ok(session) => session,
        Err(code) => return code,
    };

    let body = match args.body {
        Some(body) => body,
        None => match prompt::read_body() {
            Ok(body) => body,
            Err(error) => {
                eprintln!("Error: {error}");
                return exit_codes::exit_code_for_prompt_error(&error);
            }
        },
    };

    let entry_id = args
        .id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let document = EntryDocument {
        title: args.title.unwrap_or_default(),
        body,
        tags: args.tags,
        category: args.category,
        pinned: args.pin,
    };

    let result = ctx.diary.save_document(&session, &entry_id, &document);
    ctx.diary.logout(session);

    match result {
        Ok(info) => {
            let meta = json!({
                "kind": "entry-write",
                "user": args.user,
                "id": info.entry_id,
                "created_at": info.created_at,
                "modified_at": info.modified_at,
                "words": document.word_count(),
                "mood": document.mood().label(),
            });
            if ctx.output_mode.quiet {
                output::print_value(info.entry_id, meta, &ctx.output_mode)
            } else {
                output::print_value(format!("Saved {}", info.entry_id), meta, &ctx.output_mode)
            }
        }
        Err(error) => {
            eprintln!("Error: {error}");
            exit_codes::exit_code_for_diary_error(&error)
        }
    }
}

pub fn read(args: cli::EntryArgs, ctx: &AppContext) -> ExitCode {
    let session = match login(&args.user, ctx) {
        Ok(session) => session,
        Err(code) => return code,
    };

    let result = ctx.diary.read_document(&session, &args.id);
    ctx.diary.logout(session);

    match result {
        Ok(doc) => {
            let meta = json!({
                "kind": "entry-read",
                "user": args.user,
                "entry": document_json(&args.id, &doc),
            });
            if ctx.output_mode.quiet {
                output::print_value(doc.body.clone(), meta, &ctx.output_mode)
            } else {
                output::print_value(document_text(&args.id, &doc), meta, &ctx.output_mode)
            }
        }
        Err(error) => {
            eprintln!("Error: {error}");
            exit_codes::exit_code_for_diary_error(&error)
        }
    }
}

pub fn list(args: cli::UserArgs, ctx: &AppContext) -> ExitCode {
    let session = match login(&args.user, ctx) {
        Ok(session) => session,
        Err(code) => return code,
    };

    let result = ctx.diary.list_documents(&session);
    ctx.diary.logout(session);

    match result {
        Ok(entries) => {
            let value = if ctx.output_mode.quiet {
                entries
                    .iter()
                    .map(|e| e.entry_id.clone())
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                entries
                    .iter()
                    .map(summary_text)
                    .collect::<Vec<_>>()
                    .join("\n")
            };

            let meta = json!({
                "kind": "entry-list",
                "user": args.user,
                "count": entries.len(),
                "entries": entries.iter().map(summary_json).collect::<Vec<_>>(),
            });

            output::print_value(value, meta, &ctx.output_mode)
        }
        Err(error) => {
            eprintln!("Error: {error}");
            exit_codes::exit_code_for_diary_error(&error)
        }
    }
}

pub fn search(args: cli::SearchArgs, ctx: &AppContext) -> ExitCode {
    let session = match login(&args.user, ctx) {
        Ok(session) => session,
        Err(code) => return code,
    };

    let query = SearchQuery {
        text: args.text,
        tag: args.tag,
        category: args.category,
        from: args.from,
        until: args.until,
    };
    let result = ctx.diary.search_documents(&session, &query);
    ctx.diary.logout(session);

    match result {
        Ok(entries) => {
            let value = if ctx.output_mode.quiet {
                entries
                    .iter()
                    .map(|e| e.entry_id.clone())
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                entries
                    .iter()
                    .map(summary_text)
                    .collect::<Vec<_>>()
                    .join("\n")
            };

            let meta = json!({
                "kind": "entry-search",
                "user": args.user,
                "query": {
                    "text": query.text,
                    "tag": query.tag,
                    "category": query.category,
                    "from": query.from,
                    "until": query.until,
                },
                "count": entries.len(),
                "entries": entries.iter().map(summary_json).collect::<Vec<_>>(),
            });

            output::print_value(value, meta, &ctx.output_mode)
        }
        Err(error) => {
            eprintln!("Error: {error}");
            exit_codes::exit_code_for_diary_error(&error)
        }
    }
}

pub fn tags(args: cli::UserArgs, ctx: &AppContext) -> ExitCode {
    let session = match login(&args.user, ctx) {
        Ok(session) => session,
        Err(code) => return code,
    };

    let result = ctx.diary.all_tags(&session);
    ctx.diary.logout(session);

    match result {
        Ok(tags) => {
            let meta = json!({
                "kind": "entry-tags",
                "user": args.user,
                "tags": tags,
            });
            output::print_value(tags.join("\n"), meta, &ctx.output_mode)
        }
        Err(error) => {
            eprintln!("Error: {error}");
            exit_codes::exit_code_for_diary_error(&error)
        }
    }
}

pub fn stats(args: cli::UserArgs, ctx: &AppContext) -> ExitCode {
    let session = match login(&args.user, ctx) {
        Ok(session) => session,
        Err(code) => return code,
    };

    let result = ctx.diary.stats(&session);
    ctx.diary.logout(session);

    match result {
        Ok(stats) => {
            let meta = json!({
                "kind": "entry-stats",
                "user": args.user,
                "stats": stats_json(&stats),
            });
            if ctx.output_mode.quiet {
                output::print_value(stats.total_entries.to_string(), meta, &ctx.output_mode)
            } else {
                output::print_value(stats_text(&stats), meta, &ctx.output_mode)
            }
        }
        Err(error) => {
            eprintln!("Error: {error}");
            exit_codes::exit_code_for_diary_error(&error)
        }
    }
}

pub fn delete(args: cli::EntryArgs, ctx: &AppContext) -> ExitCode {
    let session = match login(&args.user, ctx) {
        Ok(session) => session,
        Err(code) => return code,
    };

    let result = ctx.diary.delete_entry(&session, &args.id);
    ctx.diary.logout(session);

    match result {
        Ok(()) => {
            let meta = json!({
                "kind": "entry-delete",
                "user": args.user,
                "id": args.id,
            });
            if ctx.output_mode.quiet {
                output::print_value(args.id.clone(), meta, &ctx.output_mode)
            } else {
                output::print_value(format!("Deleted {}", args.id), meta, &ctx.output_mode)
            }
        }
        Err(error) => {
            eprintln!("Error: {error}");
            exit_codes::exit_code_for_diary_error(&error)
        }
    }
}
