use quietquill::diary::{DiaryStats, EntryDocument, EntrySummary};
use serde_json::json;

pub fn summary_text(summary: &EntrySummary) -> String {
    let pin = if summary.pinned { "*" } else { "" };
    format!(
        "{}\t{}{}\t{}\t{}",
        summary.entry_id,
        pin,
        summary.title,
        summary.category.as_deref().unwrap_or(""),
        summary.tags.join(",")
    )
}

pub fn summary_json(summary: &EntrySummary) -> serde_json::Value {
    json!({
        "id": summary.entry_id,
        "title": summary.title,
        "tags": summary.tags,
        "category": summary.category,
        "pinned": summary.pinned,
        "created_at": summary.created_at,
        "modified_at": summary.modified_at,
    })
}

pub fn document_json(id: &str, doc: &EntryDocument) -> serde_json::Value {
    json!({
        "id": id,
        "title": doc.title,
        "body": doc.body,
        "tags": doc.tags,
        "category": doc.category,
        "pinned": doc.pinned,
        "words": doc.word_count(),
        "mood": doc.mood().label(),
    })
}

pub fn document_text(id: &str, doc: &EntryDocument) -> String {
    let mut out = String::new();
    out.push_str(&format!("id:\t{id}\n"));
    if !doc.title.is_empty() {
        out.push_str(&format!("title:\t{}\n", doc.title));
    }
    if !doc.tags.is_empty() {
        out.push_str(&format!("tags:\t{}\n", doc.tags.join(",")));
    }
    if let Some(category) = &doc.category {
        out.push_str(&format!("category:\t{category}\n"));
    }
    if doc.pinned {
        out.push_str("pinned:\tyes\n");
    }
    out.push_str(&format!(
        "words:\t{} | mood: {}\n\n",
        doc.word_count(),
        doc.mood().label()
    ));
    out.push_str(doc.body.trim_end_matches('\n'));
    out
}

pub fn stats_json(stats: &DiaryStats) -> serde_json::Value {
    json!({
        "total_entries": stats.total_entries,
        "total_words": stats.total_words,
        "average_words": stats.average_words,
        "longest": stats.longest,
        "most_active_day": stats.most_active_day,
        "earliest": stats.earliest,
        "latest": stats.latest,
    })
}

pub fn stats_text(stats: &DiaryStats) -> String {
    let or_none = |value: Option<String>| value.unwrap_or_else(|| "N/A".to_string());
    [
        format!("Total entries: {}", stats.total_entries),
        format!(
            "Longest entry: {}",
            or_none(
                stats
                    .longest
                    .as_ref()
                    .map(|l| format!("{} ({} words)", l.title, l.words))
            )
        ),
        format!("Average words per entry: {}", stats.average_words),
        format!(
            "Most active day: {}",
            or_none(
                stats
                    .most_active_day
                    .map(|d| format!("{} ({} entries)", d.day, d.entries))
            )
        ),
        format!("Earliest entry: {}", or_none(stats.earliest.map(|d| d.to_string()))),
        format!("Latest entry: {}", or_none(stats.latest.map(|d| d.to_string()))),
    ]
    .join("\n")
}
