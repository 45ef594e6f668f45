//! Writing statistics over a user's readable entries.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::diary::document::{display_title, utc_day};
use crate::diary::error::DiaryResult;
use crate::diary::ops::Diary;
use crate::diary::session::Session;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LongestEntry {
    pub entry_id: String,
    pub title: String,
    pub words: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActiveDay {
    pub day: NaiveDate,
    pub entries: usize,
}

/// Days are creation days in UTC. Entries that fail authentication are not
/// counted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiaryStats {
    pub total_entries: usize,
    pub total_words: usize,
    /// Rounded down.
    pub average_words: usize,
    /// Most words; the first by entry id on a tie.
    pub longest: Option<LongestEntry>,
    /// Most entries created; the earliest day on a tie.
    pub most_active_day: Option<ActiveDay>,
    pub earliest: Option<NaiveDate>,
    pub latest: Option<NaiveDate>,
}

impl Diary {
    pub fn stats(&self, session: &Session) -> DiaryResult<DiaryStats> {
        let mut stats = DiaryStats::default();
        let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();

        for (info, doc) in self.readable_documents(session)? {
            let words = doc.word_count();
            stats.total_entries += 1;
            stats.total_words += words;

            if stats.longest.as_ref().is_none_or(|longest| words > longest.words) {
                stats.longest = Some(LongestEntry {
                    title: display_title(&info, &doc),
                    entry_id: info.entry_id.clone(),
                    words,
                });
            }
            if let Some(day) = utc_day(info.created_at) {
                *per_day.entry(day).or_default() += 1;
            }
        }

        if stats.total_entries > 0 {
            stats.average_words = stats.total_words / stats.total_entries;
        }
        stats.earliest = per_day.keys().next().copied();
        stats.latest = per_day.keys().next_back().copied();
        stats.most_active_day = per_day
            .into_iter()
            .fold(None, |best: Option<ActiveDay>, (day, entries)| match best {
                Some(best) if best.entries >= entries => Some(best),
                _ => Some(ActiveDay { day, entries }),
            });
        Ok(stats)
    }
}
