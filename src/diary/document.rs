//! Structured diary entries.
//!
//! Title, tags, category and the pin flag are serialized into the entry's
//! plaintext, so they are encrypted with the body. Listing and search decrypt
//! in memory for the live session; nothing searchable is stored in the clear.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::diary::error::{DiaryError, DiaryResult};
use crate::diary::ops::{Diary, EntryInfo};
use crate::diary::session::Session;

const HAPPY_WORDS: &[&str] = &[
    "happy", "joy", "excited", "love", "grateful", "awesome", "smile",
];
const SAD_WORDS: &[&str] = &[
    "sad", "tired", "angry", "depressed", "cry", "lonely", "hate",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryDocument {
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub pinned: bool,
}

impl EntryDocument {
    pub fn word_count(&self) -> usize {
        word_count(&self.body)
    }

    pub fn mood(&self) -> Mood {
        Mood::of(&self.body)
    }

    fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySummary {
    pub entry_id: String,
    pub title: String,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub pinned: bool,
    pub created_at: u64,
    pub modified_at: u64,
}

impl EntrySummary {
    /// Untitled entries, raw payloads included, are listed under their id.
    fn new(info: EntryInfo, document: &EntryDocument) -> Self {
        Self {
            title: display_title(&info, document),
            entry_id: info.entry_id,
            tags: document.tags.clone(),
            category: document.category.clone(),
            pinned: document.pinned,
            created_at: info.created_at,
            modified_at: info.modified_at,
        }
    }

    fn display_order(&self, other: &Self) -> Ordering {
        other
            .pinned
            .cmp(&self.pinned)
            .then_with(|| self.title.to_lowercase().cmp(&other.title.to_lowercase()))
            .then_with(|| self.entry_id.cmp(&other.entry_id))
    }
}

/// Filters combined with AND; an empty query matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    /// Case-insensitive substring of title or body.
    pub text: Option<String>,
    pub tag: Option<String>,
    pub category: Option<String>,
    /// Earliest creation day (UTC), inclusive.
    pub from: Option<NaiveDate>,
    /// Latest creation day (UTC), inclusive.
    pub until: Option<NaiveDate>,
}

impl SearchQuery {
    fn matches(&self, info: &EntryInfo, document: &EntryDocument) -> bool {
        if self.from.is_some() || self.until.is_some() {
            let Some(day) = utc_day(info.created_at) else {
                return false;
            };
            let too_early = self.from.is_some_and(|from| day < from);
            let too_late = self.until.is_some_and(|until| day > until);
            if too_early || too_late {
                return false;
            }
        }
        if let Some(text) = self.text.as_deref().map(str::to_lowercase) {
            if !document.title.to_lowercase().contains(&text)
                && !document.body.to_lowercase().contains(&text)
            {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !document.has_tag(tag) {
                return false;
            }
        }
        if let Some(category) = &self.category {
            let same = document
                .category
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(category.trim()));
            if !same {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Mood {
    Happy,
    Sad,
    Neutral,
}

impl Mood {
    /// Word-list sentiment: +1 per happy word, -1 per sad word.
    pub fn of(text: &str) -> Self {
        let score: i64 = text
            .split_whitespace()
            .map(|word| {
                let word = word.to_lowercase();
                if HAPPY_WORDS.contains(&word.as_str()) {
                    1
                } else if SAD_WORDS.contains(&word.as_str()) {
                    -1
                } else {
                    0
                }
            })
            .sum();
        match score.cmp(&0) {
            Ordering::Greater => Mood::Happy,
            Ordering::Less => Mood::Sad,
            Ordering::Equal => Mood::Neutral,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Mood::Happy => "happy",
            Mood::Sad => "sad",
            Mood::Neutral => "neutral",
        }
    }
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Calendar day (UTC) of a unix timestamp.
pub fn utc_day(timestamp: u64) -> Option<NaiveDate> {
    let secs = i64::try_from(timestamp).ok()?;
    DateTime::<Utc>::from_timestamp(secs, 0).map(|at| at.date_naive())
}

pub(crate) fn display_title(info: &EntryInfo, document: &EntryDocument) -> String {
    if document.title.trim().is_empty() {
        info.entry_id.clone()
    } else {
        document.title.clone()
    }
}

impl Diary {
    pub fn save_document(
        &self,
        session: &Session,
        entry_id: &str,
        document: &EntryDocument,
    ) -> DiaryResult<EntryInfo> {
        let document = normalized(document);
        let payload = zeroize::Zeroizing::new(
            serde_json::to_vec(&document)
                .map_err(|_| DiaryError::InvalidInput("entry cannot be serialized"))?,
        );
        self.save_entry(session, entry_id, &payload)
    }

    /// Read an entry as a document. Raw payloads that are not documents come
    /// back as a body with no metadata.
    pub fn read_document(&self, session: &Session, entry_id: &str) -> DiaryResult<EntryDocument> {
        let plaintext = self.read_entry(session, entry_id)?;
        Ok(parse_payload(&plaintext))
    }

    /// Summaries of every readable entry, pinned first then by title.
    pub fn list_documents(&self, session: &Session) -> DiaryResult<Vec<EntrySummary>> {
        let mut summaries: Vec<EntrySummary> = self
            .readable_documents(session)?
            .into_iter()
            .map(|(info, doc)| EntrySummary::new(info, &doc))
            .collect();
        summaries.sort_by(EntrySummary::display_order);
        Ok(summaries)
    }

    pub fn search_documents(
        &self,
        session: &Session,
        query: &SearchQuery,
    ) -> DiaryResult<Vec<EntrySummary>> {
        let mut hits: Vec<EntrySummary> = self
            .readable_documents(session)?
            .into_iter()
            .filter(|(info, doc)| query.matches(info, doc))
            .map(|(info, doc)| EntrySummary::new(info, &doc))
            .collect();
        hits.sort_by(EntrySummary::display_order);
        Ok(hits)
    }

    /// Sorted, de-duplicated tags across all readable entries.
    pub fn all_tags(&self, session: &Session) -> DiaryResult<Vec<String>> {
        let tags: BTreeSet<String> = self
            .readable_documents(session)?
            .into_iter()
            .flat_map(|(_, doc)| doc.tags)
            .collect();
        Ok(tags.into_iter().collect())
    }

    /// Decrypt every entry the way [`Diary::read_document`] does; integrity
    /// failures are logged and skipped.
    pub(crate) fn readable_documents(
        &self,
        session: &Session,
    ) -> DiaryResult<Vec<(EntryInfo, EntryDocument)>> {
        let mut out = Vec::new();
        for info in self.entries(session)? {
            match self.read_entry(session, &info.entry_id) {
                Ok(plaintext) => out.push((info, parse_payload(&plaintext))),
                Err(DiaryError::IntegrityFailure(id)) | Err(DiaryError::EntryNotFound(id)) => {
                    warn!(user = %session.user_id(), entry = %id, "skipping unreadable entry");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(out)
    }
}

fn normalized(document: &EntryDocument) -> EntryDocument {
    let mut tags: Vec<String> = Vec::new();
    for tag in document.tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            tags.push(tag.to_string());
        }
    }
    EntryDocument {
        title: document.title.trim().to_string(),
        body: document.body.clone(),
        tags,
        category: document
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string),
        pinned: document.pinned,
    }
}

fn parse_payload(plaintext: &[u8]) -> EntryDocument {
    serde_json::from_slice(plaintext).unwrap_or_else(|_| EntryDocument {
        body: String::from_utf8_lossy(plaintext).into_owned(),
        ..EntryDocument::default()
    })
}
