use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Durable progress of the harvest
///
/// Rewritten after every committed article, always in the same transaction
/// as the article row, so it never points past what is actually stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlState {
    /// Primary key the next committed article receives
    pub next_key: i64,

    /// Listing page holding the last finished backlog article
    pub last_page: u32,

    /// Last finished backlog article
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_article: Option<String>,

    /// Newest article known at the last catch-up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub most_recent: Option<String>,

    /// Sequence number the next stored attachment receives
    pub next_attachment: u64,
}

impl Default for CrawlState {
    fn default() -> Self {
        Self {
            next_key: 1,
            last_page: 1,
            last_article: None,
            most_recent: None,
            next_attachment: 1,
        }
    }
}

/// Position reached by a finished article
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressCursor {
    /// A new article from the catch-up walk
    CatchUp { identifier: String },

    /// A backlog article and the listing page it was found on
    Backlog { page: u32, identifier: String },
}

const KEY_NEXT_KEY: &str = "next_key";
const KEY_LAST_PAGE: &str = "last_page";
const KEY_LAST_ARTICLE: &str = "last_article";
const KEY_MOST_RECENT: &str = "most_recent";
const KEY_NEXT_ATTACHMENT: &str = "next_attachment";

impl CrawlState {
    /// Moves the progress markers to `cursor`
    pub fn apply(&mut self, cursor: &ProgressCursor) {
        match cursor {
            ProgressCursor::CatchUp { identifier } => {
                self.most_recent = Some(identifier.clone());
            }
            ProgressCursor::Backlog { page, identifier } => {
                self.last_page = *page;
                self.last_article = Some(identifier.clone());
            }
        }
    }

    /// Flattens the state into key/value pairs for the `crawl_state` table
    pub fn to_pairs(&self) -> Vec<(&'static str, Option<String>)> {
        vec![
            (KEY_NEXT_KEY, Some(self.next_key.to_string())),
            (KEY_LAST_PAGE, Some(self.last_page.to_string())),
            (KEY_LAST_ARTICLE, self.last_article.clone()),
            (KEY_MOST_RECENT, self.most_recent.clone()),
            (KEY_NEXT_ATTACHMENT, Some(self.next_attachment.to_string())),
        ]
    }

    /// Rebuilds the state from `crawl_state` rows
    ///
    /// Returns `Ok(None)` when no rows exist yet. Missing optional keys fall
    /// back to defaults; unparseable numbers are an error.
    pub fn from_pairs(pairs: &HashMap<String, String>) -> Result<Option<Self>, String> {
        if pairs.is_empty() {
            return Ok(None);
        }

        let defaults = Self::default();

        let next_key = parse_or(pairs, KEY_NEXT_KEY, defaults.next_key)?;
        let last_page = parse_or(pairs, KEY_LAST_PAGE, defaults.last_page)?;
        let next_attachment = parse_or(pairs, KEY_NEXT_ATTACHMENT, defaults.next_attachment)?;

        Ok(Some(Self {
            next_key,
            last_page,
            last_article: pairs.get(KEY_LAST_ARTICLE).cloned(),
            most_recent: pairs.get(KEY_MOST_RECENT).cloned(),
            next_attachment,
        }))
    }
}

fn parse_or<T: std::str::FromStr>(
    pairs: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, String> {
    match pairs.get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| format!("invalid value '{}' for crawl state key '{}'", raw, key)),
        None => Ok(default),
    }
}
