use crate::error::ScrapeError;
use crate::net::{history_path, PageSource};
use crate::page::extract_race_history;
use crate::store::{RaceSummary, Store};
use log::info;
use std::collections::HashSet;

/// Pages through a user's race history, saving speed and accuracy per race.
pub struct HistoryScraper<'a, S: PageSource, D: Store> {
    source: &'a S,
    store: &'a mut D,
    page_size: usize,
}

impl<'a, S: PageSource, D: Store> HistoryScraper<'a, S, D> {
    pub fn new(source: &'a S, store: &'a mut D, page_size: usize) -> Self {
        Self {
            source,
            store,
            page_size,
        }
    }

    /// Returns the number of new summaries stored.
    ///
    /// Each page starts at the date of the previous page's last row, so pages
    /// overlap; we stop once a page brings no race we have not seen yet.
    pub fn scrape(&mut self, username: &str) -> Result<usize, ScrapeError> {
        let user_id = self.store.user_exists_or_create(username)?;
        let mut seen = HashSet::new();
        let mut start_date: Option<String> = None;
        let mut added = 0;

        loop {
            let path = history_path(username, self.page_size, start_date.as_deref());
            let html = self.source.fetch(&path)?;
            let Some(rows) = extract_race_history(&html) else {
                break;
            };

            let fresh: Vec<RaceSummary> = rows
                .iter()
                .filter(|r| seen.insert(r.race_id))
                .map(|r| RaceSummary {
                    user_id,
                    race_date: r.race_date,
                    race_id: r.race_id,
                    wpm: r.wpm,
                    accuracy: r.accuracy,
                })
                .collect();
            if fresh.is_empty() {
                break;
            }
            added += self.store.insert_race_summaries(&fresh)?;
            info!("{username}: {} history rows, {added} new so far", fresh.len());

            start_date = rows
                .last()
                .map(|r| r.race_date.format("%Y-%m-%d").to_string());
        }
        Ok(added)
    }
}
