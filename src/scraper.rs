//! Fetching race pages and driving them into the store.

use crate::error::ScrapeError;
use crate::net::{profile_path, race_path, PageSource};
use crate::page::{extract_max_race_id, extract_race_page};
use crate::race_log::{decode_race_log, RaceLog};
use crate::store::Store;
use log::{error, info, warn};
use rand::Rng;

/// What happened to a single race. Failures are reported as `Err` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum RaceOutcome {
    #[strum(serialize = "stored")]
    Stored { keystrokes: usize },
    /// Keystrokes for this user, text and race were already stored.
    #[strum(serialize = "duplicate")]
    Duplicate,
    /// Skipped before fetching: the race is already in the store.
    #[strum(serialize = "already recorded")]
    AlreadyRecorded,
    /// The result page had no typing log script.
    #[strum(serialize = "missing log")]
    MissingLog,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeSummary {
    pub attempted: usize,
    pub stored: usize,
    pub skipped: usize,
    pub missing: usize,
    pub failed: usize,
}

impl ScrapeSummary {
    fn record(&mut self, result: &Result<RaceOutcome, ScrapeError>) {
        self.attempted += 1;
        match result {
            Ok(RaceOutcome::Stored { .. }) => self.stored += 1,
            Ok(RaceOutcome::Duplicate) | Ok(RaceOutcome::AlreadyRecorded) => self.skipped += 1,
            Ok(RaceOutcome::MissingLog) => self.missing += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Race ids to visit for a user whose latest race is `max_race_id`.
///
/// All of `1..=max_race_id` in order, or a uniform sample of `max_races`
/// distinct ids when the history is larger than that.
pub fn sample_race_ids<R: Rng + ?Sized>(
    max_race_id: i64,
    max_races: usize,
    rng: &mut R,
) -> Vec<i64> {
    if max_race_id <= 0 {
        return Vec::new();
    }
    let total = max_race_id as usize;
    if total > max_races {
        rand::seq::index::sample(rng, total, max_races)
            .into_iter()
            .map(|i| i as i64 + 1)
            .collect()
    } else {
        (1..=max_race_id).collect()
    }
}

/// Scrapes keystroke logs for one user at a time, one race after another.
#[derive(Debug)]
pub struct Scraper<S: PageSource, D: Store> {
    source: S,
    store: D,
    max_races: usize,
}

impl<S: PageSource, D: Store> Scraper<S, D> {
    pub fn new(source: S, store: D, max_races: usize) -> Self {
        Self {
            source,
            store,
            max_races,
        }
    }

    pub fn store(&self) -> &D {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut D {
        &mut self.store
    }

    pub fn into_store(self) -> D {
        self.store
    }

    pub fn max_race_id(&self, username: &str) -> Result<i64, ScrapeError> {
        let html = self.source.fetch(&profile_path(username))?;
        extract_max_race_id(&html)
    }

    /// Fetch, decode and store one race of `username`.
    pub fn fetch_and_store_race(
        &mut self,
        username: &str,
        race_id: i64,
    ) -> Result<RaceOutcome, ScrapeError> {
        let user_id = self.store.user_exists_or_create(username)?;
        self.store_race(username, user_id, race_id)
    }

    fn store_race(
        &mut self,
        username: &str,
        user_id: i64,
        race_id: i64,
    ) -> Result<RaceOutcome, ScrapeError> {
        if self.store.race_recorded(user_id, race_id)? {
            return Ok(RaceOutcome::AlreadyRecorded);
        }

        let html = self.source.fetch(&race_path(username, race_id))?;
        let Some(page) = extract_race_page(&html)? else {
            warn!("failed to fetch data for {username}|{race_id}");
            return Ok(RaceOutcome::MissingLog);
        };

        self.store.text_upsert(page.text_id, &page.text)?;

        let log = RaceLog {
            text_id: page.text_id,
            user_id,
            race_id,
            race_date: page.race_date,
            keystrokes: decode_race_log(&page.typing_log)?,
        };

        if self.store.keystrokes_exist(user_id, log.text_id, race_id)? {
            return Ok(RaceOutcome::Duplicate);
        }
        let keystrokes = self.store.bulk_insert_keystrokes(&log)?;
        Ok(RaceOutcome::Stored { keystrokes })
    }

    pub fn scrape(&mut self, username: &str) -> Result<ScrapeSummary, ScrapeError> {
        self.scrape_with_rng(username, &mut rand::thread_rng())
    }

    /// Walk a user's races. Only resolving the user and their race count can
    /// fail the whole scrape; each race is handled on its own.
    pub fn scrape_with_rng<R: Rng + ?Sized>(
        &mut self,
        username: &str,
        rng: &mut R,
    ) -> Result<ScrapeSummary, ScrapeError> {
        let user_id = self.store.user_exists_or_create(username)?;
        let max_race_id = self.max_race_id(username)?;
        let race_ids = sample_race_ids(max_race_id, self.max_races, rng);
        info!(
            "{username}: latest race {max_race_id}, visiting {} races",
            race_ids.len()
        );

        let mut summary = ScrapeSummary::default();
        for (i, &race_id) in race_ids.iter().enumerate() {
            let result = self.store_race(username, user_id, race_id);
            match &result {
                Ok(outcome) => info!("[{i}] race {race_id}: {outcome}"),
                Err(e) => error!("[{i}] race {race_id} failed: {e}"),
            }
            summary.record(&result);
        }
        info!(
            "{username}: {} stored, {} skipped, {} without log, {} failed",
            summary.stored, summary.skipped, summary.missing, summary.failed
        );
        Ok(summary)
    }
}
