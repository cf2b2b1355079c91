use assert_matches::assert_matches;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::Mutex;
use typelog::error::ScrapeError;
use typelog::net::{profile_path, race_path, PageSource, StaticSource};
use typelog::store::RaceSummary;
use typelog::{MemoryStore, RaceLog, RaceOutcome, Scraper, SqliteStore, Store};

fn race_page(payload: &str, text_id: i64) -> String {
    format!(
        r#"<html><head><script>
var typingLog = "{payload},";
</script></head><body>
<table class="raceDetails"><tr><td>Date</td><td>Sat, 12 Mar 2016 10:20:11</td></tr></table>
<div class="fullTextStr">ab</div>
<a href="/pit/text_info?id={text_id}">text</a>
</body></html>"#
    )
}

fn profile_page(max_race_id: i64) -> String {
    format!(
        r#"<table class="scoresTable"><tr><th>Race</th></tr>
<tr><td><a href="/pit/result?id=|tr:bob|{max_race_id}">{max_race_id}</a></td></tr></table>"#
    )
}

/// Records every fetched path so tests can see which races were visited.
struct RecordingSource {
    inner: StaticSource,
    fetched: Mutex<Vec<String>>,
}

impl RecordingSource {
    fn new(inner: StaticSource) -> Self {
        Self {
            inner,
            fetched: Mutex::new(Vec::new()),
        }
    }

    fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

impl PageSource for RecordingSource {
    fn fetch(&self, path: &str) -> Result<String, ScrapeError> {
        self.fetched.lock().unwrap().push(path.to_string());
        self.inner.fetch(path)
    }
}

/// Never reports a race as recorded, so every fetch reaches the write guard.
#[derive(Default)]
struct ForgetfulStore {
    inner: MemoryStore,
}

impl Store for ForgetfulStore {
    fn user_exists_or_create(&mut self, username: &str) -> rusqlite::Result<i64> {
        self.inner.user_exists_or_create(username)
    }

    fn text_upsert(&mut self, text_id: i64, raw_text: &str) -> rusqlite::Result<()> {
        self.inner.text_upsert(text_id, raw_text)
    }

    fn keystrokes_exist(&self, user_id: i64, text_id: i64, race_id: i64) -> rusqlite::Result<bool> {
        self.inner.keystrokes_exist(user_id, text_id, race_id)
    }

    fn race_recorded(&self, _user_id: i64, _race_id: i64) -> rusqlite::Result<bool> {
        Ok(false)
    }

    fn bulk_insert_keystrokes(&mut self, log: &RaceLog) -> rusqlite::Result<usize> {
        self.inner.bulk_insert_keystrokes(log)
    }

    fn keystroke_count(&self, user_id: i64, text_id: i64, race_id: i64) -> rusqlite::Result<usize> {
        self.inner.keystroke_count(user_id, text_id, race_id)
    }

    fn insert_race_summaries(&mut self, rows: &[RaceSummary]) -> rusqlite::Result<usize> {
        self.inner.insert_race_summaries(rows)
    }
}

#[test]
fn stores_decoded_race() {
    let source = StaticSource::new()
        .with_page(race_path("bob", 1), race_page("0|0,2,50,0+a,50,1-b", 9));
    let mut scraper = Scraper::new(source, MemoryStore::new(), 10);

    let outcome = scraper.fetch_and_store_race("bob", 1).unwrap();
    assert_eq!(outcome, RaceOutcome::Stored { keystrokes: 3 });

    let store = scraper.store();
    assert_eq!(store.texts.get(&9).map(String::as_str), Some("ab"));
    let log = store.race_log(1, 9, 1).unwrap();
    assert_eq!(log.keystrokes[1].ch, "a");
    assert_eq!(log.keystrokes[1].ms, 50);
    assert_eq!(log.keystrokes[2].ch_index, 1);
    assert!(!log.keystrokes[2].forward);
}

#[test]
fn second_fetch_is_a_no_op() {
    let source = StaticSource::new().with_page(race_path("bob", 1), race_page("0,1,40,0+a", 9));
    let mut scraper = Scraper::new(source, MemoryStore::new(), 10);

    assert_matches!(
        scraper.fetch_and_store_race("bob", 1),
        Ok(RaceOutcome::Stored { .. })
    );
    assert_matches!(
        scraper.fetch_and_store_race("bob", 1),
        Ok(RaceOutcome::AlreadyRecorded)
    );
    assert_eq!(scraper.store().bulk_writes, 1);
    assert_eq!(scraper.store().keystroke_count(1, 9, 1).unwrap(), 2);
}

#[test]
fn second_fetch_is_a_no_op_in_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("t.db")).unwrap();
    let source = StaticSource::new().with_page(race_path("bob", 4), race_page("0,1,40,0+a", 9));
    let mut scraper = Scraper::new(source, store, 10);

    assert_matches!(
        scraper.fetch_and_store_race("bob", 4),
        Ok(RaceOutcome::Stored { keystrokes: 2 })
    );
    assert_matches!(
        scraper.fetch_and_store_race("bob", 4),
        Ok(RaceOutcome::AlreadyRecorded)
    );
    assert_eq!(scraper.store().keystroke_count(1, 9, 4).unwrap(), 2);
}

#[test]
fn refetched_race_is_not_written_twice() {
    let source = StaticSource::new().with_page(race_path("bob", 5), race_page("0,1,40,0+a", 9));
    let mut scraper = Scraper::new(source, ForgetfulStore::default(), 10);

    assert_matches!(
        scraper.fetch_and_store_race("bob", 5),
        Ok(RaceOutcome::Stored { keystrokes: 2 })
    );
    assert_matches!(
        scraper.fetch_and_store_race("bob", 5),
        Ok(RaceOutcome::Duplicate)
    );
    assert_eq!(scraper.store().inner.bulk_writes, 1);
    assert_eq!(scraper.store().keystroke_count(1, 9, 5).unwrap(), 2);
}

#[test]
fn page_without_log_is_skipped() {
    let source = StaticSource::new()
        .with_page(race_path("bob", 2), "<html><body>private</body></html>");
    let mut scraper = Scraper::new(source, MemoryStore::new(), 10);

    assert_matches!(
        scraper.fetch_and_store_race("bob", 2),
        Ok(RaceOutcome::MissingLog)
    );
    assert_eq!(scraper.store().race_count(), 0);
    assert!(scraper.store().texts.is_empty());
}

#[test]
fn undecodable_log_writes_nothing() {
    let source = StaticSource::new().with_page(race_path("bob", 3), race_page("0,2,40,0+a", 9));
    let mut scraper = Scraper::new(source, MemoryStore::new(), 10);

    assert_matches!(
        scraper.fetch_and_store_race("bob", 3),
        Err(ScrapeError::Decode(_))
    );
    assert_eq!(scraper.store().race_count(), 0);
}

#[test]
fn scrape_continues_past_failed_races() {
    let source = StaticSource::new()
        .with_page(profile_path("bob"), profile_page(4))
        .with_page(race_path("bob", 1), race_page("0,1,40,0+a", 1))
        // race 2 missing from the source: fetch fails
        .with_page(race_path("bob", 3), "<html></html>")
        .with_page(race_path("bob", 4), race_page("0,1,40,0+b", 2));
    let mut scraper = Scraper::new(source, MemoryStore::new(), 10);

    let summary = scraper.scrape("bob").unwrap();
    assert_eq!(summary.attempted, 4);
    assert_eq!(summary.stored, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.missing, 1);
    assert_eq!(scraper.store().race_count(), 2);

    // re-running only retries what never made it into the store
    let again = scraper.scrape("bob").unwrap();
    assert_eq!(again.stored, 0);
    assert_eq!(again.skipped, 2);
}

#[test]
fn write_failure_is_contained_to_the_race() {
    let source = StaticSource::new()
        .with_page(profile_path("bob"), profile_page(2))
        .with_page(race_path("bob", 1), race_page("0,1,40,0+a", 1))
        .with_page(race_path("bob", 2), race_page("0,1,40,0+b", 1));
    let mut store = MemoryStore::new();
    store.user_exists_or_create("bob").unwrap();
    let mut scraper = Scraper::new(source, store, 10);
    scraper.store_mut().fail_writes = true;

    let summary = scraper.scrape("bob").unwrap();
    assert_eq!(summary.failed, 2);
    assert_eq!(scraper.store().race_count(), 0);
}

#[test]
fn large_history_is_sampled() {
    let mut pages = StaticSource::new().with_page(profile_path("bob"), profile_page(50));
    for id in 1..=50 {
        pages = pages.with_page(race_path("bob", id), race_page("0,1,10,0+x", 1));
    }
    let source = RecordingSource::new(pages);
    let mut scraper = Scraper::new(&source, MemoryStore::new(), 5);

    let summary = scraper
        .scrape_with_rng("bob", &mut StdRng::seed_from_u64(3))
        .unwrap();
    assert_eq!(summary.attempted, 5);
    assert_eq!(summary.stored, 5);

    let races: Vec<String> = source
        .fetched()
        .into_iter()
        .filter(|p| p.starts_with("result"))
        .collect();
    let unique: HashSet<&String> = races.iter().collect();
    assert_eq!(races.len(), 5);
    assert_eq!(unique.len(), 5);
}

#[test]
fn missing_profile_fails_the_scrape() {
    let mut scraper = Scraper::new(StaticSource::new(), MemoryStore::new(), 10);
    assert_matches!(
        scraper.scrape("ghost"),
        Err(ScrapeError::Status { status: 404, .. })
    );
}
