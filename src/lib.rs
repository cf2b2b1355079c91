// Library surface shared by the binary and the integration tests.
pub mod app_dirs;
pub mod config;
pub mod delim;
pub mod error;
pub mod history;
pub mod html;
pub mod net;
pub mod page;
pub mod race_log;
pub mod scraper;
pub mod store;
pub mod token;

pub use error::{DecodeError, ScrapeError};
pub use race_log::{decode_race_log, Keystroke, RaceLog, Transition};
pub use scraper::{RaceOutcome, ScrapeSummary, Scraper};
pub use store::{MemoryStore, SqliteStore, Store};
