use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use rand::{rngs::StdRng, SeedableRng};
use std::io::{self, Read};
use std::path::PathBuf;
use typelog::{
    config::{Config, ConfigStore, FileConfigStore},
    history::HistoryScraper,
    net::HttpSource,
    race_log::{decode_race_log, transitions},
    Scraper, SqliteStore,
};

/// scrape typing race replays and store their decoded keystrokes
#[derive(Parser, Debug)]
#[clap(version, about)]
pub struct Cli {
    /// sqlite database to write to (defaults to ~/.local/state/typelog/typelog.db)
    #[clap(long, global = true)]
    db: Option<PathBuf>,

    /// site root the page paths are appended to
    #[clap(long, global = true)]
    base_url: Option<String>,

    /// config file to read (and write with --save-config)
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// persist the effective settings to the config file
    #[clap(long, global = true)]
    save_config: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// decode and store the keystroke logs of a user's races
    Scrape {
        username: String,

        /// upper bound on races per user; larger histories are sampled
        #[clap(short = 'm', long)]
        max_races: Option<usize>,

        /// seed for the race sampler
        #[clap(long)]
        seed: Option<u64>,
    },
    /// store speed and accuracy for every race in a user's history
    History {
        username: String,

        /// rows requested per history page
        #[clap(short = 'n', long)]
        page_size: Option<usize>,
    },
    /// decode a raw typing log (from --payload, a file, or stdin) to csv
    Decode {
        /// file holding the raw payload
        file: Option<PathBuf>,

        /// raw payload given inline
        #[clap(short = 'p', long, conflicts_with = "file")]
        payload: Option<String>,

        /// print adjacent keystroke pairs instead of keystrokes
        #[clap(long)]
        transitions: bool,
    },
}

impl Cli {
    fn config_store(&self) -> FileConfigStore {
        match &self.config {
            Some(path) => FileConfigStore::with_path(path),
            None => FileConfigStore::new(),
        }
    }

    /// Loaded config with command line overrides applied.
    fn effective_config(&self, store: &FileConfigStore) -> Config {
        let mut cfg = store.load();
        if let Some(db) = &self.db {
            cfg.db_path = Some(db.clone());
        }
        if let Some(url) = &self.base_url {
            cfg.base_url = url.clone();
        }
        match &self.command {
            Command::Scrape {
                max_races: Some(n), ..
            } => cfg.max_races = *n,
            Command::History {
                page_size: Some(n), ..
            } => cfg.history_page_size = *n,
            _ => {}
        }
        cfg
    }
}

fn read_payload(file: Option<&PathBuf>, payload: Option<&String>) -> Result<String> {
    if let Some(p) = payload {
        return Ok(p.clone());
    }
    let mut raw = String::new();
    match file {
        Some(path) => {
            raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?
        }
        None => {
            io::stdin().read_to_string(&mut raw)?;
        }
    }
    Ok(raw.trim_end_matches(&['\n', '\r'][..]).to_string())
}

fn decode(file: Option<&PathBuf>, payload: Option<&String>, pairs: bool) -> Result<()> {
    let raw = read_payload(file, payload)?;
    let keystrokes = decode_race_log(&raw)?;

    let mut out = csv::Writer::from_writer(io::stdout());
    if pairs {
        for t in transitions(&keystrokes) {
            out.serialize(t)?;
        }
    } else {
        for k in &keystrokes {
            out.serialize(k)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg_store = cli.config_store();
    let cfg = cli.effective_config(&cfg_store);
    if cli.save_config {
        cfg_store
            .save(&cfg)
            .with_context(|| format!("saving config to {}", cfg_store.path().display()))?;
        info!("saved config to {}", cfg_store.path().display());
    }

    match &cli.command {
        Command::Decode {
            file,
            payload,
            transitions,
        } => decode(file.as_ref(), payload.as_ref(), *transitions),
        Command::Scrape { username, seed, .. } => {
            let db_path = cfg.resolved_db_path();
            info!("using database {}", db_path.display());
            let store = SqliteStore::open(&db_path)
                .with_context(|| format!("opening {}", db_path.display()))?;
            let source = HttpSource::new(&cfg.base_url, &cfg.user_agent, cfg.http_timeout())?;
            let mut scraper = Scraper::new(source, store, cfg.max_races);
            let summary = match seed {
                Some(s) => scraper.scrape_with_rng(username, &mut StdRng::seed_from_u64(*s))?,
                None => scraper.scrape(username)?,
            };
            println!(
                "{}: {} races visited, {} stored, {} skipped, {} without log, {} failed",
                username,
                summary.attempted,
                summary.stored,
                summary.skipped,
                summary.missing,
                summary.failed
            );
            Ok(())
        }
        Command::History { username, .. } => {
            let db_path = cfg.resolved_db_path();
            let mut store = SqliteStore::open(&db_path)
                .with_context(|| format!("opening {}", db_path.display()))?;
            let source = HttpSource::new(&cfg.base_url, &cfg.user_agent, cfg.http_timeout())?;
            let added =
                HistoryScraper::new(&source, &mut store, cfg.history_page_size).scrape(username)?;
            println!("{username}: {added} new races in history");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn overrides_apply_on_top_of_loaded_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let cli = Cli::parse_from([
            "typelog",
            "--config",
            path.to_str().unwrap(),
            "--db",
            "races.db",
            "scrape",
            "bob",
            "--max-races",
            "12",
        ]);
        let cfg = cli.effective_config(&cli.config_store());
        assert_eq!(cfg.max_races, 12);
        assert_eq!(cfg.db_path, Some(PathBuf::from("races.db")));
        assert_eq!(cfg.history_page_size, Config::default().history_page_size);
    }
}
