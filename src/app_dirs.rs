use directories::ProjectDirs;
use std::path::PathBuf;

const APP_NAME: &str = "typelog";

/// Default on-disk locations for the database and the config file.
pub struct AppDirs;

impl AppDirs {
    fn project() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", APP_NAME)
    }

    /// `~/.local/state/typelog/typelog.db`, or the platform data dir when
    /// `HOME` is unset.
    pub fn db_path() -> Option<PathBuf> {
        let dir = match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(".local/state").join(APP_NAME),
            None => Self::project()?.data_local_dir().to_path_buf(),
        };
        Some(dir.join(format!("{APP_NAME}.db")))
    }

    pub fn config_path() -> Option<PathBuf> {
        Self::project().map(|p| p.config_dir().join("config.json"))
    }
}
