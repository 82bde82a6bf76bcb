//! Per-user locations: the home `.env` file and the run log directory.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

/// Overrides the home directory; the integration tests point it at a temp dir.
pub const HOME_OVERRIDE_ENV: &str = "DOCBATCH_HOME";

const HOME_CANDIDATES: [&str; 3] = [HOME_OVERRIDE_ENV, "HOME", "USERPROFILE"];
const STATE_DIR: &str = ".docbatch";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocbatchHome {
    root: PathBuf,
}

impl DocbatchHome {
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// First non-empty of `DOCBATCH_HOME`, `HOME`, `USERPROFILE`.
    pub fn locate() -> Option<Self> {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Option<Self> {
        HOME_CANDIDATES
            .into_iter()
            .find_map(|key| lookup(key).filter(|value| !value.is_empty()))
            .map(Self::at)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn env_file(&self) -> PathBuf {
        self.root.join(".env")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR).join("logs")
    }
}

/// Run log directory, relative to the working directory when no home is known.
pub fn logs_dir() -> PathBuf {
    DocbatchHome::locate()
        .map(|home| home.logs_dir())
        .unwrap_or_else(|| Path::new(STATE_DIR).join("logs"))
}
