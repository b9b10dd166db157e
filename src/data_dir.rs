use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const ENV_DATA_DIR: &str = "MANUALSEEK_DATA_DIR";

const APP_NAME: &str = "manualseek";
const INDEX_FILE: &str = "index.redb";
const CONFIG_FILE: &str = "config.json";

/// Where the index store and engine config live on disk.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve and create the data directory.
    ///
    /// `--data-dir` wins over `MANUALSEEK_DATA_DIR`, which wins over the XDG
    /// data home (`~/.local/share/manualseek/`).
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        Self::resolve_with(explicit, |key| std::env::var_os(key).map(PathBuf::from))
    }

    /// [`resolve`](Self::resolve) with the environment read through `lookup`.
    pub fn resolve_with(
        explicit: Option<&Path>,
        lookup: impl Fn(&str) -> Option<PathBuf>,
    ) -> Result<Self> {
        let root = match explicit {
            Some(path) => path.to_path_buf(),
            None => match lookup(ENV_DATA_DIR).filter(|p| !p.as_os_str().is_empty()) {
                Some(path) => path,
                None => xdg_data_home()?,
            },
        };

        std::fs::create_dir_all(&root).map_err(|e| {
            tracing::warn!(path = %root.display(), "cannot create data dir: {e}");
            Error::DataDir(root.clone())
        })?;
        tracing::debug!(path = %root.display(), "using data dir");

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The redb file holding every collection.
    pub fn index_db(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    /// Optional JSON engine configuration.
    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }
}

fn xdg_data_home() -> Result<PathBuf> {
    xdg::BaseDirectories::with_prefix(APP_NAME)
        .get_data_home()
        .ok_or_else(|| Error::Config("could not determine XDG data home directory".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<PathBuf> {
        None
    }

    #[test]
    fn explicit_path_gives_store_and_config_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve_with(Some(tmp.path()), no_env).unwrap();

        assert_eq!(dir.root(), tmp.path());
        assert_eq!(dir.index_db(), tmp.path().join("index.redb"));
        assert_eq!(dir.config_file(), tmp.path().join("config.json"));
    }

    #[test]
    fn explicit_path_beats_env() {
        let tmp = tempfile::tempdir().unwrap();
        let from_env = tmp.path().join("env");
        let explicit = tmp.path().join("flag");

        let dir = DataDir::resolve_with(Some(&explicit), |_| Some(from_env.clone()))
            .unwrap();
        assert_eq!(dir.root(), explicit);
        assert!(!from_env.exists());
    }

    #[test]
    fn env_var_is_used_and_created() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");

        let dir = DataDir::resolve_with(None, |key| {
            (key == ENV_DATA_DIR).then(|| nested.clone())
        })
        .unwrap();
        assert_eq!(dir.root(), nested);
        assert!(nested.is_dir());
    }

    #[test]
    fn uncreatable_dir_is_data_dir_error() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();

        let err = DataDir::resolve_with(Some(&file.join("sub")), no_env).unwrap_err();
        assert!(matches!(err, Error::DataDir(_)));
    }
}
