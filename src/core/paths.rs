use std::path::PathBuf;

/// Environment variable overriding the data directory
pub const HOME_ENV: &str = "MNEMOSYNE_HOME";

const DATA_DIR_NAME: &str = ".mnemosyne";

pub struct DataPaths {
    pub root: PathBuf,
    pub database: PathBuf,
    pub config: PathBuf,
}

impl DataPaths {
    /// Resolve the data directory: `MNEMOSYNE_HOME`, then `~/.mnemosyne`,
    /// then `./.mnemosyne`.
    pub fn new() -> Self {
        Self::from_root(resolve_root(
            std::env::var_os(HOME_ENV).map(PathBuf::from),
            dirs::home_dir(),
        ))
    }

    pub fn from_root(root: PathBuf) -> Self {
        Self {
            database: root.join("memory.db"),
            config: root.join("config.yaml"),
            root,
        }
    }

    pub fn ensure_root(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }
}

fn resolve_root(explicit: Option<PathBuf>, home: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| home.map(|h| h.join(DATA_DIR_NAME)))
        .unwrap_or_else(|| PathBuf::from(DATA_DIR_NAME))
}

impl Default for DataPaths {
    fn default() -> Self {
        Self::new()
    }
}
