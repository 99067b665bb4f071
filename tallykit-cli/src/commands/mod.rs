//! Subcommand implementations.

use std::path::PathBuf;

use eyre::{eyre, WrapErr};
use tallykit_core::{
    storage::{file::FileStorageProvider, StoragePaths},
    TallyKit, TallyKitConfig,
};

pub mod clear;
pub mod flush;
pub mod identity;
pub mod log;
pub mod queue;

/// Options shared by every subcommand.
pub struct Session {
    pub root: Option<PathBuf>,
    pub sdk_key: Option<String>,
    pub bundle_id: String,
    pub app_version: String,
    pub collector: Option<String>,
    pub json: bool,
}

impl Session {
    fn root(&self) -> eyre::Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => dirs::data_dir()
                .map(|dir| dir.join("tallykit-cli"))
                .ok_or_else(|| eyre!("no data directory on this platform, pass --root")),
        }
    }

    /// Starts the pipeline with the continuous loop paused, so nothing is sent unless a
    /// subcommand flushes explicitly.
    pub fn open(&self) -> eyre::Result<TallyKit> {
        let sdk_key = self
            .sdk_key
            .clone()
            .ok_or_else(|| eyre!("an SDK key is required, pass --sdk-key or set TALLYKIT_SDK_KEY"))?;
        let root = self.root()?;
        tracing::debug!("using storage root {}", root.display());

        let mut config = TallyKitConfig::new(sdk_key, &self.bundle_id, &self.app_version);
        config.collector_url.clone_from(&self.collector);
        let storage = FileStorageProvider::new(StoragePaths::new(&root), &self.bundle_id);

        TallyKit::builder(config, std::sync::Arc::new(storage))
            .start_paused(true)
            .build()
            .wrap_err("failed to start TallyKit")
    }
}
