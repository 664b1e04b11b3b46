//! Application state management.

use journal_core::{Config, JournalContext, MirroredShare};
use std::sync::Arc;
use tracing::info;

/// Shared application state.
pub struct App {
    /// Collaborators for every journal operation
    pub ctx: JournalContext,
}

impl App {
    /// Create a new application instance.
    ///
    /// There is no object store daemon to talk to from here, so only
    /// filesystem and remote share mount points can be read.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        config.paging.validate()?;
        let share = MirroredShare::from_config(&config);

        info!(
            remote_root = %config.remote.mount_root,
            mirror_root = %config.remote.mirror_root().display(),
            "Application initialized"
        );

        let ctx = JournalContext::new(config).with_remote_share(Arc::new(share));
        Ok(App { ctx })
    }
}
