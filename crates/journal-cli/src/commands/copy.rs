//! Copy command implementation.

use crate::app::App;
use journal_core::types::UID;
use journal_core::{model, Config, Entry};

/// Run the copy command.
pub fn run(config: Config, uid: &str, mount_point: &str) -> anyhow::Result<()> {
    let app = App::new(config)?;
    let entry = Entry::new().with(UID, uid);
    let new_id = model::copy(&app.ctx, &entry, mount_point)?;
    println!("{}", new_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_copy_between_directories() {
        let source = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let file = source.path().join("notes.txt");
        fs::write(&file, "hello").unwrap();

        let mut config = Config::default();
        config.remote.mount_root = "/net/shares/".to_string();

        run(
            config,
            &file.to_string_lossy(),
            &target.path().to_string_lossy(),
        )
        .unwrap();

        assert_eq!(
            fs::read_to_string(target.path().join("notes.txt")).unwrap(),
            "hello"
        );
        assert!(file.exists());
    }
}
