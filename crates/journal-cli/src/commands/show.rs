//! Show command implementation.

use crate::app::App;
use crate::OutputFormat;
use journal_core::types::PREVIEW;
use journal_core::{model, Config, Entry, Value};

fn render(entry: &Entry) -> Vec<String> {
    entry
        .iter()
        .map(|(key, value)| match value {
            Value::Bytes(bytes) => format!("{:<16} <{} bytes>", key, bytes.len()),
            other => format!("{:<16} {}", key, other),
        })
        .collect()
}

/// Run the show command.
pub fn run(config: Config, uid: &str, output: OutputFormat) -> anyhow::Result<()> {
    let app = App::new(config)?;
    let mut entry = model::get(&app.ctx, uid)?;

    match output {
        OutputFormat::Text => {
            for line in render(&entry) {
                println!("{}", line);
            }
        }
        OutputFormat::Json => {
            entry.remove(PREVIEW);
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
    }

    Ok(())
}
