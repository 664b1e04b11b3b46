//! Values command implementation.

use crate::app::App;
use journal_core::{model, Config};

/// Run the values command.
pub fn run(config: Config, property: &str) -> anyhow::Result<()> {
    let app = App::new(config)?;
    for value in model::get_unique_values(&app.ctx, property)? {
        println!("{}", value);
    }
    Ok(())
}
