//! Delete command implementation.

use crate::app::App;
use journal_core::{model, Config};
use std::io::{self, Write};

/// Run the delete command.
pub fn run(config: Config, uid: &str, yes: bool) -> anyhow::Result<()> {
    let app = App::new(config)?;

    if !yes {
        let title = model::get(&app.ctx, uid)
            .ok()
            .and_then(|entry| entry.title().map(str::to_string))
            .unwrap_or_else(|| uid.to_string());

        print!("Delete \"{}\"? [y/N] ", title);
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Aborted.");
            return Ok(());
        }
    }

    model::delete(&app.ctx, uid)?;
    println!("Deleted {}", uid);

    Ok(())
}
