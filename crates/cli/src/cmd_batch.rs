//! `serverdeck batch SERVER_ID ...` - launch script selection and favorites.

use clap::Subcommand;

use crate::{render, Console};

#[derive(Debug, Subcommand)]
pub enum BatchAction {
    /// Show the server state and active batch file
    Show {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Make PATH the active batch file (also adds it to favorites)
    Select { path: String },
    /// Forget the active batch file
    Clear,
    /// Add PATH to the favorites
    Add { path: String },
    /// Remove PATH from the favorites
    Remove { path: String },
    /// List favorites for the configured OS target
    List,
}

pub fn run(console: &mut Console, server_id: &str, action: BatchAction) -> anyhow::Result<()> {
    console.select_server(server_id)?;

    let result = match &action {
        BatchAction::Show { .. } | BatchAction::List => Ok(()),
        BatchAction::Select { path } => console.select_batch(path),
        BatchAction::Clear => console.clear_batch().map(|()| {
            println!("Cleared batch file for {server_id}");
        }),
        BatchAction::Add { path } => console.add_favorite(path).map(|_| ()),
        BatchAction::Remove { path } => console.remove_favorite(path).map(|removed| {
            if !removed {
                println!("{path} is not a favorite");
            }
        }),
    };
    // Validation failures were recorded as console lines
    render::print_messages(&console.take_unseen());
    result?;

    let Some(session) = console.server_session() else {
        return Ok(());
    };
    match action {
        BatchAction::Show { json: true } => println!("{}", serde_json::to_string_pretty(&session)?),
        BatchAction::Show { json: false } => println!("{}", render::session_table(&session, None)),
        BatchAction::List => println!("{}", render::favorites_table(&session)),
        _ => {}
    }
    Ok(())
}
