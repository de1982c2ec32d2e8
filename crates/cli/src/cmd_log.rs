//! `serverdeck log SERVER_ID [--clear] [--tail N]`

use clap::Args;

use crate::{render, Console};

#[derive(Debug, Args)]
pub struct LogArgs {
    #[arg(value_name = "SERVER_ID")]
    pub server_id: String,

    /// Delete the persisted log instead of printing it
    #[arg(long)]
    pub clear: bool,

    /// Only print the last N lines
    #[arg(long, value_name = "N")]
    pub tail: Option<usize>,
}

pub fn run(console: &mut Console, args: LogArgs) -> anyhow::Result<()> {
    console.select_server(&args.server_id)?;

    if args.clear {
        console.clear_log()?;
        println!("Cleared console log for {}", args.server_id);
        return Ok(());
    }

    let total = console.messages().count();
    let skip = args.tail.map(|n| total.saturating_sub(n)).unwrap_or(0);
    render::print_messages(console.messages().skip(skip));
    Ok(())
}
