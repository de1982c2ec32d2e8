//! `serverdeck schedule SERVER_ID --at HH:MM --days mon,wed`

use clap::Args;

use serverdeck_console::scheduler::{parse_days, parse_time};
use serverdeck_console::MessageKind;

use crate::{response_timeout, settle, Console};

#[derive(Debug, Args)]
pub struct ScheduleArgs {
    #[arg(value_name = "SERVER_ID")]
    pub server_id: String,

    /// Time of day, 24h `HH:MM`
    #[arg(long, value_name = "HH:MM")]
    pub at: String,

    /// Comma separated weekdays, e.g. `mon,wed,fri`
    #[arg(long, value_name = "DAYS")]
    pub days: String,
}

pub async fn run(console: &mut Console, args: ScheduleArgs) -> anyhow::Result<()> {
    let (hour, minute) = parse_time(&args.at)?;
    let days = parse_days(&args.days)?;

    console.select_server(&args.server_id)?;
    if let Err(e) = console.schedule_restart(hour, minute, &days) {
        crate::render::print_messages(&console.take_unseen());
        return Err(e.into());
    }

    let timeout = response_timeout(console.config());
    let lines = settle(console, timeout).await?;
    if lines.last().map(|m| m.kind) == Some(MessageKind::Error) {
        anyhow::bail!("restart was not scheduled");
    }
    Ok(())
}
