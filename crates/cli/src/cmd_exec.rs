//! `serverdeck exec SERVER_ID COMMAND...` - one command, one response.

use serverdeck_console::MessageKind;

use crate::{response_timeout, settle, Console};

pub async fn run(console: &mut Console, server_id: &str, command: &str) -> anyhow::Result<()> {
    console.select_server(server_id)?;
    if console.execute(command)?.is_none() {
        anyhow::bail!("nothing to run: the command is empty");
    }

    let timeout = response_timeout(console.config());
    let lines = settle(console, timeout).await?;
    if lines.last().map(|m| m.kind) == Some(MessageKind::Error) {
        anyhow::bail!("command reported an error");
    }
    Ok(())
}
