//! Terminal output: console lines styled by kind, state as tables

use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use console::{style, Style};

use serverdeck_console::{ConnectionState, ConsoleMessage, MessageKind, ServerSession};

fn kind_style(kind: MessageKind) -> Style {
    match kind {
        MessageKind::System => Style::new().cyan(),
        MessageKind::Command => Style::new().bold(),
        MessageKind::Output => Style::new(),
        MessageKind::Error => Style::new().red(),
    }
}

pub fn message_line(message: &ConsoleMessage) -> String {
    let text = match message.kind {
        MessageKind::Command => format!("> {}", message.text),
        _ => message.text.clone(),
    };
    format!(
        "{} {}",
        style(&message.time).dim(),
        kind_style(message.kind).apply_to(text)
    )
}

pub fn print_messages<'a>(messages: impl IntoIterator<Item = &'a ConsoleMessage>) {
    for message in messages {
        println!("{}", message_line(message));
    }
}

fn connection_label(state: ConnectionState) -> Cell {
    match state {
        ConnectionState::Connected => Cell::new("connected").fg(Color::Green),
        ConnectionState::Connecting => Cell::new("connecting").fg(Color::Yellow),
        ConnectionState::Disconnected => Cell::new("disconnected").fg(Color::Red),
    }
}

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn session_table(session: &ServerSession, state: Option<ConnectionState>) -> Table {
    let mut table = table();
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec![Cell::new("Server"), Cell::new(&session.server_id)]);
    table.add_row(vec![Cell::new("Status"), Cell::new(session.status.as_str())]);
    if let Some(state) = state {
        table.add_row(vec![Cell::new("Stream"), connection_label(state)]);
    }
    table.add_row(vec![Cell::new("OS target"), Cell::new(session.os_target.as_str())]);
    table.add_row(vec![
        Cell::new("Batch file"),
        Cell::new(session.batch_path.as_deref().unwrap_or("(none)")),
    ]);
    table
}

pub fn favorites_table(session: &ServerSession) -> Table {
    let mut table = table();
    table.set_header(vec!["#", "Favorite batch file", ""]);
    for (index, path) in session.favorite_batches.iter().enumerate() {
        let marker = if session.batch_path.as_deref() == Some(path.as_str()) {
            Cell::new("active").fg(Color::Green)
        } else {
            Cell::new("")
        };
        table.add_row(vec![Cell::new(index + 1), Cell::new(path), marker]);
    }
    table
}

pub fn suggestions_table(suggestions: &[String], highlighted: Option<&str>) -> Table {
    let mut table = table();
    table.set_header(vec!["", "Saved command"]);
    for suggestion in suggestions {
        let selected = highlighted == Some(suggestion.as_str());
        let marker = if selected { "›" } else { "" };
        let cell = if selected {
            Cell::new(suggestion).fg(Color::Cyan)
        } else {
            Cell::new(suggestion)
        };
        table.add_row(vec![Cell::new(marker), cell]);
    }
    table
}

pub fn error(err: &anyhow::Error) {
    eprintln!("{} {err:#}", style("error:").red().bold());
}
