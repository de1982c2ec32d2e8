//! `serverdeck console [SERVER_ID]` - interactive console.
//!
//! Streamed lines and request results print as they arrive. Plain input
//! lines are commands; lines starting with `:` are directives.

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use serverdeck_console::scheduler::{parse_days, parse_time};
use serverdeck_console::{ConsoleApi, ConsoleError, Cycle, ServerConsole};
use serverdeck_protocol::ControlAction;

use crate::{render, Console};

const HELP: &str = "\
Directives:
  :start | :stop | :restart     run a control action through the command call
  :send start|stop|restart      send a control frame on the live stream
  :batch [PATH]                 show or select the batch file
  :fav add|rm PATH              manage favorite batch files
  :favs                         list favorite batch files
  :complete TEXT                show saved commands matching TEXT
  :next | :prev                 move the highlighted suggestion
  :accept                       run the highlighted suggestion
  :dismiss                      close the suggestion list
  :schedule HH:MM DAYS          register a recurring restart (DAYS like mon,wed)
  :status                       show server state
  :clear                        clear the persisted log
  :reconnect                    reconnect the stream
  :quit                         leave the console";

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub async fn run(console: &mut Console, server_id: Option<String>) -> anyhow::Result<()> {
    match server_id {
        Some(id) => console.open(&id)?,
        None => {
            if console.restore()?.is_none() {
                anyhow::bail!("no server given and no previous server to reopen");
            }
        }
    }

    let server = console.server_id().unwrap_or_default().to_string();
    println!(
        "{} {} (type :help for directives)",
        console::style("serverdeck console").bold(),
        console::style(&server).cyan()
    );
    render::print_messages(console.messages());
    console.take_unseen();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            messages = console.pump() => render::print_messages(&messages),

            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let flow = handle_line(console, &line);
                render::print_messages(&console.take_unseen());
                if flow == Flow::Quit {
                    break;
                }
            }
        }
    }

    console.disconnect();
    render::print_messages(&console.take_unseen());
    Ok(())
}

fn handle_line<A: ConsoleApi>(console: &mut ServerConsole<A>, line: &str) -> Flow {
    let line = line.trim();
    if line.is_empty() {
        return Flow::Continue;
    }
    let Some(directive) = line.strip_prefix(':') else {
        report(console.execute(line).map(|_| ()));
        return Flow::Continue;
    };

    let (name, rest) = match directive.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (directive, ""),
    };

    match name {
        "quit" | "q" | "exit" => return Flow::Quit,
        "help" | "h" => println!("{HELP}"),

        "start" => report(console.control(ControlAction::Start).map(|_| ())),
        "stop" => report(console.control(ControlAction::Stop).map(|_| ())),
        "restart" => report(console.control(ControlAction::Restart).map(|_| ())),
        "send" => match rest.parse::<ControlAction>() {
            Ok(action) => report(console.send(action)),
            Err(e) => println!("{e}"),
        },

        "batch" if rest.is_empty() => show_status(console),
        "batch" => report(console.select_batch(rest)),
        "fav" => match rest.split_once(char::is_whitespace) {
            Some(("add", path)) => report(console.add_favorite(path.trim()).map(|_| ())),
            Some(("rm", path)) => report(console.remove_favorite(path.trim()).map(|_| ())),
            _ => println!("usage: :fav add|rm PATH"),
        },
        "favs" => {
            if let Some(session) = console.server_session() {
                println!("{}", render::favorites_table(&session));
            }
        }

        "complete" => {
            console.set_input(rest);
            show_suggestions(console);
        }
        "next" => {
            console.cycle(Cycle::Forward);
            show_suggestions(console);
        }
        "prev" => {
            console.cycle(Cycle::Backward);
            show_suggestions(console);
        }
        "accept" => report(console.confirm().map(|_| ())),
        "dismiss" => console.dismiss(),

        "schedule" => schedule(console, rest),
        "status" => show_status(console),
        "clear" => {
            clear(console);
        }
        "reconnect" => report(console.reconnect()),

        other => println!("unknown directive :{other} (try :help)"),
    }
    Flow::Continue
}

fn schedule<A: ConsoleApi>(console: &mut ServerConsole<A>, rest: &str) {
    let Some((at, days)) = rest.split_once(char::is_whitespace) else {
        println!("usage: :schedule HH:MM mon,wed");
        return;
    };
    let parsed = parse_time(at).and_then(|(hour, minute)| Ok((hour, minute, parse_days(days)?)));
    match parsed {
        Ok((hour, minute, days)) => {
            report(console.schedule_restart(hour, minute, &days).map(|_| ()))
        }
        Err(e) => println!("{e}"),
    }
}

/// True once the persisted log is gone
fn clear<A: ConsoleApi>(console: &mut ServerConsole<A>) -> bool {
    match console.clear_log() {
        Ok(()) => {
            println!("Log cleared");
            true
        }
        Err(e) => {
            report(Err(e));
            false
        }
    }
}

fn show_suggestions<A: ConsoleApi>(console: &ServerConsole<A>) {
    if console.suggestions().is_empty() {
        println!("no matching saved commands");
        return;
    }
    println!(
        "{}",
        render::suggestions_table(console.suggestions(), console.highlighted())
    );
}

fn show_status<A: ConsoleApi>(console: &ServerConsole<A>) {
    if let Some(session) = console.server_session() {
        println!(
            "{}",
            render::session_table(&session, Some(console.connection_state()))
        );
    }
}

/// Failures the console already wrote as lines need no extra output
fn report(result: Result<(), ConsoleError>) {
    match result {
        Ok(()) => {}
        Err(ConsoleError::Store(e)) => println!("{}", console::style(format!("storage error: {e}")).red()),
        Err(e) => debug!(
            component = "cli",
            event = "cli.directive_rejected",
            error = %e,
        ),
    }
}
