use anyhow::Result;
use assistant::{ChatController, Rejection, SendOutcome};
use providers::LoadProgress;
use shared::provider::ProviderKind;
use shared::settings::load_settings_or_default;
use shared::{Message, Sender};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Key(&'a str),
    Local,
    Provider,
    History,
    Clear,
    Quit,
    Help,
    Chat(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    let trimmed = line.trim();
    let (head, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (trimmed, ""),
    };
    match head {
        "/key" => Command::Key(rest),
        "/local" => Command::Local,
        "/provider" => Command::Provider,
        "/history" => Command::History,
        "/clear" => Command::Clear,
        "/quit" | "/exit" => Command::Quit,
        "/help" => Command::Help,
        _ => Command::Chat(line),
    }
}

fn render(message: &Message) {
    let who = match message.sender {
        Sender::User => "you",
        Sender::Bot => "bot",
    };
    println!("{} [{}]> {}\n", who, message.timestamp.format("%H:%M"), message.content);
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

const HELP: &str = "Commands:
  /key <API_KEY>  connect Gemini (the key stays in memory only)
  /local          turn the local model on or off
  /provider       show the active provider
  /history        show what the live provider remembers
  /clear          start a new conversation
  /quit           exit";

async fn toggle_local(chat: &ChatController) {
    let model = chat.gateway().local_model();
    if chat.provider() != ProviderKind::Local {
        println!(
            "Loading local model {}. The first download can take several minutes...",
            model
        );
    }
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<LoadProgress>();
    let printer = tokio::spawn(async move {
        let mut last = String::new();
        while let Some(update) = rx.recv().await {
            let line = match update.percent() {
                Some(pct) => format!("  {} {}%", update.status, pct),
                None => format!("  {}", update.status),
            };
            if line != last {
                println!("{}", line);
                last = line;
            }
        }
    });
    let reply = chat.toggle_local(tx).await;
    let _ = printer.await;
    if reply.success {
        println!("{}\n", reply.content);
    } else {
        println!("⚠️ {}\n", reply.content);
    }
}

async fn handle(chat: &ChatController, line: &str) -> bool {
    match parse_command(line) {
        Command::Quit => return false,
        Command::Help => println!("{}\n", HELP),
        Command::Provider => println!(
            "Active provider: {} ({:?})\n",
            chat.provider().display_name(),
            chat.gateway().local_status()
        ),
        Command::History => {
            let history = chat.gateway().history();
            if history.is_empty() {
                println!("(no live conversation yet)\n");
            }
            for entry in history {
                println!("{:?} [{}]: {}", entry.role, entry.ts.format("%H:%M:%S"), entry.content);
            }
        }
        Command::Clear => {
            chat.new_conversation();
            if let Some(greeting) = chat.messages().first() {
                render(greeting);
            }
        }
        Command::Key(key) => {
            let reply = chat.connect_gemini(key).await;
            if reply.success {
                println!("{}\n", reply.content);
            } else {
                println!("⚠️ {}\n", reply.content);
            }
        }
        Command::Local => toggle_local(chat).await,
        Command::Chat(text) => {
            if !chat.provider().is_live() && !text.trim().is_empty() {
                println!("bot is typing...");
            }
            match chat.send(text).await {
                SendOutcome::Rejected(Rejection::Empty) => {}
                SendOutcome::Rejected(Rejection::Busy) => {
                    println!("(still answering the previous message)\n")
                }
                SendOutcome::Replied { reply, nudge } => {
                    render(&reply);
                    if let Some(nudge) = nudge {
                        render(&nudge);
                    }
                }
            }
        }
    }
    true
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = load_settings_or_default();
    let (gateway, responder) = assistant::wire(&settings)?;
    let chat = ChatController::mount(gateway, responder, settings.chat.clone());

    for message in chat.messages() {
        render(&message);
    }
    println!("Type /help for commands.\n");

    let shutdown = Arc::new(Notify::new());
    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupted");
                interrupt.notify_one();
            }
            Err(e) => tracing::warn!("can't listen for Ctrl-C: {}", e),
        }
    });

    run(&chat, BufReader::new(tokio::io::stdin()), shutdown).await
}

/// Read commands until EOF, `/quit`, a read error or shutdown, then unload.
///
/// Shutdown also interrupts a command that is still running.
async fn run<R>(chat: &ChatController, input: R, shutdown: Arc<Notify>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut outcome = Ok(());
    loop {
        prompt();
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = shutdown.notified() => break,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("reading input: {}", e);
                outcome = Err(e.into());
                break;
            }
        };
        let keep_going = tokio::select! {
            keep_going = handle(chat, &line) => keep_going,
            _ = shutdown.notified() => false,
        };
        if !keep_going {
            break;
        }
    }

    chat.unload().await;
    tracing::info!("assistant closed");
    outcome
}
