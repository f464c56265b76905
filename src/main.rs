use std::io::{self, Write};

use clap::Parser;
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

use livechat::cli::{Args, Command};
use livechat::client::ApiClient;
use livechat::identity::{read_auth_token, SessionIdentity, TOKEN_KEYS};
use livechat::render::{format_message, format_notice, format_optimization, StatusLine};
use livechat::storage::{SqliteStorage, Storage};
use livechat::{
    now_ms, ChatConfig, ChatController, ChatMessage, ChatService, ChatSession, ConversationStatus, EventBus,
    ServiceEvent, SseChatService, Transport, WsChatService,
};

type Session<C> = ChatSession<C, SqliteStorage>;

// ---------------------------------------------------------------------------
// Streaming output
// ---------------------------------------------------------------------------

/// Prints cumulative `messageUpdate` content as it grows, so the terminal
/// shows one continuously extending reply.
#[derive(Default)]
struct StreamPrinter {
    id: Option<String>,
    shown: String,
}

impl StreamPrinter {
    fn update(&mut self, id: &str, content: &str) {
        if self.id.as_deref() != Some(id) {
            self.reset();
            self.id = Some(id.to_string());
            print!("{} ", "assistant".bright_green().bold());
        }
        match content.strip_prefix(self.shown.as_str()) {
            Some(rest) => print!("{}", rest),
            // Content was rewritten rather than extended; start the line over.
            None => print!("\n{}", content),
        }
        self.shown = content.to_string();
        let _ = io::stdout().flush();
    }

    fn finish(&mut self, message: &ChatMessage) {
        if self.id.as_deref() == Some(message.id.as_str()) {
            if let Some(rest) = message.content.strip_prefix(self.shown.as_str()) {
                print!("{}", rest);
            }
            println!("\n");
            self.id = None;
            self.shown.clear();
        } else {
            self.reset();
            println!("{}\n", format_message(message));
        }
    }

    fn is_streaming(&self) -> bool {
        self.id.is_some()
    }

    fn reset(&mut self) {
        if self.id.take().is_some() {
            println!();
        }
        self.shown.clear();
    }

    fn show(&mut self, event: &ServiceEvent) {
        match event {
            ServiceEvent::MessageUpdate { message_id, content } => self.update(message_id, content),
            ServiceEvent::MessageResponse { message } => self.finish(message),
            ServiceEvent::Optimization { result } => {
                self.reset();
                println!("{}", format_optimization(result));
            }
            ServiceEvent::Typing { .. } => {}
            other => {
                self.reset();
                if let Some(notice) = format_notice(other) {
                    eprintln!("{}", notice);
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

/// Show thinking/typing transitions on stderr, except mid-reply.
fn show_status<C: ChatService>(session: &Session<C>, line: &mut StatusLine, printer: &StreamPrinter) {
    if let Some(text) = line.update(session.controller().status()) {
        if !printer.is_streaming() {
            eprintln!("{}", text);
        }
    }
}

fn report_failed_send<C: ChatService>(session: &Session<C>, id: &str) {
    if let ConversationStatus::Errored { .. } = session.controller().status() {
        if let Some(message) = session.controller().message(id) {
            println!("{}\n", format_message(message));
        }
    }
}

async fn one_shot<C: ChatService>(session: &mut Session<C>, text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let id = session.send(text).await?;
    if let ConversationStatus::Errored { error, .. } = session.controller().status() {
        return Err(format!("message {} was not sent: {}", id, error).into());
    }

    let mut printer = StreamPrinter::default();
    while let Some(event) = session.next_event().await {
        printer.show(&event);
        match event {
            ServiceEvent::MessageResponse { .. } => break,
            ServiceEvent::Error { message } => return Err(message.into()),
            ServiceEvent::Disconnected => return Err("disconnected before a reply arrived".into()),
            _ => {}
        }
    }
    Ok(())
}

async fn interactive<C: ChatService>(session: &mut Session<C>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("{}", "type a message; /retry, /clear, /quit".dimmed());
    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    let mut printer = StreamPrinter::default();
    let mut status = StatusLine::default();

    loop {
        tokio::select! {
            line = lines.next() => {
                let line = match line {
                    Some(line) => line?,
                    None => break,
                };
                match Command::parse(&line) {
                    Command::Send(text) => {
                        let id = session.send(&text).await?;
                        report_failed_send(session, &id);
                        show_status(session, &mut status, &printer);
                    }
                    Command::Retry => match session.retry_last().await? {
                        Some(id) => {
                            report_failed_send(session, &id);
                            show_status(session, &mut status, &printer);
                        }
                        None => eprintln!("{}", "nothing to retry".dimmed()),
                    },
                    Command::Clear => {
                        session.clear_cache();
                        eprintln!("{}", "conversation cleared".dimmed());
                    }
                    Command::Quit => break,
                    Command::Empty => {}
                    Command::Unknown(cmd) => eprintln!("{} {}", "unknown command:".yellow(), cmd),
                }
            }
            event = session.next_event() => match event {
                Some(event) => {
                    printer.show(&event);
                    show_status(session, &mut status, &printer);
                }
                None => break,
            },
        }
    }
    printer.reset();
    Ok(())
}

async fn run<C: ChatService>(
    service: C,
    controller: ChatController<SqliteStorage>,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = ChatSession::new(service, controller);
    if args.clear_cache {
        session.clear_cache();
    }

    if let Err(e) = session.start().await {
        eprintln!("{} {}", "could not connect:".red(), e);
    }

    for message in session.controller().messages() {
        println!("{}\n", format_message(&message));
    }

    match &args.message {
        Some(text) => one_shot(&mut session, text).await,
        None => interactive(&mut session).await,
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("livechat=info")))
        .with_writer(io::stderr)
        .try_init();

    let args = Args::parse();
    let mut config = ChatConfig::load(args.config.as_deref())?;
    args.apply_to(&mut config);

    let mut storage = SqliteStorage::open(&config.storage_path)?;
    if let Some(token) = &args.token {
        storage.set(TOKEN_KEYS[0], token)?;
    }
    let token = read_auth_token(&storage);
    let identity = SessionIdentity::load_or_create(&mut storage, now_ms())?;
    tracing::info!(
        transport = %config.transport,
        user_id = %identity.user_id,
        session_id = %identity.session_id,
        "starting chat session"
    );

    let controller = ChatController::with_cache_config(storage, config.cache_config());
    let bus = EventBus::new();

    match config.transport {
        Transport::Sse => {
            let client = ApiClient::from_config(&config, token);
            run(SseChatService::new(client, identity, bus), controller, &args).await
        }
        Transport::Ws => {
            let service = WsChatService::new(config.ws_url.clone(), token, identity, bus);
            run(service, controller, &args).await
        }
    }
}
