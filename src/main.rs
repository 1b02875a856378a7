use anyhow::{anyhow, Result};
use clap::Parser;
use log::{debug, error, info, warn, LevelFilter};
use std::env;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{Duration, Instant};

mod utils;

use parley::config::{self, Settings};
use parley::xmpp::{self, XmppTransport};
use parley::{Address, ChatState, ClientState, EngineEvent, Notice, Session};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Command line arguments for Parley
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Parley: a line-oriented XMPP chat client.",
    long_about = "Parley is a line-oriented XMPP chat client with a grouped roster, \
    unread tracking and chat state notifications.\n\n\
    Credentials come from XMPP_SERVER, XMPP_USERNAME and XMPP_PASSWORD, then the \
    saved settings, then an interactive prompt."
)]
struct Args {
    /// Directory holding settings.json (and the log file by default)
    #[arg(long, value_name = "PATH")]
    config_dir: Option<PathBuf>,

    /// Write the log here instead of <config dir>/parley.log
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Hide contacts without an online resource
    #[arg(long)]
    hide_offline: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

/// Settings plus the clear-text password, and whether they came from the environment.
fn resolve_settings() -> Result<(Settings, String, bool)> {
    if let (Ok(server), Ok(username), Ok(password)) =
        (env::var("XMPP_SERVER"), env::var("XMPP_USERNAME"), env::var("XMPP_PASSWORD"))
    {
        // Keep saved preferences, but the account comes from the environment
        let mut settings = config::load_settings()?.unwrap_or_else(|| Settings::new(&server, &username, &password));
        settings.server = server;
        settings.username = username;
        return Ok((settings, password, true));
    }

    if let Some(settings) = config::load_settings()? {
        info!("Using saved settings for {}", settings.username);
        let password = match settings.get_password() {
            Some(password) => password,
            None => utils::prompt(&format!("Enter password for {}:", settings.jid()))?,
        };
        return Ok((settings, password, false));
    }

    let server = utils::prompt("Enter XMPP server domain (e.g., example.com):")?;
    let username = utils::prompt("Enter username (without domain part):")?;
    let password = utils::prompt("Enter password:")?;
    Ok((Settings::new(&server, &username, &password), password, false))
}

fn print_notice(notice: &Notice) {
    match notice {
        Notice::ConnectionChanged(state) => println!("* connection: {:?}", state),
        Notice::MessageDelivered { conversation, message } => {
            let when = message.timestamp.with_timezone(&chrono::Local).format("%H:%M");
            println!("[{}] {} <{}> {}", when, conversation, message.from, message.body.as_deref().unwrap_or(""));
        }
        Notice::RemoteStateChanged { conversation, state } => match state {
            ChatState::Composing => println!("* {} is typing...", conversation),
            ChatState::Paused => println!("* {} stopped typing", conversation),
            ChatState::Gone => println!("* {} left the conversation", conversation),
            _ => debug!("{} is {}", conversation, state.label()),
        },
        Notice::UnreadArrived { from } => println!("* new message from {}", from),
    }
}

struct Shell {
    current: Option<Address>,
}

impl Shell {
    fn current(&self) -> Result<Address> {
        self.current
            .clone()
            .ok_or_else(|| anyhow!("no conversation open, use /open <address>"))
    }

    /// Apply one input line. Returns false when the user asked to quit.
    fn handle_line(&mut self, session: &mut Session<XmppTransport>, line: &str) -> Result<bool> {
        let now = Instant::now();
        let (command, argument) = match line.split_once(' ') {
            Some((command, argument)) => (command, argument.trim()),
            None => (line, ""),
        };

        match command {
            "/quit" => return Ok(false),
            "/open" => {
                let outcome = session.open_str(argument)?;
                if let Some(conversation) = session.conversation(&outcome.address) {
                    for message in conversation.history() {
                        println!("  <{}> {}", message.from, message.body.as_deref().unwrap_or(""));
                    }
                }
                println!("* talking to {}", outcome.address);
                self.current = Some(outcome.address);
            }
            "/close" => {
                let address = self.current()?;
                session.close(&address, now)?;
                println!("* closed {}", address);
                self.current = None;
            }
            "/typing" => {
                session.local_edit(&self.current()?, now)?;
            }
            "/hide" => match argument {
                "on" => session.set_hide_offline(true),
                "off" => session.set_hide_offline(false),
                _ => println!("usage: /hide on|off"),
            },
            "/roster" => {
                for line in session.view().render_lines() {
                    println!("{}", line);
                }
            }
            "/unread" => {
                let unread = session.router().unread();
                for address in unread.bare_addresses_with_unread() {
                    println!("  {} ({})", address, unread.unread_count(&address));
                }
                println!("* {} unread in total", unread.total_unread());
            }
            "/readall" => {
                let outcomes = session.read_all();
                for outcome in &outcomes {
                    println!("* opened {} ({} unread)", outcome.address, outcome.drained);
                }
                if self.current.is_none() {
                    self.current = outcomes.into_iter().next().map(|o| o.address);
                }
            }
            _ if command.starts_with('/') => println!("unknown command {}", command),
            _ => {
                let address = self.current()?;
                if session.send(&address, line, None, now)?.is_none() {
                    debug!("Ignoring blank line");
                }
            }
        }
        Ok(true)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(dir) = &args.config_dir {
        config::set_config_dir_override(dir.clone());
    }
    let log_file_path = match &args.log_file {
        Some(path) => path.clone(),
        None => config::config_dir()?.join("parley.log"),
    };
    let level = if args.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    utils::setup_logging(log_file_path.to_str(), level)?;
    info!("Parley starting up, logging to {}", log_file_path.display());

    let (mut settings, password, from_env) = resolve_settings()?;
    let jid = settings.jid();
    let account = Address::parse(&jid)?;
    println!("Connecting to {} as {}... please wait...", settings.server, jid);

    let (transport, mut events) = xmpp::connect(&jid, &password)?;
    let hide_offline = args.hide_offline || settings.hide_offline;
    let mut session = Session::new(account, transport, settings.conversation_config(), hide_offline);

    // Everything up to Connected goes through the session as well
    let connected = tokio::time::timeout(CONNECT_TIMEOUT, async {
        while let Some(event) = events.recv().await {
            let notices = session.handle_event(event);
            notices.iter().for_each(print_notice);
            match session.state() {
                ClientState::Connected => return Ok(()),
                ClientState::Error(kind) => return Err(anyhow!("connection failed: {:?}", kind)),
                _ => {}
            }
        }
        Err(anyhow!("connection closed before login"))
    })
    .await
    .map_err(|_| anyhow!("timed out after {:?} waiting for the server", CONNECT_TIMEOUT))?;
    if let Err(e) = connected {
        error!("Failed to connect as {}: {}", jid, e);
        eprintln!("Failed to connect as {}: {}\nCheck the server address, credentials and network.", jid, e);
        return Err(e);
    }

    if !from_env {
        settings.hide_offline = hide_offline;
        if let Err(e) = config::save_settings(&settings) {
            warn!("Failed to save settings: {}", e);
        }
    }

    println!("Connected. Commands: /open <address>, /close, /typing, /hide on|off, /roster, /unread, /readall, /quit");
    let mut shell = Shell { current: None };
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let deadline = session.next_deadline();
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => session.handle_event(event).iter().for_each(print_notice),
                None => {
                    warn!("Engine event channel closed");
                    break;
                }
            },
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => match shell.handle_line(&mut session, line.trim()) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => println!("! {}", e),
                },
                None => break,
            },
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                for (address, state) in session.fire_timers(Instant::now()) {
                    debug!("Local state for {} is now {}", address, state.label());
                }
            }
        }
    }

    session.shutdown(Instant::now());
    drop(session);

    // Dropping the session closes the stream; wait for the engine to confirm
    let _ = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
        while let Some(event) = events.recv().await {
            if matches!(event, EngineEvent::Disconnected | EngineEvent::Error(_)) {
                break;
            }
        }
    })
    .await;
    info!("Parley shut down");
    Ok(())
}
