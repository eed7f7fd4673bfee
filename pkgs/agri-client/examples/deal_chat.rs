use agri_client::wire::ListScope;
use agri_client::HttpBackend;
use agri_deals::{DealBoard, DealEvent, DealsBackend, DealsConfig, EventSink, Identity, RequestId};
use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    Farmer,
    Seller,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Chat on an accepted AgriConnect deal", long_about = None)]
struct Args {
    /// Base URL of the AgriConnect API
    #[arg(long, env = "AGRI_API_URL", default_value = "http://127.0.0.1:5000/api")]
    api_url: String,

    /// Your farmer or seller id
    #[arg(short, long, env = "AGRI_USER_ID")]
    user: String,

    /// Which side of the deal you are on
    #[arg(short, long, value_enum, default_value = "farmer")]
    role: RoleArg,

    /// Deal to open; defaults to the first accepted deal with both ids
    #[arg(short, long)]
    deal: Option<String>,

    /// Chat history poll interval
    #[arg(long, value_parser = humantime::parse_duration, default_value = "2s")]
    chat_interval: Duration,

    /// Accepted-deal refresh interval
    #[arg(long, value_parser = humantime::parse_duration, default_value = "3s")]
    deal_interval: Duration,

    /// Timeout for a single API call
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    timeout: Duration,

    /// Fetch all requests and match ids case-insensitively on this side
    #[arg(long)]
    all_requests: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let args = Args::parse();

    let config = DealsConfig {
        api_base_url: args.api_url.clone(),
        chat_poll_interval: args.chat_interval,
        deal_poll_interval: args.deal_interval,
        request_timeout: args.timeout,
    };
    let identity = match args.role {
        RoleArg::Farmer => Identity::farmer(args.user.clone()),
        RoleArg::Seller => Identity::seller(args.user.clone()),
    };

    let scope = if args.all_requests {
        ListScope::All
    } else {
        ListScope::Participant
    };
    let backend = Arc::new(
        HttpBackend::new(&config)
            .context("invalid configuration")?
            .with_list_scope(scope),
    );
    backend
        .health()
        .await
        .with_context(|| format!("API at {} is not reachable", backend.base_url()))?;

    let (events, mut event_rx) = EventSink::channel();
    let mut board = DealBoard::new(backend, identity.clone(), config, events)?;

    let deals = board.refresh().await.context("failed to load deals")?;
    println!("Accepted deals for {} ({:?}):", identity.user_id, identity.role);
    for deal in &deals {
        let partner = deal.partner_name(identity.role);
        let marker = if deal.is_chat_eligible() { " " } else { "!" };
        println!(
            " {marker} {} • {} • {} • {} ({})",
            deal.id,
            deal.crop,
            deal.region,
            deal.price,
            if partner.is_empty() { "unknown" } else { partner }
        );
    }

    let deal_id = match &args.deal {
        Some(id) => RequestId::from(id.as_str()),
        None => match board.chat_eligible_deals().first() {
            Some(deal) => deal.id.clone(),
            None => bail!("no accepted deal with both participants to chat on"),
        },
    };

    let mut transcript = {
        let active = board.open_chat(&deal_id)?;
        println!("Chatting with {} in room {}", active.partner_id, active.room());
        active.session.subscribe()
    };
    board.start();

    let mut shown = 0usize;
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut line = String::new();

    print!("> ");
    io::stdout().flush()?;

    loop {
        tokio::select! {
            changed = transcript.changed() => {
                if changed.is_err() {
                    break;
                }
                let messages = transcript.borrow_and_update().clone();
                // A shorter transcript means the server history was replaced
                if messages.len() < shown {
                    shown = 0;
                }
                for message in &messages[shown..] {
                    println!("\n[{}] {}: {}", message.timestamp.format("%H:%M"), message.sender, message.text);
                }
                shown = messages.len();
                print!("> ");
                io::stdout().flush()?;
            }

            Some(event) = event_rx.recv() => {
                match event {
                    DealEvent::Error { context, message } => {
                        eprintln!("\n{context}: {message}");
                    }
                    DealEvent::ChatClosed { room } => {
                        println!("\nChat {room} closed");
                        board.reconcile();
                        if board.active_chat().is_none() {
                            break;
                        }
                    }
                    DealEvent::DealsUpdated { .. } => board.reconcile(),
                    _ => {}
                }
            }

            read = stdin.read_line(&mut line) => {
                if read? == 0 {
                    break;
                }
                let input = line.trim();
                match input {
                    "" => {}
                    "/quit" => break,
                    text => {
                        if let Err(e) = board.send_message(text).await {
                            eprintln!("Failed to send: {e}");
                        }
                    }
                }
                print!("> ");
                io::stdout().flush()?;
                line.clear();
            }
        }
    }

    board.stop();
    Ok(())
}
