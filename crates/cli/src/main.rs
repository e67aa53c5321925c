//! Deskline CLI
//!
//! A line-oriented terminal frontend for the client core. Connects to a
//! Deskline server, keeps the ticket list and the open thread live, and
//! maps a handful of slash commands onto the controller.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use deskline_client::{
    ConnectionState, Delivery, HttpTicketApi, Sender, SessionController, SyncError, WsTransport,
};
use deskline_protocol::ServerEvent;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "deskline", about = "Terminal frontend for a Deskline support desk")]
struct Args {
    /// Base URL of the Deskline server
    #[arg(long, env = "DESKLINE_SERVER_URL", default_value = "http://localhost:3000")]
    server_url: String,

    /// Bearer credential for the signed-in user
    #[arg(long, env = "DESKLINE_TOKEN")]
    token: String,
}

/// Derive the realtime endpoint from the REST base URL.
fn ws_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    let endpoint = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        trimmed.to_string()
    };
    format!("{endpoint}/ws")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    let api = HttpTicketApi::new(&args.server_url, &args.token);
    let transport = Arc::new(WsTransport::new(ws_url(&args.server_url)));
    let mut controller = SessionController::new(api, transport, args.token.clone());

    controller
        .start()
        .await
        .context("could not start the session")?;
    println!(
        "connected as {}",
        controller.viewer_id().unwrap_or("(unknown)")
    );
    print_tickets(&controller);
    print_help();

    let mut events = controller.subscribe();
    let mut states = controller.connection_state_changes();

    // Stdin lines come through a channel so the main loop can select over
    // them without tying up the controller.
    let (line_tx, mut line_rx) = mpsc::channel::<String>(8);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line_tx.send(line).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    controller.apply_event(&event);
                    render_event(&controller, &event);
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    // Reconnect handling happens on the state branch
                }
            },
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                if state == ConnectionState::Disconnected {
                    println!("! connection lost, reconnecting...");
                    reconnect(&mut controller).await;
                    events = controller.subscribe();
                    println!("! reconnected");
                    print_tickets(&controller);
                }
            },
            line = line_rx.recv() => {
                let Some(line) = line else { break };
                if !handle_line(&mut controller, line.trim()).await {
                    break;
                }
            },
        }
    }

    controller.shutdown().await;
    Ok(())
}

async fn reconnect<A: deskline_client::TicketApi>(controller: &mut SessionController<A>) {
    loop {
        match controller.resync().await {
            Ok(()) => return,
            Err(err) => {
                warn!(error = %err, "resync failed, retrying");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

/// Returns false when the user asked to quit.
async fn handle_line<A: deskline_client::TicketApi>(
    controller: &mut SessionController<A>,
    line: &str,
) -> bool {
    let result = if line.is_empty() {
        Ok(())
    } else if line == "/quit" {
        return false;
    } else if line == "/tickets" {
        print_tickets(controller);
        Ok(())
    } else if line == "/help" {
        print_help();
        Ok(())
    } else if let Some(ticket_id) = line.strip_prefix("/open ") {
        match controller.select_ticket(ticket_id.trim()).await {
            Ok(()) => {
                print_thread(controller);
                Ok(())
            }
            Err(err) => Err(err),
        }
    } else if let Some(rest) = line.strip_prefix("/new ") {
        match rest.split_once('|') {
            Some((title, message)) => controller
                .create_ticket(title.trim(), message.trim())
                .await
                .map(|ticket| println!("created {} ({})", ticket.id, ticket.title)),
            None => {
                println!("usage: /new <title> | <first message>");
                Ok(())
            }
        }
    } else if let Some(ticket_id) = line.strip_prefix("/close ") {
        controller.delete_ticket(ticket_id.trim()).await
    } else if line.starts_with('/') {
        println!("unknown command: {line}");
        Ok(())
    } else {
        controller.send_message(line).await
    };

    match result {
        Ok(()) => {}
        Err(SyncError::NoSelection) => println!("no ticket open; /open <id> first"),
        Err(SyncError::EmptyDraft) => {}
        Err(err) => println!("error: {err}"),
    }
    true
}

fn render_event<A: deskline_client::TicketApi>(
    controller: &SessionController<A>,
    event: &ServerEvent,
) {
    match event {
        ServerEvent::NewTicket { ticket } => {
            println!("+ new ticket {} ({})", ticket.id, ticket.title);
        }
        ServerEvent::NewMessage { message } => {
            if controller.selected_ticket() == Some(message.ticket_id.as_str()) {
                let who = if controller.viewer_id() == Some(message.sender_id.as_str()) {
                    "me"
                } else {
                    message.sender_id.as_str()
                };
                println!("{who}> {}", message.content);
            } else {
                println!("* activity on {}", message.ticket_id);
            }
        }
        ServerEvent::SendAck { .. } => {}
        ServerEvent::Error { code, message } => {
            println!("! server error {code}: {message}");
        }
    }
}

fn print_tickets<A: deskline_client::TicketApi>(controller: &SessionController<A>) {
    if controller.list().is_empty() {
        println!("no tickets yet; /new <title> | <first message>");
        return;
    }
    for ticket in controller.list().tickets() {
        let marker = if controller.selected_ticket() == Some(ticket.id.as_str()) {
            "*"
        } else {
            " "
        };
        let turn = if ticket.is_last_sender_me { "" } else { " (!)" };
        println!("{marker} {}  {}{turn}", ticket.id, ticket.title);
    }
}

fn print_help() {
    println!("commands: /tickets, /open <id>, /new <title> | <first message>, /close <id>, /quit");
    println!("anything else is sent to the open ticket");
}

fn print_thread<A: deskline_client::TicketApi>(controller: &SessionController<A>) {
    for entry in controller.thread().entries() {
        let who = match entry.sender {
            Sender::Me => "me",
            Sender::Other => "them",
        };
        let status = match entry.delivery {
            Delivery::Pending => " (sending)",
            Delivery::Failed => " (failed)",
            Delivery::Confirmed => "",
        };
        println!("{who}> {}{status}", entry.message.content);
    }
}
