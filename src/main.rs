//! Context Manager - terminal chat client
//!
//! Usage: `context-manager <session> [--full-history]`
//!
//! Reads messages from stdin and streams replies to stdout. `:report` prints
//! full-history similarity, `:quit` or end of input exits, Ctrl-C cancels the
//! reply in flight.

use context_manager::client::SessionInfo;
use context_manager::session::SimilarityReport;
use context_manager::{
    Collaborator, Config, HttpCollaborator, LoggingCollaborator, RelevanceConfig, SessionController,
    SessionError, SessionViews, TurnId,
};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PREVIEW_CHARS: usize = 60;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr; stdout carries the conversation
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "context_manager=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let mut session = None;
    let mut full_history = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--full-history" => full_history = true,
            _ if session.is_none() => session = Some(arg),
            _ => return Err(format!("unexpected argument: {arg}").into()),
        }
    }
    let Some(session) = session else {
        return Err("usage: context-manager <session> [--full-history]".into());
    };

    let config = Config::from_env()?;
    tracing::info!(
        url = %config.client.base_url,
        high = config.relevance.high_threshold(),
        med = config.relevance.med_threshold(),
        "Configuration loaded"
    );

    let collaborator = LoggingCollaborator::new(HttpCollaborator::new(&config.client)?);
    let controller = SessionController::new(collaborator, &config);

    let info = controller.initialize(&session).await?;
    print_opened(&info, &controller.views());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => continue,
            ":quit" | ":q" => break,
            ":report" => match controller.similarity_report().await {
                Ok(report) => print_report(&report, &controller.views(), controller.relevance()),
                Err(e) => eprintln!("report unavailable: {e}"),
            },
            message => match send(&controller, message, full_history).await {
                Ok(_) => print_context(&controller.views(), controller.relevance()),
                Err(SessionError::Cancelled) => println!("\n(cancelled)"),
                Err(e) => println!("\n(failed: {e})"),
            },
        }
    }

    Ok(())
}

/// Send one message, echoing the reply as it streams
async fn send<C: Collaborator>(
    controller: &SessionController<C>,
    message: &str,
    full_history: bool,
) -> Result<TurnId, SessionError> {
    let mut updates = WatchStream::from_changes(controller.subscribe());
    let base = controller.views().history.len();
    let mut printed = 0;

    let send = controller.send_message(message, full_history);
    tokio::pin!(send);
    let result = loop {
        tokio::select! {
            result = &mut send => break result,
            Some(views) = updates.next() => printed = echo_reply(&views, base, printed),
            _ = tokio::signal::ctrl_c() => {
                controller.cancel();
            }
        }
    };
    if result.is_ok() {
        echo_reply(&controller.views(), base, printed);
        println!();
    }
    result
}

/// Print reply text not yet shown; returns how much has been shown
fn echo_reply(views: &SessionViews, base: usize, printed: usize) -> usize {
    let Some(turn) = views.history.records().get(base) else {
        return printed;
    };
    if let Some(delta) = turn.assistant_text.get(printed..) {
        print!("{delta}");
        let _ = std::io::stdout().flush();
    }
    turn.assistant_text.len()
}

fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > PREVIEW_CHARS {
        let cut: String = line.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}

fn print_opened(info: &SessionInfo, views: &SessionViews) {
    println!("session {} ({} messages)", info.name, info.message_count);
    for turn in &views.history {
        println!("  [{}] {}", turn.id, preview(&turn.user_text));
    }
}

fn print_context(views: &SessionViews, relevance: &RelevanceConfig) {
    println!("context:");
    let current = views.context.current().map(|entry| &entry.turn.id);
    for entry in &views.context {
        let marker = if current == Some(&entry.turn.id) { " (current)" } else { "" };
        println!(
            "  {:<4} {:.2} [{}] {}{marker}",
            entry.tier(relevance).label(),
            entry.similarity,
            entry.turn.id,
            preview(&entry.turn.user_text),
        );
    }
    let stats = views.stats;
    println!(
        "  {} turns, avg {:.2}, {} high, {} words",
        stats.turn_count, stats.average_similarity, stats.high_tier_count, stats.total_word_count
    );
}

fn print_report(report: &SimilarityReport, views: &SessionViews, relevance: &RelevanceConfig) {
    println!("similarity to latest turn:");
    for turn in &views.history {
        match report.similarity(&turn.id) {
            Some(similarity) => println!(
                "  {:<4} {:.2} [{}] {}",
                relevance.classify(similarity).label(),
                similarity,
                turn.id,
                preview(&turn.user_text)
            ),
            None => println!("  -    ---- [{}] {}", turn.id, preview(&turn.user_text)),
        }
    }
    let stats = report.stats;
    println!(
        "  {} turns, avg {:.2}, {} high, {} words",
        stats.turn_count, stats.average_similarity, stats.high_tier_count, stats.total_word_count
    );
}
