//! leaddesk-cli: operator CLI for the LeadDesk HTTP API
//!
//! # Subcommands
//! - `status`                          : show server health
//! - `tickets [--status <s>] [--json]` : list the caller's leads
//! - `show <ticket>`                   : print a ticket conversation
//! - `reply <ticket> <message>`        : answer as the current assignee
//! - `assign <ticket> <agent-id>`      : reassign a lead (owner only)
//! - `resolve <ticket>` / `reopen <ticket>`
//! - `analytics`                       : dashboard numbers
//! - `sweep`                           : run the missed-chat sweep now (owner only)
//!
//! Agent commands need a session token (`--token` or `LEADDESK_TOKEN`), as
//! printed by `leaddesk-server --issue-token <agent-id>`.

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8080";
const PREVIEW_CHARS: usize = 48;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "leaddesk-cli", version, about = "LeadDesk operator CLI")]
struct Cli {
    /// LeadDesk HTTP server URL (overrides LEADDESK_HTTP_URL env var)
    #[arg(long, env = "LEADDESK_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    /// Agent session token
    #[arg(long, env = "LEADDESK_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show LeadDesk server status
    Status,

    /// List leads visible to the caller
    Tickets {
        /// resolved, unresolved or all
        #[arg(long)]
        status: Option<String>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Print a ticket conversation
    Show { ticket: String },

    /// Reply to a ticket as the current assignee
    Reply { ticket: String, message: String },

    /// Make another agent the current assignee
    Assign { ticket: String, agent: String },

    /// Mark a ticket resolved
    Resolve { ticket: String },

    /// Mark a ticket unresolved
    Reopen { ticket: String },

    /// Show dashboard analytics
    Analytics,

    /// Flag unanswered leads past the missed-chat timer
    Sweep,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AssigneeRef {
    pub agent_id: String,
    pub name: String,
}

/// One row of `GET /tickets`
#[derive(Debug, Deserialize)]
pub struct TicketRow {
    pub ticket_id: String,
    pub latest_message: String,
    pub contact_name: Option<String>,
    pub status: String,
    pub is_missed_chat: bool,
    pub response_time_seconds: i64,
    pub is_current_assignee: bool,
    pub assignee: AssigneeRef,
}

#[derive(Debug, Deserialize)]
pub struct TicketList {
    pub total: usize,
    pub leads: Vec<TicketRow>,
}

#[derive(Debug, Deserialize)]
pub struct ConversationEntry {
    pub sender_name: String,
    pub body: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct TicketConversation {
    pub ticket_id: String,
    pub messages: Vec<ConversationEntry>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsReport {
    pub total_leads: u64,
    pub resolved_percentage: u32,
    pub average_response_time: i64,
    pub missed_chat_weekly_series: Vec<u32>,
}

// ============================================================================
// Formatting
// ============================================================================

/// `GET /tickets` URL, with the status filter when one is given.
pub fn tickets_url(server: &str, status: Option<&str>) -> String {
    match status.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => format!("{}/tickets?status={}", server, s),
        None => format!("{}/tickets", server),
    }
}

/// `90` -> `1m 30s`, `3725` -> `1h 2m 5s`.
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{}h {}m {}s", h, m, s)
    } else if m > 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{}s", s)
    }
}

fn preview(text: &str) -> String {
    let first_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    if first_line.chars().count() > PREVIEW_CHARS {
        let cut: String = first_line.chars().take(PREVIEW_CHARS - 1).collect();
        format!("{}…", cut)
    } else {
        first_line.to_string()
    }
}

/// One listing line per lead.
pub fn format_ticket_row(row: &TicketRow) -> String {
    let mut flags = Vec::new();
    if row.is_current_assignee {
        flags.push("mine");
    }
    if row.is_missed_chat {
        flags.push("missed");
    }
    let response = if row.response_time_seconds > 0 {
        format_duration(row.response_time_seconds)
    } else {
        "-".to_string()
    };

    format!(
        "{:<14} {:<10} {:<20} {:<20} {:>10}  {}{}",
        row.ticket_id,
        row.status,
        row.contact_name.as_deref().unwrap_or("(anonymous)"),
        row.assignee.name,
        response,
        preview(&row.latest_message),
        if flags.is_empty() {
            String::new()
        } else {
            format!("  [{}]", flags.join(", "))
        }
    )
}

/// Oldest week first, one bar per week.
pub fn format_weekly_series(series: &[u32]) -> Vec<String> {
    let weeks = series.len();
    series
        .iter()
        .enumerate()
        .map(|(i, count)| {
            let label = match weeks - i - 1 {
                0 => "this week".to_string(),
                ago => format!("{} wk ago", ago),
            };
            format!("{:>10} {:>4} {}", label, count, "#".repeat(*count as usize))
        })
        .collect()
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client() -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?)
}

fn require_token(token: Option<&str>) -> &str {
    match token {
        Some(t) if !t.trim().is_empty() => t,
        _ => {
            eprintln!("leaddesk-cli: this command needs --token or LEADDESK_TOKEN");
            std::process::exit(1);
        }
    }
}

/// Sends the request and exits on transport or HTTP errors.
fn send(request: reqwest::blocking::RequestBuilder, url: &str) -> serde_json::Value {
    let resp = match request.send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("leaddesk-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    let body: serde_json::Value = resp.json().unwrap_or_default();
    if !status.is_success() {
        let message = body["message"].as_str().unwrap_or("no details");
        eprintln!("leaddesk-cli: server returned {}: {}", status, message);
        std::process::exit(1);
    }
    body
}

fn decode<T: for<'de> Deserialize<'de>>(body: serde_json::Value, what: &str) -> T {
    match serde_json::from_value(body) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("leaddesk-cli: failed to parse {} response: {}", what, e);
            std::process::exit(1);
        }
    }
}

fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);
    let resp = client()?.get(&url).send();

    match resp {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("LeadDesk server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:         {}", body["version"].as_str().unwrap_or("?"));
            println!("Store:           {}", body["store"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            eprintln!("leaddesk-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("leaddesk-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }
    Ok(())
}

fn do_tickets(server: &str, token: &str, status: Option<&str>, json: bool) -> anyhow::Result<()> {
    let url = tickets_url(server, status);
    let body = send(client()?.get(&url).bearer_auth(token), &url);

    if json {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let list: TicketList = decode(body, "tickets");
    if list.leads.is_empty() {
        eprintln!("No tickets.");
        return Ok(());
    }
    for row in &list.leads {
        println!("{}", format_ticket_row(row));
    }
    println!("\n{} ticket(s)", list.total);
    Ok(())
}

fn do_show(server: &str, token: &str, ticket: &str) -> anyhow::Result<()> {
    let url = format!("{}/tickets/{}", server, ticket);
    let body = send(client()?.get(&url).bearer_auth(token), &url);
    let conversation: TicketConversation = decode(body, "conversation");

    println!("Ticket {}\n", conversation.ticket_id);
    for m in &conversation.messages {
        println!("[{}] {}:", m.created_at, m.sender_name);
        println!("  {}\n", m.body);
    }
    Ok(())
}

fn do_reply(server: &str, token: &str, ticket: &str, message: &str) -> anyhow::Result<()> {
    let url = format!("{}/tickets/{}", server, ticket);
    let body = send(
        client()?
            .put(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "message": message })),
        &url,
    );

    println!("Reply sent to {}", ticket);
    if body["first_response"].as_bool().unwrap_or(false) {
        let seconds = body["lead"]["response_time_seconds"].as_i64().unwrap_or(0);
        println!("First response after {}", format_duration(seconds));
        if body["lead"]["is_missed_chat"].as_bool().unwrap_or(false) {
            println!("Flagged as a missed chat");
        }
    }
    Ok(())
}

fn do_assign(server: &str, token: &str, ticket: &str, agent: &str) -> anyhow::Result<()> {
    let url = format!("{}/tickets/{}/assignee", server, ticket);
    send(
        client()?
            .put(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "agent_id": agent })),
        &url,
    );
    println!("{} assigned to {}", ticket, agent);
    Ok(())
}

fn do_set_status(server: &str, token: &str, ticket: &str, status: &str) -> anyhow::Result<()> {
    let url = format!("{}/tickets/{}/status", server, ticket);
    send(
        client()?
            .put(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "status": status })),
        &url,
    );
    println!("{} is now {}", ticket, status);
    Ok(())
}

fn do_analytics(server: &str, token: &str) -> anyhow::Result<()> {
    let url = format!("{}/analytics", server);
    let body = send(client()?.get(&url).bearer_auth(token), &url);
    let report: AnalyticsReport = decode(body, "analytics");

    println!("Total leads:           {}", report.total_leads);
    println!("Resolved:              {}%", report.resolved_percentage);
    println!(
        "Average response time: {}",
        format_duration(report.average_response_time)
    );
    println!("\nMissed chats per week:");
    for line in format_weekly_series(&report.missed_chat_weekly_series) {
        println!("{}", line);
    }
    Ok(())
}

fn do_sweep(server: &str, token: &str) -> anyhow::Result<()> {
    let url = format!("{}/sla/sweep", server);
    let body = send(client()?.post(&url).bearer_auth(token), &url);

    if body["skipped"].as_bool().unwrap_or(false) {
        println!("Sweep skipped: no chat settings configured");
    } else {
        println!(
            "Flagged {} lead(s) (threshold {})",
            body["flagged"].as_u64().unwrap_or(0),
            format_duration(body["threshold_seconds"].as_i64().unwrap_or(0))
        );
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();
    let token = cli.token.as_deref();

    let result = match cli.command {
        Commands::Status => do_status(&server),
        Commands::Tickets { status, json } => {
            do_tickets(&server, require_token(token), status.as_deref(), json)
        }
        Commands::Show { ticket } => do_show(&server, require_token(token), &ticket),
        Commands::Reply { ticket, message } => {
            do_reply(&server, require_token(token), &ticket, &message)
        }
        Commands::Assign { ticket, agent } => {
            do_assign(&server, require_token(token), &ticket, &agent)
        }
        Commands::Resolve { ticket } => {
            do_set_status(&server, require_token(token), &ticket, "resolved")
        }
        Commands::Reopen { ticket } => {
            do_set_status(&server, require_token(token), &ticket, "unresolved")
        }
        Commands::Analytics => do_analytics(&server, require_token(token)),
        Commands::Sweep => do_sweep(&server, require_token(token)),
    };

    if let Err(e) = result {
        eprintln!("leaddesk-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
