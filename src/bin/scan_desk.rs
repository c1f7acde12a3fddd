use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use smartattend::desk::{ApiClient, AttendanceApi, Cue, ScanDesk, ScanOutcome, Toggle};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Attendance scan desk. Reads QR payloads (one per line) from a keyboard-wedge reader.
#[derive(Parser, Debug)]
#[command(name = "scan-desk", version, about)]
struct Args {
    /// API root, e.g. http://localhost:8080/api
    #[arg(long, env = "SCAN_API_URL", default_value = "http://localhost:8080/api")]
    api_url: String,

    #[arg(long, env = "SCAN_EMAIL")]
    email: String,

    #[arg(long, env = "SCAN_PASSWORD", hide_env_values = true)]
    password: String,

    /// Subject or event to mark against
    #[arg(long, env = "SCAN_SUBJECT")]
    subject: Option<String>,

    /// Seconds during which a repeated code is ignored
    #[arg(long, env = "SCAN_DEDUPE_SECS", default_value_t = 3)]
    dedupe_secs: u64,
}

const HELP: &str = "commands: /subject <name>, /pause, /resume, /toggle <registration number>, /roster, /quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "smartattend=info".to_string()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let client = ApiClient::new(&args.api_url);
    let me = client
        .login(&args.email, &args.password)
        .await
        .context("login failed")?;
    println!("signed in as {} ({})", me.full_name, me.role);

    let mut desk = ScanDesk::new(client, Duration::from_secs(args.dedupe_secs));
    if let Some(subject) = &args.subject {
        desk.set_subject(subject);
    }
    refresh(&mut desk).await;
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if let Some(cmd) = line.strip_prefix('/') {
            let (name, rest) = cmd.split_once(' ').unwrap_or((cmd, ""));
            match name {
                "quit" | "exit" => break,
                "pause" => {
                    desk.pause();
                    println!("paused");
                }
                "resume" => {
                    desk.resume();
                    println!("scanning");
                }
                "subject" => {
                    desk.set_subject(rest);
                    refresh(&mut desk).await;
                    println!("subject: {}", desk.subject().unwrap_or("(none)"));
                }
                "roster" => print_roster(&desk),
                "toggle" => toggle(&mut desk, rest.trim()).await,
                _ => println!("{HELP}"),
            }
            continue;
        }

        let outcome = desk.scan(line).await;
        report(&outcome);
        if matches!(outcome, ScanOutcome::Failed(_)) && desk.api().session().await.is_none() {
            anyhow::bail!("session ended; sign in again");
        }
    }

    desk.api().logout().await;
    Ok(())
}

async fn refresh(desk: &mut ScanDesk<ApiClient>) {
    match desk.api().students().await {
        Ok(users) => desk.load_roster(&users),
        Err(e) => eprintln!("roster unavailable: {e}"),
    }
    match desk.api().today().await {
        Ok(entries) => desk.apply_today(&entries),
        Err(e) => eprintln!("today's attendance unavailable: {e}"),
    }
}

async fn toggle(desk: &mut ScanDesk<ApiClient>, key: &str) {
    let Some(user_id) = desk
        .roster()
        .iter()
        .find(|r| r.registration_number.as_deref() == Some(key))
        .map(|r| r.user_id)
    else {
        println!("no roster row for {key}");
        return;
    };
    match desk.toggle(user_id).await {
        Some(Toggle::Confirmed) => println!("updated {key}"),
        Some(Toggle::RolledBack) => println!("\x07could not update {key}; restored"),
        Some(Toggle::Pending) | None => println!("{key} is busy or no subject is set"),
    }
}

fn report(outcome: &ScanOutcome) {
    let bell = match outcome.cue() {
        Cue::Error | Cue::Warning => "\x07",
        Cue::Success | Cue::Silent => "",
    };
    let text = match outcome {
        ScanOutcome::Marked { student, .. } => format!("marked {}", student.name),
        ScanOutcome::AlreadyMarked { student } => format!("{} already marked today", student.name),
        ScanOutcome::UnknownCode(code) => format!("unknown code {code}"),
        ScanOutcome::Ignored(reason) => format!("ignored ({reason:?})"),
        ScanOutcome::Failed(msg) => format!("failed: {msg}"),
    };
    println!("{bell}{text}");
}

fn print_roster<A: AttendanceApi>(desk: &ScanDesk<A>) {
    for row in desk.roster() {
        println!(
            "[{}] {} {}",
            if row.present { "x" } else { " " },
            row.registration_number.as_deref().unwrap_or("-"),
            row.name
        );
    }
}
