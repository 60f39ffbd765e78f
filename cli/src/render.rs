//! Terminal output

use ballot_core::{
    format_timestamp, Capabilities, Election, ElectionSnapshot, ElectionStatus, Level,
    Notification, Roster, SessionSnapshot, SessionState,
};
use owo_colors::OwoColorize;

const RULE: &str = "═══════════════════════════════════════════════════════════";

fn status(status: ElectionStatus) -> String {
    match status {
        ElectionStatus::Active => status.label().green().bold().to_string(),
        ElectionStatus::Scheduled => status.label().yellow().to_string(),
        ElectionStatus::Completed => status.label().bright_black().to_string(),
    }
}

pub fn session(snapshot: &SessionSnapshot, is_deployer: bool) {
    match &snapshot.state {
        SessionState::Connected { account, chain_id } => {
            let role = if is_deployer { " (deployer)" } else { "" };
            println!(
                "  {}: {}{}  {}: {}",
                "Account".bright_black(),
                account.to_string().bright_green(),
                role.cyan(),
                "Chain".bright_black(),
                chain_id
            );
        }
        SessionState::Connecting => println!("  {}", "Connecting...".bright_black()),
        SessionState::Disconnected { reason } => {
            println!("  {}: {}", "Disconnected".red(), reason)
        }
    }
}

pub fn elections(list: &[Election], selected: u64) {
    println!("\n🗳️  Elections");
    println!("{}", RULE);
    if list.is_empty() {
        println!("  {}", "No elections yet".bright_black());
    }
    for election in list {
        let marker = if election.id == selected { "▶" } else { " " };
        println!(
            "{} {:>3}  {:<28} {:<10} {} candidate(s)",
            marker.cyan(),
            election.id,
            election.name,
            status(election.status()),
            election.candidate_count
        );
        println!("        {}", election.voting_window().bright_black());
    }
    println!();
}

pub fn election(snapshot: &ElectionSnapshot, caps: &Capabilities) {
    let e = &snapshot.election;
    println!("\n📋 {} (#{})", e.name.bold(), e.id);
    println!("{}", RULE);
    println!("  {:<14} {}", "Status:".bright_black(), status(e.status()));
    println!("  {:<14} {}", "Starts:".bright_black(), format_timestamp(e.start_time));
    println!("  {:<14} {}", "Ends:".bright_black(), format_timestamp(e.end_time));
    println!("  {:<14} {}", "Admin:".bright_black(), e.admin);
    println!(
        "  {:<14} {}",
        "Total votes:".bright_black(),
        snapshot.total_votes.to_string().bold()
    );

    println!("\n  Results");
    if snapshot.candidates.is_empty() {
        println!("  {}", "No candidates".bright_black());
    }
    for candidate in snapshot.results() {
        let mine = snapshot.voter.voted && snapshot.voter.voted_candidate_id == candidate.id;
        println!(
            "  {:>3}. {:<24} {:>6} vote(s)  {:>5.1}%{}",
            candidate.id,
            candidate.name,
            candidate.vote_count,
            snapshot.vote_share(candidate),
            if mine { "  ✓ your vote".green().to_string() } else { String::new() }
        );
    }

    println!("\n  {}", snapshot.voter.status_line());

    if caps.is_election_admin {
        println!("\n  Authorized voters");
        match &snapshot.roster {
            Roster::Loaded(entries) if entries.is_empty() => {
                println!("  {}", "None yet".bright_black())
            }
            Roster::Loaded(entries) => {
                for entry in entries {
                    let state = if entry.record.voted {
                        "voted".green().to_string()
                    } else {
                        "not voted".bright_black().to_string()
                    };
                    println!("  {}  {}", entry.address, state);
                }
            }
            Roster::Unavailable(reason) => {
                println!("  {} {}", "⚠️ Roster unavailable:".yellow(), reason)
            }
        }
    }

    let mut actions = Vec::new();
    if caps.can_vote {
        actions.push("vote");
    }
    if caps.can_add_candidate {
        actions.push("add-candidate, remove-candidate");
    }
    if caps.can_manage_voters {
        actions.push("authorize, revoke");
    }
    if caps.can_start {
        actions.push("start");
    }
    if caps.can_end {
        actions.push("end");
    }
    if !actions.is_empty() {
        println!("\n  {} {}", "Available:".bright_black(), actions.join(", "));
    }
    println!();
}

pub fn notification(n: &Notification) {
    match n.level {
        Level::Info => println!("{} {}", "ℹ".blue(), n.text),
        Level::Success => println!("{} {}", "✓".green(), n.text.green()),
        Level::Warning => println!("{} {}", "⚠".yellow(), n.text.yellow()),
        Level::Error => println!("{} {}", "✗".red(), n.text.red()),
    }
}
