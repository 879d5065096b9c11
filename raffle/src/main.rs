//! Raffle console
//!
//! Line-oriented operator console for the raffle engine. Records go to the
//! REST record service when `RAFFLE_BACKEND_URL` is set and stay in memory
//! otherwise.
//!
//! # Usage
//!
//! ```bash
//! RAFFLE_BACKEND_URL=http://localhost/api cargo run --bin raffle
//! ```

use raffle::{Config, Raffle, RaffleAction, RaffleEnvironment, RaffleError, RestRecordStore};
use raffle_core::environment::{SystemClock, ThreadRandom};
use raffle_core::record_store::RecordStore;
use raffle_runtime::retry::RetryPolicy;
use raffle_testing::InMemoryRecordStore;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "\
Commands:
  add <name>          add a participant
  rm <n>              remove participant #n
  prize <name>        add a prize at the lowest rank
  rm-prize <n>        remove prize #n
  up <n> / down <n>   move prize #n one rank up or down
  draw                run a draw
  list                show participants, prizes and winners
  clear-participants | clear-prizes | clear-winners
  reset               clear everything
  help | quit";

/// One parsed console line
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Add(String),
    Remove(usize),
    Prize(String),
    RemovePrize(usize),
    Up(usize),
    Down(usize),
    Draw,
    List,
    ClearParticipants,
    ClearPrizes,
    ClearWinners,
    Reset,
    Help,
    Quit,
}

fn parse(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    let position = || {
        rest.parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("`{word}` needs a list number, e.g. `{word} 1`"))
    };

    Ok(match word {
        "add" => Command::Add(rest.to_string()),
        "rm" => Command::Remove(position()?),
        "prize" => Command::Prize(rest.to_string()),
        "rm-prize" => Command::RemovePrize(position()?),
        "up" => Command::Up(position()?),
        "down" => Command::Down(position()?),
        "draw" => Command::Draw,
        "list" | "ls" => Command::List,
        "clear-participants" => Command::ClearParticipants,
        "clear-prizes" => Command::ClearPrizes,
        "clear-winners" => Command::ClearWinners,
        "reset" => Command::Reset,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("Unknown command `{other}`, try `help`")),
    })
}

async fn print_lists(raffle: &Raffle) {
    let participants = raffle.participants().await;
    println!("Participants ({}):", participants.len());
    for (i, p) in participants.iter().enumerate() {
        println!("  {}. {}", i + 1, p.name);
    }

    let prizes = raffle.prizes().await;
    println!("Prizes ({}):", prizes.len());
    for (i, p) in prizes.iter().enumerate() {
        println!("  {}. {} (rank {})", i + 1, p.name, p.rank);
    }

    let winners = raffle.winners().await;
    println!("Winners ({}):", winners.len());
    for w in &winners {
        println!("  🏆 {} won {} (rank {}) at {}", w.participant_name, w.prize_name, w.prize_rank, w.timestamp);
    }
}

async fn run(raffle: &Raffle, command: Command) -> Result<bool, RaffleError> {
    let nth_participant = |n: usize| async move {
        raffle.participants().await.get(n - 1).map(|p| p.id.clone())
    };
    let nth_prize = |n: usize| async move { raffle.prizes().await.get(n - 1).map(|p| p.id.clone()) };

    match command {
        Command::Add(name) => match raffle.add_participant(&name).await? {
            Some(p) => println!("Added {}", p.name),
            None => println!("Name is empty, nothing added"),
        },
        Command::Remove(n) => match nth_participant(n).await {
            Some(id) => raffle.remove_participant(&id).await?,
            None => println!("No participant #{n}"),
        },
        Command::Prize(name) => match raffle.add_prize(&name).await? {
            Some(p) => println!("Added {} at rank {}", p.name, p.rank),
            None => println!("Name is empty, nothing added"),
        },
        Command::RemovePrize(n) => match nth_prize(n).await {
            Some(id) => raffle.remove_prize(&id).await?,
            None => println!("No prize #{n}"),
        },
        Command::Up(n) | Command::Down(n) => {
            let Some(id) = nth_prize(n).await else {
                println!("No prize #{n}");
                return Ok(true);
            };
            let moved = if matches!(command, Command::Up(_)) {
                raffle.move_prize_up(&id).await?
            } else {
                raffle.move_prize_down(&id).await?
            };
            if !moved {
                println!("Prize #{n} is already at the edge");
            }
        },
        Command::Draw => {
            let winner = raffle.request_draw().await?;
            println!(
                "\r🎉 {} wins {} (rank {})!        ",
                winner.participant_name, winner.prize_name, winner.prize_rank
            );
        },
        Command::List => print_lists(raffle).await,
        Command::ClearParticipants => raffle.clear_participants().await?,
        Command::ClearPrizes => raffle.clear_prizes().await?,
        Command::ClearWinners => raffle.clear_winners().await?,
        Command::Reset => raffle.reset_all().await?,
        Command::Help => println!("{HELP}"),
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let records: Arc<dyn RecordStore> = match &config.backend.url {
        Some(url) => {
            let retry = RetryPolicy::builder()
                .max_retries(config.backend.max_retries)
                .build();
            Arc::new(RestRecordStore::new(url.clone(), config.http_timeout(), retry)?)
        },
        None => {
            tracing::warn!("RAFFLE_BACKEND_URL not set, records are kept in memory only");
            Arc::new(InMemoryRecordStore::new())
        },
    };

    let raffle = Raffle::new(
        RaffleEnvironment::new(
            Arc::new(SystemClock),
            Arc::new(ThreadRandom),
            records,
            config.pacing(),
        ),
        config.request_timeout(),
    );

    if let Err(error) = raffle.load().await {
        tracing::error!(%error, "Initial load failed, starting empty");
    }

    // Rolling highlight
    let mut actions = raffle.subscribe();
    tokio::spawn(async move {
        while let Ok(action) = actions.recv().await {
            if let RaffleAction::CandidateHighlighted { participant, .. } = action {
                print!("\r🎲 {:<30}", participant.name);
                let _ = std::io::stdout().flush();
            }
        }
    });

    println!("🎟️  Raffle ready. Type `help` for commands.");
    print_lists(&raffle).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse(&line) {
            Ok(command) => command,
            Err(message) => {
                println!("{message}");
                continue;
            },
        };
        match run(&raffle, command).await {
            Ok(true) => {},
            Ok(false) => break,
            Err(error) => println!("⚠️  {error}"),
        }
    }

    raffle.shutdown(Duration::from_secs(5)).await?;
    Ok(())
}
