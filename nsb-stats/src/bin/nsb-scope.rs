use std::path::PathBuf;

use nsb_stats::stats::{practice_stats, versus_stats};
use nsb_stats::StatsSnapshot;
use tally::{FileCache, LocalCache, Mergeable};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() != 2 {
        eprintln!("Usage: {} <path-to-stats-cache>", args[0]);
        eprintln!("\nExample: {} ./nsb_stats.json", args[0]);
        std::process::exit(1);
    }

    let file_path = PathBuf::from(&args[1]);

    if !file_path.exists() {
        eprintln!("Error: File '{}' does not exist", file_path.display());
        std::process::exit(1);
    }

    // corrupt files load as empty, with a warning in the log
    let snapshot: StatsSnapshot = FileCache::new(&file_path).load();

    println!("NSB Scope - Stats Cache Analyzer");
    println!("================================");
    println!("File: {}", file_path.display());
    println!("Events: {}", snapshot.num_events());
    println!();

    let practice = practice_stats(&snapshot, chrono::Utc::now());
    println!("Practice:");
    println!("---------");
    println!("  Answered: {}", practice.total);
    println!("  Correct: {}", practice.correct);
    println!("  Points: {}", practice.points);
    println!("  Current streak: {}", practice.streak);
    println!(
        "  Last 7 days: {}/{} correct",
        practice.recent_correct, practice.recent_total
    );
    for (subject, s) in &practice.by_subject {
        println!("  {subject}: {}/{} ({}%)", s.correct, s.total, s.pct);
    }
    println!();

    let versus = versus_stats(&snapshot);
    println!("Versus:");
    println!("-------");
    println!("  Played: {}", versus.total);
    println!(
        "  Wins: {}  Losses: {}  Ties: {}",
        versus.wins, versus.losses, versus.ties
    );
    for (difficulty, d) in &versus.by_difficulty {
        println!("  {difficulty:?}: {} wins of {}", d.wins, d.played);
    }
    if !versus.recent.is_empty() {
        println!("  Recent:");
        for m in &versus.recent {
            println!(
                "    {}  {:?}  {}-{}{}",
                m.timestamp,
                m.event.difficulty,
                m.event.you_score,
                m.event.bot_score,
                if m.event.won() { "  (won)" } else { "" }
            );
        }
    }

    println!();
    println!("Summary:");
    println!("--------");
    let out_of_order = snapshot
        .practice_history
        .windows(2)
        .any(|w| w[0].timestamp > w[1].timestamp)
        || snapshot
            .versus_history
            .windows(2)
            .any(|w| w[0].timestamp > w[1].timestamp);
    if out_of_order {
        println!("  ⚠️  History is not in timestamp order");
    } else {
        println!("  ✅ History is in timestamp order");
    }
}
