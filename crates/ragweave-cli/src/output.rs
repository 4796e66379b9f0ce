//! Terminal output
//!
//! Results go to stdout; logs go to stderr.

use colored::Colorize;
use ragweave_kernel::rag::ScoredContent;

pub fn heading(title: &str) {
    println!("\n{} {}", "→".green(), title.bold());
}

pub fn question(text: &str) {
    println!("{} {}", "Question:".cyan().bold(), text);
}

pub fn answer(text: &str) {
    println!("{} {}", "Answer:".green().bold(), text);
}

pub fn augmented_prompt(text: &str) {
    println!("{}", "Augmented prompt:".yellow().bold());
    for line in text.lines() {
        println!("  {line}");
    }
}

pub fn scored_match(text: &str, score: f64) {
    println!("{} {}", format!("[{score:.4}]").dimmed(), text);
}

/// Lists injected content with its score and metadata.
pub fn sources(sources: &[ScoredContent]) {
    if sources.is_empty() {
        println!("{}", "Sources: none".dimmed());
        return;
    }
    println!("{}", "Sources:".bold());
    for (i, source) in sources.iter().enumerate() {
        println!("  {}. {}", i + 1, format!("(score {:.4})", source.score).dimmed());
        for line in source.text.lines() {
            println!("     {line}");
        }
        for (key, value) in source.metadata.iter() {
            println!("     {} {}", format!("{key}:").dimmed(), value);
        }
    }
}

pub fn done(message: &str) {
    println!("{} {}", "✓".green(), message);
}
