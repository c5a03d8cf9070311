//! The `house index` command: load the corpus, fit the vectorizer and report.

use anyhow::Result;

use crate::app::HouseApp;
use crate::vectorize::build_index;

pub async fn run_index(app: &HouseApp) -> Result<()> {
    let (chunks, report) = app.load_corpus().await?;
    let chunk_count = chunks.len();
    let index = build_index(app.config(), chunks).await?;

    println!("{:<40} {:>8}", "FILE", "CHUNKS");
    for (file, count) in &report.files {
        println!("{:<40} {:>8}", file, count);
    }
    if !report.skipped.is_empty() {
        println!();
        println!("Skipped:");
        for (file, reason) in &report.skipped {
            println!("  {} ({})", file, reason);
        }
    }
    println!();
    println!(
        "{} chunk(s) from {} file(s), vectorizer: {}",
        chunk_count,
        report.files.len(),
        index.vectorizer().kind()
    );
    Ok(())
}
