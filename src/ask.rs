//! The `house ask` command.
//!
//! The name and question are trimmed and must not be blank. Credentials are
//! checked before the corpus is built, so a missing API key fails fast
//! instead of after a slow embedding pass.

use std::io::Write;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::app::HouseApp;
use crate::completion::create_backend;
use crate::situation::Room;
use crate::spirit::{AskRequest, SpiritResponse};

pub async fn run_ask(
    app: &HouseApp,
    resident_name: &str,
    room: Room,
    question: &str,
    no_stream: bool,
) -> Result<()> {
    let resident_name = resident_name.trim();
    let question = question.trim();
    if resident_name.is_empty() {
        bail!("A resident name is required");
    }
    if question.is_empty() {
        bail!("A question is required");
    }

    let config = app.config();
    let backend = create_backend(&config.completion)
        .context("The house spirit cannot answer without completion credentials")?;

    let spirit = app.spirit(Some(backend)).await?;
    let request = AskRequest {
        resident_name: resident_name.to_string(),
        room,
        question: question.to_string(),
    };
    let streaming = config.completion.streaming && !no_stream;
    info!(resident = %resident_name, room = %room, streaming, "question received");

    let response = if streaming {
        let mut stream = spirit.respond_stream(&request).await;
        let mut stdout = std::io::stdout();
        let mut printed = false;
        while let Some(fragment) = stream.next_fragment().await {
            if fragment.done {
                if !fragment.text.is_empty() {
                    if printed {
                        println!();
                    }
                    print!("{}", fragment.text);
                }
                break;
            }
            print!("{}", fragment.text);
            stdout.flush()?;
            printed = true;
        }
        println!();
        stream.into_response().await
    } else {
        let response = spirit.respond(&request, false).await;
        println!("{}", response.text);
        response
    };

    let exchange = response.to_exchange(&request, chrono::Local::now().naive_local());
    app.log().append(&exchange)?;

    print_provenance(&response);
    Ok(())
}

fn print_provenance(response: &SpiritResponse) {
    println!();
    println!("--- Memory Sources ---");
    if response.sources.is_empty() {
        println!("(none)");
    }
    for source in &response.sources {
        println!("  {}", source);
    }
    println!();
    println!("--- Memory Relevance ---");
    if response.relevance.is_empty() {
        println!("(none)");
    }
    for line in &response.relevance {
        println!("  {}", line);
    }
}
