//! Interactive terminal front end.

use std::io::{self, Write};

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::info;

use crate::chat::{Assistant, ChatEvent, ChatPhase, NOTHING_FOUND};
use crate::prompt::sources_lines;

/// Greeting printed once at startup.
pub const WELCOME: &str = "Welcome to Mealie QA! (Type 'exit' to quit)";

const PROMPT: &str = "\n👤 You: ";
const NO_RECIPES: &str = "No relevant recipes found.";
const GOODBYE: &str = "\nGoodbye!";

fn is_exit(line: &str) -> bool {
    let line = line.trim();
    line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit")
}

/// Reads queries line by line from `input` until `exit`, `quit` or end of
/// input, streaming each answer to `out`.
pub async fn run<R, W>(assistant: &Assistant, mut input: R, out: &mut W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    writeln!(out, "{WELCOME}")?;
    let mut line = String::new();
    loop {
        write!(out, "{PROMPT}")?;
        out.flush()?;
        line.clear();
        if input.read_line(&mut line).await? == 0 {
            writeln!(out, "{GOODBYE}")?;
            break;
        }
        if is_exit(&line) {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        info!(query = line.trim(), "received input");
        answer(assistant, line.trim(), out).await?;
    }
    Ok(())
}

async fn answer<W: Write>(assistant: &Assistant, query: &str, out: &mut W) -> io::Result<()> {
    let mut events = assistant.respond(query);
    let mut streamed = false;
    while let Some(event) = events.recv().await {
        match event {
            ChatEvent::Retrieved(hits) => write!(out, "{}", sources_lines(&hits))?,
            ChatEvent::Phase(ChatPhase::AwaitingResponse) => write!(out, "\nThinking...")?,
            ChatEvent::Phase(ChatPhase::Streaming) => {
                streamed = true;
                write!(out, "\r🤖 MealieChef: ")?;
            }
            ChatEvent::Phase(_) => {}
            ChatEvent::Chunk(chunk) => write!(out, "{chunk}")?,
            ChatEvent::Notice(text) if text == NOTHING_FOUND => writeln!(out, "{NO_RECIPES}")?,
            ChatEvent::Notice(text) => write!(out, "\n{text}")?,
            ChatEvent::Sources(table) => write!(out, "\n\n{table}")?,
        }
        out.flush()?;
    }
    if streamed {
        writeln!(out)?;
    }
    Ok(())
}
