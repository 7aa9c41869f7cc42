//! Terminal rendering of a turn: progressive answer text followed by the
//! sources, images and archive numbers.

use std::io::{self, Write};

use archief_rag::{AssistantReply, ChatSession, QueryPipeline, ResponseState};

/// Writes answer text as it grows and the presentation lists once the turn
/// is complete.
pub struct Presenter<W: Write> {
    out: W,
    shown: String,
    error: Option<io::Error>,
}

impl<W: Write> Presenter<W> {
    pub fn new(out: W) -> Self {
        Self { out, shown: String::new(), error: None }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Print whatever part of `state.text` is not on screen yet. If the text
    /// was replaced rather than extended (an error placeholder), print it on
    /// a fresh line.
    pub fn update(&mut self, state: &ResponseState) {
        if self.error.is_some() {
            return;
        }
        let result = if let Some(delta) = state.text.strip_prefix(self.shown.as_str()) {
            self.shown.push_str(delta);
            write!(self.out, "{delta}")
        } else {
            let separator = if self.shown.is_empty() { "" } else { "\n" };
            self.shown = state.text.clone();
            write!(self.out, "{separator}{}", state.text)
        };
        if let Err(e) = result.and_then(|()| self.out.flush()) {
            self.error = Some(e);
        }
    }

    /// End the turn: newline, then the non-empty lists.
    pub fn finish(&mut self, reply: &AssistantReply) -> io::Result<()> {
        self.shown.clear();
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        writeln!(self.out)?;
        if reply.degraded {
            writeln!(self.out, "(answer was cut short)")?;
        }
        self.section("Sources", &reply.state.source_paths)?;
        self.section("Images", &reply.state.image_paths)?;
        self.section("Archive numbers", &reply.state.archive_numbers)?;
        self.out.flush()
    }

    fn section(&mut self, title: &str, items: &[String]) -> io::Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        writeln!(self.out, "\n{title}:")?;
        for item in items {
            writeln!(self.out, "  - {item}")?;
        }
        Ok(())
    }
}

/// Run one turn through `session` and render it.
pub async fn present_turn<W: Write + Send>(
    session: &mut ChatSession,
    pipeline: &QueryPipeline,
    query: &str,
    presenter: &mut Presenter<W>,
) -> io::Result<AssistantReply> {
    let reply = session.ask(pipeline, query, |state| presenter.update(state)).await;
    presenter.finish(&reply)?;
    Ok(reply)
}
