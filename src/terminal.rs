//! Terminal rendering of run events and interactive input for the CLI.

use agentrelay::observability::RuntimeTrace;
use agentrelay::workflow::{AbortReason, Event, EventKind, EventSink};
use anyhow::Result;
use console::{style, Term};
use std::io::BufRead;

/// Prints agent headers, streamed chunks and run outcomes; optionally mirrors
/// every event into the runtime trace.
pub struct ConsoleSink {
    term: Term,
    trace: Option<RuntimeTrace>,
    /// Chunks were printed for the current invocation.
    streamed: bool,
}

impl ConsoleSink {
    pub fn new(trace: Option<RuntimeTrace>) -> Self {
        Self {
            term: Term::stdout(),
            trace,
            streamed: false,
        }
    }

    fn line(&self, text: &str) {
        let _ = self.term.write_line(text);
    }

    fn render(&mut self, event: &Event) {
        match &event.kind {
            EventKind::Started { .. } => {}
            EventKind::AgentInvoked { agent_id, .. } => {
                self.streamed = false;
                self.line("");
                self.line(&format!("{}", style(format!("[{agent_id}]")).cyan().bold()));
            }
            EventKind::PartialOutput { chunk, .. } => {
                self.streamed = true;
                let _ = self.term.write_str(chunk);
                let _ = self.term.flush();
            }
            EventKind::MessageProduced { message, .. } => {
                if self.streamed {
                    self.line("");
                } else {
                    self.line(&message.text());
                }
                for (code, detail) in message.warnings() {
                    self.line(&format!("{}", style(format!("  ! {code}: {detail}")).yellow()));
                }
            }
            EventKind::HandoffOccurred { from, to, label } => {
                let suffix = label
                    .as_deref()
                    .map(|l| format!(" ({l})"))
                    .unwrap_or_default();
                self.line(&format!(
                    "{}",
                    style(format!("  -> handoff {from} → {to}{suffix}")).dim()
                ));
            }
            EventKind::Completed { steps, .. } => {
                self.line(&format!(
                    "{}",
                    style(format!("✓ completed in {steps} step(s)")).green().dim()
                ));
            }
            EventKind::Failed { agent_id, error, .. } => {
                let who = agent_id.as_deref().unwrap_or("run");
                self.line(&format!("{}", style(format!("✗ {who} failed: {error}")).red()));
            }
            EventKind::Aborted { reason, steps } => {
                let why = match reason {
                    AbortReason::Cancelled => "cancelled".to_string(),
                    AbortReason::StepLimit { max_steps } => {
                        format!("step limit of {max_steps} reached")
                    }
                };
                self.line(&format!(
                    "{}",
                    style(format!("⚠ aborted after {steps} step(s): {why}")).yellow()
                ));
            }
        }
    }
}

impl EventSink for ConsoleSink {
    fn emit(&mut self, event: &Event) {
        if let Some(trace) = self.trace.as_mut() {
            trace.emit(event);
        }
        self.render(event);
    }
}

/// Read one line of user input. `None` on end of input.
///
/// Uses a dialoguer prompt on a terminal and plain stdin otherwise, so piped
/// input keeps working.
pub async fn read_input(prompt: &'static str) -> Result<Option<String>> {
    if console::user_attended() {
        let text = tokio::task::spawn_blocking(move || {
            dialoguer::Input::<String>::new()
                .with_prompt(prompt)
                .allow_empty(true)
                .interact_text()
        })
        .await??;
        return Ok(Some(text));
    }

    let line = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).map(|n| (n, line))
    })
    .await??;
    match line {
        (0, _) => Ok(None),
        (_, line) => Ok(Some(line.trim_end_matches(['\r', '\n']).to_string())),
    }
}

/// `exit` / `quit` (any case) end an interactive loop.
pub fn is_exit(input: &str) -> bool {
    matches!(input.trim().to_ascii_lowercase().as_str(), "exit" | "quit")
}
