//! Completion stream consumption.
//!
//! Pulls token chunks off the backend stream and re-derives the current
//! best diff after each one. Partial results are the contract: a timeout,
//! cancellation, or mid-stream failure finalizes the last computed diff
//! instead of discarding it. Only a failure before the first byte
//! (`BackendUnavailable`, raised by the client) is a hard error.

use std::time::Duration;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use ca_clients::CompletionClient;
use ca_domain::diff::Diff;
use ca_domain::error::Result;
use ca_domain::stream::CompletionEvent;
use ca_engine::diff::StreamingDiff;
use ca_engine::fim::FimPrompt;

/// What streaming produced: the final candidate snapshot, its diff against
/// the submitted code, and whether the stream ended early.
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    /// Raw completion text received.
    pub completion: String,
    /// Post-edit code: prefix + completion + suffix.
    pub code: String,
    pub diff: Diff,
    /// True when the stream was cut short (error, timeout, cancellation)
    /// and `diff` is a valid partial result.
    pub interrupted: bool,
}

/// Stream a completion and assemble the diff incrementally.
///
/// `original` is the submitted code snapshot the diff is computed against.
/// The `timeout` bounds the whole stream; `cancel` aborts it early. Both
/// paths return the partial diff rather than an error.
pub async fn stream_to_diff(
    completion: &dyn CompletionClient,
    prompt: &FimPrompt,
    original: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<StreamOutcome> {
    // Connection-level failures surface here as `BackendUnavailable` —
    // nothing has streamed, so there is no partial result to salvage.
    let mut stream = completion.stream(prompt.render()).await?;

    let mut tracker = StreamingDiff::new(original);
    let mut buffer = String::new();
    let mut interrupted = false;

    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("completion stream cancelled by caller");
                interrupted = true;
                break;
            }
            _ = &mut deadline => {
                tracing::warn!(timeout_secs = timeout.as_secs(), "completion stream timed out");
                interrupted = true;
                break;
            }
            event = stream.next() => {
                match event {
                    Some(Ok(CompletionEvent::Chunk { text })) => {
                        buffer.push_str(&text);
                        let candidate = candidate_code(prompt, &buffer);
                        let seam = seam_line(prompt, &buffer);
                        tracker.revise(&candidate, seam);
                    }
                    Some(Ok(CompletionEvent::Done { finish_reason })) => {
                        tracing::debug!(?finish_reason, "completion stream finished");
                        break;
                    }
                    Some(Ok(CompletionEvent::Error { message })) => {
                        tracing::warn!(error = %message, "completion stream errored mid-flight");
                        interrupted = true;
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "completion transport dropped mid-stream");
                        interrupted = true;
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    let code = candidate_code(prompt, &buffer);
    let diff = tracker.finalize(&code);

    Ok(StreamOutcome {
        completion: buffer,
        code,
        diff,
        interrupted,
    })
}

/// The full post-edit snapshot implied by the text streamed so far.
fn candidate_code(prompt: &FimPrompt, buffer: &str) -> String {
    format!("{}{}{}", prompt.prefix, buffer, prompt.suffix)
}

/// The 1-based candidate line still receiving streamed text: everything
/// before it is settled, everything at or past it is provisional.
fn seam_line(prompt: &FimPrompt, buffer: &str) -> u32 {
    let newlines = prompt.prefix.matches('\n').count() + buffer.matches('\n').count();
    newlines as u32 + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use ca_domain::error::Error;
    use ca_domain::stream::BoxStream;

    /// Scripted completion backend: yields the given events, then an
    /// optional transport error.
    struct ScriptedCompletion {
        events: Vec<CompletionEvent>,
        then_transport_error: bool,
        refuse_connection: bool,
    }

    #[async_trait::async_trait]
    impl CompletionClient for ScriptedCompletion {
        async fn stream(
            &self,
            _prompt: String,
        ) -> Result<BoxStream<'static, Result<CompletionEvent>>> {
            if self.refuse_connection {
                return Err(Error::BackendUnavailable("connection refused".into()));
            }
            let events = self.events.clone();
            let fail = self.then_transport_error;
            let stream = async_stream::stream! {
                for ev in events {
                    yield Ok(ev);
                }
                if fail {
                    yield Err(Error::Http("connection reset".into()));
                }
            };
            Ok(Box::pin(stream))
        }
    }

    fn chunk(text: &str) -> CompletionEvent {
        CompletionEvent::Chunk { text: text.into() }
    }

    fn prompt_for(prefix: &str, suffix: &str) -> FimPrompt {
        FimPrompt {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    #[tokio::test]
    async fn clean_stream_produces_final_diff() {
        let backend = ScriptedCompletion {
            events: vec![
                chunk("    return a"),
                chunk(" + b"),
                CompletionEvent::Done {
                    finish_reason: Some("stop".into()),
                },
            ],
            then_transport_error: false,
            refuse_connection: false,
        };
        let prompt = prompt_for("def add(a, b):\n", "");
        let original = "def add(a, b):\n    pass\n";

        let out = stream_to_diff(
            &backend,
            &prompt,
            original,
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(!out.interrupted);
        assert_eq!(out.completion, "    return a + b");
        assert_eq!(out.code, "def add(a, b):\n    return a + b");
        assert!(!out.diff.has_provisional());
        assert!(out
            .diff
            .inserted_lines()
            .any(|(_, t)| t == "    return a + b"));
    }

    #[tokio::test]
    async fn transport_drop_returns_partial_diff() {
        // 2 of an expected 5 chunks arrive, then the connection resets.
        let backend = ScriptedCompletion {
            events: vec![chunk("x = 1\n"), chunk("y = 2\n")],
            then_transport_error: true,
            refuse_connection: false,
        };
        let prompt = prompt_for("", "");

        let out = stream_to_diff(
            &backend,
            &prompt,
            "",
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(out.interrupted);
        assert!(!out.diff.ops.is_empty(), "partial diff must not be discarded");
        let inserted: Vec<&str> = out.diff.inserted_lines().map(|(_, t)| t).collect();
        assert_eq!(inserted, vec!["x = 1", "y = 2"]);
        assert!(!out.diff.has_provisional());
    }

    #[tokio::test]
    async fn connection_refused_is_backend_unavailable() {
        let backend = ScriptedCompletion {
            events: vec![],
            then_transport_error: false,
            refuse_connection: true,
        };
        let prompt = prompt_for("", "");

        let err = stream_to_diff(
            &backend,
            &prompt,
            "",
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn cancellation_finalizes_partial() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let backend = ScriptedCompletion {
            events: vec![chunk("never consumed")],
            then_transport_error: false,
            refuse_connection: false,
        };
        let prompt = prompt_for("", "");

        let out = stream_to_diff(
            &backend,
            &prompt,
            "",
            Duration::from_secs(5),
            &cancel,
        )
        .await
        .unwrap();
        assert!(out.interrupted);
    }

    #[tokio::test]
    async fn in_stream_error_event_interrupts_with_partial() {
        let backend = ScriptedCompletion {
            events: vec![
                chunk("a = 1\n"),
                CompletionEvent::Error {
                    message: "upstream overloaded".into(),
                },
            ],
            then_transport_error: false,
            refuse_connection: false,
        };
        let prompt = prompt_for("", "");

        let out = stream_to_diff(
            &backend,
            &prompt,
            "",
            Duration::from_secs(5),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(out.interrupted);
        assert_eq!(out.completion, "a = 1\n");
    }
}
