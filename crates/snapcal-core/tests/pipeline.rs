use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use snapcal_core::*;
use snapcal_provider::{ModelCallError, ModelClient, ModelRequest, ModelResponse};
use snapcal_schema::{EventDefaults, EventSource, ExtractionContext, Modality, RawExtractionInput};

/// Replies with canned text and records every request it sees.
struct CannedProvider {
    reply: String,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl CannedProvider {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for CannedProvider {
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ModelCallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt);
        Ok(ModelResponse::text(self.reply.clone()))
    }
}

struct FailProvider;

#[async_trait]
impl ModelClient for FailProvider {
    async fn generate(&self, _request: ModelRequest) -> Result<ModelResponse, ModelCallError> {
        Err(ModelCallError::Api {
            provider: "gemini",
            status: 503,
            body: "overloaded".into(),
        })
    }
}

struct SlowProvider;

#[async_trait]
impl ModelClient for SlowProvider {
    async fn generate(&self, _request: ModelRequest) -> Result<ModelResponse, ModelCallError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(ModelResponse::text("[]"))
    }
}

fn ctx() -> ExtractionContext {
    let now = DateTime::parse_from_rfc3339("2025-03-01T08:00:00+01:00").unwrap();
    ExtractionContext::new("Europe/Berlin", now)
}

fn pipeline(provider: Arc<dyn ModelClient>) -> ExtractionPipeline {
    ExtractionPipeline::new(provider, "test-model")
}

#[tokio::test]
async fn team_sync_gets_end_time_and_date_filled_in() {
    let provider = CannedProvider::new(
        r#"[{"title":"Team Sync","startDate":"2025-03-04","startTime":"10:00","location":"Room 2"}]"#,
    );
    let events = pipeline(provider.clone())
        .extract_from_text("Team sync on March 4 at 10 in Room 2", &ctx())
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.title, "Team Sync");
    assert_eq!(event.start_date, "2025-03-04");
    assert_eq!(event.start_time, "10:00");
    assert_eq!(event.end_date, "2025-03-04");
    assert_eq!(event.end_time, "11:00");
    assert_eq!(event.location, "Room 2");
    assert!(!event.is_all_day);
    assert_eq!(event.source, EventSource::Ai);
    assert_eq!(event.created_at, ctx().now);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn empty_array_reports_no_events() {
    let err = pipeline(CannedProvider::new("[]"))
        .extract_from_text("nothing scheduled here", &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractionError::NoEventsFound { candidates: 0 }));
}

#[tokio::test]
async fn fenced_reply_is_unwrapped_and_defaulted() {
    let events = pipeline(CannedProvider::new("```json\n[{\"title\":\"Gala\"}]\n```"))
        .extract_from_text("Gala", &ctx())
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].title, "Gala");
    assert_eq!(events[0].start_date, "2025-03-01");
    assert_eq!(events[0].start_time, "09:00");
    assert_eq!(events[0].end_time, "10:00");
}

#[tokio::test]
async fn refusal_text_reports_no_events() {
    let err = pipeline(CannedProvider::new("Sorry, I cannot help with that."))
        .extract_from_text("please", &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractionError::NoEventsFound { candidates: 0 }));
}

#[tokio::test]
async fn malformed_replies_never_panic() {
    for reply in ["", "{", "[{\"title\":", "null", "42", "{\"title\": 5}", "[[[]]]"] {
        let result = pipeline(CannedProvider::new(reply))
            .extract_from_text("something", &ctx())
            .await;
        assert!(
            matches!(result, Err(ExtractionError::NoEventsFound { .. })),
            "reply {reply:?} gave {result:?}"
        );
    }
}

#[tokio::test]
async fn blank_text_is_rejected_without_a_model_call() {
    let provider = CannedProvider::new("[]");
    let pipeline = pipeline(provider.clone());
    for text in ["", "   ", "\n\t"] {
        let err = pipeline.extract_from_text(text, &ctx()).await.unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyInput));
    }
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn image_input_is_validated_before_the_model_call() {
    let provider = CannedProvider::new("[]");
    let pipeline = pipeline(provider.clone()).with_max_image_bytes(4);

    let err = pipeline
        .extract_from_image(Vec::new(), "image/png", &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractionError::EmptyInput));

    let err = pipeline
        .extract_from_image(vec![1, 2], "application/pdf", &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractionError::UnsupportedMediaType(ref m) if m == "application/pdf"));

    let err = pipeline
        .extract_from_image(vec![0; 5], "image/jpeg", &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractionError::ImageTooLarge { size: 5, limit: 4 }));

    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn image_extraction_uses_the_image_prompt() {
    let provider = CannedProvider::new(r#"[{"title":"Flyer Party","startDate":"2025-04-12"}]"#);
    let pipeline = pipeline(provider.clone());
    let events = pipeline
        .extract_from_image(vec![0xFF, 0xD8, 0xFF], "IMAGE/JPEG", &ctx())
        .await
        .unwrap();

    assert_eq!(events[0].title, "Flyer Party");
    let prompts = provider.prompts.lock().unwrap();
    assert_eq!(prompts[0], pipeline.prompts().build(Modality::Image, &ctx()));
}

#[tokio::test]
async fn text_prompt_carries_user_text_after_the_instruction() {
    let provider = CannedProvider::new(r#"[{"title":"Dentist"}]"#);
    let pipeline = pipeline(provider.clone());
    pipeline
        .extract_from_text("  Dentist Tuesday morning  ", &ctx())
        .await
        .unwrap();

    let prompts = provider.prompts.lock().unwrap();
    let instruction = pipeline.prompts().build(Modality::Text, &ctx());
    assert!(prompts[0].starts_with(&instruction));
    assert!(prompts[0].ends_with("\n---\nDentist Tuesday morning"));
}

#[tokio::test]
async fn prompt_is_identical_across_calls() {
    let provider = CannedProvider::new(r#"[{"title":"A"}]"#);
    let pipeline = pipeline(provider.clone());
    pipeline.extract_from_text("A", &ctx()).await.unwrap();
    pipeline.extract_from_text("A", &ctx()).await.unwrap();

    let prompts = provider.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert_eq!(prompts[0], prompts[1]);
}

#[tokio::test]
async fn rejected_candidates_are_counted() {
    let err = pipeline(CannedProvider::new(r#"[{"title":""},{"location":"Hall"}]"#))
        .extract_from_text("two blanks", &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractionError::NoEventsFound { candidates: 2 }));
}

#[tokio::test]
async fn all_day_and_defaults_are_applied() {
    let provider = CannedProvider::new(
        r#"[{"title":"Holiday","startDate":"2025-07-04","startTime":"13:00","isAllDay":"true","location":"N/A"}]"#,
    );
    let events = pipeline(provider)
        .with_defaults(EventDefaults {
            calendar: "Family".into(),
            reminder_minutes: 60,
        })
        .extract_from_text("Holiday on July 4th", &ctx())
        .await
        .unwrap();

    let event = &events[0];
    assert!(event.is_all_day);
    assert_eq!(event.start_time, "00:00");
    assert_eq!(event.end_time, "00:00");
    assert_eq!(event.location, "");
    assert_eq!(event.calendar, "Family");
    assert_eq!(event.reminder, 60);
}

#[tokio::test]
async fn model_failure_is_surfaced() {
    let err = pipeline(Arc::new(FailProvider))
        .extract_from_text("Team sync", &ctx())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ExtractionError::ModelCallFailed(ModelCallError::Api { status: 503, .. })
    ));
    assert!(err.is_retryable());
}

#[tokio::test(start_paused = true)]
async fn cancellation_aborts_a_pending_call() {
    let pipeline = pipeline(Arc::new(SlowProvider));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = pipeline
        .extract(RawExtractionInput::text("Team sync"), &ctx(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractionError::Cancelled));
}

#[tokio::test]
async fn concurrent_extractions_are_independent() {
    let provider = CannedProvider::new(r#"[{"title":"Standup","startTime":"09:30"}]"#);
    let pipeline = pipeline(provider.clone());

    let (ctx_a, ctx_b) = (ctx(), ctx());
    let (a, b) = tokio::join!(
        pipeline.extract_from_text("standup", &ctx_a),
        pipeline.extract_from_text("standup again", &ctx_b),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a[0].end_time, "10:30");
    assert_eq!(b[0].end_time, "10:30");
    assert_ne!(a[0].id, b[0].id);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn fallback_recovers_events_from_prose() {
    let reply = "Here is what I found:\n- **Title:** Book Club\n- **Date:** 2025-03-20\n- **Time:** 19:00 - 21:00\n";
    let events = pipeline(CannedProvider::new(reply))
        .extract_from_text("book club", &ctx())
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].title, "Book Club");
    assert_eq!(events[0].start_time, "19:00");
    assert_eq!(events[0].end_time, "21:00");
}

#[tokio::test]
async fn prose_refusal_with_summary_line_reports_no_events() {
    for reply in [
        "I could not find any calendar events in this image.\nSummary: no events detected.",
        "Event: None",
        "Title: N/A\nDate: 2025-03-04",
    ] {
        let result = pipeline(CannedProvider::new(reply))
            .extract_from_text("something", &ctx())
            .await;
        assert!(
            matches!(result, Err(ExtractionError::NoEventsFound { .. })),
            "reply {reply:?} gave {result:?}"
        );
    }
}

#[tokio::test]
async fn untitled_placeholder_events_are_rejected() {
    let err = pipeline(CannedProvider::new(r#"[{"title":"Untitled Event"},{"title":"n/a"}]"#))
        .extract_from_text("flyer", &ctx())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractionError::NoEventsFound { candidates: 2 }));
}

#[tokio::test]
async fn wide_year_dates_are_replaced_and_export_cleanly() {
    let provider = CannedProvider::new(
        r#"[{"title":"Launch","startDate":"+262142-12-31","endDate":"+262142-12-31","isAllDay":true}]"#,
    );
    let events = pipeline(provider)
        .extract_from_text("launch", &ctx())
        .await
        .unwrap();
    assert_eq!(events[0].start_date, "2025-03-01");
    assert_eq!(events[0].end_date, "2025-03-01");

    let dir = tempfile::tempdir().unwrap();
    let outcomes = IcsFileSink::new(dir.path().join("out.ics"))
        .insert(&events)
        .await;
    assert!(outcomes.iter().all(|o| o.is_ok()));
}
