//! Batch extraction orchestration.
//!
//! One run drives one external batch job through
//! `building → submitted → polling → {completed | failed | expired | abandoned}`:
//! select pending posts, resolve their media URLs, serialize one request
//! line per post, submit the job, poll to a terminal status, parse the
//! output, and hand candidates to the normalizer. Job-level failures abort
//! only the run — posts stay pre-terminal and the next run reclaims them.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use futures::future::join_all;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use campusbeat_common::{EventCandidate, Post, PostStatus};
use openai_batch_client::types::Batch;

use crate::normalize::normalize_candidate;
use crate::traits::{EventStore, ExtractionBackend, ImageResolver, PostStore};

/// Default delay between status polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
/// Default ceiling on total polling time before the run is abandoned.
/// Batch jobs get a 24h completion window; leave some slack past that.
const DEFAULT_POLL_DEADLINE: Duration = Duration::from_secs(26 * 60 * 60);

#[derive(Debug, Error)]
pub enum ExtractionRunError {
    #[error("Batch API error: {0}")]
    Backend(#[from] openai_batch_client::BatchError),

    #[error("Batch {batch_id} finished with status {status}")]
    BatchFailed { batch_id: String, status: String },

    /// The poll deadline elapsed before the job reached a terminal status.
    /// The job may still finish upstream; this run just stops waiting.
    #[error("Batch {batch_id} abandoned after {waited_secs}s of polling")]
    Abandoned { batch_id: String, waited_secs: u64 },

    #[error("Batch finished without an output file id")]
    MissingOutput,

    /// Fail-closed: one malformed output line invalidates the whole run.
    #[error("Batch output line {line} failed to parse: {message}")]
    MalformedOutput { line: usize, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// What one extraction run did.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunStats {
    pub posts_processed: usize,
    pub events_created: usize,
}

enum PollOutcome {
    Completed(Batch),
    Failed { status: String },
    Abandoned { waited: Duration },
}

pub struct BatchExtractor {
    resolver: Arc<dyn ImageResolver>,
    backend: Arc<dyn ExtractionBackend>,
    posts: Arc<dyn PostStore>,
    events: Arc<dyn EventStore>,
    model: String,
    poll_interval: Duration,
    poll_deadline: Duration,
}

impl BatchExtractor {
    pub fn new(
        resolver: Arc<dyn ImageResolver>,
        backend: Arc<dyn ExtractionBackend>,
        posts: Arc<dyn PostStore>,
        events: Arc<dyn EventStore>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            backend,
            posts,
            events,
            model: model.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_deadline: DEFAULT_POLL_DEADLINE,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_poll_deadline(mut self, deadline: Duration) -> Self {
        self.poll_deadline = deadline;
        self
    }

    /// Run one extraction batch over every pending post.
    pub async fn run(&self) -> Result<RunStats, ExtractionRunError> {
        let posts = self.posts.pending_extraction().await?;
        if posts.is_empty() {
            info!("No posts awaiting extraction");
            return Ok(RunStats::default());
        }

        info!(posts = posts.len(), "Building extraction batch");

        // Posts selected for this run leave `unprocessed` immediately.
        // Reclaimed `processing` posts are already there.
        for post in &posts {
            if post.status == PostStatus::Unprocessed {
                self.posts
                    .advance_status(post.id, PostStatus::Processing)
                    .await?;
            }
        }

        let payload = self.build_payload(&posts).await;

        let filename = format!("extraction-{}.jsonl", chrono::Utc::now().timestamp());
        let input_file = self.backend.upload_batch_input(&filename, payload).await?;
        let batch = self.backend.create_batch(&input_file.id).await?;
        info!(batch_id = %batch.id, input_file_id = %input_file.id, "Batch submitted");

        let completed = match self.poll(&batch.id).await? {
            PollOutcome::Completed(b) => b,
            PollOutcome::Failed { status } => {
                return Err(ExtractionRunError::BatchFailed {
                    batch_id: batch.id,
                    status,
                });
            }
            PollOutcome::Abandoned { waited } => {
                return Err(ExtractionRunError::Abandoned {
                    batch_id: batch.id,
                    waited_secs: waited.as_secs(),
                });
            }
        };

        let output_file_id = completed
            .output_file_id
            .ok_or(ExtractionRunError::MissingOutput)?;
        let raw_output = self.backend.file_content(&output_file_id).await?;
        let candidates = parse_batch_output(&raw_output)?;

        // Input file cleanup is best-effort; a leaked file upstream is not
        // worth failing an otherwise good run.
        if let Err(e) = self.backend.delete_file(&input_file.id).await {
            warn!(file_id = %input_file.id, error = %e, "Failed to delete batch input file");
        }

        let events: Vec<_> = candidates.iter().filter_map(normalize_candidate).collect();
        self.events.insert_many(&events).await?;

        // Every post in the run exits the pipeline, extracted or not.
        // Posts that produced nothing are not retried indefinitely.
        for post in &posts {
            self.posts
                .advance_status(post.id, PostStatus::Processed)
                .await?;
        }

        info!(
            posts = posts.len(),
            candidates = candidates.len(),
            events = events.len(),
            "Extraction run complete"
        );

        Ok(RunStats {
            posts_processed: posts.len(),
            events_created: events.len(),
        })
    }

    /// Resolve media URLs concurrently and serialize one request line per
    /// post. A failed resolution drops the image, never the post.
    async fn build_payload(&self, posts: &[Post]) -> Vec<u8> {
        let resolutions = join_all(posts.iter().map(|post| async {
            match self.resolver.resolve(&post.media_url).await {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(
                        post_id = %post.id,
                        media_url = %post.media_url,
                        error = %e,
                        "Media resolution failed, submitting caption only"
                    );
                    None
                }
            }
        }))
        .await;

        let lines: Vec<String> = posts
            .iter()
            .zip(&resolutions)
            .map(|(post, image_url)| request_line(&self.model, post, image_url.as_deref()).to_string())
            .collect();

        lines.join("\n").into_bytes()
    }

    async fn poll(&self, batch_id: &str) -> Result<PollOutcome, ExtractionRunError> {
        let started = tokio::time::Instant::now();

        loop {
            let batch = self.backend.get_batch(batch_id).await?;
            match batch.status.as_str() {
                "completed" => {
                    info!(batch_id, "Batch completed");
                    return Ok(PollOutcome::Completed(batch));
                }
                "failed" | "expired" => {
                    return Ok(PollOutcome::Failed {
                        status: batch.status,
                    });
                }
                status => {
                    if started.elapsed() >= self.poll_deadline {
                        return Ok(PollOutcome::Abandoned {
                            waited: started.elapsed(),
                        });
                    }
                    info!(
                        batch_id,
                        status,
                        interval_secs = self.poll_interval.as_secs(),
                        "Batch not finished, polling again"
                    );
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Request serialization
// ---------------------------------------------------------------------------

/// The structured output the model is constrained to. Field names match the
/// wire format the extraction prompt describes.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ExtractedFields {
    title: Option<String>,
    description: Option<String>,
    start_datetime: Option<String>,
    end_datetime: Option<String>,
    location: Option<String>,
    incentives: Option<String>,
}

/// One JSONL request line for the batch input file. `custom_id` carries the
/// post id so output entries can be matched back.
fn request_line(model: &str, post: &Post, image_url: Option<&str>) -> serde_json::Value {
    let caption = post.caption.as_deref().unwrap_or("");

    let mut content = vec![json!({
        "type": "input_text",
        "text": format!("Post caption: {caption}"),
    })];
    if let Some(url) = image_url {
        content.push(json!({ "type": "input_image", "image_url": url }));
    }

    json!({
        "custom_id": post.id,
        "method": "POST",
        "url": openai_batch_client::BATCH_ENDPOINT,
        "body": {
            "model": model,
            "input": [
                { "role": "system", "content": extraction_system_prompt(&post.created_on) },
                { "role": "user", "content": content },
            ],
            "text": { "format": response_format() },
        },
    })
}

/// Strict `json_schema` response format for [`ExtractedFields`].
fn response_format() -> serde_json::Value {
    json!({
        "type": "json_schema",
        "name": "event_determination",
        "strict": true,
        "schema": extracted_fields_schema(),
    })
}

/// Schema with the adjustments the Batch API requires: every property
/// listed as required and `additionalProperties: false`. Built once;
/// panics at first use if the schema fails to serialize.
static EXTRACTED_FIELDS_SCHEMA: LazyLock<serde_json::Value> = LazyLock::new(|| {
    let schema = schema_for!(ExtractedFields);
    let mut value = serde_json::to_value(schema).expect("schema serializes to JSON");

    if let serde_json::Value::Object(map) = &mut value {
        map.remove("$schema");
        map.remove("title");
        map.insert("additionalProperties".to_string(), json!(false));
        if let Some(serde_json::Value::Object(props)) = map.get("properties") {
            let keys: Vec<_> = props.keys().cloned().collect();
            map.insert("required".to_string(), json!(keys));
        }
    }

    value
});

fn extracted_fields_schema() -> serde_json::Value {
    EXTRACTED_FIELDS_SCHEMA.clone()
}

/// System instruction seeded with the post's creation timestamp, which is
/// the model's reference point for resolving relative dates ("next Friday")
/// and inferring years.
fn extraction_system_prompt(created_on: &chrono::DateTime<chrono::Utc>) -> String {
    let created = created_on.to_rfc3339();
    format!(
        r#"You are an information-extraction assistant.

The Instagram post was created on **{created}** (this is your reference date/time for resolving any relative dates or inferring years).

Your job is to analyze the Instagram post (caption + image) and decide if it's advertising a future event someone could attend (in person or online).
Treat information from captions with more weight. If the image and caption contradict each other, trust the caption, since it can be updated after posting.

- If you detect a **future** event:
  1. Resolve any relative dates ("next Friday", "tomorrow", etc.) against the creation date of {created}.
     If that yields a date that is already past, assume the **next** occurrence (e.g. "next Friday" on Monday means that week; on Friday, the following week).
  2. If an absolute date is given (e.g. "May 19th"), infer the correct year based on {created}.
  3. Output a JSON object with these fields (use null when a field is missing or irrelevant):
     - **title**: one-line event title
     - **description**: important details about the event
     - **startDatetime**: ISO 8601 (YYYY-MM-DDTHH:mm:ssZ) or null
     - **endDatetime**: ISO 8601 (YYYY-MM-DDTHH:mm:ssZ) or null
     - **location**: location string (address, "Zoom", etc.) or null
     - **incentives**: any perks offered that might pique a student's interest (free food, drinks, giveaways, exclusive benefits) as a string, or null
"#
    )
}

// ---------------------------------------------------------------------------
// Output parsing
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct OutputLine {
    custom_id: String,
    response: OutputResponse,
}

#[derive(Deserialize)]
struct OutputResponse {
    body: OutputBody,
}

#[derive(Deserialize)]
struct OutputBody {
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
struct OutputItem {
    content: Vec<OutputContent>,
}

#[derive(Deserialize)]
struct OutputContent {
    text: String,
}

/// Split the output artifact into entries and parse each as correlation key
/// plus nested structured JSON. Any malformed line fails the whole run —
/// no partial acceptance.
fn parse_batch_output(raw: &str) -> Result<Vec<EventCandidate>, ExtractionRunError> {
    let mut candidates = Vec::new();

    for (idx, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let parsed =
            parse_output_line(line).map_err(|message| ExtractionRunError::MalformedOutput {
                line: idx + 1,
                message,
            })?;
        candidates.push(parsed);
    }

    Ok(candidates)
}

fn parse_output_line(line: &str) -> Result<EventCandidate, String> {
    let entry: OutputLine = serde_json::from_str(line).map_err(|e| e.to_string())?;

    let post_id = Uuid::parse_str(&entry.custom_id)
        .map_err(|e| format!("custom_id is not a post id: {e}"))?;

    let text = entry
        .response
        .body
        .output
        .first()
        .and_then(|item| item.content.first())
        .map(|content| content.text.as_str())
        .ok_or_else(|| "entry has no output content".to_string())?;

    let fields: ExtractedFields = serde_json::from_str(text).map_err(|e| e.to_string())?;

    Ok(EventCandidate {
        post_id,
        title: fields.title,
        description: fields.description,
        start_datetime: fields.start_datetime,
        end_datetime: fields.end_datetime,
        location: fields.location,
        incentives: fields.incentives,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn post(caption: &str) -> Post {
        Post {
            id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            source_url: "https://www.instagram.com/p/abc/".to_string(),
            media_url: "https://www.instagram.com/p/abc/media".to_string(),
            caption: Some(caption.to_string()),
            created_on: Utc::now(),
            status: PostStatus::Unprocessed,
        }
    }

    #[test]
    fn request_line_carries_post_id_and_caption() {
        let p = post("Trivia night Thursday!");
        let line = request_line("gpt-4o-mini", &p, Some("https://cdn.example/img.jpg"));

        assert_eq!(line["custom_id"], p.id.to_string());
        assert_eq!(line["url"], openai_batch_client::BATCH_ENDPOINT);
        let content = line["body"]["input"][1]["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        assert!(content[0]["text"]
            .as_str()
            .unwrap()
            .contains("Trivia night Thursday!"));
        assert_eq!(content[1]["image_url"], "https://cdn.example/img.jpg");
    }

    #[test]
    fn request_line_omits_image_when_unresolved() {
        let p = post("Trivia night Thursday!");
        let line = request_line("gpt-4o-mini", &p, None);

        let content = line["body"]["input"][1]["content"].as_array().unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0]["type"], "input_text");
    }

    #[test]
    fn schema_is_strict() {
        let schema = extracted_fields_schema();
        assert_eq!(schema["additionalProperties"], false);
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 6);
        assert!(required.contains(&json!("startDatetime")));
    }

    #[test]
    fn schema_is_a_full_object_schema() {
        let schema = extracted_fields_schema();
        assert_eq!(schema["type"], "object");
        let props = schema["properties"].as_object().unwrap();
        for field in [
            "title",
            "description",
            "startDatetime",
            "endDatetime",
            "location",
            "incentives",
        ] {
            assert!(props.contains_key(field), "missing property {field}");
        }
    }

    #[test]
    fn output_parsing_matches_entries_back_by_custom_id() {
        let id = Uuid::new_v4();
        let inner = r#"{"title":"Trivia Night","description":"Come play","startDatetime":"2025-05-19T18:00:00Z","endDatetime":null,"location":"The Pub","incentives":null}"#;
        let line = json!({
            "custom_id": id.to_string(),
            "response": { "body": { "output": [ { "content": [ { "text": inner } ] } ] } },
        })
        .to_string();

        let candidates = parse_batch_output(&line).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].post_id, id);
        assert_eq!(candidates[0].title.as_deref(), Some("Trivia Night"));
        assert_eq!(candidates[0].end_datetime, None);
    }

    #[test]
    fn one_malformed_line_fails_the_whole_parse() {
        let id = Uuid::new_v4();
        let inner = r#"{"title":null,"description":null,"startDatetime":null,"endDatetime":null,"location":null,"incentives":null}"#;
        let good = json!({
            "custom_id": id.to_string(),
            "response": { "body": { "output": [ { "content": [ { "text": inner } ] } ] } },
        })
        .to_string();
        let raw = format!("{good}\nnot-json-at-all");

        let err = parse_batch_output(&raw).unwrap_err();
        assert!(matches!(
            err,
            ExtractionRunError::MalformedOutput { line: 2, .. }
        ));
    }
}
