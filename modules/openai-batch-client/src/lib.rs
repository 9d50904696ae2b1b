pub mod error;
pub mod types;

pub use error::{BatchError, Result};
pub use types::{Batch, FileObject};

use reqwest::multipart;
use types::DeleteResponse;

const BASE_URL: &str = "https://api.openai.com/v1";

/// Endpoint every request line in a batch input file targets.
pub const BATCH_ENDPOINT: &str = "/v1/responses";

/// Fixed completion window for batch jobs.
const COMPLETION_WINDOW: &str = "24h";

/// Client for the OpenAI Batch API: input file upload, batch creation,
/// status retrieval, and output/input file handling.
pub struct OpenAiBatchClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiBatchClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the client somewhere else. Test hook.
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Upload a JSONL payload as a batch input file.
    pub async fn upload_batch_input(&self, filename: &str, payload: Vec<u8>) -> Result<FileObject> {
        let url = format!("{}/files", self.base_url);
        let form = multipart::Form::new().text("purpose", "batch").part(
            "file",
            multipart::Part::bytes(payload)
                .file_name(filename.to_string())
                .mime_str("application/jsonl")
                .map_err(|e| BatchError::Parse(e.to_string()))?,
        );

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let file: FileObject = check(resp).await?.json().await?;
        tracing::info!(file_id = %file.id, filename, "Batch input file uploaded");
        Ok(file)
    }

    /// Create one batch job over an uploaded input file.
    pub async fn create_batch(&self, input_file_id: &str) -> Result<Batch> {
        let url = format!("{}/batches", self.base_url);
        let body = serde_json::json!({
            "input_file_id": input_file_id,
            "endpoint": BATCH_ENDPOINT,
            "completion_window": COMPLETION_WINDOW,
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let batch: Batch = check(resp).await?.json().await?;
        tracing::info!(batch_id = %batch.id, input_file_id, "Batch created");
        Ok(batch)
    }

    /// Fetch the current state of a batch job.
    pub async fn get_batch(&self, batch_id: &str) -> Result<Batch> {
        let url = format!("{}/batches/{}", self.base_url, batch_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let batch: Batch = check(resp).await?.json().await?;
        tracing::debug!(batch_id, status = %batch.status, "Fetched batch status");
        Ok(batch)
    }

    /// Download the content of a file (batch output is JSONL text).
    pub async fn file_content(&self, file_id: &str) -> Result<String> {
        let url = format!("{}/files/{}/content", self.base_url, file_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        Ok(check(resp).await?.text().await?)
    }

    /// Delete an uploaded file. Used to clean up batch input files once the
    /// output has been retrieved.
    pub async fn delete_file(&self, file_id: &str) -> Result<bool> {
        let url = format!("{}/files/{}", self.base_url, file_id);
        let resp = self
            .client
            .delete(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let deleted: DeleteResponse = check(resp).await?.json().await?;
        Ok(deleted.deleted)
    }
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(BatchError::Api {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(resp)
}
