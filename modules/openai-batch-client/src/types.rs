use serde::Deserialize;

/// An uploaded file, as returned by `/v1/files`.
#[derive(Debug, Clone, Deserialize)]
pub struct FileObject {
    pub id: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub bytes: Option<i64>,
}

/// A batch job. `status` is the raw upstream string; the terminal values the
/// pipeline cares about are `completed`, `failed`, and `expired`.
#[derive(Debug, Clone, Deserialize)]
pub struct Batch {
    pub id: String,
    pub status: String,
    pub input_file_id: String,
    #[serde(default)]
    pub output_file_id: Option<String>,
    #[serde(default)]
    pub error_file_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DeleteResponse {
    pub deleted: bool,
}
