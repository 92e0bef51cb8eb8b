use serde::{Deserialize, Serialize};

// Input: What the user sends us
// `question` is optional here so a missing field maps to our own 400 instead
// of a serde rejection.
#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: Option<String>,
}

// Output: What we send back
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
