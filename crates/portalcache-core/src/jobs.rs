//! Background job submission.
//!
//! Jobs are handed to the backend queue; what a job does is up to the
//! handler registered server-side for its type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::{segment_path, ApiClient, ApiError, RequestDescriptor};

const ADD_PATH: &str = "/queue/add";
const JOBS_PATH: &str = "/queue/jobs";

/// `/queue/jobs/{id}[/{action}]`, with the id escaped as a single segment.
fn job_path(job_id: &str, action: Option<&str>) -> Result<String, ApiError> {
    let segments: Vec<&str> = std::iter::once(job_id).chain(action).collect();
    segment_path(JOBS_PATH, &segments)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOptions {
    pub priority: i32,
    /// Delay before the job becomes eligible, in milliseconds.
    pub delay: u64,
    pub max_attempts: u32,
    /// Per-run timeout in milliseconds.
    pub timeout: u64,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            delay: 0,
            max_attempts: 3,
            timeout: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Delayed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub max_attempts: u32,
    pub status: JobStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddJobRequest<'a, T: Serialize> {
    #[serde(rename = "type")]
    job_type: &'a str,
    data: &'a T,
    #[serde(flatten)]
    options: &'a JobOptions,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddJobResponse {
    job_id: String,
}

/// Client for the backend job queue.
#[derive(Clone)]
pub struct JobQueue {
    client: ApiClient,
}

impl JobQueue {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Enqueue a job and return its id.
    pub async fn submit<T: Serialize>(
        &self,
        job_type: &str,
        data: &T,
        options: &JobOptions,
    ) -> Result<String, ApiError> {
        let desc = RequestDescriptor::post(ADD_PATH).json(&AddJobRequest {
            job_type,
            data,
            options,
        })?;
        let response: AddJobResponse = self.client.fetch(&desc).await?;
        info!(job_type = job_type, job_id = %response.job_id, "Job queued");
        Ok(response.job_id)
    }

    pub async fn job(&self, job_id: &str) -> Result<Job, ApiError> {
        self.client
            .fetch(&RequestDescriptor::get(job_path(job_id, None)?))
            .await
    }

    pub async fn remove(&self, job_id: &str) -> Result<(), ApiError> {
        self.client
            .send(&RequestDescriptor::delete(job_path(job_id, None)?))
            .await
            .map(|_| ())
    }

    pub async fn retry(&self, job_id: &str) -> Result<(), ApiError> {
        self.client
            .send(&RequestDescriptor::post(job_path(job_id, Some("retry"))?))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_job_request_shape() {
        let options = JobOptions {
            priority: 5,
            ..JobOptions::default()
        };
        let body = serde_json::to_value(AddJobRequest {
            job_type: "send-email",
            data: &json!({"to": "ana@example.com"}),
            options: &options,
        })
        .unwrap();
        assert_eq!(
            body,
            json!({
                "type": "send-email",
                "data": {"to": "ana@example.com"},
                "priority": 5,
                "delay": 0,
                "maxAttempts": 3,
                "timeout": 30000
            })
        );
    }

    #[test]
    fn test_job_id_is_one_path_segment() {
        assert_eq!(job_path("job-1", None).unwrap(), "/queue/jobs/job-1");
        assert_eq!(
            job_path("../auth/logout", None).unwrap(),
            "/queue/jobs/..%2Fauth%2Flogout"
        );
        assert_eq!(
            job_path("a?b#c", Some("retry")).unwrap(),
            "/queue/jobs/a%3Fb%23c/retry"
        );
        assert!(matches!(job_path("..", None), Err(ApiError::InvalidRequest(_))));
        assert!(matches!(job_path("", Some("retry")), Err(ApiError::InvalidRequest(_))));
    }

    #[test]
    fn test_job_deserializes() {
        let job: Job = serde_json::from_value(json!({
            "id": "j1",
            "type": "report",
            "status": "delayed",
            "attempts": 1,
            "maxAttempts": 3,
            "createdAt": "2025-07-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(job.job_type, "report");
        assert_eq!(job.status, JobStatus::Delayed);
        assert!(job.created_at.is_some());
        assert!(job.error.is_none());
    }
}
