use crate::{
    models::{ApiError, ExtractRequest, ExtractionResponse},
    pipeline::Pipeline,
    security::AuthContext,
};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
    time::{Duration, Instant},
};
use tracing::{info, warn};
use uuid::Uuid;

type Statuses = Arc<Mutex<HashMap<Uuid, JobEntry>>>;

#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
    statuses: Statuses,
    retention: Duration,
}

/// Terminal jobs are kept for `retention` after they finish, then swept on
/// the next status write.
struct JobEntry {
    state: JobState,
    finished_at: Option<Instant>,
}

async fn store(statuses: &Statuses, retention: Duration, id: Uuid, state: JobState) {
    let finished_at = match state {
        JobState::Completed { .. } | JobState::Failed { .. } => Some(Instant::now()),
        JobState::Queued | JobState::Running => None,
    };
    let mut guard = statuses.lock().await;
    guard.retain(|_, entry| entry.finished_at.is_none_or(|at| at.elapsed() < retention));
    guard.insert(id, JobEntry { state, finished_at });
}

struct Job {
    id: Uuid,
    request: ExtractRequest,
    context: AuthContext,
}

#[derive(Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed { result: Box<ExtractionResponse> },
    Failed { error: String, stage: Option<String> },
}

#[derive(Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    #[serde(flatten)]
    pub state: JobState,
}

impl JobQueue {
    /// Start the single extraction worker. Jobs run one at a time so the
    /// shared caches and limiter see requests in submission order.
    pub fn spawn(pipeline: Pipeline) -> (Self, JoinHandle<()>) {
        Self::spawn_with_retention(pipeline, retention_from_env())
    }

    pub fn spawn_with_retention(pipeline: Pipeline, retention: Duration) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Job>(queue_capacity_from_env());
        let statuses: Statuses = Arc::new(Mutex::new(HashMap::new()));
        let statuses_bg = statuses.clone();

        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                store(&statuses_bg, retention, job.id, JobState::Running).await;
                info!(target = "sellerscope.jobs", job_id = %job.id, org_id = %job.context.org_id, "job_started");

                let state = match pipeline.run_request(job.request).await {
                    Ok(resp) => JobState::Completed {
                        result: Box::new(resp),
                    },
                    Err(err) => {
                        warn!(target = "sellerscope.jobs", job_id = %job.id, stage = err.stage(), error = %err, "job_failed");
                        JobState::Failed {
                            error: err.detail().to_string(),
                            stage: Some(err.stage().to_string()),
                        }
                    }
                };
                store(&statuses_bg, retention, job.id, state).await;
            }
        });

        (
            Self {
                tx,
                statuses,
                retention,
            },
            handle,
        )
    }

    pub async fn enqueue_extraction(
        &self,
        request: ExtractRequest,
        context: AuthContext,
    ) -> Result<Uuid, ApiError> {
        let id = Uuid::new_v4();
        store(&self.statuses, self.retention, id, JobState::Queued).await;
        let job = Job {
            id,
            request,
            context,
        };
        if self.tx.send(job).await.is_err() {
            self.statuses.lock().await.remove(&id);
            return Err(ApiError {
                error: "queue_send_failed".into(),
                detail: Some("worker not available".into()),
            });
        }
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Option<JobInfo> {
        let guard = self.statuses.lock().await;
        guard.get(&id).map(|entry| JobInfo {
            id: id.to_string(),
            state: entry.state.clone(),
        })
    }
}

fn queue_capacity_from_env() -> usize {
    std::env::var("QUEUE_CAPACITY")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(64)
}

fn retention_from_env() -> Duration {
    let secs = std::env::var("JOB_RETENTION_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(3600);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractorConfig;
    use crate::product::acquire::fixtures::page_with;
    use serde_json::json;
    use tokio::time::{Duration, sleep};

    fn context() -> AuthContext {
        AuthContext {
            org_id: "org-1".into(),
            api_key_id: "key-01".into(),
        }
    }

    async fn wait_for_terminal(queue: &JobQueue, id: Uuid) -> JobState {
        for _ in 0..200 {
            if let Some(info) = queue.get(id).await
                && matches!(info.state, JobState::Completed { .. } | JobState::Failed { .. })
            {
                return info.state;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("job {id} never finished");
    }

    #[tokio::test]
    async fn queued_extraction_completes() {
        let (queue, _worker) = JobQueue::spawn(Pipeline::new(ExtractorConfig::default(), None, None));
        let html = page_with(json!({ "product": { "usItemId": "31", "name": "Kettle", "additionalOfferCount": 0 } }));
        let id = queue
            .enqueue_extraction(
                ExtractRequest {
                    html: Some(html),
                    url: None,
                },
                context(),
            )
            .await
            .expect("enqueue");

        match wait_for_terminal(&queue, id).await {
            JobState::Completed { result } => {
                let record = result.record.expect("record");
                assert_eq!(record.product.name, "Kettle");
            }
            _ => panic!("expected completion"),
        }
    }

    #[tokio::test]
    async fn invalid_request_fails_with_stage() {
        let (queue, _worker) = JobQueue::spawn(Pipeline::new(ExtractorConfig::default(), None, None));
        let id = queue
            .enqueue_extraction(
                ExtractRequest {
                    html: None,
                    url: None,
                },
                context(),
            )
            .await
            .expect("enqueue");

        match wait_for_terminal(&queue, id).await {
            JobState::Failed { stage, .. } => assert_eq!(stage.as_deref(), Some("open_page")),
            _ => panic!("expected failure"),
        }
        assert!(queue.get(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn finished_jobs_are_swept_after_retention() {
        let (queue, _worker) = JobQueue::spawn_with_retention(
            Pipeline::new(ExtractorConfig::default(), None, None),
            Duration::from_secs(10),
        );
        let missing = || ExtractRequest {
            html: None,
            url: None,
        };
        let first = queue.enqueue_extraction(missing(), context()).await.expect("enqueue");
        wait_for_terminal(&queue, first).await;

        tokio::time::advance(Duration::from_secs(11)).await;
        let second = queue.enqueue_extraction(missing(), context()).await.expect("enqueue");
        assert!(queue.get(first).await.is_none());
        assert!(queue.get(second).await.is_some());
    }
}
