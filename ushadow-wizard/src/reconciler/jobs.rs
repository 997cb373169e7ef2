// Queue jobs and conversation grouping
//
// Grouping is recomputed from the full job list on every poll. There is no per-job state
// machine: the latest snapshot wins, even when it contradicts an earlier one.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::models::responses::DashboardResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Started,
    Completed,
    Failed,
    Cancelled,
    Deferred,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Started => "started",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Deferred => "deferred",
            JobStatus::Unknown => "unknown",
        }
    }

    /// `processing` and `started` are the same disposition reported by different workers.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Processing | JobStatus::Started)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    #[serde(default)]
    pub job_type: String,
    pub status: JobStatus,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub ended_at: Option<String>,
}

impl Job {
    fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.meta_str("conversation_id")
    }

    pub fn audio_uuid(&self) -> Option<&str> {
        self.meta_str("audio_uuid")
    }

    pub fn session_id(&self) -> Option<&str> {
        self.meta_str("session_id")
            .or_else(|| self.meta_str("client_id"))
    }

    /// Session-level jobs (stream workers, session audio persistence) never join a
    /// conversation group.
    pub fn is_session_level(&self) -> bool {
        matches!(self.meta.get("session_level"), Some(Value::Bool(true)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationJobGroup {
    pub conversation_id: String,
    pub jobs: Vec<Job>,
}

impl ConversationJobGroup {
    /// Overall disposition shown for a conversation row: any failure wins, then any
    /// active job, then queued; completed only when every job completed.
    pub fn disposition(&self) -> JobStatus {
        if self.jobs.iter().any(|j| j.status == JobStatus::Failed) {
            JobStatus::Failed
        } else if self.jobs.iter().any(|j| j.status.is_active()) {
            JobStatus::Processing
        } else if self
            .jobs
            .iter()
            .any(|j| matches!(j.status, JobStatus::Queued | JobStatus::Deferred))
        {
            JobStatus::Queued
        } else if !self.jobs.is_empty()
            && self.jobs.iter().all(|j| j.status == JobStatus::Completed)
        {
            JobStatus::Completed
        } else if self.jobs.iter().any(|j| j.status == JobStatus::Cancelled) {
            JobStatus::Cancelled
        } else {
            JobStatus::Unknown
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobGrouping {
    /// Conversation groups in first-seen order.
    pub conversations: Vec<ConversationJobGroup>,
    /// Jobs flagged `session_level`, in input order.
    pub session_level: Vec<Job>,
    /// Jobs with no resolvable conversation id.
    pub ungrouped: Vec<Job>,
    /// Per-session job timelines returned for expanded sessions, sorted by session id.
    pub session_timelines: Vec<SessionTimeline>,
}

/// Jobs of one streaming session, as returned for an expanded session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTimeline {
    pub session_id: String,
    pub jobs: Vec<Job>,
}

impl JobGrouping {
    pub fn conversation(&self, conversation_id: &str) -> Option<&ConversationJobGroup> {
        self.conversations
            .iter()
            .find(|g| g.conversation_id == conversation_id)
    }

    pub fn session(&self, session_id: &str) -> Option<&SessionTimeline> {
        self.session_timelines
            .iter()
            .find(|t| t.session_id == session_id)
    }
}

/// Build the `audio_uuid -> conversation_id` bridge from every job that carries both.
pub fn build_audio_uuid_index(jobs: &[Job]) -> HashMap<String, String> {
    let mut index = HashMap::new();
    for job in jobs {
        if let (Some(audio), Some(conv)) = (job.audio_uuid(), job.conversation_id()) {
            index
                .entry(audio.to_string())
                .or_insert_with(|| conv.to_string());
        }
    }
    index
}

/// Resolve a job's conversation id: its own `conversation_id`, else the bridge via `audio_uuid`.
pub fn resolve_conversation_id<'a>(
    job: &'a Job,
    audio_index: &'a HashMap<String, String>,
) -> Option<&'a str> {
    job.conversation_id().or_else(|| {
        job.audio_uuid()
            .and_then(|audio| audio_index.get(audio).map(String::as_str))
    })
}

/// Group the full job list. A job id seen twice (e.g. listed as both processing and
/// completed in one response) is kept once, with its last occurrence winning.
pub fn group_jobs(jobs: &[Job]) -> JobGrouping {
    group_with_index(jobs, build_audio_uuid_index(jobs))
}

/// Group a dashboard response: the bucketed jobs plus the timelines of expanded
/// sessions. Session jobs also feed the `audio_uuid` bridge, so a bucketed job whose
/// conversation id only appears in a session timeline still joins its group.
pub fn group_dashboard(dashboard: &DashboardResponse) -> JobGrouping {
    let jobs = dashboard.jobs.all();
    let mut timelines: Vec<SessionTimeline> = dashboard
        .session_jobs
        .iter()
        .flatten()
        .map(|(session_id, jobs)| SessionTimeline {
            session_id: session_id.clone(),
            jobs: latest_by_id(jobs).into_iter().cloned().collect(),
        })
        .collect();
    timelines.sort_by(|a, b| a.session_id.cmp(&b.session_id));

    let mut index_source = jobs.clone();
    index_source.extend(timelines.iter().flat_map(|t| t.jobs.iter().cloned()));
    let mut grouping = group_with_index(&jobs, build_audio_uuid_index(&index_source));
    grouping.session_timelines = timelines;
    grouping
}

/// Dedupe by job id keeping first-seen position and last-seen content.
fn latest_by_id(jobs: &[Job]) -> Vec<&Job> {
    let mut latest: Vec<&Job> = Vec::new();
    let mut position: HashMap<&str, usize> = HashMap::new();
    for job in jobs {
        match position.get(job.job_id.as_str()) {
            Some(&idx) => latest[idx] = job,
            None => {
                position.insert(job.job_id.as_str(), latest.len());
                latest.push(job);
            }
        }
    }
    latest
}

fn group_with_index(jobs: &[Job], audio_index: HashMap<String, String>) -> JobGrouping {
    let latest = latest_by_id(jobs);
    let mut grouping = JobGrouping::default();
    let mut group_pos: HashMap<String, usize> = HashMap::new();

    for job in latest {
        if job.is_session_level() {
            grouping.session_level.push(job.clone());
            continue;
        }
        match resolve_conversation_id(job, &audio_index) {
            Some(conv) => {
                let idx = match group_pos.get(conv) {
                    Some(&idx) => idx,
                    None => {
                        grouping.conversations.push(ConversationJobGroup {
                            conversation_id: conv.to_string(),
                            jobs: Vec::new(),
                        });
                        let idx = grouping.conversations.len() - 1;
                        group_pos.insert(conv.to_string(), idx);
                        idx
                    }
                };
                grouping.conversations[idx].jobs.push(job.clone());
            }
            None => grouping.ungrouped.push(job.clone()),
        }
    }

    grouping
}
