//! Host-owned state: the cached API key and a bounded history of recent
//! requests. The pipeline never holds either; callers pass them in.

use crate::{
    credential::Credential,
    error::{PipelineError, Result},
    models::GenerationResult,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub service: String,
    pub prompt: String,
    pub parameters: String,
    pub outcome: String,
    pub success: bool,
}

/// Most-recent-N log of dispatched requests; the oldest entry is evicted
/// once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct RequestHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl Default for RequestHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl RequestHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(
        &mut self,
        service: &str,
        prompt: &str,
        parameters: &str,
        result: &GenerationResult,
    ) -> &HistoryEntry {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            service: service.to_string(),
            prompt: prompt.to_string(),
            parameters: parameters.to_string(),
            outcome: result.summary(),
            success: result.is_success(),
        });
        &self.entries[self.entries.len() - 1]
    }

    /// Newest first.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().rev()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    credential: Option<Credential>,
    pub history: RequestHistory,
}

impl SessionState {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            credential: None,
            history: RequestHistory::new(history_capacity),
        }
    }

    pub fn set_credential(&mut self, credential: Credential) {
        self.credential = Some(credential);
    }

    pub fn clear_credential(&mut self) {
        self.credential = None;
    }

    pub fn credential(&self) -> Result<&Credential> {
        match &self.credential {
            Some(credential) if !credential.is_empty() => Ok(credential),
            _ => Err(PipelineError::ConfigError(
                "API key not provided; set it before generating".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn ok_result() -> GenerationResult {
        GenerationResult::MediaReference {
            url: "https://cdn.example.com/v.mp4".into(),
            endpoint: "e".into(),
        }
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut history = RequestHistory::new(2);
        history.record("kling", "first", "pro 5s", &ok_result());
        history.record("kling", "second", "pro 5s", &ok_result());
        history.record(
            "kling",
            "third",
            "pro 5s",
            &GenerationResult::failure(ErrorKind::ServerError, "down"),
        );

        let prompts: Vec<&str> = history.entries().map(|e| e.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["third", "second"]);
        assert!(!history.latest().unwrap().success);

        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.capacity(), 2);
    }

    #[test]
    fn test_session_requires_credential() {
        let mut session = SessionState::new(5);
        assert!(session.credential().is_err());

        session.set_credential(Credential::header("x-api-key", "k"));
        assert!(session.credential().is_ok());

        session.clear_credential();
        assert!(matches!(session.credential(), Err(PipelineError::ConfigError(_))));
    }
}
