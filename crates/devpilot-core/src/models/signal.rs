use serde::{Deserialize, Serialize};

/// An ambient event that may auto-start workflows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AmbientSignal {
    FileChange {
        paths: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    GitEvent {
        event: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ScheduleTick {
        workflow_id: String,
    },
    Conversation {
        text: String,
    },
    Error {
        message: String,
    },
}

impl AmbientSignal {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FileChange { .. } => "file-change",
            Self::GitEvent { .. } => "git-event",
            Self::ScheduleTick { .. } => "schedule",
            Self::Conversation { .. } => "conversation",
            Self::Error { .. } => "error",
        }
    }
}

/// Git event observed by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GitEventContext {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// What the caller is currently doing, used to rank workflows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionContext {
    #[serde(default)]
    pub changed_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_event: Option<GitEventContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<String>,
    /// Tags describing the caller's recent activity
    #[serde(default)]
    pub recent_patterns: Vec<String>,
}

/// A ranked workflow suggestion; recomputed per request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSuggestion {
    pub workflow_id: String,
    pub workflow_name: String,
    pub category: String,
    /// In [0, 1]
    pub score: f64,
    pub reason: String,
}
