//! 结果面板：按请求标识保存每个请求的状态

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Streaming,
    Complete,
    Errored,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Complete | RequestStatus::Errored)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "pending"),
            RequestStatus::Streaming => write!(f, "streaming"),
            RequestStatus::Complete => write!(f, "complete"),
            RequestStatus::Errored => write!(f, "errored"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestState {
    pub id: String,
    pub model: String,
    pub accumulated: String,
    pub status: RequestStatus,
}

impl RequestState {
    pub fn pending(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            accumulated: String::new(),
            status: RequestStatus::Pending,
        }
    }

    pub fn with(&self, accumulated: impl Into<String>, status: RequestStatus) -> Self {
        Self {
            id: self.id.clone(),
            model: self.model.clone(),
            accumulated: accumulated.into(),
            status,
        }
    }
}

type Observer = Arc<dyn Fn(&RequestState) + Send + Sync>;

/// Shared map from request id to its latest state.
///
/// Writers always replace a whole entry, so a reader never sees a half
/// updated row and two requests never touch the same entry.
#[derive(Clone, Default)]
pub struct ResultBoard {
    entries: Arc<RwLock<HashMap<String, RequestState>>>,
    observer: Option<Observer>,
}

impl ResultBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次条目被替换后回调
    pub fn with_observer(observer: impl Fn(&RequestState) + Send + Sync + 'static) -> Self {
        Self {
            entries: Arc::default(),
            observer: Some(Arc::new(observer)),
        }
    }

    pub fn replace(&self, state: RequestState) {
        if let Some(observer) = &self.observer {
            observer(&state);
        }
        self.entries.write().insert(state.id.clone(), state);
    }

    pub fn get(&self, id: &str) -> Option<RequestState> {
        self.entries.read().get(id).cloned()
    }

    /// 按 id 排序的快照，用于展示
    pub fn snapshot(&self) -> Vec<RequestState> {
        let mut states: Vec<_> = self.entries.read().values().cloned().collect();
        states.sort_by(|a, b| a.id.cmp(&b.id));
        states
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
