//! Application context: the explicit replacement for process-wide globals.
//! Built once in `main` and handed to the selection flow and supervisors.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;

use telegrab_core::config::Config;

use crate::runner::JobRunner;
use crate::telegram::{ChatId, Frontend};

/// Per-conversation state across the selection steps. Single-writer: the
/// frontend delivers one user's updates in order.
#[derive(Debug, Default, Clone)]
pub struct Session {
    pub pending_url: Option<String>,
}

pub struct AppContext {
    pub config: Config,
    pub frontend: Arc<dyn Frontend>,
    pub runner: JobRunner,
    pub sessions: Mutex<HashMap<ChatId, Session>>,
    /// User ids on the premium tier. Queried only, never mutated here.
    premium: HashSet<u64>,
}

impl AppContext {
    pub fn new(config: Config, frontend: Arc<dyn Frontend>) -> anyhow::Result<Self> {
        let runner = JobRunner::new(config.paths.downloads_dir.clone(), &config.limits)?;
        let premium = config.premium_users.iter().copied().collect();
        Ok(Self {
            config,
            frontend,
            runner,
            sessions: Mutex::new(HashMap::new()),
            premium,
        })
    }

    pub fn is_premium(&self, user_id: u64) -> bool {
        self.premium.contains(&user_id)
    }

    /// Store a freshly recognized URL, overwriting any previous one.
    pub async fn remember_url(&self, chat_id: ChatId, url: String) {
        let mut sessions = self.sessions.lock().await;
        sessions.entry(chat_id).or_default().pending_url = Some(url);
    }

    /// Take the pending URL out of the session (clear-on-resolve policy):
    /// a second button press on a stale menu finds nothing and the user is
    /// asked to resend the link.
    pub async fn take_url(&self, chat_id: ChatId) -> Option<String> {
        let mut sessions = self.sessions.lock().await;
        sessions.get_mut(&chat_id).and_then(|s| s.pending_url.take())
    }

    /// Peek without consuming, for menu navigation steps.
    pub async fn has_pending_url(&self, chat_id: ChatId) -> bool {
        let sessions = self.sessions.lock().await;
        sessions
            .get(&chat_id)
            .map(|s| s.pending_url.is_some())
            .unwrap_or(false)
    }
}
