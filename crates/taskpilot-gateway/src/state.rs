use std::sync::Arc;
use std::time::Duration;

use taskpilot_agents::AgentRuntime;
use taskpilot_common::{Result, UserId};
use taskpilot_config::AppConfig;
use taskpilot_db::{ChatStore, TaskStore, User, UserStore};
use taskpilot_security::TokenSigner;
use tokio::sync::Mutex;

use crate::cache::TtlCache;
use crate::session::SessionManager;

/// Shared application state handed to every handler.
pub struct AppState {
    pub config: AppConfig,
    pub users: Arc<Mutex<UserStore>>,
    pub tasks: Arc<Mutex<TaskStore>>,
    pub chats: Arc<Mutex<ChatStore>>,
    pub sessions: SessionManager,
    pub runtime: Arc<AgentRuntime>,
    pub tokens: TokenSigner,
    pub user_cache: TtlCache<String, User>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        config: AppConfig,
        users: UserStore,
        tasks: Arc<Mutex<TaskStore>>,
        chats: Arc<Mutex<ChatStore>>,
        runtime: AgentRuntime,
    ) -> Result<Self> {
        let tokens = TokenSigner::new(&config.auth.token_secret, config.auth.token_ttl_secs)?;
        let user_cache = TtlCache::new(Duration::from_secs(config.auth.user_cache_ttl_secs));

        Ok(Self {
            sessions: SessionManager::new(chats.clone()),
            users: Arc::new(Mutex::new(users)),
            tasks,
            chats,
            runtime: Arc::new(runtime),
            tokens,
            user_cache,
            config,
        })
    }

    /// Drop any cached copy of this user so the next authenticated request
    /// re-reads the store. Call this from any path that mutates a user row.
    pub fn invalidate_user(&self, user_id: &UserId) {
        self.user_cache.invalidate(&user_id.as_str().to_string());
    }
}
