//! InstaFram client
//!
//! Data layer of the InstaFram app: a typed REST client, a shared query
//! cache fed by route loaders, optimistic mutations and the session.
//!
//! ```text
//! Route ──> Loader ──> Queries ──> QueryCache <── Mutations
//!                         │                           │
//!                         └────────> Api <────────────┘
//!                                    │
//!                                Transport (reqwest)
//! ```

pub mod api;
pub mod config;
pub mod forms;
pub mod loaders;
pub mod mutations;
pub mod queries;
pub mod scroll;
pub mod session;
pub mod threads;
pub mod transport;

pub use api::{Api, PostFilter};
pub use config::{ClientConfig, ConfigError};
pub use forms::{
    CommentForm, FieldErrors, Notice, PostForm, ProfileForm, SignInForm, SignUpForm,
};
pub use loaders::{Loader, Route};
pub use mutations::{MutationHandle, Mutations};
pub use queries::Queries;
pub use scroll::{ScrollTrigger, Viewport};
pub use session::{FileTokenStore, MemoryTokenStore, Session, TokenStore};
pub use threads::ReplyThread;
pub use transport::{HttpTransport, Transport};

use instafram_common::{ApiError, AuthPayload, Post, User};
use query_cache::{Keys, QueryCache};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a front-end needs, wired over one cache and one session
#[derive(Clone)]
pub struct InstaFram {
    session: Arc<Session>,
    cache: QueryCache,
    api: Api,
    mutations: Mutations,
    queries: Queries,
    loader: Loader,
}

impl InstaFram {
    /// HTTP client with the session restored from the configured token file
    pub async fn connect(config: &ClientConfig) -> Result<Self, ApiError> {
        let store: Arc<dyn TokenStore> = match &config.token_path {
            Some(path) => Arc::new(FileTokenStore::new(path)),
            None => Arc::new(MemoryTokenStore::default()),
        };
        let session = Arc::new(Session::new(store));
        if session.restore().await? {
            info!(user_id = ?session.user_id(), "Resuming session");
        }

        let transport = Arc::new(HttpTransport::new(config, session.clone())?);
        Ok(Self::with_transport(config, transport, session))
    }

    pub fn with_transport(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        session: Arc<Session>,
    ) -> Self {
        let cache = QueryCache::with_config(config.cache_config());
        let api = Api::new(transport);
        let queries = Queries::new(api.clone(), cache.clone());

        Self {
            mutations: Mutations::new(api.clone(), cache.clone(), session.clone()),
            loader: Loader::new(queries.clone(), session.clone()),
            queries,
            session,
            cache,
            api,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn api(&self) -> &Api {
        &self.api
    }

    pub fn mutations(&self) -> &Mutations {
        &self.mutations
    }

    pub fn queries(&self) -> &Queries {
        &self.queries
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    pub async fn load(&self, route: &Route) -> Result<(), ApiError> {
        self.loader.load(route).await
    }

    // ===== Session =====

    pub async fn login(&self, form: &SignInForm) -> Result<User, ApiError> {
        let payload = self.api.auth().login(form).await?;
        self.start_session(payload).await
    }

    pub async fn register(&self, form: &SignUpForm) -> Result<User, ApiError> {
        let payload = self.api.auth().register(form).await?;
        self.start_session(payload).await
    }

    async fn start_session(&self, payload: AuthPayload) -> Result<User, ApiError> {
        let AuthPayload { user, tokens } = payload;
        // Another account's cached views must not leak into this one
        self.cache.clear();
        self.session.sign_in(&user.id, tokens).await?;
        self.cache.set(&Keys::current_user(), &user)?;
        self.cache.set(&Keys::user(&user.id), &user)?;
        Ok(user)
    }

    /// Sign out locally even when the server call fails
    pub async fn logout(&self) -> Result<(), ApiError> {
        if let Err(e) = self.api.auth().logout().await {
            warn!(error = %e, "Server logout failed, clearing local session anyway");
        }
        self.session.sign_out().await?;
        self.cache.clear();
        Ok(())
    }

    pub async fn me(&self) -> Result<User, ApiError> {
        self.session.require_user()?;
        self.queries.current_user().load().await
    }

    // ===== Post and profile editing =====

    pub async fn create_post(&self, form: &PostForm) -> Result<Post, ApiError> {
        let user_id = self.session.require_user()?;
        let post = self.api.posts().create(form).await?;
        self.cache.invalidate(&Keys::post_lists());
        self.cache.invalidate(&Keys::user(&user_id));
        Ok(post)
    }

    pub async fn update_post(&self, post_id: &str, form: &PostForm) -> Result<Post, ApiError> {
        self.session.require_user()?;
        let post = self.api.posts().update(post_id, form).await?;
        self.cache.set(&Keys::post(post_id), &post)?;
        self.cache.invalidate(&Keys::post_lists());
        Ok(post)
    }

    pub async fn delete_post(&self, post_id: &str) -> Result<(), ApiError> {
        let user_id = self.session.require_user()?;
        self.api.posts().delete(post_id).await?;
        self.cache.remove(&Keys::post(post_id));
        self.cache.remove(&Keys::comments(post_id));
        self.cache.invalidate(&Keys::post_lists());
        self.cache.invalidate(&Keys::user(&user_id));
        Ok(())
    }

    pub async fn update_profile(&self, form: &ProfileForm) -> Result<User, ApiError> {
        let user_id = self.session.require_user()?;
        let user = self.api.users().update(form).await?;
        self.cache.set(&Keys::user(&user_id), &user)?;
        self.cache.set(&Keys::current_user(), &user)?;
        self.cache.invalidate(&Keys::top_creators());
        Ok(user)
    }
}
