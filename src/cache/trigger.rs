//! Cache trigger service.
//!
//! Entry point for write paths: refresh the changed instance and schedule
//! whatever depends on it.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::domain::PrimaryKey;

use super::consumer::CascadeWorker;
use super::error::CacheError;
use super::events::CascadeDispatcher;
use super::instance::InstanceCache;
use super::updater::{RecordState, UpdateOptions};

/// Depth assigned to dependents of a direct write.
const FIRST_CASCADE_DEPTH: u32 = 1;

/// Publishes cascades for changed instances.
///
/// # Usage
///
/// ```ignore
/// // After a successful row update:
/// trigger.instance_changed("User", &user.id.into(), RecordState::Present(user)).await?;
/// ```
pub struct CacheTrigger<R> {
    cache: Arc<InstanceCache<R>>,
    dispatcher: Arc<dyn CascadeDispatcher>,
    worker: Option<Arc<CascadeWorker<R>>>,
}

impl<R> CacheTrigger<R>
where
    R: Clone + Send + Sync + 'static,
{
    pub fn new(cache: Arc<InstanceCache<R>>, dispatcher: Arc<dyn CascadeDispatcher>) -> Self {
        Self {
            cache,
            dispatcher,
            worker: None,
        }
    }

    /// Attach a worker so [`Self::instance_changed_now`] can drain cascades inline.
    pub fn with_worker(mut self, worker: Arc<CascadeWorker<R>>) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn cache(&self) -> &Arc<InstanceCache<R>> {
        &self.cache
    }

    /// Refresh every version of an instance and schedule its dependents.
    ///
    /// Returns the number of cascade jobs scheduled.
    #[instrument(skip(self, key, state), fields(key = %key))]
    pub async fn instance_changed(
        &self,
        type_name: &str,
        key: &PrimaryKey,
        state: RecordState<R>,
    ) -> Result<usize, CacheError> {
        // A disabled cache still validates the type before reporting nothing to do.
        let targets = self
            .cache
            .update_instance(type_name, key, state, &UpdateOptions::default())
            .await?;
        if !self.cache.is_enabled() {
            debug!("Cache trigger skipped: cache disabled");
        }
        let scheduled = targets.len();
        for target in targets {
            self.dispatcher.schedule(target, FIRST_CASCADE_DEPTH);
        }
        Ok(scheduled)
    }

    /// Like [`Self::instance_changed`], then drain the cascade with the attached worker.
    pub async fn instance_changed_now(
        &self,
        type_name: &str,
        key: &PrimaryKey,
        state: RecordState<R>,
    ) -> Result<usize, CacheError> {
        let scheduled = self.instance_changed(type_name, key, state).await?;
        if let Some(worker) = &self.worker {
            worker.run_until_idle().await;
        }
        Ok(scheduled)
    }

    /// The row is gone; `last_known` feeds the invalidator.
    pub async fn instance_deleted(
        &self,
        type_name: &str,
        key: &PrimaryKey,
        last_known: R,
    ) -> Result<usize, CacheError> {
        self.instance_changed(type_name, key, RecordState::Deleted(last_known))
            .await
    }
}
