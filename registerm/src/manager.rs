use crate::config::Config;
use crate::errors::Error;
use crate::events::KubeEventPublisher;
use crate::reconciler::{self, Context};
use crate::store::{KubeStore, ObjectKey};
use register_api as api;

use futures::StreamExt;
use kube::Api as KubeApi;
use kube::Client as KubeClient;
use kube::ResourceExt;
use kube::runtime::controller::Action as KubeAction;
use kube::runtime::controller::Controller as KubeController;
use kube::runtime::watcher::Config as KubeWatcherConfig;
use log;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const CONTROLLER_NAME: &str = "registerm";

/*
 * RegisterManager runs the reconciler for both sides of the mirror.
 *
 * Cluster events drive creation and registration. Register events are
 * needed as well: once a Cluster is deleted it leaves the controller cache
 * and is never reconciled again, so the deletion of its Register has to be
 * picked up from the Register itself.
 */
#[derive(Clone)]
pub struct RegisterManager {
    cluster_api: KubeApi<api::Cluster>,
    register_api: KubeApi<api::Register>,
    shared: Arc<Shared>,
}

/*
 * Retry delays per object: the first retry waits `base`, every further
 * consecutive failure doubles the wait up to `max`. A success forgets the
 * object.
 */
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<ObjectKey, u32>>,
}

impl Backoff {

    pub fn new(base: Duration, max: Duration) -> Self {
	Self{
	    base: base,
	    max: max,
	    failures: Mutex::new(HashMap::new()),
	}
    }

    fn failures(&self) -> std::sync::MutexGuard<'_, HashMap<ObjectKey, u32>> {
	self.failures.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /* records one more failure of `key` and returns how long to wait */
    pub fn failed(&self, key: &ObjectKey) -> Duration {
	let mut failures = self.failures();
	let count = failures.entry(key.clone()).or_insert(0);
	let exponent = (*count).min(16);
	*count = count.saturating_add(1);

	self.base.saturating_mul(1u32 << exponent).min(self.max)
    }

    pub fn succeeded(&self, key: &ObjectKey) {
	self.failures().remove(key);
    }
}

struct Shared {
    ctx: Context,
    backoff: Backoff,
}

async fn reconcile_key(key: ObjectKey, shared: Arc<Shared>) -> Result<KubeAction, Error> {
    reconciler::reconcile(&shared.ctx, &key).await?;
    shared.backoff.succeeded(&key);
    Ok(KubeAction::await_change())
}

async fn reconcile_cluster(cluster: Arc<api::Cluster>, shared: Arc<Shared>) -> Result<KubeAction, Error> {
    let key = ObjectKey::from_resource(cluster.as_ref())?;
    log::debug!("Reconciling Cluster {}", key);

    reconcile_key(key, shared).await
}

async fn reconcile_register(register: Arc<api::Register>, shared: Arc<Shared>) -> Result<KubeAction, Error> {
    let key = ObjectKey::from_resource(register.as_ref())?;
    log::debug!("Reconciling Register {}", key);

    reconcile_key(key, shared).await
}

fn error_policy<K: ResourceExt>(obj: Arc<K>, error: &Error, shared: Arc<Shared>) -> KubeAction {
    let key = ObjectKey::new(&obj.namespace().unwrap_or_default(), &obj.name_any());
    let delay = shared.backoff.failed(&key);
    log::warn!("Reconciliation of {} failed, retrying in {}s: {}", key, delay.as_secs(), error);

    KubeAction::requeue(delay)
}

impl RegisterManager {

    pub fn cluster_controller(&self) -> impl Future<Output = ()> {
	KubeController::new(self.cluster_api.clone(), KubeWatcherConfig::default())
	    .owns(self.register_api.clone(), KubeWatcherConfig::default())
	    .run(reconcile_cluster, error_policy, self.shared.clone())
	    .for_each(|reconcile| async move {
		if let Err(err) = reconcile {
		    log::error!("Failed to reconcile Cluster: {:?}", err);
		}
	    })
    }

    pub fn register_controller(&self) -> impl Future<Output = ()> {
	KubeController::new(self.register_api.clone(), KubeWatcherConfig::default())
	    .run(reconcile_register, error_policy, self.shared.clone())
	    .for_each(|reconcile| async move {
		if let Err(err) = reconcile {
		    log::error!("Failed to reconcile Register: {:?}", err);
		}
	    })
    }

    pub fn new(kube_client: KubeClient, config: Config) -> Self {
	let store = Arc::new(KubeStore::new(kube_client.clone()));
	let events = Arc::new(KubeEventPublisher::new(kube_client.clone(), CONTROLLER_NAME));
	let backoff = Backoff::new(Duration::from_secs(config.error_requeue_secs),
				   Duration::from_secs(config.max_error_requeue_secs));

	Self{
	    cluster_api: KubeApi::all(kube_client.clone()),
	    register_api: KubeApi::all(kube_client.clone()),
	    shared: Arc::new(Shared{
		ctx: Context::new(store.clone(), store.clone(), store, events, config),
		backoff: backoff,
	    }),
	}
    }
}
