/*
 * The reconciliation state machine mirroring Cluster API clusters into
 * Register objects and ArgoCD registrations.
 *
 * The state is never stored; each run derives it from what it observes:
 *
 *   cluster  register  marked  finalizer  ->  action
 *   yes      no        -       -              create Register, then register
 *   no       yes       no      -              request Register deletion, then finalize
 *   yes      yes       no      -              register with ArgoCD
 *   any      yes       yes     yes            unregister, drop finalizer
 *   any      yes       yes     no             nothing left to do
 *   no       no        -       -              nothing left to do
 *
 * Every write re-fetches the Register first; a concurrent change surfaces
 * as Error::Conflict and the whole run is retried by the caller.
 */

use crate::argocd::{ApiManager, ClusterDescriptor};
use crate::config::{ArgoConfig, Config};
use crate::errors::Error;
use crate::events::{self, EventPublisher};
use crate::store::{ClusterStore, ObjectKey, RegisterStore, SecretStore};
use register_api as api;
use register_api::{Condition, ConditionStatus, ConditionType};

use kube::Resource;
use kube::runtime::events::EventType;
use std::sync::Arc;

const REASON_CREATING: &str = "Creating Register";
const REASON_ERROR: &str = "Error";
const REASON_FINALIZING: &str = "Finalizing";
const REASON_RECONCILING: &str = "Reconciling";
const REASON_REGISTERED: &str = "Registered";

/*
 * Everything a reconciliation needs, handed over explicitly.
 */
#[derive(Clone)]
pub struct Context {
    pub clusters: Arc<dyn ClusterStore>,
    pub secrets: Arc<dyn SecretStore>,
    pub registers: Arc<dyn RegisterStore>,
    pub events: Arc<dyn EventPublisher>,
    pub config: Config,
}

impl Context {

    pub fn new(clusters: Arc<dyn ClusterStore>, secrets: Arc<dyn SecretStore>, registers: Arc<dyn RegisterStore>,
	       events: Arc<dyn EventPublisher>, config: Config) -> Self {
	Self{
	    clusters: clusters,
	    secrets: secrets,
	    registers: registers,
	    events: events,
	    config: config,
	}
    }

    /*
     * ArgoCD settings for a Register: its own endpoint wins over the
     * configured one.
     */
    fn argocd_for(&self, register: &api::Register) -> ArgoConfig {
	self.config.argocd.with_endpoint(&register.spec.argo_cd_endpoint)
    }
}

/*
 * Drives the Register of `key` one step towards the state of its Cluster.
 */
pub async fn reconcile(ctx: &Context, key: &ObjectKey) -> Result<(), Error> {
    let cluster = ctx.clusters.get_cluster(key).await?;
    let register = ctx.registers.get_register(key).await?;

    let register = match (&cluster, register) {
	(None, None) => {
	    log::info!("Register {} not found. Ignoring since object must be deleted", key);
	    return Ok(());
	},
	(Some(cluster), None) => create_register(ctx, key, cluster).await?,
	(_, Some(register)) => register,
    };

    let register = if cluster.is_none() && !register.is_marked_for_deletion() {
	log::info!("Cluster {} is gone, marking its Register for deletion", key);
	ctx.registers.delete_register(key).await?;

	match ctx.registers.get_register(key).await? {
	    Some(register) => register,
	    None => {
		log::info!("Register {} deleted", key);
		return Ok(());
	    }
	}
    } else {
	register
    };

    if register.is_marked_for_deletion() {
	return finalize(ctx, key, cluster.as_ref(), &register).await;
    }

    match &cluster {
	Some(cluster) => ensure_registered(ctx, key, cluster, &register).await,
	None => Ok(()),
    }
}

async fn fetch_register(ctx: &Context, key: &ObjectKey) -> Result<api::Register, Error> {
    match ctx.registers.get_register(key).await? {
	Some(register) => Ok(register),
	None => Err(Error::NotFound(format!("Register {}", key))),
    }
}

/*
 * Re-fetches the Register and writes `conditions` on its status.
 */
async fn set_conditions(ctx: &Context, key: &ObjectKey, conditions: Vec<Condition>) -> Result<api::Register, Error> {
    let mut register = fetch_register(ctx, key).await?;
    for condition in conditions {
	register.set_condition(condition);
    }
    ctx.registers.update_register_status(&register).await
}

/*
 * Reports `cause` through the Degraded condition and hands it back so the
 * caller can return it. Failing to write the status is only logged: the
 * run fails anyway and will be retried.
 */
async fn degrade(ctx: &Context, key: &ObjectKey, status: ConditionStatus, reason: &str, message: String, cause: Error) -> Error {
    let condition = Condition::new(ConditionType::Degraded, status, reason, &message);
    report(ctx, key, vec![condition], &message, cause).await
}

/*
 * Like degrade, for a registration that could not be confirmed: Available
 * is withdrawn in the same status write.
 */
async fn degrade_unavailable(ctx: &Context, key: &ObjectKey, message: String, cause: Error) -> Error {
    let conditions = vec![
	Condition::new(ConditionType::Degraded, ConditionStatus::True, REASON_ERROR, &message),
	Condition::new(ConditionType::Available, ConditionStatus::False, REASON_ERROR, &message),
    ];
    report(ctx, key, conditions, &message, cause).await
}

async fn report(ctx: &Context, key: &ObjectKey, conditions: Vec<Condition>, message: &str, cause: Error) -> Error {
    log::error!("Register {}: {}", key, message);

    if let Err(err) = set_conditions(ctx, key, conditions).await {
	log::error!("Failed to update Register {} status: {}", key, err);
    }
    cause
}

async fn create_register(ctx: &Context, key: &ObjectKey, cluster: &api::Cluster) -> Result<api::Register, Error> {
    let owner = match cluster.controller_owner_ref(&()) {
	Some(owner) => owner,
	None => {
	    let errmsg = format!("Cluster {} has no uid, unable to own a Register", key);
	    return Err(Error::Configuration(errmsg));
	}
    };

    let new = api::register::new(&key.name, &key.namespace, owner, &ctx.config.argocd.endpoint);
    ctx.registers.create_register(&new).await.map_err(|err| {
	log::error!("Failed to create Register {}: {}", key, err);
	err
    })?;
    log::info!("Register {} created", key);

    let progressing = Condition::new(ConditionType::Progressing, ConditionStatus::True,
				     REASON_CREATING, "Preparing to Register Cluster with ArgoCD");
    set_conditions(ctx, key, vec![progressing]).await
}

/*
 * Reads the kubeconfig of the workload cluster from its secret.
 */
async fn read_kubeconfig(ctx: &Context, key: &ObjectKey) -> Result<Vec<u8>, Error> {
    let settings = &ctx.config.kubeconfig;
    let name = settings.secret_name(&key.name);

    let secret = match ctx.secrets.get_secret(&key.namespace, &name).await? {
	Some(secret) => secret,
	None => {
	    let errmsg = format!("kubeconfig secret {}/{} not found", key.namespace, name);
	    return Err(Error::Configuration(errmsg));
	}
    };

    match secret.data.and_then(|mut data| data.remove(&settings.key)) {
	Some(kubeconfig) => Ok(kubeconfig.0),
	None => {
	    let errmsg = format!("{} not found in secret {}/{}", settings.key, key.namespace, name);
	    Err(Error::Configuration(errmsg))
	}
    }
}

/*
 * Active state: make sure ArgoCD knows the cluster and report it Available.
 */
async fn ensure_registered(ctx: &Context, key: &ObjectKey, cluster: &api::Cluster, register: &api::Register) -> Result<(), Error> {
    if !register.has_finalizer() {
	let mut register = fetch_register(ctx, key).await?;
	register.add_finalizer();
	ctx.registers.update_register(&register).await?;
	log::debug!("Added finalizer to Register {}", key);
    }

    let kubeconfig = match read_kubeconfig(ctx, key).await {
	Ok(kubeconfig) => kubeconfig,
	Err(err) => {
	    let message = format!("Unable to gathering kubeConfig: {}", err);
	    return Err(degrade(ctx, key, ConditionStatus::True, REASON_ERROR, message, err).await);
	}
    };

    let argocd = ctx.argocd_for(register);
    let manager = match ApiManager::new(&argocd, ctx.secrets.as_ref(), ClusterDescriptor::from(cluster), kubeconfig).await {
	Ok(manager) => manager,
	Err(err) => {
	    let message = format!("Unable to gathering pre-requirements to connect with ArgoCD: {}", err);
	    return Err(degrade(ctx, key, ConditionStatus::True, REASON_ERROR, message, err).await);
	}
    };

    let registered = match manager.is_registered().await {
	Ok(registered) => registered,
	Err(err) => {
	    let message = format!("Unable to verify Cluster Registration: {}", err);
	    return Err(degrade_unavailable(ctx, key, message, err).await);
	}
    };

    if registered {
	log::debug!("Cluster {} ({}) already registered with {}", key, manager.server, manager.endpoint);
    } else if let Err(err) = manager.register().await {
	let message = format!("Unable to register Cluster into ArgoCD: {}", err);
	return Err(degrade_unavailable(ctx, key, message, err).await);
    }

    let mut register = fetch_register(ctx, key).await?;
    register.set_condition(Condition::new(ConditionType::Available, ConditionStatus::True,
					  REASON_RECONCILING, "Cluster is Registered"));
    register.set_condition(Condition::new(ConditionType::Progressing, ConditionStatus::False,
					  REASON_REGISTERED, "Cluster registration completed"));
    if register.condition(ConditionType::Degraded).is_some() {
	register.set_condition(Condition::new(ConditionType::Degraded, ConditionStatus::False,
					      REASON_RECONCILING, "Cluster is Registered"));
    }
    register.set_registered_server(&manager.server);
    ctx.registers.update_register_status(&register).await?;

    Ok(())
}

/*
 * Finalizing state: undo the ArgoCD registration, then release the
 * Register by dropping our finalizer.
 */
async fn finalize(ctx: &Context, key: &ObjectKey, cluster: Option<&api::Cluster>, register: &api::Register) -> Result<(), Error> {
    if !register.has_finalizer() {
	log::debug!("Register {} has no finalizer left, nothing to do", key);
	return Ok(());
    }

    log::info!("Performing Finalizer Operations for Register {} before delete CR", key);
    let finalizing = Condition::new(ConditionType::Degraded, ConditionStatus::True,
				    REASON_FINALIZING, "Performing finalizer operations to delete Register");
    let register = set_conditions(ctx, key, vec![finalizing]).await?;

    if let Err(err) = unregister(ctx, key, cluster, &register).await {
	let message = format!("Error to perform required operations: {}", err);
	return Err(degrade(ctx, key, ConditionStatus::Unknown, REASON_FINALIZING, message, err).await);
    }

    let note = format!("Register CR {} from the namespace {} will be deleted.", key.name, key.namespace);
    ctx.events.publish(&register.object_ref(&()), EventType::Warning, events::REASON_DELETING,
		       events::ACTION_FINALIZE, Some(note)).await;

    let unregistered = Condition::new(ConditionType::Degraded, ConditionStatus::True,
				      REASON_FINALIZING, "Cluster unregistered successfully");
    set_conditions(ctx, key, vec![unregistered]).await?;

    log::info!("Removing Finalizer for Register {} after successfully perform the operations", key);
    let mut register = fetch_register(ctx, key).await?;
    if register.remove_finalizer() {
	ctx.registers.update_register(&register).await?;
    }
    Ok(())
}

/*
 * Unregisters the cluster, identified by the server recorded at
 * registration time or, failing that, by its Cluster when still around.
 * Nothing recorded and no Cluster means nothing was ever registered.
 */
async fn unregister(ctx: &Context, key: &ObjectKey, cluster: Option<&api::Cluster>, register: &api::Register) -> Result<(), Error> {
    let server = match (register.registered_server(), cluster) {
	(Some(server), _) => server.to_string(),
	(None, Some(cluster)) => cluster.server(),
	(None, None) => {
	    log::info!("Register {} was never registered with ArgoCD, nothing to unregister", key);
	    return Ok(());
	}
    };

    let descriptor = ClusterDescriptor{
	name: key.name.clone(),
	server: server,
    };
    let manager = ApiManager::new(&ctx.argocd_for(register), ctx.secrets.as_ref(), descriptor, Vec::new()).await?;
    manager.unregister().await
}
