mod argocd;
mod config;
mod errors;
mod events;
mod manager;
mod reconciler;
mod store;
#[cfg(test)]
mod testutil;

use clap::Parser;
use config::Config;
use errors::Error;
use manager::RegisterManager;

use kube::Client as KubeClient;
use log;

/*
 * registerm keeps ArgoCD in sync with the Cluster API workload clusters of
 * the management cluster:
 *
 *  1. every Cluster gets a Register object (owned by the Cluster)
 *  2. the Register drives the registration of the cluster with ArgoCD and
 *     reports the outcome through its status conditions
 *  3. when the Cluster goes away, the cluster is unregistered before the
 *     Register is released
 */
#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let config = Config::parse();
    log::info!("starting registerm, ArgoCD endpoint: {}", config.argocd.endpoint);

    let kube_client = KubeClient::try_default().await?;
    let mgr = RegisterManager::new(kube_client, config);
    tokio::select! {
	_ = mgr.cluster_controller() => {},
	_ = mgr.register_controller() => {},

	// handle CTRL^C as gracefully as we can.
	_ = tokio::signal::ctrl_c() => {},
    }
    Ok(())
}
