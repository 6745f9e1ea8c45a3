use crate::condition::{self, Condition, ConditionType};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube_derive::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/*
 * Finalizer held by every Register until its cluster was unregistered
 * from ArgoCD.
 */
pub const REGISTER_FINALIZER: &str = "argocd.register.workload.com/finalizer";

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(group = "argocd.workload.com", version = "v1beta1", kind = "Register", namespaced)]
#[kube(status = "RegisterStatus")]
#[kube(derive = "Default")]
pub struct RegisterSpec {

    /*
     * ArgoCD API endpoint the cluster is registered with. When empty the
     * manager's configured endpoint is used.
     */
    #[serde(rename = "argoCDEndpoint", default)]
    pub argo_cd_endpoint: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterStatus {

    // Available, Progressing and Degraded; one entry per type
    #[serde(default)]
    pub conditions: Vec<Condition>,

    // `host:port` identity last registered with ArgoCD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

impl Register {

    pub fn is_marked_for_deletion(&self) -> bool {
	self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self) -> bool {
	match &self.metadata.finalizers {
	    Some(finalizers) => finalizers.iter().any(|f| f == REGISTER_FINALIZER),
	    None => false,
	}
    }

    /*
     * Adds our finalizer, returns false when it was already there.
     */
    pub fn add_finalizer(&mut self) -> bool {
	if self.has_finalizer() {
	    return false;
	}
	self.metadata.finalizers.get_or_insert_with(Vec::new).push(REGISTER_FINALIZER.to_string());
	true
    }

    /*
     * Removes our finalizer, returns false when there was nothing to remove.
     */
    pub fn remove_finalizer(&mut self) -> bool {
	if !self.has_finalizer() {
	    return false;
	}
	if let Some(finalizers) = self.metadata.finalizers.as_mut() {
	    finalizers.retain(|f| f != REGISTER_FINALIZER);
	}
	true
    }

    pub fn conditions(&self) -> &[Condition] {
	match &self.status {
	    Some(status) => &status.conditions,
	    None => &[],
	}
    }

    pub fn condition(&self, type_: ConditionType) -> Option<&Condition> {
	condition::find_condition(self.conditions(), type_)
    }

    /*
     * Sets a condition on the status, stamping it with the current
     * generation of the object.
     */
    pub fn set_condition(&mut self, new: Condition) -> bool {
	let generation = self.metadata.generation;
	let status = self.status.get_or_insert_with(RegisterStatus::default);

	condition::set_condition(&mut status.conditions, new.with_observed_generation(generation))
    }

    pub fn registered_server(&self) -> Option<&str> {
	self.status.as_ref().and_then(|s| s.server.as_deref())
    }

    pub fn set_registered_server(&mut self, server: &str) {
	self.status.get_or_insert_with(RegisterStatus::default).server = Some(server.to_string());
    }
}

/*
 * Builds the Register mirroring a cluster: same name and namespace, owned
 * by the cluster (so it is garbage collected with it) and protected by our
 * finalizer.
 */
pub fn new(name: &str, namespace: &str, owner: OwnerReference, endpoint: &str) -> Register {
    let mut metadata = ObjectMeta::default();
    metadata.name = Some(name.to_string());
    metadata.namespace = Some(namespace.to_string());
    metadata.owner_references = Some(vec![owner]);
    metadata.finalizers = Some(vec![REGISTER_FINALIZER.to_string()]);

    Register{
	metadata: metadata,
	spec: RegisterSpec{
	    argo_cd_endpoint: endpoint.to_string(),
	},
	status: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionStatus;

    fn owner() -> OwnerReference {
	OwnerReference{
	    api_version: "cluster.x-k8s.io/v1beta1".to_string(),
	    kind: "Cluster".to_string(),
	    name: "test".to_string(),
	    uid: "8d6e4c2a".to_string(),
	    controller: Some(true),
	    block_owner_deletion: Some(true),
	}
    }

    #[test]
    fn new_register_is_owned_and_finalized() {
	let register = new("test", "tenants", owner(), "https://argocd.local");

	assert_eq!(register.metadata.name.as_deref(), Some("test"));
	assert_eq!(register.metadata.namespace.as_deref(), Some("tenants"));
	assert_eq!(register.metadata.owner_references.as_ref().unwrap()[0].uid, "8d6e4c2a");
	assert!(register.has_finalizer());
	assert_eq!(register.spec.argo_cd_endpoint, "https://argocd.local");
    }

    #[test]
    fn finalizer_add_and_remove_are_idempotent() {
	let mut register = Register::new("test", RegisterSpec::default());

	assert!(register.add_finalizer());
	assert!(!register.add_finalizer());
	assert_eq!(register.metadata.finalizers.as_ref().unwrap().len(), 1);

	assert!(register.remove_finalizer());
	assert!(!register.remove_finalizer());
	assert!(!register.has_finalizer());
    }

    #[test]
    fn remove_finalizer_keeps_foreign_finalizers() {
	let mut register = Register::new("test", RegisterSpec::default());
	register.metadata.finalizers = Some(vec!["other/finalizer".to_string(), REGISTER_FINALIZER.to_string()]);

	register.remove_finalizer();

	assert_eq!(register.metadata.finalizers, Some(vec!["other/finalizer".to_string()]));
    }

    #[test]
    fn set_condition_stamps_generation() {
	let mut register = Register::new("test", RegisterSpec::default());
	register.metadata.generation = Some(3);

	register.set_condition(Condition::new(ConditionType::Available, ConditionStatus::True, "Reconciling", "Cluster is Registered"));

	let available = register.condition(ConditionType::Available).unwrap();
	assert!(available.is_true());
	assert_eq!(available.observed_generation, Some(3));
    }

    #[test]
    fn spec_uses_argocd_endpoint_field_name() {
	let value = serde_json::to_value(RegisterSpec{ argo_cd_endpoint: "https://a".to_string() }).unwrap();

	assert_eq!(value["argoCDEndpoint"], "https://a");
    }
}
