use kube_derive::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/*
 * Only the subset of the Cluster API `Cluster` that the register manager
 * reads. Unknown fields are ignored on deserialization, so this type can be
 * used against the full upstream CRD.
 */
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(group = "cluster.x-k8s.io", version = "v1beta1", kind = "Cluster", namespaced)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {

    // where the workload cluster's kube-apiserver can be reached
    #[serde(default)]
    pub control_plane_endpoint: ApiEndpoint,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ApiEndpoint {

    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub port: i32,
}

impl ApiEndpoint {

    /*
     * Returns the endpoint as `host:port`, the server identity used when
     * talking to ArgoCD.
     */
    pub fn server(&self) -> String {
	format!("{}:{}", self.host, self.port)
    }
}

impl Cluster {

    pub fn server(&self) -> String {
	self.spec.control_plane_endpoint.server()
    }
}
