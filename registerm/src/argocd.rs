/*
 * Client side of the ArgoCD cluster API.
 *
 * An ApiManager is built for a single reconciliation: it carries the
 * identity of one workload cluster, its kubeconfig and the bearer token read
 * from the ArgoCD credential secret, and performs the register, unregister
 * and lookup calls against `{endpoint}/api/v1/clusters`.
 */

use crate::config::ArgoConfig;
use crate::errors::Error;
use crate::store::SecretStore;
use register_api as api;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use kube::config::Kubeconfig;
use reqwest::StatusCode;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/*
 * The identity a workload cluster is known by in ArgoCD.
 */
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterDescriptor {
    pub name: String,

    // `host:port` of the cluster control plane
    pub server: String,
}

impl From<&api::Cluster> for ClusterDescriptor {
    fn from(cluster: &api::Cluster) -> Self {
	Self{
	    name: cluster.metadata.name.clone().unwrap_or_default(),
	    server: cluster.server(),
	}
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClusterConfig<'a> {
    bearer_token: &'a str,
}

/*
 * Body of `POST /api/v1/clusters`. The kubeconfig goes over the wire as a
 * base64 string, the JSON encoding of a byte string.
 */
#[derive(Debug, Serialize)]
struct RegisterClusterRequest<'a> {
    server: &'a str,
    name: &'a str,
    kubeconfig: String,
    config: ClusterConfig<'a>,
}

#[derive(Debug, Default, Deserialize)]
struct ClusterList {
    #[serde(default)]
    items: Option<Vec<ClusterItem>>,
}

#[derive(Debug, Deserialize)]
struct ClusterItem {
    #[serde(default)]
    server: String,

    #[serde(default)]
    name: String,
}

pub struct ApiManager {
    pub token: String,
    pub server: String,
    pub name: String,
    pub kubeconfig: Vec<u8>,
    pub endpoint: String,

    http: reqwest::Client,
}

/*
 * Reads and decodes the bearer token stored (base64 encoded) in the ArgoCD
 * credential secret.
 */
async fn read_token(config: &ArgoConfig, secrets: &dyn SecretStore) -> Result<String, Error> {
    let secret_ref = format!("{}/{}", config.namespace, config.secret_name);

    let secret = match secrets.get_secret(&config.namespace, &config.secret_name).await? {
	Some(secret) => secret,
	None => {
	    let errmsg = format!("error fetching secret: secret {} not found", secret_ref);
	    return Err(Error::Configuration(errmsg));
	}
    };

    let encoded = match secret.data.as_ref().and_then(|data| data.get(&config.token_key)) {
	Some(encoded) => encoded,
	None => {
	    let errmsg = format!("{} not found in secret {}", config.token_key, secret_ref);
	    return Err(Error::Configuration(errmsg));
	}
    };

    let decoded = BASE64.decode(encoded.0.trim_ascii()).map_err(|err| {
	Error::Configuration(format!("{} in secret {} is not valid base64: {}", config.token_key, secret_ref, err))
    })?;

    String::from_utf8(decoded).map_err(|_| {
	Error::Configuration(format!("{} in secret {} is not valid UTF-8", config.token_key, secret_ref))
    })
}

/*
 * ArgoCD may return servers as URLs, we register them as `host:port`.
 */
fn normalize_server(server: &str) -> &str {
    let server = server.strip_prefix("https://")
	.or_else(|| server.strip_prefix("http://"))
	.unwrap_or(server);
    server.trim_end_matches('/')
}

impl ApiManager {

    pub async fn new(config: &ArgoConfig, secrets: &dyn SecretStore, cluster: ClusterDescriptor, kubeconfig: Vec<u8>) -> Result<Self, Error> {
	let token = read_token(config, secrets).await?;

	let http = reqwest::Client::builder()
	    .timeout(Duration::from_secs(config.timeout_secs))
	    .build()
	    .map_err(|err| Error::Configuration(format!("unable to build HTTP client: {}", err)))?;

	Ok(Self{
	    token: token,
	    server: cluster.server,
	    name: cluster.name,
	    kubeconfig: kubeconfig,
	    endpoint: config.endpoint.clone(),
	    http: http,
	})
    }

    /*
     * Checks the kubeconfig is structurally valid. The cluster it points at
     * is not contacted.
     */
    pub fn validate_credentials(&self) -> Result<(), Error> {
	if self.kubeconfig.is_empty() {
	    return Err(Error::Configuration(format!("kubeconfig of cluster '{}' is empty", self.name)));
	}

	let text = std::str::from_utf8(&self.kubeconfig).map_err(|_| {
	    Error::Configuration(format!("kubeconfig of cluster '{}' is not valid UTF-8", self.name))
	})?;

	let kubeconfig = Kubeconfig::from_yaml(text).map_err(|err| {
	    Error::Configuration(format!("error loading kubeconfig: {}", err))
	})?;

	if kubeconfig.clusters.is_empty() {
	    return Err(Error::Configuration(format!("kubeconfig of cluster '{}' defines no clusters", self.name)));
	}

	Ok(())
    }

    /*
     * Returns whether ArgoCD already knows a cluster with our name and server.
     */
    pub async fn is_registered(&self) -> Result<bool, Error> {
	let url = self.clusters_url(None)?;

	let resp = self.http.get(url)
	    .bearer_auth(&self.token)
	    .send().await
	    .map_err(|err| Error::Transient(format!("error listing clusters: {}", err)))?;

	if resp.status() != StatusCode::OK {
	    return Err(Error::Transient(format!("error listing clusters, status: {}", resp.status())));
	}

	let list: ClusterList = resp.json().await
	    .map_err(|err| Error::Transient(format!("error decoding cluster list: {}", err)))?;

	let server = normalize_server(&self.server);
	let found = list.items.unwrap_or_default().iter()
	    .any(|item| item.name == self.name && normalize_server(&item.server) == server);

	Ok(found)
    }

    pub async fn register(&self) -> Result<(), Error> {
	self.validate_credentials()?;

	let url = self.clusters_url(None)?;
	let payload = serde_json::to_vec(&self.register_request())?;

	let resp = self.http.post(url)
	    .header(reqwest::header::CONTENT_TYPE, "application/json")
	    .bearer_auth(&self.token)
	    .body(payload)
	    .send().await
	    .map_err(|err| Error::Transient(format!("error sending request: {}", err)))?;

	if resp.status() != StatusCode::OK {
	    return Err(Error::Transient(format!("error registering cluster, status: {}", resp.status())));
	}

	log::info!("Cluster '{}' ({}) registered with {}", self.name, self.server, self.endpoint);
	Ok(())
    }

    /*
     * Removes the cluster from ArgoCD. A cluster ArgoCD does not know about
     * counts as unregistered.
     */
    pub async fn unregister(&self) -> Result<(), Error> {
	let mut url = self.clusters_url(Some(&self.server))?;
	url.query_pairs_mut().append_pair("id.type", "url");

	let resp = self.http.delete(url)
	    .bearer_auth(&self.token)
	    .send().await
	    .map_err(|err| Error::Transient(format!("error sending request: {}", err)))?;

	match resp.status() {
	    StatusCode::OK => {
		log::info!("Cluster '{}' ({}) unregistered from {}", self.name, self.server, self.endpoint);
		Ok(())
	    },
	    StatusCode::NOT_FOUND => {
		log::info!("Cluster '{}' ({}) was not registered with {}", self.name, self.server, self.endpoint);
		Ok(())
	    },
	    status => Err(Error::Transient(format!("error unregistering cluster, status: {}", status))),
	}
    }

    fn register_request(&self) -> RegisterClusterRequest<'_> {
	RegisterClusterRequest{
	    server: &self.server,
	    name: &self.name,
	    kubeconfig: BASE64.encode(&self.kubeconfig),
	    config: ClusterConfig{
		bearer_token: &self.token,
	    },
	}
    }

    /*
     * `{endpoint}/api/v1/clusters[/{id}]`, keeping any path prefix of the
     * endpoint and percent-encoding the id.
     */
    fn clusters_url(&self, id: Option<&str>) -> Result<Url, Error> {
	let mut url = Url::parse(&self.endpoint).map_err(|err| {
	    Error::Configuration(format!("invalid ArgoCD endpoint '{}': {}", self.endpoint, err))
	})?;

	{
	    let mut segments = url.path_segments_mut().map_err(|_| {
		Error::Configuration(format!("invalid ArgoCD endpoint '{}': cannot be a base", self.endpoint))
	    })?;
	    segments.pop_if_empty().extend(&["api", "v1", "clusters"]);
	    if let Some(id) = id {
		segments.push(id);
	    }
	}

	Ok(url)
    }
}
