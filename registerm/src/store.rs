use crate::errors::Error;
use register_api as api;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret as KubeSecret;
use kube::Api as KubeApi;
use kube::Client as KubeClient;
use kube::Error as KubeError;
use kube::ResourceExt;
use kube::api::DeleteParams as KubeDeleteParams;
use kube::api::PostParams as KubePostParams;
use std::fmt;

/*
 * Namespaced identity of a Cluster and of the Register mirroring it.
 */
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {

    pub fn new(namespace: &str, name: &str) -> Self {
	Self{
	    namespace: namespace.to_string(),
	    name: name.to_string(),
	}
    }

    pub fn from_resource<K: ResourceExt>(obj: &K) -> Result<Self, Error> {
	let name = obj.name_any();
	match obj.namespace() {
	    Some(namespace) => Ok(Self{ namespace: namespace, name: name }),
	    None => Err(Error::Configuration(format!("object '{}' is not namespaced", name))),
	}
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
	write!(f, "{}/{}", self.namespace, self.name)
    }
}

/*
 * Read access to the Cluster API clusters.
 */
#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get_cluster(&self, key: &ObjectKey) -> Result<Option<api::Cluster>, Error>;
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<KubeSecret>, Error>;
}

/*
 * Full access to the Register objects owned by the manager.
 *
 * Writes are checked against the resourceVersion of the object passed in;
 * a stale object fails with Error::Conflict.
 */
#[async_trait]
pub trait RegisterStore: Send + Sync {
    async fn get_register(&self, key: &ObjectKey) -> Result<Option<api::Register>, Error>;

    async fn create_register(&self, register: &api::Register) -> Result<api::Register, Error>;

    /* replaces metadata and spec, status is left untouched */
    async fn update_register(&self, register: &api::Register) -> Result<api::Register, Error>;

    /* replaces the status subresource only */
    async fn update_register_status(&self, register: &api::Register) -> Result<api::Register, Error>;

    /*
     * Requests deletion. While finalizers are present this only sets the
     * deletion timestamp. Deleting an absent object succeeds.
     */
    async fn delete_register(&self, key: &ObjectKey) -> Result<(), Error>;
}

/*
 * Maps API server rejections onto our error taxonomy.
 */
fn from_kube(err: KubeError, what: &str) -> Error {
    match err {
	KubeError::Api(ref resp) if resp.code == 409 => Error::Conflict(format!("{}: {}", what, resp.message)),
	KubeError::Api(ref resp) if resp.code == 404 => Error::NotFound(format!("{}: {}", what, resp.message)),
	err => {
	    log::debug!("kube request '{}' failed: {:?}", what, err);
	    Error::Kube(err)
	}
    }
}

/*
 * KubeStore implements the stores on top of the kube API server.
 */
#[derive(Clone)]
pub struct KubeStore {
    kube_client: KubeClient,
}

impl KubeStore {

    pub fn new(kube_client: KubeClient) -> Self {
	Self{
	    kube_client: kube_client,
	}
    }

    fn registers(&self, namespace: &str) -> KubeApi<api::Register> {
	KubeApi::namespaced(self.kube_client.clone(), namespace)
    }

    fn register_key(register: &api::Register) -> Result<ObjectKey, Error> {
	ObjectKey::from_resource(register)
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get_cluster(&self, key: &ObjectKey) -> Result<Option<api::Cluster>, Error> {
	let clusters: KubeApi<api::Cluster> = KubeApi::namespaced(self.kube_client.clone(), &key.namespace);

	clusters.get_opt(&key.name).await.map_err(|err| from_kube(err, &format!("get Cluster {}", key)))
    }
}

#[async_trait]
impl SecretStore for KubeStore {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<KubeSecret>, Error> {
	let secrets: KubeApi<KubeSecret> = KubeApi::namespaced(self.kube_client.clone(), namespace);

	secrets.get_opt(name).await.map_err(|err| from_kube(err, &format!("get Secret {}/{}", namespace, name)))
    }
}

#[async_trait]
impl RegisterStore for KubeStore {
    async fn get_register(&self, key: &ObjectKey) -> Result<Option<api::Register>, Error> {
	self.registers(&key.namespace)
	    .get_opt(&key.name).await
	    .map_err(|err| from_kube(err, &format!("get Register {}", key)))
    }

    async fn create_register(&self, register: &api::Register) -> Result<api::Register, Error> {
	let key = Self::register_key(register)?;

	self.registers(&key.namespace)
	    .create(&KubePostParams::default(), register).await
	    .map_err(|err| from_kube(err, &format!("create Register {}", key)))
    }

    async fn update_register(&self, register: &api::Register) -> Result<api::Register, Error> {
	let key = Self::register_key(register)?;

	self.registers(&key.namespace)
	    .replace(&key.name, &KubePostParams::default(), register).await
	    .map_err(|err| from_kube(err, &format!("update Register {}", key)))
    }

    async fn update_register_status(&self, register: &api::Register) -> Result<api::Register, Error> {
	let key = Self::register_key(register)?;
	let data = serde_json::to_vec(register)?;

	self.registers(&key.namespace)
	    .replace_status(&key.name, &KubePostParams::default(), data).await
	    .map_err(|err| from_kube(err, &format!("update Register status {}", key)))
    }

    async fn delete_register(&self, key: &ObjectKey) -> Result<(), Error> {
	match self.registers(&key.namespace).delete(&key.name, &KubeDeleteParams::default()).await {
	    Ok(_) => Ok(()),
	    Err(err) => match from_kube(err, &format!("delete Register {}", key)) {
		Error::NotFound(_) => Ok(()),
		err => Err(err),
	    },
	}
    }
}
