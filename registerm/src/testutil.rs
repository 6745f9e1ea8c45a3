/*
 * Test fixtures: an in-memory object store behaving like the API server
 * for the few operations the reconciler uses, an event recorder, and
 * builders for clusters and secrets.
 */

use crate::errors::Error;
use crate::events::EventPublisher;
use crate::store::{ClusterStore, ObjectKey, RegisterStore, SecretStore};
use register_api as api;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::api::core::v1::Secret as KubeSecret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::ObjectMeta;
use kube::runtime::events::EventType;
use std::collections::BTreeMap;
use std::sync::Mutex;

pub const MOCK_KUBECONFIG: &str = r#"
apiVersion: v1
clusters:
- cluster:
    certificate-authority-data: bW9ja3M=
    server: https://your-cluster-server-here
  name: Test
contexts:
- context:
    cluster: Test
    user: mocks
  name: your-context
current-context: your-context
kind: Config
preferences: {}
users:
- name: mocks
  user:
    client-certificate-data: bW9ja3M=
    client-key-data: bW9ja3M=
"#;

#[derive(Default)]
struct Objects {
    clusters: BTreeMap<ObjectKey, api::Cluster>,
    secrets: BTreeMap<ObjectKey, KubeSecret>,
    registers: BTreeMap<ObjectKey, api::Register>,
    version: u64,
}

impl Objects {

    fn next_version(&mut self) -> String {
	self.version += 1;
	self.version.to_string()
    }
}

/*
 * Registers follow API server semantics: resourceVersion checks on every
 * write, status only written through the status call, deletion deferred
 * while finalizers remain and completed once the last one is removed.
 */
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<Objects>,
}

fn key_of(meta: &ObjectMeta) -> ObjectKey {
    ObjectKey::new(
	meta.namespace.as_deref().unwrap_or_default(),
	meta.name.as_deref().unwrap_or_default(),
    )
}

fn check_version(stored: &api::Register, update: &api::Register, key: &ObjectKey) -> Result<(), Error> {
    if stored.metadata.resource_version != update.metadata.resource_version {
	return Err(Error::Conflict(format!("Register {} has been modified", key)));
    }
    Ok(())
}

impl MemoryStore {

    pub fn new() -> Self {
	Self::default()
    }

    pub fn add_cluster(&self, cluster: api::Cluster) {
	let key = key_of(&cluster.metadata);
	self.objects.lock().unwrap().clusters.insert(key, cluster);
    }

    pub fn remove_cluster(&self, key: &ObjectKey) {
	self.objects.lock().unwrap().clusters.remove(key);
    }

    pub fn add_secret(&self, secret: KubeSecret) {
	let key = key_of(&secret.metadata);
	self.objects.lock().unwrap().secrets.insert(key, secret);
    }

    /* stores a Register as is, bypassing create semantics */
    pub fn put_register(&self, mut register: api::Register) {
	let mut objects = self.objects.lock().unwrap();
	register.metadata.resource_version = Some(objects.next_version());
	objects.registers.insert(key_of(&register.metadata), register);
    }

    pub fn register(&self, key: &ObjectKey) -> Option<api::Register> {
	self.objects.lock().unwrap().registers.get(key).cloned()
    }

    pub fn register_count(&self) -> usize {
	self.objects.lock().unwrap().registers.len()
    }
}

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn get_cluster(&self, key: &ObjectKey) -> Result<Option<api::Cluster>, Error> {
	Ok(self.objects.lock().unwrap().clusters.get(key).cloned())
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<KubeSecret>, Error> {
	let key = ObjectKey::new(namespace, name);
	Ok(self.objects.lock().unwrap().secrets.get(&key).cloned())
    }
}

#[async_trait]
impl RegisterStore for MemoryStore {
    async fn get_register(&self, key: &ObjectKey) -> Result<Option<api::Register>, Error> {
	Ok(self.register(key))
    }

    async fn create_register(&self, register: &api::Register) -> Result<api::Register, Error> {
	let mut objects = self.objects.lock().unwrap();
	let key = key_of(&register.metadata);
	if objects.registers.contains_key(&key) {
	    return Err(Error::Conflict(format!("Register {} already exists", key)));
	}

	let mut created = register.clone();
	created.metadata.resource_version = Some(objects.next_version());
	created.metadata.uid = Some(format!("uid-{}", key.name));
	created.metadata.generation = Some(1);
	created.status = None;

	objects.registers.insert(key, created.clone());
	Ok(created)
    }

    async fn update_register(&self, register: &api::Register) -> Result<api::Register, Error> {
	let mut objects = self.objects.lock().unwrap();
	let key = key_of(&register.metadata);
	let stored = match objects.registers.get(&key) {
	    Some(stored) => stored.clone(),
	    None => return Err(Error::NotFound(format!("Register {}", key))),
	};
	check_version(&stored, register, &key)?;

	let mut updated = register.clone();
	updated.status = stored.status.clone();
	updated.metadata.deletion_timestamp = stored.metadata.deletion_timestamp.clone();
	updated.metadata.resource_version = Some(objects.next_version());

	let finalized = updated.metadata.finalizers.as_ref().map_or(true, |f| f.is_empty());
	if updated.is_marked_for_deletion() && finalized {
	    objects.registers.remove(&key);
	} else {
	    objects.registers.insert(key, updated.clone());
	}
	Ok(updated)
    }

    async fn update_register_status(&self, register: &api::Register) -> Result<api::Register, Error> {
	let mut objects = self.objects.lock().unwrap();
	let key = key_of(&register.metadata);
	let stored = match objects.registers.get(&key) {
	    Some(stored) => stored.clone(),
	    None => return Err(Error::NotFound(format!("Register {}", key))),
	};
	check_version(&stored, register, &key)?;

	let mut updated = stored;
	updated.status = register.status.clone();
	updated.metadata.resource_version = Some(objects.next_version());

	objects.registers.insert(key, updated.clone());
	Ok(updated)
    }

    async fn delete_register(&self, key: &ObjectKey) -> Result<(), Error> {
	let mut objects = self.objects.lock().unwrap();
	let version = objects.next_version();

	let finalized = match objects.registers.get_mut(key) {
	    None => return Ok(()),
	    Some(register) => {
		let finalized = register.metadata.finalizers.as_ref().map_or(true, |f| f.is_empty());
		if !finalized && register.metadata.deletion_timestamp.is_none() {
		    register.metadata.deletion_timestamp = Some(Time(Utc::now()));
		    register.metadata.resource_version = Some(version);
		}
		finalized
	    },
	};

	if finalized {
	    objects.registers.remove(key);
	}
	Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedEvent {
    pub kind: String,
    pub name: String,
    pub type_: EventType,
    pub reason: String,
    pub note: Option<String>,
}

/*
 * Keeps every published event in order.
 */
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<RecordedEvent>>,
}

impl EventLog {

    pub fn new() -> Self {
	Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
	self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for EventLog {
    async fn publish(&self, object: &ObjectReference, type_: EventType, reason: &str, _action: &str, note: Option<String>) {
	self.events.lock().unwrap().push(RecordedEvent{
	    kind: object.kind.clone().unwrap_or_default(),
	    name: object.name.clone().unwrap_or_default(),
	    type_: type_,
	    reason: reason.to_string(),
	    note: note,
	});
    }
}

pub fn cluster(namespace: &str, name: &str, host: &str, port: i32) -> api::Cluster {
    let mut cluster = api::Cluster::new(name, api::ClusterSpec{
	control_plane_endpoint: api::ApiEndpoint{ host: host.to_string(), port: port },
    });
    cluster.metadata.namespace = Some(namespace.to_string());
    cluster.metadata.uid = Some(format!("cluster-uid-{}", name));
    cluster
}

pub fn secret(namespace: &str, name: &str, key: &str, value: &[u8]) -> KubeSecret {
    let mut data = BTreeMap::new();
    data.insert(key.to_string(), ByteString(value.to_vec()));

    KubeSecret{
	metadata: ObjectMeta{
	    name: Some(name.to_string()),
	    namespace: Some(namespace.to_string()),
	    ..ObjectMeta::default()
	},
	data: Some(data),
	..KubeSecret::default()
    }
}

/* the ArgoCD credential secret at its default location */
pub fn argocd_secret(token: &str) -> KubeSecret {
    secret("argocd", "argocd-secret", "admin.password", BASE64.encode(token).as_bytes())
}

/* a cluster kubeconfig secret at its default location */
pub fn kubeconfig_secret(namespace: &str, cluster: &str) -> KubeSecret {
    secret(namespace, cluster, "kubeconfig", MOCK_KUBECONFIG.as_bytes())
}
