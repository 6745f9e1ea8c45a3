/*
 * Kubernetes Events on the objects we manage, visible through
 * `kubectl describe` and `kubectl get events`.
 *
 * Publishing is fire-and-forget: a failed event is logged and never fails
 * the reconciliation that raised it.
 */

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client as KubeClient;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use log;

pub const REASON_DELETING: &str = "Deleting";
pub const ACTION_FINALIZE: &str = "Finalize";

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, object: &ObjectReference, type_: EventType, reason: &str, action: &str, note: Option<String>);
}

/*
 * KubeEventPublisher records events through the API server.
 */
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {

    /* `controller` shows up as the reporting component of every event */
    pub fn new(kube_client: KubeClient, controller: &str) -> Self {
	let reporter = Reporter{
	    controller: controller.to_string(),
	    instance: None,
	};

	Self{
	    recorder: Recorder::new(kube_client, reporter),
	}
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(&self, object: &ObjectReference, type_: EventType, reason: &str, action: &str, note: Option<String>) {
	let event = Event{
	    type_: type_,
	    reason: reason.to_string(),
	    note: note,
	    action: action.to_string(),
	    secondary: None,
	};

	if let Err(err) = self.recorder.publish(&event, object).await {
	    log::warn!("Failed to publish event {} on {}/{}: {}", reason,
		       object.namespace.as_deref().unwrap_or_default(),
		       object.name.as_deref().unwrap_or_default(), err);
	}
    }
}
