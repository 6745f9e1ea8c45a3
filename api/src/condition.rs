use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use schemars::r#gen::SchemaGenerator;
use schemars::schema::Schema;
use serde::{Deserialize, Serialize};

/*
 * Condition types written by the manager. Other actors may add conditions
 * of their own to a Register; those are kept verbatim as `Other`.
 */
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConditionType {
    /*
     * The cluster is registered in ArgoCD and the registration is
     * believed to be healthy.
     */
    Available,

    /*
     * The registration is being created or updated.
     */
    Progressing,

    /*
     * Something went wrong, or the Register is being finalized.
     */
    Degraded,

    Other(String),
}

impl From<String> for ConditionType {
    fn from(value: String) -> Self {
	match value.as_str() {
	    "Available" => ConditionType::Available,
	    "Progressing" => ConditionType::Progressing,
	    "Degraded" => ConditionType::Degraded,
	    _ => ConditionType::Other(value),
	}
    }
}

impl From<ConditionType> for String {
    fn from(value: ConditionType) -> Self {
	match value {
	    ConditionType::Available => "Available".to_string(),
	    ConditionType::Progressing => "Progressing".to_string(),
	    ConditionType::Degraded => "Degraded".to_string(),
	    ConditionType::Other(other) => other,
	}
    }
}

// open set on the wire, a plain string
impl JsonSchema for ConditionType {
    fn schema_name() -> String {
	"ConditionType".to_string()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
	String::json_schema(generator)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

/*
 * Kubernetes style status condition, as written in Register.status.conditions
 */
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {

    #[serde(rename = "type")]
    pub type_: ConditionType,

    pub status: ConditionStatus,

    // machine readable, short code
    pub reason: String,

    // human readable details
    pub message: String,

    pub last_transition_time: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {

    pub fn new(type_: ConditionType, status: ConditionStatus, reason: &str, message: &str) -> Self {
	Self{
	    type_: type_,
	    status: status,
	    reason: reason.to_string(),
	    message: message.to_string(),
	    last_transition_time: Utc::now(),
	    observed_generation: None,
	}
    }

    pub fn with_observed_generation(mut self, generation: Option<i64>) -> Self {
	self.observed_generation = generation;
	self
    }

    pub fn is_true(&self) -> bool {
	self.status == ConditionStatus::True
    }
}

/*
 * Sets `new` into `conditions`, keeping at most one entry per type.
 *
 * An existing entry of the same type is updated in place: the transition
 * time only moves when the status or the reason changes, otherwise just the
 * message and the observed generation are refreshed. New types are appended,
 * so the list keeps insertion order.
 *
 * Returns true when anything in the list changed.
 */
pub fn set_condition(conditions: &mut Vec<Condition>, new: Condition) -> bool {
    let existing = match conditions.iter_mut().find(|c| c.type_ == new.type_) {
	Some(existing) => existing,
	None => {
	    conditions.push(new);
	    return true;
	}
    };

    let transitioned = existing.status != new.status || existing.reason != new.reason;
    let changed = transitioned
	|| existing.message != new.message
	|| existing.observed_generation != new.observed_generation;

    if transitioned {
	existing.status = new.status;
	existing.reason = new.reason;
	existing.last_transition_time = new.last_transition_time;
    }
    existing.message = new.message;
    existing.observed_generation = new.observed_generation;

    changed
}

pub fn find_condition(conditions: &[Condition], type_: ConditionType) -> Option<&Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}
