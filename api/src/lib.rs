/*
 * register/api - defines the objects shared by the register manager: the
 * Cluster API cluster we watch, the Register CRD we own and the status
 * conditions written on it.
 */

pub mod cluster;
pub use cluster::ApiEndpoint;
pub use cluster::Cluster;
pub use cluster::ClusterSpec;

pub mod condition;
pub use condition::Condition;
pub use condition::ConditionStatus;
pub use condition::ConditionType;

pub mod register;
pub use register::Register;
pub use register::RegisterSpec;
pub use register::RegisterStatus;
pub use register::REGISTER_FINALIZER;
