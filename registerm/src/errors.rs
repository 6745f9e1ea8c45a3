use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {

    /* encapsulate a kube-rust error */
    #[error("kube error: {0}")]
    Kube(#[from] kube::Error),

    /* a referenced object does not exist */
    #[error("not found: {0}")]
    NotFound(String),

    /*
     * Missing or malformed credentials, kubeconfig or endpoint. Retrying
     * only helps once someone fixes the referenced data.
     */
    #[error("configuration error: {0}")]
    Configuration(String),

    /* network or API failures while talking to ArgoCD */
    #[error("transient error: {0}")]
    Transient(String),

    /* the object changed since we read it */
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
