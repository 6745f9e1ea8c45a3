use clap::Args;
use clap::Parser;

pub const DEFAULT_ARGOCD_NAMESPACE: &str = "argocd";
pub const DEFAULT_ARGOCD_SECRET_NAME: &str = "argocd-secret";
pub const DEFAULT_ARGOCD_TOKEN_KEY: &str = "admin.password";
pub const DEFAULT_ARGOCD_ENDPOINT: &str = "https://argocd-api.example.com";
pub const DEFAULT_ARGOCD_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_KUBECONFIG_KEY: &str = "kubeconfig";
pub const DEFAULT_ERROR_REQUEUE_SECS: u64 = 5;
pub const DEFAULT_MAX_ERROR_REQUEUE_SECS: u64 = 300;

/*
 * Register manager configuration. Every value can be given as a flag or
 * through the environment, and falls back to the defaults above.
 */
#[derive(Parser, Debug, Clone)]
#[command(name = "registerm", version, about = "Registers Cluster API workload clusters with ArgoCD")]
pub struct Config {

    #[command(flatten)]
    pub argocd: ArgoConfig,

    #[command(flatten)]
    pub kubeconfig: KubeconfigConfig,

    /// Seconds to wait before the first retry of a failed reconciliation,
    /// doubled on every further failure of the same object
    #[arg(long, env = "ERROR_REQUEUE_SECS", default_value_t = DEFAULT_ERROR_REQUEUE_SECS)]
    pub error_requeue_secs: u64,

    /// Upper bound of the retry delay
    #[arg(long, env = "MAX_ERROR_REQUEUE_SECS", default_value_t = DEFAULT_MAX_ERROR_REQUEUE_SECS)]
    pub max_error_requeue_secs: u64,
}

/*
 * Where the ArgoCD API lives and where its admin token is stored.
 */
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ArgoConfig {

    /// Namespace holding the ArgoCD credential secret
    #[arg(long = "argocd-namespace", env = "ARGOCD_NAMESPACE", default_value = DEFAULT_ARGOCD_NAMESPACE)]
    pub namespace: String,

    /// Name of the ArgoCD credential secret
    #[arg(long = "argocd-secret-name", env = "ARGOCD_SECRET_NAME", default_value = DEFAULT_ARGOCD_SECRET_NAME)]
    pub secret_name: String,

    /// Secret data key holding the base64 encoded bearer token
    #[arg(long = "argocd-token-key", env = "ARGOCD_TOKEN_KEY", default_value = DEFAULT_ARGOCD_TOKEN_KEY)]
    pub token_key: String,

    /// ArgoCD API endpoint
    #[arg(long = "argocd-endpoint", env = "ARGOAPI_ENDPOINT", default_value = DEFAULT_ARGOCD_ENDPOINT)]
    pub endpoint: String,

    /// Timeout of a single ArgoCD API request
    #[arg(long = "argocd-timeout-secs", env = "ARGOCD_TIMEOUT_SECS", default_value_t = DEFAULT_ARGOCD_TIMEOUT_SECS)]
    pub timeout_secs: u64,
}

/*
 * How the kubeconfig secret of a workload cluster is located: it lives in
 * the cluster's namespace, named `<cluster><suffix>`.
 */
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct KubeconfigConfig {

    /// Suffix appended to the cluster name to find its kubeconfig secret
    #[arg(long = "kubeconfig-secret-suffix", env = "KUBECONFIG_SECRET_SUFFIX", default_value = "", allow_hyphen_values = true)]
    pub secret_suffix: String,

    /// Secret data key holding the kubeconfig
    #[arg(long = "kubeconfig-key", env = "KUBECONFIG_SECRET_KEY", default_value = DEFAULT_KUBECONFIG_KEY)]
    pub key: String,
}

impl Default for Config {
    fn default() -> Self {
	Self{
	    argocd: ArgoConfig::default(),
	    kubeconfig: KubeconfigConfig::default(),
	    error_requeue_secs: DEFAULT_ERROR_REQUEUE_SECS,
	    max_error_requeue_secs: DEFAULT_MAX_ERROR_REQUEUE_SECS,
	}
    }
}

impl Default for ArgoConfig {
    fn default() -> Self {
	Self{
	    namespace: DEFAULT_ARGOCD_NAMESPACE.to_string(),
	    secret_name: DEFAULT_ARGOCD_SECRET_NAME.to_string(),
	    token_key: DEFAULT_ARGOCD_TOKEN_KEY.to_string(),
	    endpoint: DEFAULT_ARGOCD_ENDPOINT.to_string(),
	    timeout_secs: DEFAULT_ARGOCD_TIMEOUT_SECS,
	}
    }
}

impl Default for KubeconfigConfig {
    fn default() -> Self {
	Self{
	    secret_suffix: String::new(),
	    key: DEFAULT_KUBECONFIG_KEY.to_string(),
	}
    }
}

impl ArgoConfig {

    /*
     * Returns a copy pointing at `endpoint`, or an unchanged copy when
     * `endpoint` is empty.
     */
    pub fn with_endpoint(&self, endpoint: &str) -> Self {
	let mut config = self.clone();
	if !endpoint.is_empty() {
	    config.endpoint = endpoint.to_string();
	}
	config
    }
}

impl KubeconfigConfig {

    pub fn secret_name(&self, cluster: &str) -> String {
	format!("{}{}", cluster, self.secret_suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_defaults_match_default_impl() {
	let parsed = Config::try_parse_from(["registerm"]).unwrap();
	let defaults = Config::default();

	assert_eq!(parsed.argocd, defaults.argocd);
	assert_eq!(parsed.kubeconfig, defaults.kubeconfig);
	assert_eq!(parsed.error_requeue_secs, defaults.error_requeue_secs);
	assert_eq!(parsed.max_error_requeue_secs, defaults.max_error_requeue_secs);
    }

    #[test]
    fn flags_override_defaults() {
	let parsed = Config::try_parse_from([
	    "registerm",
	    "--argocd-namespace", "gitops",
	    "--argocd-endpoint", "https://argocd.internal",
	    "--kubeconfig-secret-suffix", "-kubeconfig",
	    "--kubeconfig-key", "value",
	]).unwrap();

	assert_eq!(parsed.argocd.namespace, "gitops");
	assert_eq!(parsed.argocd.endpoint, "https://argocd.internal");
	assert_eq!(parsed.kubeconfig.secret_name("workload"), "workload-kubeconfig");
	assert_eq!(parsed.kubeconfig.key, "value");
    }

    #[test]
    fn suffix_may_start_with_a_hyphen() {
	let parsed = Config::try_parse_from(["registerm", "--kubeconfig-secret-suffix", "-kubeconfig"]).unwrap();

	assert_eq!(parsed.kubeconfig.secret_suffix, "-kubeconfig");
	assert_eq!(parsed.kubeconfig.key, DEFAULT_KUBECONFIG_KEY);
    }

    #[test]
    fn empty_endpoint_override_keeps_configured_one() {
	let config = ArgoConfig::default();

	assert_eq!(config.with_endpoint("").endpoint, DEFAULT_ARGOCD_ENDPOINT);
	assert_eq!(config.with_endpoint("https://other").endpoint, "https://other");
    }
}
