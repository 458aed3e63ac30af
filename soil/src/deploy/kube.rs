//! Kubernetes tooling: helm, kubectl and in-cluster k6 runs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::errors::SoilError;
use crate::process::{ExecPolicy, Executor, JsonRunner};

pub const MIMIR_URL: &str = "http://mimir.tester:9009/mimir";
pub const K6_IMAGE: &str = "grafana/k6:0.46.0";

/// One entry of the `clusters` terraform output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub kubeconfig: String,
    pub context: String,
    #[serde(default)]
    pub local_name: String,
    #[serde(default)]
    pub private_name: String,
    #[serde(default)]
    pub local_http_port: Option<Value>,
    #[serde(default)]
    pub local_https_port: Option<Value>,
    #[serde(default)]
    pub node_access_commands: BTreeMap<String, String>,
}

impl Cluster {
    /// `https://<local_name>:<local_https_port>`
    pub fn local_https_url(&self) -> String {
        format!(
            "https://{}:{}",
            self.local_name,
            port_text(self.local_https_port.as_ref())
        )
    }

    pub fn local_http_address(&self) -> String {
        format!(
            "{}:{}",
            self.local_name,
            port_text(self.local_http_port.as_ref())
        )
    }

    /// `kubectl` connection flags
    pub fn kubectl_flags(&self) -> [String; 2] {
        [
            format!("--kubeconfig={}", self.kubeconfig),
            format!("--context={}", self.context),
        ]
    }

    pub fn node_access_text(&self) -> String {
        self.node_access_commands
            .iter()
            .map(|(node, command)| format!("    Node {}: {}\n", node, command))
            .collect()
    }
}

fn port_text(port: Option<&Value>) -> String {
    match port {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// The clusters a terraform configuration reports, keyed by role
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Clusters(BTreeMap<String, Cluster>);

impl Clusters {
    /// Extract `clusters.value` from `terraform output -json`
    pub fn from_terraform_output(output: &Map<String, Value>) -> Result<Self, SoilError> {
        let value = output
            .get("clusters")
            .and_then(|clusters| clusters.get("value"))
            .ok_or_else(|| {
                SoilError::Provision("terraform output has no 'clusters' value".to_string())
            })?;
        let clusters = serde_json::from_value(value.clone())
            .map_err(|e| SoilError::parse("terraform clusters output", e))?;
        Ok(Self(clusters))
    }

    pub fn get(&self, name: &str) -> Result<&Cluster, SoilError> {
        self.0.get(name).ok_or_else(|| {
            SoilError::Provision(format!("terraform output has no '{}' cluster", name))
        })
    }

    pub fn tester(&self) -> Result<&Cluster, SoilError> {
        self.get("tester")
    }

    pub fn upstream(&self) -> Result<&Cluster, SoilError> {
        self.get("upstream")
    }

    /// Clusters imported into Rancher, in name order
    pub fn downstream(&self) -> impl Iterator<Item = (&str, &Cluster)> {
        self.0
            .iter()
            .filter(|(name, _)| name.starts_with("downstream"))
            .map(|(name, cluster)| (name.as_str(), cluster))
    }
}

/// Render values as `key=<json>` pairs for `helm --set-json`, sorted by key
pub fn helm_json(values: &Map<String, Value>) -> String {
    let mut pairs: Vec<String> = values
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    pairs.sort();
    pairs.join(",")
}

/// `helm upgrade --install` a chart into a cluster namespace
pub async fn helm_install(
    executor: &dyn Executor,
    release: &str,
    chart: &str,
    cluster: &Cluster,
    namespace: &str,
    values: Option<&Map<String, Value>>,
) -> Result<(), SoilError> {
    let mut args = vec![
        "helm".to_string(),
        format!("--kubeconfig={}", cluster.kubeconfig),
        format!("--kube-context={}", cluster.context),
        "upgrade".to_string(),
        "--install".to_string(),
        format!("--namespace={}", namespace),
        release.to_string(),
        chart.to_string(),
        "--create-namespace".to_string(),
    ];
    if let Some(values) = values {
        args.push(format!("--set-json='{}'", helm_json(values)));
    }
    executor.run(&args, ExecPolicy::EXEC).await?;
    Ok(())
}

fn kubectl_args(cluster: &Cluster, args: &[&str]) -> Vec<String> {
    let mut argv = vec!["kubectl".to_string()];
    argv.extend(args.iter().map(|arg| arg.to_string()));
    argv.extend(cluster.kubectl_flags());
    argv
}

/// Run kubectl against a cluster
pub async fn kubectl(
    executor: &dyn Executor,
    cluster: &Cluster,
    args: &[&str],
) -> Result<(), SoilError> {
    executor
        .run(&kubectl_args(cluster, args), ExecPolicy::EXEC)
        .await?;
    Ok(())
}

/// Run kubectl with `-o json` style output and parse it
pub async fn kubectl_json(
    executor: &dyn Executor,
    cluster: &Cluster,
    args: &[&str],
) -> Result<Map<String, Value>, SoilError> {
    executor
        .run_json(&kubectl_args(cluster, args), ExecPolicy::EXEC_QUIET)
        .await
}

/// A k6 script run inside the tester cluster
#[derive(Debug, Clone, Default)]
pub struct K6Run {
    /// Script path under `k6/`, shipped to the cluster by the k6-files chart
    pub script: String,
    pub envs: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    /// Push result metrics to mimir
    pub record: bool,
    pub tty: bool,
}

impl K6Run {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            ..Default::default()
        }
    }

    pub fn env(mut self, key: &str, value: impl Into<String>) -> Self {
        self.envs.insert(key.to_string(), value.into());
        self
    }

    pub fn tag(mut self, key: &str, value: impl Into<String>) -> Self {
        self.tags.insert(key.to_string(), value.into());
        self
    }

    pub fn recorded(mut self) -> Self {
        self.record = true;
        self
    }

    pub fn with_tty(mut self, tty: bool) -> Self {
        self.tty = tty;
        self
    }

    /// Arguments of the `k6` process inside the pod
    fn container_args(&self) -> Vec<String> {
        let mut args = vec!["run".to_string()];
        for (key, value) in &self.envs {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        for (key, value) in &self.tags {
            args.push("--tag".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(self.script.clone());
        if self.record {
            args.push("-o".to_string());
            args.push("experimental-prometheus-rw".to_string());
        }
        args
    }

    /// Pod overrides handed to `kubectl run`
    fn overrides(&self, with_kubeconfig: bool) -> Value {
        let mut volume_mounts = vec![
            json!({"mountPath": "/k6", "name": "k6-test-files"}),
            json!({"mountPath": "/k6/lib", "name": "k6-lib-files"}),
        ];
        let mut volumes = vec![
            json!({"name": "k6-test-files", "configMap": {"name": "k6-test-files"}}),
            json!({"name": "k6-lib-files", "configMap": {"name": "k6-lib-files"}}),
        ];
        if with_kubeconfig {
            volume_mounts.push(json!({"mountPath": "/kube", "name": "kube"}));
            volumes.push(json!({"name": "kube", "secret": {"secretName": "kube"}}));
        }

        json!({
            "apiVersion": "v1",
            "spec": {
                "containers": [{
                    "name": "k6",
                    "image": K6_IMAGE,
                    "stdin": true,
                    "tty": self.tty,
                    "args": self.container_args(),
                    "workingDir": "/",
                    "env": [
                        {"name": "K6_PROMETHEUS_RW_SERVER_URL", "value": format!("{}/api/v1/push", MIMIR_URL)},
                        {"name": "K6_PROMETHEUS_RW_TREND_AS_NATIVE_HISTOGRAM", "value": "true"},
                        {"name": "K6_PROMETHEUS_RW_STALE_MARKERS", "value": "true"},
                    ],
                    "volumeMounts": volume_mounts,
                }],
                "volumes": volumes,
            }
        })
    }
}

/// Run a k6 script in a throwaway pod on `cluster`.
///
/// A `KUBECONFIG` env is uploaded to the cluster as the `kube` secret and
/// rewritten to its mount path inside the pod.
pub async fn k6_run(
    executor: &dyn Executor,
    cluster: &Cluster,
    mut run: K6Run,
) -> Result<(), SoilError> {
    let kubeconfig = run.envs.get("KUBECONFIG").cloned();
    if let Some(kubeconfig) = &kubeconfig {
        kubectl(
            executor,
            cluster,
            &["--namespace=tester", "delete", "secret", "kube", "--ignore-not-found"],
        )
        .await?;
        let from_file = format!("--from-file=config={}", kubeconfig);
        kubectl(
            executor,
            cluster,
            &["--namespace=tester", "create", "secret", "generic", "kube", from_file.as_str()],
        )
        .await?;
        run.envs
            .insert("KUBECONFIG".to_string(), "/kube/config".to_string());
    }

    debug!("k6 env={:?}", run.envs);
    info!("*** Running k6 {}", run.container_args().join(" "));

    let overrides = run.overrides(kubeconfig.is_some());
    let tty = format!("--tty={}", run.tty);
    let overrides = format!("--overrides='{}'", overrides);
    let args = kubectl_args(
        cluster,
        &[
            "run",
            "k6",
            "--image",
            K6_IMAGE,
            "--namespace=tester",
            "--rm",
            "-i",
            tty.as_str(),
            "--restart=Never",
            overrides.as_str(),
        ],
    );
    executor.run_interactive(&args).await
}
