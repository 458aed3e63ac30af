//! Lifecycle tests with a recording executor in place of real tools

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use soil::deploy::lifecycle::{DeploymentState, Lifecycle};
use soil::deploy::registry::DeploymentRegistry;
use soil::deploy::scalability::CreateParams;
use soil::deploy::status::StatusStore;
use soil::errors::SoilError;
use soil::process::{command_line, ExecPolicy, Executor};
use soil::storage::layout::StorageLayout;
use soil::storage::settings::Settings;
use tempfile::TempDir;
use tokio_test::{assert_err, assert_ok};

/// Records every command line and answers from canned outputs
#[derive(Default)]
struct FakeExecutor {
    calls: Mutex<Vec<String>>,
    responses: Vec<(&'static str, String)>,
    failures: Vec<&'static str>,
}

impl FakeExecutor {
    fn provisioning() -> Self {
        let terraform_output = json!({
            "clusters": {
                "value": {
                    "tester": {
                        "kubeconfig": "/tmp/tester.yaml",
                        "context": "k3d-tester",
                        "local_name": "tester.local.gd",
                        "private_name": "tester",
                        "local_http_port": 8080
                    },
                    "upstream": {
                        "kubeconfig": "/tmp/upstream.yaml",
                        "context": "k3d-upstream",
                        "local_name": "upstream.local.gd",
                        "private_name": "upstream",
                        "local_https_port": 8443,
                        "node_access_commands": {"server-0": "docker exec -it k3d-upstream-server-0 sh"}
                    },
                    "downstream-0": {
                        "kubeconfig": "/tmp/downstream-0.yaml",
                        "context": "k3d-downstream-0",
                        "local_name": "downstream-0.local.gd",
                        "private_name": "downstream-0"
                    }
                }
            }
        });

        Self {
            responses: vec![
                ("output -json", terraform_output.to_string()),
                (
                    "fleet-default cluster downstream-0",
                    json!({"status": {"clusterName": "c-m-1"}}).to_string(),
                ),
                (
                    "clusterregistrationtoken",
                    json!({"status": {"token": "tok"}}).to_string(),
                ),
                ("git --version", "git version 2.43.0\n".to_string()),
                ("rev-parse", "abc123\n".to_string()),
            ],
            ..Default::default()
        }
    }

    fn failing(mut self, pattern: &'static str) -> Self {
        self.failures.push(pattern);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn position(&self, pattern: &str) -> Option<usize> {
        self.calls().iter().position(|call| call.contains(pattern))
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn run(&self, args: &[String], _policy: ExecPolicy) -> Result<String, SoilError> {
        let line = command_line(args);
        self.calls.lock().unwrap().push(line.clone());

        if self.failures.iter().any(|pattern| line.contains(pattern)) {
            return Err(SoilError::Command {
                command: line,
                code: Some(1),
                output: String::new(),
            });
        }
        Ok(self
            .responses
            .iter()
            .find(|(pattern, _)| line.contains(pattern))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| "{}".to_string()))
    }

    async fn run_interactive(&self, args: &[String]) -> Result<(), SoilError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("[tty] {}", command_line(args)));
        Ok(())
    }
}

fn lifecycle(root: &TempDir, executor: Arc<FakeExecutor>) -> Lifecycle {
    let store = StatusStore::new(
        StorageLayout::new(root.path()),
        Arc::new(DeploymentRegistry::builtin()),
    );
    Lifecycle::new(store, Settings::default(), executor)
}

fn touch_state(root: &Path, name: &str) {
    std::fs::write(root.join(name).join("terraform.state"), "{}").unwrap();
}

#[tokio::test]
async fn test_create_saves_then_provisions() {
    let root = TempDir::new().unwrap();
    let executor = Arc::new(FakeExecutor::provisioning());
    let lifecycle = lifecycle(&root, executor.clone());

    let workdir = assert_ok!(
        lifecycle
            .create("perf", "k3d", CreateParams::default())
            .await
    );
    assert_eq!(workdir, root.path().join("perf"));
    assert_eq!(lifecycle.state("perf").await, DeploymentState::Created);

    let repo = root.path().join("perf").join("scalability-tests");
    let clone = format!(
        "git clone https://github.com/moio/scalability-tests {}",
        repo.display()
    );
    let apply = format!(
        "apply -auto-approve -state={}",
        root.path().join("perf").join("terraform.state").display()
    );
    let import = format!(
        "curl --insecure -fL https://upstream.local.gd:8443/v3/import/tok_c-m-1.yaml -o {}",
        root.path().join("perf").join("tok_c-m-1.yaml").display()
    );

    let clone_at = executor.position(&clone).unwrap();
    let init_at = executor.position("init -upgrade").unwrap();
    let apply_at = executor.position(&apply).unwrap();
    let rancher_at = executor
        .position("upgrade --install --namespace=cattle-system rancher")
        .unwrap();
    let setup_at = executor.position("[tty] kubectl run k6").unwrap();
    let import_at = executor.position(&import).unwrap();
    assert!(clone_at < init_at);
    assert!(init_at < apply_at);
    assert!(apply_at < rancher_at);
    assert!(rancher_at < setup_at);
    assert!(setup_at < import_at);

    let calls = executor.calls();
    assert!(calls
        .iter()
        .any(|c| c.contains("rancher-2.7.6.tgz") && c.contains("replicas=1")));
    assert!(calls
        .iter()
        .any(|c| c.starts_with("kubectl apply -f") && c.contains("--context=k3d-downstream-0")));
}

#[tokio::test]
async fn test_failed_provisioning_keeps_record() {
    let root = TempDir::new().unwrap();
    let executor = Arc::new(FakeExecutor::provisioning().failing("apply -auto-approve"));
    let lifecycle = lifecycle(&root, executor.clone());

    let err = assert_err!(
        lifecycle
            .create("perf", "ssh", CreateParams::default())
            .await
    );
    assert!(err.is_command_failure());
    assert_eq!(lifecycle.state("perf").await, DeploymentState::Created);
    assert!(executor.position("helm --kubeconfig").is_none());

    let loaded = assert_ok!(lifecycle.load("perf").await);
    assert_eq!(loaded.brief(), "perf (ssh)");
}

#[tokio::test]
async fn test_missing_tools_stop_provisioning() {
    let root = TempDir::new().unwrap();
    let executor = Arc::new(FakeExecutor::provisioning().failing("helm version"));
    let lifecycle = lifecycle(&root, executor.clone());

    let err = assert_err!(
        lifecycle
            .create("perf", "k3d", CreateParams::default())
            .await
    );
    assert!(matches!(err, SoilError::Provision(ref msg) if msg.contains("helm")));
    assert!(executor.position("git clone").is_none());
}

#[tokio::test]
async fn test_create_existing_fails() {
    let root = TempDir::new().unwrap();
    let executor = Arc::new(FakeExecutor::provisioning());
    let lifecycle = lifecycle(&root, executor.clone());
    assert_ok!(
        lifecycle
            .create("perf", "k3d", CreateParams::default())
            .await
    );
    let issued = executor.calls().len();

    let err = assert_err!(
        lifecycle
            .create("perf", "aws", CreateParams::default())
            .await
    );
    assert!(matches!(err, SoilError::AlreadyExists(ref name) if name == "perf"));
    assert_eq!(executor.calls().len(), issued);
    assert_eq!(assert_ok!(lifecycle.load("perf").await).kind(), "k3d");
}

#[tokio::test]
async fn test_create_unknown_kind_persists_nothing() {
    let root = TempDir::new().unwrap();
    let executor = Arc::new(FakeExecutor::provisioning());
    let lifecycle = lifecycle(&root, executor.clone());

    let err = assert_err!(
        lifecycle
            .create("perf", "gke", CreateParams::default())
            .await
    );
    assert!(matches!(err, SoilError::UnknownKind(_)));
    assert!(!root.path().join("perf").exists());
    assert!(executor.calls().is_empty());
}

#[tokio::test]
async fn test_test_leaves_status_untouched() {
    let root = TempDir::new().unwrap();
    let executor = Arc::new(FakeExecutor::provisioning());
    let lifecycle = lifecycle(&root, executor.clone());
    assert_ok!(
        lifecycle
            .create("perf", "k3d", CreateParams::default())
            .await
    );
    touch_state(root.path(), "perf");

    let status = root.path().join("perf").join("status");
    let before = std::fs::read(&status).unwrap();
    assert_ok!(lifecycle.test("perf").await);
    assert_eq!(std::fs::read(&status).unwrap(), before);

    let calls = executor.calls();
    assert!(calls.iter().any(|c| c.contains("rev-parse --short HEAD")));
    assert!(calls
        .iter()
        .any(|c| c.starts_with("[tty]") && c.contains("k6/create_k8s_resources.js")));
    assert!(calls
        .iter()
        .any(|c| c.starts_with("[tty]") && c.contains("commit=abc123")));
    let secret = "create secret generic kube --from-file=config=/tmp/downstream-0.yaml";
    assert!(calls.iter().any(|c| c.contains(secret)));
}

#[tokio::test]
async fn test_test_requires_created() {
    let root = TempDir::new().unwrap();
    let lifecycle = lifecycle(&root, Arc::new(FakeExecutor::provisioning()));
    assert!(assert_err!(lifecycle.test("ghost").await).is_not_found());
}

#[tokio::test]
async fn test_soft_remove_keeps_record() {
    let root = TempDir::new().unwrap();
    let executor = Arc::new(FakeExecutor::provisioning());
    let lifecycle = lifecycle(&root, executor.clone());
    assert_ok!(
        lifecycle
            .create("perf", "k3d", CreateParams::default())
            .await
    );

    touch_state(root.path(), "perf");

    assert_ok!(lifecycle.remove("perf", false).await);

    let destroy = format!(
        "destroy -auto-approve -state={}",
        root.path().join("perf").join("terraform.state").display()
    );
    assert!(executor.position(&destroy).is_some());
    assert_eq!(lifecycle.state("perf").await, DeploymentState::Created);
    assert!(root.path().join("perf").join("status").exists());
}

#[tokio::test]
async fn test_force_remove_deletes_workdir() {
    let root = TempDir::new().unwrap();
    let executor = Arc::new(FakeExecutor::provisioning());
    let lifecycle = lifecycle(&root, executor.clone());
    assert_ok!(
        lifecycle
            .create("perf", "k3d", CreateParams::default())
            .await
    );

    touch_state(root.path(), "perf");

    assert_ok!(lifecycle.remove("perf", true).await);
    assert!(executor.position("destroy -auto-approve").is_some());
    assert_eq!(lifecycle.state("perf").await, DeploymentState::Absent);
    assert!(!root.path().join("perf").exists());

    assert!(assert_err!(lifecycle.remove("perf", true).await).is_not_found());
}

#[tokio::test]
async fn test_failed_teardown_keeps_workdir_without_force() {
    let root = TempDir::new().unwrap();
    let executor = Arc::new(FakeExecutor::provisioning().failing("destroy"));
    let lifecycle = lifecycle(&root, executor.clone());
    assert_ok!(
        lifecycle
            .create("perf", "k3d", CreateParams::default())
            .await
    );
    touch_state(root.path(), "perf");

    assert!(assert_err!(lifecycle.remove("perf", false).await).is_command_failure());
    assert_eq!(lifecycle.state("perf").await, DeploymentState::Created);
    assert!(root.path().join("perf").join("terraform.state").exists());
}

#[tokio::test]
async fn test_force_remove_deletes_after_failed_teardown() {
    let root = TempDir::new().unwrap();
    let executor = Arc::new(FakeExecutor::provisioning().failing("destroy"));
    let lifecycle = lifecycle(&root, executor.clone());
    assert_ok!(
        lifecycle
            .create("perf", "k3d", CreateParams::default())
            .await
    );
    touch_state(root.path(), "perf");

    assert!(assert_err!(lifecycle.remove("perf", true).await).is_command_failure());
    assert_eq!(lifecycle.state("perf").await, DeploymentState::Absent);
    assert!(!root.path().join("perf").exists());
}

#[tokio::test]
async fn test_force_remove_clears_early_create_failure() {
    let root = TempDir::new().unwrap();
    let executor = Arc::new(FakeExecutor::provisioning().failing("terraform version"));
    let lifecycle = lifecycle(&root, executor.clone());

    let err = assert_err!(
        lifecycle
            .create("perf", "k3d", CreateParams::default())
            .await
    );
    assert!(matches!(err, SoilError::Provision(_)));
    assert_eq!(lifecycle.state("perf").await, DeploymentState::Created);

    assert_ok!(lifecycle.remove("perf", true).await);
    assert!(executor.position("destroy").is_none());
    assert_eq!(lifecycle.state("perf").await, DeploymentState::Absent);
    assert!(assert_err!(lifecycle.load("perf").await).is_not_found());

    let retry = self::lifecycle(&root, Arc::new(FakeExecutor::provisioning()));
    assert_ok!(retry.create("perf", "k3d", CreateParams::default()).await);
}

#[tokio::test]
async fn test_describe_with_access_details() {
    let root = TempDir::new().unwrap();
    let executor = Arc::new(FakeExecutor::provisioning());
    let lifecycle = lifecycle(&root, executor.clone());
    assert_ok!(
        lifecycle
            .create("perf", "k3d", CreateParams::default())
            .await
    );

    let banner = assert_ok!(lifecycle.describe("perf").await);
    assert!(banner.starts_with("'perf' (k3d):\n  scalability-tests:\n"));
    assert!(!banner.contains("ACCESS DETAILS"));

    touch_state(root.path(), "perf");
    let text = assert_ok!(lifecycle.describe("perf").await);
    assert!(text.contains("    *** ACCESS DETAILS"));
    assert!(text.contains("Rancher UI: https://upstream.local.gd:8443 (admin/adminadminadmin)"));
    assert!(text.contains("*** DOWNSTREAM-0 CLUSTER"));
    assert!(text.contains("Grafana UI: http://tester.local.gd:8080/grafana/"));
}

#[tokio::test]
async fn test_list_all() {
    let root = TempDir::new().unwrap();
    let lifecycle = lifecycle(&root, Arc::new(FakeExecutor::provisioning()));
    assert!(assert_ok!(lifecycle.list_all().await).is_empty());

    for (name, kind) in [("b", "ssh"), ("a", "k3d")] {
        assert_ok!(lifecycle.create(name, kind, CreateParams::default()).await);
    }
    let briefs: Vec<String> = assert_ok!(lifecycle.list_all().await)
        .iter()
        .map(|d| d.brief())
        .collect();
    assert_eq!(briefs, vec!["a (k3d)", "b (ssh)"]);
}
