//! Rancher scalability test environment
//!
//! Provisions tester, upstream and downstream clusters from a terraform
//! configuration in the scalability-tests repository, installs Rancher,
//! monitoring and k6 tooling with helm, and drives k6 load scripts.

use std::any::Any;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{error, info, warn};

use crate::argv;
use crate::deploy::git::{clone_repository, repo_head, RepoRef};
use crate::deploy::kind::Kind;
use crate::deploy::kube::{helm_install, k6_run, kubectl, kubectl_json, Cluster, Clusters, K6Run};
use crate::deploy::{CommonIdentity, Deployment, ProvisionContext};
use crate::errors::SoilError;
use crate::process::{ExecPolicy, Executor, JsonRunner};
use crate::storage::layout::StorageLayout;
use crate::utils::split_last;

pub const SCALABILITY_TYPE: &str = "deploy.ScalabilityDeployment";

pub const RANCHER_CHART: &str =
    "https://releases.rancher.com/server-charts/latest/rancher-2.7.6.tgz";
pub const RANCHER_IMAGE_TAG: &str = "v2.7.6";
pub const CERT_MANAGER_CHART: &str = "https://charts.jetstack.io/charts/cert-manager-v1.8.0.tgz";
pub const GRAFANA_CHART: &str =
    "https://github.com/grafana/helm-charts/releases/download/grafana-6.56.5/grafana-6.56.5.tgz";
const RANCHER_MONITORING_CHART: &str = "https://github.com/rancher/charts/raw/release-v2.7/assets/rancher-monitoring/rancher-monitoring-102.0.0%2Bup40.1.2.tgz";
const RANCHER_MONITORING_CRD_CHART: &str = "https://github.com/rancher/charts/raw/release-v2.7/assets/rancher-monitoring-crd/rancher-monitoring-crd-102.0.0%2Bup40.1.2.tgz";
const RANCHER_BOOTSTRAP_PASSWORD: &str = "admin";

const GRAFANA_DASHBOARD: &str = "/grafana/d/a1508c35-b2e6-47f4-94ab-fec400d1c243/test-results?orgId=1&refresh=5s&from=now-30m&to=now";

/// Attributes `extra()` always exports; caller params cannot reuse them
const RESERVED_EXTRA_KEYS: [&str; 5] = ["repo", "branch", "workdir", "varfile", "replicas"];

const CONFIG_MAP_COUNT: u32 = 1000;
const SECRET_COUNT: u32 = 1000;
const ROLE_COUNT: u32 = 10;
const USER_COUNT: u32 = 5;
const PROJECT_COUNT: u32 = 20;

/// Optional overrides applied on top of the kind table at creation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateParams {
    /// Repository as `url[@branch]`; settings provide the default
    pub repo_ref: Option<String>,
    pub terraform_work_dir: Option<String>,
    pub terraform_var_file: Option<String>,
    /// Caller-supplied attributes stored with the deployment
    pub params: Map<String, Value>,
}

/// Field names are shared with status records written by earlier soil releases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalabilityDeployment {
    #[serde(flatten)]
    pub identity: CommonIdentity,
    #[serde(rename = "repo_url", default)]
    pub repo: String,
    #[serde(rename = "branch_name", default)]
    pub branch: String,
    #[serde(default)]
    pub terraform_work_dir: String,
    #[serde(default)]
    pub terraform_var_file: String,
    #[serde(default)]
    pub rancher_replicas: i64,
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

impl ScalabilityDeployment {
    /// Build a deployment of `kind` from the kind table and overrides
    pub fn new(
        name: &str,
        kind: &Kind,
        default_repo_ref: &str,
        create: CreateParams,
    ) -> Result<Self, SoilError> {
        info!("Creating deployment: {}", name);
        if let Some(key) = RESERVED_EXTRA_KEYS
            .iter()
            .find(|key| create.params.contains_key(**key))
        {
            return Err(SoilError::Config(format!(
                "parameter '{}' is reserved for the deployment itself",
                key
            )));
        }
        let repo_ref = create
            .repo_ref
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(default_repo_ref);
        let repo = RepoRef::parse(repo_ref)?;

        Ok(Self {
            identity: CommonIdentity::new(name)?,
            repo: repo.url,
            branch: repo.branch.unwrap_or_default(),
            terraform_work_dir: create
                .terraform_work_dir
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| kind.terraform_work_dir.to_string()),
            terraform_var_file: create
                .terraform_var_file
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| kind.terraform_var_file.to_string()),
            rancher_replicas: kind.rancher_replicas(),
            kind: kind.name.to_string(),
            params: create.params,
        })
    }

    /// Repository reference; records from older releases kept the branch in `repo_url`
    pub fn repo_ref(&self) -> Result<RepoRef, SoilError> {
        let mut repo = RepoRef::parse(&self.repo)?;
        if !self.branch.is_empty() {
            repo.branch = Some(self.branch.clone());
        }
        Ok(repo)
    }

    pub fn repo_local_path(&self, layout: &StorageLayout) -> Result<PathBuf, SoilError> {
        let repo = self.repo_ref()?;
        Ok(self.workdir(layout).path().join(repo.name()))
    }

    /// `{repo}/terraform/main/<kind>`
    pub fn terraform_dir(&self, layout: &StorageLayout) -> Result<PathBuf, SoilError> {
        Ok(self.repo_local_path(layout)?.join(&self.terraform_work_dir))
    }

    pub fn terraform_state(&self, layout: &StorageLayout) -> PathBuf {
        self.workdir(layout).path().join("terraform.state")
    }

    /// Var file path. A leading `/` means relative to the cloned repository.
    pub fn terraform_var_file_path(
        &self,
        layout: &StorageLayout,
    ) -> Result<Option<String>, SoilError> {
        if self.terraform_var_file.is_empty() {
            return Ok(None);
        }
        if !self.terraform_var_file.starts_with('/') {
            return Ok(Some(self.terraform_var_file.clone()));
        }
        Ok(Some(format!(
            "{}{}",
            self.repo_local_path(layout)?.display(),
            self.terraform_var_file
        )))
    }

    fn charts_dir(&self, layout: &StorageLayout) -> Result<String, SoilError> {
        Ok(format!("{}/charts", self.repo_local_path(layout)?.display()))
    }

    fn terraform_args(
        &self,
        layout: &StorageLayout,
        command: &[&str],
    ) -> Result<Vec<String>, SoilError> {
        let mut args = vec![
            "terraform".to_string(),
            format!("-chdir={}", self.terraform_dir(layout)?.display()),
        ];
        args.extend(command.iter().map(|arg| arg.to_string()));
        Ok(args)
    }

    fn state_flag(&self, layout: &StorageLayout) -> String {
        format!("-state={}", self.terraform_state(layout).display())
    }

    async fn require_state(&self, layout: &StorageLayout) -> Result<(), SoilError> {
        let state = self.terraform_state(layout);
        if tokio::fs::try_exists(&state).await? {
            Ok(())
        } else {
            Err(SoilError::Provision(format!(
                "Terraform state file does not exist: {}",
                state.display()
            )))
        }
    }

    /// Read the clusters terraform reports for this deployment
    pub async fn clusters(
        &self,
        ctx: &ProvisionContext<'_>,
        policy: ExecPolicy,
    ) -> Result<Clusters, SoilError> {
        let state_flag = self.state_flag(ctx.layout);
        let args = self.terraform_args(ctx.layout, &["output", "-json", state_flag.as_str()])?;
        let output = ctx.executor.run_json(&args, policy).await?;
        Clusters::from_terraform_output(&output)
    }

    /// Probe the tools provisioning relies on and report every missing one
    pub async fn check_requirements(&self, executor: &dyn Executor) -> Result<(), SoilError> {
        let mut missing = Vec::new();

        match executor.run(&argv!["git", "--version"], ExecPolicy::EXEC_SILENT).await {
            Ok(version) => info!("Found git version: {}", split_last(version.trim(), " ")),
            Err(_) => {
                error!("No git found, please install git");
                missing.push("git");
            }
        }

        match executor
            .run_json(
                &argv!["kubectl", "version", "--client=true", "-o=json", "2>/dev/null"],
                ExecPolicy::EXEC_SILENT,
            )
            .await
        {
            Ok(version) => info!(
                "Found kubectl version: {}",
                version
                    .get("clientVersion")
                    .and_then(|v| v.get("gitVersion"))
                    .unwrap_or(&serde_json::Value::Null)
            ),
            Err(_) => {
                error!("No kubectl found, please install kubectl");
                missing.push("kubectl");
            }
        }

        match executor
            .run_json(&argv!["terraform", "version", "-json"], ExecPolicy::EXEC_SILENT)
            .await
        {
            Ok(version) => info!(
                "Found terraform version: {}",
                version.get("terraform_version").unwrap_or(&serde_json::Value::Null)
            ),
            Err(_) => {
                error!("No terraform found, please install terraform from https://releases.hashicorp.com/terraform/");
                missing.push("terraform");
            }
        }

        match executor
            .run(
                &argv!["helm", "version", "--template='{{.Version}}'"],
                ExecPolicy::EXEC_SILENT,
            )
            .await
        {
            Ok(version) => info!("Found helm version: {}", version.trim()),
            Err(_) => {
                error!("No helm found, try: curl https://raw.githubusercontent.com/helm/helm/main/scripts/get-helm-3 | bash");
                missing.push("helm");
            }
        }

        if self.kind == "aws" {
            match executor.run(&argv!["aws", "--version"], ExecPolicy::EXEC_SILENT).await {
                Ok(version) => info!(
                    "Found aws cli version: {}",
                    version.split_whitespace().next().unwrap_or_default()
                ),
                Err(_) => {
                    error!("No aws cli found, see https://docs.aws.amazon.com/cli/latest/userguide/getting-started-install.html");
                    missing.push("aws");
                }
            }
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(SoilError::Provision(format!(
                "missing required tools: {}",
                missing.join(", ")
            )))
        }
    }

    async fn apply_terraform(&self, ctx: &ProvisionContext<'_>) -> Result<Clusters, SoilError> {
        let exec = ctx.executor;
        exec.run(
            &self.terraform_args(ctx.layout, &["init", "-upgrade"])?,
            ExecPolicy::EXEC,
        )
        .await?;

        let state_flag = self.state_flag(ctx.layout);
        let mut apply =
            self.terraform_args(ctx.layout, &["apply", "-auto-approve", state_flag.as_str()])?;
        if let Some(var_file) = self.terraform_var_file_path(ctx.layout)? {
            apply.push(format!("-var-file={}", var_file));
        }
        exec.run(&apply, ExecPolicy::EXEC).await?;

        let clusters = self.clusters(ctx, ExecPolicy::EXEC_OUTPUT).await?;
        info!(
            "Terraform clusters: {}",
            clusters
                .downstream()
                .map(|(name, _)| name)
                .chain(["tester", "upstream"])
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(clusters)
    }

    async fn install_tester(
        &self,
        ctx: &ProvisionContext<'_>,
        tester: &Cluster,
    ) -> Result<(), SoilError> {
        let exec = ctx.executor;
        let charts = self.charts_dir(ctx.layout)?;
        info!(
            "*** Installing helm charts to tester cluster '{}' from {}",
            tester.local_name, charts
        );

        for chart in ["mimir", "k6-files", "grafana-dashboards"] {
            helm_install(exec, chart, &format!("{}/{}", charts, chart), tester, "tester", None)
                .await?;
        }

        let grafana = values(json!({
            "datasources": {
                "datasources.yaml": {
                    "apiVersion": 1,
                    "datasources": [{
                        "name": "mimir",
                        "type": "prometheus",
                        "url": "http://mimir.tester:9009/mimir/prometheus",
                        "access": "proxy",
                        "isDefault": true,
                    }],
                },
            },
            "dashboardProviders": {
                "dashboardproviders.yaml": {
                    "apiVersion": 1,
                    "providers": [{
                        "name": "default",
                        "folder": "",
                        "type": "file",
                        "disableDeletion": false,
                        "editable": true,
                        "options": {"path": "/var/lib/grafana/dashboards/default"},
                    }],
                },
            },
            "dashboardsConfigMaps": {"default": "grafana-dashboards"},
            "ingress": {
                "enabled": true,
                "path": "/grafana",
                "hosts": [tester.local_name],
            },
            "env": {
                "GF_SERVER_ROOT_URL": format!("http://{}/grafana", tester.local_name),
                "GF_SERVER_SERVE_FROM_SUB_PATH": "true",
            },
            "adminPassword": ctx.settings.admin_password,
        }));
        helm_install(exec, "grafana", GRAFANA_CHART, tester, "tester", Some(&grafana)).await
    }

    async fn install_upstream(
        &self,
        ctx: &ProvisionContext<'_>,
        upstream: &Cluster,
        tester: &Cluster,
    ) -> Result<(), SoilError> {
        let exec = ctx.executor;
        let charts = self.charts_dir(ctx.layout)?;
        info!("*** Installing helm charts to upstream cluster '{}'", upstream.local_name);

        let cert_manager = values(json!({"installCRDs": true}));
        helm_install(
            exec,
            "cert-manager",
            CERT_MANAGER_CHART,
            upstream,
            "cert-manager",
            Some(&cert_manager),
        )
        .await?;

        let rancher = values(json!({
            "bootstrapPassword": RANCHER_BOOTSTRAP_PASSWORD,
            "hostname": upstream.private_name,
            "replicas": self.rancher_replicas,
            "rancherImageTag": RANCHER_IMAGE_TAG,
            "extraEnv": [
                {"name": "CATTLE_SERVER_URL", "value": format!("https://{}", upstream.private_name)},
                {"name": "CATTLE_PROMETHEUS_METRICS", "value": "true"},
                {"name": "CATTLE_DEV_MODE", "value": "true"},
            ],
            "livenessProbe": {
                "initialDelaySeconds": 30,
                "periodSeconds": 3600,
            },
        }));
        helm_install(exec, "rancher", RANCHER_CHART, upstream, "cattle-system", Some(&rancher))
            .await?;

        let ingress = values(json!({"san": upstream.local_name}));
        helm_install(
            exec,
            "rancher-ingress",
            &format!("{}/rancher-ingress", charts),
            upstream,
            "default",
            Some(&ingress),
        )
        .await?;

        // k3d schedules monitoring on dedicated nodes
        let restrictions = if self.kind == "k3d" {
            json!({
                "nodeSelector": {"monitoring": "true"},
                "tolerations": [{"key": "monitoring", "operator": "Exists", "effect": "NoSchedule"}],
            })
        } else {
            json!({})
        };
        let mimir = format!("http://{}/mimir/api/v1/push", tester.private_name);
        install_rancher_monitoring(exec, upstream, &restrictions, Some(&mimir)).await?;

        helm_install(
            exec,
            "cgroups-exporter",
            &format!("{}/cgroups-exporter", charts),
            upstream,
            "cattle-monitoring-system",
            None,
        )
        .await?;

        kubectl(
            exec,
            upstream,
            &[
                "wait",
                "deployment/rancher",
                "--namespace",
                "cattle-system",
                "--for",
                "condition=Available=true",
                "--timeout=1h",
            ],
        )
        .await
    }

    async fn import_downstream(
        &self,
        ctx: &ProvisionContext<'_>,
        clusters: &Clusters,
    ) -> Result<(), SoilError> {
        let exec = ctx.executor;
        let tester = clusters.tester()?;
        let upstream = clusters.upstream()?;
        let downstream: Vec<(&str, &Cluster)> = clusters.downstream().collect();
        let names: Vec<&str> = downstream.iter().map(|(name, _)| *name).collect();

        let setup = K6Run::new("k6/rancher_setup.js")
            .env("BASE_URL", format!("https://{}", upstream.private_name))
            .env("BOOTSTRAP_PASSWORD", RANCHER_BOOTSTRAP_PASSWORD)
            .env("PASSWORD", ctx.settings.admin_password.as_str())
            .env("IMPORTED_CLUSTER_NAMES", names.join(","))
            .with_tty(true);
        k6_run(exec, tester, setup).await?;

        let rancher_url = upstream.local_https_url();
        let workdir = self.workdir(ctx.layout);

        for (name, cluster) in &downstream {
            let fleet = kubectl_json(
                exec,
                upstream,
                &["get", "-n", "fleet-default", "cluster", *name, "-o", "json"],
            )
            .await?;
            let cluster_id = json_str(&fleet, &["status", "clusterName"])?;

            let token = kubectl_json(
                exec,
                upstream,
                &[
                    "get",
                    "-n",
                    cluster_id.as_str(),
                    "clusterregistrationtoken.management.cattle.io",
                    "default-token",
                    "-o",
                    "json",
                ],
            )
            .await?;
            let token = json_str(&token, &["status", "token"])?;

            let manifest = format!("{}_{}.yaml", token, cluster_id);
            let manifest_path = workdir.file(&manifest).path().display().to_string();
            let manifest_url = format!("{}/v3/import/{}", rancher_url, manifest);
            info!("Importing cluster {} as {}", name, cluster_id);
            exec.run(
                &argv![
                    "curl",
                    "--insecure",
                    "-fL",
                    manifest_url.as_str(),
                    "-o",
                    manifest_path.as_str(),
                ],
                ExecPolicy::EXEC,
            )
            .await?;
            kubectl(exec, cluster, &["apply", "-f", manifest_path.as_str()]).await?;
        }

        kubectl(
            exec,
            upstream,
            &[
                "wait",
                "clusters.management.cattle.io",
                "--all",
                "--for",
                "condition=ready=true",
                "--timeout=1h",
            ],
        )
        .await?;

        if !downstream.is_empty() {
            kubectl(
                exec,
                upstream,
                &[
                    "wait",
                    "cluster.fleet.cattle.io",
                    "--all",
                    "--namespace",
                    "fleet-default",
                    "--for",
                    "condition=ready=true",
                    "--timeout=1h",
                ],
            )
            .await?;
        }

        for (_, cluster) in &downstream {
            install_rancher_monitoring(exec, cluster, &json!({}), None).await?;
        }
        Ok(())
    }

    fn access_text(&self, clusters: &Clusters, admin_password: &str) -> Result<String, SoilError> {
        let tester = clusters.tester()?;
        let upstream = clusters.upstream()?;

        let mut text = format!(
            "*** ACCESS DETAILS\n\
             *** UPSTREAM CLUSTER\n    \
             Rancher UI: {} (admin/{})\n    \
             Kubernetes API:\n      \
             export KUBECONFIG={}\n      \
             kubectl config use-context {}\n{}",
            upstream.local_https_url(),
            admin_password,
            upstream.kubeconfig,
            upstream.context,
            upstream.node_access_text()
        );

        for (name, downstream) in clusters.downstream() {
            text.push_str(&format!(
                "\n*** {} CLUSTER\n    \
                 Kubernetes API:\n      \
                 export KUBECONFIG={}\n      \
                 kubectl config use-context {}\n{}",
                name.to_uppercase(),
                downstream.kubeconfig,
                downstream.context,
                downstream.node_access_text()
            ));
        }

        text.push_str(&format!(
            "\n*** TESTER CLUSTER\n    \
             Grafana UI: http://{}{} (admin/{})\n{}",
            tester.local_http_address(),
            GRAFANA_DASHBOARD,
            admin_password,
            tester.node_access_text()
        ));
        Ok(text)
    }
}

#[async_trait]
impl Deployment for ScalabilityDeployment {
    fn identity(&self) -> &CommonIdentity {
        &self.identity
    }

    fn type_tag(&self) -> &'static str {
        SCALABILITY_TYPE
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn brief(&self) -> String {
        let kind = if self.kind.is_empty() {
            "undefined"
        } else {
            &self.kind
        };
        format!("{} ({})", self.name(), kind)
    }

    fn describe(&self) -> String {
        let repo = match self.repo_ref() {
            Ok(repo) => repo.to_string(),
            Err(_) => self.repo.clone(),
        };
        format!(
            "'{}' ({}):\n  scalability-tests:\n    repo: {}\n    dir: {}\n    rancher replicas: {}\n",
            self.name(),
            self.kind,
            repo,
            self.terraform_work_dir,
            self.rancher_replicas
        )
    }

    fn extra(&self) -> Map<String, Value> {
        let mut extra = self.params.clone();
        extra.insert("repo".to_string(), Value::from(self.repo.clone()));
        extra.insert("branch".to_string(), Value::from(self.branch.clone()));
        extra.insert(
            "workdir".to_string(),
            Value::from(self.terraform_work_dir.clone()),
        );
        extra.insert(
            "varfile".to_string(),
            Value::from(self.terraform_var_file.clone()),
        );
        extra.insert("replicas".to_string(), Value::from(self.rancher_replicas));
        extra
    }

    fn payload(&self) -> Result<Value, SoilError> {
        serde_json::to_value(self).map_err(|e| SoilError::parse(SCALABILITY_TYPE, e))
    }

    async fn create(&self, ctx: &ProvisionContext<'_>) -> Result<(), SoilError> {
        self.check_requirements(ctx.executor).await?;

        let repo = self.repo_ref()?;
        clone_repository(ctx.executor, &repo, &self.repo_local_path(ctx.layout)?).await?;

        let clusters = self.apply_terraform(ctx).await?;
        let tester = clusters.tester()?;
        let upstream = clusters.upstream()?;

        self.install_tester(ctx, tester).await?;
        self.install_upstream(ctx, upstream, tester).await?;
        self.import_downstream(ctx, &clusters).await?;

        info!("Deployment '{}' is ready", self.name());
        Ok(())
    }

    async fn test(&self, ctx: &ProvisionContext<'_>) -> Result<(), SoilError> {
        info!("Running tests on the deployment: {}...", self.name());
        let exec = ctx.executor;
        self.require_state(ctx.layout).await?;
        let clusters = self.clusters(ctx, ExecPolicy::EXEC_QUIET).await?;
        let tester = clusters.tester()?;
        let upstream = clusters.upstream()?;

        let charts = self.charts_dir(ctx.layout)?;
        helm_install(
            exec,
            "k6-files",
            &format!("{}/k6-files", charts),
            tester,
            "tester",
            None,
        )
        .await?;

        let commit = repo_head(exec, &self.repo_local_path(ctx.layout)?).await?;

        for (name, downstream) in clusters.downstream() {
            let run = K6Run::new("k6/create_k8s_resources.js")
                .env("BASE_URL", format!("https://{}:6443", downstream.private_name))
                .env("KUBECONFIG", downstream.kubeconfig.as_str())
                .env("CONTEXT", downstream.context.as_str())
                .env("CONFIG_MAP_COUNT", CONFIG_MAP_COUNT.to_string())
                .env("SECRET_COUNT", SECRET_COUNT.to_string())
                .tag("commit", commit.as_str())
                .tag("cluster", name)
                .tag("test", "create_load.mjs")
                .tag("ConfigMaps", CONFIG_MAP_COUNT.to_string())
                .tag("Secrets", SECRET_COUNT.to_string())
                .recorded()
                .with_tty(true);
            k6_run(exec, tester, run).await?;
        }

        let rancher = format!("https://{}:443", upstream.private_name);
        let password = ctx.settings.admin_password.as_str();

        let roles = K6Run::new("k6/create_roles_users.js")
            .env("BASE_URL", rancher.as_str())
            .env("USERNAME", "admin")
            .env("PASSWORD", password)
            .env("ROLE_COUNT", ROLE_COUNT.to_string())
            .env("USER_COUNT", USER_COUNT.to_string())
            .tag("commit", commit.as_str())
            .tag("cluster", "upstream")
            .tag("test", "create_roles_users.mjs")
            .tag("Roles", ROLE_COUNT.to_string())
            .tag("Users", USER_COUNT.to_string())
            .recorded()
            .with_tty(true);
        k6_run(exec, tester, roles).await?;

        let projects = K6Run::new("k6/create_projects.js")
            .env("BASE_URL", rancher.as_str())
            .env("USERNAME", "admin")
            .env("PASSWORD", password)
            .env("PROJECT_COUNT", PROJECT_COUNT.to_string())
            .tag("commit", commit.as_str())
            .tag("cluster", "upstream")
            .tag("test", "create_projects.mjs")
            .tag("Projects", PROJECT_COUNT.to_string())
            .recorded()
            .with_tty(true);
        k6_run(exec, tester, projects).await?;

        info!("{}", self.access_text(&clusters, password)?);
        Ok(())
    }

    async fn remove(&self, ctx: &ProvisionContext<'_>) -> Result<(), SoilError> {
        info!("Removing deployment {}", self.name());
        if self.require_state(ctx.layout).await.is_err() {
            info!("No terraform state for {}, nothing to destroy", self.name());
            return Ok(());
        }
        let state_flag = self.state_flag(ctx.layout);
        let args = self.terraform_args(
            ctx.layout,
            &["destroy", "-auto-approve", state_flag.as_str()],
        )?;
        ctx.executor.run(&args, ExecPolicy::EXEC).await?;
        Ok(())
    }

    async fn access_details(
        &self,
        ctx: &ProvisionContext<'_>,
    ) -> Result<Option<String>, SoilError> {
        if self.require_state(ctx.layout).await.is_err() {
            return Ok(None);
        }
        let clusters = self.clusters(ctx, ExecPolicy::EXEC_SILENT).await?;
        match self.access_text(&clusters, &ctx.settings.admin_password) {
            Ok(text) => Ok(Some(text)),
            Err(e) => {
                warn!("Incomplete terraform output: {}", e);
                Ok(None)
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

async fn install_rancher_monitoring(
    executor: &dyn Executor,
    cluster: &Cluster,
    restrictions: &Value,
    mimir_url: Option<&str>,
) -> Result<(), SoilError> {
    let global = json!({
        "cattle": {
            "clusterId": "local",
            "clusterName": "local",
            "systemDefaultRegistry": "",
        },
    });

    let crd = values(json!({
        "global": global,
        "systemDefaultRegistry": "",
    }));
    helm_install(
        executor,
        "rancher-monitoring-crd",
        RANCHER_MONITORING_CRD_CHART,
        cluster,
        "cattle-monitoring-system",
        Some(&crd),
    )
    .await?;

    let remote_write = match mimir_url {
        Some(url) => json!([{
            "url": url,
            "writeRelabelConfigs": [{
                "sourceLabels": ["__name__"],
                "regex": "(node_namespace_pod_container|node_cpu|node_load|node_memory|node_network_receive_bytes_total|container_network_receive_bytes_total|cgroups_).*",
                "action": "keep",
            }],
        }]),
        None => json!([]),
    };

    let monitoring = values(json!({
        "alertmanager": {"enabled": "false"},
        "grafana": restrictions,
        "prometheus": {
            "prometheusSpec": {
                "evaluationInterval": "1m",
                "nodeSelector": restrictions.get("nodeSelector"),
                "tolerations": restrictions.get("tolerations"),
                "resources": {"limits": {"memory": "5000Mi"}},
                "retentionSize": "50GiB",
                "scrapeInterval": "1m",
                "additionalScrapeConfigs": [{
                    "job_name": "node-cgroups-exporter",
                    "honor_labels": false,
                    "kubernetes_sd_configs": [{"role": "node"}],
                    "scheme": "http",
                    "relabel_configs": [
                        {"action": "labelmap", "regex": "__meta_kubernetes_node_label_(.+)"},
                        {
                            "source_labels": ["__address__"],
                            "action": "replace",
                            "target_label": "__address__",
                            "regex": "([^:;]+):(\\d+)",
                            "replacement": "${1}:9753",
                        },
                        {"source_labels": ["__meta_kubernetes_node_name"], "action": "keep", "regex": ".*"},
                        {
                            "source_labels": ["__meta_kubernetes_node_name"],
                            "action": "replace",
                            "target_label": "node",
                            "regex": "(.*)",
                            "replacement": "${1}",
                        },
                    ],
                }],
                "remoteWrite": remote_write,
            },
        },
        "prometheus-adapter": restrictions,
        "kube-state-metrics": restrictions,
        "prometheusOperator": restrictions,
        "global": global,
        "systemDefaultRegistry": "",
    }));
    helm_install(
        executor,
        "rancher-monitoring",
        RANCHER_MONITORING_CHART,
        cluster,
        "cattle-monitoring-system",
        Some(&monitoring),
    )
    .await
}

/// Helm values are always a JSON object
fn values(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Follow `path` through nested objects to a string leaf
fn json_str(map: &Map<String, Value>, path: &[&str]) -> Result<String, SoilError> {
    let mut current: Option<&Value> = None;
    for (i, key) in path.iter().enumerate() {
        current = if i == 0 {
            map.get(*key)
        } else {
            current.and_then(|v| v.get(*key))
        };
    }
    current
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            SoilError::Provision(format!("kubectl output has no string at '{}'", path.join(".")))
        })
}
