//! Deployment kinds and their terraform parameters

use crate::errors::SoilError;

/// Provisioning parameters for one kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kind {
    pub name: &'static str,
    /// Terraform configuration, relative to the cloned repository
    pub terraform_work_dir: &'static str,
    /// Var file; a leading `/` means relative to the cloned repository
    pub terraform_var_file: &'static str,
}

pub const KINDS: &[Kind] = &[
    Kind {
        name: "k3d",
        terraform_work_dir: "terraform/main/k3d",
        terraform_var_file: "",
    },
    Kind {
        name: "ssh",
        terraform_work_dir: "terraform/main/ssh",
        terraform_var_file: "/terraform/examples/ssh.tfvars.json",
    },
    Kind {
        name: "aws",
        terraform_work_dir: "terraform/main/aws",
        terraform_var_file: "",
    },
];

pub const DEFAULT_KIND: &str = "k3d";

impl Kind {
    pub fn lookup(name: &str) -> Result<&'static Kind, SoilError> {
        KINDS
            .iter()
            .find(|kind| kind.name == name)
            .ok_or_else(|| SoilError::UnknownKind(name.to_string()))
    }

    /// Local k3d clusters run a single Rancher replica
    pub fn rancher_replicas(&self) -> i64 {
        if self.name == "k3d" {
            1
        } else {
            3
        }
    }
}
