//! Infrastructure template rendering.
//!
//! The template files are fixed text per provider. Plan values reach
//! Terraform through the two variables files, which are serialized JSON, and
//! the bootstrap script is read with `file()` so its contents are never
//! parsed as HCL. The only plan value written into HCL directly is the
//! instance description, which goes through [`hcl_string`].

use serde::Serialize;

use super::escape::hcl_string;
use crate::config::ProvisionConfig;
use crate::domain::{CloudProvider, DeploymentPlan, Result};

pub const MAIN_TF: &str = "main.tf";
pub const VARIABLES_TF: &str = "variables.tf";
pub const OUTPUTS_TF: &str = "outputs.tf";
pub const TFVARS_JSON: &str = "terraform.tfvars.json";
pub const PROVIDER_TFVARS_JSON: &str = "provider.auto.tfvars.json";

const DESCRIPTION_SLOT: &str = "__AUTODEPLOY_DESCRIPTION__";

const GCP_MAIN: &str = r#"terraform {
  required_providers {
    google = {
      source  = "hashicorp/google"
      version = ">= 5.0"
    }
  }
}

provider "google" {
  project = var.project
  region  = var.region
  zone    = var.zone
}

resource "google_compute_firewall" "app" {
  name    = "${var.name_prefix}-web"
  network = "default"

  allow {
    protocol = "tcp"
    ports    = distinct(["80", tostring(var.app_port)])
  }

  source_ranges = ["0.0.0.0/0"]
  target_tags   = [var.name_prefix]
}

resource "google_compute_instance" "app" {
  name         = var.name_prefix
  machine_type = var.machine_class
  description  = __AUTODEPLOY_DESCRIPTION__
  tags         = [var.name_prefix]

  labels = {
    managed-by = "autodeploy"
  }

  boot_disk {
    initialize_params {
      image = var.base_image
      size  = var.disk_size_gb
    }
  }

  network_interface {
    network = "default"
    access_config {}
  }

  metadata = {
    autodeploy-image = coalesce(var.image_reference, "none")
  }

  metadata_startup_script = file("${path.module}/startup.sh")
}
"#;

const AWS_MAIN: &str = r#"terraform {
  required_providers {
    aws = {
      source  = "hashicorp/aws"
      version = ">= 5.0"
    }
  }
}

provider "aws" {
  region = var.region
}

locals {
  arch = can(regex("^[a-z]+[0-9]+g", var.machine_class)) ? "arm64" : "amd64"
}

data "aws_ami" "base" {
  most_recent = true
  owners      = ["099720109477"]

  filter {
    name   = "name"
    values = [replace(var.base_image, "*-server-*", "${local.arch}-server-*")]
  }

  filter {
    name   = "virtualization-type"
    values = ["hvm"]
  }
}

resource "aws_security_group" "app" {
  name        = "${var.name_prefix}-web"
  description = "autodeploy web access"

  ingress {
    from_port   = 80
    to_port     = 80
    protocol    = "tcp"
    cidr_blocks = ["0.0.0.0/0"]
  }

  ingress {
    from_port   = var.app_port
    to_port     = var.app_port
    protocol    = "tcp"
    cidr_blocks = ["0.0.0.0/0"]
  }

  egress {
    from_port   = 0
    to_port     = 0
    protocol    = "-1"
    cidr_blocks = ["0.0.0.0/0"]
  }
}

resource "aws_instance" "app" {
  ami                    = data.aws_ami.base.id
  instance_type          = var.machine_class
  vpc_security_group_ids = [aws_security_group.app.id]
  user_data              = file("${path.module}/startup.sh")

  root_block_device {
    volume_size = var.disk_size_gb
  }

  tags = {
    Name        = var.name_prefix
    Description = __AUTODEPLOY_DESCRIPTION__
    ManagedBy   = "autodeploy"
    Image       = coalesce(var.image_reference, "none")
  }
}
"#;

const VARIABLES: &str = r#"variable "project" {
  type    = string
  default = null
}

variable "region" {
  type = string
}

variable "zone" {
  type    = string
  default = null
}

variable "name_prefix" {
  type = string
}

variable "base_image" {
  type = string
}

variable "app_port" {
  type = number
}

variable "machine_class" {
  type = string
}

variable "disk_size_gb" {
  type = number
}

variable "image_reference" {
  type    = string
  default = null
}
"#;

const GCP_OUTPUTS: &str = r#"output "public_ip" {
  value = google_compute_instance.app.network_interface[0].access_config[0].nat_ip
}

output "app_url" {
  value = "http://${google_compute_instance.app.network_interface[0].access_config[0].nat_ip}:${var.app_port}"
}
"#;

const AWS_OUTPUTS: &str = r#"output "public_ip" {
  value = aws_instance.app.public_ip
}

output "app_url" {
  value = "http://${aws_instance.app.public_ip}:${var.app_port}"
}
"#;

/// Location and naming values taken from configuration rather than the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderVars {
    pub project: Option<String>,
    pub region: String,
    pub zone: Option<String>,
    pub name_prefix: String,
    pub base_image: String,
}

impl ProviderVars {
    pub fn new(provision: &ProvisionConfig, plan: &DeploymentPlan) -> Self {
        ProviderVars {
            project: provision.project.clone(),
            region: provision.provider_region().to_string(),
            zone: match provision.cloud {
                CloudProvider::Gcp => Some(provision.zone.clone()),
                CloudProvider::Aws => None,
            },
            name_prefix: plan.app_name.clone(),
            base_image: provision.provider_base_image().to_string(),
        }
    }
}

/// The rendered template files, keyed by file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerraformFiles {
    pub files: Vec<(&'static str, String)>,
}

pub fn render_terraform(provision: &ProvisionConfig, plan: &DeploymentPlan) -> Result<TerraformFiles> {
    let description = hcl_string(
        MAIN_TF,
        "repo_url",
        &format!("autodeploy {} from {}", plan.app_name, plan.repo_url),
    )?;
    let (main, outputs) = match provision.cloud {
        CloudProvider::Gcp => (GCP_MAIN, GCP_OUTPUTS),
        CloudProvider::Aws => (AWS_MAIN, AWS_OUTPUTS),
    };
    let main = main.replacen(DESCRIPTION_SLOT, &description, 1);
    let tfvars = serde_json::to_string_pretty(&plan.provisioning_vars())?;
    let provider_vars = serde_json::to_string_pretty(&ProviderVars::new(provision, plan))?;

    Ok(TerraformFiles {
        files: vec![
            (MAIN_TF, main),
            (VARIABLES_TF, VARIABLES.to_string()),
            (OUTPUTS_TF, outputs.to_string()),
            (TFVARS_JSON, tfvars + "\n"),
            (PROVIDER_TFVARS_JSON, provider_vars + "\n"),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EnvLine, SizeTier, Strategy};

    fn plan(cloud: CloudProvider) -> DeploymentPlan {
        DeploymentPlan {
            app_name: "autodeploy-demo-abc123".into(),
            repo_url: "https://github.com/acme/demo.git".into(),
            git_ref: None,
            language: "python".into(),
            language_version: None,
            app_port: 8000,
            start_command: "python app.py".into(),
            env_lines: vec![EnvLine::new("PORT", "8000")],
            cloud,
            size_tier: SizeTier::Micro,
            machine_class: cloud.machine_class(SizeTier::Micro).into(),
            disk_size_gb: 20,
            image_reference: None,
            strategy_order: vec![Strategy::LocalImage, Strategy::Native],
        }
    }

    fn file<'a>(files: &'a TerraformFiles, name: &str) -> &'a str {
        files
            .files
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, c)| c.as_str())
            .unwrap()
    }

    #[test]
    fn tfvars_has_exactly_the_provisioning_keys() {
        let files = render_terraform(&ProvisionConfig::default(), &plan(CloudProvider::Gcp)).unwrap();
        let vars: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(file(&files, TFVARS_JSON)).unwrap();
        let mut keys: Vec<&str> = vars.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["app_port", "disk_size_gb", "image_reference", "machine_class"]);
        assert_eq!(vars["app_port"], 8000);
        assert!(vars["image_reference"].is_null());
    }

    #[test]
    fn gcp_template_reads_startup_script_from_file() {
        let files = render_terraform(&ProvisionConfig::default(), &plan(CloudProvider::Gcp)).unwrap();
        let main = file(&files, MAIN_TF);
        assert!(main.contains("metadata_startup_script = file(\"${path.module}/startup.sh\")"));
        assert!(main.contains("description  = \"autodeploy autodeploy-demo-abc123 from https://github.com/acme/demo.git\""));
        assert!(!main.contains(DESCRIPTION_SLOT));
        let provider: serde_json::Value =
            serde_json::from_str(file(&files, PROVIDER_TFVARS_JSON)).unwrap();
        assert_eq!(provider["zone"], "us-central1-a");
        assert_eq!(provider["name_prefix"], "autodeploy-demo-abc123");
    }

    #[test]
    fn aws_template_opens_web_ports() {
        let provision = ProvisionConfig {
            cloud: CloudProvider::Aws,
            ..Default::default()
        };
        let files = render_terraform(&provision, &plan(CloudProvider::Aws)).unwrap();
        let main = file(&files, MAIN_TF);
        assert!(main.contains("from_port   = 80"));
        assert!(main.contains("from_port   = var.app_port"));
        assert!(main.contains("user_data              = file("));
        let provider: serde_json::Value =
            serde_json::from_str(file(&files, PROVIDER_TFVARS_JSON)).unwrap();
        assert_eq!(provider["region"], "us-east-1");
        assert!(provider["zone"].is_null());
    }

    #[test]
    fn template_sequences_in_repo_url_are_neutralised() {
        let mut p = plan(CloudProvider::Gcp);
        p.repo_url = "https://example.com/${jsonencode(var)}/%{ if true }x".into();
        let files = render_terraform(&ProvisionConfig::default(), &p).unwrap();
        let main = file(&files, MAIN_TF);
        assert!(main.contains("$${jsonencode(var)}/%%{ if true }x"));
    }
}
