//! Deployment profile: one parameterized description of where the pipeline
//! runs and where its sink data is crawled from.
//!
//! A profile never provisions anything. [`DeploymentProfile::plan`] renders the
//! ordered list of resources a deployment tool would create, so every
//! environment differs only in its profile values.

use figment::{Figment, providers::{Format, Yaml}};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;

use crate::error::EdgelogError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentProfile {
    /// Prepended to every resource name (`demo` → `demoVpc`).
    pub name_prefix: String,
    #[serde(default = "default_vpc_cidr")]
    pub vpc_cidr: String,
    #[serde(default = "default_max_azs")]
    pub max_azs: u8,
    #[serde(default)]
    pub container: ContainerSizing,
    /// Where the log router delivers sink data, e.g. `s3://bucket/app-logs/`.
    pub log_destination: String,
    /// Crawl schedule, `cron(0 * * * ? *)` or `rate(1 hour)`.
    #[serde(default = "default_crawl_schedule")]
    pub crawl_schedule: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSizing {
    /// CPU units (256 = 0.25 vCPU).
    #[serde(default = "default_cpu")]
    pub cpu: u32,
    #[serde(default = "default_memory")]
    pub memory_mib: u32,
    #[serde(default = "default_desired_count")]
    pub desired_count: u32,
    #[serde(default = "default_container_port")]
    pub container_port: u16,
}

/// One resource in a rendered plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedResource {
    pub kind: String,
    pub name: String,
    pub properties: Value,
}

fn default_vpc_cidr() -> String { "10.0.0.0/16".into() }
fn default_max_azs() -> u8 { 2 }
fn default_crawl_schedule() -> String { "cron(0 * * * ? *)".into() }
fn default_cpu() -> u32 { 256 }
fn default_memory() -> u32 { 512 }
fn default_desired_count() -> u32 { 1 }
fn default_container_port() -> u16 { 3000 }

impl Default for ContainerSizing {
    fn default() -> Self {
        Self {
            cpu: default_cpu(),
            memory_mib: default_memory(),
            desired_count: default_desired_count(),
            container_port: default_container_port(),
        }
    }
}

/// `prefix` + `kind` with the first letter of `kind` upper-cased.
pub fn resource_name(prefix: &str, kind: &str) -> String {
    let mut chars = kind.chars();
    match chars.next() {
        Some(first) => format!("{prefix}{}{}", first.to_uppercase(), chars.as_str()),
        None => prefix.to_string(),
    }
}

impl DeploymentProfile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let profile: DeploymentProfile = Figment::new().merge(Yaml::file(path)).extract()?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), EdgelogError> {
        if self.name_prefix.is_empty()
            || !self.name_prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(EdgelogError::Config(format!(
                "name_prefix {:?} must be non-empty ASCII alphanumerics or '-'",
                self.name_prefix
            )));
        }
        self.network()?;
        if self.max_azs == 0 {
            return Err(EdgelogError::Config("max_azs must be at least 1".into()));
        }
        if !valid_task_size(self.container.cpu, self.container.memory_mib) {
            return Err(EdgelogError::Config(format!(
                "unsupported task size: {} cpu / {} MiB",
                self.container.cpu, self.container.memory_mib
            )));
        }
        if self.log_destination.trim().is_empty() {
            return Err(EdgelogError::Config("log_destination must not be empty".into()));
        }
        validate_schedule(&self.crawl_schedule)?;
        Ok(())
    }

    fn network(&self) -> Result<Ipv4Net, EdgelogError> {
        let net: Ipv4Net = self
            .vpc_cidr
            .parse()
            .map_err(|e| EdgelogError::Config(format!("vpc_cidr {:?}: {e}", self.vpc_cidr)))?;
        // Public subnets are carved as /24s, one per AZ.
        if net.prefix_len() > 24 - subnet_bits(self.max_azs) {
            return Err(EdgelogError::Config(format!(
                "vpc_cidr {} is too small for {} /24 subnets",
                net, self.max_azs
            )));
        }
        Ok(net)
    }

    pub fn name(&self, kind: &str) -> String {
        resource_name(&self.name_prefix, kind)
    }

    /// Render the ordered resource list for this profile.
    pub fn plan(&self) -> Result<Vec<PlannedResource>, EdgelogError> {
        self.validate()?;
        let net = self.network()?;
        let subnets: Vec<String> = net
            .subnets(24)
            .map_err(|e| EdgelogError::Internal(e.to_string()))?
            .take(self.max_azs as usize)
            .map(|s| s.to_string())
            .collect();

        let c = &self.container;
        let resources = vec![
            self.resource("vpc", json!({
                "cidr": net.to_string(),
                "max_azs": self.max_azs,
                "nat_gateways": 0,
                "public_subnets": subnets,
            })),
            self.resource("fargateSecurityGroup", json!({
                "vpc": self.name("vpc"),
                "ingress": [
                    { "port": 80, "source": "0.0.0.0/0" },
                    { "port": 443, "source": "0.0.0.0/0" },
                ],
            })),
            self.resource("taskRole", json!({
                "assumed_by": "ecs-tasks.amazonaws.com",
                "actions": ["s3:PutObject", "s3:GetObject", "s3:ListBucket"],
            })),
            self.resource("logBucket", json!({
                "block_public_access": true,
                "auto_delete_objects": true,
            })),
            self.resource("imageBucket", json!({
                "block_public_access": true,
                "cors_methods": ["PUT", "POST", "GET", "DELETE"],
            })),
            self.resource("cluster", json!({ "vpc": self.name("vpc") })),
            self.resource("service", json!({
                "cluster": self.name("cluster"),
                "cpu": c.cpu,
                "memory_mib": c.memory_mib,
                "desired_count": c.desired_count,
                "container_port": c.container_port,
                "security_group": self.name("fargateSecurityGroup"),
                "task_role": self.name("taskRole"),
            })),
            self.resource("logRouter", json!({
                "service": self.name("service"),
                "source": "stdout",
                "destination": self.log_destination,
            })),
            self.resource("crawler", json!({
                "target": self.log_destination,
                "schedule": self.crawl_schedule,
                "format": "json",
            })),
        ];
        Ok(resources)
    }

    fn resource(&self, kind: &str, properties: Value) -> PlannedResource {
        PlannedResource {
            kind: kind.to_string(),
            name: self.name(kind),
            properties,
        }
    }
}

fn subnet_bits(azs: u8) -> u8 {
    let mut bits = 0;
    while (1u16 << bits) < azs as u16 {
        bits += 1;
    }
    bits
}

/// Container task sizes the platform accepts.
fn valid_task_size(cpu: u32, memory_mib: u32) -> bool {
    match cpu {
        256 => matches!(memory_mib, 512 | 1024 | 2048),
        512 => (1024..=4096).contains(&memory_mib) && memory_mib % 1024 == 0,
        1024 => (2048..=8192).contains(&memory_mib) && memory_mib % 1024 == 0,
        2048 => (4096..=16384).contains(&memory_mib) && memory_mib % 1024 == 0,
        4096 => (8192..=30720).contains(&memory_mib) && memory_mib % 1024 == 0,
        _ => false,
    }
}

fn validate_schedule(schedule: &str) -> Result<(), EdgelogError> {
    let bad = || EdgelogError::Config(format!("crawl_schedule {schedule:?} is not cron(...) or rate(...)"));

    if let Some(inner) = schedule.strip_prefix("cron(").and_then(|s| s.strip_suffix(')')) {
        if inner.split_whitespace().count() == 6 {
            return Ok(());
        }
        return Err(bad());
    }
    if let Some(inner) = schedule.strip_prefix("rate(").and_then(|s| s.strip_suffix(')')) {
        let mut parts = inner.split_whitespace();
        let (Some(n), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(bad());
        };
        let n: u32 = n.parse().map_err(|_| bad())?;
        let ok = match unit {
            "minute" | "hour" | "day" => n == 1,
            "minutes" | "hours" | "days" => n > 1,
            _ => false,
        };
        return if ok { Ok(()) } else { Err(bad()) };
    }
    Err(bad())
}
