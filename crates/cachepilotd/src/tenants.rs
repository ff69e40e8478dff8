//! Tenant directory discovery
//!
//! Each tenant is a directory under tenants_dir holding a `config.env`
//! (`KEY=VALUE`, `#` comments). Names and paths are re-validated on every
//! scan; anything that fails is skipped, never trusted.

use cachepilot_common::{
    parse_memory_limit, parse_port_number, validate_path, validate_tenant_name_strict,
    ValidationError,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::collaborators::StepResult;

pub const TENANT_CONFIG_FILE: &str = "config.env";

/// Marker enabling the automated backup sweep for a tenant
pub const BACKUP_MARKER: &str = "backup.enabled";

const DEFAULT_MAXMEMORY_MB: u32 = 256;
const DEFAULT_DOCKER_LIMIT_MB: u32 = 512;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantConfig {
    values: BTreeMap<String, String>,
}

impl TenantConfig {
    pub fn parse(content: &str) -> Self {
        let values = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .filter_map(|l| l.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn port(&self) -> Option<u16> {
        self.get("PORT").and_then(|p| parse_port_number(p).ok())
    }

    pub fn maxmemory_mb(&self) -> u32 {
        self.get("MAXMEMORY")
            .and_then(|m| parse_memory_limit(m).ok())
            .unwrap_or(DEFAULT_MAXMEMORY_MB)
    }

    pub fn docker_limit_mb(&self) -> u32 {
        self.get("DOCKER_LIMIT")
            .and_then(|m| m.parse().ok())
            .unwrap_or(DEFAULT_DOCKER_LIMIT_MB)
    }

    pub fn password(&self) -> Option<&str> {
        self.get("PASSWORD")
            .or_else(|| self.get("REDIS_PASSWORD"))
            .filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct Tenant {
    pub name: String,
    /// Canonical, contained in tenants_dir
    pub dir: PathBuf,
    pub config: TenantConfig,
}

impl Tenant {
    /// Container name used by the provisioning engine
    pub fn container_name(&self) -> String {
        format!("redis-{}", self.name)
    }

    pub fn backup_enabled(&self) -> bool {
        self.dir.join(BACKUP_MARKER).is_file()
    }
}

/// Tenants under `tenants_dir`, sorted by name. A missing directory is empty.
pub fn list_tenants(tenants_dir: &Path) -> StepResult<Vec<Tenant>> {
    if !tenants_dir.exists() {
        return Ok(Vec::new());
    }

    let mut tenants = Vec::new();
    for entry in fs::read_dir(tenants_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let raw_name = entry.file_name().to_string_lossy().into_owned();

        match load_tenant(tenants_dir, &raw_name) {
            Ok(tenant) => tenants.push(tenant),
            Err(e) => warn!("[TENANT] Skipping '{}': {}", raw_name, e),
        }
    }

    tenants.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(tenants)
}

fn load_tenant(tenants_dir: &Path, raw_name: &str) -> Result<Tenant, ValidationError> {
    let name = validate_tenant_name_strict(raw_name)?.to_string();
    let dir = validate_path(&name, &tenants_dir.to_string_lossy())?;

    let config = match fs::read_to_string(dir.join(TENANT_CONFIG_FILE)) {
        Ok(content) => TenantConfig::parse(&content),
        Err(_) => {
            warn!("[TENANT] {} has no {}", name, TENANT_CONFIG_FILE);
            TenantConfig::default()
        }
    };

    Ok(Tenant { name, dir, config })
}
