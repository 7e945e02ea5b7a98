// src/config/validate.rs

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::model::{CatalogEntry, ConfigFile, DefaultsSection, RawConfigFile, RunDefaults};
use crate::errors::{Result, RunherdError};
use crate::exec::LaunchSpec;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::RunherdError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_server(&raw)?;
        let defaults = resolve_defaults(&raw.defaults)?;
        let catalog = resolve_catalog(&raw, &defaults)?;
        Ok(ConfigFile::new_unchecked(raw.server, defaults, catalog))
    }
}

fn validate_server(cfg: &RawConfigFile) -> Result<()> {
    if cfg.server.bind.trim().is_empty() {
        return Err(RunherdError::ConfigError(
            "[server].bind must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn resolve_defaults(section: &DefaultsSection) -> Result<RunDefaults> {
    let timeout = non_zero("[defaults].timeout", &section.timeout)?;
    let kill_grace = non_zero("[defaults].kill_grace", &section.kill_grace)?;

    // A zero heartbeat interval switches heartbeats off.
    let heartbeat = duration("[defaults].heartbeat", &section.heartbeat)?;
    let heartbeat = (!heartbeat.is_zero()).then_some(heartbeat);

    Ok(RunDefaults {
        timeout,
        heartbeat,
        kill_grace,
        cwd: section.cwd.clone(),
        replace_policy: section.replace_policy,
        env: section.env.clone(),
    })
}

fn resolve_catalog(
    cfg: &RawConfigFile,
    defaults: &RunDefaults,
) -> Result<BTreeMap<String, CatalogEntry>> {
    let mut catalog = BTreeMap::new();

    for (name, run) in cfg.run.iter() {
        if name.trim().is_empty() {
            return Err(RunherdError::ConfigError(
                "run names must not be empty".to_string(),
            ));
        }
        if run.cmd.trim().is_empty() {
            return Err(RunherdError::ConfigError(format!(
                "run '{}' has an empty `cmd`",
                name
            )));
        }

        let timeout = match run.timeout.as_deref() {
            Some(raw) => Some(non_zero(&format!("[run.{name}].timeout"), raw)?),
            None => None,
        };

        let mut env = defaults.env.clone();
        env.extend(run.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        let spec = LaunchSpec {
            program: run.cmd.clone(),
            args: run.args.clone(),
            env,
            cwd: run.cwd.clone().or_else(|| defaults.cwd.clone()),
        };

        catalog.insert(name.clone(), CatalogEntry { spec, timeout });
    }

    Ok(catalog)
}

fn duration(field: &str, raw: &str) -> Result<Duration> {
    parse_duration(raw).map_err(|e| RunherdError::ConfigError(format!("{field}: {e}")))
}

fn non_zero(field: &str, raw: &str) -> Result<Duration> {
    let value = duration(field, raw)?;
    if value.is_zero() {
        return Err(RunherdError::ConfigError(format!(
            "{field} must be greater than zero (got {raw:?})"
        )));
    }
    Ok(value)
}
