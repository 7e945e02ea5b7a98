#![allow(dead_code)]

use std::collections::BTreeMap;
use std::time::Duration;

use runherd::config::{ConfigFile, DefaultsSection, RawConfigFile, RunConfig, ServerSection};
use runherd::supervisor::RunSettings;
use runherd::types::ReplacePolicy;

/// Settings with short graces and no heartbeat, so tests finish quickly.
pub fn quick_settings() -> RunSettings {
    RunSettings {
        timeout: Duration::from_secs(30),
        heartbeat: None,
        kill_grace: Duration::from_millis(300),
        replace_policy: ReplacePolicy::Replace,
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                server: ServerSection::default(),
                defaults: DefaultsSection::default(),
                run: BTreeMap::new(),
            },
        }
    }

    pub fn with_run(mut self, name: &str, run: RunConfig) -> Self {
        self.config.run.insert(name.to_string(), run);
        self
    }

    pub fn with_bind(mut self, bind: &str) -> Self {
        self.config.server.bind = bind.to_string();
        self
    }

    pub fn with_default_timeout(mut self, timeout: &str) -> Self {
        self.config.defaults.timeout = timeout.to_string();
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: &str) -> Self {
        self.config.defaults.heartbeat = heartbeat.to_string();
        self
    }

    pub fn with_kill_grace(mut self, grace: &str) -> Self {
        self.config.defaults.kill_grace = grace.to_string();
        self
    }

    pub fn with_replace_policy(mut self, policy: ReplacePolicy) -> Self {
        self.config.defaults.replace_policy = policy;
        self
    }

    pub fn with_default_env(mut self, key: &str, value: &str) -> Self {
        self.config.defaults.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `RunConfig`.
pub struct RunConfigBuilder {
    run: RunConfig,
}

impl RunConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            run: RunConfig {
                cmd: cmd.to_string(),
                args: vec![],
                env: BTreeMap::new(),
                cwd: None,
                timeout: None,
            },
        }
    }

    /// `sh -c <script>`.
    pub fn shell(script: &str) -> Self {
        Self::new("sh").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.run.args.push(arg.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.run.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn cwd(mut self, dir: &str) -> Self {
        self.run.cwd = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.run.timeout = Some(timeout.to_string());
        self
    }

    pub fn build(self) -> RunConfig {
        self.run
    }
}
