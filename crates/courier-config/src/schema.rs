use courier_core::{MAX_CREDENTIAL_TTL_MINUTES, ttl_minutes_to_secs};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration, maps to `courier.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub agent: AgentConfig,
    pub network: NetworkConfig,
    pub polling: PollingConfig,
    pub credential: CredentialConfig,
    pub oracle: OracleConfig,
    pub history: HistoryConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

// ── Agent ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Base64 Ed25519 private key (32-byte seed, optionally prefixed with a
    /// one-byte scheme flag). Can also be set via COURIER_PRIVATE_KEY.
    pub private_key: Option<String>,
}

// ── Network ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Ledger JSON-RPC endpoint.
    pub rpc_url: String,
    /// Envelope-cipher (encryption service) endpoint.
    pub messaging_url: String,
    /// Messaging package id. Also used as the credential scope.
    pub package_id: String,
    /// Module whose events are watched.
    pub event_module: String,
    /// Fully qualified membership capability type.
    /// Defaults to `{package_id}::channel::MemberCap`.
    pub member_cap_type: Option<String>,
    /// Gas budget attached to every reply transaction.
    pub gas_budget: u64,
    /// Per-request timeout for every external HTTP call.
    pub request_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://fullnode.testnet.sui.io:443".into(),
            messaging_url: "http://127.0.0.1:3900".into(),
            package_id: String::new(),
            event_module: "message".into(),
            member_cap_type: None,
            gas_budget: 50_000_000,
            request_timeout_secs: 30,
        }
    }
}

impl NetworkConfig {
    pub fn member_cap_type(&self) -> String {
        self.member_cap_type
            .clone()
            .unwrap_or_else(|| format!("{}::channel::MemberCap", self.package_id))
    }
}

// ── Polling ────────────────────────────────────────────────────

/// When the cursor moves during a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Advance only after the whole batch succeeded; a failure replays the batch.
    #[default]
    Batch,
    /// Advance to each event once it is fully processed.
    PerEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Seconds to sleep between cycles.
    pub interval_secs: u64,
    /// Events requested per page.
    pub page_limit: u32,
    pub delivery: DeliveryMode,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            page_limit: 50,
            delivery: DeliveryMode::Batch,
        }
    }
}

// ── Credential ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    pub ttl_minutes: u64,
    /// Renew this many seconds before the credential expires.
    pub safety_margin_secs: u64,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: 30,
            safety_margin_secs: 60,
        }
    }
}

// ── Reply oracle ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleProvider {
    #[default]
    OpenAi,
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub provider: OracleProvider,
    pub model: String,
    /// Falls back to OPENAI_API_KEY / ANTHROPIC_API_KEY for the selected provider.
    pub api_key: Option<String>,
    /// Override the provider's API base URL (OpenAI-compatible gateways).
    pub base_url: Option<String>,
    pub system_prompt: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Replies longer than this many characters are cut and marked with `...`.
    pub max_reply_chars: usize,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            provider: OracleProvider::OpenAi,
            model: "gpt-4o-mini".into(),
            api_key: None,
            base_url: None,
            system_prompt: None,
            max_tokens: 512,
            temperature: 0.7,
            max_reply_chars: 1000,
        }
    }
}

// ── History ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Records kept per channel for reply context.
    pub max_records: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_records: 10 }
    }
}

// ── Server ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,
    /// Health/status listen address.
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: "127.0.0.1:3800".into(),
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
    /// Log file path (None = stdout only).
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
            file: None,
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "{}: {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, " ({})", h)?;
        }
        Ok(())
    }
}

/// Printed in place of secrets.
pub const REDACTED: &str = "********";

impl CourierConfig {
    /// A copy that is safe to print: secrets are replaced with [`REDACTED`].
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.agent.private_key.is_some() {
            config.agent.private_key = Some(REDACTED.into());
        }
        if config.oracle.api_key.is_some() {
            config.oracle.api_key = Some(REDACTED.into());
        }
        config
    }

    /// Validate the config and return a list of warnings.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Network ───
        for (field, value) in [
            ("network.rpc_url", &self.network.rpc_url),
            ("network.messaging_url", &self.network.messaging_url),
        ] {
            if let Err(e) = url::Url::parse(value) {
                warnings.push(ConfigWarning {
                    field: field.into(),
                    message: format!("'{}' is not a valid URL: {}", value, e),
                    severity: WarningSeverity::Error,
                    hint: Some("Use a full URL such as 'https://fullnode.testnet.sui.io:443'".into()),
                });
            }
        }
        if self.network.package_id.is_empty() {
            warnings.push(ConfigWarning {
                field: "network.package_id".into(),
                message: "package id is not set: the agent cannot start".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set network.package_id or COURIER_PACKAGE_ID".into()),
            });
        }
        if self.network.request_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                field: "network.request_timeout_secs".into(),
                message: "timeout is 0: every request would fail immediately".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 30".into()),
            });
        }

        // ── Polling ───
        if self.polling.interval_secs == 0 {
            warnings.push(ConfigWarning {
                field: "polling.interval_secs".into(),
                message: "poll interval is 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 5".into()),
            });
        }
        if self.polling.page_limit == 0 {
            warnings.push(ConfigWarning {
                field: "polling.page_limit".into(),
                message: "page limit is 0: no events would ever be fetched".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 50".into()),
            });
        }

        // ── Credential ───
        if self.credential.ttl_minutes == 0 {
            warnings.push(ConfigWarning {
                field: "credential.ttl_minutes".into(),
                message: "credential TTL is 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 30".into()),
            });
        } else if self.credential.ttl_minutes > MAX_CREDENTIAL_TTL_MINUTES {
            warnings.push(ConfigWarning {
                field: "credential.ttl_minutes".into(),
                message: format!(
                    "credential TTL of {} minutes exceeds the maximum of {MAX_CREDENTIAL_TTL_MINUTES}",
                    self.credential.ttl_minutes
                ),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 30".into()),
            });
        } else if ttl_minutes_to_secs(self.credential.ttl_minutes)
            .is_none_or(|ttl| self.credential.safety_margin_secs >= ttl)
        {
            warnings.push(ConfigWarning {
                field: "credential.safety_margin_secs".into(),
                message: "safety margin is not shorter than the TTL: every cycle would renew".into(),
                severity: WarningSeverity::Error,
                hint: Some("Keep the margin well below the TTL, e.g. 60s for a 30min TTL".into()),
            });
        }

        // ── Oracle ───
        if self.oracle.model.is_empty() {
            warnings.push(ConfigWarning {
                field: "oracle.model".into(),
                message: "model is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'gpt-4o-mini'".into()),
            });
        }
        if self.oracle.temperature < 0.0 || self.oracle.temperature > 2.0 {
            warnings.push(ConfigWarning {
                field: "oracle.temperature".into(),
                message: format!("temperature {} is out of range", self.oracle.temperature),
                severity: WarningSeverity::Error,
                hint: Some("Temperature must be between 0.0 and 2.0".into()),
            });
        }
        if self.oracle.max_reply_chars < 4 {
            warnings.push(ConfigWarning {
                field: "oracle.max_reply_chars".into(),
                message: "reply limit is too small to hold any text".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 1000".into()),
            });
        }
        if self.oracle.api_key.is_none() {
            warnings.push(ConfigWarning {
                field: "oracle.api_key".into(),
                message: "no API key configured for the reply oracle".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set oracle.api_key, OPENAI_API_KEY, or ANTHROPIC_API_KEY".into()),
            });
        }

        // ── History ───
        if self.history.max_records == 0 {
            warnings.push(ConfigWarning {
                field: "history.max_records".into(),
                message: "history size is 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 10".into()),
            });
        }

        // ── Server ───
        if self.server.enabled && self.server.listen.is_empty() {
            warnings.push(ConfigWarning {
                field: "server.listen".into(),
                message: "listen address is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. '127.0.0.1:3800'".into()),
            });
        }

        // ── Logging ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }

    /// Checks that must pass before the poll loop starts. Failing any of these
    /// is fatal: the process exits without retrying.
    pub fn validate_for_start(&self) -> courier_core::Result<()> {
        match self.agent.private_key.as_deref() {
            None | Some("") => {
                return Err(courier_core::CourierError::ConfigValidation {
                    field: "agent.private_key".into(),
                    reason: "no private key configured (set agent.private_key or COURIER_PRIVATE_KEY)"
                        .into(),
                });
            }
            Some(_) => {}
        }
        if self.network.package_id.is_empty() {
            return Err(courier_core::CourierError::ConfigValidation {
                field: "network.package_id".into(),
                reason: "no messaging package id configured".into(),
            });
        }
        Ok(())
    }
}
