#[cfg(test)]
mod tests {
    use std::io::Write;
    use warden_config::schema::*;
    use warden_config::{ConfigLoader, normalize_cron};
    use warden_core::{ActionType, RiskLevel, Tier};

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_ledger_config_defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.default_ttl_hours, 24);
        assert_eq!(config.auto_approve_grace_minutes, 30);
        assert_eq!(config.stale_claim_secs, 3600);
    }

    #[test]
    fn test_scheduler_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.diagnostics.cron, "*/5 * * * *");
        assert_eq!(config.remediation.cron, "*/15 * * * *");
        assert_eq!(config.maintenance.cron, "0 2 * * *");
        assert!(config.dispatch_approved);
        assert!(config.tier(Tier::Remediation).enabled);
    }

    #[test]
    fn test_retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_backoff_ms, 500);
    }

    #[test]
    fn test_default_config_is_valid() {
        let warnings = WardenConfig::default().validate().unwrap();
        assert!(warnings.iter().all(|w| w.severity != WarningSeverity::Error));
    }

    #[test]
    fn test_timeout_for_action_type() {
        let config = ExecutionConfig::default();
        assert_eq!(config.timeout_for(ActionType::Deployment).as_secs(), 900);
        assert_eq!(config.timeout_for(ActionType::CommandExecution).as_secs(), 300);
    }

    // ── TOML tests ─────────────────────────────────────────────

    #[test]
    fn test_config_toml_roundtrip() {
        let config = WardenConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: WardenConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.ledger.default_ttl_hours, config.ledger.default_ttl_hours);
        assert_eq!(restored.scheduler.maintenance.cron, config.scheduler.maintenance.cron);
    }

    #[test]
    fn test_partial_toml_applies_defaults() {
        let toml_str = r#"
[ledger]
auto_approve_grace_minutes = 45

[store]
db_path = "/var/lib/warden/warden.db"
"#;
        let config = ConfigLoader::parse(toml_str).unwrap();
        assert_eq!(config.ledger.auto_approve_grace_minutes, 45);
        assert_eq!(config.ledger.default_ttl_hours, 24);
        assert_eq!(config.execution.timeout_secs, 300);
        assert_eq!(config.scheduler.diagnostics.cron, "*/5 * * * *");
    }

    #[test]
    fn test_candidate_config_deserialize() {
        let toml_str = r#"
[scheduler.diagnostics]
cron = "*/10 * * * *"

[[scheduler.diagnostics.candidates]]
description = "Disk usage"
command = "df -h /"

[[scheduler.remediation.candidates]]
description = "Restart nginx"
command = "systemctl restart nginx"
action_type = "system_modification"
risk_level = "medium"
flag_on_failure = false
"#;
        let config = ConfigLoader::parse(toml_str);
        // remediation table without cron is rejected: cron is mandatory per tier table.
        assert!(config.is_err());

        let toml_str = r#"
[[scheduler.diagnostics.candidates]]
description = "Disk usage"
command = "df -h /"
"#;
        // candidates alone without the tier cron key are also rejected
        assert!(ConfigLoader::parse(toml_str).is_err());

        let toml_str = r#"
[scheduler.diagnostics]
cron = "*/10 * * * *"

[[scheduler.diagnostics.candidates]]
description = "Disk usage"
command = "df -h /"

[scheduler.remediation]
cron = "*/15 * * * *"

[[scheduler.remediation.candidates]]
description = "Restart nginx"
command = "systemctl restart nginx"
action_type = "system_modification"
risk_level = "medium"
flag_on_failure = false
"#;
        let config = ConfigLoader::parse(toml_str).unwrap();
        let diag = &config.scheduler.diagnostics.candidates[0];
        assert_eq!(diag.action_type, ActionType::CommandExecution);
        assert_eq!(diag.risk_level, RiskLevel::Low);
        assert!(diag.flag_on_failure);
        let rem = &config.scheduler.remediation.candidates[0];
        assert_eq!(rem.action_type, ActionType::SystemModification);
        assert_eq!(rem.risk_level, RiskLevel::Medium);
        assert!(!rem.flag_on_failure);
    }

    // ── Validation tests ───────────────────────────────────────

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let mut config = WardenConfig::default();
        config.ledger.default_ttl_hours = 0;
        let err = config.validate().unwrap_err();
        assert!(err.contains("ledger.default_ttl_hours"));
    }

    #[test]
    fn test_validate_rejects_bad_cron() {
        let mut config = WardenConfig::default();
        config.scheduler.remediation.cron = "every now and then".into();
        let err = config.validate().unwrap_err();
        assert!(err.contains("scheduler.remediation.cron"));
    }

    #[test]
    fn test_validate_ignores_cron_of_disabled_tier() {
        let mut config = WardenConfig::default();
        config.scheduler.maintenance.enabled = false;
        config.scheduler.maintenance.cron = "nope".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_critical_candidate_without_rollback() {
        let mut config = WardenConfig::default();
        config.scheduler.maintenance.candidates.push(CandidateConfig {
            description: "Kernel upgrade".into(),
            command: "apt-get -y dist-upgrade".into(),
            rollback_command: None,
            action_type: ActionType::SystemModification,
            risk_level: RiskLevel::Critical,
            flag_on_failure: false,
        });
        let err = config.validate().unwrap_err();
        assert!(err.contains("rollback_command"));
    }

    #[test]
    fn test_validate_warns_on_risky_diagnostic() {
        let mut config = WardenConfig::default();
        config.scheduler.diagnostics.candidates.push(CandidateConfig {
            description: "Prune images".into(),
            command: "docker image prune -f".into(),
            rollback_command: None,
            action_type: ActionType::CommandExecution,
            risk_level: RiskLevel::Medium,
            flag_on_failure: true,
        });
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| w.message.contains("read-only")));
    }

    #[test]
    fn test_validate_zero_max_attempts() {
        let mut config = WardenConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_stale_claim_must_outlast_timeouts() {
        let mut config = WardenConfig::default();
        config.ledger.stale_claim_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.contains("ledger.stale_claim_secs"));

        let mut config = WardenConfig::default();
        config.execution.timeout_secs = 7200;
        let err = config.validate().unwrap_err();
        assert!(err.contains("ledger.stale_claim_secs"));

        let mut config = WardenConfig::default();
        config.ledger.stale_claim_secs = config.execution.deployment_timeout_secs;
        assert!(config.validate().is_err());
        config.ledger.stale_claim_secs += 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_huge_durations_without_overflow() {
        let mut config = WardenConfig::default();
        config.ledger.default_ttl_hours = u64::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.contains("ledger.default_ttl_hours"));

        let mut config = WardenConfig::default();
        config.ledger.auto_approve_grace_minutes = u64::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.contains("ledger.auto_approve_grace_minutes"));

        let mut config = WardenConfig::default();
        config.execution.deployment_timeout_secs = u64::MAX;
        config.ledger.stale_claim_secs = u64::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.contains("execution.timeout_secs"));
    }

    // ── Cron normalization ─────────────────────────────────────

    #[test]
    fn test_normalize_cron() {
        assert_eq!(normalize_cron("*/5 * * * *"), "0 */5 * * * *");
        assert_eq!(normalize_cron(" 0 2 * * * "), "0 0 2 * * *");
        assert_eq!(normalize_cron("30 0 2 * * *"), "30 0 2 * * *");
    }

    // ── ConfigLoader tests ─────────────────────────────────────

    #[test]
    fn test_loader_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[execution]\ntimeout_secs = 42").unwrap();

        let loader = ConfigLoader::load(Some(&path)).unwrap();
        assert_eq!(loader.path(), path.as_path());
        assert_eq!(loader.get().execution.timeout_secs, 42);
    }

    #[test]
    fn test_loader_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let loader = ConfigLoader::load(Some(&path)).unwrap();
        assert_eq!(loader.get().ledger.default_ttl_hours, 24);
    }

    #[test]
    fn test_loader_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.toml");
        std::fs::write(&path, "[ledger]\ndefault_ttl_hours = 0\n").unwrap();
        assert!(ConfigLoader::load(Some(&path)).is_err());
    }

    #[test]
    fn test_loader_rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("warden.toml");
        std::fs::write(&path, "[ledger\n").unwrap();
        let err = ConfigLoader::load(Some(&path)).err().unwrap();
        assert!(err.to_string().contains("failed to parse"));
    }
}
