use warden_core::{ActionSpec, ActionType, RiskLevel, Result, WardenError};

/// One check applied to a proposal before it enters the ledger.
pub trait SpecRule: Send + Sync {
    fn name(&self) -> &str;
    /// `Err(reason)` rejects the proposal.
    fn check(&self, spec: &ActionSpec) -> std::result::Result<(), String>;
}

/// Fields every proposal must carry.
struct RequiredFields;

impl SpecRule for RequiredFields {
    fn name(&self) -> &str {
        "required_fields"
    }

    fn check(&self, spec: &ActionSpec) -> std::result::Result<(), String> {
        if spec.command.trim().is_empty() {
            return Err("command must not be empty".into());
        }
        if spec.description.trim().is_empty() {
            return Err("description must not be empty".into());
        }
        if spec.requested_by.trim().is_empty() {
            return Err("requested_by must not be empty".into());
        }
        if spec
            .rollback_command
            .as_deref()
            .is_some_and(|r| r.trim().is_empty())
        {
            return Err("rollback_command, when given, must not be empty".into());
        }
        Ok(())
    }
}

/// Reversible changes at or above `min_risk` must ship their own undo.
struct RollbackRequired {
    min_risk: RiskLevel,
}

impl SpecRule for RollbackRequired {
    fn name(&self) -> &str {
        "rollback_required"
    }

    fn check(&self, spec: &ActionSpec) -> std::result::Result<(), String> {
        if spec.risk_level >= self.min_risk && spec.rollback_command.is_none() {
            return Err(format!(
                "{} {} actions require a rollback_command",
                spec.risk_level, spec.action_type
            ));
        }
        Ok(())
    }
}

static COMMAND_RULES: [&dyn SpecRule; 1] = [&RequiredFields];
static REVERSIBLE_RULES: [&dyn SpecRule; 2] = [
    &RequiredFields,
    &RollbackRequired {
        min_risk: RiskLevel::Critical,
    },
];

/// The rules bound to each action type.
pub fn rules_for(action_type: ActionType) -> &'static [&'static dyn SpecRule] {
    match action_type {
        ActionType::CommandExecution => &COMMAND_RULES,
        ActionType::Deployment
        | ActionType::ConfigurationChange
        | ActionType::SystemModification => &REVERSIBLE_RULES,
    }
}

/// Run every rule for the proposal's type; the first failure wins.
pub fn validate(spec: &ActionSpec) -> Result<()> {
    for rule in rules_for(spec.action_type) {
        if let Err(reason) = rule.check(spec) {
            tracing::debug!(rule = rule.name(), %reason, "proposal rejected");
            return Err(WardenError::Validation(reason));
        }
    }
    Ok(())
}
