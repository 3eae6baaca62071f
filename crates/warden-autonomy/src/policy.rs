use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use warden_config::schema::LedgerConfig;
use warden_core::{ActionOrigin, ActionSpec, ActionType, AutonomyDecision, RiskLevel};

/// Everything the policy decides about a proposal at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOutcome {
    pub decision: AutonomyDecision,
    pub requires_checkpoint: bool,
    pub auto_approve_after: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

/// Maps (action type, risk level) to an autonomy decision.
///
/// | risk     | decision                          | auto-approval            |
/// |----------|-----------------------------------|--------------------------|
/// | low      | auto-execute                      | n/a                      |
/// | medium   | require approval                  | after grace, except system modifications |
/// | high     | require approval + checkpoint     | never                    |
/// | critical | require approval + checkpoint     | never                    |
#[derive(Debug, Clone, Copy)]
pub struct RiskPolicyEngine {
    grace: Duration,
    ttl: Duration,
}

impl Default for RiskPolicyEngine {
    fn default() -> Self {
        Self::from_config(&LedgerConfig::default())
    }
}

impl RiskPolicyEngine {
    pub fn new(grace: Duration, ttl: Duration) -> Self {
        Self { grace, ttl }
    }

    /// Out-of-range values saturate to the longest representable span;
    /// `WardenConfig::validate` rejects them before they get here.
    pub fn from_config(config: &LedgerConfig) -> Self {
        let minutes = i64::try_from(config.auto_approve_grace_minutes)
            .ok()
            .and_then(Duration::try_minutes);
        let hours = i64::try_from(config.default_ttl_hours)
            .ok()
            .and_then(Duration::try_hours);
        Self::new(
            minutes.unwrap_or(Duration::MAX),
            hours.unwrap_or(Duration::MAX),
        )
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The bare decision table. Pure and total over every type/risk pair.
    pub fn decide(action_type: ActionType, risk_level: RiskLevel) -> AutonomyDecision {
        match (risk_level, action_type) {
            (RiskLevel::Low, _) => AutonomyDecision::AutoExecute,
            (RiskLevel::Medium, _) => AutonomyDecision::RequireApproval,
            (RiskLevel::High | RiskLevel::Critical, _) => {
                AutonomyDecision::RequireApprovalWithCheckpoint
            }
        }
    }

    /// Whether a still-pending action of this shape may be approved by the
    /// system once the grace period has passed.
    pub fn grace_eligible(action_type: ActionType, risk_level: RiskLevel) -> bool {
        risk_level == RiskLevel::Medium && action_type != ActionType::SystemModification
    }

    /// Apply the decision table to a full proposal.
    ///
    /// Collaboration requests are held for an explicit human decision:
    /// auto-execute becomes require-approval and no grace period is granted.
    pub fn evaluate(&self, spec: &ActionSpec, now: DateTime<Utc>) -> PolicyOutcome {
        let collaborative = spec.origin == ActionOrigin::Collaboration;

        let mut decision = Self::decide(spec.action_type, spec.risk_level);
        if collaborative && decision == AutonomyDecision::AutoExecute {
            decision = AutonomyDecision::RequireApproval;
        }

        let auto_approve_after = (!collaborative
            && Self::grace_eligible(spec.action_type, spec.risk_level))
        .then(|| offset(now, self.grace));

        PolicyOutcome {
            decision,
            requires_checkpoint: decision == AutonomyDecision::RequireApprovalWithCheckpoint
                && spec.action_type.is_reversible(),
            auto_approve_after,
            expires_at: offset(now, self.ttl),
        }
    }
}

fn offset(now: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    now.checked_add_signed(span).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
