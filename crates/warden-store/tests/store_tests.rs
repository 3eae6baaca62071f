#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use uuid::Uuid;
    use warden_core::{
        Action, ActionOrigin, ActionStatus, ActionType, AutonomyDecision, ExecutionResult,
        RiskLevel, RollbackOutcome, Tier,
    };
    use warden_store::{ActionFilter, ActionPatch, ActionStore, MemoryStore, SqliteStore};

    fn make_action(risk: RiskLevel, action_type: ActionType) -> Action {
        let now = Utc::now();
        Action {
            id: Uuid::new_v4(),
            action_type,
            status: ActionStatus::Pending,
            risk_level: risk,
            origin: ActionOrigin::Scheduler {
                tier: Tier::Diagnostics,
            },
            autonomy: AutonomyDecision::RequireApproval,
            command: "systemctl status nginx".into(),
            rollback_command: None,
            description: "check nginx".into(),
            requested_by: "agent".into(),
            requested_at: now,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            cancelled_by: None,
            cancelled_at: None,
            cancellation_reason: None,
            claimed_at: None,
            executed_at: None,
            execution_result: None,
            execution_time_ms: None,
            checkpoint_data: None,
            expires_at: now + Duration::hours(24),
            auto_approve_after: None,
            requires_checkpoint: false,
        }
    }

    fn stores() -> Vec<(&'static str, Arc<dyn ActionStore>)> {
        vec![
            ("memory", Arc::new(MemoryStore::new()) as Arc<dyn ActionStore>),
            (
                "sqlite",
                Arc::new(SqliteStore::open_in_memory().unwrap()) as Arc<dyn ActionStore>,
            ),
        ]
    }

    // ── Contract (both backends) ───────────────────────────────

    mod contract {
        use super::*;

        #[tokio::test]
        async fn test_create_and_get() {
            for (name, store) in stores() {
                let action = make_action(RiskLevel::Medium, ActionType::Deployment);
                store.create(&action).await.unwrap();
                let loaded = store.get(action.id).await.unwrap().unwrap();
                assert_eq!(loaded, action, "{name}");
            }
        }

        #[tokio::test]
        async fn test_get_missing_is_none() {
            for (name, store) in stores() {
                assert!(store.get(Uuid::new_v4()).await.unwrap().is_none(), "{name}");
            }
        }

        #[tokio::test]
        async fn test_duplicate_create_fails() {
            for (name, store) in stores() {
                let action = make_action(RiskLevel::Low, ActionType::CommandExecution);
                store.create(&action).await.unwrap();
                assert!(store.create(&action).await.is_err(), "{name}");
            }
        }

        #[tokio::test]
        async fn test_conditional_update_matches_expected_status() {
            for (name, store) in stores() {
                let action = make_action(RiskLevel::Medium, ActionType::CommandExecution);
                store.create(&action).await.unwrap();

                let at = Utc::now();
                let n = store
                    .conditional_update(
                        action.id,
                        ActionStatus::Pending,
                        ActionStatus::Approved,
                        ActionPatch::approved("alice", at),
                    )
                    .await
                    .unwrap();
                assert_eq!(n, 1, "{name}");

                let loaded = store.get(action.id).await.unwrap().unwrap();
                assert_eq!(loaded.status, ActionStatus::Approved);
                assert_eq!(loaded.approved_by.as_deref(), Some("alice"));
                assert_eq!(loaded.approved_at, Some(at));
                assert!(loaded.rejected_by.is_none());
            }
        }

        #[tokio::test]
        async fn test_conditional_update_stale_expected_touches_nothing() {
            for (name, store) in stores() {
                let action = make_action(RiskLevel::Medium, ActionType::CommandExecution);
                store.create(&action).await.unwrap();

                let n = store
                    .conditional_update(
                        action.id,
                        ActionStatus::Approved,
                        ActionStatus::Executing,
                        ActionPatch::claimed(Utc::now()),
                    )
                    .await
                    .unwrap();
                assert_eq!(n, 0, "{name}");
                let loaded = store.get(action.id).await.unwrap().unwrap();
                assert_eq!(loaded, action, "{name}");
            }
        }

        #[tokio::test]
        async fn test_conditional_update_unknown_id_is_zero() {
            for (name, store) in stores() {
                let n = store
                    .conditional_update(
                        Uuid::new_v4(),
                        ActionStatus::Pending,
                        ActionStatus::Cancelled,
                        ActionPatch::default(),
                    )
                    .await
                    .unwrap();
                assert_eq!(n, 0, "{name}");
            }
        }

        #[tokio::test]
        async fn test_second_claim_loses() {
            for (name, store) in stores() {
                let mut action = make_action(RiskLevel::Low, ActionType::CommandExecution);
                action.status = ActionStatus::Approved;
                store.create(&action).await.unwrap();

                let first = store
                    .conditional_update(
                        action.id,
                        ActionStatus::Approved,
                        ActionStatus::Executing,
                        ActionPatch::claimed(Utc::now()),
                    )
                    .await
                    .unwrap();
                let second = store
                    .conditional_update(
                        action.id,
                        ActionStatus::Approved,
                        ActionStatus::Executing,
                        ActionPatch::claimed(Utc::now()),
                    )
                    .await
                    .unwrap();
                assert_eq!((first, second), (1, 0), "{name}");
            }
        }

        #[tokio::test]
        async fn test_finished_patch_round_trips_result() {
            for (name, store) in stores() {
                let mut action = make_action(RiskLevel::High, ActionType::ConfigurationChange);
                action.status = ActionStatus::Executing;
                action.rollback_command = Some("git checkout HEAD~1 -- nginx.conf".into());
                store.create(&action).await.unwrap();

                let result = ExecutionResult {
                    success: false,
                    exit_code: Some(2),
                    stderr: "syntax error".into(),
                    error: Some("command exited with status 2".into()),
                    duration_ms: 42,
                    rollback: Some(RollbackOutcome {
                        command: "git checkout HEAD~1 -- nginx.conf".into(),
                        success: true,
                        exit_code: Some(0),
                        stdout: String::new(),
                        stderr: String::new(),
                        error: None,
                        duration_ms: 7,
                    }),
                    ..Default::default()
                };
                let at = Utc::now();
                store
                    .conditional_update(
                        action.id,
                        ActionStatus::Executing,
                        ActionStatus::Failed,
                        ActionPatch::finished(result.clone(), at),
                    )
                    .await
                    .unwrap();

                let loaded = store.get(action.id).await.unwrap().unwrap();
                assert_eq!(loaded.status, ActionStatus::Failed, "{name}");
                assert_eq!(loaded.executed_at, Some(at));
                assert_eq!(loaded.execution_time_ms, Some(42));
                assert_eq!(loaded.execution_result, Some(result));
            }
        }

        #[tokio::test]
        async fn test_patch_keeps_earlier_fields() {
            for (name, store) in stores() {
                let mut action = make_action(RiskLevel::High, ActionType::Deployment);
                action.status = ActionStatus::Executing;
                action.requires_checkpoint = true;
                store.create(&action).await.unwrap();

                let snapshot = serde_json::json!({"version": "1.4.2"});
                store
                    .conditional_update(
                        action.id,
                        ActionStatus::Executing,
                        ActionStatus::Executing,
                        ActionPatch::checkpoint(snapshot.clone()),
                    )
                    .await
                    .unwrap();
                store
                    .conditional_update(
                        action.id,
                        ActionStatus::Executing,
                        ActionStatus::Failed,
                        ActionPatch::finished(ExecutionResult::default(), Utc::now()),
                    )
                    .await
                    .unwrap();

                let loaded = store.get(action.id).await.unwrap().unwrap();
                assert_eq!(loaded.checkpoint_data, Some(snapshot), "{name}");
            }
        }
    }

    // ── Filters ────────────────────────────────────────────────

    mod filters {
        use super::*;

        #[tokio::test]
        async fn test_list_by_status_and_type() {
            for (name, store) in stores() {
                let a = make_action(RiskLevel::Low, ActionType::CommandExecution);
                let b = make_action(RiskLevel::High, ActionType::Deployment);
                let mut c = make_action(RiskLevel::High, ActionType::Deployment);
                c.status = ActionStatus::Approved;
                for action in [&a, &b, &c] {
                    store.create(action).await.unwrap();
                }

                let pending = store
                    .list(&ActionFilter::status(ActionStatus::Pending))
                    .await
                    .unwrap();
                assert_eq!(pending.len(), 2, "{name}");

                let deployments = store
                    .list(&ActionFilter {
                        action_type: Some(ActionType::Deployment),
                        ..Default::default()
                    })
                    .await
                    .unwrap();
                assert_eq!(deployments.len(), 2, "{name}");

                let high_pending = store
                    .list(&ActionFilter {
                        status: Some(ActionStatus::Pending),
                        risk_level: Some(RiskLevel::High),
                        ..Default::default()
                    })
                    .await
                    .unwrap();
                assert_eq!(high_pending.len(), 1, "{name}");
                assert_eq!(high_pending[0].id, b.id);
            }
        }

        #[tokio::test]
        async fn test_list_oldest_first_with_limit() {
            for (name, store) in stores() {
                let base = Utc::now();
                let mut ids = Vec::new();
                for offset in [3, 1, 2] {
                    let mut action = make_action(RiskLevel::Low, ActionType::CommandExecution);
                    action.requested_at = base + Duration::seconds(offset);
                    ids.push((offset, action.id));
                    store.create(&action).await.unwrap();
                }
                ids.sort();

                let listed = store
                    .list(&ActionFilter::default().with_limit(2))
                    .await
                    .unwrap();
                let listed: Vec<Uuid> = listed.into_iter().map(|a| a.id).collect();
                assert_eq!(listed, vec![ids[0].1, ids[1].1], "{name}");
            }
        }

        #[tokio::test]
        async fn test_executed_window_excludes_unexecuted_rows() {
            for (name, store) in stores() {
                let now = Utc::now();
                let mut inside = make_action(RiskLevel::Low, ActionType::CommandExecution);
                inside.status = ActionStatus::Executed;
                inside.executed_at = Some(now - Duration::hours(1));
                let mut outside = make_action(RiskLevel::Low, ActionType::CommandExecution);
                outside.status = ActionStatus::Executed;
                outside.executed_at = Some(now - Duration::hours(30));
                let never_ran = make_action(RiskLevel::Low, ActionType::CommandExecution);
                for action in [&inside, &outside, &never_ran] {
                    store.create(action).await.unwrap();
                }

                let window = store
                    .list(&ActionFilter::executed_between(
                        now - Duration::hours(24),
                        now,
                    ))
                    .await
                    .unwrap();
                assert_eq!(window.len(), 1, "{name}");
                assert_eq!(window[0].id, inside.id);
            }
        }
    }

    // ── Memory store ───────────────────────────────────────────

    mod memory {
        use super::*;

        #[tokio::test]
        async fn test_offline_store_errors() {
            let store = MemoryStore::new();
            let action = make_action(RiskLevel::Low, ActionType::CommandExecution);
            store.create(&action).await.unwrap();

            store.set_offline(true);
            let err = store.get(action.id).await.unwrap_err();
            assert!(err.is_infrastructure());
            assert!(store.list(&ActionFilter::default()).await.is_err());

            store.set_offline(false);
            assert!(store.get(action.id).await.unwrap().is_some());
            assert_eq!(store.len(), 1);
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
        async fn test_concurrent_claims_single_winner() {
            let store = Arc::new(MemoryStore::new());
            let mut action = make_action(RiskLevel::Low, ActionType::CommandExecution);
            action.status = ActionStatus::Approved;
            store.create(&action).await.unwrap();

            let mut handles = Vec::new();
            for _ in 0..16 {
                let store = store.clone();
                let id = action.id;
                handles.push(tokio::spawn(async move {
                    store
                        .conditional_update(
                            id,
                            ActionStatus::Approved,
                            ActionStatus::Executing,
                            ActionPatch::claimed(Utc::now()),
                        )
                        .await
                        .unwrap()
                }));
            }
            let mut winners = 0;
            for handle in handles {
                winners += handle.await.unwrap();
            }
            assert_eq!(winners, 1);
        }
    }

    // ── SQLite store ───────────────────────────────────────────

    mod sqlite {
        use super::*;

        #[tokio::test]
        async fn test_persists_across_reopen() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("warden.db");

            let action = make_action(RiskLevel::Critical, ActionType::SystemModification);
            {
                let store = SqliteStore::open(&path).unwrap();
                store.create(&action).await.unwrap();
            }

            let store = SqliteStore::open(&path).unwrap();
            let loaded = store.get(action.id).await.unwrap().unwrap();
            assert_eq!(loaded.id, action.id);
            assert_eq!(loaded.risk_level, RiskLevel::Critical);
            assert_eq!(
                loaded.origin,
                ActionOrigin::Scheduler {
                    tier: Tier::Diagnostics
                }
            );
        }

        #[test]
        fn test_audit_log_newest_first() {
            let store = SqliteStore::open_in_memory().unwrap();
            let id = Uuid::new_v4();
            store
                .audit("action_proposed", Some(id), Some("{\"risk\":\"low\"}"))
                .unwrap();
            store.audit("heartbeat", None, None).unwrap();
            store
                .audit("action_terminal", Some(id), Some("{\"status\":\"executed\"}"))
                .unwrap();

            let entries = store.audit_log(10, None).unwrap();
            assert_eq!(entries.len(), 3);
            assert_eq!(entries[0].event_type, "action_terminal");
            assert_eq!(entries[2].event_type, "action_proposed");
            assert_eq!(entries[0].action_id.as_deref(), Some(id.to_string().as_str()));

            let only = store.audit_log(10, Some("heartbeat")).unwrap();
            assert_eq!(only.len(), 1);
            assert!(only[0].details.is_none());

            assert_eq!(store.verify_audit_chain().unwrap(), None);
        }

        #[test]
        fn test_audit_checksums_chain() {
            let store = SqliteStore::open_in_memory().unwrap();
            store.audit("a", None, Some("same")).unwrap();
            store.audit("a", None, Some("same")).unwrap();
            let entries = store.audit_log(2, None).unwrap();
            assert_ne!(entries[0].checksum, entries[1].checksum);
        }
    }
}
