//! Access policy evaluation.
//!
//! I/O (server, user and policy lookups, approval checks) lives in
//! [`PolicyEngine::evaluate`]; choosing the matching policy is the pure
//! function [`select_policy`].

use chrono::NaiveDateTime;
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::approval::ApprovalWorkflow;
use crate::clock::Clock;
use crate::models::{AccessDecision, AccessRequest, Policy, PolicyMiss, Role};
use crate::store::AccessDirectory;

/// Reason given when a lookup fails during evaluation.
pub const LOOKUP_FAILED: &str = "access lookup failed";

/// Pick the matching policy: highest priority first, ties broken by id.
///
/// Policies that miss on role, weekday or time window are skipped and the
/// next one is tried. `None` means nothing matched.
pub fn select_policy(policies: &[Policy], role: Role, local_now: NaiveDateTime) -> Option<&Policy> {
    let mut ordered: Vec<&Policy> = policies.iter().collect();
    ordered.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));

    ordered
        .into_iter()
        .find(|policy| match policy.applies_to(role, local_now) {
            Ok(()) => true,
            Err(PolicyMiss::InvalidWindow(reason)) => {
                warn!(policy_id = %policy.id, %reason, "Skipping policy with invalid time window");
                false
            }
            Err(miss) => {
                debug!(policy_id = %policy.id, ?miss, "Policy does not apply");
                false
            }
        })
}

pub struct PolicyEngine {
    directory: Arc<dyn AccessDirectory>,
    approvals: Arc<ApprovalWorkflow>,
    clock: Arc<dyn Clock>,
    /// Zone in which weekdays and time windows are read
    timezone: Tz,
}

impl PolicyEngine {
    pub fn new(
        directory: Arc<dyn AccessDirectory>,
        approvals: Arc<ApprovalWorkflow>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            directory,
            approvals,
            clock,
            timezone: Tz::UTC,
        }
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Evaluate an access request. Never fails: any lookup error becomes a
    /// denial.
    pub async fn evaluate(&self, request: &AccessRequest) -> AccessDecision {
        let decision = match self.try_evaluate(request).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(
                    requester_id = %request.requester_id,
                    server_id = %request.target_server_id,
                    error = %e,
                    "Access lookup failed, denying"
                );
                AccessDecision::deny(LOOKUP_FAILED)
            }
        };

        info!(
            target: "warden::audit",
            requester_id = %request.requester_id,
            requester_role = %request.requester_role,
            server_id = %request.target_server_id,
            client_ip = request.client_ip.as_deref().unwrap_or("-"),
            allowed = decision.allowed,
            requires_approval = decision.requires_approval,
            policy_id = decision.policy_id.as_deref().unwrap_or("-"),
            reason = %decision.reason,
            "Access decision"
        );
        decision
    }

    async fn try_evaluate(&self, request: &AccessRequest) -> anyhow::Result<AccessDecision> {
        let server = match self.directory.server(&request.target_server_id).await? {
            None => return Ok(AccessDecision::deny("Server not found")),
            Some(server) if !server.is_active => {
                return Ok(AccessDecision::deny("Server is inactive"));
            }
            Some(server) => server,
        };

        let user = match self.directory.user(&request.requester_id).await? {
            None => return Ok(AccessDecision::deny("Requester not found")),
            Some(user) if !user.is_active => {
                return Ok(AccessDecision::deny("Requester account is inactive"));
            }
            Some(user) => user,
        };

        // The directory is authoritative for roles.
        if user.role != request.requester_role {
            return Ok(AccessDecision::deny("Requester role does not match directory"));
        }

        if user.role.is_admin() {
            return Ok(AccessDecision::admin_override());
        }

        let policies = self.directory.policies_for_server(&server.id).await?;
        if policies.is_empty() {
            return Ok(AccessDecision::deny("No active policy for server"));
        }

        let local_now = self
            .clock
            .now()
            .with_timezone(&self.timezone)
            .naive_local();
        let Some(policy) = select_policy(&policies, user.role, local_now) else {
            return Ok(AccessDecision::deny("No matching policy"));
        };

        if !policy.require_approval {
            return Ok(AccessDecision::granted(
                policy,
                user.role,
                format!("Access granted by policy: {}", policy.name),
            ));
        }

        if self.approvals.has_valid_approval(&user.id, &server.id).await? {
            Ok(AccessDecision::granted(
                policy,
                user.role,
                format!("Access granted by approved request (policy: {})", policy.name),
            ))
        } else {
            Ok(AccessDecision::approval_required(policy))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{CommandMode, Server, User};
    use crate::security::approval::ApprovalDecision;
    use crate::storage::Storage;
    use crate::storage::testkit::create_test_storage;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn at(d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    // 2026-10-19 is a Monday, 2026-10-24 a Saturday
    fn monday_noon() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap(),
        ))
    }

    struct Fixture {
        storage: Arc<Storage>,
        clock: Arc<FixedClock>,
        approvals: Arc<ApprovalWorkflow>,
        engine: PolicyEngine,
        _temp_dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let (storage, temp_dir) = create_test_storage();
        let clock = monday_noon();
        storage
            .servers
            .put(&Server::new("srv-1", "web-1", "10.0.0.1", "deploy"))
            .unwrap();
        for (id, role) in [
            ("root", Role::Admin),
            ("ops", Role::Operator),
            ("dev", Role::Developer),
            ("eve", Role::Viewer),
        ] {
            storage.users.put(&User::new(id, id, role)).unwrap();
        }
        let approvals = Arc::new(ApprovalWorkflow::new(storage.clone(), clock.clone()));
        let engine = PolicyEngine::new(storage.clone(), approvals.clone(), clock.clone());
        Fixture {
            storage,
            clock,
            approvals,
            engine,
            _temp_dir: temp_dir,
        }
    }

    fn request(user: &str, role: Role) -> AccessRequest {
        AccessRequest::new(user, role, "srv-1")
    }

    #[test]
    fn test_select_highest_priority() {
        let policies = vec![
            Policy::new("low", "Low", 50).with_command_mode(CommandMode::Whitelist),
            Policy::new("high", "High", 100),
        ];
        let selected = select_policy(&policies, Role::Developer, at(19, 12, 0)).unwrap();
        assert_eq!(selected.id, "high");
    }

    #[test]
    fn test_select_ties_break_by_id() {
        let policies = vec![Policy::new("b", "B", 10), Policy::new("a", "A", 10)];
        assert_eq!(
            select_policy(&policies, Role::User, at(19, 12, 0)).unwrap().id,
            "a"
        );
    }

    #[test]
    fn test_select_skips_non_matching() {
        let policies = vec![
            Policy::new("ops-only", "Ops", 100).with_roles([Role::Operator]),
            Policy::new("weekdays", "Weekdays", 50).with_days([1, 2, 3, 4, 5]),
            Policy::new("night", "Night", 75).with_window("22:00", "06:00"),
        ];
        assert_eq!(
            select_policy(&policies, Role::Developer, at(19, 12, 0)).unwrap().id,
            "weekdays"
        );
        assert_eq!(
            select_policy(&policies, Role::Developer, at(24, 23, 0)).unwrap().id,
            "night"
        );
        assert!(select_policy(&policies, Role::Developer, at(24, 12, 0)).is_none());
    }

    #[test]
    fn test_weekday_policy_never_matches_saturday() {
        let policies = vec![Policy::new("p", "Weekdays", 1).with_days([1, 2, 3, 4, 5])];
        for hour in [0, 9, 12, 23] {
            assert!(select_policy(&policies, Role::User, at(24, hour, 0)).is_none());
        }
    }

    #[test]
    fn test_half_set_window_never_matches() {
        let mut policy = Policy::new("p", "Broken", 1);
        policy.allowed_start_time = Some("09:00".to_string());
        assert!(select_policy(&[policy], Role::User, at(19, 12, 0)).is_none());
    }

    #[tokio::test]
    async fn test_admin_override_ignores_policies() {
        let f = fixture();
        let decision = f.engine.evaluate(&request("root", Role::Admin)).await;
        assert!(decision.allowed);
        assert!(!decision.requires_approval);
        assert!(decision.policy_id.is_none());
        assert!(decision.restrictions.is_none());

        f.storage
            .policies
            .put(
                &Policy::new("p", "Gated", 100)
                    .attached_to("srv-1")
                    .with_roles([Role::Operator])
                    .requiring_approval([Role::Operator]),
            )
            .unwrap();
        assert!(f.engine.evaluate(&request("root", Role::Admin)).await.allowed);
    }

    #[tokio::test]
    async fn test_no_policies_fails_closed() {
        let f = fixture();
        for (user, role) in [
            ("ops", Role::Operator),
            ("dev", Role::Developer),
            ("eve", Role::Viewer),
        ] {
            let decision = f.engine.evaluate(&request(user, role)).await;
            assert!(!decision.allowed);
            assert!(!decision.requires_approval);
        }
    }

    #[tokio::test]
    async fn test_inactive_policy_is_ignored() {
        let f = fixture();
        let mut policy = Policy::new("p", "Off", 10).attached_to("srv-1");
        policy.is_active = false;
        f.storage.policies.put(&policy).unwrap();
        assert!(!f.engine.evaluate(&request("dev", Role::Developer)).await.allowed);
    }

    #[tokio::test]
    async fn test_unknown_and_inactive_entities_are_denied() {
        let f = fixture();
        f.storage
            .policies
            .put(&Policy::new("p", "Open", 1).attached_to("srv-1").attached_to("srv-2"))
            .unwrap();

        let decision = f
            .engine
            .evaluate(&AccessRequest::new("dev", Role::Developer, "missing"))
            .await;
        assert_eq!(decision.reason, "Server not found");

        let mut server = Server::new("srv-2", "web-2", "10.0.0.2", "deploy");
        server.is_active = false;
        f.storage.servers.put(&server).unwrap();
        let decision = f
            .engine
            .evaluate(&AccessRequest::new("dev", Role::Developer, "srv-2"))
            .await;
        assert_eq!(decision.reason, "Server is inactive");

        let decision = f.engine.evaluate(&request("ghost", Role::Developer)).await;
        assert_eq!(decision.reason, "Requester not found");

        let mut user = User::new("gone", "gone", Role::Developer);
        user.is_active = false;
        f.storage.users.put(&user).unwrap();
        let decision = f.engine.evaluate(&request("gone", Role::Developer)).await;
        assert_eq!(decision.reason, "Requester account is inactive");
    }

    #[tokio::test]
    async fn test_claimed_role_must_match_directory() {
        let f = fixture();
        let decision = f.engine.evaluate(&request("dev", Role::Admin)).await;
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn test_priority_100_beats_50() {
        let f = fixture();
        f.storage
            .policies
            .put(
                &Policy::new("strict", "Strict", 100)
                    .attached_to("srv-1")
                    .with_command_mode(CommandMode::Whitelist),
            )
            .unwrap();
        f.storage
            .policies
            .put(&Policy::new("loose", "Loose", 50).attached_to("srv-1"))
            .unwrap();

        let decision = f.engine.evaluate(&request("dev", Role::Developer)).await;
        assert!(decision.allowed);
        assert_eq!(decision.policy_id.as_deref(), Some("strict"));
        assert_eq!(
            decision.restrictions.unwrap().command_mode,
            CommandMode::Whitelist
        );
    }

    #[tokio::test]
    async fn test_matching_policy_stops_evaluation() {
        let f = fixture();
        f.storage
            .policies
            .put(
                &Policy::new("gated", "Gated", 100)
                    .attached_to("srv-1")
                    .requiring_approval([Role::Operator]),
            )
            .unwrap();
        f.storage
            .policies
            .put(&Policy::new("open", "Open", 10).attached_to("srv-1"))
            .unwrap();

        let decision = f.engine.evaluate(&request("dev", Role::Developer)).await;
        assert!(!decision.allowed);
        assert!(decision.requires_approval);
        assert_eq!(decision.policy_id.as_deref(), Some("gated"));
    }

    #[tokio::test]
    async fn test_approval_grants_until_expiry() {
        let f = fixture();
        f.storage
            .policies
            .put(
                &Policy::new("gated", "Gated", 100)
                    .attached_to("srv-1")
                    .with_patterns(["kubectl"])
                    .requiring_approval([Role::Operator]),
            )
            .unwrap();

        let pending = f
            .approvals
            .create_approval_request("dev", "srv-1", "deploy", Some(2))
            .await
            .unwrap();
        assert!(
            f.engine
                .evaluate(&request("dev", Role::Developer))
                .await
                .requires_approval
        );

        f.approvals
            .process_approval(&pending.id, "ops", ApprovalDecision::Approve, None)
            .await
            .unwrap();
        let decision = f.engine.evaluate(&request("dev", Role::Developer)).await;
        assert!(decision.allowed);
        let restrictions = decision.restrictions.unwrap();
        assert_eq!(restrictions.command_patterns, vec!["kubectl".to_string()]);

        f.clock.advance(chrono::Duration::hours(3));
        let decision = f.engine.evaluate(&request("dev", Role::Developer)).await;
        assert!(!decision.allowed);
        assert!(decision.requires_approval);
    }

    #[tokio::test]
    async fn test_viewer_is_read_only() {
        let f = fixture();
        f.storage
            .policies
            .put(&Policy::new("p", "Viewers", 1).attached_to("srv-1"))
            .unwrap();
        let decision = f.engine.evaluate(&request("eve", Role::Viewer)).await;
        assert!(decision.restrictions.unwrap().read_only);
    }

    #[tokio::test]
    async fn test_time_window_uses_configured_zone() {
        let f = fixture();
        f.storage
            .policies
            .put(
                &Policy::new("p", "Berlin office", 1)
                    .attached_to("srv-1")
                    .with_window("13:00", "14:00"),
            )
            .unwrap();
        // 12:00 UTC is 14:00 in Berlin (CEST)
        assert!(!f.engine.evaluate(&request("dev", Role::Developer)).await.allowed);

        let approvals = Arc::new(ApprovalWorkflow::new(f.storage.clone(), f.clock.clone()));
        let berlin = PolicyEngine::new(f.storage.clone(), approvals, f.clock.clone())
            .with_timezone(chrono_tz::Europe::Berlin);
        assert!(berlin.evaluate(&request("dev", Role::Developer)).await.allowed);
    }

    struct BrokenDirectory;

    #[async_trait]
    impl AccessDirectory for BrokenDirectory {
        async fn server(&self, _id: &str) -> anyhow::Result<Option<Server>> {
            anyhow::bail!("database unavailable")
        }

        async fn user(&self, _id: &str) -> anyhow::Result<Option<User>> {
            anyhow::bail!("database unavailable")
        }

        async fn policies_for_server(&self, _server_id: &str) -> anyhow::Result<Vec<Policy>> {
            anyhow::bail!("database unavailable")
        }
    }

    #[tokio::test]
    async fn test_lookup_failure_denies() {
        let f = fixture();
        let engine = PolicyEngine::new(Arc::new(BrokenDirectory), f.approvals.clone(), f.clock.clone());
        let decision = engine.evaluate(&request("dev", Role::Developer)).await;
        assert!(!decision.allowed);
        assert!(!decision.requires_approval);
        assert_eq!(decision.reason, LOOKUP_FAILED);
    }
}
