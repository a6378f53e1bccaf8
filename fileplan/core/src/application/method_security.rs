// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Method Security
//!
//! Wraps calls on secured services. Directives are configured per method
//! name; before directives are voted on by [`RmEntryVoter`] and the single
//! optional after directive filters the return value through
//! [`AfterInvocationProvider`]. Methods without configuration run unsecured.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn, Level};

use crate::application::after_invocation::{AfterInvocationProvider, PostInvocationFilter};
use crate::application::capability_service::{format_report, CapabilityService};
use crate::application::entry_voter::{MethodInvocation, RmEntryVoter};
use crate::domain::config::SecurityConfig;
use crate::domain::events::SecurityEvent;
use crate::domain::security::{AccessDecision, AfterDirective, SecurityDirective, SecurityError};
use crate::domain::transaction::TransactionContext;
use crate::infrastructure::event_bus::EventBus;

/// Parsed directives of one method
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodSecurity {
    pub before: Vec<SecurityDirective>,
    pub after: Option<AfterDirective>,
}

impl MethodSecurity {
    pub fn parse<S: AsRef<str>>(method: &str, attributes: &[S]) -> Result<Self, SecurityError> {
        let (before, mut after) = AfterDirective::partition(attributes)?;
        if after.len() > 1 {
            return Err(SecurityError::InvalidDirective(format!(
                "{} declares {} after-invocation directives, at most one is allowed",
                method,
                after.len()
            )));
        }
        Ok(Self {
            before,
            after: after.pop(),
        })
    }
}

pub struct MethodSecurityInterceptor {
    voter: Arc<RmEntryVoter>,
    after: Arc<AfterInvocationProvider>,
    capabilities: Arc<CapabilityService>,
    event_bus: Arc<EventBus>,
    methods: HashMap<String, MethodSecurity>,
    allow_if_all_abstain: bool,
    capability_report: bool,
}

impl MethodSecurityInterceptor {
    pub fn new(
        voter: Arc<RmEntryVoter>,
        after: Arc<AfterInvocationProvider>,
        capabilities: Arc<CapabilityService>,
        event_bus: Arc<EventBus>,
        config: &SecurityConfig,
    ) -> Result<Self, SecurityError> {
        let methods = config
            .method_security
            .iter()
            .map(|(method, attributes)| {
                Ok((method.clone(), MethodSecurity::parse(method, attributes)?))
            })
            .collect::<Result<HashMap<_, _>, SecurityError>>()?;

        Ok(Self {
            voter,
            after,
            capabilities,
            event_bus,
            methods,
            allow_if_all_abstain: config.allow_if_all_abstain,
            capability_report: config.capability_report,
        })
    }

    pub fn method_security(&self, method: &str) -> Option<&MethodSecurity> {
        self.methods.get(method)
    }

    /// Vote on a call before it runs
    pub async fn before_invocation(
        &self,
        ctx: &TransactionContext,
        invocation: &MethodInvocation,
    ) -> Result<(), SecurityError> {
        let Some(security) = self.methods.get(&invocation.method) else {
            return Ok(());
        };
        if security.before.is_empty() {
            return Ok(());
        }

        match self.voter.vote(ctx, invocation, &security.before).await? {
            AccessDecision::Granted => Ok(()),
            AccessDecision::Abstain if self.allow_if_all_abstain => {
                debug!("All directives abstained on {}, allowing", invocation.method);
                Ok(())
            }
            AccessDecision::Abstain => {
                Err(self.deny(ctx, invocation, "all directives abstained").await)
            }
            AccessDecision::Denied => Err(self.deny(ctx, invocation, "capability check failed").await),
        }
    }

    /// Run `work` guarded by the directives configured for the method
    pub async fn invoke<R, E, F, Fut>(
        &self,
        ctx: &TransactionContext,
        invocation: &MethodInvocation,
        work: F,
    ) -> Result<R::Output, SecurityError>
    where
        R: PostInvocationFilter,
        E: Into<SecurityError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, E>>,
    {
        self.before_invocation(ctx, invocation).await?;

        let result = work().await.map_err(Into::into)?;

        match self.methods.get(&invocation.method).and_then(|s| s.after) {
            Some(directive) => match result.apply_filter(&self.after, ctx, directive).await {
                Ok(filtered) => Ok(filtered),
                Err(SecurityError::AccessDenied { reason, .. }) => {
                    Err(self.deny(ctx, invocation, &reason).await)
                }
                Err(e) => Err(e),
            },
            None => Ok(result.unfiltered()),
        }
    }

    async fn deny(
        &self,
        ctx: &TransactionContext,
        invocation: &MethodInvocation,
        reason: &str,
    ) -> SecurityError {
        let user = ctx.security().running_as().name().to_string();
        metrics::counter!("fileplan_access_denied_total").increment(1);
        warn!("Access denied to {} for {}: {}", invocation.method, user, reason);

        let report = if self.capability_report || tracing::enabled!(Level::DEBUG) {
            self.report(ctx, invocation).await
        } else {
            None
        };

        self.event_bus.publish_security_event(SecurityEvent::AccessDenied {
            method: invocation.method.clone(),
            user: user.clone(),
            reason: reason.to_string(),
            denied_at: Utc::now(),
        });

        SecurityError::AccessDenied {
            reason: format!("{} may not call {}: {}", user, invocation.method, reason),
            report,
        }
    }

    async fn report(&self, ctx: &TransactionContext, invocation: &MethodInvocation) -> Option<String> {
        let mut lines = Vec::new();
        for node in invocation.nodes() {
            match self.capabilities.capabilities_report(ctx, node).await {
                Ok(report) => lines.push(format_report(node, &report)),
                Err(e) => warn!("Could not build capability report for {}: {}", node, e),
            }
        }
        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::application::after_invocation::{FilterLimits, Filtered};
    use crate::application::capability_service::{DeclarativeCapability, FILE_RECORDS, VIEW_RECORDS};
    use crate::application::file_plan::FilePlanService;
    use crate::domain::node::{NodeId, PropertyMap};
    use crate::domain::repository::{NodeService, RepositoryError};
    use crate::domain::security::{Permission, SecurityContext};
    use crate::domain::transaction::TxnReadState;
    use crate::infrastructure::event_bus::DomainEvent;
    use crate::infrastructure::permission::InMemoryPermissionService;
    use crate::infrastructure::repositories::InMemoryNodeService;

    struct Fixture {
        capabilities: Arc<CapabilityService>,
        voter: Arc<RmEntryVoter>,
        after: Arc<AfterInvocationProvider>,
        event_bus: Arc<EventBus>,
        open: NodeId,
        secret: NodeId,
    }

    async fn fixture() -> Fixture {
        let nodes: Arc<dyn NodeService> = Arc::new(InMemoryNodeService::new());
        let file_plan = Arc::new(FilePlanService::new(nodes.clone()));
        let permissions = Arc::new(InMemoryPermissionService::new(nodes.clone()));
        let capabilities = Arc::new(CapabilityService::new());
        for (name, permission) in [
            (VIEW_RECORDS, Permission::ReadRecords),
            (FILE_RECORDS, Permission::FileRecords),
        ] {
            capabilities.register(Arc::new(DeclarativeCapability::new(
                name,
                permission,
                permissions.clone(),
                file_plan.clone(),
            )));
        }
        let plan = file_plan.create_file_plan("plan").await.unwrap();
        let open = file_plan.create_record_category(plan, "open", PropertyMap::new()).await.unwrap();
        let secret = file_plan.create_record_category(plan, "secret", PropertyMap::new()).await.unwrap();
        permissions.set_permission(open, "alice", Permission::ReadRecords);

        let event_bus = Arc::new(EventBus::new(16));
        Fixture {
            voter: Arc::new(RmEntryVoter::new(capabilities.clone(), file_plan.clone(), nodes.clone())),
            after: Arc::new(AfterInvocationProvider::new(
                capabilities.clone(),
                nodes,
                file_plan,
                FilterLimits::default(),
                event_bus.clone(),
            )),
            capabilities,
            event_bus,
            open,
            secret,
        }
    }

    fn interceptor(f: &Fixture, config: SecurityConfig) -> MethodSecurityInterceptor {
        MethodSecurityInterceptor::new(
            f.voter.clone(),
            f.after.clone(),
            f.capabilities.clone(),
            f.event_bus.clone(),
            &config,
        )
        .unwrap()
    }

    fn config(entries: &[(&str, &[&str])]) -> SecurityConfig {
        SecurityConfig {
            method_security: entries
                .iter()
                .map(|(method, attrs)| {
                    (method.to_string(), attrs.iter().map(|a| a.to_string()).collect())
                })
                .collect(),
            ..SecurityConfig::default()
        }
    }

    fn alice() -> TransactionContext {
        TransactionContext::new(TxnReadState::ReadOnly, SecurityContext::authenticated("alice"))
    }

    #[tokio::test]
    async fn test_unsecured_method_runs() {
        let f = fixture().await;
        let i = interceptor(&f, SecurityConfig::default());
        let call = MethodInvocation::new("NodeService.exists", vec![f.secret.into()]);

        let result = i
            .invoke(&alice(), &call, || async { Ok::<_, RepositoryError>(vec![f.secret]) })
            .await
            .unwrap();
        assert_eq!(result, Filtered::unfiltered(vec![f.secret], 1));
    }

    #[tokio::test]
    async fn test_denied_call_does_not_run() {
        let f = fixture().await;
        let i = interceptor(&f, config(&[("NodeService.getProperties", &["RM.Read.0"])]));
        let mut events = f.event_bus.subscribe();
        let call = MethodInvocation::new("NodeService.getProperties", vec![f.secret.into()]);

        let ran = AtomicBool::new(false);

        let result = i
            .invoke(&alice(), &call, || async {
                ran.store(true, Ordering::SeqCst);
                Ok::<(), RepositoryError>(())
            })
            .await;
        assert!(matches!(result, Err(SecurityError::AccessDenied { .. })));
        assert!(!ran.load(Ordering::SeqCst));
        assert!(matches!(
            events.try_recv(),
            Ok(DomainEvent::Security(SecurityEvent::AccessDenied { .. }))
        ));
    }

    #[tokio::test]
    async fn test_report_attached_when_enabled() {
        let f = fixture().await;
        let mut security = config(&[("NodeService.getProperties", &["RM.Read.0"])]);
        security.capability_report = true;
        let i = interceptor(&f, security);
        let call = MethodInvocation::new("NodeService.getProperties", vec![f.secret.into()]);

        match i.before_invocation(&alice(), &call).await {
            Err(SecurityError::AccessDenied { report: Some(report), .. }) => {
                assert!(report.contains("ViewRecords=DENIED"));
                assert!(report.contains("FileRecords=DENIED"));
            }
            other => panic!("expected access denied with report, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_abstain_follows_configuration() {
        let f = fixture().await;
        let call = MethodInvocation::new("RecordService.audit", vec![]);
        let entries: &[(&str, &[&str])] = &[("RecordService.audit", &["RM_ABSTAIN"])];

        let strict = interceptor(&f, config(entries));
        assert!(strict.before_invocation(&alice(), &call).await.is_err());

        let mut lenient_config = config(entries);
        lenient_config.allow_if_all_abstain = true;
        let lenient = interceptor(&f, lenient_config);
        assert!(lenient.before_invocation(&alice(), &call).await.is_ok());
    }

    #[tokio::test]
    async fn test_query_filters_results() {
        let f = fixture().await;
        let i = interceptor(
            &f,
            config(&[("SearchService.query", &["RM_QUERY", "AFTER_RM.FilterNode"])]),
        );
        let call = MethodInvocation::new("SearchService.query", vec![]);
        let (open, secret) = (f.open, f.secret);

        let result = i
            .invoke(&alice(), &call, || async move {
                Ok::<_, RepositoryError>(vec![open, secret])
            })
            .await
            .unwrap();
        assert_eq!(result.value, vec![open]);
        assert_eq!(result.removed, 1);
    }

    #[test]
    fn test_two_after_directives_rejected() {
        let parsed = MethodSecurity::parse(
            "NodeService.getChildren",
            &["AFTER_RM.FilterNode", "AFTER_RM.FilterNode.parent"],
        );
        assert!(matches!(parsed, Err(SecurityError::InvalidDirective(_))));
    }
}
