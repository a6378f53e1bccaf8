// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Method security over the fully wired runtime: default capabilities,
//! disposition-bound capabilities, entry voting and result filtering.

use chrono::{TimeZone, Utc};

use fileplan_core::application::after_invocation::PagedResult;
use fileplan_core::application::capability_service::{
    CUTOFF_RECORDS, DESTROY_RECORDS, DISPOSITION, FILE_RECORDS, VIEW_RECORDS,
};
use fileplan_core::application::disposition_service::DispositionLifecycleService;
use fileplan_core::application::entry_voter::{InvocationArgument, MethodInvocation};
use fileplan_core::application::runtime::RecordsManagementRuntime;
use fileplan_core::domain::config::RecordsConfigManifest;
use fileplan_core::domain::events::SecurityEvent;
use fileplan_core::domain::disposition::{ActionDefinitionParams, Period, ScheduleParams};
use fileplan_core::domain::node::{NodeId, PropertyKey, PropertyMap, PropertyValue};
use fileplan_core::domain::repository::RepositoryError;
use fileplan_core::domain::security::{AccessDecision, Permission, SecurityError};
use fileplan_core::infrastructure::event_bus::DomainEvent;

const CONFIG: &str = r#"
apiVersion: fileplan.records/v1
kind: RecordsConfig
metadata:
  name: voting-tests
spec:
  security:
    max_permission_checks: 50
    method_security:
      RecordService.fileRecord:
        - RM_CAP.0.FileRecords
      RecordService.createRecordFolder:
        - RM.Create.0
      DispositionService.cutoff:
        - RM_CAP.0.CutoffRecords
      NodeService.getChildren:
        - RM_QUERY
        - AFTER_RM.FilterNode
      NodeService.getProperties:
        - RM.Read.0
      NodeService.exists:
        - RM_ALLOW
"#;

struct World {
    runtime: RecordsManagementRuntime,
    plan: NodeId,
    finance: NodeId,
    legal: NodeId,
    folder: NodeId,
}

/// Finance is open to alice; legal is not. Finance folders are cut off
/// immediately after creation.
async fn world() -> World {
    let config = RecordsConfigManifest::from_yaml_str(CONFIG).unwrap();
    let runtime = RecordsManagementRuntime::in_memory(config).unwrap();
    let admin = runtime.system();

    let plan = runtime.file_plan.create_file_plan("plan").await.unwrap();
    let finance = runtime
        .file_plan
        .create_record_category(plan, "Finance", PropertyMap::new())
        .await
        .unwrap();
    let legal = runtime
        .file_plan
        .create_record_category(plan, "Legal", PropertyMap::new())
        .await
        .unwrap();
    let schedule = runtime
        .disposition
        .create_disposition_schedule(&admin, finance, ScheduleParams::folder_level())
        .await
        .unwrap();
    runtime
        .disposition
        .add_disposition_action_definition(
            &admin,
            &schedule,
            ActionDefinitionParams::new("cutoff")
                .period(Period::immediately())
                .anchored_to(PropertyKey::Created),
        )
        .await
        .unwrap();

    let mut props = PropertyMap::new();
    props.insert(
        PropertyKey::Created,
        PropertyValue::Date(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
    );
    let folder = runtime
        .records
        .create_record_folder(&admin, finance, "FY2024", props)
        .await
        .unwrap();

    runtime.permissions.set_permission(finance, "alice", Permission::FileRecords);
    runtime.permissions.set_permission(finance, "alice", Permission::Disposition);
    runtime.permissions.add_to_group("GROUP_legal", "bob");
    runtime.permissions.set_permission(legal, "GROUP_legal", Permission::ReadRecords);

    World {
        runtime,
        plan,
        finance,
        legal,
        folder,
    }
}

#[tokio::test]
async fn test_filing_requires_file_records() {
    let w = world().await;
    let call = MethodInvocation::new(
        "RecordService.fileRecord",
        vec![w.folder.into(), InvocationArgument::Value("receipt".to_string())],
    );
    let records = w.runtime.records.clone();
    let folder = w.folder;

    let ctx = w.runtime.read_write("alice");
    let record = w
        .runtime
        .method_security
        .invoke(&ctx, &call, || {
            records.file_record(&ctx, folder, "receipt", PropertyMap::new())
        })
        .await
        .unwrap();
    assert!(w.runtime.file_plan.is_record(record).await.unwrap());

    let bob = w.runtime.read_write("bob");
    let denied = w
        .runtime
        .method_security
        .invoke(&bob, &call, || {
            records.file_record(&bob, folder, "receipt", PropertyMap::new())
        })
        .await;
    assert!(matches!(denied, Err(SecurityError::AccessDenied { .. })));
    assert_eq!(w.runtime.file_plan.records_of(folder).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_disposition_capabilities_follow_next_action() {
    let w = world().await;
    let ctx = w.runtime.read_only("alice");
    let capabilities = &w.runtime.capabilities;

    assert_eq!(
        capabilities.evaluate(&ctx, CUTOFF_RECORDS, w.folder).await.unwrap(),
        AccessDecision::Granted
    );
    assert_eq!(
        capabilities.evaluate(&ctx, DESTROY_RECORDS, w.folder).await.unwrap(),
        AccessDecision::Denied
    );
    assert_eq!(
        capabilities.evaluate(&ctx, DISPOSITION, w.folder).await.unwrap(),
        AccessDecision::Granted
    );

    // Step capabilities only apply to folders and records
    assert_eq!(
        capabilities.evaluate(&ctx, CUTOFF_RECORDS, w.finance).await.unwrap(),
        AccessDecision::Denied
    );

    let report = capabilities.capabilities_report(&ctx, w.folder).await.unwrap();
    assert_eq!(report.get(VIEW_RECORDS), Some(&AccessDecision::Granted));
    assert_eq!(report.get(FILE_RECORDS), Some(&AccessDecision::Granted));
}

#[tokio::test]
async fn test_cutoff_guarded_by_capability() {
    let w = world().await;
    let call = MethodInvocation::new("DispositionService.cutoff", vec![w.folder.into()]);
    let disposition = w.runtime.disposition.clone();
    let folder = w.folder;

    let bob = w.runtime.read_write("bob");
    let denied = w
        .runtime
        .method_security
        .invoke(&bob, &call, || disposition.cutoff_disposable_item(&bob, folder))
        .await;
    assert!(matches!(denied, Err(SecurityError::AccessDenied { .. })));

    let alice = w.runtime.read_write("alice");
    w.runtime
        .method_security
        .invoke(&alice, &call, || disposition.cutoff_disposable_item(&alice, folder))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_policy_checks_parent_category() {
    let w = world().await;
    let ctx = w.runtime.read_write("alice");
    let interceptor = &w.runtime.method_security;

    let in_finance = MethodInvocation::new("RecordService.createRecordFolder", vec![w.finance.into()]);
    assert!(interceptor.before_invocation(&ctx, &in_finance).await.is_ok());

    let in_legal = MethodInvocation::new("RecordService.createRecordFolder", vec![w.legal.into()]);
    assert!(interceptor.before_invocation(&ctx, &in_legal).await.is_err());
}

#[tokio::test]
async fn test_query_filters_children_per_user() {
    let w = world().await;
    let call = MethodInvocation::new("NodeService.getChildren", vec![w.plan.into()]);
    let children = w.runtime.file_plan.contained(w.plan).await.unwrap();
    assert_eq!(children.len(), 2);

    let alice = w.runtime.read_only("alice");
    let visible = w
        .runtime
        .method_security
        .invoke(&alice, &call, || {
            let children = children.clone();
            async move { Ok::<_, RepositoryError>(PagedResult::new(children, Some(10))) }
        })
        .await
        .unwrap();
    assert_eq!(visible.value.page, vec![w.finance]);
    assert_eq!(visible.removed, 1);
    assert!(!visible.cut_off);
    assert_eq!(visible.checks_remaining, Some(48));

    let bob = w.runtime.read_only("bob");
    let visible = w
        .runtime
        .method_security
        .invoke(&bob, &call, || {
            let children = children.clone();
            async move { Ok::<_, RepositoryError>(children) }
        })
        .await
        .unwrap();
    assert_eq!(visible.value, vec![w.legal]);
}

#[tokio::test]
async fn test_read_policy_and_unconditional_allow() {
    let w = world().await;
    let bob = w.runtime.read_only("bob");
    let interceptor = &w.runtime.method_security;

    let read_legal = MethodInvocation::new("NodeService.getProperties", vec![w.legal.into()]);
    assert!(interceptor.before_invocation(&bob, &read_legal).await.is_ok());

    let read_finance = MethodInvocation::new("NodeService.getProperties", vec![w.finance.into()]);
    assert!(interceptor.before_invocation(&bob, &read_finance).await.is_err());

    let exists = MethodInvocation::new("NodeService.exists", vec![w.finance.into()]);
    assert!(interceptor.before_invocation(&bob, &exists).await.is_ok());

    // The system principal passes every directive
    let system = w.runtime.system();
    assert!(interceptor.before_invocation(&system, &read_finance).await.is_ok());
}

#[tokio::test]
async fn test_denial_is_published() {
    let w = world().await;
    let mut events = w.runtime.event_bus.subscribe();
    let bob = w.runtime.read_only("bob");
    let call = MethodInvocation::new("NodeService.getProperties", vec![w.finance.into()]);

    assert!(w.runtime.method_security.before_invocation(&bob, &call).await.is_err());

    let mut denied = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let DomainEvent::Security(SecurityEvent::AccessDenied { method, user, .. }) = event {
            denied.push((method, user));
        }
    }
    assert_eq!(
        denied,
        vec![("NodeService.getProperties".to_string(), "bob".to_string())]
    );
}
