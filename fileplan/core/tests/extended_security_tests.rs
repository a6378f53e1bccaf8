// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Extended readers and writers granted on records, and how they follow
//! renditions, parent containers and moves.

use fileplan_core::application::capability_service::{FILE_RECORDS, VIEW_RECORDS};
use fileplan_core::application::runtime::RecordsManagementRuntime;
use fileplan_core::domain::config::RecordsConfigManifest;
use fileplan_core::domain::events::SecurityEvent;
use fileplan_core::domain::node::{NodeId, PropertyMap};
use fileplan_core::domain::security::AccessDecision;
use fileplan_core::infrastructure::event_bus::DomainEvent;

struct Records {
    runtime: RecordsManagementRuntime,
    hr: NodeId,
    archive: NodeId,
    personnel: NodeId,
    retired: NodeId,
    record: NodeId,
}

async fn records() -> Records {
    let runtime = RecordsManagementRuntime::in_memory(RecordsConfigManifest::default()).unwrap();
    let admin = runtime.system();

    let plan = runtime.file_plan.create_file_plan("plan").await.unwrap();
    let hr = runtime
        .file_plan
        .create_record_category(plan, "HR", PropertyMap::new())
        .await
        .unwrap();
    let archive = runtime
        .file_plan
        .create_record_category(plan, "Archive", PropertyMap::new())
        .await
        .unwrap();
    let personnel = runtime
        .records
        .create_record_folder(&admin, hr, "Personnel", PropertyMap::new())
        .await
        .unwrap();
    let retired = runtime
        .records
        .create_record_folder(&admin, archive, "Retired", PropertyMap::new())
        .await
        .unwrap();
    let record = runtime
        .records
        .file_record(&admin, personnel, "Offer letter", PropertyMap::new())
        .await
        .unwrap();

    Records {
        runtime,
        hr,
        archive,
        personnel,
        retired,
        record,
    }
}

fn names(authorities: &[&str]) -> Vec<String> {
    authorities.iter().map(|a| a.to_string()).collect()
}

#[tokio::test]
async fn test_extended_reader_can_view_record_and_containers() {
    let r = records().await;
    let admin = r.runtime.read_write("admin");
    r.runtime
        .extended_security
        .add_extended_security(&admin, r.record, &names(&["carol"]), &[], true)
        .await
        .unwrap();

    let carol = r.runtime.read_only("carol");
    let capabilities = &r.runtime.capabilities;
    assert_eq!(
        capabilities.evaluate(&carol, VIEW_RECORDS, r.record).await.unwrap(),
        AccessDecision::Granted
    );
    assert_eq!(
        capabilities.evaluate(&carol, VIEW_RECORDS, r.personnel).await.unwrap(),
        AccessDecision::Granted
    );
    assert_eq!(
        capabilities.evaluate(&carol, FILE_RECORDS, r.personnel).await.unwrap(),
        AccessDecision::Denied
    );
    assert_eq!(
        capabilities.evaluate(&carol, VIEW_RECORDS, r.archive).await.unwrap(),
        AccessDecision::Denied
    );
}

#[tokio::test]
async fn test_writers_are_readers_on_containers() {
    let r = records().await;
    let admin = r.runtime.read_write("admin");
    let security = &r.runtime.extended_security;
    security
        .add_extended_security(&admin, r.record, &[], &names(&["dave"]), true)
        .await
        .unwrap();

    assert_eq!(security.get_extended_writers(r.record).await.unwrap(), names(&["dave"]));
    assert!(security.get_extended_readers(r.record).await.unwrap().is_empty());
    assert_eq!(security.get_extended_readers(r.hr).await.unwrap(), names(&["dave"]));
    assert!(security.get_extended_writers(r.hr).await.unwrap().is_empty());

    security
        .remove_all_extended_security(&admin, r.record, true)
        .await
        .unwrap();
    assert!(!security.has_extended_security(r.record).await.unwrap());
    assert!(!security.has_extended_security(r.hr).await.unwrap());
}

#[tokio::test]
async fn test_rendition_inherits_record_security() {
    let r = records().await;
    let admin = r.runtime.read_write("admin");
    let security = &r.runtime.extended_security;
    security
        .add_extended_security(&admin, r.record, &names(&["carol"]), &names(&["dave"]), false)
        .await
        .unwrap();

    let rendition = r
        .runtime
        .records
        .add_rendition(&admin, r.record, "Offer letter.pdf", PropertyMap::new())
        .await
        .unwrap();
    assert_eq!(security.get_extended_readers(rendition).await.unwrap(), names(&["carol"]));
    assert_eq!(security.get_extended_writers(rendition).await.unwrap(), names(&["dave"]));

    // Later changes to the record reach the rendition too
    security
        .remove_extended_security(&admin, r.record, &names(&["carol"]), &[], false)
        .await
        .unwrap();
    assert!(security.get_extended_readers(rendition).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_move_carries_readers_to_new_containers() {
    let r = records().await;
    let admin = r.runtime.read_write("admin");
    let security = &r.runtime.extended_security;
    security
        .add_extended_security(&admin, r.record, &names(&["carol"]), &[], true)
        .await
        .unwrap();
    assert!(security.has_extended_security(r.hr).await.unwrap());

    r.runtime
        .records
        .move_record(&admin, r.record, r.retired)
        .await
        .unwrap();

    assert!(!security.has_extended_security(r.personnel).await.unwrap());
    assert!(!security.has_extended_security(r.hr).await.unwrap());
    assert_eq!(security.get_extended_readers(r.retired).await.unwrap(), names(&["carol"]));
    assert_eq!(security.get_extended_readers(r.archive).await.unwrap(), names(&["carol"]));
    assert_eq!(security.get_extended_readers(r.record).await.unwrap(), names(&["carol"]));
}

#[tokio::test]
async fn test_changes_publish_security_events() {
    let r = records().await;
    let mut events = r.runtime.event_bus.subscribe();
    let admin = r.runtime.read_write("admin");

    r.runtime
        .extended_security
        .add_extended_security(&admin, r.record, &names(&["carol"]), &[], false)
        .await
        .unwrap();

    let mut changed = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let DomainEvent::Security(SecurityEvent::ExtendedSecurityChanged {
            node_id, added, ..
        }) = event
        {
            changed.push((node_id, added));
        }
    }
    assert_eq!(changed, vec![(r.record, true)]);
}
