// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Records filed in more than one folder: next action reconciliation and the
//! longest-retention selection strategy.

use chrono::{DateTime, TimeZone, Utc};

use fileplan_core::application::disposition_service::{
    DispositionLifecycleService, DispositionQueryService,
};
use fileplan_core::application::record_service::RecordError;
use fileplan_core::application::runtime::RecordsManagementRuntime;
use fileplan_core::application::selection_strategy::RetentionRank;
use fileplan_core::domain::config::RecordsConfigManifest;
use fileplan_core::domain::disposition::{ActionDefinitionParams, Period, ScheduleParams};
use fileplan_core::domain::node::{NodeId, PropertyKey, PropertyMap, PropertyValue};
use fileplan_core::domain::transaction::TransactionContext;

fn date(year: i32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap()
}

fn created(at: DateTime<Utc>) -> PropertyMap {
    let mut props = PropertyMap::new();
    props.insert(PropertyKey::Created, PropertyValue::Date(at));
    props
}

struct Plan {
    runtime: RecordsManagementRuntime,
    plan: NodeId,
}

impl Plan {
    fn ctx(&self) -> TransactionContext {
        self.runtime.read_write("records_manager")
    }

    /// Category whose schedule destroys `years` after creation, with one folder
    async fn destroy_after(&self, name: &str, years: Option<u32>, record_level: bool) -> NodeId {
        let ctx = self.ctx();
        let category = self
            .runtime
            .file_plan
            .create_record_category(self.plan, name, PropertyMap::new())
            .await
            .unwrap();
        if let Some(years) = years {
            let params = if record_level {
                ScheduleParams::record_level()
            } else {
                ScheduleParams::folder_level()
            };
            let schedule = self
                .runtime
                .disposition
                .create_disposition_schedule(&ctx, category, params)
                .await
                .unwrap();
            self.runtime
                .disposition
                .add_disposition_action_definition(
                    &ctx,
                    &schedule,
                    ActionDefinitionParams::new("destroy")
                        .period(Period::years(years))
                        .anchored_to(PropertyKey::Created),
                )
                .await
                .unwrap();
        }
        self.runtime
            .records
            .create_record_folder(&ctx, category, &format!("{} folder", name), created(date(2020)))
            .await
            .unwrap()
    }

    async fn next_as_of(&self, node: NodeId) -> Option<DateTime<Utc>> {
        self.runtime
            .disposition
            .get_next_disposition_action(&self.ctx(), node)
            .await
            .unwrap()
            .and_then(|a| a.as_of)
    }
}

async fn plan() -> Plan {
    let runtime = RecordsManagementRuntime::in_memory(RecordsConfigManifest::default()).unwrap();
    let plan = runtime.file_plan.create_file_plan("plan").await.unwrap();
    Plan { runtime, plan }
}

#[tokio::test]
async fn test_link_extends_to_longest_retention() {
    let p = plan().await;
    let short = p.destroy_after("Short", Some(1), true).await;
    let long = p.destroy_after("Long", Some(10), true).await;
    let record = p
        .runtime
        .records
        .file_record(&p.ctx(), short, "invoice", created(date(2020)))
        .await
        .unwrap();
    assert_eq!(p.next_as_of(record).await, Some(date(2021)));

    p.runtime.records.link_record(&p.ctx(), record, long).await.unwrap();

    assert_eq!(p.next_as_of(record).await, Some(date(2030)));
    assert_eq!(
        p.runtime.file_plan.record_folders_of(record).await.unwrap(),
        vec![short, long]
    );
}

#[tokio::test]
async fn test_as_of_never_moves_earlier() {
    let p = plan().await;
    let long = p.destroy_after("Long", Some(10), true).await;
    let short = p.destroy_after("Short", Some(1), true).await;
    let record = p
        .runtime
        .records
        .file_record(&p.ctx(), long, "contract", created(date(2020)))
        .await
        .unwrap();

    p.runtime.records.link_record(&p.ctx(), record, short).await.unwrap();
    assert_eq!(p.next_as_of(record).await, Some(date(2030)));

    for _ in 0..3 {
        p.runtime
            .disposition
            .recalculate_next_disposition_step(&p.ctx(), record)
            .await
            .unwrap();
        assert_eq!(p.next_as_of(record).await, Some(date(2030)));
    }
}

#[tokio::test]
async fn test_move_reconciles_with_new_folder() {
    let p = plan().await;
    let short = p.destroy_after("Short", Some(1), true).await;
    let long = p.destroy_after("Long", Some(7), true).await;
    let record = p
        .runtime
        .records
        .file_record(&p.ctx(), short, "memo", created(date(2020)))
        .await
        .unwrap();

    p.runtime.records.move_record(&p.ctx(), record, long).await.unwrap();

    assert_eq!(p.next_as_of(record).await, Some(date(2027)));
    assert_eq!(
        p.runtime.file_plan.record_folders_of(record).await.unwrap(),
        vec![long]
    );
}

#[tokio::test]
async fn test_filing_into_closed_folder_is_rejected() {
    let p = plan().await;
    let folder = p.destroy_after("Closed", None, true).await;
    p.runtime
        .disposition
        .cutoff_disposable_item(&p.ctx(), folder)
        .await
        .unwrap();

    let err = p
        .runtime
        .records
        .file_record(&p.ctx(), folder, "late", PropertyMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RecordError::FolderClosed(_)));

    let err = p
        .runtime
        .records
        .file_record(&p.ctx(), p.plan, "misfiled", PropertyMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RecordError::NotRecordFolder(_)));
}

#[tokio::test]
async fn test_selection_prefers_longest_retention() {
    let p = plan().await;
    let short = p.destroy_after("Short", Some(1), false).await;
    let long = p.destroy_after("Long", Some(10), false).await;
    let ctx = p.runtime.read_only("auditor");

    let selected = p
        .runtime
        .selection
        .select_disposition_schedule_from(&ctx, &[short, long])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(selected.folder, long);
    assert_eq!(selected.rank, RetentionRank::Dated { as_of: date(2030) });
    assert!(selected.schedule.is_some());

    // Reversing the candidates does not change the outcome
    let reversed = p
        .runtime
        .selection
        .select_disposition_schedule_from(&ctx, &[long, short])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reversed.folder, long);
}

#[tokio::test]
async fn test_unscheduled_folder_is_indefinite() {
    let p = plan().await;
    let long = p.destroy_after("Long", Some(10), false).await;
    let unscheduled = p.destroy_after("Unscheduled", None, false).await;
    let ctx = p.runtime.read_only("auditor");

    let selected = p
        .runtime
        .selection
        .select_disposition_schedule_from(&ctx, &[long, unscheduled])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(selected.folder, unscheduled);
    assert_eq!(selected.rank, RetentionRank::Indefinite);
    assert!(selected.schedule.is_none());

    assert!(p
        .runtime
        .selection
        .select_disposition_schedule_from(&ctx, &[])
        .await
        .unwrap()
        .is_none());
}
