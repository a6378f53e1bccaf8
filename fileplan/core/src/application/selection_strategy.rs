// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Selection of the governing folder for a record filed in several places.
//!
//! Longest retention wins. Folders are ranked by their next disposition
//! action: a dated action ranks by its as-of date, an action with no date
//! ranks above every dated one, and a folder with no schedule or no next
//! action ranks above everything. Two undated actions are compared by their
//! number of events, which only approximates retention length. Remaining
//! ties fall back to the folder id so the order is total.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::disposition_service::DispositionQueryService;
use crate::domain::disposition::{DispositionError, DispositionSchedule};
use crate::domain::node::NodeId;
use crate::domain::transaction::TransactionContext;

/// Retention rank of one folder, ordered shortest to longest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetentionRank {
    Dated { as_of: DateTime<Utc> },
    EventBased { events: usize },
    /// No schedule or no remaining action
    Indefinite,
}

#[derive(Debug, Clone)]
pub struct DispositionSelection {
    pub folder: NodeId,
    pub rank: RetentionRank,
    pub schedule: Option<Arc<DispositionSchedule>>,
}

/// Folder with the greatest rank, ties broken by the larger id
pub fn winning_candidate<I>(candidates: I) -> Option<(NodeId, RetentionRank)>
where
    I: IntoIterator<Item = (NodeId, RetentionRank)>,
{
    candidates
        .into_iter()
        .max_by(|(a_folder, a_rank), (b_folder, b_rank)| a_rank.cmp(b_rank).then(a_folder.cmp(b_folder)))
}

pub struct DispositionSelectionStrategy {
    disposition: Arc<dyn DispositionQueryService>,
}

impl DispositionSelectionStrategy {
    pub fn new(disposition: Arc<dyn DispositionQueryService>) -> Self {
        Self { disposition }
    }

    /// Rank one folder. Always evaluated as the system principal so the
    /// caller's permissions cannot skew the comparison.
    ///
    /// Under a record-level schedule the actions live on the records, so the
    /// folder itself has no next action and ranks as `Indefinite`.
    pub async fn rank(
        &self,
        ctx: &TransactionContext,
        folder: NodeId,
    ) -> Result<RetentionRank, DispositionError> {
        let system = ctx.as_system();
        if self
            .disposition
            .get_disposition_schedule(&system, folder)
            .await?
            .is_none()
        {
            return Ok(RetentionRank::Indefinite);
        }
        let Some(next) = self
            .disposition
            .get_next_disposition_action(&system, folder)
            .await?
        else {
            return Ok(RetentionRank::Indefinite);
        };
        match next.as_of {
            Some(as_of) => Ok(RetentionRank::Dated { as_of }),
            None => {
                let events = self
                    .disposition
                    .get_event_completion_details(&system, &next)
                    .await?
                    .len();
                Ok(RetentionRank::EventBased { events })
            }
        }
    }

    pub async fn select_disposition_schedule_from(
        &self,
        ctx: &TransactionContext,
        record_folders: &[NodeId],
    ) -> Result<Option<DispositionSelection>, DispositionError> {
        let mut ranked = Vec::with_capacity(record_folders.len());
        for folder in record_folders {
            ranked.push((*folder, self.rank(ctx, *folder).await?));
        }

        let Some((folder, rank)) = winning_candidate(ranked) else {
            return Ok(None);
        };
        let schedule = self
            .disposition
            .get_disposition_schedule(&ctx.as_system(), folder)
            .await?;
        debug!(
            "Selected folder {} ({:?}) from {} candidates",
            folder,
            rank,
            record_folders.len()
        );
        Ok(Some(DispositionSelection {
            folder,
            rank,
            schedule,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::disposition_service::{
        DispositionLifecycleService, StandardDispositionService,
    };
    use crate::application::file_plan::FilePlanService;
    use crate::application::transaction_helper::RetryingTransactionHelper;
    use crate::domain::config::TransactionConfig;
    use crate::domain::disposition::{ActionDefinitionParams, EventCatalog, Period, ScheduleParams};
    use crate::domain::node::PropertyMap;
    use crate::domain::repository::NodeService;
    use crate::domain::security::SecurityContext;
    use crate::domain::transaction::TxnReadState;
    use crate::infrastructure::event_bus::EventBus;
    use crate::infrastructure::repositories::InMemoryNodeService;
    use crate::infrastructure::transaction::InMemoryTransactionService;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn date(year: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_rank_order() {
        let earlier = RetentionRank::Dated { as_of: date(2025) };
        let later = RetentionRank::Dated { as_of: date(2030) };
        let few = RetentionRank::EventBased { events: 1 };
        let many = RetentionRank::EventBased { events: 3 };

        assert!(earlier < later);
        assert!(later < few);
        assert!(few < many);
        assert!(many < RetentionRank::Indefinite);
    }

    #[test]
    fn test_unscheduled_folder_wins() {
        let a = NodeId::new();
        let b = NodeId::new();
        let winner = winning_candidate(vec![
            (a, RetentionRank::Dated { as_of: date(2099) }),
            (b, RetentionRank::Indefinite),
        ]);
        assert_eq!(winner.map(|(f, _)| f), Some(b));
        assert_eq!(winning_candidate(Vec::new()), None);
    }

    #[tokio::test]
    async fn test_folder_under_record_level_schedule_is_indefinite() {
        let nodes: Arc<dyn NodeService> = Arc::new(InMemoryNodeService::new());
        let file_plan = Arc::new(FilePlanService::new(nodes.clone()));
        let helper = Arc::new(RetryingTransactionHelper::new(
            Arc::new(InMemoryTransactionService::new()),
            &TransactionConfig::default(),
        ));
        let service = Arc::new(StandardDispositionService::new(
            nodes,
            file_plan.clone(),
            helper,
            Arc::new(EventCatalog::standard()),
            Arc::new(EventBus::with_default_capacity()),
        ));
        let ctx = TransactionContext::new(TxnReadState::ReadWrite, SecurityContext::system());
        let plan = file_plan.create_file_plan("plan").await.unwrap();

        let mut folders = Vec::new();
        for (name, params) in [
            ("per-record", ScheduleParams::record_level()),
            ("per-folder", ScheduleParams::folder_level()),
        ] {
            let category = file_plan
                .create_record_category(plan, name, PropertyMap::new())
                .await
                .unwrap();
            let schedule = service
                .create_disposition_schedule(&ctx, category, params)
                .await
                .unwrap();
            service
                .add_disposition_action_definition(
                    &ctx,
                    &schedule,
                    ActionDefinitionParams::new("cutoff").period(Period::immediately()),
                )
                .await
                .unwrap();
            let folder = file_plan
                .create_record_folder(category, "f", PropertyMap::new())
                .await
                .unwrap();
            service.refresh_disposition_action(&ctx, folder).await.unwrap();
            folders.push(folder);
        }

        let strategy = DispositionSelectionStrategy::new(service);
        assert_eq!(strategy.rank(&ctx, folders[0]).await.unwrap(), RetentionRank::Indefinite);
        assert!(matches!(
            strategy.rank(&ctx, folders[1]).await.unwrap(),
            RetentionRank::Dated { .. }
        ));
    }

    fn rank_strategy() -> impl Strategy<Value = RetentionRank> {
        prop_oneof![
            (2000i32..2100).prop_map(|y| RetentionRank::Dated { as_of: date(y) }),
            (0usize..5).prop_map(|events| RetentionRank::EventBased { events }),
            Just(RetentionRank::Indefinite),
        ]
    }

    proptest! {
        #[test]
        fn selection_ignores_candidate_order(
            ranks in proptest::collection::vec(rank_strategy(), 1..8),
            rotate in 0usize..8,
        ) {
            let candidates: Vec<(NodeId, RetentionRank)> = ranks
                .into_iter()
                .enumerate()
                .map(|(i, rank)| (NodeId(Uuid::from_u128(i as u128 + 1)), rank))
                .collect();
            let mut rotated = candidates.clone();
            let len = rotated.len();
            rotated.rotate_left(rotate % len);
            let mut reversed = candidates.clone();
            reversed.reverse();

            let expected = winning_candidate(candidates.clone());
            prop_assert_eq!(winning_candidate(rotated), expected);
            prop_assert_eq!(winning_candidate(reversed), expected);

            let (_, best) = expected.unwrap();
            prop_assert!(candidates.iter().all(|(_, rank)| *rank <= best));
        }
    }
}
