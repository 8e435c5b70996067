use async_trait::async_trait;
use anyhow::Result;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use crate::core::bundle::Bundle;
use crate::core::performance_tracker::SimulationStats;

/// 완성된 번들과 통계 스냅샷을 받는 출구
///
/// 시뮬레이터는 서명이나 브로드캐스트를 하지 않으므로 구현체는 보관하거나 내보내기만 합니다.
#[async_trait]
pub trait SubmissionSink: Send + Sync {
    async fn submit_bundle(&self, bundle: Bundle) -> Result<()>;

    async fn export_stats(&self, stats: &SimulationStats) -> Result<()>;
}

/// 메모리에 번들을 모으는 싱크
///
/// 용량을 지정하면 가장 최근 번들만 보관하고 오래된 것부터 버립니다. 제출 총수는
/// 버려진 번들도 포함합니다.
#[derive(Debug, Default)]
pub struct BundleCollector {
    bundles: RwLock<VecDeque<Bundle>>,
    capacity: Option<usize>,
    submitted: AtomicU64,
    latest_stats: RwLock<Option<SimulationStats>>,
    exports: RwLock<u64>,
}

impl BundleCollector {
    /// 모든 번들을 보관
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::default()
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub async fn bundles(&self) -> Vec<Bundle> {
        self.bundles.read().await.iter().cloned().collect()
    }

    pub fn total_submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub async fn len(&self) -> usize {
        self.bundles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bundles.read().await.is_empty()
    }

    pub async fn latest_stats(&self) -> Option<SimulationStats> {
        self.latest_stats.read().await.clone()
    }

    pub async fn export_count(&self) -> u64 {
        *self.exports.read().await
    }

    pub async fn clear(&self) {
        self.bundles.write().await.clear();
        self.submitted.store(0, Ordering::Relaxed);
        *self.latest_stats.write().await = None;
        *self.exports.write().await = 0;
    }
}

#[async_trait]
impl SubmissionSink for BundleCollector {
    async fn submit_bundle(&self, bundle: Bundle) -> Result<()> {
        debug!(
            "📦 번들 수집: {} ({} 전략, {}개 tx, 블록 {})",
            bundle.id(),
            bundle.strategy_name(),
            bundle.len(),
            bundle.target_block()
        );
        let mut bundles = self.bundles.write().await;
        if let Some(capacity) = self.capacity {
            while bundles.len() >= capacity {
                bundles.pop_front();
            }
        }
        bundles.push_back(bundle);
        self.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn export_stats(&self, stats: &SimulationStats) -> Result<()> {
        *self.latest_stats.write().await = Some(stats.clone());
        *self.exports.write().await += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bundle::BundleBuilder;
    use crate::types::{Opportunity, OpportunityDetails};

    fn bundle(block: u64) -> Bundle {
        let opp = Opportunity::new("mock", block, OpportunityDetails::Generic { description: "test".into() })
            .with_profit(0.1, 0.01);
        BundleBuilder::for_opportunity(&opp, 1_000).build()
    }

    #[tokio::test]
    async fn test_collector_keeps_submission_order() {
        let collector = BundleCollector::new();
        for block in [10, 11] {
            collector.submit_bundle(bundle(block)).await.unwrap();
        }

        let bundles = collector.bundles().await;
        assert_eq!(bundles.len(), 2);
        assert_eq!(bundles[0].target_block(), 11);
        assert_eq!(bundles[1].target_block(), 12);

        let stats = SimulationStats { blocks_processed: 2, ..Default::default() };
        collector.export_stats(&stats).await.unwrap();
        assert_eq!(collector.latest_stats().await.unwrap().blocks_processed, 2);
        assert_eq!(collector.export_count().await, 1);

        collector.clear().await;
        assert!(collector.is_empty().await);
        assert!(collector.latest_stats().await.is_none());
        assert_eq!(collector.total_submitted(), 0);
    }

    #[tokio::test]
    async fn test_bounded_collector_keeps_latest() {
        let collector = BundleCollector::with_capacity(3);
        assert_eq!(collector.capacity(), Some(3));
        for block in 0..10 {
            collector.submit_bundle(bundle(block)).await.unwrap();
        }

        assert_eq!(collector.len().await, 3);
        assert_eq!(collector.total_submitted(), 10);
        let targets: Vec<u64> = collector.bundles().await.iter().map(|b| b.target_block()).collect();
        assert_eq!(targets, vec![8, 9, 10]);

        assert_eq!(BundleCollector::new().capacity(), None);
    }
}
