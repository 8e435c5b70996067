use async_trait::async_trait;
use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::info;

use crate::feed::MarketFeed;
use crate::types::MarketSnapshot;

/// 고정된 스냅샷 목록을 순환 재생
///
/// 스냅샷의 블록 번호는 순증가해야 합니다. 한 바퀴를 돌 때마다 블록 번호에 목록의
/// 블록 범위만큼 오프셋을 더해 블록 번호가 계속 증가하도록 합니다.
#[derive(Debug, Clone)]
pub struct ReplayFeed {
    snapshots: Vec<MarketSnapshot>,
    position: usize,
    cycle: u64,
    block_span: u64,
}

impl ReplayFeed {
    pub fn new(snapshots: Vec<MarketSnapshot>) -> Result<Self> {
        if snapshots.is_empty() {
            bail!("replay feed needs at least one snapshot");
        }
        for snapshot in &snapshots {
            for pool in &snapshot.pools {
                pool.validate()
                    .with_context(|| format!("invalid pool in snapshot for block {}", snapshot.block_number))?;
            }
        }
        if let Some(pair) = snapshots.windows(2).find(|pair| pair[1].block_number <= pair[0].block_number) {
            bail!(
                "replay snapshots must have strictly ascending block numbers ({} followed by {})",
                pair[0].block_number,
                pair[1].block_number
            );
        }

        let first = snapshots.first().map(|s| s.block_number).unwrap_or(0);
        let last = snapshots.last().map(|s| s.block_number).unwrap_or(0);
        Ok(Self {
            block_span: last.saturating_sub(first) + 1,
            snapshots,
            position: 0,
            cycle: 0,
        })
    }

    /// JSON 배열 형식의 스냅샷 파일 로드
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read replay file {}", path.display()))?;
        let snapshots: Vec<MarketSnapshot> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse replay file {}", path.display()))?;
        info!("📼 재생 파일 로드: {} ({}개 스냅샷)", path.display(), snapshots.len());
        Self::new(snapshots)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[async_trait]
impl MarketFeed for ReplayFeed {
    fn name(&self) -> &str {
        "replay"
    }

    async fn next_snapshot(&mut self) -> Result<MarketSnapshot> {
        let mut snapshot = self.snapshots[self.position].clone();
        snapshot.block_number += self.cycle * self.block_span;

        self.position += 1;
        if self.position == self.snapshots.len() {
            self.position = 0;
            self.cycle += 1;
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex::{DexKind, LiquidityPool};

    fn snapshot(block: u64) -> MarketSnapshot {
        MarketSnapshot {
            block_number: block,
            gas_price_gwei: 10.0,
            pools: vec![LiquidityPool::new("0x01", "WETH", "USDC", DexKind::UniswapV2, 10.0, 25_000.0, 0.3).unwrap()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_cycles_with_increasing_blocks() {
        let mut feed = ReplayFeed::new(vec![snapshot(10), snapshot(11)]).unwrap();
        let blocks: Vec<u64> = {
            let mut blocks = Vec::new();
            for _ in 0..5 {
                blocks.push(feed.next_snapshot().await.unwrap().block_number);
            }
            blocks
        };
        assert_eq!(blocks, vec![10, 11, 12, 13, 14]);
    }

    #[test]
    fn test_empty_or_invalid_rejected() {
        assert!(ReplayFeed::new(Vec::new()).is_err());

        let mut bad = snapshot(1);
        bad.pools[0].reserve_a = -5.0;
        assert!(ReplayFeed::new(vec![bad]).is_err());
    }

    #[test]
    fn test_out_of_order_blocks_rejected() {
        assert!(ReplayFeed::new(vec![snapshot(20), snapshot(10)]).is_err());
        assert!(ReplayFeed::new(vec![snapshot(10), snapshot(10)]).is_err());

        let err = ReplayFeed::new(vec![snapshot(1), snapshot(3), snapshot(2)]).unwrap_err();
        assert!(err.to_string().contains("3 followed by 2"));
    }

    #[tokio::test]
    async fn test_gapped_blocks_keep_increasing_across_cycles() {
        let mut feed = ReplayFeed::new(vec![snapshot(10), snapshot(15)]).unwrap();
        let mut blocks = Vec::new();
        for _ in 0..4 {
            blocks.push(feed.next_snapshot().await.unwrap().block_number);
        }
        assert_eq!(blocks, vec![10, 15, 16, 21]);
    }

    #[tokio::test]
    async fn test_load_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.json");
        let json = serde_json::to_string(&vec![snapshot(5), snapshot(6), snapshot(7)]).unwrap();
        tokio::fs::write(&path, json).await.unwrap();

        let mut feed = ReplayFeed::from_json_file(&path).await.unwrap();
        assert_eq!(feed.len(), 3);
        assert_eq!(feed.next_snapshot().await.unwrap(), snapshot(5));
    }
}
