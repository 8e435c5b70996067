use async_trait::async_trait;
use anyhow::Result;

use crate::config::StrategyConfig;
use crate::core::bundle::Bundle;
use crate::strategies::base::StrategyCore;
use crate::strategies::stats::StrategyStats;
use crate::types::*;

/// Strategy trait that all MEV strategies must implement
///
/// 공유 상태(이름, 설정, 활성 플래그, 통계)는 `StrategyCore`가 들고 있고, 구현체는
/// `core()`로 그것을 노출합니다. 나머지 기본 메서드는 모두 core에 위임됩니다.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn core(&self) -> &StrategyCore;

    /// 스냅샷에서 기회 탐지. `Err`는 운영상 오류입니다 (기회 없음은 `Ok(None)`)
    async fn detect_opportunity(&self, context: &StrategyContext) -> Result<Option<Opportunity>>;

    /// 검증 후 번들 생성. 실패 시 그 이유를 `StrategyResult`로 반환
    async fn execute_opportunity(&self, opportunity: &Opportunity) -> std::result::Result<Bundle, StrategyResult>;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn is_enabled(&self) -> bool {
        self.core().is_enabled()
    }

    fn set_enabled(&self, enabled: bool) {
        self.core().set_enabled(enabled)
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    /// 통계와 내부 캐시를 비웁니다. 설정은 유지됩니다.
    async fn reset(&self) {
        self.core().reset_stats().await;
    }

    async fn update_config(&self, config: StrategyConfig) {
        self.core().update_config(config).await;
    }

    async fn stats(&self) -> StrategyStats {
        self.core().stats().await
    }
}
