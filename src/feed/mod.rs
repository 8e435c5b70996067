pub mod replay;
pub mod synthetic;

use async_trait::async_trait;
use anyhow::Result;

use crate::config::{Config, SimulationMode};
use crate::types::MarketSnapshot;

pub use replay::ReplayFeed;
pub use synthetic::SyntheticMarketFeed;

/// 마켓 데이터 소스
///
/// 파이프라인의 틱 태스크가 단독으로 소유하며 틱마다 한 번 호출합니다.
#[async_trait]
pub trait MarketFeed: Send {
    fn name(&self) -> &str;

    async fn next_snapshot(&mut self) -> Result<MarketSnapshot>;
}

/// 설정 모드에 맞는 피드 생성
pub async fn from_config(config: &Config) -> Result<Box<dyn MarketFeed>> {
    let sim = &config.simulation;
    match sim.mode {
        SimulationMode::Synthetic | SimulationMode::Realtime => {
            Ok(Box::new(SyntheticMarketFeed::new(sim)))
        }
        SimulationMode::Historical => {
            let path = sim
                .replay_file
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("historical mode requires simulation.replay_file"))?;
            Ok(Box::new(ReplayFeed::from_json_file(path).await?))
        }
    }
}
