use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, SimulationMode};
use crate::core::performance_tracker::{PerformanceTracker, SimulationStats};
use crate::core::state::StateMachine;
use crate::core::submission::SubmissionSink;
use crate::feed::MarketFeed;
use crate::monitoring::MetricsSink;
use crate::strategies::StrategyEngine;
use crate::types::{SimResult, SimulationState, SimulatorError, StrategyContext};

/// 태스크들이 공유하는 파이프라인 구성요소
struct Shared {
    config: Config,
    engine: StrategyEngine,
    feed: Mutex<Box<dyn MarketFeed>>,
    submission: Arc<dyn SubmissionSink>,
    tracker: PerformanceTracker,
    state: StateMachine,
    last_error: Mutex<Option<SimulatorError>>,
}

/// 시뮬레이션 파이프라인
///
/// 틱 태스크가 피드에서 스냅샷을 받아 엔진을 돌리고 번들을 제출합니다. 통계 태스크는
/// 처리량과 게이지를 주기적으로 갱신하며, 시각화 태스크는 진행 상황을 로그로 남깁니다.
/// 정지와 일시정지는 틱 경계에서만 반영됩니다.
pub struct Simulator {
    shared: Arc<Shared>,
    initialized: AtomicBool,
    cancel: Mutex<CancellationToken>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Simulator {
    pub fn new(
        config: Config,
        engine: StrategyEngine,
        feed: Box<dyn MarketFeed>,
        submission: Arc<dyn SubmissionSink>,
        metrics: &dyn MetricsSink,
    ) -> Self {
        let tracker = PerformanceTracker::new(config.performance.latency_target_ms, metrics);
        Self {
            shared: Arc::new(Shared {
                config,
                engine,
                feed: Mutex::new(feed),
                submission,
                tracker,
                state: StateMachine::new(),
                last_error: Mutex::new(None),
            }),
            initialized: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> SimulationState {
        self.shared.state.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<SimulationState> {
        self.shared.state.subscribe()
    }

    pub fn engine(&self) -> &StrategyEngine {
        &self.shared.engine
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub async fn stats(&self) -> SimulationStats {
        self.shared.tracker.snapshot().await
    }

    pub async fn print_summary(&self) {
        self.shared.tracker.print_summary().await;
    }

    /// 실행을 Error 로 끝낸 원인을 꺼냄
    pub async fn take_last_error(&self) -> Option<SimulatorError> {
        self.shared.last_error.lock().await.take()
    }

    /// 설정 검증과 전략 초기화
    ///
    /// Initializing, Error, Stopped 에서만 허용됩니다. 전략 초기화가 실패하면 Error 로
    /// 전이합니다.
    pub async fn initialize(&self) -> SimResult<()> {
        let current = self.state();
        match current {
            SimulationState::Initializing => {}
            SimulationState::Error | SimulationState::Stopped => {
                self.join_tasks().await;
                self.shared.last_error.lock().await.take();
                self.shared.state.transition(current, SimulationState::Initializing)?;
            }
            other => {
                return Err(SimulatorError::InvalidTransition { from: other, to: SimulationState::Initializing });
            }
        }

        info!("🔧 시뮬레이터 초기화 중...");
        self.shared
            .config
            .validate()
            .map_err(|e| SimulatorError::Config(format!("{:#}", e)))?;

        if let Err(e) = self.shared.engine.initialize_all().await {
            error!("❌ 시뮬레이터 초기화 실패: {}", e);
            self.shared.state.fail();
            return Err(e);
        }

        self.shared.tracker.reset().await;
        self.initialized.store(true, Ordering::SeqCst);
        info!(
            "✅ 시뮬레이터 초기화 완료 (모드: {:?}, 전략 {}개)",
            self.shared.config.simulation.mode,
            self.shared.engine.enabled_count()
        );
        Ok(())
    }

    /// 틱/통계/시각화 태스크 시작
    pub async fn start(&self) -> SimResult<()> {
        let current = self.state();
        if current != SimulationState::Initializing || !self.initialized.load(Ordering::SeqCst) {
            warn!("⚠️ 초기화되지 않은 시뮬레이터 시작 시도 (상태: {})", current);
            return Err(SimulatorError::NotInitialized(current));
        }
        self.shared.state.transition(SimulationState::Initializing, SimulationState::Running)?;
        self.initialized.store(false, Ordering::SeqCst);

        let cancel = CancellationToken::new();
        *self.cancel.lock().await = cancel.clone();
        self.shared.tracker.start().await;

        info!("🚀 시뮬레이션 시작");
        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(tick_loop(Arc::clone(&self.shared), cancel.clone())));
        tasks.push(tokio::spawn(stats_loop(Arc::clone(&self.shared), cancel.clone())));
        if self.shared.config.monitoring.visualization {
            tasks.push(tokio::spawn(visualization_loop(Arc::clone(&self.shared), cancel)));
        }
        Ok(())
    }

    pub fn pause(&self) -> SimResult<()> {
        self.shared.state.transition(SimulationState::Running, SimulationState::Paused)?;
        info!("⏸️ 시뮬레이션 일시정지");
        Ok(())
    }

    pub fn resume(&self) -> SimResult<()> {
        self.shared.state.transition(SimulationState::Paused, SimulationState::Running)?;
        info!("▶️ 시뮬레이션 재개");
        Ok(())
    }

    /// 진행 중인 틱이 끝나기를 기다린 뒤 Stopped 로 전이
    pub async fn stop(&self) -> SimResult<()> {
        match self
            .shared
            .state
            .transition_from(&[SimulationState::Running, SimulationState::Paused], SimulationState::Stopping)
        {
            Ok(_) => {
                info!("🛑 시뮬레이션 정지 중...");
                self.cancel.lock().await.cancel();
                self.join_tasks().await;
                finalize(&self.shared).await;
                Ok(())
            }
            // 실행 한도 도달로 이미 정지 중이면 마무리를 기다림
            Err(_) if matches!(self.state(), SimulationState::Stopping | SimulationState::Stopped) => {
                self.join_tasks().await;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// 실행이 Stopped 또는 Error 로 끝날 때까지 대기
    pub async fn wait_for_completion(&self) -> SimulationState {
        let mut rx = self.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            if matches!(state, SimulationState::Stopped | SimulationState::Error) {
                break;
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        self.join_tasks().await;
        self.state()
    }

    /// Error 에서 엔진과 통계를 초기화하고 Initializing 으로 복귀
    pub async fn recover_from_error(&self) -> SimResult<()> {
        let current = self.state();
        if current != SimulationState::Error {
            return Err(SimulatorError::InvalidTransition { from: current, to: SimulationState::Initializing });
        }

        info!("🔄 오류 상태에서 복구 중...");
        self.cancel.lock().await.cancel();
        self.join_tasks().await;
        self.shared.engine.reset_all().await;
        self.shared.tracker.reset().await;
        self.shared.last_error.lock().await.take();
        self.initialized.store(false, Ordering::SeqCst);
        self.shared.state.transition(SimulationState::Error, SimulationState::Initializing)?;
        info!("✅ 복구 완료, 재초기화 필요");
        Ok(())
    }

    async fn join_tasks(&self) {
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("❌ 시뮬레이션 태스크 비정상 종료: {}", e);
            }
        }
    }
}

fn tick_interval(config: &Config) -> Duration {
    let ms = match config.simulation.mode {
        SimulationMode::Realtime => config.simulation.block_time_seconds.max(1) * 1_000,
        SimulationMode::Synthetic | SimulationMode::Historical => config.simulation.tick_interval_ms.max(1),
    };
    Duration::from_millis(ms)
}

/// Paused 가 풀릴 때까지 대기, 취소되면 false
async fn wait_while_paused(shared: &Shared, cancel: &CancellationToken) -> bool {
    let mut rx = shared.state.subscribe();
    loop {
        if *rx.borrow_and_update() != SimulationState::Paused {
            return true;
        }
        tokio::select! {
            _ = cancel.cancelled() => return false,
            changed = rx.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}

async fn tick_loop(shared: Arc<Shared>, cancel: CancellationToken) {
    let sim = &shared.config.simulation;
    let mut interval = tokio::time::interval(tick_interval(&shared.config));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let started = Instant::now();
    let mut blocks: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        if !wait_while_paused(&shared, &cancel).await {
            break;
        }
        match shared.state.current() {
            SimulationState::Running => {}
            // 대기가 끝난 직후 다시 일시정지됨
            SimulationState::Paused => continue,
            _ => break,
        }

        let bound_reached = sim.block_count.map_or(false, |limit| blocks >= limit)
            || sim
                .duration_seconds
                .map_or(false, |limit| started.elapsed() >= Duration::from_secs(limit));
        if bound_reached {
            if shared
                .state
                .transition_from(&[SimulationState::Running, SimulationState::Paused], SimulationState::Stopping)
                .is_ok()
            {
                info!("🏁 실행 한도 도달 ({}개 블록), 정지 중...", blocks);
                cancel.cancel();
                finalize(&shared).await;
            }
            break;
        }

        let snapshot = match shared.feed.lock().await.next_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let err = SimulatorError::Feed(format!("{:#}", e));
                error!("💥 {}", err);
                *shared.last_error.lock().await = Some(err);
                shared.state.fail();
                cancel.cancel();
                break;
            }
        };

        let transactions = snapshot.mempool_transactions.len();
        let context = StrategyContext::from_snapshot(snapshot, cancel.clone());
        let report = shared.engine.run_tick(&context).await;

        for bundle in report.bundles.iter().cloned() {
            let id = bundle.id().to_string();
            match shared.submission.submit_bundle(bundle).await {
                Ok(()) => shared.tracker.record_bundle_submitted().await,
                Err(e) => warn!("⚠️ 번들 제출 실패 {}: {:#}", id, e),
            }
        }
        shared.tracker.record_tick(&report, transactions).await;
        blocks += 1;

        debug!(
            "🧱 블록 {} 처리: 전략 {}개, 기회 {}개, 번들 {}개, {:.1}μs",
            report.block_number,
            report.strategies_run(),
            report.opportunities_detected(),
            report.bundles.len(),
            report.latency_us
        );
    }
    debug!("🔚 틱 루프 종료");
}

async fn stats_loop(shared: Arc<Shared>, cancel: CancellationToken) {
    let period = Duration::from_millis(shared.config.performance.stats_interval_ms.max(1));
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let stats = shared.tracker.refresh().await;
                if let Err(e) = shared.submission.export_stats(&stats).await {
                    warn!("⚠️ 통계 내보내기 실패: {:#}", e);
                }
            }
        }
    }
    debug!("🔚 통계 루프 종료");
}

async fn visualization_loop(shared: Arc<Shared>, cancel: CancellationToken) {
    let period = Duration::from_millis(shared.config.monitoring.visualization_interval_ms.max(1));
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let stats = shared.tracker.snapshot().await;
                info!(
                    "📈 [{}] 블록 {} | tx {} | 기회 {} | 번들 {} | 수익 {:.4} ETH | 틱 {:.1}μs",
                    shared.state.current(),
                    stats.blocks_processed,
                    stats.transactions_processed,
                    stats.opportunities_detected,
                    stats.bundles_submitted,
                    stats.total_profit_eth,
                    stats.avg_tick_latency_us
                );
            }
        }
    }
}

/// Stopping 에서 호출: 전략 종료, 최종 통계 내보내기, Stopped 전이
async fn finalize(shared: &Shared) {
    shared.engine.shutdown_all().await;
    let stats = shared.tracker.refresh().await;
    if let Err(e) = shared.submission.export_stats(&stats).await {
        warn!("⚠️ 최종 통계 내보내기 실패: {:#}", e);
    }
    if let Err(e) = shared.state.transition(SimulationState::Stopping, SimulationState::Stopped) {
        error!("❌ 정지 전이 실패: {}", e);
        return;
    }
    info!("✅ 시뮬레이션 정지 완료");
}
