use std::path::Path;
use std::sync::Arc;
use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tokio::signal;

use mev_simulator::config::{Config, SimulationMode};
use mev_simulator::constants::DEFAULT_COLLECTOR_CAPACITY;
use mev_simulator::core::{Bundle, BundleCollector, SimulationStats, Simulator};
use mev_simulator::feed;
use mev_simulator::monitoring::MetricsRegistry;
use mev_simulator::strategies::{StrategyEngine, StrategyStats};
use mev_simulator::types::SimulationState;

/// `--export-json` 결과 형식
#[derive(Serialize)]
struct ExportReport {
    final_state: SimulationState,
    stats: SimulationStats,
    strategies: Vec<StrategyExport>,
    bundles: Vec<Bundle>,
}

#[derive(Serialize)]
struct StrategyExport {
    name: String,
    stats: StrategyStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("mev-simulator")
        .version(env!("CARGO_PKG_VERSION"))
        .author("xCrack Team <team@xcrack.dev>")
        .about("🦀 MEV 전략 시뮬레이터 - 아비트래지 탐지 파이프라인")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("설정 파일 경로")
                .default_value("config/default.toml")
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("로그 레벨 (trace, debug, info, warn, error)")
        )
        .arg(
            Arg::new("strategies")
                .short('s')
                .long("strategies")
                .value_name("STRATEGIES")
                .help("활성화할 전략들 (쉼표 구분, 예: arbitrage)")
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("시뮬레이션 모드 (realtime, historical, synthetic)")
        )
        .arg(
            Arg::new("blocks")
                .short('b')
                .long("blocks")
                .value_name("N")
                .help("처리할 블록 수")
                .value_parser(clap::value_parser!(u64))
        )
        .arg(
            Arg::new("duration")
                .short('d')
                .long("duration")
                .value_name("SECONDS")
                .help("실행 시간 (초)")
                .value_parser(clap::value_parser!(u64))
        )
        .arg(
            Arg::new("tx-rate")
                .long("tx-rate")
                .value_name("TPS")
                .help("합성 멤풀 트랜잭션 발생률 (초당)")
                .value_parser(clap::value_parser!(f64))
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("SEED")
                .help("합성 마켓 난수 시드")
                .value_parser(clap::value_parser!(u64))
        )
        .arg(
            Arg::new("visualize")
                .long("visualize")
                .help("진행 상황 주기적 출력")
                .action(ArgAction::SetTrue)
        )
        .arg(
            Arg::new("export-json")
                .long("export-json")
                .value_name("FILE")
                .help("종료 시 통계와 번들을 JSON 으로 내보내기")
        )
        .arg(
            Arg::new("export-csv")
                .long("export-csv")
                .value_name("FILE")
                .help("종료 시 요약과 전략별 통계를 CSV 로 내보내기")
        )
        .get_matches();

    dotenvy::dotenv().ok();

    let config_path = matches
        .get_one::<String>("config")
        .cloned()
        .unwrap_or_else(|| "config/default.toml".to_string());
    let mut config = if Path::new(&config_path).exists() {
        Config::load(&config_path).await?
    } else {
        Config::default()
    };

    // 명령줄 옵션 적용
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.monitoring.log_level = level.clone();
    }
    if let Some(mode) = matches.get_one::<String>("mode") {
        config.simulation.mode = mode.parse::<SimulationMode>()?;
    }
    if let Some(blocks) = matches.get_one::<u64>("blocks") {
        config.simulation.block_count = Some(*blocks);
    }
    if let Some(duration) = matches.get_one::<u64>("duration") {
        config.simulation.duration_seconds = Some(*duration);
    }
    if let Some(rate) = matches.get_one::<f64>("tx-rate") {
        config.simulation.tx_rate = *rate;
    }
    if let Some(seed) = matches.get_one::<u64>("seed") {
        config.simulation.seed = *seed;
    }
    if matches.get_flag("visualize") {
        config.monitoring.visualization = true;
    }
    if let Some(strategies) = matches.get_one::<String>("strategies") {
        let selection: Vec<String> = strategies
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        config.apply_strategy_selection(&selection);
    }

    // 로깅 초기화 (RUST_LOG 우선)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.monitoring.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();
    info!("📋 설정: {} (모드 {:?})", config_path, config.simulation.mode);

    if let Err(e) = config.validate() {
        error!("❌ 설정 검증 실패: {:#}", e);
        std::process::exit(1);
    }
    info!("🎯 활성 전략: {:?}", config.enabled_strategies());

    let registry = MetricsRegistry::new();
    let engine = StrategyEngine::from_config(&config, &registry)?;
    let market_feed = feed::from_config(&config).await?;
    let metrics_enabled = config.monitoring.metrics_enabled;
    let export_path = matches.get_one::<String>("export-json").cloned();
    let csv_path = matches.get_one::<String>("export-csv").cloned();
    // JSON 내보내기에는 전체 번들 목록이 필요
    let collector = Arc::new(if export_path.is_some() {
        BundleCollector::new()
    } else {
        BundleCollector::with_capacity(DEFAULT_COLLECTOR_CAPACITY)
    });

    let simulator = Arc::new(Simulator::new(config, engine, market_feed, collector.clone(), &registry));
    simulator.initialize().await?;
    simulator.start().await?;

    // 신호 처리 설정
    let signal_simulator = Arc::clone(&simulator);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                warn!("🛑 종료 신호 수신됨, 안전하게 종료 중...");
                if let Err(e) = signal_simulator.stop().await {
                    error!("❌ 시뮬레이터 중지 실패: {}", e);
                }
            }
            Err(err) => error!("❌ 신호 처리 오류: {}", err),
        }
    });

    let final_state = simulator.wait_for_completion().await;
    if final_state == SimulationState::Error {
        match simulator.take_last_error().await {
            Some(e) => error!("💥 시뮬레이션이 오류로 종료되었습니다: {}", e),
            None => error!("💥 시뮬레이션이 오류로 종료되었습니다"),
        }
    }

    simulator.engine().print_stats().await;
    simulator.print_summary().await;
    let stats = simulator.stats().await;
    if metrics_enabled {
        info!("📡 메트릭:\n{}", registry.to_prometheus());
    }

    if let Some(path) = export_path {
        let report = ExportReport {
            final_state,
            stats: stats.clone(),
            strategies: simulator
                .engine()
                .stats_snapshot()
                .await
                .into_iter()
                .map(|(name, stats)| StrategyExport { name, stats })
                .collect(),
            bundles: collector.bundles().await,
        };
        let json = serde_json::to_string_pretty(&report).context("failed to serialize export")?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("failed to write export file {}", path))?;
        info!("💾 결과 내보내기 완료: {}", path);
    }

    if let Some(path) = csv_path {
        let csv = stats.to_csv(&simulator.engine().stats_snapshot().await);
        tokio::fs::write(&path, csv)
            .await
            .with_context(|| format!("failed to write CSV export {}", path))?;
        info!("💾 CSV 내보내기 완료: {}", path);
    }

    if final_state == SimulationState::Error {
        std::process::exit(1);
    }
    Ok(())
}

fn print_banner() {
    println!(r#"
    ╔══════════════════════════════════════════════════════════════╗
    ║                                                              ║
    ║  🦀 xCrack MEV 전략 시뮬레이터                               ║
    ║                                                              ║
    ║  🎯 전략:                                                    ║
    ║     • DEX 간 차익거래 (Cross-DEX Arbitrage)                  ║
    ║     • 삼각 차익거래 (Triangular Arbitrage)                   ║
    ║     • 다중 홉 경로 (Complex Paths)                           ║
    ║                                                              ║
    ║  🛡️ 안전 장치:                                              ║
    ║     • 서명/브로드캐스트 없음 (시뮬레이션 전용)               ║
    ║     • 수익성/슬리피지/가스 검증                              ║
    ║     • 전략별 장애 격리                                       ║
    ║                                                              ║
    ╚══════════════════════════════════════════════════════════════╝
    "#);
}
