//! 트레이딩 엔진 CLI.
//!
//! 종료 코드: 0 성공, 1 설정 에러, 2 런타임 에러, 3 데이터 없음.

use clap::{Parser, Subcommand};
use hanquant_core::{QuantError, Ticker};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

mod pipeline;

#[derive(Parser)]
#[command(name = "hanquant")]
#[command(about = "HanQuant Trading Engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 설정 파일 경로 (생략 시 기본값 + 환경 변수)
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// 대상 사용자
    #[arg(long, default_value = "default")]
    user: String,
}

#[derive(Subcommand)]
enum Commands {
    /// 후보 종목에서 진입 시그널 생성 (실행 없이 출력만)
    GenerateSignals {
        /// 후보 종목코드 (쉼표로 구분, 예: "005930,000660")
        #[arg(long)]
        tickers: String,
    },

    /// 보유 포지션 모니터 틱 1회 (트리거 청산 실행)
    MonitorPositions,

    /// 전체 사이클 1회: 청산 -> 진입 생성 -> 검증 -> 실행
    RunCycle {
        /// 후보 종목코드 (쉼표로 구분)
        #[arg(long)]
        tickers: String,
    },

    /// 리스크 점검 1회 (서킷 브레이커 평가)
    RiskCheck,

    /// 데몬 모드: 오케스트레이터 스케줄로 상시 실행
    Daemon {
        /// 후보 종목코드 (쉼표로 구분)
        #[arg(long, default_value = "")]
        tickers: String,
    },
}

fn parse_tickers(raw: &str) -> Result<Vec<Ticker>, QuantError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Ticker::new)
        .collect()
}

/// 에러 분류를 종료 코드로 매핑합니다.
fn exit_code_for(error: &QuantError) -> ExitCode {
    match error {
        QuantError::Config(_) => ExitCode::from(1),
        QuantError::DataQuality(_) | QuantError::NotFound(_) => ExitCode::from(3),
        _ => ExitCode::from(2),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {}", e);
            exit_code_for(&e)
        }
    }
}

async fn run(cli: Cli) -> Result<(), QuantError> {
    let config = hanquant_core::AppConfig::load(cli.config.as_deref(), "TRADING_ENGINE")?;
    hanquant_core::init_logging(&config.logging)?;

    let pipeline = pipeline::Pipeline::build(&config, &cli.user).await?;

    match cli.command {
        Commands::GenerateSignals { tickers } => {
            let candidates = parse_tickers(&tickers)?;
            if candidates.is_empty() {
                return Err(QuantError::Validation(
                    "no candidate tickers given".to_string(),
                ));
            }
            let (signals, stats) = pipeline
                .engine
                .generator()
                .generate_entries(&cli.user, &candidates)
                .await?;
            stats.log_summary("진입 시그널 생성");

            if signals.is_empty() {
                return Err(QuantError::DataQuality(
                    "no signals generated from candidates".to_string(),
                ));
            }
            for signal in &signals {
                println!(
                    "{} {} x{} @ {} (conviction {}, {:?})",
                    signal.kind,
                    signal.ticker,
                    signal.recommended_shares,
                    signal.current_price,
                    signal.conviction_score,
                    signal.strength
                );
            }
        }
        Commands::MonitorPositions => {
            let stats = pipeline
                .engine
                .monitor_once(&cli.user, CancellationToken::new())
                .await?;
            println!(
                "monitor tick: {} exit signals, {} executed, {} rejected",
                stats.generated, stats.executed, stats.rejected
            );
        }
        Commands::RunCycle { tickers } => {
            let candidates = parse_tickers(&tickers)?;
            let stats = pipeline
                .engine
                .run_cycle(&cli.user, &candidates, CancellationToken::new())
                .await?;
            println!(
                "cycle: {} generated, {} validated, {} executed, {} rejected, {} failed",
                stats.generated, stats.validated, stats.executed, stats.rejected, stats.failed
            );
        }
        Commands::RiskCheck => {
            let stats = pipeline
                .engine
                .risk_check_once(&cli.user, CancellationToken::new())
                .await?;
            if stats.generated > 0 {
                println!(
                    "circuit breaker tripped: {} liquidation signals, {} executed",
                    stats.generated, stats.executed
                );
            } else {
                println!("risk check passed");
            }
        }
        Commands::Daemon { tickers } => {
            let candidates = parse_tickers(&tickers)?;
            pipeline.run_daemon(&config, &cli.user, candidates).await?;
        }
    }

    Ok(())
}
