//! 캔들 수집기 CLI.

use clap::{Parser, Subcommand, ValueEnum};
use std::sync::Arc;

use stock_collector::{
    CandleCollector, CollectorConfig, CollectorError, RateLimitPolicy, Schedule,
};
use stock_core::{
    init_logging, CandleInterval, CollectionResult, FetchRange, LogConfig, ManagedTicker,
    TickerRegistry, DEFAULT_EXCHANGE,
};
use stock_source::{KisAdapter, SourceAdapter, TiingoAdapter, YahooAdapter, YahooConfig};
use stock_store::{CandleRepository, Database, TickerRepository};

/// `collect-60m`에서 종목당 요청하는 60분봉 수.
const KIS_RECENT_60M: u32 = 10;
/// `collect-daily`에서 종목당 요청하는 일봉 수.
const KIS_RECENT_DAILY: u32 = 30;
/// `update` 명령의 일봉 조회 기간.
const KIS_UPDATE_DAYS: u32 = 365;

#[derive(Parser)]
#[command(name = "stock-collector")]
#[command(about = "Scheduled multi-source candle collector", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 로그 레벨 (trace, debug, info, warn, error). 지정하면 RUST_LOG보다 우선합니다
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceArg {
    Kis,
    Yf,
    Tiingo,
}

#[derive(Subcommand)]
enum Commands {
    /// 티커 등록 후 KIS 일봉 백필
    AddTicker {
        symbol: String,
        /// 거래소 코드 (NAS, NYS, AMS, KRX)
        #[arg(short, long, default_value = DEFAULT_EXCHANGE)]
        exchange: String,
        /// 종목명
        #[arg(short, long)]
        name: Option<String>,
        /// 백필할 일봉 기간 (일). 0이면 백필하지 않음
        #[arg(long, default_value_t = 365)]
        backfill_days: u32,
    },

    /// 티커 정보 수정
    UpdateTicker {
        symbol: String,
        #[arg(short, long)]
        exchange: Option<String>,
        #[arg(short, long)]
        name: Option<String>,
    },

    /// 1년치 일봉 업데이트 (KIS)
    Update { symbol: String },

    /// 티커 비활성화
    DeactivateTicker { symbol: String },

    /// 티커 활성화
    ActivateTicker { symbol: String },

    /// 티커 목록 조회
    ListTickers {
        /// 비활성 티커 포함
        #[arg(long)]
        all: bool,
    },

    /// 미국 주식 현재가 조회 (KIS, NAS → NYS → AMS)
    Quote { symbol: String },

    /// 60분봉 수집 (KIS)
    #[command(name = "collect-60m")]
    Collect60m,

    /// 일봉 수집 (KIS)
    CollectDaily,

    /// 60분봉 수집 (Yahoo Finance)
    #[command(name = "yf-collect-60m")]
    YfCollect60m {
        #[arg(short, long, default_value = "5d")]
        period: String,
        /// 프리/애프터마켓 제외
        #[arg(long)]
        no_extended: bool,
    },

    /// 일봉 수집 (Yahoo Finance)
    YfCollectDaily {
        #[arg(short, long, default_value = "1mo")]
        period: String,
    },

    /// 단일 종목 수집 (Yahoo Finance)
    YfCollect {
        symbol: String,
        #[arg(short, long, default_value = "60m")]
        interval: CandleInterval,
        /// 조회 기간 (기본: 60분봉 5d, 일봉 1mo)
        #[arg(short, long)]
        period: Option<String>,
        #[arg(long)]
        no_extended: bool,
    },

    /// 60분봉 수집 (Tiingo IEX)
    #[command(name = "tiingo-collect-60m")]
    TiingoCollect60m {
        #[arg(short, long, default_value_t = 5)]
        days: u32,
        #[arg(long)]
        no_extended: bool,
    },

    /// 일봉 수집 (Tiingo)
    TiingoCollectDaily {
        #[arg(short, long, default_value_t = 30)]
        days: u32,
    },

    /// 단일 종목 수집 (Tiingo)
    TiingoCollect {
        symbol: String,
        #[arg(short, long, default_value = "60m")]
        interval: CandleInterval,
        #[arg(short, long, default_value_t = 5)]
        days: u32,
        #[arg(long)]
        no_extended: bool,
    },

    /// 데몬 모드: 60분봉 주기 수집 + 매일 정해진 시각 일봉 수집
    Daemon {
        #[arg(long, value_enum, default_value = "kis")]
        source: SourceArg,
    },
}

/// 풀을 공유하는 저장소 묶음.
struct Stores {
    tickers: Arc<TickerRepository>,
    candles: Arc<CandleRepository>,
}

impl Stores {
    fn collector<A: SourceAdapter>(&self, adapter: A, policy: RateLimitPolicy) -> CandleCollector<A> {
        CandleCollector::new(adapter, self.tickers.clone(), self.candles.clone(), policy)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let mut log_config = LogConfig::from_env();
    if let Some(level) = &cli.log_level {
        log_config.level = level.clone();
        log_config = log_config.overriding_env();
    }
    init_logging(log_config)?;

    let config = CollectorConfig::from_env()?;

    let db = Database::connect(&config.database()).await?;
    db.ensure_schema().await?;

    let stores = Stores {
        tickers: Arc::new(TickerRepository::new(db.pool().clone())),
        candles: Arc::new(CandleRepository::new(db.pool().clone())),
    };

    let result = run(cli.command, &config, &stores).await;

    db.pool().close().await;
    result?;
    Ok(())
}

async fn run(command: Commands, config: &CollectorConfig, stores: &Stores) -> stock_collector::Result<()> {
    match command {
        Commands::AddTicker {
            symbol,
            exchange,
            name,
            backfill_days,
        } => {
            let id = stores.tickers.register(&symbol, &exchange, name.as_deref()).await?;
            let ticker = require_ticker(stores, &symbol).await?;
            println!("티커 등록 완료: {} ({}) - ID: {}", ticker.symbol, ticker.exchange, id);

            if backfill_days == 0 {
                return Ok(());
            }
            if config.kis.is_none() {
                tracing::warn!(symbol = %ticker.symbol, "KIS 인증 정보가 없어 일봉 백필을 건너뜁니다");
                return Ok(());
            }

            println!("\n{} {}일 일봉 수집 시작...", ticker.symbol, backfill_days);
            let collector = stores.collector(KisAdapter::new(config.kis_config()?)?, RateLimitPolicy::none());
            let result = collector
                .collect_registered(&ticker.symbol, CandleInterval::Daily, &FetchRange::Days(backfill_days))
                .await?;
            print_result(&ticker.symbol, CandleInterval::Daily, &result);
        }

        Commands::UpdateTicker {
            symbol,
            exchange,
            name,
        } => {
            require_ticker(stores, &symbol).await?;
            if stores
                .tickers
                .update(&symbol, exchange.as_deref(), name.as_deref())
                .await?
            {
                let ticker = require_ticker(stores, &symbol).await?;
                println!(
                    "티커 수정 완료: {} ({}) - {}",
                    ticker.symbol,
                    ticker.exchange,
                    ticker.name.as_deref().unwrap_or("N/A")
                );
            } else {
                println!("변경할 항목이 없습니다: {}", symbol);
            }
        }

        Commands::Update { symbol } => {
            let ticker = require_ticker(stores, &symbol).await?;
            let kis = config.kis_config()?;
            println!("{} ({}) 1년치 일봉 업데이트 시작...", ticker.symbol, ticker.exchange);
            let collector = stores.collector(KisAdapter::new(kis)?, RateLimitPolicy::none());
            let result = collector
                .collect_registered(&ticker.symbol, CandleInterval::Daily, &FetchRange::Days(KIS_UPDATE_DAYS))
                .await?;
            print_result(&ticker.symbol, CandleInterval::Daily, &result);
        }

        Commands::DeactivateTicker { symbol } => {
            require_ticker(stores, &symbol).await?;
            stores.tickers.deactivate(&symbol).await?;
            println!("티커 비활성화 완료: {}", symbol.to_uppercase());
        }

        Commands::ActivateTicker { symbol } => {
            require_ticker(stores, &symbol).await?;
            stores.tickers.activate(&symbol).await?;
            println!("티커 활성화 완료: {}", symbol.to_uppercase());
        }

        Commands::ListTickers { all } => {
            let tickers = if all {
                stores.tickers.list_all().await?
            } else {
                stores.tickers.list_active().await?
            };
            print_tickers(&tickers, all);
        }

        Commands::Quote { symbol } => {
            let adapter = KisAdapter::new(config.kis_config()?)?;
            let quote = adapter.quote(&symbol).await?;
            let Some(quote) = quote else {
                return Err(CollectorError::TickerNotFound(symbol));
            };
            let fmt_opt = |v: Option<rust_decimal::Decimal>| v.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
            println!(
                "{} [{}] {} ({} / {}%)",
                quote.symbol,
                quote.exchange,
                quote.price,
                fmt_opt(quote.diff),
                fmt_opt(quote.rate)
            );
        }

        Commands::Collect60m => {
            let collector = kis_collector(config, stores)?;
            let results = collector
                .collect(CandleInterval::Hour1, &FetchRange::Recent(KIS_RECENT_60M))
                .await?;
            print_results("KIS 60분봉", &results);
        }

        Commands::CollectDaily => {
            let collector = kis_collector(config, stores)?;
            let results = collector
                .collect(CandleInterval::Daily, &FetchRange::Recent(KIS_RECENT_DAILY))
                .await?;
            print_results("KIS 일봉", &results);
        }

        Commands::YfCollect60m { period, no_extended } => {
            let collector = yahoo_collector(config, stores, !no_extended)?;
            let results = collector
                .collect(CandleInterval::Hour1, &FetchRange::Period(period))
                .await?;
            print_results("yfinance 60분봉", &results);
        }

        Commands::YfCollectDaily { period } => {
            let collector = yahoo_collector(config, stores, config.schedule.yf_extended_hours)?;
            let results = collector
                .collect(CandleInterval::Daily, &FetchRange::Period(period))
                .await?;
            print_results("yfinance 일봉", &results);
        }

        Commands::YfCollect {
            symbol,
            interval,
            period,
            no_extended,
        } => {
            let period = period.unwrap_or_else(|| match interval {
                CandleInterval::Hour1 => "5d".to_string(),
                CandleInterval::Daily => "1mo".to_string(),
            });
            let collector = yahoo_collector(config, stores, !no_extended)?;
            let result = collector
                .collect_symbol(&symbol, interval, &FetchRange::Period(period))
                .await?;
            print_result(&symbol, interval, &result);
        }

        Commands::TiingoCollect60m { days, no_extended } => {
            let collector = tiingo_collector(config, stores, !no_extended)?;
            let results = collector
                .collect(CandleInterval::Hour1, &FetchRange::Days(days))
                .await?;
            print_results("Tiingo 60분봉", &results);
        }

        Commands::TiingoCollectDaily { days } => {
            let collector = tiingo_collector(config, stores, true)?;
            let results = collector
                .collect(CandleInterval::Daily, &FetchRange::Days(days))
                .await?;
            print_results("Tiingo 일봉", &results);
        }

        Commands::TiingoCollect {
            symbol,
            interval,
            days,
            no_extended,
        } => {
            let collector = tiingo_collector(config, stores, !no_extended)?;
            let result = collector
                .collect_symbol(&symbol, interval, &FetchRange::Days(days))
                .await?;
            print_result(&symbol, interval, &result);
        }

        Commands::Daemon { source } => {
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "종료 신호 대기 실패");
                    std::future::pending::<()>().await;
                }
            };
            let sched = &config.schedule;

            match source {
                SourceArg::Kis => {
                    let schedule = Schedule {
                        intraday_every: Some(sched.interval_60m()),
                        daily_at: sched.daily_collect_time,
                        intraday_range: FetchRange::Recent(KIS_RECENT_60M),
                        daily_range: FetchRange::Recent(KIS_RECENT_DAILY),
                    };
                    kis_collector(config, stores)?.run(&schedule, shutdown).await;
                }
                SourceArg::Yf => {
                    let schedule = Schedule {
                        intraday_every: Some(sched.interval_60m()),
                        daily_at: sched.daily_collect_time,
                        intraday_range: FetchRange::Period("5d".to_string()),
                        daily_range: FetchRange::Period("1mo".to_string()),
                    };
                    yahoo_collector(config, stores, sched.yf_extended_hours)?
                        .run(&schedule, shutdown)
                        .await;
                }
                SourceArg::Tiingo => {
                    // 무료 티어 쿼터 때문에 60분봉도 하루 한 번 일봉과 함께 수집
                    let schedule = Schedule {
                        intraday_every: None,
                        daily_at: sched.daily_collect_time,
                        intraday_range: FetchRange::Days(sched.tiingo_days_60m),
                        daily_range: FetchRange::Days(sched.tiingo_days_daily),
                    };
                    tiingo_collector(config, stores, true)?
                        .run(&schedule, shutdown)
                        .await;
                }
            }
        }
    }

    Ok(())
}

async fn require_ticker(stores: &Stores, symbol: &str) -> stock_collector::Result<ManagedTicker> {
    stores
        .tickers
        .get(symbol)
        .await?
        .ok_or_else(|| CollectorError::TickerNotFound(symbol.to_string()))
}

fn kis_collector(config: &CollectorConfig, stores: &Stores) -> stock_collector::Result<CandleCollector<KisAdapter>> {
    let adapter = KisAdapter::new(config.kis_config()?)?;
    Ok(stores.collector(adapter, config.delays.kis_policy()))
}

fn yahoo_collector(
    config: &CollectorConfig,
    stores: &Stores,
    extended_hours: bool,
) -> stock_collector::Result<CandleCollector<YahooAdapter>> {
    let adapter = YahooAdapter::new(YahooConfig { extended_hours })?;
    Ok(stores.collector(adapter, config.delays.yahoo_policy()))
}

fn tiingo_collector(
    config: &CollectorConfig,
    stores: &Stores,
    after_hours: bool,
) -> stock_collector::Result<CandleCollector<TiingoAdapter>> {
    let adapter = TiingoAdapter::new(config.tiingo_config()?.with_after_hours(after_hours))?;
    Ok(stores.collector(adapter, config.delays.tiingo_policy()))
}

fn print_result(symbol: &str, interval: CandleInterval, result: &CollectionResult) {
    let status = if result.success {
        "성공".to_string()
    } else {
        format!("실패: {}", result.error_message.as_deref().unwrap_or("unknown"))
    };
    println!("\n{} ({}): {} ({}건)", symbol.to_uppercase(), interval, status, result.records_saved);
}

fn print_results(title: &str, results: &[CollectionResult]) {
    println!("\n=== {} 수집 결과 ===", title);
    for r in results {
        let status = if r.success {
            "성공".to_string()
        } else {
            format!("실패: {}", r.error_message.as_deref().unwrap_or("unknown"))
        };
        println!("  {}: {} ({}건)", r.symbol, status, r.records_saved);
    }
}

fn print_tickers(tickers: &[ManagedTicker], all: bool) {
    let label = if all { "전체" } else { "활성" };
    println!("{} 티커 목록 ({}개):", label, tickers.len());
    println!("{}", "-".repeat(78));
    println!("  {:10} | {:5} | {:20} | {:6} | 마지막 수집", "심볼", "거래소", "종목명", "상태");
    println!("{}", "-".repeat(78));
    for t in tickers {
        let collected = t
            .last_collected_at
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "N/A".to_string());
        let status = if t.is_active { "active" } else { "off" };
        println!(
            "  {:10} | {:5} | {:20} | {:6} | {}",
            t.symbol,
            t.exchange,
            t.name.as_deref().unwrap_or("N/A"),
            status,
            collected
        );
    }
}
