//! 캔들 수집 스케줄러.
//!
//! 하나의 [`CandleCollector`]가 어댑터와 딜레이 정책만 바꿔 KIS, Yahoo, Tiingo를
//! 모두 처리합니다. 종목별 흐름은 조회 → 정규화 → upsert → `mark_collected`이며,
//! 한 종목의 실패는 결과에만 기록되고 다음 종목으로 넘어갑니다.

use chrono::{Local, NaiveDateTime, NaiveTime};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Instrument};

use stock_core::{
    CandleInterval, CandleSink, CandleSource, CollectionResult, FetchRange, ManagedTicker,
    TickerRegistry,
};
use stock_source::{normalize, SourceAdapter};

use crate::error::CollectorError;
use crate::rate_limit::RateLimitPolicy;
use crate::stats::CollectionStats;
use crate::Result;

/// 데몬 스케줄.
#[derive(Debug, Clone)]
pub struct Schedule {
    /// 60분봉 수집 주기. `None`이면 60분봉도 일일 작업에서 함께 수집합니다.
    pub intraday_every: Option<Duration>,
    /// 일봉 수집 시각 (로컬 시간)
    pub daily_at: NaiveTime,
    /// 60분봉 조회 범위
    pub intraday_range: FetchRange,
    /// 일봉 조회 범위
    pub daily_range: FetchRange,
}

/// 소스 하나에 대한 캔들 수집기.
pub struct CandleCollector<A> {
    adapter: A,
    registry: Arc<dyn TickerRegistry>,
    sink: Arc<dyn CandleSink>,
    policy: RateLimitPolicy,
}

impl<A: SourceAdapter> CandleCollector<A> {
    pub fn new(
        adapter: A,
        registry: Arc<dyn TickerRegistry>,
        sink: Arc<dyn CandleSink>,
        policy: RateLimitPolicy,
    ) -> Self {
        Self {
            adapter,
            registry,
            sink,
            policy,
        }
    }

    pub fn source(&self) -> CandleSource {
        self.adapter.source()
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// 모든 활성 종목을 수집합니다.
    ///
    /// 종목 사이에는 정책에 따른 딜레이를 두며 마지막 종목 뒤에는 기다리지 않습니다.
    pub async fn collect(
        &self,
        interval: CandleInterval,
        range: &FetchRange,
    ) -> Result<Vec<CollectionResult>> {
        let tickers = self.registry.list_active().await?;
        let delay = self.policy.delay_for(tickers.len());

        info!(
            source = %self.source().display_name(),
            interval = %interval,
            range = %range,
            tickers = tickers.len(),
            delay_secs = delay.as_secs_f64(),
            "캔들 수집 시작"
        );

        let mut results = Vec::with_capacity(tickers.len());
        for (idx, ticker) in tickers.iter().enumerate() {
            if idx > 0 && !delay.is_zero() {
                debug!(next = %ticker.symbol, delay_secs = delay.as_secs_f64(), "요청 간 대기");
                tokio::time::sleep(delay).await;
            }
            results.push(self.collect_ticker(ticker, interval, range).await);
        }

        let failed = results.iter().filter(|r| !r.success).count();
        info!(
            source = %self.source().display_name(),
            interval = %interval,
            success = results.len() - failed,
            failed,
            "캔들 수집 완료"
        );

        Ok(results)
    }

    /// 종목 하나를 수집합니다.
    ///
    /// 등록되지 않은 심볼도 조회/저장하지만 `last_collected_at`은 기록하지 않습니다.
    pub async fn collect_symbol(
        &self,
        symbol: &str,
        interval: CandleInterval,
        range: &FetchRange,
    ) -> Result<CollectionResult> {
        let ticker = match self.registry.get(symbol).await? {
            Some(ticker) => ticker,
            None => {
                debug!(symbol, "등록되지 않은 심볼, 일회성 수집");
                ManagedTicker::unregistered(symbol, "")
            }
        };
        Ok(self.collect_ticker(&ticker, interval, range).await)
    }

    /// 등록된 종목만 수집합니다. 없으면 [`CollectorError::TickerNotFound`].
    pub async fn collect_registered(
        &self,
        symbol: &str,
        interval: CandleInterval,
        range: &FetchRange,
    ) -> Result<CollectionResult> {
        let ticker = self
            .registry
            .get(symbol)
            .await?
            .ok_or_else(|| CollectorError::TickerNotFound(symbol.to_string()))?;
        Ok(self.collect_ticker(&ticker, interval, range).await)
    }

    async fn collect_ticker(
        &self,
        ticker: &ManagedTicker,
        interval: CandleInterval,
        range: &FetchRange,
    ) -> CollectionResult {
        let span = stock_core::collection_span!(self.source().display_name(), interval, ticker.symbol);
        self.process_ticker(ticker, interval, range).instrument(span).await
    }

    async fn process_ticker(
        &self,
        ticker: &ManagedTicker,
        interval: CandleInterval,
        range: &FetchRange,
    ) -> CollectionResult {
        let rows = self.adapter.fetch_candles(ticker, interval, range).await;
        if rows.is_empty() {
            return CollectionResult::saved(&ticker.symbol, 0);
        }

        let candles = normalize(&ticker.symbol, interval, &rows);
        if candles.is_empty() {
            warn!(rows = rows.len(), "정규화 후 남은 캔들 없음");
            return CollectionResult::saved(&ticker.symbol, 0);
        }

        let saved = match self.sink.upsert_candles(&ticker.symbol, interval, &candles).await {
            Ok(saved) => saved,
            Err(e) => {
                error!(error = %e, "캔들 저장 실패");
                return CollectionResult::failed(&ticker.symbol, e);
            }
        };

        // 캔들은 저장됐지만 수집 시각 기록에 실패하면 종목 실패로 집계
        if saved > 0 && ticker.is_registered() {
            if let Err(e) = self.registry.mark_collected(ticker.id).await {
                error!(saved, error = %e, "last_collected_at 갱신 실패");
                return CollectionResult::failed(&ticker.symbol, e);
            }
        }

        info!(saved, "저장 완료");
        CollectionResult::saved(&ticker.symbol, saved)
    }

    /// 한 번의 수집 패스를 실행하고 통계를 남깁니다. 실패해도 에러를 반환하지 않습니다.
    pub async fn run_pass(&self, interval: CandleInterval, range: &FetchRange) -> CollectionStats {
        let span = stock_core::collection_span!(self.source().display_name(), interval);
        async {
            let started = Instant::now();
            let operation = format!("{} {}", self.source().display_name(), interval);

            match self.collect(interval, range).await {
                Ok(results) => {
                    let stats = CollectionStats::from_results(&results, started.elapsed());
                    stats.log_summary(&operation);
                    stats
                }
                Err(e) => {
                    error!(operation = %operation, error = %e, "수집 패스 실패");
                    CollectionStats {
                        elapsed: started.elapsed(),
                        ..CollectionStats::default()
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// 데몬 루프.
    ///
    /// 시작 시 60분봉과 일봉을 한 번씩 수집한 뒤, 60분봉 주기와 일일 수집 시각을
    /// 기다립니다. `shutdown`이 완료되면 진행 중인 패스가 끝난 뒤 반환합니다.
    pub async fn run<F>(&self, schedule: &Schedule, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        self.run_with_clock(schedule, shutdown, || Local::now().naive_local())
            .await
    }

    /// [`run`](Self::run)과 같지만 일일 수집 시각 판단에 쓸 로컬 시계를 받습니다.
    ///
    /// 다음 일봉 수집 시각은 실행될 때까지 유지됩니다. 60분봉 패스가 그 시각을 넘겨
    /// 끝나면 일봉 패스를 바로 실행합니다.
    pub async fn run_with_clock<F, C>(&self, schedule: &Schedule, shutdown: F, now: C)
    where
        F: Future<Output = ()>,
        C: Fn() -> NaiveDateTime,
    {
        info!(
            source = %self.source().display_name(),
            intraday_every_mins = schedule.intraday_every.map(|d| d.as_secs() / 60),
            daily_at = %schedule.daily_at.format("%H:%M"),
            "캔들 수집 스케줄러 시작"
        );

        let mut daily_due = next_daily_run(now(), schedule.daily_at);

        info!("초기 수집 실행...");
        self.run_pass(CandleInterval::Hour1, &schedule.intraday_range).await;
        self.run_pass(CandleInterval::Daily, &schedule.daily_range).await;

        let period = schedule.intraday_every.unwrap_or(Duration::from_secs(3600));
        let mut intraday = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        intraday.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tokio::pin!(shutdown);

        loop {
            let until_daily = (daily_due - now()).to_std().unwrap_or(Duration::ZERO);
            debug!(due = %daily_due, secs = until_daily.as_secs(), "다음 일봉 수집까지 대기");
            let daily = tokio::time::sleep(until_daily);
            tokio::pin!(daily);

            tokio::select! {
                _ = &mut shutdown => {
                    info!("종료 신호 수신, 스케줄러 종료 중...");
                    break;
                }
                _ = intraday.tick(), if schedule.intraday_every.is_some() => {
                    self.run_pass(CandleInterval::Hour1, &schedule.intraday_range).await;
                }
                _ = &mut daily => {
                    if schedule.intraday_every.is_none() {
                        self.run_pass(CandleInterval::Hour1, &schedule.intraday_range).await;
                    }
                    self.run_pass(CandleInterval::Daily, &schedule.daily_range).await;
                    daily_due = next_daily_run(now().max(daily_due), schedule.daily_at);
                }
            }
        }
    }
}

/// `now` 이후 처음 돌아오는 `at` 시각. 지금이 정확히 `at`이면 다음 날입니다.
pub fn next_daily_run(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}
