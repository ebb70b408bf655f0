//! USD price feed with a live quote source and a simulated fallback.
//!
//! The feed always has something to serve: demo seed prices are loaded at
//! construction, live prices replace them when a ticker endpoint answers,
//! and when every endpoint fails the last known prices take a bounded
//! random walk so the UI keeps moving.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use tokio::sync::{watch, Mutex, RwLock};

use crate::config::Config;
use crate::constants::{SIM_CHANGE_24H_JITTER, SIM_PRICE_JITTER_FRACTION};
use crate::error::Result;
use crate::models::{PriceSource, TokenPrice};

/// Token symbol -> ticker pair on the quote source. "STABLE" is the pinned
/// $1.00 base the other pairs quote against.
const TRACKED_TICKERS: [(&str, &str); 6] = [
    ("BNB", "BNBUSDT"),
    ("BUSD", "BUSDUSDT"),
    ("USDC", "USDCUSDT"),
    ("ETH", "ETHUSDT"),
    ("BTCB", "BTCUSDT"),
    ("USDT", "STABLE"),
];

// Demo seeds so a price is renderable before the first live fetch lands.
const DEMO_SEEDS: [(&str, f64, f64); 6] = [
    ("BNB", 285.42, 2.45),
    ("BUSD", 1.0000, 0.02),
    ("USDT", 1.0001, -0.01),
    ("USDC", 0.9999, 0.01),
    ("ETH", 2456.78, 1.84),
    ("BTCB", 43256.89, -0.67),
];

/// One row of the 24h-ticker response.
#[derive(Debug, Deserialize)]
struct TickerRow {
    symbol: String,
    #[serde(rename = "lastPrice")]
    last_price: String,
    #[serde(rename = "priceChangePercent")]
    price_change_percent: String,
}

pub struct PriceFeed {
    http: reqwest::Client,
    primary_url: String,
    fallback_url: String,
    prices: RwLock<HashMap<String, TokenPrice>>,
    /// Millisecond timestamp of the last landed refresh.
    last_refresh_ms: AtomicI64,
    /// Held for the duration of a refresh; a second caller skips instead of
    /// duplicating the in-flight fetch.
    refresh_guard: Mutex<()>,
}

impl PriceFeed {
    pub fn new(config: &Config) -> Self {
        let mut seeded = HashMap::new();
        let now = Utc::now();
        for (symbol, price, change) in DEMO_SEEDS {
            seeded.insert(
                symbol.to_string(),
                TokenPrice {
                    symbol: symbol.to_string(),
                    usd_price: price,
                    change_24h: change,
                    last_updated: now,
                    source: PriceSource::Simulated,
                },
            );
        }
        Self {
            http: reqwest::Client::new(),
            primary_url: config.price_api_url.clone(),
            fallback_url: config.price_api_fallback_url.clone(),
            prices: RwLock::new(seeded),
            last_refresh_ms: AtomicI64::new(now.timestamp_millis()),
            refresh_guard: Mutex::new(()),
        }
    }

    pub async fn get_price(&self, symbol: &str) -> Option<TokenPrice> {
        self.prices.read().await.get(&symbol.to_uppercase()).cloned()
    }

    pub async fn prices(&self) -> HashMap<String, TokenPrice> {
        self.prices.read().await.clone()
    }

    pub fn tracked_symbols() -> Vec<&'static str> {
        TRACKED_TICKERS.iter().map(|(symbol, _)| *symbol).collect()
    }

    /// True when no refresh has landed within the threshold.
    pub fn is_stale(&self, threshold_ms: i64) -> bool {
        let last = self.last_refresh_ms.load(Ordering::Relaxed);
        Utc::now().timestamp_millis() - last > threshold_ms
    }

    /// Re-fetch every tracked price. Falls back from the primary endpoint to
    /// the secondary, then to a simulated fluctuation of the last known
    /// prices; never fails outward.
    pub async fn refresh(&self) {
        // A refresh already in flight must not be duplicated.
        let Ok(_guard) = self.refresh_guard.try_lock() else {
            tracing::debug!("price refresh already in flight; skipping");
            return;
        };

        for endpoint in [&self.primary_url, &self.fallback_url] {
            match self.fetch_tickers(endpoint).await {
                Ok(rows) => {
                    let parsed = parse_ticker_rows(&rows);
                    if !parsed.is_empty() {
                        self.publish(parsed).await;
                        tracing::debug!("live prices updated from {endpoint}");
                        return;
                    }
                }
                Err(err) => {
                    tracing::warn!("price fetch from {endpoint} failed: {err}");
                }
            }
        }

        // Every endpoint failed; keep values moving on the simulated walk.
        self.simulate_fluctuation().await;
    }

    async fn fetch_tickers(&self, endpoint: &str) -> Result<Vec<TickerRow>> {
        let rows = self
            .http
            .get(endpoint)
            .send()
            .await?
            .json::<Vec<TickerRow>>()
            .await?;
        Ok(rows)
    }

    async fn publish(&self, fresh: HashMap<String, TokenPrice>) {
        // Whole-map replace; readers never see a half-updated cycle.
        *self.prices.write().await = fresh;
        self.last_refresh_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    async fn simulate_fluctuation(&self) {
        let current = self.prices.read().await.clone();
        let now = Utc::now();

        // ThreadRng is not Send; keep it out of scope before the publish await.
        let next = {
            let mut rng = rand::rng();
            let mut next = HashMap::with_capacity(current.len());
            for (symbol, entry) in current {
                let drift =
                    rng.random_range(-SIM_PRICE_JITTER_FRACTION..=SIM_PRICE_JITTER_FRACTION);
                let nudge = rng.random_range(-SIM_CHANGE_24H_JITTER..=SIM_CHANGE_24H_JITTER);
                next.insert(
                    symbol,
                    TokenPrice {
                        usd_price: entry.usd_price * (1.0 + drift),
                        change_24h: entry.change_24h + nudge,
                        last_updated: now,
                        source: PriceSource::Simulated,
                        ..entry
                    },
                );
            }
            next
        };
        self.publish(next).await;
        tracing::debug!("price endpoints unavailable; simulated fluctuation applied");
    }

    /// Periodic refresh until the shutdown channel flips.
    pub fn start_refresh_loop(
        self: Arc<Self>,
        interval_secs: u64,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                self.refresh().await;
                tokio::select! {
                    _ = tokio::time::sleep(tokio::time::Duration::from_secs(interval_secs)) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::debug!("price refresh loop stopping");
                            return;
                        }
                    }
                }
            }
        })
    }
}

fn parse_ticker_rows(rows: &[TickerRow]) -> HashMap<String, TokenPrice> {
    let by_pair: HashMap<&str, &TickerRow> =
        rows.iter().map(|row| (row.symbol.as_str(), row)).collect();
    let now = Utc::now();

    let mut out = HashMap::new();
    for (symbol, pair) in TRACKED_TICKERS {
        if pair == "STABLE" {
            // The stable base is always $1.00.
            out.insert(
                symbol.to_string(),
                TokenPrice {
                    symbol: symbol.to_string(),
                    usd_price: 1.0,
                    change_24h: 0.01,
                    last_updated: now,
                    source: PriceSource::Live,
                },
            );
            continue;
        }
        let Some(row) = by_pair.get(pair) else {
            continue;
        };
        let (Ok(price), Ok(change)) = (
            row.last_price.parse::<f64>(),
            row.price_change_percent.parse::<f64>(),
        ) else {
            tracing::warn!("unparseable ticker row for {pair}");
            continue;
        };
        out.insert(
            symbol.to_string(),
            TokenPrice {
                symbol: symbol.to_string(),
                usd_price: price,
                change_24h: change,
                last_updated: now,
                source: PriceSource::Live,
            },
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed() -> PriceFeed {
        let config = Config {
            environment: "test".to_string(),
            target_chain_id: 56,
            rpc_url_overrides: HashMap::new(),
            // Unroutable endpoints force the simulated path in tests.
            price_api_url: "http://127.0.0.1:1/ticker".to_string(),
            price_api_fallback_url: "http://127.0.0.1:1/ticker2".to_string(),
            price_refresh_interval_secs: 10,
            balance_fetch_timeout_secs: 6,
            watch_address: None,
        };
        PriceFeed::new(&config)
    }

    #[tokio::test]
    async fn seeds_are_available_immediately() {
        let feed = feed();
        let bnb = feed.get_price("bnb").await.unwrap();
        assert_eq!(bnb.usd_price, 285.42);
        assert_eq!(bnb.source, PriceSource::Simulated);
        assert!(feed.get_price("DOGE").await.is_none());
    }

    #[tokio::test]
    async fn failed_refresh_falls_back_to_bounded_fluctuation() {
        let feed = feed();
        let before = feed.get_price("ETH").await.unwrap().usd_price;
        feed.refresh().await;
        let after = feed.get_price("ETH").await.unwrap();
        let max_move = before * SIM_PRICE_JITTER_FRACTION + 1e-9;
        assert!((after.usd_price - before).abs() <= max_move);
        assert_eq!(after.source, PriceSource::Simulated);
    }

    #[tokio::test]
    async fn refresh_resets_staleness() {
        let feed = feed();
        feed.last_refresh_ms
            .store(Utc::now().timestamp_millis() - 60_000, Ordering::Relaxed);
        assert!(feed.is_stale(30_000));
        feed.refresh().await;
        assert!(!feed.is_stale(30_000));
    }

    #[test]
    fn parses_ticker_rows_and_pins_the_stable_base() {
        let rows = vec![
            TickerRow {
                symbol: "BNBUSDT".to_string(),
                last_price: "310.55".to_string(),
                price_change_percent: "-1.20".to_string(),
            },
            TickerRow {
                symbol: "ETHUSDT".to_string(),
                last_price: "2600.00".to_string(),
                price_change_percent: "0.50".to_string(),
            },
        ];
        let parsed = parse_ticker_rows(&rows);
        assert_eq!(parsed.get("BNB").unwrap().usd_price, 310.55);
        assert_eq!(parsed.get("ETH").unwrap().change_24h, 0.50);
        assert_eq!(parsed.get("USDT").unwrap().usd_price, 1.0);
        // No BUSD row -> no BUSD entry rather than a bogus one.
        assert!(!parsed.contains_key("BUSD"));
    }
}
