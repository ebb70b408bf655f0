//! Swap quoting against the price feed.
//!
//! Rates, impact and slippage are tiered heuristics over the notional USD
//! value of the trade, not an AMM curve; the tier boundaries are a behavioral
//! contract and are kept literal. Execution is simulated: fixed latency,
//! always succeeds, and the in-flight flag is released on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::constants::{
    IMPACT_PCT_LARGE, IMPACT_PCT_UNDER_100K, IMPACT_PCT_UNDER_10K, IMPACT_PCT_UNDER_1K,
    SLIPPAGE_PCT_LARGE, SLIPPAGE_PCT_STABLE_LARGE, SLIPPAGE_PCT_STABLE_UNDER_10K,
    SLIPPAGE_PCT_STABLE_UNDER_1K, SLIPPAGE_PCT_UNDER_100K, SLIPPAGE_PCT_UNDER_10K,
    SLIPPAGE_PCT_UNDER_1K, STABLE_SYMBOLS, SWAP_EXECUTE_LATENCY_MS, TRADING_FEE_PCT,
};
use crate::models::SwapQuote;
use crate::services::price_feed::PriceFeed;

pub struct SwapQuoter {
    prices: Arc<PriceFeed>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when dropped, so no exit path can leak it.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub fn is_stable(symbol: &str) -> bool {
    STABLE_SYMBOLS
        .iter()
        .any(|s| s.eq_ignore_ascii_case(symbol))
}

/// Estimated adverse price movement caused by the trade's own size.
fn price_impact_pct(notional_usd: f64) -> f64 {
    if notional_usd < 1_000.0 {
        IMPACT_PCT_UNDER_1K
    } else if notional_usd < 10_000.0 {
        IMPACT_PCT_UNDER_10K
    } else if notional_usd < 100_000.0 {
        IMPACT_PCT_UNDER_100K
    } else {
        IMPACT_PCT_LARGE
    }
}

/// Tolerance band subtracted from the expected output; tighter for
/// stable-to-stable pairs.
fn slippage_pct(notional_usd: f64, stable_pair: bool) -> f64 {
    if stable_pair {
        if notional_usd < 1_000.0 {
            SLIPPAGE_PCT_STABLE_UNDER_1K
        } else if notional_usd < 10_000.0 {
            SLIPPAGE_PCT_STABLE_UNDER_10K
        } else {
            SLIPPAGE_PCT_STABLE_LARGE
        }
    } else if notional_usd < 1_000.0 {
        SLIPPAGE_PCT_UNDER_1K
    } else if notional_usd < 10_000.0 {
        SLIPPAGE_PCT_UNDER_10K
    } else if notional_usd < 100_000.0 {
        SLIPPAGE_PCT_UNDER_100K
    } else {
        SLIPPAGE_PCT_LARGE
    }
}

impl SwapQuoter {
    pub fn new(prices: Arc<PriceFeed>) -> Self {
        Self {
            prices,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Compute a fresh quote. Fails closed (None) when either leg's price is
    /// unknown; a zero input amount still yields a quote, it is just never
    /// swappable.
    pub async fn quote(
        &self,
        from_symbol: &str,
        to_symbol: &str,
        from_amount: f64,
    ) -> Option<SwapQuote> {
        let from_price = self.prices.get_price(from_symbol).await?;
        let to_price = self.prices.get_price(to_symbol).await?;
        if to_price.usd_price <= 0.0 {
            return None;
        }

        let exchange_rate = from_price.usd_price / to_price.usd_price;
        let notional_usd = from_amount * from_price.usd_price;
        let stable_pair = is_stable(from_symbol) && is_stable(to_symbol);

        let trading_fee_pct = TRADING_FEE_PCT;
        let slippage_pct = slippage_pct(notional_usd, stable_pair);
        let price_impact_pct = price_impact_pct(notional_usd);

        let to_amount = from_amount * exchange_rate * (1.0 - trading_fee_pct / 100.0);
        let minimum_received = to_amount * (1.0 - slippage_pct / 100.0);

        Some(SwapQuote {
            from_token: from_symbol.to_uppercase(),
            to_token: to_symbol.to_uppercase(),
            from_amount,
            to_amount,
            exchange_rate,
            price_impact_pct,
            trading_fee_pct,
            slippage_pct,
            minimum_received,
        })
    }

    /// A quote is swappable when it has a positive input amount and no swap
    /// is already in flight.
    pub fn can_swap(&self, quote: &SwapQuote) -> bool {
        quote.from_amount > 0.0 && !self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_swapping(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Simulated execution standing in for on-chain submission: fixed
    /// latency, always settles. Returns false instead of erroring when the
    /// quote is not currently swappable.
    pub async fn execute_swap(&self, quote: &SwapQuote) -> bool {
        if !self.can_swap(quote) {
            return false;
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            // Lost the race to another swap.
            return false;
        }
        let _guard = InFlightGuard(&self.in_flight);

        tokio::time::sleep(Duration::from_millis(SWAP_EXECUTE_LATENCY_MS)).await;
        tracing::info!(
            "simulated swap settled: {} {} -> {:.6} {}",
            quote.from_amount,
            quote.from_token,
            quote.to_amount,
            quote.to_token
        );
        true
    }
}
