//! TTL policy for cache-filling writes.
//!
//! Base TTLs come from the per-data-type table; price and OHLCV entries
//! are additionally scaled by current volatility and market-session
//! state. Fast-moving data during an active session goes stale quickly;
//! quiet after-hours data can be held much longer.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};

use crate::config::TtlSettings;
use crate::models::{AssetClass, DataType};

/// Multiplier when intraday volatility exceeds the class threshold.
const HIGH_VOLATILITY_MULTIPLIER: f64 = 0.4;
/// Multiplier outside the active trading session.
const CLOSED_SESSION_MULTIPLIER: f64 = 3.0;
/// Multiplier for known-quiet instruments during an active session.
const LOW_VOLATILITY_MULTIPLIER: f64 = 1.5;
/// Intraday move (percent) below which an instrument counts as quiet.
const LOW_VOLATILITY_PCT: f64 = 1.0;

/// TTL in seconds for a cache-filling write.
pub(crate) fn ttl_for(
    settings: &TtlSettings,
    data_type: DataType,
    asset_class: AssetClass,
    volatility_pct: Option<f64>,
    now: DateTime<Utc>,
) -> u64 {
    let base = settings.base_for(data_type);
    if !matches!(data_type, DataType::Price | DataType::Ohlcv) {
        return base;
    }

    let multiplier = if volatility_pct.is_some_and(|v| v >= high_volatility_threshold(asset_class))
    {
        HIGH_VOLATILITY_MULTIPLIER
    } else if !session_open(asset_class, now) {
        CLOSED_SESSION_MULTIPLIER
    } else if volatility_pct.is_some_and(|v| v < LOW_VOLATILITY_PCT) {
        LOW_VOLATILITY_MULTIPLIER
    } else {
        1.0
    };

    ((base as f64 * multiplier).round() as u64).max(1)
}

/// Intraday volatility (percent) above which a class counts as fast-moving.
fn high_volatility_threshold(asset_class: AssetClass) -> f64 {
    match asset_class {
        AssetClass::Equity | AssetClass::Etf | AssetClass::Index => 3.0,
        AssetClass::Forex => 3.0,
        AssetClass::Commodity | AssetClass::Future => 5.0,
        AssetClass::Crypto | AssetClass::Option => 10.0,
    }
}

/// Whether the instrument's market is in an active trading session.
///
/// Crypto trades continuously; forex runs around the clock on weekdays.
/// Everything else is approximated by the US regular session,
/// 14:30-21:00 UTC on weekdays.
fn session_open(asset_class: AssetClass, now: DateTime<Utc>) -> bool {
    match asset_class {
        AssetClass::Crypto => true,
        AssetClass::Forex => is_weekday(now),
        _ => {
            if !is_weekday(now) {
                return false;
            }
            let minutes = now.hour() * 60 + now.minute();
            (14 * 60 + 30..21 * 60).contains(&minutes)
        }
    }
}

fn is_weekday(now: DateTime<Utc>) -> bool {
    !matches!(now.weekday(), Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // 2026-03-04 is a Wednesday.
    fn mid_session() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 16, 0, 0).unwrap()
    }

    fn after_hours() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 2, 0, 0).unwrap()
    }

    fn weekend() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 7, 16, 0, 0).unwrap()
    }

    #[test]
    fn test_non_price_types_use_base_ttl() {
        let settings = TtlSettings::default();
        let ttl = ttl_for(
            &settings,
            DataType::Fundamentals,
            AssetClass::Equity,
            Some(50.0),
            after_hours(),
        );
        assert_eq!(ttl, settings.fundamentals_secs);
    }

    #[test]
    fn test_high_volatility_shortens_price_ttl() {
        let settings = TtlSettings::default();
        let ttl = ttl_for(
            &settings,
            DataType::Price,
            AssetClass::Equity,
            Some(5.0),
            mid_session(),
        );
        assert_eq!(ttl, 4); // 10s * 0.4
    }

    #[test]
    fn test_crypto_volatility_threshold_is_higher() {
        let settings = TtlSettings::default();
        // 5% is stormy for an equity but routine for crypto.
        let ttl = ttl_for(
            &settings,
            DataType::Price,
            AssetClass::Crypto,
            Some(5.0),
            mid_session(),
        );
        assert_eq!(ttl, settings.price_secs);
    }

    #[test]
    fn test_after_hours_stretches_price_ttl() {
        let settings = TtlSettings::default();
        let ttl = ttl_for(
            &settings,
            DataType::Price,
            AssetClass::Equity,
            None,
            after_hours(),
        );
        assert_eq!(ttl, 30); // 10s * 3
    }

    #[test]
    fn test_weekend_counts_as_closed() {
        let settings = TtlSettings::default();
        let ttl = ttl_for(
            &settings,
            DataType::Price,
            AssetClass::Equity,
            None,
            weekend(),
        );
        assert_eq!(ttl, 30);
    }

    #[test]
    fn test_crypto_never_closes() {
        let settings = TtlSettings::default();
        let ttl = ttl_for(
            &settings,
            DataType::Price,
            AssetClass::Crypto,
            None,
            weekend(),
        );
        assert_eq!(ttl, settings.price_secs);
    }

    #[test]
    fn test_quiet_session_gets_mild_stretch() {
        let settings = TtlSettings::default();
        let ttl = ttl_for(
            &settings,
            DataType::Ohlcv,
            AssetClass::Equity,
            Some(0.3),
            mid_session(),
        );
        assert_eq!(ttl, 90); // 60s * 1.5
    }

    #[test]
    fn test_ttl_never_rounds_to_zero() {
        let settings = TtlSettings {
            price_secs: 1,
            ..Default::default()
        };
        let ttl = ttl_for(
            &settings,
            DataType::Price,
            AssetClass::Equity,
            Some(9.0),
            mid_session(),
        );
        assert_eq!(ttl, 1);
    }
}
