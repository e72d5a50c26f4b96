// ═══════════════════════════════════════════════════════════════════
// Model Tests — Interval, PriceSeries, PriceCache, matrices, requests,
// settings, weight floor
// ═══════════════════════════════════════════════════════════════════

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;

use portfolio_analytics_core::errors::CoreError;
use portfolio_analytics_core::models::matrix::{CorrelationMatrix, SymmetricMatrix};
use portfolio_analytics_core::models::optimization::{
    Objective, ObjectiveKind, OptimizeRequest, WeightFloor,
};
use portfolio_analytics_core::models::price::{
    DateWindow, Interval, PriceCache, PricePoint, PriceSeries,
};
use portfolio_analytics_core::models::settings::AnalyticsSettings;
use portfolio_analytics_core::models::statistics::StatsRequest;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn pt(y: i32, m: u32, day: u32, price: f64) -> PricePoint {
    PricePoint::new(d(y, m, day), price)
}

fn symbols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

// ═══════════════════════════════════════════════════════════════════
// Interval
// ═══════════════════════════════════════════════════════════════════

mod interval {
    use super::*;

    #[test]
    fn periods_per_year() {
        assert_eq!(Interval::Weekly.periods_per_year(), 52.0);
        assert_eq!(Interval::Monthly.periods_per_year(), 12.0);
    }

    #[test]
    fn default_is_weekly() {
        assert_eq!(Interval::default(), Interval::Weekly);
    }

    #[test]
    fn provider_codes() {
        assert_eq!(Interval::Weekly.provider_code(), "1wk");
        assert_eq!(Interval::Monthly.provider_code(), "1mo");
    }

    #[test]
    fn serde_names_and_aliases() {
        assert_eq!(serde_json::to_string(&Interval::Monthly).unwrap(), "\"monthly\"");
        let weekly: Interval = serde_json::from_str("\"1wk\"").unwrap();
        let monthly: Interval = serde_json::from_str("\"1mo\"").unwrap();
        assert_eq!(weekly, Interval::Weekly);
        assert_eq!(monthly, Interval::Monthly);
    }

    #[test]
    fn unknown_interval_rejected() {
        assert!(serde_json::from_str::<Interval>("\"daily\"").is_err());
    }
}

// ═══════════════════════════════════════════════════════════════════
// DateWindow & PriceSeries
// ═══════════════════════════════════════════════════════════════════

mod series {
    use super::*;

    #[test]
    fn window_rejects_inverted_range() {
        let err = DateWindow::new(Some(d(2024, 6, 1)), Some(d(2024, 1, 1))).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRequest(_)));
    }

    #[test]
    fn window_contains_is_inclusive() {
        let w = DateWindow::new(Some(d(2024, 1, 1)), Some(d(2024, 1, 31))).unwrap();
        assert!(w.contains(d(2024, 1, 1)));
        assert!(w.contains(d(2024, 1, 31)));
        assert!(!w.contains(d(2024, 2, 1)));
        assert!(DateWindow::unbounded().contains(d(1990, 1, 1)));
    }

    #[test]
    fn new_uppercases_symbol() {
        let s = PriceSeries::new(" aapl ", vec![pt(2024, 1, 1, 10.0)]).unwrap();
        assert_eq!(s.symbol(), "AAPL");
    }

    #[test]
    fn new_rejects_unsorted_dates() {
        let err = PriceSeries::new("A", vec![pt(2024, 1, 8, 10.0), pt(2024, 1, 1, 11.0)])
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidSeries { .. }));
    }

    #[test]
    fn new_rejects_duplicate_dates() {
        let err = PriceSeries::new("A", vec![pt(2024, 1, 1, 10.0), pt(2024, 1, 1, 11.0)])
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidSeries { .. }));
    }

    #[test]
    fn new_rejects_non_positive_price() {
        assert!(PriceSeries::new("A", vec![pt(2024, 1, 1, 0.0)]).is_err());
        assert!(PriceSeries::new("A", vec![pt(2024, 1, 1, -3.0)]).is_err());
        assert!(PriceSeries::new("A", vec![pt(2024, 1, 1, f64::NAN)]).is_err());
    }

    #[test]
    fn from_unsorted_sorts_and_keeps_last_duplicate() {
        let s = PriceSeries::from_unsorted(
            "A",
            vec![pt(2024, 1, 8, 12.0), pt(2024, 1, 1, 10.0), pt(2024, 1, 8, 13.0)],
        )
        .unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.points()[0].date, d(2024, 1, 1));
        assert_eq!(s.points()[1].price, 13.0);
    }

    #[test]
    fn windowed_applies_bounds_and_row_cap() {
        let points: Vec<PricePoint> = (1..=10).map(|day| pt(2024, 1, day, day as f64)).collect();
        let s = PriceSeries::new("A", points).unwrap();

        let window = DateWindow::new(Some(d(2024, 1, 3)), Some(d(2024, 1, 8))).unwrap();
        let rows = s.windowed(&window, 1000);
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].date, d(2024, 1, 3));

        // The cap keeps the most recent rows.
        let capped = s.windowed(&DateWindow::unbounded(), 4);
        assert_eq!(capped.len(), 4);
        assert_eq!(capped[0].date, d(2024, 1, 7));
        assert_eq!(capped[3].date, d(2024, 1, 10));
    }

    #[test]
    fn windowed_outside_history_is_empty() {
        let s = PriceSeries::new("A", vec![pt(2024, 1, 1, 10.0)]).unwrap();
        let window = DateWindow::new(Some(d(2025, 1, 1)), None).unwrap();
        assert!(s.windowed(&window, 1000).is_empty());
    }
}

// ═══════════════════════════════════════════════════════════════════
// PriceCache
// ═══════════════════════════════════════════════════════════════════

mod price_cache {
    use super::*;

    #[test]
    fn set_price_keeps_sorted_and_overwrites() {
        let mut cache = PriceCache::new();
        cache.set_price("aapl", Interval::Weekly, d(2024, 1, 15), 3.0);
        cache.set_price("AAPL", Interval::Weekly, d(2024, 1, 1), 1.0);
        cache.set_price("AAPL", Interval::Weekly, d(2024, 1, 8), 2.0);
        cache.set_price("AAPL", Interval::Weekly, d(2024, 1, 8), 2.5);

        let rows = cache
            .get_price_range("AAPL", Interval::Weekly, None, None)
            .unwrap();
        let prices: Vec<f64> = rows.iter().map(|p| p.price).collect();
        assert_eq!(prices, vec![1.0, 2.5, 3.0]);
        assert_eq!(cache.total_entries(), 3);
    }

    #[test]
    fn intervals_are_separate_keys() {
        let mut cache = PriceCache::new();
        cache.set_price("AAPL", Interval::Weekly, d(2024, 1, 1), 1.0);
        assert!(cache.contains("aapl", Interval::Weekly));
        assert!(!cache.contains("AAPL", Interval::Monthly));
        assert!(cache
            .get_price_range("AAPL", Interval::Monthly, None, None)
            .is_none());
    }

    #[test]
    fn range_is_inclusive() {
        let mut cache = PriceCache::new();
        let points: Vec<PricePoint> = (1..=5).map(|day| pt(2024, 1, day, day as f64)).collect();
        cache.set_prices("X", Interval::Monthly, &points);
        let rows = cache
            .get_price_range("X", Interval::Monthly, Some(d(2024, 1, 2)), Some(d(2024, 1, 4)))
            .unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn empty_range_for_known_symbol() {
        let mut cache = PriceCache::new();
        cache.set_price("X", Interval::Weekly, d(2024, 1, 1), 1.0);
        let rows = cache
            .get_price_range("X", Interval::Weekly, Some(d(2025, 1, 1)), None)
            .unwrap();
        assert!(rows.is_empty());
    }
}

// ═══════════════════════════════════════════════════════════════════
// SymmetricMatrix & CorrelationMatrix
// ═══════════════════════════════════════════════════════════════════

mod matrices {
    use super::*;

    fn sample() -> SymmetricMatrix {
        SymmetricMatrix::from_upper_fn(symbols(&["A", "B", "C"]), |i, j| match (i, j) {
            (0, 0) => 4.0,
            (1, 1) => 9.0,
            (0, 1) => 3.0,
            _ => 0.0,
        })
    }

    #[test]
    fn upper_triangle_fills_both_halves() {
        let m = sample();
        for i in 0..3 {
            for j in 0..3 {
                assert_eq!(m.get(i, j), m.get(j, i));
            }
        }
        assert_eq!(m.get_by_symbol("B", "A"), Some(3.0));
        assert_eq!(m.get_by_symbol("A", "Z"), None);
    }

    #[test]
    fn get_out_of_range_is_none() {
        let m = sample();
        assert_eq!(m.get(3, 0), None);
        assert_eq!(m.get(0, 3), None);
        assert_eq!(m.get(2, 2), Some(0.0));
    }

    #[test]
    fn quadratic_form_and_scaling() {
        let m = sample();
        // [1, 1, 0]: 4 + 9 + 2·3
        assert!((m.quadratic_form(&[1.0, 1.0, 0.0]) - 19.0).abs() < 1e-12);
        assert!((m.scaled(52.0).get(0, 1).unwrap() - 156.0).abs() < 1e-12);
    }

    #[test]
    fn to_dmatrix_matches_entries() {
        let m = sample();
        let dm = m.to_dmatrix();
        assert_eq!(dm.nrows(), 3);
        assert_eq!(dm[(0, 1)], 3.0);
        assert_eq!(dm[(1, 0)], 3.0);
    }

    #[test]
    fn correlation_has_unit_diagonal_and_bounds() {
        let corr = CorrelationMatrix::from_covariance(&sample());
        for i in 0..corr.dim() {
            assert_eq!(corr.get(i, i), Some(1.0));
            for j in 0..corr.dim() {
                assert!((-1.0..=1.0).contains(&corr.get(i, j).unwrap()));
                assert_eq!(corr.get(i, j), corr.get(j, i));
            }
        }
        assert!((corr.get_by_symbol("A", "B").unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn correlation_with_flat_asset_is_zero() {
        let corr = CorrelationMatrix::from_covariance(&sample());
        assert_eq!(corr.get_by_symbol("A", "C"), Some(0.0));
        assert_eq!(corr.get_by_symbol("C", "C"), Some(1.0));
    }

    #[test]
    fn serializes_as_nested_map() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["A"]["B"], 3.0);
        assert_eq!(json["B"]["A"], 3.0);
        assert_eq!(json["C"]["C"], 0.0);
    }
}

// ═══════════════════════════════════════════════════════════════════
// Requests & objectives
// ═══════════════════════════════════════════════════════════════════

mod requests {
    use super::*;

    #[test]
    fn objective_kind_parses_names() {
        assert_eq!("max_sharpe".parse::<ObjectiveKind>().unwrap(), ObjectiveKind::MaxSharpe);
        assert_eq!(
            " MIN_VOLATILITY ".parse::<ObjectiveKind>().unwrap(),
            ObjectiveKind::MinVolatility
        );
        let err = "max_return".parse::<ObjectiveKind>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidTarget(_)));
    }

    #[test]
    fn optimize_request_defaults_from_json() {
        let req: OptimizeRequest = serde_json::from_str(r#"{"symbols": ["AAPL", "MSFT"]}"#).unwrap();
        assert_eq!(req.interval, Interval::Weekly);
        assert!((req.risk_free_rate - 0.02).abs() < 1e-12);
        assert_eq!(req.target, "max_sharpe");
        assert_eq!(req.n_frontier_points, None);
        assert_eq!(req.objective().unwrap(), Objective::MaxSharpe);
    }

    #[test]
    fn efficient_return_requires_target_return() {
        let mut req = OptimizeRequest::new(symbols(&["A", "B"]), Interval::Weekly, Objective::MaxSharpe);
        req.target = "efficient_return".into();
        assert!(matches!(req.objective(), Err(CoreError::InvalidTarget(_))));
        req.target_return = Some(0.1);
        assert_eq!(
            req.objective().unwrap(),
            Objective::EfficientReturn { target_return: 0.1 }
        );
    }

    #[test]
    fn efficient_risk_requires_positive_volatility() {
        let req = OptimizeRequest::new(
            symbols(&["A", "B"]),
            Interval::Weekly,
            Objective::EfficientRisk { target_volatility: 0.0 },
        );
        assert!(matches!(req.objective(), Err(CoreError::InvalidTarget(_))));
    }

    #[test]
    fn extraneous_target_rejected() {
        let mut req = OptimizeRequest::new(symbols(&["A", "B"]), Interval::Weekly, Objective::MinVolatility);
        req.target_volatility = Some(0.2);
        assert!(matches!(req.objective(), Err(CoreError::InvalidTarget(_))));
    }

    #[test]
    fn non_finite_target_rejected() {
        let req = OptimizeRequest::new(
            symbols(&["A", "B"]),
            Interval::Weekly,
            Objective::EfficientReturn { target_return: f64::NAN },
        );
        assert!(matches!(req.objective(), Err(CoreError::InvalidTarget(_))));
    }

    #[test]
    fn stats_request_defaults() {
        let req: StatsRequest =
            serde_json::from_str(r#"{"symbols": ["A", "B"], "interval": "1mo"}"#).unwrap();
        assert_eq!(req.interval, Interval::Monthly);
        assert!((req.risk_free_rate - 0.02).abs() < 1e-12);
        assert!(req.from_date.is_none());
    }
}

// ═══════════════════════════════════════════════════════════════════
// Settings & WeightFloor
// ═══════════════════════════════════════════════════════════════════

mod settings {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let s = AnalyticsSettings::default();
        assert!(s.validate().is_ok());
        assert_eq!(s.min_rows(Interval::Weekly), 52);
        assert_eq!(s.min_rows(Interval::Monthly), 24);
        assert_eq!(s.max_rows_per_symbol, 1000);
    }

    #[test]
    fn from_json_overrides_only_named_fields() {
        let s = AnalyticsSettings::from_json(r#"{"min_rows_weekly": 10}"#).unwrap();
        assert_eq!(s.min_rows_weekly, 10);
        assert_eq!(s.min_rows_monthly, 24);
    }

    #[test]
    fn from_json_rejects_bad_floor_range() {
        let err = AnalyticsSettings::from_json(r#"{"weight_floor_range": [0.2, 0.1]}"#).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRequest(_)));
    }

    #[test]
    fn from_json_rejects_malformed_document() {
        let err = AnalyticsSettings::from_json("{").unwrap_err();
        assert!(matches!(err, CoreError::Deserialization(_)));
    }

    #[test]
    fn fixed_floor_bounds() {
        assert!((WeightFloor::fixed(0.1).unwrap().value() - 0.1).abs() < 1e-12);
        assert!(WeightFloor::fixed(0.0).is_err());
        assert!(WeightFloor::fixed(1.0).is_err());
        assert!(WeightFloor::fixed(f64::NAN).is_err());
    }

    #[test]
    fn drawn_floor_is_in_range_and_reproducible() {
        let range = (0.05, 0.15);
        let a = WeightFloor::draw(&mut StdRng::seed_from_u64(7), range).unwrap();
        let b = WeightFloor::draw(&mut StdRng::seed_from_u64(7), range).unwrap();
        assert_eq!(a, b);
        assert!((0.05..=0.15).contains(&a.value()));
    }

    #[test]
    fn degenerate_range_draws_that_value() {
        let f = WeightFloor::draw(&mut StdRng::seed_from_u64(1), (0.1, 0.1)).unwrap();
        assert!((f.value() - 0.1).abs() < 1e-15);
    }
}
