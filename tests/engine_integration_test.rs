//! Engine integration tests.
//!
//! Tests cover:
//! - End-to-end evaluation of strategy source against a stub port
//! - Port failures surfacing as evaluation errors with their cause
//! - Deterministic tie-breaking and idempotent re-evaluation
//! - Concurrent evaluation sharing one snapshot
//! - File-level size limit and batch evaluation
//! - Strategies nested to the depth limit on default-sized threads
//! - Weight conservation of the weighting operators (property based)

mod common;

use approx::assert_abs_diff_eq;
use common::*;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::error::Error;
use std::path::PathBuf;
use stratlang::adapters::memory_adapter::InMemoryIndicators;
use stratlang::domain::engine::{evaluate_batch, evaluate_strategy, evaluate_strategy_file};
use stratlang::domain::error::EngineError;
use stratlang::domain::indicator::Indicator;
use stratlang::domain::parser::MAX_SOURCE_BYTES;

mod end_to_end {
    use super::*;

    #[test]
    fn overbought_rotates_into_shy() {
        let port = StubIndicatorPort::new().with_value("SPY", Indicator::Rsi, 14, "80");
        let (allocation, trace) = evaluate_strategy(RSI_SWITCH, &port).unwrap();

        assert_eq!(allocation.weights().len(), 1);
        assert_eq!(allocation.weight("SHY"), Some(Decimal::ONE));
        assert_eq!(
            allocation.metadata.get("name").map(String::as_str),
            Some("RSI Switch")
        );
        assert!(trace.steps().iter().any(|s| s.ends_with("-> then")));
        assert_eq!(port.requests(), vec![("SPY".to_string(), Indicator::Rsi, 14)]);
    }

    #[test]
    fn neutral_rsi_stays_in_spy() {
        let port = StubIndicatorPort::new().with_value("SPY", Indicator::Rsi, 14, "55.5");
        let (allocation, _) = evaluate_strategy(RSI_SWITCH, &port).unwrap();
        assert_eq!(allocation.weight("SPY"), Some(Decimal::ONE));
        assert_eq!(allocation.weight("SHY"), None);
    }

    #[test]
    fn nested_groups_and_filter() {
        let port = StubIndicatorPort::new()
            .with_value("SPY", Indicator::MovingAveragePrice, 200, "400")
            .with_value("SPY", Indicator::CurrentPrice, 0, "450")
            .with_value("QQQ", Indicator::CumulativeReturn, 60, "0.12")
            .with_value("XLK", Indicator::CumulativeReturn, 60, "0.15")
            .with_value("XLV", Indicator::CumulativeReturn, 60, "0.03");
        let source = r#"
(defsymphony "Trend Momentum"
  (if (> (current-price "SPY") (moving-average-price "SPY" {:window 200}))
      (weight-specified
        0.5 (group "Core" (asset "SPY"))
        0.5 (group "Momentum"
              (filter (cumulative-return 60) (select-top 2)
                      [(asset "QQQ") (asset "XLK") (asset "XLV")])))
      (asset "BIL")))
"#;
        let (allocation, trace) = evaluate_strategy(source, &port).unwrap();

        assert_eq!(allocation.weight("SPY"), Some(dec("0.5")));
        assert_eq!(allocation.weight("XLK"), Some(dec("0.25")));
        assert_eq!(allocation.weight("QQQ"), Some(dec("0.25")));
        assert_eq!(allocation.weight("XLV"), None);
        assert_eq!(allocation.total(), Decimal::ONE);
        assert!(trace.steps().iter().any(|s| s.starts_with("filter cumulative-return(60) select-top 2")));
    }

    #[test]
    fn unknown_operator_is_evaluation_error() {
        let err = evaluate_strategy("(rebalance (asset \"SPY\"))", &StubIndicatorPort::new())
            .unwrap_err();
        match err {
            EngineError::Evaluation(e) => assert!(e.message.contains("unknown operator 'rebalance'")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn lexical_error_is_parse_error() {
        let err = evaluate_strategy("(asset \"SPY\" @)", &StubIndicatorPort::new()).unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));
        assert_eq!(err.exit_status(), 4);
    }
}

mod port_failures {
    use super::*;

    #[test]
    fn failure_names_symbol_and_indicator() {
        let port = StubIndicatorPort::new().with_failure("XYZ", Indicator::Rsi, 14, "delisted");
        let source = r#"(if (> (rsi "XYZ" 14) 70) (asset "A") (asset "B"))"#;
        let err = evaluate_strategy(source, &port).unwrap_err();

        let EngineError::Evaluation(eval) = &err else {
            panic!("unexpected error: {err}");
        };
        assert!(eval.message.contains("XYZ"));
        assert!(eval.message.contains("rsi"));
        let cause = eval.source().map(|c| c.to_string()).unwrap_or_default();
        assert!(cause.contains("delisted"), "{cause}");
        assert_eq!(err.exit_status(), 5);
    }

    #[test]
    fn no_default_substituted_for_missing_data() {
        let port = StubIndicatorPort::new();
        let err = evaluate_strategy(RSI_SWITCH, &port).unwrap_err();
        assert!(matches!(err, EngineError::Evaluation(_)));
    }

    #[test]
    fn and_skips_fetches_after_false() {
        let port = StubIndicatorPort::new().with_value("SPY", Indicator::Rsi, 10, "20");
        let source = r#"
(if (and (> (rsi "SPY" 10) 50) (> (rsi "QQQ" 10) 50))
    (asset "SPY")
    (asset "BIL"))"#;
        let (allocation, _) = evaluate_strategy(source, &port).unwrap();
        assert_eq!(allocation.weight("BIL"), Some(Decimal::ONE));
        assert_eq!(port.call_count(), 1);
    }

    #[test]
    fn or_skips_fetches_after_true() {
        let port = StubIndicatorPort::new().with_value("SPY", Indicator::Rsi, 10, "80");
        let source = r#"
(if (or (> (rsi "SPY" 10) 50) (> (rsi "QQQ" 10) 50))
    (asset "SPY")
    (asset "BIL"))"#;
        evaluate_strategy(source, &port).unwrap();
        assert_eq!(port.call_count(), 1);
    }

    #[test]
    fn untaken_branch_is_never_fetched() {
        let port = StubIndicatorPort::new().with_value("SPY", Indicator::Rsi, 14, "80");
        let source = r#"
(if (> (rsi "SPY" 14) 70)
    (asset "SHY")
    (filter (rsi 14) (select-top 1) [(asset "QQQ") (asset "IWM")]))"#;
        evaluate_strategy(source, &port).unwrap();
        assert_eq!(port.call_count(), 1);
    }
}

mod determinism {
    use super::*;

    const TIED: &str = r#"(filter (rsi 10) (select-top 1) [(asset "MSFT") (asset "AAPL")])"#;
    const TIED_REVERSED: &str = r#"(filter (rsi 10) (select-top 1) [(asset "AAPL") (asset "MSFT")])"#;

    fn tied_port() -> StubIndicatorPort {
        StubIndicatorPort::new()
            .with_value("AAPL", Indicator::Rsi, 10, "42")
            .with_value("MSFT", Indicator::Rsi, 10, "42.00")
    }

    #[test]
    fn tie_picks_lexically_first_symbol() {
        for source in [TIED, TIED_REVERSED] {
            for _ in 0..10 {
                let (allocation, _) = evaluate_strategy(source, &tied_port()).unwrap();
                assert_eq!(allocation.weight("AAPL"), Some(Decimal::ONE));
                assert_eq!(allocation.len(), 1);
            }
        }
    }

    #[test]
    fn re_evaluation_is_idempotent() {
        let port = tied_port();
        let first = evaluate_strategy(TIED, &port).unwrap();
        let second = evaluate_strategy(TIED, &port).unwrap();
        assert_eq!(first, second);
        // No cache survives between calls.
        assert_eq!(port.call_count(), 4);
    }

    #[test]
    fn concurrent_evaluations_share_snapshot() {
        let snapshot = InMemoryIndicators::new()
            .with_value("SPY", Indicator::Rsi, 14, dec("80"))
            .with_value("AAPL", Indicator::Rsi, 10, dec("42"))
            .with_value("MSFT", Indicator::Rsi, 10, dec("42"));
        let sources = [RSI_SWITCH, TIED, TIED_REVERSED, r#"(asset "GLD")"#];

        let sequential: Vec<_> = sources
            .iter()
            .map(|s| evaluate_strategy(s, &snapshot).unwrap())
            .collect();

        let concurrent: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = sources
                .iter()
                .map(|s| {
                    let snapshot = &snapshot;
                    scope.spawn(move || evaluate_strategy(s, snapshot).unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(sequential, concurrent);
    }
}

mod files {
    use super::*;

    #[test]
    fn oversized_file_is_rejected_without_parsing() {
        let file = tempfile::NamedTempFile::new().unwrap();
        file.as_file().set_len(MAX_SOURCE_BYTES + 1).unwrap();
        let err = evaluate_strategy_file(file.path(), &StubIndicatorPort::new()).unwrap_err();
        assert!(matches!(err, EngineError::ResourceLimit { .. }));
        assert_eq!(err.exit_status(), 4);
    }

    #[test]
    fn batch_reports_each_file_and_continues() {
        let port = StubIndicatorPort::new().with_value("SPY", Indicator::Rsi, 14, "80");
        let good = write_temp(RSI_SWITCH, ".sexp");
        let bad = write_temp("(if (> (rsi \"XYZ\" 14) 70) (asset \"A\") (asset \"B\"))", ".sexp");
        let paths: Vec<PathBuf> = vec![
            bad.path().to_path_buf(),
            PathBuf::from("/nonexistent/missing.sexp"),
            good.path().to_path_buf(),
        ];

        let outcomes = evaluate_batch(&paths, &port);

        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0].result, Err(EngineError::Evaluation(_))));
        assert!(matches!(outcomes[1].result, Err(EngineError::Io(_))));
        let (allocation, _) = outcomes[2].result.as_ref().unwrap();
        assert_eq!(allocation.weight("SHY"), Some(Decimal::ONE));
        assert_eq!(
            allocation.metadata.get("source"),
            Some(&good.path().display().to_string())
        );
    }
}

mod nesting {
    use super::*;
    use std::thread;
    use stratlang::domain::parser::MAX_DEPTH;

    /// Evaluate on a freshly spawned thread with the default stack size.
    fn evaluate_on_default_thread(
        source: String,
    ) -> Result<stratlang::domain::allocation::TargetAllocation, EngineError> {
        thread::spawn(move || {
            evaluate_strategy(&source, &StubIndicatorPort::new())
                .map(|(allocation, _)| allocation)
        })
        .join()
        .unwrap()
    }

    fn nested(open: &str, inner: &str, close: &str, levels: usize) -> String {
        format!("{}{}{}", open.repeat(levels), inner, close.repeat(levels))
    }

    #[test]
    fn if_chain_at_max_depth() {
        let source = nested("(if true ", r#"(asset "A")"#, ")", MAX_DEPTH - 1);
        let allocation = evaluate_on_default_thread(source).unwrap();
        assert_eq!(allocation.weight("A"), Some(Decimal::ONE));
    }

    #[test]
    fn not_chain_at_max_depth() {
        let condition = nested("(not ", "true", ")", MAX_DEPTH - 1);
        let source = format!(r#"(if {} (asset "A") (asset "B"))"#, condition);
        let allocation = evaluate_on_default_thread(source).unwrap();
        // 299 negations of true
        assert_eq!(allocation.weight("B"), Some(Decimal::ONE));
    }

    #[test]
    fn weight_equal_chain_at_max_depth() {
        let levels = (MAX_DEPTH - 1) / 2;
        let source = nested("(weight-equal [", r#"(asset "A")"#, "])", levels);
        let allocation = evaluate_on_default_thread(source).unwrap();
        assert_eq!(allocation.weights().len(), 1);
        assert_eq!(allocation.weight("A"), Some(Decimal::ONE));
    }

    #[test]
    fn one_past_max_depth_is_parse_error() {
        let source = nested("(if true ", r#"(asset "A")"#, ")", MAX_DEPTH);
        let err = evaluate_on_default_thread(source).unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));
        assert_eq!(err.exit_status(), 4);
    }

    #[test]
    fn deep_failure_does_not_stop_other_threads() {
        let deep_failure = nested("(if true ", r#"(rsi "XYZ" 14)"#, ")", MAX_DEPTH - 1);
        let handles: Vec<_> = [deep_failure, r#"(asset "SPY")"#.to_string()]
            .into_iter()
            .map(|source| {
                thread::spawn(move || evaluate_strategy(&source, &StubIndicatorPort::new()))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(matches!(results[0], Err(EngineError::Evaluation(_))));
        let (allocation, _) = results[1].as_ref().unwrap();
        assert_eq!(allocation.weight("SPY"), Some(Decimal::ONE));
    }
}

fn symbols(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("S{:02}", i)).collect()
}

proptest! {
    #[test]
    fn weight_equal_sums_to_one(n in 1usize..25) {
        let children: Vec<String> = symbols(n).iter().map(|s| format!("(asset \"{}\")", s)).collect();
        let source = format!("(weight-equal [{}])", children.join(" "));
        let (allocation, _) = evaluate_strategy(&source, &StubIndicatorPort::new()).unwrap();
        prop_assert_eq!(allocation.len(), n);
        assert_abs_diff_eq!(allocation.total().to_f64().unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn weight_specified_sums_to_one(weights in prop::collection::vec(1u32..10_000, 1..20)) {
        let pairs: Vec<String> = weights
            .iter()
            .zip(symbols(weights.len()))
            .map(|(w, s)| format!("{}.{:02} (asset \"{}\")", w / 100, w % 100, s))
            .collect();
        let source = format!("(weight-specified {})", pairs.join(" "));
        let (allocation, _) = evaluate_strategy(&source, &StubIndicatorPort::new()).unwrap();
        prop_assert!(allocation.weights().values().all(|w| *w >= Decimal::ZERO));
        assert_abs_diff_eq!(allocation.total().to_f64().unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn filter_output_sums_to_one(
        values in prop::collection::vec(-1000i64..1000, 1..15),
        top in 1usize..6,
    ) {
        let names = symbols(values.len());
        let mut port = StubIndicatorPort::new();
        for (name, v) in names.iter().zip(&values) {
            port = port.with_value(name, Indicator::StdevReturn, 20, &Decimal::new(*v, 2).to_string());
        }
        let children: Vec<String> = names.iter().map(|s| format!("(asset \"{}\")", s)).collect();
        let source = format!(
            "(filter (stdev-return 20) (select-bottom {}) [{}])",
            top,
            children.join(" ")
        );
        let (allocation, _) = evaluate_strategy(&source, &port).unwrap();
        prop_assert_eq!(allocation.len(), top.min(values.len()));
        assert_abs_diff_eq!(allocation.total().to_f64().unwrap(), 1.0, epsilon = 1e-9);
    }
}
