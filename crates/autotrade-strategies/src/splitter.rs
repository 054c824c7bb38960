//! Expansion of range-style window parameters into a parameter grid.

use autotrade_core::error::StrategyError;
use autotrade_core::types::Parameters;

use crate::trend::keys;

/// Parameters accepting range syntax.
pub const RANGE_KEYS: [&str; 2] = [keys::SHORT_DURATION, keys::LONG_DURATION];

/// Upper bound on the values one range may expand to.
pub const MAX_RANGE_VALUES: usize = 10_000;

/// Upper bound on the short x long combinations of one grid.
pub const MAX_GRID_SETS: usize = 100_000;

/// Parse `v`, `start:end` or `start:step:end` into an inclusive sequence.
pub fn parse_range(key: &str, raw: &str) -> Result<Vec<i64>, StrategyError> {
    let format_error = |reason: &str| StrategyError::ParameterFormat {
        key: key.to_string(),
        reason: format!("{raw:?}: {reason}"),
    };

    let parts = raw
        .split(':')
        .map(|part| part.trim().parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format_error(&e.to_string()))?;

    let (start, step, end) = match parts.as_slice() {
        [value] => return Ok(vec![*value]),
        [start, end] => (*start, 1, *end),
        [start, step, end] => (*start, *step, *end),
        _ => return Err(format_error("expected value, start:end or start:step:end")),
    };
    if step <= 0 {
        return Err(format_error("step must be positive"));
    }
    if start > end {
        return Err(format_error("start is greater than end"));
    }

    let count = (i128::from(end) - i128::from(start)) / i128::from(step) + 1;
    if count > MAX_RANGE_VALUES as i128 {
        return Err(format_error(&format!("more than {MAX_RANGE_VALUES} values")));
    }

    let mut values = Vec::with_capacity(count as usize);
    let mut value = Some(start);
    while let Some(v) = value.filter(|v| *v <= end) {
        values.push(v);
        value = v.checked_add(step);
    }
    Ok(values)
}

/// Expand the range parameters into every valid combination.
///
/// Pairs where the short window is not shorter than the long one are dropped;
/// every other parameter is copied into each set unchanged.
pub fn parse_and_split(params: &Parameters) -> Result<Vec<Parameters>, StrategyError> {
    let ranges = RANGE_KEYS
        .iter()
        .map(|key| {
            let raw = params
                .get(key)
                .ok_or_else(|| StrategyError::MissingParameter(key.to_string()))?;
            parse_range(key, raw)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let (shorts, longs) = (&ranges[0], &ranges[1]);
    if shorts.len() * longs.len() > MAX_GRID_SETS {
        return Err(StrategyError::ParameterFormat {
            key: keys::LONG_DURATION.to_string(),
            reason: format!(
                "{} x {} combinations exceed {MAX_GRID_SETS}",
                shorts.len(),
                longs.len()
            ),
        });
    }

    let mut sets = Vec::with_capacity(shorts.len() * longs.len());
    for &short in shorts {
        for &long in longs {
            if short >= long {
                continue;
            }
            let mut set = params.clone();
            set.set(keys::SHORT_DURATION, short.to_string());
            set.set(keys::LONG_DURATION, long.to_string());
            sets.push(set);
        }
    }
    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_forms() {
        assert_eq!(parse_range("k", "5").unwrap(), vec![5]);
        assert_eq!(parse_range("k", "1:4").unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(parse_range("k", "10:5:30").unwrap(), vec![10, 15, 20, 25, 30]);
        assert_eq!(parse_range("k", "10:7:30").unwrap(), vec![10, 17, 24]);
        assert_eq!(parse_range("k", "3:3").unwrap(), vec![3]);
    }

    #[test]
    fn test_parse_range_rejects_malformed() {
        for raw in ["", "a:b", "1:2:3:4", "1:0:5", "1:-1:5", "5:1", "1::3"] {
            assert!(
                matches!(parse_range("k", raw), Err(StrategyError::ParameterFormat { .. })),
                "{raw:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_range_stops_at_i64_max() {
        assert_eq!(
            parse_range("k", "9223372036854775800:10:9223372036854775807").unwrap(),
            vec![9223372036854775800]
        );
        assert_eq!(
            parse_range("k", "9223372036854775806:1:9223372036854775807").unwrap(),
            vec![9223372036854775806, i64::MAX]
        );
    }

    #[test]
    fn test_parse_range_rejects_oversized_ranges() {
        for raw in ["1:1:1000000000", "-9223372036854775808:9223372036854775807"] {
            assert!(
                matches!(parse_range("k", raw), Err(StrategyError::ParameterFormat { .. })),
                "{raw:?} should be rejected"
            );
        }
        assert_eq!(parse_range("k", "1:10000").unwrap().len(), MAX_RANGE_VALUES);
    }

    #[test]
    fn test_split_rejects_oversized_grid() {
        let params = Parameters::new()
            .with(keys::SHORT_DURATION, "1:1000")
            .with(keys::LONG_DURATION, "1:1000");
        assert!(matches!(
            parse_and_split(&params),
            Err(StrategyError::ParameterFormat { .. })
        ));
    }

    #[test]
    fn test_split_counts_sets() {
        let params = Parameters::new()
            .with(keys::SHORT_DURATION, "1:1:3")
            .with(keys::LONG_DURATION, "5");
        let sets = parse_and_split(&params).unwrap();
        assert_eq!(sets.len(), 3);
    }

    #[test]
    fn test_split_drops_invalid_pairs_and_copies_others() {
        let params = Parameters::new()
            .with(keys::SHORT_DURATION, "5:5:15")
            .with(keys::LONG_DURATION, "10:5:15")
            .with(keys::COMMISSION, "0.001");
        let sets = parse_and_split(&params).unwrap();

        let pairs: Vec<(i64, i64)> = sets
            .iter()
            .map(|s| {
                (
                    s.require(keys::SHORT_DURATION).unwrap(),
                    s.require(keys::LONG_DURATION).unwrap(),
                )
            })
            .collect();
        assert_eq!(pairs, vec![(5, 10), (5, 15), (10, 15)]);
        assert!(sets.iter().all(|s| s.get(keys::COMMISSION) == Some("0.001")));
    }

    #[test]
    fn test_split_requires_both_windows() {
        let params = Parameters::new().with(keys::SHORT_DURATION, "1:3");
        assert!(matches!(
            parse_and_split(&params),
            Err(StrategyError::MissingParameter(_))
        ));
    }
}
