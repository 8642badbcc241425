//! Strategy selection: profile plus learned trust, in escalation order.

use std::collections::HashMap;
use urwa_types::{SiteProfile, Strategy, StrategyStat};

/// Build the ordered list of strategies to try for one request.
///
/// A forced strategy short-circuits everything. Otherwise the candidate
/// set is the profile's recommendation, every trusted strategy for the
/// domain, and everything heavier than the recommendation; the result is
/// sorted into escalation order (the attempted sequence is always a
/// subsequence of light → stealth → ultra), intersected with the
/// registered fetchers, and capped at three.
pub fn choose_strategies(
    profile: &SiteProfile,
    stats: &HashMap<Strategy, StrategyStat>,
    force: Option<Strategy>,
    available: &[Strategy],
) -> Vec<Strategy> {
    if let Some(forced) = force {
        return if available.contains(&forced) {
            vec![forced]
        } else {
            Vec::new()
        };
    }

    let recommended = profile.recommended_strategy;
    let mut candidates: Vec<Strategy> = Vec::new();
    candidates.push(recommended);

    // Trusted strategies join the candidate set; ordering is resolved by
    // the escalation sort below, so success rate only decides membership.
    let mut trusted: Vec<(&Strategy, &StrategyStat)> =
        stats.iter().filter(|(_, s)| s.is_trusted()).collect();
    trusted.sort_by(|a, b| {
        b.1.success_rate()
            .partial_cmp(&a.1.success_rate())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    for (strategy, _) in trusted {
        if !candidates.contains(strategy) {
            candidates.push(*strategy);
        }
    }

    // Escalation tail: everything heavier than the starting point.
    for strategy in Strategy::ESCALATION_ORDER {
        if strategy > recommended && !candidates.contains(&strategy) {
            candidates.push(strategy);
        }
    }

    let mut order: Vec<Strategy> = Strategy::ESCALATION_ORDER
        .into_iter()
        .filter(|s| candidates.contains(s) && available.contains(s))
        .collect();

    // A selection the deployment cannot serve falls back to whatever
    // fetchers exist, still in escalation order.
    if order.is_empty() {
        order = available.to_vec();
    }

    order.truncate(3);
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use urwa_types::Risk;

    fn profile(recommended: Strategy) -> SiteProfile {
        let mut profile = SiteProfile::assumed_medium("example.com");
        profile.recommended_strategy = recommended;
        profile.risk = match recommended {
            Strategy::Light => Risk::Low,
            Strategy::Stealth => Risk::Medium,
            Strategy::Ultra => Risk::High,
        };
        profile
    }

    fn stat(attempts: u64, successes: u64) -> StrategyStat {
        StrategyStat {
            attempts,
            successes,
            ..StrategyStat::default()
        }
    }

    const ALL: [Strategy; 3] = Strategy::ESCALATION_ORDER;

    #[test]
    fn force_pins_the_list() {
        let order = choose_strategies(
            &profile(Strategy::Light),
            &HashMap::new(),
            Some(Strategy::Ultra),
            &ALL,
        );
        assert_eq!(order, vec![Strategy::Ultra]);
    }

    #[test]
    fn light_recommendation_gets_full_tail() {
        let order = choose_strategies(&profile(Strategy::Light), &HashMap::new(), None, &ALL);
        assert_eq!(
            order,
            vec![Strategy::Light, Strategy::Stealth, Strategy::Ultra]
        );
    }

    #[test]
    fn stealth_recommendation_skips_light() {
        let order = choose_strategies(&profile(Strategy::Stealth), &HashMap::new(), None, &ALL);
        assert_eq!(order, vec![Strategy::Stealth, Strategy::Ultra]);
    }

    #[test]
    fn trusted_lighter_strategy_joins_ahead() {
        let mut stats = HashMap::new();
        stats.insert(Strategy::Light, stat(10, 9));
        let order = choose_strategies(&profile(Strategy::Stealth), &stats, None, &ALL);
        assert_eq!(
            order,
            vec![Strategy::Light, Strategy::Stealth, Strategy::Ultra]
        );
    }

    #[test]
    fn untrusted_stats_do_not_join() {
        let mut stats = HashMap::new();
        stats.insert(Strategy::Light, stat(4, 4)); // not enough attempts
        stats.insert(Strategy::Ultra, stat(10, 2)); // poor success rate
        let order = choose_strategies(&profile(Strategy::Stealth), &stats, None, &ALL);
        assert_eq!(order, vec![Strategy::Stealth, Strategy::Ultra]);
    }

    #[test]
    fn order_is_always_monotone() {
        let mut stats = HashMap::new();
        stats.insert(Strategy::Ultra, stat(20, 20));
        stats.insert(Strategy::Light, stat(20, 19));
        for recommended in ALL {
            let order = choose_strategies(&profile(recommended), &stats, None, &ALL);
            let mut sorted = order.clone();
            sorted.sort();
            sorted.dedup();
            assert_eq!(order, sorted, "non-monotone order for {:?}", recommended);
        }
    }

    #[test]
    fn unavailable_strategies_are_skipped() {
        let order = choose_strategies(
            &profile(Strategy::Light),
            &HashMap::new(),
            None,
            &[Strategy::Light],
        );
        assert_eq!(order, vec![Strategy::Light]);
    }

    #[test]
    fn forced_but_unavailable_is_empty() {
        let order = choose_strategies(
            &profile(Strategy::Light),
            &HashMap::new(),
            Some(Strategy::Ultra),
            &[Strategy::Light],
        );
        assert!(order.is_empty());
    }
}
