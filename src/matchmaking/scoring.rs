//! Server scoring: population fill curve, ping curve and filter predicates

use std::ops::RangeInclusive;

use crate::config::Tunables;

use super::server::ServerInfo;

/// Score given to full or degenerate servers, overriding the curve
pub const FULL_SERVER_SCORE: f32 = -100.0;

/// Population score at one third full, and again when completely full
const POPULATION_SCORE_A: f32 = 0.20;

/// Ping score of a zero-latency server
const PING_SCORE_ZERO: f32 = 1.0;

/// Linear interpolation through `(in_a, out_a)` and `(in_b, out_b)`,
/// extrapolating outside the segment.
pub fn lerp(in_a: f32, out_a: f32, in_b: f32, out_b: f32, x: f32) -> f32 {
    debug_assert!(in_a != in_b, "degenerate interpolation segment at {in_a}");
    out_a + (out_b - out_a) * (x - in_a) / (in_b - in_a)
}

/// Ping curve construction errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CurveError {
    #[error("breakpoints must be positive and strictly increasing: {0:?}")]
    InputsNotIncreasing([f32; 3]),

    #[error("scores must be below 1.0 and strictly decreasing: {0:?}")]
    OutputsNotDecreasing([f32; 3]),
}

/// Three-point piecewise linear curve with an implied `(0, 1.0)` origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreCurve {
    inputs: [f32; 3],
    outputs: [f32; 3],
}

impl ScoreCurve {
    pub fn new(inputs: [f32; 3], outputs: [f32; 3]) -> Result<Self, CurveError> {
        let [a, b, c] = inputs;
        if !(0.0 < a && a < b && b < c) {
            return Err(CurveError::InputsNotIncreasing(inputs));
        }
        let [sa, sb, sc] = outputs;
        if !(PING_SCORE_ZERO > sa && sa > sb && sb > sc) {
            return Err(CurveError::OutputsNotDecreasing(outputs));
        }
        Ok(Self { inputs, outputs })
    }

    pub fn inputs(&self) -> [f32; 3] {
        self.inputs
    }

    pub fn outputs(&self) -> [f32; 3] {
        self.outputs
    }
}

/// Score a ping time against the ping curve.
///
/// Between A and B the segment runs toward C's score rather than B's, so the
/// curve steps up at B. Beyond B it keeps falling through C without a floor.
pub fn score_ping(ping_ms: f32, curve: &ScoreCurve) -> f32 {
    let [a, b, c] = curve.inputs;
    let [score_a, score_b, score_c] = curve.outputs;
    if ping_ms < a {
        lerp(0.0, PING_SCORE_ZERO, a, score_a, ping_ms)
    } else if ping_ms < b {
        lerp(a, score_a, b, score_c, ping_ms)
    } else {
        lerp(b, score_b, c, score_c, ping_ms)
    }
}

/// Score how well joining would fill a server.
///
/// Rises slowly to 0.2 at one third full, climbs to the ideal score at five
/// sixths full, then drops steeply back to 0.2 when full.
pub fn score_server_population(
    humans: u32,
    bots: u32,
    max_players: u32,
    party_size: u32,
    tunables: &Tunables,
) -> f32 {
    debug_assert!(party_size > 0);

    if max_players < tunables.min_bound_max_players {
        return FULL_SERVER_SCORE;
    }
    let max_players = max_players.min(tunables.max_bound_max_players);

    // Advertised counts are untrusted; overflow scores as full
    let Some(new_humans) = humans.checked_add(party_size) else {
        return FULL_SERVER_SCORE;
    };
    let occupied = new_humans
        .checked_add(bots)
        .and_then(|n| n.checked_add(tunables.headroom_slots));
    match occupied {
        Some(occupied) if occupied <= max_players => {}
        _ => return FULL_SERVER_SCORE,
    }

    let count_a = (max_players / 3) as f32;
    let ideal_count = (u64::from(max_players) * 5 / 6) as f32;
    let ideal_score = tunables.max_population_score.max(0.1);
    let x = new_humans as f32;

    if x <= count_a {
        lerp(0.0, 0.0, count_a, POPULATION_SCORE_A, x)
    } else if x <= ideal_count {
        lerp(count_a, POPULATION_SCORE_A, ideal_count, ideal_score, x)
    } else {
        lerp(ideal_count, ideal_score, max_players as f32, POPULATION_SCORE_A, x)
    }
}

/// App id, password, capacity bounds and account identity
pub fn passes_static_filter(
    server: &ServerInfo,
    app_id: u32,
    max_players_bounds: RangeInclusive<u32>,
) -> bool {
    if server.app_id != app_id {
        return false;
    }
    if server.password {
        return false;
    }
    if !max_players_bounds.contains(&server.max_players) {
        return false;
    }
    server.account.is_valid_game_server()
}

/// Every required tag present and no rejected tag present, ignoring case
pub fn passes_tag_filter<S: AsRef<str>>(tags: &[&str], required: &[S], rejected: &[S]) -> bool {
    let has = |wanted: &str| tags.iter().any(|tag| tag.eq_ignore_ascii_case(wanted));
    required.iter().all(|tag| has(tag.as_ref())) && !rejected.iter().any(|tag| has(tag.as_ref()))
}

/// Interpolated (score, count) a search must reach to stop discovering,
/// relaxing from the start values to the end values over the search window.
pub fn good_enough_thresholds(elapsed_fraction: f32, tunables: &Tunables) -> (f32, f32) {
    let t = elapsed_fraction.clamp(0.0, 1.0);
    let score = tunables.good_enough_score_start
        + (tunables.good_enough_score_end - tunables.good_enough_score_start) * t;
    let count = tunables.good_enough_count_start
        + (tunables.good_enough_count_end - tunables.good_enough_count_start) * t;
    (score, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchmaking::server::ServerAccount;

    const EPS: f32 = 1e-4;

    fn default_curve() -> ScoreCurve {
        Tunables::default().ping_curve().unwrap()
    }

    fn server(max_players: u32) -> ServerInfo {
        ServerInfo {
            address: "10.0.0.1:27015".parse().unwrap(),
            name: "srv".into(),
            players: 0,
            bots: 0,
            max_players,
            ping_ms: 20,
            map: "p2coop_intro".into(),
            tags: String::new(),
            password: false,
            account: ServerAccount::game_server(42),
            app_id: 620,
        }
    }

    #[test]
    fn tiny_servers_fail_soft() {
        let t = Tunables::default();
        for max in 0..t.min_bound_max_players {
            assert_eq!(score_server_population(0, 0, max, 1, &t), FULL_SERVER_SCORE);
        }
    }

    #[test]
    fn full_servers_get_fixed_penalty() {
        let t = Tunables::default();
        // 22 humans + party of 1 + 1 bot + 1 headroom = 25 > 24
        assert_eq!(score_server_population(22, 1, 24, 1, &t), FULL_SERVER_SCORE);
        assert_eq!(score_server_population(0, 23, 24, 1, &t), FULL_SERVER_SCORE);
        assert!(score_server_population(21, 1, 24, 1, &t) > FULL_SERVER_SCORE);
    }

    #[test]
    fn absurd_counts_score_as_full() {
        let t = Tunables::default();
        assert_eq!(score_server_population(0, u32::MAX, 24, 1, &t), FULL_SERVER_SCORE);
        assert_eq!(score_server_population(u32::MAX, 0, 24, 1, &t), FULL_SERVER_SCORE);
        let roomy = Tunables {
            headroom_slots: u32::MAX,
            ..Tunables::default()
        };
        assert_eq!(score_server_population(0, 0, 24, 1, &roomy), FULL_SERVER_SCORE);
    }

    #[test]
    fn max_players_clamped_to_upper_bound() {
        let t = Tunables::default();
        let clamped = score_server_population(10, 0, 64, 1, &t);
        let at_bound = score_server_population(10, 0, t.max_bound_max_players, 1, &t);
        assert!((clamped - at_bound).abs() < EPS);
    }

    #[test]
    fn population_peaks_at_ideal_fill() {
        let t = Tunables::default();
        // 24 slots: one third = 8, ideal = 20
        assert!(score_server_population(0, 0, 24, 1, &t).abs() < 0.1);
        assert!((score_server_population(7, 0, 24, 1, &t) - 0.20).abs() < EPS);
        assert!((score_server_population(19, 0, 24, 1, &t) - 1.5).abs() < EPS);
        assert!(score_server_population(21, 0, 24, 1, &t) < 1.5);
    }

    #[test]
    fn population_is_continuous_at_breakpoints() {
        let t = Tunables::default();
        let max = 24u32;
        let ideal = t.max_population_score;
        for (x, lo_seg, hi_seg) in [
            (8.0f32, (0.0, 0.0, 8.0, 0.20), (8.0, 0.20, 20.0, ideal)),
            (20.0f32, (8.0, 0.20, 20.0, ideal), (20.0, ideal, max as f32, 0.20)),
        ] {
            let left = lerp(lo_seg.0, lo_seg.1, lo_seg.2, lo_seg.3, x);
            let right = lerp(hi_seg.0, hi_seg.1, hi_seg.2, hi_seg.3, x);
            assert!((left - right).abs() < EPS, "discontinuity at {x}");
        }
        let humans_at_a = 8 - 1;
        let humans_at_ideal = 20 - 1;
        assert!((score_server_population(humans_at_a, 0, max, 1, &t) - 0.20).abs() < EPS);
        assert!((score_server_population(humans_at_ideal, 0, max, 1, &t) - ideal).abs() < EPS);
    }

    #[test]
    fn ideal_score_has_floor() {
        let t = Tunables {
            max_population_score: -3.0,
            ..Tunables::default()
        };
        assert!((score_server_population(19, 0, 24, 1, &t) - 0.1).abs() < EPS);
    }

    #[test]
    fn ping_curve_below_a() {
        let curve = default_curve();
        assert!((score_ping(0.0, &curve) - 1.0).abs() < EPS);
        assert!((score_ping(25.0, &curve) - 0.95).abs() < EPS);
    }

    #[test]
    fn ping_between_a_and_b_aims_at_c_score() {
        let curve = default_curve();
        // Halfway from (50, 0.9) toward (150, -1.0), not toward B's 0.0
        assert!((score_ping(100.0, &curve) - (-0.05)).abs() < EPS);
        // Which makes the curve step up at B
        assert!(score_ping(149.9, &curve) < -0.99);
        assert!((score_ping(150.0, &curve) - 0.0).abs() < EPS);
    }

    #[test]
    fn ping_keeps_falling_past_c() {
        let curve = default_curve();
        assert!((score_ping(300.0, &curve) - (-1.0)).abs() < EPS);
        assert!((score_ping(450.0, &curve) - (-2.0)).abs() < EPS);
        assert!(score_ping(5000.0, &curve) < -30.0);
    }

    #[test]
    fn curve_rejects_bad_breakpoints() {
        assert!(matches!(
            ScoreCurve::new([50.0, 50.0, 300.0], [0.9, 0.0, -1.0]),
            Err(CurveError::InputsNotIncreasing(_))
        ));
        assert!(matches!(
            ScoreCurve::new([0.0, 150.0, 300.0], [0.9, 0.0, -1.0]),
            Err(CurveError::InputsNotIncreasing(_))
        ));
        assert!(matches!(
            ScoreCurve::new([50.0, 150.0, 300.0], [0.9, 1.0, -1.0]),
            Err(CurveError::OutputsNotDecreasing(_))
        ));
    }

    #[test]
    fn static_filter_checks_each_field() {
        let bounds = 2..=33;
        assert!(passes_static_filter(&server(24), 620, bounds.clone()));
        assert!(!passes_static_filter(&server(24), 440, bounds.clone()));
        assert!(!passes_static_filter(&server(1), 620, bounds.clone()));
        assert!(!passes_static_filter(&server(34), 620, bounds.clone()));

        let mut locked = server(24);
        locked.password = true;
        assert!(!passes_static_filter(&locked, 620, bounds.clone()));

        let mut anonymous = server(24);
        anonymous.account.account_id = 0;
        assert!(!passes_static_filter(&anonymous, 620, bounds));
    }

    #[test]
    fn tag_filter_requires_and_rejects() {
        let required = ["2player"];
        let rejected = ["noquickplay"];
        assert!(passes_tag_filter(&["2PLAYER", "_registered"], &required, &rejected));
        assert!(!passes_tag_filter(&["_registered"], &required, &rejected));
        assert!(!passes_tag_filter(&["2player", "NoQuickplay"], &required, &rejected));
        assert!(passes_tag_filter::<&str>(&[], &[], &[]));
    }

    #[test]
    fn good_enough_thresholds_relax_over_time() {
        let t = Tunables::default();
        let mut last = good_enough_thresholds(0.0, &t);
        assert_eq!(last, (8.5, 20.0));
        for step in 1..=10 {
            let next = good_enough_thresholds(step as f32 / 10.0, &t);
            assert!(next.0 < last.0);
            assert!(next.1 < last.1);
            last = next;
        }
        assert!((last.0 - 7.0).abs() < EPS);
        assert!((last.1 - 5.0).abs() < EPS);
    }
}
