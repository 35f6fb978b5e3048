//! The fixed stimulus/response rule.
//!
//! An exponential moving average: the agent keeps 90% of its state and takes
//! 10% from the stimulus, then answers with 110% of the new state.

/// Share of the previous state kept on every stimulus.
pub const RETAINED_WEIGHT: f64 = 0.9;

/// Share of the incoming payload folded into the state.
pub const STIMULUS_WEIGHT: f64 = 0.1;

/// Gain applied to the updated state to form the response payload.
pub const RESPONSE_GAIN: f64 = 1.1;

/// Next state for `state` receiving `payload`.
///
/// Finite inputs always give a finite state; the sum saturates instead of
/// rounding up to infinity at the very top of the range.
pub fn next_state(state: f64, payload: f64) -> f64 {
    (state * RETAINED_WEIGHT + payload * STIMULUS_WEIGHT).clamp(f64::MIN, f64::MAX)
}

/// Response payload emitted by an agent holding `state`.
///
/// Saturates at the finite range so a forwarded payload is always finite.
pub fn response(state: f64) -> f64 {
    (state * RESPONSE_GAIN).clamp(f64::MIN, f64::MAX)
}

/// Apply the rule, returning `(next_state, response)`.
pub fn transition(state: f64, payload: f64) -> (f64, f64) {
    let next = next_state(state, payload);
    (next, response(next))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_is_the_documented_ema() {
        let cases = [(0.5, 0.9), (0.2, 0.594), (0.0, 1.0), (-3.5, 12.25), (1e6, -1e-6)];
        for (s, p) in cases {
            let (next, resp) = transition(s, p);
            assert_eq!(next, 0.9 * s + 0.1 * p);
            assert_eq!(resp, 1.1 * (0.9 * s + 0.1 * p));
        }
    }

    #[test]
    fn alpha_scenario_values() {
        let (next, resp) = transition(0.5, 0.9);
        assert!((next - 0.54).abs() < 1e-12);
        assert!((resp - 0.594).abs() < 1e-12);
    }

    #[test]
    fn response_stays_finite_near_the_float_limit() {
        let big = f64::MAX / 1.05;
        let (next, resp) = transition(big, big);
        assert!(next.is_finite());
        assert_eq!(resp, f64::MAX);

        let (next, _) = transition(f64::MAX, f64::MAX);
        assert!(next.is_finite());
    }
}
