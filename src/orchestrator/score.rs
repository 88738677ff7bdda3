//! Overall security score.

use serde::Serialize;

pub const FIREWALL_WEIGHT: f64 = 0.25;
pub const IDS_WEIGHT: f64 = 0.25;
pub const RATE_LIMITER_WEIGHT: f64 = 0.20;
pub const SECURE_CHANNEL_WEIGHT: f64 = 0.20;
pub const TUNNELS_WEIGHT: f64 = 0.10;

/// Critical events are counted among this many most recent log entries.
pub const CRITICAL_WINDOW: usize = 100;
pub const CRITICAL_LIMIT: usize = 5;
pub const CRITICAL_PENALTY: f64 = 0.8;

pub const BLOCKED_LIMIT: usize = 50;
pub const BLOCKED_PENALTY: f64 = 0.9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoreInputs {
    pub firewall_active: bool,
    pub ids_active: bool,
    pub rate_limiter_active: bool,
    pub secure_channel_active: bool,
    pub tunnels_active: bool,
    pub recent_critical_events: usize,
    pub blocked_addresses: usize,
}

/// Weighted sum of active subsystems, then both penalties if triggered.
pub fn security_score(inputs: &ScoreInputs) -> f64 {
    let weights = [
        (inputs.firewall_active, FIREWALL_WEIGHT),
        (inputs.ids_active, IDS_WEIGHT),
        (inputs.rate_limiter_active, RATE_LIMITER_WEIGHT),
        (inputs.secure_channel_active, SECURE_CHANNEL_WEIGHT),
        (inputs.tunnels_active, TUNNELS_WEIGHT),
    ];
    let mut score: f64 = weights.iter().filter(|(on, _)| *on).map(|(_, w)| w).sum();

    if inputs.recent_critical_events > CRITICAL_LIMIT {
        score *= CRITICAL_PENALTY;
    }
    if inputs.blocked_addresses > BLOCKED_LIMIT {
        score *= BLOCKED_PENALTY;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_on() -> ScoreInputs {
        ScoreInputs {
            firewall_active: true,
            ids_active: true,
            rate_limiter_active: true,
            secure_channel_active: true,
            tunnels_active: true,
            ..ScoreInputs::default()
        }
    }

    #[test]
    fn test_full_score() {
        assert!((security_score(&all_on()) - 1.0).abs() < 1e-9);
        assert_eq!(security_score(&ScoreInputs::default()), 0.0);
    }

    #[test]
    fn test_without_secure_channel() {
        let inputs = ScoreInputs {
            secure_channel_active: false,
            ..all_on()
        };
        assert!((security_score(&inputs) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_penalties_are_strictly_above_limits() {
        let at_limit = ScoreInputs {
            recent_critical_events: CRITICAL_LIMIT,
            blocked_addresses: BLOCKED_LIMIT,
            ..all_on()
        };
        assert!((security_score(&at_limit) - 1.0).abs() < 1e-9);

        let critical = ScoreInputs {
            recent_critical_events: 6,
            ..all_on()
        };
        assert!((security_score(&critical) - 0.8).abs() < 1e-9);

        let both = ScoreInputs {
            recent_critical_events: 6,
            blocked_addresses: 51,
            ..all_on()
        };
        assert!((security_score(&both) - 0.72).abs() < 1e-9);
    }
}
