use chrono::{DateTime, Duration, Utc};

use super::mapping::PublisherMapping;

const BASE_SCORE: f64 = 0.5;
const PRICING_BONUS: f64 = 0.2;
const SUCCESS_BONUS: f64 = 0.2;
const RECENCY_BONUS: f64 = 0.1;
const HIGH_SUCCESS_RATE: f64 = 80.0;
const RECENT_ACTIVITY_DAYS: i64 = 180;

/// The three signals the confidence rubric rewards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfidenceSignals {
    pub has_pricing: bool,
    pub high_success_rate: bool,
    pub recent_activity: bool,
}

impl ConfidenceSignals {
    pub fn from_mapping(mapping: &PublisherMapping, as_of: DateTime<Utc>) -> Self {
        let has_pricing = mapping
            .websites
            .iter()
            .any(|website| website.guest_post_cost.is_some());
        let high_success_rate = mapping.websites.iter().any(|website| {
            website
                .success_rate_percentage
                .is_some_and(|rate| rate > HIGH_SUCCESS_RATE)
        });
        let recent_activity = mapping
            .last_activity
            .is_some_and(|seen| seen >= as_of - Duration::days(RECENT_ACTIVITY_DAYS));

        Self {
            has_pricing,
            high_success_rate,
            recent_activity,
        }
    }

    pub fn score(self) -> f64 {
        let mut score = BASE_SCORE;
        if self.has_pricing {
            score += PRICING_BONUS;
        }
        if self.high_success_rate {
            score += SUCCESS_BONUS;
        }
        if self.recent_activity {
            score += RECENCY_BONUS;
        }
        score.clamp(0.0, 1.0)
    }
}

pub fn confidence_score(mapping: &PublisherMapping, as_of: DateTime<Utc>) -> f64 {
    ConfidenceSignals::from_mapping(mapping, as_of).score()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_signals() -> Vec<ConfidenceSignals> {
        let mut out = Vec::new();
        for has_pricing in [false, true] {
            for high_success_rate in [false, true] {
                for recent_activity in [false, true] {
                    out.push(ConfidenceSignals {
                        has_pricing,
                        high_success_rate,
                        recent_activity,
                    });
                }
            }
        }
        out
    }

    #[test]
    fn base_and_full_scores() {
        assert!((ConfidenceSignals::default().score() - 0.5).abs() < 1e-9);
        let full = ConfidenceSignals {
            has_pricing: true,
            high_success_rate: true,
            recent_activity: true,
        };
        assert!((full.score() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn score_is_bounded_and_monotonic_in_each_signal() {
        for signals in all_signals() {
            let score = signals.score();
            assert!((0.0..=1.0).contains(&score));

            let raised = [
                ConfidenceSignals {
                    has_pricing: true,
                    ..signals
                },
                ConfidenceSignals {
                    high_success_rate: true,
                    ..signals
                },
                ConfidenceSignals {
                    recent_activity: true,
                    ..signals
                },
            ];
            for better in raised {
                assert!(better.score() >= score, "{better:?} < {signals:?}");
            }
        }
    }
}
