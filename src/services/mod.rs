pub mod result_classifier;
pub mod sample_outcomes;

pub use result_classifier::{BandLimits, DecisionBand, ResultClassifier, ScoreBand, Verdict};
pub use sample_outcomes::{canned_outcome, CannedOutcome, CANNED_OUTCOMES};
