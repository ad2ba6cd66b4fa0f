use serde::{Deserialize, Serialize};

use crate::aggregate::PartitionKey;
use crate::cfg::ScoringCfg;
use crate::item::{FeatureId, Item, ItemId};

/// Scorer output for one item. Never mutated once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredPayload {
    pub item: Item,
    pub item_id: ItemId,
    pub score: f64,
}

/// One (key, value) pair handed to the grouping stage.
#[derive(Clone, Debug, PartialEq)]
pub struct Emission {
    pub key: PartitionKey,
    pub payload: ScoredPayload,
}

/// One examined signal in a debug trace.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SignalTrace {
    pub feature_id: FeatureId,
    pub similarity: f64,
    pub matched: bool,
}

/// Debug-mode record of how a score came about.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScoreTrace {
    pub item_id: ItemId,
    pub target_feature_id: FeatureId,
    pub signals: Vec<SignalTrace>,
    pub best: f64,
    pub score: f64,
}

/// Highest similarity among signals matching the target or the sentinel,
/// clamped into [0, 1]. Non-finite similarities never match.
fn best_similarity(item: &Item, cfg: &ScoringCfg, mut on_signal: impl FnMut(SignalTrace)) -> f64 {
    let mut best = 0.0_f64;
    for sig in &item.features {
        let matched = cfg.matches(sig.feature_id) && sig.similarity.is_finite();
        if matched {
            best = best.max(sig.similarity);
        }
        on_signal(SignalTrace {
            feature_id: sig.feature_id,
            similarity: sig.similarity,
            matched,
        });
    }
    best.clamp(0.0, 1.0)
}

/// Score one item against `cfg`. Pure: same inputs, same output.
pub fn score_with(item: &Item, cfg: &ScoringCfg) -> ScoredPayload {
    tracing::trace!(item_id = %item.id, target = cfg.target_feature_id, "scoring item");
    let best = best_similarity(item, cfg, |s| {
        tracing::trace!(feature_id = s.feature_id, similarity = s.similarity, matched = s.matched, "similarity");
    });

    ScoredPayload {
        item: item.clone(),
        item_id: item.id.clone(),
        score: best * cfg.effective_damping(),
    }
}

/// Score with the default sentinel and damping.
pub fn score(item: &Item, target_feature_id: FeatureId) -> ScoredPayload {
    score_with(item, &ScoringCfg::for_target(target_feature_id))
}

/// Like `score_with`, but also returns every signal examined.
pub fn score_traced(item: &Item, cfg: &ScoringCfg) -> (ScoredPayload, ScoreTrace) {
    let mut signals = Vec::with_capacity(item.features.len());
    let best = best_similarity(item, cfg, |s| signals.push(s));
    let score = best * cfg.effective_damping();

    let trace = ScoreTrace {
        item_id: item.id.clone(),
        target_feature_id: cfg.target_feature_id,
        signals,
        best,
        score,
    };
    let payload = ScoredPayload {
        item: item.clone(),
        item_id: item.id.clone(),
        score,
    };
    (payload, trace)
}

/// Map step: exactly one emission per item, zero scores included.
pub fn emit(item: &Item, key: &PartitionKey, cfg: &ScoringCfg) -> Emission {
    Emission {
        key: key.clone(),
        payload: score_with(item, cfg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmatched_signals_are_ignored() {
        let item = Item::new("a").with_feature(10004, 0.99).with_feature(1, 0.5);
        assert_eq!(score(&item, 55).score, 0.0);
    }

    #[test]
    fn nan_similarity_never_wins() {
        let item = Item::new("a").with_feature(55, f64::NAN).with_feature(20000, 0.2);
        let p = score(&item, 55);
        assert!((p.score - 0.15).abs() < 1e-12);
    }

    #[test]
    fn trace_lists_every_signal() {
        let item = Item::new("a").with_feature(20000, 0.4).with_feature(7, 0.9);
        let (p, t) = score_traced(&item, &ScoringCfg::for_target(55));
        assert_eq!(t.signals.len(), 2);
        assert!(t.signals[0].matched);
        assert!(!t.signals[1].matched);
        assert_eq!(t.score, p.score);
    }
}
