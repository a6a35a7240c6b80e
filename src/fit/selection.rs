//! Model selection across nested complexities using BIC with a parsimony margin.
//!
//! Each candidate complexity gets a representative BIC:
//! - the sentinel value for the null (zero-component) model
//! - otherwise the minimum BIC over its *converged* solutions
//!
//! Selection rules:
//! 1. Walk complexities in ascending order, tracking a running best.
//! 2. Adopt a complexity only if its representative BIC is finite and beats the
//!    running best by more than `bic_threshold`.
//! 3. Ties at the minimal BIC within a complexity go to the lowest solution id.

use crate::domain::{CandidateResult, Candidates, SelectedModel};
use crate::error::SelectionError;

/// Representative BIC of one candidate complexity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Representative {
    /// `+inf` when no converged solution has a finite bic.
    pub bic: f64,
    pub solution: Option<u32>,
    /// Converged solutions found at this complexity.
    pub converged: usize,
}

/// Compute the representative BIC of a single candidate.
pub fn representative(candidate: &CandidateResult) -> Representative {
    match candidate {
        CandidateResult::Null { bic } => Representative {
            bic: *bic,
            solution: None,
            converged: 0,
        },
        CandidateResult::Fitted { solutions, .. } => {
            let mut best = Representative {
                bic: f64::INFINITY,
                solution: None,
                converged: 0,
            };
            // BTreeMap iterates ids ascending, so strict `<` keeps the first-seen minimum.
            for (&id, solution) in solutions {
                if !solution.converged {
                    continue;
                }
                best.converged += 1;
                // Counted as converged, but a NaN/inf bic never ranks.
                if !solution.bic.is_finite() {
                    continue;
                }
                if best.solution.is_none() || solution.bic < best.bic {
                    best.bic = solution.bic;
                    best.solution = Some(id);
                }
            }
            best
        }
    }
}

/// Representative BIC per complexity, in ascending complexity order.
pub fn candidate_bics(candidates: &Candidates) -> Vec<f64> {
    candidates.values().map(|c| representative(c).bic).collect()
}

/// Choose the best complexity and solution.
///
/// Returns complexity 0 with no solution when nothing improves on the null
/// model; that is a valid outcome, not an error. `multiplicity > 1` is only
/// reported, never resolved here.
pub fn select_best_model(candidates: &Candidates, bic_threshold: f64) -> Result<SelectedModel, SelectionError> {
    if !(bic_threshold.is_finite() && bic_threshold >= 0.0) {
        return Err(SelectionError::InvalidThreshold(bic_threshold));
    }
    if !candidates.contains_key(&0) {
        return Err(SelectionError::MissingNullModel);
    }

    let mut best = SelectedModel {
        complexity: 0,
        solution: None,
        bic: f64::INFINITY,
        multiplicity: 0,
    };
    let mut have_best = false;

    for (&complexity, candidate) in candidates {
        let rep = representative(candidate);
        if !rep.bic.is_finite() {
            continue;
        }
        if !have_best || rep.bic < best.bic - bic_threshold {
            best = SelectedModel {
                complexity,
                solution: rep.solution,
                bic: rep.bic,
                multiplicity: rep.converged,
            };
            have_best = true;
        }
    }

    Ok(best)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use super::*;
    use crate::domain::{ParamSummary, Solution};

    fn solution(bic: f64, converged: bool) -> Solution {
        Solution {
            converged,
            bic,
            summary: ParamSummary::new(),
        }
    }

    fn fitted(solutions: Vec<(u32, f64, bool)>) -> CandidateResult {
        let solutions: BTreeMap<u32, Solution> = solutions
            .into_iter()
            .map(|(id, bic, converged)| (id, solution(bic, converged)))
            .collect();
        let bic = solutions
            .values()
            .filter(|s| s.converged)
            .map(|s| s.bic)
            .fold(f64::INFINITY, f64::min);
        CandidateResult::Fitted { bic, solutions }
    }

    fn ladder(null_bic: f64, bics: &[f64]) -> Candidates {
        let mut candidates = Candidates::new();
        candidates.insert(0, CandidateResult::Null { bic: null_bic });
        for (i, &bic) in bics.iter().enumerate() {
            candidates.insert(i + 1, fitted(vec![(0, bic, true)]));
        }
        candidates
    }

    #[test]
    fn compares_against_running_best_not_null() {
        let candidates = ladder(120.0, &[100.0, 95.0]);
        let chosen = select_best_model(&candidates, 10.0).unwrap();
        assert_eq!(chosen.complexity, 1);
        assert_eq!(chosen.solution, Some(0));
        assert_eq!(chosen.bic, 100.0);
        assert_eq!(chosen.multiplicity, 1);
    }

    #[test]
    fn null_model_wins_without_margin() {
        let candidates = ladder(120.0, &[115.0, 111.0]);
        let chosen = select_best_model(&candidates, 10.0).unwrap();
        assert_eq!(chosen.complexity, 0);
        assert_eq!(chosen.solution, None);
        assert_eq!(chosen.bic, 120.0);
        assert!(chosen.is_null());
    }

    #[test]
    fn improvement_must_be_strict() {
        // 110 == 120 - 10 is not an improvement beyond the margin.
        let candidates = ladder(120.0, &[110.0]);
        assert_eq!(select_best_model(&candidates, 10.0).unwrap().complexity, 0);
    }

    #[test]
    fn missing_null_model_is_an_error() {
        let mut candidates = Candidates::new();
        candidates.insert(1, fitted(vec![(0, 50.0, true)]));
        assert_eq!(
            select_best_model(&candidates, 10.0).unwrap_err(),
            SelectionError::MissingNullModel
        );
    }

    #[test]
    fn rejects_negative_threshold() {
        let candidates = ladder(120.0, &[]);
        assert!(matches!(
            select_best_model(&candidates, -1.0),
            Err(SelectionError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn non_converged_solutions_are_ignored() {
        let mut candidates = ladder(120.0, &[]);
        candidates.insert(1, fitted(vec![(0, 10.0, false), (1, 100.0, true)]));
        let chosen = select_best_model(&candidates, 10.0).unwrap();
        assert_eq!(chosen.complexity, 1);
        assert_eq!(chosen.solution, Some(1));
        assert_eq!(chosen.bic, 100.0);
        assert_eq!(chosen.multiplicity, 1);
    }

    #[test]
    fn complexity_without_converged_solutions_is_skipped() {
        let mut candidates = ladder(120.0, &[]);
        candidates.insert(1, fitted(vec![(0, 10.0, false)]));
        candidates.insert(2, fitted(vec![(0, 105.0, true)]));
        let chosen = select_best_model(&candidates, 10.0).unwrap();
        assert_eq!(chosen.complexity, 2);
    }

    #[test]
    fn ties_go_to_lowest_solution_id() {
        let mut candidates = ladder(120.0, &[]);
        candidates.insert(1, fitted(vec![(3, 90.0, true), (1, 90.0, true), (2, 95.0, true)]));
        let chosen = select_best_model(&candidates, 10.0).unwrap();
        assert_eq!(chosen.solution, Some(1));
        assert_eq!(chosen.multiplicity, 3);
        assert!(chosen.is_ambiguous());
    }

    #[test]
    fn multiplicity_counts_only_the_adopted_complexity() {
        let mut candidates = ladder(120.0, &[]);
        candidates.insert(1, fitted(vec![(0, 100.0, true), (1, 101.0, true)]));
        candidates.insert(2, fitted(vec![(0, 99.0, true)]));
        let chosen = select_best_model(&candidates, 10.0).unwrap();
        assert_eq!(chosen.complexity, 1);
        assert_eq!(chosen.multiplicity, 2);
    }

    #[test]
    fn non_finite_null_lets_first_finite_complexity_in() {
        let mut candidates = ladder(f64::NAN, &[]);
        candidates.insert(1, fitted(vec![(0, 500.0, true)]));
        let chosen = select_best_model(&candidates, 10.0).unwrap();
        assert_eq!(chosen.complexity, 1);
        assert_eq!(chosen.bic, 500.0);
    }

    #[test]
    fn nan_bic_solution_does_not_hide_finite_minimum() {
        let mut candidates = ladder(120.0, &[]);
        candidates.insert(1, fitted(vec![(0, f64::NAN, true), (1, 100.0, true)]));

        let rep = representative(&candidates[&1]);
        assert_eq!(rep.bic, 100.0);
        assert_eq!(rep.solution, Some(1));
        assert_eq!(rep.converged, 2);

        let chosen = select_best_model(&candidates, 10.0).unwrap();
        assert_eq!(chosen.complexity, 1);
        assert_eq!(chosen.solution, Some(1));
        assert_eq!(chosen.multiplicity, 2);
    }

    #[test]
    fn only_non_finite_converged_bics_leave_complexity_unranked() {
        let mut candidates = ladder(120.0, &[]);
        candidates.insert(1, fitted(vec![(0, f64::NAN, true), (1, f64::INFINITY, true)]));

        let rep = representative(&candidates[&1]);
        assert_eq!(rep.bic, f64::INFINITY);
        assert_eq!(rep.solution, None);
        assert_eq!(rep.converged, 2);
        assert_eq!(select_best_model(&candidates, 10.0).unwrap().complexity, 0);
    }

    #[test]
    fn greedy_walk_can_go_deeper_at_larger_margin() {
        // With t=5 complexity 1 is adopted and 2 must then beat 90-5.
        // With t=12 complexity 1 is skipped and 2 only has to beat 100-12.
        let candidates = ladder(100.0, &[90.0, 85.0]);
        assert_eq!(select_best_model(&candidates, 5.0).unwrap().complexity, 1);
        assert_eq!(select_best_model(&candidates, 12.0).unwrap().complexity, 2);
    }

    #[test]
    fn candidate_bics_reports_infinity_for_unconverged() {
        let mut candidates = ladder(120.0, &[100.0]);
        candidates.insert(2, fitted(vec![(0, 80.0, false)]));
        assert_eq!(candidate_bics(&candidates), vec![120.0, 100.0, f64::INFINITY]);
    }

    proptest! {
        #[test]
        fn no_margin_improvement_selects_null(
            null_bic in -1000.0f64..1000.0,
            threshold in 0.0f64..50.0,
            deltas in prop::collection::vec(-1.0f64..1.0, 0..6),
        ) {
            // Every complexity sits within the margin of the null model.
            let bics: Vec<f64> = deltas.iter().map(|d| null_bic - threshold * d.abs()).collect();
            let chosen = select_best_model(&ladder(null_bic, &bics), threshold).unwrap();
            prop_assert_eq!(chosen.complexity, 0);
            prop_assert_eq!(chosen.solution, None);
        }

        #[test]
        fn larger_margin_never_adds_complexity_for_single_alternative(
            null_bic in -1000.0f64..1000.0,
            bic in -1000.0f64..1000.0,
            t1 in 0.0f64..50.0,
            extra in 0.0f64..50.0,
        ) {
            let candidates = ladder(null_bic, &[bic]);
            let low = select_best_model(&candidates, t1).unwrap();
            let high = select_best_model(&candidates, t1 + extra).unwrap();
            prop_assert!(high.complexity <= low.complexity);
        }

        #[test]
        fn selected_model_always_has_finite_bic_or_is_null(
            null_bic in -1000.0f64..1000.0,
            bics in prop::collection::vec(-1000.0f64..1000.0, 0..6),
            threshold in 0.0f64..50.0,
        ) {
            let chosen = select_best_model(&ladder(null_bic, &bics), threshold).unwrap();
            prop_assert!(chosen.bic.is_finite());
            prop_assert!(chosen.bic <= null_bic);
            if chosen.complexity > 0 {
                prop_assert!(chosen.bic < null_bic - threshold);
            }
        }
    }
}
