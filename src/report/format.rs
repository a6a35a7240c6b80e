//! Formatted terminal output.
//!
//! We keep formatting code in one place so the selection/aggregation code stays
//! clean and output changes are localized.

use crate::domain::{CandidateResult, CombineConfig, FitArtifact, OutcomeTally, SelectedModel};
use crate::fit::selection::representative;
use crate::io::export::PersistedPaths;

/// Format the batch summary (outcome counts + complexity histogram + outputs).
pub fn format_run_summary(tally: &OutcomeTally, n_components: usize, config: &CombineConfig, paths: &PersistedPaths) -> String {
    let mut out = String::new();

    out.push_str("=== combine - Bayesian line-fit aggregation ===\n");
    out.push_str(&format!("Dataset: {}\n", config.dataset_path.display()));
    out.push_str(&format!("Results: {}\n", config.results_dir.display()));
    out.push_str(&format!(
        "BIC threshold: {} | baseline degree: {} | species: {}\n",
        config.bic_threshold,
        config.protocol.baseline_degree,
        config.protocol.species.join(", ")
    ));

    out.push_str("\nSightlines:\n");
    out.push_str(&format!("  {:<22} {:>8}\n", "total", tally.total));
    out.push_str(&format!("  {:<22} {:>8}\n", "excluded (no data)", tally.excluded));
    out.push_str(&format!("  {:<22} {:>8}\n", "no output", tally.no_output));
    out.push_str(&format!("  {:<22} {:>8}\n", "failed upstream", tally.upstream));
    out.push_str(&format!("  {:<22} {:>8}\n", "no model", tally.no_model));
    out.push_str(&format!("  {:<22} {:>8}\n", "fitted", tally.fitted));
    out.push_str(&format!("  {:<22} {:>8}\n", "  ambiguous", tally.ambiguous));

    if !tally.complexity.is_empty() {
        out.push_str("\nSelected complexity:\n");
        for (n, count) in &tally.complexity {
            out.push_str(&format!("  {n:>3} components {count:>8}\n"));
        }
    }
    out.push_str(&format!("\nComponent records: {n_components}\n"));

    out.push_str("\nOutputs:\n");
    for p in [
        &paths.sightlines_bin,
        &paths.components_bin,
        &paths.sightlines_csv,
        &paths.components_csv,
    ] {
        out.push_str(&format!("- {}\n", p.display()));
    }

    out
}

/// Format per-complexity representative BICs and the selection for one artifact.
pub fn format_selection(artifact: &FitArtifact, selected: &SelectedModel, bic_threshold: f64) -> String {
    let mut out = String::new();
    out.push_str(&format!("Sightline {} (threshold {bic_threshold})\n", artifact.idx));
    if let Some(e) = &artifact.exception {
        out.push_str(&format!("Upstream exception: {e}\n"));
    }

    out.push_str(&format!(
        "{:>3} {:>6} {:>10} {:>16} {:>8}\n",
        "", "n", "solutions", "bic", "solution"
    ));
    for (&n, candidate) in &artifact.candidates {
        let rep = representative(candidate);
        let solutions = match candidate {
            CandidateResult::Null { .. } => "null".to_string(),
            CandidateResult::Fitted { solutions, .. } => format!("{}/{}", rep.converged, solutions.len()),
        };
        let chosen = if n == selected.complexity { "*" } else { " " };
        out.push_str(&format!(
            "{chosen:>3} {n:>6} {solutions:>10} {:>16.3} {:>8}\n",
            rep.bic,
            rep.solution.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string())
        ));
    }

    if selected.is_null() {
        out.push_str("\nNo model improves on the null model.\n");
    } else {
        out.push_str(&format!(
            "\nSelected: {} components, solution {}, BIC {:.3}",
            selected.complexity,
            selected.solution.map(|s| s.to_string()).unwrap_or_default(),
            selected.bic
        ));
        if selected.is_ambiguous() {
            out.push_str(&format!(" ({} converged solutions)", selected.multiplicity));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::{Candidates, ParamSummary, Solution};
    use crate::fit::selection::select_best_model;

    #[test]
    fn selection_table_marks_chosen_complexity() {
        let mut candidates = Candidates::new();
        candidates.insert(0, CandidateResult::Null { bic: 120.0 });
        let mut solutions = BTreeMap::new();
        for (id, converged) in [(0, true), (1, true), (2, false)] {
            solutions.insert(
                id,
                Solution {
                    converged,
                    bic: 100.0 + id as f64,
                    summary: ParamSummary::new(),
                },
            );
        }
        candidates.insert(1, CandidateResult::Fitted { bic: 100.0, solutions });
        let artifact = FitArtifact {
            idx: 4,
            exception: None,
            candidates,
        };

        let selected = select_best_model(&artifact.candidates, 10.0).unwrap();
        let text = format_selection(&artifact, &selected, 10.0);
        assert!(text.contains("2/3"));
        assert!(text.contains("Selected: 1 components, solution 0"));
        assert!(text.contains("(2 converged solutions)"));
        let chosen_line = text.lines().find(|l| l.trim_start().starts_with('*')).unwrap();
        assert!(chosen_line.contains("100.000"));
    }

    #[test]
    fn run_summary_lists_counts() {
        let mut tally = OutcomeTally {
            total: 10,
            excluded: 1,
            no_output: 2,
            upstream: 1,
            no_model: 3,
            fitted: 3,
            ambiguous: 1,
            ..OutcomeTally::default()
        };
        tally.complexity.insert(2, 3);
        let config = CombineConfig {
            dataset_path: "data.json".into(),
            results_dir: "results".into(),
            out_dir: "out".into(),
            bic_threshold: 10.0,
            protocol: Default::default(),
            sequences: crate::domain::SequencePolicy::Stringify,
            threads: 0,
        };
        let paths = PersistedPaths {
            sightlines_bin: "out/sightlines.bin".into(),
            components_bin: "out/components.bin".into(),
            sightlines_csv: "out/sightlines.csv".into(),
            components_csv: "out/components.csv".into(),
        };
        let text = format_run_summary(&tally, 6, &config, &paths);
        assert!(text.contains("no model"));
        assert!(text.contains("  2 components        3"));
        assert!(text.contains("Component records: 6"));
        assert!(text.contains("out/components.csv"));
    }
}
