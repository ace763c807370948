//! Markdown rendering of a confidence report.

use repograde_stats::{mean, percentile};
use repograde_types::ConfidenceReport;
use std::collections::BTreeMap;

fn spread(xs: &[f64]) -> String {
    if xs.is_empty() {
        return "n/a".to_string();
    }
    let max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    format!(
        "mean={:.4}, p95={:.4}, max={:.4}",
        mean(xs),
        percentile(xs, 0.95),
        max
    )
}

fn opt(s: &Option<String>) -> &str {
    s.as_deref().unwrap_or("-")
}

pub fn render_confidence_markdown(report: &ConfidenceReport) -> String {
    let mut out = String::new();
    out.push_str("# Confidence report\n\n");

    out.push_str("## Rerun variance\n\n");
    if report.rerun.is_empty() {
        out.push_str("_no reruns_\n\n");
    } else {
        let cv_nf: Vec<f64> = report.rerun.iter().map(|s| s.cv_of("non_functional")).collect();
        let cv_perf: Vec<f64> = report.rerun.iter().map(|s| s.cv_of("sub_performance")).collect();
        let cv_res: Vec<f64> = report.rerun.iter().map(|s| s.cv_of("sub_resource")).collect();
        out.push_str(&format!("- non-functional CV: {}\n", spread(&cv_nf)));
        out.push_str(&format!("- performance subscore CV: {}\n", spread(&cv_perf)));
        out.push_str(&format!("- resource subscore CV: {}\n\n", spread(&cv_res)));

        out.push_str("| task | candidate | runs | functional (mean) | functional CV | non-functional (mean) | non-functional CV | max CV |\n");
        out.push_str("|---|---|---:|---:|---:|---:|---:|---:|\n");
        for s in &report.rerun {
            let max_cv = s.metrics.values().map(|m| m.cv.abs()).fold(0.0, f64::max);
            out.push_str(&format!(
                "| {} | `{}` | {} | {:.4} | {:.4} | {:.4} | {:.4} | {:.4} |\n",
                s.task,
                s.candidate,
                s.runs,
                s.mean_of("functional"),
                s.cv_of("functional"),
                s.mean_of("non_functional"),
                s.cv_of("non_functional"),
                max_cv,
            ));
        }
        out.push('\n');
    }

    out.push_str("## Test budget sensitivity\n\n");
    if report.budget.is_empty() {
        out.push_str("_no budget runs_\n\n");
    } else {
        out.push_str("| task | ratio | repeats | spearman (mean) | spearman p05 | top-1 stability | flip rate (mean) | flip rate p95 |\n");
        out.push_str("|---|---:|---:|---:|---:|---:|---:|---:|\n");
        for b in &report.budget {
            out.push_str(&format!(
                "| {} | {:.2} | {} | {:.4} | {:.4} | {:.2} | {:.4} | {:.4} |\n",
                b.task,
                b.ratio,
                b.repeats,
                b.spearman_mean,
                b.spearman_p05,
                b.top1_stability,
                b.flip_mean,
                b.flip_p95,
            ));
        }
        out.push('\n');

        // across tasks, per ratio
        let mut by_ratio: BTreeMap<u64, (f64, Vec<f64>)> = BTreeMap::new();
        for b in &report.budget {
            by_ratio
                .entry(b.ratio.to_bits())
                .or_insert_with(|| (b.ratio, Vec::new()))
                .1
                .push(b.spearman_mean);
        }
        let mut ratios: Vec<(f64, Vec<f64>)> = by_ratio.into_values().collect();
        ratios.sort_by(|a, b| a.0.total_cmp(&b.0));
        for (ratio, xs) in ratios {
            out.push_str(&format!(
                "- ratio={ratio:.2}: mean spearman={:.4}, p05={:.4}\n",
                mean(&xs),
                percentile(&xs, 0.05)
            ));
        }
        out.push('\n');
    }

    out.push_str("## Noise sensitivity\n\n");
    if report.noise.is_empty() {
        out.push_str("_no noise runs_\n");
    } else {
        out.push_str("| task | workers | repeats | spearman idle vs noisy | top-1 idle | top-1 noisy | flipped | flip rate |\n");
        out.push_str("|---|---:|---:|---:|---|---|---|---:|\n");
        for n in &report.noise {
            out.push_str(&format!(
                "| {} | {} | {} | {:.4} | {} | {} | {} | {:.4} |\n",
                n.task,
                n.workers,
                n.repeats,
                n.spearman,
                opt(&n.top1_idle),
                opt(&n.top1_noisy),
                if n.top1_flipped { "yes" } else { "no" },
                n.flip_rate,
            ));
        }
        let rhos: Vec<f64> = report.noise.iter().map(|n| n.spearman).collect();
        let flips = report.noise.iter().filter(|n| n.top1_flipped).count();
        out.push_str(&format!("\n- spearman idle vs noisy: {}\n", spread(&rhos)));
        out.push_str(&format!(
            "- top-1 flips: {flips}/{}\n",
            report.noise.len()
        ));
    }

    out
}
