//! Ranking confidence under reruns, reduced test budgets and synthetic load.
//!
//! None of the protocols decide anything. They measure how much the ranking of a task's
//! candidates moves and leave the verdict to whoever reads the report.

use crate::evaluate::{evaluate_battery, evaluate_suite, run_signals};
use crate::runner::{SuiteRunner, Target};
use anyhow::Context;
use rand::SeedableRng;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use repograde_adapters::{LoadGenerator, LoadSession};
use repograde_domain::{aggregate_scores, score_suite, weighted_non_functional};
use repograde_stats::{
    mean, pairwise_flip_rate, percentile, ranks_desc, spearman_rho, summarize_series, top1,
};
use repograde_types::{
    AnalysisConfig, BudgetDetailRow, BudgetSummary, ConfidenceReport, NoiseCondition,
    NoiseDetailRow, NoiseSummary, RerunDetailRow, RerunSummary, RunResult, SuiteKind, TaskConfig,
};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// One repository competing on a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub root: PathBuf,
}

impl Candidate {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }
}

type Scores = BTreeMap<String, f64>;

pub struct ConfidenceAnalyzer<R: SuiteRunner, G: LoadGenerator> {
    runner: R,
    load: G,
    config: AnalysisConfig,
}

impl<R: SuiteRunner, G: LoadGenerator> ConfidenceAnalyzer<R, G> {
    pub fn new(runner: R, load: G, config: AnalysisConfig) -> Self {
        Self {
            runner,
            load,
            config,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    fn target(&self, task: &TaskConfig, cand: &Candidate, phase: &str) -> Target {
        Target::generated(&cand.root).log_dir(
            self.config
                .log_dir
                .join(&task.project)
                .join(&cand.name)
                .join(phase),
        )
    }

    /// All three protocols for one task. The budget protocol uses the rerun means as its
    /// full-budget reference.
    pub fn analyze(&self, task: &TaskConfig, candidates: &[Candidate]) -> anyhow::Result<ConfidenceReport> {
        for cand in candidates {
            anyhow::ensure!(
                cand.root.is_dir(),
                "candidate repository not found: {} ({})",
                cand.root.display(),
                cand.name
            );
        }

        let (rerun_details, rerun) = self
            .reruns(task, candidates)
            .with_context(|| format!("rerun protocol for {}", task.project))?;
        let (budget_details, budget) = self.budget(task, candidates, &rerun);
        let (noise_details, noise) = self
            .noise(task, candidates)
            .with_context(|| format!("noise protocol for {}", task.project))?;

        Ok(ConfidenceReport {
            schema: repograde_types::CONFIDENCE_SCHEMA_V1.to_string(),
            rerun_details,
            rerun,
            budget_details,
            budget,
            noise_details,
            noise,
        })
    }

    /// [`ConfidenceAnalyzer::analyze`] over several tasks, concatenated.
    pub fn analyze_tasks<'a>(
        &self,
        tasks: impl IntoIterator<Item = (&'a TaskConfig, &'a [Candidate])>,
    ) -> anyhow::Result<ConfidenceReport> {
        let mut all = ConfidenceReport {
            schema: repograde_types::CONFIDENCE_SCHEMA_V1.to_string(),
            ..ConfidenceReport::default()
        };
        for (task, candidates) in tasks {
            let r = self.analyze(task, candidates)?;
            all.rerun_details.extend(r.rerun_details);
            all.rerun.extend(r.rerun);
            all.budget_details.extend(r.budget_details);
            all.budget.extend(r.budget);
            all.noise_details.extend(r.noise_details);
            all.noise.extend(r.noise);
        }
        Ok(all)
    }

    /// Full battery `reruns` times per candidate, reduced per scalar.
    pub fn reruns(
        &self,
        task: &TaskConfig,
        candidates: &[Candidate],
    ) -> anyhow::Result<(Vec<RerunDetailRow>, Vec<RerunSummary>)> {
        let mut details = Vec::new();
        let mut summaries = Vec::new();

        for cand in candidates {
            let mut runs = Vec::new();
            for i in 1..=self.config.reruns {
                let target = self.target(task, cand, &format!("rerun_{i}"));
                let suites = evaluate_battery(&self.runner, task, &target);
                let record = aggregate_scores(suites.values().map(|e| &e.score), &task.weights)?;
                let run = RunResult::from_record(&record, run_signals(&suites));
                debug!(
                    candidate = %cand.name,
                    run = i,
                    functional = run.functional,
                    non_functional = run.non_functional,
                    "rerun"
                );
                details.push(RerunDetailRow {
                    task: task.project.clone(),
                    candidate: cand.name.clone(),
                    run_index: i,
                    result: run.clone(),
                });
                runs.push(run);
            }
            summaries.push(summarize_runs(&task.project, &cand.name, &runs));
        }

        info!(task = %task.project, candidates = candidates.len(), reruns = self.config.reruns, "rerun protocol done");
        Ok((details, summaries))
    }

    /// Subsample functional and robustness cases; compare the budgeted ranking against the
    /// full-budget means in `reference`.
    ///
    /// Tasks without both a functional and a robustness suite produce nothing.
    pub fn budget(
        &self,
        task: &TaskConfig,
        candidates: &[Candidate],
        reference: &[RerunSummary],
    ) -> (Vec<BudgetDetailRow>, Vec<BudgetSummary>) {
        const SAMPLED: [SuiteKind; 2] = [SuiteKind::Functional, SuiteKind::Robustness];
        if !SAMPLED.iter().all(|k| task.has(*k)) {
            info!(task = %task.project, "no functional/robustness pair; skipping budget protocol");
            return (Vec::new(), Vec::new());
        }

        let means: BTreeMap<&str, &RerunSummary> = reference
            .iter()
            .filter(|s| s.task == task.project)
            .map(|s| (s.candidate.as_str(), s))
            .collect();
        let mean_of = |cand: &Candidate, metric: &str| {
            means.get(cand.name.as_str()).map_or(0.0, |s| s.mean_of(metric))
        };
        let ref_func: Scores = candidates
            .iter()
            .map(|c| (c.name.clone(), mean_of(c, "functional")))
            .collect();
        let ref_nf: Scores = candidates
            .iter()
            .map(|c| (c.name.clone(), mean_of(c, "non_functional")))
            .collect();
        let fixed_subscores: BTreeMap<&str, BTreeMap<SuiteKind, f64>> = candidates
            .iter()
            .map(|c| {
                let subs = task
                    .non_functional_kinds()
                    .map(|k| (k, mean_of(c, &format!("sub_{k}"))))
                    .collect();
                (c.name.as_str(), subs)
            })
            .collect();
        let ref_func_ranks = ranks_desc(&ref_func);
        let ref_nf_ranks = ranks_desc(&ref_nf);
        let ref_top1 = top1(&ref_nf);

        let mut case_ids: BTreeMap<(&str, SuiteKind), Vec<String>> = BTreeMap::new();
        for cand in candidates {
            let target = self.target(task, cand, "budget");
            for kind in SAMPLED {
                let ids = self.runner.collect_cases(task, &target, kind);
                debug!(candidate = %cand.name, %kind, count = ids.len(), "collected cases");
                case_ids.insert((cand.name.as_str(), kind), ids);
            }
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut details = Vec::new();
        let mut summaries = Vec::new();

        for &ratio in &self.config.budget_ratios {
            let mut rhos = Vec::new();
            let mut func_rhos = Vec::new();
            let mut flips = Vec::new();
            let mut top1_hits = 0u32;

            for repeat in 1..=self.config.budget_repeats {
                let mut sampled_func = Scores::new();
                let mut sampled_nf = Scores::new();

                for cand in candidates {
                    let target = self.target(task, cand, "budget");
                    let func_ids = &case_ids[&(cand.name.as_str(), SuiteKind::Functional)];
                    let rob_ids = &case_ids[&(cand.name.as_str(), SuiteKind::Robustness)];

                    let (s_func, s_rob) = if func_ids.is_empty() || rob_ids.is_empty() {
                        (0.0, 0.0)
                    } else {
                        let picked = sample_ids(&mut rng, func_ids, ratio);
                        let func = self.runner.run_cases(task, &target, SuiteKind::Functional, &picked);
                        let picked = sample_ids(&mut rng, rob_ids, ratio);
                        let rob = self.runner.run_cases(task, &target, SuiteKind::Robustness, &picked);
                        (
                            score_suite(SuiteKind::Functional, &func, task.baseline(SuiteKind::Functional)).score,
                            score_suite(SuiteKind::Robustness, &rob, task.baseline(SuiteKind::Robustness)).score,
                        )
                    };

                    let mut subs = fixed_subscores
                        .get(cand.name.as_str())
                        .cloned()
                        .unwrap_or_default();
                    subs.insert(SuiteKind::Robustness, s_rob);
                    sampled_func.insert(cand.name.clone(), s_func);
                    sampled_nf.insert(cand.name.clone(), weighted_non_functional(&subs, &task.weights));
                }

                let rho = spearman_rho(&ref_nf_ranks, &ranks_desc(&sampled_nf));
                let func_rho = spearman_rho(&ref_func_ranks, &ranks_desc(&sampled_func));
                let flip = pairwise_flip_rate(&ref_nf, &sampled_nf);
                let top = top1(&sampled_nf);
                let hit = ref_top1.is_some() && top == ref_top1;
                if hit {
                    top1_hits += 1;
                }
                rhos.push(rho);
                func_rhos.push(func_rho);
                flips.push(flip);

                details.push(BudgetDetailRow {
                    task: task.project.clone(),
                    ratio,
                    repeat,
                    spearman: rho,
                    functional_spearman: func_rho,
                    top1_reference: ref_top1.clone(),
                    top1_sampled: top,
                    top1_match: hit,
                    flip_rate: flip,
                    scores: sampled_nf,
                });
            }

            let repeats = self.config.budget_repeats;
            summaries.push(BudgetSummary {
                task: task.project.clone(),
                ratio,
                repeats,
                spearman_mean: mean(&rhos),
                spearman_p05: percentile(&rhos, 0.05),
                spearman_p95: percentile(&rhos, 0.95),
                functional_spearman_mean: mean(&func_rhos),
                top1_stability: if repeats > 0 {
                    f64::from(top1_hits) / f64::from(repeats)
                } else {
                    0.0
                },
                flip_mean: mean(&flips),
                flip_p95: percentile(&flips, 0.95),
            });
            info!(task = %task.project, ratio, spearman_mean = mean(&rhos), "budget ratio done");
        }

        (details, summaries)
    }

    /// Performance and resource suites idle and under load; compare the two rankings.
    ///
    /// Load workers live for the whole measured run and are stopped before the next
    /// repeat, including when the run itself fails.
    pub fn noise(
        &self,
        task: &TaskConfig,
        candidates: &[Candidate],
    ) -> anyhow::Result<(Vec<NoiseDetailRow>, Vec<NoiseSummary>)> {
        let measured: Vec<SuiteKind> = [SuiteKind::Performance, SuiteKind::Resource]
            .into_iter()
            .filter(|k| task.has(*k))
            .collect();
        if measured.is_empty() {
            info!(task = %task.project, "no performance/resource suite; skipping noise protocol");
            return Ok((Vec::new(), Vec::new()));
        }

        let lifetime = measured
            .iter()
            .map(|k| task.timeout_for(*k))
            .max()
            .unwrap_or_default()
            .max(Duration::from_millis(self.config.min_load_lifetime_ms));

        let mut details = Vec::new();
        let mut by_condition: BTreeMap<&'static str, Scores> = BTreeMap::new();

        for condition in [NoiseCondition::Idle, NoiseCondition::Noisy] {
            let scores = by_condition.entry(condition.as_str()).or_default();
            for cand in candidates {
                let target = self.target(task, cand, &format!("noise_{}", condition.as_str()));
                let mut perf = Vec::new();
                let mut res = Vec::new();

                for repeat in 1..=self.config.noise_repeats {
                    let session = match condition {
                        NoiseCondition::Idle => LoadSession::idle(),
                        NoiseCondition::Noisy => self
                            .load
                            .start(self.config.noise_workers, lifetime)
                            .context("start load workers")?,
                    };

                    let mut row = NoiseDetailRow {
                        task: task.project.clone(),
                        condition,
                        candidate: cand.name.clone(),
                        repeat,
                        performance: None,
                        resource: None,
                    };
                    for &kind in &measured {
                        let score = evaluate_suite(&self.runner, task, &target, kind).score.score;
                        match kind {
                            SuiteKind::Performance => {
                                perf.push(score);
                                row.performance = Some(score);
                            }
                            _ => {
                                res.push(score);
                                row.resource = Some(score);
                            }
                        }
                    }
                    session.stop();
                    details.push(row);
                }

                let parts: Vec<f64> = [perf, res]
                    .iter()
                    .filter(|xs| !xs.is_empty())
                    .map(|xs| mean(xs))
                    .collect();
                scores.insert(cand.name.clone(), mean(&parts));
            }
        }

        let idle = by_condition.remove("idle").unwrap_or_default();
        let noisy = by_condition.remove("noisy").unwrap_or_default();
        let top1_idle = top1(&idle);
        let top1_noisy = top1(&noisy);
        let summary = NoiseSummary {
            task: task.project.clone(),
            workers: self.config.noise_workers,
            repeats: self.config.noise_repeats,
            spearman: spearman_rho(&ranks_desc(&idle), &ranks_desc(&noisy)),
            top1_flipped: matches!((&top1_idle, &top1_noisy), (Some(a), Some(b)) if a != b),
            top1_idle,
            top1_noisy,
            flip_rate: pairwise_flip_rate(&idle, &noisy),
            idle_scores: idle,
            noisy_scores: noisy,
        };
        info!(
            task = %task.project,
            spearman = summary.spearman,
            top1_flipped = summary.top1_flipped,
            "noise protocol done"
        );
        Ok((details, vec![summary]))
    }
}

/// Sample `max(1, round(ratio * n))` ids without replacement, capped at `n`, in listing order.
fn sample_ids(rng: &mut ChaCha8Rng, ids: &[String], ratio: f64) -> Vec<String> {
    let n = ids.len();
    let k = ((ratio * n as f64).round() as usize).clamp(1, n);
    let mut picked = index::sample(rng, n, k).into_vec();
    picked.sort_unstable();
    picked.into_iter().map(|i| ids[i].clone()).collect()
}

/// Reduce runs per scalar. A scalar only some runs report is summarized over those runs.
pub fn summarize_runs(task: &str, candidate: &str, runs: &[RunResult]) -> RerunSummary {
    let scalars: Vec<BTreeMap<String, f64>> = runs.iter().map(RunResult::scalars).collect();
    let names: BTreeSet<&String> = scalars.iter().flat_map(|s| s.keys()).collect();
    let metrics = names
        .into_iter()
        .map(|name| {
            let series: Vec<f64> = scalars.iter().filter_map(|s| s.get(name).copied()).collect();
            (name.clone(), summarize_series(&series))
        })
        .collect();
    RerunSummary {
        task: task.to_string(),
        candidate: candidate.to_string(),
        runs: runs.len() as u32,
        metrics,
    }
}
