//! Greedy rank-1 power iteration with deflation
//!
//! Rank `j` of the tree is extracted from the observed entries after the
//! contribution of ranks `0..j` has been projected out. For one node `n` a
//! sweep step computes
//!
//! ```text
//! u_n[i] = Σ_entries value · ∂f(entry)/∂v_n[i]  −  Σ_{j' < j} ∂f_j'/∂v_n · W_n[j']
//! ```
//!
//! where `f(entry)` is the tree function evaluated on the current vector of
//! every node at the entry's coordinates, and `f_j'` the same function
//! evaluated on the inner products `<v_m, W_m[j']>`. Both derivatives are the
//! adjoints of one forward/backward walk with a single lane, so every tree
//! shape shares this implementation.

use scirs2_core::random::{rngs::StdRng, Rng, SeedableRng};
use tenparse_core::{DualTrace, ParameterNode, ParserConfig, TensorMode, Term, TreeLayout};

use crate::entry::TensorEntry;
use crate::error::{DecompError, DecompResult};
use crate::plan::{SweepPlan, SweepStep, Target};

/// Decomposition settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecompConfig {
    pub mode: TensorMode,
    /// Sweep limit per rank (default: 1000)
    pub max_iters: usize,
    /// Convergence threshold on the change of the monitor norm (default: 1e-6)
    pub tolerance: f64,
    /// Seed of the random start vectors
    pub seed: u64,
}

impl DecompConfig {
    pub fn new(mode: TensorMode) -> Self {
        Self {
            mode,
            max_iters: 1000,
            tolerance: 1e-6,
            seed: 0,
        }
    }

    pub fn from_parser_config(config: &ParserConfig) -> Self {
        Self {
            mode: config.tensor_mode,
            max_iters: config.max_decomp_iters,
            tolerance: config.decomp_tolerance,
            seed: config.seed,
        }
    }

    pub fn max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn validate(&self) -> DecompResult<()> {
        if self.max_iters == 0 {
            return Err(DecompError::InvalidConfig("max_iters must be at least 1".to_string()));
        }
        if self.tolerance.is_nan() || self.tolerance <= 0.0 {
            return Err(DecompError::InvalidConfig(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Outcome of one extracted rank
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankReport {
    pub rank: usize,
    /// Sweeps performed
    pub iterations: usize,
    pub converged: bool,
    /// Norm of the monitor node, the magnitude of the component
    pub monitor_norm: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecompReport {
    pub entries: usize,
    pub ranks: Vec<RankReport>,
}

impl DecompReport {
    pub fn all_converged(&self) -> bool {
        self.ranks.iter().all(|r| r.converged)
    }
}

/// Working vectors of one rank, `[node][row][feature]`
type Component = Vec<Vec<Vec<f64>>>;

/// Warm-start every factor row of `tree` from `entries`.
///
/// The tree must be allocated and marked active; every entry coordinate must
/// name an active index. Ranks that do not converge within
/// `config.max_iters` sweeps keep their last iterate and are only logged.
pub fn decompose(tree: &mut ParameterNode, entries: &[TensorEntry], config: &DecompConfig) -> DecompResult<DecompReport> {
    config.validate()?;
    for (index, entry) in entries.iter().enumerate() {
        entry.validate(tree, index)?;
    }

    let layout = tree.layout(1);
    let plan = SweepPlan::new(config.mode, &layout)?;
    let rank = tree.rank();
    let full = layout.with_lanes(rank);
    for step in plan.steps() {
        let rows = tree.preorder()[step.node].rank();
        if rows != full.width(step.node) {
            return Err(DecompError::PlanMismatch(format!(
                "{:?} node has {} factor rows, expected {}",
                step.role,
                rows,
                full.width(step.node)
            )));
        }
    }

    log::info!(
        "decomposing {} entries into {} ranks over {} swept nodes",
        entries.len(),
        rank,
        plan.steps().len()
    );

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut ranks = Vec::with_capacity(rank);
    for j in 0..rank {
        let (component, report) = {
            let mut sweeper = Sweeper::new(tree, &layout, &plan, entries);
            sweeper.extract(j, config, &mut rng)?
        };
        store(tree, &plan, j, &component)?;
        ranks.push(report);
    }
    tree.snapshot_running_totals();

    let report = DecompReport {
        entries: entries.len(),
        ranks,
    };
    if !report.all_converged() {
        log::warn!(
            "{} of {} ranks did not converge",
            report.ranks.iter().filter(|r| !r.converged).count(),
            rank
        );
    }
    Ok(report)
}

fn store(tree: &mut ParameterNode, plan: &SweepPlan, j: usize, component: &Component) -> DecompResult<()> {
    let mut failure = None;
    tree.for_each_mut(&mut |id, node| {
        if failure.is_some() {
            return;
        }
        if let Some(step) = plan.steps().iter().find(|s| s.node == id) {
            for (k, row) in component[id].iter().enumerate() {
                if let Err(e) = node.set_factor_row(j * step.rows + k, row) {
                    failure = Some(e);
                    return;
                }
            }
        }
    });
    failure.map_or(Ok(()), |e| Err(e.into()))
}

fn norm(rows: &[Vec<f64>]) -> f64 {
    rows.iter().flatten().map(|v| v * v).sum::<f64>().sqrt()
}

fn scale_to(row: &mut [f64], target: f64) {
    let n = row.iter().map(|v| v * v).sum::<f64>().sqrt();
    if n > 0.0 {
        let s = target / n;
        row.iter_mut().for_each(|v| *v *= s);
    }
}

fn dot(a: &[f64], b: impl IntoIterator<Item = f64>) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// One rank of the power iteration over a borrowed tree
struct Sweeper<'a> {
    nodes: Vec<&'a ParameterNode>,
    layout: &'a TreeLayout,
    plan: &'a SweepPlan,
    entries: &'a [TensorEntry],
    trace: DualTrace,
    scratch: Vec<Vec<f64>>,
}

impl<'a> Sweeper<'a> {
    fn new(tree: &'a ParameterNode, layout: &'a TreeLayout, plan: &'a SweepPlan, entries: &'a [TensorEntry]) -> Self {
        Self {
            nodes: tree.preorder(),
            trace: DualTrace::new(layout),
            scratch: (0..layout.len()).map(|id| vec![0.0; layout.width(id)]).collect(),
            layout,
            plan,
            entries,
        }
    }

    fn extract(&mut self, j: usize, config: &DecompConfig, rng: &mut StdRng) -> DecompResult<(Component, RankReport)> {
        let mut component = self.random_start(rng);
        let plan = self.plan;
        let monitor = plan.monitor().map(|s| s.node);

        let mut iterations = 0;
        let mut converged = false;
        let mut last: Option<f64> = None;
        let mut monitor_norm = 0.0;
        while iterations < config.max_iters {
            iterations += 1;
            for &step in plan.steps() {
                let fresh = self.update(step, j, &component)?;
                component[step.node] = fresh;
                if let Target::Norm(target) = step.target {
                    component[step.node].iter_mut().for_each(|row| scale_to(row, target));
                }
            }

            monitor_norm = monitor.map_or(0.0, |id| norm(&component[id]));
            if let Some(prev) = last {
                if (monitor_norm - prev).abs() < config.tolerance {
                    converged = true;
                    break;
                }
            }
            last = Some(monitor_norm);
        }

        if !converged {
            log::warn!(
                "power iteration did not converge: rank {} monitor norm {:.6} after {} sweeps",
                j,
                monitor_norm,
                iterations
            );
        }
        if monitor_norm.abs() <= config.tolerance {
            log::warn!("power iteration has a nearly-zero component: rank {}", j);
        }
        log::debug!("rank {}: {} sweeps, monitor norm {:.4}", j, iterations, monitor_norm);

        if let Some((head, modifier)) = plan.balance() {
            let n = norm(&component[modifier]);
            if n > 0.0 {
                let s = (1.0 / n).sqrt();
                component[head].iter_mut().flatten().for_each(|v| *v /= s);
                component[modifier].iter_mut().flatten().for_each(|v| *v *= s);
            }
        }

        Ok((
            component,
            RankReport {
                rank: j,
                iterations,
                converged,
                monitor_norm,
            },
        ))
    }

    /// Uniform `[-0.5, 0.5)` on the active indices, scaled to the step target
    fn random_start(&self, rng: &mut StdRng) -> Component {
        let mut component: Component = vec![Vec::new(); self.layout.len()];
        for step in self.plan.steps() {
            let node = self.nodes[step.node];
            let target = match step.target {
                Target::Norm(t) => t,
                Target::Monitor => 1.0,
            };
            component[step.node] = (0..step.rows)
                .map(|_| {
                    let mut row: Vec<f64> = node
                        .active_mask()
                        .iter()
                        .map(|&on| if on { rng.random_range(-0.5..0.5) } else { 0.0 })
                        .collect();
                    scale_to(&mut row, target);
                    row
                })
                .collect();
        }
        component
    }

    /// Re-estimate the vector of one node with every other node fixed
    fn update(&mut self, step: SweepStep, j: usize, component: &Component) -> DecompResult<Vec<Vec<f64>>> {
        let n = step.node;
        let size = self.nodes[n].feature_size();
        let mut fresh = vec![vec![0.0; size]; step.rows];

        let entries = self.entries;
        for entry in entries {
            let Some(i) = entry.coord(n) else {
                continue;
            };
            self.walk_entry(entry, component)?;
            for (row, &adjoint) in fresh.iter_mut().zip(self.trace.adjoint(n)) {
                row[i] += adjoint;
            }
        }

        for prev in 0..j {
            self.walk_previous(prev, component)?;
            let factors = self.nodes[n].factors();
            for (k, (row, &coef)) in fresh.iter_mut().zip(self.trace.adjoint(n)).enumerate() {
                if coef != 0.0 {
                    for (v, w) in row.iter_mut().zip(factors.row(prev * step.rows + k)) {
                        *v -= coef * w;
                    }
                }
            }
        }
        Ok(fresh)
    }

    /// Forward/backward walk of one entry at the current vectors
    fn walk_entry(&mut self, entry: &TensorEntry, component: &Component) -> DecompResult<()> {
        for id in 0..self.layout.len() {
            let values = &mut self.scratch[id];
            match entry.coord(id) {
                Some(i) => {
                    for (v, row) in values.iter_mut().zip(&component[id]) {
                        *v = row[i];
                    }
                }
                None => values.iter_mut().for_each(|v| *v = 0.0),
            }
        }

        let layout = self.layout;
        let scratch = &self.scratch;
        self.trace.forward(layout, |id| {
            let node = layout.node(id);
            Ok(if node.is_leaf() {
                Term::Leaf(&scratch[id])
            } else if node.has_features() && entry.coord(id).is_some() {
                Term::Sum(&scratch[id])
            } else {
                Term::Children
            })
        })?;
        self.trace.backward(layout, entry.value)?;
        Ok(())
    }

    /// Forward/backward walk of finished rank `prev` against the current vectors
    fn walk_previous(&mut self, prev: usize, component: &Component) -> DecompResult<()> {
        for id in 0..self.layout.len() {
            let node = self.nodes[id];
            let rows = self.layout.node(id).multiplicity;
            for (k, v) in self.scratch[id].iter_mut().enumerate() {
                *v = match component[id].get(k) {
                    Some(current) if node.feature_size() > 0 => {
                        dot(current, node.factors().row(prev * rows + k).iter().copied())
                    }
                    _ => 0.0,
                };
            }
        }

        let layout = self.layout;
        let scratch = &self.scratch;
        self.trace.forward(layout, |id| {
            let node = layout.node(id);
            Ok(if node.is_leaf() {
                Term::Leaf(&scratch[id])
            } else if node.has_features() {
                Term::Sum(&scratch[id])
            } else {
                Term::Children
            })
        })?;
        self.trace.backward(layout, 1.0)?;
        Ok(())
    }
}
