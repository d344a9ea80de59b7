//! [`TransitionTracer`]: the top-level façade (`spec.md` §4.8/§6).
//!
//! Orchestrates phase tracing, bounce-action scanning and gravitational-wave
//! prediction for one parameter point, and summarizes the result as a
//! single value object plus a human-readable transition-history string.

use crate::bounce_solution::{solve_bounce_solution, BounceSolution, BounceSolutionConfig};
use crate::error::Error;
use crate::gravitational_wave::{GravitationalWave, GravitationalWaveConfig};
use crate::potential::{smallest_eigenvalue, FieldVec, Potential};
use crate::vacuum::{build_vacuum, MultistepMode, StatusCoexPair, StatusCrit, StatusTracing, Vacuum};
use log::{debug, warn};

/// Which of the four derived temperatures gates gravitational-wave
/// prediction and is reported as "the" transition temperature.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WhichTransitionTemp {
    /// `T_n` approximated by `S/T = 140`.
    ApproxNucleation,
    /// `T_n` from `Γ/H⁴ = 1`.
    Nucleation,
    /// `T_p` from `P_f = perc_prbl`.
    Percolation,
    /// `T_f` from `P_f = compl_prbl`.
    Completion,
}

/// Electroweak-symmetry-restoration policy at high `T`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CheckEwsr {
    /// Do not check; never filter.
    Off,
    /// Check; filter the point out if symmetry is not restored at `T_high`.
    On,
    /// Check and record the status, but never filter (useful for
    /// diagnosing boundedness-from-below separately from EWSR).
    KeepBfb,
    /// Check and filter, same as [`CheckEwsr::On`], kept as a distinct
    /// name for callers selecting "keep only EWSR-restoring points".
    KeepEwsr,
}

/// Outcome of the (optional) NLO-stability check.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize)]
pub enum StatusNLOStability {
    /// `check_nlo` was false; not evaluated.
    NotChecked,
    /// The global minimum at `T=0` is a genuine minimum (no large negative
    /// Hessian eigenvalue).
    Stable,
    /// The Hessian at the `T=0` global minimum has a significant negative
    /// eigenvalue.
    Unstable,
}

/// Outcome of the (optional) electroweak-symmetry-restoration check.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize)]
pub enum StatusEWSR {
    /// `check_ewsr` was [`CheckEwsr::Off`]; not evaluated.
    NotChecked,
    /// The global minimum at `T_high` sits at the origin within tolerance.
    Restored,
    /// The global minimum at `T_high` does not sit at the origin: symmetry
    /// is not restored at the top of the scanned range.
    NotRestored,
}

/// All tuning knobs for one [`run_transition_tracer`] call (`spec.md` §6).
#[derive(Clone, Debug)]
pub struct TracerConfig {
    /// Phase-tracing/vacuum-structure knobs.
    pub vacuum: crate::vacuum::VacuumConfig,
    /// Bounce-action-scan knobs; `v_w`/`eps_turb`/`number_of_initial_scan_temperatures`
    /// documented on [`BounceSolutionConfig`] directly.
    pub bounce_solution: BounceSolutionConfig,
    /// Gravitational-wave knobs.
    pub gravitational_wave: GravitationalWaveConfig,
    /// How new phases are seeded over `[T_low, T_high]`.
    pub multistep_mode: MultistepMode,
    /// Electroweak-symmetry-restoration policy.
    pub check_ewsr: CheckEwsr,
    /// Whether to run the (optional) NLO-stability check.
    pub check_nlo: bool,
    /// Whether to build [`GravitationalWave`] predictions at all.
    pub gw_calculation: bool,
    /// Which derived temperature gates GW prediction and is reported as
    /// "the" transition temperature for a pair.
    pub which_transition_temp: WhichTransitionTemp,
    /// Tolerance (in field units) for the EWSR origin check.
    pub ewsr_origin_tol: f64,
    /// Magnitude below which a negative Hessian eigenvalue is tolerated by
    /// the NLO-stability check.
    pub nlo_eigenvalue_tol: f64,
    /// Whether a deformation-only convergence (no re-entry to the 1-D
    /// shooter) is accepted at each sampled temperature. Threaded into
    /// [`BounceSolutionConfig::bounce`] before each scan.
    pub allow_deformation_only_convergence: bool,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            vacuum: crate::vacuum::VacuumConfig::default(),
            bounce_solution: BounceSolutionConfig::default(),
            gravitational_wave: GravitationalWaveConfig::default(),
            multistep_mode: MultistepMode::Coverage,
            check_ewsr: CheckEwsr::Off,
            check_nlo: false,
            gw_calculation: true,
            which_transition_temp: WhichTransitionTemp::Percolation,
            ewsr_origin_tol: 1e-2,
            nlo_eigenvalue_tol: -1e-6,
            allow_deformation_only_convergence: false,
        }
    }
}

/// Field-space VEVs of a [`crate::vacuum::CoexPhases`] pair's true/false
/// phases at one derived temperature.
#[derive(Clone, Debug, serde::Serialize)]
pub struct PairVevs {
    /// True-phase VEV, if the phase is defined there.
    pub true_vev: Option<FieldVec>,
    /// False-phase VEV, if the phase is defined there.
    pub false_vev: Option<FieldVec>,
}

fn vevs_at(false_phase: &crate::phase::Phase, true_phase: &crate::phase::Phase, t: Option<f64>) -> PairVevs {
    match t {
        Some(t) => PairVevs {
            true_vev: true_phase.point_at(t),
            false_vev: false_phase.point_at(t),
        },
        None => PairVevs { true_vev: None, false_vev: None },
    }
}

/// Everything derived from one [`crate::vacuum::CoexPhases`] pair.
#[derive(Clone, Debug)]
pub struct PairResult {
    /// Index into [`Vacuum::coex_phases`].
    pub coex_id: usize,
    /// Critical temperature, VEVs at `T_c`.
    pub t_c: Option<f64>,
    /// Outcome of the critical-temperature bisection.
    pub crit_status: StatusCrit,
    /// VEVs of both phases at `T_c`.
    pub vevs_at_tc: PairVevs,
    /// The bounce-action scan and its derived temperatures, if `T_c` was
    /// found.
    pub bounce_solution: Option<BounceSolution>,
    /// VEVs at `T_n` (approx).
    pub vevs_at_t_n_approx: PairVevs,
    /// VEVs at `T_n` (exact).
    pub vevs_at_t_n: PairVevs,
    /// VEVs at `T_p`.
    pub vevs_at_t_p: PairVevs,
    /// VEVs at `T_f`.
    pub vevs_at_t_f: PairVevs,
    /// The temperature selected by `which_transition_temp`, if it
    /// succeeded.
    pub transition_temp_used: Option<f64>,
    /// Gravitational-wave prediction at `transition_temp_used`, if
    /// `gw_calculation` was requested and succeeded.
    pub gravitational_wave: Option<GravitationalWave>,
}

/// One entry of the output column legend.
#[derive(Clone, Debug, serde::Serialize)]
pub struct ColumnLegendEntry {
    /// Column name, as it would appear in a downstream serialization.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
}

fn column_legend() -> Vec<ColumnLegendEntry> {
    vec![
        ColumnLegendEntry { name: "t_c", description: "critical temperature of the coexisting-phase pair" },
        ColumnLegendEntry { name: "t_n_approx", description: "nucleation temperature approximated by S/T = 140" },
        ColumnLegendEntry { name: "t_n", description: "nucleation temperature from Gamma/H^4 = 1" },
        ColumnLegendEntry { name: "t_p", description: "percolation temperature from P_f = perc_prbl" },
        ColumnLegendEntry { name: "t_f", description: "completion temperature from P_f = compl_prbl" },
        ColumnLegendEntry { name: "alpha_pt", description: "phase-transition strength at the fixed-point temperature" },
        ColumnLegendEntry { name: "beta_over_h", description: "inverse time scale at t_p" },
        ColumnLegendEntry { name: "v_w_used", description: "bubble-wall velocity actually used" },
        ColumnLegendEntry { name: "eps_turb_used", description: "turbulence efficiency actually used" },
        ColumnLegendEntry { name: "f_peak_sound_wave", description: "peak frequency, sound-wave GW component" },
        ColumnLegendEntry { name: "h2omega_peak_sound_wave", description: "peak amplitude, sound-wave GW component" },
        ColumnLegendEntry { name: "f_peak_turbulence", description: "peak frequency, turbulence GW component" },
        ColumnLegendEntry { name: "h2omega_peak_turbulence", description: "peak amplitude, turbulence GW component" },
    ]
}

/// The full result of one [`run_transition_tracer`] call.
#[derive(Clone, Debug)]
pub struct TransitionTracerResult {
    /// Outcome of the (optional) NLO-stability check.
    pub status_nlo_stability: StatusNLOStability,
    /// Outcome of the (optional) EWSR check.
    pub status_ewsr: StatusEWSR,
    /// Whether the point was filtered out by the EWSR check before any
    /// tracing happened.
    pub filtered_by_ewsr: bool,
    /// The traced vacuum structure, if tracing was attempted.
    pub vacuum: Option<Vacuum>,
    /// Per-coexisting-phase-pair results.
    pub pairs: Vec<PairResult>,
    /// The transition-history graph walk, e.g. `"p0-(2)->p1-(0)->p3"`.
    pub transition_history: String,
    /// Column-name legend for downstream serialization.
    pub column_legend: Vec<ColumnLegendEntry>,
}

fn check_nlo_stability(potential: &dyn Potential, cfg: &TracerConfig) -> StatusNLOStability {
    if !cfg.check_nlo {
        return StatusNLOStability::NotChecked;
    }
    let Ok(phi0) = potential.global_min(0.0) else {
        return StatusNLOStability::Unstable;
    };
    let hess = potential.hess_v(&phi0, 0.0);
    if smallest_eigenvalue(&hess) < cfg.nlo_eigenvalue_tol {
        StatusNLOStability::Unstable
    } else {
        StatusNLOStability::Stable
    }
}

fn check_ewsr(potential: &dyn Potential, t_high: f64, cfg: &TracerConfig) -> (StatusEWSR, bool) {
    if cfg.check_ewsr == CheckEwsr::Off {
        return (StatusEWSR::NotChecked, false);
    }
    let Ok(phi_high) = potential.global_min(t_high) else {
        return (StatusEWSR::NotRestored, matches!(cfg.check_ewsr, CheckEwsr::On | CheckEwsr::KeepEwsr));
    };
    let restored = phi_high.iter().map(|x| x.abs()).fold(0.0, f64::max) < cfg.ewsr_origin_tol;
    let status = if restored { StatusEWSR::Restored } else { StatusEWSR::NotRestored };
    let filter = !restored && matches!(cfg.check_ewsr, CheckEwsr::On | CheckEwsr::KeepEwsr);
    (status, filter)
}

fn select_transition_temp(sol: &BounceSolution, which: WhichTransitionTemp) -> Option<f64> {
    match which {
        WhichTransitionTemp::ApproxNucleation => sol.t_n_approx,
        WhichTransitionTemp::Nucleation => sol.t_n,
        WhichTransitionTemp::Percolation => sol.t_p,
        WhichTransitionTemp::Completion => sol.t_f,
    }
}

fn solve_one_pair(potential: &dyn Potential, vacuum: &Vacuum, coex_id: usize, cfg: &TracerConfig) -> PairResult {
    let pair = &vacuum.coex_phases[coex_id];
    let false_phase = &vacuum.phases[pair.phase_false];
    let true_phase = &vacuum.phases[pair.phase_true];
    let vevs_at_tc = vevs_at(false_phase, true_phase, pair.t_c);

    let Some(t_c) = pair.t_c else {
        return PairResult {
            coex_id,
            t_c: None,
            crit_status: pair.crit_status,
            vevs_at_tc,
            bounce_solution: None,
            vevs_at_t_n_approx: PairVevs { true_vev: None, false_vev: None },
            vevs_at_t_n: PairVevs { true_vev: None, false_vev: None },
            vevs_at_t_p: PairVevs { true_vev: None, false_vev: None },
            vevs_at_t_f: PairVevs { true_vev: None, false_vev: None },
            transition_temp_used: None,
            gravitational_wave: None,
        };
    };

    let mut bsol_cfg = cfg.bounce_solution.clone();
    bsol_cfg.bounce.allow_deformation_only_convergence = cfg.allow_deformation_only_convergence;
    let sol = solve_bounce_solution(potential, false_phase, true_phase, pair.t_low, t_c, &bsol_cfg);

    let vevs_at_t_n_approx = vevs_at(false_phase, true_phase, sol.t_n_approx);
    let vevs_at_t_n = vevs_at(false_phase, true_phase, sol.t_n);
    let vevs_at_t_p = vevs_at(false_phase, true_phase, sol.t_p);
    let vevs_at_t_f = vevs_at(false_phase, true_phase, sol.t_f);

    let transition_temp_used = select_transition_temp(&sol, cfg.which_transition_temp);

    let gravitational_wave = if cfg.gw_calculation {
        match (transition_temp_used, sol.alpha_pt, sol.beta_over_h) {
            (Some(t_star), Some(alpha), Some(beta)) => {
                Some(GravitationalWave::new(t_star, alpha, beta, sol.v_w_used, &cfg.gravitational_wave))
            }
            _ => {
                debug!("coex pair {coex_id}: GW requested but transition temperature/alpha_PT/beta_over_h unavailable");
                None
            }
        }
    } else {
        None
    };

    PairResult {
        coex_id,
        t_c: Some(t_c),
        crit_status: pair.crit_status,
        vevs_at_tc,
        bounce_solution: Some(sol),
        vevs_at_t_n_approx,
        vevs_at_t_n,
        vevs_at_t_p,
        vevs_at_t_f,
        transition_temp_used,
        gravitational_wave,
    }
}

/// Walks from the phase touching `T_high` down to the deepest reachable
/// phase at `T_low`, at each step preferring the coexisting pair with the
/// largest completion temperature (`spec.md` §4.8 step 4).
fn transition_history(vacuum: &Vacuum, pairs: &[PairResult]) -> String {
    let Some(start) = vacuum.phases.iter().max_by(|a, b| a.t_high.partial_cmp(&b.t_high).unwrap()).map(|p| p.id) else {
        return String::new();
    };

    let mut history = format!("p{start}");
    let mut current = start;
    let mut visited = vec![current];

    loop {
        let next = vacuum
            .coex_phases
            .iter()
            .enumerate()
            .filter(|(_, pair)| pair.phase_false == current && !visited.contains(&pair.phase_true))
            .filter_map(|(idx, pair)| {
                pairs
                    .iter()
                    .find(|r| r.coex_id == idx)
                    .and_then(|r| r.bounce_solution.as_ref())
                    .and_then(|s| s.t_f)
                    .map(|t_f| (idx, pair.phase_true, t_f))
            })
            .max_by(|a, b| a.2.partial_cmp(&b.2).unwrap());

        let Some((pair_id, next_phase, _)) = next else {
            break;
        };
        history.push_str(&format!("-({pair_id})->p{next_phase}"));
        visited.push(next_phase);
        current = next_phase;
    }

    history
}

/// Runs the full façade pipeline for one parameter point (`spec.md` §4.8).
///
/// `t_low`/`t_high` are a developer-error domain: a negative temperature is
/// not a scan that merely finds nothing, it is a caller bug, so it is
/// rejected with [`Error::NegativeTemperature`] rather than folded into one
/// of the `Status*` fields (`spec.md` §7).
pub fn run_transition_tracer(potential: &dyn Potential, t_low: f64, t_high: f64, cfg: &TracerConfig) -> Result<TransitionTracerResult, Error> {
    if t_low < 0.0 {
        return Err(Error::NegativeTemperature(t_low));
    }
    if t_high < 0.0 {
        return Err(Error::NegativeTemperature(t_high));
    }

    let status_nlo_stability = check_nlo_stability(potential, cfg);
    let (status_ewsr, filtered_by_ewsr) = check_ewsr(potential, t_high, cfg);

    if filtered_by_ewsr {
        warn!("point filtered out: electroweak symmetry not restored at T_high={t_high}");
        return Ok(TransitionTracerResult {
            status_nlo_stability,
            status_ewsr,
            filtered_by_ewsr,
            vacuum: None,
            pairs: Vec::new(),
            transition_history: String::new(),
            column_legend: column_legend(),
        });
    }

    let vacuum = build_vacuum(potential, t_low, t_high, cfg.multistep_mode, &cfg.vacuum);

    if !matches!(vacuum.status_tracing, StatusTracing::Success) || matches!(vacuum.status_coex, StatusCoexPair::NoCoexPairs) {
        debug!("transition tracer: tracing={:?} coex={:?}", vacuum.status_tracing, vacuum.status_coex);
    }

    let pairs: Vec<PairResult> = (0..vacuum.coex_phases.len()).map(|id| solve_one_pair(potential, &vacuum, id, cfg)).collect();

    let transition_history = transition_history(&vacuum, &pairs);

    Ok(TransitionTracerResult {
        status_nlo_stability,
        status_ewsr,
        filtered_by_ewsr,
        vacuum: Some(vacuum),
        pairs,
        transition_history,
        column_legend: column_legend(),
    })
}
