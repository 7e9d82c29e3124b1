//! Local optimizers for relaxing a band of images.
//!
//! Four optimizers are available, selected by [`OptimizerKind`]:
//!
//! - **MDMin**: velocity-projected molecular dynamics that quenches the
//!   velocity whenever it points against the force
//! - **FIRE**: Fast Inertial Relaxation Engine
//! - **BFGS**: quasi-Newton with an explicit Hessian (initially `70 I`)
//! - **LBFGS**: limited-memory BFGS with a two-loop recursion
//!
//! All of them work on anything implementing [`Optimizable`] and share the
//! same driver, [`run`], which stops when the largest per-atom force drops
//! below `fmax` or after `steps` steps, whichever comes first.

use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

/// Upper bound on how far any single atom may move in one step (Angstrom).
pub const DEFAULT_MAX_STEP: f64 = 0.2;

/// A system whose flat coordinate vector can be optimized.
pub trait Optimizable {
    /// Current coordinates.
    fn positions(&self) -> DVector<f64>;
    /// Replace the coordinates.
    fn set_positions(&mut self, x: &DVector<f64>);
    /// Forces (negative gradient) at the current coordinates.
    fn forces(&mut self) -> DVector<f64>;
}

/// One optimization algorithm.
pub trait Optimizer {
    /// Display name used in logs.
    fn name(&self) -> &'static str;
    /// Take one step given the forces at the current positions.
    fn step(&mut self, target: &mut dyn Optimizable, forces: &DVector<f64>);
}

/// The optimizers that can drive IDPP refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OptimizerKind {
    /// Velocity-quenched MD
    #[default]
    MdMin,
    /// Quasi-Newton with full Hessian
    Bfgs,
    /// Limited-memory BFGS
    Lbfgs,
    /// Fast Inertial Relaxation Engine
    Fire,
}

impl OptimizerKind {
    /// Instantiate the optimizer with its standard parameters.
    pub fn build(self) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::MdMin => Box::new(MdMin::default()),
            OptimizerKind::Bfgs => Box::new(Bfgs::default()),
            OptimizerKind::Lbfgs => Box::new(Lbfgs::default()),
            OptimizerKind::Fire => Box::new(Fire::default()),
        }
    }
}

impl FromStr for OptimizerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mdmin" => Ok(OptimizerKind::MdMin),
            "bfgs" => Ok(OptimizerKind::Bfgs),
            "lbfgs" => Ok(OptimizerKind::Lbfgs),
            "fire" => Ok(OptimizerKind::Fire),
            other => Err(format!(
                "unknown optimizer '{}' (expected MDMin, BFGS, LBFGS or FIRE)",
                other
            )),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptimizerKind::MdMin => "MDMin",
            OptimizerKind::Bfgs => "BFGS",
            OptimizerKind::Lbfgs => "LBFGS",
            OptimizerKind::Fire => "FIRE",
        };
        write!(f, "{}", name)
    }
}

/// Largest per-atom force norm of a flat force vector.
pub fn max_atom_force(forces: &DVector<f64>) -> f64 {
    forces
        .as_slice()
        .chunks(3)
        .map(|f| f.iter().map(|x| x * x).sum::<f64>().sqrt())
        .fold(0.0, f64::max)
}

/// Scale a step so that no atom moves further than `max_step`.
fn limit_per_atom(mut dr: DVector<f64>, max_step: f64) -> DVector<f64> {
    let longest = max_atom_force(&dr);
    if longest > max_step {
        dr *= max_step / longest;
    }
    dr
}

/// Outcome of an optimization run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizationReport {
    /// Number of steps taken
    pub steps: usize,
    /// Whether the force criterion was met
    pub converged: bool,
    /// Largest per-atom force at the final positions
    pub max_force: f64,
}

/// Runs `optimizer` on `target` until the largest per-atom force is below
/// `fmax` or `steps` steps have been taken.
///
/// Forces are checked before every step, so an already converged system
/// takes zero steps.
pub fn run(
    optimizer: &mut dyn Optimizer,
    target: &mut dyn Optimizable,
    fmax: f64,
    steps: usize,
) -> OptimizationReport {
    let mut forces = target.forces();
    let mut fnow = max_atom_force(&forces);
    let mut taken = 0;
    debug!("{}: step {:4} fmax {:.6}", optimizer.name(), taken, fnow);

    while fnow >= fmax && taken < steps {
        optimizer.step(target, &forces);
        taken += 1;
        forces = target.forces();
        fnow = max_atom_force(&forces);
        debug!("{}: step {:4} fmax {:.6}", optimizer.name(), taken, fnow);
    }

    let converged = fnow < fmax;
    info!(
        "{} {} after {} step(s), max force {:.6}",
        optimizer.name(),
        if converged { "converged" } else { "stopped" },
        taken,
        fnow
    );
    OptimizationReport {
        steps: taken,
        converged,
        max_force: fnow,
    }
}

/// Velocity-quenched molecular dynamics.
#[derive(Debug, Clone)]
pub struct MdMin {
    /// Time step
    pub dt: f64,
    /// Per-atom step limit
    pub max_step: f64,
    velocity: Option<DVector<f64>>,
}

impl Default for MdMin {
    fn default() -> Self {
        Self {
            dt: 0.2,
            max_step: DEFAULT_MAX_STEP,
            velocity: None,
        }
    }
}

impl Optimizer for MdMin {
    fn name(&self) -> &'static str {
        "MDMin"
    }

    fn step(&mut self, target: &mut dyn Optimizable, forces: &DVector<f64>) {
        let mut v = match self.velocity.take() {
            None => DVector::zeros(forces.len()),
            Some(mut v) => {
                v += forces * (0.5 * self.dt);
                let vf = v.dot(forces);
                let ff = forces.dot(forces);
                if vf < 0.0 || ff == 0.0 {
                    v.fill(0.0);
                } else {
                    v = forces * (vf / ff);
                }
                v
            }
        };
        v += forces * (0.5 * self.dt);

        let dr = limit_per_atom(&v * self.dt, self.max_step);
        let x = target.positions() + dr;
        target.set_positions(&x);
        self.velocity = Some(v);
    }
}

/// Fast Inertial Relaxation Engine.
#[derive(Debug, Clone)]
pub struct Fire {
    dt: f64,
    max_step: f64,
    dt_max: f64,
    n_min: usize,
    f_inc: f64,
    f_dec: f64,
    a_start: f64,
    f_a: f64,
    a: f64,
    n_steps: usize,
    velocity: Option<DVector<f64>>,
}

impl Default for Fire {
    fn default() -> Self {
        Self {
            dt: 0.1,
            max_step: DEFAULT_MAX_STEP,
            dt_max: 1.0,
            n_min: 5,
            f_inc: 1.1,
            f_dec: 0.5,
            a_start: 0.1,
            f_a: 0.99,
            a: 0.1,
            n_steps: 0,
            velocity: None,
        }
    }
}

impl Optimizer for Fire {
    fn name(&self) -> &'static str {
        "FIRE"
    }

    fn step(&mut self, target: &mut dyn Optimizable, forces: &DVector<f64>) {
        let mut v = match self.velocity.take() {
            None => DVector::zeros(forces.len()),
            Some(mut v) => {
                let vf = v.dot(forces);
                if vf > 0.0 {
                    let fnorm = forces.norm();
                    if fnorm > 0.0 {
                        v = &v * (1.0 - self.a) + forces * (self.a * v.norm() / fnorm);
                    }
                    if self.n_steps > self.n_min {
                        self.dt = (self.dt * self.f_inc).min(self.dt_max);
                        self.a *= self.f_a;
                    }
                    self.n_steps += 1;
                } else {
                    v.fill(0.0);
                    self.a = self.a_start;
                    self.dt *= self.f_dec;
                    self.n_steps = 0;
                }
                v
            }
        };
        v += forces * self.dt;

        let mut dr = &v * self.dt;
        let norm = dr.norm();
        if norm > self.max_step {
            dr *= self.max_step / norm;
        }
        let x = target.positions() + dr;
        target.set_positions(&x);
        self.velocity = Some(v);
    }
}

/// BFGS with an explicit Hessian.
///
/// Steps are taken along the eigenvectors of the Hessian using absolute
/// eigenvalues, so negative curvature never turns a step uphill.
#[derive(Debug, Clone)]
pub struct Bfgs {
    /// Initial Hessian is `alpha * I`
    pub alpha: f64,
    /// Per-atom step limit
    pub max_step: f64,
    hessian: Option<DMatrix<f64>>,
    previous: Option<(DVector<f64>, DVector<f64>)>,
}

impl Default for Bfgs {
    fn default() -> Self {
        Self {
            alpha: 70.0,
            max_step: DEFAULT_MAX_STEP,
            hessian: None,
            previous: None,
        }
    }
}

impl Bfgs {
    fn update(&mut self, x: &DVector<f64>, forces: &DVector<f64>) {
        if self.hessian.is_none() {
            self.hessian = Some(DMatrix::identity(x.len(), x.len()) * self.alpha);
            return;
        }
        let (x0, f0) = match self.previous.as_ref() {
            Some(prev) => prev,
            None => return,
        };

        let dr = x - x0;
        if dr.amax() < 1e-7 {
            return;
        }
        let df = forces - f0;
        let a = dr.dot(&df);
        if let Some(hessian) = self.hessian.as_mut() {
            let dg = &*hessian * &dr;
            let b = dr.dot(&dg);
            if a.abs() < 1e-300 || b.abs() < 1e-300 {
                return;
            }
            *hessian -= (&df * df.transpose()) / a + (&dg * dg.transpose()) / b;
        }
    }
}

impl Optimizer for Bfgs {
    fn name(&self) -> &'static str {
        "BFGS"
    }

    fn step(&mut self, target: &mut dyn Optimizable, forces: &DVector<f64>) {
        let x = target.positions();
        self.update(&x, forces);

        let hessian = self
            .hessian
            .clone()
            .unwrap_or_else(|| DMatrix::identity(x.len(), x.len()) * self.alpha);
        let eigen = hessian.symmetric_eigen();
        let projected = eigen.eigenvectors.transpose() * forces;
        let scaled = DVector::from_iterator(
            projected.len(),
            projected
                .iter()
                .zip(eigen.eigenvalues.iter())
                .map(|(p, w)| if w.abs() > 1e-12 { p / w.abs() } else { 0.0 }),
        );
        let dr = limit_per_atom(&eigen.eigenvectors * scaled, self.max_step);

        target.set_positions(&(&x + dr));
        self.previous = Some((x, forces.clone()));
    }
}

/// Limited-memory BFGS.
#[derive(Debug, Clone)]
pub struct Lbfgs {
    /// Number of correction pairs kept
    pub memory: usize,
    /// Initial inverse Hessian is `1 / alpha`
    pub alpha: f64,
    /// Per-atom step limit
    pub max_step: f64,
    /// Step damping factor
    pub damping: f64,
    s_history: VecDeque<DVector<f64>>,
    y_history: VecDeque<DVector<f64>>,
    rho_history: VecDeque<f64>,
    previous: Option<(DVector<f64>, DVector<f64>)>,
}

impl Default for Lbfgs {
    fn default() -> Self {
        Self {
            memory: 100,
            alpha: 70.0,
            max_step: DEFAULT_MAX_STEP,
            damping: 1.0,
            s_history: VecDeque::new(),
            y_history: VecDeque::new(),
            rho_history: VecDeque::new(),
            previous: None,
        }
    }
}

impl Lbfgs {
    fn add_to_history(&mut self, s: DVector<f64>, y: DVector<f64>) {
        let sy = y.dot(&s);
        if sy.abs() < 1e-300 {
            return;
        }
        if self.s_history.len() >= self.memory {
            self.s_history.pop_front();
            self.y_history.pop_front();
            self.rho_history.pop_front();
        }
        self.s_history.push_back(s);
        self.y_history.push_back(y);
        self.rho_history.push_back(1.0 / sy);
    }
}

impl Optimizer for Lbfgs {
    fn name(&self) -> &'static str {
        "LBFGS"
    }

    fn step(&mut self, target: &mut dyn Optimizable, forces: &DVector<f64>) {
        let x = target.positions();
        if let Some((x0, f0)) = self.previous.take() {
            // y is the gradient difference, i.e. minus the force difference
            self.add_to_history(&x - x0, f0 - forces);
        }

        let m = self.s_history.len();
        let mut q = -forces;
        let mut a = vec![0.0; m];
        for i in (0..m).rev() {
            a[i] = self.rho_history[i] * self.s_history[i].dot(&q);
            q -= &self.y_history[i] * a[i];
        }
        let mut z = q / self.alpha;
        for i in 0..m {
            let b = self.rho_history[i] * self.y_history[i].dot(&z);
            z += &self.s_history[i] * (a[i] - b);
        }

        let dr = limit_per_atom(-z, self.max_step) * self.damping;
        target.set_positions(&(&x + dr));
        self.previous = Some((x, forces.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Anisotropic harmonic well centred at `center`.
    struct Well {
        x: DVector<f64>,
        center: DVector<f64>,
        stiffness: DVector<f64>,
        evaluations: usize,
    }

    impl Well {
        fn new() -> Self {
            Self {
                x: DVector::from_vec(vec![0.8, -0.5, 0.3, 0.1, 0.4, -0.6]),
                center: DVector::zeros(6),
                stiffness: DVector::from_vec(vec![1.0, 2.0, 3.0, 1.5, 2.5, 0.5]),
                evaluations: 0,
            }
        }

        fn energy(&self) -> f64 {
            let d = &self.x - &self.center;
            0.5 * d.component_mul(&d).dot(&self.stiffness)
        }
    }

    impl Optimizable for Well {
        fn positions(&self) -> DVector<f64> {
            self.x.clone()
        }

        fn set_positions(&mut self, x: &DVector<f64>) {
            self.x = x.clone();
        }

        fn forces(&mut self) -> DVector<f64> {
            self.evaluations += 1;
            -(&self.x - &self.center).component_mul(&self.stiffness)
        }
    }

    #[test]
    fn test_every_optimizer_converges_on_a_well() {
        for kind in [
            OptimizerKind::MdMin,
            OptimizerKind::Fire,
            OptimizerKind::Bfgs,
            OptimizerKind::Lbfgs,
        ] {
            let mut well = Well::new();
            let start = well.energy();
            let mut optimizer = kind.build();
            let report = run(optimizer.as_mut(), &mut well, 1e-3, 2000);

            assert!(report.converged, "{} did not converge: {:?}", kind, report);
            assert!(report.max_force < 1e-3);
            assert!(well.energy() < start, "{} did not lower the energy", kind);
        }
    }

    #[test]
    fn test_step_cap_is_respected() {
        let mut well = Well::new();
        let mut optimizer = OptimizerKind::MdMin.build();
        let report = run(optimizer.as_mut(), &mut well, 1e-12, 3);

        assert_eq!(report.steps, 3);
        assert!(!report.converged);
        // One evaluation before the first step and one after each step
        assert_eq!(well.evaluations, 4);
    }

    #[test]
    fn test_converged_start_takes_no_steps() {
        let mut well = Well::new();
        well.x = well.center.clone();
        let mut optimizer = OptimizerKind::Bfgs.build();
        let report = run(optimizer.as_mut(), &mut well, 0.1, 100);
        assert_eq!(report.steps, 0);
        assert!(report.converged);
    }

    #[test]
    fn test_zero_steps_never_moves() {
        let mut well = Well::new();
        let before = well.x.clone();
        let mut optimizer = OptimizerKind::Fire.build();
        let report = run(optimizer.as_mut(), &mut well, 1e-6, 0);
        assert_eq!(report.steps, 0);
        assert_eq!(well.x, before);
    }

    #[test]
    fn test_max_atom_force() {
        let f = DVector::from_vec(vec![3.0, 4.0, 0.0, 1.0, 0.0, 0.0]);
        assert!((max_atom_force(&f) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_step_is_limited_per_atom() {
        let dr = limit_per_atom(DVector::from_vec(vec![3.0, 4.0, 0.0, 0.1, 0.0, 0.0]), 0.5);
        assert!((max_atom_force(&dr) - 0.5).abs() < 1e-12);
        assert!((dr[3] - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_optimizer_kind_parsing() {
        assert_eq!("MDMin".parse::<OptimizerKind>(), Ok(OptimizerKind::MdMin));
        assert_eq!("lbfgs".parse::<OptimizerKind>(), Ok(OptimizerKind::Lbfgs));
        assert!("CG".parse::<OptimizerKind>().is_err());
        assert_eq!(OptimizerKind::Fire.to_string(), "FIRE");
    }
}
