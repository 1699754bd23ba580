use isopatch::adaptive::{AdaptiveDriver, AdaptiveOptions, ExactSolution, LoopContext, PoissonProblem};
use isopatch::dirichlet::DirichletBoundary;
use isopatch::function::FunctionExpr;
use isopatch::geometry::AffineBox;
use isopatch::multipatch::{MultiBasis, MultiPatch};
use isopatch::solve::{SolverMethod, SolverOptions};
use std::f64::consts::PI;
use std::sync::Arc;

/// `-Δu = 2π² sin(πx) sin(πy)` on the unit square with homogeneous Dirichlet data.
pub fn sine_problem(multipatch: MultiPatch) -> PoissonProblem {
    let dirichlet = DirichletBoundary::on_boundary(&multipatch, Arc::new(FunctionExpr::constant(0.0)));
    PoissonProblem {
        multipatch,
        dirichlet,
        source: Arc::new(FunctionExpr::scalar(|x| 2.0 * PI * PI * (PI * x.x).sin() * (PI * x.y).sin())),
        exact: Some(ExactSolution {
            value: Arc::new(FunctionExpr::scalar(|x| (PI * x.x).sin() * (PI * x.y).sin())),
            gradient: Arc::new(FunctionExpr::vector2(|x| {
                nalgebra::Vector2::new(
                    PI * (PI * x.x).cos() * (PI * x.y).sin(),
                    PI * (PI * x.x).sin() * (PI * x.y).cos(),
                )
            })),
        }),
    }
}

#[test]
fn majorant_and_minorant_bound_the_error() {
    let multipatch = MultiPatch::single(Arc::new(AffineBox::unit()));
    let problem = sine_problem(multipatch.clone());

    for (degree, num_interior) in [(1, 3), (2, 1), (2, 3)] {
        let basis = MultiBasis::uniform(&multipatch, degree, num_interior).unwrap();
        let driver = AdaptiveDriver::new(problem.clone(), basis, AdaptiveOptions::default()).unwrap();
        let report = driver.step(0, &mut LoopContext::default()).unwrap();
        let error = report.error.unwrap();

        assert!(error > 0.0);
        assert!(
            report.majorant >= error * (1.0 - 1e-8),
            "majorant {} below error {} (degree {}, {} interior knots)",
            report.majorant,
            error,
            degree,
            num_interior
        );
        assert!(
            report.minorant <= error * (1.0 + 1e-8),
            "minorant {} above error {} (degree {}, {} interior knots)",
            report.minorant,
            error,
            degree,
            num_interior
        );
        assert!(report.minorant > 0.0);

        let majorant_efficiency = report.majorant_efficiency().unwrap();
        let minorant_efficiency = report.minorant_efficiency().unwrap();
        assert!(majorant_efficiency < 10.0, "majorant efficiency {}", majorant_efficiency);
        assert!(minorant_efficiency > 0.5, "minorant efficiency {}", minorant_efficiency);

        assert_eq!(report.indicators.len(), report.num_elements);
        assert!(report.indicators.iter().all(|&x| x >= 0.0));
        let indicator_sum: f64 = report.indicators.iter().sum();
        assert!((indicator_sum - report.majorant.powi(2)).abs() <= 1e-8 * report.majorant.powi(2));
        assert!(report.flux_iterations >= 1 && report.flux_iterations <= driver.options().flux_iterations);
    }
}

#[test]
fn more_flux_iterations_do_not_increase_the_majorant() {
    let multipatch = MultiPatch::single(Arc::new(AffineBox::unit()));
    let problem = sine_problem(multipatch.clone());
    let basis = MultiBasis::uniform(&multipatch, 2, 2).unwrap();

    let majorant_with = |flux_iterations: usize| {
        let options = AdaptiveOptions {
            flux_iterations,
            ratio_dual_eq: f64::INFINITY,
            solver: SolverOptions {
                method: SolverMethod::Direct,
                ..SolverOptions::default()
            },
            ..AdaptiveOptions::default()
        };
        let driver = AdaptiveDriver::new(problem.clone(), basis.clone(), options).unwrap();
        let report = driver.step(0, &mut LoopContext::default()).unwrap();
        assert_eq!(report.flux_iterations, flux_iterations);
        report.majorant
    };

    // β = 1 is optimized away after the first solve, so a second solve cannot do worse
    let one = majorant_with(1);
    let three = majorant_with(3);
    assert!(three <= one * (1.0 + 1e-8), "{} > {}", three, one);
}

#[test]
fn unknown_exact_solution_skips_the_error() {
    let multipatch = MultiPatch::grid(2, 1, 1.0, 1.0).unwrap();
    let mut problem = sine_problem(multipatch.clone());
    problem.exact = None;
    let basis = MultiBasis::uniform(&multipatch, 2, 1).unwrap();
    let driver = AdaptiveDriver::new(problem, basis, AdaptiveOptions::default()).unwrap();
    let report = driver.step(0, &mut LoopContext::default()).unwrap();
    assert_eq!(report.error, None);
    assert_eq!(report.majorant_efficiency(), None);
    assert!(report.majorant.is_finite() && report.majorant > 0.0);
    assert!(report.minorant.is_finite());
}
