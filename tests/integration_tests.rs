use rand::Rng;
use rand_pcg::Pcg64;
use std::collections::BTreeMap;
use symbios_elites::{
    Boundaries, Constraint, Direction, EliteArchive, EliteError, FeatureDimension, Placement,
    Problem, ProblemRegistry, Result, RunConfig, SelectionPolicy,
    algorithms::map_elites::MapElites,
    archive::Candidate,
    config::{CrossoverConfig, MutationConfig, ProblemConfig},
};

// --- Mock Infrastructure ---

/// One gene on [0, 3); performance is 20x, a single behavior axis bins x.
struct LineProblem;

impl Problem for LineProblem {
    fn evaluate(&self, g: &[f64]) -> Result<f64> {
        Ok(20.0 * g[0])
    }
    fn map_to_features(&self, g: &[f64]) -> Result<Vec<usize>> {
        Ok(vec![self.feature_dimensions()[0].locate(g[0])?])
    }
    fn generate_random_solution(&self, rng: &mut Pcg64) -> Vec<f64> {
        vec![rng.random_range(0.0..3.0)]
    }
    fn feature_dimensions(&self) -> Vec<FeatureDimension> {
        vec![FeatureDimension::behavior(
            "x",
            Boundaries::new(vec![0.0, 1.0, 2.0, 3.0]).unwrap(),
        )]
    }
    fn domain(&self) -> Vec<(f64, f64)> {
        vec![(0.0, 2.999)]
    }
}

/// Sphere on [-5, 5]^2 subject to x0 >= 1 and x1 >= 0.5.
struct ConstrainedSphere {
    dims: Vec<FeatureDimension>,
}

impl ConstrainedSphere {
    fn from_config(config: &ProblemConfig) -> Result<Box<dyn Problem>> {
        let dims = FeatureDimension::positional(vec![
            FeatureDimension::behavior("x0", config.bins("bin_x")?.clone()),
            FeatureDimension::constraint("g1", config.bins("bin_g")?.clone()),
            FeatureDimension::constraint("g2", config.bins("bin_g")?.clone()),
        ]);
        Ok(Box::new(ConstrainedSphere { dims }))
    }
}

impl Problem for ConstrainedSphere {
    fn evaluate(&self, g: &[f64]) -> Result<f64> {
        Ok(g.iter().map(|x| x * x).sum())
    }
    fn map_to_features(&self, g: &[f64]) -> Result<Vec<usize>> {
        let violations = self.constraint_violations(g);
        let mut coords = vec![self.dims[0].locate(g[0])?];
        for (dim, (_, v)) in self.dims[1..].iter().zip(violations) {
            coords.push(dim.locate(v)?);
        }
        Ok(coords)
    }
    fn generate_random_solution(&self, rng: &mut Pcg64) -> Vec<f64> {
        (0..2).map(|_| rng.random_range(-5.0..5.0)).collect()
    }
    fn feature_dimensions(&self) -> Vec<FeatureDimension> {
        self.dims.clone()
    }
    fn domain(&self) -> Vec<(f64, f64)> {
        vec![(-5.0, 5.0); 2]
    }
    fn constraints(&self) -> BTreeMap<String, Constraint> {
        let mut c = BTreeMap::new();
        c.insert("g1".to_string(), Constraint::inequality(|g| 1.0 - g[0]));
        c.insert("g2".to_string(), Constraint::inequality(|g| 0.5 - g[1]));
        c
    }
    fn name(&self) -> &str {
        "constrained_sphere"
    }
}

fn sphere_config(seed: u64, iterations: usize, crossover: bool) -> RunConfig {
    let mut bins = BTreeMap::new();
    bins.insert("bin_x".to_string(), "inf,-2.5,0,2.5,inf".parse().unwrap());
    bins.insert("bin_g".to_string(), "0,0.0001,0.01,1,inf".parse().unwrap());
    RunConfig {
        seed: Some(seed),
        iterations,
        bootstrap_individuals: 50,
        minimization: true,
        problem: ProblemConfig {
            name: "constrained_sphere".to_string(),
            dimensions: 2,
            bins,
        },
        mutation: MutationConfig {
            kind: "gaussian".to_string(),
            mu: 0.0,
            sigma: 0.3,
            indpb: 0.5,
            boundary: "bounce".to_string(),
        },
        crossover: CrossoverConfig {
            enabled: crossover,
            kind: "uniform".to_string(),
            indpb: 0.5,
        },
        selection: SelectionPolicy::Uniform,
        on_evaluation_error: Default::default(),
        log_dir: None,
        overwrite: false,
        persist: false,
    }
}

fn line_config() -> RunConfig {
    let mut config = sphere_config(1, 0, false);
    config.problem.dimensions = 1;
    config.bootstrap_individuals = 1;
    config
}

fn registry() -> ProblemRegistry {
    let mut registry = ProblemRegistry::new();
    registry.register("constrained_sphere", ConstrainedSphere::from_config);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_mapping_with_sentinels() {
        let dim = FeatureDimension::behavior("f", "inf,0,1,inf".parse().unwrap());
        assert_eq!(dim.bin(-5.0), Some(0));
        assert_eq!(dim.bin(0.5), Some(1));
        assert_eq!(dim.bin(1.5), Some(2));
        assert_eq!(dim.bin(1e9), Some(2));
    }

    #[test]
    fn test_minimization_placement_scenario() {
        let mut engine = MapElites::new(Box::new(LineProblem), line_config()).unwrap();

        assert_eq!(engine.place(vec![0.5]).unwrap(), Placement::Inserted);
        let cell = engine.archive().get(&[0]).unwrap();
        assert_eq!(cell.genotype, &[0.5]);
        assert_eq!(cell.performance, 10.0);

        // 12.0 is worse: the incumbent stays.
        assert_eq!(
            engine.place(vec![0.6]).unwrap(),
            Placement::Rejected { incumbent: 10.0 }
        );
        let cell = engine.archive().get(&[0]).unwrap();
        assert_eq!(cell.genotype, &[0.5]);
        assert_eq!(cell.performance, 10.0);

        // 8.0 is better: replaced.
        assert_eq!(
            engine.place(vec![0.4]).unwrap(),
            Placement::Replaced { previous: 10.0 }
        );
        let cell = engine.archive().get(&[0]).unwrap();
        assert_eq!(cell.genotype, &[0.4]);
        assert_eq!(cell.performance, 8.0);
        assert_eq!(engine.archive().len(), 1);
    }

    #[test]
    fn test_tie_policy_differs_by_direction() {
        let dims = vec![FeatureDimension::behavior(
            "x",
            Boundaries::new(vec![0.0, 1.0]).unwrap(),
        )];
        let offer = |archive: &mut EliteArchive, gene: f64| {
            archive
                .offer(Candidate {
                    genotype: vec![gene],
                    coords: vec![0],
                    performance: 5.0,
                })
                .unwrap()
        };

        let mut min = EliteArchive::new(dims.clone(), 1, Direction::Minimize).unwrap();
        offer(&mut min, 0.1);
        assert!(!offer(&mut min, 0.2).is_accepted(), "minimization ties keep the incumbent");
        assert_eq!(min.get(&[0]).unwrap().genotype, &[0.1]);

        let mut max = EliteArchive::new(dims, 1, Direction::Maximize).unwrap();
        offer(&mut max, 0.1);
        assert!(offer(&mut max, 0.2).is_accepted(), "maximization ties go to the challenger");
        assert_eq!(max.get(&[0]).unwrap().genotype, &[0.2]);
    }

    #[test]
    fn test_most_promising_counts_only_satisfied_constraints() {
        let b = Boundaries::new(vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        let dims = vec![
            FeatureDimension::constraint("g1", b.clone()),
            FeatureDimension::constraint("g2", b),
        ];
        let mut archive = EliteArchive::new(dims, 1, Direction::Minimize).unwrap();
        archive
            .offer(Candidate {
                genotype: vec![0.7],
                coords: vec![2, 0],
                performance: 42.0,
            })
            .unwrap();

        let best = archive.most_promising().unwrap();
        assert_eq!(best.performance, 42.0);
        assert_eq!(best.solved, 1, "one constraint violated, one satisfied");
        assert_eq!(best.coords, vec![2, 0]);
    }

    #[test]
    fn test_most_promising_prefers_more_constraints_over_performance() {
        let mut registry_config = sphere_config(3, 0, false);
        registry_config.bootstrap_individuals = 1;
        let mut engine = MapElites::from_registry(&registry(), registry_config).unwrap();

        // Infeasible on both constraints but excellent performance.
        engine.place(vec![0.0, 0.0]).unwrap();
        // Feasible on g1 only.
        engine.place(vec![1.0, 0.0]).unwrap();
        // Feasible on both.
        engine.place(vec![2.0, 1.0]).unwrap();
        engine.place(vec![1.5, 0.5]).unwrap();

        let best = engine.archive().most_promising().unwrap();
        assert_eq!(best.solved, 2);
        assert_eq!(best.genotype, vec![1.5, 0.5]);
        assert_eq!(best.performance, 2.5);
    }

    #[test]
    fn test_most_promising_on_empty_archive_is_none() {
        let engine = MapElites::from_registry(&registry(), sphere_config(3, 0, false)).unwrap();
        assert!(engine.archive().most_promising().is_none());
    }

    #[test]
    fn test_select_two_from_two_returns_both() {
        let mut engine = MapElites::new(Box::new(LineProblem), line_config()).unwrap();
        engine.place(vec![0.5]).unwrap();
        engine.place(vec![1.5]).unwrap();

        let mut picked: Vec<f64> = engine.select(2).unwrap().iter().map(|g| g[0]).collect();
        picked.sort_by(f64::total_cmp);
        assert_eq!(picked, vec![0.5, 1.5]);
    }

    #[test]
    fn test_select_three_from_two_reports_starvation() {
        let mut engine = MapElites::new(Box::new(LineProblem), line_config()).unwrap();
        engine.place(vec![0.5]).unwrap();
        engine.place(vec![1.5]).unwrap();

        match engine.select(3) {
            Err(EliteError::InsufficientElites {
                requested,
                available,
            }) => {
                assert_eq!(requested, 3);
                assert_eq!(available, 2);
            }
            other => panic!("expected starvation, got {other:?}"),
        }
    }

    #[test]
    fn test_full_run_finds_feasible_solution() {
        let run = MapElites::from_registry(&registry(), sphere_config(42, 5000, true))
            .unwrap()
            .run()
            .unwrap();

        let summary = &run.summary;
        assert_eq!(summary.iterations_run, 5000);
        assert_eq!(summary.counts.attempts(), 50 + 5000);
        assert_eq!(run.archive.shape(), &[4, 4, 4]);

        let best = summary.most_promising.as_ref().unwrap();
        assert_eq!(best.solved, 2, "both constraints should be satisfiable");
        assert!(
            best.performance < 4.0,
            "expected near the constrained optimum 1.25, got {}",
            best.performance
        );
        assert!(best.genotype[0] >= 1.0 && best.genotype[1] >= 0.5);
    }

    #[test]
    fn test_same_seed_same_archive() {
        let a = MapElites::from_registry(&registry(), sphere_config(7, 500, true))
            .unwrap()
            .run()
            .unwrap();
        let b = MapElites::from_registry(&registry(), sphere_config(7, 500, true))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(a.archive.performances(), b.archive.performances());
        assert_eq!(a.archive.solutions(), b.archive.solutions());
        assert_eq!(a.summary.counts, b.summary.counts);
    }

    #[test]
    fn test_missing_seed_is_drawn_and_reported() {
        let mut config = sphere_config(0, 10, false);
        config.seed = None;
        let engine = MapElites::from_registry(&registry(), config).unwrap();
        let seed = engine.seed();
        let run = engine.run().unwrap();
        assert_eq!(run.summary.seed, seed);
    }

    #[test]
    fn test_stopping_criteria_ends_run_early() {
        let run = MapElites::from_registry(&registry(), sphere_config(9, 1000, false))
            .unwrap()
            .with_stopping_criteria(|status| status.iteration == 25)
            .run()
            .unwrap();
        assert!(run.summary.stopped_early);
        assert_eq!(run.summary.iterations_run, 25);
        assert_eq!(run.summary.counts.attempts(), 50 + 25);
    }

    #[test]
    fn test_constraint_violations_follow_kind() {
        let problem = ConstrainedSphere::from_config(&sphere_config(0, 0, false).problem).unwrap();
        let v = problem.constraint_violations(&[0.0, 2.0]);
        assert_eq!(v, vec![("g1".to_string(), 1.0), ("g2".to_string(), 0.0)]);

        let h = Constraint::equality(|g| g[0] - 1.0);
        assert_eq!(h.violation(&[0.5]), 0.5);
        assert_eq!(h.violation(&[1.5]), 0.5);
    }
}
