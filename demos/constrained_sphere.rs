//! Constrained sphere: minimize `x0^2 + x1^2` subject to `x0 + x1 >= 1` and
//! `x0 - x1 == 0`.
//!
//! The archive has one behavior axis (`x0`) and one constraint axis per
//! constraint. The optimum, `(0.5, 0.5)` with value `0.5`, lies in the cell that
//! sits in bin 0 on both constraint axes.
//!
//! ```text
//! cargo run --example constrained_sphere [config.json]
//! ```

use rand::Rng;
use rand_pcg::Pcg64;
use std::collections::BTreeMap;
use symbios_elites::{
    Constraint, FeatureDimension, Problem, ProblemRegistry, Result, RunConfig,
    algorithms::map_elites::MapElites, config::ProblemConfig,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = r#"{
    "seed": 2024,
    "iterations": 20000,
    "bootstrap_individuals": 200,
    "minimization": true,
    "problem": {
        "name": "constrained_sphere",
        "dimensions": 2,
        "bins": {
            "bin_x0": "inf,-1,-0.5,0,0.5,1,inf",
            "bin_g1": "0,0.0001,0.01,0.1,1,inf",
            "bin_h1": "0,0.0001,0.01,0.1,1,inf"
        }
    },
    "mutation": { "kind": "gaussian", "mu": 0.0, "sigma": 0.1, "indpb": 0.5, "boundary": "bounce" },
    "crossover": { "enabled": true, "kind": "uniform", "indpb": 0.5 },
    "log_dir": "logs/constrained_sphere",
    "overwrite": true
}"#;

struct ConstrainedSphere {
    dimensions: Vec<FeatureDimension>,
}

impl ConstrainedSphere {
    fn from_config(config: &ProblemConfig) -> Result<Box<dyn Problem>> {
        let dimensions = FeatureDimension::positional(vec![
            FeatureDimension::behavior("x0", config.bins("bin_x0")?.clone()),
            FeatureDimension::behavior("g1", config.bins("bin_g1")?.clone()),
            FeatureDimension::behavior("h1", config.bins("bin_h1")?.clone()),
        ]);
        Ok(Box::new(Self { dimensions }))
    }
}

impl Problem for ConstrainedSphere {
    fn evaluate(&self, g: &[f64]) -> Result<f64> {
        Ok(g.iter().map(|x| x * x).sum())
    }

    fn map_to_features(&self, g: &[f64]) -> Result<Vec<usize>> {
        let violations = self.constraint_violations(g);
        let mut coords = vec![self.dimensions[0].locate(g[0])?];
        for (dim, (_, v)) in self.dimensions[1..].iter().zip(&violations) {
            coords.push(dim.locate(*v)?);
        }
        Ok(coords)
    }

    fn generate_random_solution(&self, rng: &mut Pcg64) -> Vec<f64> {
        self.domain()
            .iter()
            .map(|&(lo, hi)| rng.random_range(lo..hi))
            .collect()
    }

    fn feature_dimensions(&self) -> Vec<FeatureDimension> {
        self.dimensions.clone()
    }

    fn domain(&self) -> Vec<(f64, f64)> {
        vec![(-2.0, 2.0); 2]
    }

    fn constraints(&self) -> BTreeMap<String, Constraint> {
        BTreeMap::from([
            (
                "g1".to_string(),
                Constraint::inequality(|g: &[f64]| 1.0 - g[0] - g[1]),
            ),
            (
                "h1".to_string(),
                Constraint::equality(|g: &[f64]| g[0] - g[1]),
            ),
        ])
    }

    fn name(&self) -> &str {
        "constrained_sphere"
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => RunConfig::from_path(path)?,
        None => RunConfig::from_json_str(DEFAULT_CONFIG)?,
    };

    let mut registry = ProblemRegistry::new();
    registry.register("constrained_sphere", ConstrainedSphere::from_config);

    let run = MapElites::from_registry(&registry, config)?.run()?;

    println!("\n=== CONSTRAINED SPHERE RESULTS ===");
    println!(
        "Coverage: {}/{} cells",
        run.summary.archive_len, run.summary.capacity
    );
    match &run.summary.most_promising {
        Some(p) => println!(
            "Most promising: f = {:.6} at {:?}, {} of {} constraints solved, genotype {:?}",
            p.performance,
            p.coords,
            p.solved,
            run.archive.constraint_axes().len(),
            p.genotype
        ),
        None => println!("No elite was placed"),
    }
    if let Some(best) = &run.summary.best_overall {
        println!(
            "Best overall: f = {:.6} at {:?}",
            best.performance, best.coords
        );
    }

    if let Some(dir) = &run.run_dir {
        println!("Run written to {}", dir.display());
    }
    Ok(())
}
