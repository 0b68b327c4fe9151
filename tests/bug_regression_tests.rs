use rand::prelude::SeedableRng;
use rand::Rng;
use rand_pcg::Pcg64;
use std::collections::BTreeMap;
use symbios_elites::{
    Direction, EliteArchive, EliteError, FeatureDimension, Placement, Problem, Result, RunConfig,
    SelectionPolicy,
    algorithms::map_elites::MapElites,
    archive::Candidate,
    config::{CrossoverConfig, MutationConfig, ProblemConfig},
};

fn grid(shape: &[usize], genotype_len: usize, direction: Direction) -> EliteArchive {
    let dims = shape
        .iter()
        .enumerate()
        .map(|(i, &n)| {
            let spec = (0..=n).map(|v| v.to_string()).collect::<Vec<_>>().join(",");
            FeatureDimension::behavior(format!("f{i}"), spec.parse().unwrap())
        })
        .collect();
    EliteArchive::new(FeatureDimension::positional(dims), genotype_len, direction).unwrap()
}

fn offer(archive: &mut EliteArchive, coords: &[usize], performance: f64) -> Placement {
    archive
        .offer(Candidate {
            genotype: vec![performance; archive.genotype_len()],
            coords: coords.to_vec(),
            performance,
        })
        .unwrap()
}

/// The empty-cell sentinel is +inf, which no finite score beats under `>=`
/// maximization. Empty cells must accept regardless of direction.
#[test]
fn test_maximization_fills_empty_cells() {
    let mut archive = grid(&[3], 1, Direction::Maximize);
    assert_eq!(offer(&mut archive, &[0], -5.0), Placement::Inserted);
    assert_eq!(offer(&mut archive, &[1], 1e300), Placement::Inserted);
    assert_eq!(archive.len(), 2);
    assert_eq!(
        offer(&mut archive, &[0], -7.0),
        Placement::Rejected { incumbent: -5.0 }
    );
    assert_eq!(
        offer(&mut archive, &[0], -5.0),
        Placement::Replaced { previous: -5.0 }
    );
}

/// +inf marks an empty cell in the persisted performance buffer, so no elite may
/// carry it. A stored +inf would read back as an empty cell.
#[test]
fn test_infinite_performance_is_an_evaluation_failure() {
    let mut archive = grid(&[2], 1, Direction::Minimize);
    offer(&mut archive, &[1], 2.0);
    let before = archive.performances().to_vec();
    for performance in [f64::INFINITY, f64::NEG_INFINITY] {
        let err = archive
            .offer(Candidate {
                genotype: vec![0.25],
                coords: vec![0],
                performance,
            })
            .unwrap_err();
        assert!(err.is_evaluation_failure(), "{err}");
    }
    assert!(archive.is_empty_cell(&[0]).unwrap());
    assert_eq!(archive.performances(), &before[..]);
    assert_eq!(archive.len(), 1);
    assert_eq!(offer(&mut archive, &[0], 3.0), Placement::Inserted);
}

#[test]
fn test_uniform_selection_starvation_is_an_error() {
    let mut archive = grid(&[5, 5], 1, Direction::Minimize);
    offer(&mut archive, &[2, 3], 1.0);
    let mut rng = Pcg64::seed_from_u64(0);
    match archive.select(2, SelectionPolicy::Uniform, &mut rng) {
        Err(EliteError::InsufficientElites {
            requested,
            available,
        }) => {
            assert_eq!(requested, 2);
            assert_eq!(available, 1);
        }
        other => panic!("expected starvation error, got {other:?}"),
    }
}

#[test]
fn test_axis_rejection_gives_up_after_max_attempts() {
    // Two occupied cells out of 10^4: hitting both within 10 draws is
    // practically impossible.
    let mut archive = grid(&[10, 10, 10, 10], 1, Direction::Minimize);
    offer(&mut archive, &[9, 9, 9, 9], 1.0);
    offer(&mut archive, &[0, 0, 0, 0], 2.0);
    let mut rng = Pcg64::seed_from_u64(11);
    let result = archive.select(2, SelectionPolicy::AxisRejection { max_attempts: 10 }, &mut rng);
    assert!(matches!(result, Err(EliteError::InsufficientElites { .. })));
}

#[test]
fn test_axis_rejection_finds_elites_in_dense_archive() {
    let mut archive = grid(&[3, 3], 1, Direction::Minimize);
    for x in 0..3 {
        for y in 0..3 {
            offer(&mut archive, &[x, y], (x * 3 + y) as f64);
        }
    }
    let mut rng = Pcg64::seed_from_u64(5);
    let picked = archive
        .select(4, SelectionPolicy::AxisRejection { max_attempts: 10_000 }, &mut rng)
        .unwrap();
    let mut ids: Vec<u64> = picked.iter().map(|g| g[0] as u64).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);
}

#[test]
fn test_rejected_offer_leaves_archive_untouched() {
    let mut archive = grid(&[2, 2], 3, Direction::Minimize);
    offer(&mut archive, &[1, 1], 1.0);
    let performances = archive.performances().to_vec();
    let solutions = archive.solutions().to_vec();

    assert!(!offer(&mut archive, &[1, 1], 2.0).is_accepted());
    let wrong_len = archive.offer(Candidate {
        genotype: vec![0.0; 2],
        coords: vec![0, 0],
        performance: 0.0,
    });
    assert!(matches!(wrong_len, Err(EliteError::GenotypeLength { .. })));
    let bad_gene = archive.offer(Candidate {
        genotype: vec![0.0, f64::NAN, 0.0],
        coords: vec![0, 0],
        performance: 0.0,
    });
    assert!(bad_gene.is_err());

    assert_eq!(archive.performances(), &performances[..]);
    assert_eq!(archive.solutions(), &solutions[..]);
    assert_eq!(archive.len(), 1);
}

/// Two isolated cells, each reachable only from its own region. With crossover
/// enabled the loop still runs on the single-elite path while one region is empty.
struct TwoIslands;

impl Problem for TwoIslands {
    fn evaluate(&self, g: &[f64]) -> Result<f64> {
        Ok(g[0].abs())
    }
    fn map_to_features(&self, g: &[f64]) -> Result<Vec<usize>> {
        Ok(vec![usize::from(g[0] > 0.0)])
    }
    fn generate_random_solution(&self, rng: &mut Pcg64) -> Vec<f64> {
        vec![rng.random_range(-1.0..-0.5)]
    }
    fn feature_dimensions(&self) -> Vec<FeatureDimension> {
        vec![FeatureDimension::behavior("side", "0,1,2".parse().unwrap())]
    }
    fn domain(&self) -> Vec<(f64, f64)> {
        vec![(-1.0, 1.0)]
    }
}

#[test]
fn test_starved_archive_does_not_hang_run() {
    for selection in [
        SelectionPolicy::Uniform,
        SelectionPolicy::AxisRejection { max_attempts: 50 },
    ] {
        let config = RunConfig {
            seed: Some(3),
            iterations: 200,
            bootstrap_individuals: 5,
            minimization: true,
            problem: ProblemConfig {
                name: "two_islands".to_string(),
                dimensions: 1,
                bins: BTreeMap::new(),
            },
            mutation: MutationConfig {
                kind: "gaussian".to_string(),
                mu: 0.0,
                sigma: 0.01,
                indpb: 1.0,
                boundary: "saturation".to_string(),
            },
            crossover: CrossoverConfig {
                enabled: true,
                kind: "uniform".to_string(),
                indpb: 0.5,
            },
            selection,
            on_evaluation_error: Default::default(),
            log_dir: None,
            overwrite: false,
            persist: false,
        };
        let run = MapElites::new(Box::new(TwoIslands), config)
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(run.summary.iterations_run, 200);
        assert_eq!(run.summary.counts.attempts(), 205);
    }
}
