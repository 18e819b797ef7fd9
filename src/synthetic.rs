//! Seeded synthetic multi-study data.
//!
//! Every study draws features uniformly from `[-1, 1)` in a shared feature
//! space. Labels are the argmax of a planted coefficient matrix of rank
//! `latent_rank`, so studies share structure the trace norm can recover.
use ndarray::{s, Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data_handling::{Labels, Study};
use crate::stats::argmax_rows;

/// Size of one synthetic study.
#[derive(Debug, Clone, PartialEq)]
pub struct StudyShape {
    pub name: String,
    pub n_samples: usize,
    pub n_classes: usize,
}

impl StudyShape {
    pub fn new(name: impl Into<String>, n_samples: usize, n_classes: usize) -> Self {
        StudyShape {
            name: name.into(),
            n_samples,
            n_classes,
        }
    }
}

fn uniform(rng: &mut StdRng, shape: (usize, usize)) -> Array2<f32> {
    Array2::from_shape_fn(shape, |_| rng.gen_range(-1.0f32..1.0))
}

/// Generate one study per shape, deterministically from `seed`.
///
/// Labels are integer coded with the class count of the shape, even when a
/// class happens to be absent from the draw.
pub fn make_studies(
    shapes: &[StudyShape],
    n_features: usize,
    latent_rank: usize,
    seed: u64,
) -> Vec<Study> {
    let mut rng = StdRng::seed_from_u64(seed);
    let total_classes: usize = shapes.iter().map(|s| s.n_classes).sum();
    let left = uniform(&mut rng, (n_features, latent_rank));
    let right = uniform(&mut rng, (latent_rank, total_classes));
    let planted = left.dot(&right);

    let mut offset = 0;
    shapes
        .iter()
        .map(|shape| {
            let x = uniform(&mut rng, (shape.n_samples, n_features));
            let block = planted.slice(s![.., offset..offset + shape.n_classes]);
            offset += shape.n_classes;
            let codes: Array1<i64> = argmax_rows(x.dot(&block).view()).mapv(|c| c as i64);
            Study::new(shape.name.clone(), x, Labels::with_n_classes(codes, shape.n_classes))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shapes() -> Vec<StudyShape> {
        vec![StudyShape::new("a", 30, 3), StudyShape::new("b", 20, 2)]
    }

    #[test]
    fn shapes_and_labels() {
        let studies = make_studies(&shapes(), 6, 2, 7);
        assert_eq!(studies.len(), 2);
        assert_eq!(studies[0].x.dim(), (30, 6));
        assert_eq!(studies[1].x.dim(), (20, 6));
        assert_eq!(studies[0].labels.n_classes(), 3);
        assert_eq!(studies[1].labels.n_classes(), 2);
        assert!(studies[0].labels.class_indices("a").is_ok());
        assert!(studies[0].x.iter().all(|v| (-1.0..1.0).contains(v)));
    }

    #[test]
    fn same_seed_same_data() {
        let first = make_studies(&shapes(), 4, 1, 11);
        let second = make_studies(&shapes(), 4, 1, 11);
        let other = make_studies(&shapes(), 4, 1, 12);
        assert_eq!(first[0].x, second[0].x);
        assert_eq!(first[1].labels, second[1].labels);
        assert_ne!(first[0].x, other[0].x);
    }
}
