use anyhow::Result;
use ndarray::ArrayView2;

use cogspaces::synthetic::{make_studies, StudyShape};
use cogspaces::{
    load_config, MultiStudyClassifier, MultiStudyEstimator, TraceNormConfig, TraceNormEstimator,
};

fn main() -> Result<()> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => load_config(path)?,
        None => TraceNormConfig::new(0.05, 0.01, 200).with_verbose(10),
    };

    let studies = make_studies(
        &[StudyShape::new("archi", 280, 4), StudyShape::new("brainomics", 160, 3)],
        20,
        3,
        42,
    );
    let (train, test): (Vec<_>, Vec<_>) = studies
        .iter()
        .map(|study| study.split_at(study.n_samples() * 3 / 4))
        .unzip();

    let estimator = TraceNormEstimator::new(config);
    let model = estimator.fit(&train, None)?;
    log::info!(
        "{}: rank {}, trace norm {:.4}, loss {:.4} -> {:.4}",
        estimator.name(),
        model.rank,
        model.trace_norm()?,
        model.initial_loss,
        model.final_loss()
    );

    let inputs: Vec<(&str, ArrayView2<f32>)> =
        test.iter().map(|s| (s.name.as_str(), s.x.view())).collect();
    for prediction in model.predict_proba(&inputs)? {
        log::info!(
            "{}: predicted {} samples over {} classes",
            prediction.name,
            prediction.probabilities.nrows(),
            prediction.probabilities.ncols()
        );
    }
    for (score, accuracy) in model.score(&test)?.iter().zip(model.accuracy(&test)?) {
        log::info!(
            "{}: cross-entropy {:.4}, accuracy {:.3}",
            score.name,
            score.value,
            accuracy.value
        );
    }
    Ok(())
}
