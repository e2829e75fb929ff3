//! # Prediction
//!
//! Congestion estimate for a vehicle count.
//!
//! ## Model
//!
//! - Feed-forward network: 1 input, [`HIDDEN_UNITS`] ReLU units, 1 linear output
//! - Trained on [`TRAINING_SET`], 10 hardcoded (vehicles, congestion) pairs
//! - Inputs and targets scaled into `[0, 1]` by the dataset maxima
//! - Full-batch Adam on mean squared error, 200 epochs
//! - Last 20% of the dataset held out for validation
//!
//! ## Lifecycle
//!
//! Training happens on the first prediction, on the blocking pool. The
//! [`Predictor`] keeps the trained model for the rest of the process and
//! concurrent first callers wait on the same training run. A failed run
//! leaves the slot empty so the next call trains again. Nothing is persisted.
use std::sync::Arc;

use rand::{Rng, SeedableRng, rngs::StdRng};
use thiserror::Error;
use tokio::{sync::OnceCell, task::spawn_blocking};
use tracing::info;

pub const HIDDEN_UNITS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub vehicles: f64,
    pub congestion: f64,
}

const fn sample(vehicles: f64, congestion: f64) -> Sample {
    Sample {
        vehicles,
        congestion,
    }
}

pub const TRAINING_SET: [Sample; 10] = [
    sample(10.0, 15.0),
    sample(25.0, 30.0),
    sample(40.0, 46.0),
    sample(60.0, 66.0),
    sample(80.0, 88.0),
    sample(100.0, 108.0),
    sample(120.0, 129.0),
    sample(140.0, 150.0),
    sample(160.0, 170.0),
    sample(180.0, 190.0),
];

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("Vehicle count must be a non-negative finite number, got {0}")]
    InvalidInput(f64),

    #[error("Model training failed: {0}")]
    TrainingFailure(String),

    #[error("Model produced a non-finite estimate for {0} vehicles")]
    PredictionFailure(f64),
}

#[derive(Debug, Clone, PartialEq)]
struct Network {
    hidden_weights: [f64; HIDDEN_UNITS],
    hidden_biases: [f64; HIDDEN_UNITS],
    output_weights: [f64; HIDDEN_UNITS],
    output_bias: f64,
}

impl Network {
    fn zeros() -> Self {
        Self {
            hidden_weights: [0.0; HIDDEN_UNITS],
            hidden_biases: [0.0; HIDDEN_UNITS],
            output_weights: [0.0; HIDDEN_UNITS],
            output_bias: 0.0,
        }
    }

    /// Hidden weights start positive so every unit is active on the
    /// non-negative input domain; biases start at zero.
    fn initialized(rng: &mut StdRng) -> Self {
        let mut network = Self::zeros();

        for weight in network.hidden_weights.iter_mut() {
            *weight = rng.gen_range(0.1..1.0);
        }
        for weight in network.output_weights.iter_mut() {
            *weight = rng.gen_range(-0.5..0.5);
        }

        network
    }

    fn output(&self, x: f64) -> f64 {
        self.hidden_weights
            .iter()
            .zip(&self.hidden_biases)
            .zip(&self.output_weights)
            .map(|((w, b), v)| v * (w * x + b).max(0.0))
            .sum::<f64>()
            + self.output_bias
    }

    fn mean_squared_error(&self, samples: &[(f64, f64)]) -> f64 {
        let total: f64 = samples
            .iter()
            .map(|&(x, y)| (self.output(x) - y).powi(2))
            .sum();

        total / samples.len() as f64
    }

    /// Gradient of the mean squared error over `samples`, same shape as the network.
    fn gradients(&self, samples: &[(f64, f64)]) -> Network {
        let mut gradients = Network::zeros();
        let n = samples.len() as f64;

        for &(x, y) in samples {
            let delta = 2.0 * (self.output(x) - y) / n;
            gradients.output_bias += delta;

            for unit in 0..HIDDEN_UNITS {
                let activation = self.hidden_weights[unit] * x + self.hidden_biases[unit];
                if activation <= 0.0 {
                    continue;
                }

                gradients.output_weights[unit] += delta * activation;
                gradients.hidden_weights[unit] += delta * self.output_weights[unit] * x;
                gradients.hidden_biases[unit] += delta * self.output_weights[unit];
            }
        }

        gradients
    }

    fn parameters(&self) -> impl Iterator<Item = f64> + '_ {
        self.hidden_weights
            .iter()
            .chain(&self.hidden_biases)
            .chain(&self.output_weights)
            .chain(std::iter::once(&self.output_bias))
            .copied()
    }

    fn parameters_mut(&mut self) -> impl Iterator<Item = &mut f64> {
        self.hidden_weights
            .iter_mut()
            .chain(self.hidden_biases.iter_mut())
            .chain(self.output_weights.iter_mut())
            .chain(std::iter::once(&mut self.output_bias))
    }
}

struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    step: i32,
    first_moment: Network,
    second_moment: Network,
}

impl Adam {
    fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            first_moment: Network::zeros(),
            second_moment: Network::zeros(),
        }
    }

    fn update(&mut self, network: &mut Network, gradients: &Network) {
        self.step += 1;
        let first_correction = 1.0 - self.beta1.powi(self.step);
        let second_correction = 1.0 - self.beta2.powi(self.step);

        let moments = self
            .first_moment
            .parameters_mut()
            .zip(self.second_moment.parameters_mut());

        for ((parameter, gradient), (m, v)) in network
            .parameters_mut()
            .zip(gradients.parameters())
            .zip(moments)
        {
            *m = self.beta1 * *m + (1.0 - self.beta1) * gradient;
            *v = self.beta2 * *v + (1.0 - self.beta2) * gradient * gradient;

            let m_hat = *m / first_correction;
            let v_hat = *v / second_correction;
            *parameter -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }
}

/// A trained network together with the scales it was trained under.
#[derive(Debug, Clone)]
pub struct Model {
    network: Network,
    input_scale: f64,
    target_scale: f64,
    pub train_loss: f64,
    pub validation_loss: Option<f64>,
}

impl Model {
    /// Raw model output, unclamped and unrounded.
    pub fn estimate(&self, vehicles: f64) -> f64 {
        self.network.output(vehicles / self.input_scale) * self.target_scale
    }
}

pub trait Trainer: Send + Sync {
    fn train(&self, samples: &[Sample]) -> Result<Model, PredictionError>;
}

#[derive(Debug, Clone)]
pub struct NetworkTrainer {
    pub epochs: usize,
    pub learning_rate: f64,
    pub validation_split: f64,
    pub seed: u64,
}

impl Default for NetworkTrainer {
    fn default() -> Self {
        Self {
            epochs: 200,
            learning_rate: 0.02,
            validation_split: 0.2,
            seed: 42,
        }
    }
}

fn max_of(values: impl Iterator<Item = f64>) -> Result<f64, PredictionError> {
    let max = values.fold(f64::NEG_INFINITY, f64::max);

    if max.is_finite() && max > 0.0 {
        Ok(max)
    } else {
        Err(PredictionError::TrainingFailure(format!(
            "training set has no positive finite scale (max {max})"
        )))
    }
}

impl Trainer for NetworkTrainer {
    fn train(&self, samples: &[Sample]) -> Result<Model, PredictionError> {
        if samples.is_empty() {
            return Err(PredictionError::TrainingFailure(
                "training set is empty".to_string(),
            ));
        }

        let input_scale = max_of(samples.iter().map(|s| s.vehicles))?;
        let target_scale = max_of(samples.iter().map(|s| s.congestion))?;

        let scaled: Vec<(f64, f64)> = samples
            .iter()
            .map(|s| (s.vehicles / input_scale, s.congestion / target_scale))
            .collect();

        let validation_len = ((scaled.len() as f64 * self.validation_split).round() as usize)
            .min(scaled.len() - 1);
        let (training, validation) = scaled.split_at(scaled.len() - validation_len);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut network = Network::initialized(&mut rng);
        let mut optimizer = Adam::new(self.learning_rate);

        for epoch in 0..self.epochs {
            let loss = network.mean_squared_error(training);
            if !loss.is_finite() {
                return Err(PredictionError::TrainingFailure(format!(
                    "loss diverged at epoch {epoch}"
                )));
            }

            let gradients = network.gradients(training);
            optimizer.update(&mut network, &gradients);
        }

        let train_loss = network.mean_squared_error(training);
        if !train_loss.is_finite() {
            return Err(PredictionError::TrainingFailure(
                "loss diverged after the final epoch".to_string(),
            ));
        }

        let validation_loss =
            (!validation.is_empty()).then(|| network.mean_squared_error(validation));

        Ok(Model {
            network,
            input_scale,
            target_scale,
            train_loss,
            validation_loss,
        })
    }
}

/// Values at or above 1e15 have no fractional cents and are returned as is.
pub fn round_to_cents(value: f64) -> f64 {
    if value.abs() >= 1e15 {
        return value;
    }

    (value * 100.0).round() / 100.0
}

pub struct Predictor {
    trainer: Arc<dyn Trainer>,
    model: OnceCell<Arc<Model>>,
}

impl Default for Predictor {
    fn default() -> Self {
        Self::new(Arc::new(NetworkTrainer::default()))
    }
}

impl Predictor {
    pub fn new(trainer: Arc<dyn Trainer>) -> Self {
        Self {
            trainer,
            model: OnceCell::new(),
        }
    }

    pub async fn ensure_trained(&self) -> Result<Arc<Model>, PredictionError> {
        let model = self
            .model
            .get_or_try_init(|| async {
                info!("Training congestion model...");

                let trainer = Arc::clone(&self.trainer);
                let model = spawn_blocking(move || trainer.train(&TRAINING_SET))
                    .await
                    .map_err(|e| PredictionError::TrainingFailure(e.to_string()))??;

                info!(
                    train_loss = model.train_loss,
                    validation_loss = ?model.validation_loss,
                    "Congestion model trained"
                );

                Ok::<_, PredictionError>(Arc::new(model))
            })
            .await?;

        Ok(Arc::clone(model))
    }

    /// Congestion estimate for `vehicles`, clamped at zero and rounded to 2 decimals.
    pub async fn predict(&self, vehicles: f64) -> Result<f64, PredictionError> {
        if !vehicles.is_finite() || vehicles < 0.0 {
            return Err(PredictionError::InvalidInput(vehicles));
        }

        let model = self.ensure_trained().await?;
        let prediction = round_to_cents(model.estimate(vehicles).max(0.0));

        if !prediction.is_finite() {
            return Err(PredictionError::PredictionFailure(vehicles));
        }

        Ok(prediction)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingTrainer {
        inner: NetworkTrainer,
        calls: AtomicUsize,
        failures_left: AtomicUsize,
    }

    impl CountingTrainer {
        fn failing_first(failures: usize) -> Self {
            Self {
                failures_left: AtomicUsize::new(failures),
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Trainer for CountingTrainer {
        fn train(&self, samples: &[Sample]) -> Result<Model, PredictionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if failing {
                return Err(PredictionError::TrainingFailure("injected".to_string()));
            }

            self.inner.train(samples)
        }
    }

    #[test]
    fn test_model_fits_training_shape() {
        let model = NetworkTrainer::default().train(&TRAINING_SET).unwrap();

        let at_150 = model.estimate(150.0);
        assert!((150.0..=170.0).contains(&at_150), "estimate at 150 was {at_150}");
        assert!(model.estimate(50.0) < model.estimate(150.0));
        assert!(model.train_loss < 0.01);
        assert!(model.validation_loss.is_some());
    }

    #[test]
    fn test_training_is_deterministic() {
        let a = NetworkTrainer::default().train(&TRAINING_SET).unwrap();
        let b = NetworkTrainer::default().train(&TRAINING_SET).unwrap();

        assert_eq!(a.estimate(123.0), b.estimate(123.0));
    }

    #[test]
    fn test_training_rejects_empty_set() {
        let err = NetworkTrainer::default().train(&[]).unwrap_err();

        assert!(matches!(err, PredictionError::TrainingFailure(_)));
    }

    #[test]
    fn test_training_detects_divergence() {
        let trainer = NetworkTrainer {
            learning_rate: f64::INFINITY,
            ..NetworkTrainer::default()
        };

        let err = trainer.train(&TRAINING_SET).unwrap_err();
        assert!(matches!(err, PredictionError::TrainingFailure(_)));
    }

    #[test]
    fn test_single_sample_trains_without_validation() {
        let model = NetworkTrainer::default()
            .train(&[sample(100.0, 110.0)])
            .unwrap();

        assert!(model.validation_loss.is_none());
    }

    #[test]
    fn test_round_to_cents() {
        assert_eq!(round_to_cents(159.876), 159.88);
        assert_eq!(round_to_cents(0.004), 0.0);
        assert_eq!(round_to_cents(12.5), 12.5);
        assert_eq!(round_to_cents(1e307), 1e307);
        assert_eq!(round_to_cents(f64::MAX), f64::MAX);
    }

    #[tokio::test]
    async fn test_predict_trains_once() {
        let trainer = Arc::new(CountingTrainer::default());
        let predictor = Predictor::new(trainer.clone());
        assert!(!predictor.model.initialized());

        let first = predictor.predict(150.0).await.unwrap();
        let second = predictor.predict(150.0).await.unwrap();
        predictor.predict(20.0).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(trainer.calls(), 1);
        assert!(predictor.model.initialized());
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_share_training() {
        let trainer = Arc::new(CountingTrainer::default());
        let predictor = Predictor::new(trainer.clone());

        let (a, b, c) = tokio::join!(
            predictor.predict(10.0),
            predictor.predict(90.0),
            predictor.predict(150.0)
        );

        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(trainer.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_training_is_not_cached() {
        let trainer = Arc::new(CountingTrainer::failing_first(1));
        let predictor = Predictor::new(trainer.clone());

        let err = predictor.predict(40.0).await.unwrap_err();
        assert!(matches!(err, PredictionError::TrainingFailure(_)));
        assert!(!predictor.model.initialized());

        predictor.predict(40.0).await.unwrap();
        assert_eq!(trainer.calls(), 2);
    }

    #[tokio::test]
    async fn test_predict_rejects_invalid_counts() {
        let trainer = Arc::new(CountingTrainer::default());
        let predictor = Predictor::new(trainer.clone());

        for vehicles in [-5.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = predictor.predict(vehicles).await.unwrap_err();
            assert!(matches!(err, PredictionError::InvalidInput(_)));
        }

        assert_eq!(trainer.calls(), 0);
    }

    #[tokio::test]
    async fn test_predict_output_is_rounded_and_non_negative() {
        let predictor = Predictor::default();

        for vehicles in [0.0, 1.0, 33.3, 150.0, 1_000.0] {
            let prediction = predictor.predict(vehicles).await.unwrap();

            assert!(prediction.is_finite());
            assert!(prediction >= 0.0);
            assert_eq!(round_to_cents(prediction), prediction);
        }
    }

    #[tokio::test]
    async fn test_predict_huge_counts_stay_finite() {
        let predictor = Predictor::default();

        for vehicles in [1e306, 1e307, f64::MAX] {
            let prediction = predictor.predict(vehicles).await.unwrap();

            assert!(prediction.is_finite(), "{vehicles} gave {prediction}");
            assert!(prediction >= 0.0);
        }
    }
}
