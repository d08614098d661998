use std::f32::consts::PI;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::acquisition::source::quantize;

/// Periodic test signal for one scope channel, amplitudes in `[-1, 1]`
#[derive(Clone, Copy, Debug, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Waveform {
    Sine { freq_hz: f32, amplitude: f32 },
    Square { freq_hz: f32, amplitude: f32 },
    Dc { level: f32 },
}

impl Waveform {
    pub fn value_at(&self, t: f32) -> f32 {
        match *self {
            Waveform::Sine { freq_hz, amplitude } => amplitude * (2.0 * PI * freq_hz * t).sin(),
            Waveform::Square { freq_hz, amplitude } => {
                if (freq_hz * t).fract() < 0.5 {
                    amplitude
                } else {
                    -amplitude
                }
            }
            Waveform::Dc { level } => level,
        }
    }
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct SimulationConfig {
    pub sample_rate: u32,
    pub channels: Vec<Waveform>,
    /// Standard deviation of additive Gaussian noise, in normalised units
    #[serde(default)]
    pub noise_std: f32,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl SimulationConfig {
    pub fn new(sample_rate: u32, channels: Vec<Waveform>) -> Self {
        Self {
            sample_rate,
            channels,
            noise_std: 0.0,
            seed: None,
        }
    }

    pub fn with_noise(mut self, noise_std: f32) -> Self {
        self.noise_std = noise_std;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

pub(crate) fn create_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => rand::make_rng(),
    }
}

/// Generate `num_samples` interleaved 8-bit samples starting at `first_sample`
pub fn generate_interleaved(
    config: &SimulationConfig,
    first_sample: u64,
    num_samples: usize,
    rng: &mut ChaCha8Rng,
) -> Vec<u8> {
    let noise = if config.noise_std > 0.0 {
        Normal::new(0.0, config.noise_std as f64).ok()
    } else {
        None
    };

    let mut samples = Vec::with_capacity(num_samples * config.channels.len());
    for i in 0..num_samples as u64 {
        let t = (first_sample + i) as f32 / config.sample_rate as f32;
        for waveform in &config.channels {
            let mut value = waveform.value_at(t);
            if let Some(ref normal) = noise {
                value += normal.sample(rng) as f32;
            }
            samples.push(quantize(value));
        }
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_length_and_interleaving() {
        let config = SimulationConfig::new(
            48000,
            vec![Waveform::Dc { level: -1.0 }, Waveform::Dc { level: 1.0 }],
        );
        let mut rng = create_rng(Some(1));
        let samples = generate_interleaved(&config, 0, 100, &mut rng);

        assert_eq!(samples.len(), 200);
        assert!(samples.iter().step_by(2).all(|&v| v == 0));
        assert!(samples.iter().skip(1).step_by(2).all(|&v| v == 255));
    }

    #[test]
    fn test_sine_spans_range() {
        let config = SimulationConfig::new(
            48000,
            vec![Waveform::Sine {
                freq_hz: 1000.0,
                amplitude: 1.0,
            }],
        );
        let mut rng = create_rng(Some(1));
        let samples = generate_interleaved(&config, 0, 48, &mut rng);

        assert!(*samples.iter().max().unwrap() >= 254);
        assert!(*samples.iter().min().unwrap() <= 1);
    }

    #[test]
    fn test_seeded_noise_reproducible() {
        let config = SimulationConfig::new(48000, vec![Waveform::Dc { level: 0.0 }])
            .with_noise(0.1)
            .with_seed(7);
        let a = generate_interleaved(&config, 0, 64, &mut create_rng(config.seed));
        let b = generate_interleaved(&config, 0, 64, &mut create_rng(config.seed));
        assert_eq!(a, b);
        assert!(a.iter().any(|&v| v != 128));
    }

    #[test]
    fn test_square_wave_levels() {
        let square = Waveform::Square {
            freq_hz: 1.0,
            amplitude: 0.5,
        };
        assert_eq!(square.value_at(0.25), 0.5);
        assert_eq!(square.value_at(0.75), -0.5);
    }
}
