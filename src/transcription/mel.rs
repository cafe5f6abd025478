//! # Mel Filter Bank
//!
//! Generates the triangular, area-normalized (Slaney) mel filters Whisper
//! checkpoints were trained with, so no pre-computed filter file has to ship
//! next to the model.
//!
//! Layout is row-major `[n_mels][n_fft / 2 + 1]`, the shape
//! `candle_transformers::models::whisper::audio::pcm_to_mel` expects.

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

/// Slaney mel scale: linear below 1 kHz, logarithmic above.
pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * ((mel - MIN_LOG_MEL) * log_step()).exp()
    } else {
        F_SP * mel
    }
}

/// Build `n_mels` filters spanning 0 Hz to Nyquist for an `n_fft`-point FFT.
pub fn filter_bank(sample_rate: usize, n_fft: usize, n_mels: usize) -> Vec<f32> {
    let n_freqs = n_fft / 2 + 1;
    let nyquist = sample_rate as f64 / 2.0;

    let fft_freqs: Vec<f64> = (0..n_freqs)
        .map(|k| k as f64 * sample_rate as f64 / n_fft as f64)
        .collect();

    let mel_max = hz_to_mel(nyquist);
    let band_edges: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f64 / (n_mels + 1) as f64))
        .collect();

    let mut filters = vec![0.0f32; n_mels * n_freqs];
    for m in 0..n_mels {
        let (left, center, right) = (band_edges[m], band_edges[m + 1], band_edges[m + 2]);
        let norm = 2.0 / (right - left);

        for (k, &freq) in fft_freqs.iter().enumerate() {
            let rising = (freq - left) / (center - left);
            let falling = (right - freq) / (right - center);
            let weight = rising.min(falling).max(0.0);
            filters[m * n_freqs + k] = (weight * norm) as f32;
        }
    }

    filters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_round_trip() {
        for hz in [0.0, 440.0, 1000.0, 4000.0, 8000.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 1e-6);
        }
    }

    #[test]
    fn test_filter_bank_shape_and_peaks() {
        let filters = filter_bank(16000, 400, 80);
        let n_freqs = 201;
        assert_eq!(filters.len(), 80 * n_freqs);
        assert!(filters.iter().all(|w| *w >= 0.0));

        // Each filter peaks further up the spectrum than the one before it.
        let peak = |m: usize| {
            let row = &filters[m * n_freqs..(m + 1) * n_freqs];
            row.iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(k, _)| k)
                .unwrap()
        };
        assert!(peak(0) <= peak(40));
        assert!(peak(40) < peak(79));
    }

    #[test]
    fn test_every_filter_has_weight() {
        let filters = filter_bank(16000, 400, 128);
        for row in filters.chunks(201) {
            assert!(row.iter().any(|w| *w > 0.0));
        }
    }
}
