//! Reproducible pseudo-random waveform for voice bubbles.

/// Bars drawn per voice message
pub const DEFAULT_BAR_COUNT: usize = 42;

const MIN_HEIGHT: f64 = 3.0;
const MAX_HEIGHT: f64 = 18.0;
const GLYPHS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Linear-congruential generator, seeded per message so the same
/// message always gets the same bars
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = (self.0 * 9301 + 49297) % 233280;
        self.0 as f64 / 233280.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    heights: Vec<f64>,
}

impl Waveform {
    pub fn generate(seed: u64, bar_count: usize) -> Self {
        let mut rng = Lcg(seed % 233280);
        let heights = (0..bar_count)
            .map(|_| MIN_HEIGHT + rng.next() * (MAX_HEIGHT - MIN_HEIGHT))
            .collect();
        Self { heights }
    }

    pub fn heights(&self) -> &[f64] {
        &self.heights
    }

    /// Render as block glyphs, one per bar
    pub fn to_glyphs(&self) -> String {
        self.heights
            .iter()
            .map(|h| {
                let norm = (h - MIN_HEIGHT) / (MAX_HEIGHT - MIN_HEIGHT);
                let idx = (norm * (GLYPHS.len() - 1) as f64).round() as usize;
                GLYPHS[idx.min(GLYPHS.len() - 1)]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_bars() {
        assert_eq!(Waveform::generate(7, 42), Waveform::generate(7, 42));
        assert_ne!(Waveform::generate(7, 42), Waveform::generate(8, 42));
    }

    #[test]
    fn test_heights_in_range() {
        let wave = Waveform::generate(3, DEFAULT_BAR_COUNT);
        assert_eq!(wave.heights().len(), 42);
        assert!(wave.heights().iter().all(|h| (3.0..18.0).contains(h)));
        assert_eq!(wave.to_glyphs().chars().count(), 42);
    }

    #[test]
    fn test_first_value_matches_generator() {
        // seed 1: (9301 + 49297) % 233280 = 58598
        let wave = Waveform::generate(1, 1);
        let expected = 3.0 + (58598.0 / 233280.0) * 15.0;
        assert!((wave.heights()[0] - expected).abs() < 1e-9);
    }
}
