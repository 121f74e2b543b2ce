//! # Energy Cuts
//!
//! The boundary between continuous and stochastic treatment of a loss.
//! A loss fraction v = ΔE/E below `cut(E) = min(ecut/E, vcut)` is folded
//! into the continuous rate; above it the loss is sampled as an event.

use crate::interpolation::cache::{FingerprintBuilder, FingerprintSource};

/// Absolute and relative loss thresholds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyCutSettings {
    /// Absolute cut (MeV), non-positive means none
    ecut: f64,
    /// Relative cut, outside (0, 1] means 1
    vcut: f64,
}

impl Default for EnergyCutSettings {
    fn default() -> Self {
        Self::new(500.0, 0.05)
    }
}

impl EnergyCutSettings {
    pub fn new(ecut: f64, vcut: f64) -> Self {
        let ecut = if ecut > 0.0 { ecut } else { -1.0 };
        let vcut = if vcut > 0.0 && vcut <= 1.0 { vcut } else { 1.0 };
        Self { ecut, vcut }
    }

    /// Everything continuous
    pub fn continuous_only() -> Self {
        Self::new(-1.0, 1.0)
    }

    pub fn ecut(&self) -> f64 {
        self.ecut
    }

    pub fn vcut(&self) -> f64 {
        self.vcut
    }

    /// Energy where the absolute cut takes over from the relative one
    /// (MeV). The continuous rate has a kink there.
    pub fn transition_energy(&self) -> Option<f64> {
        (self.ecut > 0.0).then(|| self.ecut / self.vcut)
    }

    /// Relative cut at energy E (MeV)
    pub fn cut(&self, energy: f64) -> f64 {
        if self.ecut > 0.0 && energy > 0.0 {
            (self.ecut / energy).min(self.vcut)
        } else {
            self.vcut
        }
    }
}

impl FingerprintSource for EnergyCutSettings {
    fn fingerprint_into(&self, builder: FingerprintBuilder) -> FingerprintBuilder {
        builder.number("ecut", self.ecut).number("vcut", self.vcut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cut_takes_minimum() {
        let cuts = EnergyCutSettings::new(500.0, 0.05);
        assert_eq!(cuts.cut(1e3), 0.05);
        assert_eq!(cuts.cut(1e5), 500.0 / 1e5);
    }

    #[test]
    fn test_out_of_range_settings() {
        let cuts = EnergyCutSettings::new(0.0, 2.0);
        assert_eq!(cuts.ecut(), -1.0);
        assert_eq!(cuts.vcut(), 1.0);
        assert_eq!(cuts.cut(1e6), 1.0);
        assert_eq!(EnergyCutSettings::new(-5.0, 0.1).cut(10.0), 0.1);
    }

    #[test]
    fn test_transition_energy() {
        let cuts = EnergyCutSettings::new(500.0, 0.05);
        let Some(kink) = cuts.transition_energy() else {
            panic!("no transition");
        };
        assert_eq!(kink, 1e4);
        assert_eq!(cuts.cut(kink), 0.05);
        assert_eq!(EnergyCutSettings::continuous_only().transition_energy(), None);
    }
}
