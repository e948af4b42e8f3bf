//! Name-derived colors and time-to-percentage mapping for rendering.

use serde::Serialize;

use crate::{BootgraphError, BootgraphResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaletteColor {
    /// CSS class used by the html output.
    pub class: &'static str,
    pub hex: &'static str,
}

pub const PALETTE: [PaletteColor; 10] = [
    PaletteColor { class: "c1", hex: "#ec9999" },
    PaletteColor { class: "c2", hex: "#ffc1a6" },
    PaletteColor { class: "c3", hex: "#fff0a6" },
    PaletteColor { class: "c4", hex: "#adf199" },
    PaletteColor { class: "c5", hex: "#9fadea" },
    PaletteColor { class: "c6", hex: "#a699c1" },
    PaletteColor { class: "c7", hex: "#ad99b4" },
    PaletteColor { class: "c8", hex: "#eaffea" },
    PaletteColor { class: "c9", hex: "#dcecfb" },
    PaletteColor { class: "c10", hex: "#ffffea" },
];

/// Sum of the name's code points, modulo the palette size.
pub fn color_for_name(name: &str) -> PaletteColor {
    let total: u64 = name.chars().map(|c| u64::from(u32::from(c))).sum();
    PALETTE[(total % PALETTE.len() as u64) as usize]
}

/// Maps absolute timestamps onto `[0, 100]` relative to `[t0, t_max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeScale {
    t0: f64,
    total: f64,
}

impl TimeScale {
    pub fn new(t0: f64, t_max: f64) -> BootgraphResult<Self> {
        let total = t_max - t0;
        if total == 0.0 || !total.is_finite() {
            return Err(BootgraphError::NoTimeline { start: t0, end: t_max });
        }
        Ok(Self { t0, total })
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn left(&self, t: f64) -> f64 {
        (t - self.t0) / self.total * 100.0
    }

    pub fn width(&self, start: f64, end: f64) -> f64 {
        (end - start) / self.total * 100.0
    }
}
