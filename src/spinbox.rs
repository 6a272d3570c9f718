//! Numeric entry with `-` and `+` buttons.

use eframe::egui;

/// Text entry for a number in `from..=to`, stepped by `increment`.
///
/// Unbounded sides use infinities.
#[derive(Debug, Clone)]
pub struct Spinbox {
    text: String,
    from: f64,
    to: f64,
    is_float: bool,
    increment: f64,
}

impl Spinbox {
    pub fn new(from: f64, to: f64, increment: f64, is_float: bool) -> Self {
        Self {
            text: "0".to_string(),
            from,
            to,
            is_float,
            increment,
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.set(value);
        self
    }

    /// Parsed entry, `None` when empty, not a number or not finite.
    pub fn get(&self) -> Option<f64> {
        self.text
            .trim()
            .parse()
            .ok()
            .filter(|v: &f64| v.is_finite())
    }

    /// Clamp to the range and show the value.
    pub fn set(&mut self, value: f64) {
        let value = value.clamp(self.from, self.to);
        self.text = if self.is_float && value.abs() < 1000.0 {
            format!("{value:.2}")
        } else {
            format!("{:.0}", value.trunc())
        };
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Move one increment up (`sign > 0`) or down and return the new value.
    ///
    /// An unparsable entry is left alone.
    pub fn step(&mut self, sign: f64) -> Option<f64> {
        let current = self.get()?;
        self.set(current + sign.signum() * self.increment);
        self.get()
    }

    /// Draw the widget; returns the value when the user commits one.
    pub fn show(&mut self, ui: &mut egui::Ui, width: f32) -> Option<f64> {
        let mut committed = None;
        ui.horizontal(|ui| {
            ui.spacing_mut().item_spacing.x = 2.0;
            if ui.small_button("-").clicked() {
                committed = self.step(-1.0);
            }
            let response = ui.add(egui::TextEdit::singleline(&mut self.text).desired_width(width));
            if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                committed = self.get().and_then(|v| {
                    self.set(v);
                    self.get()
                });
            }
            if ui.small_button("+").clicked() {
                committed = self.step(1.0);
            }
        });
        committed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_formatting() {
        let mut spin = Spinbox::new(-10_000.0, 10_000.0, 1.0, true);
        spin.set(3.14159);
        assert_eq!(spin.get(), Some(3.14));
        spin.set(2500.7);
        assert_eq!(spin.get(), Some(2500.0));
    }

    #[test]
    fn test_int_formatting_and_clamp() {
        let mut spin = Spinbox::new(1.0, 20.0, 1.0, false);
        spin.set(7.6);
        assert_eq!(spin.get(), Some(7.0));
        spin.set(99.0);
        assert_eq!(spin.get(), Some(20.0));
    }

    #[test]
    fn test_step_and_empty() {
        let mut spin = Spinbox::new(0.0, 100.0, 5.0, false).with_value(50.0);
        assert_eq!(spin.step(1.0), Some(55.0));
        assert_eq!(spin.step(-1.0), Some(50.0));
        spin.clear();
        assert_eq!(spin.get(), None);
        assert_eq!(spin.step(1.0), None);
        assert_eq!(Spinbox::new(f64::NEG_INFINITY, f64::INFINITY, 0.5, true).step(1.0), Some(0.5));
    }

    #[test]
    fn test_non_finite_entries_are_rejected() {
        let mut spin = Spinbox::new(1.0, f64::INFINITY, 1.0, false);
        for text in ["inf", "-inf", "NaN", "infinity"] {
            spin.text = text.to_string();
            assert_eq!(spin.get(), None, "{text}");
            assert_eq!(spin.step(1.0), None);
        }
        spin.text = "1e12".to_string();
        assert_eq!(spin.get(), Some(1e12));
    }
}
