//! Keyboard shortcuts.

use eframe::egui::{self, Key};

use crate::app::MainFrame;

/// A shortcut resolved from this frame's input.
#[derive(Debug, Clone, Copy, PartialEq)]
enum KeyAction {
    /// Shift the image percentile start (or stop) by this many percent.
    Quantile { stop: bool, increment: f32 },
    EqualHist,
    LeaveFullscreen,
    HideMasks(bool),
    StepOrigin { axis: usize, delta: f32 },
    PreviousPage,
}

fn key_actions(input: &egui::InputState) -> Vec<KeyAction> {
    let shift = input.modifiers.shift;
    let mut actions = Vec::new();
    if shift {
        for (key, stop, increment) in [
            (Key::A, false, -5.0),
            (Key::D, false, 5.0),
            (Key::S, true, -1.0),
            (Key::W, true, 1.0),
        ] {
            if input.key_pressed(key) {
                actions.push(KeyAction::Quantile { stop, increment });
            }
        }
        if input.key_pressed(Key::Enter) {
            actions.push(KeyAction::EqualHist);
        }
        if input.key_pressed(Key::Space) {
            actions.push(KeyAction::HideMasks(true));
        }
        if input.key_pressed(Key::Backspace) {
            actions.push(KeyAction::PreviousPage);
        }
    }
    if input.key_released(Key::Space) {
        actions.push(KeyAction::HideMasks(false));
    }
    if input.key_pressed(Key::Escape) {
        actions.push(KeyAction::LeaveFullscreen);
    }
    let (horizontal, vertical) = if shift { (1, 3) } else { (0, 2) };
    for (key, axis, delta) in [
        (Key::ArrowLeft, horizontal, -1.0),
        (Key::ArrowRight, horizontal, 1.0),
        (Key::ArrowDown, vertical, -1.0),
        (Key::ArrowUp, vertical, 1.0),
    ] {
        if input.key_pressed(key) {
            actions.push(KeyAction::StepOrigin { axis, delta });
        }
    }
    actions
}

impl MainFrame {
    pub(crate) fn handle_keys(&mut self, ctx: &egui::Context) {
        if ctx.wants_keyboard_input() {
            return;
        }
        for action in ctx.input(key_actions) {
            match action {
                KeyAction::Quantile { stop, increment } => {
                    self.set_quantile_range(None, false, stop, Some(increment));
                }
                KeyAction::EqualHist => self.toggle_equal_hist(),
                KeyAction::LeaveFullscreen => {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(false));
                }
                KeyAction::HideMasks(hidden) => self.hide_masks(hidden),
                KeyAction::StepOrigin { axis, delta } => self.step_origin(axis, delta),
                KeyAction::PreviousPage if !self.toplevel => self.set_page(false),
                KeyAction::PreviousPage => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actions_for(events: Vec<egui::Event>, modifiers: egui::Modifiers) -> Vec<KeyAction> {
        let raw = egui::RawInput {
            events,
            modifiers,
            ..Default::default()
        };
        let mut actions = Vec::new();
        let _ = egui::Context::default().run(raw, |ctx| actions = ctx.input(key_actions));
        actions
    }

    fn key(key: Key, pressed: bool, modifiers: egui::Modifiers) -> egui::Event {
        egui::Event::Key {
            key,
            physical_key: None,
            pressed,
            repeat: false,
            modifiers,
        }
    }

    #[test]
    fn test_arrows_step_planes_and_time() {
        let none = egui::Modifiers::NONE;
        let events = vec![key(Key::ArrowLeft, true, none), key(Key::ArrowUp, true, none)];
        assert_eq!(
            actions_for(events, none),
            vec![
                KeyAction::StepOrigin { axis: 0, delta: -1.0 },
                KeyAction::StepOrigin { axis: 2, delta: 1.0 },
            ]
        );
        let shift = egui::Modifiers::SHIFT;
        assert_eq!(
            actions_for(vec![key(Key::ArrowDown, true, shift)], shift),
            vec![KeyAction::StepOrigin { axis: 3, delta: -1.0 }]
        );
    }

    #[test]
    fn test_shift_letters_shift_percentiles() {
        let shift = egui::Modifiers::SHIFT;
        let events = vec![key(Key::A, true, shift), key(Key::W, true, shift)];
        assert_eq!(
            actions_for(events, shift),
            vec![
                KeyAction::Quantile { stop: false, increment: -5.0 },
                KeyAction::Quantile { stop: true, increment: 1.0 },
            ]
        );
        let none = egui::Modifiers::NONE;
        assert!(actions_for(vec![key(Key::A, true, none)], none).is_empty());
    }
}
