//! Live-tuning overlay.
//!
//! A vertical list of sliders and choice lists, driven from the keyboard:
//!
//! | Key | Action |
//! |---|---|
//! | Tab / Shift+Tab | next / previous control |
//! | `]` / `[` | step up / down (Shift: ten steps) |
//! | R | reset every control |
//!
//! The panel is drawn as flat rectangles over the finished frame. Labels and
//! values go to the window title through [`Overlay::status_line`].

use glam::{Vec2, Vec4};
use winit::keyboard::KeyCode;

use crate::device::ProgramId;
use crate::input::Input;
use crate::render_graph::DrawItem;

const PANEL_ORIGIN: Vec2 = Vec2::new(12.0, 12.0);
const PANEL_WIDTH: f32 = 280.0;
const ROW_HEIGHT: f32 = 24.0;
const TRACK_INSET: f32 = 10.0;
const TRACK_HEIGHT: f32 = 12.0;

const PANEL_COLOR: Vec4 = Vec4::new(0.08, 0.08, 0.1, 0.75);
const TRACK_COLOR: Vec4 = Vec4::new(0.25, 0.25, 0.3, 0.9);
const FILL_COLOR: Vec4 = Vec4::new(0.35, 0.6, 0.95, 0.95);
const SELECTED_FILL_COLOR: Vec4 = Vec4::new(0.95, 0.75, 0.3, 1.0);
const HIGHLIGHT_COLOR: Vec4 = Vec4::new(1.0, 1.0, 1.0, 0.12);

/// Handle to a control, in insertion order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ControlId(usize);

#[derive(Clone, Debug, PartialEq)]
pub enum ControlKind {
    Slider {
        min: f32,
        max: f32,
        step: f32,
        /// Values are whole numbers.
        integer: bool,
    },
    /// One of several named options; the value is the option index.
    Choice { options: &'static [&'static str] },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Control {
    pub label: &'static str,
    pub kind: ControlKind,
    value: f32,
    default: f32,
}

impl Control {
    pub fn value(&self) -> f32 {
        self.value
    }

    fn range(&self) -> (f32, f32) {
        match &self.kind {
            ControlKind::Slider { min, max, .. } => (*min, *max),
            ControlKind::Choice { options } => (0.0, options.len().saturating_sub(1) as f32),
        }
    }

    fn accepts(&self, value: f32) -> bool {
        let (min, max) = self.range();
        let whole = match self.kind {
            ControlKind::Slider { integer, .. } => !integer || value.fract() == 0.0,
            ControlKind::Choice { .. } => value.fract() == 0.0,
        };
        value.is_finite() && whole && (min..=max).contains(&value)
    }

    /// Position of the value along its range, in `[0, 1]`.
    fn fraction(&self) -> f32 {
        let (min, max) = self.range();
        match &self.kind {
            ControlKind::Choice { options } => (self.value + 1.0) / options.len().max(1) as f32,
            ControlKind::Slider { .. } if max > min => (self.value - min) / (max - min),
            ControlKind::Slider { .. } => 1.0,
        }
    }

    fn step(&mut self, steps: i32) {
        match &self.kind {
            ControlKind::Slider { min, max, step, .. } => {
                self.value = (self.value + *step * steps as f32).clamp(*min, *max);
            }
            ControlKind::Choice { options } => {
                let n = options.len() as i32;
                if n > 0 {
                    self.value = (self.value as i32 + steps).rem_euclid(n) as f32;
                }
            }
        }
    }

    fn display(&self) -> String {
        match &self.kind {
            ControlKind::Slider { integer: true, .. } => format!("{}", self.value as i32),
            ControlKind::Slider { .. } => format!("{:.3}", self.value),
            ControlKind::Choice { options } => options
                .get(self.value as usize)
                .copied()
                .unwrap_or("?")
                .to_string(),
        }
    }
}

/// An axis-aligned rectangle in window pixels, origin top-left.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    fn as_vec4(&self) -> Vec4 {
        Vec4::new(self.x, self.y, self.w, self.h)
    }
}

#[derive(Debug, Default)]
pub struct Overlay {
    controls: Vec<Control>,
    selected: usize,
    visible: bool,
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// A continuous slider stepping in hundredths of its range.
    pub fn add_slider(
        &mut self,
        label: &'static str,
        min: f32,
        max: f32,
        default: f32,
    ) -> ControlId {
        let kind = ControlKind::Slider {
            min,
            max,
            step: (max - min) / 100.0,
            integer: false,
        };
        self.push(label, kind, default)
    }

    pub fn add_int_slider(
        &mut self,
        label: &'static str,
        min: i32,
        max: i32,
        default: i32,
    ) -> ControlId {
        let kind = ControlKind::Slider {
            min: min as f32,
            max: max as f32,
            step: 1.0,
            integer: true,
        };
        self.push(label, kind, default as f32)
    }

    pub fn add_choice(
        &mut self,
        label: &'static str,
        options: &'static [&'static str],
        default: usize,
    ) -> ControlId {
        self.push(label, ControlKind::Choice { options }, default as f32)
    }

    fn push(&mut self, label: &'static str, kind: ControlKind, default: f32) -> ControlId {
        self.controls.push(Control {
            label,
            kind,
            value: default,
            default,
        });
        ControlId(self.controls.len() - 1)
    }

    pub fn control(&self, id: ControlId) -> Option<&Control> {
        self.controls.get(id.0)
    }

    pub fn get(&self, id: ControlId) -> f32 {
        self.controls.get(id.0).map_or(0.0, |c| c.value)
    }

    pub fn get_int(&self, id: ControlId) -> i32 {
        self.get(id).round() as i32
    }

    /// Sets a control's value. Values outside its range, fractional values
    /// on whole-number controls and unknown ids are ignored.
    pub fn set(&mut self, id: ControlId, value: f32) -> bool {
        match self.controls.get_mut(id.0) {
            Some(control) if control.accepts(value) => {
                control.value = value;
                true
            }
            _ => {
                log::trace!("overlay ignored value {value} for control {id:?}");
                false
            }
        }
    }

    pub fn reset(&mut self) {
        for control in &mut self.controls {
            control.value = control.default;
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
    }

    pub fn selected(&self) -> Option<ControlId> {
        (!self.controls.is_empty()).then_some(ControlId(self.selected))
    }

    /// Applies this frame's overlay keys. Returns true when a value changed.
    ///
    /// Does nothing while hidden.
    pub fn handle_input(&mut self, input: &Input) -> bool {
        if !self.visible || self.controls.is_empty() {
            return false;
        }
        let n = self.controls.len();
        if input.key_pressed(KeyCode::Tab) {
            self.selected = if input.shift_down() {
                (self.selected + n - 1) % n
            } else {
                (self.selected + 1) % n
            };
        }

        let scale = if input.shift_down() { 10 } else { 1 };
        let mut steps = 0;
        if input.key_pressed(KeyCode::BracketRight) {
            steps += scale;
        }
        if input.key_pressed(KeyCode::BracketLeft) {
            steps -= scale;
        }

        let mut changed = false;
        if steps != 0 {
            let control = &mut self.controls[self.selected];
            let before = control.value;
            control.step(steps);
            changed = control.value != before;
        }
        if input.key_pressed(KeyCode::KeyR) {
            let before: Vec<f32> = self.controls.iter().map(|c| c.value).collect();
            self.reset();
            changed |= self.controls.iter().zip(before).any(|(c, v)| c.value != v);
        }
        changed
    }

    /// `"label: value"` for the selected control.
    pub fn status_line(&self) -> String {
        match self.controls.get(self.selected) {
            Some(control) => format!("{}: {}", control.label, control.display()),
            None => String::new(),
        }
    }

    /// Panel, highlight, tracks and fills, back to front.
    pub fn layout(&self) -> Vec<(Rect, Vec4)> {
        let mut rects = Vec::with_capacity(2 + self.controls.len() * 2);
        let height = ROW_HEIGHT * self.controls.len() as f32 + TRACK_INSET;
        rects.push((
            Rect::new(PANEL_ORIGIN.x, PANEL_ORIGIN.y, PANEL_WIDTH, height),
            PANEL_COLOR,
        ));

        let track_width = PANEL_WIDTH - 2.0 * TRACK_INSET;
        for (i, control) in self.controls.iter().enumerate() {
            let row_y = PANEL_ORIGIN.y + TRACK_INSET * 0.5 + ROW_HEIGHT * i as f32;
            let selected = i == self.selected;
            if selected {
                rects.push((
                    Rect::new(PANEL_ORIGIN.x + 2.0, row_y, PANEL_WIDTH - 4.0, ROW_HEIGHT),
                    HIGHLIGHT_COLOR,
                ));
            }
            let track_y = row_y + (ROW_HEIGHT - TRACK_HEIGHT) * 0.5;
            let track_x = PANEL_ORIGIN.x + TRACK_INSET;
            rects.push((
                Rect::new(track_x, track_y, track_width, TRACK_HEIGHT),
                TRACK_COLOR,
            ));
            let fill = control.fraction().clamp(0.0, 1.0) * track_width;
            rects.push((
                Rect::new(track_x, track_y, fill, TRACK_HEIGHT),
                if selected { SELECTED_FILL_COLOR } else { FILL_COLOR },
            ));
        }
        rects
    }

    /// One full-screen draw per rectangle through the `overlay` program.
    pub fn draw_items(&self, program: ProgramId, viewport: (u32, u32)) -> Vec<DrawItem> {
        if !self.visible {
            return Vec::new();
        }
        let viewport = Vec2::new(viewport.0 as f32, viewport.1 as f32);
        self.layout()
            .into_iter()
            .map(|(rect, color)| {
                DrawItem::full_screen(program)
                    .uniform("rect", rect.as_vec4())
                    .uniform("color", color)
                    .uniform("viewport", viewport)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::event::ElementState;

    const EFFECTS: &[&str] = &["None", "Sepia", "Blur"];

    fn overlay() -> (Overlay, ControlId, ControlId, ControlId) {
        let mut overlay = Overlay::new();
        let fov = overlay.add_slider("fov", 1.0, 180.0, 45.0);
        let size = overlay.add_int_slider("filter size", 1, 12, 1);
        let effect = overlay.add_choice("effect", EFFECTS, 0);
        overlay.toggle();
        (overlay, fov, size, effect)
    }

    fn press(keys: &[KeyCode]) -> Input {
        let mut input = Input::new();
        for key in keys {
            input.key_event(*key, ElementState::Pressed);
        }
        input
    }

    #[test]
    fn out_of_range_set_is_ignored() {
        let (mut overlay, fov, size, effect) = overlay();
        assert!(!overlay.set(fov, 0.5));
        assert!(!overlay.set(fov, 180.5));
        assert!(!overlay.set(fov, f32::NAN));
        assert!(!overlay.set(size, 13.0));
        assert!(!overlay.set(size, 2.5));
        assert!(!overlay.set(effect, 3.0));
        assert_eq!(overlay.get(fov), 45.0);
        assert_eq!(overlay.get_int(size), 1);

        assert!(overlay.set(fov, 180.0));
        assert!(overlay.set(effect, 2.0));
        assert_eq!(overlay.get(fov), 180.0);
    }

    #[test]
    fn tab_cycles_selection() {
        let (mut overlay, fov, size, effect) = overlay();
        assert_eq!(overlay.selected(), Some(fov));
        overlay.handle_input(&press(&[KeyCode::Tab]));
        assert_eq!(overlay.selected(), Some(size));
        overlay.handle_input(&press(&[KeyCode::ShiftLeft, KeyCode::Tab]));
        assert_eq!(overlay.selected(), Some(fov));
        overlay.handle_input(&press(&[KeyCode::ShiftLeft, KeyCode::Tab]));
        assert_eq!(overlay.selected(), Some(effect));
    }

    #[test]
    fn brackets_step_and_stop_at_limits() {
        let (mut overlay, _, size, _) = overlay();
        overlay.handle_input(&press(&[KeyCode::Tab]));

        assert!(overlay.handle_input(&press(&[KeyCode::BracketRight])));
        assert_eq!(overlay.get_int(size), 2);
        assert!(overlay.handle_input(&press(&[KeyCode::ShiftLeft, KeyCode::BracketRight])));
        assert_eq!(overlay.get_int(size), 12);
        assert!(!overlay.handle_input(&press(&[KeyCode::BracketRight])));
    }

    #[test]
    fn choice_wraps() {
        let (mut overlay, _, _, effect) = overlay();
        overlay.handle_input(&press(&[KeyCode::ShiftLeft, KeyCode::Tab]));
        overlay.handle_input(&press(&[KeyCode::BracketLeft]));
        assert_eq!(overlay.get_int(effect), 2);
        assert_eq!(overlay.status_line(), "effect: Blur");
    }

    #[test]
    fn reset_restores_defaults() {
        let (mut overlay, fov, size, _) = overlay();
        overlay.set(fov, 90.0);
        overlay.set(size, 7.0);
        assert!(overlay.handle_input(&press(&[KeyCode::KeyR])));
        assert_eq!(overlay.get(fov), 45.0);
        assert_eq!(overlay.get_int(size), 1);
    }

    #[test]
    fn hidden_overlay_ignores_keys_and_draws_nothing() {
        let (mut overlay, fov, _, _) = overlay();
        overlay.toggle();
        overlay.set(fov, 90.0);
        assert!(!overlay.handle_input(&press(&[KeyCode::KeyR])));
        assert_eq!(overlay.get(fov), 90.0);
        assert!(overlay.draw_items(ProgramId::default(), (1280, 720)).is_empty());
    }

    #[test]
    fn layout_has_panel_highlight_and_two_bars_per_control() {
        let (overlay, _, _, _) = overlay();
        let rects = overlay.layout();
        assert_eq!(rects.len(), 2 + 3 * 2);
        assert_eq!(rects[0].1, PANEL_COLOR);
        assert_eq!(rects[1].1, HIGHLIGHT_COLOR);

        let items = overlay.draw_items(ProgramId::default(), (1280, 720));
        assert_eq!(items.len(), rects.len());
        assert!(items.iter().all(|i| i.uniforms.get("viewport").is_some()));
    }
}
