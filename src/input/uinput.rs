//! Virtual keyboard/mouse injection via `/dev/uinput` (§4.7).
//!
//! Absolute and relative pointer movement live on separate uinput devices —
//! mixing ABS and REL axes on one device causes libinput to misclassify it,
//! breaking absolute positioning.

use input_linux::sys::input_event;
use input_linux::{
    AbsoluteAxis, AbsoluteEvent, AbsoluteInfo, AbsoluteInfoSetup, EventKind, EventTime, InputId,
    Key, KeyEvent, KeyState, RelativeAxis, RelativeEvent, SynchronizeEvent, UInputHandle,
};
use std::fs::{File, OpenOptions};
use tracing::debug;

use super::{InputEvent, InputSink};
use crate::error::{AppError, Result};

const ABS_MAX: i32 = 65535;

pub struct InputInjector {
    keyboard: UInputHandle<File>,
    mouse: UInputHandle<File>,
    rel_mouse: UInputHandle<File>,
    scroll_accum_x: f64,
    scroll_accum_y: f64,
}

impl InputInjector {
    pub fn new() -> Result<Self> {
        let keyboard = Self::create_keyboard()?;
        let mouse = Self::create_mouse()?;
        let rel_mouse = Self::create_rel_mouse()?;
        debug!("input injector initialized");
        Ok(Self {
            keyboard,
            mouse,
            rel_mouse,
            scroll_accum_x: 0.0,
            scroll_accum_y: 0.0,
        })
    }

    fn open_uinput() -> Result<File> {
        OpenOptions::new()
            .write(true)
            .open("/dev/uinput")
            .map_err(|e| AppError::PluginMissing(format!("/dev/uinput unavailable: {e}")))
    }

    fn create_keyboard() -> Result<UInputHandle<File>> {
        let file = Self::open_uinput()?;
        let handle = UInputHandle::new(file);
        to_plugin_err(handle.set_evbit(EventKind::Key))?;
        to_plugin_err(handle.set_evbit(EventKind::Synchronize))?;

        for code in 1..=248u16 {
            if let Ok(key) = Key::from_code(code) {
                to_plugin_err(handle.set_keybit(key))?;
            }
        }

        let id = InputId { bustype: 0x03, vendor: 0x1234, product: 0x5678, version: 1 };
        to_plugin_err(handle.create(&id, b"Selkies Virtual Keyboard\0", 0, &[]))?;
        Ok(handle)
    }

    fn create_mouse() -> Result<UInputHandle<File>> {
        let file = Self::open_uinput()?;
        let handle = UInputHandle::new(file);

        to_plugin_err(handle.set_evbit(EventKind::Key))?;
        to_plugin_err(handle.set_evbit(EventKind::Absolute))?;
        to_plugin_err(handle.set_evbit(EventKind::Relative))?;
        to_plugin_err(handle.set_evbit(EventKind::Synchronize))?;

        to_plugin_err(handle.set_keybit(Key::ButtonLeft))?;
        to_plugin_err(handle.set_keybit(Key::ButtonRight))?;
        to_plugin_err(handle.set_keybit(Key::ButtonMiddle))?;

        to_plugin_err(handle.set_absbit(AbsoluteAxis::X))?;
        to_plugin_err(handle.set_absbit(AbsoluteAxis::Y))?;

        to_plugin_err(handle.set_relbit(RelativeAxis::Wheel))?;
        to_plugin_err(handle.set_relbit(RelativeAxis::HorizontalWheel))?;
        to_plugin_err(handle.set_relbit(RelativeAxis::WheelHiRes))?;
        to_plugin_err(handle.set_relbit(RelativeAxis::HorizontalWheelHiRes))?;

        let abs_x = AbsoluteInfoSetup {
            axis: AbsoluteAxis::X,
            info: AbsoluteInfo { value: 0, minimum: 0, maximum: ABS_MAX, fuzz: 0, flat: 0, resolution: 0 },
        };
        let abs_y = AbsoluteInfoSetup {
            axis: AbsoluteAxis::Y,
            info: AbsoluteInfo { value: 0, minimum: 0, maximum: ABS_MAX, fuzz: 0, flat: 0, resolution: 0 },
        };

        let id = InputId { bustype: 0x03, vendor: 0x1234, product: 0x5679, version: 1 };
        to_plugin_err(handle.create(&id, b"Selkies Virtual Mouse\0", 0, &[abs_x, abs_y]))?;
        Ok(handle)
    }

    fn create_rel_mouse() -> Result<UInputHandle<File>> {
        let file = Self::open_uinput()?;
        let handle = UInputHandle::new(file);

        to_plugin_err(handle.set_evbit(EventKind::Key))?;
        to_plugin_err(handle.set_evbit(EventKind::Relative))?;
        to_plugin_err(handle.set_evbit(EventKind::Synchronize))?;

        to_plugin_err(handle.set_keybit(Key::ButtonLeft))?;
        to_plugin_err(handle.set_keybit(Key::ButtonRight))?;
        to_plugin_err(handle.set_keybit(Key::ButtonMiddle))?;

        to_plugin_err(handle.set_relbit(RelativeAxis::X))?;
        to_plugin_err(handle.set_relbit(RelativeAxis::Y))?;

        let id = InputId { bustype: 0x03, vendor: 0x1234, product: 0x567a, version: 1 };
        to_plugin_err(handle.create(&id, b"Selkies Virtual Relative Mouse\0", 0, &[]))?;
        Ok(handle)
    }

    fn normalize_to_abs(v: f64) -> i32 {
        (v.clamp(0.0, 1.0) * ABS_MAX as f64) as i32
    }

    fn map_button(button: u8) -> Result<Key> {
        match button {
            0 => Ok(Key::ButtonLeft),
            1 => Ok(Key::ButtonMiddle),
            2 => Ok(Key::ButtonRight),
            _ => Err(AppError::SignalingProtocol(format!("unknown mouse button: {button}"))),
        }
    }

    fn pixel_to_hires(pixels: f64) -> i32 {
        (pixels / 30.0 * 120.0) as i32
    }

    fn accumulate_scroll(accum: &mut f64, pixels_per_notch: f64) -> i32 {
        *accum += pixels_per_notch;
        let discrete = *accum as i32;
        if discrete != 0 {
            *accum -= discrete as f64;
        }
        discrete
    }

    fn inject_key(&mut self, code: u16, pressed: bool) -> Result<()> {
        let key = Key::from_code(code)
            .map_err(|_| AppError::SignalingProtocol(format!("invalid key code: {code}")))?;
        let time = EventTime::default();
        let events = [
            KeyEvent::new(time, key, KeyState::pressed(pressed)).into_event().into_raw(),
            SynchronizeEvent::report(time).into_event().into_raw(),
        ];
        to_plugin_err(self.keyboard.write(&events))?;
        Ok(())
    }

    fn inject_mouse_move_abs(&mut self, x: f64, y: f64) -> Result<()> {
        let (abs_x, abs_y) = (Self::normalize_to_abs(x), Self::normalize_to_abs(y));
        let time = EventTime::default();
        let events: [input_event; 3] = [
            AbsoluteEvent::new(time, AbsoluteAxis::X, abs_x).into_event().into_raw(),
            AbsoluteEvent::new(time, AbsoluteAxis::Y, abs_y).into_event().into_raw(),
            SynchronizeEvent::report(time).into_event().into_raw(),
        ];
        to_plugin_err(self.mouse.write(&events))?;
        Ok(())
    }

    fn inject_mouse_move_rel(&mut self, dx: f64, dy: f64) -> Result<()> {
        let (dx_i, dy_i) = (dx.round() as i32, dy.round() as i32);
        if dx_i == 0 && dy_i == 0 {
            return Ok(());
        }
        let time = EventTime::default();
        let mut events: Vec<input_event> = Vec::with_capacity(3);
        if dx_i != 0 {
            events.push(RelativeEvent::new(time, RelativeAxis::X, dx_i).into_event().into_raw());
        }
        if dy_i != 0 {
            events.push(RelativeEvent::new(time, RelativeAxis::Y, dy_i).into_event().into_raw());
        }
        events.push(SynchronizeEvent::report(time).into_event().into_raw());
        to_plugin_err(self.rel_mouse.write(&events))?;
        Ok(())
    }

    fn inject_button(&mut self, button: u8, pressed: bool) -> Result<()> {
        let key = Self::map_button(button)?;
        let time = EventTime::default();
        let events = [
            KeyEvent::new(time, key, KeyState::pressed(pressed)).into_event().into_raw(),
            SynchronizeEvent::report(time).into_event().into_raw(),
        ];
        to_plugin_err(self.mouse.write(&events))?;
        Ok(())
    }

    fn inject_scroll(&mut self, dx: f64, dy: f64) -> Result<()> {
        let time = EventTime::default();
        let mut events = Vec::with_capacity(5);

        if dy.abs() > 0.001 {
            let hires_value = Self::pixel_to_hires(-dy);
            if hires_value != 0 {
                events.push(RelativeEvent::new(time, RelativeAxis::WheelHiRes, hires_value).into_event().into_raw());
            }
            let discrete_y = Self::accumulate_scroll(&mut self.scroll_accum_y, -dy / 30.0);
            if discrete_y != 0 {
                events.push(RelativeEvent::new(time, RelativeAxis::Wheel, discrete_y).into_event().into_raw());
            }
        }

        if dx.abs() > 0.001 {
            let hires_value = Self::pixel_to_hires(dx);
            if hires_value != 0 {
                events.push(RelativeEvent::new(time, RelativeAxis::HorizontalWheelHiRes, hires_value).into_event().into_raw());
            }
            let discrete_x = Self::accumulate_scroll(&mut self.scroll_accum_x, dx / 30.0);
            if discrete_x != 0 {
                events.push(RelativeEvent::new(time, RelativeAxis::HorizontalWheel, discrete_x).into_event().into_raw());
            }
        }

        if !events.is_empty() {
            events.push(SynchronizeEvent::report(time).into_event().into_raw());
            to_plugin_err(self.mouse.write(&events))?;
        }
        Ok(())
    }
}

fn to_plugin_err<T>(r: std::io::Result<T>) -> Result<T> {
    r.map_err(|e| AppError::PluginMissing(format!("uinput write failed: {e}")))
}

impl InputSink for InputInjector {
    fn inject(&mut self, event: InputEvent) -> Result<()> {
        match event {
            InputEvent::Key { code, pressed } => self.inject_key(code, pressed),
            InputEvent::MouseMoveAbs { x, y } => self.inject_mouse_move_abs(x, y),
            InputEvent::MouseMoveRel { dx, dy } => self.inject_mouse_move_rel(dx, dy),
            InputEvent::MouseButton { button, pressed } => self.inject_button(button, pressed),
            InputEvent::Scroll { dx, dy } => self.inject_scroll(dx, dy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_to_abs_clamps_to_range() {
        assert_eq!(InputInjector::normalize_to_abs(0.0), 0);
        assert_eq!(InputInjector::normalize_to_abs(1.0), ABS_MAX);
        assert_eq!(InputInjector::normalize_to_abs(-5.0), 0);
        assert_eq!(InputInjector::normalize_to_abs(5.0), ABS_MAX);
    }

    #[test]
    fn map_button_covers_left_middle_right() {
        assert!(matches!(InputInjector::map_button(0), Ok(Key::ButtonLeft)));
        assert!(matches!(InputInjector::map_button(1), Ok(Key::ButtonMiddle)));
        assert!(matches!(InputInjector::map_button(2), Ok(Key::ButtonRight)));
        assert!(InputInjector::map_button(9).is_err());
    }

    #[test]
    fn scroll_accumulates_fractional_notches() {
        let mut accum = 0.0;
        assert_eq!(InputInjector::accumulate_scroll(&mut accum, 0.3), 0);
        assert_eq!(InputInjector::accumulate_scroll(&mut accum, 0.3), 0);
        assert_eq!(InputInjector::accumulate_scroll(&mut accum, 0.3), 0);
        assert_eq!(InputInjector::accumulate_scroll(&mut accum, 0.3), 1);
    }

    #[test]
    fn pixel_to_hires_scales_by_four() {
        assert_eq!(InputInjector::pixel_to_hires(30.0), 120);
        assert_eq!(InputInjector::pixel_to_hires(-30.0), -120);
    }
}
