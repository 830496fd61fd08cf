use std::time::Duration;
use uinput::device::Device;
use uinput::event::controller;
use uinput::event::relative;

use crate::types::{ClickEvent, ScrollDirection};

/// Ratón virtual (/dev/uinput) que materializa el puntero del anillo.
pub struct HidOutput {
    dev: Device,
}

impl HidOutput {
    pub fn new() -> Result<Self, uinput::Error> {
        let dev = uinput::default()?
            .name("anillo-pointer")?
            .event(uinput::event::Controller::Mouse(controller::Mouse::Left))?
            .event(uinput::event::Controller::Mouse(controller::Mouse::Right))?
            .event(uinput::event::Relative::Position(relative::Position::X))?
            .event(uinput::event::Relative::Position(relative::Position::Y))?
            .event(uinput::event::Relative::Wheel(relative::Wheel::Vertical))?
            .create()?;

        Ok(HidOutput { dev })
    }

    fn sync(&mut self) -> Result<(), uinput::Error> {
        self.dev.synchronize()
    }

    fn tap(&mut self, button: controller::Mouse) -> Result<(), uinput::Error> {
        self.dev.press(&controller::Controller::Mouse(button))?;
        self.sync()?;
        std::thread::sleep(Duration::from_millis(10));
        self.dev.release(&controller::Controller::Mouse(button))?;
        self.sync()
    }

    /// Mueve el cursor en relación a su posición actual (dx, dy en píxeles)
    pub fn move_cursor(&mut self, dx: i32, dy: i32) -> Result<(), uinput::Error> {
        if dx == 0 && dy == 0 {
            return Ok(());
        }
        self.dev.send(relative::Position::X, dx)?;
        self.dev.send(relative::Position::Y, dy)?;
        self.sync()
    }

    pub fn scroll(&mut self, direction: ScrollDirection) -> Result<(), uinput::Error> {
        let amount = match direction {
            ScrollDirection::Clockwise => -3,
            ScrollDirection::CounterClockwise => 3,
        };
        self.dev.send(relative::Wheel::Vertical, amount)?;
        self.sync()
    }

    pub fn send(&mut self, click: ClickEvent) -> Result<(), uinput::Error> {
        match click {
            ClickEvent::Left => self.tap(controller::Mouse::Left),
            ClickEvent::Right => self.tap(controller::Mouse::Right),
            ClickEvent::Scroll(direction) => self.scroll(direction),
        }
    }
}
