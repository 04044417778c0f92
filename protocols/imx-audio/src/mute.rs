// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2025 Takashi Sakamoto

//! Coordination of DAC mute between user request and output power state.
//!
//! The DAC is muted when either the user requests it or the output is powered down. The
//! effective state is mirrored to the GPIO line after any change.

use {super::*, std::sync::Mutex, tracing::debug};

#[derive(Debug)]
struct MuteState<G: GpioOutput> {
    user_mute: bool,
    hardware_disabled: bool,
    effective: bool,
    gpio: Option<G>,
}

impl<G: GpioOutput> MuteState<G> {
    fn mirror(&mut self) {
        self.effective = self.user_mute || self.hardware_disabled;
        if let Some(gpio) = &mut self.gpio {
            gpio.set(self.effective);
        }
        debug!(
            user_mute = self.user_mute,
            hardware_disabled = self.hardware_disabled,
            effective = self.effective
        );
    }
}

/// The coordinator of DAC mute.
#[derive(Debug)]
pub struct MuteCoordinator<G: GpioOutput> {
    state: Mutex<MuteState<G>>,
}

impl<G: GpioOutput> MuteCoordinator<G> {
    /// The line is driven to muted at first, and the output is regarded as powered down until
    /// the first power event.
    pub fn new(mut gpio: Option<G>) -> Self {
        if let Some(gpio) = &mut gpio {
            gpio.set(true);
        }
        Self {
            state: Mutex::new(MuteState {
                user_mute: false,
                hardware_disabled: true,
                effective: true,
                gpio,
            }),
        }
    }

    pub fn has_gpio(&self) -> Result<bool, Error> {
        acquire(self.state.lock(), "mute state").map(|state| state.gpio.is_some())
    }

    pub fn set_user_mute(&self, mute: bool) -> Result<(), Error> {
        let mut state = acquire(self.state.lock(), "mute state")?;
        state.user_mute = mute;
        state.mirror();
        Ok(())
    }

    /// Return the last request by user, regardless of the output power state.
    pub fn get_user_mute(&self) -> Result<bool, Error> {
        acquire(self.state.lock(), "mute state").map(|state| state.user_mute)
    }

    /// Apply the power state of output. Powered down means hardware-disabled.
    pub fn on_hardware_event(&self, disabled: bool) -> Result<(), Error> {
        let mut state = acquire(self.state.lock(), "mute state")?;
        state.hardware_disabled = disabled;
        state.mirror();
        Ok(())
    }

    pub fn effective_mute(&self) -> Result<bool, Error> {
        acquire(self.state.lock(), "mute state").map(|state| state.effective)
    }

    /// Drive the line to muted regardless of the state.
    pub fn force_mute(&self) -> Result<(), Error> {
        let mut state = acquire(self.state.lock(), "mute state")?;
        state.hardware_disabled = true;
        state.mirror();
        Ok(())
    }

    /// Operate the line with the lock held.
    pub fn with_gpio<F, T>(&self, cb: F) -> Result<Option<T>, Error>
    where
        F: FnOnce(&G) -> T,
    {
        acquire(self.state.lock(), "mute state").map(|state| state.gpio.as_ref().map(cb))
    }
}
