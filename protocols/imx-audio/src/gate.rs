// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2025 Takashi Sakamoto

//! Protocol about reference counting of codec clock over PCM substreams.
//!
//! The clock is enabled when the first substream starts, and disabled when the last substream
//! stops. The set of active substreams is kept as bitmask.

use {
    super::*,
    std::sync::Mutex,
    tracing::{debug, debug_span},
};

#[derive(Debug)]
struct GateState<C: ClockResource> {
    mask: u32,
    clock: C,
}

/// The gate of clock shared by playback and capture substreams.
#[derive(Debug)]
pub struct StreamClockGate<C: ClockResource> {
    state: Mutex<GateState<C>>,
}

impl<C: ClockResource> StreamClockGate<C> {
    pub fn new(clock: C) -> Self {
        Self {
            state: Mutex::new(GateState { mask: 0, clock }),
        }
    }

    /// Mark the stream as active. The clock is enabled at transition from no active stream.
    /// When enabling fails, the set of active streams is kept as is.
    pub fn on_stream_start(&self, stream: StreamId) -> Result<(), Error> {
        let mut state = acquire(self.state.lock(), "stream clock gate")?;
        let _enter = debug_span!("gate", %stream, mask = state.mask).entered();

        let mask = stream.mask();
        if state.mask & mask > 0 {
            return Ok(());
        }

        if state.mask == 0 {
            state.clock.prepare_enable()?;
            debug!("clock enabled");
        }

        state.mask |= mask;

        Ok(())
    }

    /// Mark the stream as inactive. The clock is disabled at transition to no active stream.
    pub fn on_stream_stop(&self, stream: StreamId) -> Result<(), Error> {
        let mut state = acquire(self.state.lock(), "stream clock gate")?;
        let _enter = debug_span!("gate", %stream, mask = state.mask).entered();

        let mask = stream.mask();
        if state.mask & mask == 0 {
            return Ok(());
        }

        state.mask &= !mask;

        if state.mask == 0 {
            state.clock.disable_unprepare();
            debug!("clock disabled");
        }

        Ok(())
    }

    pub fn is_enabled(&self) -> Result<bool, Error> {
        acquire(self.state.lock(), "stream clock gate").map(|state| state.mask > 0)
    }

    pub fn is_active(&self, stream: StreamId) -> Result<bool, Error> {
        acquire(self.state.lock(), "stream clock gate").map(|state| state.mask & stream.mask() > 0)
    }

    /// Disable the clock regardless of the active streams.
    pub fn shutdown(&self) -> Result<(), Error> {
        let mut state = acquire(self.state.lock(), "stream clock gate")?;
        if state.mask > 0 {
            state.mask = 0;
            state.clock.disable_unprepare();
            debug!("clock disabled at shutdown");
        }
        Ok(())
    }

    /// Operate the clock with the lock held, for rate configuration prior to enabling.
    pub fn with_clock<F, T>(&self, cb: F) -> Result<T, Error>
    where
        F: FnOnce(&mut C) -> Result<T, Error>,
    {
        let mut state = acquire(self.state.lock(), "stream clock gate")?;
        cb(&mut state.clock)
    }
}
