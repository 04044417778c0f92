// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2025 Takashi Sakamoto

//! Protocol implementation for the sound card with Texas Instruments PCM1754 on i.MX SoC.
//!
//! The codec clock is derived from the PLL which is programmed according to the sampling rate
//! of stream. The clock is shared by playback and capture streams. The DAC mute line is driven
//! by the coordination of user request and the power state of speaker output.

use {
    super::{factor::*, gate::*, mute::*, *},
    std::sync::Mutex,
    tracing::{debug, debug_span},
};

/// The configuration resolved from device tree.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct Pcm1754Config {
    /// Restrict the sample to 16 bits.
    pub limit_16bit_samples: bool,
}

/// The constraint of sample bits for substream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SampleBitsConstraint {
    pub min: u32,
    pub max: u32,
}

/// The machine which aggregates the clocks and the mute line.
#[derive(Debug)]
pub struct Pcm1754Card<C: ClockResource, G: GpioOutput> {
    config: Pcm1754Config,
    pll: Mutex<C>,
    gate: StreamClockGate<C>,
    mute: MuteCoordinator<G>,
}

impl<C: ClockResource, G: GpioOutput> Pcm1754Card<C, G> {
    pub fn new(config: Pcm1754Config, pll: C, codec_clk: C, dac_mute: Option<G>) -> Self {
        Self {
            config,
            pll: Mutex::new(pll),
            gate: StreamClockGate::new(codec_clk),
            mute: MuteCoordinator::new(dac_mute),
        }
    }

    pub fn config(&self) -> &Pcm1754Config {
        &self.config
    }

    pub fn gate(&self) -> &StreamClockGate<C> {
        &self.gate
    }

    pub fn mute(&self) -> &MuteCoordinator<G> {
        &self.mute
    }

    pub fn startup(&self, _: StreamId) -> Option<SampleBitsConstraint> {
        if self.config.limit_16bit_samples {
            Some(SampleBitsConstraint { min: 16, max: 16 })
        } else {
            None
        }
    }

    /// Program the PLL for the sampling rate, then enable the codec clock for the stream. The
    /// programmed rate of PLL is returned.
    pub fn hw_params(&self, stream: StreamId, rate: u32) -> Result<u64, Error> {
        let _enter = debug_span!("hw_params", %stream, rate).entered();

        let params = ClockFactorSearch::negotiate(rate)?;
        debug!(factor = params.factor, sck_rate = params.sck_rate);

        let pll_rate = {
            let mut pll = acquire(self.pll.lock(), "PLL")?;
            ClockFactorSearch::program(&mut *pll, params.pll_rate)?
        };

        self.gate.on_stream_start(stream)?;

        Ok(pll_rate)
    }

    pub fn hw_free(&self, stream: StreamId) -> Result<(), Error> {
        let _enter = debug_span!("hw_free", %stream).entered();
        self.gate.on_stream_stop(stream)
    }

    /// The power event of speaker output.
    pub fn output_power_event(&self, powered: bool) -> Result<(), Error> {
        debug!(powered, "output power event");
        self.mute.on_hardware_event(!powered)
    }

    pub fn pll_rate(&self) -> Result<u64, Error> {
        acquire(self.pll.lock(), "PLL").map(|pll| pll.get_rate())
    }

    /// Mute the DAC, then disable the codec clock.
    pub fn teardown(&self) -> Result<(), Error> {
        self.mute.force_mute()?;
        self.gate.shutdown()
    }
}
