// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2025 Takashi Sakamoto

//! Protocol about negotiation of master clock for the codec.
//!
//! The codec requires master clock (SCK) within 8 MHz and 16 MHz exclusively, which is
//! generated as multiple of the sampling rate. The multiplier is searched in ascending order.
//! The PLL of codec runs at 8 times of the master clock.

use {super::*, tracing::debug};

/// The parameters of master clock negotiated for a sampling rate.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct MasterClockParameters {
    pub sample_rate: u32,
    /// The multiplier of sampling rate.
    pub factor: u32,
    /// The frequency of master clock.
    pub sck_rate: u64,
    /// The target frequency of PLL.
    pub pll_rate: u64,
}

/// The protocol implementation of master clock negotiation.
#[derive(Default, Debug)]
pub struct ClockFactorSearch;

impl ClockFactorSearch {
    /// The candidates of multiplier, in ascending order.
    pub const SCK_FACTORS: [u32; 7] = [128, 192, 256, 384, 512, 768, 1152];

    /// The lower bound of master clock, exclusive.
    pub const SCK_MIN: u64 = 8_000_000;
    /// The upper bound of master clock, exclusive.
    pub const SCK_MAX: u64 = 16_000_000;

    /// The fixed ratio of PLL to master clock.
    pub const PLL_RATIO: u64 = 8;

    /// Find the first multiplier generating master clock within the window.
    pub fn select_master_clock(sample_rate: u32) -> Result<u32, Error> {
        Self::SCK_FACTORS
            .iter()
            .find(|&&factor| {
                let freq = sample_rate as u64 * factor as u64;
                freq > Self::SCK_MIN && freq < Self::SCK_MAX
            })
            .copied()
            .ok_or_else(|| {
                let msg = format!(
                    "No master clock is available for sampling rate {}",
                    sample_rate
                );
                Error::new(DeviceCtlError::UnrepresentableRate, &msg)
            })
    }

    pub fn derive_pll_target(sck_rate: u64) -> Result<u64, Error> {
        sck_rate.checked_mul(Self::PLL_RATIO).ok_or_else(|| {
            let msg = format!("PLL target overflows for master clock {}", sck_rate);
            Error::new(DeviceCtlError::UnrepresentableRate, &msg)
        })
    }

    /// Compute the whole parameters for the sampling rate.
    pub fn negotiate(sample_rate: u32) -> Result<MasterClockParameters, Error> {
        let factor = Self::select_master_clock(sample_rate)?;
        let sck_rate = sample_rate as u64 * factor as u64;
        let pll_rate = Self::derive_pll_target(sck_rate)?;
        Ok(MasterClockParameters {
            sample_rate,
            factor,
            sck_rate,
            pll_rate,
        })
    }

    /// Request the nearest rate to the PLL, then return the rate committed.
    pub fn program<C: ClockResource>(pll: &mut C, rate: u64) -> Result<u64, Error> {
        let rounded = pll.round_rate(rate);
        if rounded == 0 {
            let msg = format!("PLL can not generate rate {}", rate);
            return Err(Error::new(DeviceCtlError::UnrepresentableRate, &msg));
        }

        pll.set_rate(rounded).map_err(|e| {
            let msg = format!("PLL rejects rate {}: {}", rounded, e);
            Error::new(DeviceCtlError::UnrepresentableRate, &msg)
        })?;

        debug!(rate, rounded);

        Ok(rounded)
    }
}

#[cfg(test)]
mod test {
    use {super::*, crate::mock::*};

    #[test]
    fn master_clock_factor() {
        [
            (8000, 1152),
            (11025, 768),
            (16000, 512),
            (22050, 384),
            (32000, 256),
            (44100, 192),
            (48000, 192),
            (88200, 128),
            (96000, 128),
        ]
        .iter()
        .for_each(|&(rate, factor)| {
            assert_eq!(factor, ClockFactorSearch::select_master_clock(rate).unwrap());
        });
    }

    #[test]
    fn master_clock_window_is_exclusive() {
        // 62500 * 128 is just at the lower bound.
        assert_eq!(192, ClockFactorSearch::select_master_clock(62500).unwrap());

        // 125000 * 128 is just at the upper bound, and the others are larger.
        [125000, 192000, 6000, 0].iter().for_each(|&rate| {
            let err = ClockFactorSearch::select_master_clock(rate).unwrap_err();
            assert_eq!(
                Some(DeviceCtlError::UnrepresentableRate),
                err.kind::<DeviceCtlError>()
            );
        });
    }

    #[test]
    fn pll_ratio() {
        [0, 1, 8_467_200, 9_216_000, 15_999_999]
            .iter()
            .for_each(|&freq| {
                assert_eq!(freq * 8, ClockFactorSearch::derive_pll_target(freq).unwrap())
            });

        let params = ClockFactorSearch::negotiate(44100).unwrap();
        assert_eq!(
            MasterClockParameters {
                sample_rate: 44100,
                factor: 192,
                sck_rate: 8_467_200,
                pll_rate: 67_737_600,
            },
            params
        );
    }

    #[test]
    fn pll_target_overflow() {
        assert_eq!(
            u64::MAX / 8 * 8,
            ClockFactorSearch::derive_pll_target(u64::MAX / 8).unwrap()
        );

        [u64::MAX / 8 + 1, u64::MAX].iter().for_each(|&freq| {
            let err = ClockFactorSearch::derive_pll_target(freq).unwrap_err();
            assert_eq!(
                Some(DeviceCtlError::UnrepresentableRate),
                err.kind::<DeviceCtlError>()
            );
        });
    }

    #[test]
    fn program_rounds_then_sets() {
        let mut pll = TestClock {
            resolution: 1000,
            ..Default::default()
        };
        assert_eq!(67_737_000, ClockFactorSearch::program(&mut pll, 67_737_600).unwrap());
        assert_eq!(67_737_000, pll.get_rate());
    }

    #[test]
    fn program_rejected() {
        let mut pll = TestClock {
            rate: 73_728_000,
            max_rate: Some(70_000_000),
            ..Default::default()
        };
        let err = ClockFactorSearch::program(&mut pll, 73_728_000 + 1).unwrap_err();
        assert_eq!(
            Some(DeviceCtlError::UnrepresentableRate),
            err.kind::<DeviceCtlError>()
        );
        assert_eq!(73_728_000, pll.get_rate());

        let mut pll = TestClock {
            resolution: 1000,
            ..Default::default()
        };
        assert!(ClockFactorSearch::program(&mut pll, 999).is_err());
    }
}
