// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2025 Takashi Sakamoto

//! Protocol implementation for Texas Instruments LM48100Q, boomer audio power amplifier with
//! two inputs.
//!
//! The amplifier has five registers of 5 bit width. The registers are initialized to zero at
//! attach, then the mode, volume, and input switch are controlled by write-through cache.

use {super::*, crate::regcache::*, tracing::debug};

/// One segment of the gain curve. The units of gain are 0.01 dB.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VolumeDbSegment {
    pub min_val: u32,
    pub max_val: u32,
    pub min_db: i32,
    pub step_db: u32,
}

pub const MODE_CONTROL: u32 = 0x00;
pub const DIAGNOSTIC_CONTROL: u32 = 0x01;
pub const FAULT_DETECTION_CONTROL: u32 = 0x02;
pub const VOLUME_1_CONTROL: u32 = 0x03;
pub const VOLUME_2_CONTROL: u32 = 0x04;
pub const MAX_REGISTER: u32 = 0x04;

pub const VALUE_BITS: u32 = 5;

pub const POWER_ON: u32 = 0x10;
pub const INPUT_1: u32 = 0x04;
pub const INPUT_2: u32 = 0x08;

pub const DEFAULTS: [(u32, u32); 5] = [
    (MODE_CONTROL, 0x00),
    (DIAGNOSTIC_CONTROL, 0x00),
    (FAULT_DETECTION_CONTROL, 0x00),
    (VOLUME_1_CONTROL, 0x00),
    (VOLUME_2_CONTROL, 0x00),
];

pub const CHANNEL_COUNT: usize = 2;

pub const VOLUME_MIN: u32 = 0;
pub const VOLUME_MAX: u32 = 31;
pub const VOLUME_STEP: u32 = 1;

pub const VOLUME_DB_SEGMENTS: [VolumeDbSegment; 6] = [
    VolumeDbSegment {
        min_val: 0,
        max_val: 0,
        min_db: -8000,
        step_db: 0,
    },
    VolumeDbSegment {
        min_val: 1,
        max_val: 1,
        min_db: -5400,
        step_db: 0,
    },
    VolumeDbSegment {
        min_val: 2,
        max_val: 2,
        min_db: -4050,
        step_db: 0,
    },
    VolumeDbSegment {
        min_val: 3,
        max_val: 3,
        min_db: -3450,
        step_db: 0,
    },
    VolumeDbSegment {
        min_val: 4,
        max_val: 9,
        min_db: -3000,
        step_db: 300,
    },
    VolumeDbSegment {
        min_val: 10,
        max_val: 31,
        min_db: -1350,
        step_db: 150,
    },
];

const VOLUME_REGISTERS: [u32; 2] = [VOLUME_1_CONTROL, VOLUME_2_CONTROL];
const INPUT_MASKS: [u32; 2] = [INPUT_1, INPUT_2];

/// Convert the volume value to gain in 0.01 dB.
pub fn volume_to_db(vol: u32) -> Option<i32> {
    VOLUME_DB_SEGMENTS
        .iter()
        .find(|seg| vol >= seg.min_val && vol <= seg.max_val)
        .map(|seg| seg.min_db + ((vol - seg.min_val) * seg.step_db) as i32)
}

/// The protocol implementation for LM48100Q.
#[derive(Debug)]
pub struct Lm48100q<T: RegisterIo> {
    cache: RegisterCache<T>,
}

impl<T: RegisterIo> Lm48100q<T> {
    pub fn new(io: T) -> Self {
        Self {
            cache: RegisterCache::new(io, MAX_REGISTER, VALUE_BITS),
        }
    }

    pub fn cache(&self) -> &RegisterCache<T> {
        &self.cache
    }

    /// Write default values to all of registers.
    pub fn apply_defaults(&self) -> Result<(), Error> {
        self.cache.apply_defaults(&DEFAULTS)
    }

    /// Turn on the amplifier before the output is powered.
    pub fn power_up(&self) -> Result<(), Error> {
        debug!("power up");
        self.cache.update_bits(MODE_CONTROL, POWER_ON, POWER_ON)
    }

    /// Turn off the amplifier after the output is powered down.
    pub fn power_down(&self) -> Result<(), Error> {
        debug!("power down");
        self.cache.update_bits(MODE_CONTROL, POWER_ON, 0)
    }

    pub fn is_powered(&self) -> Result<bool, Error> {
        self.cache.read(MODE_CONTROL).map(|val| val & POWER_ON > 0)
    }

    pub fn get_volumes(&self, vols: &mut [u32]) -> Result<(), Error> {
        vols.iter_mut()
            .zip(VOLUME_REGISTERS.iter())
            .try_for_each(|(vol, &addr)| self.cache.read(addr).map(|val| *vol = val))
    }

    pub fn set_volumes(&self, vols: &[u32]) -> Result<(), Error> {
        if let Some(&vol) = vols.iter().find(|&&vol| vol > VOLUME_MAX) {
            let msg = format!("Volume {} is out of range up to {}", vol, VOLUME_MAX);
            return Err(Error::new(DeviceCtlError::InvalidConfiguration, &msg));
        }

        vols.iter()
            .zip(VOLUME_REGISTERS.iter())
            .try_for_each(|(&vol, &addr)| {
                self.cache.update_bits(addr, (1 << VALUE_BITS) - 1, vol)
            })
    }

    pub fn get_input_switches(&self, switches: &mut [bool]) -> Result<(), Error> {
        let val = self.cache.read(MODE_CONTROL)?;
        switches
            .iter_mut()
            .zip(INPUT_MASKS.iter())
            .for_each(|(switch, &mask)| *switch = val & mask > 0);
        Ok(())
    }

    pub fn set_input_switches(&self, switches: &[bool]) -> Result<(), Error> {
        let (mask, val) = switches.iter().zip(INPUT_MASKS.iter()).fold(
            (0, 0),
            |(mask, val), (&switch, &bit)| (mask | bit, if switch { val | bit } else { val }),
        );
        self.cache.update_bits(MODE_CONTROL, mask, val)
    }
}
