// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2025 Takashi Sakamoto

#![doc = include_str!("../README.md")]

//! ## Relationship of components
//!
//! The clock negotiation flows from the sampling rate requested by stream to the codec clocks.
//! The control surface of amplifier and DAC mute is independent of the flow.
//!
//! ```text
//!  sampling rate
//!       |
//!       v
//! +--------------+  SCK x 8   +-----------+           +-------------+
//! | clock factor | ---------> |    PLL    |  enable   | stream      |
//! |   search     |            | (program) | <-------  | clock gate  | <--- start/free
//! +--------------+            +-----------+           +-------------+
//!
//! +--------------+            +-----------+
//! |   register   | <--------- | LM48100Q  |           +-------------+
//! |    cache     |  defaults  | amplifier |           |    mute     | ---> GPIO
//! +--------------+            +-----------+           | coordinator | <--- output power event
//!                                                     +-------------+
//! ```

pub mod divider;
pub mod factor;
pub mod gate;
pub mod lm48100q;
pub mod mute;
pub mod pcm1754;
pub mod regcache;

use {
    glib::{error::ErrorDomain, Error, Quark},
    std::sync::{LockResult, MutexGuard},
};

/// The error domain for operations in the crate.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DeviceCtlError {
    /// No divisor or multiplier satisfies the constraints of the rate.
    UnrepresentableRate,
    /// The register primitive reports failure of transaction.
    RegisterAccessFailure,
    /// The lock for the resource is not available.
    ResourceBusy,
    /// Malformed divisor table, missing clock handle, or out-of-range register.
    InvalidConfiguration,
    Invalid(i32),
}

impl std::fmt::Display for DeviceCtlError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let msg = match self {
            Self::UnrepresentableRate => "unrepresentable-rate",
            Self::RegisterAccessFailure => "register-access-failure",
            Self::ResourceBusy => "resource-busy",
            Self::InvalidConfiguration => "invalid-configuration",
            Self::Invalid(_) => "invalid",
        };

        write!(f, "DeviceCtlError::{}", msg)
    }
}

impl ErrorDomain for DeviceCtlError {
    fn domain() -> Quark {
        Quark::from_str("imx-audio-device-ctl-error-quark")
    }

    fn code(self) -> i32 {
        match self {
            Self::UnrepresentableRate => 0,
            Self::RegisterAccessFailure => 1,
            Self::ResourceBusy => 2,
            Self::InvalidConfiguration => 3,
            Self::Invalid(val) => val,
        }
    }

    fn from(code: i32) -> Option<Self> {
        let enumeration = match code {
            0 => Self::UnrepresentableRate,
            1 => Self::RegisterAccessFailure,
            2 => Self::ResourceBusy,
            3 => Self::InvalidConfiguration,
            _ => Self::Invalid(code),
        };
        Some(enumeration)
    }
}

/// The primitive to access a register word. The access to single word is atomic, and ordered
/// against the other accesses to the same address in the same context.
pub trait RegisterIo {
    fn read32(&self, addr: u32) -> Result<u32, Error>;
    fn write32(&self, addr: u32, val: u32) -> Result<(), Error>;
}

/// The clock handle provided by platform.
pub trait ClockResource {
    fn get_rate(&self) -> u64;
    /// Return the nearest rate which the clock can generate.
    fn round_rate(&self, rate: u64) -> u64;
    fn set_rate(&mut self, rate: u64) -> Result<(), Error>;
    fn prepare_enable(&mut self) -> Result<(), Error>;
    fn disable_unprepare(&mut self);
}

/// The line of general purpose output.
pub trait GpioOutput {
    fn set(&mut self, value: bool);
}

/// The direction of PCM substream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StreamId {
    Playback,
    Capture,
}

impl StreamId {
    fn mask(&self) -> u32 {
        match self {
            Self::Playback => 1 << 0,
            Self::Capture => 1 << 1,
        }
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Playback => write!(f, "playback"),
            Self::Capture => write!(f, "capture"),
        }
    }
}

fn read_register<T: RegisterIo>(io: &T, addr: u32) -> Result<u32, Error> {
    io.read32(addr).map_err(|e| {
        let msg = format!("Fail to read register 0x{:02x}: {}", addr, e);
        Error::new(DeviceCtlError::RegisterAccessFailure, &msg)
    })
}

fn write_register<T: RegisterIo>(io: &T, addr: u32, val: u32) -> Result<(), Error> {
    io.write32(addr, val).map_err(|e| {
        let msg = format!(
            "Fail to write 0x{:02x} to register 0x{:02x}: {}",
            val, addr, e
        );
        Error::new(DeviceCtlError::RegisterAccessFailure, &msg)
    })
}

fn acquire<'a, T>(
    res: LockResult<MutexGuard<'a, T>>,
    label: &str,
) -> Result<MutexGuard<'a, T>, Error> {
    res.map_err(|_| {
        let msg = format!("The lock for {} is poisoned", label);
        Error::new(DeviceCtlError::ResourceBusy, &msg)
    })
}

#[cfg(test)]
pub(crate) mod mock {
    use {
        super::*,
        glib::FileError,
        std::{collections::BTreeMap, sync::Mutex},
    };

    /// Registers backed by memory, which records the sequence of written addresses.
    #[derive(Default)]
    pub struct TestRegisters {
        pub words: Mutex<BTreeMap<u32, u32>>,
        pub writes: Mutex<Vec<u32>>,
        pub failing_addr: Option<u32>,
    }

    impl TestRegisters {
        pub fn with_word(addr: u32, val: u32) -> Self {
            let regs = Self::default();
            regs.words.lock().unwrap().insert(addr, val);
            regs
        }

        pub fn word(&self, addr: u32) -> u32 {
            *self.words.lock().unwrap().get(&addr).unwrap_or(&0)
        }
    }

    impl RegisterIo for TestRegisters {
        fn read32(&self, addr: u32) -> Result<u32, Error> {
            Ok(self.word(addr))
        }

        fn write32(&self, addr: u32, val: u32) -> Result<(), Error> {
            if self.failing_addr == Some(addr) {
                Err(Error::new(FileError::Io, "bus error"))
            } else {
                self.writes.lock().unwrap().push(addr);
                self.words.lock().unwrap().insert(addr, val);
                Ok(())
            }
        }
    }

    /// Clock which counts enable and disable operations.
    #[derive(Default, Debug)]
    pub struct TestClock {
        pub rate: u64,
        pub enabled: bool,
        pub enable_count: usize,
        pub disable_count: usize,
        pub fail_enable: bool,
        pub max_rate: Option<u64>,
        pub resolution: u64,
    }

    impl ClockResource for TestClock {
        fn get_rate(&self) -> u64 {
            self.rate
        }

        fn round_rate(&self, rate: u64) -> u64 {
            if self.resolution > 1 {
                rate - rate % self.resolution
            } else {
                rate
            }
        }

        fn set_rate(&mut self, rate: u64) -> Result<(), Error> {
            match self.max_rate {
                Some(max) if rate > max => Err(Error::new(FileError::Inval, "rate too high")),
                _ => {
                    self.rate = rate;
                    Ok(())
                }
            }
        }

        fn prepare_enable(&mut self) -> Result<(), Error> {
            if self.fail_enable {
                Err(Error::new(FileError::Io, "enable failed"))
            } else {
                assert!(!self.enabled, "clock is enabled twice");
                self.enabled = true;
                self.enable_count += 1;
                Ok(())
            }
        }

        fn disable_unprepare(&mut self) {
            assert!(self.enabled, "clock is disabled twice");
            self.enabled = false;
            self.disable_count += 1;
        }
    }

    /// GPIO line which records the history of levels.
    #[derive(Default, Debug)]
    pub struct TestGpio {
        pub history: Vec<bool>,
    }

    impl TestGpio {
        pub fn level(&self) -> Option<bool> {
            self.history.last().copied()
        }
    }

    impl GpioOutput for TestGpio {
        fn set(&mut self, value: bool) {
            self.history.push(value);
        }
    }
}
