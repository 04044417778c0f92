// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2025 Takashi Sakamoto

//! Protocol about adjustable audio clock divider.
//!
//! The module includes the divider in audio clock tree of i.MX SoC. The divider has fixed
//! parent and can not gate. The divisor code is 2 bit, however the bits are not adjacent in the
//! register; the least significant bit is at bit 15 and the most significant bit is at bit 23.
//!
//! ```text
//! output rate = ceil(parent rate / divisor)
//! ```

use {
    super::*,
    std::sync::{Arc, Mutex},
    tracing::{debug, warn},
};

/// The pair of bit positions in register word for 2 bit code.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RegisterField {
    /// The position of bit 0 of code.
    pub low_pos: u32,
    /// The position of bit 1 of code.
    pub high_pos: u32,
}

/// The field of divisor code in audio clock divider register.
pub const AUDIO_DIVIDER_FIELD: RegisterField = RegisterField {
    low_pos: 15,
    high_pos: 23,
};

impl RegisterField {
    /// The number of bits in the code.
    pub const WIDTH: u32 = 2;

    const LOW_MASK: u32 = 0x01;
    const HIGH_MASK: u32 = 0x02;

    /// Put the code into the word. The other bits of the word are preserved.
    pub fn pack(&self, word: u32, code: u32) -> u32 {
        let mut val = word;

        if code & Self::LOW_MASK > 0 {
            val |= 1 << self.low_pos;
        } else {
            val &= !(1 << self.low_pos);
        }

        if code & Self::HIGH_MASK > 0 {
            val |= 1 << self.high_pos;
        } else {
            val &= !(1 << self.high_pos);
        }

        val
    }

    /// Take the code from the word.
    pub fn unpack(&self, word: u32) -> u32 {
        (((word >> self.high_pos) & 0x01) << 1) | ((word >> self.low_pos) & 0x01)
    }

    /// The mask of bits occupied by the field in register word.
    pub fn mask(&self) -> u32 {
        (1 << self.low_pos) | (1 << self.high_pos)
    }
}

/// The flags of divider resolved by platform.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct DividerFlags {
    /// The code is the divisor itself.
    pub one_based: bool,
    /// The divisor is the power of two for the code.
    pub power_of_two: bool,
    /// The divisor is programmed by the other party. No search is done.
    pub read_only: bool,
}

/// The entry of explicit table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DivTableEntry {
    pub code: u32,
    pub divisor: u32,
}

/// The rule to map divisor code to divisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DividerTable {
    /// divisor = code + 1.
    Default,
    /// divisor = code.
    OneBased,
    /// divisor = 2 ^ code.
    PowerOfTwo,
    /// Ordered pairs of code and divisor.
    Explicit(Vec<DivTableEntry>),
}

impl Default for DividerTable {
    fn default() -> Self {
        Self::Default
    }
}

impl DividerTable {
    /// Select the rule. The flags take precedence over the table.
    pub fn new(flags: &DividerFlags, table: Option<&[(u32, u32)]>) -> Result<Self, Error> {
        if flags.one_based && flags.power_of_two {
            let msg = "One-based and power-of-two encodings are exclusive";
            Err(Error::new(DeviceCtlError::InvalidConfiguration, msg))
        } else if flags.one_based {
            Ok(Self::OneBased)
        } else if flags.power_of_two {
            Ok(Self::PowerOfTwo)
        } else if let Some(entries) = table {
            Self::parse_explicit(entries)
        } else {
            Ok(Self::Default)
        }
    }

    fn parse_explicit(entries: &[(u32, u32)]) -> Result<Self, Error> {
        if entries.is_empty() {
            let msg = "Divisor table has no entry";
            return Err(Error::new(DeviceCtlError::InvalidConfiguration, msg));
        }

        let mut table: Vec<DivTableEntry> = Vec::with_capacity(entries.len());
        entries.iter().try_for_each(|&(code, divisor)| {
            if divisor == 0 {
                let msg = format!("Divisor table has zero divisor for code {}", code);
                Err(Error::new(DeviceCtlError::InvalidConfiguration, &msg))
            } else if table.iter().any(|entry| entry.code == code) {
                let msg = format!("Divisor table has duplicated code {}", code);
                Err(Error::new(DeviceCtlError::InvalidConfiguration, &msg))
            } else {
                table.push(DivTableEntry { code, divisor });
                Ok(())
            }
        })?;

        Ok(Self::Explicit(table))
    }

    /// Resolve the code to divisor. Zero means that the code has no mapping.
    pub fn divisor(&self, code: u32) -> u32 {
        match self {
            Self::Default => code + 1,
            Self::OneBased => code,
            Self::PowerOfTwo => 1u32.checked_shl(code).unwrap_or(0),
            Self::Explicit(table) => table
                .iter()
                .find(|entry| entry.code == code)
                .map(|entry| entry.divisor)
                .unwrap_or(0),
        }
    }

    /// Resolve the divisor to code, if available.
    pub fn code(&self, divisor: u32) -> Option<u32> {
        let code = match self {
            Self::Default => divisor.checked_sub(1),
            Self::OneBased => Some(divisor).filter(|&d| d > 0),
            Self::PowerOfTwo => {
                if divisor.is_power_of_two() {
                    Some(divisor.trailing_zeros())
                } else {
                    None
                }
            }
            Self::Explicit(table) => table
                .iter()
                .find(|entry| entry.divisor == divisor)
                .map(|entry| entry.code),
        };
        code.filter(|&code| code < 1 << RegisterField::WIDTH)
    }

    /// The pairs of code and non-zero divisor which the field can express.
    fn candidates(&self) -> Vec<(u32, u32)> {
        (0..(1u32 << RegisterField::WIDTH))
            .map(|code| (code, self.divisor(code)))
            .filter(|&(_, divisor)| divisor > 0)
            .collect()
    }
}

fn div_round_up(dividend: u64, divisor: u64) -> u64 {
    dividend / divisor + if dividend % divisor > 0 { 1 } else { 0 }
}

/// The audio clock divider with fixed parent.
#[derive(Debug)]
pub struct ClockDivider {
    addr: u32,
    field: RegisterField,
    table: DividerTable,
    read_only: bool,
    lock: Option<Arc<Mutex<()>>>,
}

impl ClockDivider {
    /// Instantiate the divider. The lock should be shared by all of dividers in the same
    /// register bank. Without the lock, the caller guarantees exclusive access to the bank.
    pub fn new(
        addr: u32,
        field: RegisterField,
        flags: DividerFlags,
        table: Option<&[(u32, u32)]>,
        lock: Option<Arc<Mutex<()>>>,
    ) -> Result<Self, Error> {
        if field.low_pos >= u32::BITS
            || field.high_pos >= u32::BITS
            || field.low_pos == field.high_pos
        {
            let msg = format!(
                "Invalid bit positions for divisor code: {}, {}",
                field.low_pos, field.high_pos
            );
            return Err(Error::new(DeviceCtlError::InvalidConfiguration, &msg));
        }

        let table = DividerTable::new(&flags, table)?;

        Ok(Self {
            addr,
            field,
            table,
            read_only: flags.read_only,
            lock,
        })
    }

    pub fn addr(&self) -> u32 {
        self.addr
    }

    pub fn table(&self) -> &DividerTable {
        &self.table
    }

    fn current_code<T: RegisterIo>(&self, io: &T) -> Result<u32, Error> {
        read_register(io, self.addr).map(|word| self.field.unpack(word))
    }

    /// Compute the output rate from the code currently programmed.
    pub fn recalc_rate<T: RegisterIo>(&self, io: &T, parent_rate: u64) -> Result<u64, Error> {
        let code = self.current_code(io)?;
        match self.table.divisor(code) {
            0 => {
                let msg = format!("No divisor is mapped to code {}", code);
                Err(Error::new(DeviceCtlError::InvalidConfiguration, &msg))
            }
            divisor => Ok(div_round_up(parent_rate, divisor as u64)),
        }
    }

    /// Find the largest achievable rate not above the target rate, or the smallest rate above
    /// it when every rate exceeds the target. The rate is returned with its code.
    pub fn round_rate<T: RegisterIo>(
        &self,
        io: &T,
        rate: u64,
        parent_rate: u64,
    ) -> Result<(u64, u32), Error> {
        if self.read_only {
            let code = self.current_code(io)?;
            match self.table.divisor(code) {
                0 => {
                    // The legacy bypass; the parent rate passes through.
                    warn!(addr = self.addr, code, "unmapped code in read-only divider");
                    Ok((parent_rate, code))
                }
                divisor => Ok((div_round_up(parent_rate, divisor as u64), code)),
            }
        } else {
            self.best_divisor(rate, parent_rate)
        }
    }

    // The largest rate not above the target wins. Without such rate, the smallest rate above
    // the target wins.
    fn best_divisor(&self, rate: u64, parent_rate: u64) -> Result<(u64, u32), Error> {
        let mut below: Option<(u64, u32)> = None;
        let mut above: Option<(u64, u32)> = None;

        self.table
            .candidates()
            .iter()
            .for_each(|&(code, divisor)| {
                let now = div_round_up(parent_rate, divisor as u64);
                if now == 0 {
                    return;
                }

                if now <= rate {
                    if below.map(|(best, _)| now > best).unwrap_or(true) {
                        below = Some((now, code));
                    }
                } else if above.map(|(best, _)| now < best).unwrap_or(true) {
                    above = Some((now, code));
                }
            });

        below.or(above).ok_or_else(|| {
            let msg = format!(
                "No divisor generates rate {} from parent rate {}",
                rate, parent_rate
            );
            Error::new(DeviceCtlError::UnrepresentableRate, &msg)
        })
    }

    /// Program the code for the target rate, then return the rate committed.
    pub fn set_rate<T: RegisterIo>(
        &self,
        io: &T,
        rate: u64,
        parent_rate: u64,
    ) -> Result<u64, Error> {
        if self.read_only {
            let msg = format!("Divider at 0x{:02x} is read-only", self.addr);
            return Err(Error::new(DeviceCtlError::InvalidConfiguration, &msg));
        }

        let (committed, code) = self.best_divisor(rate, parent_rate)?;

        let guard = match &self.lock {
            Some(lock) => Some(acquire(lock.lock(), "register bank")?),
            None => None,
        };

        let word = read_register(io, self.addr)?;
        let val = self.field.pack(word, code);
        write_register(io, self.addr, val)?;

        drop(guard);

        debug!(
            addr = self.addr,
            code,
            divisor = self.table.divisor(code),
            rate,
            committed,
        );

        Ok(committed)
    }
}

#[cfg(test)]
mod test {
    use {super::*, super::super::mock::*, std::thread};

    const ADDR: u32 = 0x30;

    fn divider(flags: DividerFlags, table: Option<&[(u32, u32)]>) -> ClockDivider {
        ClockDivider::new(ADDR, AUDIO_DIVIDER_FIELD, flags, table, None).unwrap()
    }

    #[test]
    fn field_pack_unpack() {
        [0x00000000, 0xffffffff, 0x12345678, 0x00808000, 0xff7f7fff]
            .iter()
            .for_each(|&word| {
                (0..4).for_each(|code| {
                    let val = AUDIO_DIVIDER_FIELD.pack(word, code);
                    assert_eq!(code, AUDIO_DIVIDER_FIELD.unpack(val));
                    let mask = AUDIO_DIVIDER_FIELD.mask();
                    assert_eq!(word & !mask, val & !mask);
                });
            });
    }

    #[test]
    fn field_positions() {
        assert_eq!(0, AUDIO_DIVIDER_FIELD.unpack(0x00000000));
        assert_eq!(1, AUDIO_DIVIDER_FIELD.unpack(0x00008000));
        assert_eq!(2, AUDIO_DIVIDER_FIELD.unpack(0x00800000));
        assert_eq!(3, AUDIO_DIVIDER_FIELD.unpack(0x00808000));
        assert_eq!(0x00808000, AUDIO_DIVIDER_FIELD.mask());
        assert_eq!(0x12b4d678, AUDIO_DIVIDER_FIELD.pack(0x12345678, 3));
    }

    #[test]
    fn table_encodings() {
        let flags = DividerFlags::default();
        let table = DividerTable::new(&flags, None).unwrap();
        assert_eq!(DividerTable::Default, table);
        assert_eq!(
            vec![1, 2, 3, 4],
            (0..4).map(|c| table.divisor(c)).collect::<Vec<u32>>()
        );
        assert_eq!(Some(2), table.code(3));
        assert_eq!(None, table.code(5));

        let flags = DividerFlags {
            one_based: true,
            ..Default::default()
        };
        let table = DividerTable::new(&flags, Some(&[(0, 5)])).unwrap();
        assert_eq!(DividerTable::OneBased, table);
        assert_eq!(
            vec![0, 1, 2, 3],
            (0..4).map(|c| table.divisor(c)).collect::<Vec<u32>>()
        );

        let flags = DividerFlags {
            power_of_two: true,
            ..Default::default()
        };
        let table = DividerTable::new(&flags, None).unwrap();
        assert_eq!(
            vec![1, 2, 4, 8],
            (0..4).map(|c| table.divisor(c)).collect::<Vec<u32>>()
        );
        assert_eq!(Some(3), table.code(8));
        assert_eq!(None, table.code(6));

        let table =
            DividerTable::new(&DividerFlags::default(), Some(&[(0, 1), (1, 2), (3, 8)])).unwrap();
        assert_eq!(
            vec![1, 2, 0, 8],
            (0..4).map(|c| table.divisor(c)).collect::<Vec<u32>>()
        );
        assert_eq!(Some(3), table.code(8));
        assert_eq!(None, table.code(4));
    }

    #[test]
    fn table_malformed() {
        let flags = DividerFlags {
            one_based: true,
            power_of_two: true,
            ..Default::default()
        };
        let err = DividerTable::new(&flags, None).unwrap_err();
        assert_eq!(
            Some(DeviceCtlError::InvalidConfiguration),
            err.kind::<DeviceCtlError>()
        );

        let flags = DividerFlags::default();
        [&[][..], &[(0, 1), (1, 0)][..], &[(0, 1), (0, 2)][..]]
            .iter()
            .for_each(|entries| {
                let err = DividerTable::new(&flags, Some(*entries)).unwrap_err();
                assert_eq!(
                    Some(DeviceCtlError::InvalidConfiguration),
                    err.kind::<DeviceCtlError>()
                );
            });

        let field = RegisterField {
            low_pos: 15,
            high_pos: 15,
        };
        assert!(ClockDivider::new(ADDR, field, flags, None, None).is_err());
    }

    #[test]
    fn recalc_rate_rounds_up() {
        let div = divider(DividerFlags::default(), None);

        let regs = TestRegisters::with_word(ADDR, 0x00800000);
        assert_eq!(8_192_000, div.recalc_rate(&regs, 24_576_000).unwrap());
        assert_eq!(34, div.recalc_rate(&regs, 100).unwrap());

        let regs = TestRegisters::with_word(ADDR, 0x00000000);
        assert_eq!(24_576_000, div.recalc_rate(&regs, 24_576_000).unwrap());
    }

    #[test]
    fn recalc_rate_unmapped_code() {
        let div = divider(DividerFlags::default(), Some(&[(0, 1), (1, 2), (3, 8)]));
        let regs = TestRegisters::with_word(ADDR, 0x00800000);
        let err = div.recalc_rate(&regs, 24_000_000).unwrap_err();
        assert_eq!(
            Some(DeviceCtlError::InvalidConfiguration),
            err.kind::<DeviceCtlError>()
        );
    }

    #[test]
    fn round_rate_search() {
        let div = divider(DividerFlags::default(), None);
        let regs = TestRegisters::default();

        // Exact.
        assert_eq!((12_000_000, 1), div.round_rate(&regs, 12_000_000, 24_000_000).unwrap());
        // Below the target.
        assert_eq!((8_000_000, 2), div.round_rate(&regs, 10_000_000, 24_000_000).unwrap());
        assert_eq!((24_000_000, 0), div.round_rate(&regs, 30_000_000, 24_000_000).unwrap());
        // Every rate is above the target.
        assert_eq!((6_000_000, 3), div.round_rate(&regs, 1_000_000, 24_000_000).unwrap());

        let div = divider(DividerFlags::default(), Some(&[(0, 1), (1, 2), (3, 8)]));
        assert_eq!((3_000_000, 3), div.round_rate(&regs, 5_000_000, 24_000_000).unwrap());
    }

    #[test]
    fn round_rate_unrepresentable() {
        let div = divider(DividerFlags::default(), None);
        let regs = TestRegisters::default();
        let err = div.round_rate(&regs, 48_000, 0).unwrap_err();
        assert_eq!(
            Some(DeviceCtlError::UnrepresentableRate),
            err.kind::<DeviceCtlError>()
        );

        // No code within the field is mapped.
        let div = divider(DividerFlags::default(), Some(&[(4, 16), (5, 32)]));
        let err = div.set_rate(&regs, 48_000, 24_000_000).unwrap_err();
        assert_eq!(
            Some(DeviceCtlError::UnrepresentableRate),
            err.kind::<DeviceCtlError>()
        );
        assert!(regs.writes.lock().unwrap().is_empty());
    }

    #[test]
    fn read_only_divider() {
        let flags = DividerFlags {
            read_only: true,
            ..Default::default()
        };
        let div = divider(flags, None);
        let regs = TestRegisters::with_word(ADDR, 0x00008000);

        assert_eq!((12_000_000, 1), div.round_rate(&regs, 6_000_000, 24_000_000).unwrap());

        let err = div.set_rate(&regs, 6_000_000, 24_000_000).unwrap_err();
        assert_eq!(
            Some(DeviceCtlError::InvalidConfiguration),
            err.kind::<DeviceCtlError>()
        );
        assert_eq!(0x00008000, regs.word(ADDR));

        let div = divider(flags, Some(&[(0, 1), (1, 2), (3, 8)]));
        let regs = TestRegisters::with_word(ADDR, 0x00800000);
        assert_eq!((24_000_000, 2), div.round_rate(&regs, 6_000_000, 24_000_000).unwrap());
    }

    #[test]
    fn set_rate_preserves_other_bits() {
        let div = divider(DividerFlags::default(), None);
        let regs = TestRegisters::with_word(ADDR, 0x12345678);

        assert_eq!(6_000_000, div.set_rate(&regs, 6_000_000, 24_000_000).unwrap());
        assert_eq!(0x12b4d678, regs.word(ADDR));

        assert_eq!(24_000_000, div.set_rate(&regs, 24_000_000, 24_000_000).unwrap());
        assert_eq!(0x12345678, regs.word(ADDR));
    }

    #[test]
    fn set_rate_then_recalc() {
        let div = divider(DividerFlags::default(), None);
        let regs = TestRegisters::default();
        let parent_rate = 24_576_000;

        [1_000_000, 6_144_000, 8_000_000, 8_192_000, 12_288_000, 20_000_000, 30_000_000]
            .iter()
            .for_each(|&rate| {
                let (rounded, _) = div.round_rate(&regs, rate, parent_rate).unwrap();
                let committed = div.set_rate(&regs, rate, parent_rate).unwrap();
                assert_eq!(rounded, committed);
                assert_eq!(committed, div.recalc_rate(&regs, parent_rate).unwrap());
                // Commit again; no change.
                div.set_rate(&regs, committed, parent_rate).unwrap();
                assert_eq!(committed, div.recalc_rate(&regs, parent_rate).unwrap());
            });
    }

    #[test]
    fn shared_register_bank() {
        let regs = TestRegisters::default();
        let lock = Arc::new(Mutex::new(()));
        let first = ClockDivider::new(
            ADDR,
            AUDIO_DIVIDER_FIELD,
            Default::default(),
            None,
            Some(lock.clone()),
        )
        .unwrap();
        let second = ClockDivider::new(
            ADDR,
            RegisterField {
                low_pos: 14,
                high_pos: 22,
            },
            Default::default(),
            None,
            Some(lock),
        )
        .unwrap();

        thread::scope(|s| {
            s.spawn(|| {
                (0..200).for_each(|i| {
                    let rate = if i % 2 > 0 { 12_000_000 } else { 6_000_000 };
                    first.set_rate(&regs, rate, 24_000_000).unwrap();
                });
            });
            s.spawn(|| {
                (0..200).for_each(|i| {
                    let rate = if i % 2 > 0 { 6_000_000 } else { 8_000_000 };
                    second.set_rate(&regs, rate, 24_000_000).unwrap();
                });
            });
        });

        // The last update of each divider survives.
        assert_eq!(12_000_000, first.recalc_rate(&regs, 24_000_000).unwrap());
        assert_eq!(6_000_000, second.recalc_rate(&regs, 24_000_000).unwrap());
    }
}
