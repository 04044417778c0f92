// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2025 Takashi Sakamoto

//! Cache of device registers.
//!
//! The cache is write-through. The read operation is served from the cache once the register
//! has been written or read.

use {
    super::*,
    std::{collections::BTreeMap, sync::Mutex},
    tracing::debug,
};

/// The cache of registers over the register primitive.
#[derive(Debug)]
pub struct RegisterCache<T: RegisterIo> {
    io: T,
    cache: Mutex<BTreeMap<u32, u32>>,
    max_register: u32,
    val_bits: u32,
}

impl<T: RegisterIo> RegisterCache<T> {
    pub fn new(io: T, max_register: u32, val_bits: u32) -> Self {
        Self {
            io,
            cache: Default::default(),
            max_register,
            val_bits,
        }
    }

    pub fn io(&self) -> &T {
        &self.io
    }

    pub fn max_register(&self) -> u32 {
        self.max_register
    }

    fn check_address(&self, addr: u32) -> Result<(), Error> {
        if addr > self.max_register {
            let msg = format!(
                "Register 0x{:02x} is out of range up to 0x{:02x}",
                addr, self.max_register
            );
            Err(Error::new(DeviceCtlError::InvalidConfiguration, &msg))
        } else {
            Ok(())
        }
    }

    fn check_value(&self, addr: u32, val: u32) -> Result<(), Error> {
        if self.val_bits < 32 && val >> self.val_bits > 0 {
            let msg = format!(
                "Value 0x{:02x} for register 0x{:02x} is wider than {} bits",
                val, addr, self.val_bits
            );
            Err(Error::new(DeviceCtlError::InvalidConfiguration, &msg))
        } else {
            Ok(())
        }
    }

    /// Write the pairs of address and value in the order. The operation stops at the first
    /// failure, and the registers written before are left as is.
    pub fn apply_defaults(&self, defaults: &[(u32, u32)]) -> Result<(), Error> {
        defaults.iter().try_for_each(|&(addr, val)| {
            self.write(addr, val).map_err(|e| {
                let kind = e
                    .kind::<DeviceCtlError>()
                    .unwrap_or(DeviceCtlError::RegisterAccessFailure);
                let msg = format!("Fail to apply default to register 0x{:02x}: {}", addr, e);
                Error::new(kind, &msg)
            })?;
            debug!(addr, val, "default applied");
            Ok(())
        })
    }

    pub fn read(&self, addr: u32) -> Result<u32, Error> {
        self.check_address(addr)?;
        let mut cache = acquire(self.cache.lock(), "register cache")?;
        if let Some(&val) = cache.get(&addr) {
            Ok(val)
        } else {
            let val = read_register(&self.io, addr)?;
            cache.insert(addr, val);
            Ok(val)
        }
    }

    pub fn write(&self, addr: u32, val: u32) -> Result<(), Error> {
        self.check_address(addr)?;
        self.check_value(addr, val)?;
        let mut cache = acquire(self.cache.lock(), "register cache")?;
        write_register(&self.io, addr, val)?;
        cache.insert(addr, val);
        Ok(())
    }

    /// Change the bits of mask to the value. The register is not written when nothing changes.
    pub fn update_bits(&self, addr: u32, mask: u32, val: u32) -> Result<(), Error> {
        self.check_address(addr)?;
        let mut cache = acquire(self.cache.lock(), "register cache")?;
        let curr = match cache.get(&addr) {
            Some(&curr) => curr,
            None => read_register(&self.io, addr)?,
        };
        let next = (curr & !mask) | (val & mask);
        self.check_value(addr, next)?;
        if next != curr {
            write_register(&self.io, addr, next)?;
        }
        cache.insert(addr, next);
        Ok(())
    }

    /// Return the cached value, if any.
    pub fn cached(&self, addr: u32) -> Result<Option<u32>, Error> {
        acquire(self.cache.lock(), "register cache").map(|cache| cache.get(&addr).copied())
    }
}
