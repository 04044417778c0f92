// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2020 Takashi Sakamoto

use {
    super::*,
    alsactl::{prelude::*, ElemValue},
    glib::object::IsA,
};

/// The accessor to values of control element per channel.
pub trait ElemValueAccessor<T>: IsA<ElemValue>
where
    T: Copy + Clone + Default + Eq + PartialEq,
{
    fn set(&self, vals: &[T]);
    fn get<F>(&self, len: usize, cb: F) -> Result<(), Error>
    where
        F: FnMut(&[T]) -> Result<(), Error>;

    /// Fill the values of channels by the callback.
    fn set_vals<F>(&self, len: usize, mut cb: F) -> Result<(), Error>
    where
        F: FnMut(usize) -> Result<T, Error>,
    {
        let vals = (0..len).map(|ch| cb(ch)).collect::<Result<Vec<T>, Error>>()?;
        self.set(&vals);
        Ok(())
    }

    /// Call the callback for the channels of which value differs from the old one.
    fn get_vals<F>(&self, old: &Self, len: usize, mut cb: F) -> Result<(), Error>
    where
        F: FnMut(usize, T) -> Result<(), Error>,
    {
        self.get(len, |curr| {
            old.get(len, |prev| {
                curr.iter()
                    .zip(prev)
                    .enumerate()
                    .filter(|(_, (n, o))| n != o)
                    .try_for_each(|(ch, (&v, _))| cb(ch, v))
            })
        })
    }
}

impl ElemValueAccessor<bool> for ElemValue {
    fn set(&self, vals: &[bool]) {
        self.set_bool(vals)
    }

    fn get<F>(&self, len: usize, mut cb: F) -> Result<(), Error>
    where
        F: FnMut(&[bool]) -> Result<(), Error>,
    {
        cb(&self.boolean()[..len])
    }
}

impl ElemValueAccessor<i32> for ElemValue {
    fn set(&self, vals: &[i32]) {
        self.set_int(vals)
    }

    fn get<F>(&self, len: usize, mut cb: F) -> Result<(), Error>
    where
        F: FnMut(&[i32]) -> Result<(), Error>,
    {
        cb(&self.int()[..len])
    }
}
