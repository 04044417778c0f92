// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2025 Takashi Sakamoto

use {
    super::{amp_ctl::*, mute_ctl::*, *},
    runtime_core::card_cntr::CtlModel,
};

#[derive(Default, Debug)]
pub struct Pcm1754Model {
    mute_ctl: DacMuteCtl,
    amp_ctl: AmpCtl,
}

impl<T, C, G> CtlModel<Arc<Pcm1754Unit<T, C, G>>> for Pcm1754Model
where
    T: RegisterIo,
    C: ClockResource,
    G: GpioOutput,
{
    fn cache(&mut self, unit: &mut Arc<Pcm1754Unit<T, C, G>>) -> Result<(), Error> {
        self.mute_ctl.cache(unit.card().mute())?;
        self.amp_ctl.cache(unit.amp())?;
        Ok(())
    }

    fn load(&mut self, card_cntr: &mut CardCntr) -> Result<(), Error> {
        self.mute_ctl.load(card_cntr)?;
        self.amp_ctl.load(card_cntr)?;
        Ok(())
    }

    fn read(
        &mut self,
        unit: &mut Arc<Pcm1754Unit<T, C, G>>,
        elem_id: &ElemId,
        elem_value: &mut ElemValue,
    ) -> Result<bool, Error> {
        if self.mute_ctl.read(unit.card().mute(), elem_id, elem_value)? {
            Ok(true)
        } else if self.amp_ctl.read(elem_id, elem_value)? {
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn write(
        &mut self,
        unit: &mut Arc<Pcm1754Unit<T, C, G>>,
        elem_id: &ElemId,
        old: &ElemValue,
        new: &ElemValue,
    ) -> Result<bool, Error> {
        if self.mute_ctl.write(unit.card().mute(), elem_id, new)? {
            Ok(true)
        } else if self.amp_ctl.write(unit.amp(), elem_id, old, new)? {
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
