// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2025 Takashi Sakamoto

use {super::*, protocols::mute::*};

const DAC_MUTE_NAME: &str = "DAC Mute Switch";

/// The control element for the line of DAC mute. The value is true when not muted.
#[derive(Default, Debug)]
pub(crate) struct DacMuteCtl {
    available: bool,
}

impl DacMuteCtl {
    pub(crate) fn cache<G: GpioOutput>(&mut self, mute: &MuteCoordinator<G>) -> Result<(), Error> {
        self.available = mute.has_gpio()?;
        Ok(())
    }

    pub(crate) fn load(&mut self, card_cntr: &mut CardCntr) -> Result<(), Error> {
        if self.available {
            let elem_id = ElemId::new_by_name(ElemIfaceType::Mixer, 0, 0, DAC_MUTE_NAME, 0);
            card_cntr.add_bool_elems(&elem_id, 1, 1, true)?;
        }
        Ok(())
    }

    pub(crate) fn read<G: GpioOutput>(
        &self,
        mute: &MuteCoordinator<G>,
        elem_id: &ElemId,
        elem_value: &mut ElemValue,
    ) -> Result<bool, Error> {
        match elem_id.name().as_str() {
            DAC_MUTE_NAME => {
                let muted = mute.get_user_mute()?;
                elem_value.set_bool(&[!muted]);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub(crate) fn write<G: GpioOutput>(
        &self,
        mute: &MuteCoordinator<G>,
        elem_id: &ElemId,
        elem_value: &ElemValue,
    ) -> Result<bool, Error> {
        match elem_id.name().as_str() {
            DAC_MUTE_NAME => {
                let val = elem_value.boolean()[0];
                mute.set_user_mute(!val).map(|_| true)
            }
            _ => Ok(false),
        }
    }
}
