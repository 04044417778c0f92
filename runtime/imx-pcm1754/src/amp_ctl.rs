// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2025 Takashi Sakamoto

use {
    super::*,
    alsa_ctl_tlv_codec::{DbRange, DbRangeEntry, DbRangeEntryData, DbScale},
    runtime_core::elem_value_accessor::*,
};

const VOLUME_NAME: &str = "Master Playback Volume";
const SWITCH_NAME: &str = "Master Playback Switch";

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
struct AmpParams {
    volumes: [u32; CHANNEL_COUNT],
    switches: [bool; CHANNEL_COUNT],
}

/// The control elements for volume and input switch of the amplifier.
#[derive(Default, Debug)]
pub(crate) struct AmpCtl {
    params: AmpParams,
}

fn volume_tlv() -> DbRange {
    DbRange {
        entries: VOLUME_DB_SEGMENTS
            .iter()
            .map(|seg| DbRangeEntry {
                min_val: seg.min_val as i32,
                max_val: seg.max_val as i32,
                data: DbRangeEntryData::DbScale(DbScale {
                    min: seg.min_db,
                    step: seg.step_db as u16,
                    mute_avail: false,
                }),
            })
            .collect(),
    }
}

impl AmpCtl {
    pub(crate) fn cache<T: RegisterIo>(&mut self, amp: &Lm48100q<T>) -> Result<(), Error> {
        amp.get_volumes(&mut self.params.volumes)?;
        amp.get_input_switches(&mut self.params.switches)?;
        Ok(())
    }

    pub(crate) fn load(&mut self, card_cntr: &mut CardCntr) -> Result<(), Error> {
        let elem_id = ElemId::new_by_name(ElemIfaceType::Mixer, 0, 0, VOLUME_NAME, 0);
        card_cntr.add_int_elems(
            &elem_id,
            1,
            VOLUME_MIN as i32,
            VOLUME_MAX as i32,
            VOLUME_STEP as i32,
            CHANNEL_COUNT,
            Some(&Vec::<u32>::from(&volume_tlv())),
            true,
        )?;

        let elem_id = ElemId::new_by_name(ElemIfaceType::Mixer, 0, 0, SWITCH_NAME, 0);
        card_cntr.add_bool_elems(&elem_id, 1, CHANNEL_COUNT, true)?;

        Ok(())
    }

    pub(crate) fn read(&self, elem_id: &ElemId, elem_value: &mut ElemValue) -> Result<bool, Error> {
        match elem_id.name().as_str() {
            VOLUME_NAME => {
                let vals: Vec<i32> = self.params.volumes.iter().map(|&vol| vol as i32).collect();
                elem_value.set_int(&vals);
                Ok(true)
            }
            SWITCH_NAME => {
                elem_value.set_bool(&self.params.switches);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub(crate) fn write<T: RegisterIo>(
        &mut self,
        amp: &Lm48100q<T>,
        elem_id: &ElemId,
        old: &ElemValue,
        new: &ElemValue,
    ) -> Result<bool, Error> {
        match elem_id.name().as_str() {
            VOLUME_NAME => {
                let mut params = self.params;
                ElemValueAccessor::<i32>::get_vals(new, old, CHANNEL_COUNT, |ch, val| {
                    if val < VOLUME_MIN as i32 || val > VOLUME_MAX as i32 {
                        let msg = format!("Invalid value for volume: {}", val);
                        Err(Error::new(FileError::Inval, &msg))
                    } else {
                        params.volumes[ch] = val as u32;
                        Ok(())
                    }
                })?;
                if let Err(e) = amp.set_volumes(&params.volumes) {
                    // The channels written before the failure are kept by the amplifier.
                    let _ = self.cache(amp);
                    return Err(e);
                }
                self.params = params;
                Ok(true)
            }
            SWITCH_NAME => {
                let mut params = self.params;
                ElemValueAccessor::<bool>::get_vals(new, old, CHANNEL_COUNT, |ch, val| {
                    params.switches[ch] = val;
                    Ok(())
                })?;
                if let Err(e) = amp.set_input_switches(&params.switches) {
                    let _ = self.cache(amp);
                    return Err(e);
                }
                self.params = params;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
