// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2020 Takashi Sakamoto

use {
    super::*,
    alsactl::{prelude::*, *},
    glib::FileError,
    tracing::{debug, debug_span, enabled, Level},
};

/// The container of user-defined control elements added to the sound card. The elements are
/// removed when the container is dropped.
#[derive(Default)]
pub struct CardCntr {
    pub card: Card,
    entries: Vec<(ElemInfo, ElemValue)>,
}

/// The model to bridge control elements and the unit.
pub trait CtlModel<O: Sized> {
    /// Cache the state of unit.
    fn cache(&mut self, unit: &mut O) -> Result<(), Error>;
    /// Add control elements.
    fn load(&mut self, card_cntr: &mut CardCntr) -> Result<(), Error>;
    fn read(
        &mut self,
        unit: &mut O,
        elem_id: &ElemId,
        elem_value: &mut ElemValue,
    ) -> Result<bool, Error>;
    fn write(
        &mut self,
        unit: &mut O,
        elem_id: &ElemId,
        old: &ElemValue,
        new: &ElemValue,
    ) -> Result<bool, Error>;
}

impl Drop for CardCntr {
    fn drop(&mut self) {
        self.entries
            .iter()
            .filter_map(|(elem_info, _)| elem_id_from_elem_info(elem_info))
            .for_each(|elem_id| {
                let _ = self.card.remove_elems(&elem_id);
            });
    }
}

fn elem_id_from_elem_info(elem_info: &ElemInfo) -> Option<ElemId> {
    match elem_info {
        ElemInfo::Iec60958(info) => info.elem_id(),
        ElemInfo::Boolean(info) => info.elem_id(),
        ElemInfo::Bytes(info) => info.elem_id(),
        ElemInfo::Integer(info) => info.elem_id(),
        ElemInfo::Integer64(info) => info.elem_id(),
        ElemInfo::Enumerated(info) => info.elem_id(),
    }
}

fn match_elem_id(elem_info: &ElemInfo, elem_id: &ElemId) -> bool {
    elem_id_from_elem_info(elem_info)
        .map(|e| e.eq(elem_id))
        .unwrap_or_default()
}

fn dump_elem_info(elem_info: &ElemInfo) {
    let elem_id = match elem_id_from_elem_info(elem_info) {
        Some(elem_id) => elem_id,
        None => return,
    };

    match elem_info {
        ElemInfo::Boolean(info) => {
            debug!(
                numid=?elem_id.numid(),
                access=?info.access(),
                value_count=?info.value_count()
            );
        }
        ElemInfo::Integer(info) => {
            debug!(
                numid=?elem_id.numid(),
                access=?info.access(),
                value_count=?info.value_count(),
                value_min=?info.value_min(),
                value_max=?info.value_max(),
                value_step=?info.value_step()
            );
        }
        _ => {
            debug!(numid=?elem_id.numid(), "unsupported type of element");
        }
    }
}

fn value_array_literal(elem_info: &ElemInfo, elem_value: &ElemValue) -> String {
    match elem_info {
        ElemInfo::Boolean(info) => {
            let count = info.value_count() as usize;
            format!("{:?}", &elem_value.boolean()[..count])
        }
        ElemInfo::Integer(info) => {
            let count = info.value_count() as usize;
            format!("{:?}", &elem_value.int()[..count])
        }
        _ => "unsupported".to_string(),
    }
}

impl CardCntr {
    fn default_access() -> ElemAccessFlag {
        ElemAccessFlag::READ | ElemAccessFlag::WRITE | ElemAccessFlag::VOLATILE
    }

    pub fn add_bool_elems(
        &mut self,
        elem_id: &ElemId,
        elem_count: usize,
        value_count: usize,
        unlock: bool,
    ) -> Result<Vec<ElemId>, Error> {
        let _entry = debug_span!("boolean").entered();

        let elem_info = ElemInfoBoolean::new();
        elem_info.set_value_count(value_count as u32);
        elem_info.set_access(Self::default_access());

        let res = self.register_elems(&elem_id, elem_count, &elem_info, None, unlock);
        debug!(
            name = ?elem_id.name().as_str(),
            iface = ?elem_id.iface(),
            index = ?elem_id.index(),
            ?elem_count,
            ?value_count,
            ?unlock,
            ?res,
        );
        res
    }

    pub fn add_int_elems(
        &mut self,
        elem_id: &ElemId,
        elem_count: usize,
        min: i32,
        max: i32,
        step: i32,
        value_count: usize,
        tlv: Option<&[u32]>,
        unlock: bool,
    ) -> Result<Vec<ElemId>, Error> {
        let _entry = debug_span!("integer").entered();

        let elem_info = ElemInfoInteger::new();
        elem_info.set_value_count(value_count as u32);
        elem_info.set_value_min(min);
        elem_info.set_value_max(max);
        elem_info.set_value_step(step);

        let mut access = Self::default_access();
        if tlv.is_some() {
            access |= ElemAccessFlag::TLV_READ | ElemAccessFlag::TLV_WRITE;
        }
        elem_info.set_access(access);

        let res = self.register_elems(&elem_id, elem_count, &elem_info, tlv, unlock);
        debug!(
            name = ?elem_id.name().as_str(),
            iface = ?elem_id.iface(),
            index = ?elem_id.index(),
            ?elem_count,
            ?min,
            ?max,
            ?step,
            ?value_count,
            ?tlv,
            ?unlock,
            ?res,
        );
        res
    }

    // Reuse the elements left by the previous instance of runtime, as long as they are
    // compatible.
    fn reuse_elems<O: AsRef<ElemInfoCommon>>(
        &self,
        elem_id_list: Vec<ElemId>,
        elem_id: &ElemId,
        elem_count: usize,
        elem_info: &O,
    ) -> Result<Vec<ElemId>, Error> {
        let elem_id_list: Vec<ElemId> = elem_id_list
            .into_iter()
            .filter(|eid| {
                eid.name() == elem_id.name()
                    && eid.device_id() == elem_id.device_id()
                    && eid.subdevice_id() == elem_id.subdevice_id()
                    && eid.iface() == elem_id.iface()
            })
            .collect();

        if elem_id_list.len() != elem_count {
            let msg = format!(
                "{} is already added however the count is unexpected.",
                elem_id.name()
            );
            return Err(Error::new(FileError::Inval, &msg));
        }

        elem_id_list.iter().try_for_each(|eid| {
            let info = self.card.elem_info(eid)?;
            let access = info.as_ref().access();

            let cause = if access.contains(ElemAccessFlag::OWNER) {
                Some("is already added by runtime")
            } else if access.contains(ElemAccessFlag::LOCK) {
                Some("is locked by the other process")
            } else if info.as_ref().elem_type() != elem_info.as_ref().elem_type() {
                Some("is already added but has unexpected type")
            } else {
                None
            };

            match cause {
                Some(cause) => {
                    let msg = format!("{} {}.", eid.name(), cause);
                    Err(Error::new(FileError::Inval, &msg))
                }
                None => Ok(()),
            }
        })?;

        Ok(elem_id_list)
    }

    fn register_elems<O: AsRef<ElemInfoCommon>>(
        &mut self,
        elem_id: &ElemId,
        elem_count: usize,
        elem_info: &O,
        tlv: Option<&[u32]>,
        unlock: bool,
    ) -> Result<Vec<ElemId>, Error> {
        let _enter = debug_span!("register").entered();

        let elem_id_list = self.card.elem_id_list()?;
        let elem_id_list = if elem_id_list.iter().any(|eid| eid.eq(elem_id)) {
            self.reuse_elems(elem_id_list, elem_id, elem_count, elem_info)?
        } else {
            self.card
                .add_elems(elem_id, elem_count as u32, elem_info)?
        };

        let res = elem_id_list.iter().try_for_each(|eid| {
            let info = self.card.elem_info(eid)?;
            let eid = elem_id_from_elem_info(&info).ok_or_else(|| {
                Error::new(FileError::Io, "Unexpected result to detect element id")
            })?;

            let mut v = ElemValue::new();
            self.card.read_elem_value(&eid, &mut v)?;

            debug!(
                numid = ?eid.numid(),
                name = ?eid.name().as_str(),
                index = ?eid.index(),
            );

            if enabled!(Level::DEBUG) {
                dump_elem_info(&info);
            }

            self.entries.push((info, v));
            Ok(())
        });

        if let Err(e) = res {
            let _ = self.card.remove_elems(&elem_id_list[0]);
            return Err(e);
        }

        if let Some(cntr) = tlv {
            elem_id_list.iter().try_for_each(|eid| {
                let res = self.card.write_elem_tlv(eid, cntr);
                debug!(numid=?eid.numid(), ?tlv, ?res);
                res
            })?;
        }

        if unlock {
            elem_id_list.iter().for_each(|eid| {
                // Ignore any errors.
                let res = self.card.lock_elem(eid, false);
                debug!(numid=?eid.numid(), ?unlock, ?res);
            });
        }

        Ok(elem_id_list)
    }

    /// Dispatch the event of element to the model. When the model fails to write, the value of
    /// element is back to the old one.
    pub fn dispatch_elem_event<O, T>(
        &mut self,
        unit: &mut O,
        elem_id: &ElemId,
        events: &ElemEventMask,
        ctl_model: &mut T,
    ) -> Result<(), Error>
    where
        O: Sized,
        T: CtlModel<O>,
    {
        if events.contains(ElemEventMask::REMOVE) {
            let _enter = debug_span!("remove").entered();
            debug!(numid = ?elem_id.numid());

            self.entries
                .retain(|(elem_info, _)| !match_elem_id(elem_info, elem_id));
            return Ok(());
        }

        if events.contains(ElemEventMask::ADD) {
            let _enter = debug_span!("add").entered();

            for (elem_info, v) in &mut self.entries {
                if !match_elem_id(elem_info, elem_id) {
                    continue;
                }

                let mut val = ElemValue::new();
                let res = ctl_model.read(unit, elem_id, &mut val);
                debug!(
                    numid = elem_id.numid(),
                    values = value_array_literal(elem_info, &val),
                    ?res,
                );

                match res {
                    Ok(true) if !v.equal(&val) => {
                        if self.card.write_elem_value(elem_id, &val).is_ok() {
                            *v = val;
                        }
                    }
                    _ => (),
                }
            }
        }

        if events.contains(ElemEventMask::VALUE) {
            let _enter = debug_span!("value").entered();

            for (elem_info, v) in &mut self.entries {
                if !match_elem_id(elem_info, elem_id) {
                    continue;
                }

                let mut val = ElemValue::new();
                let res = self.card.read_elem_value(elem_id, &mut val);
                debug!(
                    numid = elem_id.numid(),
                    cached = value_array_literal(elem_info, v),
                    values = value_array_literal(elem_info, &val),
                    ?res,
                );

                if res.is_err() || v.equal(&val) {
                    continue;
                }

                let res = ctl_model.write(unit, elem_id, v, &val);
                debug!(
                    numid = elem_id.numid(),
                    old_values = value_array_literal(elem_info, v),
                    new_values = value_array_literal(elem_info, &val),
                    ?res,
                );

                match res {
                    Ok(true) => {
                        *v = val;
                        return Ok(());
                    }
                    Ok(false) => (),
                    Err(e) => {
                        self.card.write_elem_value(elem_id, v)?;
                        return Err(e);
                    }
                }
            }
        }

        Ok(())
    }
}
