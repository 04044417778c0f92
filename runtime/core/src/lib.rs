// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2020 Takashi Sakamoto

//! Core utilities to produce runtime of ALSA control service.
//!
//! The runtime adds user-defined control elements to the sound card, then dispatches events of
//! the elements in the thread which runs its event loop.

pub mod card_cntr;
pub mod dispatcher;
pub mod elem_value_accessor;

use glib::Error;

/// The level to debug runtime.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LogLevel {
    Debug,
}

impl Default for LogLevel {
    fn default() -> Self {
        Self::Debug
    }
}

/// The lifetime of runtime: instantiation, preparation of control elements, then event loop.
pub trait RuntimeOperation<T>: Sized {
    fn new(arg: T, log_level: Option<LogLevel>) -> Result<Self, Error>;
    fn listen(&mut self) -> Result<(), Error>;
    fn run(&mut self) -> Result<(), Error>;
}
