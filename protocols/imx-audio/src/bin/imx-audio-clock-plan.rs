// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2025 Takashi Sakamoto

use {
    glib::Error,
    imx_audio_protocols::{divider::*, factor::*, RegisterIo},
    std::{cell::Cell, convert::TryFrom},
};

// The register word kept in memory.
#[derive(Default)]
struct ScratchRegister(Cell<u32>);

impl RegisterIo for ScratchRegister {
    fn read32(&self, _: u32) -> Result<u32, Error> {
        Ok(self.0.get())
    }

    fn write32(&self, _: u32, val: u32) -> Result<(), Error> {
        self.0.set(val);
        Ok(())
    }
}

fn parse_rate(literal: &str) -> Result<u64, String> {
    literal
        .parse::<u64>()
        .map_err(|e| format!("Invalid value for rate: {}, {}", literal, e))
}

fn print_divider_plan(sck_rate: u64, parent_rate: u64) -> Result<(), String> {
    let reg = ScratchRegister::default();
    let divider = ClockDivider::new(0, AUDIO_DIVIDER_FIELD, Default::default(), None, None)
        .map_err(|e| e.to_string())?;

    let committed = divider
        .set_rate(&reg, sck_rate, parent_rate)
        .map_err(|e| e.to_string())?;
    let code = AUDIO_DIVIDER_FIELD.unpack(reg.0.get());

    println!("divider:");
    println!("  parent rate: {}", parent_rate);
    println!("  code: {}", code);
    println!("  divisor: {}", divider.table().divisor(code));
    println!("  rate: {}", committed);
    println!("  register: 0x{:08x}", reg.0.get());

    Ok(())
}

fn main() {
    let code = std::env::args()
        .nth(1)
        .ok_or("At least one argument is required for sampling rate".to_string())
        .and_then(|literal| {
            let rate = parse_rate(&literal)?;
            let parent_rate = match std::env::args().nth(2) {
                Some(literal) => Some(parse_rate(&literal)?),
                None => None,
            };
            Ok((rate, parent_rate))
        })
        .and_then(|(rate, parent_rate)| {
            let params = u32::try_from(rate)
                .map_err(|e| e.to_string())
                .and_then(|rate| ClockFactorSearch::negotiate(rate).map_err(|e| e.to_string()))?;

            println!("master clock:");
            println!("  sampling rate: {}", params.sample_rate);
            println!("  factor: {}", params.factor);
            println!("  rate: {}", params.sck_rate);
            println!("PLL:");
            println!("  rate: {}", params.pll_rate);

            if let Some(parent_rate) = parent_rate {
                print_divider_plan(params.sck_rate, parent_rate)?;
            }

            Ok(())
        })
        .map(|_| 0)
        .unwrap_or_else(|msg| {
            eprintln!("{}", msg);
            print_help();
            1
        });

    std::process::exit(code)
}

fn print_help() {
    print!(
        r###"
Usage:
  imx-audio-clock-plan RATE [PARENT_RATE]

  where:
    RATE:           The sampling rate of stream.
    PARENT_RATE:    The rate of parent clock for audio clock divider, optional.
"###
    );
}
