// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2025 Takashi Sakamoto

//! Runtime to control the sound card with PCM1754 DAC and LM48100Q amplifier on i.MX SoC.
//!
//! The runtime adds user-defined control elements for DAC mute, volume and input switch of the
//! amplifier. The aggregate of machine and amplifier is shared with the audio pipeline, which
//! reports the parameters of stream and the power state of output from its own threads.

mod amp_ctl;
mod model;
mod mute_ctl;

use {
    alsactl::{prelude::*, *},
    glib::{ControlFlow, Error, FileError},
    imx_audio_protocols as protocols,
    model::*,
    nix::sys::signal::Signal,
    protocols::{lm48100q::*, pcm1754::*, *},
    runtime_core::{card_cntr::*, dispatcher::*, LogLevel, RuntimeOperation},
    std::sync::{mpsc, Arc},
    tracing::{debug, debug_span, Level},
};

/// The aggregate of the machine and the amplifier.
#[derive(Debug)]
pub struct Pcm1754Unit<T, C, G>
where
    T: RegisterIo,
    C: ClockResource,
    G: GpioOutput,
{
    card: Pcm1754Card<C, G>,
    amp: Lm48100q<T>,
}

impl<T, C, G> Pcm1754Unit<T, C, G>
where
    T: RegisterIo,
    C: ClockResource,
    G: GpioOutput,
{
    pub fn new(
        config: Pcm1754Config,
        amp_io: T,
        pll: C,
        codec_clk: C,
        dac_mute: Option<G>,
    ) -> Self {
        Self {
            card: Pcm1754Card::new(config, pll, codec_clk, dac_mute),
            amp: Lm48100q::new(amp_io),
        }
    }

    pub fn card(&self) -> &Pcm1754Card<C, G> {
        &self.card
    }

    pub fn amp(&self) -> &Lm48100q<T> {
        &self.amp
    }

    /// The amplifier is powered before the DAC is unmuted, and powered down after the DAC is
    /// muted.
    pub fn output_power_event(&self, powered: bool) -> Result<(), Error> {
        if powered {
            self.amp.power_up()?;
            self.card.output_power_event(true)
        } else {
            self.card.output_power_event(false)?;
            self.amp.power_down()
        }
    }

    /// Mute the DAC and disable the codec clock, then turn off the amplifier.
    pub fn teardown(&self) -> Result<(), Error> {
        self.card.teardown()?;
        self.amp.power_down()
    }
}

/// The parameters of runtime resolved by the platform.
pub struct Pcm1754RuntimeParams<T, C, G> {
    /// The numeric identifier of sound card in Linux sound subsystem.
    pub card_id: u32,
    pub config: Pcm1754Config,
    pub amp_io: T,
    pub pll: C,
    pub codec_clk: C,
    pub dac_mute: Option<G>,
}

enum Event {
    Shutdown,
    Disconnected,
    Elem((ElemId, ElemEventMask)),
}

pub struct Pcm1754Runtime<T, C, G>
where
    T: RegisterIo,
    C: ClockResource,
    G: GpioOutput,
{
    unit: Arc<Pcm1754Unit<T, C, G>>,
    model: Pcm1754Model,
    card_cntr: CardCntr,
    rx: mpsc::Receiver<Event>,
    tx: mpsc::SyncSender<Event>,
    dispatchers: Vec<Dispatcher>,
}

impl<T, C, G> Drop for Pcm1754Runtime<T, C, G>
where
    T: RegisterIo,
    C: ClockResource,
    G: GpioOutput,
{
    fn drop(&mut self) {
        // At first, stop event loop in all of dispatchers to avoid queueing new events.
        for dispatcher in &mut self.dispatchers {
            dispatcher.stop();
        }

        // Next, consume all events in queue to release blocked thread for sender.
        for _ in self.rx.try_iter() {}

        // Finally Finish I/O threads.
        self.dispatchers.clear();

        let _enter = debug_span!("teardown").entered();
        let res = self.unit.teardown();
        debug!(?res);
    }
}

impl<T, C, G> RuntimeOperation<Pcm1754RuntimeParams<T, C, G>> for Pcm1754Runtime<T, C, G>
where
    T: RegisterIo,
    C: ClockResource,
    G: GpioOutput,
{
    fn new(
        params: Pcm1754RuntimeParams<T, C, G>,
        log_level: Option<LogLevel>,
    ) -> Result<Self, Error> {
        if let Some(level) = log_level {
            let fmt_level = match level {
                LogLevel::Debug => Level::DEBUG,
            };
            tracing_subscriber::fmt()
                .with_max_level(fmt_level)
                .try_init()
                .map_err(|e| {
                    let msg = format!("Fail to install subscriber for logging: {}", e);
                    Error::new(FileError::Failed, &msg)
                })?;
        }

        let unit = Pcm1754Unit::new(
            params.config,
            params.amp_io,
            params.pll,
            params.codec_clk,
            params.dac_mute,
        );

        let enter = debug_span!("defaults").entered();
        unit.amp().apply_defaults()?;
        enter.exit();

        let card_cntr = CardCntr::default();
        card_cntr.card.open(params.card_id, 0)?;

        // Use uni-directional channel for communication to child threads.
        let (tx, rx) = mpsc::sync_channel(32);

        Ok(Self {
            unit: Arc::new(unit),
            model: Default::default(),
            card_cntr,
            rx,
            tx,
            dispatchers: Default::default(),
        })
    }

    fn listen(&mut self) -> Result<(), Error> {
        self.launch_system_event_dispatcher()?;

        let enter = debug_span!("cache").entered();
        self.model.cache(&mut self.unit)?;
        enter.exit();

        let enter = debug_span!("load").entered();
        CtlModel::<Arc<Pcm1754Unit<T, C, G>>>::load(&mut self.model, &mut self.card_cntr)?;
        enter.exit();

        Ok(())
    }

    fn run(&mut self) -> Result<(), Error> {
        let enter = debug_span!("event").entered();
        loop {
            let ev = match self.rx.recv() {
                Ok(ev) => ev,
                Err(_) => continue,
            };

            match ev {
                Event::Shutdown | Event::Disconnected => break,
                Event::Elem((elem_id, events)) => {
                    let _enter = debug_span!("element").entered();

                    debug!(
                        numid = elem_id.numid(),
                        name = elem_id.name().as_str(),
                        iface = ?elem_id.iface(),
                        index = elem_id.index(),
                    );

                    let _ = self.card_cntr.dispatch_elem_event(
                        &mut self.unit,
                        &elem_id,
                        &events,
                        &mut self.model,
                    );
                }
            }
        }
        enter.exit();

        Ok(())
    }
}

impl<T, C, G> Pcm1754Runtime<T, C, G>
where
    T: RegisterIo,
    C: ClockResource,
    G: GpioOutput,
{
    const SYSTEM_DISPATCHER_NAME: &'static str = "system event dispatcher";

    /// The aggregate shared with the audio pipeline.
    pub fn unit(&self) -> Arc<Pcm1754Unit<T, C, G>> {
        self.unit.clone()
    }

    fn launch_system_event_dispatcher(&mut self) -> Result<(), Error> {
        let name = Self::SYSTEM_DISPATCHER_NAME.to_string();
        let mut dispatcher = Dispatcher::run(name)?;

        let tx = self.tx.clone();
        dispatcher.attach_signal_handler(Signal::SIGINT, move || {
            let _ = tx.send(Event::Shutdown);
            ControlFlow::Break
        });

        let tx = self.tx.clone();
        dispatcher.attach_snd_card(&self.card_cntr.card, move |_| {
            let _ = tx.send(Event::Disconnected);
        })?;

        let tx = self.tx.clone();
        self.card_cntr
            .card
            .connect_handle_elem_event(move |_, elem_id, events| {
                let _ = tx.send(Event::Elem((elem_id.clone(), events)));
            });

        self.dispatchers.push(dispatcher);

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test {
    use {
        super::*,
        std::{
            cell::{Cell, RefCell},
            collections::BTreeMap,
        },
    };

    #[derive(Default)]
    pub struct ScratchRegisters {
        pub words: RefCell<BTreeMap<u32, u32>>,
        pub writes: RefCell<Vec<u32>>,
        pub failing_addr: Cell<Option<u32>>,
    }

    impl RegisterIo for ScratchRegisters {
        fn read32(&self, addr: u32) -> Result<u32, Error> {
            Ok(*self.words.borrow().get(&addr).unwrap_or(&0))
        }

        fn write32(&self, addr: u32, val: u32) -> Result<(), Error> {
            if self.failing_addr.get() == Some(addr) {
                return Err(Error::new(FileError::Io, "bus error"));
            }
            self.writes.borrow_mut().push(addr);
            self.words.borrow_mut().insert(addr, val);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FixedClock {
        pub rate: u64,
        pub enabled: bool,
    }

    impl ClockResource for FixedClock {
        fn get_rate(&self) -> u64 {
            self.rate
        }

        fn round_rate(&self, rate: u64) -> u64 {
            rate
        }

        fn set_rate(&mut self, rate: u64) -> Result<(), Error> {
            self.rate = rate;
            Ok(())
        }

        fn prepare_enable(&mut self) -> Result<(), Error> {
            self.enabled = true;
            Ok(())
        }

        fn disable_unprepare(&mut self) {
            self.enabled = false;
        }
    }

    #[derive(Default)]
    pub struct LevelGpio(pub Option<bool>);

    impl GpioOutput for LevelGpio {
        fn set(&mut self, value: bool) {
            self.0 = Some(value);
        }
    }

    pub type TestUnit = Pcm1754Unit<ScratchRegisters, FixedClock, LevelGpio>;

    pub fn test_unit() -> TestUnit {
        let unit = Pcm1754Unit::new(
            Default::default(),
            ScratchRegisters::default(),
            FixedClock::default(),
            FixedClock::default(),
            Some(LevelGpio::default()),
        );
        unit.amp().apply_defaults().unwrap();
        unit
    }

    fn dac_level(unit: &TestUnit) -> Option<bool> {
        unit.card().mute().with_gpio(|gpio| gpio.0).unwrap().flatten()
    }

    #[test]
    fn power_sequence() {
        let unit = test_unit();
        assert!(!unit.amp().is_powered().unwrap());
        assert_eq!(Some(true), dac_level(&unit));

        unit.output_power_event(true).unwrap();
        assert!(unit.amp().is_powered().unwrap());
        assert_eq!(Some(false), dac_level(&unit));

        unit.output_power_event(false).unwrap();
        assert!(!unit.amp().is_powered().unwrap());
        assert_eq!(Some(true), dac_level(&unit));
    }

    #[test]
    fn stream_with_power() {
        let unit = test_unit();
        unit.output_power_event(true).unwrap();

        assert_eq!(
            98_304_000,
            unit.card().hw_params(StreamId::Playback, 96000).unwrap()
        );
        assert!(unit.card().gate().is_enabled().unwrap());

        unit.teardown().unwrap();
        assert!(!unit.card().gate().is_enabled().unwrap());
        assert_eq!(Some(true), dac_level(&unit));
        assert!(!unit.amp().is_powered().unwrap());
    }
}
