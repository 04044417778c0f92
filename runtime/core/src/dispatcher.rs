// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2020 Takashi Sakamoto

use {
    super::*,
    alsactl::{prelude::CardExt, Card},
    glib::{prelude::IsA, source, ControlFlow, MainContext, MainLoop, Source},
    nix::sys::signal,
    std::{sync::Arc, thread, time::Duration},
    tracing::{debug, warn},
};

/// The thread to run event loop with own context.
pub struct Dispatcher {
    name: String,
    th: Option<thread::JoinHandle<()>>,
    ev_loop: Arc<MainLoop>,
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.ev_loop.quit();

        if let Some(th) = self.th.take() {
            if th.join().is_err() {
                warn!(name = self.name.as_str(), "Fail to join thread");
            }
        }
    }
}

impl Dispatcher {
    const LAUNCH_POLL_INTERVAL: Duration = Duration::from_millis(10);

    pub fn run(name: String) -> Result<Dispatcher, Error> {
        let ctx = MainContext::new();
        let ev_loop = Arc::new(MainLoop::new(Some(&ctx), false));

        let l = ev_loop.clone();
        let th = thread::Builder::new()
            .name(name.clone())
            .spawn(move || l.run())
            .map_err(|e| {
                let msg = format!("Fail to spawn thread for {}: {}", name, e);
                Error::new(glib::FileError::Failed, &msg)
            })?;

        while !ev_loop.is_running() {
            thread::sleep(Self::LAUNCH_POLL_INTERVAL);
        }

        debug!(name = name.as_str(), "dispatcher launched");

        Ok(Dispatcher {
            name,
            th: Some(th),
            ev_loop,
        })
    }

    pub fn stop(&mut self) {
        self.ev_loop.quit();
    }

    fn attach_src_to_ctx(&mut self, src: &Source) {
        let ctx = self.ev_loop.context();
        src.attach(Some(&ctx));
    }

    pub fn attach_signal_handler<F>(&mut self, signum: signal::Signal, cb: F)
    where
        F: FnMut() -> ControlFlow + Send + 'static,
    {
        let src =
            source::unix_signal_source_new(signum as i32, None, source::Priority::DEFAULT_IDLE, cb);

        self.attach_src_to_ctx(&src);
    }

    pub fn attach_snd_card<C, F>(&mut self, card: &C, disconnect_cb: F) -> Result<(), Error>
    where
        C: IsA<Card>,
        F: Fn(&C) + 'static,
    {
        let src = card.create_source()?;

        card.connect_handle_disconnection(disconnect_cb);

        self.attach_src_to_ctx(&src);

        Ok(())
    }
}
