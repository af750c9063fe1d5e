//! SIGINT/SIGTERM delivery to the prompt loop.

use std::io;
use std::thread::{self, JoinHandle};

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Interrupt,
    Terminate,
}

/// Stops the signal thread when dropped.
pub struct SignalHookGuard {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl Drop for SignalHookGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Calls `on_signal` from a dedicated thread for every SIGINT/SIGTERM.
pub fn install_signal_handlers<F>(on_signal: F) -> io::Result<SignalHookGuard>
where
    F: Fn(SignalKind) + Send + 'static,
{
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();

    let thread = thread::Builder::new()
        .name("branch-chat-signals".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                let kind = if signal == SIGTERM {
                    SignalKind::Terminate
                } else {
                    SignalKind::Interrupt
                };
                tracing::debug!(?kind, "signal received");
                on_signal(kind);
            }
        })?;

    Ok(SignalHookGuard {
        handle,
        thread: Some(thread),
    })
}
