use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use branch_chat::config::{system_prompt_from_env, ChatConfig};
use branch_chat::render::{render_notices, render_transcript};
use branch_chat::runtime::RuntimeController;
use branch_chat::session::Session;
use branch_chat::{logging, providers};
use message_tree::MessageId;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

enum Input {
    Line(String),
    Interrupt,
    Terminate,
    Eof,
}

fn main() -> anyhow::Result<()> {
    logging::init().context("failed to initialize logging")?;

    let config = ChatConfig::from_env().context("failed to load configuration")?;
    let transport = providers::transport_from_env(&config).map_err(anyhow::Error::msg)?;
    let profile = transport.profile();

    let session = Arc::new(Mutex::new(Session::with_system_prompt(
        config,
        system_prompt_from_env(),
    )));
    let controller = RuntimeController::new(Arc::clone(&session), transport);
    let mut host = Arc::clone(&controller);

    let (tx, rx) = mpsc::channel();
    spawn_stdin_reader(tx.clone()).context("failed to start input reader")?;
    #[cfg(unix)]
    let _signals = {
        let tx = tx.clone();
        branch_chat::signals::install_signal_handlers(move |kind| {
            let input = match kind {
                branch_chat::signals::SignalKind::Interrupt => Input::Interrupt,
                branch_chat::signals::SignalKind::Terminate => Input::Terminate,
            };
            let _ = tx.send(input);
        })
        .context("failed to register signal handlers")?
    };
    drop(tx);

    tracing::info!(
        transport = %profile.transport_id,
        model = %profile.model_id,
        "session started"
    );
    println!(
        "branch-chat ({} / {}). Type a message, or /help for commands.",
        profile.transport_id, profile.model_id
    );

    let mut printed_leaf: Option<MessageId> = None;
    let mut stdout = io::stdout();

    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Input::Line(line)) => {
                let mut session = lock_unpoisoned(&session);
                session.on_input_replace(line);
                session.on_submit(&mut host);
                if session.is_busy() && !session.input.trim().is_empty() {
                    session.input.clear();
                    writeln!(stdout, "! Still waiting for the previous reply; message not sent")?;
                }
            }
            Ok(Input::Interrupt) => lock_unpoisoned(&session).on_interrupt(&mut host),
            Ok(Input::Terminate | Input::Eof) | Err(RecvTimeoutError::Disconnected) => {
                lock_unpoisoned(&session).on_quit(&mut host)
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        controller.flush_pending_run_events();

        if controller.take_render_request() {
            let mut session = lock_unpoisoned(&session);
            let notices = session.take_notices();
            let leaf = session.tree().current_leaf_id().cloned();
            if leaf != printed_leaf || session.is_busy() {
                write!(stdout, "{}", render_transcript(&session))?;
                printed_leaf = leaf;
            }
            write!(stdout, "{}", render_notices(&notices))?;
            stdout.flush()?;
        }

        if controller.stop_requested() {
            break;
        }
    }

    Ok(())
}

fn spawn_stdin_reader(tx: Sender<Input>) -> io::Result<()> {
    thread::Builder::new()
        .name("branch-chat-stdin".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.send(Input::Line(line)).is_err() {
                    return;
                }
            }
            let _ = tx.send(Input::Eof);
        })?;
    Ok(())
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
