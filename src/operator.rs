use std::{
    io::{self, BufRead},
    thread,
};

use crossbeam_channel::{Receiver, Sender};

use crate::types::{OperatorCommand, PreviewUpdate};

/// Where operator decisions come from. The frame loop polls, the
/// continue/stop prompt blocks.
pub trait CommandSource {
    fn poll(&mut self) -> Option<OperatorCommand>;

    /// Blocks for the next command; `None` once the source is closed.
    fn wait(&mut self) -> Option<OperatorCommand>;
}

/// Receives annotated frames and status text for the operator.
pub trait PreviewSink {
    fn present(&mut self, update: PreviewUpdate);
}

impl PreviewSink for () {
    fn present(&mut self, _update: PreviewUpdate) {}
}

impl<P: PreviewSink + ?Sized> PreviewSink for &mut P {
    fn present(&mut self, update: PreviewUpdate) {
        (**self).present(update);
    }
}

pub struct ChannelCommands {
    rx: Receiver<OperatorCommand>,
}

impl ChannelCommands {
    pub fn new(rx: Receiver<OperatorCommand>) -> Self {
        Self { rx }
    }
}

impl CommandSource for ChannelCommands {
    fn poll(&mut self) -> Option<OperatorCommand> {
        self.rx.try_recv().ok()
    }

    fn wait(&mut self) -> Option<OperatorCommand> {
        self.rx.recv().ok()
    }
}

pub struct ChannelPreview {
    tx: Sender<PreviewUpdate>,
}

impl ChannelPreview {
    pub fn new(tx: Sender<PreviewUpdate>) -> Self {
        Self { tx }
    }
}

impl PreviewSink for ChannelPreview {
    fn present(&mut self, update: PreviewUpdate) {
        if update.frame.is_some() {
            // Drop frames while the window is still busy with the previous one.
            let _ = self.tx.try_send(update);
        } else {
            // Status changes must reach the window; fails fast once it is gone.
            let _ = self.tx.send(update);
        }
    }
}

/// Maps a preview-window key name to a command.
pub fn command_for_key(key: &str) -> Option<OperatorCommand> {
    match key.to_ascii_lowercase().as_str() {
        "space" | " " => Some(OperatorCommand::Start),
        "q" | "escape" => Some(OperatorCommand::Cancel),
        "s" | "y" => Some(OperatorCommand::Continue),
        "n" => Some(OperatorCommand::Stop),
        _ => None,
    }
}

/// Console answer to the continue prompt. Anything but yes means stop.
pub fn command_for_answer(answer: &str) -> OperatorCommand {
    match answer.trim().to_lowercase().as_str() {
        "s" | "si" | "sí" | "y" | "yes" => OperatorCommand::Continue,
        _ => OperatorCommand::Stop,
    }
}

/// Forwards console answers into the command channel until stdin closes.
pub fn spawn_console_reader(tx: Sender<OperatorCommand>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    log::warn!("console input failed: {err:?}");
                    break;
                }
            };
            if tx.send(command_for_answer(&line)).is_err() {
                break;
            }
        }
        log::debug!("console reader finished");
    })
}
