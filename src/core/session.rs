//! Session management
//!
//! Runs a shell on a pseudo-terminal and pumps its output to the main thread.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tracing::debug;

use super::TerminalError;

/// A shell running on a PTY
pub struct Session {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
    /// Cleared by the reader thread once the PTY is closed
    running: Arc<AtomicBool>,
    /// Channel to receive PTY output
    output_rx: Receiver<Vec<u8>>,
}

fn pty_size(cols: u16, rows: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

impl Session {
    /// Spawn `argv` on a new PTY of the given size
    pub fn spawn(argv: &[String], cwd: Option<&Path>, cols: u16, rows: u16) -> Result<Self, TerminalError> {
        let (program, args) = argv.split_first().ok_or(TerminalError::EmptyCommand)?;

        let pair = native_pty_system()
            .openpty(pty_size(cols, rows))
            .map_err(TerminalError::OpenPty)?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(args);
        cmd.env("TERM", "xterm-256color");
        if let Some(dir) = cwd {
            cmd.cwd(dir);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|reason| TerminalError::Spawn {
                program: program.clone(),
                reason,
            })?;
        // The child holds the only slave handle from here on, so the reader
        // sees EOF once it exits.
        drop(pair.slave);

        let writer = pair.master.take_writer().map_err(TerminalError::Io)?;
        let mut reader = pair.master.try_clone_reader().map_err(TerminalError::Io)?;

        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel::<Vec<u8>>();

        let reader_running = running.clone();
        thread::spawn(move || {
            let mut buffer = [0u8; 4096];
            loop {
                match reader.read(&mut buffer) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buffer[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
            reader_running.store(false, Ordering::SeqCst);
        });

        debug!("Spawned {:?} (pid {:?}) in {:?}", argv, child.process_id(), cwd);

        Ok(Self {
            master: pair.master,
            writer,
            child,
            running,
            output_rx: rx,
        })
    }

    pub fn process_id(&self) -> Option<u32> {
        self.child.process_id()
    }

    /// Check if the shell is still alive
    pub fn is_running(&mut self) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!("Child exited: {:?}", status);
                false
            }
            Ok(None) => true,
            Err(_) => false,
        }
    }

    /// Write input to the PTY
    pub fn write(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(data)?;
        self.writer.flush()
    }

    /// Drain pending output without blocking
    pub fn read_output(&mut self) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        loop {
            match self.output_rx.try_recv() {
                Ok(data) => chunks.push(data),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
        chunks
    }

    pub fn resize(&mut self, cols: u16, rows: u16) {
        if let Err(e) = self.master.resize(pty_size(cols, rows)) {
            debug!("PTY resize failed: {:#}", e);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Err(e) = self.child.kill() {
            // Already gone if the shell exited on its own
            debug!("Kill child process: {}", e);
        }
        if let Err(e) = self.child.wait() {
            debug!("Wait for child process: {}", e);
        }
    }
}
