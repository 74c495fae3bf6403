//! Animated status line for long-running fetches.
//!
//! A spinner task owns stdout for the duration of a turn. It holds only an
//! atomic running flag and a message string, and must be stopped on both
//! the success and failure paths before anything else prints.

use parking_lot::Mutex;
use std::io::Write;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

const FRAMES: [&str; 4] = ["|", "/", "-", "\\"];
const FRAME_INTERVAL: Duration = Duration::from_millis(120);

#[derive(Clone)]
pub struct StatusLine {
    running: Arc<AtomicBool>,
    message: Arc<Mutex<String>>,
}

impl StatusLine {
    /// Start the spinner task and return a handle for updating it.
    pub fn start(message: &str) -> Self {
        let line = Self {
            running: Arc::new(AtomicBool::new(true)),
            message: Arc::new(Mutex::new(message.to_string())),
        };
        let spinner = line.clone();
        tokio::spawn(async move {
            let mut frame = 0usize;
            while spinner.running.load(Ordering::Acquire) {
                {
                    let message = spinner.message.lock();
                    print!("\r{} {}   ", FRAMES[frame % FRAMES.len()], message);
                }
                let _ = std::io::stdout().flush();
                frame += 1;
                tokio::time::sleep(FRAME_INTERVAL).await;
            }
        });
        line
    }

    pub fn set_message(&self, message: impl Into<String>) {
        *self.message.lock() = message.into();
    }

    /// Stop the animation and erase the line. Safe to call more than once.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            print!("\r{}\r", " ".repeat(72));
            let _ = std::io::stdout().flush();
        }
    }
}
