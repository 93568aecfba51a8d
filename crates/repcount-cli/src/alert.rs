//! Terminal backends for alarm delivery.

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use repcount_core::{AlertSink, DeliveryError, TimerKind, WakeLock};

/// Alerts on the controlling terminal: a banner for the notification, the
/// bell for sound and a flashing marker in place of haptics.
pub struct TerminalAlert {
    sound: Option<PathBuf>,
}

impl TerminalAlert {
    pub fn new(sound: Option<PathBuf>) -> Self {
        Self { sound }
    }

    fn write(&self, text: &str) -> Result<(), std::io::Error> {
        let mut out = std::io::stdout().lock();
        out.write_all(text.as_bytes())?;
        out.flush()
    }
}

impl AlertSink for TerminalAlert {
    fn show_notification(&self, kind: TimerKind) -> Result<(), DeliveryError> {
        let banner = match kind {
            TimerKind::Rest => "\n>>> Rest is over, start the next series. Type `ack` to silence.\n",
        };
        self.write(banner)
            .map_err(|e| DeliveryError::Notification(e.to_string()))
    }

    fn clear_notification(&self) {
        let _ = self.write("alert cleared\n");
    }

    fn play_sound(&self) -> Result<(), DeliveryError> {
        if let Some(path) = &self.sound {
            if !path.exists() {
                return Err(DeliveryError::SoundUnavailable(path.display().to_string()));
            }
        }
        self.write("\x07")
            .map_err(|e| DeliveryError::SoundUnavailable(e.to_string()))
    }

    fn vibrate(&self) -> Result<(), DeliveryError> {
        self.write("* ")
            .map_err(|e| DeliveryError::Vibration(e.to_string()))
    }
}

/// A foreground CLI process never sleeps while it runs, so holding the
/// lock only tracks ownership.
#[derive(Debug, Default)]
pub struct ProcessWakeLock {
    held: AtomicBool,
}

impl WakeLock for ProcessWakeLock {
    fn acquire(&self, ceiling: Duration) -> Result<(), DeliveryError> {
        if self.held.swap(true, Ordering::SeqCst) {
            return Err(DeliveryError::WakeLockDenied("already held".into()));
        }
        tracing::debug!(ceiling_secs = ceiling.as_secs(), "wake lock acquired");
        Ok(())
    }

    fn release(&self) {
        if self.held.swap(false, Ordering::SeqCst) {
            tracing::debug!("wake lock released");
        }
    }
}
