//! Device state and the command-to-hardware binding.
//!
//! The session owns one [`DeviceState`]. Each decoded [`Command`] is applied
//! here synchronously: the recorded state changes and the [`OutputPin`] is
//! driven before the decoder looks at the next value. The encoder reads the
//! same record when building telemetry.

use crate::protocol::Command;

/// Hardware seam for the boolean output (an LED on the reference board).
pub trait OutputPin: Send + 'static {
    /// Drive the output. Must not block.
    fn set(&mut self, on: bool);
}

/// Output that ignores writes; used when no hardware is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPin;

impl OutputPin for NullPin {
    fn set(&mut self, _on: bool) {}
}

impl<F> OutputPin for F
where
    F: FnMut(bool) + Send + 'static,
{
    fn set(&mut self, on: bool) {
        self(on)
    }
}

/// Controllable and observable hardware state.
pub struct DeviceState {
    led: bool,
    pin: Box<dyn OutputPin>,
}

impl DeviceState {
    /// Create a state record driving `pin`. The output starts off.
    pub fn new(pin: Box<dyn OutputPin>) -> Self {
        Self { led: false, pin }
    }

    /// Current output state.
    #[inline]
    pub fn led(&self) -> bool {
        self.led
    }

    /// Apply a decoded command to the state and the hardware.
    pub fn apply(&mut self, command: Command) {
        tracing::trace!("Applying command led={}", command.led);
        self.led = command.led;
        self.pin.set(command.led);
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new(Box::new(NullPin))
    }
}

impl std::fmt::Debug for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceState").field("led", &self.led).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_default_is_off() {
        let state = DeviceState::default();
        assert!(!state.led());
    }

    #[test]
    fn test_apply_updates_state_and_pin() {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let sink = writes.clone();
        let mut state = DeviceState::new(Box::new(move |on: bool| sink.lock().unwrap().push(on)));

        state.apply(Command { led: true });
        assert!(state.led());
        state.apply(Command { led: false });
        assert!(!state.led());

        assert_eq!(*writes.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn test_debug_hides_pin() {
        let state = DeviceState::default();
        assert_eq!(format!("{:?}", state), "DeviceState { led: false }");
    }
}
