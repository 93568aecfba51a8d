mod countdown;
mod rest;

pub use countdown::{TimerState, WallClockTimer};
pub use rest::RestPeriod;
