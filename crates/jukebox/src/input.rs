//! Debounced seek buttons and the smoothed volume knob.
//!
//! Buttons are sampled every control-loop pass. A press is accepted once the level has been
//! stable for the debounce delay and the repeat delay has passed since that button last fired,
//! so holding a button re-triggers at the repeat rate. The volume potentiometer is averaged over
//! a fixed window of raw ADC readings before it is mapped onto the volume scale.

use crate::watchdog::ActivityClock;

/// Accepted button trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Forward,
    Backward,
}

/// Pressed state of both buttons (already translated from active-low pin levels).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonLevels {
    pub forward: bool,
    pub backward: bool,
}

/// Raw hardware readings consumed by the sampler.
pub trait InputPins: Send {
    fn read_buttons(&mut self) -> ButtonLevels;
    /// Raw ADC reading of the volume knob, `None` when it could not be sampled.
    fn read_volume_raw(&mut self) -> Option<u16>;
}

#[derive(Debug, Clone, Copy)]
pub struct InputTiming {
    pub debounce_delay_ms: u64,
    pub repeat_delay_ms: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct VolumeScale {
    /// Raw readings averaged per published value.
    pub samples: u32,
    pub adc_max: u16,
    pub max_volume: u8,
}

#[derive(Debug, Default)]
struct DebouncedButton {
    last_raw: bool,
    last_change_ms: u64,
    last_trigger_ms: Option<u64>,
}

impl DebouncedButton {
    fn observe(&mut self, pressed: bool, now_ms: u64) {
        if pressed != self.last_raw {
            self.last_raw = pressed;
            self.last_change_ms = now_ms;
        }
    }

    fn ready(&self, now_ms: u64, timing: &InputTiming) -> bool {
        if !self.last_raw {
            return false;
        }
        if now_ms.saturating_sub(self.last_change_ms) < timing.debounce_delay_ms {
            return false;
        }
        self.last_trigger_ms
            .is_none_or(|t| now_ms.saturating_sub(t) >= timing.repeat_delay_ms)
    }

    fn fire(&mut self, now_ms: u64) {
        self.last_trigger_ms = Some(now_ms);
    }
}

#[derive(Debug)]
struct VolumeWindow {
    scale: VolumeScale,
    sum: u64,
    count: u32,
    current: u8,
}

impl VolumeWindow {
    fn push(&mut self, raw: u16) -> bool {
        self.sum += u64::from(raw.min(self.scale.adc_max));
        self.count += 1;
        if self.count < self.scale.samples.max(1) {
            return false;
        }
        let mean = self.sum / u64::from(self.count);
        self.current = map_to_volume(mean, self.scale.adc_max, self.scale.max_volume);
        self.sum = 0;
        self.count = 0;
        true
    }
}

/// Linear map of a mean ADC reading onto `0..=max_volume`.
pub fn map_to_volume(mean: u64, adc_max: u16, max_volume: u8) -> u8 {
    if adc_max == 0 {
        return 0;
    }
    let scaled = mean.min(u64::from(adc_max)) * u64::from(max_volume) / u64::from(adc_max);
    u8::try_from(scaled).unwrap_or(max_volume)
}

pub struct InputSampler {
    timing: InputTiming,
    forward: DebouncedButton,
    backward: DebouncedButton,
    volume: VolumeWindow,
    activity: ActivityClock,
}

impl InputSampler {
    pub fn new(
        timing: InputTiming,
        scale: VolumeScale,
        initial_volume: u8,
        activity: ActivityClock,
    ) -> Self {
        Self {
            timing,
            forward: DebouncedButton::default(),
            backward: DebouncedButton::default(),
            volume: VolumeWindow {
                scale,
                sum: 0,
                count: 0,
                current: initial_volume.min(scale.max_volume),
            },
            activity,
        }
    }

    /// Feed the current levels; returns at most one accepted trigger.
    ///
    /// Forward is checked first; a Backward press that is ready in the same pass stays
    /// pending for the next one.
    pub fn poll_buttons(&mut self, levels: ButtonLevels, now_ms: u64) -> Option<InputEvent> {
        self.forward.observe(levels.forward, now_ms);
        self.backward.observe(levels.backward, now_ms);

        let event = if self.forward.ready(now_ms, &self.timing) {
            self.forward.fire(now_ms);
            InputEvent::Forward
        } else if self.backward.ready(now_ms, &self.timing) {
            self.backward.fire(now_ms);
            InputEvent::Backward
        } else {
            return None;
        };
        self.activity.touch();
        Some(event)
    }

    /// Accumulate one raw reading. Returns true when a window completed and a new value was
    /// published.
    pub fn sample_volume(&mut self, raw: u16) -> bool {
        self.volume.push(raw)
    }

    pub fn read_volume(&self) -> u8 {
        self.volume.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;

    const TIMING: InputTiming = InputTiming {
        debounce_delay_ms: 50,
        repeat_delay_ms: 300,
    };

    fn sampler(samples: u32) -> (ActivityClock, InputSampler) {
        let activity = ActivityClock::new(ManualClock::at(0));
        let scale = VolumeScale {
            samples,
            adc_max: 4095,
            max_volume: 21,
        };
        let s = InputSampler::new(TIMING, scale, 10, activity.clone());
        (activity, s)
    }

    fn fwd(pressed: bool) -> ButtonLevels {
        ButtonLevels {
            forward: pressed,
            backward: false,
        }
    }

    #[test]
    fn press_fires_after_debounce_delay() {
        let (_, mut s) = sampler(200);
        assert_eq!(s.poll_buttons(fwd(true), 1_000), None);
        assert_eq!(s.poll_buttons(fwd(true), 1_049), None);
        assert_eq!(s.poll_buttons(fwd(true), 1_050), Some(InputEvent::Forward));
    }

    #[test]
    fn chatter_inside_debounce_window_never_fires() {
        let (_, mut s) = sampler(200);
        let mut events = 0;
        for i in 0..20u64 {
            if s.poll_buttons(fwd(i % 2 == 0), 1_000 + i * 10).is_some() {
                events += 1;
            }
        }
        assert_eq!(events, 0);
    }

    #[test]
    fn holding_repeats_at_repeat_delay() {
        let (_, mut s) = sampler(200);
        let mut fired = Vec::new();
        for t in (0..=1_000u64).step_by(5) {
            if s.poll_buttons(fwd(true), t).is_some() {
                fired.push(t);
            }
        }
        assert_eq!(fired, vec![50, 350, 650, 950]);
    }

    #[test]
    fn forward_wins_and_backward_stays_pending() {
        let (_, mut s) = sampler(200);
        let both = ButtonLevels {
            forward: true,
            backward: true,
        };
        s.poll_buttons(both, 0);
        assert_eq!(s.poll_buttons(both, 50), Some(InputEvent::Forward));
        assert_eq!(s.poll_buttons(both, 55), Some(InputEvent::Backward));
        assert_eq!(s.poll_buttons(both, 60), None);
    }

    #[test]
    fn accepted_press_touches_activity() {
        let (activity, mut s) = sampler(200);
        let before = activity.touch_count();
        s.poll_buttons(fwd(true), 0);
        assert_eq!(activity.touch_count(), before);
        s.poll_buttons(fwd(true), 50);
        assert_eq!(activity.touch_count(), before + 1);
    }

    #[test]
    fn volume_publishes_window_mean_and_resets() {
        let (_, mut s) = sampler(4);
        assert_eq!(s.read_volume(), 10);
        for raw in [0, 0, 4095, 4095] {
            s.sample_volume(raw);
        }
        // mean 2047 -> 2047 * 21 / 4095
        assert_eq!(s.read_volume(), 10);

        for raw in [4095, 4095, 4095] {
            assert!(!s.sample_volume(raw));
        }
        assert!(s.sample_volume(4095));
        assert_eq!(s.read_volume(), 21);

        for _ in 0..4 {
            s.sample_volume(0);
        }
        assert_eq!(s.read_volume(), 0);
    }

    #[test]
    fn map_to_volume_clamps_out_of_range_readings() {
        assert_eq!(map_to_volume(9_999, 4095, 21), 21);
        assert_eq!(map_to_volume(100, 0, 21), 0);
        assert_eq!(map_to_volume(2048, 4096, 100), 50);
    }
}
