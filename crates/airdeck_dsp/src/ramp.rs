//! Stepped Volume Ramps
//!
//! A fade is a sequence of equally spaced levels between two endpoints,
//! each held for a fixed number of frames. Holding discrete levels (rather
//! than a smooth per-sample curve) keeps the audible result identical to
//! the classic "ten percent every tenth of a second" fade.
//!
//! The ramp is advanced by the audio callback, so it is tied to the audio
//! clock and never needs a timer thread.

use crate::error::DspError;

/// Multiply every sample by `gain`
///
/// # Real-time Safety
/// No allocations, O(n).
#[inline]
pub fn apply_gain(buffer: &mut [f32], gain: f32) {
    if (gain - 1.0).abs() <= f32::EPSILON {
        return;
    }
    for sample in buffer.iter_mut() {
        *sample *= gain;
    }
}

/// A level that walks from `start` to `end` in `steps` discrete steps
#[derive(Debug, Clone, PartialEq)]
pub struct SteppedRamp {
    start: f32,
    end: f32,
    steps: usize,
    frames_per_step: usize,
    elapsed: usize,
}

impl SteppedRamp {
    /// Create a ramp. Step 0 is `start`, step `steps - 1` is `end`.
    pub fn new(start: f32, end: f32, steps: usize, frames_per_step: usize) -> Result<Self, DspError> {
        if steps < 2 {
            return Err(DspError::InvalidStepCount(steps));
        }
        if frames_per_step == 0 {
            return Err(DspError::ZeroStepLength);
        }
        Ok(Self {
            start,
            end,
            steps,
            frames_per_step,
            elapsed: 0,
        })
    }

    /// 1.0 down to 0.0
    pub fn fade_out(steps: usize, frames_per_step: usize) -> Result<Self, DspError> {
        Self::new(1.0, 0.0, steps, frames_per_step)
    }

    /// 0.0 up to 1.0
    pub fn fade_in(steps: usize, frames_per_step: usize) -> Result<Self, DspError> {
        Self::new(0.0, 1.0, steps, frames_per_step)
    }

    /// Level of step `index` (clamped to the last step)
    ///
    /// Computed as a weighted mean of the endpoints so that a 1.0 -> 0.0
    /// ramp over 11 steps lands exactly on `(10 - i) / 10`.
    pub fn step_level(&self, index: usize) -> f32 {
        let index = index.min(self.steps - 1);
        let last = (self.steps - 1) as f32;
        (self.start * (last - index as f32) + self.end * index as f32) / last
    }

    /// All step levels in order
    pub fn levels(&self) -> impl Iterator<Item = f32> + '_ {
        (0..self.steps).map(move |i| self.step_level(i))
    }

    /// Index of the step currently being held
    pub fn current_step(&self) -> usize {
        (self.elapsed / self.frames_per_step).min(self.steps - 1)
    }

    /// Current level
    #[inline]
    pub fn level(&self) -> f32 {
        if self.is_finished() {
            return self.end;
        }
        self.step_level(self.current_step())
    }

    /// Final level
    pub fn end(&self) -> f32 {
        self.end
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn frames_per_step(&self) -> usize {
        self.frames_per_step
    }

    /// Frames needed to run the ramp to completion (every step held once)
    pub fn total_frames(&self) -> usize {
        self.steps * self.frames_per_step
    }

    /// Whether the last step has been held for its full length
    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.total_frames()
    }

    /// Move the ramp forward by `frames`
    #[inline]
    pub fn advance(&mut self, frames: usize) {
        self.elapsed = self.elapsed.saturating_add(frames).min(self.total_frames());
    }

    /// Scale an interleaved buffer by the ramp, advancing one frame at a time.
    ///
    /// Works in runs of constant level, so the cost is one multiply per
    /// sample plus one level computation per step boundary crossed.
    ///
    /// # Real-time Safety
    /// No allocations, O(n).
    pub fn apply(&mut self, buffer: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }

        let frames = buffer.len() / channels;
        let mut frame = 0;
        while frame < frames {
            let run = if self.is_finished() {
                frames - frame
            } else {
                let into_step = self.elapsed % self.frames_per_step;
                (self.frames_per_step - into_step).min(frames - frame)
            };

            let gain = self.level();
            for sample in &mut buffer[frame * channels..(frame + run) * channels] {
                *sample *= gain;
            }

            self.advance(run);
            frame += run;
        }
    }
}
