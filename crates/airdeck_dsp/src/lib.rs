//! Airdeck DSP - Sample Math for Deck Playback
//!
//! This crate provides the allocation-free building blocks used by the
//! deck render callback:
//! - Varispeed (pitch-rate) linear resampling
//! - Stepped volume ramps for fades, advanced by the audio clock
//! - Constant gain scaling
//!
//! # Architecture
//!
//! Everything here follows a strict "no allocation in audio callback" rule.
//! Functions operate on caller-provided interleaved `f32` slices.

mod error;
mod ramp;
mod resample;

pub use error::DspError;
pub use ramp::{apply_gain, SteppedRamp};
pub use resample::{consumed_frames, copy_frames, interpolate_first_channel};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        // Verify all public types are accessible
        let _ramp = SteppedRamp::fade_out(11, 4800).unwrap();
        assert_eq!(consumed_frames(512, 1.0), 512);
    }
}
