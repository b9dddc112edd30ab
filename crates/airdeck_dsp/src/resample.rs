//! Pitch-Rate Resampling
//!
//! Varispeed playback: a block of `n` output frames consumes
//! `floor(n * rate)` source frames, which are then stretched or squeezed
//! back onto the output block by linear interpolation.
//!
//! # Channel handling
//!
//! Only the first source channel is interpolated. The result is written to
//! every output channel, so this is not a true multi-channel resampler.

/// Number of source frames consumed to produce `frame_count` output frames
/// at playback `rate`.
///
/// Never returns zero for a non-empty request, so playback always moves.
#[inline]
pub fn consumed_frames(frame_count: usize, rate: f32) -> usize {
    if frame_count == 0 {
        return 0;
    }
    ((frame_count as f64 * rate as f64).floor() as usize).max(1)
}

/// Copy whole frames from `source` to `out` at unity rate.
///
/// Output channel `c` takes source channel `c % source_channels`, so a mono
/// source fills every output channel and surplus source channels are
/// dropped. Returns the number of frames copied.
pub fn copy_frames(
    source: &[f32],
    source_channels: usize,
    out: &mut [f32],
    out_channels: usize,
) -> usize {
    if source_channels == 0 || out_channels == 0 {
        return 0;
    }

    let mut copied = 0;
    for (src, dst) in source
        .chunks_exact(source_channels)
        .zip(out.chunks_exact_mut(out_channels))
    {
        if source_channels == out_channels {
            dst.copy_from_slice(src);
        } else {
            for (channel, sample) in dst.iter_mut().enumerate() {
                *sample = src[channel % source_channels];
            }
        }
        copied += 1;
    }
    copied
}

/// Linearly interpolate the first channel of `source` onto `out`.
///
/// `source` is interleaved with `source_channels` channels and holds the
/// frames that are actually available. `span` is the number of frames the
/// block was meant to consume; output frame `k` samples source position
/// `k * (span - 1) / (out_frames - 1)`, i.e. the output grid spans the
/// full requested range even when `source` is shorter.
///
/// Output frames whose position lies beyond the available source are left
/// untouched. Returns the number of output frames written.
///
/// # Real-time Safety
/// No allocations, O(out_frames * out_channels).
pub fn interpolate_first_channel(
    source: &[f32],
    source_channels: usize,
    span: usize,
    out: &mut [f32],
    out_channels: usize,
) -> usize {
    if source_channels == 0 || out_channels == 0 {
        return 0;
    }

    let available = source.len() / source_channels;
    let out_frames = out.len() / out_channels;
    if available == 0 || out_frames == 0 {
        return 0;
    }

    let step = if out_frames > 1 {
        span.saturating_sub(1) as f64 / (out_frames - 1) as f64
    } else {
        0.0
    };
    let last = (available - 1) as f64;

    let mut written = 0;
    for (k, frame) in out.chunks_exact_mut(out_channels).enumerate() {
        let position = k as f64 * step;
        // Tolerate rounding error on the final grid point
        if position > last + 1e-9 {
            break;
        }

        let index = (position.floor() as usize).min(available - 1);
        let frac = (position - index as f64).clamp(0.0, 1.0) as f32;
        let s0 = source[index * source_channels];
        let s1 = if index + 1 < available {
            source[(index + 1) * source_channels]
        } else {
            s0
        };

        frame.fill(s0 + (s1 - s0) * frac);
        written += 1;
    }

    written
}
