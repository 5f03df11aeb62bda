use crate::audio::buffer::AudioBuffer;

/// Distortion amounts at or below this leave the signal linear
pub const DISTORTION_THRESHOLD: f32 = 0.01;

/// Drive applied to the tanh curve per unit of distortion
const DRIVE_SCALE: f32 = 10.0;

#[inline]
pub fn shape_sample(input: f32, gain: f32, distortion: f32) -> f32 {
    let mut x = input * gain;
    if distortion > DISTORTION_THRESHOLD {
        x = (x * distortion * DRIVE_SCALE).tanh();
    }
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

pub fn process_samples(samples: &mut [f32], gain: f32, distortion: f32) {
    for s in samples.iter_mut() {
        *s = shape_sample(*s, gain, distortion);
    }
}

/// Apply the effect in place to the first `input_channels` channels.
pub fn process_block(buffer: &mut AudioBuffer, input_channels: usize, gain: f32, distortion: f32) {
    let channels = input_channels.min(buffer.num_channels());
    for ch in 0..channels {
        process_samples(buffer.channel_mut(ch), gain, distortion);
    }
}
