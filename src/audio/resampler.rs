/*!
Format conversion between decoded resources and the output device.

Decoded sources are held fully in memory, so conversion is done once per
load: channels are remixed to the device layout, then frames are linearly
interpolated to the device rate.

```ignore
use crate::audio::resampler::prepare_for_device;

let device_samples = prepare_for_device(&decoded, 48_000, 2);
```
*/

use crate::audio::decoder::DecodedAudio;

/// Remix interleaved frames from `from` to `to` channels.
///
/// Mono is duplicated to every output channel; folding down to mono averages
/// the inputs; other layouts copy what fits and pad with silence.
pub fn remix_channels(input: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == 0 || to == 0 {
        return Vec::new();
    }
    if from == to {
        return input.to_vec();
    }

    let frames = input.len() / from;
    let mut out = Vec::with_capacity(frames * to);

    for frame in input.chunks_exact(from) {
        if from == 1 {
            out.extend(std::iter::repeat(frame[0]).take(to));
        } else if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            out.extend((0..to).map(|c| frame.get(c).copied().unwrap_or(0.0)));
        }
    }
    out
}

/// Linear-interpolation resample of interleaved frames.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    src_rate: u32,
    dst_rate: u32,
    channels: usize,
    /// Source frames per output frame
    step: f64,
}

impl LinearResampler {
    pub fn new(src_rate: u32, dst_rate: u32, channels: usize) -> Self {
        let step = if dst_rate == 0 { 0.0 } else { src_rate as f64 / dst_rate as f64 };
        Self {
            src_rate,
            dst_rate,
            channels,
            step,
        }
    }

    pub fn config(&self) -> (u32, u32, usize) {
        (self.src_rate, self.dst_rate, self.channels)
    }

    /// Resample a complete buffer. The last source frame is held for the tail.
    pub fn process(&self, input: &[f32]) -> Vec<f32> {
        let ch = self.channels;
        if ch == 0 || self.src_rate == 0 || self.dst_rate == 0 {
            return Vec::new();
        }
        if self.src_rate == self.dst_rate {
            return input.to_vec();
        }

        let in_frames = input.len() / ch;
        if in_frames == 0 {
            return Vec::new();
        }

        let out_frames = ((in_frames as f64) * (self.dst_rate as f64 / self.src_rate as f64)).round() as usize;
        let mut out = Vec::with_capacity(out_frames * ch);

        for n in 0..out_frames {
            let pos = n as f64 * self.step;
            let i = (pos.floor() as usize).min(in_frames - 1);
            let next = (i + 1).min(in_frames - 1);
            let frac = (pos - i as f64).clamp(0.0, 1.0) as f32;

            out.extend((0..ch).map(|c| {
                let s0 = input[i * ch + c];
                let s1 = input[next * ch + c];
                s0 + (s1 - s0) * frac
            }));
        }
        out
    }
}

/// Convert a decoded resource to the device's rate and channel layout
pub fn prepare_for_device(decoded: &DecodedAudio, device_rate: u32, device_channels: u16) -> Vec<f32> {
    let remixed = remix_channels(&decoded.samples, decoded.channels as usize, device_channels as usize);
    LinearResampler::new(decoded.sample_rate, device_rate, device_channels as usize).process(&remixed)
}
