//! Sample-rate conversion from the native APU rate to the output device rate.
//!
//! Linear interpolation between the previous and the current frame. The
//! history is one frame deep so resampling is strictly causal and adds no
//! scheduling latency.

use super::ring_buffer::StereoFrame;

#[derive(Clone, Debug)]
pub struct StereoResampler {
    /// Input sample period expressed in output samples: `input_rate / output_rate`.
    step: f64,
    /// Position inside the current input interval, in [0, 1).
    phase: f64,
    previous: StereoFrame,
}

impl StereoResampler {
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        assert!(input_rate > 0 && output_rate > 0);
        Self {
            step: input_rate as f64 / output_rate as f64,
            phase: 0.0,
            previous: [0.0; 2],
        }
    }

    /// Feeds one input frame and emits the interpolated output frames that
    /// fall inside the interval ending at this frame.
    pub fn push(&mut self, frame: StereoFrame, mut sink: impl FnMut(StereoFrame)) {
        while self.phase < 1.0 {
            let t = self.phase as f32;
            sink([
                self.previous[0] + (frame[0] - self.previous[0]) * t,
                self.previous[1] + (frame[1] - self.previous[1]) * t,
            ]);
            self.phase += self.step;
        }
        self.phase -= 1.0;
        self.previous = frame;
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.previous = [0.0; 2];
    }
}
