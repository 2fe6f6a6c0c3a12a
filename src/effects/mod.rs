pub mod chorus;
pub mod common;
pub mod compressor;
pub mod delay;
pub mod equalizer;
pub mod level;
pub mod panner;
pub mod reverb;
pub mod shaper;

// The core trait that all processing stages must implement
pub trait Stage: Send + 'static {
    // Process a single stereo frame through this stage
    fn process(&mut self, left: f32, right: f32) -> (f32, f32);

    // Process a planar stereo block through this stage
    fn process_block(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let (out_l, out_r) = self.process(*l, *r);
            *l = out_l;
            *r = out_r;
        }
    }

    // Set a parameter value by name
    fn set_parameter(&mut self, name: &str, value: f32) -> Result<(), &'static str>;

    // Get a parameter value by name
    fn get_parameter(&self, name: &str) -> Result<f32, &'static str>;
}
