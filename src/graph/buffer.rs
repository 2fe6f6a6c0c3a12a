/// Planar stereo block of a fixed number of frames.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoBuffer {
    left: Vec<f32>,
    right: Vec<f32>,
}

impl StereoBuffer {
    pub fn new(frames: usize) -> Self {
        Self {
            left: vec![0.0; frames],
            right: vec![0.0; frames],
        }
    }

    pub fn frames(&self) -> usize {
        self.left.len()
    }

    pub fn left(&self) -> &[f32] {
        &self.left
    }

    pub fn right(&self) -> &[f32] {
        &self.right
    }

    pub fn channels_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        (&mut self.left, &mut self.right)
    }

    pub fn clear(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);
    }

    /// Copy from planar slices; missing frames are zero.
    pub fn copy_from(&mut self, left: &[f32], right: &[f32]) {
        copy_padded(&mut self.left, left);
        copy_padded(&mut self.right, right);
    }

    pub fn copy_to(&self, left: &mut [f32], right: &mut [f32]) {
        copy_padded(left, &self.left);
        copy_padded(right, &self.right);
    }

    /// Mix `other` into this buffer.
    pub fn add(&mut self, other: &StereoBuffer) {
        for (dst, src) in self.left.iter_mut().zip(&other.left) {
            *dst += src;
        }
        for (dst, src) in self.right.iter_mut().zip(&other.right) {
            *dst += src;
        }
    }
}

fn copy_padded(dst: &mut [f32], src: &[f32]) {
    let n = dst.len().min(src.len());
    dst[..n].copy_from_slice(&src[..n]);
    dst[n..].fill(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_copy() {
        let mut a = StereoBuffer::new(3);
        a.copy_from(&[1.0, 2.0, 3.0], &[-1.0]);
        assert_eq!(a.right(), &[-1.0, 0.0, 0.0]);

        let b = a.clone();
        a.add(&b);
        assert_eq!(a.left(), &[2.0, 4.0, 6.0]);
        assert_eq!(a.right(), &[-2.0, 0.0, 0.0]);

        let mut l = [9.0; 4];
        let mut r = [9.0; 4];
        a.copy_to(&mut l, &mut r);
        assert_eq!(l, [2.0, 4.0, 6.0, 0.0]);
        assert_eq!(r, [-2.0, 0.0, 0.0, 0.0]);

        a.clear();
        assert!(a.left().iter().chain(a.right()).all(|&s| s == 0.0));
    }
}
