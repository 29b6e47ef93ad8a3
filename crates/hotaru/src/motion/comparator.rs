//! Frame comparison heuristics

/// Scores how different two equally sized frames are, from 0.0 to 1.0.
pub trait FrameComparator: Send {
    fn changed_fraction(&self, previous: &[u8], current: &[u8]) -> f32;
}

/// Compares every `stride`-th byte of two compressed frames.
///
/// This is a noisy proxy: it looks at entropy-coded JPEG bytes, not pixels,
/// so quantisation or a shifted Huffman run can flag change without any
/// movement in the scene. It is cheap enough to run on every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSampler {
    pub stride: usize,
    /// A sample counts as changed when it moves by more than this
    pub delta: u8,
}

impl Default for ByteSampler {
    fn default() -> Self {
        Self {
            stride: 50,
            delta: 15,
        }
    }
}

impl FrameComparator for ByteSampler {
    fn changed_fraction(&self, previous: &[u8], current: &[u8]) -> f32 {
        let len = previous.len().min(current.len());
        let mut examined = 0u32;
        let mut changed = 0u32;

        for i in (0..len).step_by(self.stride.max(1)) {
            examined += 1;
            if previous[i].abs_diff(current[i]) > self.delta {
                changed += 1;
            }
        }

        if examined == 0 {
            return 0.0;
        }
        changed as f32 / examined as f32
    }
}
