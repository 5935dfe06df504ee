/// Stereo FIFO the audio thread plays from.
///
/// Holds interleaved frames. Writing and reading both happen on the audio
/// thread, so there is no synchronization here; the cross-thread handoff
/// lives in [`crate::playback`].
pub struct RingBuffer {
    buffer: Vec<f32>,
    read_pos: usize,
    len: usize,
}

impl RingBuffer {
    /// Create a new ring buffer with the given capacity in frames.
    pub fn new(capacity_frames: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity_frames * 2],
            read_pos: 0,
            len: 0,
        }
    }

    fn capacity_frames(&self) -> usize {
        self.buffer.len() / 2
    }

    /// Append interleaved frames. Returns how many frames fit.
    pub fn write(&mut self, interleaved: &[f32]) -> usize {
        let capacity = self.capacity_frames();
        let frames = (interleaved.len() / 2).min(capacity - self.len);
        let mut write_pos = (self.read_pos + self.len) % capacity.max(1);
        for frame in interleaved.chunks_exact(2).take(frames) {
            self.buffer[write_pos * 2] = frame[0];
            self.buffer[write_pos * 2 + 1] = frame[1];
            write_pos = (write_pos + 1) % capacity;
        }
        self.len += frames;
        frames
    }

    /// Pop frames into the two output channels. Returns how many frames were read.
    pub fn read_into(&mut self, left: &mut [f32], right: &mut [f32]) -> usize {
        let capacity = self.capacity_frames();
        let frames = left.len().min(right.len()).min(self.len);
        for i in 0..frames {
            left[i] = self.buffer[self.read_pos * 2];
            right[i] = self.buffer[self.read_pos * 2 + 1];
            self.read_pos = (self.read_pos + 1) % capacity;
        }
        self.len -= frames;
        frames
    }

    /// Pop frames as a mono downmix.
    pub fn read_mixed_into(&mut self, out: &mut [f32]) -> usize {
        let capacity = self.capacity_frames();
        let frames = out.len().min(self.len);
        for sample in &mut out[..frames] {
            let base = self.read_pos * 2;
            *sample = 0.5 * (self.buffer[base] + self.buffer[base + 1]);
            self.read_pos = (self.read_pos + 1) % capacity;
        }
        self.len -= frames;
        frames
    }

    /// Drop everything buffered.
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.len = 0;
    }

    /// Number of frames currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total capacity in frames.
    pub fn capacity(&self) -> usize {
        self.capacity_frames()
    }
}
