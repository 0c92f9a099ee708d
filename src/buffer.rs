use crate::error::{DaqError, Result};

/// Accumulates frames in arrival order and hands them out as fixed-size
/// chunks for the container writer.
///
/// The chunk length is one second of data (`sample_rate` frames), which
/// bounds both the memory held here and the window an abrupt termination
/// can lose.
pub struct ChunkBuffer {
    per_channel: Vec<Vec<f64>>,
    chunk_len: usize,
}

impl ChunkBuffer {
    pub fn new(channel_count: usize, chunk_len: usize) -> Result<Self> {
        if channel_count == 0 || chunk_len == 0 {
            return Err(DaqError::InvalidConfig(
                "chunk buffer needs at least one channel and a positive chunk length".into(),
            ));
        }
        Ok(Self {
            per_channel: vec![Vec::with_capacity(chunk_len); channel_count],
            chunk_len,
        })
    }

    /// Append one frame (one value per channel).
    pub fn push_frame(&mut self, frame: &[f64]) -> Result<()> {
        if frame.len() != self.per_channel.len() {
            return Err(DaqError::InvalidConfig(format!(
                "frame arity mismatch: expected {}, got {}",
                self.per_channel.len(),
                frame.len()
            )));
        }
        for (channel, &value) in self.per_channel.iter_mut().zip(frame) {
            channel.push(value);
        }
        Ok(())
    }

    /// Frames currently pending.
    pub fn pending(&self) -> usize {
        self.per_channel[0].len()
    }

    /// True once exactly one full chunk is pending.
    pub fn chunk_ready(&self) -> bool {
        self.pending() >= self.chunk_len
    }

    /// Remove and return one full chunk, or `None` if not enough is pending.
    pub fn take_chunk(&mut self) -> Option<Vec<Vec<f64>>> {
        if !self.chunk_ready() {
            return None;
        }
        Some(
            self.per_channel
                .iter_mut()
                .map(|channel| channel.drain(..self.chunk_len).collect())
                .collect(),
        )
    }

    /// Remove and return whatever is left, if anything; used when a session
    /// stops mid-chunk.
    pub fn drain_remainder(&mut self) -> Option<Vec<Vec<f64>>> {
        if self.pending() == 0 {
            return None;
        }
        Some(
            self.per_channel
                .iter_mut()
                .map(std::mem::take)
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_at_exact_boundary() {
        let mut buffer = ChunkBuffer::new(1, 4).unwrap();
        for i in 0..3 {
            buffer.push_frame(&[i as f64]).unwrap();
            assert!(buffer.take_chunk().is_none());
        }
        buffer.push_frame(&[3.0]).unwrap();
        let chunk = buffer.take_chunk().unwrap();
        assert_eq!(chunk, vec![vec![0.0, 1.0, 2.0, 3.0]]);
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn remainder_drains_partial_chunk() {
        let mut buffer = ChunkBuffer::new(2, 4).unwrap();
        buffer.push_frame(&[1.0, -1.0]).unwrap();
        buffer.push_frame(&[2.0, -2.0]).unwrap();
        assert!(buffer.take_chunk().is_none());
        let rest = buffer.drain_remainder().unwrap();
        assert_eq!(rest, vec![vec![1.0, 2.0], vec![-1.0, -2.0]]);
        assert!(buffer.drain_remainder().is_none());
    }

    #[test]
    fn rejects_wrong_arity() {
        let mut buffer = ChunkBuffer::new(2, 4).unwrap();
        assert!(buffer.push_frame(&[1.0]).is_err());
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn chunk_then_remainder_preserves_order() {
        let mut buffer = ChunkBuffer::new(1, 3).unwrap();
        for i in 0..5 {
            buffer.push_frame(&[i as f64]).unwrap();
        }
        assert_eq!(buffer.take_chunk().unwrap(), vec![vec![0.0, 1.0, 2.0]]);
        assert_eq!(buffer.drain_remainder().unwrap(), vec![vec![3.0, 4.0]]);
    }
}
