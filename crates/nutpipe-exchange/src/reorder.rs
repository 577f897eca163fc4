//! Cross-stream frame reordering.
//!
//! A transcoder interleaves its output streams loosely, so frames arrive
//! slightly out of presentation order. The buffer holds frames until the
//! span between its oldest and newest entry exceeds the window, then
//! releases from the front in presentation order.

use std::collections::VecDeque;

use nutpipe_codec::{Frame, Rational};

/// Default reordering window in wall-clock milliseconds.
pub const DEFAULT_WINDOW_MS: i64 = 200;

pub struct ReorderBuffer {
    /// Resolved time base per stream id, for pts-to-millis conversion.
    time_bases: Vec<Rational>,
    window_ms: i64,
    pending: VecDeque<(i64, Frame)>,
}

impl ReorderBuffer {
    pub fn new(time_bases: Vec<Rational>) -> Self {
        Self::with_window(time_bases, DEFAULT_WINDOW_MS)
    }

    pub fn with_window(time_bases: Vec<Rational>, window_ms: i64) -> Self {
        Self {
            time_bases,
            window_ms,
            pending: VecDeque::new(),
        }
    }

    /// Insert a frame and return every frame now older than the window,
    /// in presentation order.
    pub fn push(&mut self, frame: Frame) -> Vec<Frame> {
        let ms = self
            .time_bases
            .get(frame.stream_id)
            .map_or(frame.pts, |tb| tb.millis(frame.pts));

        // Stable insert: a frame sorts after existing frames with equal time.
        let at = self.pending.partition_point(|(t, _)| *t <= ms);
        self.pending.insert(at, (ms, frame));

        let mut released = Vec::new();
        if let Some(&(newest, _)) = self.pending.back() {
            while let Some(&(oldest, _)) = self.pending.front() {
                if newest - oldest <= self.window_ms {
                    break;
                }
                if let Some((_, frame)) = self.pending.pop_front() {
                    released.push(frame);
                }
            }
        }
        released
    }

    /// Drain everything still pending, in presentation order.
    pub fn flush(&mut self) -> Vec<Frame> {
        self.pending.drain(..).map(|(_, frame)| frame).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn ms_frame(stream_id: usize, pts: i64) -> Frame {
        Frame::new(stream_id, pts, Bytes::from_static(b"x"))
    }

    fn buffer() -> ReorderBuffer {
        // Millisecond time base for both streams.
        ReorderBuffer::new(vec![Rational::new(1, 1000), Rational::new(1, 1000)])
    }

    #[test]
    fn holds_frames_inside_window() {
        let mut buf = buffer();
        assert!(buf.push(ms_frame(0, 0)).is_empty());
        assert!(buf.push(ms_frame(1, 150)).is_empty());
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn releases_oldest_when_window_exceeded() {
        let mut buf = buffer();
        buf.push(ms_frame(0, 0));
        buf.push(ms_frame(0, 100));
        let released = buf.push(ms_frame(0, 250));
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].pts, 0);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn reorders_across_streams() {
        let mut buf = buffer();
        buf.push(ms_frame(0, 120));
        buf.push(ms_frame(1, 40)); // late arrival, earlier pts
        let mut out = buf.push(ms_frame(0, 400));
        out.extend(buf.flush());
        let times: Vec<i64> = out.iter().map(|f| f.pts).collect();
        assert_eq!(times, vec![40, 120, 400]);
    }

    #[test]
    fn equal_times_keep_arrival_order() {
        let mut buf = buffer();
        buf.push(ms_frame(0, 50));
        buf.push(ms_frame(1, 50));
        let out = buf.flush();
        assert_eq!(out[0].stream_id, 0);
        assert_eq!(out[1].stream_id, 1);
    }

    #[test]
    fn converts_pts_using_stream_time_base() {
        // Stream 0 counts 25 fps frames, stream 1 counts samples.
        let mut buf =
            ReorderBuffer::new(vec![Rational::new(1, 25), Rational::new(1, 44100)]);
        buf.push(ms_frame(0, 2)); // 80 ms
        buf.push(ms_frame(1, 441)); // 10 ms
        let out = buf.flush();
        assert_eq!(out[0].stream_id, 1);
        assert_eq!(out[1].stream_id, 0);
    }

    #[test]
    fn flush_empties_the_buffer() {
        let mut buf = buffer();
        buf.push(ms_frame(0, 1));
        buf.push(ms_frame(0, 2));
        assert_eq!(buf.flush().len(), 2);
        assert!(buf.is_empty());
    }
}
