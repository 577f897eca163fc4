//! Exchange sessions.
//!
//! A session binds a negotiation endpoint, then runs the container I/O on a
//! worker thread so the caller can launch the peer process (typically an
//! ffmpeg invocation pointed at `tcp://<endpoint>`) and keep its own thread
//! free. `write_exchange` reorders the producer's frames within the pts
//! window and streams them out to the peer; `read_exchange` parses the
//! peer's output, reorders it and feeds a consumer.

use std::io::{BufReader, BufWriter};
use std::thread::{self, JoinHandle};

use nutpipe_codec::{CodecError, Frame, NutReader, NutWriter, Rational};
use nutpipe_transport::tcp::{CancelHandle, TcpNegotiator};
use tracing::{debug, warn};

use crate::adapter::FrameAdapter;
use crate::capability::{FrameConsumer, FrameProducer};
use crate::error::{ExchangeError, Result};
use crate::image_format::ImageFormat;
use crate::reorder::ReorderBuffer;

/// A running exchange with its negotiation endpoint and worker thread.
pub struct ExchangeSession {
    endpoint: String,
    cancel: CancelHandle,
    worker: JoinHandle<Result<()>>,
}

impl ExchangeSession {
    /// The `host:port` string to hand to the peer process.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Cancel the session; the worker then fails with a cancellation error.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the worker to finish and return its result.
    pub fn join(self) -> Result<()> {
        match self.worker.join() {
            Ok(result) => result,
            Err(_) => Err(ExchangeError::WorkerPanic),
        }
    }
}

/// Start an outbound exchange: the producer's frames are reordered within
/// the default pts window, containerized and streamed to whichever peer
/// connects to the returned endpoint.
pub fn write_exchange<P>(producer: P, format: Box<dyn ImageFormat>) -> Result<ExchangeSession>
where
    P: FrameProducer + 'static,
{
    write_exchange_with_window(producer, format, crate::reorder::DEFAULT_WINDOW_MS)
}

pub fn write_exchange_with_window<P>(
    mut producer: P,
    format: Box<dyn ImageFormat>,
    window_ms: i64,
) -> Result<ExchangeSession>
where
    P: FrameProducer + 'static,
{
    let negotiator = TcpNegotiator::bind()?;
    let endpoint = negotiator.endpoint();
    let cancel = negotiator.cancel_handle();
    let worker_cancel = negotiator.cancel_handle();

    let worker = thread::spawn(move || {
        let result = (|| {
            let stream = negotiator.negotiate()?;
            let adapter = FrameAdapter::new(producer.streams(), format);
            let time_bases = adapter.time_bases();
            let mut writer = NutWriter::new(
                BufWriter::new(stream),
                time_bases.clone(),
                adapter.stream_headers(),
            )?;

            // The container requires non-decreasing pts per stream, so every
            // produced frame passes through the window before it is written.
            let mut reorder = ReorderBuffer::with_window(time_bases, window_ms);
            let mut sent = 0u64;
            while let Some((stream_id, pts, frame)) = producer.next_frame()? {
                if worker_cancel.is_cancelled() {
                    return Err(ExchangeError::Cancelled);
                }
                let payload = adapter.encode(stream_id, &frame)?;
                for ready in reorder.push(Frame::new(stream_id, pts, payload)) {
                    writer.write_frame(&ready)?;
                }
                sent += 1;
            }
            for ready in reorder.flush() {
                writer.write_frame(&ready)?;
            }
            writer.finish()?;
            debug!(frames = sent, "outbound exchange finished");
            Ok(())
        })();
        finish_worker(result, &worker_cancel)
    });

    Ok(ExchangeSession {
        endpoint,
        cancel,
        worker,
    })
}

/// Start an inbound exchange: whatever the connecting peer writes is parsed,
/// reordered within the default window and handed to the consumer.
pub fn read_exchange<C>(consumer: C, format: Box<dyn ImageFormat>) -> Result<ExchangeSession>
where
    C: FrameConsumer + 'static,
{
    read_exchange_with_window(consumer, format, crate::reorder::DEFAULT_WINDOW_MS)
}

pub fn read_exchange_with_window<C>(
    mut consumer: C,
    format: Box<dyn ImageFormat>,
    window_ms: i64,
) -> Result<ExchangeSession>
where
    C: FrameConsumer + 'static,
{
    let negotiator = TcpNegotiator::bind()?;
    let endpoint = negotiator.endpoint();
    let cancel = negotiator.cancel_handle();
    let worker_cancel = negotiator.cancel_handle();

    let worker = thread::spawn(move || {
        let result = (|| {
            let stream = negotiator.negotiate()?;
            let mut reader = NutReader::new(BufReader::new(stream));
            reader.read_headers()?;

            let Some(main) = reader.main_header() else {
                return Err(ExchangeError::Codec(CodecError::MalformedContainer(
                    "missing main header".to_string(),
                )));
            };
            let time_bases: Vec<Rational> = reader
                .streams()
                .iter()
                .map(|s| main.time_bases[s.time_base_id as usize])
                .collect();
            let adapter = FrameAdapter::from_headers(main, reader.streams(), format)?;
            consumer.configure(adapter.streams())?;

            let mut reorder = ReorderBuffer::with_window(time_bases.clone(), window_ms);
            let mut received = 0u64;
            while let Some(frame) = reader.next_frame()? {
                if worker_cancel.is_cancelled() {
                    return Err(ExchangeError::Cancelled);
                }
                if frame.eor {
                    continue;
                }
                received += 1;
                for ready in reorder.push(frame) {
                    deliver(&mut consumer, &adapter, &time_bases, ready)?;
                }
            }
            for ready in reorder.flush() {
                deliver(&mut consumer, &adapter, &time_bases, ready)?;
            }
            consumer.finish()?;
            debug!(frames = received, "inbound exchange finished");
            Ok(())
        })();
        finish_worker(result, &worker_cancel)
    });

    Ok(ExchangeSession {
        endpoint,
        cancel,
        worker,
    })
}

/// Cancelling a connected session shuts its socket down, which surfaces
/// inside the codec as an I/O error (or a clean end of stream); either way
/// the session outcome is cancellation, not a stream failure.
fn finish_worker(result: Result<()>, cancel: &CancelHandle) -> Result<()> {
    if !cancel.is_cancelled() {
        return result;
    }
    if let Err(err) = &result {
        if !err.is_cancelled() {
            debug!(%err, "worker stopped by cancellation");
        }
    }
    Err(ExchangeError::Cancelled)
}

/// Decode one frame and hand it to the consumer. Frames whose payload does
/// not match the declared stream shape are dropped, since a transcoder that
/// is killed mid-write can emit a short final frame.
fn deliver<C: FrameConsumer>(
    consumer: &mut C,
    adapter: &FrameAdapter,
    time_bases: &[Rational],
    frame: Frame,
) -> Result<()> {
    let pts_ms = time_bases
        .get(frame.stream_id)
        .map_or(frame.pts, |tb| tb.millis(frame.pts));
    match adapter.decode(frame.stream_id, &frame.data) {
        Ok(media) => consumer.consume(frame.stream_id, pts_ms, media),
        Err(ExchangeError::BadFrame(reason)) => {
            warn!(
                stream_id = frame.stream_id,
                pts = frame.pts,
                %reason,
                "dropping undecodable frame"
            );
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::Read;
    use std::net::TcpStream;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::capability::{MediaFrame, StreamDescriptor};
    use crate::image_format::Bgr24;

    struct SampleProducer {
        streams: Vec<StreamDescriptor>,
        frames: VecDeque<(usize, i64, MediaFrame)>,
    }

    impl FrameProducer for SampleProducer {
        fn streams(&self) -> Vec<StreamDescriptor> {
            self.streams.clone()
        }

        fn next_frame(&mut self) -> Result<Option<(usize, i64, MediaFrame)>> {
            Ok(self.frames.pop_front())
        }
    }

    #[derive(Clone, Default)]
    struct Collector {
        streams: Arc<Mutex<Vec<StreamDescriptor>>>,
        frames: Arc<Mutex<Vec<(usize, i64, MediaFrame)>>>,
        finished: Arc<std::sync::atomic::AtomicBool>,
    }

    impl FrameConsumer for Collector {
        fn configure(&mut self, streams: &[StreamDescriptor]) -> Result<()> {
            self.streams.lock().unwrap().extend_from_slice(streams);
            Ok(())
        }

        fn consume(&mut self, stream_id: usize, pts_ms: i64, frame: MediaFrame) -> Result<()> {
            self.frames.lock().unwrap().push((stream_id, pts_ms, frame));
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            self.finished
                .store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    fn mono_audio() -> Vec<StreamDescriptor> {
        vec![StreamDescriptor::Audio {
            sample_rate: 44100,
            channels: 1,
        }]
    }

    #[test]
    fn write_exchange_produces_a_parseable_container() {
        let frames: Vec<(usize, i64, MediaFrame)> = (0..5)
            .map(|i| {
                (
                    0usize,
                    i * 1024,
                    MediaFrame::Audio((0..1024).map(|s| (i * 1024 + s) as i32).collect()),
                )
            })
            .collect();
        let producer = SampleProducer {
            streams: mono_audio(),
            frames: frames.clone().into(),
        };

        let session = write_exchange(producer, Box::new(Bgr24)).unwrap();
        let mut peer = TcpStream::connect(session.endpoint()).unwrap();
        let mut wire = Vec::new();
        peer.read_to_end(&mut wire).unwrap();
        session.join().unwrap();

        let mut reader = NutReader::new(std::io::Cursor::new(wire));
        let mut decoded = Vec::new();
        while let Some(frame) = reader.next_frame().unwrap() {
            if frame.eor {
                continue;
            }
            decoded.push(frame);
        }
        assert_eq!(decoded.len(), frames.len());
        for (frame, (_, pts, media)) in decoded.iter().zip(&frames) {
            assert_eq!(frame.pts, *pts);
            let MediaFrame::Audio(samples) = media else {
                panic!("expected audio");
            };
            let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_be_bytes()).collect();
            assert_eq!(frame.data.as_ref(), bytes.as_slice());
        }
    }

    #[test]
    fn audio_roundtrip_through_both_sessions() {
        // Writer session streams to a socket we pipe straight into the
        // reader session, standing in for a pass-through transcoder.
        let frames: Vec<(usize, i64, MediaFrame)> = (0..4)
            .map(|i| {
                (
                    0usize,
                    i * 441,
                    MediaFrame::Audio(vec![i as i32; 441]),
                )
            })
            .collect();
        let producer = SampleProducer {
            streams: mono_audio(),
            frames: frames.clone().into(),
        };
        let collector = Collector::default();

        let write_session = write_exchange(producer, Box::new(Bgr24)).unwrap();
        let read_session = read_exchange(collector.clone(), Box::new(Bgr24)).unwrap();

        let mut from = TcpStream::connect(write_session.endpoint()).unwrap();
        let mut to = TcpStream::connect(read_session.endpoint()).unwrap();
        let pump = thread::spawn(move || std::io::copy(&mut from, &mut to));

        write_session.join().unwrap();
        pump.join().unwrap().unwrap();
        read_session.join().unwrap();

        assert_eq!(collector.streams.lock().unwrap().as_slice(), mono_audio());
        assert!(collector.finished.load(std::sync::atomic::Ordering::SeqCst));
        let received = collector.frames.lock().unwrap();
        assert_eq!(received.len(), frames.len());
        for ((stream_id, pts_ms, media), (_, pts, sent)) in received.iter().zip(&frames) {
            assert_eq!(*stream_id, 0);
            assert_eq!(*pts_ms, pts * 1000 / 44100);
            assert_eq!(media, sent);
        }
        // Delivery in presentation order.
        let times: Vec<i64> = received.iter().map(|(_, t, _)| *t).collect();
        let mut sorted = times.clone();
        sorted.sort_unstable();
        assert_eq!(times, sorted);
    }

    #[test]
    fn out_of_order_producer_yields_sorted_container() {
        // 1 kHz audio makes one pts unit one millisecond; a 50 ms disorder
        // is well inside the default window.
        let streams = vec![StreamDescriptor::Audio {
            sample_rate: 1000,
            channels: 1,
        }];
        let frames: Vec<(usize, i64, MediaFrame)> = [0i64, 100, 50, 150]
            .iter()
            .map(|&pts| (0usize, pts, MediaFrame::Audio(vec![pts as i32; 8])))
            .collect();
        let producer = SampleProducer {
            streams,
            frames: frames.into(),
        };

        let session = write_exchange(producer, Box::new(Bgr24)).unwrap();
        let mut peer = TcpStream::connect(session.endpoint()).unwrap();
        let mut wire = Vec::new();
        peer.read_to_end(&mut wire).unwrap();
        session.join().unwrap();

        let mut reader = NutReader::new(std::io::Cursor::new(wire));
        let mut pts_seq = Vec::new();
        while let Some(frame) = reader.next_frame().unwrap() {
            if !frame.eor {
                pts_seq.push(frame.pts);
            }
        }
        assert_eq!(pts_seq, vec![0, 50, 100, 150]);
    }

    #[test]
    fn cancelled_session_reports_cancellation() {
        let producer = SampleProducer {
            streams: mono_audio(),
            frames: VecDeque::new(),
        };
        let session = write_exchange(producer, Box::new(Bgr24)).unwrap();
        session.cancel();
        let err = session.join().unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn cancel_unblocks_a_connected_but_silent_peer() {
        let collector = Collector::default();
        let session = read_exchange(collector, Box::new(Bgr24)).unwrap();

        // Connect but never write anything; the worker blocks reading the
        // magic until cancellation shuts the socket down.
        let peer = TcpStream::connect(session.endpoint()).unwrap();
        thread::sleep(std::time::Duration::from_millis(50));

        session.cancel();
        let err = session.join().unwrap_err();
        assert!(err.is_cancelled());
        drop(peer);
    }

    #[test]
    fn truncated_peer_output_still_flushes_received_frames() {
        let collector = Collector::default();
        let session = read_exchange(collector.clone(), Box::new(Bgr24)).unwrap();

        // Build a full container, then send only a prefix that cuts into the
        // second frame.
        let adapter = FrameAdapter::new(mono_audio(), Box::new(Bgr24));
        let mut writer = NutWriter::new(
            Vec::new(),
            adapter.time_bases(),
            adapter.stream_headers(),
        )
        .unwrap();
        for i in 0..2i64 {
            let payload = adapter
                .encode(0, &MediaFrame::Audio(vec![7; 441]))
                .unwrap();
            writer.write_frame(&Frame::new(0, i * 441, payload)).unwrap();
        }
        writer.finish().unwrap();
        let mut wire = writer.into_inner();
        wire.truncate(wire.len() - 500);

        let mut peer = TcpStream::connect(session.endpoint()).unwrap();
        std::io::Write::write_all(&mut peer, &wire).unwrap();
        drop(peer);

        session.join().unwrap();
        let received = collector.frames.lock().unwrap();
        assert_eq!(received.len(), 1);
    }
}
