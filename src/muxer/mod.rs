mod buffer;
mod error;
#[allow(clippy::module_inception)]
mod muxer;
mod pool;
mod reader;

pub use buffer::BufState;
pub use error::MuxError;
pub use muxer::{BufferSink, FlushOptions, LogMux, MuxConfig, OpWriter};
pub use reader::LogReader;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogKind;
    use statestream_serde::WireRead;

    struct NullSink;

    impl BufferSink for NullSink {
        fn send(&mut self, _log: LogKind, _payload: &[u8]) -> bool {
            true
        }
    }

    struct CaptureSink {
        sent: Vec<(LogKind, Vec<u8>)>,
    }

    impl CaptureSink {
        fn new() -> Self {
            Self { sent: Vec::new() }
        }
    }

    impl BufferSink for CaptureSink {
        fn send(&mut self, log: LogKind, payload: &[u8]) -> bool {
            self.sent.push((log, payload.to_vec()));
            true
        }
    }

    fn small_mux(capacity: usize, limit: usize) -> LogMux {
        LogMux::new(MuxConfig {
            buffer_capacity: capacity,
            pool_limit: limit,
        })
    }

    fn write_op(mux: &LogMux, log: LogKind, bytes: &[u8]) {
        let mut op = mux.begin_op(log).unwrap();
        op.write(bytes).unwrap();
        op.commit().unwrap();
    }

    fn drain(mux: &LogMux, log: LogKind) -> Vec<u8> {
        let mut reader = mux.reader(log);
        let mut out = Vec::new();
        while !reader.is_empty() {
            let n = reader.remaining();
            let mut chunk = vec![0u8; n];
            reader.read_exact(&mut chunk).unwrap();
            out.extend_from_slice(&chunk);
        }
        out
    }

    #[test]
    fn ops_in_one_log_replay_in_write_order() {
        let mux = small_mux(64, 8);
        write_op(&mux, LogKind::Event, &[1, 1, 1, 1]);
        write_op(&mux, LogKind::Event, &[2, 2, 2, 2]);
        write_op(&mux, LogKind::Event, &[3, 3, 3, 3]);

        assert_eq!(
            drain(&mux, LogKind::Event),
            vec![1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3]
        );
    }

    #[test]
    fn oversize_write_fails_without_mutating() {
        let mux = small_mux(16, 8);
        let mut op = mux.begin_op(LogKind::Update).unwrap();
        let result = op.write(&[0u8; 17]);
        assert_eq!(
            result,
            Err(MuxError::OversizeOp {
                size: 17,
                capacity: 16
            })
        );
        drop(op);

        // nothing was committed anywhere
        assert!(mux.is_empty(LogKind::Update));
    }

    #[test]
    fn oversize_op_across_writes_fails_and_discards_partial() {
        let mux = small_mux(16, 8);
        let mut op = mux.begin_op(LogKind::Update).unwrap();
        op.write(&[7u8; 12]).unwrap();
        let result = op.write(&[7u8; 8]);
        assert_eq!(
            result,
            Err(MuxError::OversizeOp {
                size: 20,
                capacity: 16
            })
        );
        assert!(op.commit().is_err());
        assert!(mux.is_empty(LogKind::Update));
    }

    #[test]
    fn rotation_keeps_each_op_whole() {
        // first op fills the buffer to capacity - 1, the second op's two
        // bytes force a rotation
        let capacity = 16;
        let mux = small_mux(capacity, 8);
        write_op(&mux, LogKind::Event, &[0xAA; 15]);

        let mut op = mux.begin_op(LogKind::Event).unwrap();
        op.write(&[0xBB]).unwrap();
        op.write(&[0xCC]).unwrap();
        op.commit().unwrap();

        // opcode 1 whole in buffer 1, opcode 2 whole in buffer 2
        let mut reader = mux.reader(LogKind::Event);
        assert!(!reader.is_empty());
        assert_eq!(reader.remaining(), 15);
        let mut first = vec![0u8; 15];
        reader.read_exact(&mut first).unwrap();
        assert!(first.iter().all(|&b| b == 0xAA));

        assert!(!reader.is_empty());
        assert_eq!(reader.remaining(), 2);
        let mut second = [0u8; 2];
        reader.read_exact(&mut second).unwrap();
        assert_eq!(second, [0xBB, 0xCC]);
        assert!(reader.is_empty());
    }

    #[test]
    fn pool_exhaustion_is_an_error_not_a_block() {
        let mux = small_mux(8, 1);
        write_op(&mux, LogKind::Update, &[1u8; 8]); // fills the only buffer

        let result = mux.begin_op(LogKind::Update);
        assert!(matches!(
            result.map(|_| ()),
            Err(MuxError::PoolExhausted { limit: 1 })
        ));
    }

    #[test]
    fn update_log_is_discarded_locally_after_flush() {
        let mux = small_mux(64, 8);
        write_op(&mux, LogKind::Update, &[5, 5, 5, 5]);
        write_op(&mux, LogKind::Event, &[6, 6, 6, 6]);

        let mut sink = CaptureSink::new();
        mux.flush(
            FlushOptions {
                forward_updates: true,
                forward_events: true,
            },
            &mut sink,
        );

        assert_eq!(sink.sent.len(), 2);
        assert!(sink
            .sent
            .iter()
            .any(|(log, bytes)| *log == LogKind::Update && bytes == &vec![5, 5, 5, 5]));
        assert!(sink
            .sent
            .iter()
            .any(|(log, bytes)| *log == LogKind::Event && bytes == &vec![6, 6, 6, 6]));

        // updates were applied locally already; only events replay
        assert!(mux.is_empty(LogKind::Update));
        assert_eq!(drain(&mux, LogKind::Event), vec![6, 6, 6, 6]);
    }

    #[test]
    fn priority_log_is_discarded_even_when_forwarding_is_off() {
        let mux = small_mux(64, 8);
        write_op(&mux, LogKind::Priority, &[9, 9, 9, 9]);

        let mut sink = CaptureSink::new();
        mux.flush(FlushOptions::default(), &mut sink);

        assert!(sink.sent.is_empty());
        assert!(mux.is_empty(LogKind::Priority));
    }

    #[test]
    fn flush_does_not_forward_a_buffer_twice() {
        let mux = small_mux(64, 8);
        write_op(&mux, LogKind::Event, &[4, 4, 4, 4]);

        let mut sink = CaptureSink::new();
        let options = FlushOptions {
            forward_updates: false,
            forward_events: true,
        };
        mux.flush(options, &mut sink);
        mux.flush(options, &mut sink);

        assert_eq!(sink.sent.len(), 1);
    }

    #[test]
    fn buffers_recycle_after_drain() {
        let mux = small_mux(8, 1);
        write_op(&mux, LogKind::Update, &[1u8; 8]); // cursor now holds the full buffer

        let mut sink = NullSink;
        mux.flush(FlushOptions::default(), &mut sink);
        // the cursor still references the buffer; its next op lets go of it
        // and allocates, which must succeed once the buffer is recycled
        write_op(&mux, LogKind::Update, &[2u8; 4]);

        let mut sink = NullSink;
        mux.flush(FlushOptions::default(), &mut sink);
        assert!(mux.is_empty(LogKind::Update));
    }

    #[test]
    fn concurrent_writers_on_distinct_logs_do_not_interleave() {
        use std::sync::Arc;
        use std::thread;

        let mux = Arc::new(small_mux(64, 16));

        let update_mux = mux.clone();
        let update_thread = thread::spawn(move || {
            for i in 0..3u8 {
                write_op(&update_mux, LogKind::Update, &[i + 1; 4]);
            }
        });
        let event_mux = mux.clone();
        let event_thread = thread::spawn(move || {
            for i in 0..2u8 {
                write_op(&event_mux, LogKind::Event, &[i + 10; 4]);
            }
        });
        update_thread.join().unwrap();
        event_thread.join().unwrap();

        let mut sink = CaptureSink::new();
        mux.flush(
            FlushOptions {
                forward_updates: true,
                forward_events: true,
            },
            &mut sink,
        );

        let updates: Vec<u8> = sink
            .sent
            .iter()
            .filter(|(log, _)| *log == LogKind::Update)
            .flat_map(|(_, bytes)| bytes.clone())
            .collect();
        let events: Vec<u8> = sink
            .sent
            .iter()
            .filter(|(log, _)| *log == LogKind::Event)
            .flat_map(|(_, bytes)| bytes.clone())
            .collect();

        assert_eq!(updates, vec![1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3]);
        assert_eq!(events, vec![10, 10, 10, 10, 11, 11, 11, 11]);
    }

    #[test]
    fn closed_mux_rejects_ops() {
        let mux = small_mux(64, 8);
        mux.close();
        assert!(matches!(
            mux.begin_op(LogKind::Update).map(|_| ()),
            Err(MuxError::LogClosed)
        ));
    }
}
