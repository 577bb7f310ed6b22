// SPDX-License-Identifier: GPL-3.0-only

//! Swap-based frame exchange between a producer and a consumer thread
//!
//! Three buffers take part: the producer's load buffer, the shared ready
//! slot behind a mutex, and the consumer's visible buffer. Frames move
//! between them by `std::mem::swap`, never by copying, and the mutex is held
//! only for the swap itself. A consumer therefore never sees a frame the
//! producer is still writing.

use std::sync::{Mutex, MutexGuard, PoisonError};

struct ReadySlot<T> {
    value: T,
    is_new: bool,
}

pub struct DoubleBuffer<T> {
    ready: Mutex<ReadySlot<T>>,
}

impl<T: Default> Default for DoubleBuffer<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> DoubleBuffer<T> {
    pub fn new(initial: T) -> Self {
        Self {
            ready: Mutex::new(ReadySlot {
                value: initial,
                is_new: false,
            }),
        }
    }

    fn slot(&self) -> MutexGuard<'_, ReadySlot<T>> {
        self.ready.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand a completely written frame to the consumer
    ///
    /// `load` receives the previous ready frame, to be reused for the next write.
    pub fn publish(&self, load: &mut T) {
        let mut slot = self.slot();
        std::mem::swap(&mut slot.value, load);
        slot.is_new = true;
    }

    /// Swap the ready frame into `visible` if one was published since the last take
    ///
    /// Returns whether `visible` changed.
    pub fn take_new(&self, visible: &mut T) -> bool {
        let mut slot = self.slot();
        if !slot.is_new {
            return false;
        }
        std::mem::swap(&mut slot.value, visible);
        slot.is_new = false;
        true
    }

    pub fn has_new(&self) -> bool {
        self.slot().is_new
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn test_take_without_publish() {
        let buffer = DoubleBuffer::new(0u32);
        let mut visible = 7;
        assert!(!buffer.take_new(&mut visible));
        assert_eq!(visible, 7);
    }

    #[test]
    fn test_publish_then_take_once() {
        let buffer = DoubleBuffer::new(Vec::<u8>::new());
        let mut load = vec![1, 2, 3];
        buffer.publish(&mut load);
        assert!(load.is_empty());
        assert!(buffer.has_new());

        let mut visible = Vec::new();
        assert!(buffer.take_new(&mut visible));
        assert_eq!(visible, vec![1, 2, 3]);
        assert!(!buffer.take_new(&mut visible));
        assert_eq!(visible, vec![1, 2, 3]);
    }

    #[test]
    fn test_newest_frame_wins() {
        let buffer = DoubleBuffer::new(0u32);
        let mut load = 1;
        buffer.publish(&mut load);
        load = 2;
        buffer.publish(&mut load);

        let mut visible = 0;
        assert!(buffer.take_new(&mut visible));
        assert_eq!(visible, 2);
    }

    #[test]
    fn test_interleaved_frames_are_never_torn() {
        const FRAMES: u8 = 200;
        const FRAME_LEN: usize = 4096;

        let buffer = Arc::new(DoubleBuffer::new(vec![0u8; FRAME_LEN]));
        let (ready_tx, ready_rx) = mpsc::channel::<()>();
        let (ack_tx, ack_rx) = mpsc::channel::<()>();

        let producer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                let mut load = vec![0u8; FRAME_LEN];
                for frame in 1..=FRAMES {
                    load.clear();
                    load.resize(FRAME_LEN, frame);
                    buffer.publish(&mut load);
                    ready_tx.send(()).unwrap();
                    ack_rx.recv().unwrap();
                }
            })
        };

        let mut visible = Vec::new();
        for frame in 1..=FRAMES {
            ready_rx.recv().unwrap();
            assert!(buffer.take_new(&mut visible));
            assert_eq!(visible.len(), FRAME_LEN);
            assert!(visible.iter().all(|byte| *byte == frame));
            ack_tx.send(()).unwrap();
        }

        producer.join().unwrap();
    }

    #[test]
    fn test_free_running_frames_are_consistent() {
        const FRAME_LEN: usize = 1024;

        let buffer = Arc::new(DoubleBuffer::new(vec![0u8; FRAME_LEN]));
        let producer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                let mut load = vec![0u8; FRAME_LEN];
                for frame in 0..2000u32 {
                    let value = (frame % 251) as u8;
                    load.iter_mut().for_each(|byte| *byte = value);
                    load.resize(FRAME_LEN, value);
                    buffer.publish(&mut load);
                }
            })
        };

        let mut visible = Vec::new();
        while !producer.is_finished() {
            if buffer.take_new(&mut visible) {
                let first = visible[0];
                assert!(visible.iter().all(|byte| *byte == first));
            }
        }
        producer.join().unwrap();
    }
}
