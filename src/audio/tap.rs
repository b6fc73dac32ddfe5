// Lock-free tap of the master mix, used as the audio track of a recording.

use rtrb::{Consumer, Producer, RingBuffer};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Audio-thread half of the tap. Lives inside the mixer once connected.
pub struct TapWriter {
    producer: Producer<f32>,
    armed: Arc<AtomicBool>,
    overrun: Arc<AtomicBool>,
}

impl TapWriter {
    /// Push samples if a recording is listening (non-blocking, audio thread safe).
    /// Samples that do not fit are dropped and flagged as an overrun.
    pub fn write(&mut self, samples: &[f32]) {
        if !self.armed.load(Ordering::Relaxed) {
            return;
        }
        for &sample in samples {
            if self.producer.push(sample).is_err() {
                self.overrun.store(true, Ordering::Relaxed);
                break;
            }
        }
    }
}

/// Reader half of the tap, handed to the recording backend as its audio track.
#[derive(Clone)]
pub struct AudioTrack {
    consumer: Arc<Mutex<Consumer<f32>>>,
    armed: Arc<AtomicBool>,
    overrun: Arc<AtomicBool>,
    sample_rate: u32,
}

impl AudioTrack {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        1
    }

    /// Start receiving samples. Anything left over from an earlier session is
    /// discarded first.
    pub fn arm(&self) {
        if let Ok(mut consumer) = self.consumer.lock() {
            while consumer.pop().is_ok() {}
        }
        self.overrun.store(false, Ordering::Relaxed);
        self.armed.store(true, Ordering::Relaxed);
    }

    /// Stop the track. The writer stays connected but pushes nothing.
    pub fn stop(&self) {
        self.armed.store(false, Ordering::Relaxed);
    }

    pub fn is_live(&self) -> bool {
        self.armed.load(Ordering::Relaxed)
    }

    /// Move every available sample into `out`. Returns how many were read.
    pub fn read_into(&self, out: &mut Vec<f32>) -> usize {
        let Ok(mut consumer) = self.consumer.lock() else {
            return 0;
        };
        let mut count = 0;
        while let Ok(sample) = consumer.pop() {
            out.push(sample);
            count += 1;
        }
        count
    }

    /// Check whether samples were dropped since the last call.
    pub fn check_and_clear_overrun(&self) -> bool {
        self.overrun.swap(false, Ordering::Relaxed)
    }
}

/// A stream destination on the audio graph: created once, connected once.
pub struct AudioDestination {
    writer: Option<TapWriter>,
    track: AudioTrack,
}

impl AudioDestination {
    pub fn new(sample_rate: u32, capacity: usize) -> Self {
        let (producer, consumer) = RingBuffer::new(capacity.max(1));
        let armed = Arc::new(AtomicBool::new(false));
        let overrun = Arc::new(AtomicBool::new(false));
        Self {
            writer: Some(TapWriter {
                producer,
                armed: Arc::clone(&armed),
                overrun: Arc::clone(&overrun),
            }),
            track: AudioTrack {
                consumer: Arc::new(Mutex::new(consumer)),
                armed,
                overrun,
                sample_rate,
            },
        }
    }

    /// True once the writer half has been handed to the mixer.
    pub fn is_connected(&self) -> bool {
        self.writer.is_none()
    }

    pub(crate) fn take_writer(&mut self) -> Option<TapWriter> {
        self.writer.take()
    }

    pub(crate) fn restore_writer(&mut self, writer: TapWriter) {
        self.writer = Some(writer);
    }

    pub fn track(&self) -> AudioTrack {
        self.track.clone()
    }
}

impl fmt::Debug for TapWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapWriter")
            .field("armed", &self.armed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for AudioTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioTrack")
            .field("sample_rate", &self.sample_rate)
            .field("armed", &self.armed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for AudioDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioDestination")
            .field("connected", &self.is_connected())
            .field("track", &self.track)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unarmed_tap_drops_samples() {
        let mut dest = AudioDestination::new(48000, 16);
        let track = dest.track();
        let mut writer = dest.take_writer().unwrap();

        writer.write(&[0.1, 0.2]);
        let mut out = Vec::new();
        assert_eq!(track.read_into(&mut out), 0);

        track.arm();
        writer.write(&[0.1, 0.2, 0.3]);
        assert_eq!(track.read_into(&mut out), 3);
        assert_eq!(out, vec![0.1, 0.2, 0.3]);

        track.stop();
        writer.write(&[0.4]);
        assert_eq!(track.read_into(&mut out), 0);
    }

    #[test]
    fn overrun_is_flagged_and_cleared() {
        let mut dest = AudioDestination::new(48000, 4);
        let track = dest.track();
        let mut writer = dest.take_writer().unwrap();
        track.arm();

        writer.write(&[1.0; 8]);
        assert!(track.check_and_clear_overrun());
        assert!(!track.check_and_clear_overrun());
    }

    #[test]
    fn arming_discards_stale_samples() {
        let mut dest = AudioDestination::new(48000, 16);
        let track = dest.track();
        let mut writer = dest.take_writer().unwrap();
        track.arm();
        writer.write(&[0.5; 4]);

        track.arm();
        let mut out = Vec::new();
        assert_eq!(track.read_into(&mut out), 0);
    }

    #[test]
    fn concurrent_write_and_read() {
        use std::thread;

        let mut dest = AudioDestination::new(48000, 4096);
        let track = dest.track();
        let mut writer = dest.take_writer().unwrap();
        track.arm();

        let producer = thread::spawn(move || {
            for _ in 0..32 {
                writer.write(&[1.0; 64]);
            }
        });
        producer.join().unwrap();

        let mut out = Vec::new();
        assert_eq!(track.read_into(&mut out), 32 * 64);
    }
}
