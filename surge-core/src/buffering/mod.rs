//! Lock-free SPSC ring buffer between a capture callback and the audio worker.
//!
//! Uses `ringbuf::HeapRb<f32>`, whose `push_slice` is wait-free and safe to
//! call from a real-time audio callback.

pub mod window;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Producer};

/// Producer half, held by the capture callback thread.
pub type AudioProducer = ringbuf::HeapProd<f32>;

/// Consumer half, held by the track the audio worker reads from.
pub type AudioConsumer = ringbuf::HeapCons<f32>;

/// Buffer capacity: 2^18 = 262 144 f32 samples ≈ 5.5 s at 48 kHz.
/// The worker drains every callback, so only a stalled worker fills it.
pub const RING_CAPACITY: usize = 1 << 18;

/// Create a matched producer/consumer pair backed by a heap-allocated ring buffer.
pub fn create_audio_ring() -> (AudioProducer, AudioConsumer) {
    HeapRb::<f32>::new(RING_CAPACITY).split()
}
