//! Command queue: encoder lifecycle, frames in flight and deferred
//! resource release.
//!
//! The queue approximates GPU completion with a frames-in-flight counter
//! instead of per-buffer fences: a resource released while frame K is
//! being recorded is destroyed only when K's release slot comes around
//! again, `frames_in_flight` kicks later. This trades a small amount of
//! over-retention for never destroying anything a submitted command
//! buffer still references.

use crate::backend::{GpuResource, RenderBackend};

/// Encoder and deferred-release bookkeeping for one device queue.
pub struct CommandQueue {
    frames_in_flight: usize,
    release_write: usize,
    release_read: usize,
    release: Vec<Vec<GpuResource>>,
    in_flight: usize,
}

impl CommandQueue {
    pub fn new(frames_in_flight: usize) -> Self {
        let frames_in_flight = frames_in_flight.max(1);
        Self {
            frames_in_flight,
            release_write: 0,
            release_read: 0,
            release: (0..frames_in_flight).map(|_| Vec::new()).collect(),
            in_flight: 0,
        }
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Begin an encoder if none is live.
    pub fn ensure_encoder(&self, backend: &mut dyn RenderBackend) {
        if !backend.has_encoder() {
            backend.begin_encoder();
        }
    }

    /// Defer destruction of a device resource until the frame currently
    /// being recorded has retired.
    pub fn release(&mut self, resource: GpuResource) {
        self.release[self.release_write].push(resource);
    }

    pub fn release_all(&mut self, resources: Vec<GpuResource>) {
        self.release[self.release_write].extend(resources);
    }

    /// Resources waiting in the ring, all slots.
    pub fn pending_release_count(&self) -> usize {
        self.release.iter().map(Vec::len).sum()
    }

    /// Finalize and submit the live encoder. `end_frame` advances the
    /// release ring to the next frame slot.
    pub fn kick(&mut self, backend: &mut dyn RenderBackend, end_frame: bool) {
        if !backend.has_encoder() {
            return;
        }
        if end_frame {
            self.release_write = (self.release_write + 1) % self.frames_in_flight;
            self.in_flight = (self.in_flight + 1).min(self.frames_in_flight);
        }
        backend.submit();
    }

    /// Retire one frame slot (or all of them at shutdown), destroying
    /// every resource queued in each retired slot.
    pub fn finish(&mut self, backend: &mut dyn RenderBackend, finish_all: bool) {
        if finish_all {
            for _ in 0..self.frames_in_flight {
                self.consume(backend);
            }
            backend.wait_idle();
        } else {
            self.consume(backend);
        }
    }

    /// Advance the read index one slot and drop its resources. When the
    /// in-flight bound is reached this first drains the device, which is
    /// the backpressure that keeps recording from outrunning the GPU.
    fn consume(&mut self, backend: &mut dyn RenderBackend) {
        if self.in_flight >= self.frames_in_flight {
            backend.wait_idle();
        }
        self.in_flight = self.in_flight.saturating_sub(1);
        self.release_read = (self.release_read + 1) % self.frames_in_flight;
        let retired = std::mem::take(&mut self.release[self.release_read]);
        if !retired.is_empty() {
            log::trace!(
                "retiring {} deferred resources from slot {}",
                retired.len(),
                self.release_read
            );
        }
        drop(retired);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GpuBuffer, NullBackend, RenderBackend};
    use crate::types::buffer::{BufferDescriptor, BufferUsage};
    use std::sync::Weak;

    fn null_buffer(backend: &NullBackend) -> (GpuBuffer, Weak<crate::backend::null::NullResource>) {
        let buffer = backend
            .create_buffer(&BufferDescriptor::new(16, BufferUsage::COPY_SRC))
            .unwrap();
        let weak = match &buffer {
            GpuBuffer::Null(res) => std::sync::Arc::downgrade(res),
            #[cfg(feature = "wgpu-backend")]
            _ => unreachable!(),
        };
        (buffer, weak)
    }

    /// One full frame: retire a slot, record, kick.
    fn run_frame(cmd: &mut CommandQueue, backend: &mut NullBackend) {
        cmd.finish(backend, false);
        cmd.ensure_encoder(backend);
        cmd.kick(backend, true);
    }

    #[test]
    fn test_release_is_deferred_across_frames() {
        let mut backend = NullBackend::new();
        let mut cmd = CommandQueue::new(3);

        cmd.finish(&mut backend, false);
        cmd.ensure_encoder(&mut backend);
        let (buffer, weak) = null_buffer(&backend);
        cmd.release(GpuResource::Buffer(buffer));
        cmd.kick(&mut backend, true);

        // Not destroyed while its slot is still in flight.
        run_frame(&mut cmd, &mut backend);
        assert!(weak.upgrade().is_some(), "destroyed one frame too early");
        run_frame(&mut cmd, &mut backend);
        assert!(weak.upgrade().is_none(), "slot retired, resource must die");
    }

    #[test]
    fn test_n_plus_one_kicks_retire_everything() {
        let mut backend = NullBackend::new();
        let mut cmd = CommandQueue::new(3);
        let mut weaks = Vec::new();

        for _ in 0..4 {
            cmd.finish(&mut backend, false);
            cmd.ensure_encoder(&mut backend);
            let (buffer, weak) = null_buffer(&backend);
            cmd.release(GpuResource::Buffer(buffer));
            weaks.push(weak);
            cmd.kick(&mut backend, true);
        }

        // After N+1 frames the first frame's slot has been reused, so its
        // resource is gone; the most recent one still lives.
        assert!(weaks[0].upgrade().is_none());
        assert!(weaks[3].upgrade().is_some());
    }

    #[test]
    fn test_finish_all_drains_every_slot() {
        let mut backend = NullBackend::new();
        let mut cmd = CommandQueue::new(3);

        cmd.ensure_encoder(&mut backend);
        let (buffer, weak) = null_buffer(&backend);
        cmd.release(GpuResource::Buffer(buffer));
        cmd.kick(&mut backend, true);

        cmd.finish(&mut backend, true);
        assert!(weak.upgrade().is_none());
        assert_eq!(cmd.pending_release_count(), 0);
    }

    #[test]
    fn test_kick_without_encoder_is_noop() {
        let mut backend = NullBackend::new();
        let mut cmd = CommandQueue::new(3);
        cmd.kick(&mut backend, true);
        assert_eq!(backend.stats().submits, 0);
    }
}
