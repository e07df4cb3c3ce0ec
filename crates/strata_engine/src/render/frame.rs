//! Per-frame draw and present protocol
//!
//! One call to [`drive_frame`] is one frame:
//!
//! 1. close requested: wait for the device to go idle, close the application, stop
//! 2. poll window events
//! 3. wait on the in-flight fence, then reset it
//! 4. acquire the next swapchain image
//! 5. record the command buffer for that image
//! 6. submit
//! 7. present
//!
//! The fence wait in step 3 keeps the CPU at most one frame ahead of the GPU.

use crate::application::CloseHandle;

use super::RenderResult;

/// What a call to [`drive_frame`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was submitted and presented
    Presented {
        /// Swapchain image the frame was drawn into
        image_index: u32,
    },
    /// The window asked to close; nothing was drawn
    Closed,
}

/// Device-side operations a frame is made of
pub trait FrameTarget {
    /// Whether the window has asked to close
    fn close_requested(&self) -> bool;

    /// Block until the device has no pending work
    fn wait_idle(&mut self) -> RenderResult<()>;

    /// Process pending window events
    fn poll_events(&mut self);

    /// Block until the previous frame's submission has completed
    fn wait_for_in_flight(&mut self) -> RenderResult<()>;

    /// Return the in-flight fence to the unsignaled state
    fn reset_in_flight(&mut self) -> RenderResult<()>;

    /// Acquire the next presentable image
    fn acquire_next_image(&mut self) -> RenderResult<u32>;

    /// Re-record the command buffer targeting `image_index`
    fn record_commands(&mut self, image_index: u32) -> RenderResult<()>;

    /// Submit the recorded command buffer
    fn submit(&mut self) -> RenderResult<()>;

    /// Present `image_index`
    fn present(&mut self, image_index: u32) -> RenderResult<()>;
}

/// Run one frame against `target`
pub fn drive_frame<T: FrameTarget + ?Sized>(
    target: &mut T,
    close: &CloseHandle,
) -> RenderResult<FrameOutcome> {
    if target.close_requested() {
        log::trace!("Window close requested, waiting for device idle");
        target.wait_idle()?;
        close.close();
        return Ok(FrameOutcome::Closed);
    }

    target.poll_events();

    target.wait_for_in_flight()?;
    target.reset_in_flight()?;

    let image_index = target.acquire_next_image()?;
    target.record_commands(image_index)?;
    target.submit()?;
    target.present(image_index)?;

    Ok(FrameOutcome::Presented { image_index })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::Application;
    use crate::layer::{Layer, LayerId, LayerResult};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        WaitIdle,
        Poll,
        WaitFence,
        ResetFence,
        Acquire,
        Record(u32),
        Submit,
        Present(u32),
    }

    /// Records every call; reports a close request once `frames_before_close` frames were drawn
    struct FakeTarget {
        calls: Rc<RefCell<Vec<Call>>>,
        frames_before_close: usize,
        frames: usize,
        image_count: u32,
    }

    impl FakeTarget {
        fn new(frames_before_close: usize) -> Self {
            Self {
                calls: Rc::new(RefCell::new(Vec::new())),
                frames_before_close,
                frames: 0,
                image_count: 3,
            }
        }

        fn push(&self, call: Call) {
            self.calls.borrow_mut().push(call);
        }
    }

    impl FrameTarget for FakeTarget {
        fn close_requested(&self) -> bool {
            self.frames >= self.frames_before_close
        }

        fn wait_idle(&mut self) -> RenderResult<()> {
            self.push(Call::WaitIdle);
            Ok(())
        }

        fn poll_events(&mut self) {
            self.push(Call::Poll);
        }

        fn wait_for_in_flight(&mut self) -> RenderResult<()> {
            self.push(Call::WaitFence);
            Ok(())
        }

        fn reset_in_flight(&mut self) -> RenderResult<()> {
            self.push(Call::ResetFence);
            Ok(())
        }

        fn acquire_next_image(&mut self) -> RenderResult<u32> {
            self.push(Call::Acquire);
            let index = self.frames as u32 % self.image_count;
            self.frames += 1;
            Ok(index)
        }

        fn record_commands(&mut self, image_index: u32) -> RenderResult<()> {
            self.push(Call::Record(image_index));
            Ok(())
        }

        fn submit(&mut self) -> RenderResult<()> {
            self.push(Call::Submit);
            Ok(())
        }

        fn present(&mut self, image_index: u32) -> RenderResult<()> {
            self.push(Call::Present(image_index));
            Ok(())
        }
    }

    struct FakeRenderLayer {
        target: FakeTarget,
        close: CloseHandle,
    }

    impl Layer for FakeRenderLayer {
        fn id(&self) -> LayerId {
            LayerId(0)
        }

        fn update(&mut self, _delta_time: f64) -> LayerResult {
            drive_frame(&mut self.target, &self.close)?;
            Ok(())
        }
    }

    #[test]
    fn test_frame_runs_steps_in_order() {
        let app = Application::new("test");
        let mut target = FakeTarget::new(usize::MAX);

        let outcome = drive_frame(&mut target, &app.close_handle()).unwrap();

        assert_eq!(outcome, FrameOutcome::Presented { image_index: 0 });
        assert_eq!(
            *target.calls.borrow(),
            vec![
                Call::Poll,
                Call::WaitFence,
                Call::ResetFence,
                Call::Acquire,
                Call::Record(0),
                Call::Submit,
                Call::Present(0),
            ]
        );
    }

    #[test]
    fn test_fence_is_waited_then_reset_once_per_frame() {
        let app = Application::new("test");
        let close = app.close_handle();
        let mut target = FakeTarget::new(usize::MAX);

        for _ in 0..4 {
            drive_frame(&mut target, &close).unwrap();
        }

        let fence_calls: Vec<Call> = target
            .calls
            .borrow()
            .iter()
            .copied()
            .filter(|call| matches!(call, Call::WaitFence | Call::ResetFence))
            .collect();
        assert_eq!(fence_calls.len(), 8);
        assert!(fence_calls
            .chunks(2)
            .all(|pair| pair == [Call::WaitFence, Call::ResetFence]));
    }

    #[test]
    fn test_close_request_waits_idle_and_skips_drawing() {
        let app = Application::new("test");
        let close = app.close_handle();
        let mut target = FakeTarget::new(0);

        let outcome = drive_frame(&mut target, &close).unwrap();

        assert_eq!(outcome, FrameOutcome::Closed);
        assert_eq!(*target.calls.borrow(), vec![Call::WaitIdle]);
        assert!(!close.is_running());
    }

    #[test]
    fn test_close_during_update_stops_application() {
        let mut app = Application::new("test");
        let target = FakeTarget::new(2);
        let calls = Rc::clone(&target.calls);
        let close = app.close_handle();
        app.add_layer(Box::new(FakeRenderLayer { target, close })).unwrap();

        app.initialize().unwrap();
        app.run().unwrap();

        let calls = calls.borrow();
        assert_eq!(calls.iter().filter(|call| **call == Call::WaitIdle).count(), 1);
        assert_eq!(calls.last(), Some(&Call::WaitIdle));
        assert_eq!(calls.iter().filter(|call| **call == Call::Submit).count(), 2);
        assert_eq!(app.clock().frame_count(), 3);
    }
}
