//! Time management utilities
//!
//! The [`Clock`] records the application lifecycle timestamps and derives
//! the frame and layer deltas handed to layers.

use std::time::{Duration, Instant};

/// Lifecycle and frame timestamps owned by the application driver
///
/// All getters report seconds as `f64`; the `_ms` variants report the same
/// span in milliseconds. Values passed to layers go through
/// [`Clock::scaled`], which applies the configured delta scale.
#[derive(Debug, Clone)]
pub struct Clock {
    created: Instant,
    initialized: Option<Instant>,
    started: Option<Instant>,
    closed: Option<Instant>,
    frame_start: Instant,
    frame_previous: Instant,
    layer_frame_start: Instant,
    frame_count: u64,
    delta_scale: f64,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    /// Create a clock whose creation timestamp is now
    pub fn new() -> Self {
        Self::with_delta_scale(1.0)
    }

    /// Create a clock multiplying every layer-facing value by `delta_scale`
    pub fn with_delta_scale(delta_scale: f64) -> Self {
        Self::starting_at(Instant::now(), delta_scale)
    }

    fn starting_at(now: Instant, delta_scale: f64) -> Self {
        Self {
            created: now,
            initialized: None,
            started: None,
            closed: None,
            frame_start: now,
            frame_previous: now,
            layer_frame_start: now,
            frame_count: 0,
            delta_scale,
        }
    }

    /// Record the initialize timestamp
    pub fn mark_initialize(&mut self) {
        self.initialized = Some(Instant::now());
    }

    /// Record the start timestamp
    pub fn mark_start(&mut self) {
        self.mark_start_at(Instant::now());
    }

    fn mark_start_at(&mut self, now: Instant) {
        self.started = Some(now);
    }

    /// Record the close timestamp
    pub fn mark_close(&mut self) {
        self.closed = Some(Instant::now());
    }

    /// Reset the previous-frame timestamp so the first delta is measured
    /// from the moment the loop is entered
    pub fn prime_frames(&mut self) {
        self.prime_frames_at(Instant::now());
    }

    fn prime_frames_at(&mut self, now: Instant) {
        self.frame_start = now;
        self.frame_previous = now;
        self.layer_frame_start = now;
    }

    /// Record the start of a frame and return its unscaled delta in seconds
    pub fn begin_frame(&mut self) -> f64 {
        self.begin_frame_at(Instant::now())
    }

    fn begin_frame_at(&mut self, now: Instant) -> f64 {
        self.frame_start = now;
        self.frame_delta()
    }

    /// Record the start of one layer's update within the current frame
    pub fn begin_layer(&mut self) {
        self.begin_layer_at(Instant::now());
    }

    fn begin_layer_at(&mut self, now: Instant) {
        self.layer_frame_start = now;
    }

    /// Close the current frame; its start becomes the previous-frame start
    pub fn end_frame(&mut self) {
        self.frame_previous = self.frame_start;
        self.frame_count += 1;
    }

    /// Apply the configured delta scale to a span in seconds
    pub fn scaled(&self, seconds: f64) -> f64 {
        seconds * self.delta_scale
    }

    /// Seconds since the clock was created
    pub fn elapsed_since_creation(&self) -> f64 {
        self.created.elapsed().as_secs_f64()
    }

    /// Milliseconds since the clock was created
    pub fn elapsed_since_creation_ms(&self) -> f64 {
        millis(self.created.elapsed())
    }

    /// Seconds since [`Clock::mark_start`], zero before the application started
    pub fn elapsed_since_start(&self) -> f64 {
        self.since_start().as_secs_f64()
    }

    /// Milliseconds since [`Clock::mark_start`]
    pub fn elapsed_since_start_ms(&self) -> f64 {
        millis(self.since_start())
    }

    fn since_start(&self) -> Duration {
        self.started.map_or(Duration::ZERO, |started| started.elapsed())
    }

    /// Seconds between the current and the previous frame start
    pub fn frame_delta(&self) -> f64 {
        self.frame_span().as_secs_f64()
    }

    /// Milliseconds between the current and the previous frame start
    pub fn frame_delta_ms(&self) -> f64 {
        millis(self.frame_span())
    }

    fn frame_span(&self) -> Duration {
        self.frame_start.saturating_duration_since(self.frame_previous)
    }

    /// Seconds between the previous frame start and the current layer start
    pub fn layer_delta(&self) -> f64 {
        self.layer_span().as_secs_f64()
    }

    /// Milliseconds between the previous frame start and the current layer start
    pub fn layer_delta_ms(&self) -> f64 {
        millis(self.layer_span())
    }

    fn layer_span(&self) -> Duration {
        self.layer_frame_start.saturating_duration_since(self.frame_previous)
    }

    /// Number of completed frames
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Time between initialize and close, when both were recorded
    pub fn session_length(&self) -> Option<Duration> {
        match (self.initialized, self.closed) {
            (Some(initialized), Some(closed)) => Some(closed.saturating_duration_since(initialized)),
            _ => None,
        }
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_frame_delta_measures_consecutive_frame_starts() {
        let origin = Instant::now();
        let mut clock = Clock::starting_at(origin, 1.0);
        clock.prime_frames_at(origin);

        let first = clock.begin_frame_at(origin + Duration::from_millis(16));
        clock.end_frame();
        let second = clock.begin_frame_at(origin + Duration::from_millis(40));

        assert_relative_eq!(first, 0.016, epsilon = 1e-9);
        assert_relative_eq!(second, 0.024, epsilon = 1e-9);
        assert_relative_eq!(clock.frame_delta_ms(), 24.0, epsilon = 1e-6);
    }

    #[test]
    fn test_units_are_consistent() {
        let origin = Instant::now();
        let mut clock = Clock::starting_at(origin, 1.0);
        clock.begin_frame_at(origin + Duration::from_millis(250));

        assert_relative_eq!(clock.frame_delta() * 1000.0, clock.frame_delta_ms(), epsilon = 1e-9);
    }

    #[test]
    fn test_layer_delta_is_relative_to_previous_frame() {
        let origin = Instant::now();
        let mut clock = Clock::starting_at(origin, 1.0);
        clock.begin_frame_at(origin + Duration::from_millis(10));
        clock.begin_layer_at(origin + Duration::from_millis(12));

        assert_relative_eq!(clock.layer_delta(), 0.012, epsilon = 1e-9);
        assert_relative_eq!(clock.layer_delta_ms(), 12.0, epsilon = 1e-6);
    }

    #[test]
    fn test_delta_scale_is_applied_by_scaled() {
        let clock = Clock::with_delta_scale(100.0);
        assert_relative_eq!(clock.scaled(0.5), 50.0);
    }

    #[test]
    fn test_elapsed_since_start_is_zero_before_start() {
        let clock = Clock::new();
        assert_eq!(clock.elapsed_since_start(), 0.0);
    }

    #[test]
    fn test_elapsed_since_start_is_non_negative() {
        let origin = Instant::now();
        let mut clock = Clock::starting_at(origin, 1.0);
        clock.mark_start_at(origin);
        assert!(clock.elapsed_since_start() >= 0.0);
    }

    #[test]
    fn test_millisecond_getters_track_seconds() {
        let origin = Instant::now();
        let mut clock = Clock::starting_at(origin, 1.0);
        clock.mark_start_at(origin);

        assert!(clock.elapsed_since_creation_ms() >= 0.0);
        assert!(clock.elapsed_since_start_ms() >= 0.0);
        assert!(clock.elapsed_since_creation_ms() >= clock.elapsed_since_start() * 1000.0 - 1e-6);
    }

    #[test]
    fn test_session_length_requires_initialize_and_close() {
        let mut clock = Clock::new();
        assert!(clock.session_length().is_none());
        clock.mark_initialize();
        assert!(clock.session_length().is_none());
        clock.mark_close();
        assert!(clock.session_length().is_some());
    }

    #[test]
    fn test_end_frame_counts_frames() {
        let mut clock = Clock::new();
        clock.end_frame();
        clock.end_frame();
        assert_eq!(clock.frame_count(), 2);
    }
}
