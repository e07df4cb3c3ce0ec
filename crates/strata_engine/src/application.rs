//! Application driver and lifecycle management
//!
//! The [`Application`] owns the registered layers and walks them through
//! the lifecycle in registration order:
//!
//! ```text
//! Constructed -> Initialized -> Started -> Running -> Closed -> Destroyed
//! ```
//!
//! Layers stop the frame loop through a [`CloseHandle`] obtained before they
//! are registered.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::config::{AppConfig, ConfigError};
use crate::foundation::time::Clock;
use crate::layer::{Layer, LayerError, LayerId, LayerPhase};

/// Lifecycle state of an [`Application`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// Layers may still be registered
    Constructed,
    /// Both setup passes completed
    Initialized,
    /// Start pass completed
    Started,
    /// Frame loop is executing
    Running,
    /// Frame loop has ended
    Closed,
    /// Teardown hooks ran and the layers were released
    Destroyed,
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// A layer hook failed
    #[error("{phase} failed for {name} ({id})")]
    Layer {
        /// Failing layer
        id: LayerId,
        /// Failing layer's name
        name: String,
        /// Phase the failure happened in
        phase: LayerPhase,
        /// Hook error
        source: LayerError,
    },

    /// A lifecycle call was made in the wrong state
    #[error("Invalid application state: expected {expected}, found {actual}")]
    InvalidState {
        /// State the call requires
        expected: AppState,
        /// State the application was in
        actual: AppState,
    },

    /// Two layers were registered with the same id
    #[error("Duplicate layer id: {0}")]
    DuplicateLayer(LayerId),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl AppError {
    fn layer(layer: &dyn Layer, phase: LayerPhase, source: LayerError) -> Self {
        Self::Layer {
            id: layer.id(),
            name: layer.name().to_string(),
            phase,
            source,
        }
    }
}

/// Cloneable handle that stops the application's frame loop
///
/// Closing takes effect at the next loop-condition check; the layers still
/// pending in the current frame are updated first.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    running: Rc<Cell<bool>>,
}

impl CloseHandle {
    /// Request the frame loop to stop
    pub fn close(&self) {
        log::info!("Application close requested");
        self.running.set(false);
    }

    /// Whether the frame loop is still meant to run
    pub fn is_running(&self) -> bool {
        self.running.get()
    }
}

/// Layer host driving the lifecycle and the frame loop
pub struct Application {
    name: String,
    layers: Vec<Box<dyn Layer>>,
    clock: Clock,
    running: Rc<Cell<bool>>,
    state: AppState,
}

impl Application {
    /// Create an application with default clock settings
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_clock(name, Clock::new())
    }

    /// Create an application from its configuration
    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self::with_clock(
            config.name.clone(),
            Clock::with_delta_scale(config.time.delta_scale),
        ))
    }

    fn with_clock(name: impl Into<String>, clock: Clock) -> Self {
        let name = name.into();
        log::info!("Creating application '{}'", name);
        Self {
            name,
            layers: Vec::new(),
            clock,
            running: Rc::new(Cell::new(false)),
            state: AppState::Constructed,
        }
    }

    /// Handle layers use to stop the frame loop
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            running: Rc::clone(&self.running),
        }
    }

    /// Register a layer; hooks run in registration order
    pub fn add_layer(&mut self, layer: Box<dyn Layer>) -> Result<(), AppError> {
        self.expect_state(AppState::Constructed)?;
        if self.layers.iter().any(|existing| existing.id() == layer.id()) {
            return Err(AppError::DuplicateLayer(layer.id()));
        }
        log::debug!("Registered {} ({})", layer.name(), layer.id());
        self.layers.push(layer);
        Ok(())
    }

    /// Run `initialize` on every layer, then `post_initialize` on every layer
    pub fn initialize(&mut self) -> Result<(), AppError> {
        self.expect_state(AppState::Constructed)?;
        log::info!("Initializing application '{}'...", self.name);
        self.clock.mark_initialize();

        for layer in &mut self.layers {
            layer
                .initialize()
                .map_err(|e| AppError::layer(layer.as_ref(), LayerPhase::Initialize, e))?;
        }

        for layer in &mut self.layers {
            layer
                .post_initialize()
                .map_err(|e| AppError::layer(layer.as_ref(), LayerPhase::PostInitialize, e))?;
        }

        self.state = AppState::Initialized;
        Ok(())
    }

    /// Mark the application running and call every layer's `start`
    ///
    /// A failed start clears the running flag and leaves the application
    /// [`AppState::Closed`]; only [`Application::shutdown`] remains valid.
    pub fn start(&mut self) -> Result<(), AppError> {
        self.expect_state(AppState::Initialized)?;
        self.running.set(true);
        self.clock.mark_start();

        for layer in &mut self.layers {
            let start_time = self.clock.scaled(self.clock.elapsed_since_creation());
            if let Err(e) = layer.start(start_time) {
                self.running.set(false);
                self.clock.mark_close();
                self.state = AppState::Closed;
                return Err(AppError::layer(layer.as_ref(), LayerPhase::Start, e));
            }
        }

        self.state = AppState::Started;
        Ok(())
    }

    /// Start the application if needed, then run the frame loop until closed
    pub fn run(&mut self) -> Result<(), AppError> {
        if self.state == AppState::Initialized {
            self.start()?;
        }
        self.expect_state(AppState::Started)?;

        log::info!("Starting main loop...");
        self.state = AppState::Running;
        self.clock.prime_frames();

        let result = self.frame_loop();

        self.running.set(false);
        self.clock.mark_close();
        self.state = AppState::Closed;
        log::info!(
            "Main loop finished after {} frames",
            self.clock.frame_count()
        );
        if let Some(length) = self.clock.session_length() {
            log::debug!("Session lasted {:.3}s", length.as_secs_f64());
        }
        result
    }

    fn frame_loop(&mut self) -> Result<(), AppError> {
        while self.running.get() {
            let raw_delta = self.clock.begin_frame();
            let delta_time = self.clock.scaled(raw_delta);

            for layer in &mut self.layers {
                self.clock.begin_layer();
                layer
                    .update(delta_time)
                    .map_err(|e| AppError::layer(layer.as_ref(), LayerPhase::Update, e))?;
            }

            self.clock.end_frame();
        }
        Ok(())
    }

    /// Request the frame loop to stop
    pub fn close(&self) {
        self.running.set(false);
    }

    /// Run every layer's `post_close` and release the layers
    ///
    /// Every layer is torn down even when an earlier one fails; the first
    /// failure is returned.
    pub fn shutdown(&mut self) -> Result<(), AppError> {
        if self.state == AppState::Destroyed {
            return Ok(());
        }
        log::info!("Shutting down application '{}'...", self.name);
        self.running.set(false);

        let mut first_error = None;
        for layer in &mut self.layers {
            if let Err(e) = layer.post_close() {
                let error = AppError::layer(layer.as_ref(), LayerPhase::PostClose, e);
                log::error!("{}", error);
                first_error.get_or_insert(error);
            }
        }

        self.layers.clear();
        self.state = AppState::Destroyed;
        log::info!("Application shutdown complete");
        first_error.map_or(Ok(()), Err)
    }

    /// Current lifecycle state
    pub fn state(&self) -> AppState {
        self.state
    }

    /// Application clock
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Number of registered layers
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Application name
    pub fn name(&self) -> &str {
        &self.name
    }

    fn expect_state(&self, expected: AppState) -> Result<(), AppError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(AppError::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }
}

impl Drop for Application {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Error during application teardown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LayerResult;
    use std::cell::RefCell;

    type Journal = Rc<RefCell<Vec<String>>>;

    struct RecordingLayer {
        id: u32,
        journal: Journal,
        close_after: Option<(usize, CloseHandle)>,
        fail_in: Option<LayerPhase>,
        updates: usize,
        deltas: Rc<RefCell<Vec<f64>>>,
    }

    impl RecordingLayer {
        fn new(id: u32, journal: &Journal) -> Self {
            Self {
                id,
                journal: Rc::clone(journal),
                close_after: None,
                fail_in: None,
                updates: 0,
                deltas: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn record(&self, phase: LayerPhase) -> LayerResult {
            self.journal.borrow_mut().push(format!("{}:{}", self.id, phase));
            if self.fail_in == Some(phase) {
                return Err(LayerError::Custom(format!("{} refused", phase)));
            }
            Ok(())
        }
    }

    impl Layer for RecordingLayer {
        fn id(&self) -> LayerId {
            LayerId(self.id)
        }

        fn name(&self) -> &str {
            "recording"
        }

        fn initialize(&mut self) -> LayerResult {
            self.record(LayerPhase::Initialize)
        }

        fn post_initialize(&mut self) -> LayerResult {
            self.record(LayerPhase::PostInitialize)
        }

        fn start(&mut self, start_time: f64) -> LayerResult {
            assert!(start_time >= 0.0);
            self.record(LayerPhase::Start)
        }

        fn update(&mut self, delta_time: f64) -> LayerResult {
            self.updates += 1;
            self.deltas.borrow_mut().push(delta_time);
            if let Some((limit, handle)) = &self.close_after {
                if self.updates >= *limit {
                    handle.close();
                }
            }
            self.record(LayerPhase::Update)
        }

        fn post_close(&mut self) -> LayerResult {
            self.record(LayerPhase::PostClose)
        }
    }

    fn journal() -> Journal {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn test_setup_passes_are_not_interleaved() {
        let log = journal();
        let mut app = Application::new("test");
        app.add_layer(Box::new(RecordingLayer::new(1, &log))).unwrap();
        app.add_layer(Box::new(RecordingLayer::new(2, &log))).unwrap();

        app.initialize().unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                "1:initialize",
                "2:initialize",
                "1:post_initialize",
                "2:post_initialize",
            ]
        );
        assert_eq!(app.state(), AppState::Initialized);
    }

    #[test]
    fn test_close_stops_loop_after_current_frame() {
        let log = journal();
        let mut app = Application::new("test");
        let mut closer = RecordingLayer::new(1, &log);
        closer.close_after = Some((3, app.close_handle()));
        app.add_layer(Box::new(closer)).unwrap();
        app.add_layer(Box::new(RecordingLayer::new(2, &log))).unwrap();

        app.initialize().unwrap();
        app.run().unwrap();

        let updates: Vec<String> = log
            .borrow()
            .iter()
            .filter(|entry| entry.ends_with(":update"))
            .cloned()
            .collect();
        // The second layer still receives the frame in which the close happened.
        assert_eq!(updates.len(), 6);
        assert_eq!(updates.last().map(String::as_str), Some("2:update"));
        assert_eq!(app.state(), AppState::Closed);
        assert_eq!(app.clock().frame_count(), 3);
    }

    #[test]
    fn test_deltas_are_non_negative() {
        let log = journal();
        let mut app = Application::new("test");
        let mut layer = RecordingLayer::new(1, &log);
        layer.close_after = Some((5, app.close_handle()));
        let deltas = Rc::clone(&layer.deltas);
        app.add_layer(Box::new(layer)).unwrap();

        app.initialize().unwrap();
        app.run().unwrap();

        assert_eq!(deltas.borrow().len(), 5);
        assert!(deltas.borrow().iter().all(|delta| *delta >= 0.0));
    }

    #[test]
    fn test_shutdown_runs_post_close_once_in_order() {
        let log = journal();
        {
            let mut app = Application::new("test");
            app.add_layer(Box::new(RecordingLayer::new(1, &log))).unwrap();
            app.add_layer(Box::new(RecordingLayer::new(2, &log))).unwrap();
            app.initialize().unwrap();
            app.shutdown().unwrap();
            assert_eq!(app.state(), AppState::Destroyed);
            assert_eq!(app.layer_count(), 0);
        }

        let closes: Vec<String> = log
            .borrow()
            .iter()
            .filter(|entry| entry.ends_with(":post_close"))
            .cloned()
            .collect();
        assert_eq!(closes, vec!["1:post_close", "2:post_close"]);
    }

    #[test]
    fn test_drop_runs_teardown() {
        let log = journal();
        {
            let mut app = Application::new("test");
            app.add_layer(Box::new(RecordingLayer::new(4, &log))).unwrap();
        }
        assert_eq!(*log.borrow(), vec!["4:post_close"]);
    }

    #[test]
    fn test_initialize_failure_aborts_remaining_layers() {
        let log = journal();
        let mut app = Application::new("test");
        let mut failing = RecordingLayer::new(1, &log);
        failing.fail_in = Some(LayerPhase::Initialize);
        app.add_layer(Box::new(failing)).unwrap();
        app.add_layer(Box::new(RecordingLayer::new(2, &log))).unwrap();

        let error = app.initialize().unwrap_err();

        assert!(matches!(
            error,
            AppError::Layer { id: LayerId(1), phase: LayerPhase::Initialize, .. }
        ));
        assert_eq!(*log.borrow(), vec!["1:initialize"]);
        assert_eq!(app.state(), AppState::Constructed);
    }

    #[test]
    fn test_teardown_continues_after_failure() {
        let log = journal();
        let mut app = Application::new("test");
        let mut failing = RecordingLayer::new(1, &log);
        failing.fail_in = Some(LayerPhase::PostClose);
        app.add_layer(Box::new(failing)).unwrap();
        app.add_layer(Box::new(RecordingLayer::new(2, &log))).unwrap();

        assert!(app.shutdown().is_err());
        assert_eq!(*log.borrow(), vec!["1:post_close", "2:post_close"]);
    }

    #[test]
    fn test_duplicate_layer_id_is_rejected() {
        let log = journal();
        let mut app = Application::new("test");
        app.add_layer(Box::new(RecordingLayer::new(1, &log))).unwrap();
        let result = app.add_layer(Box::new(RecordingLayer::new(1, &log)));
        assert!(matches!(result, Err(AppError::DuplicateLayer(LayerId(1)))));
    }

    #[test]
    fn test_lifecycle_calls_out_of_order_are_rejected() {
        let mut app = Application::new("test");
        assert!(matches!(
            app.start(),
            Err(AppError::InvalidState { expected: AppState::Initialized, actual: AppState::Constructed })
        ));
        app.initialize().unwrap();
        assert!(app.initialize().is_err());
    }

    #[test]
    fn test_start_sets_running() {
        let mut app = Application::new("test");
        let handle = app.close_handle();
        app.initialize().unwrap();
        app.start().unwrap();
        assert!(handle.is_running());
        app.close();
        assert!(!handle.is_running());
    }

    #[test]
    fn test_failed_start_is_terminal() {
        let log = journal();
        let mut app = Application::new("test");
        let handle = app.close_handle();
        app.add_layer(Box::new(RecordingLayer::new(1, &log))).unwrap();
        let mut failing = RecordingLayer::new(2, &log);
        failing.fail_in = Some(LayerPhase::Start);
        app.add_layer(Box::new(failing)).unwrap();
        app.initialize().unwrap();

        let error = app.start().unwrap_err();

        assert!(matches!(
            error,
            AppError::Layer { id: LayerId(2), phase: LayerPhase::Start, .. }
        ));
        assert!(!handle.is_running());
        assert_eq!(app.state(), AppState::Closed);
        assert!(matches!(
            app.run(),
            Err(AppError::InvalidState { expected: AppState::Started, actual: AppState::Closed })
        ));
        assert!(app.start().is_err());

        let starts: Vec<String> = log
            .borrow()
            .iter()
            .filter(|entry| entry.ends_with(":start"))
            .cloned()
            .collect();
        assert_eq!(starts, vec!["1:start", "2:start"]);
    }

    #[test]
    fn test_failed_start_inside_run_is_not_retried() {
        let log = journal();
        let mut app = Application::new("test");
        let mut failing = RecordingLayer::new(1, &log);
        failing.fail_in = Some(LayerPhase::Start);
        app.add_layer(Box::new(failing)).unwrap();
        app.initialize().unwrap();

        assert!(app.run().is_err());
        assert!(app.run().is_err());

        let starts = log.borrow().iter().filter(|entry| entry.ends_with(":start")).count();
        assert_eq!(starts, 1);
        app.shutdown().unwrap();
        assert_eq!(log.borrow().last().map(String::as_str), Some("1:post_close"));
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let mut config = AppConfig::default();
        config.name.clear();
        assert!(matches!(Application::from_config(&config), Err(AppError::Config(_))));
    }
}
