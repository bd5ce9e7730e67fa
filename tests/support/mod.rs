//! Recording `GlBackend` used by the integration tests.
//!
//! Every backend call is appended to a shared event log; swaps are also pushed over a
//! channel so tests can wait for frames without sleeping.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

use crossbeam_channel as channel;
use dpi::PhysicalSize;
use gl_frame_relay::{BackendError, GlBackend, LatchedFrame, RelayPhase, TextureId};
use parking_lot::Mutex;

pub type Window = &'static str;

pub const DISPLAY: Window = "display";
pub const ENCODER: Window = "encoder";
pub const FRAME_INTERVAL_NS: i64 = 33_333_333;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ContextCreated { id: u32, shared: bool },
    ContextDestroyed(u32),
    SurfaceCreated(Window),
    SurfaceDestroyed(Window),
    PipelineCreated(TextureId),
    PipelineDestroyed(TextureId),
    Draw { window: Window, viewport: PhysicalSize<u32> },
    Swap(Swap),
    ReleaseCurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Swap {
    pub window: Window,
    pub frame_ts: i64,
    pub presentation_time: Option<i64>,
}

/// GPU-object teardown call, with the thread it ran on and the context current at the time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Teardown {
    pub call: &'static str,
    pub thread: Option<String>,
    pub current_context: Option<u32>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_surface: Mutex<Option<Window>>,
    panic_surface: Mutex<Option<Window>>,
    panic_draw: AtomicBool,
}

#[derive(Debug)]
pub struct MockContext {
    id: u32,
}

#[derive(Debug)]
pub struct MockSurface {
    window: Window,
}

#[derive(Debug)]
pub struct MockPipeline {
    texture: TextureId,
    frames: i64,
}

/// Blocks a backend call for one window until the test releases it.
pub struct Gate {
    pub started: channel::Receiver<Window>,
    pub release: channel::Sender<()>,
}

struct GateInner {
    window: Window,
    started: channel::Sender<Window>,
    release: channel::Receiver<()>,
}

pub struct RecordingBackend {
    events: Arc<Mutex<Vec<Event>>>,
    teardowns: Arc<Mutex<Vec<Teardown>>>,
    swaps: channel::Sender<Swap>,
    sizes: HashMap<Window, PhysicalSize<u32>>,
    faults: Arc<Faults>,
    draw_gate: Option<GateInner>,
    surface_gate: Option<GateInner>,
    next_context: u32,
    next_texture: u32,
    current: Option<Window>,
    current_context: Option<u32>,
    latest_ts: i64,
    pending_presentation: Option<(Window, i64)>,
}

/// Test-side view of a `RecordingBackend` after it has been moved into a relay.
#[derive(Clone)]
pub struct Recording {
    events: Arc<Mutex<Vec<Event>>>,
    teardowns: Arc<Mutex<Vec<Teardown>>>,
    swaps: channel::Receiver<Swap>,
    faults: Arc<Faults>,
}

impl RecordingBackend {
    pub fn new() -> (Self, Recording) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let teardowns = Arc::new(Mutex::new(Vec::new()));
        let faults = Arc::new(Faults::default());
        let (swaps_tx, swaps_rx) = channel::unbounded();
        let backend = Self {
            events: events.clone(),
            teardowns: teardowns.clone(),
            swaps: swaps_tx,
            sizes: HashMap::new(),
            faults: faults.clone(),
            draw_gate: None,
            surface_gate: None,
            next_context: 1,
            next_texture: 7,
            current: None,
            current_context: None,
            latest_ts: 0,
            pending_presentation: None,
        };
        let recording = Recording {
            events,
            teardowns,
            swaps: swaps_rx,
            faults,
        };
        (backend, recording)
    }

    pub fn with_size(mut self, window: Window, width: u32, height: u32) -> Self {
        self.sizes.insert(window, PhysicalSize::new(width, height));
        self
    }

    /// Blocks every draw into `window` until the test releases it.
    pub fn with_draw_gate(mut self, window: Window) -> (Self, Gate) {
        let (inner, gate) = gate_for(window);
        self.draw_gate = Some(inner);
        (self, gate)
    }

    /// Blocks every surface creation for `window` until the test releases it.
    pub fn with_surface_gate(mut self, window: Window) -> (Self, Gate) {
        let (inner, gate) = gate_for(window);
        self.surface_gate = Some(inner);
        (self, gate)
    }

    fn record(&self, event: Event) {
        self.events.lock().push(event);
    }

    fn record_teardown(&self, call: &'static str) {
        self.teardowns.lock().push(Teardown {
            call,
            thread: std::thread::current().name().map(str::to_string),
            current_context: self.current_context,
        });
    }
}

fn gate_for(window: Window) -> (GateInner, Gate) {
    let (started_tx, started_rx) = channel::unbounded();
    let (release_tx, release_rx) = channel::unbounded();
    let inner = GateInner {
        window,
        started: started_tx,
        release: release_rx,
    };
    let gate = Gate {
        started: started_rx,
        release: release_tx,
    };
    (inner, gate)
}

fn pass_gate(gate: &Option<GateInner>, window: Window) {
    if let Some(gate) = gate {
        if gate.window == window {
            let _ = gate.started.send(window);
            let _ = gate.release.recv();
        }
    }
}

impl GlBackend for RecordingBackend {
    type Context = MockContext;
    type Surface = MockSurface;
    type Window = Window;
    type Pipeline = MockPipeline;

    fn create_context(
        &mut self,
        share_with: Option<&MockContext>,
    ) -> Result<MockContext, BackendError> {
        let id = self.next_context;
        self.next_context += 1;
        self.record(Event::ContextCreated {
            id,
            shared: share_with.is_some(),
        });
        Ok(MockContext { id })
    }

    fn destroy_context(&mut self, context: MockContext) -> Result<(), BackendError> {
        if context.id == 1 {
            self.record_teardown("destroy_context");
        }
        if self.current_context == Some(context.id) {
            self.current_context = None;
        }
        self.record(Event::ContextDestroyed(context.id));
        Ok(())
    }

    fn create_window_surface(
        &mut self,
        _context: &mut MockContext,
        window: &Window,
    ) -> Result<MockSurface, BackendError> {
        pass_gate(&self.surface_gate, *window);
        if *self.faults.panic_surface.lock() == Some(*window) {
            panic!("{window} surface creation crashed");
        }
        if *self.faults.fail_surface.lock() == Some(*window) {
            return Err(BackendError::Surface(format!("{window} is not a valid window")));
        }
        self.record(Event::SurfaceCreated(*window));
        Ok(MockSurface { window: *window })
    }

    fn destroy_surface(
        &mut self,
        _context: &mut MockContext,
        surface: MockSurface,
    ) -> Result<(), BackendError> {
        if self.current == Some(surface.window) {
            self.current = None;
        }
        self.record(Event::SurfaceDestroyed(surface.window));
        Ok(())
    }

    fn make_current(
        &mut self,
        context: &MockContext,
        surface: &MockSurface,
    ) -> Result<(), BackendError> {
        self.current = Some(surface.window);
        self.current_context = Some(context.id);
        Ok(())
    }

    fn make_context_current(&mut self, context: &MockContext) -> Result<(), BackendError> {
        self.current = None;
        self.current_context = Some(context.id);
        Ok(())
    }

    fn release_current(&mut self) -> Result<(), BackendError> {
        self.current = None;
        self.current_context = None;
        self.record(Event::ReleaseCurrent);
        Ok(())
    }

    fn swap_buffers(
        &mut self,
        _context: &mut MockContext,
        surface: &MockSurface,
    ) -> Result<(), BackendError> {
        let presentation_time = match self.pending_presentation {
            Some((window, ts)) if window == surface.window => {
                self.pending_presentation = None;
                Some(ts)
            }
            _ => None,
        };
        let swap = Swap {
            window: surface.window,
            frame_ts: self.latest_ts,
            presentation_time,
        };
        self.record(Event::Swap(swap));
        let _ = self.swaps.send(swap);
        Ok(())
    }

    fn set_presentation_time(
        &mut self,
        _context: &MockContext,
        surface: &MockSurface,
        timestamp_ns: i64,
    ) -> Result<(), BackendError> {
        self.pending_presentation = Some((surface.window, timestamp_ns));
        Ok(())
    }

    fn surface_size(&self, _context: &MockContext, surface: &MockSurface) -> PhysicalSize<u32> {
        self.sizes
            .get(surface.window)
            .copied()
            .unwrap_or(PhysicalSize::new(640, 480))
    }

    fn create_pipeline(&mut self, _clear_color: [f32; 4]) -> Result<MockPipeline, BackendError> {
        let texture = TextureId(self.next_texture);
        self.next_texture += 1;
        self.record(Event::PipelineCreated(texture));
        Ok(MockPipeline { texture, frames: 0 })
    }

    fn texture_id(&self, pipeline: &MockPipeline) -> TextureId {
        pipeline.texture
    }

    fn update_frame(
        &mut self,
        pipeline: &mut MockPipeline,
    ) -> Result<Option<LatchedFrame>, BackendError> {
        pipeline.frames += 1;
        self.latest_ts = pipeline.frames * FRAME_INTERVAL_NS;
        Ok(Some(LatchedFrame {
            timestamp_ns: self.latest_ts,
            transform: gl_frame_relay::IDENTITY_TRANSFORM,
        }))
    }

    fn draw_frame(
        &mut self,
        _pipeline: &mut MockPipeline,
        viewport: PhysicalSize<u32>,
        _transform: &[f32; 16],
    ) -> Result<(), BackendError> {
        let window = self
            .current
            .ok_or_else(|| BackendError::Pipeline("no current surface".to_string()))?;
        if self.faults.panic_draw.load(Ordering::SeqCst) {
            panic!("draw into {window} crashed");
        }
        pass_gate(&self.draw_gate, window);
        self.record(Event::Draw { window, viewport });
        Ok(())
    }

    fn destroy_pipeline(&mut self, pipeline: MockPipeline) -> Result<(), BackendError> {
        self.record_teardown("destroy_pipeline");
        self.record(Event::PipelineDestroyed(pipeline.texture));
        Ok(())
    }
}

impl Recording {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|event| predicate(event)).count()
    }

    pub fn swaps_into(&self, window: Window) -> usize {
        self.count(|event| matches!(event, Event::Swap(swap) if swap.window == window))
    }

    pub fn position(&self, target: &Event) -> Option<usize> {
        self.events.lock().iter().position(|event| event == target)
    }

    pub fn next_swap(&self) -> Swap {
        self.swaps
            .recv_timeout(Duration::from_secs(5))
            .expect("timed out waiting for a swap")
    }

    pub fn no_swap_within(&self, timeout: Duration) -> bool {
        self.swaps.recv_timeout(timeout).is_err()
    }

    /// Teardown calls for the root texture and root context, in call order.
    pub fn teardowns(&self) -> Vec<Teardown> {
        self.teardowns.lock().clone()
    }

    pub fn fail_surfaces_for(&self, window: Option<Window>) {
        *self.faults.fail_surface.lock() = window;
    }

    pub fn panic_on_surface_for(&self, window: Option<Window>) {
        *self.faults.panic_surface.lock() = window;
    }

    pub fn panic_on_draw(&self) {
        self.faults.panic_draw.store(true, Ordering::SeqCst);
    }
}

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Polls `phase` until it returns `expected` or five seconds pass.
pub fn wait_for_phase(phase: impl Fn() -> RelayPhase, expected: RelayPhase) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if phase() == expected {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    phase() == expected
}
