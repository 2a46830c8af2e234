//! Common test utilities shared across integration tests.
#![allow(dead_code, missing_docs)]

use std::cell::RefCell;
use std::sync::{Arc, Mutex, Once};

use consentkit_core::pipeline::Pipeline;
use consentkit_core::rpc::{CmpFrame, FrameError};
use consentkit_core::{ConfigStore, ConsentGate, ConsentStore, GateConfig, IabLookup, LookupRegistry};
use serde_json::{json, Value};

/// Arguments flowing through the pipeline. The gate must pass them on untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuctionRequest {
    pub id: u32,
    pub ad_units: Vec<String>,
}

pub fn auction(id: u32) -> AuctionRequest {
    AuctionRequest {
        id,
        ad_units: vec!["div-banner".to_string(), "div-sidebar".to_string()],
    }
}

/// Top window. Records everything posted to it.
#[derive(Default)]
pub struct TopWindow {
    pub locator: bool,
    pub reject_posts: bool,
    pub posted: Mutex<Vec<Value>>,
}

impl TopWindow {
    pub fn with_cmp() -> Arc<Self> {
        Arc::new(Self {
            locator: true,
            ..Self::default()
        })
    }

    pub fn without_cmp() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn post_count(&self) -> usize {
        self.posted.lock().unwrap().len()
    }

    /// Call id of the most recent `__cmpCall`.
    pub fn last_call_id(&self) -> Option<String> {
        self.posted
            .lock()
            .unwrap()
            .last()
            .and_then(|message| message["__cmpCall"]["callId"].as_str())
            .map(str::to_string)
    }
}

impl CmpFrame for TopWindow {
    fn has_locator(&self, _name: &str) -> Result<bool, FrameError> {
        Ok(self.locator)
    }

    fn parent(&self) -> Option<Arc<dyn CmpFrame>> {
        None
    }

    fn post_message(&self, message: &Value, _target_origin: &str) -> Result<(), FrameError> {
        if self.reject_posts {
            return Err(FrameError("DataCloneError".to_string()));
        }
        self.posted.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// A frame between the caller and the top window.
pub struct NestedFrame {
    pub cross_origin: bool,
    pub parent: Arc<dyn CmpFrame>,
}

impl CmpFrame for NestedFrame {
    fn has_locator(&self, _name: &str) -> Result<bool, FrameError> {
        if self.cross_origin {
            return Err(FrameError("SecurityError: blocked a frame".to_string()));
        }
        Ok(false)
    }

    fn parent(&self) -> Option<Arc<dyn CmpFrame>> {
        Some(Arc::clone(&self.parent))
    }

    fn post_message(&self, _message: &Value, _target_origin: &str) -> Result<(), FrameError> {
        panic!("messages must go to the CMP window");
    }
}

/// `__cmpReturn` envelope answering `call_id`.
pub fn cmp_return(call_id: &str, return_value: Value) -> Value {
    json!({
        "__cmpReturn": {
            "callId": call_id,
            "returnValue": return_value,
            "success": true,
        }
    })
}

/// A gate wired into a pipeline whose terminal records what it receives.
pub struct Harness {
    pub config: ConfigStore,
    pub pipeline: Arc<Pipeline<AuctionRequest>>,
    pub gate: Arc<ConsentGate>,
    pub store: Arc<ConsentStore>,
    pub continued: Arc<Mutex<Vec<AuctionRequest>>>,
}

impl Harness {
    pub fn new(registry: LookupRegistry) -> Self {
        let continued = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&continued);
        let pipeline = Arc::new(Pipeline::new(move |request: AuctionRequest| {
            sink.lock().unwrap().push(request);
        }));

        let store = Arc::new(ConsentStore::new());
        let gate = Arc::new(ConsentGate::new(
            Arc::new(registry),
            Arc::clone(&store),
            GateConfig::default(),
        ));
        let config = ConfigStore::new();
        gate.attach(&pipeline, &config);

        Self {
            config,
            pipeline,
            gate,
            store,
            continued,
        }
    }

    /// A harness using the built-in IAB strategy on `window`.
    pub fn iab(window: Arc<dyn CmpFrame>) -> (Self, Arc<IabLookup>) {
        let iab = Arc::new(IabLookup::new(window));
        let harness = Self::new(LookupRegistry::with_defaults(Arc::clone(&iab)));
        (harness, iab)
    }

    pub fn configure(&self, section: Value) {
        self.config
            .set_config(json!({ "consentManagement": section }))
            .unwrap();
    }

    pub fn continued(&self) -> Vec<AuctionRequest> {
        self.continued.lock().unwrap().clone()
    }
}

thread_local! {
    static CAPTURED: RefCell<Vec<(log::Level, String)>> = const { RefCell::new(Vec::new()) };
}

/// Records log output per thread, so tests on the current-thread runtime
/// only see their own records.
struct CapturingLogger;

impl log::Log for CapturingLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        CAPTURED.with(|captured| {
            captured
                .borrow_mut()
                .push((record.level(), record.args().to_string()));
        });
    }

    fn flush(&self) {}
}

/// Installs the capturing logger and clears this thread's records.
pub fn capture_logs() {
    static LOGGER: CapturingLogger = CapturingLogger;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(log::LevelFilter::Trace);
    });
    CAPTURED.with(|captured| captured.borrow_mut().clear());
}

/// Records captured on this thread at `level`.
pub fn logs_at(level: log::Level) -> Vec<String> {
    CAPTURED.with(|captured| {
        captured
            .borrow()
            .iter()
            .filter(|(recorded, _)| *recorded == level)
            .map(|(_, message)| message.clone())
            .collect()
    })
}
