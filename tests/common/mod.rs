//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use inspector_protocol::{
    ChannelTransport, Diagnostic, Multiplexer, MultiplexerOptions, ParamSchema, ParamType,
    RemoteEnd, Schema,
};
use parking_lot::Mutex;

/// Schema covering the domains used across the tests.
pub fn schema() -> Schema {
    Schema::builder()
        .command(
            "Network.enable",
            [ParamSchema::optional("maxTotalBufferSize", ParamType::Integer)],
        )
        .command("Page.enable", [])
        .command(
            "Page.navigate",
            [
                ParamSchema::required("url", ParamType::String),
                ParamSchema::optional("referrer", ParamType::String),
            ],
        )
        .command("Runtime.runIfWaitingForDebugger", [])
        .command(
            "Target.setAutoAttach",
            [
                ParamSchema::required("autoAttach", ParamType::Boolean),
                ParamSchema::required("waitForDebuggerOnStart", ParamType::Boolean),
            ],
        )
        .event("Network.requestWillBeSent", ["requestId", "request"])
        .event("Network.loadingFinished", ["requestId", "encodedDataLength"])
        .event("Page.loadEventFired", ["timestamp"])
        .event("Security.securityStateChanged", ["securityState"])
        .event("Security.visibleSecurityStateChanged", ["visibleSecurityState"])
        .event("Target.attachedToTarget", ["sessionId", "targetInfo", "waitingForDebugger"])
        .event("Target.detachedFromTarget", ["sessionId"])
        .build()
        .expect("test schema is valid")
}

/// Collects diagnostics reported by a multiplexer.
#[derive(Clone, Default)]
pub struct Recorder {
    seen: Arc<Mutex<Vec<Diagnostic>>>,
}

impl Recorder {
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.seen.lock().clone()
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.seen.lock())
    }
}

/// Multiplexer over a channel transport with a recording sink.
pub fn connect(options: MultiplexerOptions) -> (Arc<Multiplexer>, RemoteEnd, Recorder) {
    let (transport, remote) = ChannelTransport::pair();
    let recorder = Recorder::default();
    let seen = Arc::clone(&recorder.seen);
    let mux = Multiplexer::with_sink(
        Arc::new(transport),
        schema(),
        options,
        Arc::new(move |d: &Diagnostic| seen.lock().push(d.clone())),
    )
    .expect("multiplexer attaches");
    (mux, remote, recorder)
}

/// Installs a test subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
