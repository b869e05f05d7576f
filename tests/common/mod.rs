use std::collections::HashMap;
use std::sync::Arc;

use flutter_native_bridge::{BinaryReply, ForeignHandle, NativeRuntime};
use parking_lot::Mutex;

/// Message as seen by the native side: handle and payload.
pub type Delivered = (i64, Option<Vec<u8>>);

/// Native stand-in that counts retain/release per handle and echoes messages.
#[derive(Default)]
pub struct CountingRuntime {
    counts: Mutex<HashMap<i64, (usize, usize)>>,
    delivered: Mutex<Vec<Delivered>>,
}

impl CountingRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn retains(&self, handle: i64) -> usize {
        self.counts.lock().get(&handle).map_or(0, |c| c.0)
    }

    pub fn releases(&self, handle: i64) -> usize {
        self.counts.lock().get(&handle).map_or(0, |c| c.1)
    }

    pub fn delivered(&self) -> Vec<Delivered> {
        self.delivered.lock().clone()
    }
}

impl NativeRuntime for CountingRuntime {
    fn retain(&self, handle: ForeignHandle) {
        self.counts.lock().entry(handle.raw()).or_default().0 += 1;
    }

    fn release(&self, handle: ForeignHandle) {
        let mut counts = self.counts.lock();
        let entry = counts.entry(handle.raw()).or_default();
        assert!(entry.1 < entry.0, "release without a matching retain for {}", handle);
        entry.1 += 1;
    }

    fn dispatch_message(&self, handle: ForeignHandle, payload: Option<&[u8]>, reply: BinaryReply) {
        let payload = payload.map(<[u8]>::to_vec);
        self.delivered.lock().push((handle.raw(), payload.clone()));
        reply.reply(payload);
    }
}

/// Reply that records every answer it receives.
pub fn recording_reply() -> (BinaryReply, Arc<Mutex<Vec<Option<Vec<u8>>>>>) {
    let answers = Arc::new(Mutex::new(Vec::new()));
    let sink = answers.clone();
    (BinaryReply::new(move |data| sink.lock().push(data)), answers)
}
