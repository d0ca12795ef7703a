//! Scripted in-memory transport shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use inverter_protocol::{
    ConnectionConfig, DeviceFamily, DeviceLogger, InverterAdapter, LinkError, RegisterTransport,
    Result,
};

/// One recorded transport call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open,
    Close,
    Read { unit: u8, address: u16, count: u16 },
    Write { unit: u8, address: u16, value: u16 },
}

#[derive(Debug, Default)]
struct State {
    opens: VecDeque<Result<()>>,
    reads: VecDeque<Result<Vec<u16>>>,
    writes: VecDeque<Result<()>>,
    history: Vec<Call>,
}

/// Replays queued results; unscripted calls succeed (reads return zeros)
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<State>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_open(&self, result: Result<()>) -> &Self {
        self.state.lock().unwrap().opens.push_back(result);
        self
    }

    pub fn queue_read(&self, result: Result<Vec<u16>>) -> &Self {
        self.state.lock().unwrap().reads.push_back(result);
        self
    }

    pub fn queue_reads(&self, count: usize, result: Result<Vec<u16>>) -> &Self {
        for _ in 0..count {
            self.queue_read(result.clone());
        }
        self
    }

    pub fn queue_write(&self, result: Result<()>) -> &Self {
        self.state.lock().unwrap().writes.push_back(result);
        self
    }

    pub fn history(&self) -> Vec<Call> {
        self.state.lock().unwrap().history.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.history().iter().filter(|c| pred(c)).count()
    }

    pub fn opens(&self) -> usize {
        self.count(|c| matches!(c, Call::Open))
    }

    pub fn closes(&self) -> usize {
        self.count(|c| matches!(c, Call::Close))
    }

    pub fn reads(&self) -> usize {
        self.count(|c| matches!(c, Call::Read { .. }))
    }

    pub fn writes(&self) -> usize {
        self.count(|c| matches!(c, Call::Write { .. }))
    }
}

#[async_trait]
impl RegisterTransport for ScriptedTransport {
    async fn open(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.history.push(Call::Open);
        state.opens.pop_front().unwrap_or(Ok(()))
    }

    async fn close(&mut self) {
        self.state.lock().unwrap().history.push(Call::Close);
    }

    async fn read_holding(&mut self, unit: u8, address: u16, count: u16) -> Result<Vec<u16>> {
        let mut state = self.state.lock().unwrap();
        state.history.push(Call::Read {
            unit,
            address,
            count,
        });
        state
            .reads
            .pop_front()
            .unwrap_or_else(|| Ok(vec![0; usize::from(count)]))
    }

    async fn write_single(&mut self, unit: u8, address: u16, value: u16) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.history.push(Call::Write {
            unit,
            address,
            value,
        });
        state.writes.pop_front().unwrap_or(Ok(()))
    }
}

/// Connection settings with no real delay between retries
pub fn test_config(max_retries: u32) -> ConnectionConfig {
    ConnectionConfig::tcp("127.0.0.1", 502)
        .with_unit_id(7)
        .with_max_retries(max_retries)
        .with_retry_cooldown(Duration::ZERO)
}

pub fn adapter(
    family: DeviceFamily,
    transport: &ScriptedTransport,
    max_retries: u32,
) -> InverterAdapter<ScriptedTransport> {
    InverterAdapter::with_transport(
        transport.clone(),
        family.register_map().unwrap(),
        &test_config(max_retries),
        DeviceLogger::new("scripted", "memory"),
    )
}

pub fn timeout() -> LinkError {
    LinkError::timeout("no response")
}

pub fn exception(code: u8) -> LinkError {
    LinkError::Exception {
        function: 0x03,
        code,
    }
}
