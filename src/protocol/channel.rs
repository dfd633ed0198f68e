//! Ordered command channel between a caller and the engine-owning worker thread.
//!
//! Engines, pools and surfaces never leave the worker; only encoded commands and replies cross
//! the boundary.

use std::{
    collections::VecDeque,
    sync::mpsc,
    thread::JoinHandle,
};

use anyhow::Context;
use serde_json::Value;

use crate::{
    backend::{
        GpuPool,
        gpu::{DEFAULT_MAX_LIVE_CONTEXTS, GpuPlatform},
    },
    engine::EngineConfig,
    resource::pool::RetentionPolicy,
    foundation::error::{EngineError, EngineResult, ProtocolError},
    protocol::{
        command::{Command, CommandLog, CommandState, Envelope, Reply},
        dispatch::Dispatcher,
    },
};

/// Worker configuration.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct WorkerOpts {
    /// Live GPU context ceiling of the worker's platform.
    pub max_live_gpu_contexts: usize,
    /// Retention for the GPU context pool shared by the worker's engines.
    pub gpu_retention: RetentionPolicy,
    /// Config for engines created without one.
    pub engine_config: EngineConfig,
    /// Worker thread name.
    pub thread_name: String,
}

impl Default for WorkerOpts {
    fn default() -> Self {
        Self {
            max_live_gpu_contexts: DEFAULT_MAX_LIVE_CONTEXTS,
            gpu_retention: RetentionPolicy::KeepMaximum,
            engine_config: EngineConfig::default(),
            thread_name: "pixelworks-worker".to_string(),
        }
    }
}

/// Start a worker thread that owns a [`Dispatcher`] and applies commands in arrival order.
pub fn spawn_worker(opts: WorkerOpts) -> EngineResult<WorkerClient> {
    let (cmd_tx, cmd_rx) = mpsc::channel::<Envelope>();
    let (reply_tx, reply_rx) = mpsc::channel::<Reply>();

    let WorkerOpts {
        max_live_gpu_contexts,
        gpu_retention,
        engine_config,
        thread_name,
    } = opts;
    let join = std::thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            // The platform and everything built on it stay on this thread.
            let gpu = GpuPool::new(GpuPlatform::new(max_live_gpu_contexts), gpu_retention);
            let mut dispatcher = Dispatcher::new(gpu, engine_config);
            for envelope in cmd_rx {
                let reply = dispatcher.apply(envelope);
                if reply_tx.send(reply).is_err() {
                    tracing::warn!("reply receiver dropped; stopping worker");
                    break;
                }
            }
            dispatcher.log().clone()
        })
        .with_context(|| format!("spawn worker thread '{thread_name}'"))?;

    Ok(WorkerClient {
        tx: Some(cmd_tx),
        rx: reply_rx,
        next_seq: 0,
        pending: VecDeque::new(),
        log: CommandLog::new(),
        join: Some(join),
    })
}

/// Caller-side end of the channel.
///
/// Sequence numbers are assigned on send; replies must come back in exactly that order.
pub struct WorkerClient {
    tx: Option<mpsc::Sender<Envelope>>,
    rx: mpsc::Receiver<Reply>,
    next_seq: u64,
    pending: VecDeque<(u64, Option<String>)>,
    log: CommandLog,
    join: Option<JoinHandle<CommandLog>>,
}

impl WorkerClient {
    /// Encode and send a command. Returns its sequence number.
    pub fn send(&mut self, cmd: &Command) -> EngineResult<u64> {
        self.send_value(cmd.encode())
    }

    /// Send an already encoded command as-is.
    pub fn send_value(&mut self, command: Value) -> EngineResult<u64> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| ProtocolError::ChannelFaulted("worker is shut down".to_string()))?;
        let seq = self.next_seq;
        let opcode = command
            .get("opcode")
            .and_then(Value::as_str)
            .map(str::to_string);
        self.log.record(seq, opcode.clone(), CommandState::Encoded);
        tx.send(Envelope { seq, command })
            .map_err(|_| ProtocolError::ChannelFaulted("worker hung up".to_string()))?;
        self.next_seq += 1;
        self.pending.push_back((seq, opcode));
        Ok(seq)
    }

    /// Wait for the reply to the oldest outstanding command.
    pub fn recv(&mut self) -> EngineResult<Reply> {
        let (expected, opcode) = self.pending.pop_front().ok_or_else(|| {
            EngineError::invalid_state("no command is awaiting a reply")
        })?;
        let reply = self
            .rx
            .recv()
            .map_err(|_| ProtocolError::ChannelFaulted("worker hung up".to_string()))?;
        if reply.seq != expected {
            return Err(ProtocolError::ChannelFaulted(format!(
                "expected reply {expected}, got {}",
                reply.seq
            ))
            .into());
        }
        let state = if reply.is_ok() {
            CommandState::Acknowledged
        } else {
            CommandState::Rejected
        };
        self.log.record(expected, opcode, state);
        Ok(reply)
    }

    /// Send a command and wait for its reply.
    pub fn call(&mut self, cmd: &Command) -> EngineResult<Reply> {
        self.send(cmd)?;
        self.recv()
    }

    /// Send an encoded command and wait for its reply.
    pub fn call_value(&mut self, command: Value) -> EngineResult<Reply> {
        self.send_value(command)?;
        self.recv()
    }

    /// Commands sent but not yet answered.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Caller-side state transitions.
    pub fn log(&self) -> &CommandLog {
        &self.log
    }

    /// Close the channel, drain outstanding replies and join the worker. Returns the worker's
    /// own log.
    pub fn shutdown(mut self) -> EngineResult<(Vec<Reply>, CommandLog)> {
        let mut drained = Vec::new();
        while !self.pending.is_empty() {
            drained.push(self.recv()?);
        }
        self.tx = None;
        let join = self
            .join
            .take()
            .ok_or_else(|| EngineError::invalid_state("worker already joined"))?;
        let worker_log = join
            .join()
            .map_err(|_| ProtocolError::ChannelFaulted("worker thread panicked".to_string()))?;
        Ok((drained, worker_log))
    }
}

impl Drop for WorkerClient {
    fn drop(&mut self) {
        self.tx = None;
        if let Some(join) = self.join.take()
            && join.join().is_err()
        {
            tracing::warn!("worker thread panicked");
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/protocol/channel.rs"]
mod tests;
