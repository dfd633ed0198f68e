use std::collections::HashMap;

use serde_json::{Value, json};

use crate::{
    backend::{GpuPool, gpu::GpuPlatform},
    engine::{EngineConfig, EngineRoot},
    foundation::core::{Rgba8Premul, Size},
    foundation::error::{EngineError, EngineResult, ProtocolError},
    protocol::{
        command::{Command, CommandLog, CommandState, Envelope, Payload, Reply},
        opcode::Opcode,
    },
    resource::release::{ReleaseFlags, ReleaseResources},
};

/// Applies commands to the engines living on this side of the boundary.
///
/// Owns the engine registry. Every command is either applied completely or rejected without
/// side effects; a rejected command never leaves the dispatcher unusable.
pub struct Dispatcher {
    gpu: GpuPool,
    default_config: EngineConfig,
    engines: HashMap<String, EngineRoot>,
    log: CommandLog,
    next_seq: u64,
}

impl Dispatcher {
    /// Create a dispatcher whose engines share the GPU pool `gpu`.
    pub fn new(gpu: GpuPool, default_config: EngineConfig) -> Self {
        Self {
            gpu,
            default_config,
            engines: HashMap::new(),
            log: CommandLog::new(),
            next_seq: 0,
        }
    }

    /// GPU platform behind the shared pool.
    pub fn platform(&self) -> &GpuPlatform {
        self.gpu.platform()
    }

    /// GPU context pool shared by every engine.
    pub fn gpu_pool(&self) -> &GpuPool {
        &self.gpu
    }

    /// Engine registered under `handle`, including disposed ones.
    pub fn engine(&self, handle: &str) -> Option<&EngineRoot> {
        self.engines.get(handle)
    }

    /// Mutable access to a registered engine.
    pub fn engine_mut(&mut self, handle: &str) -> Option<&mut EngineRoot> {
        self.engines.get_mut(handle)
    }

    /// Registered engine handles, sorted.
    pub fn engine_handles(&self) -> Vec<String> {
        let mut out: Vec<String> = self.engines.keys().cloned().collect();
        out.sort();
        out
    }

    /// State transitions recorded on this side.
    pub fn log(&self) -> &CommandLog {
        &self.log
    }

    /// Decode and apply one sequenced command.
    #[tracing::instrument(skip(self, envelope), fields(seq = envelope.seq))]
    pub fn apply(&mut self, envelope: Envelope) -> Reply {
        let seq = envelope.seq;
        self.next_seq = self.next_seq.max(seq.saturating_add(1));
        let opcode_hint = envelope
            .command
            .get("opcode")
            .and_then(Value::as_str)
            .map(str::to_string);
        self.log
            .record(seq, opcode_hint.clone(), CommandState::Delivered);

        let cmd = match Command::decode(&envelope.command) {
            Ok(cmd) => cmd,
            Err(err) => {
                let err = EngineError::from(err);
                tracing::warn!(error = %err, "command rejected at decode");
                self.log.record(seq, opcode_hint, CommandState::Rejected);
                return Reply::rejected(seq, None, &err);
            }
        };

        match self.execute(&cmd) {
            Ok(result) => {
                tracing::debug!(opcode = %cmd.opcode, handle = %cmd.handle, "command applied");
                self.log
                    .record(seq, Some(cmd.opcode.to_string()), CommandState::Applied);
                Reply::applied(seq, cmd.opcode, result)
            }
            Err(err) => {
                tracing::warn!(opcode = %cmd.opcode, handle = %cmd.handle, error = %err, "command rejected");
                self.log
                    .record(seq, Some(cmd.opcode.to_string()), CommandState::Rejected);
                Reply::rejected(seq, Some(cmd.opcode), &err)
            }
        }
    }

    /// Apply one JSON command line, assigning it the next sequence number.
    pub fn apply_line(&mut self, line: &str) -> Reply {
        let seq = self.next_seq;
        match serde_json::from_str::<Value>(line) {
            Ok(command) => self.apply(Envelope { seq, command }),
            Err(e) => {
                self.next_seq = self.next_seq.saturating_add(1);
                let err = EngineError::serde(format!("command line is not JSON: {e}"));
                self.log.record(seq, None, CommandState::Rejected);
                Reply::rejected(seq, None, &err)
            }
        }
    }

    /// Execute an already decoded command.
    pub fn execute(&mut self, cmd: &Command) -> EngineResult<Value> {
        let opcode = cmd.opcode;
        if let Payload::Create { config } = &cmd.payload {
            if self.engines.contains_key(&cmd.handle) {
                return Err(ProtocolError::HandleCollision(cmd.handle.clone()).into());
            }
            let config = (*config).unwrap_or(self.default_config);
            let engine = EngineRoot::new(opcode.namespace, config, self.gpu.clone());
            self.engines.insert(cmd.handle.clone(), engine);
            return Ok(json!({ "engine": cmd.handle, "namespace": opcode.namespace }));
        }

        let engine = self.target(opcode, cmd.engine_handle())?;
        let handle = cmd.handle.as_str();
        match &cmd.payload {
            Payload::Create { .. } => Err(EngineError::invalid_state("create handled above")),
            Payload::CreateImage { width, height, .. } => {
                engine.create_image_with_handle(handle, Size::new(*width, *height))?;
                Ok(json!({ "image": handle, "width": width, "height": height }))
            }
            Payload::ReleaseImage { recursive, .. } => {
                engine.release_image(handle, ReleaseFlags::from_recursive(*recursive))?;
                Ok(json!({ "image": handle }))
            }
            Payload::DisposeImage { .. } => {
                engine.dispose_image(handle)?;
                Ok(json!({ "image": handle }))
            }
            Payload::Release { recursive } => {
                engine.release_resources((), ReleaseFlags::from_recursive(*recursive))?;
                Ok(json!({ "engine": handle }))
            }
            Payload::Dispose => {
                engine.dispose()?;
                Ok(json!({ "engine": handle }))
            }
            Payload::FillImage { color, surface, .. } => {
                // Validate the handle before moving anything.
                engine.image(handle)?;
                if let Some(kind) = surface {
                    engine.move_image(handle, *kind)?;
                }
                let [r, g, b, a] = *color;
                engine.fill_image(handle, Rgba8Premul::from_straight_rgba(r, g, b, a))?;
                Ok(json!({ "image": handle }))
            }
            Payload::ReadPixel { x, y, .. } => {
                let px = engine.pixel(handle, *x, *y)?;
                Ok(json!({ "image": handle, "rgba": px.to_array() }))
            }
        }
    }

    fn target(&mut self, opcode: Opcode, engine: &str) -> EngineResult<&mut EngineRoot> {
        let root = self
            .engines
            .get_mut(engine)
            .ok_or_else(|| EngineError::from(ProtocolError::UnknownHandle(engine.to_string())))?;
        if root.namespace() != opcode.namespace {
            return Err(ProtocolError::NamespaceMismatch {
                engine: engine.to_string(),
                expected: root.namespace().to_string(),
                got: opcode.namespace.to_string(),
            }
            .into());
        }
        Ok(root)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/protocol/dispatch.rs"]
mod tests;
