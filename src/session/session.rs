use std::sync::{
    atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering},
    Arc, Mutex,
};

use log::{info, trace, warn};
use statestream_serde::{ser_str, ByteReader, Wire, WireError, WireRead, WireWrite};

use crate::{
    entity::{
        flag,
        streamable::{Dispatch, EntityRef},
    },
    muxer::{BufferSink, FlushOptions, LogMux, LogReader, MuxConfig, OpWriter},
    registry::KindRegistry,
    session::{
        base_op::BaseOp,
        command::{
            CMD_BEGIN, CMD_END, CMD_EVENT, CMD_NOOP, CMD_VERSION, CMD_VEC_SIZE, DEFAULT_VEC_SIZE,
            PROTOCOL_VERSION,
        },
        error::SessionError,
        event::{Event, Observer},
        handle_map::HandleMap,
        name_map::NameMap,
    },
    types::{EntityKind, Handle, LogKind, Opcode, OpenMode},
};

/// What the CanEmit step of a save should do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveMode {
    /// Emit to the stream if not already emitted.
    Save,
    /// Emit and mark the object graph shared/global so later updates are
    /// logged for remote peers.
    Distribute,
    /// Mark the object graph as no longer distributed; nothing is emitted.
    ClearShared,
    /// Detach the object graph from this session; nothing is emitted.
    Detach,
}

/// A source of opcodes for the load driver: byte payloads received from a
/// peer, or a log reader over the local buffer pool.
pub trait OpSource: WireRead {
    /// Position on available input; false when the source is exhausted.
    fn more(&mut self) -> bool;
}

impl OpSource for ByteReader<'_> {
    fn more(&mut self) -> bool {
        self.remaining() >= 4
    }
}

impl OpSource for LogReader<'_> {
    fn more(&mut self) -> bool {
        !self.is_empty()
    }
}

/// One protocol-engine session: owns the handle table, the name dictionary,
/// the observer list and the concurrent log multiplexer.
///
/// The save driver turns live objects into deduplicated opcode streams; the
/// load driver replays such streams back into mutations on live objects.
/// Producers on any thread may save and log concurrently; the load/flush
/// side is single-consumer, called at synchronization points.
pub struct Session {
    registry: Arc<KindRegistry>,
    mux: Arc<LogMux>,
    handles: Mutex<HandleMap>,
    names: Mutex<NameMap>,
    observers: Mutex<Vec<Observer>>,
    label: Mutex<String>,
    mode: AtomicU8,
    forward_updates: AtomicBool,
    forward_events: AtomicBool,
    version: AtomicI32,
    vec_size: AtomicI32,
}

impl Session {
    pub fn new(registry: Arc<KindRegistry>, config: MuxConfig) -> Self {
        Self {
            registry,
            mux: Arc::new(LogMux::new(config)),
            handles: Mutex::new(HandleMap::new()),
            names: Mutex::new(NameMap::new()),
            observers: Mutex::new(Vec::new()),
            label: Mutex::new(String::new()),
            mode: AtomicU8::new(0),
            forward_updates: AtomicBool::new(false),
            forward_events: AtomicBool::new(false),
            version: AtomicI32::new(PROTOCOL_VERSION),
            vec_size: AtomicI32::new(DEFAULT_VEC_SIZE),
        }
    }

    pub fn registry(&self) -> &Arc<KindRegistry> {
        &self.registry
    }

    pub fn mux(&self) -> &Arc<LogMux> {
        &self.mux
    }

    pub fn version(&self) -> i32 {
        self.version.load(Ordering::Acquire)
    }

    pub fn vec_size(&self) -> i32 {
        self.vec_size.load(Ordering::Acquire)
    }

    // Forwarding switches, consulted at flush time.

    pub fn set_forward_updates(&self, forward: bool) {
        self.forward_updates.store(forward, Ordering::Release);
    }

    pub fn set_forward_events(&self, forward: bool) {
        self.forward_events.store(forward, Ordering::Release);
    }

    pub fn forwards_updates(&self) -> bool {
        self.forward_updates.load(Ordering::Acquire)
    }

    pub fn forwards_events(&self) -> bool {
        self.forward_events.load(Ordering::Acquire)
    }

    // Stream lifecycle

    /// Open the session stream. Opening for write emits the version and
    /// geometry header as the first opcodes of the stream.
    pub fn open(&self, name: &str, mode: OpenMode) -> Result<(), SessionError> {
        *self.label.lock().expect("session label lock poisoned") = name.to_string();
        self.mode.store(mode_bits(mode), Ordering::Release);
        trace!("session '{}' open {:?}", name, mode);
        if mode.writable() {
            let version = self.version();
            self.emit(LogKind::Priority, |op| {
                CMD_VERSION.ser(op)?;
                version.ser(op)
            })?;
            let vec_size = self.vec_size();
            self.emit(LogKind::Priority, |op| {
                CMD_VEC_SIZE.ser(op)?;
                vec_size.ser(op)
            })?;
        }
        Ok(())
    }

    /// Close the stream: every attached entity has its save status and id
    /// reset, the dictionaries are emptied and all pooled buffers dropped.
    pub fn close(&self) {
        self.mode.store(0, Ordering::Release);
        self.handles.lock().expect("handle map lock poisoned").clear();
        self.names.lock().expect("name map lock poisoned").clear();
        self.observers
            .lock()
            .expect("observer list lock poisoned")
            .clear();
        self.mux.clear();
        trace!("session closed");
    }

    pub fn is_open(&self) -> bool {
        self.mode.load(Ordering::Acquire) != 0
    }

    fn writable(&self) -> bool {
        self.mode.load(Ordering::Acquire) & 2 != 0
    }

    fn readable(&self) -> bool {
        self.mode.load(Ordering::Acquire) & 1 != 0
    }

    // Handle and name mapping

    /// Attach an entity, assigning a handle if it has none, and set the
    /// given flags. Attachment alone emits nothing.
    pub fn attach(&self, entity: &EntityRef, flags: u32) -> Handle {
        if flags != 0 {
            entity.core().set_flags(flags);
        }
        let mut handles = self.handles.lock().expect("handle map lock poisoned");
        handles.attach(entity)
    }

    /// Detach an entity: its handle is freed, its name bindings dropped and
    /// its save status reset. If the session held the last reference, the
    /// entity is freed.
    pub fn detach(&self, entity: &EntityRef) {
        {
            let mut names = self.names.lock().expect("name map lock poisoned");
            names.forget(entity);
        }
        let handle = entity.core().id();
        if handle.is_some() {
            let mut handles = self.handles.lock().expect("handle map lock poisoned");
            handles.detach(handle);
        } else {
            entity.core().clear_flags(flag::SAVED);
        }
    }

    /// The entity bound to a handle, if any.
    pub fn entity(&self, handle: Handle) -> Option<EntityRef> {
        let handles = self.handles.lock().expect("handle map lock poisoned");
        handles.get(handle)
    }

    pub fn max_handle(&self) -> Handle {
        let handles = self.handles.lock().expect("handle map lock poisoned");
        handles.max_handle()
    }

    /// Associate a name with an entity so later opcodes or other consumers
    /// can resolve it by name.
    pub fn define(&self, name: &str, entity: &EntityRef) {
        entity.core().set_name(Some(name));
        let mut names = self.names.lock().expect("name map lock poisoned");
        names.define(name, entity);
    }

    pub fn undefine(&self, name: &str) -> Option<EntityRef> {
        let mut names = self.names.lock().expect("name map lock poisoned");
        names.undefine(name)
    }

    /// Find an entity by name; `*` acts as a wildcard.
    pub fn find(&self, name: &str) -> Option<EntityRef> {
        let names = self.names.lock().expect("name map lock poisoned");
        names.find(name)
    }

    /// All named entities matching the pattern.
    pub fn find_all(&self, pattern: &str) -> Vec<EntityRef> {
        let names = self.names.lock().expect("name map lock poisoned");
        names.find_all(pattern)
    }

    // Observation

    /// Observe events with `code` (0 = every code), optionally filtered to a
    /// sender handle. Duplicate observations are refused.
    pub fn observe(&self, target: &EntityRef, code: u16, sender: Handle) -> bool {
        let mut observers = self.observers.lock().expect("observer list lock poisoned");
        let duplicate = observers.iter().any(|observer| {
            Arc::ptr_eq(&observer.target, target)
                && observer.code == code
                && observer.sender == sender
        });
        if duplicate {
            return false;
        }
        target.core().set_flags(flag::WANTS_EVENTS);
        observers.push(Observer {
            target: target.clone(),
            code,
            sender,
        });
        true
    }

    /// Remove matching observations; code 0 or sender NONE act as wildcards.
    pub fn ignore(&self, target: &EntityRef, code: u16, sender: Handle) -> bool {
        let mut observers = self.observers.lock().expect("observer list lock poisoned");
        let before = observers.len();
        observers.retain(|observer| {
            !(Arc::ptr_eq(&observer.target, target)
                && (code == 0 || observer.code == code)
                && (!sender.is_some() || observer.sender == sender))
        });
        before != observers.len()
    }

    /// Log an event to the event log. It is dispatched to local observers at
    /// the next replay, and forwarded at the next flush when event
    /// forwarding is enabled.
    pub fn log_event(&self, event: &Event) -> Result<(), SessionError> {
        trace!("log event {} sender {}", event.code, event.sender.raw());
        self.emit(LogKind::Event, |op| {
            CMD_EVENT.ser(op)?;
            event.ser(op)
        })
    }

    fn dispatch_event(&self, event: &Event) {
        let targets: Vec<EntityRef> = {
            let observers = self.observers.lock().expect("observer list lock poisoned");
            observers
                .iter()
                .filter(|observer| observer.matches(event))
                .map(|observer| observer.target.clone())
                .collect()
        };
        for target in targets {
            target.on_event(event);
        }
    }

    // Save path

    /// Save an entity's full state to the update log.
    pub fn save(&self, entity: &EntityRef) -> Result<Option<Handle>, SessionError> {
        self.save_as(entity, SaveMode::Save, LogKind::Update)
    }

    /// Save an entity, with explicit CanEmit semantics and target log.
    ///
    /// `Ok(None)` means "nothing to do": the entity is already represented
    /// by its existing handle (or the mode emits nothing). Repeated saves of
    /// an already-emitted entity are no-ops, which keeps serialization of
    /// cyclic graphs finite.
    pub fn save_as(
        &self,
        entity: &EntityRef,
        mode: SaveMode,
        log: LogKind,
    ) -> Result<Option<Handle>, SessionError> {
        if !self.is_open() {
            return Err(SessionError::StreamClosed);
        }
        match mode {
            SaveMode::Detach => {
                self.detach(entity);
                return Ok(None);
            }
            SaveMode::ClearShared => {
                entity.core().clear_flags(flag::GLOBAL | flag::SHARED);
                return Ok(None);
            }
            SaveMode::Save | SaveMode::Distribute => {
                if entity.core().is_set(flag::SAVED) {
                    return Ok(None);
                }
            }
        }

        let mut flags = flag::SAVED;
        if mode == SaveMode::Distribute {
            flags |= flag::SHARED | flag::GLOBAL;
        }
        let handle = self.attach(entity, flags);
        if let Some(name) = entity.core().name() {
            let mut names = self.names.lock().expect("name map lock poisoned");
            names.define(&name, entity);
        }
        if !self.writable() {
            return Ok(None);
        }

        let kind = entity.core().kind();
        trace!("save kind {} handle {}", kind.value(), handle.raw());
        self.emit(log, |op| {
            Opcode::new(kind, BaseOp::Create.op()).ser(op)?;
            handle.ser(op)
        })?;
        for (key, name) in entity.core().names() {
            if key == 0 {
                self.emit(log, |op| {
                    Opcode::new(kind, BaseOp::SetName.op()).ser(op)?;
                    handle.ser(op)?;
                    ser_str(&name, op)
                })?;
            } else {
                self.emit(log, |op| {
                    Opcode::new(kind, BaseOp::SetNameKey.op()).ser(op)?;
                    handle.ser(op)?;
                    (key as i32).ser(op)?;
                    ser_str(&name, op)
                })?;
            }
        }
        let state_flags = entity.core().flags() & flag::SERIALIZED;
        if state_flags != 0 {
            self.emit(log, |op| {
                Opcode::new(kind, BaseOp::SetFlags.op()).ser(op)?;
                handle.ser(op)?;
                (state_flags as i32).ser(op)
            })?;
        }

        let saver = Saver {
            session: self,
            log,
            mode,
        };
        entity.save_body(handle, &saver)?;
        Ok(Some(handle))
    }

    /// Log one opcode with caller-supplied operands.
    pub fn log_op<F>(&self, log: LogKind, opcode: Opcode, build: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut dyn WireWrite) -> Result<(), WireError>,
    {
        self.emit(log, |op| {
            opcode.ser(op)?;
            build(op)
        })
    }

    /// Log a state mutation on a distributed entity to the update log.
    ///
    /// No-op unless the entity is marked GLOBAL, mirroring how only
    /// distributed objects have their updates logged. Replay handlers must
    /// apply state directly rather than calling back into this, or a replay
    /// would re-log its own mutations.
    pub fn log_update<F>(&self, entity: &EntityRef, op: u16, build: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut dyn WireWrite) -> Result<(), WireError>,
    {
        if !self.writable() || !entity.core().is_set(flag::GLOBAL) {
            return Ok(());
        }
        let handle = self.attach(entity, 0);
        let opcode = Opcode::new(entity.core().kind(), op);
        self.emit(LogKind::Update, |writer| {
            opcode.ser(writer)?;
            handle.ser(writer)?;
            build(writer)
        })
    }

    fn emit<F>(&self, log: LogKind, build: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut OpWriter) -> Result<(), WireError>,
    {
        if !self.writable() {
            return Err(SessionError::StreamClosed);
        }
        let mut op = self.mux.begin_op(log)?;
        match build(&mut op) {
            Ok(()) => {
                op.commit()?;
                Ok(())
            }
            Err(wire_error) => {
                let precise = op.take_error();
                drop(op); // discards the in-progress opcode
                Err(match precise {
                    Some(mux_error) => mux_error.into(),
                    None => wire_error.into(),
                })
            }
        }
    }

    // Consumer side

    /// Hand completed buffers to the sink per log semantics and recycle
    /// drained ones. Called once per synchronization point.
    pub fn flush(&self, sink: &mut dyn BufferSink) {
        self.mux.flush(
            FlushOptions {
                forward_updates: self.forwards_updates(),
                forward_events: self.forwards_events(),
            },
            sink,
        );
    }

    /// Replay one local log into mutations on live objects.
    pub fn replay(&self, log: LogKind) -> Result<(), SessionError> {
        let mut reader = self.mux.reader(log);
        self.load(&mut reader)
    }

    /// Replay a byte payload received from a peer.
    pub fn load_bytes(&self, bytes: &[u8]) -> Result<(), SessionError> {
        let mut reader = ByteReader::new(bytes);
        self.load(&mut reader)
    }

    /// The load driver: read opcodes from the source and apply them until it
    /// is exhausted or an end-of-packet command is seen.
    ///
    /// Unknown opcodes, dangling handles and unregistered kinds abort only
    /// the opcode that carried them; they are logged and the driver
    /// continues with the next opcode.
    pub fn load<S: OpSource>(&self, source: &mut S) -> Result<(), SessionError> {
        if !self.readable() {
            return Err(SessionError::StreamClosed);
        }
        while source.more() {
            let word = u32::de(source)?;
            match word {
                CMD_NOOP => continue,
                CMD_VERSION => {
                    let version = i32::de(source)?;
                    self.version.store(version, Ordering::Release);
                }
                CMD_VEC_SIZE => {
                    let width = i32::de(source)?;
                    self.vec_size.store(width, Ordering::Release);
                }
                CMD_BEGIN => {
                    let stream_id = i32::de(source)?;
                    trace!("begin packet {}", stream_id);
                }
                CMD_END => return Ok(()),
                CMD_EVENT => {
                    let event = Event::de(source)?;
                    self.dispatch_event(&event);
                }
                _ => {
                    let opcode = Opcode::unpack(word);
                    let handle = Handle::de(source)?;
                    match self.apply(opcode, handle, source) {
                        Ok(()) => {}
                        Err(error) if error.is_skippable() => {
                            warn!("replay: {}", error);
                        }
                        Err(error) => return Err(error),
                    }
                }
            }
        }
        Ok(())
    }

    fn apply(
        &self,
        opcode: Opcode,
        handle: Handle,
        source: &mut dyn WireRead,
    ) -> Result<(), SessionError> {
        if opcode.op == BaseOp::Create.op() {
            self.create_at(opcode.kind, handle)?;
            return Ok(());
        }
        let entity = self.entity(handle).ok_or(SessionError::DanglingHandle {
            handle: handle.raw(),
        })?;
        let actual = entity.core().kind();
        // the opcode's kind is validation only; dispatch is by entity
        debug_assert_eq!(actual, opcode.kind, "handle table corrupt");
        let _ = actual;
        if opcode.op == BaseOp::Delete.op() {
            self.detach(&entity);
            return Ok(());
        }
        let outcome = {
            let mut ctx = LoadContext {
                session: self,
                source: &mut *source,
            };
            entity.dispatch(opcode.op, &mut ctx)?
        };
        match outcome {
            Dispatch::Handled => Ok(()),
            Dispatch::Unhandled => self.apply_base(&entity, opcode, source),
        }
    }

    /// Terminal handler for the universal base operations.
    fn apply_base(
        &self,
        entity: &EntityRef,
        opcode: Opcode,
        source: &mut dyn WireRead,
    ) -> Result<(), SessionError> {
        match BaseOp::from_op(opcode.op) {
            Some(BaseOp::SetName) => {
                let name = String::de(source)?;
                self.define(&name, entity);
            }
            Some(BaseOp::SetNameKey) => {
                let key = i32::de(source)?;
                let name = String::de(source)?;
                entity.core().set_name_keyed(Some(&name), key as u32);
            }
            Some(BaseOp::SetActive) => {
                let active = i32::de(source)?;
                entity.core().set_active(active != 0);
            }
            Some(BaseOp::SetFlags) => {
                let flags = i32::de(source)?;
                entity.core().set_flags(flags as u32);
            }
            Some(BaseOp::Describe) => {
                info!("{}", entity.describe());
            }
            Some(BaseOp::Copy) => {
                let src = {
                    let mut ctx = LoadContext {
                        session: self,
                        source,
                    };
                    ctx.read_entity()?
                };
                entity.copy_from(&src);
            }
            _ => {
                return Err(SessionError::UnknownOpcode {
                    kind: opcode.kind.value(),
                    op: opcode.op,
                });
            }
        }
        Ok(())
    }

    /// Materialize an empty entity of `kind` at the stream-chosen handle.
    fn create_at(&self, kind: EntityKind, handle: Handle) -> Result<EntityRef, SessionError> {
        if let Some(existing) = self.entity(handle) {
            let actual = existing.core().kind();
            if actual != kind {
                debug_assert_eq!(actual, kind, "handle table corrupt");
                return Err(SessionError::KindMismatch {
                    handle: handle.raw(),
                    expected: kind.value(),
                    actual: actual.value(),
                });
            }
            return Ok(existing);
        }
        let created = self
            .registry
            .create(kind)
            .ok_or(SessionError::UnknownKind { kind: kind.value() })?;
        let mut handles = self.handles.lock().expect("handle map lock poisoned");
        handles.attach_at(&created, handle);
        trace!("create kind {} at handle {}", kind.value(), handle.raw());
        Ok(created)
    }
}

/// Save context handed to [`Streamable::save_body`](crate::Streamable::save_body):
/// emits opcodes to the save's target log and recurses into children.
pub struct Saver<'a> {
    session: &'a Session,
    log: LogKind,
    mode: SaveMode,
}

impl Saver<'_> {
    pub fn session(&self) -> &Session {
        self.session
    }

    pub fn log(&self) -> LogKind {
        self.log
    }

    /// Save a referenced entity. `Ok(None)` means it was already emitted and
    /// its existing handle stands for it.
    pub fn save(&self, entity: &EntityRef) -> Result<Option<Handle>, SessionError> {
        self.session.save_as(entity, self.mode, self.log)
    }

    /// Emit one opcode; the closure writes its operands.
    pub fn emit<F>(&self, opcode: Opcode, build: F) -> Result<(), SessionError>
    where
        F: FnOnce(&mut dyn WireWrite) -> Result<(), WireError>,
    {
        self.session.emit(self.log, |op| {
            opcode.ser(op)?;
            build(op)
        })
    }

    /// Handle for a referenced entity, attaching it if needed. Emits
    /// nothing; use this to encode references to entities saved elsewhere.
    pub fn handle_of(&self, entity: &EntityRef) -> Handle {
        self.session.attach(entity, 0)
    }
}

/// Load context handed to [`Streamable::dispatch`](crate::Streamable::dispatch):
/// reads an operation's operands and resolves handles to live entities.
pub struct LoadContext<'a> {
    session: &'a Session,
    source: &'a mut dyn WireRead,
}

impl LoadContext<'_> {
    pub fn session(&self) -> &Session {
        self.session
    }

    pub fn read<T: Wire>(&mut self) -> Result<T, SessionError> {
        T::de(&mut *self.source).map_err(Into::into)
    }

    /// Read a handle operand and resolve it.
    pub fn read_entity(&mut self) -> Result<EntityRef, SessionError> {
        let handle: Handle = self.read()?;
        self.session
            .entity(handle)
            .ok_or(SessionError::DanglingHandle {
                handle: handle.raw(),
            })
    }
}

fn mode_bits(mode: OpenMode) -> u8 {
    match mode {
        OpenMode::Read => 1,
        OpenMode::Write => 2,
        OpenMode::ReadWrite => 3,
    }
}
