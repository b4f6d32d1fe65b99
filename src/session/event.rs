use statestream_serde::{Wire, WireError, WireRead, WireWrite};

use crate::{entity::streamable::EntityRef, types::Handle};

/// Most operands an event may carry.
pub const MAX_EVENT_ARGS: usize = 64;

/// A logged occurrence: dispatched locally to observers during event-log
/// replay, and forwarded to remote peers when event forwarding is enabled.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub code: u16,
    pub time: f32,
    pub sender: Handle,
    pub args: Vec<i32>,
}

impl Event {
    pub fn new(code: u16) -> Self {
        Self {
            code,
            time: 0.0,
            sender: Handle::NONE,
            args: Vec::new(),
        }
    }

    pub fn with_sender(mut self, sender: Handle) -> Self {
        self.sender = sender;
        self
    }

    pub fn with_args(mut self, args: Vec<i32>) -> Self {
        self.args = args;
        self
    }
}

impl Wire for Event {
    fn ser(&self, writer: &mut dyn WireWrite) -> Result<(), WireError> {
        (self.code as i32).ser(writer)?;
        self.time.ser(writer)?;
        self.sender.ser(writer)?;
        (self.args.len() as i32).ser(writer)?;
        for arg in &self.args {
            arg.ser(writer)?;
        }
        Ok(())
    }

    fn de(reader: &mut dyn WireRead) -> Result<Self, WireError> {
        let code = i32::de(reader)? as u16;
        let time = f32::de(reader)?;
        let sender = Handle::de(reader)?;
        let count = i32::de(reader)?;
        if count < 0 || count as usize > MAX_EVENT_ARGS {
            return Err(WireError::SequenceTooLong {
                length: count.max(0) as usize,
                max: MAX_EVENT_ARGS,
            });
        }
        let mut args = Vec::with_capacity(count as usize);
        for _ in 0..count {
            args.push(i32::de(reader)?);
        }
        Ok(Self {
            code,
            time,
            sender,
            args,
        })
    }
}

/// One observation: `target` wants events with `code`, optionally filtered
/// to a specific sender.
pub(crate) struct Observer {
    pub target: EntityRef,
    pub code: u16,
    pub sender: Handle,
}

impl Observer {
    pub fn matches(&self, event: &Event) -> bool {
        if self.code != 0 && self.code != event.code {
            return false;
        }
        if self.sender.is_some() && self.sender != event.sender {
            return false;
        }
        true
    }
}
