//! Recording collaborators for unit tests.

use std::cell::RefCell;
use std::rc::Rc;

use circuit_common::{CommandResponder, PublishError, Publisher, TraitHandle, TransportError};
use circuit_protocol::{CommandReply, PropertyHandle, TraitSource};

#[derive(Debug, Default)]
pub struct RecordingPublisher {
    pub published: Vec<(u32, TraitSource)>,
    pub dirty: Vec<(TraitHandle, PropertyHandle)>,
    pub engine_runs: u32,
    pub refuse: bool,
}

impl Publisher for RecordingPublisher {
    fn publish_trait(
        &mut self,
        instance_id: u32,
        source: TraitSource,
    ) -> Result<TraitHandle, PublishError> {
        if self.refuse {
            return Err(PublishError::TableFull { capacity: 0 });
        }
        self.published.push((instance_id, source));
        Ok(TraitHandle(self.published.len() as u16 - 1))
    }

    fn set_dirty(&mut self, handle: TraitHandle, property: PropertyHandle) {
        self.dirty.push((handle, property));
    }

    fn run_notification_engine(&mut self) {
        self.engine_runs += 1;
    }
}

/// Collects replies into a shared list.
#[derive(Debug, Clone, Default)]
pub struct ReplySink(pub Rc<RefCell<Vec<CommandReply>>>);

impl ReplySink {
    pub fn responder(&self) -> RecordingResponder {
        RecordingResponder {
            sink: self.clone(),
            fail: false,
        }
    }

    pub fn failing_responder(&self) -> RecordingResponder {
        RecordingResponder {
            sink: self.clone(),
            fail: true,
        }
    }

    pub fn replies(&self) -> Vec<CommandReply> {
        self.0.borrow().clone()
    }
}

pub struct RecordingResponder {
    sink: ReplySink,
    fail: bool,
}

impl CommandResponder for RecordingResponder {
    fn send_reply(self, reply: CommandReply) -> Result<(), TransportError> {
        self.sink.0.borrow_mut().push(reply);
        if self.fail {
            Err(TransportError::LinkDown)
        } else {
            Ok(())
        }
    }
}
