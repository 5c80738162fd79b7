//! Recording binding for unit tests.

use bytes::Bytes;
use circuit_common::{
    Binding, BindingConfig, BindingEvent, BindingFactory, ExchangeId, NodeId, TransportError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub exchange: ExchangeId,
    pub profile_id: u32,
    pub msg_type: u8,
    pub payload: Bytes,
}

#[derive(Debug, Default)]
pub struct FakeBinding {
    pub target: Option<NodeId>,
    pub prepare_requests: u32,
    pub prepared_with: Vec<BindingConfig>,
    pub sent: Vec<SentMessage>,
    pub aborted: Vec<ExchangeId>,
    pub defaulted: Vec<BindingEvent>,
    pub next_exchange: u32,
    pub fail_request_prepare: Option<TransportError>,
    pub fail_prepare: Option<TransportError>,
    pub fail_new_exchange: Option<TransportError>,
    pub fail_send: Option<TransportError>,
}

impl Binding for FakeBinding {
    fn request_prepare(&mut self) -> Result<(), TransportError> {
        self.prepare_requests += 1;
        match self.fail_request_prepare.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn prepare(&mut self, config: &BindingConfig) -> Result<(), TransportError> {
        self.prepared_with.push(*config);
        match self.fail_prepare.clone() {
            Some(err) => Err(err),
            None => config.validate(),
        }
    }

    fn new_exchange(&mut self) -> Result<ExchangeId, TransportError> {
        if let Some(err) = self.fail_new_exchange.clone() {
            return Err(err);
        }
        self.next_exchange += 1;
        Ok(ExchangeId(self.next_exchange))
    }

    fn send_message(
        &mut self,
        exchange: ExchangeId,
        profile_id: u32,
        msg_type: u8,
        payload: Bytes,
    ) -> Result<(), TransportError> {
        if let Some(err) = self.fail_send.clone() {
            return Err(err);
        }
        self.sent.push(SentMessage {
            exchange,
            profile_id,
            msg_type,
            payload,
        });
        Ok(())
    }

    fn abort_exchange(&mut self, exchange: ExchangeId) {
        self.aborted.push(exchange);
    }

    fn default_event_handler(&mut self, event: &BindingEvent) {
        self.defaulted.push(event.clone());
    }
}

#[derive(Debug, Default)]
pub struct FakeFactory {
    pub refuse: bool,
}

impl BindingFactory for FakeFactory {
    type Binding = FakeBinding;

    fn new_binding(&mut self, target: NodeId) -> Result<FakeBinding, TransportError> {
        if self.refuse {
            return Err(TransportError::NoMemory);
        }
        Ok(FakeBinding {
            target: Some(target),
            ..FakeBinding::default()
        })
    }
}
